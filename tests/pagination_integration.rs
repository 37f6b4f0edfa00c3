//! Pagination tests against simulated listing endpoints.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use futures::StreamExt;
use tideline::prelude::*;
use tideline::PageFailure;

/// A token-paginated listing: each page hands back an opaque token for the
/// next one.
struct Listing {
    pages: HashMap<Option<String>, (Vec<u32>, Option<String>)>,
    failures: Mutex<HashMap<Option<String>, Vec<u16>>>,
    fetches: AtomicU32,
}

impl Listing {
    fn new() -> Self {
        let mut pages = HashMap::new();
        pages.insert(None, (vec![1, 2, 3], Some("tok-a".to_string())));
        pages.insert(
            Some("tok-a".to_string()),
            (vec![4, 5], Some("tok-b".to_string())),
        );
        pages.insert(Some("tok-b".to_string()), (vec![6], None));
        Self {
            pages,
            failures: Mutex::new(HashMap::new()),
            fetches: AtomicU32::new(0),
        }
    }

    fn fail_with(self, token: Option<&str>, statuses: Vec<u16>) -> Self {
        self.failures
            .lock()
            .unwrap()
            .insert(token.map(str::to_string), statuses);
        self
    }

    fn fetch(&self, cursor: &PageCursor<String>) -> Result<Page<u32, String>, u16> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let token = cursor.position().cloned();

        if let Some(statuses) = self.failures.lock().unwrap().get_mut(&token) {
            if !statuses.is_empty() {
                return Err(statuses.remove(0));
            }
        }

        let (items, next) = self.pages.get(&token).cloned().ok_or(404u16)?;
        Ok(Page::new(items, next))
    }
}

fn retrier() -> Retrier<HttpStatusClassifier> {
    Retrier::new(RetryPolicy::new(3, Duration::from_millis(20)))
        .unwrap()
        .with_classifier(HttpStatusClassifier::default())
}

#[tokio::test(start_paused = true)]
async fn token_pages_concatenate_in_order() {
    let listing = Listing::new();
    let retrier = retrier();

    let result = collect_pages(paginate(&retrier, |cursor| {
        std::future::ready(listing.fetch(cursor))
    }))
    .await;

    assert!(result.is_complete());
    assert_eq!(result.items, vec![1, 2, 3, 4, 5, 6]);
    assert_eq!(listing.fetches.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn throttled_page_is_retried_transparently() {
    let listing = Listing::new().fail_with(Some("tok-a"), vec![429, 503]);
    let retrier = retrier();

    let items = collect_pages(paginate(&retrier, |cursor| {
        std::future::ready(listing.fetch(cursor))
    }))
    .await
    .into_result()
    .unwrap();

    assert_eq!(items, vec![1, 2, 3, 4, 5, 6]);
    assert_eq!(listing.fetches.load(Ordering::SeqCst), 5);
}

#[tokio::test(start_paused = true)]
async fn fatal_page_keeps_items_already_streamed() {
    let listing = Listing::new().fail_with(Some("tok-b"), vec![403]);
    let retrier = retrier();

    let (items, failure) = collect_pages(paginate(&retrier, |cursor| {
        std::future::ready(listing.fetch(cursor))
    }))
    .await
    .into_result()
    .unwrap_err();

    assert_eq!(items, vec![1, 2, 3, 4, 5]);
    assert_eq!(failure.page, 3);
    assert!(failure.is_fatal());
    assert_eq!(failure.error, 403);
    assert_eq!(failure.attempts.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn exhausted_page_reports_every_attempt() {
    let listing = Listing::new().fail_with(None, vec![502, 502, 502]);
    let retrier = retrier();

    let result = collect_pages(paginate(&retrier, |cursor| {
        std::future::ready(listing.fetch(cursor))
    }))
    .await;

    assert!(result.items.is_empty());
    let failure = result.failure.unwrap();
    assert!(failure.is_exhausted());
    assert_eq!(failure.page, 1);
    assert_eq!(failure.attempts.len(), 3);
    assert_eq!(
        failure.to_string(),
        "page 1 failed after 3 attempts (retryable failure): 502"
    );
}

#[tokio::test(start_paused = true)]
async fn stream_stops_after_the_failure() {
    let listing = Listing::new().fail_with(Some("tok-a"), vec![401]);
    let retrier = retrier();

    let stream = paginate(&retrier, |cursor| std::future::ready(listing.fetch(cursor)));
    let all: Vec<Result<u32, PageFailure<u16>>> = stream.collect().await;

    assert_eq!(all.len(), 4);
    assert!(all[..3].iter().all(|r| r.is_ok()));
    assert!(all[3].is_err());
}

#[tokio::test(start_paused = true)]
async fn numbered_pages_end_at_first_empty_page() {
    let requested = Mutex::new(Vec::new());
    let retrier = retrier();

    let items = collect_pages(paginate(&retrier, |cursor: &PageCursor<u32>| {
        let page = cursor.page_number(0);
        requested.lock().unwrap().push(page);
        async move {
            let items: Vec<u32> = match page {
                0..=2 => (page * 100..page * 100 + 2).collect(),
                _ => Vec::new(),
            };
            Ok::<_, u16>(Page::numbered(items, page))
        }
    }))
    .await
    .into_result()
    .unwrap();

    assert_eq!(items, vec![0, 1, 100, 101, 200, 201]);
    assert_eq!(*requested.lock().unwrap(), vec![0, 1, 2, 3]);
}

#[tokio::test(start_paused = true)]
async fn consumer_controls_how_many_pages_load() {
    let listing = Listing::new();
    let retrier = retrier();

    let first_four: Vec<u32> = paginate(&retrier, |cursor| {
        std::future::ready(listing.fetch(cursor))
    })
    .take(4)
    .map(|item| item.unwrap())
    .collect()
    .await;

    assert_eq!(first_four, vec![1, 2, 3, 4]);
    // page 3 was never requested
    assert_eq!(listing.fetches.load(Ordering::SeqCst), 2);
}
