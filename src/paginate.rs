//! Lazy cursor-based pagination.
//!
//! [`paginate`] turns a page-fetch function into a forward-only
//! [`Stream`] of items spanning every page. Pages are fetched one at a time,
//! only when the consumer has drained the previous one, and each fetch runs
//! through a [`Retrier`].
//!
//! The loop ends when a page reports no next cursor or comes back empty (even
//! if it claimed there was more). A fetch that fails fatally, or exhausts its
//! retries, yields a single `Err(PageFailure)` after the items already
//! produced, and the stream ends.
//!
//! # Example
//!
//! ```rust
//! use futures::StreamExt;
//! use tideline::{paginate, Page, PageCursor, Retrier, RetryPolicy};
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let retrier = Retrier::new(RetryPolicy::new(3, Duration::from_millis(1))).unwrap();
//!
//! let items: Vec<_> = paginate(&retrier, |cursor: &PageCursor<u32>| {
//!     let page = cursor.page_number(1);
//!     async move {
//!         let items = if page <= 3 { vec![page * 10, page * 10 + 1] } else { vec![] };
//!         Ok::<_, String>(Page::numbered(items, page))
//!     }
//! })
//! .map(|item| item.unwrap())
//! .collect()
//! .await;
//!
//! assert_eq!(items, vec![10, 11, 20, 21, 30, 31]);
//! # });
//! ```

use std::collections::VecDeque;
use std::future::Future;
use std::pin::pin;

use futures::stream::{self, Stream, StreamExt};

use crate::classify::Classifier;
use crate::outcome::{Outcome, OutcomeKind};
use crate::retry::{AttemptRecord, Retrier};

/// Position of the next page to fetch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PageCursor<C> {
    /// The first page.
    First,
    /// A page after the first, identified by the cursor the previous page
    /// returned.
    Next(C),
}

impl<C> PageCursor<C> {
    /// Returns true for [`PageCursor::First`].
    pub fn is_first(&self) -> bool {
        matches!(self, PageCursor::First)
    }

    /// The continuation value, if this is not the first page.
    pub fn position(&self) -> Option<&C> {
        match self {
            PageCursor::First => None,
            PageCursor::Next(c) => Some(c),
        }
    }
}

impl PageCursor<u32> {
    /// Page number for APIs addressed by `?page=N`, where `first` is the
    /// number of the first page.
    pub fn page_number(&self, first: u32) -> u32 {
        match self {
            PageCursor::First => first,
            PageCursor::Next(n) => *n,
        }
    }
}

/// One page of results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T, C> {
    /// Items on this page, in order.
    pub items: Vec<T>,
    /// Cursor of the following page, or `None` when this is the last one.
    pub next: Option<C>,
}

impl<T, C> Page<T, C> {
    /// A page followed by the page at `next`.
    pub fn new(items: Vec<T>, next: Option<C>) -> Self {
        Self { items, next }
    }

    /// The final page.
    pub fn last(items: Vec<T>) -> Self {
        Self { items, next: None }
    }

    /// Returns true when another page follows.
    pub fn has_more(&self) -> bool {
        self.next.is_some()
    }
}

impl<T> Page<T, u32> {
    /// Page `current` of a numbered listing.
    ///
    /// Always points at `current + 1`; the listing ends at the first empty
    /// page.
    pub fn numbered(items: Vec<T>, current: u32) -> Self {
        Self {
            items,
            next: current.checked_add(1),
        }
    }
}

/// A page fetch that failed for good.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageFailure<E> {
    /// Ordinal of the failed page (1-indexed).
    pub page: u32,
    /// Whether the last attempt was fatal or the retries ran out.
    pub kind: OutcomeKind,
    /// Error from the last attempt.
    pub error: E,
    /// Attempts made for this page.
    pub attempts: Vec<AttemptRecord>,
}

impl<E> PageFailure<E> {
    /// Returns true when the fetch failed fatally.
    pub fn is_fatal(&self) -> bool {
        self.kind == OutcomeKind::FatalFailure
    }

    /// Returns true when the fetch ran out of retries.
    pub fn is_exhausted(&self) -> bool {
        self.kind == OutcomeKind::RetryableFailure
    }

    /// Extract the error, discarding metadata.
    pub fn into_error(self) -> E {
        self.error
    }
}

impl<E: std::fmt::Display> std::fmt::Display for PageFailure<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "page {} failed after {} attempts ({}): {}",
            self.page,
            self.attempts.len(),
            self.kind,
            self.error
        )
    }
}

impl<E: std::error::Error + 'static> std::error::Error for PageFailure<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

struct PageState<'r, T, C, K, F> {
    retrier: &'r Retrier<K>,
    fetch: F,
    cursor: Option<PageCursor<C>>,
    buffer: VecDeque<T>,
    page: u32,
}

/// Stream every item of a paginated source.
///
/// `fetch` is called with the cursor of the page to load and must produce a
/// fresh future on each call, since failed fetches are retried.
pub fn paginate<'r, T, E, C, K, F, Fut>(
    retrier: &'r Retrier<K>,
    fetch: F,
) -> impl Stream<Item = Result<T, PageFailure<E>>> + 'r
where
    T: 'r,
    E: 'r,
    C: 'r,
    K: Classifier<E> + 'r,
    F: Fn(&PageCursor<C>) -> Fut + 'r,
    Fut: Future<Output = Result<Page<T, C>, E>> + 'r,
{
    let state = PageState {
        retrier,
        fetch,
        cursor: Some(PageCursor::First),
        buffer: VecDeque::new(),
        page: 0,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.buffer.pop_front() {
                return Some((Ok(item), state));
            }

            let cursor = state.cursor.take()?;
            state.page += 1;

            let fetch = &state.fetch;
            let report = state.retrier.run(|| fetch(&cursor)).await;
            let (outcome, attempts) = report.into_parts();

            match outcome {
                Outcome::Success(Page { items, next }) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(
                        page = state.page,
                        items = items.len(),
                        has_more = next.is_some(),
                        "fetched page"
                    );
                    if !items.is_empty() {
                        state.cursor = next.map(PageCursor::Next);
                    }
                    state.buffer.extend(items);
                }
                failed => {
                    let kind = failed.kind();
                    let Some(error) = failed.into_error() else {
                        return None;
                    };
                    let failure = PageFailure {
                        page: state.page,
                        kind,
                        error,
                        attempts,
                    };
                    #[cfg(feature = "tracing")]
                    tracing::warn!(page = failure.page, kind = %failure.kind, "page fetch failed");
                    return Some((Err(failure), state));
                }
            }
        }
    })
}

/// Everything a pagination run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paginated<T, E> {
    /// Items received before the stream ended.
    pub items: Vec<T>,
    /// The failure that ended the stream early, if any.
    pub failure: Option<PageFailure<E>>,
}

impl<T, E> Paginated<T, E> {
    /// Returns true when every page was read.
    pub fn is_complete(&self) -> bool {
        self.failure.is_none()
    }

    /// `Ok(items)` when complete, otherwise the partial items and the failure.
    pub fn into_result(self) -> Result<Vec<T>, (Vec<T>, PageFailure<E>)> {
        match self.failure {
            None => Ok(self.items),
            Some(failure) => Err((self.items, failure)),
        }
    }
}

/// Drain a pagination stream, keeping partial results on failure.
///
/// # Example
///
/// ```rust
/// use tideline::{collect_pages, paginate, Page, PageCursor, Retrier, RetryNone, RetryPolicy};
/// use std::time::Duration;
///
/// # tokio_test::block_on(async {
/// let retrier = Retrier::new(RetryPolicy::new(3, Duration::from_millis(1)))
///     .unwrap()
///     .with_classifier(RetryNone);
///
/// let result = collect_pages(paginate(&retrier, |cursor: &PageCursor<u32>| {
///     let page = cursor.page_number(1);
///     async move {
///         match page {
///             1 => Ok(Page::numbered(vec!["a", "b"], page)),
///             _ => Err("403 Forbidden"),
///         }
///     }
/// }))
/// .await;
///
/// assert_eq!(result.items, vec!["a", "b"]);
/// assert_eq!(result.failure.unwrap().page, 2);
/// # });
/// ```
pub async fn collect_pages<T, E, S>(stream: S) -> Paginated<T, E>
where
    S: Stream<Item = Result<T, PageFailure<E>>>,
{
    let mut stream = pin!(stream);
    let mut items = Vec::new();
    let mut failure = None;

    while let Some(next) = stream.next().await {
        match next {
            Ok(item) => items.push(item),
            Err(e) => {
                failure = Some(e);
                break;
            }
        }
    }

    Paginated { items, failure }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::HttpStatusClassifier;
    use crate::retry::RetryPolicy;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn retrier() -> Retrier<HttpStatusClassifier> {
        Retrier::new(RetryPolicy::new(3, Duration::from_millis(1)))
            .unwrap()
            .with_classifier(HttpStatusClassifier::default())
    }

    #[test]
    fn test_cursor_helpers() {
        let first: PageCursor<u32> = PageCursor::First;
        assert!(first.is_first());
        assert_eq!(first.position(), None);
        assert_eq!(first.page_number(1), 1);

        let next = PageCursor::Next(4u32);
        assert_eq!(next.position(), Some(&4));
        assert_eq!(next.page_number(1), 4);
    }

    #[test]
    fn test_page_constructors() {
        let page: Page<i32, &str> = Page::new(vec![1], Some("abc"));
        assert!(page.has_more());
        assert!(!Page::<i32, &str>::last(vec![1]).has_more());
        assert_eq!(Page::numbered(vec![1], 7).next, Some(8));
        assert_eq!(Page::numbered(vec![1], u32::MAX).next, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_cursors_are_followed() {
        let retrier = retrier();
        let result = collect_pages(paginate(&retrier, |cursor: &PageCursor<String>| {
            let cursor = cursor.clone();
            async move {
                Ok::<_, u16>(match cursor.position().map(String::as_str) {
                    None => Page::new(vec![1, 2], Some("t2".to_string())),
                    Some("t2") => Page::new(vec![3], Some("t3".to_string())),
                    _ => Page::last(vec![4, 5]),
                })
            }
        }))
        .await;

        assert!(result.is_complete());
        assert_eq!(result.items, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_page_ends_even_if_more_claimed() {
        let calls = AtomicU32::new(0);
        let retrier = retrier();
        let result = collect_pages(paginate(&retrier, |cursor: &PageCursor<u32>| {
            calls.fetch_add(1, Ordering::SeqCst);
            let page = cursor.page_number(1);
            async move {
                let items = if page == 1 { vec!["x"] } else { vec![] };
                Ok::<_, u16>(Page::new(items, Some(page + 1)))
            }
        }))
        .await;

        assert_eq!(result.items, vec!["x"]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_page_failures_are_retried() {
        let calls = AtomicU32::new(0);
        let retrier = retrier();
        let result = collect_pages(paginate(&retrier, |cursor: &PageCursor<u32>| {
            let call = calls.fetch_add(1, Ordering::SeqCst);
            let page = cursor.page_number(1);
            async move {
                match (page, call) {
                    (2, 1) => Err(503u16),
                    (1, _) => Ok(Page::numbered(vec![1], page)),
                    (2, _) => Ok(Page::last(vec![2])),
                    _ => unreachable!("no third page"),
                }
            }
        }))
        .await;

        assert!(result.is_complete());
        assert_eq!(result.items, vec![1, 2]);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_failure_keeps_partial_results() {
        let retrier = retrier();
        let result = collect_pages(paginate(&retrier, |cursor: &PageCursor<u32>| {
            let page = cursor.page_number(1);
            async move {
                match page {
                    1 | 2 => Ok(Page::numbered(vec![page], page)),
                    _ => Err(404u16),
                }
            }
        }))
        .await;

        let (items, failure) = result.into_result().unwrap_err();
        assert_eq!(items, vec![1, 2]);
        assert_eq!(failure.page, 3);
        assert!(failure.is_fatal());
        assert_eq!(failure.attempts.len(), 1);
        assert_eq!(failure.into_error(), 404);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_end_stream() {
        let retrier = retrier();
        let result = collect_pages(paginate(&retrier, |_: &PageCursor<u32>| async {
            Err::<Page<u32, u32>, _>(429u16)
        }))
        .await;

        let failure = result.failure.unwrap();
        assert!(failure.is_exhausted());
        assert_eq!(failure.attempts.len(), 3);
        assert!(failure.to_string().contains("page 1 failed after 3 attempts"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pages_are_fetched_lazily() {
        let calls = AtomicU32::new(0);
        let retrier = retrier();
        let mut stream = pin!(paginate(&retrier, |cursor: &PageCursor<u32>| {
            calls.fetch_add(1, Ordering::SeqCst);
            let page = cursor.page_number(1);
            async move { Ok::<_, u16>(Page::numbered(vec![page * 10, page * 10 + 1], page)) }
        }));

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(stream.next().await, Some(Ok(10)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(stream.next().await, Some(Ok(11)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(stream.next().await, Some(Ok(20)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
