//! Batch Fetch Example
//!
//! Lists every record of a paginated endpoint, then fetches record details
//! in parallel with a bounded worker pool. Both stages retry transient
//! failures and keep partial results when something fails for good.
//!
//! Run with: cargo run --example batch_fetch

use std::collections::HashSet;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use futures::StreamExt;
use tideline::prelude::*;

// ==================== Simulated API ====================

#[derive(Debug, Clone)]
struct Record {
    id: u32,
    title: String,
}

/// Serves a listing of `total` ids, `per_page` per page, and a detail
/// endpoint that fails transiently once for some ids and fatally for others.
struct MockApi {
    total: u32,
    per_page: u32,
    flaky: Mutex<HashSet<u32>>,
    missing: HashSet<u32>,
}

impl MockApi {
    fn new() -> Self {
        Self {
            total: 23,
            per_page: 5,
            flaky: Mutex::new([3, 8, 14].into_iter().collect()),
            missing: [11, 19].into_iter().collect(),
        }
    }

    async fn list(&self, page: u32) -> Result<Page<u32, u32>, u16> {
        tokio::time::sleep(Duration::from_millis(20)).await;
        let start = page * self.per_page;
        let end = (start + self.per_page).min(self.total);
        let ids: Vec<u32> = (start..end).collect();
        println!("  GET /records?page={} -> {} ids", page, ids.len());
        Ok(Page::numbered(ids, page))
    }

    async fn detail(&self, id: u32) -> Result<Record, u16> {
        tokio::time::sleep(Duration::from_millis(50 + u64::from(id % 4) * 25)).await;
        if self.missing.contains(&id) {
            return Err(404);
        }
        if self.flaky.lock().unwrap().remove(&id) {
            return Err(503);
        }
        Ok(Record {
            id,
            title: format!("record-{:03}", id),
        })
    }
}

fn retrier() -> Retrier<HttpStatusClassifier> {
    let policy = RetryPolicy::new(3, Duration::from_millis(40))
        .with_max_delay(Duration::from_millis(200))
        .with_jitter(0.25);
    Retrier::new(policy)
        .expect("valid policy")
        .with_classifier(HttpStatusClassifier::default())
}

// ==================== Pagination ====================

/// Example 1: Collect every id from a numbered listing
async fn list_all_ids(api: &MockApi) -> Vec<u32> {
    println!("\n=== Example 1: Paginated Listing ===");

    let retrier = retrier();
    let result = collect_pages(paginate(&retrier, |cursor: &PageCursor<u32>| {
        api.list(cursor.page_number(0))
    }))
    .await;

    println!("Listed {} ids (complete: {})", result.items.len(), result.is_complete());
    result.items
}

/// Example 2: Stop early; later pages are never requested
async fn peek_first_ids(api: &MockApi) {
    println!("\n=== Example 2: Lazy Pages ===");

    let retrier = retrier();
    let first: Vec<u32> = paginate(&retrier, |cursor: &PageCursor<u32>| {
        api.list(cursor.page_number(0))
    })
    .filter_map(|item| async move { item.ok() })
    .take(7)
    .collect()
    .await;

    println!("First seven ids: {:?}", first);
}

// ==================== Fan-out ====================

/// Example 3: Fetch details with at most 4 requests in flight
async fn fetch_details(api: &MockApi, ids: Vec<u32>) {
    println!("\n=== Example 3: Bounded Fan-out ===");

    let retrier = retrier();
    let batch = BatchRequest::new(ids, 4)
        .expect("non-zero limit")
        .with_timeout(Duration::from_secs(5));

    let start = Instant::now();
    let report = batch
        .run_with_retry(&retrier, |id: &u32| api.detail(*id))
        .await;

    println!(
        "{} ok, {} fatal, {} exhausted, {} cancelled in {:?}",
        report.success_count(),
        report.fatal_count(),
        report.retryable_count(),
        report.cancelled_count(),
        start.elapsed()
    );
    for (index, record) in report.successes().take(3) {
        println!("  #{} -> {} ({})", index, record.title, record.id);
    }
    for (index, status) in report.failures() {
        println!("  #{} failed with HTTP {}", index, status);
    }
}

/// Example 4: A tight batch deadline leaves the tail cancelled
async fn fetch_with_deadline(api: &MockApi, ids: Vec<u32>) {
    println!("\n=== Example 4: Batch Deadline ===");

    let retrier = retrier();
    let report = BatchRequest::new(ids, 2)
        .expect("non-zero limit")
        .with_timeout(Duration::from_millis(150))
        .run_with_retry(&retrier, |id: &u32| api.detail(*id))
        .await;

    println!(
        "{} finished before the deadline, {} cancelled",
        report.len() - report.cancelled_count(),
        report.cancelled_count()
    );
}

#[tokio::main]
async fn main() {
    println!("======================================");
    println!("         Batch Fetch Example          ");
    println!("======================================");

    let api = MockApi::new();

    let ids = list_all_ids(&api).await;
    peek_first_ids(&api).await;
    fetch_details(&api, ids.clone()).await;
    fetch_with_deadline(&api, ids).await;

    println!("\n======================================");
    println!("           Examples Complete           ");
    println!("======================================");
}
