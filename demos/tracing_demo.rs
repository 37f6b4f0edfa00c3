//! Demonstrates the structured events emitted by the retry engine
//!
//! Run with: cargo run --example tracing_demo --features tracing

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tideline::prelude::*;

#[tokio::main]
async fn main() {
    // Set up tracing subscriber
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    tracing::info!("Starting tracing demo");

    let retrier = Retrier::new(RetryPolicy::new(4, Duration::from_millis(50)).with_jitter(0.2))
        .expect("valid policy")
        .with_classifier(HttpStatusClassifier::default());

    // Two 503s, then a body
    let calls = AtomicU32::new(0);
    let report = retrier
        .run(|| async {
            match calls.fetch_add(1, Ordering::SeqCst) {
                0 | 1 => Err(503u16),
                _ => Ok("payload"),
            }
        })
        .await;
    tracing::info!(attempts = report.attempt_count(), "flaky request done");

    // A 403 is fatal on the first attempt
    let _ = retrier.run(|| async { Err::<(), _>(403u16) }).await;

    // Fan-out emits a summary when the batch finishes
    tracing::info!("Running batch");
    let report = BatchRequest::new((0..6u16).collect(), 3)
        .expect("non-zero limit")
        .run_with_retry(&retrier, |n: &u16| {
            let n = *n;
            async move { if n == 4 { Err(500u16) } else { Ok(n) } }
        })
        .await;
    tracing::info!(succeeded = report.success_count(), "batch result");

    // Pagination logs every page it fetches
    let pages = collect_pages(paginate(&retrier, |cursor: &PageCursor<u32>| {
        let page = cursor.page_number(1);
        async move {
            let items = if page <= 2 { vec![page; 3] } else { Vec::new() };
            Ok::<_, u16>(Page::numbered(items, page))
        }
    }))
    .await;
    tracing::info!(items = pages.items.len(), "listing complete");
}
