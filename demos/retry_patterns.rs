//! Retry Patterns Example
//!
//! Demonstrates the retry engine against a simulated flaky upstream.
//! Shows practical patterns including:
//! - Basic retry with exponential backoff
//! - Capped backoff and jitter
//! - Status-based classification (4xx fatal, 5xx and 429 retryable)
//! - Observing every attempt
//! - Per-attempt deadlines
//! - Cancelling a retry loop from another task

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tideline::prelude::*;
use tideline::HttpFailure;

// ==================== Simulated Upstream ====================

#[derive(Debug, Clone, PartialEq)]
enum HttpError {
    Status(u16),
    Disconnected,
}

impl HttpFailure for HttpError {
    fn status(&self) -> Option<u16> {
        match self {
            HttpError::Status(code) => Some(*code),
            HttpError::Disconnected => None,
        }
    }
}

impl std::fmt::Display for HttpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HttpError::Status(code) => write!(f, "HTTP {}", code),
            HttpError::Disconnected => write!(f, "connection reset"),
        }
    }
}

/// Replies with each scripted response in turn, then repeats the last one.
struct FlakyUpstream {
    script: Vec<Result<&'static str, HttpError>>,
    calls: AtomicU32,
}

impl FlakyUpstream {
    fn new(script: Vec<Result<&'static str, HttpError>>) -> Self {
        Self {
            script,
            calls: AtomicU32::new(0),
        }
    }

    async fn get(&self) -> Result<&'static str, HttpError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
        let reply = self.script[n.min(self.script.len() - 1)].clone();
        println!("  request #{} -> {:?}", n + 1, reply);
        reply
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

fn print_outcome<T: std::fmt::Debug, E: std::fmt::Display>(outcome: &Outcome<T, E>) {
    match outcome {
        Outcome::Success(value) => println!("Success: {:?}", value),
        Outcome::RetryableFailure(e) => println!("Gave up after retries: {}", e),
        Outcome::FatalFailure(e) => println!("Fatal, not retried: {}", e),
        Outcome::Cancelled => println!("Cancelled"),
    }
}

// ==================== Basic Retry ====================

/// Example 1: Basic retry with exponential backoff
async fn example_basic_retry() {
    println!("\n=== Example 1: Basic Retry ===");

    let upstream = FlakyUpstream::new(vec![
        Err(HttpError::Status(503)),
        Err(HttpError::Disconnected),
        Ok("{ \"status\": \"ok\" }"),
    ]);
    let retrier = Retrier::new(RetryPolicy::new(5, Duration::from_millis(100)))
        .expect("valid policy")
        .with_classifier(HttpStatusClassifier::default());

    let report = retrier.run(|| upstream.get()).await;

    print_outcome(report.outcome());
    println!(
        "Attempts: {}, time spent waiting: {:?}",
        report.attempt_count(),
        report.total_delay()
    );
}

// ==================== Backoff Schedules ====================

/// Example 2: What the backoff schedule looks like
fn example_backoff_schedule() {
    println!("\n=== Example 2: Backoff Schedule ===");

    let doubling = RetryPolicy::new(6, Duration::from_millis(100));
    println!("Doubling delays:      {:?}", doubling.schedule());

    let capped = doubling.clone().with_max_delay(Duration::from_millis(500));
    println!("Capped at 500ms:      {:?}", capped.schedule());

    let gentle = RetryPolicy::new(6, Duration::from_millis(100)).with_backoff_multiplier(1.5);
    println!("Multiplier 1.5:       {:?}", gentle.schedule());

    let jittered = capped.with_jitter(0.5);
    let samples: Vec<_> = jittered
        .schedule()
        .into_iter()
        .map(|d| jittered.jittered(d))
        .collect();
    println!("Capped + 50% jitter:  {:?}", samples);
}

// ==================== Classification ====================

/// Example 3: Client errors are returned at once
async fn example_fatal_client_error() {
    println!("\n=== Example 3: Client Errors Are Not Retried ===");

    let upstream = FlakyUpstream::new(vec![Err(HttpError::Status(429)), Err(HttpError::Status(401))]);
    let retrier = Retrier::new(RetryPolicy::new(5, Duration::from_millis(50)))
        .expect("valid policy")
        .with_classifier(HttpStatusClassifier::default());

    let report = retrier.run(|| upstream.get()).await;

    print_outcome(report.outcome());
    println!("Total requests: {}", upstream.calls());
}

/// Example 4: A custom classifier written as a closure
async fn example_custom_classifier() {
    println!("\n=== Example 4: Custom Classifier ===");

    // Treat 409 Conflict as transient for this endpoint
    let classifier = |e: &HttpError| matches!(e, HttpError::Status(409) | HttpError::Disconnected);
    let upstream = FlakyUpstream::new(vec![Err(HttpError::Status(409)), Ok("merged")]);
    let retrier = Retrier::new(RetryPolicy::new(3, Duration::from_millis(50)))
        .expect("valid policy")
        .with_classifier(classifier);

    let report = retrier.run(|| upstream.get()).await;
    print_outcome(report.outcome());
}

// ==================== Observability ====================

/// Example 5: Watching every attempt as it finishes
async fn example_observer() {
    println!("\n=== Example 5: Attempt Observer ===");

    let upstream = FlakyUpstream::new(vec![
        Err(HttpError::Status(502)),
        Err(HttpError::Status(502)),
        Err(HttpError::Status(502)),
    ]);
    let retrier = Retrier::new(RetryPolicy::new(3, Duration::from_millis(50)))
        .expect("valid policy")
        .with_classifier(HttpStatusClassifier::default())
        .with_observer(|record: &AttemptRecord| {
            println!(
                "  [observer] attempt {} waited {:?} -> {} (t+{:?})",
                record.attempt, record.delay, record.kind, record.elapsed
            );
        });

    let report = retrier.run(|| upstream.get()).await;
    print_outcome(report.outcome());
}

// ==================== Timeouts ====================

/// Example 6: Slow attempts are cut off and retried
///
/// Elapsed deadlines always count as transient.
async fn example_attempt_timeout() {
    println!("\n=== Example 6: Per-Attempt Timeout ===");

    let calls = AtomicU32::new(0);
    let policy = RetryPolicy::new(4, Duration::from_millis(50))
        .with_attempt_timeout(Duration::from_millis(200));
    let retrier = Retrier::new(policy)
        .expect("valid policy")
        .with_classifier(HttpStatusClassifier::default());

    let report = retrier
        .run_timed(|| async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            println!("  request #{}", n + 1);
            if n == 0 {
                // stalls past the deadline
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
            Ok::<_, HttpError>("fast enough")
        })
        .await;

    println!("{:?} after {} attempts", report.outcome(), report.attempt_count());
}

// ==================== Cancellation ====================

/// Example 7: Stopping a long retry loop from elsewhere
async fn example_cancellation() {
    println!("\n=== Example 7: Cancellation ===");

    let (handle, signal) = cancel_pair();
    let upstream = FlakyUpstream::new(vec![Err(HttpError::Status(503))]);
    let retrier = Retrier::new(RetryPolicy::new(10, Duration::from_millis(200)))
        .expect("valid policy")
        .with_classifier(HttpStatusClassifier::default());

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        println!("  shutting down");
        handle.cancel();
    });

    let report = retrier
        .run_until_cancelled(|| upstream.get(), &signal)
        .await;

    print_outcome(report.outcome());
    println!("Attempts before cancellation: {}", report.attempt_count());
}

#[tokio::main]
async fn main() {
    println!("======================================");
    println!("       Retry Patterns Example         ");
    println!("======================================");

    example_basic_retry().await;
    example_backoff_schedule();
    example_fatal_client_error().await;
    example_custom_classifier().await;
    example_observer().await;
    example_attempt_timeout().await;
    example_cancellation().await;

    println!("\n======================================");
    println!("           Examples Complete           ");
    println!("======================================");
}
