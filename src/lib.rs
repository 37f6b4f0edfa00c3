//! # Tideline
//!
//! > *"Every wave recedes before the next one lands"*
//!
//! A resilient request core for talking to flaky HTTP-style upstreams.
//!
//! ## Philosophy
//!
//! **Tideline** keeps decisions and execution apart:
//! - **Policy** = Pure data (attempt budget, backoff growth, cap, jitter)
//! - **Classifier** = A predicate deciding retryable versus fatal
//! - **Engine** = The async loop that sleeps, retries, fans out, and pages
//!
//! The engine never looks at transport details. Whatever performs the request
//! is a plain async closure; the engine only sees its `Result` or [`Outcome`].
//!
//! ## Quick Example
//!
//! ```rust
//! use tideline::{HttpStatusClassifier, Outcome, Retrier, RetryPolicy};
//! use std::sync::atomic::{AtomicU32, Ordering};
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let calls = AtomicU32::new(0);
//! let retrier = Retrier::new(RetryPolicy::new(4, Duration::from_millis(5)))
//!     .unwrap()
//!     .with_classifier(HttpStatusClassifier::default());
//!
//! // 503 twice, then a body
//! let report = retrier
//!     .run(|| async {
//!         match calls.fetch_add(1, Ordering::SeqCst) {
//!             0 | 1 => Err(503u16),
//!             _ => Ok("payload"),
//!         }
//!     })
//!     .await;
//!
//! assert_eq!(report.attempt_count(), 3);
//! assert_eq!(report.into_outcome(), Outcome::Success("payload"));
//! # });
//! ```
//!
//! ## Modules
//!
//! - [`retry`]: backoff schedule, retry loop, attempt records
//! - [`classify`]: retryable/fatal predicates, HTTP status defaults
//! - [`fanout`]: bounded parallel batches with per-item outcomes
//! - [`paginate`]: lazy cursor-driven page streams
//! - [`cancel`]: cooperative cancellation shared by all of the above
//! - [`testing`]: scripted operations and assertion macros

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod cancel;
pub mod classify;
pub mod fanout;
pub mod outcome;
pub mod paginate;
pub mod retry;
pub mod testing;

// Re-exports
pub use cancel::{cancel_pair, CancelHandle, CancelSignal};
pub use classify::{
    Classifier, HttpFailure, HttpStatusClassifier, RetryAll, RetryNone, TimeoutAware,
    DEFAULT_RETRYABLE_STATUSES,
};
pub use fanout::{BatchError, BatchReport, BatchRequest};
pub use outcome::{Outcome, OutcomeKind};
pub use paginate::{collect_pages, paginate, Page, PageCursor, PageFailure, Paginated};
pub use retry::{
    with_timeout, AttemptRecord, PolicyError, Retrier, RetryPolicy, RetryReport, TimeoutError,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancel::{cancel_pair, CancelHandle, CancelSignal};
    pub use crate::classify::{Classifier, HttpStatusClassifier, RetryAll, RetryNone};
    pub use crate::fanout::{BatchReport, BatchRequest};
    pub use crate::outcome::{Outcome, OutcomeKind};
    pub use crate::paginate::{collect_pages, paginate, Page, PageCursor};
    pub use crate::retry::{AttemptRecord, Retrier, RetryPolicy, RetryReport};
}
