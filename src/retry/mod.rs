//! Retry with exponential backoff and jitter.
//!
//! This module keeps the "what" and the "how" apart:
//!
//! - **Policy**: [`RetryPolicy`] is just data (attempt budget, backoff
//!   growth, cap, jitter), easily tested and loaded from configuration
//! - **Classification**: a [`Classifier`](crate::Classifier) decides whether
//!   a failure is retryable or fatal
//! - **Execution**: [`Retrier`] runs an operation under both and returns a
//!   [`RetryReport`] with the final [`Outcome`](crate::Outcome) and the audit
//!   trail of [`AttemptRecord`]s
//!
//! # Quick Start
//!
//! ```rust
//! use tideline::{Outcome, Retrier, RetryPolicy};
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let policy = RetryPolicy::new(3, Duration::from_millis(10))
//!     .with_max_delay(Duration::from_millis(50))
//!     .with_jitter(0.1);
//!
//! let retrier = Retrier::new(policy).unwrap();
//! let report = retrier.run(|| async { Ok::<_, String>(42) }).await;
//!
//! assert_eq!(report.into_outcome(), Outcome::Success(42));
//! # });
//! ```
//!
//! # Backoff
//!
//! Attempt 1 runs immediately. The delay before attempt `k` is
//! `min(max_delay, base_delay * backoff_multiplier^(k-2))`, plus a uniformly
//! random jitter in `[0, delay * jitter_fraction]`. The sleep suspends only
//! the calling task.
//!
//! # Error Types
//!
//! - [`PolicyError`]: Returned when a policy breaks one of its bounds
//! - [`TimeoutError`]: Returned when an attempt runs past its deadline

mod error;
mod executor;
mod policy;
mod record;

pub use error::{PolicyError, TimeoutError};
pub use executor::{with_timeout, Retrier};
pub use policy::{RetryPolicy, DEFAULT_BACKOFF_MULTIPLIER, DEFAULT_MAX_DELAY};
pub use record::{AttemptRecord, RetryReport};
