//! Attempt audit trail for one logical operation.

use std::time::Duration;

use crate::outcome::{Outcome, OutcomeKind};

/// What happened on one attempt.
///
/// Records are produced by the [`Retrier`](crate::Retrier) and handed to its
/// observer as they happen. They are kept only for the duration of one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AttemptRecord {
    /// Which attempt this was (1-indexed).
    pub attempt: u32,
    /// Delay waited before this attempt, jitter included.
    pub delay: Duration,
    /// How the attempt ended.
    pub kind: OutcomeKind,
    /// Time since the first attempt started, measured when this one ended.
    pub elapsed: Duration,
}

impl AttemptRecord {
    /// Create a record.
    pub fn new(attempt: u32, delay: Duration, kind: OutcomeKind, elapsed: Duration) -> Self {
        Self {
            attempt,
            delay,
            kind,
            elapsed,
        }
    }
}

/// Final outcome of a retried operation together with its attempt records.
///
/// # Examples
///
/// ```rust
/// use tideline::{Outcome, Retrier, RetryPolicy};
/// use std::time::Duration;
///
/// # tokio_test::block_on(async {
/// let retrier = Retrier::new(RetryPolicy::new(3, Duration::from_millis(1))).unwrap();
/// let report = retrier.run(|| async { Ok::<_, String>("pong") }).await;
///
/// assert_eq!(report.outcome(), &Outcome::Success("pong"));
/// assert_eq!(report.attempt_count(), 1);
/// assert_eq!(report.delays(), vec![Duration::ZERO]);
/// # });
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryReport<T, E> {
    outcome: Outcome<T, E>,
    attempts: Vec<AttemptRecord>,
    interrupted: Option<E>,
}

impl<T, E> RetryReport<T, E> {
    /// Create a report.
    pub fn new(outcome: Outcome<T, E>, attempts: Vec<AttemptRecord>) -> Self {
        Self {
            outcome,
            attempts,
            interrupted: None,
        }
    }

    /// Create a `Cancelled` report that keeps the error of the attempt
    /// cancellation interrupted, if any.
    pub fn cancelled(attempts: Vec<AttemptRecord>, last_error: Option<E>) -> Self {
        Self {
            outcome: Outcome::Cancelled,
            attempts,
            interrupted: last_error,
        }
    }

    /// The final outcome.
    pub fn outcome(&self) -> &Outcome<T, E> {
        &self.outcome
    }

    /// Every attempt made, in order.
    pub fn attempts(&self) -> &[AttemptRecord] {
        &self.attempts
    }

    /// Number of attempts actually made.
    pub fn attempt_count(&self) -> u32 {
        self.attempts.len() as u32
    }

    /// Delay waited before each attempt.
    pub fn delays(&self) -> Vec<Duration> {
        self.attempts.iter().map(|r| r.delay).collect()
    }

    /// Sum of all delays waited.
    pub fn total_delay(&self) -> Duration {
        self.attempts.iter().map(|r| r.delay).sum()
    }

    /// Time from the first attempt's start to the last attempt's end.
    pub fn elapsed(&self) -> Duration {
        self.attempts
            .last()
            .map(|r| r.elapsed)
            .unwrap_or(Duration::ZERO)
    }

    /// Error from the last attempt that failed.
    ///
    /// For failed outcomes this is the outcome's own error. A cancelled
    /// report still carries the retryable error that preceded the cancel.
    pub fn last_error(&self) -> Option<&E> {
        self.outcome.error().or(self.interrupted.as_ref())
    }

    /// Returns true when the final outcome is a success.
    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }

    /// Discard the records and keep the outcome.
    pub fn into_outcome(self) -> Outcome<T, E> {
        self.outcome
    }

    /// Split into outcome and records.
    ///
    /// The error kept by a cancelled report is dropped; read it with
    /// [`last_error`](Self::last_error) first.
    pub fn into_parts(self) -> (Outcome<T, E>, Vec<AttemptRecord>) {
        (self.outcome, self.attempts)
    }
}
