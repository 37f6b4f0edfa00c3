//! Error types for retry configuration and deadlines.

use std::time::Duration;

/// Error returned when a [`RetryPolicy`](crate::RetryPolicy) breaks one of its
/// bounds.
///
/// Raised by [`RetryPolicy::validate`](crate::RetryPolicy::validate) and by
/// [`Retrier::new`](crate::Retrier::new) before any attempt is made.
///
/// # Examples
///
/// ```rust
/// use tideline::{PolicyError, Retrier, RetryPolicy};
/// use std::time::Duration;
///
/// let err = Retrier::new(RetryPolicy::new(0, Duration::from_secs(1))).unwrap_err();
/// assert_eq!(err, PolicyError::ZeroAttempts);
/// assert!(err.to_string().contains("at least one attempt"));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum PolicyError {
    /// `max_attempts` was zero.
    ZeroAttempts,
    /// `base_delay` was zero.
    ZeroBaseDelay,
    /// `backoff_multiplier` was below 1.0 or not finite.
    InvalidMultiplier(f64),
    /// `max_delay` was smaller than `base_delay`.
    MaxDelayBelowBase {
        /// The configured base delay.
        base_delay: Duration,
        /// The configured cap.
        max_delay: Duration,
    },
    /// `jitter_fraction` was outside `[0.0, 1.0]`.
    InvalidJitter(f64),
    /// `attempt_timeout` was zero.
    ZeroAttemptTimeout,
}

impl std::fmt::Display for PolicyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ZeroAttempts => write!(f, "retry policy must allow at least one attempt"),
            Self::ZeroBaseDelay => write!(f, "retry policy base delay must be greater than zero"),
            Self::InvalidMultiplier(m) => {
                write!(f, "backoff multiplier must be a finite value >= 1.0, got {}", m)
            }
            Self::MaxDelayBelowBase {
                base_delay,
                max_delay,
            } => write!(
                f,
                "max delay {:?} is smaller than base delay {:?}",
                max_delay, base_delay
            ),
            Self::InvalidJitter(j) => {
                write!(f, "jitter fraction must be within [0.0, 1.0], got {}", j)
            }
            Self::ZeroAttemptTimeout => write!(f, "attempt timeout must be greater than zero"),
        }
    }
}

impl std::error::Error for PolicyError {}

/// Failure of one deadline-bounded attempt.
///
/// Produced by [`Retrier::run_timed`](crate::Retrier::run_timed) and
/// [`with_timeout`](crate::with_timeout). An elapsed deadline is always
/// retryable; the request's own errors go through the retrier's classifier.
///
/// # Examples
///
/// ```rust
/// use tideline::{HttpStatusClassifier, Retrier, RetryPolicy};
/// use std::time::Duration;
///
/// # tokio_test::block_on(async {
/// let policy = RetryPolicy::new(2, Duration::from_millis(1))
///     .with_attempt_timeout(Duration::from_millis(10));
/// let retrier = Retrier::new(policy)
///     .unwrap()
///     .with_classifier(HttpStatusClassifier::default());
///
/// // The upstream never answers in time.
/// let report = retrier
///     .run_timed(|| async {
///         tokio::time::sleep(Duration::from_secs(5)).await;
///         Ok::<_, u16>("body")
///     })
///     .await;
///
/// assert_eq!(report.attempt_count(), 2);
/// let err = report.last_error().unwrap();
/// assert_eq!(err.deadline(), Some(Duration::from_millis(10)));
/// assert_eq!(err.to_string(), "attempt exceeded its 10ms deadline");
/// # });
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeoutError<E> {
    /// The attempt was still running when its deadline passed.
    Timeout {
        /// The deadline that elapsed.
        duration: Duration,
    },
    /// The attempt finished in time and failed on its own.
    Inner(E),
}

impl<E> TimeoutError<E> {
    /// An elapsed deadline of `duration`.
    pub fn timeout(duration: Duration) -> Self {
        Self::Timeout { duration }
    }

    /// A failure reported by the request itself.
    pub fn inner(error: E) -> Self {
        Self::Inner(error)
    }

    /// Returns true if the deadline elapsed.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// The deadline that elapsed, if this is a timeout.
    pub fn deadline(&self) -> Option<Duration> {
        match self {
            Self::Timeout { duration } => Some(*duration),
            Self::Inner(_) => None,
        }
    }

    /// The request's own error, if it got that far.
    pub fn as_inner(&self) -> Option<&E> {
        match self {
            Self::Inner(e) => Some(e),
            Self::Timeout { .. } => None,
        }
    }

    /// Take the request's own error.
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Inner(e) => Some(e),
            Self::Timeout { .. } => None,
        }
    }

    /// Convert the request's error, keeping timeouts as they are.
    pub fn map_inner<E2, F>(self, f: F) -> TimeoutError<E2>
    where
        F: FnOnce(E) -> E2,
    {
        match self {
            Self::Inner(e) => TimeoutError::Inner(f(e)),
            Self::Timeout { duration } => TimeoutError::Timeout { duration },
        }
    }
}

impl<E: std::fmt::Display> std::fmt::Display for TimeoutError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout { duration } => write!(f, "attempt exceeded its {:?} deadline", duration),
            Self::Inner(e) => write!(f, "{}", e),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for TimeoutError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Timeout { .. } => None,
            Self::Inner(e) => Some(e),
        }
    }
}

#[cfg(test)]
mod error_tests {
    use super::*;
    use crate::classify::{Classifier, HttpStatusClassifier, TimeoutAware};
    use crate::outcome::Outcome;
    use crate::retry::{Retrier, RetryPolicy};

    #[test]
    fn test_policy_error_display() {
        let err = PolicyError::MaxDelayBelowBase {
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(1),
        };
        let display = err.to_string();
        assert!(display.contains("max delay 1s"));
        assert!(display.contains("base delay 2s"));

        assert!(PolicyError::InvalidJitter(1.5).to_string().contains("1.5"));
    }

    fn timed_retrier(max_attempts: u32) -> Retrier<HttpStatusClassifier> {
        let policy = RetryPolicy::new(max_attempts, Duration::from_millis(5))
            .with_attempt_timeout(Duration::from_millis(20));
        Retrier::new(policy)
            .unwrap()
            .with_classifier(HttpStatusClassifier::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_attempts_exhaust_as_timeouts() {
        let report = timed_retrier(3)
            .run_timed(|| async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok::<_, u16>(())
            })
            .await;

        assert!(report.outcome().is_retryable());
        assert_eq!(report.attempt_count(), 3);
        let err = report.last_error().unwrap();
        assert!(err.is_timeout());
        assert_eq!(err.deadline(), Some(Duration::from_millis(20)));
        assert_eq!(err.as_inner(), None);
        assert_eq!(err.to_string(), "attempt exceeded its 20ms deadline");
    }

    #[tokio::test(start_paused = true)]
    async fn test_fast_rejection_keeps_the_status() {
        let report = timed_retrier(3)
            .run_timed(|| async { Err::<(), _>(404u16) })
            .await;

        assert_eq!(report.attempt_count(), 1);
        let err = report.into_outcome().into_error().unwrap();
        assert!(!err.is_timeout());
        assert_eq!(err.deadline(), None);
        assert_eq!(err.to_string(), "404");
        assert_eq!(err.map_inner(|status| status / 100).into_inner(), Some(4));
    }

    #[test]
    fn test_timeout_aware_retries_deadlines_only_for_transient_statuses() {
        let classifier = TimeoutAware(HttpStatusClassifier::default());
        let elapsed = TimeoutError::<u16>::timeout(Duration::from_millis(20));

        assert!(classifier.is_retryable(&elapsed));
        assert!(classifier.is_retryable(&TimeoutError::inner(429u16)));
        assert!(!classifier.is_retryable(&TimeoutError::inner(401u16)));
        assert_eq!(
            elapsed.map_inner(|status| status.to_string()),
            TimeoutError::Timeout {
                duration: Duration::from_millis(20)
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_outcome_carries_timeout_error_through_run_timed() {
        let report = timed_retrier(1)
            .run_timed(|| async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok::<_, u16>("late")
            })
            .await;

        assert_eq!(
            report.into_outcome(),
            Outcome::RetryableFailure(TimeoutError::timeout(Duration::from_millis(20)))
        );
    }
}
