//! Retry policy types and configuration.

use std::time::Duration;

use rand::Rng;

use super::error::PolicyError;

/// Default cap on the growth of backoff delays.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Default factor applied to the delay after each failed attempt.
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// A retry policy describing how to retry failed operations.
///
/// Policies are pure data - they describe retry behavior but don't execute it.
/// This makes them easy to test, clone, and load from configuration. The
/// [`Retrier`](crate::Retrier) pairs a policy with a classifier and runs it.
///
/// The delay before attempt `k` (for `k > 1`) is
/// `min(max_delay, base_delay * backoff_multiplier^(k-2))`, and a random
/// jitter in `[0, delay * jitter_fraction]` is added on top of it.
///
/// # Examples
///
/// ```rust
/// use tideline::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::new(4, Duration::from_millis(100))
///     .with_max_delay(Duration::from_millis(300));
///
/// assert_eq!(policy.delay_before(1), Duration::ZERO);
/// assert_eq!(policy.delay_before(2), Duration::from_millis(100));
/// assert_eq!(policy.delay_before(3), Duration::from_millis(200));
/// assert_eq!(policy.delay_before(4), Duration::from_millis(300)); // capped
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    backoff_multiplier: f64,
    max_delay: Duration,
    jitter_fraction: f64,
    attempt_timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    /// Three attempts, 1s base delay doubling up to 30s, no jitter.
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}

impl RetryPolicy {
    /// Create a policy with `max_attempts` total attempts and exponential
    /// backoff starting at `base_delay`.
    ///
    /// The multiplier defaults to 2.0, the cap to 30s (or `base_delay` when
    /// that is larger) and jitter is disabled.
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            max_delay: DEFAULT_MAX_DELAY.max(base_delay),
            jitter_fraction: 0.0,
            attempt_timeout: None,
        }
    }

    /// Preset for calls to rate-limited HTTP APIs.
    ///
    /// Five attempts, 1s base delay doubling up to 30s, up to 50% additive
    /// jitter and a 30s deadline per attempt.
    ///
    /// ```rust
    /// use tideline::RetryPolicy;
    ///
    /// let policy = RetryPolicy::http_default();
    /// assert_eq!(policy.max_attempts(), 5);
    /// assert!(policy.validate().is_ok());
    /// ```
    pub fn http_default() -> Self {
        Self::new(5, Duration::from_secs(1))
            .with_jitter(0.5)
            .with_attempt_timeout(Duration::from_secs(30))
    }

    /// Set the total number of attempts, including the first one.
    pub fn with_max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n;
        self
    }

    /// Set the delay before the second attempt.
    pub fn with_base_delay(mut self, d: Duration) -> Self {
        self.base_delay = d;
        self
    }

    /// Set the growth factor applied to the delay after each failure.
    ///
    /// A multiplier of 1.0 gives a constant delay.
    ///
    /// ```rust
    /// use tideline::RetryPolicy;
    /// use std::time::Duration;
    ///
    /// let policy = RetryPolicy::new(4, Duration::from_millis(500))
    ///     .with_backoff_multiplier(1.0);
    ///
    /// assert_eq!(policy.delay_before(2), Duration::from_millis(500));
    /// assert_eq!(policy.delay_before(4), Duration::from_millis(500));
    /// ```
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Set the maximum delay cap.
    ///
    /// Un-jittered delays never exceed this value.
    pub fn with_max_delay(mut self, d: Duration) -> Self {
        self.max_delay = d;
        self
    }

    /// Add up to `fraction * delay` of random extra wait before each retry.
    ///
    /// The fraction must lie in `[0.0, 1.0]`; anything else is rejected by
    /// [`validate`](Self::validate).
    pub fn with_jitter(mut self, fraction: f64) -> Self {
        self.jitter_fraction = fraction;
        self
    }

    /// Disable jitter.
    pub fn without_jitter(mut self) -> Self {
        self.jitter_fraction = 0.0;
        self
    }

    /// Bound each individual attempt by a deadline.
    ///
    /// Only honored by [`Retrier::run_timed`](crate::Retrier::run_timed).
    pub fn with_attempt_timeout(mut self, d: Duration) -> Self {
        self.attempt_timeout = Some(d);
        self
    }

    /// Get the total number of attempts.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Get the delay before the second attempt.
    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Get the backoff growth factor.
    pub fn backoff_multiplier(&self) -> f64 {
        self.backoff_multiplier
    }

    /// Get the maximum delay cap.
    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Get the jitter fraction.
    pub fn jitter_fraction(&self) -> f64 {
        self.jitter_fraction
    }

    /// Get the per-attempt deadline.
    pub fn attempt_timeout(&self) -> Option<Duration> {
        self.attempt_timeout
    }

    /// Check every bound of the policy.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use tideline::{PolicyError, RetryPolicy};
    /// use std::time::Duration;
    ///
    /// let policy = RetryPolicy::new(0, Duration::from_millis(100));
    /// assert_eq!(policy.validate(), Err(PolicyError::ZeroAttempts));
    /// ```
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.max_attempts == 0 {
            return Err(PolicyError::ZeroAttempts);
        }
        if self.base_delay.is_zero() {
            return Err(PolicyError::ZeroBaseDelay);
        }
        if !(self.backoff_multiplier >= 1.0 && self.backoff_multiplier.is_finite()) {
            return Err(PolicyError::InvalidMultiplier(self.backoff_multiplier));
        }
        if self.max_delay < self.base_delay {
            return Err(PolicyError::MaxDelayBelowBase {
                base_delay: self.base_delay,
                max_delay: self.max_delay,
            });
        }
        if !(0.0..=1.0).contains(&self.jitter_fraction) {
            return Err(PolicyError::InvalidJitter(self.jitter_fraction));
        }
        if self.attempt_timeout.is_some_and(|t| t.is_zero()) {
            return Err(PolicyError::ZeroAttemptTimeout);
        }
        Ok(())
    }

    /// Calculate the un-jittered delay before attempt `attempt` (1-based).
    ///
    /// The first attempt always runs immediately.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        scale(self.base_delay, self.backoff_multiplier, attempt - 2).min(self.max_delay)
    }

    /// Un-jittered delays before each attempt, first attempt included.
    ///
    /// ```rust
    /// use tideline::RetryPolicy;
    /// use std::time::Duration;
    ///
    /// let policy = RetryPolicy::new(3, Duration::from_secs(1));
    /// assert_eq!(
    ///     policy.schedule(),
    ///     vec![Duration::ZERO, Duration::from_secs(1), Duration::from_secs(2)]
    /// );
    /// ```
    pub fn schedule(&self) -> Vec<Duration> {
        (1..=self.max_attempts)
            .map(|attempt| self.delay_before(attempt))
            .collect()
    }

    /// Largest jitter that may be added on top of `delay`.
    pub fn jitter_bound(&self, delay: Duration) -> Duration {
        if self.jitter_fraction <= 0.0 {
            return Duration::ZERO;
        }
        Duration::try_from_secs_f64(delay.as_secs_f64() * self.jitter_fraction)
            .unwrap_or(Duration::ZERO)
    }

    /// Add random jitter to `delay` using the thread-local generator.
    pub fn jittered(&self, delay: Duration) -> Duration {
        self.jittered_with(delay, &mut rand::rng())
    }

    /// Add random jitter to `delay` using the given generator.
    ///
    /// The result lies in `[delay, delay + jitter_bound(delay)]`.
    pub fn jittered_with<R: Rng + ?Sized>(&self, delay: Duration, rng: &mut R) -> Duration {
        let bound = self.jitter_bound(delay);
        if bound.is_zero() {
            return delay;
        }
        let bound_nanos = u64::try_from(bound.as_nanos()).unwrap_or(u64::MAX);
        let extra = rng.random_range(0..=bound_nanos);
        delay.saturating_add(Duration::from_nanos(extra))
    }
}

/// `base * multiplier^exponent`, saturating at `Duration::MAX`.
fn scale(base: Duration, multiplier: f64, exponent: u32) -> Duration {
    // Integral multipliers stay in integer arithmetic so 100ms * 2 is exact.
    if multiplier.fract() == 0.0 && multiplier >= 1.0 && multiplier <= f64::from(u32::MAX) {
        let factor = multiplier as u32;
        return factor
            .checked_pow(exponent)
            .and_then(|f| base.checked_mul(f))
            .unwrap_or(Duration::MAX);
    }

    let exponent = i32::try_from(exponent).unwrap_or(i32::MAX);
    Duration::try_from_secs_f64(base.as_secs_f64() * multiplier.powi(exponent))
        .unwrap_or(Duration::MAX)
}
