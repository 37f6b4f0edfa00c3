//! Failure classification strategies.
//!
//! A [`Classifier`] decides, per error, whether another attempt could
//! succeed. The retry engine consults it for every failed attempt and never
//! second-guesses the answer.

use crate::retry::TimeoutError;

/// Status codes treated as transient by [`HttpStatusClassifier::default`].
pub const DEFAULT_RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// Decides whether an error is worth another attempt.
///
/// Any `Fn(&E) -> bool` is a classifier:
///
/// ```rust
/// use tideline::Classifier;
///
/// #[derive(Debug)]
/// enum ApiError { RateLimited, Unauthorized }
///
/// let classifier = |e: &ApiError| matches!(e, ApiError::RateLimited);
/// assert!(classifier.is_retryable(&ApiError::RateLimited));
/// assert!(!classifier.is_retryable(&ApiError::Unauthorized));
/// ```
pub trait Classifier<E> {
    /// Returns true when `error` is transient.
    fn is_retryable(&self, error: &E) -> bool;
}

impl<E, F> Classifier<E> for F
where
    F: Fn(&E) -> bool,
{
    fn is_retryable(&self, error: &E) -> bool {
        self(error)
    }
}

/// Treats every error as transient.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryAll;

impl<E> Classifier<E> for RetryAll {
    fn is_retryable(&self, _error: &E) -> bool {
        true
    }
}

/// Treats every error as fatal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryNone;

impl<E> Classifier<E> for RetryNone {
    fn is_retryable(&self, _error: &E) -> bool {
        false
    }
}

/// An error produced by an HTTP exchange.
pub trait HttpFailure {
    /// The response status, or `None` when no response arrived
    /// (connection refused, reset, DNS failure, client-side timeout).
    fn status(&self) -> Option<u16>;
}

impl HttpFailure for u16 {
    fn status(&self) -> Option<u16> {
        Some(*self)
    }
}

impl HttpFailure for Option<u16> {
    fn status(&self) -> Option<u16> {
        *self
    }
}

/// Classifies HTTP failures by status code.
///
/// By default 429, 500, 502, 503 and 504 are retryable, transport failures
/// are retryable, and every other status is fatal.
///
/// # Examples
///
/// ```rust
/// use tideline::{Classifier, HttpStatusClassifier};
///
/// let classifier = HttpStatusClassifier::default();
/// assert!(classifier.is_retryable(&429u16));
/// assert!(classifier.is_retryable(&503u16));
/// assert!(!classifier.is_retryable(&404u16));
/// assert!(classifier.is_retryable(&None::<u16>)); // no response at all
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpStatusClassifier {
    retryable: Vec<u16>,
    retry_transport: bool,
}

impl Default for HttpStatusClassifier {
    fn default() -> Self {
        Self {
            retryable: DEFAULT_RETRYABLE_STATUSES.to_vec(),
            retry_transport: true,
        }
    }
}

impl HttpStatusClassifier {
    /// A classifier with no retryable statuses.
    pub fn empty() -> Self {
        Self {
            retryable: Vec::new(),
            retry_transport: true,
        }
    }

    /// Mark `status` as retryable.
    pub fn with_status(mut self, status: u16) -> Self {
        if !self.retryable.contains(&status) {
            self.retryable.push(status);
        }
        self
    }

    /// Mark `status` as fatal.
    pub fn without_status(mut self, status: u16) -> Self {
        self.retryable.retain(|s| *s != status);
        self
    }

    /// Choose whether failures without a response are retried.
    pub fn retry_transport_errors(mut self, retry: bool) -> Self {
        self.retry_transport = retry;
        self
    }

    /// Returns true when `status` is in the retryable set.
    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.retryable.contains(&status)
    }
}

impl<E: HttpFailure> Classifier<E> for HttpStatusClassifier {
    fn is_retryable(&self, error: &E) -> bool {
        match error.status() {
            Some(status) => self.is_retryable_status(status),
            None => self.retry_transport,
        }
    }
}

/// Wraps a classifier so elapsed deadlines count as transient.
///
/// Inner errors are delegated to the wrapped classifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeoutAware<C>(pub C);

impl<E, C: Classifier<E>> Classifier<TimeoutError<E>> for TimeoutAware<C> {
    fn is_retryable(&self, error: &TimeoutError<E>) -> bool {
        match error {
            TimeoutError::Timeout { .. } => true,
            TimeoutError::Inner(inner) => self.0.is_retryable(inner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_closure_classifier() {
        let classifier = |code: &u16| *code >= 500;
        assert!(classifier.is_retryable(&503));
        assert!(!classifier.is_retryable(&400));
    }

    #[test]
    fn test_retry_all_and_none() {
        assert!(Classifier::<&str>::is_retryable(&RetryAll, &"anything"));
        assert!(!Classifier::<&str>::is_retryable(&RetryNone, &"anything"));
    }

    #[test]
    fn test_http_default_statuses() {
        let classifier = HttpStatusClassifier::default();

        for status in DEFAULT_RETRYABLE_STATUSES {
            assert!(classifier.is_retryable(&status), "{} should retry", status);
        }
        for status in [400u16, 401, 403, 404, 409, 422, 501] {
            assert!(!classifier.is_retryable(&status), "{} should be fatal", status);
        }
    }

    #[test]
    fn test_http_custom_statuses() {
        let classifier = HttpStatusClassifier::default()
            .with_status(408)
            .with_status(408)
            .without_status(500)
            .retry_transport_errors(false);

        assert!(classifier.is_retryable(&408u16));
        assert!(!classifier.is_retryable(&500u16));
        assert!(!classifier.is_retryable(&None::<u16>));
        assert!(!HttpStatusClassifier::empty().is_retryable(&503u16));
    }

    #[test]
    fn test_timeout_aware() {
        let classifier = TimeoutAware(HttpStatusClassifier::default());

        assert!(classifier.is_retryable(&TimeoutError::<u16>::timeout(Duration::from_secs(1))));
        assert!(classifier.is_retryable(&TimeoutError::inner(502u16)));
        assert!(!classifier.is_retryable(&TimeoutError::inner(403u16)));
    }
}
