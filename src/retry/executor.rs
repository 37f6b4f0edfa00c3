//! The retry/backoff engine.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::cancel::CancelSignal;
use crate::classify::{Classifier, RetryAll};
use crate::outcome::Outcome;
use crate::retry::{AttemptRecord, PolicyError, RetryPolicy, RetryReport, TimeoutError};

type Observer = Arc<dyn Fn(&AttemptRecord) + Send + Sync>;

/// Runs operations under a [`RetryPolicy`], classifying failures with `C`.
///
/// The retrier is the explicit configuration object callers construct once
/// and pass around; it holds no connection or client state of its own.
///
/// # Examples
///
/// ```rust
/// use tideline::{HttpStatusClassifier, Outcome, Retrier, RetryPolicy};
/// use std::sync::atomic::{AtomicU32, Ordering};
/// use std::time::Duration;
///
/// # tokio_test::block_on(async {
/// let retrier = Retrier::new(RetryPolicy::new(5, Duration::from_millis(1)))
///     .unwrap()
///     .with_classifier(HttpStatusClassifier::default());
///
/// let calls = AtomicU32::new(0);
/// let report = retrier
///     .run(|| async {
///         match calls.fetch_add(1, Ordering::SeqCst) {
///             0 | 1 => Err(503u16),
///             _ => Ok("payload"),
///         }
///     })
///     .await;
///
/// assert_eq!(report.outcome(), &Outcome::Success("payload"));
/// assert_eq!(report.attempt_count(), 3);
/// # });
/// ```
pub struct Retrier<C = RetryAll> {
    policy: RetryPolicy,
    classifier: C,
    observer: Option<Observer>,
}

impl Retrier<RetryAll> {
    /// Validate `policy` and build a retrier that treats every error as
    /// transient.
    ///
    /// Fails before any attempt is made when the policy breaks a bound.
    pub fn new(policy: RetryPolicy) -> Result<Self, PolicyError> {
        policy.validate()?;
        Ok(Self {
            policy,
            classifier: RetryAll,
            observer: None,
        })
    }
}

impl<C> Retrier<C> {
    /// Replace the classifier.
    pub fn with_classifier<C2>(self, classifier: C2) -> Retrier<C2> {
        Retrier {
            policy: self.policy,
            classifier,
            observer: self.observer,
        }
    }

    /// Call `observer` with every attempt record as soon as the attempt ends.
    pub fn with_observer<F>(mut self, observer: F) -> Self
    where
        F: Fn(&AttemptRecord) + Send + Sync + 'static,
    {
        self.observer = Some(Arc::new(observer));
        self
    }

    /// The policy this retrier runs.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// The classifier this retrier consults.
    pub fn classifier(&self) -> &C {
        &self.classifier
    }

    /// Retry an operation whose failures are classified by this retrier.
    ///
    /// `op` is called once per attempt and must produce a fresh future each
    /// time. Exhausting the budget returns the last retryable failure
    /// unchanged; a fatal failure returns at once.
    pub async fn run<T, E, F, Fut>(&self, mut op: F) -> RetryReport<T, E>
    where
        C: Classifier<E>,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.drive(|| classify(&self.classifier, op()), None).await
    }

    /// Retry an operation that classifies its own failures.
    pub async fn run_outcome<T, E, F, Fut>(&self, op: F) -> RetryReport<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Outcome<T, E>>,
    {
        self.drive(op, None).await
    }

    /// Like [`run`](Self::run), but stops starting new attempts once `cancel`
    /// is raised.
    ///
    /// An attempt already in progress is allowed to finish. A backoff sleep in
    /// progress is cut short. When the retry loop is stopped this way the
    /// report's outcome is [`Outcome::Cancelled`] and its records still show
    /// every attempt that ran.
    pub async fn run_until_cancelled<T, E, F, Fut>(
        &self,
        mut op: F,
        cancel: &CancelSignal,
    ) -> RetryReport<T, E>
    where
        C: Classifier<E>,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.drive(|| classify(&self.classifier, op()), Some(cancel))
            .await
    }

    /// Like [`run`](Self::run), bounding each attempt by the policy's
    /// `attempt_timeout`.
    ///
    /// Elapsed deadlines are always retryable; inner errors go through the
    /// classifier. Without an `attempt_timeout` this behaves like `run`.
    pub async fn run_timed<T, E, F, Fut>(&self, mut op: F) -> RetryReport<T, TimeoutError<E>>
    where
        C: Classifier<E>,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let deadline = self.policy.attempt_timeout();
        self.drive(
            || {
                let attempt = op();
                async move {
                    let result = match deadline {
                        Some(duration) => with_timeout(duration, attempt).await,
                        None => attempt.await.map_err(TimeoutError::Inner),
                    };
                    match result {
                        Ok(value) => Outcome::Success(value),
                        Err(TimeoutError::Inner(e)) if !self.classifier.is_retryable(&e) => {
                            Outcome::FatalFailure(TimeoutError::Inner(e))
                        }
                        Err(e) => Outcome::RetryableFailure(e),
                    }
                }
            },
            None,
        )
        .await
    }

    async fn drive<T, E, F, Fut>(
        &self,
        mut op: F,
        cancel: Option<&CancelSignal>,
    ) -> RetryReport<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Outcome<T, E>>,
    {
        let max_attempts = self.policy.max_attempts();
        let start = Instant::now();
        let mut records = Vec::with_capacity(max_attempts.min(16) as usize);
        let mut attempt = 1u32;
        let mut delay = Duration::ZERO;
        let mut last_error = None;

        loop {
            if cancel.is_some_and(|c| c.is_cancelled()) {
                #[cfg(feature = "tracing")]
                tracing::debug!(attempt, "retry loop cancelled before attempt");
                return RetryReport::cancelled(records, last_error);
            }

            let outcome = op().await;
            let record = AttemptRecord::new(attempt, delay, outcome.kind(), start.elapsed());
            if let Some(observer) = &self.observer {
                observer(&record);
            }
            records.push(record);

            #[cfg(feature = "tracing")]
            tracing::debug!(
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                outcome = %record.kind,
                "attempt finished"
            );

            match outcome {
                Outcome::RetryableFailure(error) if attempt < max_attempts => {
                    last_error = Some(error);
                }
                Outcome::RetryableFailure(error) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(attempts = attempt, "retry budget exhausted");
                    return RetryReport::new(Outcome::RetryableFailure(error), records);
                }
                Outcome::FatalFailure(error) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(attempts = attempt, "fatal failure, not retrying");
                    return RetryReport::new(Outcome::FatalFailure(error), records);
                }
                Outcome::Cancelled => return RetryReport::cancelled(records, last_error),
                done => return RetryReport::new(done, records),
            }

            attempt += 1;
            delay = self.policy.jittered(self.policy.delay_before(attempt));
            match cancel {
                Some(signal) => {
                    if !signal.sleep(delay).await {
                        #[cfg(feature = "tracing")]
                        tracing::debug!(attempt, "backoff interrupted by cancellation");
                        return RetryReport::cancelled(records, last_error);
                    }
                }
                None => tokio::time::sleep(delay).await,
            }
        }
    }
}

impl<C: Clone> Clone for Retrier<C> {
    fn clone(&self) -> Self {
        Self {
            policy: self.policy.clone(),
            classifier: self.classifier.clone(),
            observer: self.observer.clone(),
        }
    }
}

impl<C: std::fmt::Debug> std::fmt::Debug for Retrier<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retrier")
            .field("policy", &self.policy)
            .field("classifier", &self.classifier)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

async fn classify<T, E, C, Fut>(classifier: &C, attempt: Fut) -> Outcome<T, E>
where
    C: Classifier<E>,
    Fut: Future<Output = Result<T, E>>,
{
    match attempt.await {
        Ok(value) => Outcome::Success(value),
        Err(error) if classifier.is_retryable(&error) => Outcome::RetryableFailure(error),
        Err(error) => Outcome::FatalFailure(error),
    }
}

/// Bound a future by a deadline.
///
/// If the future doesn't complete within `duration`, it fails with
/// [`TimeoutError::Timeout`]; its own errors come back as
/// [`TimeoutError::Inner`].
pub async fn with_timeout<T, E, Fut>(duration: Duration, fut: Fut) -> Result<T, TimeoutError<E>>
where
    Fut: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(duration, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(TimeoutError::Inner(e)),
        Err(_) => Err(TimeoutError::Timeout { duration }),
    }
}
