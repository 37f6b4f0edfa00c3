//! Bounded parallel fan-out over independent work items.
//!
//! This module runs a batch of items through a fixed-size worker pool:
//! - [`BatchRequest::run`] - each item produces an [`Outcome`] directly
//! - [`BatchRequest::run_with_retry`] - each item is retried by a [`Retrier`]
//!
//! Workers pull `(index, item)` pairs from a shared queue and finish one item
//! (including its retries) before taking the next, so no more than
//! `concurrency_limit` items are ever in flight. Items are isolated: a fatal
//! failure of one never touches its siblings. The [`BatchReport`] always holds
//! exactly one entry per submitted item, in input order.
//!
//! # Example
//!
//! ```rust
//! use tideline::{BatchRequest, Outcome};
//!
//! # tokio_test::block_on(async {
//! let batch = BatchRequest::new(vec![1, 2, 3, 4], 2).unwrap();
//!
//! let report = batch
//!     .run(|_index, n: &u32, _cancel| {
//!         let n = *n;
//!         async move {
//!             if n % 2 == 0 {
//!                 Outcome::Success(n * 10)
//!             } else {
//!                 Outcome::FatalFailure(format!("odd: {}", n))
//!             }
//!         }
//!     })
//!     .await;
//!
//! assert_eq!(report.len(), 4);
//! assert_eq!(report.success_count(), 2);
//! assert!(report.outcome(1).unwrap().is_success());
//! # });
//! ```

use std::future::Future;
use std::marker::PhantomData;
use std::pin::pin;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use futures::future::{self, Either};
use tokio::time::Instant;

use crate::cancel::{cancel_pair, CancelHandle, CancelSignal};
use crate::classify::Classifier;
use crate::outcome::Outcome;
use crate::retry::Retrier;

/// Error returned when a batch is configured with impossible bounds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchError {
    /// `concurrency_limit` was zero.
    ZeroConcurrency,
}

impl std::fmt::Display for BatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ZeroConcurrency => write!(f, "batch concurrency limit must be at least 1"),
        }
    }
}

impl std::error::Error for BatchError {}

/// Ordered work items plus the bounds they run under.
#[derive(Debug, Clone)]
pub struct BatchRequest<I> {
    items: Vec<I>,
    concurrency_limit: usize,
    timeout: Option<Duration>,
    cancel: Option<CancelSignal>,
}

impl<I> BatchRequest<I> {
    /// Create a batch running at most `concurrency_limit` items at once.
    pub fn new(items: Vec<I>, concurrency_limit: usize) -> Result<Self, BatchError> {
        if concurrency_limit == 0 {
            return Err(BatchError::ZeroConcurrency);
        }
        Ok(Self {
            items,
            concurrency_limit,
            timeout: None,
            cancel: None,
        })
    }

    /// Give the whole batch a wall-clock budget.
    ///
    /// When it runs out, cancellation is raised: attempts in progress finish,
    /// nothing new starts, and unfinished items are reported
    /// [`Outcome::Cancelled`].
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Stop the batch when `signal` is raised.
    pub fn with_cancel(mut self, signal: CancelSignal) -> Self {
        self.cancel = Some(signal);
        self
    }

    /// The items in submission order.
    pub fn items(&self) -> &[I] {
        &self.items
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true when there are no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Maximum number of items in flight at once.
    pub fn concurrency_limit(&self) -> usize {
        self.concurrency_limit
    }

    /// Run every item through `work`.
    ///
    /// `work` receives the item's index, the item, and the batch's cancel
    /// signal so long-running work can stop early.
    pub async fn run<T, E, F, Fut>(self, work: F) -> BatchReport<T, E>
    where
        F: Fn(usize, &I, CancelSignal) -> Fut,
        Fut: Future<Output = Outcome<T, E>>,
    {
        self.drive(FnWork {
            work,
            _fut: PhantomData,
        })
        .await
    }

    /// Run every item through `op`, retried by `retrier`.
    ///
    /// Once the batch is cancelled, items stop starting new attempts; an item
    /// whose retries are cut short is reported [`Outcome::Cancelled`].
    ///
    /// ```rust
    /// use tideline::{BatchRequest, HttpStatusClassifier, Retrier, RetryPolicy};
    /// use std::time::Duration;
    ///
    /// # tokio_test::block_on(async {
    /// let retrier = Retrier::new(RetryPolicy::new(3, Duration::from_millis(1)))
    ///     .unwrap()
    ///     .with_classifier(HttpStatusClassifier::default());
    ///
    /// let batch = BatchRequest::new(vec![200u16, 404, 200], 2).unwrap();
    /// let report = batch
    ///     .run_with_retry(&retrier, |status: &u16| {
    ///         let status = *status;
    ///         async move { if status == 200 { Ok("ok") } else { Err(status) } }
    ///     })
    ///     .await;
    ///
    /// assert_eq!(report.success_count(), 2);
    /// assert_eq!(report.fatal_count(), 1);
    /// # });
    /// ```
    pub async fn run_with_retry<T, E, C, F, Fut>(
        self,
        retrier: &Retrier<C>,
        op: F,
    ) -> BatchReport<T, E>
    where
        C: Classifier<E>,
        F: Fn(&I) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.drive(RetryWork {
            retrier,
            op,
            _fut: PhantomData,
        })
        .await
    }

    async fn drive<W>(self, work: W) -> BatchReport<W::Output, W::Error>
    where
        W: ItemWork<I>,
    {
        let total = self.items.len();
        let workers = self.concurrency_limit.min(total);
        let (handle, signal) = cancel_pair();
        let stop = StopCheck {
            handle: &handle,
            external: self.cancel.as_ref(),
            deadline: self.timeout.map(|t| Instant::now() + t),
        };
        let queue = Mutex::new(self.items.into_iter().enumerate());

        #[cfg(feature = "tracing")]
        tracing::debug!(items = total, workers, "starting fan-out");

        let pool = pin!(future::join_all((0..workers).map(|_worker| {
            let signal = signal.clone();
            let queue = &queue;
            let work = &work;
            let stop = &stop;
            async move {
                let mut finished = Vec::new();
                loop {
                    if stop.should_stop() {
                        break;
                    }
                    let next = {
                        let mut queue = queue.lock().unwrap_or_else(PoisonError::into_inner);
                        queue.next()
                    };
                    let Some((index, item)) = next else {
                        break;
                    };
                    #[cfg(feature = "tracing")]
                    tracing::trace!(worker = _worker, index, "item started");
                    let outcome = work.perform(index, &item, &signal).await;
                    finished.push((index, outcome));
                }
                finished
            }
        })));

        let watchdog = pin!(async {
            wait_for_stop(stop.deadline, stop.external).await;
            handle.cancel();
        });

        // The watchdog goes first so a stop that is already due is raised
        // before any worker pulls an item.
        let per_worker = match future::select(watchdog, pool).await {
            Either::Right((finished, _)) => finished,
            Either::Left(((), pool)) => {
                #[cfg(feature = "tracing")]
                tracing::info!("batch cancelled, draining in-flight items");
                pool.await
            }
        };

        let mut slots: Vec<Option<Outcome<W::Output, W::Error>>> =
            (0..total).map(|_| None).collect();
        for (index, outcome) in per_worker.into_iter().flatten() {
            slots[index] = Some(outcome);
        }

        let report = BatchReport {
            entries: slots
                .into_iter()
                .enumerate()
                .map(|(index, slot)| (index, slot.unwrap_or(Outcome::Cancelled)))
                .collect(),
        };

        #[cfg(feature = "tracing")]
        tracing::info!(
            items = report.len(),
            succeeded = report.success_count(),
            failed = report.fatal_count() + report.retryable_count(),
            cancelled = report.cancelled_count(),
            "fan-out finished"
        );

        report
    }
}

/// Decides, before each pull from the queue, whether the batch is over.
///
/// Work that never yields keeps the watchdog from running, so the external
/// signal and the deadline are read here too.
struct StopCheck<'a> {
    handle: &'a CancelHandle,
    external: Option<&'a CancelSignal>,
    deadline: Option<Instant>,
}

impl StopCheck<'_> {
    fn should_stop(&self) -> bool {
        if self.handle.is_cancelled() {
            return true;
        }
        let due = self.external.is_some_and(CancelSignal::is_cancelled)
            || self.deadline.is_some_and(|d| Instant::now() >= d);
        if due {
            self.handle.cancel();
        }
        due
    }
}

/// Resolves once the batch deadline passes or the external signal fires.
async fn wait_for_stop(deadline: Option<Instant>, external: Option<&CancelSignal>) {
    let deadline = async {
        match deadline {
            Some(at) => tokio::time::sleep_until(at).await,
            None => future::pending::<()>().await,
        }
    };
    let external = async {
        match external {
            Some(signal) => signal.cancelled().await,
            None => future::pending::<()>().await,
        }
    };
    tokio::select! {
        _ = deadline => {}
        _ = external => {}
    }
}

/// Per-item work performed by a worker.
trait ItemWork<I> {
    type Output;
    type Error;

    async fn perform(
        &self,
        index: usize,
        item: &I,
        cancel: &CancelSignal,
    ) -> Outcome<Self::Output, Self::Error>;
}

struct FnWork<F, Fut> {
    work: F,
    _fut: PhantomData<fn() -> Fut>,
}

impl<I, T, E, F, Fut> ItemWork<I> for FnWork<F, Fut>
where
    F: Fn(usize, &I, CancelSignal) -> Fut,
    Fut: Future<Output = Outcome<T, E>>,
{
    type Output = T;
    type Error = E;

    async fn perform(&self, index: usize, item: &I, cancel: &CancelSignal) -> Outcome<T, E> {
        (self.work)(index, item, cancel.clone()).await
    }
}

struct RetryWork<'r, C, F, Fut> {
    retrier: &'r Retrier<C>,
    op: F,
    _fut: PhantomData<fn() -> Fut>,
}

impl<I, T, E, C, F, Fut> ItemWork<I> for RetryWork<'_, C, F, Fut>
where
    C: Classifier<E>,
    F: Fn(&I) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    type Output = T;
    type Error = E;

    async fn perform(&self, _index: usize, item: &I, cancel: &CancelSignal) -> Outcome<T, E> {
        self.retrier
            .run_until_cancelled(|| (self.op)(item), cancel)
            .await
            .into_outcome()
    }
}

/// Per-item outcomes of a batch, in input order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport<T, E> {
    entries: Vec<(usize, Outcome<T, E>)>,
}

impl<T, E> BatchReport<T, E> {
    /// `(index, outcome)` pairs in input order.
    pub fn entries(&self) -> &[(usize, Outcome<T, E>)] {
        &self.entries
    }

    /// Iterate over `(index, outcome)` pairs in input order.
    pub fn iter(&self) -> std::slice::Iter<'_, (usize, Outcome<T, E>)> {
        self.entries.iter()
    }

    /// The outcome of item `index`.
    pub fn outcome(&self, index: usize) -> Option<&Outcome<T, E>> {
        self.entries.get(index).map(|(_, outcome)| outcome)
    }

    /// Number of entries (always equal to the number of submitted items).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when the batch had no items.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns true when every item succeeded.
    pub fn all_succeeded(&self) -> bool {
        self.entries.iter().all(|(_, o)| o.is_success())
    }

    /// Returns true when some, but not all, items succeeded.
    pub fn is_partial(&self) -> bool {
        let succeeded = self.success_count();
        succeeded > 0 && succeeded < self.len()
    }

    /// Number of successful items.
    pub fn success_count(&self) -> usize {
        self.count(Outcome::is_success)
    }

    /// Number of items that ended in a fatal failure.
    pub fn fatal_count(&self) -> usize {
        self.count(Outcome::is_fatal)
    }

    /// Number of items that exhausted their retries.
    pub fn retryable_count(&self) -> usize {
        self.count(Outcome::is_retryable)
    }

    /// Number of items that were cancelled.
    pub fn cancelled_count(&self) -> usize {
        self.count(Outcome::is_cancelled)
    }

    /// Successful values with their indices.
    pub fn successes(&self) -> impl Iterator<Item = (usize, &T)> {
        self.entries
            .iter()
            .filter_map(|(index, outcome)| outcome.value().map(|v| (*index, v)))
    }

    /// Failure causes with their indices.
    pub fn failures(&self) -> impl Iterator<Item = (usize, &E)> {
        self.entries
            .iter()
            .filter_map(|(index, outcome)| outcome.error().map(|e| (*index, e)))
    }

    /// Drop the indices and keep the outcomes, in input order.
    pub fn into_outcomes(self) -> Vec<Outcome<T, E>> {
        self.entries.into_iter().map(|(_, outcome)| outcome).collect()
    }

    fn count(&self, predicate: fn(&Outcome<T, E>) -> bool) -> usize {
        self.entries.iter().filter(|(_, o)| predicate(o)).count()
    }
}

impl<T, E> IntoIterator for BatchReport<T, E> {
    type Item = (usize, Outcome<T, E>);
    type IntoIter = std::vec::IntoIter<(usize, Outcome<T, E>)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
