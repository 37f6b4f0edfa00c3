//! Testing utilities and helpers for Tideline
//!
//! This module provides ergonomic utilities for testing code that retries,
//! fans out, or paginates. It includes scripted operations, a concurrency
//! probe, outcome assertion macros, and property-based testing support.
//!
//! # Examples
//!
//! ## ScriptedOperation
//!
//! ```rust
//! use tideline::testing::ScriptedOperation;
//! use tideline::{assert_succeeded, Retrier, RetryPolicy};
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let op = ScriptedOperation::new(vec![Err("busy"), Err("busy"), Ok(7)]);
//! let retrier = Retrier::new(RetryPolicy::new(5, Duration::from_millis(1))).unwrap();
//!
//! let report = retrier.run(|| op.call()).await;
//! assert_succeeded!(report.outcome());
//! assert_eq!(op.calls(), 3);
//! # });
//! ```

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

/// An operation that replays a fixed script of results.
///
/// Each call takes the next result; once the script runs out the last result
/// is repeated forever.
#[derive(Debug)]
pub struct ScriptedOperation<T, E> {
    script: Mutex<VecDeque<Result<T, E>>>,
    last: Mutex<Option<Result<T, E>>>,
    calls: AtomicU32,
}

impl<T: Clone, E: Clone> ScriptedOperation<T, E> {
    /// Create an operation replaying `script`.
    pub fn new(script: Vec<Result<T, E>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            last: Mutex::new(None),
            calls: AtomicU32::new(0),
        }
    }

    /// An operation that always returns `result`.
    pub fn always(result: Result<T, E>) -> Self {
        Self::new(vec![result])
    }

    /// Take the next scripted result.
    ///
    /// # Panics
    ///
    /// Panics if the script was empty.
    pub fn next_result(&self) -> Result<T, E> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        match next {
            Some(result) => {
                *last = Some(result.clone());
                result
            }
            None => last
                .clone()
                .expect("ScriptedOperation called with an empty script"),
        }
    }

    /// Take the next scripted result as a ready future.
    pub fn call(&self) -> impl Future<Output = Result<T, E>> {
        std::future::ready(self.next_result())
    }

    /// Number of calls made so far.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Tracks how many tasks are inside a section at once.
///
/// # Example
///
/// ```rust
/// use tideline::testing::ConcurrencyProbe;
///
/// let probe = ConcurrencyProbe::new();
/// {
///     let _a = probe.enter();
///     let _b = probe.enter();
///     assert_eq!(probe.current(), 2);
/// }
/// assert_eq!(probe.current(), 0);
/// assert_eq!(probe.peak(), 2);
/// ```
#[derive(Debug, Default)]
pub struct ConcurrencyProbe {
    current: AtomicUsize,
    peak: AtomicUsize,
}

/// Marks one task inside a [`ConcurrencyProbe`]; leaves on drop.
#[derive(Debug)]
pub struct ProbeGuard<'a> {
    probe: &'a ConcurrencyProbe,
}

impl ConcurrencyProbe {
    /// Create an empty probe.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record entry into the section.
    pub fn enter(&self) -> ProbeGuard<'_> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        ProbeGuard { probe: self }
    }

    /// Tasks currently inside the section.
    pub fn current(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }

    /// Highest number of tasks seen inside the section at once.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        self.probe.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Assert that an outcome is a success.
///
/// Accepts an `Outcome` or a reference to one.
///
/// # Example
///
/// ```rust
/// use tideline::{assert_succeeded, Outcome};
///
/// let outcome = Outcome::<_, String>::Success(42);
/// assert_succeeded!(outcome);
/// ```
#[macro_export]
macro_rules! assert_succeeded {
    ($outcome:expr) => {
        match &$outcome {
            o if $crate::Outcome::is_success(o) => {}
            other => panic!("Expected Success, got {:?}", other),
        }
    };
}

/// Assert that an outcome is a fatal failure.
///
/// # Example
///
/// ```rust
/// use tideline::{assert_fatal, Outcome};
///
/// let outcome = Outcome::<i32, _>::FatalFailure("401 Unauthorized");
/// assert_fatal!(outcome);
/// ```
#[macro_export]
macro_rules! assert_fatal {
    ($outcome:expr) => {
        match &$outcome {
            o if $crate::Outcome::is_fatal(o) => {}
            other => panic!("Expected FatalFailure, got {:?}", other),
        }
    };
}

/// Assert that an outcome was cancelled.
///
/// # Example
///
/// ```rust
/// use tideline::{assert_cancelled, Outcome};
///
/// let outcome = Outcome::<i32, String>::Cancelled;
/// assert_cancelled!(outcome);
/// ```
#[macro_export]
macro_rules! assert_cancelled {
    ($outcome:expr) => {
        match &$outcome {
            o if $crate::Outcome::is_cancelled(o) => {}
            other => panic!("Expected Cancelled, got {:?}", other),
        }
    };
}

#[cfg(feature = "proptest")]
use proptest::prelude::*;

#[cfg(feature = "proptest")]
impl Arbitrary for crate::RetryPolicy {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    /// Generates valid policies only.
    fn arbitrary_with(_args: Self::Parameters) -> Self::Strategy {
        use std::time::Duration;

        (1u32..=10, 1u64..=1_000, 1.0f64..=4.0, 0u64..=60_000, 0.0f64..=1.0)
            .prop_map(|(attempts, base_ms, multiplier, extra_ms, jitter)| {
                crate::RetryPolicy::new(attempts, Duration::from_millis(base_ms))
                    .with_backoff_multiplier(multiplier)
                    .with_max_delay(Duration::from_millis(base_ms + extra_ms))
                    .with_jitter(jitter)
            })
            .boxed()
    }
}
