//! Tagged result of a single unit of work.
//!
//! Every attempt made by the retry engine, every item of a fan-out batch and
//! every page fetch ends in exactly one [`Outcome`]. The retryable/fatal split
//! is decided by a [`Classifier`](crate::Classifier), never by the engine.

/// Result of one unit of work.
///
/// Unlike `Result`, failures come in two flavours so the caller's
/// classification travels with the error itself.
///
/// # Examples
///
/// ```rust
/// use tideline::Outcome;
///
/// let ok: Outcome<u32, &str> = Outcome::Success(200);
/// assert!(ok.is_success());
///
/// let throttled: Outcome<u32, &str> = Outcome::RetryableFailure("429 Too Many Requests");
/// assert!(throttled.is_retryable());
/// assert_eq!(throttled.error(), Some(&"429 Too Many Requests"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T, E> {
    /// The work completed and produced a value.
    Success(T),
    /// The work failed in a way that another attempt could fix.
    RetryableFailure(E),
    /// The work failed permanently; retrying would not help.
    FatalFailure(E),
    /// The work was not run (or not finished) because the batch was cancelled.
    Cancelled,
}

/// Payload-free tag of an [`Outcome`], used in attempt records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OutcomeKind {
    /// See [`Outcome::Success`].
    Success,
    /// See [`Outcome::RetryableFailure`].
    RetryableFailure,
    /// See [`Outcome::FatalFailure`].
    FatalFailure,
    /// See [`Outcome::Cancelled`].
    Cancelled,
}

impl<T, E> Outcome<T, E> {
    /// Returns the tag of this outcome.
    pub fn kind(&self) -> OutcomeKind {
        match self {
            Outcome::Success(_) => OutcomeKind::Success,
            Outcome::RetryableFailure(_) => OutcomeKind::RetryableFailure,
            Outcome::FatalFailure(_) => OutcomeKind::FatalFailure,
            Outcome::Cancelled => OutcomeKind::Cancelled,
        }
    }

    /// Returns true for [`Outcome::Success`].
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    /// Returns true for [`Outcome::RetryableFailure`].
    pub fn is_retryable(&self) -> bool {
        matches!(self, Outcome::RetryableFailure(_))
    }

    /// Returns true for [`Outcome::FatalFailure`].
    pub fn is_fatal(&self) -> bool {
        matches!(self, Outcome::FatalFailure(_))
    }

    /// Returns true for either failure variant.
    pub fn is_failure(&self) -> bool {
        self.is_retryable() || self.is_fatal()
    }

    /// Returns true for [`Outcome::Cancelled`].
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Outcome::Cancelled)
    }

    /// Borrow the success value, if any.
    pub fn value(&self) -> Option<&T> {
        match self {
            Outcome::Success(value) => Some(value),
            _ => None,
        }
    }

    /// Take the success value, if any.
    pub fn into_value(self) -> Option<T> {
        match self {
            Outcome::Success(value) => Some(value),
            _ => None,
        }
    }

    /// Borrow the failure cause, if any.
    pub fn error(&self) -> Option<&E> {
        match self {
            Outcome::RetryableFailure(error) | Outcome::FatalFailure(error) => Some(error),
            _ => None,
        }
    }

    /// Take the failure cause, if any.
    pub fn into_error(self) -> Option<E> {
        match self {
            Outcome::RetryableFailure(error) | Outcome::FatalFailure(error) => Some(error),
            _ => None,
        }
    }

    /// Convert `&Outcome<T, E>` into `Outcome<&T, &E>`.
    pub fn as_ref(&self) -> Outcome<&T, &E> {
        match self {
            Outcome::Success(value) => Outcome::Success(value),
            Outcome::RetryableFailure(error) => Outcome::RetryableFailure(error),
            Outcome::FatalFailure(error) => Outcome::FatalFailure(error),
            Outcome::Cancelled => Outcome::Cancelled,
        }
    }

    /// Transform the success value, keeping the classification.
    pub fn map<U, F>(self, f: F) -> Outcome<U, E>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            Outcome::Success(value) => Outcome::Success(f(value)),
            Outcome::RetryableFailure(error) => Outcome::RetryableFailure(error),
            Outcome::FatalFailure(error) => Outcome::FatalFailure(error),
            Outcome::Cancelled => Outcome::Cancelled,
        }
    }

    /// Transform the failure cause, keeping the classification.
    pub fn map_err<E2, F>(self, f: F) -> Outcome<T, E2>
    where
        F: FnOnce(E) -> E2,
    {
        match self {
            Outcome::Success(value) => Outcome::Success(value),
            Outcome::RetryableFailure(error) => Outcome::RetryableFailure(f(error)),
            Outcome::FatalFailure(error) => Outcome::FatalFailure(f(error)),
            Outcome::Cancelled => Outcome::Cancelled,
        }
    }

    /// Collapse into a `Result`, using `on_cancel` to produce an error for
    /// [`Outcome::Cancelled`].
    ///
    /// # Examples
    ///
    /// ```rust
    /// use tideline::Outcome;
    ///
    /// let cancelled: Outcome<u32, String> = Outcome::Cancelled;
    /// assert_eq!(
    ///     cancelled.into_result(|| "batch cancelled".to_string()),
    ///     Err("batch cancelled".to_string())
    /// );
    /// ```
    pub fn into_result<F>(self, on_cancel: F) -> Result<T, E>
    where
        F: FnOnce() -> E,
    {
        match self {
            Outcome::Success(value) => Ok(value),
            Outcome::RetryableFailure(error) | Outcome::FatalFailure(error) => Err(error),
            Outcome::Cancelled => Err(on_cancel()),
        }
    }
}

impl std::fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            OutcomeKind::Success => "success",
            OutcomeKind::RetryableFailure => "retryable failure",
            OutcomeKind::FatalFailure => "fatal failure",
            OutcomeKind::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}
