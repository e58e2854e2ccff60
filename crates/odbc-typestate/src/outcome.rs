//! Return code classification and transition results.
//!
//! [`Outcome::classify`] turns a raw [`SqlReturn`] into one of seven
//! outcomes; anything else is a protocol violation. Typestate transitions
//! return a [`Transition`]: on success a [`Completion`] holding the new
//! state plus any warnings, on failure a [`Rejected`] that hands the
//! original wrapper back together with the error.

use std::fmt;

use crate::diagnostics::DiagnosticRecord;
use crate::error::{Error, Result};
use crate::ffi::SqlReturn;

/// Classified native return code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    Success,
    SuccessWithInfo,
    Error,
    InvalidHandle,
    StillExecuting,
    NeedData,
    NoData,
}

impl Outcome {
    /// Maps a raw return code. Codes outside the documented set are a
    /// protocol violation attributed to `function`.
    pub fn classify(function: &'static str, code: SqlReturn) -> Result<Self> {
        match code {
            SqlReturn::SUCCESS => Ok(Self::Success),
            SqlReturn::SUCCESS_WITH_INFO => Ok(Self::SuccessWithInfo),
            SqlReturn::ERROR => Ok(Self::Error),
            SqlReturn::INVALID_HANDLE => Ok(Self::InvalidHandle),
            SqlReturn::STILL_EXECUTING => Ok(Self::StillExecuting),
            SqlReturn::NEED_DATA => Ok(Self::NeedData),
            SqlReturn::NO_DATA => Ok(Self::NoData),
            SqlReturn(other) => {
                tracing::error!(function, code = other, "driver returned an unknown code");
                Err(Error::protocol_violation(
                    function,
                    format!("unknown return code {other}"),
                ))
            }
        }
    }

    /// `Success` or `SuccessWithInfo`.
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success | Self::SuccessWithInfo)
    }

    /// Whether the driver has diagnostic records worth retrieving.
    #[must_use]
    pub const fn has_diagnostics(self) -> bool {
        matches!(self, Self::SuccessWithInfo | Self::Error)
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Success => "SQL_SUCCESS",
            Self::SuccessWithInfo => "SQL_SUCCESS_WITH_INFO",
            Self::Error => "SQL_ERROR",
            Self::InvalidHandle => "SQL_INVALID_HANDLE",
            Self::StillExecuting => "SQL_STILL_EXECUTING",
            Self::NeedData => "SQL_NEED_DATA",
            Self::NoData => "SQL_NO_DATA",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Completion
// ═══════════════════════════════════════════════════════════════════════════

/// Successful result of a transition, with warnings the driver attached.
#[derive(Debug)]
#[must_use = "a completion holds the new state"]
pub struct Completion<T> {
    value: T,
    function: &'static str,
    warnings: Vec<DiagnosticRecord>,
}

impl<T> Completion<T> {
    pub(crate) const fn new(
        value: T,
        function: &'static str,
        warnings: Vec<DiagnosticRecord>,
    ) -> Self {
        Self {
            value,
            function,
            warnings,
        }
    }

    /// Discards warnings and returns the new state.
    pub fn into_value(self) -> T {
        self.value
    }

    pub const fn value(&self) -> &T {
        &self.value
    }

    pub fn warnings(&self) -> &[DiagnosticRecord] {
        &self.warnings
    }

    pub const fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Native function that produced this completion.
    pub const fn function(&self) -> &'static str {
        self.function
    }

    pub fn into_parts(self) -> (T, Vec<DiagnosticRecord>) {
        (self.value, self.warnings)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Completion<U> {
        Completion {
            value: f(self.value),
            function: self.function,
            warnings: self.warnings,
        }
    }

    /// Treats `SuccessWithInfo` as failure.
    ///
    /// The new state is dropped on error, which releases whatever it owns.
    pub fn deny_warnings(self) -> Result<T> {
        if self.warnings.is_empty() {
            Ok(self.value)
        } else {
            Err(Error::warning(self.function, self.warnings))
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Rejected
// ═══════════════════════════════════════════════════════════════════════════

/// Failed transition: the wrapper in its prior state plus the error.
pub struct Rejected<W> {
    previous: W,
    error: Error,
}

impl<W> Rejected<W> {
    pub(crate) const fn new(previous: W, error: Error) -> Self {
        Self { previous, error }
    }

    pub const fn error(&self) -> &Error {
        &self.error
    }

    /// The wrapper, still usable in its prior state.
    pub fn into_previous(self) -> W {
        self.previous
    }

    pub fn into_error(self) -> Error {
        self.error
    }

    pub fn into_parts(self) -> (W, Error) {
        (self.previous, self.error)
    }
}

impl<W> fmt::Debug for Rejected<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rejected")
            .field("previous", &std::any::type_name::<W>())
            .field("error", &self.error)
            .finish()
    }
}

impl<W> fmt::Display for Rejected<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.error, f)
    }
}

impl<W> std::error::Error for Rejected<W> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl<W> From<Rejected<W>> for Error {
    fn from(rejected: Rejected<W>) -> Self {
        rejected.error
    }
}

/// Result of a consuming state transition from `Prev` to `Next`.
pub type Transition<Next, Prev> = std::result::Result<Completion<Next>, Rejected<Prev>>;
