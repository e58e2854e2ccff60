//! Error hierarchy for odbc-typestate.
//!
//! Canonical error struct: callers classify through `is_xxx()` predicates,
//! the `ErrorKind` stays crate-private so variants can grow.

use thiserror::Error;

use crate::diagnostics::DiagnosticRecord;
use crate::ffi::HandleKind;
use crate::outcome::Outcome;

/// Result type alias for fallible ODBC operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Root error type for odbc-typestate.
///
/// Carries the diagnostic records the driver attached to the failing call
/// and, for driver-reported failures, the classified return code.
///
/// # Example
///
/// ```rust,ignore
/// match connection.connect("missing", "", "") {
///     Err(rejected) if rejected.error().is_driver_error() => {
///         for record in rejected.error().diagnostics() {
///             eprintln!("{record}");
///         }
///     }
///     _ => {}
/// }
/// ```
#[derive(Error, Debug)]
#[error("{kind}")]
pub struct Error {
    kind: ErrorKind,
    diagnostics: Vec<DiagnosticRecord>,
    outcome: Option<Outcome>,
}

/// Internal error classification.
#[derive(Error, Debug)]
#[non_exhaustive]
pub(crate) enum ErrorKind {
    /// Native call reported `Error` or `InvalidHandle`.
    #[error("{function} returned {outcome}{summary}")]
    DriverError {
        function: &'static str,
        outcome: Outcome,
        summary: String,
    },

    /// Warnings promoted to an error by the caller.
    #[error("{function} completed with warnings{summary}")]
    DriverWarning {
        function: &'static str,
        summary: String,
    },

    /// Handle allocation failed.
    #[error("failed to allocate {kind} handle{summary}")]
    AllocationFailed { kind: HandleKind, summary: String },

    /// Host type cannot be marshaled to or from the native type.
    #[error("unsupported conversion between {host} and {native}")]
    UnsupportedConversion { host: &'static str, native: String },

    /// Column or parameter index outside the valid range.
    #[error("{what} {index} is out of range 1..={max}")]
    OutOfRange {
        what: &'static str,
        index: usize,
        max: usize,
    },

    /// Driver behaved outside the documented native contract.
    #[error("native contract violated by {function}: {detail}")]
    ProtocolViolation {
        function: &'static str,
        detail: String,
    },

    #[error("configuration error: {0}")]
    Config(String),
}

fn summarize(diagnostics: &[DiagnosticRecord]) -> String {
    match diagnostics {
        [] => String::new(),
        [first] => format!(": {first}"),
        [first, rest @ ..] => format!(": {first} (+{} more)", rest.len()),
    }
}

impl Error {
    // ═══════════════════════════════════════════════════════════════════════
    // Constructors
    // ═══════════════════════════════════════════════════════════════════════

    /// Create error for a native call that returned `Error` or `InvalidHandle`.
    #[must_use]
    pub fn driver(
        function: &'static str,
        outcome: Outcome,
        diagnostics: Vec<DiagnosticRecord>,
    ) -> Self {
        Self {
            kind: ErrorKind::DriverError {
                function,
                outcome,
                summary: summarize(&diagnostics),
            },
            diagnostics,
            outcome: Some(outcome),
        }
    }

    /// Create error for warnings the caller chose not to tolerate.
    #[must_use]
    pub fn warning(function: &'static str, diagnostics: Vec<DiagnosticRecord>) -> Self {
        Self {
            kind: ErrorKind::DriverWarning {
                function,
                summary: summarize(&diagnostics),
            },
            diagnostics,
            outcome: Some(Outcome::SuccessWithInfo),
        }
    }

    /// Create error for a failed handle allocation.
    #[must_use]
    pub fn allocation_failed(kind: HandleKind, diagnostics: Vec<DiagnosticRecord>) -> Self {
        Self {
            kind: ErrorKind::AllocationFailed {
                kind,
                summary: summarize(&diagnostics),
            },
            diagnostics,
            outcome: Some(Outcome::Error),
        }
    }

    /// Create error for an unsupported host/native type pairing.
    #[must_use]
    pub fn unsupported_conversion(host: &'static str, native: impl Into<String>) -> Self {
        Self::from_kind(ErrorKind::UnsupportedConversion {
            host,
            native: native.into(),
        })
    }

    /// Create error for an index outside `1..=max`.
    #[must_use]
    pub fn out_of_range(what: &'static str, index: usize, max: usize) -> Self {
        Self::from_kind(ErrorKind::OutOfRange { what, index, max })
    }

    /// Create error for a driver breaking the native contract.
    #[must_use]
    pub fn protocol_violation(function: &'static str, detail: impl Into<String>) -> Self {
        Self::from_kind(ErrorKind::ProtocolViolation {
            function,
            detail: detail.into(),
        })
    }

    /// Create error for an invalid configuration.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::from_kind(ErrorKind::Config(message.into()))
    }

    const fn from_kind(kind: ErrorKind) -> Self {
        Self {
            kind,
            diagnostics: Vec::new(),
            outcome: None,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Accessors
    // ═══════════════════════════════════════════════════════════════════════

    /// Diagnostic records attached to the failing call, in driver order.
    pub fn diagnostics(&self) -> &[DiagnosticRecord] {
        &self.diagnostics
    }

    /// Classified return code of the failing call, if a driver reported it.
    pub const fn outcome(&self) -> Option<Outcome> {
        self.outcome
    }

    /// Native function that failed, where one is known.
    pub const fn function(&self) -> Option<&'static str> {
        match &self.kind {
            ErrorKind::DriverError { function, .. }
            | ErrorKind::DriverWarning { function, .. }
            | ErrorKind::ProtocolViolation { function, .. } => Some(*function),
            _ => None,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Predicate Methods (is_xxx)
    // ═══════════════════════════════════════════════════════════════════════

    /// Returns true if a native call reported failure.
    #[must_use]
    pub const fn is_driver_error(&self) -> bool {
        matches!(self.kind, ErrorKind::DriverError { .. })
    }

    /// Returns true if this error was promoted from warnings.
    #[must_use]
    pub const fn is_driver_warning(&self) -> bool {
        matches!(self.kind, ErrorKind::DriverWarning { .. })
    }

    /// Returns true if a handle could not be allocated.
    #[must_use]
    pub const fn is_allocation_failed(&self) -> bool {
        matches!(self.kind, ErrorKind::AllocationFailed { .. })
    }

    /// Returns true if a type conversion was rejected before any native call.
    #[must_use]
    pub const fn is_unsupported_conversion(&self) -> bool {
        matches!(self.kind, ErrorKind::UnsupportedConversion { .. })
    }

    /// Returns true if a column or parameter index was invalid.
    #[must_use]
    pub const fn is_out_of_range(&self) -> bool {
        matches!(self.kind, ErrorKind::OutOfRange { .. })
    }

    /// Returns true if the driver broke the native contract.
    #[must_use]
    pub const fn is_protocol_violation(&self) -> bool {
        matches!(self.kind, ErrorKind::ProtocolViolation { .. })
    }

    /// Returns true if this is a configuration error.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self.kind, ErrorKind::Config(_))
    }

    /// Returns true if the handle involved should not be used further.
    ///
    /// Only contract violations are fatal; driver errors leave the handle in
    /// its prior state.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        self.is_protocol_violation()
    }

    /// Returns true if the driver reported an invalid handle.
    #[must_use]
    pub fn is_invalid_handle(&self) -> bool {
        self.outcome == Some(Outcome::InvalidHandle)
    }

    /// Returns true if any attached record carries the given SQLSTATE.
    #[must_use]
    pub fn has_state(&self, state: &str) -> bool {
        self.diagnostics.iter().any(|r| r.state.as_str() == state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::State;

    fn record(state: &str, message: &str) -> DiagnosticRecord {
        DiagnosticRecord::new(State::parse(state).unwrap(), -1, message)
    }

    #[test]
    fn test_driver_error_display_includes_first_record() {
        let err = Error::driver(
            "SQLConnect",
            Outcome::Error,
            vec![record("08001", "driver unreachable")],
        );
        assert!(err.is_driver_error());
        assert!(!err.is_fatal());
        assert_eq!(err.outcome(), Some(Outcome::Error));
        assert_eq!(err.function(), Some("SQLConnect"));
        assert!(err.to_string().contains("SQLConnect returned SQL_ERROR"));
        assert!(err.to_string().contains("[08001] driver unreachable"));
    }

    #[test]
    fn test_driver_error_summary_counts_extra_records() {
        let err = Error::driver(
            "SQLExecDirect",
            Outcome::Error,
            vec![record("42S02", "no table"), record("01000", "general warning")],
        );
        assert!(err.to_string().ends_with("(+1 more)"));
        assert!(err.has_state("01000"));
        assert!(!err.has_state("HY000"));
    }

    #[test]
    fn test_allocation_failed() {
        let err = Error::allocation_failed(HandleKind::Statement, vec![record("HY001", "oom")]);
        assert!(err.is_allocation_failed());
        assert_eq!(err.diagnostics().len(), 1);
        assert!(err.to_string().starts_with("failed to allocate statement handle"));
    }

    #[test]
    fn test_protocol_violation_is_fatal() {
        let err = Error::protocol_violation("SQLFetch", "unknown return code 42");
        assert!(err.is_protocol_violation());
        assert!(err.is_fatal());
        assert!(err.diagnostics().is_empty());
        assert_eq!(err.outcome(), None);
    }

    #[test]
    fn test_out_of_range_display() {
        let err = Error::out_of_range("column", 4, 3);
        assert!(err.is_out_of_range());
        assert_eq!(err.to_string(), "column 4 is out of range 1..=3");
    }

    #[test]
    fn test_unsupported_conversion() {
        let err = Error::unsupported_conversion("f64", "SQL_VARBINARY");
        assert!(err.is_unsupported_conversion());
        assert_eq!(
            err.to_string(),
            "unsupported conversion between f64 and SQL_VARBINARY"
        );
    }

    #[test]
    fn test_invalid_handle_predicate() {
        let err = Error::driver("SQLExecute", Outcome::InvalidHandle, Vec::new());
        assert!(err.is_invalid_handle());
        assert_eq!(err.to_string(), "SQLExecute returned SQL_INVALID_HANDLE");
    }

    #[test]
    fn test_warning_and_config() {
        assert!(Error::warning("SQLConnect", vec![]).is_driver_warning());
        assert!(Error::config("chunk size must be non-zero").is_config());
    }
}
