//! Diagnostic record retrieval.
//!
//! Records are pulled lazily, one `SQLGetDiagRec` per item, starting at
//! record 1 and stopping at the first `NoData`, at the first failing call,
//! or at the configured record limit. Retrieval never fails: a handle
//! whose diagnostics cannot be read simply yields fewer records.

use std::fmt;
use std::iter::FusedIterator;

use crate::config::OdbcConfig;
use crate::ffi::{HandleKind, NativeApi, RawHandle, SqlReturn};

/// Five-character SQLSTATE code.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct State([u8; 5]);

impl State {
    /// Parses a five-character ASCII code such as `"08001"`.
    #[must_use]
    pub fn parse(code: &str) -> Option<Self> {
        let bytes: [u8; 5] = code.as_bytes().try_into().ok()?;
        bytes.iter().all(u8::is_ascii).then_some(Self(bytes))
    }

    #[must_use]
    pub const fn from_bytes(bytes: [u8; 5]) -> Self {
        Self(bytes)
    }

    /// The code as text; non-ASCII driver output renders as `?????`.
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("?????")
    }

    /// The two-character class, e.g. `"08"` for connection exceptions.
    pub fn class(&self) -> &str {
        self.as_str().get(..2).unwrap_or("??")
    }

    /// Class `01`.
    pub fn is_warning(&self) -> bool {
        self.class() == "01"
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "State({})", self.as_str())
    }
}

/// One diagnostic record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticRecord {
    pub state: State,
    pub native_error: i32,
    pub message: String,
}

impl DiagnosticRecord {
    #[must_use]
    pub fn new(state: State, native_error: i32, message: impl Into<String>) -> Self {
        Self {
            state,
            native_error,
            message: message.into(),
        }
    }
}

impl fmt::Display for DiagnosticRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.state, self.message)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Retrieval
// ═══════════════════════════════════════════════════════════════════════════

/// Lazy, fused iterator over a handle's diagnostic records.
///
/// Only meaningful immediately after the call that produced them; any
/// further call on the same handle replaces the driver's record set.
pub struct Diagnostics<'a> {
    api: &'a dyn NativeApi,
    kind: HandleKind,
    handle: RawHandle,
    next_record: i16,
    remaining: usize,
    capacity: usize,
}

/// Starts retrieval of the records attached to `handle`.
pub fn records_for<'a>(
    api: &'a dyn NativeApi,
    handle: RawHandle,
    kind: HandleKind,
    config: &OdbcConfig,
) -> Diagnostics<'a> {
    Diagnostics {
        api,
        kind,
        handle,
        next_record: 1,
        remaining: config.max_diagnostic_records(),
        capacity: config.diagnostic_message_capacity().max(1),
    }
}

impl Diagnostics<'_> {
    fn read(&self, capacity: usize) -> (SqlReturn, [u8; 6], i32, Vec<u8>, i16) {
        let mut state = [0_u8; 6];
        let mut native_error = 0;
        let mut message = vec![0_u8; capacity.min(i16::MAX as usize)];
        let mut text_length = 0;
        let code = self.api.get_diag_rec(
            self.kind,
            self.handle,
            self.next_record,
            &mut state,
            &mut native_error,
            &mut message,
            &mut text_length,
        );
        (code, state, native_error, message, text_length)
    }

    const fn finish(&mut self) {
        self.remaining = 0;
    }
}

fn decode_message(buffer: &[u8], text_length: i16) -> String {
    let reported = usize::try_from(text_length).unwrap_or(0);
    let written = reported.min(buffer.len().saturating_sub(1));
    let text = &buffer[..written];
    let end = text.iter().position(|&b| b == 0).unwrap_or(text.len());
    String::from_utf8_lossy(&text[..end]).into_owned()
}

impl Iterator for Diagnostics<'_> {
    type Item = DiagnosticRecord;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        let (mut code, mut state, mut native_error, mut message, mut text_length) =
            self.read(self.capacity);

        // Message longer than the buffer: ask once more with the full size.
        if code == SqlReturn::SUCCESS_WITH_INFO
            && usize::try_from(text_length).is_ok_and(|len| len >= message.len())
        {
            let needed = usize::try_from(text_length).unwrap_or(0) + 1;
            (code, state, native_error, message, text_length) = self.read(needed);
        }

        match code {
            SqlReturn::SUCCESS | SqlReturn::SUCCESS_WITH_INFO => {}
            SqlReturn::NO_DATA => {
                self.finish();
                return None;
            }
            other => {
                tracing::warn!(
                    handle.kind = %self.kind,
                    record = self.next_record,
                    code = other.0,
                    "diagnostic retrieval stopped"
                );
                self.finish();
                return None;
            }
        }

        let mut code_bytes = [0_u8; 5];
        code_bytes.copy_from_slice(&state[..5]);
        self.remaining -= 1;
        self.next_record = self.next_record.saturating_add(1);

        Some(DiagnosticRecord {
            state: State::from_bytes(code_bytes),
            native_error,
            message: decode_message(&message, text_length),
        })
    }
}

impl FusedIterator for Diagnostics<'_> {}

impl fmt::Debug for Diagnostics<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Diagnostics")
            .field("kind", &self.kind)
            .field("handle", &self.handle)
            .field("next_record", &self.next_record)
            .finish_non_exhaustive()
    }
}

/// Emits each record as a structured warning event.
pub fn log_diagnostics(function: &'static str, records: &[DiagnosticRecord]) {
    for record in records {
        tracing::warn!(
            function,
            state = %record.state,
            native_error = record.native_error,
            message = %record.message,
            "driver diagnostic"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_parse() {
        let state = State::parse("08001").unwrap();
        assert_eq!(state.as_str(), "08001");
        assert_eq!(state.class(), "08");
        assert!(!state.is_warning());
        assert!(State::parse("01004").unwrap().is_warning());
    }

    #[test]
    fn test_state_parse_rejects_wrong_length() {
        assert!(State::parse("0800").is_none());
        assert!(State::parse("080011").is_none());
    }

    #[test]
    fn test_state_non_ascii_bytes_render_placeholder() {
        let state = State::from_bytes([0xff, 0, 0, 0, 0]);
        assert_eq!(state.as_str(), "?????");
    }

    #[test]
    fn test_record_display() {
        let record = DiagnosticRecord::new(State::parse("42S02").unwrap(), 208, "no such table");
        assert_eq!(record.to_string(), "[42S02] no such table");
    }

    #[test]
    fn test_decode_message_truncated_buffer() {
        let buffer = b"hello wor\0";
        assert_eq!(decode_message(buffer, 20), "hello wor");
    }

    #[test]
    fn test_decode_message_stops_at_nul() {
        let buffer = b"short\0\0\0\0\0\0\0";
        assert_eq!(decode_message(buffer, 11), "short");
    }

    #[test]
    fn test_decode_message_lossy_utf8() {
        let buffer = b"caf\xe9\0";
        assert_eq!(decode_message(buffer, 4), "caf\u{fffd}");
    }

    #[test]
    fn test_decode_message_negative_length() {
        assert_eq!(decode_message(b"abc\0", -1), "");
    }

    mod retrieval {
        use super::super::*;
        use crate::ffi::AttrOdbcVersion;
        use crate::testing::{MockDriver, MockFunction};

        fn record(state: &str, message: &str) -> DiagnosticRecord {
            DiagnosticRecord::new(State::parse(state).unwrap(), 7, message)
        }

        /// Environment handle whose last call failed with `records`.
        fn failed_env(driver: &MockDriver, records: Vec<DiagnosticRecord>) -> RawHandle {
            let mut env = None;
            driver.alloc_handle(HandleKind::Environment, None, &mut env);
            let env = env.unwrap();
            driver.fail_next_with(MockFunction::SetEnvAttr, records);
            driver.set_odbc_version(env, AttrOdbcVersion::Odbc3);
            env
        }

        #[test]
        fn test_records_in_driver_order() {
            let driver = MockDriver::new();
            let expected = vec![
                record("HY000", "general error"),
                record("01000", "general warning"),
            ];
            let env = failed_env(&driver, expected.clone());
            let config = OdbcConfig::default();

            let records: Vec<_> =
                records_for(&driver, env, HandleKind::Environment, &config).collect();
            assert_eq!(records.len(), 2);
            assert_eq!(records[0].state.as_str(), "HY000");
            assert_eq!(records[1].state.as_str(), "01000");
            assert_eq!(records[0].native_error, 7);
            assert_eq!(records[0].message, expected[0].message);
        }

        #[test]
        fn test_record_limit() {
            let driver = MockDriver::new();
            let many = (0..5).map(|i| record("HY000", &format!("error {i}"))).collect();
            let env = failed_env(&driver, many);
            let config = OdbcConfig::builder().max_diagnostic_records(3).build().unwrap();

            let count = records_for(&driver, env, HandleKind::Environment, &config).count();
            assert_eq!(count, 3);
            // Stopped at the limit, no probe for record 4.
            assert_eq!(driver.call_count(MockFunction::GetDiagRec), 3);
        }

        #[test]
        fn test_long_message_is_requested_again() {
            let driver = MockDriver::new();
            let long = "x".repeat(600);
            let env = failed_env(&driver, vec![record("HY000", &long)]);
            let config = OdbcConfig::builder()
                .diagnostic_message_capacity(16)
                .build()
                .unwrap();

            let records: Vec<_> =
                records_for(&driver, env, HandleKind::Environment, &config).collect();
            assert_eq!(records.len(), 1);
            assert_eq!(records[0].message, long);
            // Two reads for record 1, one NoData probe for record 2.
            assert_eq!(driver.call_count(MockFunction::GetDiagRec), 3);
        }

        #[test]
        fn test_message_cut_by_driver_is_kept_partial() {
            let driver = MockDriver::new();
            driver.limit_messages(Some(5));
            let env = failed_env(&driver, vec![record("HY000", "a rather long message")]);

            let records: Vec<_> =
                records_for(&driver, env, HandleKind::Environment, &OdbcConfig::default())
                    .collect();
            assert_eq!(records[0].message, "a rat");
        }

        #[test]
        fn test_unreadable_handle_yields_nothing() {
            let driver = MockDriver::new();
            let config = OdbcConfig::default();
            let mut records = records_for(
                &driver,
                RawHandle::from_addr(0xdead),
                HandleKind::Statement,
                &config,
            );
            assert!(records.next().is_none());
            assert!(records.next().is_none());
            assert_eq!(driver.call_count(MockFunction::GetDiagRec), 1);
        }
    }
}
