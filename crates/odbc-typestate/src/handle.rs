//! Ownership of native handles.
//!
//! [`OwnedHandle`] is the only holder of a [`RawHandle`]. It is allocated
//! under its parent and released exactly once when dropped. Wrappers in the
//! protocol layer move it between their states but never duplicate it.
//!
//! Every native call made through a handle goes through [`OwnedHandle::call`],
//! which polls `StillExecuting`, classifies the return code and pulls the
//! diagnostic records only when the outcome carries any.

use std::cell::Cell;
use std::fmt;
use std::marker::PhantomData;

use crate::config::OdbcConfig;
use crate::context::OdbcContext;
use crate::diagnostics::{DiagnosticRecord, Diagnostics, log_diagnostics, records_for};
use crate::error::{Error, Result};
use crate::ffi::{CompletionType, HandleKind, NativeApi, RawHandle, SqlReturn};
use crate::outcome::{Completion, Outcome};

/// Release obligations beyond `SQLFreeHandle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Lifecycle {
    Allocated,
    /// Connection handle with an open session.
    Connected,
    /// Connected with autocommit off; pending work is rolled back on drop.
    Transaction,
}

/// Exclusively owned native handle.
///
/// `Send` so ownership can move across threads, `!Sync` because a handle
/// tree serves one sequence of calls at a time.
pub struct OwnedHandle<'a> {
    ctx: &'a OdbcContext,
    raw: RawHandle,
    kind: HandleKind,
    lifecycle: Lifecycle,
    _not_sync: PhantomData<Cell<()>>,
}

impl<'a> OwnedHandle<'a> {
    /// Allocates a handle of `kind` under `parent`.
    ///
    /// On failure the diagnostics come from the parent, since no child
    /// handle exists to hold them.
    ///
    /// Allocation warnings are logged only: allocation has no previous
    /// state to return, and the records are gone once the next call is
    /// made on either handle. They are read from the new handle, or from
    /// the parent when the driver left them there.
    pub(crate) fn allocate(
        ctx: &'a OdbcContext,
        kind: HandleKind,
        parent: Option<&OwnedHandle<'_>>,
    ) -> Result<Self> {
        const FUNCTION: &str = "SQLAllocHandle";

        let mut output = None;
        let code = ctx
            .api()
            .alloc_handle(kind, parent.map(OwnedHandle::raw), &mut output);
        let outcome = Outcome::classify(FUNCTION, code)?;

        match (outcome, output) {
            (Outcome::Success | Outcome::SuccessWithInfo, Some(raw)) => {
                let handle = Self {
                    ctx,
                    raw,
                    kind,
                    lifecycle: Lifecycle::Allocated,
                    _not_sync: PhantomData,
                };
                if outcome == Outcome::SuccessWithInfo && ctx.config().log_warnings() {
                    let mut records: Vec<_> = handle.diagnostics().collect();
                    if records.is_empty() {
                        records = parent.map(|p| p.diagnostics().collect()).unwrap_or_default();
                    }
                    log_diagnostics(FUNCTION, &records);
                }
                tracing::debug!(handle.kind = %kind, handle.raw = raw.addr(), "allocated handle");
                Ok(handle)
            }
            (Outcome::Success | Outcome::SuccessWithInfo, None) => Err(Error::protocol_violation(
                FUNCTION,
                format!("{outcome} without an output {kind} handle"),
            )),
            (Outcome::Error, _) => {
                let records: Vec<DiagnosticRecord> =
                    parent.map(|p| p.diagnostics().collect()).unwrap_or_default();
                tracing::error!(handle.kind = %kind, diagnostics = ?records, "handle allocation failed");
                Err(Error::allocation_failed(kind, records))
            }
            (Outcome::InvalidHandle, _) => Err(Error::allocation_failed(kind, Vec::new())),
            (other, _) => Err(unexpected(FUNCTION, other)),
        }
    }

    pub const fn raw(&self) -> RawHandle {
        self.raw
    }

    pub const fn kind(&self) -> HandleKind {
        self.kind
    }

    pub(crate) const fn context(&self) -> &'a OdbcContext {
        self.ctx
    }

    pub(crate) fn api(&self) -> &'a dyn NativeApi {
        self.ctx.api()
    }

    pub(crate) const fn config(&self) -> &'a OdbcConfig {
        self.ctx.config()
    }

    /// Records attached by the most recent call on this handle.
    pub fn diagnostics(&self) -> Diagnostics<'a> {
        records_for(self.ctx.api(), self.raw, self.kind, self.ctx.config())
    }

    pub(crate) const fn set_lifecycle(&mut self, lifecycle: Lifecycle) {
        self.lifecycle = lifecycle;
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Calling into the driver
    // ═══════════════════════════════════════════════════════════════════════

    /// Issues `call`, re-issuing it while the driver reports
    /// `StillExecuting`, and classifies the final code.
    pub(crate) fn invoke(
        &self,
        function: &'static str,
        mut call: impl FnMut(&dyn NativeApi, RawHandle) -> SqlReturn,
    ) -> Result<Outcome> {
        let api = self.ctx.api();
        let mut polls = 0_u32;
        loop {
            let outcome = Outcome::classify(function, call(api, self.raw))?;
            if outcome != Outcome::StillExecuting {
                if polls > 0 {
                    tracing::debug!(function, polls, "asynchronous call completed");
                }
                return Ok(outcome);
            }
            polls += 1;
            std::thread::sleep(self.ctx.config().poll_interval());
        }
    }

    /// Turns an outcome into warnings or an error, retrieving diagnostics
    /// only for `SuccessWithInfo` and `Error`.
    pub(crate) fn attach(
        &self,
        function: &'static str,
        outcome: Outcome,
    ) -> Result<Vec<DiagnosticRecord>> {
        match outcome {
            Outcome::Success | Outcome::NoData => Ok(Vec::new()),
            Outcome::SuccessWithInfo => {
                let records: Vec<_> = self.diagnostics().collect();
                if self.ctx.config().log_warnings() {
                    log_diagnostics(function, &records);
                }
                Ok(records)
            }
            Outcome::Error => {
                let records: Vec<_> = self.diagnostics().collect();
                for record in &records {
                    tracing::error!(
                        function,
                        state = %record.state,
                        native_error = record.native_error,
                        message = %record.message,
                        "driver error"
                    );
                }
                Err(Error::driver(function, outcome, records))
            }
            Outcome::InvalidHandle => {
                tracing::error!(function, handle.kind = %self.kind, "driver rejected handle");
                Err(Error::driver(function, outcome, Vec::new()))
            }
            Outcome::NeedData | Outcome::StillExecuting => Err(unexpected(function, outcome)),
        }
    }

    /// [`invoke`](Self::invoke) followed by [`attach`](Self::attach).
    pub(crate) fn call(
        &self,
        function: &'static str,
        call: impl FnMut(&dyn NativeApi, RawHandle) -> SqlReturn,
    ) -> Result<Checked> {
        let outcome = self.invoke(function, call)?;
        let warnings = self.attach(function, outcome)?;
        Ok(Checked {
            function,
            outcome,
            warnings,
        })
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Release
    // ═══════════════════════════════════════════════════════════════════════

    fn report_release(&self, function: &'static str, code: SqlReturn) {
        if code == SqlReturn::SUCCESS || std::thread::panicking() {
            return;
        }
        let records: Vec<_> =
            if code == SqlReturn::ERROR || code == SqlReturn::SUCCESS_WITH_INFO {
                self.diagnostics().collect()
            } else {
                Vec::new()
            };
        if code == SqlReturn::SUCCESS_WITH_INFO {
            log_diagnostics(function, &records);
        } else {
            tracing::error!(
                function,
                handle.kind = %self.kind,
                handle.raw = self.raw.addr(),
                code = code.0,
                diagnostics = ?records,
                "failed to release handle"
            );
        }
    }
}

impl Drop for OwnedHandle<'_> {
    fn drop(&mut self) {
        let api = self.ctx.api();

        if self.lifecycle == Lifecycle::Transaction {
            let code = api.end_tran(self.raw, CompletionType::Rollback);
            self.report_release("SQLEndTran", code);
        }
        if self.lifecycle != Lifecycle::Allocated {
            let code = api.disconnect(self.raw);
            self.report_release("SQLDisconnect", code);
        }

        let code = api.free_handle(self.kind, self.raw);
        if code == SqlReturn::SUCCESS {
            tracing::debug!(handle.kind = %self.kind, handle.raw = self.raw.addr(), "freed handle");
        } else {
            self.report_release("SQLFreeHandle", code);
        }
    }
}

impl fmt::Debug for OwnedHandle<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnedHandle")
            .field("kind", &self.kind)
            .field("raw", &self.raw)
            .field("lifecycle", &self.lifecycle)
            .finish_non_exhaustive()
    }
}

/// Classified result of a call that did not fail.
#[derive(Debug)]
pub(crate) struct Checked {
    pub(crate) function: &'static str,
    pub(crate) outcome: Outcome,
    pub(crate) warnings: Vec<DiagnosticRecord>,
}

impl Checked {
    /// Requires `Success` or `SuccessWithInfo`.
    pub(crate) fn success(self) -> Result<Vec<DiagnosticRecord>> {
        if self.outcome.is_success() {
            Ok(self.warnings)
        } else {
            Err(unexpected(self.function, self.outcome))
        }
    }

    /// Requires success and wraps `value` with the warnings.
    pub(crate) fn complete<T>(self, value: T) -> Result<Completion<T>> {
        let function = self.function;
        let warnings = self.success()?;
        Ok(Completion::new(value, function, warnings))
    }
}

/// Protocol violation for an outcome the called function may not produce.
pub(crate) fn unexpected(function: &'static str, outcome: Outcome) -> Error {
    tracing::error!(function, outcome = %outcome, "unexpected outcome");
    Error::protocol_violation(function, format!("unexpected {outcome}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::State;
    use crate::testing::{MockDriver, MockFunction};

    fn context(driver: &MockDriver) -> OdbcContext {
        OdbcContext::new(driver.clone(), OdbcConfig::default())
    }

    #[test]
    fn test_allocate_and_drop_frees_once() {
        let driver = MockDriver::new();
        let ctx = context(&driver);
        {
            let env = OwnedHandle::allocate(&ctx, HandleKind::Environment, None).unwrap();
            assert_eq!(env.kind(), HandleKind::Environment);
            assert_eq!(driver.live_handles(), 1);
        }
        assert_eq!(driver.live_handles(), 0);
        assert_eq!(driver.call_count(MockFunction::FreeHandle), 1);
    }

    #[test]
    fn test_allocation_failure_carries_parent_diagnostics() {
        let driver = MockDriver::new();
        let ctx = context(&driver);
        let env = OwnedHandle::allocate(&ctx, HandleKind::Environment, None).unwrap();
        driver.fail_next(
            MockFunction::AllocHandle,
            DiagnosticRecord::new(State::parse("HY001").unwrap(), 7, "out of memory"),
        );

        let err = OwnedHandle::allocate(&ctx, HandleKind::Connection, Some(&env)).unwrap_err();
        assert!(err.is_allocation_failed());
        assert_eq!(err.diagnostics().len(), 1);
        assert_eq!(err.diagnostics()[0].state.as_str(), "HY001");
        assert_eq!(driver.live_handles(), 1);
    }

    #[test]
    fn test_unknown_code_from_allocation_is_protocol_violation() {
        let driver = MockDriver::new();
        let ctx = context(&driver);
        driver.respond_next(MockFunction::AllocHandle, SqlReturn(7));
        let err = OwnedHandle::allocate(&ctx, HandleKind::Environment, None).unwrap_err();
        assert!(err.is_protocol_violation());
    }

    #[test]
    fn test_call_without_diagnostics_on_success() {
        let driver = MockDriver::new();
        let ctx = context(&driver);
        let env = OwnedHandle::allocate(&ctx, HandleKind::Environment, None).unwrap();
        let checked = env
            .call("SQLSetEnvAttr", |api, raw| {
                api.set_odbc_version(raw, crate::ffi::AttrOdbcVersion::Odbc3)
            })
            .unwrap();
        assert_eq!(checked.outcome, Outcome::Success);
        assert!(checked.warnings.is_empty());
        assert_eq!(driver.call_count(MockFunction::GetDiagRec), 0);
    }

    #[test]
    fn test_call_polls_still_executing() {
        let driver = MockDriver::new();
        let config = OdbcConfig::builder()
            .poll_interval(std::time::Duration::from_millis(1))
            .build()
            .unwrap();
        let ctx = OdbcContext::new(driver.clone(), config);
        let env = OwnedHandle::allocate(&ctx, HandleKind::Environment, None).unwrap();
        driver.still_executing(MockFunction::SetEnvAttr, 3);

        let checked = env
            .call("SQLSetEnvAttr", |api, raw| {
                api.set_odbc_version(raw, crate::ffi::AttrOdbcVersion::Odbc3)
            })
            .unwrap();
        assert_eq!(checked.outcome, Outcome::Success);
        assert_eq!(driver.call_count(MockFunction::SetEnvAttr), 4);
    }

    #[test]
    fn test_need_data_is_protocol_violation() {
        let driver = MockDriver::new();
        let ctx = context(&driver);
        let env = OwnedHandle::allocate(&ctx, HandleKind::Environment, None).unwrap();
        driver.respond_next(MockFunction::SetEnvAttr, SqlReturn::NEED_DATA);
        let err = env
            .call("SQLSetEnvAttr", |api, raw| {
                api.set_odbc_version(raw, crate::ffi::AttrOdbcVersion::Odbc3)
            })
            .unwrap_err();
        assert!(err.is_protocol_violation());
        assert!(err.is_fatal());
    }

    #[test]
    fn test_invalid_handle_has_no_diagnostics() {
        let driver = MockDriver::new();
        let ctx = context(&driver);
        let env = OwnedHandle::allocate(&ctx, HandleKind::Environment, None).unwrap();
        driver.respond_next(MockFunction::SetEnvAttr, SqlReturn::INVALID_HANDLE);
        let err = env
            .call("SQLSetEnvAttr", |api, raw| {
                api.set_odbc_version(raw, crate::ffi::AttrOdbcVersion::Odbc3)
            })
            .unwrap_err();
        assert!(err.is_invalid_handle());
        assert_eq!(driver.call_count(MockFunction::GetDiagRec), 0);
    }

    #[test]
    fn test_failed_release_is_logged_not_panicked() {
        let driver = MockDriver::new();
        let ctx = context(&driver);
        let env = OwnedHandle::allocate(&ctx, HandleKind::Environment, None).unwrap();
        driver.fail_next(
            MockFunction::FreeHandle,
            DiagnosticRecord::new(State::parse("HY010").unwrap(), 0, "sequence error"),
        );
        drop(env);
        assert_eq!(driver.call_count(MockFunction::FreeHandle), 1);
    }

    #[test]
    fn test_handle_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<OwnedHandle<'static>>();
    }
}
