//! Environment handle and ODBC version declaration.

mod listing;

use std::fmt;
use std::marker::PhantomData;

pub use listing::{DataSourceInfo, DataSourceScope, DriverInfo};

use crate::connection::{Connection, Unconnected};
use crate::context::OdbcContext;
use crate::diagnostics::Diagnostics;
use crate::error::Result;
use crate::ffi::{AttrOdbcVersion, HandleKind};
use crate::handle::OwnedHandle;
use crate::outcome::{Rejected, Transition};
use crate::sealed::private::Sealed;

/// Environment before an ODBC version has been declared.
#[derive(Debug)]
pub enum Uninitialized {}

/// ODBC 3.x behavior.
#[derive(Debug)]
pub enum Odbc3 {}

/// ODBC 3.8 behavior.
#[derive(Debug)]
pub enum Odbc3m8 {}

/// State marker of an environment.
pub trait EnvironmentState: Sealed {}

/// Declared ODBC version; connections can only be allocated under one.
pub trait OdbcVersion: EnvironmentState {
    const ATTRIBUTE: AttrOdbcVersion;
    const NAME: &'static str;
}

impl Sealed for Uninitialized {}
impl Sealed for Odbc3 {}
impl Sealed for Odbc3m8 {}
impl EnvironmentState for Uninitialized {}
impl EnvironmentState for Odbc3 {}
impl EnvironmentState for Odbc3m8 {}

impl OdbcVersion for Odbc3 {
    const ATTRIBUTE: AttrOdbcVersion = AttrOdbcVersion::Odbc3;
    const NAME: &'static str = "3.0";
}

impl OdbcVersion for Odbc3m8 {
    const ATTRIBUTE: AttrOdbcVersion = AttrOdbcVersion::Odbc3_80;
    const NAME: &'static str = "3.80";
}

/// Root of a handle tree.
pub struct Environment<'ctx, V: EnvironmentState> {
    handle: OwnedHandle<'ctx>,
    version: PhantomData<V>,
}

impl<'ctx> Environment<'ctx, Uninitialized> {
    /// Allocates an environment handle.
    pub fn new(ctx: &'ctx OdbcContext) -> Result<Self> {
        Ok(Self {
            handle: OwnedHandle::allocate(ctx, HandleKind::Environment, None)?,
            version: PhantomData,
        })
    }

    /// Declares the ODBC version the application expects.
    pub fn declare_version<V: OdbcVersion>(self) -> Transition<Environment<'ctx, V>, Self> {
        const FUNCTION: &str = "SQLSetEnvAttr";

        let result = self
            .handle
            .call(FUNCTION, |api, raw| api.set_odbc_version(raw, V::ATTRIBUTE))
            .and_then(|checked| checked.complete(()));

        match result {
            Ok(done) => {
                tracing::debug!(version = V::NAME, "declared ODBC version");
                Ok(done.map(|()| Environment {
                    handle: self.handle,
                    version: PhantomData,
                }))
            }
            Err(error) => Err(Rejected::new(self, error)),
        }
    }
}

impl<V: OdbcVersion> Environment<'_, V> {
    /// Allocates a connection handle; shorthand for [`Connection::new`].
    pub fn connection(&self) -> Result<Connection<'_, Unconnected>> {
        Connection::new(self)
    }
}

impl<'ctx, V: EnvironmentState> Environment<'ctx, V> {
    pub(crate) const fn handle(&self) -> &OwnedHandle<'ctx> {
        &self.handle
    }

    /// Records attached by the most recent call on this environment.
    pub fn diagnostics(&self) -> Diagnostics<'ctx> {
        self.handle.diagnostics()
    }
}

impl<V: EnvironmentState> fmt::Debug for Environment<'_, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("state", &std::any::type_name::<V>())
            .field("handle", &self.handle)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OdbcConfig;
    use crate::diagnostics::{DiagnosticRecord, State};
    use crate::testing::{MockDriver, MockFunction};

    #[test]
    fn test_declare_version() {
        let driver = MockDriver::new();
        let ctx = OdbcContext::new(driver.clone(), OdbcConfig::default());
        let env = Environment::new(&ctx).unwrap();
        let env = env.declare_version::<Odbc3m8>().unwrap().into_value();
        assert_eq!(driver.declared_version(), Some(AttrOdbcVersion::Odbc3_80));
        drop(env);
        assert_eq!(driver.live_handles(), 0);
    }

    #[test]
    fn test_connection_allocated_with_warning() {
        let driver = MockDriver::new();
        driver.add_data_source("TESTDB", "Mock Driver", "u", "p");
        let ctx = OdbcContext::new(driver.clone(), OdbcConfig::default());
        let env = Environment::new(&ctx)
            .unwrap()
            .declare_version::<Odbc3>()
            .unwrap()
            .into_value();
        driver.warn_next(
            MockFunction::AllocHandle,
            DiagnosticRecord::new(State::parse("01000").unwrap(), 0, "pooling disabled"),
        );

        let conn = env.connection().unwrap();
        // Read from the new handle first, then from the environment.
        assert!(driver.call_count(MockFunction::GetDiagRec) >= 2);
        assert!(conn.connect("TESTDB", "u", "p").is_ok());
    }

    #[test]
    fn test_declare_version_rejection_returns_uninitialized() {
        let driver = MockDriver::new();
        let ctx = OdbcContext::new(driver.clone(), OdbcConfig::default());
        let env = Environment::new(&ctx).unwrap();
        driver.fail_next(
            MockFunction::SetEnvAttr,
            DiagnosticRecord::new(State::parse("HY024").unwrap(), 0, "invalid attribute value"),
        );

        let rejected = env.declare_version::<Odbc3>().unwrap_err();
        assert!(rejected.error().has_state("HY024"));
        let env = rejected.into_previous();
        let env = env.declare_version::<Odbc3>().unwrap().into_value();
        assert!(env.connection().is_ok());
    }
}
