//! Typestate-enforced safe layer over ODBC.
//!
//! Environment, connection and statement handles are wrapped in types whose
//! state parameter records the protocol phase. Operations that are invalid
//! in a phase do not exist on that type, and every transition consumes the
//! old wrapper, so calling out of sequence fails to compile instead of
//! failing in the driver.
//!
//! Every native return code is classified ([`outcome::Outcome`]); failures
//! carry the driver's diagnostic records verbatim, warnings travel with the
//! successful value ([`Completion`]), and a failed transition hands back the
//! untouched input wrapper ([`Rejected`]). Handles are released exactly once,
//! children before parents.
//!
//! # Features
//!
//! - `native`: [`OdbcContext::native`] over the system driver manager
//!   through `odbc-sys`
//! - `test-utils`: the in-memory [`testing::MockDriver`]
//!
//! # Example
//!
//! ```rust,ignore
//! use odbc_typestate::{Environment, Executed, OdbcConfig, OdbcContext, Odbc3};
//!
//! let ctx = OdbcContext::native(OdbcConfig::default());
//! let env = Environment::new(&ctx)?.declare_version::<Odbc3>()?.into_value();
//! let conn = env.connection()?.connect("TESTDB", "user", "secret")?.into_value();
//! let stmt = conn.statement()?.prepare("SELECT 1")?.into_value();
//! let Executed::HasResult(mut cursor) = stmt.execute()?.into_value() else {
//!     return Ok(());
//! };
//! while let Some(mut row) = cursor.fetch()? {
//!     println!("{:?}", row.get_data::<i32>(1)?);
//! }
//! ```

pub mod binding;
pub mod config;
pub mod connection;
pub mod context;
pub mod diagnostics;
pub mod environment;
pub mod error;
pub mod ffi;
pub mod handle;
pub mod outcome;
mod sealed;
pub mod statement;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

#[cfg(test)]
mod tests;

pub use binding::{
    ColumnDescriptor, FixedText, Indicator, InputParameter, Nullability, OutputValue,
    ParamDescriptor,
};
pub use config::{ConfigBuilder, OdbcConfig, load_config, load_config_from_path};
pub use connection::{Connected, Connection, ConnectionState, IsConnected, Manual, Unconnected};
pub use context::OdbcContext;
pub use diagnostics::{DiagnosticRecord, State as SqlState};
pub use environment::{
    DataSourceInfo, DataSourceScope, DriverInfo, Environment, EnvironmentState, Odbc3, Odbc3m8,
    OdbcVersion, Uninitialized,
};
pub use error::{Error, Result};
pub use outcome::{Completion, Outcome, Rejected, Transition};
pub use statement::{
    CursorClosed, CursorOpen, Executed, Field, HasResult, NoResult, Prepared, ResultState, Row,
    Rows, Statement, StatementState, Unprepared,
};
