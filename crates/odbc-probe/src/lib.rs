//! Command-line probe over `odbc-typestate`.
//!
//! Lists installed drivers and configured data sources, and runs single
//! statements with optional text parameters, printing rows tab-separated.
//! Command logic takes any [`odbc_typestate::OdbcContext`], so it runs the
//! same against the system driver manager and the in-memory mock driver.

pub mod cli;
pub mod commands;
pub mod logging;

pub use cli::{Cli, Command, QueryArgs};
pub use commands::run;
pub use logging::init_logging;
