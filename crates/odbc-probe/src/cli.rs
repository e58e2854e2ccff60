//! Command-line arguments.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use odbc_typestate::DataSourceScope;

#[derive(Parser, Debug)]
#[command(name = "odbc-probe")]
#[command(about = "Inspect ODBC drivers and data sources, run ad-hoc queries", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable JSON logging output
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// List installed drivers and their attributes
    Drivers,

    /// List configured data sources
    Sources {
        /// Only user data sources
        #[arg(long, conflicts_with = "system")]
        user: bool,

        /// Only system data sources
        #[arg(long)]
        system: bool,
    },

    /// Run one statement and print its result
    Query(QueryArgs),
}

impl Command {
    /// Scope selected by `sources --user/--system`.
    pub const fn scope(user: bool, system: bool) -> DataSourceScope {
        match (user, system) {
            (true, _) => DataSourceScope::User,
            (_, true) => DataSourceScope::System,
            _ => DataSourceScope::All,
        }
    }
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
#[command(group(clap::ArgGroup::new("target").required(true).args(["dsn", "connection_string"])))]
pub struct QueryArgs {
    /// Data source name
    #[arg(long)]
    pub dsn: Option<String>,

    /// User name for --dsn
    #[arg(short, long, default_value = "")]
    pub user: String,

    /// Password for --dsn
    #[arg(short, long, env = "ODBC_PASSWORD", default_value = "", hide_env_values = true)]
    pub password: String,

    /// Full connection string, e.g. "DSN=sales;UID=me;PWD=secret"
    #[arg(long, conflicts_with = "dsn")]
    pub connection_string: Option<String>,

    /// Positional parameter value, bound as text; repeat in marker order
    #[arg(long = "param", value_name = "VALUE")]
    pub params: Vec<String>,

    /// Stop after this many rows
    #[arg(long)]
    pub max_rows: Option<usize>,

    /// Statement text
    pub sql: String,
}
