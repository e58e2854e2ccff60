//! Subcommand execution, generic over the output sink so it runs against
//! any [`OdbcContext`].

use std::io::Write;

use anyhow::{Context, Result};
use odbc_typestate::{
    Connected, Connection, DataSourceScope, Environment, Executed, HasResult, Odbc3, OdbcContext,
    ParamDescriptor, Rejected, Statement, StatementState,
};

use crate::cli::{Command, QueryArgs};

/// Runs `command` and writes its report to `out`.
pub fn run(ctx: &OdbcContext, command: &Command, out: &mut impl Write) -> Result<()> {
    let env = Environment::new(ctx)
        .context("failed to allocate environment")?
        .declare_version::<Odbc3>()
        .map_err(Rejected::into_error)
        .context("failed to declare ODBC 3")?
        .into_value();

    match command {
        Command::Drivers => list_drivers(&env, out),
        Command::Sources { user, system } => {
            list_sources(&env, Command::scope(*user, *system), out)
        }
        Command::Query(args) => query(&env, args, out),
    }
}

fn list_drivers(env: &Environment<'_, Odbc3>, out: &mut impl Write) -> Result<()> {
    let drivers = env.drivers().context("failed to list drivers")?;
    for driver in drivers {
        let mut attributes: Vec<_> = driver
            .attributes
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect();
        attributes.sort();
        writeln!(out, "{}\t{}", driver.description, attributes.join(";"))?;
    }
    Ok(())
}

fn list_sources(
    env: &Environment<'_, Odbc3>,
    scope: DataSourceScope,
    out: &mut impl Write,
) -> Result<()> {
    let sources = env
        .data_sources(scope)
        .context("failed to list data sources")?;
    for source in sources {
        writeln!(out, "{}\t{}", source.name, source.description)?;
    }
    Ok(())
}

fn connect<'env>(
    env: &'env Environment<'_, Odbc3>,
    args: &QueryArgs,
) -> Result<Connection<'env, Connected>> {
    let conn = env.connection().context("failed to allocate connection")?;
    let connected = match (&args.connection_string, &args.dsn) {
        (Some(connection_string), _) => conn.connect_with_string(connection_string),
        (None, Some(dsn)) => conn.connect(dsn, &args.user, &args.password),
        (None, None) => anyhow::bail!("either --dsn or --connection-string is required"),
    };
    let connected = connected
        .map_err(Rejected::into_error)
        .context("failed to connect")?;
    for warning in connected.warnings() {
        tracing::info!(state = %warning.state, message = %warning.message, "connected with warning");
    }
    Ok(connected.into_value())
}

fn query(env: &Environment<'_, Odbc3>, args: &QueryArgs, out: &mut impl Write) -> Result<()> {
    let conn = connect(env, args)?;
    let mut stmt = conn.statement().context("failed to allocate statement")?;

    for (index, value) in args.params.iter().enumerate() {
        let position = u16::try_from(index + 1).context("too many parameters")?;
        let descriptor = ParamDescriptor::varchar(value.len().max(1));
        stmt.bind_parameter(position, descriptor, value.as_str())
            .with_context(|| format!("failed to bind parameter {position}"))?;
    }

    let executed = stmt
        .execute_direct(&args.sql)
        .map_err(Rejected::into_error)
        .context("failed to execute statement")?
        .into_value();

    match executed {
        Executed::HasResult(mut cursor) => {
            let printed = print_rows(&mut cursor, args.max_rows, out)?;
            tracing::debug!(rows = printed, "result printed");
            let closed = cursor
                .close_cursor()
                .map_err(Rejected::into_error)
                .context("failed to close cursor")?;
            for warning in closed.warnings() {
                tracing::info!(state = %warning.state, message = %warning.message, "cursor closed with warning");
            }
        }
        Executed::NoResult(stmt) => match stmt.row_count()? {
            Some(count) => writeln!(out, "{count} row(s) affected")?,
            None => writeln!(out, "statement executed")?,
        },
    }
    Ok(())
}

/// Prints a header line and then each row tab-separated, `NULL` for nulls
/// and hex for binary columns. Returns the number of rows printed.
fn print_rows<S: StatementState>(
    cursor: &mut Statement<'_, S, HasResult>,
    max_rows: Option<usize>,
    out: &mut impl Write,
) -> Result<usize> {
    let columns = cursor.num_result_cols();
    let mut binary = Vec::with_capacity(usize::from(columns));
    let mut names = Vec::with_capacity(usize::from(columns));
    for column in 1..=columns {
        let described = cursor.describe_col(column)?;
        binary.push(described.data_type.is_binary());
        names.push(described.name.clone());
    }
    writeln!(out, "{}", names.join("\t"))?;

    let mut printed = 0;
    while max_rows.is_none_or(|max| printed < max) {
        let Some(mut row) = cursor.fetch()? else {
            break;
        };
        let mut cells = Vec::with_capacity(binary.len());
        for (column, &is_binary) in (1..=columns).zip(&binary) {
            let cell = if is_binary {
                row.get_data::<Vec<u8>>(column)?
                    .map(|bytes| bytes.iter().map(|b| format!("{b:02X}")).collect())
            } else {
                row.get_data::<String>(column)?
            };
            cells.push(cell.unwrap_or_else(|| "NULL".to_string()));
        }
        writeln!(out, "{}", cells.join("\t"))?;
        printed += 1;
    }
    Ok(printed)
}
