//! Statement handle: preparation, execution and the result cursor.
//!
//! A statement carries two state parameters. `S` records whether it holds a
//! prepared plan ([`Unprepared`], [`Prepared`]); `R` records whether a cursor
//! is open ([`HasResult`]) or not ([`NoResult`]). Closing a cursor returns
//! the statement to `NoResult` with its `S` intact, so a prepared statement
//! can be executed again.
//!
//! Operations that need an open cursor only exist on `HasResult`:
//!
//! ```compile_fail
//! use odbc_typestate::statement::{NoResult, Prepared, Statement};
//!
//! fn fetch_without_cursor(stmt: &mut Statement<'_, Prepared, NoResult>) {
//!     let _ = stmt.fetch();
//! }
//! ```

mod cursor;
mod params;

use std::fmt;
use std::marker::PhantomData;

pub use cursor::{Field, Row, Rows};

use crate::binding::{ColumnDescriptor, ParameterBuffers};
use crate::connection::{Connection, IsConnected, check_length};
use crate::diagnostics::Diagnostics;
use crate::error::{Error, Result};
use crate::ffi::{FreeStmtOption, HandleKind, NativeApi, RawHandle, SqlReturn};
use crate::handle::OwnedHandle;
use crate::outcome::{Completion, Outcome, Rejected, Transition};
use crate::sealed::private::Sealed;

/// No prepared plan; executes text directly.
#[derive(Debug)]
pub enum Unprepared {}

/// Holds a prepared plan.
#[derive(Debug)]
pub enum Prepared {}

/// No open cursor.
#[derive(Debug)]
pub enum NoResult {}

/// Open cursor over a result set.
#[derive(Debug)]
pub enum HasResult {}

pub type CursorOpen = HasResult;
pub type CursorClosed = NoResult;

/// Whether a statement holds a prepared plan.
pub trait StatementState: Sealed {}

/// Whether a statement has an open cursor.
pub trait ResultState: Sealed {}

impl Sealed for Unprepared {}
impl Sealed for Prepared {}
impl Sealed for NoResult {}
impl Sealed for HasResult {}
impl StatementState for Unprepared {}
impl StatementState for Prepared {}
impl ResultState for NoResult {}
impl ResultState for HasResult {}

/// Cursor bookkeeping, reset whenever the cursor closes.
#[derive(Debug, Default)]
pub(crate) struct CursorState {
    columns: u16,
    described: Vec<Option<ColumnDescriptor>>,
    exhausted: bool,
}

impl CursorState {
    fn open(columns: u16) -> Self {
        Self {
            columns,
            described: vec![None; usize::from(columns)],
            exhausted: false,
        }
    }
}

/// Statement handle borrowed from its connection.
pub struct Statement<'c, S: StatementState, R: ResultState> {
    // Declared first: the handle is freed before the buffers it points into.
    handle: OwnedHandle<'c>,
    parameters: ParameterBuffers,
    cursor: CursorState,
    state: PhantomData<(S, R)>,
}

/// Result of an execution.
#[derive(Debug)]
pub enum Executed<'c, S: StatementState> {
    /// The statement produced a result set.
    HasResult(Statement<'c, S, HasResult>),
    /// No result set: DML, DDL or `SQL_NO_DATA`.
    NoResult(Statement<'c, S, NoResult>),
}

impl<'c, S: StatementState> Executed<'c, S> {
    pub const fn has_result(&self) -> bool {
        matches!(self, Self::HasResult(_))
    }

    /// The open cursor, or the statement back if there is none.
    pub fn into_cursor(
        self,
    ) -> std::result::Result<Statement<'c, S, HasResult>, Statement<'c, S, NoResult>> {
        match self {
            Self::HasResult(stmt) => Ok(stmt),
            Self::NoResult(stmt) => Err(stmt),
        }
    }
}

impl<'c, S: StatementState, R: ResultState> Statement<'c, S, R> {
    fn retype<T: StatementState, Q: ResultState>(self) -> Statement<'c, T, Q> {
        Statement {
            handle: self.handle,
            parameters: self.parameters,
            cursor: self.cursor,
            state: PhantomData,
        }
    }

    /// Rows affected by the last execution, `None` if the driver cannot
    /// tell.
    pub fn row_count(&self) -> Result<Option<usize>> {
        let mut count = 0_isize;
        self.handle
            .call("SQLRowCount", |api, raw| api.row_count(raw, &mut count))?
            .success()?;
        Ok(usize::try_from(count).ok())
    }

    /// Records attached by the most recent call on this statement.
    pub fn diagnostics(&self) -> Diagnostics<'c> {
        self.handle.diagnostics()
    }

    fn result_columns(&self) -> Result<u16> {
        const FUNCTION: &str = "SQLNumResultCols";

        let mut count = 0_i16;
        self.handle
            .call(FUNCTION, |api, raw| api.num_result_cols(raw, &mut count))?
            .success()?;
        u16::try_from(count)
            .map_err(|_| Error::protocol_violation(FUNCTION, format!("negative column count {count}")))
    }

    /// Best-effort close after a failure left a cursor behind.
    fn discard_cursor(&self) {
        let code = self
            .handle
            .api()
            .free_stmt(self.handle.raw(), FreeStmtOption::Close);
        if code != SqlReturn::SUCCESS {
            tracing::warn!(code = code.0, "failed to close cursor after error");
        }
    }
}

impl<'c, S: StatementState> Statement<'c, S, NoResult> {
    /// Issues an executing call and types the outcome by the result set
    /// it produced.
    fn run(
        self,
        function: &'static str,
        call: impl FnMut(&dyn NativeApi, RawHandle) -> SqlReturn,
    ) -> Transition<Executed<'c, S>, Self> {
        let outcome = match self.handle.invoke(function, call) {
            Ok(outcome) => outcome,
            Err(error) => return Err(Rejected::new(self, error)),
        };
        if outcome == Outcome::NoData {
            tracing::debug!(function, "execution returned no data");
            return Ok(Completion::new(Executed::NoResult(self), function, Vec::new()));
        }
        let warnings = match self.handle.attach(function, outcome) {
            Ok(warnings) => warnings,
            Err(error) => return Err(Rejected::new(self, error)),
        };

        match self.result_columns() {
            Ok(0) => {
                tracing::debug!(function, "executed without result set");
                Ok(Completion::new(Executed::NoResult(self), function, warnings))
            }
            Ok(columns) => {
                tracing::debug!(function, columns, "executed, cursor open");
                let mut stmt = self.retype::<S, HasResult>();
                stmt.cursor = CursorState::open(columns);
                Ok(Completion::new(Executed::HasResult(stmt), function, warnings))
            }
            Err(error) => {
                self.discard_cursor();
                Err(Rejected::new(self, error))
            }
        }
    }
}

impl<'c> Statement<'c, Unprepared, NoResult> {
    /// Allocates a statement on any connected connection.
    pub fn new<C: IsConnected>(conn: &'c Connection<'_, C>) -> Result<Self> {
        let handle = OwnedHandle::allocate(
            conn.handle().context(),
            HandleKind::Statement,
            Some(conn.handle()),
        )?;
        Ok(Self {
            handle,
            parameters: ParameterBuffers::default(),
            cursor: CursorState::default(),
            state: PhantomData,
        })
    }

    /// Prepares `sql` for later [`execute`](Statement::execute) calls.
    pub fn prepare(self, sql: &str) -> Transition<Statement<'c, Prepared, NoResult>, Self> {
        const FUNCTION: &str = "SQLPrepare";

        if let Err(error) = check_text(sql) {
            return Err(Rejected::new(self, error));
        }
        let result = self
            .handle
            .call(FUNCTION, |api, raw| api.prepare(raw, sql.as_bytes()))
            .and_then(|checked| checked.complete(()));
        match result {
            Ok(done) => {
                tracing::debug!(sql, "prepared statement");
                Ok(done.map(|()| self.retype()))
            }
            Err(error) => Err(Rejected::new(self, error)),
        }
    }

    /// Executes `sql` once, using the currently bound parameters.
    pub fn execute_direct(self, sql: &str) -> Transition<Executed<'c, Unprepared>, Self> {
        if let Err(error) = check_text(sql) {
            return Err(Rejected::new(self, error));
        }
        tracing::debug!(sql, parameters = self.parameters.len(), "executing directly");
        self.run("SQLExecDirect", |api, raw| api.exec_direct(raw, sql.as_bytes()))
    }

    /// Opens a cursor over the catalog's tables. `None` arguments match
    /// everything.
    pub fn tables(
        self,
        catalog: Option<&str>,
        schema: Option<&str>,
        table: Option<&str>,
        table_type: Option<&str>,
    ) -> Transition<Statement<'c, Unprepared, HasResult>, Self> {
        const FUNCTION: &str = "SQLTables";

        let arguments = [
            ("catalog name", catalog),
            ("schema name", schema),
            ("table name", table),
            ("table type", table_type),
        ];
        for (what, text) in arguments {
            if let Some(Err(error)) = text.map(|text| check_length(what, text)) {
                return Err(Rejected::new(self, error));
            }
        }

        let executed = self.run(FUNCTION, |api, raw| {
            api.tables(
                raw,
                catalog.map(str::as_bytes),
                schema.map(str::as_bytes),
                table.map(str::as_bytes),
                table_type.map(str::as_bytes),
            )
        })?;
        let (executed, warnings) = executed.into_parts();
        match executed {
            Executed::HasResult(stmt) => Ok(Completion::new(stmt, FUNCTION, warnings)),
            Executed::NoResult(stmt) => Err(Rejected::new(
                stmt,
                Error::protocol_violation(FUNCTION, "catalog function produced no result set"),
            )),
        }
    }
}

impl<'c> Statement<'c, Prepared, NoResult> {
    /// Executes the prepared plan with the currently bound parameters.
    pub fn execute(self) -> Transition<Executed<'c, Prepared>, Self> {
        tracing::debug!(parameters = self.parameters.len(), "executing prepared statement");
        self.run("SQLExecute", |api, raw| api.execute(raw))
    }
}

impl<'c, S: StatementState> Statement<'c, S, HasResult> {
    /// Number of columns in the result set.
    pub const fn num_result_cols(&self) -> u16 {
        self.cursor.columns
    }

    /// Closes the cursor, discarding unread rows.
    pub fn close_cursor(mut self) -> Transition<Statement<'c, S, NoResult>, Self> {
        let result = self
            .handle
            .call("SQLCloseCursor", |api, raw| api.close_cursor(raw))
            .and_then(|checked| checked.complete(()));
        match result {
            Ok(done) => {
                self.cursor = CursorState::default();
                tracing::debug!("cursor closed");
                Ok(done.map(|()| self.retype()))
            }
            Err(error) => Err(Rejected::new(self, error)),
        }
    }
}

impl<S: StatementState, R: ResultState> fmt::Debug for Statement<'_, S, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Statement")
            .field("prepared", &std::any::type_name::<S>())
            .field("result", &std::any::type_name::<R>())
            .field("handle", &self.handle)
            .field("parameters", &self.parameters.len())
            .field("columns", &self.cursor.columns)
            .finish()
    }
}

/// Statement text carries an `i32` length.
fn check_text(sql: &str) -> Result<()> {
    let max = i32::MAX.unsigned_abs() as usize;
    if sql.len() > max {
        return Err(Error::out_of_range("statement length", sql.len(), max));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OdbcConfig;
    use crate::connection::Connected;
    use crate::context::OdbcContext;
    use crate::diagnostics::{DiagnosticRecord, State};
    use crate::environment::{Environment, Odbc3};
    use crate::testing::{MockColumn, MockDriver, MockFunction, MockResponse, MockValue};

    fn setup() -> (MockDriver, OdbcContext) {
        let driver = MockDriver::new();
        driver.add_data_source("TESTDB", "Mock Driver", "u", "p");
        driver.on_query(
            "SELECT id, name FROM users",
            MockResponse::Rows {
                columns: vec![MockColumn::integer("id"), MockColumn::varchar("name", 32)],
                rows: vec![
                    vec![MockValue::Int(1), MockValue::text("ada")],
                    vec![MockValue::Int(2), MockValue::Null],
                ],
            },
        );
        driver.on_query("UPDATE users SET name = 'x'", MockResponse::Affected(2));
        driver.on_query("DELETE FROM empty", MockResponse::NoData);
        let ctx = OdbcContext::new(driver.clone(), OdbcConfig::default());
        (driver, ctx)
    }

    fn connect<'a>(env: &'a Environment<'_, Odbc3>) -> Connection<'a, Connected> {
        env.connection()
            .unwrap()
            .connect("TESTDB", "u", "p")
            .unwrap()
            .into_value()
    }

    fn env(ctx: &OdbcContext) -> Environment<'_, Odbc3> {
        Environment::new(ctx)
            .unwrap()
            .declare_version::<Odbc3>()
            .unwrap()
            .into_value()
    }

    #[test]
    fn test_execute_direct_with_result_set() {
        let (_driver, ctx) = setup();
        let env = env(&ctx);
        let conn = connect(&env);
        let stmt = conn.statement().unwrap();
        let executed = stmt.execute_direct("SELECT id, name FROM users").unwrap().into_value();
        assert!(executed.has_result());
        let mut cursor = executed.into_cursor().unwrap();
        assert_eq!(cursor.num_result_cols(), 2);

        let mut ids = Vec::new();
        while let Some(mut row) = cursor.fetch().unwrap() {
            ids.push(row.get_data::<i32>(1).unwrap().unwrap());
        }
        assert_eq!(ids, vec![1, 2]);
        assert!(cursor.close_cursor().is_ok());
    }

    #[test]
    fn test_execute_direct_without_result_set() {
        let (_driver, ctx) = setup();
        let env = env(&ctx);
        let conn = connect(&env);
        let stmt = conn.statement().unwrap();
        let executed = stmt
            .execute_direct("UPDATE users SET name = 'x'")
            .unwrap()
            .into_value();
        let Executed::NoResult(stmt) = executed else {
            panic!("expected no result set");
        };
        assert_eq!(stmt.row_count().unwrap(), Some(2));
    }

    #[test]
    fn test_no_data_yields_no_result() {
        let (driver, ctx) = setup();
        let env = env(&ctx);
        let conn = connect(&env);
        let done = conn
            .statement()
            .unwrap()
            .execute_direct("DELETE FROM empty")
            .unwrap();
        assert!(!done.has_warnings());
        assert!(!done.value().has_result());
        assert_eq!(driver.call_count(MockFunction::NumResultCols), 0);
    }

    #[test]
    fn test_prepare_execute_close_cycles_are_independent() {
        let (_driver, ctx) = setup();
        let env = env(&ctx);
        let conn = connect(&env);
        let mut stmt = conn
            .statement()
            .unwrap()
            .prepare("SELECT id, name FROM users")
            .unwrap()
            .into_value();

        for _ in 0..3 {
            let mut cursor = stmt.execute().unwrap().into_value().into_cursor().unwrap();
            let mut rows = cursor.rows();
            let mut seen = 0;
            while rows.next_row().unwrap().is_some() {
                seen += 1;
            }
            assert_eq!(seen, 2);
            assert!(rows.next_row().unwrap().is_none());
            stmt = cursor.close_cursor().unwrap().into_value();
        }
    }

    #[test]
    fn test_failed_execute_returns_statement() {
        let (driver, ctx) = setup();
        let env = env(&ctx);
        let conn = connect(&env);
        let stmt = conn.statement().unwrap();
        driver.fail_next(
            MockFunction::ExecDirect,
            DiagnosticRecord::new(State::parse("42S02").unwrap(), 208, "invalid object name"),
        );
        let rejected = stmt.execute_direct("SELECT id, name FROM users").unwrap_err();
        assert!(rejected.error().has_state("42S02"));
        assert_eq!(rejected.error().function(), Some("SQLExecDirect"));

        let stmt = rejected.into_previous();
        assert!(stmt.execute_direct("SELECT id, name FROM users").is_ok());
    }

    #[test]
    fn test_unknown_query_is_syntax_error() {
        let (_driver, ctx) = setup();
        let env = env(&ctx);
        let conn = connect(&env);
        let err: Error = conn
            .statement()
            .unwrap()
            .prepare("SELEC 1")
            .unwrap_err()
            .into();
        assert!(err.has_state("42000"));
    }

    #[test]
    fn test_tables_opens_cursor() {
        let (driver, ctx) = setup();
        driver.add_table("main", "users", "TABLE");
        driver.add_table("main", "audit", "VIEW");
        let env = env(&ctx);
        let conn = connect(&env);
        let mut cursor = conn
            .statement()
            .unwrap()
            .tables(None, None, None, Some("TABLE"))
            .unwrap()
            .into_value();
        assert_eq!(cursor.num_result_cols(), 5);

        let mut names = Vec::new();
        while let Some(mut row) = cursor.fetch().unwrap() {
            names.push(row.get_data::<String>(3).unwrap().unwrap());
        }
        assert_eq!(names, vec!["users".to_string()]);
    }

    #[test]
    fn test_statement_freed_before_connection() {
        let (driver, ctx) = setup();
        {
            let env = env(&ctx);
            let conn = connect(&env);
            let _stmt = conn.statement().unwrap();
        }
        assert_eq!(driver.live_handles(), 0);
        assert_eq!(
            driver.freed_kinds(),
            vec![HandleKind::Statement, HandleKind::Connection, HandleKind::Environment]
        );
    }
}
