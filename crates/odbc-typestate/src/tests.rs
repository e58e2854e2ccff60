//! End-to-end protocol scenarios against the mock driver.

use crate::diagnostics::State;
use crate::ffi::HandleKind;
use crate::testing::{MockColumn, MockDriver, MockFunction, MockResponse, MockValue};
use crate::{DiagnosticRecord, Environment, Executed, Odbc3, OdbcConfig, OdbcContext};

fn driver() -> MockDriver {
    let driver = MockDriver::new();
    driver.add_data_source("TESTDB", "Mock Driver", "u", "p");
    driver.on_query(
        "SELECT 1",
        MockResponse::Rows {
            columns: vec![MockColumn::integer("1").not_null()],
            rows: vec![vec![MockValue::Int(1)]],
        },
    );
    driver.on_query("DELETE FROM empty", MockResponse::NoData);
    driver.on_query("SELECT ?", MockResponse::EchoParameters);
    driver
}

#[test]
fn test_select_one_round_trip() {
    let driver = driver();
    let ctx = OdbcContext::new(driver.clone(), OdbcConfig::default());

    let env = Environment::new(&ctx)
        .unwrap()
        .declare_version::<Odbc3>()
        .unwrap()
        .into_value();
    let completion = env.connection().unwrap().connect("TESTDB", "u", "p").unwrap();
    assert!(!completion.has_warnings());
    let conn = completion.into_value();

    let stmt = conn.statement().unwrap().prepare("SELECT 1").unwrap().into_value();
    let executed = stmt.execute().unwrap();
    assert!(!executed.has_warnings());
    let Executed::HasResult(mut cursor) = executed.into_value() else {
        panic!("SELECT 1 produced no result set");
    };
    assert_eq!(cursor.num_result_cols(), 1);
    {
        let mut row = cursor.fetch().unwrap().unwrap();
        assert!(row.warnings().is_empty());
        assert_eq!(row.get_data::<i32>(1).unwrap(), Some(1));
    }
    assert!(cursor.fetch().unwrap().is_none());
    let stmt = cursor.close_cursor().unwrap().into_value();
    drop(stmt);

    let completion = conn.disconnect().unwrap();
    assert!(!completion.has_warnings());
    drop(completion);
    drop(env);

    assert_eq!(driver.call_count(MockFunction::GetDiagRec), 0);
    assert_eq!(driver.live_handles(), 0);
}

#[test]
fn test_connect_failure_then_retry() {
    let driver = driver();
    let ctx = OdbcContext::new(driver.clone(), OdbcConfig::default());
    let env = Environment::new(&ctx)
        .unwrap()
        .declare_version::<Odbc3>()
        .unwrap()
        .into_value();

    let unreachable = DiagnosticRecord::new(State::parse("08001").unwrap(), -1, "driver unreachable");
    driver.fail_next(MockFunction::Connect, unreachable.clone());

    let rejected = env.connection().unwrap().connect("TESTDB", "u", "p").unwrap_err();
    let (conn, error) = rejected.into_parts();
    assert!(error.is_driver_error());
    assert_eq!(error.function(), Some("SQLConnect"));
    assert_eq!(error.diagnostics(), std::slice::from_ref(&unreachable));

    // Still the unconnected wrapper over the same handle.
    let conn = conn.connect("TESTDB", "u", "p").unwrap().into_value();
    assert_eq!(driver.call_count(MockFunction::AllocHandle), 2);
    drop(conn);
}

#[test]
fn test_no_data_execution_has_no_cursor() {
    let driver = driver();
    let ctx = OdbcContext::new(driver.clone(), OdbcConfig::default());
    let env = Environment::new(&ctx)
        .unwrap()
        .declare_version::<Odbc3>()
        .unwrap()
        .into_value();
    let conn = env.connection().unwrap().connect("TESTDB", "u", "p").unwrap().into_value();

    let executed = conn
        .statement()
        .unwrap()
        .execute_direct("DELETE FROM empty")
        .unwrap()
        .into_value();
    let Executed::NoResult(stmt) = executed else {
        panic!("NoData produced a cursor");
    };
    assert_eq!(driver.call_count(MockFunction::NumResultCols), 0);
    assert_eq!(stmt.row_count().unwrap(), Some(0));
}

#[test]
fn test_column_index_bounds() {
    let driver = driver();
    let ctx = OdbcContext::new(driver.clone(), OdbcConfig::default());
    let env = Environment::new(&ctx)
        .unwrap()
        .declare_version::<Odbc3>()
        .unwrap()
        .into_value();
    let conn = env.connection().unwrap().connect("TESTDB", "u", "p").unwrap().into_value();
    let mut cursor = conn
        .statement()
        .unwrap()
        .execute_direct("SELECT 1")
        .unwrap()
        .into_value()
        .into_cursor()
        .unwrap();

    let mut row = cursor.fetch().unwrap().unwrap();
    assert!(row.get_data::<i32>(0).unwrap_err().is_out_of_range());
    assert!(row.get_data::<i32>(2).unwrap_err().is_out_of_range());
    assert_eq!(driver.call_count(MockFunction::GetData), 0);
    assert_eq!(row.get_data::<i32>(1).unwrap(), Some(1));
}

#[test]
fn test_null_parameter_echo() {
    let driver = driver();
    let ctx = OdbcContext::new(driver, OdbcConfig::default());
    let env = Environment::new(&ctx)
        .unwrap()
        .declare_version::<Odbc3>()
        .unwrap()
        .into_value();
    let conn = env.connection().unwrap().connect("TESTDB", "u", "p").unwrap().into_value();
    let mut stmt = conn.statement().unwrap().prepare("SELECT ?").unwrap().into_value();
    stmt.bind(1, &None::<String>).unwrap();

    let mut cursor = stmt.execute().unwrap().into_value().into_cursor().unwrap();
    let mut row = cursor.fetch().unwrap().unwrap();
    assert_eq!(row.get_data::<String>(1).unwrap(), None);
}

#[test]
fn test_every_handle_released_once_children_first() {
    let driver = driver();
    {
        let ctx = OdbcContext::new(driver.clone(), OdbcConfig::default());
        let env = Environment::new(&ctx)
            .unwrap()
            .declare_version::<Odbc3>()
            .unwrap()
            .into_value();
        let first = env.connection().unwrap().connect("TESTDB", "u", "p").unwrap().into_value();
        let second = env.connection().unwrap().connect("TESTDB", "u", "p").unwrap().into_value();
        let _a = first.statement().unwrap();
        let _b = first.statement().unwrap();
        let _c = second
            .statement()
            .unwrap()
            .execute_direct("SELECT 1")
            .unwrap()
            .into_value();
    }

    assert_eq!(driver.live_handles(), 0);
    assert_eq!(driver.call_count(MockFunction::AllocHandle), 6);
    assert_eq!(driver.call_count(MockFunction::FreeHandle), 6);
    assert_eq!(driver.call_count(MockFunction::Disconnect), 2);

    let freed = driver.freed_kinds();
    assert_eq!(freed.last(), Some(&HandleKind::Environment));
    let statements = freed.iter().filter(|&&k| k == HandleKind::Statement).count();
    assert_eq!(statements, 3);
    // No statement is freed after the last connection.
    let last_connection = freed.iter().rposition(|&k| k == HandleKind::Connection).unwrap();
    assert!(freed[last_connection..].iter().all(|&k| k != HandleKind::Statement));
}
