//! Parameter binding.

use super::{NoResult, ResultState, Statement, StatementState};
use crate::binding::{
    Indicator, InputParameter, Nullability, OutputValue, ParamDescriptor, ParameterSlot, registry,
};
use crate::error::{Error, Result};
use crate::ffi::{FreeStmtOption, ParamDirection};

const BIND_PARAMETER: &str = "SQLBindParameter";

impl<S: StatementState> Statement<'_, S, NoResult> {
    /// Binds `value` as input parameter `position` (1-based) declared as
    /// `descriptor`.
    ///
    /// The statement keeps its own copy of the encoded value until the
    /// position is re-bound, parameters are reset or the statement is
    /// dropped. A value longer than the declared column size is bound in
    /// full; the returned indicator shows the real length. A NULL is
    /// refused for a descriptor declared [`Nullability::NoNulls`].
    pub fn bind_parameter<T: InputParameter + ?Sized>(
        &mut self,
        position: u16,
        descriptor: ParamDescriptor,
        value: &T,
    ) -> Result<Indicator> {
        check_position(position)?;
        registry::check(T::TYPE_NAME, T::C_TYPE, descriptor.data_type)?;

        let encoded = value.encode();
        if encoded.is_none() && descriptor.nullable == Nullability::NoNulls {
            return Err(Error::unsupported_conversion(
                T::TYPE_NAME,
                format!("NULL into {} NOT NULL", descriptor.data_type),
            ));
        }
        let slot = ParameterSlot::input(T::C_TYPE, descriptor, encoded.as_deref());
        let indicator = slot.indicator().unwrap_or(Indicator::Null);
        if T::C_TYPE.fixed_size().is_none() && indicator.is_truncated(descriptor.column_size) {
            tracing::warn!(
                position,
                length = indicator.length(),
                column_size = descriptor.column_size,
                sql_type = %descriptor.data_type,
                "parameter value exceeds declared size"
            );
        }
        self.install(position, ParamDirection::Input, slot)?;
        Ok(indicator)
    }

    /// Binds `value` with its default descriptor.
    pub fn bind<T: InputParameter + ?Sized>(&mut self, position: u16, value: &T) -> Result<Indicator> {
        self.bind_parameter(position, value.default_descriptor(), value)
    }

    /// Binds an output buffer for parameter `position`, read back with
    /// [`output_value`](Statement::output_value) after execution.
    pub fn bind_output<T: OutputValue>(
        &mut self,
        position: u16,
        descriptor: ParamDescriptor,
    ) -> Result<()> {
        check_position(position)?;
        registry::check(T::TYPE_NAME, T::C_TYPE, descriptor.data_type)?;
        let slot = ParameterSlot::output(T::C_TYPE, descriptor);
        self.install(position, ParamDirection::Output, slot)
    }

    /// Unbinds every parameter and releases the buffers.
    pub fn reset_parameters(&mut self) -> Result<()> {
        self.handle
            .call("SQLFreeStmt", |api, raw| {
                api.free_stmt(raw, FreeStmtOption::ResetParams)
            })?
            .success()?;
        tracing::debug!(released = self.parameters.len(), "parameters reset");
        self.parameters.clear();
        Ok(())
    }

    fn install(
        &mut self,
        position: u16,
        direction: ParamDirection,
        mut slot: ParameterSlot,
    ) -> Result<()> {
        let c_type = slot.c_type();
        let descriptor = *slot.descriptor();
        let value = slot.value_ptr();
        let buffer_length = slot.buffer_length();
        let indicator = slot.indicator_ptr();

        self.handle
            .call(BIND_PARAMETER, |api, raw| {
                // SAFETY: both buffers are heap allocations owned by `slot`,
                // which is stored in `self.parameters` below and stays there
                // until re-bound, reset, or dropped after the handle is freed.
                unsafe {
                    api.bind_parameter(
                        raw,
                        position,
                        direction,
                        c_type,
                        descriptor.data_type,
                        descriptor.column_size,
                        descriptor.decimal_digits,
                        value,
                        buffer_length,
                        indicator,
                    )
                }
            })?
            .success()?;

        tracing::debug!(position, ?direction, c_type = %c_type, sql_type = %descriptor.data_type, "parameter bound");
        self.parameters.insert(position, slot);
        Ok(())
    }
}

impl<S: StatementState, R: ResultState> Statement<'_, S, R> {
    /// Value the driver wrote into output parameter `position`; `None` for
    /// SQL NULL.
    pub fn output_value<T: OutputValue>(&self, position: u16) -> Result<Option<T>> {
        let slot = self
            .parameters
            .get(position)
            .filter(|slot| slot.direction() != ParamDirection::Input)
            .ok_or_else(|| {
                Error::out_of_range("output parameter", usize::from(position), self.parameters.len())
            })?;
        if slot.c_type() != T::C_TYPE {
            return Err(Error::unsupported_conversion(
                T::TYPE_NAME,
                format!("{} output buffer", slot.c_type()),
            ));
        }
        slot.delivered().map(T::decode).transpose()
    }
}

fn check_position(position: u16) -> Result<()> {
    if position == 0 {
        return Err(Error::out_of_range("parameter", 0, usize::from(u16::MAX)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::binding::{FixedText, Indicator, Nullability, ParamDescriptor};
    use crate::config::OdbcConfig;
    use crate::context::OdbcContext;
    use crate::environment::{Environment, Odbc3};
    use crate::ffi::SqlDataType;
    use crate::statement::Executed;
    use crate::testing::{MockDriver, MockFunction, MockResponse, MockValue};

    fn context() -> (MockDriver, OdbcContext) {
        let driver = MockDriver::new();
        driver.add_data_source("TESTDB", "Mock Driver", "u", "p");
        driver.on_query("SELECT ?", MockResponse::EchoParameters);
        driver.on_query("SELECT ?, ?, ?", MockResponse::EchoParameters);
        driver.on_query("INSERT INTO t VALUES (?)", MockResponse::Affected(1));
        driver.on_query(
            "{CALL answer(?)}",
            MockResponse::Outputs(vec![(1, MockValue::Int(42))]),
        );
        (driver.clone(), OdbcContext::new(driver, OdbcConfig::default()))
    }

    macro_rules! connected {
        ($ctx:expr, $env:ident, $conn:ident) => {
            let $env = Environment::new(&$ctx)
                .unwrap()
                .declare_version::<Odbc3>()
                .unwrap()
                .into_value();
            let $conn = $env
                .connection()
                .unwrap()
                .connect("TESTDB", "u", "p")
                .unwrap()
                .into_value();
        };
    }

    #[test]
    fn test_bound_values_are_read_at_execute() {
        let (_driver, ctx) = context();
        connected!(ctx, env, conn);
        let mut stmt = conn.statement().unwrap().prepare("SELECT ?, ?, ?").unwrap().into_value();
        stmt.bind(1, &7_i32).unwrap();
        stmt.bind(2, "hello").unwrap();
        stmt.bind(3, &Some(1.25_f64)).unwrap();

        let mut cursor = stmt.execute().unwrap().into_value().into_cursor().unwrap();
        let mut row = cursor.fetch().unwrap().unwrap();
        assert_eq!(row.get_data::<i32>(1).unwrap(), Some(7));
        assert_eq!(row.get_data::<String>(2).unwrap().as_deref(), Some("hello"));
        assert_eq!(row.get_data::<f64>(3).unwrap(), Some(1.25));
    }

    #[test]
    fn test_null_round_trip() {
        let (_driver, ctx) = context();
        connected!(ctx, env, conn);
        let mut stmt = conn.statement().unwrap();
        let indicator = stmt.bind(1, &None::<i32>).unwrap();
        assert_eq!(indicator, Indicator::Null);

        let mut cursor = stmt.execute_direct("SELECT ?").unwrap().into_value().into_cursor().unwrap();
        let mut row = cursor.fetch().unwrap().unwrap();
        assert_eq!(row.get_data::<i32>(1).unwrap(), None);
    }

    #[test]
    fn test_position_zero_is_out_of_range() {
        let (driver, ctx) = context();
        connected!(ctx, env, conn);
        let mut stmt = conn.statement().unwrap();
        assert!(stmt.bind(0, &1_i32).unwrap_err().is_out_of_range());
        assert_eq!(driver.call_count(MockFunction::BindParameter), 0);
    }

    #[test]
    fn test_unsupported_pair_rejected_at_bind() {
        let (driver, ctx) = context();
        connected!(ctx, env, conn);
        let mut stmt = conn.statement().unwrap();
        let err = stmt
            .bind_parameter(1, ParamDescriptor::varbinary(4), &5_i32)
            .unwrap_err();
        assert!(err.is_unsupported_conversion());
        assert!(err.to_string().contains("i32"));
        assert!(err.to_string().contains("SQL_VARBINARY"));
        assert_eq!(driver.call_count(MockFunction::BindParameter), 0);
    }

    #[test]
    fn test_null_rejected_for_not_null_parameter() {
        let (driver, ctx) = context();
        connected!(ctx, env, conn);
        let mut stmt = conn.statement().unwrap();
        let not_null = ParamDescriptor::integer().with_nullability(Nullability::NoNulls);
        let err = stmt.bind_parameter(1, not_null, &None::<i32>).unwrap_err();
        assert!(err.is_unsupported_conversion());
        assert!(err.to_string().contains("NOT NULL"));
        assert_eq!(driver.call_count(MockFunction::BindParameter), 0);

        assert_eq!(stmt.bind_parameter(1, not_null, &5_i32).unwrap(), Indicator::Length(4));
        let nullable = ParamDescriptor::integer().with_nullability(Nullability::Nullable);
        assert_eq!(stmt.bind_parameter(2, nullable, &None::<i32>).unwrap(), Indicator::Null);
    }

    #[test]
    fn test_oversized_value_reports_truncation() {
        let (_driver, ctx) = context();
        connected!(ctx, env, conn);
        let mut stmt = conn.statement().unwrap();
        let indicator = stmt
            .bind_parameter(1, ParamDescriptor::varchar(3), "abcdef")
            .unwrap();
        assert_eq!(indicator, Indicator::Length(6));
        assert!(indicator.is_truncated(3));
    }

    #[test]
    fn test_last_bind_wins() {
        let (_driver, ctx) = context();
        connected!(ctx, env, conn);
        let mut stmt = conn.statement().unwrap();
        stmt.bind(1, &1_i32).unwrap();
        stmt.bind(1, &2_i32).unwrap();

        let mut cursor = stmt.execute_direct("SELECT ?").unwrap().into_value().into_cursor().unwrap();
        let mut row = cursor.fetch().unwrap().unwrap();
        assert_eq!(row.get_data::<i32>(1).unwrap(), Some(2));
    }

    #[test]
    fn test_bound_value_outlives_caller_buffer() {
        let (driver, ctx) = context();
        connected!(ctx, env, conn);
        let mut stmt = conn.statement().unwrap();
        {
            let temporary = String::from("transient");
            stmt.bind(1, &temporary).unwrap();
        }
        let executed = stmt.execute_direct("INSERT INTO t VALUES (?)").unwrap().into_value();
        assert!(!executed.has_result());
        assert_eq!(
            driver.last_parameters(),
            vec![(1, MockValue::text("transient"))]
        );
    }

    #[test]
    fn test_reset_parameters() {
        let (driver, ctx) = context();
        connected!(ctx, env, conn);
        let mut stmt = conn.statement().unwrap();
        stmt.bind(1, &FixedText::new("ab", 4)).unwrap();
        stmt.reset_parameters().unwrap();
        let executed = stmt.execute_direct("INSERT INTO t VALUES (?)").unwrap();
        assert!(executed.into_value().into_cursor().is_err());
        assert!(driver.last_parameters().is_empty());
    }

    #[test]
    fn test_output_parameter() {
        let (_driver, ctx) = context();
        connected!(ctx, env, conn);
        let mut stmt = conn.statement().unwrap().prepare("{CALL answer(?)}").unwrap().into_value();
        stmt.bind_output::<i64>(1, ParamDescriptor::new(SqlDataType::BigInt, 19, 0))
            .unwrap();
        let Executed::NoResult(stmt) = stmt.execute().unwrap().into_value() else {
            panic!("procedure returned a result set");
        };
        assert_eq!(stmt.output_value::<i64>(1).unwrap(), Some(42));
        assert!(stmt.output_value::<String>(1).unwrap_err().is_unsupported_conversion());
        assert!(stmt.output_value::<i64>(2).unwrap_err().is_out_of_range());
    }
}
