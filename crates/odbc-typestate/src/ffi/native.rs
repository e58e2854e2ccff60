//! [`NativeApi`] over the system driver manager.

use std::ptr::{self, null, null_mut};

use odbc_sys::{
    ConnectionAttribute, DriverConnectOption, EnvironmentAttribute, HDbc, HEnv, HStmt, Handle,
    HandleType, Len, Nullability, ParamType, Pointer, SQLAllocHandle, SQLBindParameter,
    SQLCloseCursor, SQLConnect, SQLDataSources, SQLDescribeCol, SQLDisconnect, SQLDriverConnect,
    SQLDrivers, SQLEndTran, SQLExecDirect, SQLExecute, SQLFetch, SQLFreeHandle, SQLFreeStmt,
    SQLGetData, SQLGetDiagRec, SQLNumResultCols, SQLPrepare, SQLRowCount, SQLSetConnectAttr,
    SQLSetEnvAttr, SQLTables, SmallInt, ULen,
};

use super::{
    AttrOdbcVersion, CDataType, CompletionType, FetchOrientation, FreeStmtOption, HandleKind,
    NativeApi, ParamDirection, RawHandle, SqlDataType, SqlReturn,
};

/// Forwards every call to the driver manager linked through `odbc-sys`.
#[derive(Debug, Clone, Copy, Default)]
pub struct OdbcSys;

fn handle(raw: RawHandle) -> Handle {
    ptr::with_exposed_provenance_mut(raw.addr())
}

fn env(raw: RawHandle) -> HEnv {
    ptr::with_exposed_provenance_mut(raw.addr())
}

fn dbc(raw: RawHandle) -> HDbc {
    ptr::with_exposed_provenance_mut(raw.addr())
}

fn stmt(raw: RawHandle) -> HStmt {
    ptr::with_exposed_provenance_mut(raw.addr())
}

const fn handle_type(kind: HandleKind) -> HandleType {
    match kind {
        HandleKind::Environment => HandleType::Env,
        HandleKind::Connection => HandleType::Dbc,
        HandleKind::Statement => HandleType::Stmt,
        HandleKind::Descriptor => HandleType::Desc,
    }
}

const fn c_data_type(c_type: CDataType) -> odbc_sys::CDataType {
    match c_type {
        CDataType::Char => odbc_sys::CDataType::Char,
        CDataType::Binary => odbc_sys::CDataType::Binary,
        CDataType::Bit => odbc_sys::CDataType::Bit,
        CDataType::STinyInt => odbc_sys::CDataType::STinyInt,
        CDataType::UTinyInt => odbc_sys::CDataType::UTinyInt,
        CDataType::SShort => odbc_sys::CDataType::SShort,
        CDataType::UShort => odbc_sys::CDataType::UShort,
        CDataType::SLong => odbc_sys::CDataType::SLong,
        CDataType::ULong => odbc_sys::CDataType::ULong,
        CDataType::SBigInt => odbc_sys::CDataType::SBigInt,
        CDataType::UBigInt => odbc_sys::CDataType::UBigInt,
        CDataType::Float => odbc_sys::CDataType::Float,
        CDataType::Double => odbc_sys::CDataType::Double,
    }
}

const fn fetch_orientation(direction: FetchOrientation) -> odbc_sys::FetchOrientation {
    match direction {
        FetchOrientation::Next => odbc_sys::FetchOrientation::Next,
        FetchOrientation::First => odbc_sys::FetchOrientation::First,
        FetchOrientation::FirstUser => odbc_sys::FetchOrientation::FirstUser,
        FetchOrientation::FirstSystem => odbc_sys::FetchOrientation::FirstSystem,
    }
}

const fn sql_return(code: odbc_sys::SqlReturn) -> SqlReturn {
    SqlReturn(code.0)
}

fn small_len(buffer: &[u8]) -> SmallInt {
    SmallInt::try_from(buffer.len()).unwrap_or(SmallInt::MAX)
}

fn int_len(buffer: &[u8]) -> i32 {
    i32::try_from(buffer.len()).unwrap_or(i32::MAX)
}

/// Null pointer and zero length for `None`.
fn optional_text(text: Option<&[u8]>) -> (*const u8, SmallInt) {
    text.map_or((null(), 0), |text| (text.as_ptr(), small_len(text)))
}

impl NativeApi for OdbcSys {
    fn alloc_handle(
        &self,
        kind: HandleKind,
        parent: Option<RawHandle>,
        output: &mut Option<RawHandle>,
    ) -> SqlReturn {
        let input = parent.map_or(null_mut(), handle);
        let mut allocated: Handle = null_mut();
        // SAFETY: `input` is null or a live handle of the parent kind;
        // `allocated` is a valid out pointer.
        let code = unsafe { SQLAllocHandle(handle_type(kind), input, &raw mut allocated) };
        if !allocated.is_null() {
            *output = Some(RawHandle::from_addr(allocated.expose_provenance()));
        }
        sql_return(code)
    }

    fn free_handle(&self, kind: HandleKind, raw: RawHandle) -> SqlReturn {
        // SAFETY: the caller owns `raw` and never uses it after this call.
        sql_return(unsafe { SQLFreeHandle(handle_type(kind), handle(raw)) })
    }

    fn get_diag_rec(
        &self,
        kind: HandleKind,
        raw: RawHandle,
        record: i16,
        state: &mut [u8; 6],
        native_error: &mut i32,
        message: &mut [u8],
        text_length: &mut i16,
    ) -> SqlReturn {
        // SAFETY: every out pointer refers to a live buffer of the stated
        // length.
        sql_return(unsafe {
            SQLGetDiagRec(
                handle_type(kind),
                handle(raw),
                record,
                state.as_mut_ptr(),
                native_error,
                message.as_mut_ptr(),
                small_len(message),
                text_length,
            )
        })
    }

    fn set_odbc_version(&self, raw: RawHandle, version: AttrOdbcVersion) -> SqlReturn {
        let value = match version {
            AttrOdbcVersion::Odbc3 => odbc_sys::AttrOdbcVersion::Odbc3,
            AttrOdbcVersion::Odbc3_80 => odbc_sys::AttrOdbcVersion::Odbc3_80,
        };
        // SAFETY: integer attribute passed by value.
        sql_return(unsafe {
            SQLSetEnvAttr(env(raw), EnvironmentAttribute::OdbcVersion, value.into(), 0)
        })
    }

    fn data_sources(
        &self,
        raw: RawHandle,
        direction: FetchOrientation,
        server_name: &mut [u8],
        server_name_length: &mut i16,
        description: &mut [u8],
        description_length: &mut i16,
    ) -> SqlReturn {
        // SAFETY: buffers and lengths match.
        sql_return(unsafe {
            SQLDataSources(
                env(raw),
                fetch_orientation(direction),
                server_name.as_mut_ptr(),
                small_len(server_name),
                server_name_length,
                description.as_mut_ptr(),
                small_len(description),
                description_length,
            )
        })
    }

    fn drivers(
        &self,
        raw: RawHandle,
        direction: FetchOrientation,
        description: &mut [u8],
        description_length: &mut i16,
        attributes: &mut [u8],
        attributes_length: &mut i16,
    ) -> SqlReturn {
        // SAFETY: buffers and lengths match.
        sql_return(unsafe {
            SQLDrivers(
                env(raw),
                fetch_orientation(direction),
                description.as_mut_ptr(),
                small_len(description),
                description_length,
                attributes.as_mut_ptr(),
                small_len(attributes),
                attributes_length,
            )
        })
    }

    fn connect(&self, raw: RawHandle, dsn: &[u8], user: &[u8], password: &[u8]) -> SqlReturn {
        // SAFETY: inputs are read only for the stated lengths.
        sql_return(unsafe {
            SQLConnect(
                dbc(raw),
                dsn.as_ptr(),
                small_len(dsn),
                user.as_ptr(),
                small_len(user),
                password.as_ptr(),
                small_len(password),
            )
        })
    }

    fn driver_connect(&self, raw: RawHandle, connection_string: &[u8]) -> SqlReturn {
        let mut completed_length = 0;
        // SAFETY: no window handle and no output buffer; NoPrompt never
        // opens a dialog.
        sql_return(unsafe {
            SQLDriverConnect(
                dbc(raw),
                null_mut(),
                connection_string.as_ptr(),
                small_len(connection_string),
                null_mut(),
                0,
                &raw mut completed_length,
                DriverConnectOption::NoPrompt,
            )
        })
    }

    fn disconnect(&self, raw: RawHandle) -> SqlReturn {
        // SAFETY: live connection handle.
        sql_return(unsafe { SQLDisconnect(dbc(raw)) })
    }

    fn set_autocommit(&self, raw: RawHandle, enabled: bool) -> SqlReturn {
        let value = usize::from(enabled) as Pointer;
        // SAFETY: integer attribute passed by value.
        sql_return(unsafe {
            SQLSetConnectAttr(dbc(raw), ConnectionAttribute::AutoCommit, value, 0)
        })
    }

    fn end_tran(&self, raw: RawHandle, completion: CompletionType) -> SqlReturn {
        let completion = match completion {
            CompletionType::Commit => odbc_sys::CompletionType::Commit,
            CompletionType::Rollback => odbc_sys::CompletionType::Rollback,
        };
        // SAFETY: live connection handle.
        sql_return(unsafe { SQLEndTran(HandleType::Dbc, handle(raw), completion) })
    }

    fn prepare(&self, raw: RawHandle, text: &[u8]) -> SqlReturn {
        // SAFETY: text is read for its stated length.
        sql_return(unsafe { SQLPrepare(stmt(raw), text.as_ptr(), int_len(text)) })
    }

    fn exec_direct(&self, raw: RawHandle, text: &[u8]) -> SqlReturn {
        // SAFETY: text is read for its stated length.
        sql_return(unsafe { SQLExecDirect(stmt(raw), text.as_ptr(), int_len(text)) })
    }

    fn execute(&self, raw: RawHandle) -> SqlReturn {
        // SAFETY: bound parameter buffers are owned by the statement wrapper.
        sql_return(unsafe { SQLExecute(stmt(raw)) })
    }

    fn num_result_cols(&self, raw: RawHandle, count: &mut i16) -> SqlReturn {
        // SAFETY: valid out pointer.
        sql_return(unsafe { SQLNumResultCols(stmt(raw), count) })
    }

    fn row_count(&self, raw: RawHandle, count: &mut isize) -> SqlReturn {
        let mut rows: Len = 0;
        // SAFETY: valid out pointer.
        let code = unsafe { SQLRowCount(stmt(raw), &raw mut rows) };
        *count = rows;
        sql_return(code)
    }

    fn describe_col(
        &self,
        raw: RawHandle,
        column: u16,
        name: &mut [u8],
        name_length: &mut i16,
        data_type: &mut i16,
        column_size: &mut usize,
        decimal_digits: &mut i16,
        nullable: &mut i16,
    ) -> SqlReturn {
        let mut sql_type = odbc_sys::SqlDataType::UNKNOWN_TYPE;
        let mut size: ULen = 0;
        let mut nulls = Nullability::UNKNOWN;
        // SAFETY: every out pointer refers to a live slot; name matches its
        // length.
        let code = unsafe {
            SQLDescribeCol(
                stmt(raw),
                column,
                name.as_mut_ptr(),
                small_len(name),
                name_length,
                &raw mut sql_type,
                &raw mut size,
                decimal_digits,
                &raw mut nulls,
            )
        };
        *data_type = sql_type.0;
        *column_size = size;
        *nullable = nulls.0;
        sql_return(code)
    }

    fn tables(
        &self,
        raw: RawHandle,
        catalog: Option<&[u8]>,
        schema: Option<&[u8]>,
        table: Option<&[u8]>,
        table_type: Option<&[u8]>,
    ) -> SqlReturn {
        let (catalog, catalog_len) = optional_text(catalog);
        let (schema, schema_len) = optional_text(schema);
        let (table, table_len) = optional_text(table);
        let (table_type, table_type_len) = optional_text(table_type);
        // SAFETY: each pointer is null or valid for its length.
        sql_return(unsafe {
            SQLTables(
                stmt(raw),
                catalog,
                catalog_len,
                schema,
                schema_len,
                table,
                table_len,
                table_type,
                table_type_len,
            )
        })
    }

    fn fetch(&self, raw: RawHandle) -> SqlReturn {
        // SAFETY: no columns are bound, so nothing is written on fetch.
        sql_return(unsafe { SQLFetch(stmt(raw)) })
    }

    fn get_data(
        &self,
        raw: RawHandle,
        column: u16,
        target: CDataType,
        buffer: &mut [u8],
        indicator: &mut isize,
    ) -> SqlReturn {
        let length = Len::try_from(buffer.len()).unwrap_or(Len::MAX);
        // SAFETY: buffer is writable for `length` bytes.
        sql_return(unsafe {
            SQLGetData(
                stmt(raw),
                column,
                c_data_type(target),
                buffer.as_mut_ptr().cast(),
                length,
                indicator,
            )
        })
    }

    unsafe fn bind_parameter(
        &self,
        raw: RawHandle,
        position: u16,
        direction: ParamDirection,
        value_type: CDataType,
        parameter_type: SqlDataType,
        column_size: usize,
        decimal_digits: i16,
        value: *mut u8,
        buffer_length: isize,
        indicator: *mut isize,
    ) -> SqlReturn {
        let direction = match direction {
            ParamDirection::Input => ParamType::Input,
            ParamDirection::InputOutput => ParamType::InputOutput,
            ParamDirection::Output => ParamType::Output,
        };
        // SAFETY: buffer validity is the caller's contract.
        sql_return(unsafe {
            SQLBindParameter(
                stmt(raw),
                position,
                direction,
                c_data_type(value_type),
                odbc_sys::SqlDataType(parameter_type.raw()),
                column_size,
                decimal_digits,
                value.cast(),
                buffer_length,
                indicator,
            )
        })
    }

    fn close_cursor(&self, raw: RawHandle) -> SqlReturn {
        // SAFETY: live statement handle.
        sql_return(unsafe { SQLCloseCursor(stmt(raw)) })
    }

    fn free_stmt(&self, raw: RawHandle, option: FreeStmtOption) -> SqlReturn {
        let option = match option {
            FreeStmtOption::Close => odbc_sys::FreeStmtOption::Close,
            FreeStmtOption::Unbind => odbc_sys::FreeStmtOption::Unbind,
            FreeStmtOption::ResetParams => odbc_sys::FreeStmtOption::ResetParams,
        };
        // SAFETY: live statement handle.
        sql_return(unsafe { SQLFreeStmt(stmt(raw), option) })
    }
}
