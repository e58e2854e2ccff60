//! Native call surface.
//!
//! Everything above this module talks to the driver manager exclusively
//! through [`NativeApi`]. Each trait method corresponds to exactly one
//! native call, returns the raw [`SqlReturn`] code and writes its output
//! parameters into caller-provided slots. No method interprets the return
//! code; classification happens in [`crate::outcome`].
//!
//! Two implementations exist:
//! - `native::OdbcSys` (feature `native`) forwards to the system driver
//!   manager through `odbc-sys`.
//! - `testing::MockDriver` (feature `test-utils`) is an in-memory driver
//!   with scripted return codes and diagnostics.

#[cfg(feature = "native")]
pub mod native;

use std::fmt;

// ═══════════════════════════════════════════════════════════════════════════
// Return codes and handles
// ═══════════════════════════════════════════════════════════════════════════

/// Raw return code of a native call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SqlReturn(pub i16);

impl SqlReturn {
    pub const SUCCESS: Self = Self(0);
    pub const SUCCESS_WITH_INFO: Self = Self(1);
    pub const ERROR: Self = Self(-1);
    pub const INVALID_HANDLE: Self = Self(-2);
    pub const STILL_EXECUTING: Self = Self(2);
    pub const NEED_DATA: Self = Self(99);
    pub const NO_DATA: Self = Self(100);
}

/// Opaque token identifying a native handle.
///
/// Only meaningful to the [`NativeApi`] implementation that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawHandle(usize);

impl RawHandle {
    #[must_use]
    pub const fn from_addr(addr: usize) -> Self {
        Self(addr)
    }

    #[must_use]
    pub const fn addr(self) -> usize {
        self.0
    }
}

/// The four kinds of native handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleKind {
    Environment,
    Connection,
    Statement,
    Descriptor,
}

impl fmt::Display for HandleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Environment => "environment",
            Self::Connection => "connection",
            Self::Statement => "statement",
            Self::Descriptor => "descriptor",
        };
        f.write_str(name)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Data type tags
// ═══════════════════════════════════════════════════════════════════════════

/// Host-side buffer layout tag (the `SQL_C_*` family).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CDataType {
    Char,
    Binary,
    Bit,
    STinyInt,
    UTinyInt,
    SShort,
    UShort,
    SLong,
    ULong,
    SBigInt,
    UBigInt,
    Float,
    Double,
}

impl CDataType {
    /// Native numeric value of the tag.
    #[must_use]
    pub const fn raw(self) -> i16 {
        match self {
            Self::Char => 1,
            Self::Binary => -2,
            Self::Bit => -7,
            Self::STinyInt => -26,
            Self::UTinyInt => -28,
            Self::SShort => -15,
            Self::UShort => -17,
            Self::SLong => -16,
            Self::ULong => -18,
            Self::SBigInt => -25,
            Self::UBigInt => -27,
            Self::Float => 7,
            Self::Double => 8,
        }
    }

    /// Buffer width for fixed-size layouts, `None` for variable-length ones.
    #[must_use]
    pub const fn fixed_size(self) -> Option<usize> {
        match self {
            Self::Char | Self::Binary => None,
            Self::Bit | Self::STinyInt | Self::UTinyInt => Some(1),
            Self::SShort | Self::UShort => Some(2),
            Self::SLong | Self::ULong | Self::Float => Some(4),
            Self::SBigInt | Self::UBigInt | Self::Double => Some(8),
        }
    }

    /// Whether the driver appends a NUL terminator to delivered data.
    #[must_use]
    pub const fn is_nul_terminated(self) -> bool {
        matches!(self, Self::Char)
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Char => "SQL_C_CHAR",
            Self::Binary => "SQL_C_BINARY",
            Self::Bit => "SQL_C_BIT",
            Self::STinyInt => "SQL_C_STINYINT",
            Self::UTinyInt => "SQL_C_UTINYINT",
            Self::SShort => "SQL_C_SSHORT",
            Self::UShort => "SQL_C_USHORT",
            Self::SLong => "SQL_C_SLONG",
            Self::ULong => "SQL_C_ULONG",
            Self::SBigInt => "SQL_C_SBIGINT",
            Self::UBigInt => "SQL_C_UBIGINT",
            Self::Float => "SQL_C_FLOAT",
            Self::Double => "SQL_C_DOUBLE",
        }
    }
}

impl fmt::Display for CDataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Database-side column or parameter type (the `SQL_*` family).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlDataType {
    Unknown,
    Char,
    VarChar,
    LongVarChar,
    WChar,
    WVarChar,
    WLongVarChar,
    Decimal,
    Numeric,
    SmallInt,
    Integer,
    Real,
    Float,
    Double,
    Bit,
    TinyInt,
    BigInt,
    Binary,
    VarBinary,
    LongVarBinary,
    Date,
    Time,
    Timestamp,
    /// Driver-specific type code.
    Other(i16),
}

impl SqlDataType {
    #[must_use]
    pub const fn from_raw(raw: i16) -> Self {
        match raw {
            0 => Self::Unknown,
            1 => Self::Char,
            12 => Self::VarChar,
            -1 => Self::LongVarChar,
            -8 => Self::WChar,
            -9 => Self::WVarChar,
            -10 => Self::WLongVarChar,
            3 => Self::Decimal,
            2 => Self::Numeric,
            5 => Self::SmallInt,
            4 => Self::Integer,
            7 => Self::Real,
            6 => Self::Float,
            8 => Self::Double,
            -7 => Self::Bit,
            -6 => Self::TinyInt,
            -5 => Self::BigInt,
            -2 => Self::Binary,
            -3 => Self::VarBinary,
            -4 => Self::LongVarBinary,
            91 => Self::Date,
            92 => Self::Time,
            93 => Self::Timestamp,
            other => Self::Other(other),
        }
    }

    #[must_use]
    pub const fn raw(self) -> i16 {
        match self {
            Self::Unknown => 0,
            Self::Char => 1,
            Self::VarChar => 12,
            Self::LongVarChar => -1,
            Self::WChar => -8,
            Self::WVarChar => -9,
            Self::WLongVarChar => -10,
            Self::Decimal => 3,
            Self::Numeric => 2,
            Self::SmallInt => 5,
            Self::Integer => 4,
            Self::Real => 7,
            Self::Float => 6,
            Self::Double => 8,
            Self::Bit => -7,
            Self::TinyInt => -6,
            Self::BigInt => -5,
            Self::Binary => -2,
            Self::VarBinary => -3,
            Self::LongVarBinary => -4,
            Self::Date => 91,
            Self::Time => 92,
            Self::Timestamp => 93,
            Self::Other(raw) => raw,
        }
    }

    #[must_use]
    pub const fn is_text(self) -> bool {
        matches!(
            self,
            Self::Char
                | Self::VarChar
                | Self::LongVarChar
                | Self::WChar
                | Self::WVarChar
                | Self::WLongVarChar
        )
    }

    #[must_use]
    pub const fn is_binary(self) -> bool {
        matches!(self, Self::Binary | Self::VarBinary | Self::LongVarBinary)
    }

    #[must_use]
    pub const fn is_integer(self) -> bool {
        matches!(
            self,
            Self::TinyInt | Self::SmallInt | Self::Integer | Self::BigInt
        )
    }

    /// Integer, exact-decimal and floating types.
    #[must_use]
    pub const fn is_numeric(self) -> bool {
        self.is_integer()
            || matches!(
                self,
                Self::Decimal | Self::Numeric | Self::Real | Self::Float | Self::Double
            )
    }

    #[must_use]
    pub const fn is_temporal(self) -> bool {
        matches!(self, Self::Date | Self::Time | Self::Timestamp)
    }
}

impl fmt::Display for SqlDataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => f.write_str("SQL_UNKNOWN_TYPE"),
            Self::Char => f.write_str("SQL_CHAR"),
            Self::VarChar => f.write_str("SQL_VARCHAR"),
            Self::LongVarChar => f.write_str("SQL_LONGVARCHAR"),
            Self::WChar => f.write_str("SQL_WCHAR"),
            Self::WVarChar => f.write_str("SQL_WVARCHAR"),
            Self::WLongVarChar => f.write_str("SQL_WLONGVARCHAR"),
            Self::Decimal => f.write_str("SQL_DECIMAL"),
            Self::Numeric => f.write_str("SQL_NUMERIC"),
            Self::SmallInt => f.write_str("SQL_SMALLINT"),
            Self::Integer => f.write_str("SQL_INTEGER"),
            Self::Real => f.write_str("SQL_REAL"),
            Self::Float => f.write_str("SQL_FLOAT"),
            Self::Double => f.write_str("SQL_DOUBLE"),
            Self::Bit => f.write_str("SQL_BIT"),
            Self::TinyInt => f.write_str("SQL_TINYINT"),
            Self::BigInt => f.write_str("SQL_BIGINT"),
            Self::Binary => f.write_str("SQL_BINARY"),
            Self::VarBinary => f.write_str("SQL_VARBINARY"),
            Self::LongVarBinary => f.write_str("SQL_LONGVARBINARY"),
            Self::Date => f.write_str("SQL_TYPE_DATE"),
            Self::Time => f.write_str("SQL_TYPE_TIME"),
            Self::Timestamp => f.write_str("SQL_TYPE_TIMESTAMP"),
            Self::Other(raw) => write!(f, "driver type {raw}"),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Call options
// ═══════════════════════════════════════════════════════════════════════════

/// Indicator value for SQL NULL.
pub const NULL_DATA: isize = -1;
/// Indicator value when the driver cannot report the remaining length.
pub const NO_TOTAL: isize = -4;

/// Value of the `SQL_ATTR_ODBC_VERSION` environment attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrOdbcVersion {
    Odbc3,
    Odbc3_80,
}

/// Direction argument of the enumeration calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOrientation {
    Next,
    First,
    FirstUser,
    FirstSystem,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionType {
    Commit,
    Rollback,
}

/// Option argument of `SQLFreeStmt`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreeStmtOption {
    Close,
    Unbind,
    ResetParams,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamDirection {
    Input,
    InputOutput,
    Output,
}

// ═══════════════════════════════════════════════════════════════════════════
// NativeApi
// ═══════════════════════════════════════════════════════════════════════════

/// One method per native call.
///
/// String inputs are passed as byte slices with explicit lengths; output
/// text buffers are written NUL-terminated and truncated to the slice
/// length, while the paired length slot receives the full length the
/// driver had available.
pub trait NativeApi: Send + Sync {
    /// `SQLAllocHandle`. On success `output` receives the new handle.
    fn alloc_handle(
        &self,
        kind: HandleKind,
        parent: Option<RawHandle>,
        output: &mut Option<RawHandle>,
    ) -> SqlReturn;

    /// `SQLFreeHandle`.
    fn free_handle(&self, kind: HandleKind, handle: RawHandle) -> SqlReturn;

    /// `SQLGetDiagRec` for the 1-based `record`.
    fn get_diag_rec(
        &self,
        kind: HandleKind,
        handle: RawHandle,
        record: i16,
        state: &mut [u8; 6],
        native_error: &mut i32,
        message: &mut [u8],
        text_length: &mut i16,
    ) -> SqlReturn;

    /// `SQLSetEnvAttr(SQL_ATTR_ODBC_VERSION)`.
    fn set_odbc_version(&self, env: RawHandle, version: AttrOdbcVersion) -> SqlReturn;

    /// `SQLDataSources`.
    fn data_sources(
        &self,
        env: RawHandle,
        direction: FetchOrientation,
        server_name: &mut [u8],
        server_name_length: &mut i16,
        description: &mut [u8],
        description_length: &mut i16,
    ) -> SqlReturn;

    /// `SQLDrivers`. Attributes are delivered as `key=value` pairs, each
    /// NUL-terminated, with an extra NUL closing the list.
    fn drivers(
        &self,
        env: RawHandle,
        direction: FetchOrientation,
        description: &mut [u8],
        description_length: &mut i16,
        attributes: &mut [u8],
        attributes_length: &mut i16,
    ) -> SqlReturn;

    /// `SQLConnect`.
    fn connect(&self, dbc: RawHandle, dsn: &[u8], user: &[u8], password: &[u8]) -> SqlReturn;

    /// `SQLDriverConnect` without prompting and without returning the
    /// completed connection string.
    fn driver_connect(&self, dbc: RawHandle, connection_string: &[u8]) -> SqlReturn;

    /// `SQLDisconnect`.
    fn disconnect(&self, dbc: RawHandle) -> SqlReturn;

    /// `SQLSetConnectAttr(SQL_ATTR_AUTOCOMMIT)`.
    fn set_autocommit(&self, dbc: RawHandle, enabled: bool) -> SqlReturn;

    /// `SQLEndTran` on a connection handle.
    fn end_tran(&self, dbc: RawHandle, completion: CompletionType) -> SqlReturn;

    /// `SQLPrepare`.
    fn prepare(&self, stmt: RawHandle, text: &[u8]) -> SqlReturn;

    /// `SQLExecDirect`.
    fn exec_direct(&self, stmt: RawHandle, text: &[u8]) -> SqlReturn;

    /// `SQLExecute`.
    fn execute(&self, stmt: RawHandle) -> SqlReturn;

    /// `SQLNumResultCols`.
    fn num_result_cols(&self, stmt: RawHandle, count: &mut i16) -> SqlReturn;

    /// `SQLRowCount`.
    fn row_count(&self, stmt: RawHandle, count: &mut isize) -> SqlReturn;

    /// `SQLDescribeCol` for the 1-based `column`.
    fn describe_col(
        &self,
        stmt: RawHandle,
        column: u16,
        name: &mut [u8],
        name_length: &mut i16,
        data_type: &mut i16,
        column_size: &mut usize,
        decimal_digits: &mut i16,
        nullable: &mut i16,
    ) -> SqlReturn;

    /// `SQLTables`. `None` arguments are passed as null pointers.
    fn tables(
        &self,
        stmt: RawHandle,
        catalog: Option<&[u8]>,
        schema: Option<&[u8]>,
        table: Option<&[u8]>,
        table_type: Option<&[u8]>,
    ) -> SqlReturn;

    /// `SQLFetch`.
    fn fetch(&self, stmt: RawHandle) -> SqlReturn;

    /// `SQLGetData` into `buffer`. `indicator` receives the length
    /// remaining before this call, [`NULL_DATA`] or [`NO_TOTAL`].
    fn get_data(
        &self,
        stmt: RawHandle,
        column: u16,
        target: CDataType,
        buffer: &mut [u8],
        indicator: &mut isize,
    ) -> SqlReturn;

    /// `SQLBindParameter`.
    ///
    /// # Safety
    ///
    /// `value` must point to `buffer_length` bytes and `indicator` to one
    /// `isize`; both must stay valid and must not move until the binding is
    /// replaced, reset, or the statement handle is freed. The driver reads
    /// (and for output directions writes) them during later execute calls.
    unsafe fn bind_parameter(
        &self,
        stmt: RawHandle,
        position: u16,
        direction: ParamDirection,
        value_type: CDataType,
        parameter_type: SqlDataType,
        column_size: usize,
        decimal_digits: i16,
        value: *mut u8,
        buffer_length: isize,
        indicator: *mut isize,
    ) -> SqlReturn;

    /// `SQLCloseCursor`.
    fn close_cursor(&self, stmt: RawHandle) -> SqlReturn;

    /// `SQLFreeStmt`.
    fn free_stmt(&self, stmt: RawHandle, option: FreeStmtOption) -> SqlReturn;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_data_type_raw_roundtrip_for_known_codes() {
        for raw in [0, 1, 2, 3, 4, 5, 6, 7, 8, 12, 91, 92, 93, -1, -2, -3, -4, -5, -6, -7, -8, -9, -10] {
            assert_eq!(SqlDataType::from_raw(raw).raw(), raw);
        }
    }

    #[test]
    fn test_sql_data_type_unknown_code_is_preserved() {
        let ty = SqlDataType::from_raw(-155);
        assert_eq!(ty, SqlDataType::Other(-155));
        assert_eq!(ty.to_string(), "driver type -155");
    }

    #[test]
    fn test_c_data_type_fixed_sizes() {
        assert_eq!(CDataType::SLong.fixed_size(), Some(4));
        assert_eq!(CDataType::Double.fixed_size(), Some(8));
        assert_eq!(CDataType::Bit.fixed_size(), Some(1));
        assert_eq!(CDataType::Char.fixed_size(), None);
        assert!(CDataType::Char.is_nul_terminated());
        assert!(!CDataType::Binary.is_nul_terminated());
    }

    #[test]
    fn test_sql_data_type_families() {
        assert!(SqlDataType::WVarChar.is_text());
        assert!(SqlDataType::LongVarBinary.is_binary());
        assert!(SqlDataType::Decimal.is_numeric());
        assert!(!SqlDataType::Decimal.is_integer());
        assert!(SqlDataType::Timestamp.is_temporal());
    }

    #[test]
    fn test_handle_kind_display() {
        assert_eq!(HandleKind::Statement.to_string(), "statement");
    }
}
