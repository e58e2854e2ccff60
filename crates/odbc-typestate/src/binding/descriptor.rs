//! Column and parameter metadata.

use crate::ffi::SqlDataType;

/// Whether a column or parameter admits SQL NULL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Nullability {
    NoNulls,
    Nullable,
    #[default]
    Unknown,
}

impl Nullability {
    #[must_use]
    pub const fn from_raw(raw: i16) -> Self {
        match raw {
            0 => Self::NoNulls,
            1 => Self::Nullable,
            _ => Self::Unknown,
        }
    }

    #[must_use]
    pub const fn raw(self) -> i16 {
        match self {
            Self::NoNulls => 0,
            Self::Nullable => 1,
            Self::Unknown => 2,
        }
    }
}

/// Result set column as reported by `SQLDescribeCol`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    pub name: String,
    pub data_type: SqlDataType,
    /// `None` when the driver reports no size.
    pub column_size: Option<usize>,
    /// `None` when the driver reports no decimal digits.
    pub decimal_digits: Option<u16>,
    pub nullable: Nullability,
}

/// Declared type of a bound parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamDescriptor {
    pub data_type: SqlDataType,
    pub column_size: usize,
    pub decimal_digits: i16,
    /// Not passed to the driver. [`Nullability::NoNulls`] makes binding a
    /// NULL input fail before any native call.
    pub nullable: Nullability,
}

impl ParamDescriptor {
    #[must_use]
    pub const fn new(data_type: SqlDataType, column_size: usize, decimal_digits: i16) -> Self {
        Self {
            data_type,
            column_size,
            decimal_digits,
            nullable: Nullability::Unknown,
        }
    }

    #[must_use]
    pub const fn with_nullability(mut self, nullable: Nullability) -> Self {
        self.nullable = nullable;
        self
    }

    #[must_use]
    pub const fn varchar(length: usize) -> Self {
        Self::new(SqlDataType::VarChar, length, 0)
    }

    /// Fixed-length `CHAR(length)`.
    #[must_use]
    pub const fn char(length: usize) -> Self {
        Self::new(SqlDataType::Char, length, 0)
    }

    #[must_use]
    pub const fn varbinary(length: usize) -> Self {
        Self::new(SqlDataType::VarBinary, length, 0)
    }

    #[must_use]
    pub const fn integer() -> Self {
        Self::new(SqlDataType::Integer, 10, 0)
    }

    #[must_use]
    pub const fn bigint() -> Self {
        Self::new(SqlDataType::BigInt, 19, 0)
    }

    #[must_use]
    pub const fn double() -> Self {
        Self::new(SqlDataType::Double, 15, 0)
    }

    #[must_use]
    pub const fn decimal(precision: usize, scale: i16) -> Self {
        Self::new(SqlDataType::Decimal, precision, scale)
    }
}
