//! Result sets and values served by [`MockDriver`](super::MockDriver).

use crate::binding::Nullability;
use crate::ffi::{CDataType, SqlDataType};

/// A column of a scripted result set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockColumn {
    pub name: String,
    pub data_type: SqlDataType,
    pub column_size: usize,
    pub decimal_digits: i16,
    pub nullable: Nullability,
}

impl MockColumn {
    pub fn new(name: &str, data_type: SqlDataType, column_size: usize, decimal_digits: i16) -> Self {
        Self {
            name: name.to_string(),
            data_type,
            column_size,
            decimal_digits,
            nullable: Nullability::Nullable,
        }
    }

    pub fn integer(name: &str) -> Self {
        Self::new(name, SqlDataType::Integer, 10, 0)
    }

    pub fn bigint(name: &str) -> Self {
        Self::new(name, SqlDataType::BigInt, 19, 0)
    }

    pub fn double(name: &str) -> Self {
        Self::new(name, SqlDataType::Double, 15, 0)
    }

    pub fn decimal(name: &str, precision: usize, scale: i16) -> Self {
        Self::new(name, SqlDataType::Decimal, precision, scale)
    }

    pub fn bit(name: &str) -> Self {
        Self::new(name, SqlDataType::Bit, 1, 0)
    }

    pub fn varchar(name: &str, length: usize) -> Self {
        Self::new(name, SqlDataType::VarChar, length, 0)
    }

    pub fn char(name: &str, length: usize) -> Self {
        Self::new(name, SqlDataType::Char, length, 0)
    }

    pub fn varbinary(name: &str, length: usize) -> Self {
        Self::new(name, SqlDataType::VarBinary, length, 0)
    }

    #[must_use]
    pub const fn not_null(mut self) -> Self {
        self.nullable = Nullability::NoNulls;
        self
    }
}

/// A cell value, or a parameter value read back from a bound buffer.
#[derive(Debug, Clone, PartialEq)]
pub enum MockValue {
    Null,
    Int(i64),
    Double(f64),
    Text(String),
    Binary(Vec<u8>),
    Bool(bool),
}

impl MockValue {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }
}

/// What the driver does when a statement text is executed.
#[derive(Debug, Clone, PartialEq)]
pub enum MockResponse {
    /// Opens a cursor over `rows`.
    Rows {
        columns: Vec<MockColumn>,
        rows: Vec<Vec<MockValue>>,
    },
    /// No result set; `SQLRowCount` reports the count.
    Affected(isize),
    /// `SQL_NO_DATA` from the execute call.
    NoData,
    /// One row holding the bound input parameters in position order.
    EchoParameters,
    /// Writes the given values into bound output parameters.
    Outputs(Vec<(u16, MockValue)>),
}

/// SQLSTATE and message of a failed conversion.
pub(crate) type ConversionError = (&'static str, &'static str);

const INVALID_CAST: ConversionError = ("22018", "Invalid character value for cast specification");
const OUT_OF_RANGE: ConversionError = ("22003", "Numeric value out of range");
const RESTRICTED: ConversionError = ("07006", "Restricted data type attribute violation");

impl MockValue {
    /// Bytes in the `target` layout, as a driver would convert them.
    /// `None` for NULL.
    pub(crate) fn to_c(&self, target: CDataType) -> Result<Option<Vec<u8>>, ConversionError> {
        if *self == Self::Null {
            return Ok(None);
        }
        let bytes = match target {
            CDataType::Char => self.render().into_bytes(),
            CDataType::Binary => match self {
                Self::Text(text) => text.clone().into_bytes(),
                Self::Binary(bytes) => bytes.clone(),
                _ => return Err(RESTRICTED),
            },
            CDataType::Bit => match self.integer()? {
                0 => vec![0],
                1 => vec![1],
                _ => return Err(OUT_OF_RANGE),
            },
            CDataType::Float => (self.float()? as f32).to_ne_bytes().to_vec(),
            CDataType::Double => self.float()?.to_ne_bytes().to_vec(),
            integer => encode_integer(integer, self.integer()?)?,
        };
        Ok(Some(bytes))
    }

    /// Decodes a bound buffer of layout `c_type`.
    pub(crate) fn from_c(c_type: CDataType, bytes: &[u8]) -> Self {
        fn array<const N: usize>(bytes: &[u8]) -> [u8; N] {
            let mut out = [0_u8; N];
            let n = bytes.len().min(N);
            out[..n].copy_from_slice(&bytes[..n]);
            out
        }

        match c_type {
            CDataType::Char => Self::Text(String::from_utf8_lossy(bytes).into_owned()),
            CDataType::Binary => Self::Binary(bytes.to_vec()),
            CDataType::Bit => Self::Bool(bytes.first().is_some_and(|&b| b != 0)),
            CDataType::STinyInt => Self::Int(i8::from_ne_bytes(array(bytes)).into()),
            CDataType::UTinyInt => Self::Int(u8::from_ne_bytes(array(bytes)).into()),
            CDataType::SShort => Self::Int(i16::from_ne_bytes(array(bytes)).into()),
            CDataType::UShort => Self::Int(u16::from_ne_bytes(array(bytes)).into()),
            CDataType::SLong => Self::Int(i32::from_ne_bytes(array(bytes)).into()),
            CDataType::ULong => Self::Int(u32::from_ne_bytes(array(bytes)).into()),
            CDataType::SBigInt => Self::Int(i64::from_ne_bytes(array(bytes))),
            CDataType::UBigInt => Self::Int(u64::from_ne_bytes(array(bytes)) as i64),
            CDataType::Float => Self::Double(f32::from_ne_bytes(array(bytes)).into()),
            CDataType::Double => Self::Double(f64::from_ne_bytes(array(bytes))),
        }
    }

    fn render(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Int(value) => value.to_string(),
            Self::Double(value) => value.to_string(),
            Self::Text(text) => text.clone(),
            Self::Binary(bytes) => bytes.iter().map(|b| format!("{b:02X}")).collect(),
            Self::Bool(value) => u8::from(*value).to_string(),
        }
    }

    fn integer(&self) -> Result<i64, ConversionError> {
        match self {
            Self::Int(value) => Ok(*value),
            Self::Bool(value) => Ok(i64::from(*value)),
            Self::Double(value) if value.is_finite() => {
                let truncated = value.trunc();
                if truncated < i64::MIN as f64 || truncated > i64::MAX as f64 {
                    Err(OUT_OF_RANGE)
                } else {
                    Ok(truncated as i64)
                }
            }
            Self::Double(_) => Err(OUT_OF_RANGE),
            Self::Text(text) => text.trim().parse().map_err(|_| INVALID_CAST),
            Self::Binary(_) | Self::Null => Err(RESTRICTED),
        }
    }

    fn float(&self) -> Result<f64, ConversionError> {
        match self {
            Self::Int(value) => Ok(*value as f64),
            Self::Double(value) => Ok(*value),
            Self::Bool(value) => Ok(f64::from(u8::from(*value))),
            Self::Text(text) => text.trim().parse().map_err(|_| INVALID_CAST),
            Self::Binary(_) | Self::Null => Err(RESTRICTED),
        }
    }
}

fn encode_integer(target: CDataType, value: i64) -> Result<Vec<u8>, ConversionError> {
    let range = |_| OUT_OF_RANGE;
    Ok(match target {
        CDataType::STinyInt => i8::try_from(value).map_err(range)?.to_ne_bytes().to_vec(),
        CDataType::UTinyInt => u8::try_from(value).map_err(range)?.to_ne_bytes().to_vec(),
        CDataType::SShort => i16::try_from(value).map_err(range)?.to_ne_bytes().to_vec(),
        CDataType::UShort => u16::try_from(value).map_err(range)?.to_ne_bytes().to_vec(),
        CDataType::SLong => i32::try_from(value).map_err(range)?.to_ne_bytes().to_vec(),
        CDataType::ULong => u32::try_from(value).map_err(range)?.to_ne_bytes().to_vec(),
        CDataType::SBigInt => value.to_ne_bytes().to_vec(),
        CDataType::UBigInt => u64::try_from(value).map_err(range)?.to_ne_bytes().to_vec(),
        _ => return Err(RESTRICTED),
    })
}

/// SQL type a bound parameter of layout `c_type` is echoed as.
pub(crate) const fn echo_type(c_type: CDataType) -> SqlDataType {
    match c_type {
        CDataType::Char => SqlDataType::VarChar,
        CDataType::Binary => SqlDataType::VarBinary,
        CDataType::Bit => SqlDataType::Bit,
        CDataType::Float | CDataType::Double => SqlDataType::Double,
        _ => SqlDataType::BigInt,
    }
}
