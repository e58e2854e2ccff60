//! Host types that can be bound as parameters or read from columns.
//!
//! Both traits are sealed: the supported set is closed and each
//! implementation fixes the C buffer layout it marshals through.

use std::borrow::Cow;

use super::descriptor::ParamDescriptor;
use crate::error::{Error, Result};
use crate::ffi::{CDataType, SqlDataType};
use crate::sealed::private::Sealed;

/// A value that can be bound as an input parameter.
///
/// # Sealed
///
/// Implemented for the integer and floating primitives, `bool`, text
/// (`str`, `String`, [`FixedText`]), bytes (`[u8]`, `Vec<u8>`), references
/// to those and `Option<T>`.
pub trait InputParameter: Sealed {
    /// Buffer layout handed to the driver.
    const C_TYPE: CDataType;

    /// Host type name used in conversion errors.
    const TYPE_NAME: &'static str;

    /// Declared SQL type used by `bind`.
    fn default_descriptor(&self) -> ParamDescriptor;

    /// Declared SQL type for a NULL of this type.
    fn null_descriptor() -> ParamDescriptor;

    /// Bytes in the `C_TYPE` layout, `None` for SQL NULL.
    fn encode(&self) -> Option<Cow<'_, [u8]>>;
}

/// A value that can be decoded from driver-written bytes.
pub trait OutputValue: Sealed + Sized {
    /// Buffer layout requested from the driver.
    const C_TYPE: CDataType;

    /// Host type name used in conversion errors.
    const TYPE_NAME: &'static str;

    /// Builds the value from the complete bytes of a non-null value.
    fn decode(bytes: &[u8]) -> Result<Self>;
}

fn fixed<const N: usize>(type_name: &'static str, bytes: &[u8]) -> Result<[u8; N]> {
    bytes
        .get(..N)
        .and_then(|b| <[u8; N]>::try_from(b).ok())
        .ok_or_else(|| {
            Error::protocol_violation(
                "SQLGetData",
                format!(
                    "{type_name} needs {N} bytes, driver delivered {}",
                    bytes.len()
                ),
            )
        })
}

macro_rules! fixed_size_value {
    ($($ty:ty => $c_type:ident, $sql_type:ident, $size:expr;)*) => {
        $(
            impl Sealed for $ty {}

            impl InputParameter for $ty {
                const C_TYPE: CDataType = CDataType::$c_type;
                const TYPE_NAME: &'static str = stringify!($ty);

                fn default_descriptor(&self) -> ParamDescriptor {
                    Self::null_descriptor()
                }

                fn null_descriptor() -> ParamDescriptor {
                    ParamDescriptor::new(SqlDataType::$sql_type, $size, 0)
                }

                fn encode(&self) -> Option<Cow<'_, [u8]>> {
                    Some(Cow::Owned(self.to_ne_bytes().to_vec()))
                }
            }

            impl OutputValue for $ty {
                const C_TYPE: CDataType = CDataType::$c_type;
                const TYPE_NAME: &'static str = stringify!($ty);

                fn decode(bytes: &[u8]) -> Result<Self> {
                    Ok(Self::from_ne_bytes(fixed(<Self as OutputValue>::TYPE_NAME, bytes)?))
                }
            }
        )*
    };
}

fixed_size_value! {
    i8 => STinyInt, TinyInt, 3;
    u8 => UTinyInt, TinyInt, 3;
    i16 => SShort, SmallInt, 5;
    u16 => UShort, Integer, 10;
    i32 => SLong, Integer, 10;
    u32 => ULong, BigInt, 19;
    i64 => SBigInt, BigInt, 19;
    u64 => UBigInt, Numeric, 20;
    f32 => Float, Real, 7;
    f64 => Double, Double, 15;
}

impl Sealed for bool {}

impl InputParameter for bool {
    const C_TYPE: CDataType = CDataType::Bit;
    const TYPE_NAME: &'static str = "bool";

    fn default_descriptor(&self) -> ParamDescriptor {
        Self::null_descriptor()
    }

    fn null_descriptor() -> ParamDescriptor {
        ParamDescriptor::new(SqlDataType::Bit, 1, 0)
    }

    fn encode(&self) -> Option<Cow<'_, [u8]>> {
        Some(Cow::Owned(vec![u8::from(*self)]))
    }
}

impl OutputValue for bool {
    const C_TYPE: CDataType = CDataType::Bit;
    const TYPE_NAME: &'static str = "bool";

    fn decode(bytes: &[u8]) -> Result<Self> {
        let [bit] = fixed::<1>(<Self as OutputValue>::TYPE_NAME, bytes)?;
        Ok(bit != 0)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Text
// ═══════════════════════════════════════════════════════════════════════════

impl Sealed for str {}

impl InputParameter for str {
    const C_TYPE: CDataType = CDataType::Char;
    const TYPE_NAME: &'static str = "str";

    fn default_descriptor(&self) -> ParamDescriptor {
        ParamDescriptor::varchar(self.len().max(1))
    }

    fn null_descriptor() -> ParamDescriptor {
        ParamDescriptor::varchar(1)
    }

    fn encode(&self) -> Option<Cow<'_, [u8]>> {
        Some(Cow::Borrowed(self.as_bytes()))
    }
}

impl Sealed for String {}

impl InputParameter for String {
    const C_TYPE: CDataType = CDataType::Char;
    const TYPE_NAME: &'static str = "String";

    fn default_descriptor(&self) -> ParamDescriptor {
        self.as_str().default_descriptor()
    }

    fn null_descriptor() -> ParamDescriptor {
        <str as InputParameter>::null_descriptor()
    }

    fn encode(&self) -> Option<Cow<'_, [u8]>> {
        Some(Cow::Borrowed(self.as_bytes()))
    }
}

impl OutputValue for String {
    const C_TYPE: CDataType = CDataType::Char;
    const TYPE_NAME: &'static str = "String";

    fn decode(bytes: &[u8]) -> Result<Self> {
        Self::from_utf8(bytes.to_vec()).map_err(|_| {
            Error::unsupported_conversion(
                <Self as OutputValue>::TYPE_NAME,
                "non-UTF-8 character data",
            )
        })
    }
}

/// Fixed-length text for `CHAR(n)` columns and parameters.
///
/// Encoded space-padded to its width; decoded values keep the driver's
/// padding, see [`FixedText::trimmed`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FixedText {
    text: String,
    width: usize,
}

impl FixedText {
    /// Text declared as `CHAR(width)`. Longer text is bound in full and
    /// reported truncated by the indicator.
    #[must_use]
    pub fn new(text: impl Into<String>, width: usize) -> Self {
        Self {
            text: text.into(),
            width,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn trimmed(&self) -> &str {
        self.text.trim_end_matches(' ')
    }

    pub const fn width(&self) -> usize {
        self.width
    }

    pub fn into_string(self) -> String {
        self.text
    }
}

impl Sealed for FixedText {}

impl InputParameter for FixedText {
    const C_TYPE: CDataType = CDataType::Char;
    const TYPE_NAME: &'static str = "FixedText";

    fn default_descriptor(&self) -> ParamDescriptor {
        ParamDescriptor::char(self.width.max(1))
    }

    fn null_descriptor() -> ParamDescriptor {
        ParamDescriptor::char(1)
    }

    fn encode(&self) -> Option<Cow<'_, [u8]>> {
        let padding = self.width.saturating_sub(self.text.len());
        if padding == 0 {
            return Some(Cow::Borrowed(self.text.as_bytes()));
        }
        let mut padded = Vec::with_capacity(self.width);
        padded.extend_from_slice(self.text.as_bytes());
        padded.resize(self.width, b' ');
        Some(Cow::Owned(padded))
    }
}

impl OutputValue for FixedText {
    const C_TYPE: CDataType = CDataType::Char;
    const TYPE_NAME: &'static str = "FixedText";

    fn decode(bytes: &[u8]) -> Result<Self> {
        let text = String::decode(bytes)?;
        let width = text.len();
        Ok(Self { text, width })
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Binary
// ═══════════════════════════════════════════════════════════════════════════

impl Sealed for [u8] {}

impl InputParameter for [u8] {
    const C_TYPE: CDataType = CDataType::Binary;
    const TYPE_NAME: &'static str = "[u8]";

    fn default_descriptor(&self) -> ParamDescriptor {
        ParamDescriptor::varbinary(self.len().max(1))
    }

    fn null_descriptor() -> ParamDescriptor {
        ParamDescriptor::varbinary(1)
    }

    fn encode(&self) -> Option<Cow<'_, [u8]>> {
        Some(Cow::Borrowed(self))
    }
}

impl Sealed for Vec<u8> {}

impl InputParameter for Vec<u8> {
    const C_TYPE: CDataType = CDataType::Binary;
    const TYPE_NAME: &'static str = "Vec<u8>";

    fn default_descriptor(&self) -> ParamDescriptor {
        self.as_slice().default_descriptor()
    }

    fn null_descriptor() -> ParamDescriptor {
        <[u8] as InputParameter>::null_descriptor()
    }

    fn encode(&self) -> Option<Cow<'_, [u8]>> {
        Some(Cow::Borrowed(self))
    }
}

impl OutputValue for Vec<u8> {
    const C_TYPE: CDataType = CDataType::Binary;
    const TYPE_NAME: &'static str = "Vec<u8>";

    fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(bytes.to_vec())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Wrappers
// ═══════════════════════════════════════════════════════════════════════════

impl<T: InputParameter + ?Sized> Sealed for &T {}

impl<T: InputParameter + ?Sized> InputParameter for &T {
    const C_TYPE: CDataType = T::C_TYPE;
    const TYPE_NAME: &'static str = T::TYPE_NAME;

    fn default_descriptor(&self) -> ParamDescriptor {
        (**self).default_descriptor()
    }

    fn null_descriptor() -> ParamDescriptor {
        T::null_descriptor()
    }

    fn encode(&self) -> Option<Cow<'_, [u8]>> {
        (**self).encode()
    }
}

impl<T: InputParameter> Sealed for Option<T> {}

impl<T: InputParameter> InputParameter for Option<T> {
    const C_TYPE: CDataType = T::C_TYPE;
    const TYPE_NAME: &'static str = T::TYPE_NAME;

    fn default_descriptor(&self) -> ParamDescriptor {
        self.as_ref()
            .map_or_else(T::null_descriptor, InputParameter::default_descriptor)
    }

    fn null_descriptor() -> ParamDescriptor {
        T::null_descriptor()
    }

    fn encode(&self) -> Option<Cow<'_, [u8]>> {
        self.as_ref().and_then(InputParameter::encode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_encoding_is_native_endian() {
        let bytes = 0x0102_0304_i32.encode().unwrap();
        assert_eq!(bytes.as_ref(), &0x0102_0304_i32.to_ne_bytes());
        assert_eq!(i32::decode(&bytes).unwrap(), 0x0102_0304);
    }

    #[test]
    fn test_default_descriptors() {
        assert_eq!(7_i32.default_descriptor().data_type, SqlDataType::Integer);
        assert_eq!(7_i64.default_descriptor().data_type, SqlDataType::BigInt);
        assert_eq!(1.5_f64.default_descriptor().data_type, SqlDataType::Double);
        assert_eq!(true.default_descriptor().data_type, SqlDataType::Bit);
        assert_eq!("abc".default_descriptor(), ParamDescriptor::varchar(3));
        assert_eq!("".default_descriptor(), ParamDescriptor::varchar(1));
        assert_eq!(vec![1_u8, 2].default_descriptor(), ParamDescriptor::varbinary(2));
    }

    #[test]
    fn test_short_buffer_is_protocol_violation() {
        let err = i64::decode(&[1, 2, 3]).unwrap_err();
        assert!(err.is_protocol_violation());
    }

    #[test]
    fn test_decode_errors_name_the_output_type() {
        let err = i16::decode(&[1]).unwrap_err();
        assert!(err.to_string().contains("i16"), "{err}");
        let err = bool::decode(&[]).unwrap_err();
        assert!(err.to_string().contains("bool"), "{err}");
        let err = String::decode(&[0xc3]).unwrap_err();
        assert!(err.to_string().contains("String"), "{err}");
        assert_eq!(<u32 as OutputValue>::TYPE_NAME, <u32 as InputParameter>::TYPE_NAME);
    }

    #[test]
    fn test_bool_roundtrip_through_bit() {
        assert_eq!(true.encode().unwrap().as_ref(), &[1]);
        assert!(bool::decode(&[1]).unwrap());
        assert!(!bool::decode(&[0]).unwrap());
    }

    #[test]
    fn test_option_none_encodes_null() {
        let none: Option<i32> = None;
        assert!(none.encode().is_none());
        assert_eq!(none.default_descriptor(), ParamDescriptor::integer());
        assert_eq!(<Option<&str> as InputParameter>::C_TYPE, CDataType::Char);
        assert_eq!(Some("xy").encode().unwrap().as_ref(), b"xy");
    }

    #[test]
    fn test_fixed_text_is_padded() {
        let text = FixedText::new("ab", 5);
        assert_eq!(text.encode().unwrap().as_ref(), b"ab   ");
        assert_eq!(text.default_descriptor(), ParamDescriptor::char(5));

        let decoded = FixedText::decode(b"ab   ").unwrap();
        assert_eq!(decoded.as_str(), "ab   ");
        assert_eq!(decoded.trimmed(), "ab");
        assert_eq!(decoded.width(), 5);
    }

    #[test]
    fn test_fixed_text_longer_than_width_is_not_cut() {
        let text = FixedText::new("abcdef", 3);
        assert_eq!(text.encode().unwrap().as_ref(), b"abcdef");
    }

    #[test]
    fn test_string_decode_rejects_invalid_utf8() {
        let err = String::decode(&[0xff, 0xfe]).unwrap_err();
        assert!(err.is_unsupported_conversion());
    }
}
