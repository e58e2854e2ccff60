//! Closed registry of host-buffer ↔ SQL type conversions.
//!
//! Consulted at bind time against the declared parameter type and at fetch
//! time against the described column type, before any native call.

use crate::error::{Error, Result};
use crate::ffi::{CDataType, SqlDataType};

/// Whether the driver is asked to convert between `host` and `native`.
#[must_use]
pub const fn is_supported(host: CDataType, native: SqlDataType) -> bool {
    match host {
        CDataType::STinyInt
        | CDataType::UTinyInt
        | CDataType::SShort
        | CDataType::UShort
        | CDataType::SLong
        | CDataType::ULong
        | CDataType::SBigInt
        | CDataType::UBigInt
        | CDataType::Float
        | CDataType::Double => {
            native.is_numeric() || native.is_text() || matches!(native, SqlDataType::Bit)
        }
        CDataType::Bit => {
            native.is_integer() || native.is_text() || matches!(native, SqlDataType::Bit)
        }
        CDataType::Char => !native.is_binary(),
        CDataType::Binary => native.is_binary() || native.is_text(),
    }
}

/// Fails with `UnsupportedConversion` naming both sides.
pub fn check(host_name: &'static str, host: CDataType, native: SqlDataType) -> Result<()> {
    if is_supported(host, native) {
        Ok(())
    } else {
        tracing::debug!(host = host_name, c_type = %host, sql_type = %native, "conversion rejected");
        Err(Error::unsupported_conversion(host_name, native.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integers_accept_numeric_bit_and_text() {
        for native in [
            SqlDataType::Integer,
            SqlDataType::BigInt,
            SqlDataType::Decimal,
            SqlDataType::Numeric,
            SqlDataType::Double,
            SqlDataType::Bit,
            SqlDataType::VarChar,
            SqlDataType::WChar,
        ] {
            assert!(is_supported(CDataType::SLong, native), "{native}");
        }
    }

    #[test]
    fn test_integers_reject_binary_and_temporal() {
        assert!(!is_supported(CDataType::SLong, SqlDataType::VarBinary));
        assert!(!is_supported(CDataType::SBigInt, SqlDataType::Timestamp));
        assert!(!is_supported(CDataType::UTinyInt, SqlDataType::Other(-150)));
    }

    #[test]
    fn test_bit_rules() {
        assert!(is_supported(CDataType::Bit, SqlDataType::Bit));
        assert!(is_supported(CDataType::Bit, SqlDataType::SmallInt));
        assert!(!is_supported(CDataType::Bit, SqlDataType::Double));
    }

    #[test]
    fn test_char_accepts_everything_but_binary() {
        assert!(is_supported(CDataType::Char, SqlDataType::Timestamp));
        assert!(is_supported(CDataType::Char, SqlDataType::Other(-150)));
        assert!(is_supported(CDataType::Char, SqlDataType::Unknown));
        assert!(!is_supported(CDataType::Char, SqlDataType::LongVarBinary));
    }

    #[test]
    fn test_binary_rules() {
        assert!(is_supported(CDataType::Binary, SqlDataType::VarBinary));
        assert!(is_supported(CDataType::Binary, SqlDataType::LongVarChar));
        assert!(!is_supported(CDataType::Binary, SqlDataType::Integer));
    }

    #[test]
    fn test_check_names_both_sides() {
        let err = check("f64", CDataType::Double, SqlDataType::VarBinary).unwrap_err();
        assert!(err.is_unsupported_conversion());
        assert!(err.to_string().contains("f64"));
        assert!(err.to_string().contains("SQL_VARBINARY"));
    }
}
