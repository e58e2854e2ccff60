//! Length/null indicator.

use crate::ffi::{NO_TOTAL, NULL_DATA};

/// Metadata accompanying a data buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Indicator {
    /// SQL NULL; the buffer content is meaningless.
    Null,
    /// The driver could not report the total length.
    NoTotal,
    /// Length of the complete value in bytes, excluding any terminator.
    Length(usize),
}

impl Indicator {
    /// Decodes a raw indicator. Negative values other than the documented
    /// sentinels yield `None`.
    #[must_use]
    pub const fn from_raw(raw: isize) -> Option<Self> {
        match raw {
            NULL_DATA => Some(Self::Null),
            NO_TOTAL => Some(Self::NoTotal),
            len if len >= 0 => Some(Self::Length(len.unsigned_abs())),
            _ => None,
        }
    }

    #[must_use]
    pub const fn raw(self) -> isize {
        match self {
            Self::Null => NULL_DATA,
            Self::NoTotal => NO_TOTAL,
            Self::Length(len) => len as isize,
        }
    }

    #[must_use]
    pub const fn is_null(self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub const fn length(self) -> Option<usize> {
        match self {
            Self::Length(len) => Some(len),
            _ => None,
        }
    }

    /// Whether a value with this indicator does not fit in `capacity` bytes.
    #[must_use]
    pub const fn is_truncated(self, capacity: usize) -> bool {
        match self {
            Self::Null => false,
            Self::NoTotal => true,
            Self::Length(len) => len > capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_raw_sentinels() {
        assert_eq!(Indicator::from_raw(-1), Some(Indicator::Null));
        assert_eq!(Indicator::from_raw(-4), Some(Indicator::NoTotal));
        assert_eq!(Indicator::from_raw(0), Some(Indicator::Length(0)));
        assert_eq!(Indicator::from_raw(17), Some(Indicator::Length(17)));
        assert_eq!(Indicator::from_raw(-2), None);
    }

    #[test]
    fn test_raw_values() {
        assert_eq!(Indicator::Null.raw(), -1);
        assert_eq!(Indicator::NoTotal.raw(), -4);
        assert_eq!(Indicator::Length(9).raw(), 9);
    }

    #[test]
    fn test_truncation() {
        assert!(Indicator::Length(11).is_truncated(10));
        assert!(!Indicator::Length(10).is_truncated(10));
        assert!(Indicator::NoTotal.is_truncated(usize::MAX));
        assert!(!Indicator::Null.is_truncated(0));
    }

    #[test]
    fn test_accessors() {
        assert!(Indicator::Null.is_null());
        assert_eq!(Indicator::Length(4).length(), Some(4));
        assert_eq!(Indicator::NoTotal.length(), None);
    }
}
