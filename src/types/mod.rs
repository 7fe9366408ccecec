//! Value format registry and the wire value traits.
//!
//! Every Rust type that travels as a parameter or a column value is tied to a
//! PostgreSQL type through [`PgType`]: its OID, its name and the wire format
//! it prefers. The [`TypeRegistry`] collects those entries per service and
//! decides which result columns are requested in binary.

/// Implement [`PgType`] for a Rust type.
macro_rules! pg_type {
    ($ty:ty, $oid:expr, $name:literal, $format:ident) => {
        impl $crate::types::PgType for $ty {
            const OID: $crate::protocol::types::Oid = $oid;
            const NAME: &'static str = $name;
            const FORMAT: $crate::protocol::types::FormatCode =
                $crate::protocol::types::FormatCode::$format;
        }
    };
}

mod bytes;
mod params;
mod primitives;
mod registry;
mod string;

#[cfg(feature = "with-chrono")]
mod chrono;
#[cfg(feature = "with-time")]
mod time;
#[cfg(feature = "with-uuid")]
mod uuid;

pub use params::{BoundParams, ToParams};
pub use registry::{TypeEntry, TypeRegistry};

use crate::error::{Error, Result};
use crate::protocol::types::{FormatCode, Oid};

/// Julian day number of the PostgreSQL epoch, 2000-01-01.
#[cfg(feature = "with-time")]
pub(crate) const PG_EPOCH_JULIAN_DAY: i32 = 2_451_545;

/// Static description of a PostgreSQL type implemented by a Rust type.
pub trait PgType {
    /// Type OID
    const OID: Oid;
    /// Type name as it appears in `pg_type`
    const NAME: &'static str;
    /// Wire format this crate uses for the type
    const FORMAT: FormatCode;
}

impl<T: PgType + ?Sized> PgType for &T {
    const OID: Oid = T::OID;
    const NAME: &'static str = T::NAME;
    const FORMAT: FormatCode = T::FORMAT;
}

/// OID of the PostgreSQL type backing `T`.
pub fn oid_for<T: PgType + ?Sized>() -> Oid {
    T::OID
}

/// Wire format preferred for `T`.
pub fn preferred_format<T: PgType + ?Sized>() -> FormatCode {
    T::FORMAT
}

/// Trait for decoding PostgreSQL values into Rust types.
///
/// The OID parameter allows implementations to check the PostgreSQL type
/// and reject incompatible types with clear error messages.
pub trait FromWireValue<'a>: Sized {
    /// Decode from NULL value.
    ///
    /// Default implementation returns an error. Override for types that can
    /// represent NULL (like `Option<T>`).
    fn from_null() -> Result<Self> {
        Err(Error::Decode("unexpected NULL value".into()))
    }

    /// Decode from text format bytes.
    fn from_text(oid: Oid, bytes: &'a [u8]) -> Result<Self>;

    /// Decode from binary format bytes.
    fn from_binary(oid: Oid, bytes: &'a [u8]) -> Result<Self>;
}

/// Trait for encoding Rust values as PostgreSQL parameters.
///
/// `encode` writes the value length-prefixed: an Int32 length followed by
/// the value bytes, or Int32 -1 for NULL.
pub trait ToWireValue {
    /// The OID sent in Parse for this parameter.
    fn natural_oid(&self) -> Oid;

    /// Format code sent in Bind for this parameter.
    fn format(&self) -> FormatCode;

    /// Write the length-prefixed value.
    fn encode(&self, buf: &mut Vec<u8>) -> Result<()>;
}

// === Option<T> - NULL handling ===

impl<'a, T: FromWireValue<'a>> FromWireValue<'a> for Option<T> {
    fn from_null() -> Result<Self> {
        Ok(None)
    }

    fn from_text(oid: Oid, bytes: &'a [u8]) -> Result<Self> {
        T::from_text(oid, bytes).map(Some)
    }

    fn from_binary(oid: Oid, bytes: &'a [u8]) -> Result<Self> {
        T::from_binary(oid, bytes).map(Some)
    }
}

impl<T: ToWireValue + PgType> ToWireValue for Option<T> {
    fn natural_oid(&self) -> Oid {
        T::OID
    }

    fn format(&self) -> FormatCode {
        T::FORMAT
    }

    fn encode(&self, buf: &mut Vec<u8>) -> Result<()> {
        match self {
            Some(v) => v.encode(buf),
            None => {
                buf.extend_from_slice(&(-1_i32).to_be_bytes());
                Ok(())
            }
        }
    }
}

impl<T: ToWireValue + ?Sized> ToWireValue for &T {
    fn natural_oid(&self) -> Oid {
        (*self).natural_oid()
    }

    fn format(&self) -> FormatCode {
        (*self).format()
    }

    fn encode(&self, buf: &mut Vec<u8>) -> Result<()> {
        (*self).encode(buf)
    }
}

// === Helpers shared by the builtin impls ===

pub(crate) fn write_value(buf: &mut Vec<u8>, value: &[u8]) -> Result<()> {
    let len = i32::try_from(value.len())
        .map_err(|_| Error::InvalidUsage(format!("value of {} bytes is too large", value.len())))?;
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(value);
    Ok(())
}

pub(crate) fn utf8(bytes: &[u8]) -> Result<&str> {
    simdutf8::compat::from_utf8(bytes).map_err(|e| Error::Decode(format!("invalid UTF-8: {}", e)))
}

pub(crate) fn fixed<const N: usize>(bytes: &[u8], what: &str) -> Result<[u8; N]> {
    bytes
        .try_into()
        .map_err(|_| Error::Decode(format!("invalid {} length: {}", what, bytes.len())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::oid;

    #[test]
    fn test_option_null() {
        assert_eq!(Option::<i32>::from_null().unwrap(), None);
        assert!(i32::from_null().is_err());
    }

    #[test]
    fn test_type_constants() {
        assert_eq!(oid_for::<i32>(), oid::INT4);
        assert_eq!(oid_for::<&str>(), oid::TEXT);
        assert_eq!(preferred_format::<i64>(), FormatCode::Binary);
        assert_eq!(<bool as PgType>::NAME, "bool");
    }

    #[test]
    fn test_null_keeps_type() {
        let value: Option<i64> = None;
        let mut buf = Vec::new();
        value.encode(&mut buf).unwrap();
        assert_eq!(buf, (-1i32).to_be_bytes());
        assert_eq!(value.natural_oid(), oid::INT8);
        assert_eq!(value.format(), FormatCode::Binary);
    }
}
