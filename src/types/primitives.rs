//! Primitive type implementations (bool, integers, floats, oid).

use crate::error::{Error, Result};
use crate::protocol::types::{FormatCode, Oid, oid};

use super::{FromWireValue, PgType, ToWireValue, fixed, utf8, write_value};

pg_type!(bool, oid::BOOL, "bool", Binary);
pg_type!(i16, oid::INT2, "int2", Binary);
pg_type!(i32, oid::INT4, "int4", Binary);
pg_type!(i64, oid::INT8, "int8", Binary);
pg_type!(f32, oid::FLOAT4, "float4", Binary);
pg_type!(f64, oid::FLOAT8, "float8", Binary);
pg_type!(u32, oid::OID, "oid", Binary);

/// Implement `ToWireValue` for a fixed-width big-endian number.
macro_rules! impl_to_wire_be {
    ($($ty:ty),+) => {
        $(
            impl ToWireValue for $ty {
                fn natural_oid(&self) -> Oid {
                    <$ty as PgType>::OID
                }

                fn format(&self) -> FormatCode {
                    <$ty as PgType>::FORMAT
                }

                fn encode(&self, buf: &mut Vec<u8>) -> Result<()> {
                    write_value(buf, &self.to_be_bytes())
                }
            }
        )+
    };
}

impl_to_wire_be!(i16, i32, i64, f32, f64, u32);

fn parse_text<T: std::str::FromStr>(bytes: &[u8], what: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    utf8(bytes)?
        .parse()
        .map_err(|e| Error::Decode(format!("invalid {}: {}", what, e)))
}

// === Boolean ===

impl FromWireValue<'_> for bool {
    fn from_text(oid: Oid, bytes: &[u8]) -> Result<Self> {
        if oid != oid::BOOL {
            return Err(Error::type_mismatch("bool", oid));
        }
        match bytes {
            b"t" | b"true" | b"TRUE" | b"T" | b"1" => Ok(true),
            b"f" | b"false" | b"FALSE" | b"F" | b"0" => Ok(false),
            _ => Err(Error::Decode(format!(
                "invalid boolean: {:?}",
                String::from_utf8_lossy(bytes)
            ))),
        }
    }

    fn from_binary(oid: Oid, bytes: &[u8]) -> Result<Self> {
        if oid != oid::BOOL {
            return Err(Error::type_mismatch("bool", oid));
        }
        let [b] = fixed::<1>(bytes, "boolean")?;
        Ok(b != 0)
    }
}

impl ToWireValue for bool {
    fn natural_oid(&self) -> Oid {
        oid::BOOL
    }

    fn format(&self) -> FormatCode {
        FormatCode::Binary
    }

    fn encode(&self, buf: &mut Vec<u8>) -> Result<()> {
        buf.extend_from_slice(&1_i32.to_be_bytes());
        buf.push(u8::from(*self));
        Ok(())
    }
}

// === Integers ===
//
// Narrower columns widen into wider Rust integers; never the reverse.

impl FromWireValue<'_> for i16 {
    fn from_text(oid: Oid, bytes: &[u8]) -> Result<Self> {
        if oid != oid::INT2 {
            return Err(Error::type_mismatch("i16", oid));
        }
        parse_text(bytes, "i16")
    }

    fn from_binary(oid: Oid, bytes: &[u8]) -> Result<Self> {
        if oid != oid::INT2 {
            return Err(Error::type_mismatch("i16", oid));
        }
        Ok(i16::from_be_bytes(fixed(bytes, "int2")?))
    }
}

impl FromWireValue<'_> for i32 {
    fn from_text(oid: Oid, bytes: &[u8]) -> Result<Self> {
        if !matches!(oid, oid::INT2 | oid::INT4) {
            return Err(Error::type_mismatch("i32", oid));
        }
        parse_text(bytes, "i32")
    }

    fn from_binary(oid: Oid, bytes: &[u8]) -> Result<Self> {
        match oid {
            oid::INT2 => Ok(i16::from_be_bytes(fixed(bytes, "int2")?) as i32),
            oid::INT4 => Ok(i32::from_be_bytes(fixed(bytes, "int4")?)),
            _ => Err(Error::type_mismatch("i32", oid)),
        }
    }
}

impl FromWireValue<'_> for i64 {
    fn from_text(oid: Oid, bytes: &[u8]) -> Result<Self> {
        if !matches!(oid, oid::INT2 | oid::INT4 | oid::INT8) {
            return Err(Error::type_mismatch("i64", oid));
        }
        parse_text(bytes, "i64")
    }

    fn from_binary(oid: Oid, bytes: &[u8]) -> Result<Self> {
        match oid {
            oid::INT2 => Ok(i16::from_be_bytes(fixed(bytes, "int2")?) as i64),
            oid::INT4 => Ok(i32::from_be_bytes(fixed(bytes, "int4")?) as i64),
            oid::INT8 => Ok(i64::from_be_bytes(fixed(bytes, "int8")?)),
            _ => Err(Error::type_mismatch("i64", oid)),
        }
    }
}

impl FromWireValue<'_> for u32 {
    fn from_text(oid: Oid, bytes: &[u8]) -> Result<Self> {
        if oid != oid::OID {
            return Err(Error::type_mismatch("u32", oid));
        }
        parse_text(bytes, "oid")
    }

    fn from_binary(oid: Oid, bytes: &[u8]) -> Result<Self> {
        if oid != oid::OID {
            return Err(Error::type_mismatch("u32", oid));
        }
        Ok(u32::from_be_bytes(fixed(bytes, "oid")?))
    }
}

// === Floats ===

/// Parse PostgreSQL's float text output, which spells the specials out.
fn parse_float_text(bytes: &[u8]) -> Result<f64> {
    match bytes {
        b"NaN" => Ok(f64::NAN),
        b"Infinity" => Ok(f64::INFINITY),
        b"-Infinity" => Ok(f64::NEG_INFINITY),
        _ => parse_text(bytes, "float"),
    }
}

impl FromWireValue<'_> for f32 {
    fn from_text(oid: Oid, bytes: &[u8]) -> Result<Self> {
        if oid != oid::FLOAT4 {
            return Err(Error::type_mismatch("f32", oid));
        }
        parse_float_text(bytes).map(|v| v as f32)
    }

    fn from_binary(oid: Oid, bytes: &[u8]) -> Result<Self> {
        if oid != oid::FLOAT4 {
            return Err(Error::type_mismatch("f32", oid));
        }
        Ok(f32::from_be_bytes(fixed(bytes, "float4")?))
    }
}

impl FromWireValue<'_> for f64 {
    /// NUMERIC is accepted here because it always arrives as text.
    fn from_text(oid: Oid, bytes: &[u8]) -> Result<Self> {
        if !matches!(oid, oid::FLOAT4 | oid::FLOAT8 | oid::NUMERIC) {
            return Err(Error::type_mismatch("f64", oid));
        }
        parse_float_text(bytes)
    }

    fn from_binary(oid: Oid, bytes: &[u8]) -> Result<Self> {
        match oid {
            oid::FLOAT4 => Ok(f32::from_be_bytes(fixed(bytes, "float4")?) as f64),
            oid::FLOAT8 => Ok(f64::from_be_bytes(fixed(bytes, "float8")?)),
            _ => Err(Error::type_mismatch("f64", oid)),
        }
    }
}
