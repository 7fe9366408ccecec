//! Byte type implementations (`[u8]`, `Vec<u8>`).

use crate::error::{Error, Result};
use crate::protocol::types::{FormatCode, Oid, oid};

use super::{FromWireValue, PgType, ToWireValue, write_value};

pg_type!([u8], oid::BYTEA, "bytea", Binary);
pg_type!(Vec<u8>, oid::BYTEA, "bytea", Binary);

impl<'a> FromWireValue<'a> for &'a [u8] {
    /// Text-format bytea is hex escaped and cannot be borrowed; use `Vec<u8>`.
    fn from_text(oid: Oid, _bytes: &'a [u8]) -> Result<Self> {
        Err(Error::Decode(format!(
            "cannot borrow text-format oid {} as bytes",
            oid
        )))
    }

    fn from_binary(oid: Oid, bytes: &'a [u8]) -> Result<Self> {
        if oid != oid::BYTEA {
            return Err(Error::type_mismatch("bytes", oid));
        }
        Ok(bytes)
    }
}

impl FromWireValue<'_> for Vec<u8> {
    fn from_text(oid: Oid, bytes: &[u8]) -> Result<Self> {
        if oid != oid::BYTEA {
            return Err(Error::type_mismatch("Vec<u8>", oid));
        }
        let hex = bytes
            .strip_prefix(b"\\x")
            .ok_or_else(|| Error::Decode("bytea text is not in hex format".into()))?;
        decode_hex(hex)
    }

    fn from_binary(oid: Oid, bytes: &[u8]) -> Result<Self> {
        <&[u8]>::from_binary(oid, bytes).map(<[u8]>::to_vec)
    }
}

impl ToWireValue for [u8] {
    fn natural_oid(&self) -> Oid {
        <[u8] as PgType>::OID
    }

    fn format(&self) -> FormatCode {
        <[u8] as PgType>::FORMAT
    }

    fn encode(&self, buf: &mut Vec<u8>) -> Result<()> {
        write_value(buf, self)
    }
}

impl ToWireValue for Vec<u8> {
    fn natural_oid(&self) -> Oid {
        self.as_slice().natural_oid()
    }

    fn format(&self) -> FormatCode {
        self.as_slice().format()
    }

    fn encode(&self, buf: &mut Vec<u8>) -> Result<()> {
        self.as_slice().encode(buf)
    }
}

fn decode_hex(hex: &[u8]) -> Result<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return Err(Error::Decode("invalid hex length".into()));
    }
    hex.chunks_exact(2)
        .map(|pair| Ok((hex_digit(pair[0])? << 4) | hex_digit(pair[1])?))
        .collect()
}

fn hex_digit(b: u8) -> Result<u8> {
    match b {
        b'0'..=b'9' => Ok(b - b'0'),
        b'a'..=b'f' => Ok(b - b'a' + 10),
        b'A'..=b'F' => Ok(b - b'A' + 10),
        _ => Err(Error::Decode(format!("invalid hex digit: {}", b as char))),
    }
}
