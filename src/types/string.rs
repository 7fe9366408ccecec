//! String type implementations (`str`, `String`).

use crate::error::{Error, Result};
use crate::protocol::types::{FormatCode, Oid, oid};

use super::{FromWireValue, PgType, ToWireValue, utf8, write_value};

pg_type!(str, oid::TEXT, "text", Binary);
pg_type!(String, oid::TEXT, "text", Binary);

/// Types whose binary form is the UTF-8 text itself.
fn is_binary_text(oid: Oid) -> bool {
    matches!(
        oid,
        oid::TEXT | oid::VARCHAR | oid::BPCHAR | oid::NAME | oid::JSON
    )
}

/// Types that may be read as a string when sent in text format.
fn is_text_like(oid: Oid) -> bool {
    is_binary_text(oid) || matches!(oid, oid::NUMERIC | oid::JSONB | oid::UUID | oid::CHAR)
}

impl<'a> FromWireValue<'a> for &'a str {
    fn from_text(oid: Oid, bytes: &'a [u8]) -> Result<Self> {
        if !is_text_like(oid) {
            return Err(Error::type_mismatch("str", oid));
        }
        utf8(bytes)
    }

    fn from_binary(oid: Oid, bytes: &'a [u8]) -> Result<Self> {
        if !is_binary_text(oid) {
            return Err(Error::type_mismatch("str", oid));
        }
        utf8(bytes)
    }
}

impl FromWireValue<'_> for String {
    fn from_text(oid: Oid, bytes: &[u8]) -> Result<Self> {
        <&str>::from_text(oid, bytes).map(str::to_owned)
    }

    fn from_binary(oid: Oid, bytes: &[u8]) -> Result<Self> {
        <&str>::from_binary(oid, bytes).map(str::to_owned)
    }
}

impl ToWireValue for str {
    fn natural_oid(&self) -> Oid {
        <str as PgType>::OID
    }

    fn format(&self) -> FormatCode {
        <str as PgType>::FORMAT
    }

    fn encode(&self, buf: &mut Vec<u8>) -> Result<()> {
        write_value(buf, self.as_bytes())
    }
}

impl ToWireValue for String {
    fn natural_oid(&self) -> Oid {
        self.as_str().natural_oid()
    }

    fn format(&self) -> FormatCode {
        self.as_str().format()
    }

    fn encode(&self, buf: &mut Vec<u8>) -> Result<()> {
        self.as_str().encode(buf)
    }
}
