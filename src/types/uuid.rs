//! UUID type implementation (uuid crate).

use uuid::Uuid;

use crate::error::{Error, Result};
use crate::protocol::types::{FormatCode, Oid, oid};

use super::{FromWireValue, PgType, ToWireValue, utf8, write_value};

pg_type!(Uuid, oid::UUID, "uuid", Binary);

impl FromWireValue<'_> for Uuid {
    fn from_text(oid: Oid, bytes: &[u8]) -> Result<Self> {
        if oid != oid::UUID {
            return Err(Error::type_mismatch("Uuid", oid));
        }
        Uuid::parse_str(utf8(bytes)?).map_err(|e| Error::Decode(format!("invalid UUID: {}", e)))
    }

    fn from_binary(oid: Oid, bytes: &[u8]) -> Result<Self> {
        if oid != oid::UUID {
            return Err(Error::type_mismatch("Uuid", oid));
        }
        Uuid::from_slice(bytes).map_err(|e| Error::Decode(format!("invalid UUID: {}", e)))
    }
}

impl ToWireValue for Uuid {
    fn natural_oid(&self) -> Oid {
        <Uuid as PgType>::OID
    }

    fn format(&self) -> FormatCode {
        <Uuid as PgType>::FORMAT
    }

    fn encode(&self, buf: &mut Vec<u8>) -> Result<()> {
        write_value(buf, self.as_bytes())
    }
}
