//! Per-service table of known PostgreSQL types and their wire formats.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::protocol::types::{FormatCode, Oid, oid};

use super::{FromWireValue, PgType, ToWireValue};

/// One registered type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeEntry {
    oid: Oid,
    name: &'static str,
    format: FormatCode,
}

impl TypeEntry {
    fn of<T: PgType + ?Sized>() -> Self {
        Self {
            oid: T::OID,
            name: T::NAME,
            format: T::FORMAT,
        }
    }

    const fn text(oid: Oid, name: &'static str) -> Self {
        Self {
            oid,
            name,
            format: FormatCode::Text,
        }
    }

    /// Type OID
    pub fn oid(&self) -> Oid {
        self.oid
    }

    /// Type name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Format used on the wire for this type
    pub fn format(&self) -> FormatCode {
        self.format
    }
}

/// Types without a binary codec in this crate; they travel as text.
const TEXT_BUILTINS: &[TypeEntry] = &[
    TypeEntry::text(oid::VARCHAR, "varchar"),
    TypeEntry::text(oid::BPCHAR, "bpchar"),
    TypeEntry::text(oid::NAME, "name"),
    TypeEntry::text(oid::JSON, "json"),
    TypeEntry::text(oid::NUMERIC, "numeric"),
];

/// Maps type OIDs to their registered wire format.
///
/// Result columns are requested in binary only when their OID is registered
/// with a binary format, so every binary column has a decoder.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    entries: HashMap<Oid, TypeEntry>,
}

impl TypeRegistry {
    /// Create an empty registry. Every result column will be text.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding every builtin type.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.insert(TypeEntry::of::<bool>());
        registry.insert(TypeEntry::of::<[u8]>());
        registry.insert(TypeEntry::of::<i16>());
        registry.insert(TypeEntry::of::<i32>());
        registry.insert(TypeEntry::of::<i64>());
        registry.insert(TypeEntry::of::<f32>());
        registry.insert(TypeEntry::of::<f64>());
        registry.insert(TypeEntry::of::<str>());
        registry.insert(TypeEntry::of::<u32>());
        #[cfg(feature = "with-uuid")]
        registry.insert(TypeEntry::of::<uuid::Uuid>());
        #[cfg(feature = "with-time")]
        {
            registry.insert(TypeEntry::of::<time::Date>());
            registry.insert(TypeEntry::of::<time::Time>());
            registry.insert(TypeEntry::of::<time::PrimitiveDateTime>());
            registry.insert(TypeEntry::of::<time::OffsetDateTime>());
        }
        #[cfg(feature = "with-chrono")]
        {
            registry.insert(TypeEntry::of::<chrono::NaiveDate>());
            registry.insert(TypeEntry::of::<chrono::NaiveTime>());
            registry.insert(TypeEntry::of::<chrono::NaiveDateTime>());
            registry.insert(TypeEntry::of::<chrono::DateTime<chrono::Utc>>());
        }
        for entry in TEXT_BUILTINS {
            registry.insert(*entry);
        }
        registry
    }

    fn insert(&mut self, entry: TypeEntry) {
        self.entries.insert(entry.oid, entry);
    }

    /// Register the type behind `T`.
    ///
    /// Only a type that can both encode and decode itself may be registered,
    /// so a binary entry always comes with a binary decoder.
    pub fn register<T>(&mut self) -> Result<()>
    where
        T: PgType + ToWireValue + for<'a> FromWireValue<'a>,
    {
        self.register_entry(TypeEntry::of::<T>())
    }

    /// Register a type that is exchanged as text only.
    pub fn register_text(&mut self, oid: Oid, name: &'static str) -> Result<()> {
        self.register_entry(TypeEntry::text(oid, name))
    }

    /// Registering the same OID twice is fine as long as the format agrees.
    fn register_entry(&mut self, entry: TypeEntry) -> Result<()> {
        match self.entries.get(&entry.oid) {
            Some(existing) if existing.format != entry.format => {
                Err(Error::Configuration(format!(
                    "type oid {} ({}) is already registered as {:?}, cannot register as {:?}",
                    entry.oid, existing.name, existing.format, entry.format
                )))
            }
            Some(_) => Ok(()),
            None => {
                self.insert(entry);
                Ok(())
            }
        }
    }

    /// Look up a registered type.
    pub fn lookup(&self, oid: Oid) -> Result<&TypeEntry> {
        self.entries.get(&oid).ok_or(Error::UnsupportedType(oid))
    }

    /// Format to request for a result column of type `oid`.
    pub fn result_format(&self, oid: Oid) -> FormatCode {
        match self.entries.get(&oid) {
            Some(entry) => entry.format,
            None => FormatCode::Text,
        }
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins() {
        let registry = TypeRegistry::with_builtins();
        assert_eq!(registry.result_format(oid::INT4), FormatCode::Binary);
        assert_eq!(registry.result_format(oid::TEXT), FormatCode::Binary);
        assert_eq!(registry.result_format(oid::NUMERIC), FormatCode::Text);
        assert_eq!(registry.lookup(oid::BOOL).unwrap().name(), "bool");
    }

    #[test]
    fn test_unknown_oid() {
        let registry = TypeRegistry::with_builtins();
        assert_eq!(registry.result_format(600), FormatCode::Text);
        assert!(matches!(
            registry.lookup(600),
            Err(Error::UnsupportedType(600))
        ));
        assert_eq!(TypeRegistry::new().result_format(oid::INT4), FormatCode::Text);
    }

    #[test]
    fn test_register_conflict() {
        let mut registry = TypeRegistry::with_builtins();
        let before = registry.len();
        registry.register::<i32>().unwrap();
        assert_eq!(registry.len(), before);

        assert!(matches!(
            registry.register_text(oid::INT4, "int4"),
            Err(Error::Configuration(_))
        ));
        assert_eq!(registry.result_format(oid::INT4), FormatCode::Binary);
    }

    #[test]
    fn test_register_text_only() {
        let mut registry = TypeRegistry::with_builtins();
        registry.register_text(INET, "inet").unwrap();
        let entry = registry.lookup(INET).unwrap();
        assert_eq!((entry.name(), entry.format()), ("inet", FormatCode::Text));
        assert_eq!(registry.result_format(INET), FormatCode::Text);
    }

    const INET: Oid = 869;

    /// IPv4 host address in the binary inet layout.
    #[derive(Debug, PartialEq)]
    struct Ipv4([u8; 4]);

    pg_type!(Ipv4, INET, "inet", Binary);

    impl ToWireValue for Ipv4 {
        fn natural_oid(&self) -> Oid {
            INET
        }

        fn format(&self) -> FormatCode {
            FormatCode::Binary
        }

        fn encode(&self, buf: &mut Vec<u8>) -> Result<()> {
            buf.extend_from_slice(&8i32.to_be_bytes());
            buf.extend_from_slice(&[2, 32, 0, 4]);
            buf.extend_from_slice(&self.0);
            Ok(())
        }
    }

    impl<'a> FromWireValue<'a> for Ipv4 {
        fn from_text(_oid: Oid, bytes: &'a [u8]) -> Result<Self> {
            let text = std::str::from_utf8(bytes).map_err(|e| Error::Decode(e.to_string()))?;
            let mut octets = [0u8; 4];
            for (octet, part) in octets.iter_mut().zip(text.split('.')) {
                *octet = part.parse().map_err(|e| Error::Decode(format!("{}: {}", text, e)))?;
            }
            Ok(Ipv4(octets))
        }

        fn from_binary(_oid: Oid, bytes: &'a [u8]) -> Result<Self> {
            match bytes {
                [2, 32, 0, 4, a, b, c, d] => Ok(Ipv4([*a, *b, *c, *d])),
                _ => Err(Error::Decode("not an IPv4 host".into())),
            }
        }
    }

    #[test]
    fn test_register_binary_codec() {
        let mut registry = TypeRegistry::with_builtins();
        registry.register::<Ipv4>().unwrap();
        assert_eq!(registry.result_format(INET), FormatCode::Binary);

        let mut buf = Vec::new();
        Ipv4([10, 0, 0, 1]).encode(&mut buf).unwrap();
        assert_eq!(
            Ipv4::from_binary(INET, &buf[4..]).unwrap(),
            Ipv4([10, 0, 0, 1])
        );
        assert_eq!(
            Ipv4::from_text(INET, b"10.0.0.1").unwrap(),
            Ipv4([10, 0, 0, 1])
        );
    }
}
