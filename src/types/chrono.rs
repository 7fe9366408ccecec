//! Chrono crate type implementations (NaiveDate, NaiveTime, NaiveDateTime, DateTime<Utc>).

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Utc};

use crate::error::{Error, Result};
use crate::protocol::types::{FormatCode, Oid, oid};

use super::{FromWireValue, PgType, ToWireValue, fixed, utf8, write_value};

pg_type!(NaiveDate, oid::DATE, "date", Binary);
pg_type!(NaiveTime, oid::TIME, "time", Binary);
pg_type!(NaiveDateTime, oid::TIMESTAMP, "timestamp", Binary);
pg_type!(DateTime<Utc>, oid::TIMESTAMPTZ, "timestamptz", Binary);

const PG_EPOCH: NaiveDate = match NaiveDate::from_ymd_opt(2000, 1, 1) {
    Some(d) => d,
    None => panic!("invalid date"),
};

fn pg_epoch() -> NaiveDateTime {
    PG_EPOCH.and_time(NaiveTime::MIN)
}

fn decode_error(what: &str, e: impl std::fmt::Display) -> Error {
    Error::Decode(format!("invalid {}: {}", what, e))
}

fn micros_since_epoch(value: NaiveDateTime) -> Result<i64> {
    (value - pg_epoch())
        .num_microseconds()
        .ok_or_else(|| Error::InvalidUsage(format!("timestamp {} out of range", value)))
}

fn timestamp_from_micros(usecs: i64) -> Result<NaiveDateTime> {
    pg_epoch()
        .checked_add_signed(TimeDelta::microseconds(usecs))
        .ok_or_else(|| Error::Decode("timestamp overflow".into()))
}

impl FromWireValue<'_> for NaiveDate {
    fn from_text(oid: Oid, bytes: &[u8]) -> Result<Self> {
        if oid != oid::DATE {
            return Err(Error::type_mismatch("NaiveDate", oid));
        }
        NaiveDate::parse_from_str(utf8(bytes)?, "%Y-%m-%d").map_err(|e| decode_error("date", e))
    }

    fn from_binary(oid: Oid, bytes: &[u8]) -> Result<Self> {
        if oid != oid::DATE {
            return Err(Error::type_mismatch("NaiveDate", oid));
        }
        let days = i32::from_be_bytes(fixed(bytes, "date")?);
        PG_EPOCH
            .checked_add_signed(TimeDelta::days(i64::from(days)))
            .ok_or_else(|| Error::Decode(format!("date out of range: {} days", days)))
    }
}

impl ToWireValue for NaiveDate {
    fn natural_oid(&self) -> Oid {
        <NaiveDate as PgType>::OID
    }

    fn format(&self) -> FormatCode {
        <NaiveDate as PgType>::FORMAT
    }

    fn encode(&self, buf: &mut Vec<u8>) -> Result<()> {
        let days = self.signed_duration_since(PG_EPOCH).num_days();
        let days = i32::try_from(days)
            .map_err(|e| Error::InvalidUsage(format!("date {} out of range: {}", self, e)))?;
        write_value(buf, &days.to_be_bytes())
    }
}

impl FromWireValue<'_> for NaiveTime {
    fn from_text(oid: Oid, bytes: &[u8]) -> Result<Self> {
        if oid != oid::TIME {
            return Err(Error::type_mismatch("NaiveTime", oid));
        }
        NaiveTime::parse_from_str(utf8(bytes)?, "%H:%M:%S%.f").map_err(|e| decode_error("time", e))
    }

    fn from_binary(oid: Oid, bytes: &[u8]) -> Result<Self> {
        if oid != oid::TIME {
            return Err(Error::type_mismatch("NaiveTime", oid));
        }
        let usecs = i64::from_be_bytes(fixed(bytes, "time")?);
        let secs = u32::try_from(usecs.div_euclid(1_000_000))
            .map_err(|_| Error::Decode(format!("time out of range: {}us", usecs)))?;
        let nanos = (usecs.rem_euclid(1_000_000) * 1000) as u32;
        NaiveTime::from_num_seconds_from_midnight_opt(secs, nanos)
            .ok_or_else(|| Error::Decode(format!("time out of range: {}us", usecs)))
    }
}

impl ToWireValue for NaiveTime {
    fn natural_oid(&self) -> Oid {
        <NaiveTime as PgType>::OID
    }

    fn format(&self) -> FormatCode {
        <NaiveTime as PgType>::FORMAT
    }

    fn encode(&self, buf: &mut Vec<u8>) -> Result<()> {
        let usecs = (*self - NaiveTime::MIN).num_microseconds().unwrap_or_default();
        write_value(buf, &usecs.to_be_bytes())?;
        Ok(())
    }
}

impl FromWireValue<'_> for NaiveDateTime {
    fn from_text(oid: Oid, bytes: &[u8]) -> Result<Self> {
        if oid != oid::TIMESTAMP {
            return Err(Error::type_mismatch("NaiveDateTime", oid));
        }
        NaiveDateTime::parse_from_str(utf8(bytes)?, "%Y-%m-%d %H:%M:%S%.f")
            .map_err(|e| decode_error("timestamp", e))
    }

    fn from_binary(oid: Oid, bytes: &[u8]) -> Result<Self> {
        if !matches!(oid, oid::TIMESTAMP | oid::TIMESTAMPTZ) {
            return Err(Error::type_mismatch("NaiveDateTime", oid));
        }
        timestamp_from_micros(i64::from_be_bytes(fixed(bytes, "timestamp")?))
    }
}

impl ToWireValue for NaiveDateTime {
    fn natural_oid(&self) -> Oid {
        <NaiveDateTime as PgType>::OID
    }

    fn format(&self) -> FormatCode {
        <NaiveDateTime as PgType>::FORMAT
    }

    fn encode(&self, buf: &mut Vec<u8>) -> Result<()> {
        write_value(buf, &micros_since_epoch(*self)?.to_be_bytes())?;
        Ok(())
    }
}

impl FromWireValue<'_> for DateTime<Utc> {
    fn from_text(oid: Oid, bytes: &[u8]) -> Result<Self> {
        if oid != oid::TIMESTAMPTZ {
            return Err(Error::type_mismatch("DateTime<Utc>", oid));
        }
        DateTime::parse_from_str(utf8(bytes)?, "%Y-%m-%d %H:%M:%S%.f%#z")
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| decode_error("timestamptz", e))
    }

    fn from_binary(oid: Oid, bytes: &[u8]) -> Result<Self> {
        if oid != oid::TIMESTAMPTZ {
            return Err(Error::type_mismatch("DateTime<Utc>", oid));
        }
        timestamp_from_micros(i64::from_be_bytes(fixed(bytes, "timestamptz")?))
            .map(|naive| naive.and_utc())
    }
}

impl ToWireValue for DateTime<Utc> {
    fn natural_oid(&self) -> Oid {
        <DateTime<Utc> as PgType>::OID
    }

    fn format(&self) -> FormatCode {
        <DateTime<Utc> as PgType>::FORMAT
    }

    fn encode(&self, buf: &mut Vec<u8>) -> Result<()> {
        write_value(buf, &micros_since_epoch(self.naive_utc())?.to_be_bytes())?;
        Ok(())
    }
}
