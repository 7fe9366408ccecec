//! Time crate type implementations (Date, Time, PrimitiveDateTime, OffsetDateTime).
//!
//! Binary dates are days since 2000-01-01; times and timestamps are
//! microseconds, timestamps again counted from 2000-01-01 00:00:00 (UTC for
//! `timestamptz`).

use time::macros::{datetime, format_description};
use time::{Date, Duration, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset};

use crate::error::{Error, Result};
use crate::protocol::types::{FormatCode, Oid, oid};

use super::{FromWireValue, PG_EPOCH_JULIAN_DAY, PgType, ToWireValue, fixed, utf8};

pg_type!(Date, oid::DATE, "date", Binary);
pg_type!(Time, oid::TIME, "time", Binary);
pg_type!(PrimitiveDateTime, oid::TIMESTAMP, "timestamp", Binary);
pg_type!(OffsetDateTime, oid::TIMESTAMPTZ, "timestamptz", Binary);

const PG_EPOCH: PrimitiveDateTime = datetime!(2000-01-01 00:00:00);
const USECS_PER_DAY: i64 = 86_400_000_000;

fn decode_error(what: &str, e: impl std::fmt::Display) -> Error {
    Error::Decode(format!("invalid {}: {}", what, e))
}

fn write_i32(buf: &mut Vec<u8>, value: i32) {
    buf.extend_from_slice(&4_i32.to_be_bytes());
    buf.extend_from_slice(&value.to_be_bytes());
}

fn write_i64(buf: &mut Vec<u8>, value: i64) {
    buf.extend_from_slice(&8_i32.to_be_bytes());
    buf.extend_from_slice(&value.to_be_bytes());
}

fn micros_since_epoch(value: PrimitiveDateTime) -> Result<i64> {
    i64::try_from((value - PG_EPOCH).whole_microseconds())
        .map_err(|_| Error::InvalidUsage(format!("timestamp {} out of range", value)))
}

fn timestamp_from_micros(usecs: i64) -> Result<PrimitiveDateTime> {
    PG_EPOCH
        .checked_add(Duration::microseconds(usecs))
        .ok_or_else(|| Error::Decode("timestamp overflow".into()))
}

impl FromWireValue<'_> for Date {
    fn from_text(oid: Oid, bytes: &[u8]) -> Result<Self> {
        if oid != oid::DATE {
            return Err(Error::type_mismatch("Date", oid));
        }
        Date::parse(utf8(bytes)?, format_description!("[year]-[month]-[day]"))
            .map_err(|e| decode_error("date", e))
    }

    fn from_binary(oid: Oid, bytes: &[u8]) -> Result<Self> {
        if oid != oid::DATE {
            return Err(Error::type_mismatch("Date", oid));
        }
        let days = i32::from_be_bytes(fixed(bytes, "date")?);
        Date::from_julian_day(days + PG_EPOCH_JULIAN_DAY).map_err(|e| decode_error("date", e))
    }
}

impl ToWireValue for Date {
    fn natural_oid(&self) -> Oid {
        <Date as PgType>::OID
    }

    fn format(&self) -> FormatCode {
        <Date as PgType>::FORMAT
    }

    fn encode(&self, buf: &mut Vec<u8>) -> Result<()> {
        write_i32(buf, self.to_julian_day() - PG_EPOCH_JULIAN_DAY);
        Ok(())
    }
}

impl FromWireValue<'_> for Time {
    fn from_text(oid: Oid, bytes: &[u8]) -> Result<Self> {
        if oid != oid::TIME {
            return Err(Error::type_mismatch("Time", oid));
        }
        let s = utf8(bytes)?;
        Time::parse(s, format_description!("[hour]:[minute]:[second].[subsecond]"))
            .or_else(|_| Time::parse(s, format_description!("[hour]:[minute]:[second]")))
            .map_err(|e| decode_error("time", e))
    }

    fn from_binary(oid: Oid, bytes: &[u8]) -> Result<Self> {
        if oid != oid::TIME {
            return Err(Error::type_mismatch("Time", oid));
        }
        let usecs = i64::from_be_bytes(fixed(bytes, "time")?);
        if !(0..USECS_PER_DAY).contains(&usecs) {
            return Err(Error::Decode(format!("time out of range: {}us", usecs)));
        }
        Ok(Time::MIDNIGHT + Duration::microseconds(usecs))
    }
}

impl ToWireValue for Time {
    fn natural_oid(&self) -> Oid {
        <Time as PgType>::OID
    }

    fn format(&self) -> FormatCode {
        <Time as PgType>::FORMAT
    }

    fn encode(&self, buf: &mut Vec<u8>) -> Result<()> {
        write_i64(buf, (*self - Time::MIDNIGHT).whole_microseconds() as i64);
        Ok(())
    }
}

impl FromWireValue<'_> for PrimitiveDateTime {
    fn from_text(oid: Oid, bytes: &[u8]) -> Result<Self> {
        if oid != oid::TIMESTAMP {
            return Err(Error::type_mismatch("PrimitiveDateTime", oid));
        }
        let s = utf8(bytes)?;
        PrimitiveDateTime::parse(
            s,
            format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond]"),
        )
        .or_else(|_| {
            PrimitiveDateTime::parse(
                s,
                format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
            )
        })
        .map_err(|e| decode_error("timestamp", e))
    }

    fn from_binary(oid: Oid, bytes: &[u8]) -> Result<Self> {
        if !matches!(oid, oid::TIMESTAMP | oid::TIMESTAMPTZ) {
            return Err(Error::type_mismatch("PrimitiveDateTime", oid));
        }
        timestamp_from_micros(i64::from_be_bytes(fixed(bytes, "timestamp")?))
    }
}

impl ToWireValue for PrimitiveDateTime {
    fn natural_oid(&self) -> Oid {
        <PrimitiveDateTime as PgType>::OID
    }

    fn format(&self) -> FormatCode {
        <PrimitiveDateTime as PgType>::FORMAT
    }

    fn encode(&self, buf: &mut Vec<u8>) -> Result<()> {
        write_i64(buf, micros_since_epoch(*self)?);
        Ok(())
    }
}

impl FromWireValue<'_> for OffsetDateTime {
    fn from_text(oid: Oid, bytes: &[u8]) -> Result<Self> {
        if oid != oid::TIMESTAMPTZ {
            return Err(Error::type_mismatch("OffsetDateTime", oid));
        }
        let s = utf8(bytes)?;
        OffsetDateTime::parse(
            s,
            format_description!(
                "[year]-[month]-[day] [hour]:[minute]:[second].[subsecond][offset_hour]"
            ),
        )
        .or_else(|_| {
            OffsetDateTime::parse(
                s,
                format_description!("[year]-[month]-[day] [hour]:[minute]:[second][offset_hour]"),
            )
        })
        .map_err(|e| decode_error("timestamptz", e))
    }

    fn from_binary(oid: Oid, bytes: &[u8]) -> Result<Self> {
        if oid != oid::TIMESTAMPTZ {
            return Err(Error::type_mismatch("OffsetDateTime", oid));
        }
        timestamp_from_micros(i64::from_be_bytes(fixed(bytes, "timestamptz")?))
            .map(PrimitiveDateTime::assume_utc)
    }
}

impl ToWireValue for OffsetDateTime {
    fn natural_oid(&self) -> Oid {
        <OffsetDateTime as PgType>::OID
    }

    fn format(&self) -> FormatCode {
        <OffsetDateTime as PgType>::FORMAT
    }

    fn encode(&self, buf: &mut Vec<u8>) -> Result<()> {
        let utc = self.to_offset(UtcOffset::UTC);
        write_i64(buf, micros_since_epoch(PrimitiveDateTime::new(utc.date(), utc.time()))?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Month;

    // 2024-01-15 is 8780 days after 2000-01-01.
    const DAYS: i32 = 8780;
    const CLOCK_USECS: i64 = (10 * 3600 + 30 * 60 + 45) * 1_000_000;

    #[test]
    fn test_date() {
        let date = Date::from_binary(oid::DATE, &DAYS.to_be_bytes()).unwrap();
        assert_eq!(date, Date::from_calendar_date(2024, Month::January, 15).unwrap());
        assert_eq!(Date::from_text(oid::DATE, b"2024-01-15").unwrap(), date);

        let mut buf = Vec::new();
        date.encode(&mut buf).unwrap();
        assert_eq!(&buf[4..], &DAYS.to_be_bytes());
    }

    #[test]
    fn test_time() {
        let time = Time::from_binary(oid::TIME, &CLOCK_USECS.to_be_bytes()).unwrap();
        assert_eq!(time, Time::from_hms(10, 30, 45).unwrap());
        assert_eq!(
            Time::from_text(oid::TIME, b"10:30:45.123456")
                .unwrap()
                .microsecond(),
            123_456
        );
        assert!(Time::from_binary(oid::TIME, &(-1i64).to_be_bytes()).is_err());

        let mut buf = Vec::new();
        time.encode(&mut buf).unwrap();
        assert_eq!(&buf[4..], &CLOCK_USECS.to_be_bytes());
    }

    #[test]
    fn test_timestamp() {
        let usecs = i64::from(DAYS) * USECS_PER_DAY + CLOCK_USECS;
        let ts = PrimitiveDateTime::from_binary(oid::TIMESTAMP, &usecs.to_be_bytes()).unwrap();
        assert_eq!(ts, datetime!(2024-01-15 10:30:45));
        assert_eq!(
            PrimitiveDateTime::from_text(oid::TIMESTAMP, b"2024-01-15 10:30:45").unwrap(),
            ts
        );

        let mut buf = Vec::new();
        ts.encode(&mut buf).unwrap();
        assert_eq!(&buf[4..], &usecs.to_be_bytes());
    }

    #[test]
    fn test_timestamptz_is_utc() {
        let local = datetime!(2024-01-15 12:30:45 +2);
        let mut buf = Vec::new();
        local.encode(&mut buf).unwrap();

        let decoded = OffsetDateTime::from_binary(oid::TIMESTAMPTZ, &buf[4..]).unwrap();
        assert_eq!(decoded, local);
        assert_eq!(decoded.offset(), UtcOffset::UTC);
        assert_eq!(decoded.hour(), 10);
    }
}
