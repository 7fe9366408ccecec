//! PostgreSQL wire protocol encoding and decoding primitives.
//!
//! PostgreSQL uses big-endian (network byte order) for all integers.
//! Every backend message is framed as a type byte, an Int32 length that
//! counts itself, and `length - 4` payload bytes.

use crate::error::{Error, Result};
use zerocopy::FromBytes;

use super::backend::RawMessage;
use super::types::{I16BE, I32BE, U16BE, U32BE};

/// Frame header size: type byte + Int32 length.
pub const HEADER_LEN: usize = 5;

/// Largest frame length accepted from the server (1 GiB, the server's own limit).
pub const MAX_FRAME_LEN: usize = 0x4000_0000;

/// Decode one frame from the front of `data`.
///
/// Returns the message and the number of bytes it occupied. If `data` does
/// not yet hold the whole frame, returns [`Error::TruncatedFrame`] with the
/// number of missing bytes; nothing is consumed and the caller retries once
/// more bytes are buffered. A length field below 4 or above
/// [`MAX_FRAME_LEN`] is a protocol error.
pub fn decode_frame(data: &[u8]) -> Result<(RawMessage<'_>, usize)> {
    if data.len() < HEADER_LEN {
        return Err(Error::TruncatedFrame {
            needed: HEADER_LEN - data.len(),
        });
    }
    let type_byte = data[0];
    let (length, _) = read_i32(&data[1..HEADER_LEN])?;
    let length = usize::try_from(length)
        .ok()
        .filter(|len| (4..=MAX_FRAME_LEN).contains(len))
        .ok_or_else(|| {
            Error::Protocol(format!(
                "invalid length {} for message '{}'",
                length, type_byte as char
            ))
        })?;

    let total = 1 + length;
    if data.len() < total {
        return Err(Error::TruncatedFrame {
            needed: total - data.len(),
        });
    }
    Ok((RawMessage::new(type_byte, &data[HEADER_LEN..total]), total))
}

/// Encode a frame with the given tag and payload.
pub fn encode_frame(out: &mut Vec<u8>, type_byte: u8, payload: &[u8]) {
    let mut msg = MessageBuilder::new(out, type_byte);
    msg.write_bytes(payload);
    msg.finish();
}

/// Read 1-byte unsigned integer.
#[inline]
pub fn read_u8(data: &[u8]) -> Result<(u8, &[u8])> {
    match data.split_first() {
        Some((&byte, rest)) => Ok((byte, rest)),
        None => Err(Error::Protocol("read_u8: empty buffer".into())),
    }
}

/// Read 2-byte big-endian signed integer.
#[inline]
pub fn read_i16(data: &[u8]) -> Result<(i16, &[u8])> {
    let (head, rest) = split(data, 2, "read_i16")?;
    let value = I16BE::ref_from_bytes(head)
        .map_err(|_| Error::Protocol("read_i16: misaligned".into()))?
        .get();
    Ok((value, rest))
}

/// Read 2-byte big-endian unsigned integer.
#[inline]
pub fn read_u16(data: &[u8]) -> Result<(u16, &[u8])> {
    let (head, rest) = split(data, 2, "read_u16")?;
    let value = U16BE::ref_from_bytes(head)
        .map_err(|_| Error::Protocol("read_u16: misaligned".into()))?
        .get();
    Ok((value, rest))
}

/// Read 4-byte big-endian signed integer.
#[inline]
pub fn read_i32(data: &[u8]) -> Result<(i32, &[u8])> {
    let (head, rest) = split(data, 4, "read_i32")?;
    let value = I32BE::ref_from_bytes(head)
        .map_err(|_| Error::Protocol("read_i32: misaligned".into()))?
        .get();
    Ok((value, rest))
}

/// Read 4-byte big-endian unsigned integer.
#[inline]
pub fn read_u32(data: &[u8]) -> Result<(u32, &[u8])> {
    let (head, rest) = split(data, 4, "read_u32")?;
    let value = U32BE::ref_from_bytes(head)
        .map_err(|_| Error::Protocol("read_u32: misaligned".into()))?
        .get();
    Ok((value, rest))
}

/// Read fixed-length bytes.
#[inline]
pub fn read_bytes(data: &[u8], len: usize) -> Result<(&[u8], &[u8])> {
    split(data, len, "read_bytes")
}

/// Read null-terminated string (PostgreSQL String type).
/// Returns the string bytes (without the null terminator) and remaining data.
#[inline]
pub fn read_cstring(data: &[u8]) -> Result<(&[u8], &[u8])> {
    match memchr::memchr(0, data) {
        Some(pos) => Ok((&data[..pos], &data[pos + 1..])),
        None => Err(Error::Protocol(
            "read_cstring: no null terminator found".into(),
        )),
    }
}

/// Read null-terminated string as &str.
#[inline]
pub fn read_cstr(data: &[u8]) -> Result<(&str, &[u8])> {
    let (bytes, rest) = read_cstring(data)?;
    let s = simdutf8::compat::from_utf8(bytes)
        .map_err(|e| Error::Protocol(format!("read_cstr: invalid UTF-8: {e}")))?;
    Ok((s, rest))
}

#[inline]
fn split<'a>(data: &'a [u8], len: usize, what: &str) -> Result<(&'a [u8], &'a [u8])> {
    data.split_at_checked(len).ok_or_else(|| {
        Error::Protocol(format!(
            "{}: buffer too short: {} < {}",
            what,
            data.len(),
            len
        ))
    })
}

/// Write 1-byte unsigned integer.
#[inline]
pub fn write_u8(out: &mut Vec<u8>, value: u8) {
    out.push(value);
}

/// Write 2-byte big-endian signed integer.
#[inline]
pub fn write_i16(out: &mut Vec<u8>, value: i16) {
    out.extend_from_slice(&value.to_be_bytes());
}

/// Write 2-byte big-endian unsigned integer.
#[inline]
pub fn write_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}

/// Write 4-byte big-endian signed integer.
#[inline]
pub fn write_i32(out: &mut Vec<u8>, value: i32) {
    out.extend_from_slice(&value.to_be_bytes());
}

/// Write 4-byte big-endian unsigned integer.
#[inline]
pub fn write_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_be_bytes());
}

/// Write raw bytes.
#[inline]
pub fn write_bytes(out: &mut Vec<u8>, data: &[u8]) {
    out.extend_from_slice(data);
}

/// Write null-terminated string from &str.
#[inline]
pub fn write_cstr(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(s.as_bytes());
    out.push(0);
}

/// Message builder helper that handles the length field.
///
/// PostgreSQL message format:
/// - Type byte (1 byte) - NOT included in length
/// - Length (4 bytes) - includes itself
/// - Payload (Length - 4 bytes)
pub struct MessageBuilder<'a> {
    buf: &'a mut Vec<u8>,
    start: usize,
}

impl<'a> MessageBuilder<'a> {
    /// Start building a message with a type byte.
    pub fn new(buf: &'a mut Vec<u8>, type_byte: u8) -> Self {
        buf.push(type_byte);
        let start = buf.len();
        buf.extend_from_slice(&[0, 0, 0, 0]);
        Self { buf, start }
    }

    /// Start building a startup message (no type byte).
    pub fn new_startup(buf: &'a mut Vec<u8>) -> Self {
        let start = buf.len();
        buf.extend_from_slice(&[0, 0, 0, 0]);
        Self { buf, start }
    }

    /// Get mutable access to the underlying buffer.
    pub fn buf(&mut self) -> &mut Vec<u8> {
        self.buf
    }

    /// Write a u8.
    pub fn write_u8(&mut self, value: u8) {
        write_u8(self.buf, value);
    }

    /// Write an i16.
    pub fn write_i16(&mut self, value: i16) {
        write_i16(self.buf, value);
    }

    /// Write a u16.
    pub fn write_u16(&mut self, value: u16) {
        write_u16(self.buf, value);
    }

    /// Write an i32.
    pub fn write_i32(&mut self, value: i32) {
        write_i32(self.buf, value);
    }

    /// Write a u32.
    pub fn write_u32(&mut self, value: u32) {
        write_u32(self.buf, value);
    }

    /// Write raw bytes.
    pub fn write_bytes(&mut self, data: &[u8]) {
        write_bytes(self.buf, data);
    }

    /// Write null-terminated string.
    pub fn write_cstr(&mut self, s: &str) {
        write_cstr(self.buf, s);
    }

    /// Finish building the message and fill in the length field.
    pub fn finish(self) {
        let len = (self.buf.len() - self.start) as i32;
        self.buf[self.start..self.start + 4].copy_from_slice(&len.to_be_bytes());
    }
}
