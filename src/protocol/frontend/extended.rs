//! Extended query protocol messages.

use crate::error::{Error, Result};
use crate::protocol::codec::MessageBuilder;
use crate::protocol::types::{FormatCode, Oid};
use crate::types::BoundParams;

/// Most entries an Int16 count field can announce.
///
/// The server reads these counts as unsigned.
pub const MAX_COUNT: usize = u16::MAX as usize;

fn count(len: usize, what: &str) -> Result<u16> {
    u16::try_from(len).map_err(|e| {
        Error::InvalidUsage(format!("too many {}: {} ({})", what, len, e))
    })
}

/// Write a Parse message to create a prepared statement.
///
/// - `name`: Statement name (empty string for unnamed statement)
/// - `query`: SQL query with $1, $2, ... placeholders
/// - `param_oids`: Parameter type OIDs (0 = let server infer)
///
/// Nothing is written when there are more than [`MAX_COUNT`] parameters.
pub fn write_parse(buf: &mut Vec<u8>, name: &str, query: &str, param_oids: &[Oid]) -> Result<()> {
    let param_count = count(param_oids.len(), "parameters")?;
    let mut msg = MessageBuilder::new(buf, super::msg_type::PARSE);
    msg.write_cstr(name);
    msg.write_cstr(query);
    msg.write_u16(param_count);
    for &oid in param_oids {
        msg.write_u32(oid);
    }
    msg.finish();
    Ok(())
}

/// Write a Bind message to create a portal from a prepared statement.
///
/// Every parameter gets an explicit format code taken from the value's
/// registered wire format; `result_formats` holds one code per result column.
pub fn write_bind(
    buf: &mut Vec<u8>,
    portal: &str,
    statement: &str,
    params: &BoundParams,
    result_formats: &[FormatCode],
) -> Result<()> {
    let param_count = count(params.len(), "parameters")?;
    let result_count = count(result_formats.len(), "result columns")?;
    let mut msg = MessageBuilder::new(buf, super::msg_type::BIND);

    msg.write_cstr(portal);
    msg.write_cstr(statement);

    msg.write_u16(param_count);
    for &format in params.formats() {
        msg.write_i16(format.code());
    }

    // Values are already length-prefixed
    msg.write_u16(param_count);
    msg.write_bytes(params.values());

    msg.write_u16(result_count);
    for &format in result_formats {
        msg.write_i16(format.code());
    }

    msg.finish();
    Ok(())
}

/// Write an Execute message to run a portal.
///
/// - `portal`: Portal name
/// - `max_rows`: Maximum number of rows to return (0 = unlimited)
pub fn write_execute(buf: &mut Vec<u8>, portal: &str, max_rows: u32) {
    let mut msg = MessageBuilder::new(buf, super::msg_type::EXECUTE);
    msg.write_cstr(portal);
    msg.write_u32(max_rows);
    msg.finish();
}

fn write_describe(buf: &mut Vec<u8>, describe_type: u8, name: &str) {
    let mut msg = MessageBuilder::new(buf, super::msg_type::DESCRIBE);
    msg.write_u8(describe_type);
    msg.write_cstr(name);
    msg.finish();
}

/// Write a Describe message for a statement.
pub fn write_describe_statement(buf: &mut Vec<u8>, name: &str) {
    write_describe(buf, b'S', name);
}

/// Write a Describe message for a portal.
pub fn write_describe_portal(buf: &mut Vec<u8>, name: &str) {
    write_describe(buf, b'P', name);
}

/// Write a Sync message.
///
/// Ends an extended query sequence; the server answers with ReadyForQuery
/// after discarding anything left over from a failed step.
pub fn write_sync(buf: &mut Vec<u8>) {
    let msg = MessageBuilder::new(buf, super::msg_type::SYNC);
    msg.finish();
}
