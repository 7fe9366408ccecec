//! Query message.

use crate::protocol::codec::MessageBuilder;

/// Append a Query message. `sql` may hold several `;`-separated statements.
pub fn write_query(buf: &mut Vec<u8>, sql: &str) {
    let mut msg = MessageBuilder::new(buf, super::msg_type::QUERY);
    msg.write_cstr(sql);
    msg.finish();
}
