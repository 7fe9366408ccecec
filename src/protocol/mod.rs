//! Wire format of protocol version 3.
//!
//! `codec` frames messages and reads/writes their fields. `backend` parses
//! what the server sends, `frontend` writes what the client sends, and
//! `types` holds the small shared enums.

pub mod backend;
pub mod codec;
pub mod frontend;
pub mod types;

pub use backend::RawMessage;
pub use types::{FormatCode, Oid, TransactionStatus};
