//! Asynchronous client on tokio: connection actors, pools and the service
//! that routes work to them by alias.

mod conn;
mod pool;
mod service;
mod stream;
mod transaction;

use std::sync::atomic::{AtomicU64, Ordering};

pub use conn::ConnectionId;
pub use pool::PoolStatus;
pub use service::DatabaseService;
pub use transaction::{Batch, Completion, RowStream, Transaction};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique id for connections, operations and lock tokens.
fn next_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}
