//! Values flowing into and out of the connection state machine.

use crate::error::{Error, ErrorFields};
use crate::result::Resultset;
use crate::types::BoundParams;

/// Correlates a request with the outputs it produces.
pub type OpId = u64;

/// Proof of exclusive use of a connection.
pub type LockToken = u64;

/// Transaction isolation level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    fn as_sql(self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

/// Transaction access mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    ReadOnly,
    ReadWrite,
}

/// Options of a transaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransactionOptions {
    /// Isolation level; the server default when `None`.
    pub isolation: Option<IsolationLevel>,
    /// Access mode; the server default when `None`.
    pub access: Option<AccessMode>,
    /// Add `DEFERRABLE`. Only meaningful for serializable read-only transactions.
    pub deferrable: bool,
    /// Commit instead of rolling back when the transaction is abandoned.
    pub autocommit: bool,
}

impl TransactionOptions {
    /// Options with `autocommit` set.
    pub fn autocommit() -> Self {
        Self {
            autocommit: true,
            ..Self::default()
        }
    }

    /// Set the isolation level.
    pub fn isolation(mut self, level: IsolationLevel) -> Self {
        self.isolation = Some(level);
        self
    }

    /// Make the transaction read-only.
    pub fn read_only(mut self) -> Self {
        self.access = Some(AccessMode::ReadOnly);
        self
    }

    /// The BEGIN statement for these options.
    pub fn begin_sql(&self) -> String {
        let mut modes = Vec::new();
        if let Some(level) = self.isolation {
            modes.push(format!("ISOLATION LEVEL {}", level.as_sql()));
        }
        match self.access {
            Some(AccessMode::ReadOnly) => modes.push("READ ONLY".to_string()),
            Some(AccessMode::ReadWrite) => modes.push("READ WRITE".to_string()),
            None => {}
        }
        if self.deferrable {
            modes.push("DEFERRABLE".to_string());
        }
        if modes.is_empty() {
            "BEGIN".to_string()
        } else {
            format!("BEGIN {}", modes.join(", "))
        }
    }
}

/// A command submitted to the machine while it is at rest.
#[derive(Debug, Clone)]
pub enum Request {
    /// Start a transaction block.
    Begin {
        op: OpId,
        options: TransactionOptions,
    },
    /// Run SQL. Without parameters the simple protocol is used, otherwise
    /// the extended protocol with a cached prepared statement.
    Execute {
        op: OpId,
        sql: String,
        params: Option<BoundParams>,
    },
    /// Commit the current transaction block.
    Commit { op: OpId },
    /// Roll back the current transaction block.
    Rollback { op: OpId },
}

impl Request {
    /// The operation this request belongs to.
    pub fn op(&self) -> OpId {
        match self {
            Request::Begin { op, .. }
            | Request::Execute { op, .. }
            | Request::Commit { op }
            | Request::Rollback { op } => *op,
        }
    }
}

/// Asynchronous message from the server.
///
/// These can arrive at any time during query execution.
#[derive(Debug, Clone)]
pub enum AsyncMessage {
    /// Notification from LISTEN/NOTIFY.
    Notification {
        /// PID of the notifying backend process
        pid: u32,
        /// Channel name
        channel: String,
        /// Notification payload
        payload: String,
    },

    /// Non-fatal notice/warning from server.
    Notice(ErrorFields),

    /// Server parameter value changed.
    ParameterChanged {
        /// Parameter name
        name: String,
        /// New value
        value: String,
    },
}

/// Event produced by the machine, drained with `poll_output`.
#[derive(Debug)]
pub enum Output {
    /// The connection is idle and unlocked.
    Ready,
    /// The operation finished successfully.
    Completed { op: OpId },
    /// The operation failed. The connection may still be usable.
    Failed { op: OpId, error: Error },
    /// A batch of rows. `complete` marks the last batch of a statement.
    Rows {
        op: OpId,
        result: Resultset,
        complete: bool,
    },
    /// A transaction was left open by its owner and has been closed.
    Abandoned { error: Error },
    /// An asynchronous server message.
    Async(AsyncMessage),
    /// The connection is gone. Emitted once.
    Terminated,
}
