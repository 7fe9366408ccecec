//! Error types for pg-async.

use std::sync::Arc;

use thiserror::Error;

use crate::protocol::types::Oid;

/// Result type for pg-async operations.
pub type Result<T> = core::result::Result<T, Error>;

/// PostgreSQL error/notice fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorFields {
    /// Severity: ERROR, FATAL, PANIC, WARNING, NOTICE, DEBUG, INFO, LOG
    pub severity: Option<String>,
    /// Non-localized severity (same as severity but never translated)
    pub severity_non_localized: Option<String>,
    /// SQLSTATE error code (5 characters)
    pub code: Option<String>,
    /// Primary error message
    pub message: Option<String>,
    /// Detailed error explanation
    pub detail: Option<String>,
    /// Suggestion for fixing the error
    pub hint: Option<String>,
    /// Cursor position in query string (1-based)
    pub position: Option<u32>,
    /// Context/stack trace
    pub where_: Option<String>,
    /// Schema name
    pub schema: Option<String>,
    /// Table name
    pub table: Option<String>,
    /// Column name
    pub column: Option<String>,
    /// Data type name
    pub data_type: Option<String>,
    /// Constraint name
    pub constraint: Option<String>,
    /// Source routine name
    pub routine: Option<String>,
}

impl ErrorFields {
    /// Severity, preferring the non-localized variant.
    pub fn severity(&self) -> Option<&str> {
        self.severity_non_localized
            .as_deref()
            .or(self.severity.as_deref())
    }

    /// Whether the severity is ERROR, FATAL or PANIC.
    pub fn is_error(&self) -> bool {
        matches!(self.severity(), Some("ERROR" | "FATAL" | "PANIC"))
    }
}

impl std::fmt::Display for ErrorFields {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(severity) = self.severity() {
            write!(f, "{}: ", severity)?;
        }
        if let Some(message) = &self.message {
            write!(f, "{}", message)?;
        }
        if let Some(code) = &self.code {
            write!(f, " (SQLSTATE {})", code)?;
        }
        if let Some(detail) = &self.detail {
            write!(f, "\nDETAIL: {}", detail)?;
        }
        if let Some(hint) = &self.hint {
            write!(f, "\nHINT: {}", hint)?;
        }
        Ok(())
    }
}

/// Error type for pg-async.
///
/// Errors are `Clone` so a single transport failure can be delivered to
/// every operation pending on the broken connection.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Server error response (SQLSTATE-bearing query error)
    #[error("PostgreSQL error: {0}")]
    Server(ErrorFields),

    /// Protocol error (malformed message, unexpected response, etc.)
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Not enough bytes buffered to decode a whole frame
    #[error("Truncated frame: {needed} more bytes needed")]
    TruncatedFrame {
        /// Number of additional bytes required
        needed: usize,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(Arc<std::io::Error>),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The connection failed while the operation was pending
    #[error("Connection error: {0}")]
    Connection(String),

    /// The connection was terminated
    #[error("Connection is closed")]
    ConnectionClosed,

    /// Bad connection string or service configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Invalid usage (e.g., nested transactions)
    #[error("Invalid usage: {0}")]
    InvalidUsage(String),

    /// Unsupported feature
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// No wire format is registered for this type OID
    #[error("Unsupported type: oid {0}")]
    UnsupportedType(Oid),

    /// Value decoding failed
    #[error("Decode error: {0}")]
    Decode(String),

    /// The transaction ended in a rollback
    #[error("Transaction rolled back")]
    TransactionRolledBack,

    /// The pool was closed while the caller was waiting
    #[error("Connection pool is closed")]
    PoolClosed,

    /// No pool is registered under the alias
    #[error("Unknown database alias: {0}")]
    UnknownAlias(String),
}

impl Error {
    /// Returns true if the error indicates the connection is broken and cannot be reused.
    pub fn is_connection_broken(&self) -> bool {
        match self {
            Error::Io(_)
            | Error::Connection(_)
            | Error::ConnectionClosed
            | Error::Protocol(_)
            | Error::Auth(_) => true,
            Error::Server(fields) => {
                // FATAL and PANIC errors indicate connection is broken
                matches!(fields.severity(), Some("FATAL") | Some("PANIC"))
            }
            _ => false,
        }
    }

    /// Get the SQLSTATE code if this is a server error.
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            Error::Server(fields) => fields.code.as_deref(),
            _ => None,
        }
    }

    /// Get the severity if this is a server error.
    pub fn severity(&self) -> Option<&str> {
        match self {
            Error::Server(fields) => fields.severity(),
            _ => None,
        }
    }

    pub(crate) fn type_mismatch(expected: &str, oid: Oid) -> Self {
        Error::Decode(format!("cannot decode oid {} as {}", oid, expected))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(Arc::new(err))
    }
}
