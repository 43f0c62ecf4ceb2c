//! Error taxonomy for the knowledge engine.
//!
//! Every failure surfaced by the library is one of a small set of kinds so
//! callers can decide whether to fix the call, retry, degrade, or abort.

use std::time::Duration;

use rusqlite::ErrorCode;
use thiserror::Error;

/// Library-wide result alias.
pub type Result<T, E = KnowledgeError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum KnowledgeError {
    /// The call itself is malformed (empty query, zero `top_k`, bad `source_id`).
    /// Raised before any I/O; never retried automatically.
    #[error("invalid request: {0}")]
    Validation(String),

    /// Lock acquisition exceeded the configured wait. Transient.
    #[error("knowledge store busy: lock not acquired within {}ms", waited.as_millis())]
    Busy { waited: Duration },

    /// A vector blob or slice is not exactly the fixed number of finite `f32`s.
    #[error("embedding encoding mismatch: {0}")]
    EncodingMismatch(String),

    /// A single stored row could not be decoded.
    #[error("corrupt record {source_id}: {reason}")]
    CorruptRecord { source_id: String, reason: String },

    /// The store was used after `close()`.
    #[error("knowledge store is closed")]
    Closed,

    #[error("storage error: {0}")]
    Storage(rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("remote knowledge service error: {0}")]
    Remote(String),
}

impl KnowledgeError {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Only lock contention is worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Busy { .. })
    }
}

impl From<rusqlite::Error> for KnowledgeError {
    fn from(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => Self::Busy {
                waited: Duration::ZERO,
            },
            _ => Self::Storage(err),
        }
    }
}

impl From<reqwest::Error> for KnowledgeError {
    fn from(err: reqwest::Error) -> Self {
        Self::Remote(err.to_string())
    }
}
