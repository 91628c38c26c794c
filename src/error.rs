//! Error taxonomy for the local store and the synchronization layer.
//!
//! Three failure classes exist:
//!
//! - [`StoreError::StoreUnavailable`]: the persistent environment cannot be used at all.
//! - [`StoreError::Persistence`]: a single operation on one collection failed.
//! - [`SyncSubmissionError`]: the remote system rejected a queued action.
//!
//! [`SyncError`] is only produced by an explicit, user-initiated sync.

use std::fmt::{Display, Formatter};

use thiserror::Error;

/// The operation a [`StoreError::Persistence`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Open,
    Put,
    Get,
    GetAll,
    QueryByIndex,
    Delete,
    Clear,
}

impl Display for Operation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Operation::Open => "open",
            Operation::Put => "put",
            Operation::Get => "get",
            Operation::GetAll => "getAll",
            Operation::QueryByIndex => "queryByIndex",
            Operation::Delete => "delete",
            Operation::Clear => "clear",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// No offline capability. Callers decide whether to degrade to volatile memory.
    #[error("local store unavailable at '{path}': {reason}")]
    StoreUnavailable { path: String, reason: String },

    #[error("{operation} on '{collection}' failed: {reason}")]
    Persistence {
        collection: String,
        operation: Operation,
        reason: String,
    },
}

impl StoreError {
    pub fn unavailable(path: impl Into<String>, reason: impl Display) -> Self {
        StoreError::StoreUnavailable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn persistence(collection: &str, operation: Operation, reason: impl Display) -> Self {
        StoreError::Persistence {
            collection: collection.to_string(),
            operation,
            reason: reason.to_string(),
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::StoreUnavailable { .. })
    }
}

/// A remote submission failed. The item stays queued for the next drain.
#[derive(Debug, Clone, Error)]
#[error("remote submission of sync item {item_id} failed: {message}")]
pub struct SyncSubmissionError {
    pub item_id: u64,
    pub message: String,
}

impl SyncSubmissionError {
    pub fn new(item_id: u64, message: impl Into<String>) -> Self {
        Self {
            item_id,
            message: message.into(),
        }
    }
}

/// Outcome of a user-initiated "sync now" that did not empty the queue.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("cannot sync while the remote system is unreachable")]
    Offline,

    #[error("sync incomplete: {remaining} item(s) still queued")]
    Incomplete { remaining: usize },

    #[error(transparent)]
    Store(#[from] StoreError),
}
