//! Error types for filetxn.
//!
//! All operations return `Result<T>` which aliases `Result<T, TxnError>`.

use crate::transaction::TransactionStatus;
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

/// Errors from transactional file operations.
#[derive(Debug, Error)]
pub enum TxnError {
    /// No transaction is registered under this id.
    #[error("Transaction {0} not found")]
    TransactionNotFound(Uuid),

    /// The transaction is not in a state that allows the request.
    ///
    /// Raised when adding to or executing a transaction that already left
    /// `pending`.
    #[error("Transaction {id} is {status}; expected pending")]
    InvalidState { id: Uuid, status: TransactionStatus },

    /// The operation itself is malformed (relative path, missing target...).
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Source path does not exist or is not a regular file.
    #[error("Source not found or not a regular file: {0}")]
    SourceNotFound(PathBuf),

    /// Missing read or write access.
    #[error("Permission denied: {path} ({reason})")]
    PermissionDenied { path: PathBuf, reason: String },

    /// Rename/copy target is present and `force` is not set.
    #[error("Target already exists: {0}")]
    TargetExists(PathBuf),

    /// Directory that should receive the target does not exist.
    #[error("Target parent directory does not exist: {0}")]
    TargetParentMissing(PathBuf),

    /// Pre-mutation backup could not be written.
    #[error("Backup of {path} failed: {message}")]
    BackupFailed { path: PathBuf, message: String },

    /// The physical rename/copy/delete failed.
    ///
    /// Displays the provider's error text verbatim; the path is kept for
    /// logging.
    #[error("{message}")]
    MutationFailed { path: PathBuf, message: String },

    /// Inverting a completed operation failed during rollback.
    #[error("Rollback failed for {path}: {message}")]
    RollbackFailed { path: PathBuf, message: String },

    /// Execution stopped by the caller's cancellation token.
    #[error("Transaction cancelled before operation {0}")]
    Cancelled(usize),

    /// Another running transaction holds a lock on this path.
    #[error("Path {path} is locked by transaction {holder}")]
    PathConflict { path: PathBuf, holder: Uuid },

    /// File system operation failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON parse or serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Unexpected error.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias for filetxn operations.
pub type Result<T> = std::result::Result<T, TxnError>;
