use crate::ops::FileOperation;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Lifecycle of a transaction.
///
/// `Pending` → `Running` → `Committed` | `RolledBack`. `Failed` is used when
/// execution could not start at all (e.g. a path lock conflict), or when the
/// executing future was dropped before finishing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Running,
    Committed,
    Failed,
    RolledBack,
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Running => "running",
            TransactionStatus::Committed => "committed",
            TransactionStatus::Failed => "failed",
            TransactionStatus::RolledBack => "rolled_back",
        };
        f.write_str(name)
    }
}

/// A transaction's queued operations and status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionContext {
    pub id: Uuid,
    /// Insertion order is execution order.
    pub operations: Vec<FileOperation>,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
}

impl TransactionContext {
    pub(crate) fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            operations: Vec::new(),
            status: TransactionStatus::Pending,
            created_at: Utc::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

/// What `execute_transaction` reports back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub transaction_id: Uuid,
    /// True only if every operation ran and no rollback happened.
    pub success: bool,
    /// Operations whose forward action committed before any failure.
    pub completed_operations: usize,
    /// Execution errors followed by rollback errors, in the order seen.
    pub errors: Vec<String>,
    pub status: TransactionStatus,
}
