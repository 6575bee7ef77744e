//! Best-effort history of transaction and operation lifecycle.
//!
//! The manager reports to an [`AuditStore`]; errors from the store are
//! logged and otherwise ignored.

use crate::ops::FileOperation;
use crate::transaction::TransactionStatus;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Mutex;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Lifecycle state of a single operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Pending,
    Completed,
    Failed,
    RolledBack,
    RollbackFailed,
}

/// One history entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent {
    OperationRecorded {
        transaction_id: Uuid,
        index: usize,
        operation: FileOperation,
        at: DateTime<Utc>,
    },
    OperationStatus {
        transaction_id: Uuid,
        index: usize,
        status: OperationStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        at: DateTime<Utc>,
    },
    TransactionStatus {
        transaction_id: Uuid,
        status: TransactionStatus,
        at: DateTime<Utc>,
    },
}

/// Sink for lifecycle events.
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn record_operation(
        &self,
        transaction_id: Uuid,
        index: usize,
        operation: &FileOperation,
    ) -> anyhow::Result<()>;

    async fn update_operation_status(
        &self,
        transaction_id: Uuid,
        index: usize,
        status: OperationStatus,
        error: Option<&str>,
    ) -> anyhow::Result<()>;

    async fn update_transaction_status(
        &self,
        transaction_id: Uuid,
        status: TransactionStatus,
    ) -> anyhow::Result<()>;
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAuditStore;

#[async_trait]
impl AuditStore for NoopAuditStore {
    async fn record_operation(&self, _: Uuid, _: usize, _: &FileOperation) -> anyhow::Result<()> {
        Ok(())
    }

    async fn update_operation_status(
        &self,
        _: Uuid,
        _: usize,
        _: OperationStatus,
        _: Option<&str>,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    async fn update_transaction_status(&self, _: Uuid, _: TransactionStatus) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Keeps events in memory.
#[derive(Debug, Default)]
pub struct MemoryAuditStore {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all events so far.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.lock().clone()
    }

    /// Events belonging to one transaction.
    pub fn events_for(&self, transaction_id: Uuid) -> Vec<AuditEvent> {
        self.lock()
            .iter()
            .filter(|e| e.transaction_id() == transaction_id)
            .cloned()
            .collect()
    }

    fn push(&self, event: AuditEvent) {
        self.lock().push(event);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<AuditEvent>> {
        self.events.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn record_operation(
        &self,
        transaction_id: Uuid,
        index: usize,
        operation: &FileOperation,
    ) -> anyhow::Result<()> {
        self.push(AuditEvent::OperationRecorded {
            transaction_id,
            index,
            operation: operation.clone(),
            at: Utc::now(),
        });
        Ok(())
    }

    async fn update_operation_status(
        &self,
        transaction_id: Uuid,
        index: usize,
        status: OperationStatus,
        error: Option<&str>,
    ) -> anyhow::Result<()> {
        self.push(AuditEvent::OperationStatus {
            transaction_id,
            index,
            status,
            error: error.map(str::to_string),
            at: Utc::now(),
        });
        Ok(())
    }

    async fn update_transaction_status(
        &self,
        transaction_id: Uuid,
        status: TransactionStatus,
    ) -> anyhow::Result<()> {
        self.push(AuditEvent::TransactionStatus {
            transaction_id,
            status,
            at: Utc::now(),
        });
        Ok(())
    }
}

/// Appends one JSON object per line to a journal file.
#[derive(Debug)]
pub struct JsonlAuditStore {
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonlAuditStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Reads every event back from the journal.
    pub async fn read_all(&self) -> anyhow::Result<Vec<AuditEvent>> {
        let content = tokio::fs::read_to_string(&self.path).await?;
        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(Into::into))
            .collect()
    }

    async fn append(&self, event: AuditEvent) -> anyhow::Result<()> {
        let mut line = serde_json::to_string(&event)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl AuditStore for JsonlAuditStore {
    async fn record_operation(
        &self,
        transaction_id: Uuid,
        index: usize,
        operation: &FileOperation,
    ) -> anyhow::Result<()> {
        self.append(AuditEvent::OperationRecorded {
            transaction_id,
            index,
            operation: operation.clone(),
            at: Utc::now(),
        })
        .await
    }

    async fn update_operation_status(
        &self,
        transaction_id: Uuid,
        index: usize,
        status: OperationStatus,
        error: Option<&str>,
    ) -> anyhow::Result<()> {
        self.append(AuditEvent::OperationStatus {
            transaction_id,
            index,
            status,
            error: error.map(str::to_string),
            at: Utc::now(),
        })
        .await
    }

    async fn update_transaction_status(
        &self,
        transaction_id: Uuid,
        status: TransactionStatus,
    ) -> anyhow::Result<()> {
        self.append(AuditEvent::TransactionStatus {
            transaction_id,
            status,
            at: Utc::now(),
        })
        .await
    }
}

impl AuditEvent {
    pub fn transaction_id(&self) -> Uuid {
        match self {
            AuditEvent::OperationRecorded { transaction_id, .. }
            | AuditEvent::OperationStatus { transaction_id, .. }
            | AuditEvent::TransactionStatus { transaction_id, .. } => *transaction_id,
        }
    }
}
