//! The transaction registry and execution loop.
//!
//! ## Execution
//!
//! For every queued operation, in insertion order:
//!
//! 1. **Validate** against the current disk state (earlier operations of the
//!    same transaction may have created or removed files)
//! 2. **Execute**, taking backups first where required
//! 3. **Record** the completed operation with what is needed to invert it
//!
//! The first failure stops forward progress. The failing operation undoes
//! its own partial effects, then completed operations are inverted in LIFO
//! order; a failing inversion is recorded and the remaining ones are still
//! attempted.

use crate::audit::{AuditStore, NoopAuditStore, OperationStatus};
use crate::config::ManagerConfig;
use crate::error::{Result, TxnError};
use crate::fs::{BackupStore, FileSystem, TokioFileSystem};
use crate::ops::{ApplyError, CompletedOperation, Executor, FileOperation, rollback};
use crate::transaction::context::{ExecutionResult, TransactionContext, TransactionStatus};
use crate::transaction::locks::PathLocks;
use crate::validation::validate_operation;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Runs batches of file operations with validation, backups and rollback.
///
/// Owns every [`TransactionContext`] it creates; callers only ever see
/// snapshots.
pub struct TransactionalFileManager {
    fs: Arc<dyn FileSystem>,
    audit: Arc<dyn AuditStore>,
    backups: BackupStore,
    locks: Arc<PathLocks>,
    config: ManagerConfig,
    registry: Mutex<HashMap<Uuid, TransactionContext>>,
}

impl TransactionalFileManager {
    /// Creates a manager over the real file system.
    pub fn new(config: ManagerConfig) -> Self {
        Self::with_filesystem(Arc::new(TokioFileSystem), config)
    }

    pub fn with_filesystem(fs: Arc<dyn FileSystem>, config: ManagerConfig) -> Self {
        Self {
            fs,
            audit: Arc::new(NoopAuditStore),
            backups: BackupStore::new(config.backup_root.clone()),
            locks: Arc::new(PathLocks::new()),
            config,
            registry: Mutex::new(HashMap::new()),
        }
    }

    /// Replaces the audit store (defaults to [`NoopAuditStore`]).
    pub fn with_audit_store(mut self, audit: Arc<dyn AuditStore>) -> Self {
        self.audit = audit;
        self
    }

    pub fn backups(&self) -> &BackupStore {
        &self.backups
    }

    /// Registers a new, empty, pending transaction.
    pub fn create_transaction(&self) -> TransactionContext {
        let ctx = TransactionContext::new();
        self.registry().insert(ctx.id, ctx.clone());
        log::debug!("Created transaction {}", ctx.id);
        ctx
    }

    /// Appends `operation` to a pending transaction.
    ///
    /// Returns the updated snapshot. On error nothing is changed.
    pub fn add_operation(&self, id: Uuid, operation: FileOperation) -> Result<TransactionContext> {
        let mut registry = self.registry();
        let ctx = registry
            .get_mut(&id)
            .ok_or(TxnError::TransactionNotFound(id))?;

        if ctx.status != TransactionStatus::Pending {
            return Err(TxnError::InvalidState {
                id,
                status: ctx.status,
            });
        }

        operation.check()?;

        log::debug!("Staging operation {} on {}: {}", ctx.len(), id, operation);
        ctx.operations.push(operation);
        Ok(ctx.clone())
    }

    /// Snapshot of a transaction, if known.
    pub fn get_transaction_status(&self, id: Uuid) -> Option<TransactionContext> {
        self.registry().get(&id).cloned()
    }

    /// Snapshots of every registered transaction, oldest first.
    pub fn list_transactions(&self) -> Vec<TransactionContext> {
        let mut all: Vec<_> = self.registry().values().cloned().collect();
        all.sort_by_key(|ctx| ctx.created_at);
        all
    }

    /// Removes a transaction that is not running from the registry.
    pub fn forget_transaction(&self, id: Uuid) -> Result<TransactionContext> {
        let mut registry = self.registry();
        match registry.get(&id).map(|ctx| ctx.status) {
            None => Err(TxnError::TransactionNotFound(id)),
            Some(TransactionStatus::Running) => Err(TxnError::InvalidState {
                id,
                status: TransactionStatus::Running,
            }),
            Some(_) => registry
                .remove(&id)
                .ok_or(TxnError::TransactionNotFound(id)),
        }
    }

    /// Checks every queued operation against the current disk state without
    /// mutating anything.
    ///
    /// Operations that depend on an earlier one (e.g. renaming a file that a
    /// previous copy creates) are reported as failing here even though they
    /// would pass during execution.
    pub async fn validate_transaction(&self, id: Uuid) -> Result<Vec<String>> {
        let ctx = self
            .get_transaction_status(id)
            .ok_or(TxnError::TransactionNotFound(id))?;

        let mut problems = Vec::new();
        for (index, op) in ctx.operations.iter().enumerate() {
            if let Err(e) = validate_operation(self.fs.as_ref(), op).await {
                log::warn!("Operation {} ({}) would fail: {}", index, op, e);
                problems.push(format!("operation {}: {}", index, e));
            }
        }
        Ok(problems)
    }

    /// Runs a pending transaction to completion.
    ///
    /// Only `TransactionNotFound` and `InvalidState` (already executing or
    /// executed) are returned as `Err`; every operation-level failure ends up
    /// in [`ExecutionResult::errors`] after a rollback.
    pub async fn execute_transaction(&self, id: Uuid) -> Result<ExecutionResult> {
        self.execute_transaction_with_cancel(id, CancellationToken::new())
            .await
    }

    /// Like [`execute_transaction`](Self::execute_transaction), but stops
    /// before the next operation once `cancel` fires and rolls back.
    ///
    /// Dropping the returned future before it completes marks the
    /// transaction `failed`; the operations completed so far are then rolled
    /// back on a background task, which also releases the backups and locks.
    pub async fn execute_transaction_with_cancel(
        &self,
        id: Uuid,
        cancel: CancellationToken,
    ) -> Result<ExecutionResult> {
        let operations = self.begin(id)?;
        let mut run = RunGuard::new(self, id);
        log::info!("Executing transaction {} ({} operations)", id, operations.len());

        self.audited("update transaction status", self.audit.update_transaction_status(id, TransactionStatus::Running))
            .await;
        for (index, op) in operations.iter().enumerate() {
            self.audited("record operation", self.audit.record_operation(id, index, op))
                .await;
        }

        if self.config.lock_paths {
            let paths = operations
                .iter()
                .flat_map(|op| std::iter::once(op.source.as_path()).chain(op.target_path()));
            if let Err(e) = self.locks.acquire(id, paths) {
                run.disarm();
                return Ok(self
                    .finish(id, TransactionStatus::Failed, 0, vec![e.to_string()])
                    .await);
            }
        }

        let executor = Executor::new(self.fs.as_ref(), &self.backups, id);
        let mut errors = Vec::new();
        let mut cleanup_errors = Vec::new();

        for (index, op) in operations.iter().enumerate() {
            if cancel.is_cancelled() {
                let err = TxnError::Cancelled(index);
                log::warn!("Transaction {}: {}", id, err);
                errors.push(err.to_string());
                break;
            }

            match self.run_operation(&executor, index, op).await {
                Ok(done) => {
                    run.completed.push(done);
                    self.audited(
                        "update operation status",
                        self.audit
                            .update_operation_status(id, index, OperationStatus::Completed, None),
                    )
                    .await;
                }
                Err(ApplyError { error, cleanup }) => {
                    let message = error.to_string();
                    let status = match cleanup {
                        Some(_) => OperationStatus::RollbackFailed,
                        None => OperationStatus::Failed,
                    };
                    errors.push(message.clone());
                    if let Some(cleanup) = cleanup {
                        cleanup_errors.push(cleanup.to_string());
                    }
                    self.audited(
                        "update operation status",
                        self.audit
                            .update_operation_status(id, index, status, Some(&message)),
                    )
                    .await;
                    break;
                }
            }
        }

        let success = errors.is_empty();
        let completed_operations = run.completed.len();
        let mut rollback_clean = cleanup_errors.is_empty();
        errors.append(&mut cleanup_errors);

        if !success {
            for step in rollback(self.fs.as_ref(), &mut run.completed).await {
                let (status, error) = match &step.result {
                    Ok(()) => (OperationStatus::RolledBack, None),
                    Err(e) => (OperationStatus::RollbackFailed, Some(e.to_string())),
                };
                self.audited(
                    "update operation status",
                    self.audit
                        .update_operation_status(id, step.index, status, error.as_deref()),
                )
                .await;
                if let Some(error) = error {
                    rollback_clean = false;
                    errors.push(error);
                }
            }
        }

        let status = if success {
            TransactionStatus::Committed
        } else {
            TransactionStatus::RolledBack
        };
        run.settle(status, rollback_clean);
        release_resources(
            self.fs.as_ref(),
            &self.backups,
            &self.locks,
            &self.config,
            id,
            rollback_clean,
        )
        .await;
        run.disarm();

        Ok(self.finish(id, status, completed_operations, errors).await)
    }

    async fn run_operation(
        &self,
        executor: &Executor<'_, dyn FileSystem>,
        index: usize,
        op: &FileOperation,
    ) -> std::result::Result<CompletedOperation, ApplyError> {
        let preflight = validate_operation(self.fs.as_ref(), op)
            .await
            .inspect_err(|e| log::warn!("Validation of operation {} ({}) failed: {}", index, op, e))?;

        executor.apply(index, op, preflight).await
    }

    /// Moves a pending transaction to running and returns its operations.
    fn begin(&self, id: Uuid) -> Result<Vec<FileOperation>> {
        let mut registry = self.registry();
        let ctx = registry
            .get_mut(&id)
            .ok_or(TxnError::TransactionNotFound(id))?;

        if ctx.status != TransactionStatus::Pending {
            log::warn!("Refusing to execute transaction {} in state {}", id, ctx.status);
            return Err(TxnError::InvalidState {
                id,
                status: ctx.status,
            });
        }

        ctx.status = TransactionStatus::Running;
        Ok(ctx.operations.clone())
    }

    /// Cleans up after an execution whose future was dropped mid-way.
    ///
    /// Without a settled outcome the transaction is marked `failed` and the
    /// remaining completed operations are rolled back first.
    fn abandon(
        &self,
        id: Uuid,
        mut completed: Vec<CompletedOperation>,
        settled: Option<(TransactionStatus, bool)>,
    ) {
        let status = settled.map_or(TransactionStatus::Failed, |(status, _)| status);
        log::error!(
            "Execution of transaction {} was dropped with {} operations left to roll back",
            id,
            completed.len()
        );
        self.set_status(id, status);

        let fs = self.fs.clone();
        let audit = self.audit.clone();
        let backups = self.backups.clone();
        let locks = self.locks.clone();
        let config = self.config.clone();
        let cleanup = async move {
            let clean = match settled {
                Some((_, clean)) => clean,
                None => rollback(fs.as_ref(), &mut completed)
                    .await
                    .iter()
                    .all(|step| step.result.is_ok()),
            };
            release_resources(fs.as_ref(), &backups, &locks, &config, id, clean).await;
            if let Err(e) = audit.update_transaction_status(id, status).await {
                log::warn!("Audit store failed to update transaction status: {}", e);
            }
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(cleanup);
            }
            Err(_) => {
                log::error!(
                    "No runtime to clean up transaction {}; backups kept in {}",
                    id,
                    self.backups.transaction_dir(id).display()
                );
                self.locks.release(id);
            }
        }
    }

    fn set_status(&self, id: Uuid, status: TransactionStatus) {
        if let Some(ctx) = self.registry().get_mut(&id) {
            ctx.status = status;
        }
    }

    async fn finish(
        &self,
        id: Uuid,
        status: TransactionStatus,
        completed_operations: usize,
        errors: Vec<String>,
    ) -> ExecutionResult {
        self.set_status(id, status);

        self.audited("update transaction status", self.audit.update_transaction_status(id, status))
            .await;

        match status {
            TransactionStatus::Committed => log::info!(
                "Transaction {} committed ({} operations)",
                id,
                completed_operations
            ),
            _ => log::error!(
                "Transaction {} {} after {} completed operations: {}",
                id,
                status,
                completed_operations,
                errors.join("; ")
            ),
        }

        ExecutionResult {
            transaction_id: id,
            success: status == TransactionStatus::Committed,
            completed_operations,
            errors,
            status,
        }
    }

    async fn audited(&self, what: &str, call: impl Future<Output = anyhow::Result<()>>) {
        if let Err(e) = call.await {
            log::warn!("Audit store failed to {}: {}", what, e);
        }
    }

    fn registry(&self) -> MutexGuard<'_, HashMap<Uuid, TransactionContext>> {
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for TransactionalFileManager {
    fn default() -> Self {
        Self::new(ManagerConfig::default())
    }
}

/// Tracks an execution in flight; hands it to
/// [`TransactionalFileManager::abandon`] if dropped while armed.
struct RunGuard<'a> {
    manager: &'a TransactionalFileManager,
    id: Uuid,
    completed: Vec<CompletedOperation>,
    /// Final status and rollback cleanliness, once decided.
    settled: Option<(TransactionStatus, bool)>,
    armed: bool,
}

impl<'a> RunGuard<'a> {
    fn new(manager: &'a TransactionalFileManager, id: Uuid) -> Self {
        Self {
            manager,
            id,
            completed: Vec::new(),
            settled: None,
            armed: true,
        }
    }

    fn settle(&mut self, status: TransactionStatus, rollback_clean: bool) {
        self.settled = Some((status, rollback_clean));
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let completed = match self.settled {
                Some(_) => Vec::new(),
                None => std::mem::take(&mut self.completed),
            };
            self.manager.abandon(self.id, completed, self.settled);
        }
    }
}

/// Releases (or keeps, after an unclean rollback when configured) the
/// transaction's backups, then its path locks.
async fn release_resources(
    fs: &dyn FileSystem,
    backups: &BackupStore,
    locks: &PathLocks,
    config: &ManagerConfig,
    id: Uuid,
    rollback_clean: bool,
) {
    if !rollback_clean && config.retain_backups_on_rollback_failure {
        log::warn!(
            "Keeping backups of transaction {} in {} for manual recovery",
            id,
            backups.transaction_dir(id).display()
        );
    } else if let Err(e) = backups.release(fs, id).await {
        log::warn!("Could not release backups of transaction {}: {}", id, e);
    }

    if config.lock_paths {
        locks.release(id);
    }
}
