use crate::error::{Result, TxnError};
use crate::fs::{BackupRole, BackupStore, FileSystem, FsErrorKind, move_file};
use crate::ops::rollback::{restore, rollback_failed};
use crate::ops::{FileOperation, OperationType};
use crate::validation::Preflight;
use std::io;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// An operation whose forward action succeeded, with what is needed to
/// invert it.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedOperation {
    /// Position in the transaction's operation list.
    pub index: usize,
    pub operation: FileOperation,
    /// Copy of the source taken before mutation.
    pub source_backup: Option<PathBuf>,
    /// Copy of a target that was overwritten.
    pub target_backup: Option<PathBuf>,
}

/// A failed [`Executor::apply`].
#[derive(Debug)]
pub struct ApplyError {
    /// Why the operation failed.
    pub error: TxnError,
    /// Set when the operation's own partial effects could not be undone.
    pub cleanup: Option<TxnError>,
}

impl From<TxnError> for ApplyError {
    fn from(error: TxnError) -> Self {
        Self {
            error,
            cleanup: None,
        }
    }
}

/// Applies single operations on behalf of one transaction.
pub struct Executor<'a, F: FileSystem + ?Sized> {
    fs: &'a F,
    backups: &'a BackupStore,
    transaction_id: Uuid,
}

impl<'a, F: FileSystem + ?Sized> Executor<'a, F> {
    pub fn new(fs: &'a F, backups: &'a BackupStore, transaction_id: Uuid) -> Self {
        Self {
            fs,
            backups,
            transaction_id,
        }
    }

    /// Performs `op` (already validated) and records how to undo it.
    ///
    /// Backups are taken first; a failed backup aborts the operation before
    /// anything is mutated. A failed mutation is undone on the spot (the
    /// overwritten target restored, a partial target removed) since the
    /// operation never reaches the completed list.
    pub async fn apply(
        &self,
        index: usize,
        op: &FileOperation,
        preflight: Preflight,
    ) -> std::result::Result<CompletedOperation, ApplyError> {
        let source_backup = if op.metadata.create_backup || op.is_destructive() {
            Some(self.backup(index, BackupRole::Source, &op.source).await?)
        } else {
            None
        };

        let target_backup = match op.target_path() {
            Some(target) if preflight.overwrites_target => {
                Some(self.backup(index, BackupRole::Target, target).await?)
            }
            _ => None,
        };

        let done = CompletedOperation {
            index,
            operation: op.clone(),
            source_backup,
            target_backup,
        };

        match self.mutate(op).await {
            Ok(()) => Ok(done),
            Err(error) => {
                let cleanup = self.undo_partial(&done).await.err();
                if let Some(e) = &cleanup {
                    log::error!("Could not undo partial operation {}: {}", index, e);
                }
                Err(ApplyError { error, cleanup })
            }
        }
    }

    async fn mutate(&self, op: &FileOperation) -> Result<()> {
        match (op.op_type, op.target_path()) {
            (OperationType::Rename, Some(target)) => {
                move_file(self.fs, &op.source, target)
                    .await
                    .map_err(|e| mutation_failed(&op.source, e))?;
                log::info!("Renamed: {} → {}", op.source.display(), target.display());
            }
            (OperationType::Copy, Some(target)) => {
                let bytes = self
                    .fs
                    .copy(&op.source, target)
                    .await
                    .map_err(|e| mutation_failed(target, e))?;
                log::info!(
                    "Copied: {} → {} ({} bytes)",
                    op.source.display(),
                    target.display(),
                    bytes
                );
            }
            (OperationType::Delete, None) => {
                self.fs
                    .remove_file(&op.source)
                    .await
                    .map_err(|e| mutation_failed(&op.source, e))?;
                log::info!("Deleted: {}", op.source.display());
            }
            _ => {
                return Err(TxnError::InvalidOperation(format!(
                    "malformed operation: {}",
                    op
                )));
            }
        }
        Ok(())
    }

    /// Reverts whatever a failed mutation left behind.
    async fn undo_partial(&self, done: &CompletedOperation) -> Result<()> {
        let op = &done.operation;

        if let Some(target) = op.target_path() {
            if let Some(backup) = &done.target_backup {
                return restore(self.fs, backup, target).await;
            }
            // Only drop the target while the source still holds the data.
            if self.fs.exists(target).await && self.fs.exists(&op.source).await {
                log::debug!("Removing partial target {}", target.display());
                return self
                    .fs
                    .remove_file(target)
                    .await
                    .map_err(|e| rollback_failed(target, format!("Failed to remove partial target: {}", e)));
            }
            return Ok(());
        }

        match &done.source_backup {
            Some(backup) if !self.fs.exists(&op.source).await => {
                restore(self.fs, backup, &op.source).await
            }
            _ => Ok(()),
        }
    }

    async fn backup(&self, index: usize, role: BackupRole, path: &Path) -> Result<PathBuf> {
        self.backups
            .create(self.fs, self.transaction_id, index, role, path)
            .await
            .inspect_err(|e| log::error!("Backup before operation {} failed: {}", index, e))
    }
}

fn mutation_failed(path: &Path, err: io::Error) -> TxnError {
    log::error!(
        "Mutation of {} failed ({}): {}",
        path.display(),
        FsErrorKind::classify(&err),
        err
    );
    TxnError::MutationFailed {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}
