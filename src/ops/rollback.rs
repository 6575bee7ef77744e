use crate::error::TxnError;
use crate::fs::{FileSystem, move_file};
use crate::ops::{CompletedOperation, OperationType};
use std::path::Path;

/// Outcome of inverting one completed operation.
#[derive(Debug)]
pub struct RollbackStep {
    pub index: usize,
    pub result: Result<(), TxnError>,
}

/// Inverts `completed` in reverse order, popping each operation before it
/// is inverted.
///
/// Every step is attempted even when an earlier one fails; the returned
/// steps are in the order they were attempted. If the future is dropped
/// part way, `completed` still holds the operations not yet attempted.
pub async fn rollback<F: FileSystem + ?Sized>(
    fs: &F,
    completed: &mut Vec<CompletedOperation>,
) -> Vec<RollbackStep> {
    log::warn!("Rolling back {} operations...", completed.len());

    let mut steps = Vec::with_capacity(completed.len());
    while let Some(done) = completed.pop() {
        let result = invert(fs, &done).await;
        match &result {
            Ok(()) => log::debug!("Reverted operation {}: {}", done.index, done.operation),
            Err(e) => log::error!("Could not revert operation {}: {}", done.index, e),
        }
        steps.push(RollbackStep {
            index: done.index,
            result,
        });
    }

    if steps.iter().all(|s| s.result.is_ok()) {
        log::info!("Rollback completed");
    }

    steps
}

/// Undoes a single completed operation.
pub async fn invert<F: FileSystem + ?Sized>(fs: &F, done: &CompletedOperation) -> Result<(), TxnError> {
    let op = &done.operation;

    match (op.op_type, op.target_path()) {
        (OperationType::Rename, Some(target)) => {
            move_file(fs, target, &op.source)
                .await
                .map_err(|e| rollback_failed(&op.source, format!("Failed to move back {}: {}", target.display(), e)))?;
            if let Some(backup) = &done.target_backup {
                restore(fs, backup, target).await?;
            }
            Ok(())
        }
        (OperationType::Copy, Some(target)) => match &done.target_backup {
            Some(backup) => restore(fs, backup, target).await,
            None => fs
                .remove_file(target)
                .await
                .map_err(|e| rollback_failed(target, format!("Failed to remove copy: {}", e))),
        },
        (OperationType::Delete, _) => match &done.source_backup {
            Some(backup) => restore(fs, backup, &op.source).await,
            None => Err(rollback_failed(&op.source, "no backup recorded".to_string())),
        },
        _ => Err(rollback_failed(
            &op.source,
            format!("malformed operation: {}", op),
        )),
    }
}

pub(crate) async fn restore<F: FileSystem + ?Sized>(fs: &F, backup: &Path, original: &Path) -> Result<(), TxnError> {
    fs.copy(backup, original)
        .await
        .map(|_| ())
        .map_err(|e| rollback_failed(original, format!("Failed to restore from {}: {}", backup.display(), e)))
}

pub(crate) fn rollback_failed(path: &Path, message: String) -> TxnError {
    TxnError::RollbackFailed {
        path: path.to_path_buf(),
        message,
    }
}
