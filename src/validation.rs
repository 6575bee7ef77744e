//! Pre-mutation checks for a single operation.
//!
//! Runs against the file system as it is *right now*, i.e. after every
//! earlier operation of the same transaction has been applied.

use crate::error::{Result, TxnError};
use crate::fs::{Access, FileSystem, FsErrorKind};
use crate::ops::FileOperation;
use std::io;
use std::path::Path;

/// What validation learned about the disk state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Preflight {
    /// A forced rename/copy will replace an existing file.
    pub overwrites_target: bool,
}

/// Validates `op` against the current file system state.
///
/// Checks:
/// - Source exists and is a regular file
/// - Source is readable and writable
/// - Rename/copy target is absent unless `force` is set
/// - Rename/copy target's parent directory exists
pub async fn validate_operation<F: FileSystem + ?Sized>(fs: &F, op: &FileOperation) -> Result<Preflight> {
    op.check()?;

    let source = &op.source;
    match fs.metadata(source).await {
        Ok(metadata) if metadata.is_file() => {}
        Ok(_) => return Err(TxnError::SourceNotFound(source.clone())),
        Err(e) => return Err(stat_error(source, e)),
    }

    fs.access(source, Access::READ_WRITE)
        .await
        .map_err(|e| access_error(source, e))?;

    let Some(target) = op.target_path() else {
        return Ok(Preflight::default());
    };

    let parent = target.parent().unwrap_or(target);
    match fs.metadata(parent).await {
        Ok(metadata) if metadata.is_dir() => {}
        Ok(_) => return Err(TxnError::TargetParentMissing(parent.to_path_buf())),
        Err(e) if FsErrorKind::classify(&e) == FsErrorKind::PermissionDenied => {
            return Err(access_error(parent, e));
        }
        Err(_) => return Err(TxnError::TargetParentMissing(parent.to_path_buf())),
    }

    match fs.metadata(target).await {
        Err(e) if FsErrorKind::classify(&e) == FsErrorKind::NotFound => Ok(Preflight::default()),
        Err(e) => Err(access_error(target, e)),
        Ok(_) if !op.metadata.force => Err(TxnError::TargetExists(target.to_path_buf())),
        // Forced overwrites only ever replace regular files.
        Ok(metadata) if !metadata.is_file() => Err(TxnError::TargetExists(target.to_path_buf())),
        Ok(_) => {
            fs.access(target, Access::READ_WRITE)
                .await
                .map_err(|e| access_error(target, e))?;
            Ok(Preflight {
                overwrites_target: true,
            })
        }
    }
}

fn stat_error(path: &Path, err: io::Error) -> TxnError {
    match FsErrorKind::classify(&err) {
        FsErrorKind::PermissionDenied => access_error(path, err),
        _ => TxnError::SourceNotFound(path.to_path_buf()),
    }
}

fn access_error(path: &Path, err: io::Error) -> TxnError {
    match FsErrorKind::classify(&err) {
        FsErrorKind::NotFound => TxnError::SourceNotFound(path.to_path_buf()),
        _ => TxnError::PermissionDenied {
            path: path.to_path_buf(),
            reason: err.to_string(),
        },
    }
}
