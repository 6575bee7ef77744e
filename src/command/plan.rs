//! Plan files: a JSON array of operations.
//!
//! ```json
//! [
//!   { "type": "rename", "source": "/data/a.txt", "target": "/data/b.txt" },
//!   { "type": "delete", "source": "/data/old.log", "metadata": { "createBackup": true } }
//! ]
//! ```
//!
//! Relative paths are resolved against the current directory.

use crate::error::{Result, TxnError};
use crate::ops::FileOperation;
use crate::transaction::{TransactionContext, TransactionalFileManager};
use std::path::{Path, PathBuf};

/// Reads and parses a plan file.
pub async fn load_plan(path: &Path) -> Result<Vec<FileOperation>> {
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        log::error!("Failed to read plan {}: {}", path.display(), e);
        TxnError::Io(std::io::Error::new(
            e.kind(),
            format!("Failed to read plan {}: {}", path.display(), e),
        ))
    })?;

    let operations: Vec<FileOperation> = serde_json::from_str(&content)?;
    operations.into_iter().map(resolve).collect()
}

fn resolve(mut op: FileOperation) -> Result<FileOperation> {
    op.source = absolute(&op.source)?;
    if let Some(target) = op.target.take() {
        op.target = Some(absolute(&target)?);
    }
    Ok(op)
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::path::absolute(path)?)
    }
}

/// Creates a transaction holding every operation of `plan`.
pub fn stage(manager: &TransactionalFileManager, plan: Vec<FileOperation>) -> Result<TransactionContext> {
    let mut ctx = manager.create_transaction();
    for op in plan {
        ctx = manager.add_operation(ctx.id, op)?;
    }
    Ok(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_load_plan_resolves_relative_paths() {
        let temp = TempDir::new().unwrap();
        let plan = temp.path().join("plan.json");
        fs::write(
            &plan,
            r#"[{ "type": "rename", "source": "a.txt", "target": "b.txt" }]"#,
        )
        .unwrap();

        let ops = load_plan(&plan).await.unwrap();
        assert_eq!(ops.len(), 1);
        assert!(ops[0].source.is_absolute());
        assert!(ops[0].target.as_ref().unwrap().is_absolute());
    }

    #[tokio::test]
    async fn test_load_plan_rejects_bad_json() {
        let temp = TempDir::new().unwrap();
        let plan = temp.path().join("plan.json");
        fs::write(&plan, r#"[{ "type": "explode", "source": "/a" }]"#).unwrap();

        assert!(matches!(load_plan(&plan).await, Err(TxnError::Json(_))));
    }

    #[tokio::test]
    async fn test_load_plan_missing_file() {
        let temp = TempDir::new().unwrap();
        assert!(matches!(
            load_plan(&temp.path().join("nope.json")).await,
            Err(TxnError::Io(_))
        ));
    }

    #[test]
    fn test_stage_adds_all_operations() {
        let temp = TempDir::new().unwrap();
        let manager = TransactionalFileManager::default();
        let plan = vec![
            FileOperation::delete(temp.path().join("a.txt")),
            FileOperation::delete(temp.path().join("b.txt")),
        ];

        let ctx = stage(&manager, plan).unwrap();
        assert_eq!(ctx.len(), 2);
    }
}
