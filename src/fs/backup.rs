//! Scratch copies taken before destructive operations.
//!
//! Layout: `<root>/<transaction-id>/<index>-<role>.bak`. The transaction id
//! is a v4 UUID and the index is unique within a transaction, so names never
//! collide. The root and each transaction directory are restricted to the
//! owner; an existing root that other users can access is refused.

use crate::error::{Result, TxnError};
use crate::fs::provider::FileSystem;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Which side of an operation a backup preserves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupRole {
    /// The operation's source, e.g. the file a delete removes.
    Source,
    /// A pre-existing target that a forced rename/copy overwrites.
    Target,
}

impl BackupRole {
    fn as_str(self) -> &'static str {
        match self {
            BackupRole::Source => "source",
            BackupRole::Target => "target",
        }
    }
}

/// Manager-owned backup directory.
#[derive(Debug, Clone)]
pub struct BackupStore {
    root: PathBuf,
}

impl BackupStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding one transaction's backups.
    pub fn transaction_dir(&self, transaction_id: Uuid) -> PathBuf {
        self.root.join(transaction_id.to_string())
    }

    /// Deterministic backup location for one operation.
    pub fn backup_path(&self, transaction_id: Uuid, index: usize, role: BackupRole) -> PathBuf {
        self.transaction_dir(transaction_id)
            .join(format!("{}-{}.bak", index, role.as_str()))
    }

    /// Copies `original` into the store and returns the backup path.
    pub async fn create<F: FileSystem + ?Sized>(
        &self,
        fs: &F,
        transaction_id: Uuid,
        index: usize,
        role: BackupRole,
        original: &Path,
    ) -> Result<PathBuf> {
        let dir = self.transaction_dir(transaction_id);
        let backup_failed = |message: String| TxnError::BackupFailed {
            path: original.to_path_buf(),
            message,
        };

        if !fs.exists(&dir).await {
            self.prepare_root(fs).await.map_err(backup_failed)?;
            fs.create_dir_all(&dir)
                .await
                .map_err(|e| backup_failed(format!("cannot create {}: {}", dir.display(), e)))?;
            if let Err(e) = fs.set_private(&dir).await {
                log::warn!("Could not restrict backup directory {}: {}", dir.display(), e);
            }
        }

        let backup = self.backup_path(transaction_id, index, role);
        fs.copy(original, &backup)
            .await
            .map_err(|e| backup_failed(e.to_string()))?;

        log::debug!("Backed up {} → {}", original.display(), backup.display());
        Ok(backup)
    }

    /// Creates the root private, or checks that an existing one is.
    async fn prepare_root<F: FileSystem + ?Sized>(&self, fs: &F) -> std::result::Result<(), String> {
        let root = self.root.display();
        match fs.metadata(&self.root).await {
            Ok(metadata) if !metadata.is_dir() => Err(format!("backup root {} is not a directory", root)),
            Ok(metadata) if !is_private(&metadata) => Err(format!(
                "backup root {} is accessible to other users",
                root
            )),
            Ok(_) => Ok(()),
            Err(_) => {
                fs.create_dir_all(&self.root)
                    .await
                    .map_err(|e| format!("cannot create backup root {}: {}", root, e))?;
                // Fails unless we own the directory.
                fs.set_private(&self.root)
                    .await
                    .map_err(|e| format!("cannot restrict backup root {}: {}", root, e))
            }
        }
    }

    /// Deletes every backup of a transaction. Missing directories are fine.
    pub async fn release<F: FileSystem + ?Sized>(&self, fs: &F, transaction_id: Uuid) -> Result<()> {
        let dir = self.transaction_dir(transaction_id);
        if !fs.exists(&dir).await {
            return Ok(());
        }

        fs.remove_dir_all(&dir).await?;
        log::debug!("Released backups in {}", dir.display());
        Ok(())
    }
}

#[cfg(unix)]
fn is_private(metadata: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o077 == 0
}

#[cfg(not(unix))]
fn is_private(_: &std::fs::Metadata) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::TokioFileSystem;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_backup_paths_are_distinct_per_role() {
        let store = BackupStore::new("/backups");
        let id = Uuid::new_v4();

        let source = store.backup_path(id, 3, BackupRole::Source);
        let target = store.backup_path(id, 3, BackupRole::Target);

        assert_ne!(source, target);
        assert!(source.starts_with(store.transaction_dir(id)));
        assert!(source.ends_with("3-source.bak"));
    }

    #[tokio::test]
    async fn test_create_and_release() {
        let temp = TempDir::new().unwrap();
        let store = BackupStore::new(temp.path().join("backups"));
        let original = temp.path().join("data.bin");
        fs::write(&original, b"\x00\x01payload").unwrap();

        let id = Uuid::new_v4();
        let backup = store
            .create(&TokioFileSystem, id, 0, BackupRole::Source, &original)
            .await
            .unwrap();

        assert_eq!(fs::read(&backup).unwrap(), b"\x00\x01payload");

        store.release(&TokioFileSystem, id).await.unwrap();
        assert!(!store.transaction_dir(id).exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_transaction_dir_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let store = BackupStore::new(temp.path().join("backups"));
        let original = temp.path().join("data.txt");
        fs::write(&original, "content").unwrap();

        let id = Uuid::new_v4();
        store
            .create(&TokioFileSystem, id, 0, BackupRole::Source, &original)
            .await
            .unwrap();

        let mode = fs::metadata(store.transaction_dir(id)).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o700);
    }

    #[tokio::test]
    async fn test_create_missing_original_is_backup_failure() {
        let temp = TempDir::new().unwrap();
        let store = BackupStore::new(temp.path().join("backups"));

        let result = store
            .create(
                &TokioFileSystem,
                Uuid::new_v4(),
                0,
                BackupRole::Source,
                &temp.path().join("missing.txt"),
            )
            .await;

        assert!(matches!(result, Err(TxnError::BackupFailed { .. })));
    }

    #[tokio::test]
    async fn test_release_without_backups_is_ok() {
        let temp = TempDir::new().unwrap();
        let store = BackupStore::new(temp.path().join("backups"));
        store.release(&TokioFileSystem, Uuid::new_v4()).await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_created_root_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let store = BackupStore::new(temp.path().join("shared/backups"));
        let original = temp.path().join("data.txt");
        fs::write(&original, "content").unwrap();

        store
            .create(&TokioFileSystem, Uuid::new_v4(), 0, BackupRole::Source, &original)
            .await
            .unwrap();

        let mode = fs::metadata(temp.path().join("shared/backups"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o700);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_open_root_is_refused() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let root = temp.path().join("backups");
        fs::create_dir(&root).unwrap();
        fs::set_permissions(&root, fs::Permissions::from_mode(0o777)).unwrap();
        let original = temp.path().join("data.txt");
        fs::write(&original, "content").unwrap();

        let store = BackupStore::new(&root);
        let result = store
            .create(&TokioFileSystem, Uuid::new_v4(), 0, BackupRole::Source, &original)
            .await;

        assert!(matches!(
            result,
            Err(TxnError::BackupFailed { ref message, .. }) if message.contains("accessible to other users")
        ));
        assert_eq!(fs::read_dir(&root).unwrap().count(), 0);
    }
}
