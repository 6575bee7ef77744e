//! Manager configuration.

use std::path::PathBuf;

/// Settings for a [`TransactionalFileManager`](crate::TransactionalFileManager).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerConfig {
    /// Directory under which per-transaction backup folders are created.
    pub backup_root: PathBuf,
    /// Refuse to run a transaction whose paths are held by another
    /// running transaction.
    pub lock_paths: bool,
    /// Keep backups when a rollback reports errors, for manual recovery.
    pub retain_backups_on_rollback_failure: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            backup_root: std::env::temp_dir().join("filetxn-backups"),
            lock_paths: false,
            retain_backups_on_rollback_failure: false,
        }
    }
}

impl ManagerConfig {
    pub fn with_backup_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.backup_root = root.into();
        self
    }

    pub fn with_path_locks(mut self, enabled: bool) -> Self {
        self.lock_paths = enabled;
        self
    }

    pub fn with_retained_backups(mut self, enabled: bool) -> Self {
        self.retain_backups_on_rollback_failure = enabled;
        self
    }
}
