//! Advisory path locks between concurrently running transactions.

use crate::error::{Result, TxnError};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;
use uuid::Uuid;

/// Maps normalized paths to the transaction holding them.
#[derive(Debug, Default)]
pub struct PathLocks {
    held: Mutex<HashMap<PathBuf, Uuid>>,
}

impl PathLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks every path for `holder`, or none of them.
    ///
    /// Paths already held by `holder` itself are accepted.
    pub fn acquire<'p>(&self, holder: Uuid, paths: impl IntoIterator<Item = &'p Path>) -> Result<()> {
        let wanted: Vec<PathBuf> = paths.into_iter().map(normalize).collect();
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());

        for path in &wanted {
            if let Some(&other) = held.get(path).filter(|&&h| h != holder) {
                log::warn!(
                    "Transaction {} blocked: {} is locked by {}",
                    holder,
                    path.display(),
                    other
                );
                return Err(TxnError::PathConflict {
                    path: path.clone(),
                    holder: other,
                });
            }
        }

        for path in wanted {
            held.insert(path, holder);
        }
        Ok(())
    }

    /// Drops every lock held by `holder`.
    pub fn release(&self, holder: Uuid) {
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        held.retain(|_, h| *h != holder);
    }
}

/// Lexically resolves `.` and `..` without touching the disk.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
