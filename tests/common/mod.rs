//! Shared helpers for filetxn integration tests.
//!
//! `FaultyFs` wraps the real file system, records every mutating call and
//! fails or delays the ones it is told to.

use assert_cmd::cargo::cargo_bin_cmd;
use async_trait::async_trait;
use filetxn::fs::{Access, FileSystem, TokioFileSystem};
use filetxn::{ManagerConfig, TransactionalFileManager};
use std::fs::Metadata;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// A mutating call observed by [`FaultyFs`].
#[allow(unused)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsCall {
    Rename(PathBuf, PathBuf),
    Copy(PathBuf, PathBuf),
    Remove(PathBuf),
}

#[derive(Debug, Clone)]
enum Fault {
    RenameFrom(PathBuf, io::ErrorKind, &'static str),
    CopyFrom(PathBuf, &'static str),
    Remove(PathBuf, &'static str),
}

#[derive(Default)]
pub struct FaultyFs {
    inner: TokioFileSystem,
    faults: Vec<Fault>,
    slow_renames: Vec<(PathBuf, Duration)>,
    cancel_after_rename: Option<(PathBuf, CancellationToken)>,
    truncating_copies: Mutex<Vec<(PathBuf, &'static str)>>,
    calls: Mutex<Vec<FsCall>>,
}

#[allow(unused)]
impl FaultyFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails `rename(from, _)` with an `Other` error carrying `message`.
    pub fn fail_rename_from(self, from: impl Into<PathBuf>, message: &'static str) -> Self {
        self.fail_rename_with(from, io::ErrorKind::Other, message)
    }

    pub fn fail_rename_with(
        mut self,
        from: impl Into<PathBuf>,
        kind: io::ErrorKind,
        message: &'static str,
    ) -> Self {
        self.faults.push(Fault::RenameFrom(from.into(), kind, message));
        self
    }

    pub fn fail_copy_from(mut self, from: impl Into<PathBuf>, message: &'static str) -> Self {
        self.faults.push(Fault::CopyFrom(from.into(), message));
        self
    }

    pub fn fail_remove(mut self, path: impl Into<PathBuf>, message: &'static str) -> Self {
        self.faults.push(Fault::Remove(path.into(), message));
        self
    }

    /// The next `copy(_, to)` leaves an empty file at `to` and then fails
    /// with `message`. Fires once.
    pub fn truncate_copy_to(mut self, to: impl Into<PathBuf>, message: &'static str) -> Self {
        self.truncating_copies.get_mut().unwrap().push((to.into(), message));
        self
    }

    pub fn slow_rename_from(mut self, from: impl Into<PathBuf>, delay: Duration) -> Self {
        self.slow_renames.push((from.into(), delay));
        self
    }

    /// Cancels `token` right after `rename(from, _)` succeeds.
    pub fn cancel_after_rename_from(mut self, from: impl Into<PathBuf>, token: CancellationToken) -> Self {
        self.cancel_after_rename = Some((from.into(), token));
        self
    }

    pub fn calls(&self) -> Vec<FsCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: FsCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl FileSystem for FaultyFs {
    async fn metadata(&self, path: &Path) -> io::Result<Metadata> {
        self.inner.metadata(path).await
    }

    async fn access(&self, path: &Path, access: Access) -> io::Result<()> {
        self.inner.access(path, access).await
    }

    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        self.record(FsCall::Rename(from.to_path_buf(), to.to_path_buf()));

        for (path, delay) in &self.slow_renames {
            if path == from {
                tokio::time::sleep(*delay).await;
            }
        }

        for fault in &self.faults {
            if let Fault::RenameFrom(path, kind, message) = fault {
                if path == from {
                    return Err(io::Error::new(*kind, *message));
                }
            }
        }

        self.inner.rename(from, to).await?;

        if let Some((path, token)) = &self.cancel_after_rename {
            if path == from {
                token.cancel();
            }
        }
        Ok(())
    }

    async fn copy(&self, from: &Path, to: &Path) -> io::Result<u64> {
        self.record(FsCall::Copy(from.to_path_buf(), to.to_path_buf()));

        let truncated = {
            let mut pending = self.truncating_copies.lock().unwrap();
            pending
                .iter()
                .position(|(path, _)| path == to)
                .map(|i| pending.remove(i))
        };
        if let Some((_, message)) = truncated {
            std::fs::write(to, b"")?;
            return Err(io::Error::other(message));
        }
        for fault in &self.faults {
            if let Fault::CopyFrom(path, message) = fault {
                if path == from {
                    return Err(io::Error::other(*message));
                }
            }
        }
        self.inner.copy(from, to).await
    }

    async fn remove_file(&self, path: &Path) -> io::Result<()> {
        self.record(FsCall::Remove(path.to_path_buf()));
        for fault in &self.faults {
            if let Fault::Remove(p, message) = fault {
                if p == path {
                    return Err(io::Error::other(*message));
                }
            }
        }
        self.inner.remove_file(path).await
    }

    async fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        self.inner.create_dir_all(path).await
    }

    async fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        self.inner.remove_dir_all(path).await
    }

    async fn set_private(&self, path: &Path) -> io::Result<()> {
        self.inner.set_private(path).await
    }
}

/// Scratch directory with a `work/` tree and a `backups/` root.
pub struct Sandbox {
    pub temp: TempDir,
}

#[allow(unused)]
impl Sandbox {
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir(temp.path().join("work")).unwrap();
        Self { temp }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.temp.path().join("work").join(name)
    }

    /// Writes `content` to `work/<name>` and returns the path.
    pub fn file(&self, name: &str, content: &str) -> PathBuf {
        let path = self.path(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, content).unwrap();
        path
    }

    pub fn read(&self, name: &str) -> String {
        std::fs::read_to_string(self.path(name)).unwrap()
    }

    pub fn exists(&self, name: &str) -> bool {
        self.path(name).exists()
    }

    pub fn backup_root(&self) -> PathBuf {
        self.temp.path().join("backups")
    }

    pub fn config(&self) -> ManagerConfig {
        ManagerConfig::default().with_backup_root(self.backup_root())
    }

    pub fn manager(&self) -> TransactionalFileManager {
        TransactionalFileManager::new(self.config())
    }

    pub fn manager_with(&self, fs: Arc<FaultyFs>) -> TransactionalFileManager {
        TransactionalFileManager::with_filesystem(fs, self.config())
    }

    /// Number of transaction folders left under the backup root.
    pub fn backup_dirs(&self) -> usize {
        std::fs::read_dir(self.backup_root())
            .map(|entries| entries.count())
            .unwrap_or(0)
    }
}

/// Runs the `filetxn` binary in `dir`.
#[allow(unused)]
pub fn run_filetxn(dir: &Path, args: &[&str]) -> assert_cmd::assert::Assert {
    let mut cmd = cargo_bin_cmd!("filetxn");
    cmd.args(args).current_dir(dir);
    cmd.assert()
}
