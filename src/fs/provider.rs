//! Asynchronous file system access used by the transaction core.
//!
//! Everything that touches the disk goes through [`FileSystem`], so tests can
//! swap in a provider that injects failures.

use async_trait::async_trait;
use std::fmt;
use std::fs::Metadata;
use std::io;
use std::path::Path;
use tokio::fs;

/// Coarse categories of file system failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsErrorKind {
    NotFound,
    PermissionDenied,
    NoSpace,
    CrossDevice,
    AlreadyExists,
    Other,
}

impl FsErrorKind {
    /// Maps an I/O error onto a category.
    pub fn classify(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound,
            io::ErrorKind::PermissionDenied => Self::PermissionDenied,
            io::ErrorKind::StorageFull => Self::NoSpace,
            io::ErrorKind::CrossesDevices => Self::CrossDevice,
            io::ErrorKind::AlreadyExists => Self::AlreadyExists,
            _ => match err.raw_os_error() {
                #[cfg(unix)]
                Some(18) => Self::CrossDevice,
                #[cfg(unix)]
                Some(28) => Self::NoSpace,
                #[cfg(windows)]
                Some(17) => Self::CrossDevice,
                #[cfg(windows)]
                Some(112) => Self::NoSpace,
                _ => Self::Other,
            },
        }
    }
}

impl fmt::Display for FsErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotFound => "not-found",
            Self::PermissionDenied => "permission-denied",
            Self::NoSpace => "no-space",
            Self::CrossDevice => "cross-device",
            Self::AlreadyExists => "target-exists",
            Self::Other => "other",
        };
        f.write_str(name)
    }
}

/// Access rights to check with [`FileSystem::access`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Access {
    pub read: bool,
    pub write: bool,
}

impl Access {
    pub const READ_WRITE: Access = Access {
        read: true,
        write: true,
    };
}

/// File system provider.
///
/// Implementations must surface errors with their original [`io::ErrorKind`]
/// so [`FsErrorKind::classify`] can tell them apart.
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Metadata following symlinks.
    async fn metadata(&self, path: &Path) -> io::Result<Metadata>;

    /// Fails with `PermissionDenied` when the requested access is missing.
    async fn access(&self, path: &Path, access: Access) -> io::Result<()>;

    async fn exists(&self, path: &Path) -> bool {
        self.metadata(path).await.is_ok()
    }

    /// Atomic rename; replaces an existing file at `to`.
    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Byte-for-byte copy, returns bytes written.
    async fn copy(&self, from: &Path, to: &Path) -> io::Result<u64>;

    async fn remove_file(&self, path: &Path) -> io::Result<()>;

    async fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    async fn remove_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Restricts a directory to its owner. No-op where unsupported.
    async fn set_private(&self, path: &Path) -> io::Result<()>;
}

/// [`FileSystem`] backed by `tokio::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioFileSystem;

#[async_trait]
impl FileSystem for TokioFileSystem {
    async fn metadata(&self, path: &Path) -> io::Result<Metadata> {
        fs::metadata(path).await
    }

    async fn access(&self, path: &Path, access: Access) -> io::Result<()> {
        if access.read {
            fs::File::open(path).await?;
        }

        if access.write {
            let metadata = fs::metadata(path).await?;
            if metadata.permissions().readonly() {
                return Err(io::Error::new(
                    io::ErrorKind::PermissionDenied,
                    format!("File is read-only: {}", path.display()),
                ));
            }
        }

        Ok(())
    }

    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to).await
    }

    async fn copy(&self, from: &Path, to: &Path) -> io::Result<u64> {
        fs::copy(from, to).await
    }

    async fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path).await
    }

    async fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path).await
    }

    async fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::remove_dir_all(path).await
    }

    async fn set_private(&self, path: &Path) -> io::Result<()> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, std::fs::Permissions::from_mode(0o700)).await
        }

        #[cfg(not(unix))]
        {
            let _ = path;
            Ok(())
        }
    }
}

/// Moves `from` to `to`, falling back to copy + delete across devices.
pub async fn move_file<F: FileSystem + ?Sized>(fs: &F, from: &Path, to: &Path) -> io::Result<()> {
    match fs.rename(from, to).await {
        Ok(()) => Ok(()),
        Err(e) if FsErrorKind::classify(&e) == FsErrorKind::CrossDevice => {
            log::debug!(
                "Cross-device move {} → {}, copying instead",
                from.display(),
                to.display()
            );
            fs.copy(from, to).await?;
            fs.remove_file(from).await
        }
        Err(e) => Err(e),
    }
}
