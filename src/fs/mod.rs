//! File system access and backup storage.
//!
//! The transaction core never calls `tokio::fs` directly; it goes through
//! the [`FileSystem`] provider so failures can be injected in tests.

pub mod backup;
pub mod provider;

pub use backup::{BackupRole, BackupStore};
pub use provider::{Access, FileSystem, FsErrorKind, TokioFileSystem, move_file};
