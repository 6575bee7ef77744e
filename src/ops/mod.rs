//! File operations: the queued description, forward execution and inversion.

mod execute;
mod operation;
mod rollback;

pub use execute::{ApplyError, CompletedOperation, Executor};
pub use operation::{FileOperation, OperationMetadata, OperationType};
pub use rollback::{RollbackStep, invert, rollback};
