//! Transaction bookkeeping and the manager that executes transactions.

pub mod context;
pub mod locks;
pub mod manager;

pub use context::{ExecutionResult, TransactionContext, TransactionStatus};
pub use locks::PathLocks;
pub use manager::TransactionalFileManager;
