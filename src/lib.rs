#![doc = include_str!("../README.md")]

pub mod audit;
pub mod cli;
pub mod command;
pub mod config;
pub mod error;
pub mod fs;
pub mod ops;
pub mod transaction;
pub mod validation;

pub use config::ManagerConfig;
pub use error::*;
pub use ops::{FileOperation, OperationMetadata, OperationType};
pub use transaction::{ExecutionResult, TransactionContext, TransactionStatus, TransactionalFileManager};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub async fn run() -> Result<()> {
    use clap::Parser;
    use command::Command;

    let cli = cli::FiletxnCli::parse();
    env_logger::Builder::new()
        .filter_level(cli.log_level())
        .parse_default_env()
        .init();

    match cli.command {
        Command::Apply(args) => command::apply::execute(args).await,
        Command::Check(args) => command::check::execute(args).await,
    }
}
