use crate::command::apply::{print_plan, report_problems};
use crate::command::plan::{load_plan, stage};
use crate::error::Result;
use crate::transaction::TransactionalFileManager;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
pub struct CheckArgs {
    /// JSON plan file listing the operations
    pub plan: PathBuf,
}

/// Validates every operation of the plan against the current disk state.
pub async fn execute(args: CheckArgs) -> Result<()> {
    let manager = TransactionalFileManager::default();
    let ctx = stage(&manager, load_plan(&args.plan).await?)?;

    let problems = manager.validate_transaction(ctx.id).await?;
    print_plan(&ctx, &std::env::current_dir()?);
    report_problems(&problems)
}
