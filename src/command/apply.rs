use crate::audit::JsonlAuditStore;
use crate::command::plan::{load_plan, stage};
use crate::config::ManagerConfig;
use crate::error::{Result, TxnError};
use crate::transaction::{ExecutionResult, TransactionContext, TransactionalFileManager};
use clap::Parser;
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser, Debug, Clone)]
pub struct ApplyArgs {
    /// JSON plan file listing the operations
    pub plan: PathBuf,

    /// Validate and show the operations without applying them
    #[arg(long, short = 'n')]
    pub dry_run: bool,

    /// Directory for pre-mutation backups (defaults to the system temp dir)
    #[arg(long, value_name = "DIR")]
    pub backup_dir: Option<PathBuf>,

    /// Append lifecycle events as JSON lines to this file
    #[arg(long, value_name = "FILE")]
    pub journal: Option<PathBuf>,

    /// Refuse to touch paths held by another running transaction
    #[arg(long)]
    pub lock_paths: bool,

    /// Keep backups when a rollback fails, for manual recovery
    #[arg(long)]
    pub keep_failed_backups: bool,
}

impl ApplyArgs {
    pub fn config(&self) -> ManagerConfig {
        let mut config = ManagerConfig::default()
            .with_path_locks(self.lock_paths)
            .with_retained_backups(self.keep_failed_backups);
        if let Some(dir) = &self.backup_dir {
            config = config.with_backup_root(dir);
        }
        config
    }
}

pub async fn execute(args: ApplyArgs) -> Result<()> {
    let mut manager = TransactionalFileManager::new(args.config());
    if let Some(journal) = &args.journal {
        manager = manager.with_audit_store(Arc::new(JsonlAuditStore::new(journal)));
    }

    let plan = load_plan(&args.plan).await?;
    let ctx = stage(&manager, plan)?;
    let cwd = std::env::current_dir()?;

    if args.dry_run {
        let problems = manager.validate_transaction(ctx.id).await?;
        print_plan(&ctx, &cwd);
        return report_problems(&problems);
    }

    let result = manager.execute_transaction(ctx.id).await?;
    print_summary(&ctx, &result, &cwd);

    let kept = manager.backups().transaction_dir(result.transaction_id);
    if !result.success && tokio::fs::try_exists(&kept).await.unwrap_or(false) {
        println!("{} Backups kept in {}", "!".yellow().bold(), kept.display());
    }

    if result.success {
        Ok(())
    } else {
        Err(TxnError::Other(anyhow::anyhow!(
            "Transaction {} rolled back after {} of {} operations",
            result.transaction_id,
            result.completed_operations,
            ctx.len()
        )))
    }
}

pub(crate) fn report_problems(problems: &[String]) -> Result<()> {
    if problems.is_empty() {
        println!("\n{} All operations pass validation", "✓".green().bold());
        return Ok(());
    }

    println!("\n{}", "Validation problems:".red().bold());
    for problem in problems {
        println!("   {} {}", "✗".red(), problem);
    }
    Err(TxnError::Other(anyhow::anyhow!(
        "{} operation(s) would fail",
        problems.len()
    )))
}

/// Renders `path` relative to `base` with forward slashes.
pub(crate) fn display_path(path: &Path, base: &Path) -> String {
    let relative = pathdiff::diff_paths(path, base).unwrap_or_else(|| path.to_path_buf());
    relative.to_string_lossy().replace('\\', "/")
}

fn describe(ctx: &TransactionContext, index: usize, base: &Path) -> String {
    let op = &ctx.operations[index];
    match op.target_path() {
        Some(target) => format!(
            "{:<6} {} → {}",
            op.op_type,
            display_path(&op.source, base),
            display_path(target, base)
        ),
        None => format!("{:<6} {}", op.op_type, display_path(&op.source, base)),
    }
}

pub(crate) fn print_plan(ctx: &TransactionContext, base: &Path) {
    if ctx.is_empty() {
        println!("\n{}", "No operations in plan".yellow());
        return;
    }

    println!("\n{}", "DRY RUN - No changes will be made".yellow().bold());
    for index in 0..ctx.len() {
        println!("   • {}", describe(ctx, index, base).dimmed());
    }
}

/// Prints which operations were applied, reverted or never reached.
pub fn print_summary(ctx: &TransactionContext, result: &ExecutionResult, base: &Path) {
    if ctx.is_empty() {
        println!("\n{}", "No changes needed".yellow());
        return;
    }

    if result.success {
        println!("\n{}", "Changes applied:".green().bold());
    } else {
        println!("\n{}", "Transaction rolled back:".red().bold());
    }

    for index in 0..ctx.len() {
        let line = describe(ctx, index, base);
        if result.success {
            println!("   {} {}", "✓".green(), line);
        } else if index < result.completed_operations {
            println!("   {} {}", "↺".yellow(), line.dimmed());
        } else if index == result.completed_operations {
            println!("   {} {}", "✗".red(), line);
        } else {
            println!("   {} {}", "·".dimmed(), line.dimmed());
        }
    }

    if !result.errors.is_empty() {
        println!("\n{}", "Errors:".red().bold());
        for error in &result.errors {
            println!("   {}", error);
        }
    }

    println!();
    if result.success {
        println!(
            "{} Successfully completed {} operations",
            "✓".green().bold(),
            result.completed_operations
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::FileOperation;
    use crate::transaction::TransactionStatus;

    #[test]
    fn test_display_path_is_relative() {
        let base = Path::new("/work");
        assert_eq!(display_path(Path::new("/work/a/b.txt"), base), "a/b.txt");
    }

    #[test]
    fn test_config_from_args() {
        let args = ApplyArgs {
            plan: PathBuf::from("plan.json"),
            dry_run: false,
            backup_dir: Some(PathBuf::from("/scratch")),
            journal: None,
            lock_paths: true,
            keep_failed_backups: false,
        };

        let config = args.config();
        assert_eq!(config.backup_root, PathBuf::from("/scratch"));
        assert!(config.lock_paths);
    }

    #[test]
    fn test_print_summary_does_not_panic() {
        let manager = TransactionalFileManager::default();
        let ctx = manager.create_transaction();
        let ctx = manager
            .add_operation(ctx.id, FileOperation::rename(std::env::temp_dir().join("a"), std::env::temp_dir().join("b")))
            .unwrap();
        let result = ExecutionResult {
            transaction_id: ctx.id,
            success: false,
            completed_operations: 0,
            errors: vec!["disk full".to_string()],
            status: TransactionStatus::RolledBack,
        };

        print_summary(&ctx, &result, &std::env::temp_dir());
        print_plan(&ctx, &std::env::temp_dir());
    }

    #[test]
    fn test_report_problems() {
        assert!(report_problems(&[]).is_ok());
        assert!(report_problems(&["operation 0: boom".to_string()]).is_err());
    }
}
