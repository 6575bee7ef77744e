pub mod apply;
pub mod check;
pub mod plan;

use clap::Subcommand;

#[derive(Subcommand)]
pub enum Command {
    /// Run every operation in a plan file as one transaction.
    Apply(apply::ApplyArgs),
    /// Validate a plan file against the current file system without changing anything.
    Check(check::CheckArgs),
}
