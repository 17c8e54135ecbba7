use clap::Parser;
use std::path::PathBuf;

/// archpost - Arch Linux post-install configurator
///
/// Runs an ordered catalogue of configuration steps. Completed steps are
/// recorded so an interrupted or failed run can be resumed.
#[derive(Parser, Debug)]
#[command(name = "archpost")]
#[command(about = "Resumable post-install configuration for Arch Linux")]
#[command(version)]
pub struct Cli {
    /// Step profile to run (full, minimal, desktop, server, dev).
    #[arg(short, long, default_value = "full")]
    pub profile: String,

    /// Dry-run mode: show what would be executed without making changes.
    ///
    /// Prompts are auto-approved, commands that modify the system are only
    /// logged, and the state file is left untouched.
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Re-run steps that were already completed.
    #[arg(short, long)]
    pub force: bool,

    /// Settings file (JSON). Defaults to ~/.config/archpost/config.json.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Override the completed-steps state file.
    #[arg(long)]
    pub state_file: Option<PathBuf>,

    /// Override the backup snapshot directory.
    #[arg(long)]
    pub backup_dir: Option<PathBuf>,

    /// Override the directory holding per-run log files.
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// List the steps of the selected profile and exit.
    #[arg(short, long, conflicts_with_all = ["restore", "reset_state"])]
    pub list: bool,

    /// Restore files from the most recent backup snapshot and clear the state.
    #[arg(long, conflicts_with = "reset_state")]
    pub restore: bool,

    /// Forget all completed steps and exit.
    #[arg(long)]
    pub reset_state: bool,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
