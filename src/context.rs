//! Run configuration.
//!
//! [`ExecutionContext`] is built once from the command line and the settings
//! file, then only read. Components receive it by reference instead of
//! consulting global flags.

use std::path::{Path, PathBuf};

use crate::cli::Cli;
use crate::error::{ArchPostError, Result};
use crate::profiles::Profile;
use crate::settings::Settings;

/// State file name inside the state directory
pub const STATE_FILE_NAME: &str = "completed_steps";

/// Locations of the durable artifacts of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPaths {
    /// Append-only list of completed step ids
    pub state_file: PathBuf,
    /// Parent of the timestamped snapshot directories
    pub backup_dir: PathBuf,
    /// Log file of this run
    pub log_file: PathBuf,
}

impl RunPaths {
    /// Conventional layout under a single base directory.
    pub fn under(base: &Path, run_id: &str) -> Self {
        Self {
            state_file: base.join(STATE_FILE_NAME),
            backup_dir: base.join("backups"),
            log_file: log_file_in(&base.join("logs"), run_id),
        }
    }
}

fn log_file_in(dir: &Path, run_id: &str) -> PathBuf {
    dir.join(format!("archpost-{}.log", run_id))
}

/// Sortable local timestamp identifying a run (`YYYYmmdd_HHMMSS`).
pub fn new_run_id() -> String {
    chrono::Local::now().format("%Y%m%d_%H%M%S").to_string()
}

/// Immutable configuration of one invocation.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    profile: Profile,
    dry_run: bool,
    force: bool,
    paths: RunPaths,
    settings: Settings,
    run_id: String,
}

impl ExecutionContext {
    /// Create a context for `profile` with default settings.
    ///
    /// Dry-run and force default to off; use the `with_*` builders before
    /// handing the context to any component.
    pub fn new(profile: Profile, paths: RunPaths) -> Self {
        Self {
            profile,
            dry_run: false,
            force: false,
            paths,
            settings: Settings::default(),
            run_id: new_run_id(),
        }
    }

    /// Enable or disable dry-run mode
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Enable or disable force mode
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Attach user settings
    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Override the run id (log file name and snapshot directory name)
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    /// Build the context from parsed command-line arguments.
    ///
    /// # Errors
    ///
    /// Configuration errors only: unknown profile, unreadable or invalid
    /// settings file, or no usable state directory.
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let profile = Profile::from_name(&cli.profile)?;
        let settings = Settings::resolve(cli.config.as_deref())?;
        let run_id = new_run_id();

        let base = match settings.state_dir.clone() {
            Some(dir) => dir,
            None => default_state_dir().ok_or_else(|| {
                ArchPostError::config(
                    "Cannot determine a state directory; set state_dir in the settings file",
                )
            })?,
        };
        let defaults = RunPaths::under(&base, &run_id);

        let log_dir = cli
            .log_dir
            .clone()
            .or_else(|| settings.log_dir.clone());
        let paths = RunPaths {
            state_file: cli.state_file.clone().unwrap_or(defaults.state_file),
            backup_dir: cli
                .backup_dir
                .clone()
                .or_else(|| settings.backup_dir.clone())
                .unwrap_or(defaults.backup_dir),
            log_file: match log_dir {
                Some(dir) => log_file_in(&dir, &run_id),
                None => defaults.log_file,
            },
        };

        Ok(Self {
            profile,
            dry_run: cli.dry_run,
            force: cli.force,
            paths,
            settings,
            run_id,
        })
    }

    /// Active profile
    #[inline]
    pub fn profile(&self) -> Profile {
        self.profile
    }

    /// True when no durable change may be made
    #[inline]
    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    /// True when completed steps are re-run
    #[inline]
    pub fn force(&self) -> bool {
        self.force
    }

    /// Completed-steps state file
    pub fn state_file(&self) -> &Path {
        &self.paths.state_file
    }

    /// Backup snapshot root
    pub fn backup_dir(&self) -> &Path {
        &self.paths.backup_dir
    }

    /// Log file of this run
    pub fn log_file(&self) -> &Path {
        &self.paths.log_file
    }

    /// User settings
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Run id shared by the log file and the snapshot directory
    pub fn run_id(&self) -> &str {
        &self.run_id
    }
}

/// `$XDG_STATE_HOME/archpost`, falling back to `~/.local/state/archpost`.
fn default_state_dir() -> Option<PathBuf> {
    dirs::state_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".local").join("state")))
        .map(|dir| dir.join("archpost"))
}
