//! Fatal-abort handling.
//!
//! Runs only when a step aborts the run with a fatal error. It is not a
//! full undo: services the run started are stopped (best effort, each unit
//! independently) and the operator is told where the latest backup, the
//! log and the state file are. Backups are never restored automatically.

use std::path::PathBuf;

use crate::backup::BackupVault;
use crate::context::ExecutionContext;
use crate::shell::Shell;

/// Stops systemd units
pub trait ServiceControl {
    /// Stop `unit`, returning an error message on failure
    fn stop(&mut self, unit: &str) -> Result<(), String>;
}

/// `systemctl stop` through the shared [`Shell`]
pub struct Systemctl<'a> {
    shell: &'a Shell,
}

impl<'a> Systemctl<'a> {
    pub fn new(shell: &'a Shell) -> Self {
        Self { shell }
    }
}

impl ServiceControl for Systemctl<'_> {
    fn stop(&mut self, unit: &str) -> Result<(), String> {
        let output = self
            .shell
            .run_privileged("systemctl", &["stop", unit])
            .map_err(|e| format!("{:#}", e))?;
        output
            .ensure_success(&format!("systemctl stop {}", unit))
            .map_err(|e| e.to_string())
    }
}

/// What rollback did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RollbackReport {
    /// Units stopped successfully
    pub stopped: Vec<String>,
    /// `(unit, error)` for units that could not be stopped
    pub failed: Vec<(String, String)>,
    /// Most recent snapshot directory, if any
    pub latest_snapshot: Option<PathBuf>,
    pub log_file: PathBuf,
    pub state_file: PathBuf,
}

/// Quiesces services and reports recovery locations after a fatal abort
pub struct RollbackHandler<'a> {
    ctx: &'a ExecutionContext,
    vault: &'a BackupVault,
}

impl<'a> RollbackHandler<'a> {
    pub fn new(ctx: &'a ExecutionContext, vault: &'a BackupVault) -> Self {
        Self { ctx, vault }
    }

    /// Stop `services` in reverse start order, then report locations.
    ///
    /// Never fails: a unit that cannot be stopped is logged and the next
    /// one is still attempted.
    pub fn execute(&self, services: &[String], control: &mut dyn ServiceControl) -> RollbackReport {
        tracing::warn!("");
        tracing::warn!("Rolling back after fatal error...");

        let mut report = RollbackReport {
            log_file: self.ctx.log_file().to_path_buf(),
            state_file: self.ctx.state_file().to_path_buf(),
            ..Default::default()
        };

        for unit in services.iter().rev() {
            match control.stop(unit) {
                Ok(()) => {
                    tracing::info!("  Stopped {}", unit);
                    report.stopped.push(unit.clone());
                }
                Err(e) => {
                    tracing::warn!("  Could not stop {}: {}", unit, e);
                    report.failed.push((unit.clone(), e));
                }
            }
        }

        report.latest_snapshot = self.vault.latest_snapshot();
        match &report.latest_snapshot {
            Some(dir) => tracing::warn!(
                "Latest backup: {} (restore with `archpost --restore`)",
                dir.display()
            ),
            None => tracing::info!("No backups were taken"),
        }
        tracing::warn!("Log file:   {}", report.log_file.display());
        tracing::warn!("State file: {}", report.state_file.display());
        tracing::warn!("Completed steps are kept; fix the problem and run again to resume.");

        report
    }
}
