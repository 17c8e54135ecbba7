//! Step descriptors and the action interface.
//!
//! A step is an `{id, display name, action}` record. The runner only looks at
//! what an action returns:
//!
//! - `Ok(StepStatus::Done)`: the step did its work
//! - `Ok(StepStatus::Issues(msg))`: the step failed but handled it and left the
//!   system in a known state; the run continues and the step is retried next time
//! - `Err(_)`: unrecoverable; the run aborts and rollback starts

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use crate::backup::BackupVault;
use crate::confirm::ConfirmationGate;
use crate::context::ExecutionContext;
use crate::error::{ArchPostError, Result};
use crate::settings::Settings;
use crate::shell::Shell;

/// Non-fatal outcome of an action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepStatus {
    /// Step finished successfully
    Done,
    /// Step reported a handled failure
    Issues(String),
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Done => write!(f, "done"),
            Self::Issues(msg) => write!(f, "completed with issues: {}", msg),
        }
    }
}

/// Callable performing a step's side effects.
pub type Action = Box<dyn Fn(&mut StepContext<'_>) -> anyhow::Result<StepStatus>>;

/// Everything an action may use while it runs.
pub struct StepContext<'a> {
    ctx: &'a ExecutionContext,
    gate: &'a mut ConfirmationGate,
    vault: &'a BackupVault,
    shell: &'a Shell,
}

impl<'a> StepContext<'a> {
    /// Bundle the collaborators handed to an action
    pub fn new(
        ctx: &'a ExecutionContext,
        gate: &'a mut ConfirmationGate,
        vault: &'a BackupVault,
        shell: &'a Shell,
    ) -> Self {
        Self {
            ctx,
            gate,
            vault,
            shell,
        }
    }

    /// Run configuration
    pub fn context(&self) -> &ExecutionContext {
        self.ctx
    }

    /// User settings
    pub fn settings(&self) -> &Settings {
        self.ctx.settings()
    }

    /// True under dry-run
    pub fn dry_run(&self) -> bool {
        self.ctx.dry_run()
    }

    /// Command runner
    pub fn shell(&self) -> &Shell {
        self.shell
    }

    /// Ask an opt-in sub-question through the confirmation gate
    pub fn ask(&mut self, prompt: &str, default_yes: bool) -> anyhow::Result<bool> {
        Ok(self.gate.ask(prompt, default_yes)?)
    }

    /// Snapshot `path` before modifying it
    pub fn backup(&self, path: &Path) -> anyhow::Result<()> {
        self.vault.snapshot(path)?;
        Ok(())
    }
}

/// One catalogue entry
pub struct StepDescriptor {
    id: String,
    display_name: String,
    services: Vec<String>,
    action: Action,
}

impl StepDescriptor {
    /// Create a step
    pub fn new<F>(id: impl Into<String>, display_name: impl Into<String>, action: F) -> Self
    where
        F: Fn(&mut StepContext<'_>) -> anyhow::Result<StepStatus> + 'static,
    {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            services: Vec::new(),
            action: Box::new(action),
        }
    }

    /// Declare systemd units this step may start; rollback stops them.
    pub fn starts_services(mut self, units: &[&str]) -> Self {
        self.services = units.iter().map(|u| (*u).to_string()).collect();
        self
    }

    /// Stable identifier recorded in the state file
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Human-readable name
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Units this step may start
    pub fn services(&self) -> &[String] {
        &self.services
    }

    /// Invoke the action
    pub fn run(&self, cx: &mut StepContext<'_>) -> anyhow::Result<StepStatus> {
        (self.action)(cx)
    }
}

impl fmt::Debug for StepDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepDescriptor")
            .field("id", &self.id)
            .field("display_name", &self.display_name)
            .field("services", &self.services)
            .finish_non_exhaustive()
    }
}

/// Check catalogue ids: non-empty, single token, unique.
pub fn validate_catalogue(steps: &[StepDescriptor]) -> Result<()> {
    let mut seen = HashSet::with_capacity(steps.len());
    for step in steps {
        if step.id.is_empty() || step.id.contains(char::is_whitespace) {
            return Err(ArchPostError::config(format!(
                "Invalid step id {:?}",
                step.id
            )));
        }
        if !seen.insert(step.id.as_str()) {
            return Err(ArchPostError::config(format!(
                "Duplicate step id '{}' in catalogue",
                step.id
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(id: &str) -> StepDescriptor {
        StepDescriptor::new(id, id, |_| Ok(StepStatus::Done))
    }

    #[test]
    fn test_duplicate_ids_are_rejected() {
        let steps = vec![noop("fonts"), noop("fonts")];
        let err = validate_catalogue(&steps).unwrap_err();
        assert!(err.to_string().contains("Duplicate"));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_whitespace_ids_are_rejected() {
        assert!(validate_catalogue(&[noop("two words")]).is_err());
        assert!(validate_catalogue(&[noop("")]).is_err());
        assert!(validate_catalogue(&[noop("a"), noop("b")]).is_ok());
    }

    #[test]
    fn test_services_builder() {
        let step = noop("bluetooth").starts_services(&["bluetooth.service"]);
        assert_eq!(step.services(), &["bluetooth.service".to_string()]);
    }

    #[test]
    fn test_status_display() {
        assert_eq!(StepStatus::Done.to_string(), "done");
        assert_eq!(
            StepStatus::Issues("no network".into()).to_string(),
            "completed with issues: no network"
        );
    }
}
