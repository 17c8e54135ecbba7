//! Step runner
//!
//! Walks the catalogue in order and drives each step through its states:
//!
//! ```text
//! step
//!   ├─ not in profile ───────────────→ SkippedByProfile    (not counted)
//!   ├─ recorded and not --force ─────→ SkippedAlreadyDone  (counted)
//!   ├─ operator declines ────────────→ SkippedByUser       (counted, not recorded)
//!   ├─ action Ok(Done) ──────────────→ RanOk               (counted, recorded unless dry-run)
//!   ├─ action Ok(Issues) ────────────→ RanWithIssues       (counted, not recorded)
//!   └─ action Err ───────────────────→ run Aborted
//! ```
//!
//! The progress denominator is fixed before the first step so skipped steps
//! never make the fraction jump. Nothing is ever removed from the state file
//! here, not even under `--force`.

use std::fmt;

use strum::Display;

use crate::backup::BackupVault;
use crate::confirm::ConfirmationGate;
use crate::context::ExecutionContext;
use crate::error::{ArchPostError, Result};
use crate::profiles::ProfileFilter;
use crate::shell::Shell;
use crate::state_store::StateStore;
use crate::step::{StepContext, StepDescriptor, StepStatus, validate_catalogue};

/// Per-step state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum StepState {
    #[strum(serialize = "not in profile")]
    SkippedByProfile,
    #[strum(serialize = "already completed")]
    SkippedAlreadyDone,
    #[strum(serialize = "declined by user")]
    SkippedByUser,
    #[strum(serialize = "ok")]
    RanOk,
    #[strum(serialize = "execution issue")]
    RanWithIssues,
}

impl StepState {
    /// True if the state advances the progress counter
    pub const fn counts_toward_progress(self) -> bool {
        matches!(
            self,
            Self::SkippedAlreadyDone | Self::SkippedByUser | Self::RanOk | Self::RanWithIssues
        )
    }
}

/// Final state of one step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRecord {
    pub id: String,
    pub state: StepState,
}

/// Counters and per-step outcomes of a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Steps of the profile that were handled (ran or skipped deliberately)
    pub completed: usize,
    /// Steps in the profile, fixed before the first step
    pub total: usize,
    /// Outcome of every catalogue step reached, in order
    pub records: Vec<StepRecord>,
    /// `(step id, message)` of steps that reported issues
    pub issues: Vec<(String, String)>,
    /// Units of steps that were started, in first-start order
    pub services: Vec<String>,
}

impl RunStats {
    fn new(total: usize) -> Self {
        Self {
            total,
            ..Default::default()
        }
    }

    fn record(&mut self, id: &str, state: StepState) {
        if state.counts_toward_progress() {
            self.completed += 1;
        }
        self.records.push(StepRecord {
            id: id.to_string(),
            state,
        });
    }

    fn touch_services(&mut self, units: &[String]) {
        for unit in units {
            if !self.services.contains(unit) {
                self.services.push(unit.clone());
            }
        }
    }

    /// Number of steps that ended in `state`
    pub fn count(&self, state: StepState) -> usize {
        self.records.iter().filter(|r| r.state == state).count()
    }

    /// Final state of `id`, if the run reached it
    pub fn state_of(&self, id: &str) -> Option<StepState> {
        self.records.iter().find(|r| r.id == id).map(|r| r.state)
    }

    /// `completed/total`
    pub fn progress(&self) -> String {
        format!("{}/{}", self.completed, self.total)
    }

    /// Log the end-of-run summary
    pub fn log_summary(&self) {
        tracing::info!("");
        tracing::info!("Progress: {}", self.progress());
        tracing::info!(
            "  ran ok: {}, with issues: {}, already completed: {}, declined: {}",
            self.count(StepState::RanOk),
            self.count(StepState::RanWithIssues),
            self.count(StepState::SkippedAlreadyDone),
            self.count(StepState::SkippedByUser),
        );
        for (id, msg) in &self.issues {
            tracing::warn!("  ⚠ {}: {}", id, msg);
        }
    }
}

/// Why a run stopped before the end of the catalogue
#[derive(Debug)]
pub enum AbortCause {
    /// A step (or the bookkeeping around it) failed unrecoverably
    Fatal(anyhow::Error),
    /// The operator cancelled at a prompt
    Interrupted,
}

/// An aborted run
#[derive(Debug)]
pub struct RunAborted {
    /// Step that was running
    pub step_id: String,
    /// Its display name
    pub display_name: String,
    pub cause: AbortCause,
    /// Counters up to the abort
    pub stats: RunStats,
}

impl RunAborted {
    /// True for an operator interrupt (no rollback)
    pub fn is_interrupted(&self) -> bool {
        matches!(self.cause, AbortCause::Interrupted)
    }

    /// Process exit code
    pub fn exit_code(&self) -> i32 {
        if self.is_interrupted() { 130 } else { 1 }
    }
}

impl fmt::Display for RunAborted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.cause {
            AbortCause::Fatal(e) => write!(
                f,
                "fatal error in step '{}' ({}): {:#}",
                self.display_name, self.step_id, e
            ),
            AbortCause::Interrupted => {
                write!(f, "interrupted during step '{}'", self.display_name)
            }
        }
    }
}

/// True if the error chain carries an operator interrupt
fn is_interrupt(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<ArchPostError>(),
            Some(ArchPostError::Interrupted)
        )
    })
}

/// Executes the profile's steps in catalogue order.
pub struct StepRunner<'a> {
    ctx: &'a ExecutionContext,
    catalogue: &'a [StepDescriptor],
    filter: ProfileFilter,
}

impl<'a> StepRunner<'a> {
    /// Validate the catalogue and the profile tables for `ctx`'s profile.
    pub fn new(ctx: &'a ExecutionContext, catalogue: &'a [StepDescriptor]) -> Result<Self> {
        validate_catalogue(catalogue)?;
        let filter = ProfileFilter::new(ctx.profile(), catalogue)?;
        Ok(Self {
            ctx,
            catalogue,
            filter,
        })
    }

    /// Runner with an explicit filter.
    pub fn with_filter(
        ctx: &'a ExecutionContext,
        catalogue: &'a [StepDescriptor],
        filter: ProfileFilter,
    ) -> Result<Self> {
        validate_catalogue(catalogue)?;
        Ok(Self {
            ctx,
            catalogue,
            filter,
        })
    }

    /// Active profile filter
    pub fn filter(&self) -> &ProfileFilter {
        &self.filter
    }

    /// Run every step of the profile.
    ///
    /// # Errors
    ///
    /// [`RunAborted`] when an action fails unrecoverably, the state file
    /// cannot be updated, or the operator interrupts a prompt. Steps after
    /// the failing one are never attempted.
    pub fn run(
        &self,
        state: &mut StateStore,
        gate: &mut ConfirmationGate,
        vault: &BackupVault,
        shell: &Shell,
    ) -> std::result::Result<RunStats, RunAborted> {
        let dry_run = self.ctx.dry_run();
        let mut stats = RunStats::new(self.filter.total(self.catalogue));

        tracing::info!(
            "Profile '{}': {} step(s){}{}",
            self.filter.name(),
            stats.total,
            if dry_run { " [dry-run]" } else { "" },
            if self.ctx.force() { " [force]" } else { "" },
        );

        for step in self.catalogue {
            let id = step.id();

            if !self.filter.includes(id) {
                tracing::debug!("Skipping {}: not in profile '{}'", id, self.filter.name());
                stats.record(id, StepState::SkippedByProfile);
                continue;
            }

            tracing::info!("");
            tracing::info!(
                "[{}/{}] {}",
                stats.completed + 1,
                stats.total,
                step.display_name()
            );

            if state.is_completed(id) && !self.ctx.force() {
                tracing::info!("  ↷ Skipped: already completed (use --force to re-run)");
                stats.record(id, StepState::SkippedAlreadyDone);
                continue;
            }

            let abort = |cause: AbortCause, stats: RunStats| RunAborted {
                step_id: id.to_string(),
                display_name: step.display_name().to_string(),
                cause,
                stats,
            };

            match gate.ask(&format!("Run step '{}'?", step.display_name()), true) {
                Ok(true) => {}
                Ok(false) => {
                    tracing::info!("  ↷ Skipped: declined by user");
                    stats.record(id, StepState::SkippedByUser);
                    continue;
                }
                Err(ArchPostError::Interrupted) => {
                    return Err(abort(AbortCause::Interrupted, stats));
                }
                Err(e) => return Err(abort(AbortCause::Fatal(e.into()), stats)),
            }

            stats.touch_services(step.services());
            let outcome = {
                let mut cx = StepContext::new(self.ctx, gate, vault, shell);
                step.run(&mut cx)
            };

            match outcome {
                Ok(StepStatus::Done) => {
                    if !dry_run {
                        if let Err(e) = state.mark_completed(id) {
                            tracing::error!("  ✗ Cannot record completion: {}", e);
                            return Err(abort(AbortCause::Fatal(e.into()), stats));
                        }
                    }
                    tracing::info!("  ✓ Done");
                    stats.record(id, StepState::RanOk);
                }
                Ok(StepStatus::Issues(msg)) => {
                    tracing::warn!("  ⚠ Execution issue: {} (will be retried next run)", msg);
                    stats.issues.push((id.to_string(), msg));
                    stats.record(id, StepState::RanWithIssues);
                }
                Err(e) if is_interrupt(&e) => {
                    return Err(abort(AbortCause::Interrupted, stats));
                }
                Err(e) => {
                    tracing::error!("  ✗ Fatal: {:#}", e);
                    return Err(abort(AbortCause::Fatal(e), stats));
                }
            }
        }

        tracing::info!("");
        tracing::info!("Run finished ({})", stats.progress());
        Ok(stats)
    }
}
