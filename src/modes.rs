//! Maintenance modes that do not run steps: `--list` and `--reset-state`.

use crate::confirm::ConfirmationGate;
use crate::context::ExecutionContext;
use crate::error::Result;
use crate::profiles::ProfileFilter;
use crate::state_store::StateStore;
use crate::step::StepDescriptor;

/// `--list`: the catalogue with profile and completion markers, one line per
/// step after a header line
pub fn list_steps(
    ctx: &ExecutionContext,
    steps: &[StepDescriptor],
    state: &StateStore,
) -> Result<Vec<String>> {
    let filter = ProfileFilter::new(ctx.profile(), steps)?;
    let mut lines = Vec::with_capacity(steps.len() + 1);
    lines.push(format!(
        "Profile '{}' ({} of {} steps), state: {}",
        filter.name(),
        filter.total(steps),
        steps.len(),
        state.path().display()
    ));
    for step in steps {
        let included = if filter.includes(step.id()) { "[in profile]" } else { "            " };
        let done = if state.is_completed(step.id()) { "[done]" } else { "      " };
        lines.push(format!(
            "  {} {} {:<14} {}",
            included,
            done,
            step.id(),
            step.display_name()
        ));
    }
    Ok(lines)
}

/// `--reset-state`: forget every completed step after confirmation.
///
/// Returns `true` only if the state file was removed.
pub fn reset_state(
    ctx: &ExecutionContext,
    gate: &mut ConfirmationGate,
    state: &mut StateStore,
) -> Result<bool> {
    if state.is_empty() {
        tracing::info!("No completed steps recorded in {}", state.path().display());
        return Ok(false);
    }

    let prompt = format!("Forget {} completed step(s)?", state.len());
    if !gate.ask(&prompt, false)? {
        tracing::info!("Reset declined, nothing changed");
        return Ok(false);
    }
    if ctx.dry_run() {
        tracing::info!("[DRY-RUN] Would remove {}", state.path().display());
        return Ok(false);
    }

    state.reset()?;
    tracing::info!("✓ State cleared: {}", state.path().display());
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogue;
    use crate::confirm::Prompter;
    use crate::context::RunPaths;
    use crate::profiles::Profile;
    use std::fs;

    struct Answer(bool);

    impl Prompter for Answer {
        fn confirm(&mut self, _prompt: &str, _default_yes: bool) -> Result<bool> {
            Ok(self.0)
        }
    }

    fn recorded_state(ctx: &ExecutionContext) -> StateStore {
        let mut state = StateStore::open(ctx.state_file());
        state.mark_completed("system_update").unwrap();
        state.mark_completed("fonts").unwrap();
        state
    }

    #[test]
    fn test_list_marks_profile_and_completion() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ExecutionContext::new(Profile::Minimal, RunPaths::under(dir.path(), "l"));
        let steps = catalogue::builtin();
        let state = recorded_state(&ctx);

        let lines = list_steps(&ctx, &steps, &state).unwrap();
        assert_eq!(lines.len(), steps.len() + 1);
        assert!(lines[0].starts_with("Profile 'minimal' (3 of 12 steps)"));

        let line_of = |id: &str| lines.iter().find(|l| l.contains(id)).unwrap().clone();
        let update = line_of("system_update");
        assert!(update.contains("[in profile]") && update.contains("[done]"));
        let shell = line_of("shell_config");
        assert!(shell.contains("[in profile]") && !shell.contains("[done]"));
        let fonts = line_of("fonts");
        assert!(!fonts.contains("[in profile]") && fonts.contains("[done]"));
    }

    #[test]
    fn test_reset_confirmed_removes_state_file() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ExecutionContext::new(Profile::Full, RunPaths::under(dir.path(), "r"));
        let mut state = recorded_state(&ctx);
        let mut gate = ConfirmationGate::new(false, Box::new(Answer(true)));

        assert!(reset_state(&ctx, &mut gate, &mut state).unwrap());
        assert!(state.is_empty());
        assert!(!ctx.state_file().exists());
    }

    #[test]
    fn test_reset_declined_keeps_state() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ExecutionContext::new(Profile::Full, RunPaths::under(dir.path(), "r"));
        let mut state = recorded_state(&ctx);
        let before = fs::read(ctx.state_file()).unwrap();
        let mut gate = ConfirmationGate::new(false, Box::new(Answer(false)));

        assert!(!reset_state(&ctx, &mut gate, &mut state).unwrap());
        assert_eq!(fs::read(ctx.state_file()).unwrap(), before);
        assert!(state.is_completed("fonts"));
    }

    #[test]
    fn test_reset_under_dry_run_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ExecutionContext::new(Profile::Full, RunPaths::under(dir.path(), "r"))
            .with_dry_run(true);
        let mut state = recorded_state(&ctx);
        let before = fs::read(ctx.state_file()).unwrap();
        let mut gate = ConfirmationGate::new(true, Box::new(Answer(false)));

        assert!(!reset_state(&ctx, &mut gate, &mut state).unwrap());
        assert_eq!(fs::read(ctx.state_file()).unwrap(), before);
        assert_eq!(gate.simulated_prompts().len(), 1);
    }

    #[test]
    fn test_reset_with_empty_state_does_not_ask() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ExecutionContext::new(Profile::Full, RunPaths::under(dir.path(), "r"));
        let mut state = StateStore::open(ctx.state_file());
        let mut gate = ConfirmationGate::new(true, Box::new(Answer(false)));

        assert!(!reset_state(&ctx, &mut gate, &mut state).unwrap());
        assert!(gate.simulated_prompts().is_empty());
    }
}
