//! Operator confirmation.
//!
//! [`ConfirmationGate`] is the single yes/no decision point used by the runner
//! ("Run this step?") and by step actions for opt-in sub-decisions. Under
//! dry-run it never blocks: every question is approved and remembered so the
//! summary can show what would have been asked.

use std::io::{BufRead, ErrorKind, IsTerminal};

use crate::error::{ArchPostError, Result};

/// Source of operator answers.
pub trait Prompter {
    /// Ask a yes/no question. Empty input resolves to `default_yes`.
    fn confirm(&mut self, prompt: &str, default_yes: bool) -> Result<bool>;
}

/// Interactive prompter on the controlling terminal.
///
/// Falls back to reading a line from stdin when stdin is not a terminal
/// (piped answers); end of input resolves to the default.
#[derive(Debug, Default)]
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn confirm(&mut self, prompt: &str, default_yes: bool) -> Result<bool> {
        if !std::io::stdin().is_terminal() {
            return read_piped_answer(&mut std::io::stdin().lock(), default_yes);
        }

        dialoguer::Confirm::new()
            .with_prompt(prompt)
            .default(default_yes)
            .wait_for_newline(true)
            .interact()
            .map_err(|e| match e {
                dialoguer::Error::IO(io) if io.kind() == ErrorKind::Interrupted => {
                    ArchPostError::Interrupted
                }
                other => ArchPostError::prompt(other.to_string()),
            })
    }
}

/// Parse one answer line; anything unrecognised is the default.
fn read_piped_answer(input: &mut impl BufRead, default_yes: bool) -> Result<bool> {
    let mut line = String::new();
    let read = input
        .read_line(&mut line)
        .map_err(|e| ArchPostError::prompt(e.to_string()))?;
    if read == 0 {
        return Ok(default_yes);
    }

    Ok(match line.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => true,
        "n" | "no" => false,
        _ => default_yes,
    })
}

/// Yes/no decision point honouring dry-run.
pub struct ConfirmationGate {
    dry_run: bool,
    prompter: Box<dyn Prompter>,
    simulated: Vec<String>,
}

impl ConfirmationGate {
    /// Create a gate reading answers from `prompter`.
    pub fn new(dry_run: bool, prompter: Box<dyn Prompter>) -> Self {
        Self {
            dry_run,
            prompter,
            simulated: Vec::new(),
        }
    }

    /// Gate backed by the terminal.
    pub fn interactive(dry_run: bool) -> Self {
        Self::new(dry_run, Box::new(TerminalPrompter))
    }

    /// Ask the operator. Under dry-run returns `true` without blocking.
    pub fn ask(&mut self, prompt: &str, default_yes: bool) -> Result<bool> {
        if self.dry_run {
            tracing::info!("[DRY-RUN] Would ask: {} (auto-approved)", prompt);
            self.simulated.push(prompt.to_string());
            return Ok(true);
        }

        let answer = self.prompter.confirm(prompt, default_yes)?;
        tracing::debug!(
            "{} -> {}",
            prompt,
            if answer { "yes" } else { "no" }
        );
        Ok(answer)
    }

    /// Questions auto-approved by dry-run, in the order they were asked.
    pub fn simulated_prompts(&self) -> &[String] {
        &self.simulated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Answers from a fixed script, counting how often it was consulted.
    struct Scripted {
        answers: Vec<bool>,
        asked: usize,
    }

    impl Prompter for Scripted {
        fn confirm(&mut self, _prompt: &str, default_yes: bool) -> Result<bool> {
            let answer = self.answers.get(self.asked).copied().unwrap_or(default_yes);
            self.asked += 1;
            Ok(answer)
        }
    }

    #[test]
    fn test_dry_run_auto_approves_and_records() {
        let mut gate = ConfirmationGate::new(
            true,
            Box::new(Scripted {
                answers: vec![false],
                asked: 0,
            }),
        );

        assert!(gate.ask("Run step 'Install fonts'?", true).unwrap());
        assert!(gate.ask("Enable Flathub?", false).unwrap());
        assert_eq!(
            gate.simulated_prompts(),
            &["Run step 'Install fonts'?".to_string(), "Enable Flathub?".to_string()]
        );
    }

    #[test]
    fn test_real_run_uses_prompter() {
        let mut gate = ConfirmationGate::new(
            false,
            Box::new(Scripted {
                answers: vec![false, true],
                asked: 0,
            }),
        );

        assert!(!gate.ask("first?", true).unwrap());
        assert!(gate.ask("second?", false).unwrap());
        assert!(gate.simulated_prompts().is_empty());
    }

    #[test]
    fn test_piped_empty_line_resolves_to_default() {
        assert!(read_piped_answer(&mut Cursor::new("\n"), true).unwrap());
        assert!(!read_piped_answer(&mut Cursor::new("\n"), false).unwrap());
    }

    #[test]
    fn test_piped_explicit_answers() {
        assert!(read_piped_answer(&mut Cursor::new("yes\n"), false).unwrap());
        assert!(!read_piped_answer(&mut Cursor::new("N\n"), true).unwrap());
        assert!(read_piped_answer(&mut Cursor::new("maybe\n"), true).unwrap());
    }

    #[test]
    fn test_piped_eof_resolves_to_default() {
        assert!(read_piped_answer(&mut Cursor::new(""), true).unwrap());
        assert!(!read_piped_answer(&mut Cursor::new(""), false).unwrap());
    }
}
