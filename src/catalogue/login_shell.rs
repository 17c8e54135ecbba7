//! Login shell configuration.
//!
//! Installs the configured shell, appends an archpost-managed block to its
//! rc file and makes it the operator's login shell. The rc files are
//! snapshotted first so `--restore` can undo the edit. Under `sudo` the
//! invoking user's account and home are configured, not root's.

use std::path::{Path, PathBuf};

use anyhow::Context;

use super::{operator_home, operator_name, require_packages};
use crate::step::{StepContext, StepStatus};

const BLOCK_START: &str = "# >>> archpost >>>";
const BLOCK_END: &str = "# <<< archpost <<<";

/// rc files the step may edit, relative to the home directory
pub(super) const RC_FILES: &[&str] = &[".zshrc", ".bashrc", ".config/fish/config.fish"];

/// rc file of `shell` under `home`
fn rc_file(shell: &str, home: &Path) -> PathBuf {
    match shell {
        "zsh" => home.join(RC_FILES[0]),
        "fish" => home.join(RC_FILES[2]),
        _ => home.join(RC_FILES[1]),
    }
}

/// Files snapshotted before the edit: the common rc files and the one written
pub(super) fn backed_up_files(shell: &str, home: &Path) -> Vec<PathBuf> {
    let mut files = vec![home.join(".zshrc"), home.join(".bashrc")];
    let rc = rc_file(shell, home);
    if !files.contains(&rc) {
        files.push(rc);
    }
    files
}

/// Managed block body for `shell`
fn managed_block(shell: &str) -> String {
    let body = match shell {
        "zsh" => "HISTFILE=~/.zsh_history\nHISTSIZE=10000\nSAVEHIST=10000\nsetopt share_history\nalias ls='ls --color=auto'",
        "fish" => "set -g fish_greeting\nalias ls 'ls --color=auto'",
        _ => "HISTSIZE=10000\nHISTFILESIZE=20000\nshopt -s histappend\nalias ls='ls --color=auto'",
    };
    format!("{}\n{}\n{}\n", BLOCK_START, body, BLOCK_END)
}

/// `existing` plus the managed block, or `None` if the block is present.
pub(super) fn with_managed_block(existing: &str, block: &str) -> Option<String> {
    if existing.contains(BLOCK_START) {
        return None;
    }
    let mut out = existing.to_string();
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    if !out.is_empty() {
        out.push('\n');
    }
    out.push_str(block);
    Some(out)
}

pub(super) fn configure(cx: &mut StepContext<'_>) -> anyhow::Result<StepStatus> {
    let shell = cx.settings().shell.clone();
    let home = operator_home().context("Cannot determine home directory")?;

    require_packages(cx, &[shell.as_str()])?;

    for file in backed_up_files(&shell, &home) {
        cx.backup(&file)?;
    }

    let rc = rc_file(&shell, &home);
    let existing = match std::fs::read_to_string(&rc) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e).with_context(|| format!("Failed to read {}", rc.display())),
    };

    match with_managed_block(&existing, &managed_block(&shell)) {
        None => tracing::info!("  {} already configured", rc.display()),
        Some(_) if cx.dry_run() => tracing::info!("[DRY-RUN] Would update {}", rc.display()),
        Some(updated) => {
            if let Some(parent) = rc.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            std::fs::write(&rc, updated)
                .with_context(|| format!("Failed to write {}", rc.display()))?;
            tracing::info!("  Updated {}", rc.display());
        }
    }

    let Some(user) = operator_name() else {
        return Ok(StepStatus::Issues(
            "cannot determine the user whose login shell to change".to_string(),
        ));
    };
    let shell_path = format!("/usr/bin/{}", shell);
    let out = cx
        .shell()
        .run_privileged("chsh", &["-s", shell_path.as_str(), user.as_str()])?;
    if !out.success {
        return Ok(StepStatus::Issues(format!(
            "could not set {} as login shell for {}",
            shell_path, user
        )));
    }
    Ok(StepStatus::Done)
}
