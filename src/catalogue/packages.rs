//! Package-manager steps: update, base packages, pacman.conf, cleanup.

use std::path::Path;

use anyhow::Context;

use super::{PACMAN_CONF, install_root_file, require_packages};
use crate::step::{StepContext, StepStatus};

/// Installed by every profile
const BASE_PACKAGES: &[&str] = &[
    "base-devel",
    "git",
    "curl",
    "wget",
    "unzip",
    "man-db",
    "htop",
    "openssh",
];

/// `#Option` lines enabled in pacman.conf
const PACMAN_OPTIONS: &[&str] = &["Color", "VerbosePkgLists", "ParallelDownloads"];

pub(super) fn system_update(cx: &mut StepContext<'_>) -> anyhow::Result<StepStatus> {
    cx.shell()
        .run_privileged("pacman", &["-Syu", "--noconfirm"])?
        .ensure_success("System upgrade")?;
    Ok(StepStatus::Done)
}

pub(super) fn base_packages(cx: &mut StepContext<'_>) -> anyhow::Result<StepStatus> {
    let mut packages: Vec<String> = BASE_PACKAGES.iter().map(|p| (*p).to_string()).collect();
    for extra in &cx.settings().extra_packages {
        if !packages.contains(extra) {
            packages.push(extra.clone());
        }
    }
    tracing::info!("  {} package(s)", packages.len());
    require_packages(cx, &packages)?;
    Ok(StepStatus::Done)
}

pub(super) fn pacman_tweaks(cx: &mut StepContext<'_>) -> anyhow::Result<StepStatus> {
    let path = Path::new(PACMAN_CONF);
    let current = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let Some(tuned) = tune_pacman_conf(&current) else {
        tracing::info!("  pacman.conf already tuned");
        return Ok(StepStatus::Done);
    };

    cx.backup(path)?;
    install_root_file(cx, path, &tuned)?;
    Ok(StepStatus::Done)
}

/// Uncomment [`PACMAN_OPTIONS`] inside `[options]`. `None` if nothing changes.
pub(super) fn tune_pacman_conf(content: &str) -> Option<String> {
    let mut changed = false;
    let mut in_options = false;
    let mut out = String::with_capacity(content.len());

    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with('[') {
            in_options = trimmed == "[options]";
        }

        let enabled = in_options
            .then(|| trimmed.strip_prefix('#'))
            .flatten()
            .map(str::trim_start)
            .filter(|rest| {
                PACMAN_OPTIONS.iter().any(|opt| {
                    rest.strip_prefix(*opt)
                        .is_some_and(|tail| tail.is_empty() || tail.trim_start().starts_with('='))
                })
            });

        match enabled {
            Some(rest) => {
                out.push_str(rest);
                changed = true;
            }
            None => out.push_str(line),
        }
        out.push('\n');
    }

    changed.then_some(out)
}

pub(super) fn cleanup(cx: &mut StepContext<'_>) -> anyhow::Result<StepStatus> {
    let query = match cx.shell().capture("pacman", &["-Qdtq"]) {
        Ok(out) => out,
        Err(e) => return Ok(StepStatus::Issues(format!("could not list orphans: {:#}", e))),
    };

    let orphans: Vec<&str> = query.stdout.split_whitespace().collect();
    if orphans.is_empty() {
        tracing::info!("  No orphaned packages");
    } else {
        tracing::info!("  Removing {} orphaned package(s)", orphans.len());
        let mut args = vec!["-Rns", "--noconfirm"];
        args.extend(orphans.iter().copied());
        let out = cx.shell().run_privileged("pacman", &args)?;
        if !out.success {
            return Ok(StepStatus::Issues("orphan removal failed".to_string()));
        }
    }

    let out = cx
        .shell()
        .run_privileged("pacman", &["-Sc", "--noconfirm"])?;
    if !out.success {
        return Ok(StepStatus::Issues("package cache cleanup failed".to_string()));
    }
    Ok(StepStatus::Done)
}
