//! AUR helper installation (paru/yay).
//!
//! Failures here are handled: the system works without an AUR helper and
//! the operator can build one by hand, so a failed clone or build reports
//! an issue and the run continues.

use std::path::PathBuf;

use super::pacman_install;
use crate::settings::AurHelper;
use crate::step::{StepContext, StepStatus};

pub(super) fn install_helper(cx: &mut StepContext<'_>) -> anyhow::Result<StepStatus> {
    let helper = cx.settings().aur_helper;
    let Some(url) = helper.aur_url() else {
        tracing::info!("  No AUR helper selected");
        return Ok(StepStatus::Done);
    };

    let name = helper.to_string();
    if cx.shell().has_program(&name) {
        tracing::info!("  {} is already installed", name);
        return Ok(StepStatus::Done);
    }

    if nix::unistd::geteuid().is_root() {
        return Ok(StepStatus::Issues(format!(
            "makepkg refuses to run as root; install {} as a regular user",
            name
        )));
    }

    if !pacman_install(cx, &["git", "base-devel"])?.success {
        return Ok(StepStatus::Issues(format!(
            "build dependencies for {} could not be installed",
            name
        )));
    }

    let workdir = build_dir(helper, cx.context().run_id());
    if !cx.dry_run() && workdir.exists() {
        let _ = std::fs::remove_dir_all(&workdir);
    }

    let dest = workdir.to_string_lossy().into_owned();
    let clone = cx
        .shell()
        .run("git", &["clone", "--depth", "1", url, dest.as_str()])?;
    if !clone.success {
        return Ok(StepStatus::Issues(format!("could not clone {}", url)));
    }

    let build = cx
        .shell()
        .run_in(&workdir, "makepkg", &["-si", "--noconfirm"]);
    if !cx.dry_run() {
        let _ = std::fs::remove_dir_all(&workdir);
    }

    let build = build?;
    if !build.success {
        return Ok(StepStatus::Issues(format!(
            "{} build failed (exit code {}); install it manually later",
            name,
            build.exit_code.unwrap_or(-1)
        )));
    }

    tracing::info!("  {} installed", name);
    Ok(StepStatus::Done)
}

fn build_dir(helper: AurHelper, run_id: &str) -> PathBuf {
    std::env::temp_dir().join(format!("archpost-{}-{}", helper, run_id))
}
