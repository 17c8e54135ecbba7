//! Fonts, Flatpak and system services.

use super::{pacman_install, require_packages};
use crate::step::{StepContext, StepStatus};

const FONT_PACKAGES: &[&str] = &[
    "noto-fonts",
    "noto-fonts-emoji",
    "ttf-dejavu",
    "ttf-liberation",
    "ttf-jetbrains-mono-nerd",
];

const FLATHUB_URL: &str = "https://dl.flathub.org/repo/flathub.flatpakrepo";

pub(super) fn fonts(cx: &mut StepContext<'_>) -> anyhow::Result<StepStatus> {
    require_packages(cx, FONT_PACKAGES)?;

    let out = cx.shell().run("fc-cache", &["-f"])?;
    if !out.success {
        return Ok(StepStatus::Issues("font cache rebuild failed".to_string()));
    }
    Ok(StepStatus::Done)
}

pub(super) fn flatpak(cx: &mut StepContext<'_>) -> anyhow::Result<StepStatus> {
    if !cx.ask("Set up Flatpak with the Flathub remote?", false)? {
        tracing::info!("  Flatpak not requested");
        return Ok(StepStatus::Done);
    }

    require_packages(cx, &["flatpak"])?;

    let out = cx.shell().run_privileged(
        "flatpak",
        &["remote-add", "--if-not-exists", "flathub", FLATHUB_URL],
    )?;
    if !out.success {
        return Ok(StepStatus::Issues("could not add the Flathub remote".to_string()));
    }
    Ok(StepStatus::Done)
}

/// `systemctl enable --now <unit>`
fn enable_now(cx: &StepContext<'_>, unit: &str) -> anyhow::Result<bool> {
    Ok(cx
        .shell()
        .run_privileged("systemctl", &["enable", "--now", unit])?
        .success)
}

pub(super) fn bluetooth(cx: &mut StepContext<'_>) -> anyhow::Result<StepStatus> {
    if !pacman_install(cx, &["bluez", "bluez-utils"])?.success {
        return Ok(StepStatus::Issues("bluez could not be installed".to_string()));
    }
    if !enable_now(cx, "bluetooth.service")? {
        return Ok(StepStatus::Issues(
            "bluetooth.service failed to start (no adapter?)".to_string(),
        ));
    }
    Ok(StepStatus::Done)
}

pub(super) fn firewall(cx: &mut StepContext<'_>) -> anyhow::Result<StepStatus> {
    require_packages(cx, &["ufw"])?;

    // A half-applied rule set is an unknown state: every failure is fatal
    for rule in [
        &["default", "deny", "incoming"][..],
        &["default", "allow", "outgoing"][..],
        &["limit", "ssh"][..],
    ] {
        cx.shell()
            .run_privileged("ufw", rule)?
            .ensure_success(&format!("ufw {}", rule.join(" ")))?;
    }

    if !enable_now(cx, "ufw.service")? {
        anyhow::bail!("ufw.service failed to start");
    }
    cx.shell()
        .run_privileged("ufw", &["--force", "enable"])?
        .ensure_success("ufw enable")?;
    Ok(StepStatus::Done)
}
