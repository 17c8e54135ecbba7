//! Secure Boot key enrollment with `sbctl`.
//!
//! Opt-in: enrolling custom keys on a machine whose firmware is not in
//! Setup Mode fails, which is reported as an issue rather than an abort.

use super::hardware::{FirmwareMode, detect_firmware_mode};
use super::require_packages;
use crate::step::{StepContext, StepStatus};

/// Setup Mode from `sbctl status` output; `None` if the line is missing.
pub(super) fn parse_setup_mode(status: &str) -> Option<bool> {
    status
        .lines()
        .find_map(|line| line.trim().strip_prefix("Setup Mode:"))
        .map(|value| {
            let value = value.to_lowercase();
            value.contains("enabled") && !value.contains("disabled")
        })
}

pub(super) fn enroll(cx: &mut StepContext<'_>) -> anyhow::Result<StepStatus> {
    if !cx.ask(
        "Enroll custom Secure Boot keys with sbctl? (firmware must be in Setup Mode)",
        false,
    )? {
        tracing::info!("  Secure Boot enrollment not requested");
        return Ok(StepStatus::Done);
    }

    let firmware = detect_firmware_mode();
    if firmware == FirmwareMode::Bios {
        return Ok(StepStatus::Issues(format!(
            "system booted in {} mode; Secure Boot needs UEFI",
            firmware
        )));
    }

    require_packages(cx, &["sbctl"])?;

    if cx.dry_run() && !cx.shell().has_program("sbctl") {
        tracing::info!("[DRY-RUN] Would check Setup Mode with sbctl status");
    } else {
        let status = cx.shell().capture("sbctl", &["status"])?;
        match parse_setup_mode(&status.stdout) {
            Some(true) => {}
            Some(false) => {
                return Ok(StepStatus::Issues(
                    "firmware is not in Setup Mode; enable it in the firmware settings and re-run"
                        .to_string(),
                ));
            }
            None => {
                return Ok(StepStatus::Issues(
                    "could not read Setup Mode from sbctl status".to_string(),
                ));
            }
        }
    }

    cx.shell()
        .run_privileged("sbctl", &["create-keys"])?
        .ensure_success("sbctl create-keys")?;
    // -m keeps Microsoft's keys so option ROMs still load
    cx.shell()
        .run_privileged("sbctl", &["enroll-keys", "-m"])?
        .ensure_success("sbctl enroll-keys")?;
    Ok(StepStatus::Done)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_mode_enabled() {
        let out = "Installed:\t✓ sbctl is installed\nSetup Mode:\t✓ Enabled\nSecure Boot:\t✗ Disabled\n";
        assert_eq!(parse_setup_mode(out), Some(true));
    }

    #[test]
    fn test_setup_mode_disabled() {
        let out = "Setup Mode:\t✗ Disabled\nSecure Boot:\t✓ Enabled\n";
        assert_eq!(parse_setup_mode(out), Some(false));
    }

    #[test]
    fn test_setup_mode_missing() {
        assert_eq!(parse_setup_mode("sbctl: command failed\n"), None);
    }
}
