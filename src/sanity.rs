//! Pre-flight checks for a real run
//!
//! Verified before the first step:
//! - required binaries are on PATH (pacman, systemctl)
//! - archpost runs as root, or `sudo -v` succeeds
//!
//! A failure is a configuration error (exit code 2); nothing has been
//! touched yet. Dry-run skips the checks entirely.

use crate::error::{ArchPostError, Result};
use crate::shell::Shell;

/// Result of environment verification
#[derive(Debug)]
pub struct SanityCheckResult {
    pub missing_binaries: Vec<String>,
    pub is_root: bool,
    /// `sudo -v` succeeded (always false when root)
    pub sudo_ok: bool,
}

impl SanityCheckResult {
    /// Returns true if all checks passed
    pub fn is_ok(&self) -> bool {
        self.missing_binaries.is_empty() && (self.is_root || self.sudo_ok)
    }

    /// Operator-facing description of what failed
    pub fn describe_failure(&self) -> String {
        let mut problems = Vec::new();
        if !self.is_root && !self.sudo_ok {
            problems.push("root privileges required: run as root or allow `sudo -v`".to_string());
        }
        if !self.missing_binaries.is_empty() {
            let packages: Vec<&str> = self
                .missing_binaries
                .iter()
                .map(|b| get_package_for_binary(b))
                .collect();
            problems.push(format!(
                "missing required binaries: {} (install: pacman -S {})",
                self.missing_binaries.join(", "),
                packages.join(" ")
            ));
        }
        problems.join("; ")
    }
}

/// Required runtime binaries
const REQUIRED_BINARIES: &[&str] = &[
    "pacman",    // Package installation
    "systemctl", // Service enablement and rollback
];

/// Map binary names to their Arch Linux package names
fn get_package_for_binary(binary: &str) -> &'static str {
    match binary {
        "pacman" => "pacman",
        "systemctl" => "systemd",
        "sudo" => "sudo",
        _ => "unknown",
    }
}

/// Run every check. Prompts for the sudo password when not root.
pub fn verify_environment(shell: &Shell) -> SanityCheckResult {
    let missing_binaries = REQUIRED_BINARIES
        .iter()
        .filter(|b| !shell.has_program(b))
        .map(|b| (*b).to_string())
        .collect();

    let is_root = nix::unistd::geteuid().is_root();
    let sudo_ok = !is_root
        && shell
            .run("sudo", &["-v"])
            .map(|out| out.success)
            .unwrap_or(false);

    SanityCheckResult {
        missing_binaries,
        is_root,
        sudo_ok,
    }
}

/// Verify the environment for a real run.
pub fn run_preflight_checks(dry_run: bool, shell: &Shell) -> Result<()> {
    if dry_run {
        tracing::debug!("Pre-flight checks skipped under dry-run");
        return Ok(());
    }

    tracing::debug!("Running pre-flight checks...");
    let result = verify_environment(shell);
    if !result.is_ok() {
        return Err(ArchPostError::privilege(result.describe_failure()));
    }

    tracing::debug!("Pre-flight checks passed: root={}", result.is_root);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dry_run_skips_checks() {
        assert!(run_preflight_checks(true, &Shell::new(true)).is_ok());
    }

    #[test]
    fn test_package_mapping() {
        assert_eq!(get_package_for_binary("systemctl"), "systemd");
        assert_eq!(get_package_for_binary("pacman"), "pacman");
        assert_eq!(get_package_for_binary("nope"), "unknown");
    }

    #[test]
    fn test_sanity_result_is_ok() {
        let root = SanityCheckResult {
            missing_binaries: vec![],
            is_root: true,
            sudo_ok: false,
        };
        assert!(root.is_ok());

        let sudo = SanityCheckResult {
            missing_binaries: vec![],
            is_root: false,
            sudo_ok: true,
        };
        assert!(sudo.is_ok());

        let unprivileged = SanityCheckResult {
            missing_binaries: vec![],
            is_root: false,
            sudo_ok: false,
        };
        assert!(!unprivileged.is_ok());
        assert!(unprivileged.describe_failure().contains("root privileges"));

        let missing = SanityCheckResult {
            missing_binaries: vec!["pacman".to_string()],
            is_root: true,
            sudo_ok: false,
        };
        assert!(!missing.is_ok());
        assert!(missing.describe_failure().contains("pacman -S pacman"));
    }
}
