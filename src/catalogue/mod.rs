//! Built-in step catalogue.
//!
//! Order is execution order for the `full` profile and relative order for
//! every other profile. Ids are recorded in the state file and must stay
//! stable across releases.

mod aur;
mod desktop;
mod hardware;
mod login_shell;
mod packages;
mod secure_boot;

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::shell::CommandOutput;
use crate::step::{StepContext, StepDescriptor};

/// Pacman configuration tuned by `pacman_tweaks`
pub const PACMAN_CONF: &str = "/etc/pacman.conf";

/// Build the ordered catalogue
pub fn builtin() -> Vec<StepDescriptor> {
    vec![
        StepDescriptor::new("system_update", "Update system packages", packages::system_update),
        StepDescriptor::new("base_packages", "Install base packages", packages::base_packages),
        StepDescriptor::new("pacman_tweaks", "Tune pacman.conf", packages::pacman_tweaks),
        StepDescriptor::new("aur_helper", "Install AUR helper", aur::install_helper),
        StepDescriptor::new("gpu_drivers", "Install GPU drivers", hardware::install_drivers),
        StepDescriptor::new("shell_config", "Configure login shell", login_shell::configure),
        StepDescriptor::new("fonts", "Install fonts and rebuild font cache", desktop::fonts),
        StepDescriptor::new("flatpak", "Set up Flatpak and Flathub", desktop::flatpak),
        StepDescriptor::new("bluetooth", "Enable Bluetooth", desktop::bluetooth)
            .starts_services(&["bluetooth.service"]),
        StepDescriptor::new("firewall", "Enable firewall", desktop::firewall)
            .starts_services(&["ufw.service"]),
        StepDescriptor::new("secure_boot", "Enroll Secure Boot keys", secure_boot::enroll),
        StepDescriptor::new(
            "cleanup",
            "Remove orphaned packages and clean cache",
            packages::cleanup,
        ),
    ]
}

/// Original locations a backup can be restored to
pub fn recognized_backup_files() -> Vec<PathBuf> {
    recognized_under(operator_home().as_deref())
}

fn recognized_under(home: Option<&Path>) -> Vec<PathBuf> {
    let mut files = vec![PathBuf::from(PACMAN_CONF)];
    if let Some(home) = home {
        files.extend(login_shell::RC_FILES.iter().map(|rc| home.join(rc)));
    }
    files
}

/// Account being configured: the invoking user under `sudo`, else `USER`
pub fn operator_name() -> Option<String> {
    std::env::var("SUDO_USER")
        .or_else(|_| std::env::var("USER"))
        .ok()
        .filter(|u| !u.is_empty())
}

/// Home directory of [`operator_name`]
pub fn operator_home() -> Option<PathBuf> {
    home_of(operator_name().as_deref())
}

/// Home from the passwd entry of `user`, else this process's home
fn home_of(user: Option<&str>) -> Option<PathBuf> {
    user.and_then(|name| nix::unistd::User::from_name(name).ok().flatten())
        .map(|entry| entry.dir)
        .or_else(dirs::home_dir)
}

/// `pacman -S --needed --noconfirm <packages>` as root
fn pacman_install<S: AsRef<str>>(
    cx: &StepContext<'_>,
    packages: &[S],
) -> anyhow::Result<CommandOutput> {
    let mut args: Vec<&str> = vec!["-S", "--needed", "--noconfirm"];
    for pkg in packages {
        args.push(pkg.as_ref());
    }
    cx.shell().run_privileged("pacman", &args)
}

/// Install packages, failing the step if pacman fails
fn require_packages<S: AsRef<str>>(cx: &StepContext<'_>, packages: &[S]) -> anyhow::Result<()> {
    let mut names = String::new();
    for pkg in packages {
        names.push(' ');
        names.push_str(pkg.as_ref());
    }
    pacman_install(cx, packages)?.ensure_success(&format!("pacman -S{}", names))
}

/// Write `content` to a root-owned `dest` through a staging file and `install`.
fn install_root_file(cx: &StepContext<'_>, dest: &Path, content: &str) -> anyhow::Result<()> {
    if cx.dry_run() {
        tracing::info!("[DRY-RUN] Would write {}", dest.display());
        return Ok(());
    }

    let name = dest
        .file_name()
        .map(OsStr::to_string_lossy)
        .unwrap_or_default();
    let staging = std::env::temp_dir().join(format!(
        "archpost-{}-{}",
        cx.context().run_id(),
        name
    ));
    std::fs::write(&staging, content)
        .with_context(|| format!("Failed to stage {}", staging.display()))?;

    let result = cx
        .shell()
        .run_privileged(
            "install",
            &[
                OsStr::new("-m"),
                OsStr::new("644"),
                staging.as_os_str(),
                dest.as_os_str(),
            ],
        )
        .and_then(|out| out.ensure_success(&format!("install {}", dest.display())));
    let _ = std::fs::remove_file(&staging);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profiles::{Profile, ProfileFilter};
    use crate::step::validate_catalogue;
    use strum::IntoEnumIterator;

    #[test]
    fn test_catalogue_is_valid() {
        let steps = builtin();
        assert_eq!(steps.len(), 12);
        validate_catalogue(&steps).unwrap();
        assert_eq!(steps[0].id(), "system_update");
        assert_eq!(steps[11].id(), "cleanup");
    }

    #[test]
    fn test_every_profile_matches_catalogue() {
        let steps = builtin();
        for profile in Profile::iter() {
            ProfileFilter::new(profile, &steps).unwrap();
        }
    }

    #[test]
    fn test_service_steps_declare_units() {
        let steps = builtin();
        let bt = steps.iter().find(|s| s.id() == "bluetooth").unwrap();
        assert_eq!(bt.services(), &["bluetooth.service".to_string()]);
        let fw = steps.iter().find(|s| s.id() == "firewall").unwrap();
        assert_eq!(fw.services(), &["ufw.service".to_string()]);
    }

    #[test]
    fn test_recognized_files_include_pacman_conf() {
        let files = recognized_backup_files();
        assert_eq!(files[0], PathBuf::from("/etc/pacman.conf"));
        assert!(files.iter().all(|f| f.is_absolute()));
    }

    #[test]
    fn test_recognized_files_cover_every_shell_rc() {
        let home = Path::new("/home/op");
        let files = recognized_under(Some(home));
        for shell in ["bash", "zsh", "fish"] {
            for rc in login_shell::backed_up_files(shell, home) {
                assert!(files.contains(&rc), "{} not restorable", rc.display());
            }
        }
        assert!(files.contains(&home.join(".config/fish/config.fish")));
    }

    #[test]
    fn test_home_comes_from_named_account() {
        assert_eq!(home_of(Some("root")), Some(PathBuf::from("/root")));
        assert_eq!(home_of(Some("archpost-no-such-user")), dirs::home_dir());
        assert_eq!(home_of(None), dirs::home_dir());
    }
}
