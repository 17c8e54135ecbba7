//! Settings file handling.
//!
//! The settings file is an optional JSON document that tunes what the catalogue
//! steps install and where archpost keeps its bookkeeping. Every field is
//! optional; a missing default file is the same as an empty one.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use strum::{Display, EnumIter, EnumString};

use crate::error::{ArchPostError, Result};

/// AUR helper selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AurHelper {
    #[default]
    Paru,
    Yay,
    None,
}

impl AurHelper {
    /// AUR git URL of the helper's `-bin` package, or `None` when disabled.
    pub fn aur_url(self) -> Option<&'static str> {
        match self {
            Self::Paru => Some("https://aur.archlinux.org/paru-bin.git"),
            Self::Yay => Some("https://aur.archlinux.org/yay-bin.git"),
            Self::None => None,
        }
    }
}

/// User settings loaded from `config.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// AUR helper installed by the `aur_helper` step
    pub aur_helper: AurHelper,
    /// Login shell package configured by the `shell_config` step
    pub shell: String,
    /// Packages appended to the base package set
    pub extra_packages: Vec<String>,
    /// Directory holding the state file (default: XDG state dir)
    pub state_dir: Option<PathBuf>,
    /// Directory holding backup snapshots
    pub backup_dir: Option<PathBuf>,
    /// Directory holding per-run log files
    pub log_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            aur_helper: AurHelper::default(),
            shell: "zsh".to_string(),
            extra_packages: Vec::new(),
            state_dir: None,
            backup_dir: None,
            log_dir: None,
        }
    }
}

/// Shells the `shell_config` step knows how to configure
pub const SUPPORTED_SHELLS: &[&str] = &["zsh", "bash", "fish"];

impl Settings {
    /// Default settings file location (`~/.config/archpost/config.json`)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("archpost").join("config.json"))
    }

    /// Load settings from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            ArchPostError::config(format!("Failed to read settings from {:?}: {}", path, e))
        })?;

        let settings: Self = serde_json::from_str(&content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Resolve the settings for this run.
    ///
    /// An explicit path must exist. Without one, the default location is used
    /// when present and built-in defaults otherwise.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from_file(path);
        }

        match Self::default_path() {
            Some(path) if path.is_file() => {
                tracing::debug!("Loading settings from {:?}", path);
                Self::load_from_file(path)
            }
            _ => Ok(Self::default()),
        }
    }

    /// Save settings to a JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Validate the settings
    pub fn validate(&self) -> Result<()> {
        if !SUPPORTED_SHELLS.contains(&self.shell.as_str()) {
            return Err(ArchPostError::config(format!(
                "Unsupported shell '{}' (supported: {})",
                self.shell,
                SUPPORTED_SHELLS.join(", ")
            )));
        }

        for pkg in &self.extra_packages {
            if pkg.trim().is_empty() || pkg.contains(char::is_whitespace) {
                return Err(ArchPostError::config(format!(
                    "Invalid package name in extra_packages: {:?}",
                    pkg
                )));
            }
        }

        for (name, dir) in [
            ("state_dir", &self.state_dir),
            ("backup_dir", &self.backup_dir),
            ("log_dir", &self.log_dir),
        ] {
            if let Some(dir) = dir {
                if !dir.is_absolute() {
                    return Err(ArchPostError::config(format!(
                        "{} must be an absolute path, got {:?}",
                        name, dir
                    )));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_settings_default() {
        let settings = Settings::default();
        assert_eq!(settings.aur_helper, AurHelper::Paru);
        assert_eq!(settings.shell, "zsh");
        assert!(settings.extra_packages.is_empty());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_partial_settings_file_uses_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{ "aur_helper": "yay", "extra_packages": ["htop"] }}"#).unwrap();
        file.flush().unwrap();

        let settings = Settings::load_from_file(file.path()).unwrap();
        assert_eq!(settings.aur_helper, AurHelper::Yay);
        assert_eq!(settings.extra_packages, vec!["htop".to_string()]);
        assert_eq!(settings.shell, "zsh");
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{ "aur_helpr": "yay" }}"#).unwrap();
        file.flush().unwrap();

        let err = Settings::load_from_file(file.path()).unwrap_err();
        assert!(matches!(err, ArchPostError::Json(_)));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_relative_dir_is_rejected() {
        let settings = Settings {
            state_dir: Some(PathBuf::from("relative/state")),
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_unsupported_shell_is_rejected() {
        let settings = Settings {
            shell: "tcsh".into(),
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_missing_explicit_file_is_config_error() {
        let err = Settings::resolve(Some(Path::new("/nonexistent/archpost.json"))).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let settings = Settings {
            aur_helper: AurHelper::None,
            shell: "fish".into(),
            ..Default::default()
        };
        settings.save_to_file(&path).unwrap();
        assert_eq!(Settings::load_from_file(&path).unwrap(), settings);
    }

    #[test]
    fn test_aur_helper_urls() {
        assert!(AurHelper::Paru.aur_url().unwrap().contains("paru"));
        assert!(AurHelper::None.aur_url().is_none());
        assert_eq!("yay".parse::<AurHelper>().unwrap(), AurHelper::Yay);
    }
}
