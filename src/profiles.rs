//! Step profile management.
//!
//! A profile selects which catalogue steps run. Profile tables live in Rust so
//! a typo in a step id is caught at startup (and by the tests) instead of
//! silently skipping a step at runtime.
//!
//! | Profile  | Steps |
//! |----------|-------|
//! | full     | every catalogue step |
//! | minimal  | update, base packages, shell |
//! | desktop  | graphical workstation setup |
//! | server   | headless hardening |
//! | dev      | developer workstation without desktop extras |

use std::collections::HashSet;
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

use crate::error::{ArchPostError, Result};
use crate::step::StepDescriptor;

/// Profile selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, EnumIter, EnumString, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Profile {
    /// Every step in catalogue order.
    #[default]
    Full,
    /// Bare minimum: up-to-date system, base tools, login shell.
    Minimal,
    /// Graphical workstation.
    Desktop,
    /// Headless machine.
    Server,
    /// Development workstation.
    Dev,
}

impl Profile {
    /// Parse a profile name, listing the valid names on failure.
    pub fn from_name(name: &str) -> Result<Self> {
        name.parse().map_err(|_| ArchPostError::UnknownProfile {
            name: name.to_string(),
            valid: Self::names().join(", "),
        })
    }

    /// All profile names in declaration order.
    pub fn names() -> Vec<String> {
        Self::iter().map(|p| p.to_string()).collect()
    }

    /// Step ids included by this profile, or `None` for every step.
    ///
    /// Order in these tables is irrelevant: steps always run in catalogue order.
    pub const fn step_ids(self) -> Option<&'static [&'static str]> {
        match self {
            Self::Full => None,
            Self::Minimal => Some(MINIMAL_STEPS),
            Self::Desktop => Some(DESKTOP_STEPS),
            Self::Server => Some(SERVER_STEPS),
            Self::Dev => Some(DEV_STEPS),
        }
    }
}

const MINIMAL_STEPS: &[&str] = &["system_update", "base_packages", "shell_config"];

const DESKTOP_STEPS: &[&str] = &[
    "system_update",
    "base_packages",
    "pacman_tweaks",
    "gpu_drivers",
    "shell_config",
    "fonts",
    "flatpak",
    "bluetooth",
    "cleanup",
];

const SERVER_STEPS: &[&str] = &[
    "system_update",
    "base_packages",
    "pacman_tweaks",
    "firewall",
    "cleanup",
];

const DEV_STEPS: &[&str] = &[
    "system_update",
    "base_packages",
    "pacman_tweaks",
    "aur_helper",
    "shell_config",
    "fonts",
    "cleanup",
];

/// Set of step ids a profile allows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowedSteps {
    /// Every catalogue step.
    All,
    /// Exactly these ids.
    Only(HashSet<String>),
}

impl AllowedSteps {
    /// Whole-id membership test.
    pub fn contains(&self, id: &str) -> bool {
        match self {
            Self::All => true,
            Self::Only(ids) => ids.contains(id),
        }
    }
}

/// Maps the active profile to the steps it includes.
#[derive(Debug, Clone)]
pub struct ProfileFilter {
    name: String,
    allowed: AllowedSteps,
}

impl ProfileFilter {
    /// Build the filter for `profile`.
    ///
    /// Every profile table is checked against the catalogue, not just the
    /// selected one, so a broken table fails every invocation.
    pub fn new(profile: Profile, catalogue: &[StepDescriptor]) -> Result<Self> {
        for other in Profile::iter() {
            Self::from_table(other.to_string(), other.step_ids(), catalogue)?;
        }
        Self::from_table(profile.to_string(), profile.step_ids(), catalogue)
    }

    /// Build a filter from an explicit id table (`None` = all steps).
    pub fn from_table(
        name: impl Into<String>,
        ids: Option<&[&str]>,
        catalogue: &[StepDescriptor],
    ) -> Result<Self> {
        let name = name.into();
        let allowed = match ids {
            None => AllowedSteps::All,
            Some(ids) => {
                for id in ids {
                    if !catalogue.iter().any(|step| step.id() == *id) {
                        return Err(ArchPostError::UnknownStep {
                            profile: name,
                            step: (*id).to_string(),
                        });
                    }
                }
                AllowedSteps::Only(ids.iter().map(|id| (*id).to_string()).collect())
            }
        };

        Ok(Self { name, allowed })
    }

    /// Profile name this filter was built for.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The allowed id set.
    pub fn allowed_ids(&self) -> &AllowedSteps {
        &self.allowed
    }

    /// True if the step with `id` belongs to the profile.
    #[inline]
    pub fn includes(&self, id: &str) -> bool {
        self.allowed.contains(id)
    }

    /// Number of catalogue steps the profile includes.
    pub fn total(&self, catalogue: &[StepDescriptor]) -> usize {
        match self.allowed {
            AllowedSteps::All => catalogue.len(),
            AllowedSteps::Only(_) => catalogue.iter().filter(|s| self.includes(s.id())).count(),
        }
    }
}
