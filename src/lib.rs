//! archpost library
//!
//! Step-orchestration core for the Arch Linux post-install configurator:
//! profiles, the resumable state store, backups, confirmations, the step
//! runner and fatal-abort rollback, plus the built-in step catalogue.

pub mod backup;
pub mod catalogue;
pub mod cli;
pub mod confirm;
pub mod context;
pub mod error;
pub mod keepalive;
pub mod logging;
pub mod modes;
pub mod process_guard;
pub mod profiles;
pub mod rollback;
pub mod runner;
pub mod sanity;
pub mod settings;
pub mod shell;
pub mod state_store;
pub mod step;

// Re-export main types for convenience
pub use backup::BackupVault;
pub use confirm::{ConfirmationGate, Prompter, TerminalPrompter};
pub use context::{ExecutionContext, RunPaths};
pub use error::{ArchPostError, Result};
pub use process_guard::{ChildGroup, ChildRegistry, CommandProcessGroup, ProcessGuard};
pub use profiles::{Profile, ProfileFilter};
pub use rollback::{RollbackHandler, RollbackReport, ServiceControl, Systemctl};
pub use runner::{AbortCause, RunAborted, RunStats, StepRunner, StepState};
pub use settings::{AurHelper, Settings};
pub use shell::{CommandOutput, Shell};
pub use state_store::StateStore;
pub use step::{StepContext, StepDescriptor, StepStatus};
