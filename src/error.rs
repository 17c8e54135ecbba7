//! Error handling module for archpost
//!
//! Provides the typed error used by the orchestration core. Step actions
//! themselves return `anyhow::Result` (see [`crate::step`]); anything they
//! propagate is treated as fatal by the runner.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for archpost
#[derive(Error, Debug)]
pub enum ArchPostError {
    /// IO errors (state file, backups, log file)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors (settings file, paths, catalogue)
    #[error("Configuration error: {0}")]
    Config(String),

    /// The requested profile does not exist
    #[error("Unknown profile '{name}' (valid profiles: {valid})")]
    UnknownProfile { name: String, valid: String },

    /// A profile table names a step that is not in the catalogue
    #[error("Profile '{profile}' references unknown step '{step}'")]
    UnknownStep { profile: String, step: String },

    /// Missing root/sudo privileges
    #[error("Privilege error: {0}")]
    Privilege(String),

    /// Operator prompt could not be shown or answered
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// Operator cancelled the run
    #[error("Interrupted by operator")]
    Interrupted,

    /// Durable state file errors
    #[error("State error: {0}")]
    State(String),

    /// Backup snapshot or restore errors
    #[error("Backup error at {path:?}: {message}")]
    Backup { path: PathBuf, message: String },

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for archpost operations
pub type Result<T> = std::result::Result<T, ArchPostError>;

impl ArchPostError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a privilege error
    pub fn privilege(msg: impl Into<String>) -> Self {
        Self::Privilege(msg.into())
    }

    /// Create a prompt error
    pub fn prompt(msg: impl Into<String>) -> Self {
        Self::Prompt(msg.into())
    }

    /// Create a state error
    pub fn state(msg: impl Into<String>) -> Self {
        Self::State(msg.into())
    }

    /// Create a backup error for `path`
    pub fn backup(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        Self::Backup {
            path: path.into(),
            message: msg.into(),
        }
    }

    /// Errors that must stop the program before any step runs.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Config(_)
                | Self::UnknownProfile { .. }
                | Self::UnknownStep { .. }
                | Self::Privilege(_)
                | Self::Json(_)
        )
    }

    /// Process exit code for this error.
    ///
    /// `2` for configuration errors, `130` for an operator interrupt and `1`
    /// for everything else.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Interrupted => 130,
            e if e.is_configuration() => 2,
            _ => 1,
        }
    }
}
