//! Console and log-file output.
//!
//! Everything the operator sees goes through `tracing`. The console layer
//! prints bare messages on stdout (`RUST_LOG` overrides the default `info`),
//! the file layer writes the same events plus debug detail, with timestamps
//! and levels, to the per-run log file.

use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Arc;

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use crate::error::{ArchPostError, Result};

fn console_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber, duplicating output to `log_file` when given.
pub fn init(log_file: Option<&Path>) -> Result<()> {
    let file_layer = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(
                fmt::layer()
                    .with_writer(Arc::new(file))
                    .with_ansi(false)
                    .with_target(false)
                    .with_filter(LevelFilter::DEBUG),
            )
        }
        None => None,
    };

    let console_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .without_time()
        .with_level(false)
        .with_target(false)
        .with_filter(console_filter());

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| ArchPostError::Io(std::io::Error::other(e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_reach_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("logs").join("archpost-test.log");

        init(Some(&log)).unwrap();
        tracing::info!("[1/3] Update system packages");
        tracing::debug!("Query: lspci");

        let content = fs::read_to_string(&log).unwrap();
        assert!(content.contains("[1/3] Update system packages"));
        assert!(content.contains("INFO"));
        assert!(content.contains("Query: lspci"));
        // Second global init is rejected
        assert!(init(None).is_err());
    }
}
