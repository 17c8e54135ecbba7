//! Durable record of completed steps.
//!
//! The state file is a plain list of step ids, one per line, only ever
//! appended to. A crash in the middle of an append can at worst leave an
//! unterminated fragment on the last line: that fragment is ignored on load
//! and the next append starts on a fresh line, so earlier ids are never
//! damaged.
//!
//! Ids that no catalogue step uses are kept but have no effect, so a state
//! file written by a newer version still loads.
//!
//! There is no lock: two invocations sharing a state file is unsupported.

use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::error::{ArchPostError, Result};

/// Completed-step ids backed by an append-only file.
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    completed: HashSet<String>,
    /// The file ends in an unterminated fragment
    needs_newline: bool,
}

impl StateStore {
    /// Load the store from `path`.
    ///
    /// A missing or unreadable file is an empty set; unreadable files are
    /// reported but never abort the run.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let (completed, needs_newline) = match fs::read_to_string(&path) {
            Ok(content) => parse_state(&content),
            Err(e) if e.kind() == ErrorKind::NotFound => (HashSet::new(), false),
            Err(e) => {
                tracing::warn!("Cannot read state file {:?}: {} (treating as empty)", path, e);
                (HashSet::new(), false)
            }
        };

        tracing::debug!("Loaded {} completed step(s) from {:?}", completed.len(), path);
        Self {
            path,
            completed,
            needs_newline,
        }
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True iff `id` is in the durable set.
    #[inline]
    pub fn is_completed(&self, id: &str) -> bool {
        self.completed.contains(id)
    }

    /// Number of recorded ids (including ones unknown to the catalogue)
    pub fn len(&self) -> usize {
        self.completed.len()
    }

    /// True if nothing is recorded
    pub fn is_empty(&self) -> bool {
        self.completed.is_empty()
    }

    /// Persist `id` as completed. Already-present ids are a no-op.
    ///
    /// The line is appended and synced before the in-memory set changes, so
    /// `is_completed` never reports an id the file does not hold.
    pub fn mark_completed(&mut self, id: &str) -> Result<()> {
        if self.completed.contains(id) {
            return Ok(());
        }
        if id.is_empty() || id.contains(char::is_whitespace) {
            return Err(ArchPostError::state(format!("Invalid step id {:?}", id)));
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| {
                ArchPostError::state(format!("Cannot open state file {:?}: {}", self.path, e))
            })?;

        let mut line = String::with_capacity(id.len() + 2);
        if self.needs_newline {
            line.push('\n');
        }
        line.push_str(id);
        line.push('\n');

        file.write_all(line.as_bytes())
            .and_then(|_| file.sync_data())
            .map_err(|e| {
                ArchPostError::state(format!("Cannot append to state file {:?}: {}", self.path, e))
            })?;

        self.needs_newline = false;
        self.completed.insert(id.to_string());
        tracing::debug!("Marked step {} as completed", id);
        Ok(())
    }

    /// Delete the durable record entirely.
    pub fn reset(&mut self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => tracing::info!("Cleared state file {:?}", self.path),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                return Err(ArchPostError::state(format!(
                    "Cannot remove state file {:?}: {}",
                    self.path, e
                )));
            }
        }
        self.completed.clear();
        self.needs_newline = false;
        Ok(())
    }
}

/// Parse file content into the id set.
///
/// Returns the ids and whether the content ends in an unterminated line.
fn parse_state(content: &str) -> (HashSet<String>, bool) {
    let terminated = content.is_empty() || content.ends_with('\n');
    let mut lines: Vec<&str> = content.split('\n').collect();
    // Last element is "" for terminated content, or the fragment otherwise
    lines.pop();

    let ids = lines
        .into_iter()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();

    (ids, !terminated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let store = StateStore::open(dir.path().join("completed_steps"));
        assert!(store.is_empty());
        assert!(!store.is_completed("system_update"));
    }

    #[test]
    fn test_mark_persists_across_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("completed_steps");

        let mut store = StateStore::open(&path);
        store.mark_completed("system_update").unwrap();
        store.mark_completed("fonts").unwrap();
        assert!(store.is_completed("fonts"));

        let reopened = StateStore::open(&path);
        assert!(reopened.is_completed("system_update"));
        assert!(reopened.is_completed("fonts"));
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "system_update\nfonts\n"
        );
    }

    #[test]
    fn test_mark_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("completed_steps");
        let mut store = StateStore::open(&path);

        store.mark_completed("fonts").unwrap();
        store.mark_completed("fonts").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "fonts\n");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_unterminated_fragment_is_ignored_and_isolated() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("completed_steps");
        fs::write(&path, "system_update\nbase_pack").unwrap();

        let mut store = StateStore::open(&path);
        assert!(store.is_completed("system_update"));
        assert!(!store.is_completed("base_pack"));

        store.mark_completed("base_packages").unwrap();
        let reopened = StateStore::open(&path);
        assert!(reopened.is_completed("system_update"));
        assert!(reopened.is_completed("base_packages"));
        assert!(!reopened.is_completed("base_packbase_packages"));
    }

    #[test]
    fn test_unknown_ids_and_blank_lines_are_tolerated() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("completed_steps");
        fs::write(&path, "\nfrom_the_future\n  fonts  \n\n").unwrap();

        let store = StateStore::open(&path);
        assert!(store.is_completed("fonts"));
        assert!(store.is_completed("from_the_future"));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_reset_removes_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("completed_steps");
        let mut store = StateStore::open(&path);
        store.mark_completed("fonts").unwrap();

        store.reset().unwrap();
        assert!(!path.exists());
        assert!(!store.is_completed("fonts"));

        // Resetting an absent file is fine
        store.reset().unwrap();
    }

    #[test]
    fn test_invalid_id_is_rejected() {
        let dir = tempdir().unwrap();
        let mut store = StateStore::open(dir.path().join("completed_steps"));
        assert!(store.mark_completed("two words").is_err());
        assert!(store.mark_completed("").is_err());
        assert!(store.is_empty());
    }
}
