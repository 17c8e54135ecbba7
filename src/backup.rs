//! Backup snapshots of files steps modify.
//!
//! Layout:
//!
//! ```text
//! <backup_dir>/
//!     20250301_101500/        one directory per run that backed anything up
//!         pacman.conf.bak
//!         .zshrc.bak
//!     20250302_093012/
//!         ...
//! ```
//!
//! The run directory is created lazily on the first snapshot; a second run
//! within the same second gets `<run id>-001`, `-002`, ... A file is saved
//! at most once per run, so a second step touching the same file cannot
//! overwrite the pre-run copy. Two different files with the same base name
//! cannot share a snapshot, so the second one is refused. Restoration always reads the newest directory
//! and needs an explicit operator decision.

use std::cell::{OnceCell, RefCell};
use std::collections::HashMap;
use std::ffi::OsString;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::confirm::ConfirmationGate;
use crate::context::ExecutionContext;
use crate::error::{ArchPostError, Result};
use crate::shell::Shell;
use crate::state_store::StateStore;

/// Suffix appended to the base name of saved files
pub const BACKUP_SUFFIX: &str = ".bak";

/// Snapshot store for one run.
#[derive(Debug)]
pub struct BackupVault {
    root: PathBuf,
    run_id: String,
    dry_run: bool,
    /// Original locations restore may write to, matched by base name
    recognized: Vec<PathBuf>,
    /// This run's snapshot directory, once created
    active: OnceCell<PathBuf>,
    /// Base name -> original path of every file saved in this run
    saved: RefCell<HashMap<OsString, PathBuf>>,
}

impl BackupVault {
    /// Create a vault under `root`.
    pub fn new(
        root: impl Into<PathBuf>,
        run_id: impl Into<String>,
        dry_run: bool,
        recognized: Vec<PathBuf>,
    ) -> Self {
        Self {
            root: root.into(),
            run_id: run_id.into(),
            dry_run,
            recognized,
            active: OnceCell::new(),
            saved: RefCell::new(HashMap::new()),
        }
    }

    /// Vault configured from the run context
    pub fn for_context(ctx: &ExecutionContext, recognized: Vec<PathBuf>) -> Self {
        Self::new(ctx.backup_dir(), ctx.run_id(), ctx.dry_run(), recognized)
    }

    /// Snapshot root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// This run's snapshot directory, if anything was backed up yet
    pub fn active_snapshot(&self) -> Option<&Path> {
        self.active.get().map(PathBuf::as_path)
    }

    /// Save the current content of `path`.
    ///
    /// Returns the saved copy, or `None` when the file does not exist or the
    /// run is a dry-run.
    pub fn snapshot(&self, path: &Path) -> Result<Option<PathBuf>> {
        if !path.is_file() {
            tracing::debug!("Nothing to back up at {:?}", path);
            return Ok(None);
        }
        let name = path
            .file_name()
            .ok_or_else(|| ArchPostError::backup(path, "path has no file name"))?;

        if self.dry_run {
            tracing::info!("[DRY-RUN] Would back up {}", path.display());
            return Ok(None);
        }

        let dir = self.ensure_active_dir()?;
        let mut saved_name = name.to_os_string();
        saved_name.push(BACKUP_SUFFIX);
        let dest = dir.join(saved_name);

        let mut saved = self.saved.borrow_mut();
        if let Some(original) = saved.get(name) {
            if original == path {
                tracing::debug!("{:?} already saved in this run", path);
                return Ok(Some(dest));
            }
            return Err(ArchPostError::backup(
                path,
                format!("{} was already saved under the same name", original.display()),
            ));
        }

        fs::copy(path, &dest).map_err(|e| ArchPostError::backup(path, e.to_string()))?;
        saved.insert(name.to_os_string(), path.to_path_buf());
        tracing::info!("Backed up {} -> {}", path.display(), dest.display());
        Ok(Some(dest))
    }

    fn ensure_active_dir(&self) -> Result<&Path> {
        if let Some(dir) = self.active.get() {
            return Ok(dir.as_path());
        }

        // A second run within the same second gets its own directory
        let mut candidate = self.root.join(&self.run_id);
        let mut n = 1;
        while candidate.exists() {
            candidate = self.root.join(format!("{}-{:03}", self.run_id, n));
            n += 1;
        }
        fs::create_dir_all(&candidate)
            .map_err(|e| ArchPostError::backup(&candidate, e.to_string()))?;
        tracing::debug!("Created snapshot directory {:?}", candidate);

        Ok(self.active.get_or_init(|| candidate).as_path())
    }

    /// Newest snapshot directory by name: timestamp, then zero-padded suffix
    pub fn latest_snapshot(&self) -> Option<PathBuf> {
        let entries = fs::read_dir(&self.root).ok()?;
        entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .map(|entry| entry.path())
            .max_by(|a, b| a.file_name().cmp(&b.file_name()))
    }

    /// Pair each saved file of `snapshot` with the recognized location it
    /// belongs to. Unrecognized files are skipped.
    pub fn restore_plan(&self, snapshot: &Path) -> Result<Vec<(PathBuf, PathBuf)>> {
        let mut plan = Vec::new();
        for entry in fs::read_dir(snapshot)? {
            let saved = entry?.path();
            let Some(original_name) = saved
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_suffix(BACKUP_SUFFIX))
            else {
                continue;
            };

            match self
                .recognized
                .iter()
                .find(|target| target.file_name().and_then(|n| n.to_str()) == Some(original_name))
            {
                Some(target) => plan.push((saved.clone(), target.clone())),
                None => tracing::warn!(
                    "No known location for {}, leaving it in the snapshot",
                    saved.display()
                ),
            }
        }
        plan.sort();
        Ok(plan)
    }

    /// Restore the newest snapshot after asking the operator.
    ///
    /// On success the state store is cleared: restored files undo work that
    /// completed steps did. Returns `false` when there is nothing to restore,
    /// the operator declines, or the run is a dry-run.
    pub fn restore(
        &self,
        gate: &mut ConfirmationGate,
        state: &mut StateStore,
        shell: &Shell,
    ) -> Result<bool> {
        let Some(snapshot) = self.latest_snapshot() else {
            tracing::info!("No backup snapshots found in {}", self.root.display());
            return Ok(false);
        };

        let plan = self.restore_plan(&snapshot)?;
        if plan.is_empty() {
            tracing::warn!("Snapshot {} holds no restorable files", snapshot.display());
            return Ok(false);
        }

        tracing::info!("Latest snapshot: {}", snapshot.display());
        for (saved, target) in &plan {
            tracing::info!("  {} -> {}", saved.display(), target.display());
        }

        let prompt = format!(
            "Restore {} file(s) and forget all completed steps?",
            plan.len()
        );
        if !gate.ask(&prompt, false)? {
            tracing::info!("Restore declined, nothing changed");
            return Ok(false);
        }

        if self.dry_run {
            tracing::info!("[DRY-RUN] Would restore {} file(s) and clear the state file", plan.len());
            return Ok(false);
        }

        for (saved, target) in &plan {
            restore_file(saved, target, shell)?;
        }

        state.reset()?;
        tracing::info!(
            "Restored {} file(s); all steps will run again on the next invocation",
            plan.len()
        );
        Ok(true)
    }
}

/// Copy `saved` over `target`, going through sudo for root-owned locations.
fn restore_file(saved: &Path, target: &Path, shell: &Shell) -> Result<()> {
    match fs::copy(saved, target) {
        Ok(_) => {}
        Err(e) if e.kind() == ErrorKind::PermissionDenied => {
            shell
                .run_privileged("cp", &[saved.as_os_str(), target.as_os_str()])
                .and_then(|out| out.ensure_success("cp"))
                .map_err(|e| ArchPostError::backup(target, e.to_string()))?;
        }
        Err(e) => return Err(ArchPostError::backup(target, e.to_string())),
    }
    tracing::info!("Restored {}", target.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confirm::Prompter;
    use tempfile::tempdir;

    struct Always(bool);

    impl Prompter for Always {
        fn confirm(&mut self, _prompt: &str, _default_yes: bool) -> Result<bool> {
            Ok(self.0)
        }
    }

    fn vault(root: &Path, run_id: &str, recognized: Vec<PathBuf>) -> BackupVault {
        BackupVault::new(root, run_id, false, recognized)
    }

    #[test]
    fn test_missing_file_is_noop() {
        let dir = tempdir().unwrap();
        let v = vault(&dir.path().join("backups"), "20250101_000000", vec![]);
        assert!(v.snapshot(&dir.path().join("absent")).unwrap().is_none());
        assert!(v.active_snapshot().is_none());
        assert!(!dir.path().join("backups").exists());
    }

    #[test]
    fn test_snapshot_saves_once_per_run() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("pacman.conf");
        fs::write(&file, "original").unwrap();

        let v = vault(&dir.path().join("backups"), "20250101_000000", vec![]);
        let saved = v.snapshot(&file).unwrap().unwrap();
        assert_eq!(saved.file_name().unwrap(), "pacman.conf.bak");

        fs::write(&file, "modified by a step").unwrap();
        let again = v.snapshot(&file).unwrap().unwrap();
        assert_eq!(saved, again);
        assert_eq!(fs::read_to_string(&saved).unwrap(), "original");
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let dir = tempdir().unwrap();
        let file = dir.path().join(".zshrc");
        fs::write(&file, "x").unwrap();
        let root = dir.path().join("backups");

        let v = BackupVault::new(&root, "20250101_000000", true, vec![]);
        assert!(v.snapshot(&file).unwrap().is_none());
        assert!(!root.exists());
    }

    #[test]
    fn test_same_second_runs_get_distinct_directories() {
        let dir = tempdir().unwrap();
        let file = dir.path().join(".bashrc");
        fs::write(&file, "x").unwrap();
        let root = dir.path().join("backups");

        let first = vault(&root, "20250101_000000", vec![]);
        first.snapshot(&file).unwrap();
        let second = vault(&root, "20250101_000000", vec![]);
        second.snapshot(&file).unwrap();

        assert_ne!(first.active_snapshot(), second.active_snapshot());
        assert_eq!(second.latest_snapshot().as_deref(), second.active_snapshot());
    }

    #[test]
    fn test_same_name_from_other_directory_is_refused() {
        let dir = tempdir().unwrap();
        let etc = dir.path().join("etc");
        let home = dir.path().join("home");
        fs::create_dir_all(&etc).unwrap();
        fs::create_dir_all(&home).unwrap();
        fs::write(etc.join("config"), "system").unwrap();
        fs::write(home.join("config"), "user").unwrap();

        let v = vault(&dir.path().join("backups"), "20250101_000000", vec![]);
        let saved = v.snapshot(&etc.join("config")).unwrap().unwrap();
        let err = v.snapshot(&home.join("config")).unwrap_err();

        assert!(err.to_string().contains("same name"));
        assert_eq!(fs::read_to_string(&saved).unwrap(), "system");
    }

    #[test]
    fn test_latest_snapshot_orders_numeric_suffixes() {
        let dir = tempdir().unwrap();
        let file = dir.path().join(".bashrc");
        fs::write(&file, "x").unwrap();
        let root = dir.path().join("backups");

        let mut last = None;
        for _ in 0..12 {
            let v = vault(&root, "20250101_000000", vec![]);
            v.snapshot(&file).unwrap();
            last = v.active_snapshot().map(Path::to_path_buf);
        }

        let last = last.unwrap();
        assert_eq!(last, root.join("20250101_000000-011"));
        assert_eq!(vault(&root, "x", vec![]).latest_snapshot().unwrap(), last);
    }

    #[test]
    fn test_latest_snapshot_by_timestamp() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("backups");
        fs::create_dir_all(root.join("20250101_000000")).unwrap();
        fs::create_dir_all(root.join("20250301_000000")).unwrap();
        fs::create_dir_all(root.join("20250201_000000")).unwrap();

        let v = vault(&root, "x", vec![]);
        assert_eq!(v.latest_snapshot().unwrap(), root.join("20250301_000000"));
    }

    #[test]
    fn test_restore_overwrites_and_clears_state() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("pacman.conf");
        fs::write(&target, "original").unwrap();
        let root = dir.path().join("backups");

        let v = vault(&root, "20250101_000000", vec![target.clone()]);
        v.snapshot(&target).unwrap();
        fs::write(&target, "tweaked").unwrap();

        let mut state = StateStore::open(dir.path().join("completed_steps"));
        state.mark_completed("pacman_tweaks").unwrap();
        let mut gate = ConfirmationGate::new(false, Box::new(Always(true)));

        let restored = v.restore(&mut gate, &mut state, &Shell::new(false)).unwrap();
        assert!(restored);
        assert_eq!(fs::read_to_string(&target).unwrap(), "original");
        assert!(!state.is_completed("pacman_tweaks"));
        assert!(!dir.path().join("completed_steps").exists());
    }

    #[test]
    fn test_restore_declined_changes_nothing() {
        let dir = tempdir().unwrap();
        let target = dir.path().join(".zshrc");
        fs::write(&target, "original").unwrap();
        let v = vault(&dir.path().join("backups"), "20250101_000000", vec![target.clone()]);
        v.snapshot(&target).unwrap();
        fs::write(&target, "changed").unwrap();

        let mut state = StateStore::open(dir.path().join("completed_steps"));
        state.mark_completed("shell_config").unwrap();
        let mut gate = ConfirmationGate::new(false, Box::new(Always(false)));

        assert!(!v.restore(&mut gate, &mut state, &Shell::new(false)).unwrap());
        assert_eq!(fs::read_to_string(&target).unwrap(), "changed");
        assert!(state.is_completed("shell_config"));
    }

    #[test]
    fn test_restore_without_snapshot_returns_false() {
        let dir = tempdir().unwrap();
        let v = vault(&dir.path().join("backups"), "x", vec![]);
        let mut state = StateStore::open(dir.path().join("completed_steps"));
        let mut gate = ConfirmationGate::new(false, Box::new(Always(true)));
        assert!(!v.restore(&mut gate, &mut state, &Shell::new(false)).unwrap());
    }

    #[test]
    fn test_unrecognized_files_are_not_planned() {
        let dir = tempdir().unwrap();
        let snapshot = dir.path().join("20250101_000000");
        fs::create_dir_all(&snapshot).unwrap();
        fs::write(snapshot.join("pacman.conf.bak"), "a").unwrap();
        fs::write(snapshot.join("mystery.bak"), "b").unwrap();
        fs::write(snapshot.join("notes.txt"), "c").unwrap();

        let v = vault(dir.path(), "x", vec![PathBuf::from("/etc/pacman.conf")]);
        let plan = v.restore_plan(&snapshot).unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].1, PathBuf::from("/etc/pacman.conf"));
    }
}
