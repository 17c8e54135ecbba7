//! Sudo credential heartbeat.
//!
//! Long steps (a full system upgrade, an AUR build) can outlive the sudo
//! timestamp. A background thread refreshes it with `sudo -n -v` until the
//! keepalive is dropped. It never touches run state.

use std::process::{Command, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::process_guard::CommandProcessGroup;

/// Default refresh interval
pub const REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// Refreshes sudo credentials until dropped
pub struct SudoKeepalive {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl SudoKeepalive {
    /// Start refreshing every `interval`.
    pub fn start(interval: Duration) -> Self {
        Self::with_command(interval, || {
            Command::new("sudo")
                .args(["-n", "-v"])
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .in_new_process_group()
                .status()
                .map(|s| s.success())
                .unwrap_or(false)
        })
    }

    /// Start with a custom refresh action; returns false when refresh failed.
    pub fn with_command<F>(interval: Duration, refresh: F) -> Self
    where
        F: Fn() -> bool + Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<()>();
        let handle = std::thread::spawn(move || {
            loop {
                match rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        if !refresh() {
                            tracing::debug!("sudo credential refresh failed");
                        }
                    }
                    // Stop requested or keepalive dropped
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }
        });

        Self {
            stop: Some(tx),
            handle: Some(handle),
        }
    }

    /// Start unless running as root or under dry-run.
    pub fn for_run(dry_run: bool) -> Option<Self> {
        if dry_run || nix::unistd::geteuid().is_root() {
            return None;
        }
        tracing::debug!("Starting sudo keepalive");
        Some(Self::start(REFRESH_INTERVAL))
    }
}

impl Drop for SudoKeepalive {
    fn drop(&mut self) {
        if let Some(tx) = self.stop.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    #[test]
    fn test_refreshes_periodically() {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let keepalive = SudoKeepalive::with_command(Duration::from_millis(20), move || {
            seen.fetch_add(1, Ordering::SeqCst);
            true
        });

        let start = Instant::now();
        while count.load(Ordering::SeqCst) < 2 && start.elapsed() < Duration::from_secs(5) {
            std::thread::sleep(Duration::from_millis(10));
        }
        drop(keepalive);
        assert!(count.load(Ordering::SeqCst) >= 2);
    }

    #[test]
    fn test_drop_stops_thread_promptly() {
        let keepalive = SudoKeepalive::with_command(Duration::from_secs(3600), || true);
        let start = Instant::now();
        drop(keepalive);
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_not_started_under_dry_run() {
        assert!(SudoKeepalive::for_run(true).is_none());
    }
}
