//! Child process lifecycle.
//!
//! Step commands (pacman, makepkg, sbctl, ...) are tracked in a global
//! registry. Captured queries run in their own process group; commands that
//! share the terminal stay in archpost's group, which is the terminal's
//! foreground group, so they can read from it without being stopped by
//! SIGTTIN. When archpost is interrupted or exits, every tracked child gets
//! SIGTERM, a grace period, then SIGKILL, so no package transaction keeps
//! running behind the operator's back.
//!
//! Interrupts never trigger rollback: the process exits with `128 + signal`
//! and whatever was already recorded in the state file stays there.

use nix::libc;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};

static CHILD_REGISTRY: OnceLock<Arc<Mutex<ChildRegistry>>> = OnceLock::new();

/// Grace period between SIGTERM and SIGKILL on an interrupt
const INTERRUPT_GRACE: Duration = Duration::from_secs(3);

/// Grace period used when the guard is dropped
const EXIT_GRACE: Duration = Duration::from_secs(5);

/// Process group a tracked child runs in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildGroup {
    /// Leader of its own group; signalled as a group
    Own,
    /// Shares archpost's group; signalled by pid
    Shared,
}

/// Registry of running children
#[derive(Debug, Default)]
pub struct ChildRegistry {
    pids: HashMap<u32, ChildGroup>,
    /// Set once termination started; later calls are no-ops
    terminating: bool,
}

impl ChildRegistry {
    /// Global registry shared by every [`crate::shell::Shell`]
    pub fn global() -> Arc<Mutex<ChildRegistry>> {
        CHILD_REGISTRY
            .get_or_init(|| Arc::new(Mutex::new(ChildRegistry::default())))
            .clone()
    }

    /// Track a freshly spawned child
    pub fn register(&mut self, pid: u32, group: ChildGroup) {
        self.pids.insert(pid, group);
        tracing::debug!("Tracking child {} ({:?} group)", pid, group);
    }

    /// Stop tracking a child that exited on its own
    pub fn unregister(&mut self, pid: u32) {
        self.pids.remove(&pid);
        tracing::debug!("Child {} finished", pid);
    }

    /// Number of tracked children
    pub fn count(&self) -> usize {
        self.pids.len()
    }

    /// Terminate every tracked child.
    ///
    /// SIGTERM first, SIGKILL for children still alive after `grace`. Group
    /// leaders are signalled with their whole group.
    pub fn terminate_all(&mut self, grace: Duration) {
        if self.terminating {
            return;
        }
        self.terminating = true;

        if self.pids.is_empty() {
            return;
        }

        let targets: Vec<(u32, ChildGroup)> = self.pids.iter().map(|(&p, &g)| (p, g)).collect();
        tracing::info!("Stopping {} running command(s)...", targets.len());

        for &(pid, group) in &targets {
            signal_child(pid, group, Signal::SIGTERM);
        }

        let start = Instant::now();
        while start.elapsed() < grace {
            if targets.iter().all(|&(pid, _)| !is_process_alive(pid)) {
                self.pids.clear();
                return;
            }
            std::thread::sleep(Duration::from_millis(100));
        }

        for &(pid, group) in &targets {
            if is_process_alive(pid) {
                tracing::warn!("Command {} ignored SIGTERM, killing it", pid);
                signal_child(pid, group, Signal::SIGKILL);
            }
        }
        self.pids.clear();
    }
}

fn signal_child(pid: u32, group: ChildGroup, signal: Signal) {
    if group == ChildGroup::Own {
        match signal_group(pid, signal) {
            Ok(()) => return,
            Err(e) => tracing::debug!("{:?} to group {} failed ({}), signalling pid", signal, pid, e),
        }
    }
    let _ = signal_pid(pid, signal);
}

fn signal_pid(pid: u32, signal: Signal) -> Result<(), nix::Error> {
    signal::kill(Pid::from_raw(pid as i32), signal)
}

/// Negative pid addresses the whole process group
fn signal_group(pgid: u32, signal: Signal) -> Result<(), nix::Error> {
    signal::kill(Pid::from_raw(-(pgid as i32)), signal)
}

/// True if `pid` exists and is neither a zombie nor dead
fn is_process_alive(pid: u32) -> bool {
    if signal::kill(Pid::from_raw(pid as i32), None).is_err() {
        return false;
    }

    // Field 3 of /proc/<pid>/stat is the process state
    match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
        Ok(stat) => stat
            .split_whitespace()
            .nth(2)
            .is_none_or(|state| !matches!(state, "Z" | "X")),
        Err(_) => true,
    }
}

/// Terminates tracked children when dropped.
///
/// Held by `main` for the whole run so every exit path, including an early
/// `?` return, cleans up.
pub struct ProcessGuard {
    registry: Arc<Mutex<ChildRegistry>>,
}

impl ProcessGuard {
    /// Guard attached to the global registry
    pub fn new() -> Self {
        Self {
            registry: ChildRegistry::global(),
        }
    }

    /// Number of children currently tracked
    pub fn child_count(&self) -> usize {
        self.registry.lock().map(|r| r.count()).unwrap_or(0)
    }
}

impl Default for ProcessGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ProcessGuard {
    fn drop(&mut self) {
        if let Ok(mut registry) = self.registry.lock() {
            registry.terminate_all(EXIT_GRACE);
        }
    }
}

/// Install handlers for SIGINT, SIGTERM and SIGHUP.
///
/// The handler thread stops running commands and exits with `128 + signal`.
/// No rollback runs and the state file is left as is.
pub fn init_signal_handlers() -> Result<(), std::io::Error> {
    use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP])?;

    std::thread::spawn(move || {
        if let Some(sig) = signals.forever().next() {
            let name = match sig {
                SIGINT => "SIGINT",
                SIGTERM => "SIGTERM",
                SIGHUP => "SIGHUP",
                _ => "signal",
            };
            tracing::warn!(
                "Received {}: stopping. Completed steps are kept; run again to resume.",
                name
            );

            if let Ok(mut registry) = ChildRegistry::global().lock() {
                registry.terminate_all(INTERRUPT_GRACE);
            }
            std::process::exit(128 + sig);
        }
    });

    Ok(())
}

/// Process group placement for a [`std::process::Command`]
pub trait CommandProcessGroup {
    /// New process group, and SIGTERM to the child if archpost dies.
    ///
    /// Only for children that never read the terminal: a background group
    /// reading it is stopped by SIGTTIN.
    fn in_new_process_group(&mut self) -> &mut Self;

    /// Stay in archpost's (foreground) group, and SIGTERM to the child if
    /// archpost dies
    fn in_foreground_group(&mut self) -> &mut Self;
}

impl CommandProcessGroup for std::process::Command {
    fn in_new_process_group(&mut self) -> &mut Self {
        use std::os::unix::process::CommandExt;
        // SAFETY: the closure only makes async-signal-safe syscalls
        unsafe {
            self.pre_exec(|| {
                nix::unistd::setpgid(Pid::from_raw(0), Pid::from_raw(0))
                    .map_err(std::io::Error::other)?;
                set_parent_death_signal()
            });
        }
        self
    }

    fn in_foreground_group(&mut self) -> &mut Self {
        use std::os::unix::process::CommandExt;
        // SAFETY: prctl is async-signal-safe
        unsafe {
            self.pre_exec(set_parent_death_signal);
        }
        self
    }
}

fn set_parent_death_signal() -> std::io::Result<()> {
    // SAFETY: plain syscall, no memory is passed
    if unsafe { libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM) } == -1 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}
