//! External command execution for step actions.
//!
//! Every command a step runs goes through [`Shell`]:
//!
//! - the child is registered with the global [`ChildRegistry`] so an
//!   interrupt can stop it
//! - commands attached to the terminal stay in archpost's foreground process
//!   group so prompts (sudo, chsh, makepkg) can read from it; captured
//!   queries get a group of their own
//! - under dry-run, commands that change the system are logged and reported
//!   as successful without being spawned
//! - read-only queries ([`Shell::capture`]) still execute under dry-run so the
//!   preview reflects the real machine
//! - privileged commands are prefixed with `sudo` unless archpost runs as root

use crate::process_guard::{ChildGroup, ChildRegistry, CommandProcessGroup};
use anyhow::{Context, Result};
use std::ffi::OsStr;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};

/// Output of one command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Captured standard output (empty for inherited stdio)
    pub stdout: String,
    /// Captured standard error (empty for inherited stdio)
    pub stderr: String,
    /// Exit code (None if terminated by signal)
    pub exit_code: Option<i32>,
    /// Whether the command exited with status 0
    pub success: bool,
    /// The command was only logged (dry-run)
    pub simulated: bool,
}

impl CommandOutput {
    fn simulated() -> Self {
        Self {
            stdout: String::new(),
            stderr: String::new(),
            exit_code: Some(0),
            success: true,
            simulated: true,
        }
    }

    /// Return an error describing the failure unless the command succeeded.
    pub fn ensure_success(&self, what: &str) -> Result<()> {
        if self.success {
            return Ok(());
        }
        let code = self.exit_code.unwrap_or(-1);
        if self.stderr.trim().is_empty() {
            anyhow::bail!("{} failed (exit code {})", what, code)
        }
        anyhow::bail!("{} failed (exit code {}): {}", what, code, self.stderr.trim())
    }
}

/// Dry-run aware command runner.
#[derive(Debug, Clone)]
pub struct Shell {
    dry_run: bool,
    elevate: bool,
}

impl Shell {
    /// Runner for the current process; elevates with `sudo` when not root.
    pub fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            elevate: !nix::unistd::geteuid().is_root(),
        }
    }

    /// True when system-changing commands are only logged
    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    /// Run a system-changing command with the terminal attached.
    pub fn run<S: AsRef<OsStr>>(&self, program: &str, args: &[S]) -> Result<CommandOutput> {
        self.run_inherited(None, program, args)
    }

    /// Like [`Shell::run`], with `dir` as working directory.
    pub fn run_in<S: AsRef<OsStr>>(
        &self,
        dir: &Path,
        program: &str,
        args: &[S],
    ) -> Result<CommandOutput> {
        self.run_inherited(Some(dir), program, args)
    }

    fn run_inherited<S: AsRef<OsStr>>(
        &self,
        dir: Option<&Path>,
        program: &str,
        args: &[S],
    ) -> Result<CommandOutput> {
        let rendered = match dir {
            Some(dir) => format!("(cd {}) {}", dir.display(), render(program, args)),
            None => render(program, args),
        };
        if self.dry_run {
            tracing::info!("[DRY-RUN] Would run: {}", rendered);
            return Ok(CommandOutput::simulated());
        }

        tracing::info!("$ {}", rendered);
        let mut cmd = Command::new(program);
        if let Some(dir) = dir {
            cmd.current_dir(dir);
        }
        cmd.args(args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .in_foreground_group();

        let child = cmd
            .spawn()
            .with_context(|| format!("Failed to spawn: {}", rendered))?;
        let status = wait_tracked(child, &rendered)?;

        Ok(CommandOutput {
            stdout: String::new(),
            stderr: String::new(),
            exit_code: status.code(),
            success: status.success(),
            simulated: false,
        })
    }

    /// Run a system-changing command as root.
    pub fn run_privileged<S: AsRef<OsStr>>(
        &self,
        program: &str,
        args: &[S],
    ) -> Result<CommandOutput> {
        if !self.elevate {
            return self.run(program, args);
        }
        let mut sudo_args: Vec<&OsStr> = Vec::with_capacity(args.len() + 1);
        sudo_args.push(OsStr::new(program));
        for arg in args {
            sudo_args.push(arg.as_ref());
        }
        self.run("sudo", &sudo_args)
    }

    /// Run a read-only query and capture its output. Executes under dry-run.
    pub fn capture<S: AsRef<OsStr>>(&self, program: &str, args: &[S]) -> Result<CommandOutput> {
        let rendered = render(program, args);
        tracing::debug!("Query: {}", rendered);

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .in_new_process_group()
            .spawn()
            .with_context(|| format!("Failed to spawn: {}", rendered))?;

        let pid = child.id();
        register(pid, ChildGroup::Own);
        let output = child.wait_with_output();
        unregister(pid);
        let output = output.with_context(|| format!("Failed waiting for: {}", rendered))?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code(),
            success: output.status.success(),
            simulated: false,
        })
    }

    /// True if `program` is found on PATH
    pub fn has_program(&self, program: &str) -> bool {
        let script = format!("command -v {}", program);
        self.capture("sh", &["-c", script.as_str()])
            .map(|out| out.success)
            .unwrap_or(false)
    }
}

fn wait_tracked(mut child: Child, rendered: &str) -> Result<ExitStatus> {
    let pid = child.id();
    register(pid, ChildGroup::Shared);
    let status = child.wait();
    unregister(pid);
    status.with_context(|| format!("Failed waiting for: {}", rendered))
}

fn register(pid: u32, group: ChildGroup) {
    if let Ok(mut registry) = ChildRegistry::global().lock() {
        registry.register(pid, group);
    }
}

fn unregister(pid: u32) {
    if let Ok(mut registry) = ChildRegistry::global().lock() {
        registry.unregister(pid);
    }
}

fn render<S: AsRef<OsStr>>(program: &str, args: &[S]) -> String {
    let mut line = program.to_string();
    for arg in args {
        line.push(' ');
        line.push_str(&arg.as_ref().to_string_lossy());
    }
    line
}
