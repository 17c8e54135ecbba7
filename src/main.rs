//! archpost - resumable post-install configuration for Arch Linux

use std::process::ExitCode;

use archpost::catalogue;
use archpost::cli::Cli;
use archpost::keepalive::SudoKeepalive;
use archpost::rollback::{RollbackHandler, Systemctl};
use archpost::runner::{RunStats, StepRunner};
use archpost::{
    BackupVault, ConfirmationGate, ExecutionContext, ProcessGuard, Result, Shell, StateStore,
    logging, modes, process_guard, sanity,
};

/// Main application entry point
fn main() -> ExitCode {
    let cli = Cli::parse_args();

    let ctx = match ExecutionContext::from_cli(&cli) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("✗ {}", e);
            return exit_code(e.exit_code());
        }
    };

    // --list is read-only and gets no log file
    let log_file = (!cli.list).then(|| ctx.log_file());
    if let Err(e) = logging::init(log_file) {
        eprintln!("✗ Cannot open log file {}: {}", ctx.log_file().display(), e);
        return exit_code(2);
    }

    if let Err(e) = process_guard::init_signal_handlers() {
        tracing::warn!("Failed to initialize signal handlers: {}", e);
    }
    let _guard = ProcessGuard::new();

    let code = match dispatch(&cli, &ctx) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("✗ {}", e);
            e.exit_code()
        }
    };
    exit_code(code)
}

fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}

/// Run the mode selected on the command line; returns the exit code.
fn dispatch(cli: &Cli, ctx: &ExecutionContext) -> Result<i32> {
    let steps = catalogue::builtin();
    let shell = Shell::new(ctx.dry_run());
    let mut state = StateStore::open(ctx.state_file());
    let vault = BackupVault::for_context(ctx, catalogue::recognized_backup_files());
    let mut gate = ConfirmationGate::interactive(ctx.dry_run());

    if cli.list {
        for line in modes::list_steps(ctx, &steps, &state)? {
            println!("{}", line);
        }
        return Ok(0);
    }

    if cli.reset_state {
        modes::reset_state(ctx, &mut gate, &mut state)?;
        return Ok(0);
    }

    if cli.restore {
        vault.restore(&mut gate, &mut state, &shell)?;
        return Ok(0);
    }

    let runner = StepRunner::new(ctx, &steps)?;
    sanity::run_preflight_checks(ctx.dry_run(), &shell)?;
    let _keepalive = SudoKeepalive::for_run(ctx.dry_run());

    tracing::info!("archpost {} (run {})", env!("CARGO_PKG_VERSION"), ctx.run_id());
    tracing::debug!("State file: {}", ctx.state_file().display());
    tracing::debug!("Backups:    {}", ctx.backup_dir().display());

    match runner.run(&mut state, &mut gate, &vault, &shell) {
        Ok(stats) => {
            report_finished(ctx, &stats, &gate);
            Ok(0)
        }
        Err(aborted) if aborted.is_interrupted() => {
            tracing::warn!(
                "Interrupted during '{}'. Completed steps are kept; run again to resume.",
                aborted.display_name
            );
            Ok(aborted.exit_code())
        }
        Err(aborted) => {
            tracing::error!("✗ Aborted: {}", aborted);
            aborted.stats.log_summary();
            let mut control = Systemctl::new(&shell);
            RollbackHandler::new(ctx, &vault).execute(&aborted.stats.services, &mut control);
            Ok(aborted.exit_code())
        }
    }
}

fn report_finished(ctx: &ExecutionContext, stats: &RunStats, gate: &ConfirmationGate) {
    stats.log_summary();

    let simulated = gate.simulated_prompts();
    if !simulated.is_empty() {
        tracing::info!("[DRY-RUN] {} prompt(s) auto-approved:", simulated.len());
        for prompt in simulated {
            tracing::info!("  - {}", prompt);
        }
    }
    if ctx.dry_run() {
        tracing::info!("[DRY-RUN] No changes were made");
    }
    tracing::info!("Log file: {}", ctx.log_file().display());
}
