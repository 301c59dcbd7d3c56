// src/lib.rs

pub mod cli;
pub mod config;
pub mod errors;
pub mod events;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod relay;

use std::io::Write;

use anyhow::{Context, Result};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::{load_and_validate, resolve_from_env};
use crate::events::SupervisorEvent;
use crate::exec::Supervisor;
use crate::relay::ClientMessage;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading (file, environment, CLI)
/// - the supervisor and its worker
/// - the console relay for script output
/// - Ctrl-C handling (interrupts the run)
///
/// Returns the exit code the binary should exit with.
pub async fn run(args: CliArgs) -> Result<i32> {
    let file = match &args.config {
        Some(path) => Some(
            load_and_validate(path).with_context(|| format!("loading config file {:?}", path))?,
        ),
        None => None,
    };
    let config = resolve_from_env(file.as_ref(), &args.overrides())?;
    let supervisor = Supervisor::new(config);

    if args.check {
        print_check(&supervisor);
        return Ok(0);
    }

    if args.source {
        print!("{}", supervisor.read_source_code());
        return Ok(0);
    }

    if !supervisor.interpreter_exists() {
        warn!(interpreter = ?supervisor.interpreter(), "interpreter does not exist");
    }
    if !supervisor.script_path_exists() {
        warn!(script = ?supervisor.script_path(), "script does not exist");
    }

    let mut messages = relay::attach(&supervisor);
    let mut events = supervisor.subscribe();
    supervisor.start();

    // Ctrl-C → interrupt the run.
    {
        let supervisor = supervisor.clone();
        tokio::spawn(async move {
            loop {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    eprintln!("failed to listen for Ctrl+C: {e}");
                    return;
                }
                info!("Ctrl-C received; interrupting");
                supervisor.interrupt();
            }
        });
    }

    supervisor.execute();

    loop {
        tokio::select! {
            Some(msg) = messages.recv() => write_message(&msg),
            event = events.recv() => match event {
                Ok(SupervisorEvent::AfterProcess) => break,
                Ok(SupervisorEvent::Interrupted) if !supervisor.running() => break,
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!(skipped = n, "console relay lagged behind events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
    drain_messages(&mut messages);

    let code = process_exit_code(supervisor.last_exit_code());
    info!(
        exit_code = ?supervisor.last_exit_code(),
        run_time_secs = ?supervisor.last_run_time_seconds(),
        interrupted = supervisor.interrupted(),
        "run finished"
    );

    supervisor.shutdown().await;
    Ok(code)
}

/// Exit code for the binary: the script's own code, `128 + n` when it was
/// killed by signal `n`, and 1 when there is none.
pub fn process_exit_code(last_exit_code: Option<i32>) -> i32 {
    match last_exit_code {
        Some(code) if code >= 0 => code,
        Some(signal) => 128 + signal.saturating_neg(),
        None => 1,
    }
}

fn drain_messages(messages: &mut mpsc::UnboundedReceiver<ClientMessage>) {
    while let Ok(msg) = messages.try_recv() {
        write_message(&msg);
    }
}

fn write_message(msg: &ClientMessage) {
    match msg {
        ClientMessage::StdoutWrite(text) => {
            let mut out = std::io::stdout().lock();
            let _ = out.write_all(text.as_bytes());
            let _ = out.flush();
        }
        ClientMessage::StderrWrite(text) => {
            let mut err = std::io::stderr().lock();
            let _ = err.write_all(text.as_bytes());
            let _ = err.flush();
        }
        other => debug!(message = other.name(), ?other, "client message"),
    }
}

/// `--check` output: resolved settings plus existence checks.
fn print_check(supervisor: &Supervisor) {
    let yes_no = |b: bool| if b { "yes" } else { "no" };

    println!("script-runner check");
    println!(
        "  interpreter = {} (exists: {})",
        supervisor.interpreter().display(),
        yes_no(supervisor.interpreter_exists())
    );
    println!(
        "  script      = {} (exists: {})",
        supervisor.script_path().display(),
        yes_no(supervisor.script_path_exists())
    );
    println!(
        "  user        = {} (sudo: {})",
        supervisor.user(),
        yes_no(supervisor.needs_sudo())
    );
    println!("  command     = {}", supervisor.invocation());

    debug!("check complete (no execution)");
}
