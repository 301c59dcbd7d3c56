// src/exec/process_runner.rs

//! One run: spawn the script, drain its output, collect the exit code.

use std::process::ExitStatus;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::errors::RunnerError;
use crate::events::{StreamId, SupervisorEvent};

use super::supervisor::Shared;

/// Run the configured script once and finalize the run.
///
/// Failures are reported through the `exception` event; the finalization
/// sequence (`interrupted` if applicable, then `after-process`) always
/// happens.
pub(crate) async fn run_once(shared: Arc<Shared>, mut kill_rx: oneshot::Receiver<()>) {
    if let Err(err) = run_process(&shared, &mut kill_rx).await {
        error!(error = %format!("{err:#}"), "script execution error");
        shared.emit(SupervisorEvent::Exception(Arc::new(err)));
    }
    finalize(&shared);
}

async fn run_process(shared: &Arc<Shared>, kill_rx: &mut oneshot::Receiver<()>) -> Result<()> {
    shared
        .bus
        .trigger(&SupervisorEvent::BeforeProcess)
        .context("before-process handler failed")?;

    let invocation = shared.invocation();
    info!(command = %invocation, user = %shared.effective_user(), "starting script process");

    let mut child = invocation.to_command().spawn().map_err(|source| RunnerError::Spawn {
        program: invocation.program.to_string_lossy().into_owned(),
        source,
    })?;
    debug!(pid = ?child.id(), "script process spawned");

    let stdout = child.stdout.take().context("stdout pipe missing")?;
    let stderr = child.stderr.take().context("stderr pipe missing")?;

    let stdout_task = tokio::spawn(drain_stream(Arc::clone(shared), StreamId::Stdout, stdout));
    let stderr_task = tokio::spawn(drain_stream(Arc::clone(shared), StreamId::Stderr, stderr));

    let drain = async {
        let (out, err) = tokio::join!(stdout_task, stderr_task);
        out.context("stdout reader task failed")?;
        err.context("stderr reader task failed")?;
        Ok::<(), anyhow::Error>(())
    };
    tokio::pin!(drain);

    let mut kill_pending = true;

    // Both streams must be fully drained before we wait on the process, or a
    // chatty child can block on a full pipe forever.
    tokio::select! {
        res = &mut drain => res?,
        signal = &mut *kill_rx, if kill_pending => {
            kill_pending = false;
            kill_child(&mut child, signal);
            (&mut drain).await?;
        }
    }

    // A child may close its pipes and keep running; stay interruptible.
    let status = tokio::select! {
        status = child.wait() => status.context("waiting for script process")?,
        signal = &mut *kill_rx, if kill_pending => {
            kill_child(&mut child, signal);
            child.wait().await.context("waiting for killed script process")?
        }
    };

    let code = exit_code(status);
    {
        // The process is gone; a late interrupt has nothing left to kill.
        let mut st = shared.lock_state();
        st.last_exit_code = code;
        st.kill = None;
    }
    info!(exit_code = ?code, success = status.success(), "script process exited");

    Ok(())
}

fn kill_child(child: &mut Child, signal: Result<(), oneshot::error::RecvError>) {
    match signal {
        Ok(()) => {
            info!(pid = ?child.id(), "killing script process");
            if kill_process_group(child) {
                return;
            }
            if let Err(e) = child.start_kill() {
                warn!(error = %e, "failed to kill script process");
            }
        }
        Err(e) => {
            // Kill switch dropped without a request; kill_on_drop still
            // covers the child.
            debug!(error = %e, "kill channel closed without interrupt");
        }
    }
}

/// SIGKILL the child's process group. Returns `false` when that was not
/// possible and the caller should fall back to killing the child alone.
#[cfg(unix)]
fn kill_process_group(child: &Child) -> bool {
    let Some(pid) = child.id() else {
        return false;
    };
    let rc = unsafe { libc::killpg(pid as libc::pid_t, libc::SIGKILL) };
    if rc != 0 {
        let err = std::io::Error::last_os_error();
        debug!(pid, error = %err, "killpg failed; killing process only");
        return false;
    }
    true
}

#[cfg(not(unix))]
fn kill_process_group(_child: &Child) -> bool {
    false
}

/// Read `reader` line by line into the stream's buffer, emitting
/// `buffer-line` for each line. A stream torn down by a kill just ends the
/// loop.
async fn drain_stream<R>(shared: Arc<Shared>, stream: StreamId, reader: R)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut raw = Vec::new();

    loop {
        raw.clear();
        match reader.read_until(b'\n', &mut raw).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&raw).into_owned();
                shared.buffer(stream).append(&line);
                shared.emit(SupervisorEvent::BufferLine { stream, line });
            }
            Err(e) => {
                debug!(stream = stream.id(), error = %e, "output stream closed abruptly");
                break;
            }
        }
    }

    debug!(stream = stream.id(), "output reader finished");
}

/// Exit code as reported to callers; a process killed by signal `n` reports
/// `-n`.
pub fn exit_code(status: ExitStatus) -> Option<i32> {
    if let Some(code) = status.code() {
        return Some(code);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return Some(-signal);
        }
    }
    None
}

/// Closing sequence of every run: record the run time, then emit
/// `interrupted` (if the run was interrupted) and `after-process`.
pub(crate) fn finalize(shared: &Shared) {
    let interrupted = {
        let mut st = shared.lock_state();
        if let Some(started) = st.run_started.take() {
            st.last_run_time = Some(started.elapsed().as_secs_f64());
        }
        st.kill = None;
        st.interrupted
    };

    if interrupted {
        shared.emit(SupervisorEvent::Interrupted);
    }
    shared.emit(SupervisorEvent::AfterProcess);
}
