// src/exec/worker_loop.rs

//! The persistent worker that turns armed triggers into runs.

use std::sync::Arc;

use anyhow::anyhow;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info};

use crate::events::SupervisorEvent;

use super::process_runner::{finalize, run_once};
use super::supervisor::Shared;

/// Spawn the background worker loop.
///
/// The worker sleeps on `shared.wake` until `execute()` (or shutdown)
/// notifies it, claims the trigger under the state lock, and runs the script
/// with the lock released. There is only ever one worker per supervisor.
///
/// Each run executes in its own Tokio task so that a panicking event handler
/// cannot take the worker down with it. A run that panics is still reported
/// as `exception` and finalized.
pub(crate) fn spawn_worker(shared: Arc<Shared>) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("execution worker started");

        loop {
            let claim = {
                let mut st = shared.lock_state();
                if st.shutdown {
                    break;
                }
                st.claim()
            };

            let Some(kill_rx) = claim else {
                shared.wake.notified().await;
                continue;
            };

            debug!("trigger claimed; starting run");
            let run = tokio::spawn(run_once(Arc::clone(&shared), kill_rx));
            if let Err(err) = run.await {
                error!(error = %err, "run task ended abnormally");
                finish_aborted_run(&shared, err).await;
            }

            shared.lock_state().release();
            debug!("run released; worker idle");
        }

        info!("execution worker stopped");
    })
}

/// Report and finalize a run whose task panicked. The cleanup runs in its
/// own task since the same handlers fire again.
async fn finish_aborted_run(shared: &Arc<Shared>, err: JoinError) {
    let shared = Arc::clone(shared);
    let cleanup = tokio::spawn(async move {
        let err = anyhow!("script run aborted: {err}");
        shared.emit(SupervisorEvent::Exception(Arc::new(err)));
        finalize(&shared);
    });
    if let Err(err) = cleanup.await {
        error!(error = %err, "cleanup of aborted run failed");
    }
}
