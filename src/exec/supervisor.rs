// src/exec/supervisor.rs

//! The execution supervisor: public API and the state shared with the
//! worker.

use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Instant, SystemTime};

use tokio::sync::{Notify, broadcast, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::SupervisorConfig;
use crate::events::{EventBus, EventKind, StreamId, SupervisorEvent};
use crate::fs::{FileSystem, RealFileSystem};

use super::invocation::{Invocation, current_user, needs_privilege_switch};
use super::output_buffer::OutputBuffer;
use super::worker_loop::spawn_worker;

/// Mutable run state. Every field is guarded by [`Shared::state`].
#[derive(Debug, Default)]
pub(crate) struct RunState {
    /// A run was requested and has not started or been cancelled yet. Stays
    /// set while the run is in progress.
    pub(crate) triggered: bool,
    /// The worker is inside a run.
    pub(crate) running: bool,
    /// The current or most recent run was interrupted.
    pub(crate) interrupted: bool,
    pub(crate) shutdown: bool,
    /// Kill switch for the active run; present from the moment the worker
    /// claims a trigger until the run is finalized.
    pub(crate) kill: Option<oneshot::Sender<()>>,
    pub(crate) run_started: Option<Instant>,
    pub(crate) last_exit_code: Option<i32>,
    pub(crate) last_executed_at: Option<SystemTime>,
    pub(crate) last_run_time: Option<f64>,
}

impl RunState {
    pub(crate) fn busy(&self) -> bool {
        self.triggered || self.running
    }

    /// Move from `Triggered` to `Running`, handing the worker the receiving
    /// end of the kill switch.
    pub(crate) fn claim(&mut self) -> Option<oneshot::Receiver<()>> {
        if !self.triggered || self.running {
            return None;
        }
        let (tx, rx) = oneshot::channel();
        self.running = true;
        self.kill = Some(tx);
        Some(rx)
    }

    pub(crate) fn release(&mut self) {
        self.running = false;
        self.triggered = false;
        self.kill = None;
    }
}

/// State shared between callers, the worker and the reader tasks.
pub(crate) struct Shared {
    pub(crate) config: SupervisorConfig,
    pub(crate) current_user: String,
    pub(crate) bus: EventBus,
    pub(crate) state: Mutex<RunState>,
    /// Serializes `execute` / `interrupt` so their event emission happens
    /// outside the state lock but still in order.
    control: Mutex<()>,
    pub(crate) wake: Notify,
    pub(crate) stdout: OutputBuffer,
    pub(crate) stderr: OutputBuffer,
    fs: Arc<dyn FileSystem>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Shared {
    pub(crate) fn lock_state(&self) -> MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_control(&self) -> MutexGuard<'_, ()> {
        self.control.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn buffer(&self, stream: StreamId) -> &OutputBuffer {
        match stream {
            StreamId::Stdout => &self.stdout,
            StreamId::Stderr => &self.stderr,
        }
    }

    pub(crate) fn effective_user(&self) -> &str {
        self.config
            .run_as_user
            .as_deref()
            .unwrap_or(&self.current_user)
    }

    pub(crate) fn invocation(&self) -> Invocation {
        Invocation::build(
            &self.config.interpreter,
            &self.config.script_path,
            self.effective_user(),
            &self.current_user,
        )
    }

    /// Trigger an event, logging (not propagating) handler failures.
    pub(crate) fn emit(&self, event: SupervisorEvent) {
        let kind = event.kind();
        if let Err(err) = self.bus.trigger(&event) {
            warn!(event = %kind, error = %format!("{err:#}"), "event handler failed");
        }
    }
}

/// Owns the single script execution worker and its state.
///
/// Cheap to clone; all clones drive the same worker. Construct once during
/// startup, register handlers, then call [`Supervisor::start`] from inside a
/// Tokio runtime.
///
/// Handlers for `execute`, and for the `interrupted` event emitted when a
/// pending run is cancelled, run while `execute()` / `interrupt()` hold the
/// control lock: they may read state but must not call `execute()` or
/// `interrupt()` themselves.
#[derive(Clone)]
pub struct Supervisor {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("config", &self.shared.config)
            .field("user", &self.user())
            .field("state", &*self.shared.lock_state())
            .finish_non_exhaustive()
    }
}

impl Supervisor {
    /// Build a supervisor backed by the real filesystem. The worker is not
    /// started yet.
    pub fn new(config: SupervisorConfig) -> Self {
        Self::with_file_system(config, Arc::new(RealFileSystem))
    }

    pub fn with_file_system(config: SupervisorConfig, fs: Arc<dyn FileSystem>) -> Self {
        let capacity = config.buffer_capacity;
        let shared = Shared {
            current_user: current_user(),
            bus: EventBus::new(),
            state: Mutex::new(RunState::default()),
            control: Mutex::new(()),
            wake: Notify::new(),
            stdout: OutputBuffer::new(capacity),
            stderr: OutputBuffer::new(capacity),
            fs,
            worker: Mutex::new(None),
            config,
        };
        Self {
            shared: Arc::new(shared),
        }
    }

    /// [`Supervisor::new`] followed by [`Supervisor::start`].
    pub fn spawn(config: SupervisorConfig) -> Self {
        let supervisor = Self::new(config);
        supervisor.start();
        supervisor
    }

    /// Start the background worker. Calling it again, or after
    /// [`Supervisor::shutdown`], does nothing.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self) {
        let mut worker = self.shared.worker.lock().unwrap_or_else(|e| e.into_inner());
        if worker.is_some() || self.shared.lock_state().shutdown {
            return;
        }
        *worker = Some(spawn_worker(Arc::clone(&self.shared)));
    }

    /// Stop the worker, killing the active run if there is one, and wait for
    /// it to finish. A pending run that has not started is dropped.
    pub async fn shutdown(&self) {
        let kill = {
            let mut st = self.shared.lock_state();
            st.shutdown = true;
            if !st.running {
                st.triggered = false;
            }
            let kill = st.kill.take();
            if kill.is_some() {
                st.interrupted = true;
            }
            kill
        };

        if let Some(kill) = kill {
            info!("shutdown requested; killing active script process");
            let _ = kill.send(());
        }
        self.shared.wake.notify_one();

        let handle = self
            .shared
            .worker
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                warn!(error = %err, "execution worker ended abnormally");
            }
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.shared.bus
    }

    /// Register a handler for one event kind.
    pub fn on<F>(&self, kind: EventKind, handler: F)
    where
        F: Fn(&SupervisorEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.shared.bus.register(kind, handler);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SupervisorEvent> {
        self.shared.bus.subscribe()
    }

    /// Request a run. Returns immediately; the worker spawns the process.
    ///
    /// Dropped (returns `false`) while a run is pending or in progress.
    pub fn execute(&self) -> bool {
        let _control = self.shared.lock_control();
        {
            let mut st = self.shared.lock_state();
            if st.busy() || st.shutdown {
                debug!(
                    triggered = st.triggered,
                    running = st.running,
                    "execute ignored; supervisor busy"
                );
                return false;
            }
            st.run_started = Some(Instant::now());
            st.last_executed_at = Some(SystemTime::now());
            st.interrupted = false;
        }

        info!(script = ?self.shared.config.script_path, "execution requested");
        self.shared.emit(SupervisorEvent::Execute);

        self.shared.lock_state().triggered = true;
        self.shared.wake.notify_one();
        true
    }

    /// Interrupt the pending or running execution.
    ///
    /// - idle: nothing happens (returns `false`)
    /// - pending: the trigger is cleared and `interrupted` emitted right away
    /// - running: the process is killed; the worker finalizes the run
    ///
    /// Once the process has exited (or was already told to die) there is
    /// nothing left to kill: the call returns `false` and the run keeps its
    /// `interrupted` flag as it was.
    pub fn interrupt(&self) -> bool {
        enum Action {
            Cancel,
            Kill(oneshot::Sender<()>),
        }

        let _control = self.shared.lock_control();
        let action = {
            let mut st = self.shared.lock_state();
            if !st.triggered && !st.running {
                return false;
            }
            if !st.running {
                st.triggered = false;
                st.interrupted = true;
                Action::Cancel
            } else {
                let Some(kill) = st.kill.take() else {
                    debug!(interrupted = st.interrupted, "no live process to interrupt");
                    return false;
                };
                st.interrupted = true;
                Action::Kill(kill)
            }
        };

        match action {
            Action::Cancel => {
                info!("pending execution cancelled before start");
                self.shared.emit(SupervisorEvent::Interrupted);
            }
            Action::Kill(kill) => {
                info!("interrupt requested; killing script process");
                if kill.send(()).is_err() {
                    debug!("run finished before the kill signal arrived");
                }
            }
        }
        true
    }

    /// Full text of the configured script; empty if it is missing or
    /// unreadable.
    pub fn read_source_code(&self) -> String {
        let path = &self.shared.config.script_path;
        match self.shared.fs.read_to_string(path) {
            Ok(source) => source,
            Err(err) if err.kind() == io::ErrorKind::NotFound => String::new(),
            Err(err) => {
                warn!(path = ?path, error = %err, "script source read error");
                String::new()
            }
        }
    }

    pub fn stdout(&self) -> String {
        self.shared.stdout.contents()
    }

    pub fn stderr(&self) -> String {
        self.shared.stderr.contents()
    }

    pub fn output(&self, stream: StreamId) -> &OutputBuffer {
        self.shared.buffer(stream)
    }

    pub fn clear_output_standard(&self) {
        self.shared.stdout.clear();
    }

    pub fn clear_output_error(&self) {
        self.shared.stderr.clear();
    }

    pub fn clear_outputs(&self) {
        self.clear_output_standard();
        self.clear_output_error();
    }

    pub fn busy(&self) -> bool {
        self.shared.lock_state().busy()
    }

    pub fn running(&self) -> bool {
        self.shared.lock_state().running
    }

    pub fn interrupted(&self) -> bool {
        self.shared.lock_state().interrupted
    }

    pub fn last_executed_at(&self) -> Option<SystemTime> {
        self.shared.lock_state().last_executed_at
    }

    pub fn last_run_time_seconds(&self) -> Option<f64> {
        self.shared.lock_state().last_run_time
    }

    pub fn last_exit_code(&self) -> Option<i32> {
        self.shared.lock_state().last_exit_code
    }

    pub fn interpreter(&self) -> &Path {
        &self.shared.config.interpreter
    }

    pub fn interpreter_exists(&self) -> bool {
        self.shared.fs.exists(&self.shared.config.interpreter)
    }

    pub fn script_path(&self) -> &Path {
        &self.shared.config.script_path
    }

    pub fn script_path_exists(&self) -> bool {
        self.shared.fs.exists(&self.shared.config.script_path)
    }

    /// User the script runs as.
    pub fn user(&self) -> &str {
        self.shared.effective_user()
    }

    pub fn needs_sudo(&self) -> bool {
        needs_privilege_switch(self.shared.effective_user(), &self.shared.current_user)
    }

    /// Command line the next run will use.
    pub fn invocation(&self) -> Invocation {
        self.shared.invocation()
    }
}
