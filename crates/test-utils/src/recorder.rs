use std::sync::{Arc, Mutex};

use script_runner::events::{EventKind, SupervisorEvent};
use script_runner::exec::Supervisor;

/// Comparable copy of a `SupervisorEvent`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recorded {
    Execute,
    BeforeProcess,
    BufferLine(u8, String),
    Interrupted,
    AfterProcess,
    Exception(String),
}

impl From<&SupervisorEvent> for Recorded {
    fn from(event: &SupervisorEvent) -> Self {
        match event {
            SupervisorEvent::Execute => Recorded::Execute,
            SupervisorEvent::BeforeProcess => Recorded::BeforeProcess,
            SupervisorEvent::BufferLine { stream, line } => {
                Recorded::BufferLine(stream.id(), line.clone())
            }
            SupervisorEvent::Interrupted => Recorded::Interrupted,
            SupervisorEvent::AfterProcess => Recorded::AfterProcess,
            SupervisorEvent::Exception(err) => Recorded::Exception(format!("{err:#}")),
        }
    }
}

/// Records every event a supervisor emits, in emission order.
#[derive(Clone, Default)]
pub struct EventRecorder {
    events: Arc<Mutex<Vec<Recorded>>>,
}

impl EventRecorder {
    /// Register a recording handler for every event kind.
    pub fn attach(supervisor: &Supervisor) -> Self {
        let recorder = Self::default();
        for kind in EventKind::ALL {
            let events = Arc::clone(&recorder.events);
            supervisor.on(kind, move |event| {
                events.lock().unwrap().push(Recorded::from(event));
                Ok(())
            });
        }
        recorder
    }

    pub fn events(&self) -> Vec<Recorded> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, wanted: &Recorded) -> usize {
        self.events().iter().filter(|e| *e == wanted).count()
    }

    pub fn contains(&self, wanted: &Recorded) -> bool {
        self.count(wanted) > 0
    }

    pub fn exceptions(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Recorded::Exception(msg) => Some(msg),
                _ => None,
            })
            .collect()
    }

    /// Wait until `wanted` has been recorded `n` times.
    pub async fn wait_for(&self, wanted: &Recorded, n: usize) {
        let what = format!("{n} x {wanted:?}");
        crate::wait_until(&what, || self.count(wanted) >= n).await;
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}
