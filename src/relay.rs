// src/relay.rs

//! Mapping between the supervisor and UI clients.
//!
//! A transport (websocket server, console, ...) calls [`attach`] once during
//! startup and forwards the resulting [`ClientMessage`]s to its clients. New
//! clients get [`connect_snapshot`]; button clicks go to [`handle_action`].

use std::fmt;
use std::str::FromStr;

use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::events::{EventKind, StreamId, SupervisorEvent};
use crate::exec::Supervisor;

/// A UI button.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Execute,
    Interrupt,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Execute => "execute",
            Action::Interrupt => "interrupt",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "execute" => Ok(Action::Execute),
            "interrupt" => Ok(Action::Interrupt),
            other => Err(format!(
                "invalid action code: {other} (expected \"execute\" or \"interrupt\")"
            )),
        }
    }
}

/// How a button is drawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionButton {
    pub action: Action,
    pub caption: &'static str,
    pub disabled: bool,
    pub style: &'static str,
    pub icon: &'static str,
}

/// Message for connected clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    StdoutReset,
    StdoutWrite(String),
    StderrReset,
    StderrWrite(String),
    EnableAction(Action),
    DisableAction(Action),
    UpdateActions(Vec<ActionButton>),
}

impl ClientMessage {
    /// Message name on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            ClientMessage::StdoutReset => "stdout_reset",
            ClientMessage::StdoutWrite(_) => "stdout_write",
            ClientMessage::StderrReset => "stderr_reset",
            ClientMessage::StderrWrite(_) => "stderr_write",
            ClientMessage::EnableAction(_) => "enable_action",
            ClientMessage::DisableAction(_) => "disable_action",
            ClientMessage::UpdateActions(_) => "update_actions",
        }
    }
}

/// Client messages caused by one supervisor event.
pub fn messages_for(event: &SupervisorEvent) -> Vec<ClientMessage> {
    match event {
        SupervisorEvent::Execute => vec![
            ClientMessage::DisableAction(Action::Execute),
            ClientMessage::EnableAction(Action::Interrupt),
        ],
        SupervisorEvent::AfterProcess | SupervisorEvent::Interrupted => vec![
            ClientMessage::EnableAction(Action::Execute),
            ClientMessage::DisableAction(Action::Interrupt),
        ],
        SupervisorEvent::BufferLine { stream, line } => match stream {
            StreamId::Stdout => vec![ClientMessage::StdoutWrite(line.clone())],
            StreamId::Stderr => vec![ClientMessage::StderrWrite(line.clone())],
        },
        SupervisorEvent::BeforeProcess | SupervisorEvent::Exception(_) => Vec::new(),
    }
}

/// Register relay handlers on the supervisor's bus.
///
/// The receiver yields client messages in the order the events fired.
/// Exceptions are logged rather than forwarded.
pub fn attach(supervisor: &Supervisor) -> mpsc::UnboundedReceiver<ClientMessage> {
    let (tx, rx) = mpsc::unbounded_channel();

    for kind in [
        EventKind::Execute,
        EventKind::AfterProcess,
        EventKind::Interrupted,
        EventKind::BufferLine,
    ] {
        let tx = tx.clone();
        supervisor.on(kind, move |event| {
            for msg in messages_for(event) {
                if tx.send(msg).is_err() {
                    debug!(event = %kind, "relay receiver dropped; discarding message");
                    break;
                }
            }
            Ok(())
        });
    }

    supervisor.on(EventKind::Exception, |event| {
        if let SupervisorEvent::Exception(err) = event {
            error!(error = %format!("{err:#}"), "script run raised an exception");
        }
        Ok(())
    });

    rx
}

/// Button states for the given busy flag.
pub fn action_buttons(busy: bool) -> Vec<ActionButton> {
    vec![
        ActionButton {
            action: Action::Execute,
            caption: "Execute",
            disabled: busy,
            style: "success",
            icon: "bolt",
        },
        ActionButton {
            action: Action::Interrupt,
            caption: "Interrupt",
            disabled: !busy,
            style: "danger",
            icon: "hand",
        },
    ]
}

/// Messages that bring a newly connected client up to date.
pub fn connect_snapshot(supervisor: &Supervisor) -> Vec<ClientMessage> {
    vec![
        ClientMessage::StdoutReset,
        ClientMessage::StdoutWrite(supervisor.stdout()),
        ClientMessage::StderrReset,
        ClientMessage::StderrWrite(supervisor.stderr()),
        ClientMessage::UpdateActions(action_buttons(supervisor.busy())),
    ]
}

/// Dispatch a button click. Returns whether the supervisor acted on it.
pub fn handle_action(supervisor: &Supervisor, action: Action) -> bool {
    match action {
        Action::Execute => supervisor.execute(),
        Action::Interrupt => supervisor.interrupt(),
    }
}
