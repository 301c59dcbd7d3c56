// src/events/mod.rs

//! Supervisor notifications.
//!
//! - [`SupervisorEvent`] is the typed payload handed to subscribers.
//! - [`EventKind`] is its name; handlers are registered per kind on the
//!   [`EventBus`].

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

pub mod bus;

pub use bus::{EventBus, Handler};

/// Which output stream a captured line came from.
///
/// The numeric ids (1 = stdout, 2 = stderr) are what UI clients receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamId {
    Stdout,
    Stderr,
}

impl StreamId {
    pub fn id(self) -> u8 {
        match self {
            StreamId::Stdout => 1,
            StreamId::Stderr => 2,
        }
    }
}

impl TryFrom<u8> for StreamId {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(StreamId::Stdout),
            2 => Ok(StreamId::Stderr),
            other => Err(format!("invalid buffer key ({other})")),
        }
    }
}

/// Everything the supervisor announces while it works.
#[derive(Debug, Clone)]
pub enum SupervisorEvent {
    /// A run was requested and armed.
    Execute,
    /// The process is about to be spawned.
    BeforeProcess,
    /// One line (newline included, if any) was read from a stream.
    BufferLine { stream: StreamId, line: String },
    /// The run was interrupted, before or during execution.
    Interrupted,
    /// The run concluded, successfully or not.
    AfterProcess,
    /// The run procedure failed.
    Exception(Arc<anyhow::Error>),
}

impl SupervisorEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            SupervisorEvent::Execute => EventKind::Execute,
            SupervisorEvent::BeforeProcess => EventKind::BeforeProcess,
            SupervisorEvent::BufferLine { .. } => EventKind::BufferLine,
            SupervisorEvent::Interrupted => EventKind::Interrupted,
            SupervisorEvent::AfterProcess => EventKind::AfterProcess,
            SupervisorEvent::Exception(_) => EventKind::Exception,
        }
    }
}

/// Event name used as the registration key on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Execute,
    BeforeProcess,
    BufferLine,
    Interrupted,
    AfterProcess,
    Exception,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        EventKind::Execute,
        EventKind::BeforeProcess,
        EventKind::BufferLine,
        EventKind::Interrupted,
        EventKind::AfterProcess,
        EventKind::Exception,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Execute => "execute",
            EventKind::BeforeProcess => "before-process",
            EventKind::BufferLine => "buffer-line",
            EventKind::Interrupted => "interrupted",
            EventKind::AfterProcess => "after-process",
            EventKind::Exception => "exception",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s.trim())
            .ok_or_else(|| format!("unknown event name: {s}"))
    }
}
