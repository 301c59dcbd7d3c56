// src/config/model.rs

use std::path::PathBuf;

use serde::Deserialize;

use crate::exec::output_buffer::DEFAULT_BUFFER_CAPACITY;

pub const DEFAULT_INTERPRETER: &str = "/bin/sh";

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [execution]
/// interpreter = "/bin/bash"
/// script = "/srv/jobs/nightly.sh"
/// user = "deploy"
/// buffer_capacity = 10000
/// ```
///
/// Every key is optional; environment variables and CLI flags override it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub execution: ExecutionSection,
}

/// `[execution]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExecutionSection {
    pub interpreter: Option<PathBuf>,
    pub script: Option<PathBuf>,
    /// Run the script as this user (via `sudo -u`). Defaults to whoever runs
    /// script-runner.
    pub user: Option<String>,
    /// Byte budget of each output buffer.
    pub buffer_capacity: Option<usize>,
}

/// Values layered over the file: one instance from the environment, one
/// from the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub interpreter: Option<PathBuf>,
    pub script: Option<PathBuf>,
    pub user: Option<String>,
}

/// Fully resolved, immutable settings the supervisor is built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorConfig {
    pub interpreter: PathBuf,
    pub script_path: PathBuf,
    /// `None` means "the current user".
    pub run_as_user: Option<String>,
    pub buffer_capacity: usize,
}

impl SupervisorConfig {
    pub fn new(interpreter: impl Into<PathBuf>, script_path: impl Into<PathBuf>) -> Self {
        Self {
            interpreter: interpreter.into(),
            script_path: script_path.into(),
            run_as_user: None,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
        }
    }

    pub fn with_run_as_user(mut self, user: impl Into<String>) -> Self {
        self.run_as_user = Some(user.into());
        self
    }

    pub fn with_buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity;
        self
    }
}
