// src/config/validate.rs

use crate::config::model::{ConfigFile, SupervisorConfig};
use crate::errors::{Result, RunnerError};

/// Check values set in a config file before they are merged.
pub fn validate_file(cfg: &ConfigFile) -> Result<()> {
    if cfg.execution.buffer_capacity == Some(0) {
        return Err(RunnerError::ConfigError(
            "execution.buffer_capacity must be >= 1".to_string(),
        ));
    }
    if let Some(user) = &cfg.execution.user {
        validate_user(user)?;
    }
    Ok(())
}

/// Check the resolved settings.
///
/// Paths only need to be *configured* here; whether they exist is reported
/// by the supervisor at runtime.
pub fn validate_config(cfg: &SupervisorConfig) -> Result<()> {
    if cfg.interpreter.as_os_str().is_empty() {
        return Err(RunnerError::ConfigError(
            "no interpreter configured".to_string(),
        ));
    }

    if cfg.script_path.as_os_str().is_empty() {
        return Err(RunnerError::ConfigError(
            "no script configured (set EXECUTION_SCRIPT, --script or execution.script)"
                .to_string(),
        ));
    }

    if cfg.buffer_capacity == 0 {
        return Err(RunnerError::ConfigError(
            "buffer capacity must be >= 1".to_string(),
        ));
    }

    if let Some(user) = &cfg.run_as_user {
        validate_user(user)?;
    }

    Ok(())
}

fn validate_user(user: &str) -> Result<()> {
    if user.trim().is_empty() || user.chars().any(char::is_whitespace) {
        return Err(RunnerError::ConfigError(format!(
            "invalid run-as user: {user:?}"
        )));
    }
    Ok(())
}
