// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{ConfigFile, DEFAULT_INTERPRETER, Overrides, SupervisorConfig};
use crate::config::validate::{validate_config, validate_file};
use crate::errors::Result;
use crate::exec::output_buffer::DEFAULT_BUFFER_CAPACITY;

pub const ENV_INTERPRETER: &str = "EXECUTION_INTERPRETER";
/// Misspelt name accepted for compatibility with older deployments.
pub const ENV_INTERPRETER_LEGACY: &str = "EXECUTION_INTEPRETOR";
pub const ENV_SCRIPT: &str = "EXECUTION_SCRIPT";
pub const ENV_USER: &str = "EXECUTION_USER";

/// Load a configuration file from a given path.
///
/// Only performs TOML deserialization; see [`load_and_validate`].
pub fn load_from_path(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;
    let config: ConfigFile = toml::from_str(&contents)?;
    Ok(config)
}

/// Load a configuration file and check the values it sets.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let config = load_from_path(&path)?;
    validate_file(&config)?;
    Ok(config)
}

/// Collect overrides from environment-style variables.
///
/// `lookup` is `std::env::var` in production; tests pass a map. Empty values
/// count as unset.
pub fn env_overrides<F>(lookup: F) -> Overrides
where
    F: Fn(&str) -> Option<String>,
{
    let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    Overrides {
        interpreter: get(ENV_INTERPRETER)
            .or_else(|| get(ENV_INTERPRETER_LEGACY))
            .map(PathBuf::from),
        script: get(ENV_SCRIPT).map(PathBuf::from),
        user: get(ENV_USER),
    }
}

/// Merge file, environment and CLI values into the final settings.
///
/// Precedence: CLI > environment > file > defaults.
pub fn resolve(
    file: Option<&ConfigFile>,
    env: &Overrides,
    cli: &Overrides,
) -> Result<SupervisorConfig> {
    let section = file.map(|f| f.execution.clone()).unwrap_or_default();

    let interpreter = cli
        .interpreter
        .clone()
        .or_else(|| env.interpreter.clone())
        .or(section.interpreter)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_INTERPRETER));

    let script_path = cli
        .script
        .clone()
        .or_else(|| env.script.clone())
        .or(section.script)
        .unwrap_or_default();

    let run_as_user = cli
        .user
        .clone()
        .or_else(|| env.user.clone())
        .or(section.user);

    let config = SupervisorConfig {
        interpreter,
        script_path,
        run_as_user,
        buffer_capacity: section.buffer_capacity.unwrap_or(DEFAULT_BUFFER_CAPACITY),
    };

    validate_config(&config)?;
    Ok(config)
}

/// [`resolve`] using the process environment.
pub fn resolve_from_env(file: Option<&ConfigFile>, cli: &Overrides) -> Result<SupervisorConfig> {
    let env = env_overrides(|name| std::env::var(name).ok());
    resolve(file, &env, cli)
}
