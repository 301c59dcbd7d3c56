// src/config/mod.rs

//! Configuration loading and validation for script-runner.
//!
//! Responsibilities:
//! - Define the TOML-backed data model and the resolved settings (`model.rs`).
//! - Load a config file and layer environment / CLI values over it
//!   (`loader.rs`).
//! - Validate the resolved settings (`validate.rs`).
//!
//! Whether the interpreter or script actually exist is *not* a validation
//! concern; the supervisor exposes those as boolean checks.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{env_overrides, load_and_validate, load_from_path, resolve, resolve_from_env};
pub use model::{ConfigFile, ExecutionSection, Overrides, SupervisorConfig};
pub use validate::validate_config;
