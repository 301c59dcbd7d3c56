// src/exec/mod.rs

//! Process execution layer.
//!
//! - [`supervisor`] holds the public [`Supervisor`] API and the state shared
//!   with the background worker.
//! - [`worker_loop`] owns the persistent worker that claims armed triggers.
//! - [`process_runner`] runs a single execution: spawn, drain, wait,
//!   finalize.
//! - [`invocation`] builds the command line (including the `sudo -u` prefix
//!   for run-as-user).
//! - [`output_buffer`] is the bounded store for captured stdout/stderr.

pub mod invocation;
pub mod output_buffer;
pub mod process_runner;
pub mod supervisor;
pub mod worker_loop;

pub use invocation::{Invocation, current_user};
pub use output_buffer::{DEFAULT_BUFFER_CAPACITY, OutputBuffer};
pub use process_runner::exit_code;
pub use supervisor::Supervisor;
