// src/exec/mod.rs

//! Process execution layer.
//!
//! Runs task actions with `tokio::process::Command` and reports back to the
//! runtime via `RuntimeEvent`s.
//!
//! - [`command`] builds the shell command for an action and forwards its
//!   output to the log.
//! - [`executor_loop`] owns the loop that spawns one runner per dispatched
//!   task.
//! - [`task_runner`] runs a single action with its timeout.
//! - [`backend`] provides the `ExecutorBackend` trait and the production
//!   `RealExecutorBackend`, which tests replace with a fake.

pub mod backend;
pub mod command;
pub mod executor_loop;
pub mod task_runner;

pub use backend::{ExecutorBackend, RealExecutorBackend};
pub use executor_loop::spawn_executor;
