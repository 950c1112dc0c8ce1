// src/engine/mod.rs

//! Execution engine.
//!
//! This module ties together:
//! - the per-run scheduler
//! - the fingerprint recorder that turns a finished action into a durable
//!   record (or a failure note)
//! - the runtime event loop that reacts to task completions and shutdown
//!   requests
//!
//! The pure core state machine lives in [`core`]; the async/IO shell is
//! implemented in [`runtime`].

use crate::errors::TaskExecutionError;
use crate::types::TaskName;

/// Outcome of a task for the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Success,
    Failed(TaskExecutionError),
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Success)
    }
}

/// Events flowing into the runtime from executors and signal handlers.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// A task action finished with a concrete outcome.
    TaskCompleted { task: TaskName, outcome: TaskOutcome },
    /// Stop dispatching and wind the run down (e.g. Ctrl-C).
    ShutdownRequested,
}

pub mod core;
pub mod event_handlers;
pub mod recorder;
pub mod runtime;

pub use core::CoreRuntime;
pub use event_handlers::{CoreCommand, CoreStep};
pub use recorder::{FingerprintRecorder, InputSnapshot, SharedStore};
pub use runtime::Runtime;
