// src/report/mod.rs

//! What the user sees after (or during) a run.
//!
//! - [`run`] is the per-task outcome of one execution.
//! - [`status`] classifies every task for `show`.
//! - [`live`] tracks which tasks are executing right now.

pub mod live;
pub mod run;
pub mod status;

pub use live::StatusTable;
pub use run::{RunReport, TaskReport};
pub use status::{StatusEntry, StatusReport, TaskStatus};
