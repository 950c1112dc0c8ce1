// src/dag/scheduler_step.rs

//! Step-by-step execution result types for the scheduler.

use crate::dag::task_info::ScheduledTask;
use crate::types::TaskName;

/// Structured result of a single scheduler "step".
///
/// Useful for tests that drive the scheduler by hand and assert on what
/// changed.
#[derive(Debug, Clone, Default)]
pub struct SchedulerStep {
    /// Tasks dispatched as a result of this step.
    pub newly_scheduled: Vec<ScheduledTask>,
    /// Tasks that failed in this step.
    pub newly_failed: Vec<TaskName>,
    /// Tasks skipped in this step, with the failed prerequisite that caused it
    /// (`None` when the run was interrupted).
    pub newly_skipped: Vec<(TaskName, Option<TaskName>)>,
    /// Whether every planned task is now terminal.
    pub run_just_finished: bool,
}
