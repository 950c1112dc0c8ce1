// src/dag/task_info.rs

//! Task metadata and per-run state.

use std::time::Duration;

use crate::dag::registry::TaskDef;
use crate::types::TaskName;

/// Per-run state of a planned task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskRunState {
    /// Waiting on prerequisites or on a free execution slot.
    Pending,
    /// Dispatched to the executor.
    Running,
    Succeeded,
    Failed,
    /// Never started because a prerequisite failed or the run was interrupted.
    Skipped,
}

impl TaskRunState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskRunState::Succeeded | TaskRunState::Failed | TaskRunState::Skipped
        )
    }
}

/// Static information about a planned task, plus its per-run state.
#[derive(Debug, Clone)]
pub struct TaskInfo {
    pub name: TaskName,
    pub cmd: Option<String>,
    pub outputs: Vec<String>,
    pub timeout: Option<Duration>,
    /// Prerequisites that are part of the same plan.
    pub deps: Vec<TaskName>,
    /// Dependents that are part of the same plan.
    pub dependents: Vec<TaskName>,
    pub run_state: TaskRunState,
    /// Set when skipped: the failed prerequisite, or `None` on interruption.
    pub blocked_by: Option<TaskName>,
}

impl TaskInfo {
    pub fn from_def(def: &TaskDef, deps: Vec<TaskName>, dependents: Vec<TaskName>) -> Self {
        Self {
            name: def.name.clone(),
            cmd: def.cmd.clone(),
            outputs: def.outputs.clone(),
            timeout: def.timeout,
            deps,
            dependents,
            run_state: TaskRunState::Pending,
            blocked_by: None,
        }
    }
}

/// A task the scheduler wants the executor to run now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledTask {
    pub name: TaskName,
    /// `None` for aggregate tasks, which succeed without running anything.
    pub cmd: Option<String>,
    /// Declared outputs, relative to the project root.
    pub outputs: Vec<String>,
    pub timeout: Option<Duration>,
}

impl ScheduledTask {
    pub fn from_task_info(info: &TaskInfo) -> Self {
        Self {
            name: info.name.clone(),
            cmd: info.cmd.clone(),
            outputs: info.outputs.clone(),
            timeout: info.timeout,
        }
    }
}
