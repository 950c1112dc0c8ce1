// src/engine/event_handlers.rs

//! Event handling logic for the core runtime.

use crate::dag::{ScheduledTask, Scheduler, SchedulerStep, TaskRunState};
use crate::engine::TaskOutcome;
use crate::errors::TaskExecutionError;
use crate::report::{RunReport, TaskReport};
use crate::types::TaskName;

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreCommand {
    /// Send these tasks to the executor.
    DispatchTasks(Vec<ScheduledTask>),
    /// The run is over; the shell should stop its loop.
    RequestExit,
}

/// Decision returned by the core after handling a single event.
#[derive(Debug, Clone)]
pub struct CoreStep {
    /// Commands the IO shell should execute.
    pub commands: Vec<CoreCommand>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

/// Dispatch the first wave of a run.
pub fn start_run(scheduler: &mut Scheduler, report: &mut RunReport) -> CoreStep {
    let step = scheduler.step_start();
    apply_step(scheduler, report, step)
}

/// Handle a task completion event.
///
/// The failed task's planned dependents are skipped; independent branches
/// keep being dispatched.
pub fn handle_task_completion(
    scheduler: &mut Scheduler,
    report: &mut RunReport,
    task: TaskName,
    outcome: TaskOutcome,
) -> CoreStep {
    let step = scheduler.step_completion(&task, &outcome);
    match outcome {
        TaskOutcome::Success => report.record(&task, TaskReport::Succeeded),
        TaskOutcome::Failed(err) => report.record(&task, TaskReport::Failed(err)),
    }
    apply_step(scheduler, report, step)
}

/// Handle a shutdown request.
///
/// Nothing new is dispatched. Tasks that never started are skipped and
/// tasks still executing are reported as interrupted.
pub fn handle_shutdown(scheduler: &mut Scheduler, report: &mut RunReport) -> CoreStep {
    let running: Vec<TaskName> = scheduler
        .task_names()
        .filter(|name| scheduler.run_state_of(name) == Some(TaskRunState::Running))
        .map(str::to_string)
        .collect();

    let step = scheduler.cancel_pending();
    record_skipped(report, &step);

    for task in running {
        report.record(&task, TaskReport::Failed(TaskExecutionError::Interrupted));
    }

    CoreStep {
        commands: vec![CoreCommand::RequestExit],
        keep_running: false,
    }
}

fn apply_step(scheduler: &Scheduler, report: &mut RunReport, step: SchedulerStep) -> CoreStep {
    record_skipped(report, &step);

    let mut commands = Vec::new();
    if !step.newly_scheduled.is_empty() {
        commands.push(CoreCommand::DispatchTasks(step.newly_scheduled));
    }

    let keep_running = !scheduler.is_finished();
    if !keep_running {
        commands.push(CoreCommand::RequestExit);
    }

    CoreStep {
        commands,
        keep_running,
    }
}

fn record_skipped(report: &mut RunReport, step: &SchedulerStep) {
    for (task, failed_dependency) in step.newly_skipped.iter() {
        report.record(
            task,
            TaskReport::Skipped {
                failed_dependency: failed_dependency.clone(),
            },
        );
    }
}
