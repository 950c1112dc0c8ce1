use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::dag::graph::DagGraph;
use crate::dag::plan::RunPlan;
use crate::dag::registry::TaskRegistry;
use crate::dag::scheduler_step::SchedulerStep;
use crate::dag::state_manager::{ReadOnlyStateManager, StateManager};
use crate::dag::task_info::{ScheduledTask, TaskInfo, TaskRunState};
use crate::engine::TaskOutcome;
use crate::errors::Result;
use crate::types::TaskName;

/// Per-run state machine over a [`RunPlan`].
///
/// It is responsible for:
/// - dispatching planned tasks once their planned prerequisites succeeded
/// - keeping at most `max_parallel` tasks running
/// - skipping the dependents of a failed task while independent branches
///   carry on
#[derive(Debug)]
pub struct Scheduler {
    /// Planned tasks, in plan order.
    tasks: Vec<TaskInfo>,
    by_name: HashMap<TaskName, usize>,
    max_parallel: usize,
    finished: bool,
}

impl Scheduler {
    /// Build a scheduler for one execution of `plan`.
    pub fn from_plan(
        registry: &TaskRegistry,
        graph: &DagGraph,
        plan: &RunPlan,
        max_parallel: usize,
    ) -> Result<Self> {
        let mut tasks = Vec::with_capacity(plan.len());
        let mut by_name = HashMap::with_capacity(plan.len());

        for planned in plan.tasks.iter() {
            let def = registry.get_task(&planned.name)?;
            let in_plan = |name: &&str| plan.contains(name);
            let deps = graph
                .dependencies_of(&def.name)
                .into_iter()
                .filter(in_plan)
                .map(str::to_string)
                .collect();
            let dependents = graph
                .dependents_of(&def.name)
                .into_iter()
                .filter(in_plan)
                .map(str::to_string)
                .collect();

            by_name.insert(def.name.clone(), tasks.len());
            tasks.push(TaskInfo::from_def(def, deps, dependents));
        }

        let max_parallel = max_parallel.max(1);
        debug!(tasks = tasks.len(), max_parallel, "scheduler: prepared run");

        Ok(Self {
            finished: tasks.is_empty(),
            tasks,
            by_name,
            max_parallel,
        })
    }

    /// Returns `true` once every planned task is terminal.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn max_parallel(&self) -> usize {
        self.max_parallel
    }

    pub fn running_count(&self) -> usize {
        ReadOnlyStateManager::new(&self.tasks, &self.by_name).running_count()
    }

    /// Read-only view of the given task's run state; `None` if not planned.
    pub fn run_state_of(&self, task: &str) -> Option<TaskRunState> {
        self.by_name.get(task).map(|&i| self.tasks[i].run_state)
    }

    /// Failed prerequisite that caused `task` to be skipped.
    pub fn blocked_by(&self, task: &str) -> Option<&str> {
        let &i = self.by_name.get(task)?;
        self.tasks[i].blocked_by.as_deref()
    }

    /// Whether the planned prerequisites of `task` all succeeded.
    ///
    /// Returns `None` if the task is not planned.
    pub fn deps_satisfied(&self, task: &str) -> Option<bool> {
        let &i = self.by_name.get(task)?;
        let mgr = ReadOnlyStateManager::new(&self.tasks, &self.by_name);
        Some(mgr.deps_satisfied_for_info(&self.tasks[i]))
    }

    /// Planned task names, in plan order.
    pub fn task_names(&self) -> impl Iterator<Item = &str> {
        self.tasks.iter().map(|t| t.name.as_str())
    }

    /// Dispatch the initial wave (production API).
    pub fn start(&mut self) -> Vec<ScheduledTask> {
        self.start_step_internal().newly_scheduled
    }

    /// Handle completion of a task with a concrete outcome (production API).
    pub fn handle_completion(&mut self, task: &str, outcome: &TaskOutcome) -> Vec<ScheduledTask> {
        self.completion_step_internal(task, outcome).newly_scheduled
    }

    /// Manual-step variant of `start` that returns a rich [`SchedulerStep`].
    pub fn step_start(&mut self) -> SchedulerStep {
        self.start_step_internal()
    }

    /// Manual-step variant of `handle_completion` that returns a rich [`SchedulerStep`].
    pub fn step_completion(&mut self, task: &str, outcome: &TaskOutcome) -> SchedulerStep {
        self.completion_step_internal(task, outcome)
    }

    /// Stop dispatching: every task that has not started is skipped.
    ///
    /// Running tasks keep their state; the caller decides what to do with
    /// them.
    pub fn cancel_pending(&mut self) -> SchedulerStep {
        let mut manager = StateManager::new(&mut self.tasks, &self.by_name, self.max_parallel);
        let newly_skipped = manager.skip_all_pending();
        if !newly_skipped.is_empty() {
            info!(skipped = newly_skipped.len(), "scheduler: cancelled pending tasks");
        }
        let run_just_finished = self.maybe_finish_run();

        SchedulerStep {
            newly_skipped,
            run_just_finished,
            ..SchedulerStep::default()
        }
    }

    fn maybe_finish_run(&mut self) -> bool {
        if self.finished {
            return false;
        }

        let manager = StateManager::new(&mut self.tasks, &self.by_name, self.max_parallel);
        if manager.all_tasks_terminal() {
            info!("scheduler: all planned tasks terminal; run finished");
            self.finished = true;
            true
        } else {
            false
        }
    }

    fn start_step_internal(&mut self) -> SchedulerStep {
        let mut manager = StateManager::new(&mut self.tasks, &self.by_name, self.max_parallel);
        let newly_scheduled = manager.collect_new_ready_tasks();
        let run_just_finished = self.maybe_finish_run();

        SchedulerStep {
            newly_scheduled,
            run_just_finished,
            ..SchedulerStep::default()
        }
    }

    fn completion_step_internal(&mut self, task: &str, outcome: &TaskOutcome) -> SchedulerStep {
        let Some(&i) = self.by_name.get(task) else {
            warn!(task = %task, "completion for task outside the plan; ignoring");
            return SchedulerStep::default();
        };

        if self.tasks[i].run_state != TaskRunState::Running {
            warn!(
                task = %task,
                state = ?self.tasks[i].run_state,
                "completion for task that is not running; ignoring"
            );
            return SchedulerStep::default();
        }

        let mut step = SchedulerStep::default();

        match outcome {
            TaskOutcome::Success => {
                self.tasks[i].run_state = TaskRunState::Succeeded;
                debug!(task = %task, "task completed successfully");
            }
            TaskOutcome::Failed(err) => {
                self.tasks[i].run_state = TaskRunState::Failed;
                warn!(task = %task, error = %err, "task failed; skipping its dependents");
                step.newly_failed.push(task.to_string());
                let mut manager =
                    StateManager::new(&mut self.tasks, &self.by_name, self.max_parallel);
                step.newly_skipped = manager.mark_dependents_skipped(task);
            }
        }

        // A finished task frees a slot whatever its outcome.
        let mut manager = StateManager::new(&mut self.tasks, &self.by_name, self.max_parallel);
        step.newly_scheduled = manager.collect_new_ready_tasks();
        step.run_just_finished = self.maybe_finish_run();
        step
    }
}
