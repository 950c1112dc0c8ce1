// src/dag/state_manager.rs

//! Per-run state transitions for planned tasks.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info, warn};

use crate::dag::task_info::{ScheduledTask, TaskInfo, TaskRunState};
use crate::types::TaskName;

/// Mutable view over the planned tasks of one run.
pub struct StateManager<'a> {
    tasks: &'a mut [TaskInfo],
    by_name: &'a HashMap<TaskName, usize>,
    max_parallel: usize,
}

impl<'a> StateManager<'a> {
    pub fn new(
        tasks: &'a mut [TaskInfo],
        by_name: &'a HashMap<TaskName, usize>,
        max_parallel: usize,
    ) -> Self {
        Self {
            tasks,
            by_name,
            max_parallel,
        }
    }

    pub fn running_count(&self) -> usize {
        ReadOnlyStateManager::new(&*self.tasks, self.by_name).running_count()
    }

    pub fn deps_satisfied_for_info(&self, info: &TaskInfo) -> bool {
        ReadOnlyStateManager::new(&*self.tasks, self.by_name).deps_satisfied_for_info(info)
    }

    /// Skip every pending transitive dependent of `failed_task`.
    pub fn mark_dependents_skipped(&mut self, failed_task: &str) -> Vec<(TaskName, Option<TaskName>)> {
        let mut stack: Vec<TaskName> = match self.by_name.get(failed_task) {
            Some(&i) => self.tasks[i].dependents.clone(),
            None => return Vec::new(),
        };
        let mut visited: HashSet<TaskName> = HashSet::new();
        let mut skipped = Vec::new();

        while let Some(name) = stack.pop() {
            if !visited.insert(name.clone()) {
                continue;
            }
            let Some(&i) = self.by_name.get(&name) else {
                warn!(task = %name, "dependent missing from plan");
                continue;
            };

            let info = &mut self.tasks[i];
            if info.run_state == TaskRunState::Pending {
                info.run_state = TaskRunState::Skipped;
                info.blocked_by = Some(failed_task.to_string());
                debug!(task = %info.name, failed = %failed_task, "skipping dependent of failed task");
                skipped.push((info.name.clone(), Some(failed_task.to_string())));
            }
            stack.extend(info.dependents.iter().cloned());
        }

        skipped
    }

    /// Skip every task that has not started yet.
    pub fn skip_all_pending(&mut self) -> Vec<(TaskName, Option<TaskName>)> {
        let mut skipped = Vec::new();
        for info in self.tasks.iter_mut() {
            if info.run_state == TaskRunState::Pending {
                info.run_state = TaskRunState::Skipped;
                skipped.push((info.name.clone(), None));
            }
        }
        skipped
    }

    /// Dispatch pending tasks whose prerequisites all succeeded, in plan
    /// order, without exceeding `max_parallel` running tasks.
    pub fn collect_new_ready_tasks(&mut self) -> Vec<ScheduledTask> {
        let free = self.max_parallel.saturating_sub(self.running_count());
        if free == 0 {
            return Vec::new();
        }

        let candidates: Vec<usize> = self
            .tasks
            .iter()
            .enumerate()
            .filter(|(_, info)| {
                info.run_state == TaskRunState::Pending && self.deps_satisfied_for_info(info)
            })
            .map(|(i, _)| i)
            .take(free)
            .collect();

        let mut ready = Vec::with_capacity(candidates.len());
        for i in candidates {
            let info = &mut self.tasks[i];
            info.run_state = TaskRunState::Running;
            info!(task = %info.name, "dispatching task");
            ready.push(ScheduledTask::from_task_info(info));
        }
        ready
    }

    pub fn all_tasks_terminal(&self) -> bool {
        self.tasks.iter().all(|info| info.run_state.is_terminal())
    }
}

/// Shared-access counterpart of [`StateManager`].
pub struct ReadOnlyStateManager<'a> {
    tasks: &'a [TaskInfo],
    by_name: &'a HashMap<TaskName, usize>,
}

impl<'a> ReadOnlyStateManager<'a> {
    pub fn new(tasks: &'a [TaskInfo], by_name: &'a HashMap<TaskName, usize>) -> Self {
        Self { tasks, by_name }
    }

    pub fn running_count(&self) -> usize {
        self.tasks
            .iter()
            .filter(|info| info.run_state == TaskRunState::Running)
            .count()
    }

    /// Prerequisites inside the plan must have succeeded in this run.
    /// Prerequisites outside the plan were up to date when it was made.
    pub fn deps_satisfied_for_info(&self, info: &TaskInfo) -> bool {
        info.deps.iter().all(|dep| match self.by_name.get(dep) {
            Some(&i) => self.tasks[i].run_state == TaskRunState::Succeeded,
            None => true,
        })
    }
}
