// src/dag/plan.rs

//! Turns a target and a staleness pass into an ordered run plan.

use std::collections::HashSet;
use std::fmt;

use tracing::{debug, info};

use crate::dag::graph::DagGraph;
use crate::dag::registry::TaskRegistry;
use crate::dag::staleness::{StaleReason, StalenessReport};
use crate::errors::{PipelineError, Result};
use crate::types::{Target, TaskName};

/// One entry of a run plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedTask {
    pub name: TaskName,
    pub reason: StaleReason,
}

/// Minimal, topologically ordered list of tasks to execute.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub target: Target,
    pub tasks: Vec<PlannedTask>,
}

impl RunPlan {
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tasks.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn contains(&self, task: &str) -> bool {
        self.tasks.iter().any(|t| t.name == task)
    }

    pub fn reason_of(&self, task: &str) -> Option<&StaleReason> {
        self.tasks.iter().find(|t| t.name == task).map(|t| &t.reason)
    }
}

impl fmt::Display for RunPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.tasks.is_empty() {
            return writeln!(f, "{}: nothing to do, everything is up to date", self.target);
        }
        writeln!(f, "plan for {} ({} task(s)):", self.target, self.tasks.len())?;
        for (i, task) in self.tasks.iter().enumerate() {
            writeln!(f, "  {:>3}. {:<24} {}", i + 1, task.name, task.reason)?;
        }
        Ok(())
    }
}

pub struct Planner<'a> {
    registry: &'a TaskRegistry,
    graph: &'a DagGraph,
}

impl<'a> Planner<'a> {
    pub fn new(registry: &'a TaskRegistry, graph: &'a DagGraph) -> Self {
        Self { registry, graph }
    }

    /// Tasks the target names directly.
    ///
    /// The whole pipeline is every terminal task. A task literally called
    /// `full` shadows the keyword. Inactive tasks still resolve; the
    /// staleness pass never marks them stale.
    pub fn resolve_target(&self, target: &Target) -> Result<Vec<TaskName>> {
        match target {
            Target::Task(name) => {
                if self.registry.contains(name) {
                    Ok(vec![name.clone()])
                } else {
                    Err(PipelineError::UnknownTarget(name.clone()))
                }
            }
            Target::All if self.registry.contains(Target::ALL_KEYWORD) => {
                Ok(vec![Target::ALL_KEYWORD.to_string()])
            }
            Target::All => Ok(self
                .graph
                .terminal_tasks()
                .into_iter()
                .map(str::to_string)
                .collect()),
        }
    }

    /// The target tasks plus all their ancestors, topologically ordered.
    pub fn candidates(&self, target: &Target) -> Result<Vec<TaskName>> {
        let roots = self.resolve_target(target)?;
        let mut members: HashSet<TaskName> = HashSet::new();
        for root in roots.iter() {
            members.extend(self.graph.ancestors_of(root));
            members.insert(root.clone());
        }
        Ok(self.graph.topo_order(members.iter().map(|s| s.as_str())))
    }

    /// Keep the stale candidates, in topological order.
    ///
    /// `report` must cover every candidate; because staleness propagates
    /// downstream, the stale set is already closed under descendants.
    pub fn plan(&self, target: &Target, report: &StalenessReport) -> Result<RunPlan> {
        let candidates = self.candidates(target)?;
        debug!(run_target = %target, candidates = candidates.len(), "planning run");

        for root in self.resolve_target(target)? {
            if self.registry.get(&root).is_some_and(|t| !t.active) {
                info!(task = %root, "target task is inactive; only its prerequisites are planned");
            }
        }

        let tasks: Vec<PlannedTask> = candidates
            .into_iter()
            .filter_map(|name| {
                let reason = report.get(&name)?.reason()?.clone();
                Some(PlannedTask { name, reason })
            })
            .collect();

        info!(run_target = %target, planned = tasks.len(), "run plan ready");
        Ok(RunPlan {
            target: target.clone(),
            tasks,
        })
    }
}
