// src/report/run.rs

//! Outcome of one `make` invocation.

use std::fmt;

use indexmap::IndexMap;

use crate::errors::TaskExecutionError;
use crate::types::{Target, TaskName};

/// What happened to one planned task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskReport {
    Succeeded,
    Failed(TaskExecutionError),
    /// Never started. `failed_dependency` names the failed prerequisite, or
    /// is `None` when the run was interrupted first.
    Skipped { failed_dependency: Option<TaskName> },
}

impl fmt::Display for TaskReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskReport::Succeeded => write!(f, "succeeded"),
            TaskReport::Failed(err) => write!(f, "FAILED: {err}"),
            TaskReport::Skipped {
                failed_dependency: Some(dep),
            } => write!(f, "skipped (prerequisite '{dep}' failed)"),
            TaskReport::Skipped {
                failed_dependency: None,
            } => write!(f, "skipped (interrupted)"),
        }
    }
}

/// Per-task outcomes of a run, in plan order.
#[derive(Debug, Clone)]
pub struct RunReport {
    target: Target,
    outcomes: IndexMap<TaskName, Option<TaskReport>>,
}

impl RunReport {
    /// Empty report for the given planned tasks.
    pub fn new<I>(target: Target, planned: I) -> Self
    where
        I: IntoIterator<Item = TaskName>,
    {
        Self {
            target,
            outcomes: planned.into_iter().map(|name| (name, None)).collect(),
        }
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Record the outcome of a task. The first outcome recorded wins.
    pub fn record(&mut self, task: &str, report: TaskReport) {
        let slot = self.outcomes.entry(task.to_string()).or_insert(None);
        if slot.is_none() {
            *slot = Some(report);
        }
    }

    pub fn get(&self, task: &str) -> Option<&TaskReport> {
        self.outcomes.get(task).and_then(Option::as_ref)
    }

    /// Recorded outcomes, in plan order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &TaskReport)> {
        self.outcomes
            .iter()
            .filter_map(|(name, report)| report.as_ref().map(|r| (name.as_str(), r)))
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Whether every planned task has an outcome.
    pub fn is_complete(&self) -> bool {
        self.outcomes.values().all(Option::is_some)
    }

    pub fn succeeded(&self) -> Vec<&str> {
        self.names_where(|r| matches!(r, TaskReport::Succeeded))
    }

    pub fn failed(&self) -> Vec<&str> {
        self.names_where(|r| matches!(r, TaskReport::Failed(_)))
    }

    pub fn skipped(&self) -> Vec<&str> {
        self.names_where(|r| matches!(r, TaskReport::Skipped { .. }))
    }

    /// `true` when every planned task succeeded (vacuously for an empty plan).
    pub fn is_success(&self) -> bool {
        self.outcomes
            .values()
            .all(|r| matches!(r, Some(TaskReport::Succeeded)))
    }

    fn names_where(&self, pred: impl Fn(&TaskReport) -> bool) -> Vec<&str> {
        self.iter()
            .filter(|(_, r)| pred(r))
            .map(|(name, _)| name)
            .collect()
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.outcomes.is_empty() {
            return writeln!(f, "{}: nothing to do, everything is up to date", self.target);
        }

        for (name, report) in self.outcomes.iter() {
            match report {
                Some(report) => writeln!(f, "  {name:<24} {report}")?,
                None => writeln!(f, "  {name:<24} (no outcome)")?,
            }
        }
        writeln!(
            f,
            "{}: {} succeeded, {} failed, {} skipped",
            self.target,
            self.succeeded().len(),
            self.failed().len(),
            self.skipped().len()
        )
    }
}
