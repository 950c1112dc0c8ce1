// src/report/status.rs

//! Read-only view of every task's state, for `show`.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::dag::{DagGraph, Freshness, StaleReason, StalenessEvaluator, TaskRegistry};
use crate::errors::Result;
use crate::fingerprint::{FingerprintProbe, FingerprintTable, LastOutcome};
use crate::report::live::StatusTable;
use crate::types::TaskName;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    /// No successful run on record.
    NeverRun,
    UpToDate,
    Stale(StaleReason),
    /// The most recent attempt failed.
    Failed(String),
    /// Being executed right now by a run in this process.
    Running,
    /// Switched off with `active = false`; never planned.
    Inactive,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::NeverRun => write!(f, "never run"),
            TaskStatus::UpToDate => write!(f, "up to date"),
            TaskStatus::Stale(reason) => write!(f, "stale: {reason}"),
            TaskStatus::Failed(reason) => write!(f, "failed: {reason}"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Inactive => write!(f, "inactive"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    pub name: TaskName,
    pub status: TaskStatus,
    pub last_success: Option<DateTime<Utc>>,
}

/// Status of every task, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct StatusReport {
    entries: Vec<StatusEntry>,
}

impl StatusReport {
    /// Classify every task.
    ///
    /// Precedence: running, then inactive, then the last recorded outcome
    /// (failed or never run), then the staleness verdict.
    pub fn collect(
        registry: &TaskRegistry,
        graph: &DagGraph,
        table: &FingerprintTable,
        probe: &FingerprintProbe,
        live: &StatusTable,
    ) -> Result<Self> {
        let staleness = StalenessEvaluator::new(registry, graph, table, probe).evaluate_all()?;

        let entries = registry
            .list_tasks()
            .map(|task| {
                let name = task.name.as_str();
                let status = if live.is_running(name) {
                    TaskStatus::Running
                } else if !task.active {
                    TaskStatus::Inactive
                } else {
                    match table.last_outcome(name) {
                        None => TaskStatus::NeverRun,
                        Some(LastOutcome::Failed) => TaskStatus::Failed(
                            table
                                .failure(name)
                                .map(|note| note.reason.clone())
                                .unwrap_or_default(),
                        ),
                        Some(LastOutcome::Succeeded) => match staleness.get(name) {
                            Some(Freshness::Stale(reason)) => TaskStatus::Stale(reason.clone()),
                            Some(Freshness::UpToDate) | None => TaskStatus::UpToDate,
                        },
                    }
                };

                StatusEntry {
                    name: task.name.clone(),
                    status,
                    last_success: table.record(name).map(|r| r.last_success),
                }
            })
            .collect();

        Ok(Self { entries })
    }

    pub fn get(&self, task: &str) -> Option<&TaskStatus> {
        self.entries
            .iter()
            .find(|e| e.name == task)
            .map(|e| &e.status)
    }

    pub fn entries(&self) -> &[StatusEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in self.entries.iter() {
            let when = entry
                .last_success
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| "-".to_string());
            writeln!(f, "{:<24} {:<20} {}", entry.name, when, entry.status)?;
        }
        Ok(())
    }
}
