// src/dag/staleness.rs

//! Decides which tasks must (re-)run.
//!
//! A task is judged on its own record first (never run, failed, forced,
//! action changed, outputs, inputs) and then on its prerequisites:
//! staleness is infectious downstream, so a task is never up to date while
//! anything it depends on, directly or indirectly, is stale.
//!
//! Inactive tasks always count as up to date and stop that propagation.

use std::collections::{HashMap, HashSet};
use std::fmt;

use anyhow::Context;
use tracing::{debug, trace};

use crate::dag::graph::DagGraph;
use crate::dag::registry::{TaskDef, TaskRegistry};
use crate::errors::{PipelineError, Result};
use crate::fingerprint::{FingerprintCache, FingerprintProbe, FingerprintTable, FingerprintRecord};
use crate::types::{FingerprintMode, TaskName};

/// Why a task needs to run. The first matching rule wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StaleReason {
    NeverRun,
    LastRunFailed(String),
    Forced,
    ActionChanged,
    OutputMissing(String),
    OutputChanged(String),
    InputMissing(String),
    InputChanged(String),
    UpstreamStale(TaskName),
    UpstreamRerun(TaskName),
}

impl fmt::Display for StaleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StaleReason::NeverRun => write!(f, "never run"),
            StaleReason::LastRunFailed(reason) => write!(f, "last run failed ({reason})"),
            StaleReason::Forced => write!(f, "forced"),
            StaleReason::ActionChanged => write!(f, "command changed"),
            StaleReason::OutputMissing(p) => write!(f, "output '{p}' missing"),
            StaleReason::OutputChanged(p) => write!(f, "output '{p}' changed"),
            StaleReason::InputMissing(p) => write!(f, "input '{p}' missing"),
            StaleReason::InputChanged(p) => write!(f, "input '{p}' changed"),
            StaleReason::UpstreamStale(t) => write!(f, "upstream task '{t}' is stale"),
            StaleReason::UpstreamRerun(t) => write!(f, "upstream task '{t}' ran since"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Freshness {
    UpToDate,
    Stale(StaleReason),
}

impl Freshness {
    pub fn is_stale(&self) -> bool {
        matches!(self, Freshness::Stale(_))
    }

    pub fn reason(&self) -> Option<&StaleReason> {
        match self {
            Freshness::Stale(reason) => Some(reason),
            Freshness::UpToDate => None,
        }
    }
}

/// Result of one evaluation pass.
#[derive(Debug, Clone, Default)]
pub struct StalenessReport {
    entries: HashMap<TaskName, Freshness>,
}

impl StalenessReport {
    pub fn get(&self, task: &str) -> Option<&Freshness> {
        self.entries.get(task)
    }

    /// `false` for tasks that were not part of the pass.
    pub fn is_stale(&self, task: &str) -> bool {
        self.entries.get(task).is_some_and(Freshness::is_stale)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Read-only evaluator over the registry, graph, stored records and the
/// current state of artifacts on disk.
pub struct StalenessEvaluator<'a> {
    registry: &'a TaskRegistry,
    graph: &'a DagGraph,
    table: &'a FingerprintTable,
    probe: &'a FingerprintProbe,
    forced: HashSet<TaskName>,
}

impl<'a> StalenessEvaluator<'a> {
    pub fn new(
        registry: &'a TaskRegistry,
        graph: &'a DagGraph,
        table: &'a FingerprintTable,
        probe: &'a FingerprintProbe,
    ) -> Self {
        Self {
            registry,
            graph,
            table,
            probe,
            forced: HashSet::new(),
        }
    }

    /// Treat these tasks as stale regardless of their record.
    pub fn with_forced<I>(mut self, forced: I) -> Self
    where
        I: IntoIterator<Item = TaskName>,
    {
        self.forced.extend(forced);
        self
    }

    /// Whether a single task must run.
    pub fn is_stale(&self, task: &str) -> Result<bool> {
        Ok(self.freshness(task)?.is_stale())
    }

    /// Freshness of a single task (evaluates its ancestors too).
    pub fn freshness(&self, task: &str) -> Result<Freshness> {
        self.registry.get_task(task)?;
        let report = self.evaluate([task])?;
        report
            .get(task)
            .cloned()
            .ok_or_else(|| PipelineError::TaskNotFound(task.to_string()))
    }

    /// Freshness of every task.
    pub fn evaluate_all(&self) -> Result<StalenessReport> {
        let order = self.graph.topo_order(self.graph.tasks());
        self.evaluate_ordered(&order)
    }

    /// Freshness of the given tasks and all of their ancestors.
    pub fn evaluate<'n, I>(&self, tasks: I) -> Result<StalenessReport>
    where
        I: IntoIterator<Item = &'n str>,
    {
        let mut members: HashSet<TaskName> = HashSet::new();
        for name in tasks {
            members.insert(name.to_string());
            members.extend(self.graph.ancestors_of(name));
        }
        let order = self.graph.topo_order(members.iter().map(|s| s.as_str()));
        self.evaluate_ordered(&order)
    }

    /// `order` must be topologically sorted and closed under ancestors.
    fn evaluate_ordered(&self, order: &[TaskName]) -> Result<StalenessReport> {
        let mut cache = FingerprintCache::new(self.probe);
        let mut entries: HashMap<TaskName, Freshness> = HashMap::with_capacity(order.len());

        for name in order {
            let task = self.registry.get_task(name)?;
            if !task.active {
                trace!(task = %name, "task is inactive");
                entries.insert(name.clone(), Freshness::UpToDate);
                continue;
            }

            let reason = match self.own_reason(task, &mut cache)? {
                Some(reason) => Some(reason),
                None => self.upstream_reason(task, &entries),
            };

            let freshness = match reason {
                Some(reason) => {
                    debug!(task = %name, reason = %reason, "task is stale");
                    Freshness::Stale(reason)
                }
                None => {
                    trace!(task = %name, "task is up to date");
                    Freshness::UpToDate
                }
            };
            entries.insert(name.clone(), freshness);
        }

        Ok(StalenessReport { entries })
    }

    /// Rules that only look at the task itself.
    fn own_reason(
        &self,
        task: &TaskDef,
        cache: &mut FingerprintCache<'_>,
    ) -> Result<Option<StaleReason>> {
        let Some(record) = self.table.record(&task.name) else {
            return Ok(Some(StaleReason::NeverRun));
        };

        if let Some(note) = self.table.failure(&task.name) {
            return Ok(Some(StaleReason::LastRunFailed(note.reason.clone())));
        }

        if self.forced.contains(&task.name) {
            return Ok(Some(StaleReason::Forced));
        }

        if record.action != task.action_digest() {
            return Ok(Some(StaleReason::ActionChanged));
        }

        if let Some(reason) = self.output_reason(task, record, cache)? {
            return Ok(Some(reason));
        }

        self.input_reason(task, record, cache)
    }

    fn output_reason(
        &self,
        task: &TaskDef,
        record: &FingerprintRecord,
        cache: &mut FingerprintCache<'_>,
    ) -> Result<Option<StaleReason>> {
        let epsilon = cache.probe().epsilon();

        for output in task.outputs.iter() {
            let current = cache
                .get_or_compute(output, task.fingerprint)
                .with_context(|| format!("fingerprinting output of task '{}'", task.name))?;

            let Some(current) = current else {
                return Ok(Some(StaleReason::OutputMissing(output.clone())));
            };

            // mtime outputs are only checked for existence; they naturally
            // move forward whenever the task itself reruns.
            if task.fingerprint == FingerprintMode::Hash {
                let changed = record
                    .outputs
                    .get(output)
                    .is_none_or(|recorded| current.changed_since(recorded, epsilon));
                if changed {
                    return Ok(Some(StaleReason::OutputChanged(output.clone())));
                }
            }
        }

        Ok(None)
    }

    fn input_reason(
        &self,
        task: &TaskDef,
        record: &FingerprintRecord,
        cache: &mut FingerprintCache<'_>,
    ) -> Result<Option<StaleReason>> {
        let epsilon = cache.probe().epsilon();

        for input in task.inputs.iter() {
            let current = cache
                .get_or_compute(&input.path, task.fingerprint)
                .with_context(|| format!("fingerprinting input of task '{}'", task.name))?;

            let Some(current) = current else {
                return Ok(Some(StaleReason::InputMissing(input.path.clone())));
            };

            let changed = record
                .inputs
                .get(&input.path)
                .is_none_or(|recorded| current.changed_since(recorded, epsilon));
            if changed {
                return Ok(Some(StaleReason::InputChanged(input.path.clone())));
            }
        }

        Ok(None)
    }

    /// Rules that look at prerequisites; `entries` already holds them.
    fn upstream_reason(
        &self,
        task: &TaskDef,
        entries: &HashMap<TaskName, Freshness>,
    ) -> Option<StaleReason> {
        for dep in task.deps() {
            if entries.get(&dep).is_some_and(Freshness::is_stale) {
                return Some(StaleReason::UpstreamStale(dep));
            }
        }

        let record = self.table.record(&task.name)?;
        for dep in task.ordering_only_deps() {
            if record.upstream.get(&dep).copied() != self.table.stamp_of(&dep) {
                return Some(StaleReason::UpstreamRerun(dep));
            }
        }

        None
    }
}
