// src/dag/registry.rs

//! Typed, validated task definitions.

use std::collections::HashMap;
use std::time::Duration;

use tracing::debug;

use crate::config::model::ConfigFile;
use crate::config::validate::external_globset;
use crate::errors::{PipelineError, Result};
use crate::fingerprint::compute_text_digest;
use crate::types::{normalize_artifact, parse_duration, FingerprintMode, TaskName};

/// One resolved input of a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactInput {
    /// Normalised artifact path.
    pub path: String,
    /// Task declaring this artifact as an output; `None` for external files.
    pub producer: Option<TaskName>,
}

impl ArtifactInput {
    pub fn is_external(&self) -> bool {
        self.producer.is_none()
    }
}

/// Static task information derived from config.
#[derive(Debug, Clone)]
pub struct TaskDef {
    pub name: TaskName,
    /// Position in the config file; used to break scheduling ties.
    pub index: usize,
    pub cmd: Option<String>,
    pub outputs: Vec<String>,
    pub inputs: Vec<ArtifactInput>,
    /// Ordering-only prerequisites (`after = [...]` plus task names given
    /// in `inputs` whose task declares no outputs).
    pub after: Vec<TaskName>,
    pub fingerprint: FingerprintMode,
    pub timeout: Option<Duration>,
    /// Inactive tasks are never planned; dependents treat them as done.
    pub active: bool,
}

impl TaskDef {
    /// Direct prerequisites: ordering-only ones first, then producers of
    /// inputs, without duplicates.
    pub fn deps(&self) -> Vec<TaskName> {
        let mut deps: Vec<TaskName> = Vec::new();
        let producers = self.inputs.iter().filter_map(|i| i.producer.as_ref());
        for dep in self.after.iter().chain(producers) {
            if !deps.contains(dep) {
                deps.push(dep.clone());
            }
        }
        deps
    }

    /// Prerequisites linked only by ordering, not by any consumed artifact.
    pub fn ordering_only_deps(&self) -> Vec<TaskName> {
        self.after
            .iter()
            .filter(|dep| {
                !self
                    .inputs
                    .iter()
                    .any(|i| i.producer.as_deref() == Some(dep.as_str()))
            })
            .cloned()
            .collect()
    }

    /// Digest identifying the action; changes when `cmd` changes.
    pub fn action_digest(&self) -> String {
        compute_text_digest(self.cmd.as_deref().unwrap_or(""))
    }
}

/// Holds every task definition, in declaration order.
#[derive(Debug, Clone)]
pub struct TaskRegistry {
    tasks: Vec<TaskDef>,
    by_name: HashMap<TaskName, usize>,
    producers: HashMap<String, TaskName>,
}

impl TaskRegistry {
    /// Build the registry from a structurally validated config.
    ///
    /// Fails with `ConfigError` when two tasks declare the same output, a
    /// task consumes its own output, or an input resolves to nothing.
    pub fn from_config(cfg: &ConfigFile) -> Result<Self> {
        let producers = collect_producers(cfg)?;
        let default_timeout = cfg.default.timeout.as_deref();

        let mut tasks = Vec::with_capacity(cfg.task.len());
        let mut by_name = HashMap::new();

        for (index, (name, tc)) in cfg.task.iter().enumerate() {
            let externals = external_globset(&cfg.default.external, &tc.external)?;

            let mut after: Vec<TaskName> = Vec::new();
            for dep in tc.after.iter() {
                push_unique(&mut after, dep.clone());
            }

            let mut inputs: Vec<ArtifactInput> = Vec::new();
            for raw in tc.inputs.iter() {
                let path = normalize_artifact(raw);

                if let Some(producer) = producers.get(&path) {
                    if producer == name {
                        return Err(PipelineError::ConfigError(format!(
                            "task '{}' consumes its own output '{}'",
                            name, path
                        )));
                    }
                    push_input(&mut inputs, path, Some(producer.clone()));
                } else if let Some(upstream) = cfg.task.get(raw.trim()) {
                    let upstream_name = raw.trim().to_string();
                    if &upstream_name == name {
                        return Err(PipelineError::ConfigError(format!(
                            "task '{}' lists itself in `inputs`",
                            name
                        )));
                    }
                    if upstream.outputs.is_empty() {
                        push_unique(&mut after, upstream_name);
                    } else {
                        for output in upstream.outputs.iter() {
                            push_input(
                                &mut inputs,
                                normalize_artifact(output),
                                Some(upstream_name.clone()),
                            );
                        }
                    }
                } else if externals.is_match(&path) {
                    push_input(&mut inputs, path, None);
                } else {
                    return Err(PipelineError::ConfigError(format!(
                        "task '{}' has unresolved input '{}': not produced by any task, \
                         not a task name, and not marked external",
                        name, raw
                    )));
                }
            }

            let timeout = match tc.effective_timeout(default_timeout) {
                Some(raw) => Some(parse_duration(raw).map_err(|e| {
                    PipelineError::ConfigError(format!("task '{}' timeout: {}", name, e))
                })?),
                None => None,
            };

            let def = TaskDef {
                name: name.clone(),
                index,
                cmd: tc.cmd.clone(),
                outputs: tc.outputs.iter().map(|o| normalize_artifact(o)).collect(),
                inputs,
                after,
                fingerprint: tc.effective_fingerprint(cfg.default.fingerprint),
                timeout,
                active: tc.is_active(),
            };

            debug!(
                task = %def.name,
                inputs = def.inputs.len(),
                outputs = def.outputs.len(),
                deps = ?def.deps(),
                "registered task"
            );

            by_name.insert(name.clone(), index);
            tasks.push(def);
        }

        Ok(Self {
            tasks,
            by_name,
            producers,
        })
    }

    /// All tasks in declaration order.
    pub fn list_tasks(&self) -> impl Iterator<Item = &TaskDef> {
        self.tasks.iter()
    }

    /// Look a task up by name.
    pub fn get_task(&self, name: &str) -> Result<&TaskDef> {
        self.get(name)
            .ok_or_else(|| PipelineError::TaskNotFound(name.to_string()))
    }

    pub fn get(&self, name: &str) -> Option<&TaskDef> {
        self.by_name.get(name).map(|&i| &self.tasks[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

fn collect_producers(cfg: &ConfigFile) -> Result<HashMap<String, TaskName>> {
    let mut producers: HashMap<String, TaskName> = HashMap::new();

    for (name, tc) in cfg.task.iter() {
        for raw in tc.outputs.iter() {
            let path = normalize_artifact(raw);
            if let Some(existing) = producers.get(&path) {
                if existing == name {
                    return Err(PipelineError::ConfigError(format!(
                        "task '{}' declares output '{}' twice",
                        name, path
                    )));
                }
                return Err(PipelineError::ConfigError(format!(
                    "output '{}' is declared by both '{}' and '{}'",
                    path, existing, name
                )));
            }
            producers.insert(path, name.clone());
        }
    }

    Ok(producers)
}

fn push_unique(list: &mut Vec<TaskName>, name: TaskName) {
    if !list.contains(&name) {
        list.push(name);
    }
}

fn push_input(inputs: &mut Vec<ArtifactInput>, path: String, producer: Option<TaskName>) {
    if !inputs.iter().any(|i| i.path == path) {
        inputs.push(ArtifactInput { path, producer });
    }
}
