//! Persists the result of a finished task.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::dag::TaskRegistry;
use crate::errors::TaskExecutionError;
use crate::fingerprint::{
    Fingerprint, FingerprintProbe, FingerprintRecord, FingerprintStore, SuccessEntry,
};

/// Fingerprint store shared between a pipeline and its runs.
pub type SharedStore = Arc<Mutex<Box<dyn FingerprintStore>>>;

/// Input fingerprints of a task, taken right before its action started.
pub type InputSnapshot = BTreeMap<String, Fingerprint>;

/// Fingerprints a task's artifacts and commits the record once it finished.
#[derive(Clone)]
pub struct FingerprintRecorder {
    registry: Arc<TaskRegistry>,
    store: SharedStore,
    probe: FingerprintProbe,
}

impl FingerprintRecorder {
    pub fn new(registry: Arc<TaskRegistry>, store: SharedStore, probe: FingerprintProbe) -> Self {
        Self {
            registry,
            store,
            probe,
        }
    }

    /// Fingerprint the inputs of `task` as they are now.
    ///
    /// Missing inputs are left out; the next evaluation reports them as
    /// missing.
    pub fn snapshot_inputs(&self, task: &str) -> Result<InputSnapshot, TaskExecutionError> {
        let def = self.registry.get(task).ok_or_else(|| {
            TaskExecutionError::FingerprintPersist(format!("unknown task '{task}'"))
        })?;

        let mut inputs = BTreeMap::new();
        for input in def.inputs.iter() {
            match self.probe.current(&input.path, def.fingerprint) {
                Ok(Some(fp)) => {
                    inputs.insert(input.path.clone(), fp);
                }
                Ok(None) => {
                    debug!(task = %task, input = %input.path, "input missing at dispatch");
                }
                Err(e) => return Err(TaskExecutionError::FingerprintPersist(format!("{e:#}"))),
            }
        }
        Ok(inputs)
    }

    /// Commit a success record for `task` with the inputs it started from.
    ///
    /// Every declared output must exist. Any error here means no record was
    /// written and the task must be treated as failed.
    pub fn commit_success(
        &self,
        task: &str,
        inputs: InputSnapshot,
    ) -> Result<FingerprintRecord, TaskExecutionError> {
        let def = self.registry.get(task).ok_or_else(|| {
            TaskExecutionError::FingerprintPersist(format!("unknown task '{task}'"))
        })?;

        let mut outputs = BTreeMap::new();
        for output in def.outputs.iter() {
            match self.probe.current(output, def.fingerprint) {
                Ok(Some(fp)) => {
                    outputs.insert(output.clone(), fp);
                }
                Ok(None) => return Err(TaskExecutionError::MissingOutput(output.clone())),
                Err(e) => return Err(TaskExecutionError::FingerprintPersist(format!("{e:#}"))),
            }
        }

        self.warn_on_input_drift(task, &inputs);

        let mut store = self.store.lock().unwrap_or_else(|e| e.into_inner());
        let table = store
            .load_all()
            .map_err(|e| TaskExecutionError::FingerprintPersist(format!("{e:#}")))?;

        let upstream = def
            .ordering_only_deps()
            .into_iter()
            .filter_map(|dep| table.stamp_of(&dep).map(|stamp| (dep, stamp)))
            .collect();

        let entry = SuccessEntry {
            action: def.action_digest(),
            inputs,
            outputs,
            upstream,
        };

        store
            .record_success(task, entry)
            .map_err(|e| TaskExecutionError::FingerprintPersist(format!("{e:#}")))
    }

    /// The record keeps the dispatch-time inputs, so a drifted input makes
    /// the task stale on the next evaluation.
    fn warn_on_input_drift(&self, task: &str, started_from: &InputSnapshot) {
        let Ok(now) = self.snapshot_inputs(task) else {
            return;
        };
        for (path, fp) in now.iter() {
            if started_from.get(path) != Some(fp) {
                warn!(task = %task, input = %path, "input changed while the task ran");
            }
        }
    }

    /// Leave a failure note for `task`. Errors are logged, not returned: the
    /// run outcome is already a failure either way.
    pub fn record_failure(&self, task: &str, error: &TaskExecutionError) {
        let mut store = self.store.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = store.record_failure(task, &error.to_string()) {
            warn!(task = %task, error = %e, "could not store failure note");
        }
    }
}
