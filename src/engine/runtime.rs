// src/engine/runtime.rs

use std::collections::{HashMap, VecDeque};
use std::fmt;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::dag::ScheduledTask;
use crate::errors::{Result, TaskExecutionError};
use crate::exec::ExecutorBackend;
use crate::report::{RunReport, StatusTable, TaskReport};
use crate::types::TaskName;

use super::core::CoreRuntime;
use super::recorder::{FingerprintRecorder, InputSnapshot};
use super::{CoreCommand, RuntimeEvent, TaskOutcome};

/// Drives one run of the scheduler in response to `RuntimeEvent`s, and
/// delegates actual command execution to an `ExecutorBackend`.
///
/// All run semantics live in `CoreRuntime`. This shell reads events,
/// persists fingerprints for finished tasks, and dispatches work.
pub struct Runtime<E: ExecutorBackend> {
    core: CoreRuntime,
    event_rx: mpsc::Receiver<RuntimeEvent>,
    executor: E,
    recorder: FingerprintRecorder,
    live: StatusTable,
    /// Input fingerprints of dispatched tasks, taken before they started.
    snapshots: HashMap<TaskName, std::result::Result<InputSnapshot, TaskExecutionError>>,
    /// Completions produced by the runtime itself, handled before new
    /// executor events.
    pending: VecDeque<RuntimeEvent>,
}

impl<E: ExecutorBackend> fmt::Debug for Runtime<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .finish_non_exhaustive()
    }
}

impl<E: ExecutorBackend> Runtime<E> {
    pub fn new(
        core: CoreRuntime,
        event_rx: mpsc::Receiver<RuntimeEvent>,
        executor: E,
        recorder: FingerprintRecorder,
        live: StatusTable,
    ) -> Self {
        Self {
            core,
            event_rx,
            executor,
            recorder,
            live,
            snapshots: HashMap::new(),
            pending: VecDeque::new(),
        }
    }

    /// Main event loop. Returns once every planned task has an outcome or
    /// a shutdown was requested.
    pub async fn run(mut self) -> Result<RunReport> {
        info!("run started");

        let mut step = self.core.start();

        loop {
            for command in std::mem::take(&mut step.commands) {
                self.execute_command(command).await;
            }

            if !step.keep_running {
                break;
            }

            let event = match self.pending.pop_front() {
                Some(e) => e,
                None => match self.event_rx.recv().await {
                    Some(e) => e,
                    None => {
                        warn!("runtime event channel closed before the run finished");
                        RuntimeEvent::ShutdownRequested
                    }
                },
            };

            debug!(?event, "runtime received event");
            let event = self.settle(event).await;
            let interrupted = matches!(event, RuntimeEvent::ShutdownRequested);

            step = self.core.step(event);

            if interrupted {
                self.note_interrupted();
            }
        }

        self.live.clear();
        let report = self.core.into_report();
        info!(
            succeeded = report.succeeded().len(),
            failed = report.failed().len(),
            skipped = report.skipped().len(),
            "run finished"
        );
        Ok(report)
    }

    /// Persist the result of a completed task before the scheduler sees it.
    ///
    /// A success whose record cannot be committed becomes a failure, so
    /// dependents never run on top of an unrecorded result.
    async fn settle(&mut self, event: RuntimeEvent) -> RuntimeEvent {
        let (task, outcome) = match event {
            RuntimeEvent::TaskCompleted { task, outcome } => (task, outcome),
            other => return other,
        };
        self.live.mark_finished(&task);
        let snapshot = self.snapshots.remove(&task);

        let outcome = match outcome {
            TaskOutcome::Success => {
                let recorder = self.recorder.clone();
                let name = task.clone();
                let committed = tokio::task::spawn_blocking(move || {
                    let inputs = match snapshot {
                        Some(inputs) => inputs?,
                        None => recorder.snapshot_inputs(&name)?,
                    };
                    recorder.commit_success(&name, inputs)
                })
                .await
                .unwrap_or_else(|e| {
                    Err(TaskExecutionError::FingerprintPersist(format!(
                        "commit task panicked: {e}"
                    )))
                });

                match committed {
                    Ok(record) => {
                        debug!(task = %task, stamp = record.stamp, "fingerprints committed");
                        TaskOutcome::Success
                    }
                    Err(err) => {
                        warn!(task = %task, error = %err, "task succeeded but could not be recorded");
                        self.recorder.record_failure(&task, &err);
                        TaskOutcome::Failed(err)
                    }
                }
            }
            TaskOutcome::Failed(err) => {
                self.recorder.record_failure(&task, &err);
                TaskOutcome::Failed(err)
            }
        };

        RuntimeEvent::TaskCompleted { task, outcome }
    }

    /// Tasks cut short by a shutdown get a failure note, so a partially
    /// written output is never taken for a finished one.
    fn note_interrupted(&self) {
        for (task, report) in self.core.report().iter() {
            if let TaskReport::Failed(err @ TaskExecutionError::Interrupted) = report {
                self.recorder.record_failure(task, err);
            }
        }
    }

    async fn execute_command(&mut self, command: CoreCommand) {
        match command {
            CoreCommand::DispatchTasks(tasks) => self.spawn_ready(tasks).await,
            CoreCommand::RequestExit => {
                debug!("core issued RequestExit command");
            }
        }
    }

    /// Snapshot the inputs of `tasks` and hand them to the executor.
    ///
    /// If the executor refuses the batch, every task in it completes as a
    /// spawn failure so the run still ends with a full report.
    async fn spawn_ready(&mut self, tasks: Vec<ScheduledTask>) {
        if tasks.is_empty() {
            return;
        }

        let names: Vec<TaskName> = tasks.iter().map(|t| t.name.clone()).collect();
        debug!(?names, "spawning ready tasks");

        let recorder = self.recorder.clone();
        let to_snapshot = names.clone();
        let taken = tokio::task::spawn_blocking(move || {
            to_snapshot
                .into_iter()
                .map(|name| {
                    let inputs = recorder.snapshot_inputs(&name);
                    (name, inputs)
                })
                .collect::<Vec<_>>()
        })
        .await;
        match taken {
            Ok(snapshots) => self.snapshots.extend(snapshots),
            Err(e) => warn!(error = %e, "input snapshot task panicked; inputs are taken at commit"),
        }

        for name in names.iter() {
            self.live.mark_running(name);
        }

        if let Err(err) = self.executor.spawn_ready_tasks(tasks).await {
            let reason = format!("{err:#}");
            warn!(tasks = ?names, error = %reason, "executor refused ready tasks");
            for task in names {
                self.pending.push_back(RuntimeEvent::TaskCompleted {
                    task,
                    outcome: TaskOutcome::Failed(TaskExecutionError::Spawn(reason.clone())),
                });
            }
        }
    }
}
