// src/exec/task_runner.rs

//! Individual task process runner.

use std::path::Path;
use std::process::ExitStatus;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::process::Child;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::dag::ScheduledTask;
use crate::engine::{RuntimeEvent, TaskOutcome};
use crate::errors::TaskExecutionError;
use crate::exec::command::{forward_lines, shell_command};

/// Run a single task action and report its outcome as `TaskCompleted`.
///
/// - Aggregate tasks (no command) succeed immediately.
/// - A timeout kills the process and reports `Timeout`.
/// - If the cancel channel fires or closes, the process is killed and
///   **no** `TaskCompleted` event is sent: the runtime has already stopped
///   listening.
pub async fn run_task(
    task: ScheduledTask,
    workdir: &Path,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    cancel_rx: oneshot::Receiver<()>,
) {
    let task_name = task.name.clone();

    let outcome = match run_task_inner(&task, workdir, cancel_rx).await {
        Ok(Some(outcome)) => outcome,
        Ok(None) => return,
        Err(err) => {
            warn!(task = %task_name, error = %format!("{err:#}"), "could not run task action");
            TaskOutcome::Failed(TaskExecutionError::Spawn(format!("{err:#}")))
        }
    };

    if runtime_tx
        .send(RuntimeEvent::TaskCompleted {
            task: task_name.clone(),
            outcome,
        })
        .await
        .is_err()
    {
        debug!(task = %task_name, "runtime gone; dropping completion");
    }
}

/// `Ok(None)` means the task was cancelled.
async fn run_task_inner(
    task: &ScheduledTask,
    workdir: &Path,
    mut cancel_rx: oneshot::Receiver<()>,
) -> Result<Option<TaskOutcome>> {
    let Some(action) = task.cmd.as_deref() else {
        debug!(task = %task.name, "aggregate task; nothing to execute");
        return Ok(Some(TaskOutcome::Success));
    };

    info!(task = %task.name, cmd = %action, "starting task process");

    let mut child = shell_command(action, workdir)
        .spawn()
        .with_context(|| format!("spawning process for task '{}'", task.name))?;

    if let Some(stdout) = child.stdout.take() {
        forward_lines(task.name.clone(), "stdout", stdout);
    }
    if let Some(stderr) = child.stderr.take() {
        forward_lines(task.name.clone(), "stderr", stderr);
    }

    tokio::select! {
        waited = wait_with_timeout(&mut child, task.timeout) => {
            let outcome = match waited.with_context(|| {
                format!("waiting for process of task '{}'", task.name)
            })? {
                Some(status) if status.success() => TaskOutcome::Success,
                Some(status) => {
                    TaskOutcome::Failed(TaskExecutionError::NonZeroExit(status.code().unwrap_or(-1)))
                }
                None => {
                    // Only reachable with a timeout configured.
                    let limit = task.timeout.unwrap_or_default();
                    warn!(task = %task.name, ?limit, "task timed out; killing process");
                    if let Err(e) = child.kill().await {
                        warn!(task = %task.name, error = %e, "failed to kill timed out process");
                    }
                    TaskOutcome::Failed(TaskExecutionError::Timeout(limit))
                }
            };

            info!(task = %task.name, success = outcome.is_success(), "task process exited");
            Ok(Some(outcome))
        }

        cancel = &mut cancel_rx => {
            match cancel {
                Ok(()) => info!(task = %task.name, "cancellation requested; killing process"),
                Err(_) => debug!(task = %task.name, "executor dropped; killing process"),
            }
            if let Err(e) = child.kill().await {
                warn!(task = %task.name, error = %e, "failed to kill child process on cancellation");
            }
            Ok(None)
        }
    }
}

/// Wait for the child; `Ok(None)` if `limit` elapsed first.
async fn wait_with_timeout(
    child: &mut Child,
    limit: Option<Duration>,
) -> std::io::Result<Option<ExitStatus>> {
    match limit {
        Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
            Ok(status) => status.map(Some),
            Err(_) => Ok(None),
        },
        None => child.wait().await.map(Some),
    }
}
