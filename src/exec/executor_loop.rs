// src/exec/executor_loop.rs

//! Main executor loop that manages running task processes.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::dag::ScheduledTask;
use crate::engine::RuntimeEvent;
use crate::exec::task_runner::run_task;

/// Internal handle for a currently-running task process.
///
/// Dropping `_cancel` makes the runner kill its process, so tearing down the
/// loop stops everything that is still running.
struct ActiveTask {
    _cancel: oneshot::Sender<()>,
    handle: tokio::task::JoinHandle<()>,
}

/// Spawn the background executor loop.
///
/// Each scheduled task runs in its own Tokio task with `workdir` as its
/// working directory. How many run at once is decided by the scheduler; the
/// loop only refuses to start a second instance of a task that is still
/// running.
pub fn spawn_executor(
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    workdir: PathBuf,
) -> mpsc::Sender<ScheduledTask> {
    let (tx, mut rx) = mpsc::channel::<ScheduledTask>(32);
    let workdir = Arc::new(workdir);

    tokio::spawn(async move {
        info!(workdir = %workdir.display(), "executor loop started");

        let mut active: HashMap<String, ActiveTask> = HashMap::new();

        while let Some(task) = rx.recv().await {
            active.retain(|_, t| !t.handle.is_finished());
            handle_scheduled_task(task, &mut active, &runtime_tx, &workdir);
        }

        if !active.values().all(|t| t.handle.is_finished()) {
            info!("executor loop closing; stopping running tasks");
        }
        debug!("executor loop finished (channel closed)");
    });

    tx
}

fn handle_scheduled_task(
    task: ScheduledTask,
    active: &mut HashMap<String, ActiveTask>,
    runtime_tx: &mpsc::Sender<RuntimeEvent>,
    workdir: &Arc<PathBuf>,
) {
    let name = task.name.clone();

    if active.contains_key(&name) {
        warn!(task = %name, "task already running; ignoring duplicate dispatch");
        return;
    }

    let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
    let rt_tx = runtime_tx.clone();
    let workdir = Arc::clone(workdir);
    let spawn_name = name.clone();

    let handle = tokio::spawn(async move {
        run_task(task, &workdir, rt_tx, cancel_rx).await;
        debug!(task = %spawn_name, "task runner future finished");
    });

    active.insert(
        name,
        ActiveTask {
            _cancel: cancel_tx,
            handle,
        },
    );
}
