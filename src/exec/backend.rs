// src/exec/backend.rs

//! Pluggable executor backend abstraction.
//!
//! The runtime talks to an `ExecutorBackend` instead of a raw mpsc sender,
//! so tests can swap in a fake executor while production uses real
//! processes.
//!
//! - `RealExecutorBackend` wraps the [`spawn_executor`] loop and forwards
//!   scheduled tasks over an mpsc channel.
//! - Tests can provide their own `ExecutorBackend` that records which tasks
//!   were dispatched and emits `TaskCompleted` events directly.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use tokio::sync::mpsc;

use crate::dag::ScheduledTask;
use crate::engine::RuntimeEvent;
use crate::errors::{Error, Result};

use super::executor_loop::spawn_executor;

/// Trait abstracting how scheduled tasks are executed.
pub trait ExecutorBackend: Send {
    /// Dispatch the given tasks for execution.
    ///
    /// Every dispatched task must eventually produce exactly one
    /// `TaskCompleted` event, unless the run is shut down first. An `Err`
    /// means the backend can no longer run anything and none of `tasks`
    /// will report back.
    fn spawn_ready_tasks(
        &mut self,
        tasks: Vec<ScheduledTask>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Real executor backend used in production.
///
/// Dropping it closes the executor loop, which kills any process still
/// running.
pub struct RealExecutorBackend {
    tx: mpsc::Sender<ScheduledTask>,
}

impl RealExecutorBackend {
    /// Spawn the background executor loop running actions from `workdir`.
    pub fn new(runtime_tx: mpsc::Sender<RuntimeEvent>, workdir: impl Into<PathBuf>) -> Self {
        let tx = spawn_executor(runtime_tx, workdir.into());
        Self { tx }
    }
}

impl ExecutorBackend for RealExecutorBackend {
    fn spawn_ready_tasks(
        &mut self,
        tasks: Vec<ScheduledTask>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        // Clone the sender so the future doesn't borrow `self` across `await`.
        let tx = self.tx.clone();

        Box::pin(async move {
            for task in tasks {
                tx.send(task).await.map_err(Error::from)?;
            }
            Ok(())
        })
    }
}
