use std::collections::HashSet;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pipedag::dag::ScheduledTask;
use pipedag::engine::{RuntimeEvent, TaskOutcome};
use pipedag::errors::{PipelineError, Result, TaskExecutionError};
use pipedag::exec::ExecutorBackend;
use pipedag::fs::mock::MockFileSystem;
use pipedag::fs::FileSystem;
use tokio::sync::mpsc;

/// What a [`FakeExecutor`] observed. Cheap to clone; clones share state.
#[derive(Debug, Clone, Default)]
pub struct ExecutionLog {
    executed: Arc<Mutex<Vec<String>>>,
    running: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl ExecutionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Task names in the order they were started.
    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    /// Highest number of tasks that were running at the same time.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn start(&self, task: &str) {
        self.executed.lock().unwrap().push(task.to_string());
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn finish(&self) {
        self.running.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A fake executor that:
/// - records which tasks were "run" and how many overlapped
/// - writes every declared output into a [`MockFileSystem`]
/// - reports `TaskCompleted(Success)`, or a failure for scripted tasks
/// - refuses whole batches holding a task marked with [`FakeExecutor::refusing`]
pub struct FakeExecutor {
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    log: ExecutionLog,
    fs: Option<(MockFileSystem, PathBuf)>,
    failing: HashSet<String>,
    without_outputs: HashSet<String>,
    refused: HashSet<String>,
    delay: Duration,
}

impl FakeExecutor {
    pub fn new(runtime_tx: mpsc::Sender<RuntimeEvent>, log: ExecutionLog) -> Self {
        Self {
            runtime_tx,
            log,
            fs: None,
            failing: HashSet::new(),
            without_outputs: HashSet::new(),
            refused: HashSet::new(),
            delay: Duration::ZERO,
        }
    }

    /// Write outputs of successful tasks below `root` in `fs`.
    pub fn with_filesystem(mut self, fs: MockFileSystem, root: impl Into<PathBuf>) -> Self {
        self.fs = Some((fs, root.into()));
        self
    }

    /// Make `task` exit with status 1.
    pub fn failing(mut self, task: &str) -> Self {
        self.failing.insert(task.to_string());
        self
    }

    /// Make `task` succeed without writing its outputs.
    pub fn without_outputs(mut self, task: &str) -> Self {
        self.without_outputs.insert(task.to_string());
        self
    }

    /// Fail to dispatch any batch that contains `task`, as a backend whose
    /// worker went away would.
    pub fn refusing(mut self, task: &str) -> Self {
        self.refused.insert(task.to_string());
        self
    }

    /// Keep every task "running" for `delay` before it completes.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl ExecutorBackend for FakeExecutor {
    fn spawn_ready_tasks(
        &mut self,
        tasks: Vec<ScheduledTask>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        if let Some(t) = tasks.iter().find(|t| self.refused.contains(&t.name)) {
            let err = std::io::Error::other(format!("executor refused '{}'", t.name));
            return Box::pin(async move { Err(PipelineError::from(err)) });
        }

        let tx = self.runtime_tx.clone();

        for t in tasks {
            let tx = tx.clone();
            let log = self.log.clone();
            let fs = self.fs.clone();
            let fails = self.failing.contains(&t.name);
            let writes = !self.without_outputs.contains(&t.name);
            let delay = self.delay;

            log.start(&t.name);
            tokio::spawn(async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }

                let outcome = if fails {
                    TaskOutcome::Failed(TaskExecutionError::NonZeroExit(1))
                } else {
                    if let (true, Some((fs, root))) = (writes, fs.as_ref()) {
                        let content = format!("{}:{}", t.name, t.cmd.as_deref().unwrap_or(""));
                        for output in t.outputs.iter() {
                            fs.write(&root.join(output), content.as_bytes())
                                .expect("mock write cannot fail");
                        }
                    }
                    TaskOutcome::Success
                };

                log.finish();
                let _ = tx
                    .send(RuntimeEvent::TaskCompleted {
                        task: t.name.clone(),
                        outcome,
                    })
                    .await;
            });
        }

        Box::pin(async { Ok(()) })
    }
}
