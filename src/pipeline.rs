// src/pipeline.rs

//! The public entry point: a loaded pipeline and the operations on it.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::{load_and_validate, mtime_epsilon_of, ConfigFile};
use crate::dag::{DagGraph, Planner, RunPlan, Scheduler, StalenessEvaluator, TaskRegistry};
use crate::engine::{CoreRuntime, FingerprintRecorder, Runtime, RuntimeEvent, SharedStore};
use crate::errors::{PipelineError, Result, TaskExecutionError};
use crate::exec::{ExecutorBackend, RealExecutorBackend};
use crate::fingerprint::{FileFingerprintStore, FingerprintStore, FingerprintTable, FingerprintProbe};
use crate::fs::{FileSystem, RealFileSystem};
use crate::report::{RunReport, StatusReport, StatusTable};
use crate::types::{Target, TaskName};

/// A validated pipeline bound to a project root and a fingerprint store.
pub struct Pipeline {
    config: ConfigFile,
    root: PathBuf,
    registry: Arc<TaskRegistry>,
    graph: DagGraph,
    store: SharedStore,
    probe: FingerprintProbe,
    live: StatusTable,
    jobs: usize,
}

impl Pipeline {
    /// Load `path`, validate it, and open the file store next to it.
    ///
    /// Task actions run in, and artifact paths are relative to, the
    /// directory holding the config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config = load_and_validate(path)?;

        let root = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let store = FileFingerprintStore::open(root.join(&config.config.state_dir))?;
        info!(config = %path.display(), store = %store.path().display(), "loaded pipeline");

        Self::from_config(config, root, Box::new(store), Arc::new(RealFileSystem))
    }

    /// Build a pipeline from parts. Fails on any graph-level configuration
    /// error before anything can run.
    pub fn from_config(
        config: ConfigFile,
        root: impl Into<PathBuf>,
        store: Box<dyn FingerprintStore>,
        fs: Arc<dyn FileSystem>,
    ) -> Result<Self> {
        let root = root.into();
        let registry = TaskRegistry::from_config(&config)?;
        let graph = DagGraph::build(&registry)?;
        let epsilon = mtime_epsilon_of(&config.config)?;
        let probe = FingerprintProbe::new(fs, root.clone(), epsilon);
        let jobs = config.config.jobs;

        debug!(tasks = registry.len(), jobs, root = %root.display(), "pipeline ready");

        Ok(Self {
            config,
            root,
            registry: Arc::new(registry),
            graph,
            store: Arc::new(Mutex::new(store)),
            probe,
            live: StatusTable::new(),
            jobs,
        })
    }

    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    pub fn graph(&self) -> &DagGraph {
        &self.graph
    }

    pub fn jobs(&self) -> usize {
        self.jobs
    }

    /// Override the `jobs` setting of the config file.
    pub fn set_jobs(&mut self, jobs: usize) {
        self.jobs = jobs.max(1);
    }

    /// Handle on the table of tasks currently executing.
    pub fn live_status(&self) -> StatusTable {
        self.live.clone()
    }

    /// Snapshot of the stored fingerprint records.
    pub fn fingerprints(&self) -> Result<FingerprintTable> {
        let store = self.store.lock().unwrap_or_else(|e| e.into_inner());
        Ok(store.load_all()?)
    }

    /// Dry run: the tasks `run` would execute, with reasons.
    pub fn plan(&self, target: &Target) -> Result<RunPlan> {
        self.plan_with(target, false)
    }

    /// Like [`Pipeline::plan`]; `force` treats the target (or, for the
    /// whole pipeline, every task) as stale.
    pub fn plan_with(&self, target: &Target, force: bool) -> Result<RunPlan> {
        let planner = Planner::new(&self.registry, &self.graph);
        // Resolve first: an unknown target must not touch the store.
        let candidates = planner.candidates(target)?;

        let forced: Vec<TaskName> = match (force, target) {
            (false, _) => Vec::new(),
            (true, Target::All) => self.registry.list_tasks().map(|t| t.name.clone()).collect(),
            (true, Target::Task(_)) => planner.resolve_target(target)?,
        };

        let table = self.fingerprints()?;
        let report = StalenessEvaluator::new(&self.registry, &self.graph, &table, &self.probe)
            .with_forced(forced)
            .evaluate(candidates.iter().map(|s| s.as_str()))?;

        planner.plan(target, &report)
    }

    /// Bring `target` up to date by running its minimal stale set.
    pub async fn run(&self, target: &Target) -> Result<RunReport> {
        self.run_with(target, false).await
    }

    /// Like [`Pipeline::run`], with `--force` semantics. Ctrl-C stops
    /// dispatching and interrupts running actions.
    pub async fn run_with(&self, target: &Target, force: bool) -> Result<RunReport> {
        let plan = self.plan_with(target, force)?;
        self.prune_store()?;

        let (tx, rx) = mpsc::channel::<RuntimeEvent>(64);
        let executor = RealExecutorBackend::new(tx.clone(), self.root.clone());

        let interrupt = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("received Ctrl-C; stopping run");
                let _ = tx.send(RuntimeEvent::ShutdownRequested).await;
            }
        });

        let report = self.drive(plan, executor, rx).await;
        interrupt.abort();
        report
    }

    /// Execute an existing plan with a custom executor backend.
    ///
    /// `make_executor` receives the sender on which the backend must report
    /// `TaskCompleted` events.
    pub async fn execute<E, F>(&self, plan: RunPlan, make_executor: F) -> Result<RunReport>
    where
        E: ExecutorBackend,
        F: FnOnce(mpsc::Sender<RuntimeEvent>) -> E,
    {
        let (tx, rx) = mpsc::channel::<RuntimeEvent>(64);
        let executor = make_executor(tx);
        self.drive(plan, executor, rx).await
    }

    async fn drive<E: ExecutorBackend>(
        &self,
        plan: RunPlan,
        executor: E,
        rx: mpsc::Receiver<RuntimeEvent>,
    ) -> Result<RunReport> {
        if plan.is_empty() {
            info!(run_target = %plan.target, "nothing to do; everything is up to date");
        } else {
            info!(run_target = %plan.target, tasks = ?plan.names(), "executing plan");
        }

        let scheduler = Scheduler::from_plan(&self.registry, &self.graph, &plan, self.jobs)?;
        let core = CoreRuntime::new(scheduler, &plan);
        let runtime = Runtime::new(core, rx, executor, self.recorder(), self.live.clone());
        runtime.run().await
    }

    /// Classify every task without side effects.
    pub fn status(&self) -> Result<StatusReport> {
        let table = self.fingerprints()?;
        StatusReport::collect(&self.registry, &self.graph, &table, &self.probe, &self.live)
    }

    /// Whether `task` would run if it were the target.
    pub fn is_stale(&self, task: &str) -> Result<bool> {
        let table = self.fingerprints()?;
        StalenessEvaluator::new(&self.registry, &self.graph, &table, &self.probe).is_stale(task)
    }

    /// Mark the stale tasks of `target` as up to date without running them.
    ///
    /// A planned task is only touched when all of its outputs exist; the
    /// others are left stale. Returns the touched tasks in plan order.
    pub fn touch(&self, target: &Target) -> Result<Vec<TaskName>> {
        self.touch_with(target, false)
    }

    /// Like [`Pipeline::touch`]; `force` also re-records up-to-date tasks.
    pub fn touch_with(&self, target: &Target, force: bool) -> Result<Vec<TaskName>> {
        let plan = self.plan_with(target, force)?;
        let recorder = self.recorder();
        let mut touched = Vec::new();

        for planned in plan.tasks.iter() {
            let committed = recorder
                .snapshot_inputs(&planned.name)
                .and_then(|inputs| recorder.commit_success(&planned.name, inputs));
            match committed {
                Ok(record) => {
                    info!(task = %planned.name, stamp = record.stamp, "touched task");
                    touched.push(planned.name.clone());
                }
                Err(TaskExecutionError::MissingOutput(output)) => {
                    warn!(task = %planned.name, output = %output, "not touching task: output missing");
                }
                Err(err) => {
                    return Err(PipelineError::Other(anyhow::anyhow!(
                        "touching task '{}': {}",
                        planned.name,
                        err
                    )));
                }
            }
        }

        Ok(touched)
    }

    /// Drop stored records of tasks that no longer exist.
    pub fn prune_store(&self) -> Result<usize> {
        let names: Vec<&str> = self.registry.list_tasks().map(|t| t.name.as_str()).collect();
        let mut store = self.store.lock().unwrap_or_else(|e| e.into_inner());
        Ok(store.prune(&names)?)
    }

    fn recorder(&self) -> FingerprintRecorder {
        FingerprintRecorder::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.store),
            self.probe.clone(),
        )
    }
}
