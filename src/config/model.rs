// src/config/model.rs

use indexmap::IndexMap;
use serde::Deserialize;

use crate::types::FingerprintMode;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [config]
/// jobs = 4
/// mtime_epsilon = "1s"
///
/// [default]
/// fingerprint = "hash"
/// external = ["data/**"]
///
/// [task.ingest]
/// cmd = "bash scripts/ingest.sh"
/// inputs = ["data/sample1.fastq"]
/// outputs = ["ingest.dir/sample1.sentinel"]
///
/// [task.align]
/// cmd = "bash scripts/align.sh"
/// inputs = ["ingest"]
/// outputs = ["align.dir/sample1.bam"]
/// ```
///
/// All sections except `[task.*]` are optional and have reasonable defaults.
/// This is the *unvalidated* shape; use [`ConfigFile`] downstream.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub config: ConfigSection,

    #[serde(default)]
    pub default: DefaultSection,

    /// All tasks from `[task.<name>]`, in declaration order.
    #[serde(default)]
    pub task: IndexMap<String, TaskConfig>,
}

/// A configuration that passed structural validation.
///
/// Only constructible through `TryFrom<RawConfigFile>` (see `validate.rs`).
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub config: ConfigSection,
    pub default: DefaultSection,
    pub task: IndexMap<String, TaskConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        config: ConfigSection,
        default: DefaultSection,
        task: IndexMap<String, TaskConfig>,
    ) -> Self {
        Self {
            config,
            default,
            task,
        }
    }
}

/// `[config]` section: engine-wide settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSection {
    /// Maximum number of task actions running at the same time.
    #[serde(default = "default_jobs")]
    pub jobs: usize,

    /// Directory (relative to the config file) holding the fingerprint store.
    #[serde(default = "default_state_dir")]
    pub state_dir: String,

    /// Minimum mtime difference for an input to count as "newer".
    ///
    /// Absorbs coarse filesystem timestamp granularity.
    #[serde(default = "default_mtime_epsilon")]
    pub mtime_epsilon: String,
}

fn default_jobs() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn default_state_dir() -> String {
    ".pipedag".to_string()
}

fn default_mtime_epsilon() -> String {
    "1s".to_string()
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            jobs: default_jobs(),
            state_dir: default_state_dir(),
            mtime_epsilon: default_mtime_epsilon(),
        }
    }
}

/// `[default]` section: values inherited by every task.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct DefaultSection {
    /// Default fingerprint mode; `hash` when unset.
    #[serde(default)]
    pub fingerprint: Option<FingerprintMode>,

    /// Glob patterns of artifacts that come from outside the pipeline.
    #[serde(default)]
    pub external: Vec<String>,

    /// Default wall-clock timeout for task actions (e.g. `"2h"`).
    #[serde(default)]
    pub timeout: Option<String>,
}

/// `[task.<name>]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct TaskConfig {
    /// Shell command producing the outputs. Tasks without a command only
    /// group their prerequisites.
    #[serde(default)]
    pub cmd: Option<String>,

    /// Artifacts this task produces.
    #[serde(default)]
    pub outputs: Vec<String>,

    /// Artifacts (or task names) this task consumes.
    #[serde(default)]
    pub inputs: Vec<String>,

    /// Ordering-only prerequisites: this task waits for all tasks listed here.
    #[serde(default)]
    pub after: Vec<String>,

    /// Task-local glob patterns of external artifacts.
    #[serde(default)]
    pub external: Vec<String>,

    /// Per-task fingerprint mode; falls back to `default.fingerprint`.
    #[serde(default)]
    pub fingerprint: Option<FingerprintMode>,

    /// Per-task timeout; falls back to `default.timeout`.
    #[serde(default)]
    pub timeout: Option<String>,

    /// `active = false` switches the task off; unset means active.
    #[serde(default)]
    pub active: Option<bool>,
}

impl TaskConfig {
    pub fn is_active(&self) -> bool {
        self.active.unwrap_or(true)
    }

    /// Effective fingerprint mode given the `[default]` section.
    pub fn effective_fingerprint(&self, default_mode: Option<FingerprintMode>) -> FingerprintMode {
        self.fingerprint.or(default_mode).unwrap_or_default()
    }

    /// Effective (unparsed) timeout given the `[default]` section.
    pub fn effective_timeout<'a>(&'a self, default_timeout: Option<&'a str>) -> Option<&'a str> {
        self.timeout.as_deref().or(default_timeout)
    }
}
