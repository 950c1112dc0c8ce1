#![allow(dead_code)]

use indexmap::IndexMap;
use pipedag::config::{ConfigFile, ConfigSection, DefaultSection, RawConfigFile, TaskConfig};
use pipedag::errors::Result;
use pipedag::types::FingerprintMode;

/// Builder for `ConfigFile` to simplify test setup.
///
/// Tasks keep the order in which they are added.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                config: ConfigSection::default(),
                default: DefaultSection::default(),
                task: IndexMap::new(),
            },
        }
    }

    pub fn with_task(mut self, name: &str, task: TaskConfig) -> Self {
        self.config.task.insert(name.to_string(), task);
        self
    }

    pub fn jobs(mut self, jobs: usize) -> Self {
        self.config.config.jobs = jobs;
        self
    }

    pub fn mtime_epsilon(mut self, epsilon: &str) -> Self {
        self.config.config.mtime_epsilon = epsilon.to_string();
        self
    }

    pub fn with_external(mut self, pattern: &str) -> Self {
        self.config.default.external.push(pattern.to_string());
        self
    }

    pub fn default_fingerprint(mut self, mode: FingerprintMode) -> Self {
        self.config.default.fingerprint = Some(mode);
        self
    }

    pub fn default_timeout(mut self, timeout: &str) -> Self {
        self.config.default.timeout = Some(timeout.to_string());
        self
    }

    pub fn try_build(self) -> Result<ConfigFile> {
        ConfigFile::try_from(self.config)
    }

    pub fn build(self) -> ConfigFile {
        self.try_build()
            .expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `TaskConfig`.
pub struct TaskConfigBuilder {
    task: TaskConfig,
}

impl TaskConfigBuilder {
    pub fn new(cmd: &str) -> Self {
        Self {
            task: TaskConfig {
                cmd: Some(cmd.to_string()),
                ..TaskConfig::default()
            },
        }
    }

    /// A task without a command that only groups its prerequisites.
    pub fn aggregate() -> Self {
        Self {
            task: TaskConfig::default(),
        }
    }

    pub fn input(mut self, artifact: &str) -> Self {
        self.task.inputs.push(artifact.to_string());
        self
    }

    pub fn output(mut self, artifact: &str) -> Self {
        self.task.outputs.push(artifact.to_string());
        self
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.task.after.push(dep.to_string());
        self
    }

    pub fn external(mut self, pattern: &str) -> Self {
        self.task.external.push(pattern.to_string());
        self
    }

    pub fn fingerprint(mut self, mode: FingerprintMode) -> Self {
        self.task.fingerprint = Some(mode);
        self
    }

    pub fn timeout(mut self, timeout: &str) -> Self {
        self.task.timeout = Some(timeout.to_string());
        self
    }

    /// Switch the task off (`active = false`).
    pub fn inactive(mut self) -> Self {
        self.task.active = Some(false);
        self
    }

    pub fn build(self) -> TaskConfig {
        self.task
    }
}
