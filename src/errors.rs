// src/errors.rs

//! Crate-wide error types.
//!
//! [`PipelineError`] covers everything that aborts an operation as a whole
//! (bad configuration, unknown targets, IO). Failures of individual task
//! actions are [`TaskExecutionError`]s: they are recorded in the run report
//! and never abort independent branches of a run.

use std::time::Duration;

use thiserror::Error;

use crate::types::TaskName;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Unknown target: {0}")]
    UnknownTarget(String),

    #[error("Cycle detected in task graph: {}", .path.join(" -> "))]
    DagCycle { path: Vec<TaskName> },

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PipelineError {
    /// Whether this error stems from an invalid pipeline definition.
    ///
    /// These are always raised at load time, before anything executes.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            PipelineError::ConfigError(_)
                | PipelineError::DagCycle { .. }
                | PipelineError::TomlError(_)
        )
    }
}

/// Why a single task did not succeed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskExecutionError {
    #[error("action exited with status {0}")]
    NonZeroExit(i32),

    #[error("action timed out after {0:?}")]
    Timeout(Duration),

    #[error("failed to start action: {0}")]
    Spawn(String),

    #[error("declared output '{0}' was not produced")]
    MissingOutput(String),

    #[error("could not persist fingerprint record: {0}")]
    FingerprintPersist(String),

    #[error("interrupted before completion")]
    Interrupted,
}

impl TaskExecutionError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, TaskExecutionError::Timeout(_))
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, PipelineError>;
