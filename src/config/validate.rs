// src/config/validate.rs

use std::time::Duration;

use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::config::model::{ConfigFile, ConfigSection, RawConfigFile};
use crate::errors::{PipelineError, Result};
use crate::types::parse_duration;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = PipelineError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.config, raw.default, raw.task))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_tasks(cfg)?;
    validate_global_config(cfg)?;
    validate_task_names(cfg)?;
    validate_task_fields(cfg)?;
    validate_task_dependencies(cfg)?;
    Ok(())
}

fn ensure_has_tasks(cfg: &RawConfigFile) -> Result<()> {
    if cfg.task.is_empty() {
        return Err(PipelineError::ConfigError(
            "config must contain at least one [task.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_global_config(cfg: &RawConfigFile) -> Result<()> {
    if cfg.config.jobs == 0 {
        return Err(PipelineError::ConfigError(
            "[config].jobs must be >= 1 (got 0)".to_string(),
        ));
    }

    if cfg.config.state_dir.trim().is_empty() {
        return Err(PipelineError::ConfigError(
            "[config].state_dir must not be empty".to_string(),
        ));
    }

    mtime_epsilon_of(&cfg.config)?;

    if let Some(ref timeout) = cfg.default.timeout {
        parse_duration(timeout).map_err(|e| {
            PipelineError::ConfigError(format!("[default].timeout: {e}"))
        })?;
    }

    external_globset(&cfg.default.external, &[])?;

    Ok(())
}

fn validate_task_names(cfg: &RawConfigFile) -> Result<()> {
    for name in cfg.task.keys() {
        if name.trim().is_empty() {
            return Err(PipelineError::ConfigError(
                "task names must not be empty".to_string(),
            ));
        }
        if name.chars().any(char::is_whitespace) {
            return Err(PipelineError::ConfigError(format!(
                "task name '{}' must not contain whitespace",
                name
            )));
        }
    }
    Ok(())
}

fn validate_task_fields(cfg: &RawConfigFile) -> Result<()> {
    for (name, task) in cfg.task.iter() {
        if let Some(ref cmd) = task.cmd {
            if cmd.trim().is_empty() {
                return Err(PipelineError::ConfigError(format!(
                    "task '{}' has an empty `cmd`; omit it for tasks without an action",
                    name
                )));
            }
        }

        if let Some(ref timeout) = task.timeout {
            parse_duration(timeout).map_err(|e| {
                PipelineError::ConfigError(format!("task '{}' timeout: {}", name, e))
            })?;
        }

        for output in task.outputs.iter() {
            if output.trim().is_empty() {
                return Err(PipelineError::ConfigError(format!(
                    "task '{}' declares an empty output path",
                    name
                )));
            }
        }

        external_globset(&[], &task.external)?;
    }
    Ok(())
}

fn validate_task_dependencies(cfg: &RawConfigFile) -> Result<()> {
    for (name, task) in cfg.task.iter() {
        for dep in task.after.iter() {
            if !cfg.task.contains_key(dep) {
                return Err(PipelineError::ConfigError(format!(
                    "task '{}' has unknown dependency '{}' in `after`",
                    name, dep
                )));
            }
            if dep == name {
                return Err(PipelineError::ConfigError(format!(
                    "task '{}' cannot depend on itself in `after`",
                    name
                )));
            }
        }
    }
    Ok(())
}

/// Parsed `[config].mtime_epsilon`.
pub fn mtime_epsilon_of(section: &ConfigSection) -> Result<Duration> {
    parse_duration(&section.mtime_epsilon).map_err(|e| {
        PipelineError::ConfigError(format!("[config].mtime_epsilon: {e}"))
    })
}

/// Build a GlobSet from the default and task-local external patterns.
pub fn external_globset(defaults: &[String], task_local: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in defaults.iter().chain(task_local.iter()) {
        let glob = Glob::new(pattern).map_err(|e| {
            PipelineError::ConfigError(format!("invalid glob pattern '{}': {}", pattern, e))
        })?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| PipelineError::ConfigError(format!("building external globset: {e}")))
}
