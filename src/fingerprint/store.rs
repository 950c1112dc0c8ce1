use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::fingerprint::probe::Fingerprint;
use crate::types::TaskName;

/// File name of the store inside the state directory.
///
/// The effective path on disk is `<root>/<state_dir>/fingerprints.toml`.
pub const STORE_FILE_NAME: &str = "fingerprints.toml";

/// Durable per-task state, written after a task last succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintRecord {
    /// Store-wide success counter at the time of this success.
    pub stamp: u64,
    pub last_success: DateTime<Utc>,
    /// Digest of the action command that produced the outputs.
    pub action: String,
    #[serde(default)]
    pub inputs: BTreeMap<String, Fingerprint>,
    #[serde(default)]
    pub outputs: BTreeMap<String, Fingerprint>,
    /// Stamps of ordering-only prerequisites at the time of this success.
    #[serde(default)]
    pub upstream: BTreeMap<TaskName, u64>,
}

/// Everything a success commit needs except the stamp and clock.
#[derive(Debug, Clone, Default)]
pub struct SuccessEntry {
    pub action: String,
    pub inputs: BTreeMap<String, Fingerprint>,
    pub outputs: BTreeMap<String, Fingerprint>,
    pub upstream: BTreeMap<TaskName, u64>,
}

/// Note left by the last failed attempt of a task.
///
/// Kept apart from [`FingerprintRecord`] so a failure never rewrites the
/// record of the last success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureNote {
    pub reason: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LastOutcome {
    Succeeded,
    Failed,
}

/// The whole durable state, keyed by task name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintTable {
    #[serde(default)]
    pub serial: u64,
    #[serde(default)]
    pub task: BTreeMap<TaskName, FingerprintRecord>,
    #[serde(default)]
    pub failed: BTreeMap<TaskName, FailureNote>,
}

impl FingerprintTable {
    pub fn record(&self, task: &str) -> Option<&FingerprintRecord> {
        self.task.get(task)
    }

    pub fn failure(&self, task: &str) -> Option<&FailureNote> {
        self.failed.get(task)
    }

    pub fn stamp_of(&self, task: &str) -> Option<u64> {
        self.task.get(task).map(|r| r.stamp)
    }

    /// Outcome of the most recent attempt, or `None` if never attempted.
    pub fn last_outcome(&self, task: &str) -> Option<LastOutcome> {
        if self.failed.contains_key(task) {
            Some(LastOutcome::Failed)
        } else if self.task.contains_key(task) {
            Some(LastOutcome::Succeeded)
        } else {
            None
        }
    }

    fn apply_success(&mut self, task: &str, entry: SuccessEntry, now: DateTime<Utc>) -> FingerprintRecord {
        self.serial += 1;
        let record = FingerprintRecord {
            stamp: self.serial,
            last_success: now,
            action: entry.action,
            inputs: entry.inputs,
            outputs: entry.outputs,
            upstream: entry.upstream,
        };
        self.task.insert(task.to_string(), record.clone());
        self.failed.remove(task);
        record
    }

    fn apply_failure(&mut self, task: &str, reason: &str, now: DateTime<Utc>) {
        self.failed.insert(
            task.to_string(),
            FailureNote {
                reason: reason.to_string(),
                at: now,
            },
        );
    }

    fn retain_tasks(&mut self, active_tasks: &[&str]) -> usize {
        let before = self.task.len() + self.failed.len();
        self.task.retain(|k, _| active_tasks.contains(&k.as_str()));
        self.failed.retain(|k, _| active_tasks.contains(&k.as_str()));
        before - (self.task.len() + self.failed.len())
    }
}

/// Abstract storage for fingerprint records.
///
/// Implementations must make every mutation all-or-nothing: after an `Err`
/// the previous table is still what `load_all` returns.
pub trait FingerprintStore: Send + Sync {
    fn load_all(&self) -> Result<FingerprintTable>;
    fn record_success(&mut self, task: &str, entry: SuccessEntry) -> Result<FingerprintRecord>;
    fn record_failure(&mut self, task: &str, reason: &str) -> Result<()>;
    /// Remove records of tasks that are not in `active_tasks`.
    fn prune(&mut self, active_tasks: &[&str]) -> Result<usize>;
}

/// Stores the table in `<state_dir>/fingerprints.toml`.
///
/// The table is cached in memory; each mutation serialises a modified copy,
/// writes it atomically, and only then replaces the cached table.
pub struct FileFingerprintStore {
    path: PathBuf,
    table: FingerprintTable,
}

impl FileFingerprintStore {
    /// Open (or lazily create) the store below `state_dir`.
    pub fn open(state_dir: impl AsRef<Path>) -> Result<Self> {
        let path = state_dir.as_ref().join(STORE_FILE_NAME);
        let table = load_table(&path)?;
        debug!(path = %path.display(), tasks = table.task.len(), "opened fingerprint store");
        Ok(Self { path, table })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn commit(&mut self, next: FingerprintTable) -> Result<()> {
        let data = toml::to_string(&next).context("serialising fingerprint table")?;
        atomic_write(&self.path, data.as_bytes())?;
        self.table = next;
        Ok(())
    }
}

impl FingerprintStore for FileFingerprintStore {
    fn load_all(&self) -> Result<FingerprintTable> {
        Ok(self.table.clone())
    }

    fn record_success(&mut self, task: &str, entry: SuccessEntry) -> Result<FingerprintRecord> {
        let mut next = self.table.clone();
        let record = next.apply_success(task, entry, Utc::now());
        self.commit(next)?;
        info!(task = %task, stamp = record.stamp, "stored fingerprint record (file)");
        Ok(record)
    }

    fn record_failure(&mut self, task: &str, reason: &str) -> Result<()> {
        let mut next = self.table.clone();
        next.apply_failure(task, reason, Utc::now());
        self.commit(next)?;
        debug!(task = %task, "stored failure note (file)");
        Ok(())
    }

    fn prune(&mut self, active_tasks: &[&str]) -> Result<usize> {
        let mut next = self.table.clone();
        let removed = next.retain_tasks(active_tasks);
        if removed > 0 {
            self.commit(next)?;
            info!(removed, "pruned stale fingerprint records (file)");
        }
        Ok(removed)
    }
}

/// Stores records in memory only (lost on restart).
#[derive(Debug, Default)]
pub struct MemoryFingerprintStore {
    table: FingerprintTable,
}

impl MemoryFingerprintStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(table: FingerprintTable) -> Self {
        Self { table }
    }
}

impl FingerprintStore for MemoryFingerprintStore {
    fn load_all(&self) -> Result<FingerprintTable> {
        Ok(self.table.clone())
    }

    fn record_success(&mut self, task: &str, entry: SuccessEntry) -> Result<FingerprintRecord> {
        let record = self.table.apply_success(task, entry, Utc::now());
        info!(task = %task, stamp = record.stamp, "stored fingerprint record (memory)");
        Ok(record)
    }

    fn record_failure(&mut self, task: &str, reason: &str) -> Result<()> {
        self.table.apply_failure(task, reason, Utc::now());
        Ok(())
    }

    fn prune(&mut self, active_tasks: &[&str]) -> Result<usize> {
        let removed = self.table.retain_tasks(active_tasks);
        if removed > 0 {
            info!(removed, "pruned stale fingerprint records (memory)");
        }
        Ok(removed)
    }
}

fn load_table(path: &Path) -> Result<FingerprintTable> {
    if !path.exists() {
        return Ok(FingerprintTable::default());
    }

    let contents = fs::read_to_string(path)
        .with_context(|| format!("reading fingerprint store at {:?}", path))?;
    let table = toml::from_str(&contents)
        .with_context(|| format!("parsing fingerprint store at {:?}", path))?;
    Ok(table)
}

/// Write data to a file atomically using temp file + fsync + rename, so the
/// target is never left partially written.
fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating state directory at {:?}", parent))?;
    }

    let temp_path = path.with_extension("toml.tmp");

    let file = File::create(&temp_path)
        .with_context(|| format!("creating temp store file at {:?}", temp_path))?;
    let mut writer = BufWriter::new(file);
    writer.write_all(data)?;
    writer.flush()?;
    writer.get_ref().sync_all()?;
    drop(writer);

    if let Err(e) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(e).with_context(|| format!("replacing fingerprint store at {:?}", path));
    }

    debug!(path = %path.display(), "atomic store write completed");
    Ok(())
}
