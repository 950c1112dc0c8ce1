use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::fingerprint::hash::compute_file_hash;
use crate::fs::FileSystem;
use crate::types::FingerprintMode;

/// Recorded state of one artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Fingerprint {
    Hash { digest: String },
    Mtime { nanos: i64 },
}

impl Fingerprint {
    pub fn from_mtime(time: SystemTime) -> Self {
        let nanos = match time.duration_since(UNIX_EPOCH) {
            Ok(d) => i64::try_from(d.as_nanos()).unwrap_or(i64::MAX),
            Err(e) => -i64::try_from(e.duration().as_nanos()).unwrap_or(i64::MAX),
        };
        Fingerprint::Mtime { nanos }
    }

    /// Whether `self` (the current state) differs from `recorded`.
    ///
    /// Hashes compare by equality. Mtimes only count as changed when the
    /// current time is strictly newer than the recorded one by more than
    /// `epsilon`. Fingerprints of different kinds always count as changed.
    pub fn changed_since(&self, recorded: &Fingerprint, epsilon: Duration) -> bool {
        match (self, recorded) {
            (Fingerprint::Hash { digest: now }, Fingerprint::Hash { digest: then }) => now != then,
            (Fingerprint::Mtime { nanos: now }, Fingerprint::Mtime { nanos: then }) => {
                let eps = i64::try_from(epsilon.as_nanos()).unwrap_or(i64::MAX);
                now.saturating_sub(*then) > eps
            }
            _ => true,
        }
    }
}

/// Reads the current fingerprint of artifacts below a project root.
#[derive(Debug, Clone)]
pub struct FingerprintProbe {
    fs: Arc<dyn FileSystem>,
    root: PathBuf,
    epsilon: Duration,
}

impl FingerprintProbe {
    pub fn new(fs: Arc<dyn FileSystem>, root: impl Into<PathBuf>, epsilon: Duration) -> Self {
        Self {
            fs,
            root: root.into(),
            epsilon,
        }
    }

    pub fn epsilon(&self) -> Duration {
        self.epsilon
    }

    /// On-disk location of an artifact.
    pub fn resolve(&self, artifact: &str) -> PathBuf {
        let path = Path::new(artifact);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    /// Current fingerprint of an artifact, or `None` if it does not exist.
    pub fn current(&self, artifact: &str, mode: FingerprintMode) -> Result<Option<Fingerprint>> {
        let path = self.resolve(artifact);
        if !self.fs.is_file(&path) {
            return Ok(None);
        }

        let fp = match mode {
            FingerprintMode::Hash => Fingerprint::Hash {
                digest: compute_file_hash(self.fs.as_ref(), &path)?,
            },
            FingerprintMode::Mtime => Fingerprint::from_mtime(self.fs.modified(&path)?),
        };
        Ok(Some(fp))
    }
}
