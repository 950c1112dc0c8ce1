use std::collections::HashMap;

use anyhow::Result;
use tracing::debug;

use crate::fingerprint::probe::{Fingerprint, FingerprintProbe};
use crate::types::FingerprintMode;

/// Per-pass memo of artifact fingerprints.
///
/// An artifact consumed by several tasks is only read once per staleness
/// pass. Build a fresh cache for every pass: entries are never invalidated.
#[derive(Debug)]
pub struct FingerprintCache<'a> {
    probe: &'a FingerprintProbe,
    entries: HashMap<(String, FingerprintMode), Option<Fingerprint>>,
}

impl<'a> FingerprintCache<'a> {
    pub fn new(probe: &'a FingerprintProbe) -> Self {
        Self {
            probe,
            entries: HashMap::new(),
        }
    }

    pub fn probe(&self) -> &FingerprintProbe {
        self.probe
    }

    /// Get the fingerprint of an artifact, computing and caching it if necessary.
    pub fn get_or_compute(
        &mut self,
        artifact: &str,
        mode: FingerprintMode,
    ) -> Result<Option<Fingerprint>> {
        let key = (artifact.to_string(), mode);
        if let Some(fp) = self.entries.get(&key) {
            return Ok(fp.clone());
        }

        debug!(artifact = %artifact, ?mode, "cache miss: fingerprinting artifact");
        let fp = self.probe.current(artifact, mode)?;
        self.entries.insert(key, fp.clone());
        Ok(fp)
    }
}
