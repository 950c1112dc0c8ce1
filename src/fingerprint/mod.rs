// src/fingerprint/mod.rs

//! Artifact fingerprints and the durable fingerprint record.
//!
//! - [`hash`] computes blake3 digests of files and action strings.
//! - [`probe`] reads the *current* fingerprint of an artifact (content hash
//!   or mtime) through the [`crate::fs::FileSystem`] abstraction.
//! - [`cache`] memoises probes for a single staleness pass.
//! - [`store`] persists per-task records across process restarts.

pub mod cache;
pub mod hash;
pub mod probe;
pub mod store;

pub use cache::FingerprintCache;
pub use hash::{compute_file_hash, compute_text_digest};
pub use probe::{Fingerprint, FingerprintProbe};
pub use store::{
    FailureNote, FileFingerprintStore, FingerprintRecord, FingerprintStore, FingerprintTable,
    LastOutcome, MemoryFingerprintStore, SuccessEntry, STORE_FILE_NAME,
};
