// src/config/mod.rs

//! Configuration loading and validation for pipedag.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate structural invariants like known `after` references and
//!   parseable durations (`validate.rs`).
//!
//! Graph-level checks (duplicate outputs, input resolution, cycles) live in
//! [`crate::dag::registry`] and [`crate::dag::graph`].

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path, load_from_str};
pub use model::{ConfigFile, ConfigSection, DefaultSection, RawConfigFile, TaskConfig};
pub use validate::{external_globset, mtime_epsilon_of};
