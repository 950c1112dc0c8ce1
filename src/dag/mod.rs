// src/dag/mod.rs

//! Task graph, staleness, planning and per-run scheduling.
//!
//! - [`registry`] turns config into typed task definitions and resolves
//!   every input to a producing task or an external file.
//! - [`graph`] holds the acyclic dependency graph.
//! - [`staleness`] decides which tasks must run and why.
//! - [`plan`] selects and orders the stale tasks a target needs.
//! - [`scheduler`] is the per-run state machine that dispatches planned
//!   tasks under the parallelism bound.
//! - [`task_info`], [`scheduler_step`] and [`state_manager`] support it.

pub mod graph;
pub mod plan;
pub mod registry;
pub mod scheduler;
pub mod scheduler_step;
pub mod staleness;
pub mod state_manager;
pub mod task_info;

pub use graph::DagGraph;
pub use plan::{PlannedTask, Planner, RunPlan};
pub use registry::{ArtifactInput, TaskDef, TaskRegistry};
pub use scheduler::Scheduler;
pub use scheduler_step::SchedulerStep;
pub use staleness::{Freshness, StaleReason, StalenessEvaluator, StalenessReport};
pub use task_info::{ScheduledTask, TaskRunState};
