// src/report/live.rs

use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};

use crate::types::TaskName;

/// Tasks currently being executed, shared between a run and status queries.
#[derive(Debug, Clone, Default)]
pub struct StatusTable {
    running: Arc<RwLock<BTreeSet<TaskName>>>,
}

impl StatusTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_running(&self, task: &str) {
        let mut running = self.running.write().unwrap_or_else(|e| e.into_inner());
        running.insert(task.to_string());
    }

    pub fn mark_finished(&self, task: &str) {
        let mut running = self.running.write().unwrap_or_else(|e| e.into_inner());
        running.remove(task);
    }

    pub fn is_running(&self, task: &str) -> bool {
        let running = self.running.read().unwrap_or_else(|e| e.into_inner());
        running.contains(task)
    }

    pub fn running(&self) -> Vec<TaskName> {
        let running = self.running.read().unwrap_or_else(|e| e.into_inner());
        running.iter().cloned().collect()
    }

    pub fn clear(&self) {
        let mut running = self.running.write().unwrap_or_else(|e| e.into_inner());
        running.clear();
    }
}
