// src/engine/core.rs

//! Pure core runtime state machine.
//!
//! The core consumes [`RuntimeEvent`]s and produces an updated state plus a
//! list of commands describing what the IO shell should do next. It has no
//! channels, no Tokio types, and performs no IO, so it can be driven by hand
//! in tests.

use crate::dag::{RunPlan, Scheduler};
use crate::engine::event_handlers::{handle_shutdown, handle_task_completion, start_run, CoreStep};
use crate::engine::RuntimeEvent;
use crate::report::RunReport;

#[derive(Debug)]
pub struct CoreRuntime {
    scheduler: Scheduler,
    report: RunReport,
}

impl CoreRuntime {
    pub fn new(scheduler: Scheduler, plan: &RunPlan) -> Self {
        let report = RunReport::new(
            plan.target.clone(),
            plan.tasks.iter().map(|t| t.name.clone()),
        );
        Self { scheduler, report }
    }

    pub fn is_finished(&self) -> bool {
        self.scheduler.is_finished()
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn report(&self) -> &RunReport {
        &self.report
    }

    pub fn into_report(self) -> RunReport {
        self.report
    }

    /// Dispatch the first wave. Call once, before feeding events.
    pub fn start(&mut self) -> CoreStep {
        start_run(&mut self.scheduler, &mut self.report)
    }

    /// Handle a single runtime event.
    pub fn step(&mut self, event: RuntimeEvent) -> CoreStep {
        match event {
            RuntimeEvent::TaskCompleted { task, outcome } => {
                handle_task_completion(&mut self.scheduler, &mut self.report, task, outcome)
            }
            RuntimeEvent::ShutdownRequested => handle_shutdown(&mut self.scheduler, &mut self.report),
        }
    }
}
