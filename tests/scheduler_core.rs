mod common;

use pipedag::dag::{Scheduler, TaskRunState};
use pipedag::engine::{CoreCommand, CoreRuntime, RuntimeEvent, TaskOutcome};
use pipedag::errors::TaskExecutionError;
use pipedag::pipeline::Pipeline;
use pipedag::report::TaskReport;
use pipedag::types::Target;

use pipedag_test_utils::mock_pipeline;

use common::{chain_config, diamond_config, seeded_fs};

fn scheduler_for(pipeline: &Pipeline, target: &Target, jobs: usize) -> Scheduler {
    let plan = pipeline.plan(target).expect("plan");
    Scheduler::from_plan(pipeline.registry(), pipeline.graph(), &plan, jobs).expect("scheduler")
}

fn names(tasks: &[pipedag::dag::ScheduledTask]) -> Vec<&str> {
    tasks.iter().map(|t| t.name.as_str()).collect()
}

#[test]
fn dispatches_waves_as_prerequisites_succeed() {
    let pipeline = mock_pipeline(diamond_config(), &seeded_fs());
    let mut sched = scheduler_for(&pipeline, &Target::Task("D".to_string()), 4);

    let first = sched.start();
    assert_eq!(names(&first), vec!["A"]);
    assert_eq!(sched.run_state_of("A"), Some(TaskRunState::Running));
    assert_eq!(sched.deps_satisfied("D"), Some(false));

    let second = sched.handle_completion("A", &TaskOutcome::Success);
    assert_eq!(names(&second), vec!["B", "C"]);
    assert_eq!(sched.running_count(), 2);

    assert!(sched.handle_completion("B", &TaskOutcome::Success).is_empty());
    let third = sched.handle_completion("C", &TaskOutcome::Success);
    assert_eq!(names(&third), vec!["D"]);
    assert_eq!(third[0].outputs, vec!["out/d.txt".to_string()]);
    assert_eq!(third[0].cmd.as_deref(), Some("make-d"));

    assert!(!sched.is_finished());
    sched.handle_completion("D", &TaskOutcome::Success);
    assert!(sched.is_finished());
}

#[test]
fn respects_the_parallelism_bound() {
    let pipeline = mock_pipeline(diamond_config(), &seeded_fs());
    let mut sched = scheduler_for(&pipeline, &Target::All, 1);
    assert_eq!(sched.max_parallel(), 1);

    assert_eq!(names(&sched.start()), vec!["A"]);
    assert_eq!(
        names(&sched.handle_completion("A", &TaskOutcome::Success)),
        vec!["B"]
    );
    assert_eq!(sched.run_state_of("C"), Some(TaskRunState::Pending));
    assert_eq!(sched.run_state_of("E"), Some(TaskRunState::Pending));
}

#[test]
fn failure_skips_transitive_dependents() {
    let pipeline = mock_pipeline(chain_config(), &seeded_fs());
    let mut sched = scheduler_for(&pipeline, &Target::All, 4);

    assert_eq!(names(&sched.start()), vec!["A", "D"]);

    let step = sched.step_completion(
        "A",
        &TaskOutcome::Failed(TaskExecutionError::NonZeroExit(2)),
    );
    assert!(step.newly_scheduled.is_empty());
    let skipped: Vec<&str> = step.newly_skipped.iter().map(|(t, _)| t.as_str()).collect();
    assert_eq!(skipped, vec!["B", "C"]);
    assert_eq!(sched.blocked_by("C"), Some("A"));
    assert_eq!(sched.run_state_of("A"), Some(TaskRunState::Failed));

    assert!(!sched.is_finished());
    let step = sched.step_completion("D", &TaskOutcome::Success);
    assert!(step.run_just_finished);
    assert!(sched.is_finished());
}

#[test]
fn completion_of_unknown_or_idle_task_is_ignored() {
    let pipeline = mock_pipeline(chain_config(), &seeded_fs());
    let mut sched = scheduler_for(&pipeline, &Target::All, 4);
    sched.start();

    assert!(sched.handle_completion("B", &TaskOutcome::Success).is_empty());
    assert_eq!(sched.run_state_of("B"), Some(TaskRunState::Pending));
    assert!(sched.handle_completion("ghost", &TaskOutcome::Success).is_empty());
}

#[test]
fn core_reports_interrupted_and_skipped_tasks_on_shutdown() {
    let pipeline = mock_pipeline(chain_config(), &seeded_fs());
    let plan = pipeline.plan(&Target::All).expect("plan");
    let sched = Scheduler::from_plan(pipeline.registry(), pipeline.graph(), &plan, 1)
        .expect("scheduler");
    let mut core = CoreRuntime::new(sched, &plan);

    let step = core.start();
    assert!(step.keep_running);
    assert!(matches!(
        step.commands.as_slice(),
        [CoreCommand::DispatchTasks(tasks)] if names(tasks) == vec!["A"]
    ));

    let step = core.step(RuntimeEvent::ShutdownRequested);
    assert!(!step.keep_running);
    assert_eq!(step.commands, vec![CoreCommand::RequestExit]);
    assert_eq!(core.scheduler().run_state_of("B"), Some(TaskRunState::Skipped));

    let report = core.into_report();
    assert!(report.is_complete());
    assert_eq!(
        report.get("A"),
        Some(&TaskReport::Failed(TaskExecutionError::Interrupted))
    );
    for name in ["B", "C", "D"] {
        assert_eq!(
            report.get(name),
            Some(&TaskReport::Skipped {
                failed_dependency: None
            }),
            "{name}"
        );
    }
}

#[test]
fn core_finishes_after_last_completion() {
    let pipeline = mock_pipeline(chain_config(), &seeded_fs());
    let plan = pipeline.plan(&Target::Task("B".to_string())).expect("plan");
    let sched = Scheduler::from_plan(pipeline.registry(), pipeline.graph(), &plan, 2)
        .expect("scheduler");
    let mut core = CoreRuntime::new(sched, &plan);

    core.start();
    let step = core.step(RuntimeEvent::TaskCompleted {
        task: "A".to_string(),
        outcome: TaskOutcome::Success,
    });
    assert!(step.keep_running);

    let step = core.step(RuntimeEvent::TaskCompleted {
        task: "B".to_string(),
        outcome: TaskOutcome::Success,
    });
    assert!(!step.keep_running);
    assert!(step.commands.contains(&CoreCommand::RequestExit));
    assert_eq!(core.report().succeeded(), vec!["A", "B"]);
}
