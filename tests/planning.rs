mod common;

use std::sync::Arc;
use std::time::Duration;

use pipedag::config::{load_from_str, ConfigFile};
use pipedag::dag::{StaleReason, StalenessEvaluator};
use pipedag::fingerprint::FingerprintProbe;
use pipedag::report::TaskStatus;
use pipedag::types::Target;

use pipedag_test_utils::builders::{ConfigFileBuilder, TaskConfigBuilder};
use pipedag_test_utils::mock_pipeline;

use common::{diamond_config, run_plan, seeded_fs};

fn task(name: &str) -> Target {
    Target::Task(name.to_string())
}

#[test]
fn fresh_store_plans_target_and_all_ancestors() {
    let fs = seeded_fs();
    let pipeline = mock_pipeline(diamond_config(), &fs);

    let plan = pipeline.plan(&task("D")).expect("plan");
    assert_eq!(plan.names(), vec!["A", "B", "C", "D"]);
    assert!(plan.tasks.iter().all(|t| t.reason == StaleReason::NeverRun));
    assert!(!plan.contains("E"), "unrelated task must not be planned");
}

#[test]
fn whole_pipeline_covers_every_terminal_task() {
    let fs = seeded_fs();
    let pipeline = mock_pipeline(diamond_config(), &fs);

    let plan = pipeline.plan(&Target::All).expect("plan");
    assert_eq!(plan.names(), vec!["A", "B", "C", "D", "E"]);
    assert_eq!(plan.target, Target::All);
}

#[test]
fn planning_is_idempotent() {
    let fs = seeded_fs();
    let pipeline = mock_pipeline(diamond_config(), &fs);

    let first = pipeline.plan(&task("D")).expect("plan");
    let second = pipeline.plan(&task("D")).expect("plan");
    assert_eq!(first.tasks, second.tasks);
    assert!(pipeline.fingerprints().expect("table").task.is_empty());
}

#[test]
fn subset_target_only_plans_its_ancestors() {
    let fs = seeded_fs();
    let pipeline = mock_pipeline(diamond_config(), &fs);

    let plan = pipeline.plan(&task("C")).expect("plan");
    assert_eq!(plan.names(), vec!["A", "C"]);
}

#[tokio::test]
async fn diamond_replans_only_the_changed_branch() {
    let fs = seeded_fs();
    let pipeline = mock_pipeline(diamond_config(), &fs);

    let plan = pipeline.plan(&Target::All).expect("plan");
    let (report, _) = run_plan(&pipeline, plan, &fs, |e| e).await;
    assert!(report.is_success(), "{report}");
    assert!(pipeline.plan(&Target::All).expect("plan").is_empty());

    fs.add_file("data/b.txt", "b v2");

    let plan = pipeline.plan(&task("D")).expect("plan");
    assert_eq!(plan.names(), vec!["B", "D"]);
    assert_eq!(
        plan.reason_of("B"),
        Some(&StaleReason::InputChanged("data/b.txt".to_string()))
    );
    assert_eq!(
        plan.reason_of("D"),
        Some(&StaleReason::UpstreamStale("B".to_string()))
    );

    let plan = pipeline.plan(&Target::All).expect("plan");
    assert_eq!(plan.names(), vec!["B", "D"], "E is unaffected");
}

#[tokio::test]
async fn rewriting_an_input_with_identical_content_keeps_hash_tasks_fresh() {
    let fs = seeded_fs();
    let pipeline = mock_pipeline(diamond_config(), &fs);

    let plan = pipeline.plan(&Target::All).expect("plan");
    run_plan(&pipeline, plan, &fs, |e| e).await;

    // New mtime, same bytes.
    fs.add_file("data/a.txt", "a v1");
    assert!(pipeline.plan(&Target::All).expect("plan").is_empty());
}

#[tokio::test]
async fn change_at_the_root_propagates_downstream() {
    let fs = seeded_fs();
    let pipeline = mock_pipeline(diamond_config(), &fs);

    let plan = pipeline.plan(&Target::All).expect("plan");
    run_plan(&pipeline, plan, &fs, |e| e).await;

    fs.add_file("data/a.txt", "a v2");
    let plan = pipeline.plan(&task("D")).expect("plan");
    assert_eq!(plan.names(), vec!["A", "B", "C", "D"]);
    assert_eq!(
        plan.reason_of("C"),
        Some(&StaleReason::UpstreamStale("A".to_string()))
    );
}

#[tokio::test]
async fn deleted_output_makes_its_producer_stale() {
    let fs = seeded_fs();
    let pipeline = mock_pipeline(diamond_config(), &fs);

    let plan = pipeline.plan(&Target::All).expect("plan");
    run_plan(&pipeline, plan, &fs, |e| e).await;

    use pipedag::fs::FileSystem;
    fs.remove_file(std::path::Path::new("out/c.txt"))
        .expect("remove output");

    let plan = pipeline.plan(&Target::All).expect("plan");
    assert_eq!(plan.names(), vec!["C", "D"]);
    assert_eq!(
        plan.reason_of("C"),
        Some(&StaleReason::OutputMissing("out/c.txt".to_string()))
    );
}

#[tokio::test]
async fn hand_edited_output_is_detected_in_hash_mode() {
    let fs = seeded_fs();
    let pipeline = mock_pipeline(diamond_config(), &fs);

    let plan = pipeline.plan(&Target::All).expect("plan");
    run_plan(&pipeline, plan, &fs, |e| e).await;

    fs.add_file("out/e.txt", "edited by hand");
    let plan = pipeline.plan(&Target::All).expect("plan");
    assert_eq!(plan.names(), vec!["E"]);
    assert_eq!(
        plan.reason_of("E"),
        Some(&StaleReason::OutputChanged("out/e.txt".to_string()))
    );
}

#[tokio::test]
async fn force_marks_target_stale_and_propagates() {
    let fs = seeded_fs();
    let pipeline = mock_pipeline(diamond_config(), &fs);

    let plan = pipeline.plan(&Target::All).expect("plan");
    run_plan(&pipeline, plan, &fs, |e| e).await;

    let plan = pipeline.plan_with(&task("B"), true).expect("plan");
    assert_eq!(plan.names(), vec!["B"]);
    assert_eq!(plan.reason_of("B"), Some(&StaleReason::Forced));

    let plan = pipeline.plan_with(&Target::All, true).expect("plan");
    assert_eq!(plan.names(), vec!["A", "B", "C", "D", "E"]);
    assert!(plan.tasks.iter().all(|t| t.reason == StaleReason::Forced));
}

#[test]
fn full_keyword_selects_the_whole_pipeline() {
    assert_eq!(Target::parse(None), Target::All);
    assert_eq!(Target::parse(Some("full")), Target::All);
    assert_eq!(Target::parse(Some("align")), task("align"));
}

#[test]
fn task_named_full_shadows_the_keyword() {
    let cfg = ConfigFileBuilder::new()
        .with_task("prep", TaskConfigBuilder::new("make-prep").output("prep.txt").build())
        .with_task(
            "full",
            TaskConfigBuilder::new("make-full")
                .input("prep")
                .output("full.txt")
                .build(),
        )
        .with_task("other", TaskConfigBuilder::new("make-other").output("other.txt").build())
        .build();
    let pipeline = mock_pipeline(cfg, &seeded_fs());

    let plan = pipeline.plan(&Target::parse(Some("full"))).expect("plan");
    assert_eq!(plan.names(), vec!["prep", "full"]);
}

#[test]
fn topological_order_breaks_ties_by_declaration_order() {
    let cfg = ConfigFileBuilder::new()
        .with_task("z_last", TaskConfigBuilder::aggregate().after("m").after("a").build())
        .with_task("m", TaskConfigBuilder::new("make-m").build())
        .with_task("a", TaskConfigBuilder::new("make-a").build())
        .build();
    let pipeline = mock_pipeline(cfg, &seeded_fs());

    let plan = pipeline.plan(&task("z_last")).expect("plan");
    assert_eq!(plan.names(), vec!["m", "a", "z_last"]);
}

#[test]
fn plan_listing_names_every_task_and_reason() {
    let fs = seeded_fs();
    let pipeline = mock_pipeline(diamond_config(), &fs);

    let listing = pipeline.plan(&task("B")).expect("plan").to_string();
    assert!(listing.contains("plan for B (2 task(s))"), "{listing}");
    assert!(listing.contains("never run"));
}

#[tokio::test]
async fn is_stale_follows_a_changed_input_down_the_diamond() {
    let fs = seeded_fs();
    let pipeline = mock_pipeline(diamond_config(), &fs);
    let plan = pipeline.plan(&Target::All).expect("plan");
    let (report, _) = run_plan(&pipeline, plan, &fs, |e| e).await;
    assert!(report.is_success(), "{report}");

    for name in ["A", "B", "C", "D", "E"] {
        assert!(!pipeline.is_stale(name).expect("is_stale"), "{name}");
    }

    fs.add_file("data/b.txt", "b v2");
    let table = pipeline.fingerprints().expect("table");
    let reader = FingerprintProbe::new(Arc::new(fs.clone()), ".", Duration::from_secs(1));
    let evaluator =
        StalenessEvaluator::new(pipeline.registry(), pipeline.graph(), &table, &reader);

    for (name, stale) in [("A", false), ("B", true), ("C", false), ("D", true), ("E", false)] {
        assert_eq!(evaluator.is_stale(name).expect("is_stale"), stale, "{name}");
        assert_eq!(pipeline.is_stale(name).expect("is_stale"), stale, "{name}");
    }
    assert!(evaluator.is_stale("ghost").is_err());
}

/// `prep` feeds two alternative counting steps; `count_gex` is switched off.
fn modality_config() -> ConfigFile {
    ConfigFileBuilder::new()
        .with_external("data/**")
        .with_task(
            "prep",
            TaskConfigBuilder::new("make-prep")
                .input("data/in.txt")
                .output("prep.txt")
                .build(),
        )
        .with_task(
            "count_gex",
            TaskConfigBuilder::new("make-gex")
                .input("prep")
                .output("gex.txt")
                .inactive()
                .build(),
        )
        .with_task(
            "count_adt",
            TaskConfigBuilder::new("make-adt")
                .input("prep")
                .output("adt.txt")
                .build(),
        )
        .with_task(
            "summary",
            TaskConfigBuilder::aggregate()
                .after("count_gex")
                .after("count_adt")
                .build(),
        )
        .build()
}

#[test]
fn inactive_task_is_never_planned() {
    let pipeline = mock_pipeline(modality_config(), &seeded_fs());

    let plan = pipeline.plan(&Target::All).expect("plan");
    assert_eq!(plan.names(), vec!["prep", "count_adt", "summary"]);

    let forced = pipeline.plan_with(&Target::All, true).expect("plan");
    assert!(!forced.contains("count_gex"));

    let direct = pipeline.plan(&task("count_gex")).expect("plan");
    assert_eq!(direct.names(), vec!["prep"]);

    let status = pipeline.status().expect("status");
    assert_eq!(status.get("count_gex"), Some(&TaskStatus::Inactive));
    assert_eq!(status.get("count_adt"), Some(&TaskStatus::NeverRun));
}

#[tokio::test]
async fn dependents_treat_an_inactive_task_as_done() {
    let fs = seeded_fs();
    let pipeline = mock_pipeline(modality_config(), &fs);

    let plan = pipeline.plan(&Target::All).expect("plan");
    let (report, log) = run_plan(&pipeline, plan, &fs, |e| e).await;

    assert!(report.is_success(), "{report}");
    assert_eq!(log.executed(), vec!["prep", "count_adt", "summary"]);
    assert!(report.get("count_gex").is_none());
    assert!(fs.content_of("gex.txt").is_none());

    assert!(pipeline.plan(&Target::All).expect("plan").is_empty());
    assert!(!pipeline.is_stale("summary").expect("is_stale"));

    fs.add_file("data/in.txt", "in v2");
    let plan = pipeline.plan(&Target::All).expect("plan");
    assert_eq!(plan.names(), vec!["prep", "count_adt", "summary"]);
}

#[test]
fn active_flag_is_read_from_toml() {
    let cfg = load_from_str(
        r#"
        [task.on]
        cmd = "true"

        [task.off]
        cmd = "true"
        active = false

        [task.explicit]
        cmd = "true"
        active = true
        "#,
    )
    .expect("valid config");

    assert!(cfg.task["on"].is_active());
    assert!(!cfg.task["off"].is_active());
    assert!(cfg.task["explicit"].is_active());

    let pipeline = mock_pipeline(cfg, &seeded_fs());
    assert!(!pipeline.registry().get("off").expect("registered").active);
}
