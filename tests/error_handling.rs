mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use pipedag::config::load_from_str;
use pipedag::errors::PipelineError;
use pipedag::fingerprint::{
    FingerprintRecord, FingerprintStore, FingerprintTable, MemoryFingerprintStore, SuccessEntry,
};
use pipedag::fs::mock::MockFileSystem;
use pipedag::pipeline::Pipeline;
use pipedag::types::{parse_duration, Target};

use pipedag_test_utils::builders::{ConfigFileBuilder, TaskConfigBuilder};
use pipedag_test_utils::mock_pipeline;

use common::{chain_config, seeded_fs};

fn pipeline_error(cfg: pipedag::config::ConfigFile) -> PipelineError {
    match Pipeline::from_config(
        cfg,
        ".",
        Box::new(MemoryFingerprintStore::new()),
        Arc::new(MockFileSystem::new()),
    ) {
        Ok(_) => panic!("expected pipeline construction to fail"),
        Err(e) => e,
    }
}

#[test]
fn after_cycle_is_reported_with_its_path() {
    let cfg = ConfigFileBuilder::new()
        .with_task("a", TaskConfigBuilder::new("true").after("c").build())
        .with_task("b", TaskConfigBuilder::new("true").after("a").build())
        .with_task("c", TaskConfigBuilder::new("true").after("b").build())
        .build();

    match pipeline_error(cfg) {
        PipelineError::DagCycle { path } => {
            assert!(path.len() >= 4, "cycle path too short: {path:?}");
            assert_eq!(path.first(), path.last(), "cycle must close on itself");
            for name in ["a", "b", "c"] {
                assert!(path.iter().any(|p| p == name), "{name} missing from {path:?}");
            }
        }
        other => panic!("expected DagCycle, got {other:?}"),
    }
}

#[test]
fn cycle_through_artifacts_is_rejected() {
    let cfg = ConfigFileBuilder::new()
        .with_task(
            "left",
            TaskConfigBuilder::new("true")
                .input("right.txt")
                .output("left.txt")
                .build(),
        )
        .with_task(
            "right",
            TaskConfigBuilder::new("true")
                .input("left.txt")
                .output("right.txt")
                .build(),
        )
        .build();

    let err = pipeline_error(cfg);
    assert!(matches!(err, PipelineError::DagCycle { .. }), "got {err:?}");
    assert!(err.is_configuration_error());
}

#[test]
fn duplicate_output_is_a_configuration_error() {
    let cfg = ConfigFileBuilder::new()
        .with_task("one", TaskConfigBuilder::new("true").output("shared.txt").build())
        .with_task("two", TaskConfigBuilder::new("true").output("./shared.txt").build())
        .build();

    match pipeline_error(cfg) {
        PipelineError::ConfigError(msg) => {
            assert!(msg.contains("declared by both"), "unexpected message: {msg}");
            assert!(msg.contains("shared.txt"));
        }
        other => panic!("expected ConfigError, got {other:?}"),
    }
}

#[test]
fn unresolved_input_is_a_configuration_error() {
    let cfg = ConfigFileBuilder::new()
        .with_task(
            "consume",
            TaskConfigBuilder::new("true")
                .input("nowhere.txt")
                .output("out.txt")
                .build(),
        )
        .build();

    match pipeline_error(cfg) {
        PipelineError::ConfigError(msg) => assert!(msg.contains("nowhere.txt"), "{msg}"),
        other => panic!("expected ConfigError, got {other:?}"),
    }
}

#[test]
fn task_local_external_pattern_resolves_input() {
    let cfg = ConfigFileBuilder::new()
        .with_task(
            "consume",
            TaskConfigBuilder::new("true")
                .input("raw/reads.fq")
                .external("raw/*.fq")
                .output("out.txt")
                .build(),
        )
        .build();

    let pipeline = Pipeline::from_config(
        cfg,
        ".",
        Box::new(MemoryFingerprintStore::new()),
        Arc::new(MockFileSystem::new()),
    )
    .expect("external input should resolve");
    let task = pipeline.registry().get_task("consume").expect("task exists");
    assert!(task.inputs[0].is_external());
}

#[test]
fn unknown_after_dependency_is_rejected_at_validation() {
    let err = ConfigFileBuilder::new()
        .with_task("a", TaskConfigBuilder::new("true").after("ghost").build())
        .try_build()
        .expect_err("unknown `after` must fail");

    match err {
        PipelineError::ConfigError(msg) => assert!(msg.contains("ghost"), "{msg}"),
        other => panic!("expected ConfigError, got {other:?}"),
    }
}

#[test]
fn zero_jobs_and_bad_durations_are_rejected() {
    let err = ConfigFileBuilder::new()
        .jobs(0)
        .with_task("a", TaskConfigBuilder::new("true").build())
        .try_build()
        .expect_err("jobs = 0 must fail");
    assert!(err.is_configuration_error());

    let err = ConfigFileBuilder::new()
        .with_task("a", TaskConfigBuilder::new("true").timeout("soon").build())
        .try_build()
        .expect_err("bad timeout must fail");
    assert!(matches!(err, PipelineError::ConfigError(_)));

    let err = ConfigFileBuilder::new()
        .mtime_epsilon("1 fortnight")
        .with_task("a", TaskConfigBuilder::new("true").build())
        .try_build()
        .expect_err("bad epsilon must fail");
    assert!(matches!(err, PipelineError::ConfigError(_)));
}

#[test]
fn oversized_timeouts_are_rejected_instead_of_wrapping() {
    assert!(parse_duration("5124095576030432h").is_err());
    assert!(parse_duration("307445734561825861m").is_err());
    assert_eq!(
        parse_duration("5124095576030431h"),
        Ok(Duration::from_secs(5_124_095_576_030_431 * 3600))
    );
    assert_eq!(parse_duration("90m"), Ok(Duration::from_secs(5400)));

    let err = ConfigFileBuilder::new()
        .with_task(
            "a",
            TaskConfigBuilder::new("true").timeout("5124095576030432h").build(),
        )
        .try_build()
        .expect_err("overflowing timeout must fail");
    match err {
        PipelineError::ConfigError(msg) => assert!(msg.contains("too large"), "{msg}"),
        other => panic!("expected ConfigError, got {other:?}"),
    }
}

#[test]
fn malformed_toml_is_a_toml_error() {
    let err = load_from_str("[task.a\ncmd = ").expect_err("broken TOML must fail");
    assert!(matches!(err, PipelineError::TomlError(_)), "got {err:?}");
    assert!(err.is_configuration_error());
}

#[test]
fn config_without_tasks_is_rejected() {
    let err = load_from_str("[config]\njobs = 2\n").expect_err("no tasks must fail");
    assert!(matches!(err, PipelineError::ConfigError(_)));
}

#[test]
fn valid_toml_round_trips_into_a_pipeline() {
    let cfg = load_from_str(
        r#"
        [default]
        external = ["data/**"]

        [task.ingest]
        cmd = "cp data/in.txt ingest.txt"
        inputs = ["data/in.txt"]
        outputs = ["ingest.txt"]

        [task.align]
        cmd = "cp ingest.txt align.txt"
        inputs = ["ingest"]
        outputs = ["align.txt"]
        "#,
    )
    .expect("valid config");

    let pipeline = mock_pipeline(cfg, &MockFileSystem::new());
    assert_eq!(pipeline.graph().dependencies_of("align"), vec!["ingest"]);
}

/// Store that counts how often it is read.
#[derive(Default)]
struct CountingStore {
    inner: MemoryFingerprintStore,
    loads: Arc<AtomicUsize>,
}

impl FingerprintStore for CountingStore {
    fn load_all(&self) -> anyhow::Result<FingerprintTable> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.inner.load_all()
    }

    fn record_success(
        &mut self,
        task: &str,
        entry: SuccessEntry,
    ) -> anyhow::Result<FingerprintRecord> {
        self.inner.record_success(task, entry)
    }

    fn record_failure(&mut self, task: &str, reason: &str) -> anyhow::Result<()> {
        self.inner.record_failure(task, reason)
    }

    fn prune(&mut self, active_tasks: &[&str]) -> anyhow::Result<usize> {
        self.inner.prune(active_tasks)
    }
}

#[test]
fn unknown_target_fails_before_reading_the_store() {
    let loads = Arc::new(AtomicUsize::new(0));
    let store = CountingStore {
        inner: MemoryFingerprintStore::new(),
        loads: Arc::clone(&loads),
    };
    let pipeline =
        Pipeline::from_config(chain_config(), ".", Box::new(store), Arc::new(seeded_fs()))
            .expect("valid pipeline");

    let err = pipeline
        .plan(&Target::Task("nope".to_string()))
        .expect_err("unknown target must fail");
    assert!(matches!(err, PipelineError::UnknownTarget(ref t) if t == "nope"));

    let err = pipeline
        .touch(&Target::Task("nope".to_string()))
        .expect_err("unknown target must fail");
    assert!(matches!(err, PipelineError::UnknownTarget(_)));

    assert_eq!(loads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn run_of_unknown_target_executes_nothing() {
    let fs = seeded_fs();
    let pipeline = mock_pipeline(chain_config(), &fs);

    let err = pipeline
        .run(&Target::Task("nope".to_string()))
        .await
        .expect_err("unknown target must fail");
    assert!(matches!(err, PipelineError::UnknownTarget(_)));
    assert!(pipeline.fingerprints().expect("table").task.is_empty());
}
