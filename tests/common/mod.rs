#![allow(dead_code)]

use pipedag_test_utils::builders::{ConfigFileBuilder, TaskConfigBuilder};
use pipedag_test_utils::fake_executor::{ExecutionLog, FakeExecutor};
use pipedag_test_utils::with_timeout;

use pipedag::config::ConfigFile;
use pipedag::dag::RunPlan;
use pipedag::fs::mock::MockFileSystem;
use pipedag::pipeline::Pipeline;
use pipedag::report::RunReport;

/// Diamond A -> {B, C} -> D, with external inputs `data/a.txt` (for A) and
/// `data/b.txt` (for B), plus an unrelated task E reading `data/e.txt`.
pub fn diamond_config() -> ConfigFile {
    ConfigFileBuilder::new()
        .with_external("data/**")
        .with_task(
            "A",
            TaskConfigBuilder::new("make-a")
                .input("data/a.txt")
                .output("out/a.txt")
                .build(),
        )
        .with_task(
            "B",
            TaskConfigBuilder::new("make-b")
                .input("out/a.txt")
                .input("data/b.txt")
                .output("out/b.txt")
                .build(),
        )
        .with_task(
            "C",
            TaskConfigBuilder::new("make-c")
                .input("out/a.txt")
                .output("out/c.txt")
                .build(),
        )
        .with_task(
            "D",
            TaskConfigBuilder::new("make-d")
                .input("B")
                .input("C")
                .output("out/d.txt")
                .build(),
        )
        .with_task(
            "E",
            TaskConfigBuilder::new("make-e")
                .input("data/e.txt")
                .output("out/e.txt")
                .build(),
        )
        .build()
}

/// Linear chain A -> B -> C over artifacts, with an independent task D.
pub fn chain_config() -> ConfigFile {
    ConfigFileBuilder::new()
        .with_external("data/**")
        .with_task(
            "A",
            TaskConfigBuilder::new("make-a")
                .input("data/in.txt")
                .output("out/a.txt")
                .build(),
        )
        .with_task(
            "B",
            TaskConfigBuilder::new("make-b")
                .input("out/a.txt")
                .output("out/b.txt")
                .build(),
        )
        .with_task(
            "C",
            TaskConfigBuilder::new("make-c")
                .input("out/b.txt")
                .output("out/c.txt")
                .build(),
        )
        .with_task(
            "D",
            TaskConfigBuilder::new("make-d")
                .input("data/in.txt")
                .output("out/d.txt")
                .build(),
        )
        .build()
}

/// Mock filesystem holding every `data/*` file the configs above read.
pub fn seeded_fs() -> MockFileSystem {
    let fs = MockFileSystem::new();
    for name in ["a", "b", "e", "in"] {
        fs.add_file(format!("data/{name}.txt"), format!("{name} v1"));
    }
    fs
}

/// Execute `plan` with a fake executor writing into `fs`.
pub async fn run_plan(
    pipeline: &Pipeline,
    plan: RunPlan,
    fs: &MockFileSystem,
    configure: impl FnOnce(FakeExecutor) -> FakeExecutor,
) -> (RunReport, ExecutionLog) {
    let log = ExecutionLog::new();
    let exec_log = log.clone();
    let fs = fs.clone();

    let report = with_timeout(pipeline.execute(plan, move |tx| {
        configure(FakeExecutor::new(tx, exec_log).with_filesystem(fs, "."))
    }))
    .await
    .expect("execution should not error");

    (report, log)
}
