// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fingerprint;
pub mod fs;
pub mod logging;
pub mod pipeline;
pub mod report;
pub mod types;

use std::process::ExitCode;

use anyhow::Result;
use tracing::debug;

use crate::cli::{CliArgs, Command};
use crate::pipeline::Pipeline;
use crate::types::Target;

/// High-level entry point used by `main.rs`.
///
/// Loads the pipeline named by `--config` and dispatches the subcommand.
/// Reports go to stdout; `make` yields a failing exit code unless every
/// planned task succeeded.
pub async fn run(args: CliArgs) -> Result<ExitCode> {
    let mut pipeline = Pipeline::load(&args.config)?;

    match args.command {
        Command::Plan(t) => {
            let plan = pipeline.plan_with(&Target::parse(t.target.as_deref()), t.force)?;
            print!("{plan}");
        }
        Command::Make { target, jobs } => {
            if let Some(jobs) = jobs {
                pipeline.set_jobs(jobs);
            }
            let target_name = Target::parse(target.target.as_deref());
            let report = pipeline.run_with(&target_name, target.force).await?;
            print!("{report}");
            if !report.is_success() {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Show => {
            let status = pipeline.status()?;
            print!("{status}");
        }
        Command::Touch(t) => {
            let touched = pipeline.touch_with(&Target::parse(t.target.as_deref()), t.force)?;
            if touched.is_empty() {
                println!("nothing touched");
            }
            for name in touched {
                println!("touched {name}");
            }
        }
        Command::List => print_task_list(&pipeline),
    }

    Ok(ExitCode::SUCCESS)
}

/// Print tasks, their dependencies, artifacts and commands.
fn print_task_list(pipeline: &Pipeline) {
    let registry = pipeline.registry();
    let cfg = pipeline.config();

    println!("pipedag tasks ({}):", registry.len());
    println!("  config.jobs = {}", pipeline.jobs());
    println!("  config.state_dir = {}", cfg.config.state_dir);
    println!();

    for task in registry.list_tasks() {
        if task.active {
            println!("  - {}", task.name);
        } else {
            println!("  - {} (inactive)", task.name);
        }
        match task.cmd.as_deref() {
            Some(cmd) => println!("      cmd: {cmd}"),
            None => println!("      cmd: (aggregate)"),
        }
        let deps = pipeline.graph().dependencies_of(&task.name);
        if !deps.is_empty() {
            println!("      after: {deps:?}");
        }
        let externals: Vec<&str> = task
            .inputs
            .iter()
            .filter(|i| i.is_external())
            .map(|i| i.path.as_str())
            .collect();
        if !externals.is_empty() {
            println!("      external inputs: {externals:?}");
        }
        if !task.outputs.is_empty() {
            println!("      outputs: {:?}", task.outputs);
        }
        println!("      fingerprint: {:?}", task.fingerprint);
        if let Some(timeout) = task.timeout {
            println!("      timeout: {timeout:?}");
        }
    }

    debug!("task listing complete (no execution)");
}
