#![allow(dead_code)]

use std::{
    fs,
    path::{Path, PathBuf},
    sync::Once,
};

use dodo::{
    action::{Action, ExecContext},
    error::Result,
    execution::{RunOptions, RunSummary, TaskRunner},
    ledger::Ledger,
    output::OutputMode,
    task::{Task, TaskGraph},
};
use tracing_subscriber::{EnvFilter, fmt};

static INIT: Once = Once::new();

/// Initialise tracing for tests; output only shows for failing tests.
///
/// Enable levels with e.g. `RUST_LOG=debug cargo test`.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt().with_env_filter(filter).with_test_writer().init();
    });
}

/// Process action appending `id` to `log`, one line per execution.
pub fn record_run(id: &str, log: &Path) -> Action {
    Action::run([
        "sh".to_string(),
        "-c".to_string(),
        format!("echo {} >> '{}'", id, log.display()),
    ])
}

/// Process action writing `content` to `target`.
pub fn produce(target: &Path, content: &str) -> Action {
    Action::run([
        "sh".to_string(),
        "-c".to_string(),
        format!("printf '%s' '{}' > '{}'", content, target.display()),
    ])
}

/// Executions recorded by [`record_run`], in order.
pub fn runs(log: &Path) -> Vec<String> {
    fs::read_to_string(log)
        .map(|s| s.lines().map(str::to_string).collect())
        .unwrap_or_default()
}

/// One full invocation: load the ledger, run `names` with their
/// dependencies, save the ledger.
pub async fn invoke(graph: &TaskGraph, ledger_file: &Path, names: &[&str]) -> Result<RunSummary> {
    let mut ledger = Ledger::load(ledger_file);
    let order = graph.required_tasks(names)?;

    let ctx = ExecContext {
        env: Vec::new(),
        output: OutputMode::Group,
    };
    let options = RunOptions {
        workers: Some(2),
        continue_on_failure: false,
    };

    let outcome = {
        let mut runner = TaskRunner::new(graph, &mut ledger, ctx, &options);
        runner.run_tasks(&order).await
    };
    ledger.save(ledger_file)?;
    outcome
}

pub fn counting_task(id: &str, log: &PathBuf) -> Task {
    Task::new(id).action(record_run(id, log))
}
