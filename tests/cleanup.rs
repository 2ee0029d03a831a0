mod common;

use std::{error::Error, fs};

use dodo::{
    action::Action,
    task::{Task, TaskRegistry},
};
use tempfile::tempdir;

use common::{counting_task, init_tracing, invoke, runs};

type TestResult = Result<(), Box<dyn Error>>;

#[tokio::test]
async fn cleanup_runs_every_time_and_tolerates_missing_paths() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let prefix = dir.path().join(".env");
    let marker = dir.path().join("build.ok");
    let log = dir.path().join("runs.log");
    fs::create_dir_all(prefix.join("conda-meta"))?;
    fs::write(prefix.join("conda-meta/history"), "")?;
    fs::write(&marker, "")?;

    let mut registry = TaskRegistry::new();
    registry.register(
        counting_task("clean_all", &log)
            .always_run()
            .action(Action::RemoveTree(prefix.clone()))
            .action(Action::Unlink(marker.clone())),
    )?;
    let graph = registry.build()?;
    let ledger_file = dir.path().join("ledger.json");

    invoke(&graph, &ledger_file, &["clean_all"]).await?;
    assert!(!prefix.exists());
    assert!(!marker.exists());

    let summary = invoke(&graph, &ledger_file, &["clean_all"]).await?;
    assert_eq!(summary.executed, vec!["clean_all"]);
    assert_eq!(runs(&log), vec!["clean_all", "clean_all"]);
    Ok(())
}

#[tokio::test]
async fn targetless_task_with_inputs_runs_once_per_change() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let source = dir.path().join("handler.py");
    let log = dir.path().join("runs.log");
    fs::write(&source, "x = 1\n")?;

    let mut registry = TaskRegistry::new();
    registry.register_in(
        "lint",
        counting_task("py", &log).file_dep([&source]),
    )?;
    let graph = registry.build()?;
    let ledger_file = dir.path().join("ledger.json");

    invoke(&graph, &ledger_file, &["lint"]).await?;
    invoke(&graph, &ledger_file, &["lint"]).await?;
    assert_eq!(runs(&log), vec!["py"]);

    fs::write(&source, "x = 2\n")?;
    invoke(&graph, &ledger_file, &["lint:py"]).await?;
    assert_eq!(runs(&log), vec!["py", "py"]);
    Ok(())
}

#[tokio::test]
async fn undeclared_task_always_runs() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let log = dir.path().join("runs.log");

    let mut registry = TaskRegistry::new();
    registry.register(counting_task("test", &log))?;
    registry.register(Task::new("all").task_dep(["test"]))?;
    let graph = registry.build()?;
    let ledger_file = dir.path().join("ledger.json");

    invoke(&graph, &ledger_file, &["all"]).await?;
    invoke(&graph, &ledger_file, &["all"]).await?;
    assert_eq!(runs(&log), vec!["test", "test"]);
    Ok(())
}
