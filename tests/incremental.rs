mod common;

use std::{
    error::Error,
    fs::{self, File},
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

use dodo::{
    action::ExecContext,
    execution::{RunOptions, Staleness, TaskRunner},
    fingerprint::Comparison,
    ledger::Ledger,
    output::OutputMode,
    task::{Task, TaskGraph, TaskRegistry},
};
use tempfile::{TempDir, tempdir};

use common::{init_tracing, invoke, produce, record_run, runs};

type TestResult = Result<(), Box<dyn Error>>;

struct Project {
    dir: TempDir,
    graph: TaskGraph,
}

impl Project {
    fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    fn log(&self) -> PathBuf {
        self.path("runs.log")
    }

    fn ledger(&self) -> PathBuf {
        self.path(".dodo-ledger.json")
    }

    async fn invoke_all(&self) -> dodo::error::Result<dodo::execution::RunSummary> {
        invoke(&self.graph, &self.ledger(), &["gen", "bundle", "report"]).await
    }
}

/// gen:a and gen:b are siblings; bundle consumes gen:a's output; report
/// depends on bundle by name only.
fn project() -> Result<Project, Box<dyn Error>> {
    init_tracing();

    let dir = tempdir()?;
    let root = dir.path();
    fs::create_dir_all(root.join("src"))?;
    fs::create_dir_all(root.join("out"))?;
    fs::write(root.join("src/a.txt"), "alpha")?;
    fs::write(root.join("src/b.txt"), "beta")?;

    let log = root.join("runs.log");
    let mut registry = TaskRegistry::new();

    for name in ["a", "b"] {
        let src = root.join(format!("src/{name}.txt"));
        let out = root.join(format!("out/{name}.out"));
        registry.register_in(
            "gen",
            Task::new(name)
                .file_dep([&src])
                .action(record_run(&format!("gen:{name}"), &log))
                .action(produce(&out, name))
                .targets([&out]),
        )?;
    }

    let bundle = root.join("out/bundle.out");
    registry.register(
        Task::new("bundle")
            .file_dep([root.join("out/a.out")])
            .action(record_run("bundle", &log))
            .action(produce(&bundle, "bundle"))
            .targets([&bundle]),
    )?;

    let report = root.join("out/report.out");
    registry.register(
        Task::new("report")
            .task_dep(["bundle"])
            .action(record_run("report", &log))
            .action(produce(&report, "report"))
            .targets([&report]),
    )?;

    let graph = registry.build()?;
    Ok(Project { dir, graph })
}

fn push_mtime_forward(path: &Path) -> TestResult {
    let later = SystemTime::now() + Duration::from_secs(10);
    File::options().write(true).open(path)?.set_modified(later)?;
    Ok(())
}

#[tokio::test]
async fn first_run_creates_every_target() -> TestResult {
    let project = project()?;

    let summary = project.invoke_all().await?;

    assert_eq!(summary.executed, vec!["gen:a", "gen:b", "bundle", "report"]);
    for task in project.graph.tasks() {
        for target in &task.targets {
            assert!(target.exists(), "{} missing after {}", target.display(), task.id);
        }
    }
    Ok(())
}

#[tokio::test]
async fn rerun_without_changes_starts_no_process() -> TestResult {
    let project = project()?;
    project.invoke_all().await?;
    let before = runs(&project.log());

    let summary = project.invoke_all().await?;

    assert!(summary.executed.is_empty());
    assert_eq!(summary.skipped.len(), 4);
    assert_eq!(runs(&project.log()), before);
    Ok(())
}

#[tokio::test]
async fn changed_input_reruns_its_chain_only() -> TestResult {
    let project = project()?;
    project.invoke_all().await?;

    fs::write(project.path("src/a.txt"), "alpha, revised")?;
    let summary = project.invoke_all().await?;

    assert_eq!(summary.executed, vec!["gen:a", "bundle", "report"]);
    assert_eq!(summary.skipped, vec!["gen:b"]);
    Ok(())
}

#[tokio::test]
async fn touched_but_identical_input_is_not_a_change() -> TestResult {
    let project = project()?;
    project.invoke_all().await?;

    let touched = project.path("src/b.txt");
    push_mtime_forward(&touched)?;
    let summary = project.invoke_all().await?;

    assert!(summary.executed.is_empty());
    let ledger = Ledger::load(&project.ledger());
    let stored = &ledger.record("gen:b").ok_or("gen:b not recorded")?.inputs[&touched];
    assert_eq!(stored.compare(&touched)?, Comparison::Unchanged);
    Ok(())
}

#[tokio::test]
async fn deleted_target_reruns_its_producer() -> TestResult {
    let project = project()?;
    project.invoke_all().await?;

    fs::remove_file(project.path("out/b.out"))?;
    let summary = project.invoke_all().await?;

    assert_eq!(summary.executed, vec!["gen:b"]);
    assert!(project.path("out/b.out").exists());
    Ok(())
}

#[tokio::test]
async fn forgotten_task_runs_again() -> TestResult {
    let project = project()?;
    project.invoke_all().await?;

    let mut ledger = Ledger::load(&project.ledger());
    assert!(ledger.forget("gen:b"));
    ledger.save(&project.ledger())?;

    let summary = project.invoke_all().await?;
    assert_eq!(summary.executed, vec!["gen:b"]);
    Ok(())
}

#[tokio::test]
async fn dry_run_plan_propagates_to_dependents() -> TestResult {
    let project = project()?;
    project.invoke_all().await?;
    fs::write(project.path("src/a.txt"), "alpha, revised")?;

    let mut ledger = Ledger::load(&project.ledger());
    let order = project.graph.required_tasks(&["gen", "bundle", "report"])?;
    let runner = TaskRunner::new(
        &project.graph,
        &mut ledger,
        ExecContext {
            env: Vec::new(),
            output: OutputMode::Group,
        },
        &RunOptions::default(),
    );

    let plan = runner.plan(&order);

    assert_eq!(
        plan,
        vec![
            (
                "gen:a".to_string(),
                Staleness::InputChanged(project.path("src/a.txt"))
            ),
            ("gen:b".to_string(), Staleness::UpToDate),
            (
                "bundle".to_string(),
                Staleness::DependencyRan("gen:a".to_string())
            ),
            (
                "report".to_string(),
                Staleness::DependencyRan("bundle".to_string())
            ),
        ]
    );
    assert_eq!(runs(&project.log()).len(), 4);
    Ok(())
}

#[tokio::test]
async fn failure_aborts_but_keeps_earlier_successes() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let log = dir.path().join("runs.log");
    let ok_out = dir.path().join("ok.out");
    let ledger_file = dir.path().join("ledger.json");

    let mut registry = TaskRegistry::new();
    registry.register(
        Task::new("ok")
            .action(record_run("ok", &log))
            .action(produce(&ok_out, "ok"))
            .targets([&ok_out]),
    )?;
    registry.register(
        Task::new("bad")
            .task_dep(["ok"])
            .action(dodo::action::Action::run(["sh", "-c", "exit 5"])),
    )?;
    registry.register(
        Task::new("after_bad")
            .task_dep(["bad"])
            .action(record_run("after_bad", &log)),
    )?;
    let graph = registry.build()?;

    let err = invoke(&graph, &ledger_file, &["after_bad"]).await.unwrap_err();

    assert_eq!(err.exit_code(), 5);
    assert_eq!(runs(&log), vec!["ok"]);
    assert!(Ledger::load(&ledger_file).record("ok").is_some());

    invoke(&graph, &ledger_file, &["after_bad"]).await.unwrap_err();
    assert_eq!(runs(&log), vec!["ok"], "recorded success is not repeated");
    Ok(())
}

#[tokio::test]
async fn missing_target_after_success_fails_the_task() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let promised = dir.path().join("never-written");

    let mut registry = TaskRegistry::new();
    registry.register(
        Task::new("liar")
            .action(dodo::action::Action::run(["true"]))
            .targets([&promised]),
    )?;
    let graph = registry.build()?;

    let err = invoke(&graph, &dir.path().join("ledger.json"), &["liar"])
        .await
        .unwrap_err();
    assert!(err.to_string().contains("without creating target"));
    Ok(())
}
