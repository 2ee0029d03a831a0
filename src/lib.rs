//! `dodo` sets up, builds, lints and tests a lab/server development checkout
//! as a graph of incremental tasks.
//!
//! Main pieces:
//! - `settings` / `commands`: paths and tool invocations, resolved once.
//! - `pipeline`: the task declarations.
//! - `task`: registry, dependency resolution and config file.
//! - `execution` / `action` / `launch`: the runner and its action executor.
//! - `ledger` / `fingerprint`: what the last successful run saw.

pub mod action;
pub mod cli;
pub mod commands;
pub mod error;
pub mod execution;
pub mod fingerprint;
pub mod launch;
pub mod ledger;
pub mod logging;
pub mod output;
pub mod pipeline;
pub mod settings;
pub mod task;

use std::env;

use tracing::{debug, info, warn};

use crate::{
    action::ExecContext,
    cli::Cli,
    commands::Commands,
    error::Result,
    execution::{RunOptions, TaskRunner},
    ledger::{Ledger, ledger_path},
    output::OutputMode,
    settings::Settings,
    task::{list_tasks, load_config, show_task_relationships},
};

/// Run one invocation described by `args`.
pub async fn run(args: Cli) -> Result<()> {
    let root = match &args.root {
        Some(root) => root.clone(),
        None => env::current_dir()?,
    };
    let config = load_config(&root.join(&args.file))?;

    let settings = Settings::from_env(&root)?;
    debug!(root = %root.display(), binder = settings.binder, "settings resolved");

    let commands = Commands::new(&settings);
    let graph = pipeline::build_graph(&settings, &commands)?;
    show_task_relationships(graph.tasks());

    if args.list {
        for line in list_tasks(graph.tasks()) {
            println!("{}", line);
        }
        return Ok(());
    }

    let ledger_file = ledger_path(&root, config.ledger.as_deref());
    let mut ledger = Ledger::load(&ledger_file);

    if args.forget {
        let names = if args.tasks.is_empty() {
            graph.default_tasks().to_vec()
        } else {
            args.tasks.clone()
        };
        for name in &names {
            for id in graph.expand(name)? {
                if ledger.forget(&id) {
                    info!(task = %id, "forgotten");
                }
            }
        }
        return ledger.save(&ledger_file);
    }

    let selection = if !args.tasks.is_empty() {
        args.tasks.clone()
    } else if let Some(defaults) = &config.default_tasks {
        defaults.clone()
    } else {
        graph.default_tasks().to_vec()
    };

    let task_list = graph.required_tasks(&selection)?;
    debug!(order = %task_list.join(" -> "), "task execution order");

    let ctx = ExecContext {
        env: settings.child_env(),
        output: args.output.or(config.output).unwrap_or(OutputMode::Stream),
    };
    let options = RunOptions {
        workers: args.workers.or(config.workers),
        continue_on_failure: args.continue_on_failure,
    };

    let mut runner = TaskRunner::new(&graph, &mut ledger, ctx, &options);

    if args.dry_run {
        println!("Dry run mode - showing what would be executed:");
        for (task_id, staleness) in runner.plan(&task_list) {
            if staleness.is_stale() {
                println!("  {} would run ({})", task_id, staleness);
                if let Some(task) = graph.get(&task_id) {
                    for action in &task.actions {
                        println!("      {}", action);
                    }
                }
            } else {
                println!("  {} is up to date", task_id);
            }
        }
        return Ok(());
    }

    let outcome = runner.run_tasks(&task_list).await;

    if let Err(e) = ledger.save(&ledger_file) {
        warn!(ledger = %ledger_file.display(), error = %e, "could not save ledger");
    }

    let summary = outcome?;
    info!(
        executed = summary.executed.len(),
        skipped = summary.skipped.len(),
        "all tasks done"
    );
    Ok(())
}
