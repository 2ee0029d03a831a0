use std::{
    collections::{HashMap, HashSet},
    fmt,
    path::PathBuf,
    sync::Arc,
    thread,
};

use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::{
    action::{self, ExecContext},
    error::{DodoError, Result},
    fingerprint::{Comparison, Fingerprint},
    ledger::{Ledger, TaskRecord},
    task::{Task, TaskGraph},
};

fn default_workers() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

#[derive(Debug)]
pub struct ExecutionLevel {
    pub level: usize,
    pub task_ids: Vec<String>,
}

/// Group `tasks` so each level only depends on earlier levels. Within a
/// level tasks keep their order in `tasks`.
pub fn calculate_dependency_levels(tasks: &[Task]) -> Vec<ExecutionLevel> {
    let task_map: HashMap<&str, &Task> = tasks.iter().map(|t| (t.id.as_str(), t)).collect();
    let mut levels: HashMap<String, usize> = HashMap::new();

    for task in tasks {
        calculate_task_level(&task.id, &task_map, &mut levels);
    }

    let mut execution_levels: Vec<ExecutionLevel> = Vec::new();
    for task in tasks {
        let level = levels.get(task.id.as_str()).copied().unwrap_or(0);
        match execution_levels.iter_mut().find(|el| el.level == level) {
            Some(el) => el.task_ids.push(task.id.clone()),
            None => execution_levels.push(ExecutionLevel {
                level,
                task_ids: vec![task.id.clone()],
            }),
        }
    }

    execution_levels.sort_by_key(|el| el.level);
    execution_levels
}

fn calculate_task_level(
    task_id: &str,
    task_map: &HashMap<&str, &Task>,
    levels: &mut HashMap<String, usize>,
) -> usize {
    if let Some(&level) = levels.get(task_id) {
        return level;
    }

    let task = match task_map.get(task_id) {
        Some(task) => task,
        None => {
            levels.insert(task_id.to_string(), 0);
            return 0;
        }
    };

    if task.dependencies.is_empty() {
        levels.insert(task_id.to_string(), 0);
        return 0;
    }

    let max_dep_level = task
        .dependencies
        .iter()
        .map(|dep| calculate_task_level(dep, task_map, levels))
        .max()
        .unwrap_or(0);

    let level = max_dep_level + 1;
    levels.insert(task_id.to_string(), level);
    level
}

/// Why a task will or will not run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Staleness {
    AlwaysRun,
    /// Neither inputs nor targets are declared.
    Undeclared,
    MissingTarget(PathBuf),
    NoRecord,
    InputChanged(PathBuf),
    MissingInput(PathBuf),
    DependencyRan(String),
    UpToDate,
}

impl Staleness {
    pub fn is_stale(&self) -> bool {
        !matches!(self, Staleness::UpToDate)
    }
}

impl fmt::Display for Staleness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Staleness::AlwaysRun => write!(f, "always runs"),
            Staleness::Undeclared => write!(f, "no inputs or targets, always runs"),
            Staleness::MissingTarget(path) => write!(f, "target {} missing", path.display()),
            Staleness::NoRecord => write!(f, "no successful run recorded"),
            Staleness::InputChanged(path) => write!(f, "input {} changed", path.display()),
            Staleness::MissingInput(path) => write!(f, "input {} missing", path.display()),
            Staleness::DependencyRan(dep) => write!(f, "dependency {} ran", dep),
            Staleness::UpToDate => write!(f, "up to date"),
        }
    }
}

/// Decide whether `task` must run, given the ledger and the tasks that
/// already ran in this invocation.
pub fn check_staleness(task: &Task, ledger: &Ledger, ran: &HashSet<String>) -> Staleness {
    assess(task, ledger, ran).staleness
}

/// Staleness plus the fingerprints of inputs that were touched without
/// changing. Those are only collected for a task found up to date.
#[derive(Debug)]
pub struct Assessment {
    pub staleness: Staleness,
    pub touched: Vec<(PathBuf, Fingerprint)>,
}

impl Assessment {
    fn stale(staleness: Staleness) -> Self {
        Assessment {
            staleness,
            touched: Vec::new(),
        }
    }
}

pub fn assess(task: &Task, ledger: &Ledger, ran: &HashSet<String>) -> Assessment {
    if task.always_run {
        return Assessment::stale(Staleness::AlwaysRun);
    }

    if task.file_dep.is_empty() && task.targets.is_empty() {
        return Assessment::stale(Staleness::Undeclared);
    }

    if let Some(target) = task.targets.iter().find(|t| !t.exists()) {
        return Assessment::stale(Staleness::MissingTarget(target.clone()));
    }

    let record = match ledger.record(&task.id) {
        Some(record) if record.covers(&task.file_dep) => record,
        _ => return Assessment::stale(Staleness::NoRecord),
    };

    let mut touched = Vec::new();
    for path in &task.file_dep {
        let Some(fingerprint) = record.inputs.get(path) else {
            return Assessment::stale(Staleness::NoRecord);
        };
        match fingerprint.compare(path) {
            Ok(Comparison::Unchanged) => {}
            Ok(Comparison::Touched(fresh)) => touched.push((path.clone(), fresh)),
            Ok(Comparison::Changed) => {
                return Assessment::stale(Staleness::InputChanged(path.clone()));
            }
            Err(_) => return Assessment::stale(Staleness::MissingInput(path.clone())),
        }
    }

    if let Some(dep) = task.dependencies.iter().find(|d| ran.contains(*d)) {
        return Assessment::stale(Staleness::DependencyRan(dep.clone()));
    }

    Assessment {
        staleness: Staleness::UpToDate,
        touched,
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Defaults to the available parallelism.
    pub workers: Option<usize>,
    /// Keep running independent tasks after a failure.
    pub continue_on_failure: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub executed: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<String>,
    /// Not attempted because a dependency failed.
    pub blocked: Vec<String>,
}

pub struct TaskRunner<'a> {
    graph: &'a TaskGraph,
    ledger: &'a mut Ledger,
    ctx: Arc<ExecContext>,
    workers: usize,
    continue_on_failure: bool,
}

impl<'a> TaskRunner<'a> {
    pub fn new(
        graph: &'a TaskGraph,
        ledger: &'a mut Ledger,
        ctx: ExecContext,
        options: &RunOptions,
    ) -> Self {
        let workers = options.workers.unwrap_or_else(default_workers).max(1);
        Self {
            graph,
            ledger,
            ctx: Arc::new(ctx),
            workers,
            continue_on_failure: options.continue_on_failure,
        }
    }

    /// Staleness of each task in `task_ids` (dependencies first) without
    /// running anything. A stale task marks its dependents stale.
    pub fn plan(&self, task_ids: &[String]) -> Vec<(String, Staleness)> {
        let mut would_run = HashSet::new();

        task_ids
            .iter()
            .filter_map(|id| self.graph.get(id))
            .map(|task| {
                let staleness = check_staleness(task, self.ledger, &would_run);
                if staleness.is_stale() {
                    would_run.insert(task.id.clone());
                }
                (task.id.clone(), staleness)
            })
            .collect()
    }

    /// Run the stale tasks among `task_ids`, level by level.
    ///
    /// The ledger is updated for every task that succeeds, even when the run
    /// as a whole fails; the first failure is returned.
    pub async fn run_tasks(&mut self, task_ids: &[String]) -> Result<RunSummary> {
        let tasks_to_run: Vec<Task> = task_ids
            .iter()
            .filter_map(|task_id| self.graph.get(task_id))
            .cloned()
            .collect();

        let mut summary = RunSummary::default();
        if tasks_to_run.is_empty() {
            return Ok(summary);
        }

        let execution_levels = calculate_dependency_levels(&tasks_to_run);
        debug!(
            levels = execution_levels.len(),
            workers = self.workers,
            "execution plan ready"
        );

        let mut ran: HashSet<String> = HashSet::new();
        let mut broken: HashSet<String> = HashSet::new();
        let mut first_error: Option<DodoError> = None;

        for level in execution_levels {
            debug!(level = level.level, tasks = level.task_ids.len(), "starting level");

            let semaphore = Arc::new(Semaphore::new(self.workers));
            let mut handles = Vec::new();

            for task_id in &level.task_ids {
                let Some(task) = self.graph.get(task_id) else {
                    continue;
                };

                if let Some(dep) = task.dependencies.iter().find(|d| broken.contains(*d)) {
                    warn!(task = %task.id, dependency = %dep, "not run, dependency failed");
                    broken.insert(task.id.clone());
                    summary.blocked.push(task.id.clone());
                    continue;
                }

                let Assessment { staleness, touched } = assess(task, self.ledger, &ran);
                if !staleness.is_stale() {
                    if !touched.is_empty() {
                        debug!(task = %task.id, inputs = touched.len(), "refreshing touched inputs");
                        self.ledger.refresh(&task.id, touched);
                    }
                    info!(task = %task.id, "up to date");
                    summary.skipped.push(task.id.clone());
                    continue;
                }

                info!(task = %task.id, reason = %staleness, "running");

                let task = task.clone();
                let semaphore = Arc::clone(&semaphore);
                let ctx = Arc::clone(&self.ctx);

                let handle = tokio::spawn(async move {
                    match semaphore.acquire_owned().await {
                        Ok(_permit) => execute_single_task(&task, &ctx).await,
                        Err(e) => Err(DodoError::Task(format!("worker pool closed: {}", e))),
                    }
                });

                handles.push((task_id.clone(), handle));
            }

            for (task_id, handle) in handles {
                let outcome = match handle.await {
                    Ok(outcome) => outcome,
                    Err(e) => Err(DodoError::Task(format!(
                        "Task '{}' panicked: {}",
                        task_id, e
                    ))),
                };

                match outcome {
                    Ok(record) => {
                        if let Some(record) = record {
                            self.ledger.insert(&task_id, record);
                        }
                        info!(task = %task_id, "done");
                        ran.insert(task_id.clone());
                        summary.executed.push(task_id);
                    }
                    Err(e) => {
                        error!(task = %task_id, error = %e, "failed");
                        broken.insert(task_id.clone());
                        summary.failed.push(task_id);
                        first_error.get_or_insert(e);
                    }
                }
            }

            if first_error.is_some() && !self.continue_on_failure {
                warn!(level = level.level, "stopping after failure");
                break;
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(summary),
        }
    }
}

/// Run every action of `task` in order. On success returns the fingerprints
/// to record, or `None` for tasks that are never cached.
async fn execute_single_task(task: &Task, ctx: &ExecContext) -> Result<Option<TaskRecord>> {
    if let Some(missing) = task.file_dep.iter().find(|p| !p.exists()) {
        return Err(DodoError::Task(format!(
            "Task '{}': dependent file '{}' does not exist",
            task.id,
            missing.display()
        )));
    }

    for action in &task.actions {
        action::execute(&task.id, action, ctx)
            .await
            .map_err(|source| DodoError::Action {
                task: task.id.clone(),
                source,
            })?;
    }

    if let Some(missing) = task.targets.iter().find(|p| !p.exists()) {
        return Err(DodoError::Task(format!(
            "Task '{}' finished without creating target '{}'",
            task.id,
            missing.display()
        )));
    }

    if task.always_run {
        return Ok(None);
    }

    Ok(Some(TaskRecord::capture(&task.file_dep)?))
}
