use std::collections::HashMap;

use tracing::debug;

use super::{
    Task,
    dependency::{get_required_tasks, implicit_dependencies, validate_tasks},
};
use crate::error::{DodoError, Result};

/// Collects task declarations, one [`register`](Self::register) call each.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: Vec<Task>,
    index: HashMap<String, usize>,
    default_tasks: Vec<String>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, task: Task) -> Result<()> {
        if task.id.is_empty() {
            return Err(DodoError::Task("Task name must not be empty".to_string()));
        }
        if self.index.contains_key(&task.id) {
            return Err(DodoError::Task(format!(
                "Task '{}' is registered twice",
                task.id
            )));
        }

        self.index.insert(task.id.clone(), self.tasks.len());
        self.tasks.push(task);
        Ok(())
    }

    /// Register `task` as `group:<task.id>`.
    pub fn register_in(&mut self, group: &str, mut task: Task) -> Result<()> {
        task.id = format!("{}:{}", group, task.id);
        self.register(task)
    }

    pub fn set_default_tasks<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.default_tasks = names.into_iter().map(Into::into).collect();
    }

    /// Resolve every edge and validate the graph.
    pub fn build(self) -> Result<TaskGraph> {
        let TaskRegistry {
            mut tasks,
            index,
            default_tasks,
        } = self;

        let mut resolved = Vec::with_capacity(tasks.len());
        for task in &tasks {
            let mut dependencies = Vec::new();

            for name in &task.task_dep {
                let expanded = expand_name(&tasks, name).ok_or_else(|| {
                    DodoError::Dependency(format!(
                        "Task '{}' depends on '{}' which doesn't exist",
                        task.id, name
                    ))
                })?;
                dependencies.extend(expanded);
            }

            for producer in implicit_dependencies(task, &tasks) {
                debug!(task = %task.id, producer = %producer, "file dependency edge");
                dependencies.push(producer);
            }

            let mut seen = std::collections::HashSet::new();
            dependencies.retain(|d| seen.insert(d.clone()));
            resolved.push(dependencies);
        }

        for (task, dependencies) in tasks.iter_mut().zip(resolved) {
            task.dependencies = dependencies;
        }

        validate_tasks(&tasks)?;

        let graph = TaskGraph {
            tasks,
            index,
            default_tasks,
        };
        for name in &graph.default_tasks {
            graph.expand(name)?;
        }
        Ok(graph)
    }
}

/// Names addressed by `name`: the task itself, or every task in the group
/// `name` (nested groups included).
fn expand_name(tasks: &[Task], name: &str) -> Option<Vec<String>> {
    if tasks.iter().any(|t| t.id == name) {
        return Some(vec![name.to_string()]);
    }

    let prefix = format!("{}:", name);
    let members: Vec<String> = tasks
        .iter()
        .filter(|t| t.id.starts_with(&prefix))
        .map(|t| t.id.clone())
        .collect();

    if members.is_empty() { None } else { Some(members) }
}

/// Validated task set with resolved dependency edges.
#[derive(Debug)]
pub struct TaskGraph {
    tasks: Vec<Task>,
    index: HashMap<String, usize>,
    default_tasks: Vec<String>,
}

impl TaskGraph {
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.index.get(id).map(|&i| &self.tasks[i])
    }

    pub fn default_tasks(&self) -> &[String] {
        &self.default_tasks
    }

    /// Task ids selected by a task or group name.
    pub fn expand(&self, name: &str) -> Result<Vec<String>> {
        expand_name(&self.tasks, name)
            .ok_or_else(|| DodoError::Task(format!("Task '{}' not found", name)))
    }

    /// Everything needed to run `names`, dependencies first.
    pub fn required_tasks<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<String>> {
        let mut selected = Vec::new();
        for name in names {
            selected.extend(self.expand(name.as_ref())?);
        }
        get_required_tasks(&self.tasks, &selected)
    }
}
