pub mod analysis;
pub mod config;
pub mod dependency;
pub mod registry;

pub use analysis::{list_tasks, show_task_relationships};
pub use config::{RunConfiguration, load_config};
pub use dependency::{get_required_tasks, sort_topologically};
pub use registry::{TaskGraph, TaskRegistry};

use std::path::PathBuf;

use crate::action::Action;

#[derive(Debug, Clone)]
pub struct Task {
    /// Full name, `group:name` for grouped tasks.
    pub id: String,
    pub doc: Option<String>,
    pub file_dep: Vec<PathBuf>,
    pub targets: Vec<PathBuf>,
    pub actions: Vec<Action>,
    /// Explicit dependencies as declared; may name groups.
    pub task_dep: Vec<String>,
    /// Never cached, rerun on every invocation.
    pub always_run: bool,
    /// Resolved edges: explicit `task_dep` plus tasks producing a `file_dep`.
    /// Filled in by [`TaskRegistry::build`].
    pub dependencies: Vec<String>,
}

impl Task {
    pub fn new(id: impl Into<String>) -> Self {
        Task {
            id: id.into(),
            doc: None,
            file_dep: Vec::new(),
            targets: Vec::new(),
            actions: Vec::new(),
            task_dep: Vec::new(),
            always_run: false,
            dependencies: Vec::new(),
        }
    }

    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    pub fn file_dep<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.file_dep.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn targets<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.targets.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    pub fn task_dep<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.task_dep.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn always_run(mut self) -> Self {
        self.always_run = true;
        self
    }

    pub fn group(&self) -> Option<&str> {
        self.id.split_once(':').map(|(group, _)| group)
    }
}
