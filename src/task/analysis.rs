use std::collections::HashMap;

use tracing::debug;

use super::Task;

/// Log which explicit dependencies carry no file relationship and only
/// constrain ordering.
pub fn show_task_relationships(tasks: &[Task]) {
    let task_map: HashMap<&str, &Task> = tasks.iter().map(|t| (t.id.as_str(), t)).collect();

    for task in tasks {
        for dep_id in &task.dependencies {
            if let Some(dep_task) = task_map.get(dep_id.as_str()) {
                if !has_file_relationship(task, dep_task) {
                    debug!(
                        task = %task.id,
                        dependency = %dep_id,
                        "depends for ordering only"
                    );
                }
            }
        }
    }
}

fn has_file_relationship(task: &Task, dependency: &Task) -> bool {
    if dependency.targets.is_empty() || task.file_dep.is_empty() {
        return false;
    }

    dependency
        .targets
        .iter()
        .any(|target| task.file_dep.contains(target))
}

/// One line per task: name, padded, then its doc line.
pub fn list_tasks(tasks: &[Task]) -> Vec<String> {
    let width = tasks.iter().map(|t| t.id.len()).max().unwrap_or(0);

    let mut ids: Vec<&Task> = tasks.iter().collect();
    ids.sort_by(|a, b| a.id.cmp(&b.id));

    ids.into_iter()
        .map(|task| match &task.doc {
            Some(doc) => format!("{:width$}   {}", task.id, doc, width = width),
            None => task.id.clone(),
        })
        .collect()
}
