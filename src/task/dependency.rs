use std::{
    collections::{HashMap, HashSet, VecDeque},
    path::PathBuf,
};

use super::Task;
use crate::error::{DodoError, Result};

/// Order `tasks` so every task comes after its dependencies. Ties keep the
/// order of `tasks`, so the result is stable across invocations.
pub fn sort_topologically(tasks: &[Task]) -> Vec<String> {
    let mut in_degrees: HashMap<&str, usize> = HashMap::new();

    for task in tasks {
        in_degrees.insert(&task.id, task.dependencies.len());
    }

    let mut queue: VecDeque<&str> = tasks
        .iter()
        .filter(|t| t.dependencies.is_empty())
        .map(|t| t.id.as_str())
        .collect();

    let mut sorted_tasks: Vec<String> = Vec::new();

    while let Some(task_id) = queue.pop_front() {
        sorted_tasks.push(task_id.to_string());

        for dependent in tasks {
            if !dependent.dependencies.iter().any(|dep| dep == task_id) {
                continue;
            }

            if let Some(degree) = in_degrees.get_mut(dependent.id.as_str()) {
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(&dependent.id);
                }
            }
        }
    }

    sorted_tasks
}

/// Tasks among `tasks` whose targets appear in `task`'s `file_dep`.
pub fn implicit_dependencies(task: &Task, tasks: &[Task]) -> Vec<String> {
    tasks
        .iter()
        .filter(|producer| producer.id != task.id)
        .filter(|producer| produces_any(producer, &task.file_dep))
        .map(|producer| producer.id.clone())
        .collect()
}

fn produces_any(producer: &Task, inputs: &[PathBuf]) -> bool {
    producer.targets.iter().any(|target| inputs.contains(target))
}

pub fn validate_tasks(tasks: &[Task]) -> Result<()> {
    let task_ids: HashSet<&str> = tasks.iter().map(|t| t.id.as_str()).collect();

    for task in tasks {
        for dep_id in &task.dependencies {
            if dep_id == &task.id {
                return Err(DodoError::Dependency(format!(
                    "Task '{}' depends on itself",
                    task.id
                )));
            }
            if !task_ids.contains(dep_id.as_str()) {
                return Err(DodoError::Dependency(format!(
                    "Task '{}' depends on '{}' which doesn't exist",
                    task.id, dep_id
                )));
            }
        }
    }

    detect_cycles(tasks)?;
    Ok(())
}

/// All tasks needed to run `target_task_ids`, dependencies first.
pub fn get_required_tasks(tasks: &[Task], target_task_ids: &[String]) -> Result<Vec<String>> {
    let task_map: HashMap<&str, &Task> = tasks.iter().map(|t| (t.id.as_str(), t)).collect();

    let mut needed_tasks = HashSet::new();
    let mut queue = VecDeque::new();

    for target in target_task_ids {
        if !task_map.contains_key(target.as_str()) {
            return Err(DodoError::Task(format!("Task '{}' not found", target)));
        }
        queue.push_back(target.as_str());
    }

    while let Some(current_task_id) = queue.pop_front() {
        if !needed_tasks.insert(current_task_id) {
            continue;
        }

        if let Some(task) = task_map.get(current_task_id) {
            for dep in &task.dependencies {
                if !needed_tasks.contains(dep.as_str()) {
                    queue.push_back(dep);
                }
            }
        }
    }

    let filtered_tasks: Vec<Task> = tasks
        .iter()
        .filter(|task| needed_tasks.contains(task.id.as_str()))
        .cloned()
        .collect();

    Ok(sort_topologically(&filtered_tasks))
}

fn detect_cycles(tasks: &[Task]) -> Result<()> {
    let task_map: HashMap<&str, &Task> = tasks.iter().map(|t| (t.id.as_str(), t)).collect();

    for task in tasks {
        let mut visited = HashSet::new();
        let mut path = Vec::new();

        if has_cycle(&task.id, &task_map, &mut visited, &mut path) {
            path.push(task.id.clone());
            return Err(DodoError::Dependency(format!(
                "Circular dependency: {}",
                path.join(" -> ")
            )));
        }
    }

    Ok(())
}

fn has_cycle(
    task_id: &str,
    task_map: &HashMap<&str, &Task>,
    visited: &mut HashSet<String>,
    path: &mut Vec<String>,
) -> bool {
    if path.iter().any(|id| id == task_id) {
        return true;
    }

    if visited.contains(task_id) {
        return false;
    }

    visited.insert(task_id.to_string());
    path.push(task_id.to_string());

    if let Some(task) = task_map.get(task_id) {
        for dep in &task.dependencies {
            if has_cycle(dep, task_map, visited, path) {
                return true;
            }
        }
    }

    path.pop();

    false
}
