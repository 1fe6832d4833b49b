use crate::types::Task;
use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;

/// Dataset loading - defines only the record format, not evaluation logic.
/// A dataset is either a JSON array of task objects or a JSON-lines file
/// with one task object per line. Order of the file is the evaluation order.

/// Parse dataset text in either supported format
pub fn parse_tasks(content: &str) -> Result<Vec<Task>> {
    if content.trim_start().starts_with('[') {
        return serde_json::from_str(content).context("Failed to parse dataset as a JSON array");
    }

    let mut tasks = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let task: Task = serde_json::from_str(line)
            .with_context(|| format!("Failed to parse dataset record on line {}", idx + 1))?;
        tasks.push(task);
    }
    Ok(tasks)
}

/// Load all tasks from a dataset file
pub fn load_tasks(path: &Path) -> Result<Vec<Task>> {
    if !path.exists() {
        bail!("Dataset file not found: {}", path.display());
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read dataset {}", path.display()))?;
    let tasks = parse_tasks(&content)?;

    tracing::info!(dataset = %path.display(), tasks = tasks.len(), "Dataset loaded");
    Ok(tasks)
}

/// Keep only the task with the given id
pub fn select_task(tasks: Vec<Task>, task_id: &str) -> Result<Vec<Task>> {
    let selected: Vec<Task> = tasks.into_iter().filter(|t| t.task_id == task_id).collect();
    if selected.is_empty() {
        bail!("The dataset has no entry for {}", task_id);
    }
    Ok(selected)
}
