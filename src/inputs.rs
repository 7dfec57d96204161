//! Input files - task descriptors, file lists and descriptions
//!
//! The three inputs are maintained separately and merged into one
//! [`TaskSpec`] per task before planning.

use crate::core::{FilePattern, TaskSpec};
use crate::error::{PlanError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

/// Declared resource footprint of one task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileListEntry {
    pub task_id: String,
    #[serde(default)]
    pub files: Vec<FilePattern>,
}

/// Human-readable description of one task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DescriptionEntry {
    pub task_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path).map_err(|e| PlanError::io(path, e))?;
    serde_json::from_str(&content).map_err(|e| PlanError::json(path, e))
}

/// Load the task descriptor list
pub fn load_tasks(path: &Path) -> Result<Vec<TaskSpec>> {
    let tasks: Vec<TaskSpec> = read_json(path)?;
    log::debug!("Loaded {} task descriptors from {}", tasks.len(), path.display());
    Ok(tasks)
}

pub fn load_file_list(path: &Path) -> Result<Vec<FileListEntry>> {
    read_json(path)
}

pub fn load_descriptions(path: &Path) -> Result<Vec<DescriptionEntry>> {
    read_json(path)
}

/// Merge file lists and descriptions into the task descriptors
///
/// A file-list entry for an unknown task is an error; a description for an
/// unknown task is skipped with a warning.
pub fn assemble_tasks(
    mut tasks: Vec<TaskSpec>,
    files: Vec<FileListEntry>,
    descriptions: Vec<DescriptionEntry>,
) -> Result<Vec<TaskSpec>> {
    let mut seen = HashSet::new();
    for task in &tasks {
        if !seen.insert(task.task_id.as_str()) {
            return Err(PlanError::DuplicateTask(task.task_id.clone()));
        }
    }

    let index: HashMap<String, usize> = tasks
        .iter()
        .enumerate()
        .map(|(i, t)| (t.task_id.clone(), i))
        .collect();

    for entry in files {
        let Some(&i) = index.get(&entry.task_id) else {
            return Err(PlanError::UnknownTask {
                task_id: entry.task_id,
                source_name: "file list".to_string(),
            });
        };
        tasks[i].files = entry.files;
    }

    for entry in descriptions {
        let Some(&i) = index.get(&entry.task_id) else {
            log::warn!("Skipping description for unknown task {}", entry.task_id);
            continue;
        };
        if entry.title.is_some() {
            tasks[i].title = entry.title;
        }
        if entry.description.is_some() {
            tasks[i].description = entry.description;
        }
    }

    for task in tasks.iter().filter(|t| t.files.is_empty()) {
        log::debug!("Task {} declares no files; it conflicts with nothing", task.task_id);
    }

    Ok(tasks)
}

/// Load and merge all inputs
pub fn load_inputs(
    tasks_path: &Path,
    files_path: &Path,
    descriptions_path: Option<&Path>,
) -> Result<Vec<TaskSpec>> {
    let tasks = load_tasks(tasks_path)?;
    let files = load_file_list(files_path)?;
    let descriptions = match descriptions_path {
        Some(path) => load_descriptions(path)?,
        None => Vec::new(),
    };
    assemble_tasks(tasks, files, descriptions)
}
