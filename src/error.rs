//! Error types for planning and status tracking

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while building or updating an execution plan
#[derive(Error, Debug)]
pub enum PlanError {
    /// The dependency relation contains a cycle; no plan can be produced
    #[error("circular dependency detected, scheduling is impossible (tasks involved: {})", .tasks.join(", "))]
    CircularDependency { tasks: Vec<String> },

    /// No task became ready while unscheduled tasks remain
    #[error("no schedulable task while {} remain unscheduled: {}", .remaining.len(), .remaining.join(", "))]
    Unschedulable { remaining: Vec<String> },

    #[error("duplicate task id: {0}")]
    DuplicateTask(String),

    /// A secondary input refers to a task missing from the task metadata list
    #[error("task {task_id} referenced in {source_name} is not present in the task list")]
    UnknownTask {
        task_id: String,
        source_name: String,
    },

    #[error("task not found in plan: {0}")]
    TaskNotFound(String),

    #[error("failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed JSON in {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("configuration error: {0}")]
    Config(String),
}

impl PlanError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias using PlanError
pub type Result<T> = std::result::Result<T, PlanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_message_names_tasks() {
        let err = PlanError::CircularDependency {
            tasks: vec!["a".to_string(), "b".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("scheduling is impossible"));
        assert!(msg.contains("a, b"));
    }

    #[test]
    fn test_io_error_includes_path() {
        let err = PlanError::io(
            "missing/tasks.json",
            std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        );
        assert!(err.to_string().contains("missing/tasks.json"));
    }
}
