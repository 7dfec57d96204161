//! Task model - input descriptors, derived conflicts and completion state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a declared file pattern should be interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternKind {
    Exact,
    Regex,
    Glob,
}

impl Default for PatternKind {
    fn default() -> Self {
        Self::Exact
    }
}

impl fmt::Display for PatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact => write!(f, "exact"),
            Self::Regex => write!(f, "regex"),
            Self::Glob => write!(f, "glob"),
        }
    }
}

/// One entry of a task's resource footprint
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FilePattern {
    pub pattern: String,
    #[serde(rename = "type", default)]
    pub kind: PatternKind,
}

impl FilePattern {
    pub fn new(pattern: impl Into<String>, kind: PatternKind) -> Self {
        Self {
            pattern: pattern.into(),
            kind,
        }
    }

    pub fn exact(pattern: impl Into<String>) -> Self {
        Self::new(pattern, PatternKind::Exact)
    }

    pub fn regex(pattern: impl Into<String>) -> Self {
        Self::new(pattern, PatternKind::Regex)
    }

    pub fn glob(pattern: impl Into<String>) -> Self {
        Self::new(pattern, PatternKind::Glob)
    }
}

/// User-supplied task fields, as assembled from the input files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub task_id: String,
    /// Size label (S, M, L, XL or free-form); informational only
    #[serde(default)]
    pub size: String,
    #[serde(default)]
    pub expected_runtime_min: u32,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub enabler: bool,
    #[serde(default)]
    pub files: Vec<FilePattern>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl TaskSpec {
    pub fn new(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            size: String::new(),
            expected_runtime_min: 0,
            depends_on: Vec::new(),
            tags: Vec::new(),
            enabler: false,
            files: Vec::new(),
            title: None,
            description: None,
        }
    }

    pub fn with_runtime(mut self, minutes: u32) -> Self {
        self.expected_runtime_min = minutes;
        self
    }

    pub fn with_size(mut self, size: impl Into<String>) -> Self {
        self.size = size.into();
        self
    }

    pub fn with_deps<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_file(mut self, file: FilePattern) -> Self {
        self.files.push(file);
        self
    }
}

/// Task status within a persisted plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Completed,
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

/// Whether a task was closed by its own change or as a side effect of another
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionType {
    Direct,
    Incidental,
}

impl fmt::Display for CompletionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct => write!(f, "direct"),
            Self::Incidental => write!(f, "incidental"),
        }
    }
}

/// Completion metadata, present only once a task is completed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub completed_at: DateTime<Utc>,
    pub pr_number: u64,
    pub pr_url: String,
    pub completion_type: CompletionType,
    /// Triggering task for incidental completions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_runtime_min: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files_modified: Option<Vec<String>>,
}

/// Full task snapshot as stored inside a wave
///
/// Input fields, the derived conflict set and the mutable status live side by
/// side so their provenance stays visible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedTask {
    #[serde(flatten)]
    pub spec: TaskSpec,
    /// Derived by the conflict graph builder, never read from task input
    #[serde(default)]
    pub conflicts_with: Vec<String>,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(flatten)]
    pub completion: Option<Completion>,
}

impl PlannedTask {
    pub fn new(spec: TaskSpec, conflicts_with: Vec<String>) -> Self {
        Self {
            spec,
            conflicts_with,
            status: TaskStatus::Pending,
            completion: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.spec.task_id
    }

    pub fn is_completed(&self) -> bool {
        self.status == TaskStatus::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_defaults() {
        let spec: TaskSpec = serde_json::from_str(r#"{"task_id": "T1"}"#).unwrap();
        assert_eq!(spec.task_id, "T1");
        assert_eq!(spec.expected_runtime_min, 0);
        assert!(spec.depends_on.is_empty());
        assert!(!spec.enabler);
    }

    #[test]
    fn test_file_pattern_type_field() {
        let fp: FilePattern =
            serde_json::from_str(r#"{"pattern": "src/.*", "type": "regex"}"#).unwrap();
        assert_eq!(fp.kind, PatternKind::Regex);

        let fp: FilePattern = serde_json::from_str(r#"{"pattern": "a.ts"}"#).unwrap();
        assert_eq!(fp.kind, PatternKind::Exact);
    }

    #[test]
    fn test_pending_task_has_no_completion_fields() {
        let task = PlannedTask::new(TaskSpec::new("T1").with_size("S"), vec!["T2".into()]);
        let value = serde_json::to_value(&task).unwrap();
        assert_eq!(value["task_id"], "T1");
        assert_eq!(value["status"], "pending");
        assert_eq!(value["conflicts_with"][0], "T2");
        assert!(value.get("completed_at").is_none());
        assert!(value.get("pr_number").is_none());
    }

    #[test]
    fn test_completed_task_reads_back_flat_fields() {
        let json = r#"{
            "task_id": "T9",
            "size": "M",
            "expected_runtime_min": 30,
            "status": "completed",
            "completed_at": "2026-01-02T03:04:05Z",
            "pr_number": 42,
            "pr_url": "https://example.invalid/pr/42",
            "completion_type": "incidental",
            "completed_by": "T1",
            "files_modified": ["src/a.rs"]
        }"#;
        let task: PlannedTask = serde_json::from_str(json).unwrap();
        assert!(task.is_completed());
        let completion = task.completion.unwrap();
        assert_eq!(completion.pr_number, 42);
        assert_eq!(completion.completion_type, CompletionType::Incidental);
        assert_eq!(completion.completed_by.as_deref(), Some("T1"));
    }
}
