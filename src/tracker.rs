//! Status tracking - folds completion events back into a persisted plan
//!
//! Only status fields change: tasks stay in their wave and position.

use crate::core::{Completion, CompletionType, ExecutionPlan, TaskStatus};
use crate::error::{PlanError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Share of a task's declared patterns that must be modified for the task to
/// count as incidentally completed
pub const DEFAULT_INCIDENTAL_THRESHOLD: f64 = 0.5;

/// External event closing a task
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionEvent {
    pub pr_number: u64,
    pub pr_url: String,
    pub completion_type: CompletionType,
    pub actual_runtime_min: Option<u32>,
    pub files_modified: Option<Vec<String>>,
    pub completed_by: Option<String>,
}

impl CompletionEvent {
    /// A task closed by its own change
    pub fn direct(pr_number: u64, pr_url: impl Into<String>) -> Self {
        Self {
            pr_number,
            pr_url: pr_url.into(),
            completion_type: CompletionType::Direct,
            actual_runtime_min: None,
            files_modified: None,
            completed_by: None,
        }
    }

    /// A task closed as a side effect of `primary`'s change
    pub fn incidental(
        pr_number: u64,
        pr_url: impl Into<String>,
        primary: impl Into<String>,
        files: Vec<String>,
    ) -> Self {
        Self {
            pr_number,
            pr_url: pr_url.into(),
            completion_type: CompletionType::Incidental,
            actual_runtime_min: None,
            files_modified: Some(files),
            completed_by: Some(primary.into()),
        }
    }

    pub fn with_runtime(mut self, minutes: Option<u32>) -> Self {
        self.actual_runtime_min = minutes;
        self
    }

    pub fn with_files(mut self, files: Option<Vec<String>>) -> Self {
        self.files_modified = files.filter(|f| !f.is_empty());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkOutcome {
    Completed,
    /// Task was already completed; nothing changed
    AlreadyCompleted,
}

/// Applies completion events to an execution plan in place
pub struct StatusTracker<'a> {
    plan: &'a mut ExecutionPlan,
    incidental_threshold: f64,
}

impl<'a> StatusTracker<'a> {
    pub fn new(plan: &'a mut ExecutionPlan) -> Self {
        Self {
            plan,
            incidental_threshold: DEFAULT_INCIDENTAL_THRESHOLD,
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.incidental_threshold = threshold;
        self
    }

    /// Mark a task completed; a second call for the same task is a no-op
    pub fn mark_complete(&mut self, task_id: &str, event: CompletionEvent) -> Result<MarkOutcome> {
        let task = self
            .plan
            .find_task_mut(task_id)
            .ok_or_else(|| PlanError::TaskNotFound(task_id.to_string()))?;

        if task.is_completed() {
            log::warn!("Task {} is already completed, leaving it unchanged", task_id);
            return Ok(MarkOutcome::AlreadyCompleted);
        }

        task.status = TaskStatus::Completed;
        task.completion = Some(Completion {
            completed_at: Utc::now(),
            pr_number: event.pr_number,
            pr_url: event.pr_url,
            completion_type: event.completion_type,
            completed_by: event.completed_by,
            actual_runtime_min: event.actual_runtime_min,
            files_modified: event.files_modified,
        });

        log::info!(
            "Marked {} complete ({}, PR #{})",
            task_id,
            event.completion_type,
            event.pr_number
        );
        Ok(MarkOutcome::Completed)
    }

    /// Complete every pending task whose declared patterns were mostly
    /// modified by `primary`'s change
    ///
    /// Patterns are compared to `modified_files` as literal strings. Returns
    /// the ids of tasks completed this way, in plan order.
    pub fn detect_incidental_completions(
        &mut self,
        primary: &str,
        modified_files: &[String],
        pr_number: u64,
        pr_url: &str,
    ) -> Result<Vec<String>> {
        if self.plan.find_task(primary).is_none() {
            return Err(PlanError::TaskNotFound(primary.to_string()));
        }

        let modified: HashSet<&str> = modified_files.iter().map(String::as_str).collect();
        let mut hits: Vec<(String, Vec<String>)> = Vec::new();

        for task in self.plan.tasks() {
            if task.id() == primary || task.is_completed() || task.spec.files.is_empty() {
                continue;
            }

            let mut overlap: Vec<String> = Vec::new();
            for file in &task.spec.files {
                if modified.contains(file.pattern.as_str()) && !overlap.contains(&file.pattern) {
                    overlap.push(file.pattern.clone());
                }
            }
            if overlap.is_empty() {
                continue;
            }

            let ratio = overlap.len() as f64 / task.spec.files.len() as f64;
            log::debug!(
                "{}: {}/{} declared files modified by {}",
                task.id(),
                overlap.len(),
                task.spec.files.len(),
                primary
            );
            if ratio >= self.incidental_threshold {
                hits.push((task.id().to_string(), overlap));
            }
        }

        let mut completed = Vec::new();
        for (task_id, files) in hits {
            let event = CompletionEvent::incidental(pr_number, pr_url, primary, files);
            if self.mark_complete(&task_id, event)? == MarkOutcome::Completed {
                completed.push(task_id);
            }
        }

        if !completed.is_empty() {
            log::info!(
                "{} incidentally completed by {}: {}",
                completed.len(),
                primary,
                completed.join(", ")
            );
        }
        Ok(completed)
    }

    pub fn progress_report(&self) -> ProgressReport {
        ProgressReport::from_plan(self.plan)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedItem {
    pub task_id: String,
    pub wave_number: usize,
    pub completion_type: CompletionType,
    pub pr_number: u64,
    pub pr_url: String,
    pub completed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingItem {
    pub task_id: String,
    pub wave_number: usize,
}

/// Completion progress of a plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressReport {
    pub total: usize,
    pub completed_direct: usize,
    pub completed_incidental: usize,
    pub pending: usize,
    pub percent_complete: f64,
    /// Lowest wave that still has pending work
    pub next_wave: Option<usize>,
    pub completed_tasks: Vec<CompletedItem>,
    pub pending_tasks: Vec<PendingItem>,
}

impl ProgressReport {
    pub fn from_plan(plan: &ExecutionPlan) -> Self {
        let mut completed_tasks = Vec::new();
        let mut pending_tasks = Vec::new();

        for wave in &plan.waves {
            for task in &wave.tasks {
                match (&task.status, &task.completion) {
                    (TaskStatus::Completed, Some(c)) => completed_tasks.push(CompletedItem {
                        task_id: task.id().to_string(),
                        wave_number: wave.wave_number,
                        completion_type: c.completion_type,
                        pr_number: c.pr_number,
                        pr_url: c.pr_url.clone(),
                        completed_at: c.completed_at,
                        completed_by: c.completed_by.clone(),
                    }),
                    (TaskStatus::Completed, None) => {
                        log::warn!(
                            "Task {} is completed but has no completion metadata",
                            task.id()
                        );
                        pending_tasks.push(PendingItem {
                            task_id: task.id().to_string(),
                            wave_number: wave.wave_number,
                        });
                    }
                    (TaskStatus::Pending, _) => pending_tasks.push(PendingItem {
                        task_id: task.id().to_string(),
                        wave_number: wave.wave_number,
                    }),
                }
            }
        }

        let count = |kind: CompletionType| {
            completed_tasks
                .iter()
                .filter(|c| c.completion_type == kind)
                .count()
        };
        let completed_direct = count(CompletionType::Direct);
        let completed_incidental = count(CompletionType::Incidental);
        let total = completed_tasks.len() + pending_tasks.len();
        let percent_complete = if total == 0 {
            0.0
        } else {
            (completed_tasks.len() as f64 / total as f64 * 1000.0).round() / 10.0
        };

        Self {
            total,
            completed_direct,
            completed_incidental,
            pending: pending_tasks.len(),
            percent_complete,
            next_wave: pending_tasks.iter().map(|p| p.wave_number).min(),
            completed_tasks,
            pending_tasks,
        }
    }
}

impl fmt::Display for ProgressReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "📈 Progress: {}/{} tasks complete ({:.1}%)",
            self.total - self.pending,
            self.total,
            self.percent_complete
        )?;
        writeln!(f, "   Direct: {}", self.completed_direct)?;
        writeln!(f, "   Incidental: {}", self.completed_incidental)?;
        writeln!(f, "   Pending: {}", self.pending)?;
        if let Some(wave) = self.next_wave {
            writeln!(f, "   Next wave: {}", wave)?;
        }

        if !self.completed_tasks.is_empty() {
            writeln!(f)?;
            writeln!(f, "✅ Completed:")?;
            for item in &self.completed_tasks {
                write!(
                    f,
                    "   {} (wave {}) PR #{} {} [{}]",
                    item.task_id,
                    item.wave_number,
                    item.pr_number,
                    item.pr_url,
                    item.completion_type
                )?;
                if let Some(by) = &item.completed_by {
                    write!(f, " via {}", by)?;
                }
                writeln!(f)?;
            }
        }

        if !self.pending_tasks.is_empty() {
            writeln!(f)?;
            writeln!(f, "⏳ Pending:")?;
            for item in &self.pending_tasks {
                writeln!(f, "   {} (wave {})", item.task_id, item.wave_number)?;
            }
        }

        Ok(())
    }
}
