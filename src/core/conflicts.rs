//! Conflict graph - which tasks may touch the same files

use super::pattern::PatternMatcher;
use super::task::TaskSpec;
use crate::error::{PlanError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;

/// A pair of declared patterns that were judged to overlap
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternPair {
    pub my_pattern: String,
    pub other_pattern: String,
}

/// One conflicting neighbour of a task, with the patterns that caused it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictRef {
    pub task_id: String,
    #[serde(default)]
    pub conflicting_patterns: Vec<PatternPair>,
}

/// Conflict record for a single task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictEntry {
    pub task_id: String,
    #[serde(default)]
    pub conflicts_with: Vec<ConflictRef>,
    #[serde(default)]
    pub conflict_count: usize,
    /// Declared patterns of the task, for diagnostics
    #[serde(default)]
    pub files: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConflictMetadata {
    pub generated_at: DateTime<Utc>,
    pub total_tasks: usize,
    pub tasks_with_conflicts: usize,
    pub total_conflict_pairs: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matcher: Option<String>,
}

/// Symmetric conflict relation over a task set, in its persisted shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictGraph {
    #[serde(default)]
    pub metadata: ConflictMetadata,
    pub conflicts: Vec<ConflictEntry>,
}

impl ConflictGraph {
    /// Load a conflict graph (or hand-written conflict specification) from JSON
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| PlanError::io(path, e))?;
        serde_json::from_str(&content).map_err(|e| PlanError::json(path, e))
    }

    /// Conflict ids of a task, sorted; empty when the task has no entry
    pub fn conflicts_of(&self, task_id: &str) -> Vec<String> {
        self.conflicts
            .iter()
            .find(|entry| entry.task_id == task_id)
            .map(|entry| {
                let mut ids: Vec<String> = entry
                    .conflicts_with
                    .iter()
                    .map(|c| c.task_id.clone())
                    .collect();
                ids.sort();
                ids.dedup();
                ids
            })
            .unwrap_or_default()
    }

    /// Adjacency view of the relation, keyed by task id
    pub fn adjacency(&self) -> BTreeMap<String, BTreeSet<String>> {
        self.conflicts
            .iter()
            .map(|entry| {
                let ids = entry
                    .conflicts_with
                    .iter()
                    .map(|c| c.task_id.clone())
                    .collect();
                (entry.task_id.clone(), ids)
            })
            .collect()
    }

    /// Make a loaded conflict specification usable for scheduling
    ///
    /// Every referenced id must belong to `tasks`. Missing reverse edges are
    /// added, tasks without an entry get an empty one, and counts and metadata
    /// are recomputed.
    pub fn reconcile(self, tasks: &[TaskSpec]) -> Result<Self> {
        let known: HashSet<&str> = tasks.iter().map(|t| t.task_id.as_str()).collect();
        let mut refs: BTreeMap<String, BTreeMap<String, Vec<PatternPair>>> = tasks
            .iter()
            .map(|t| (t.task_id.clone(), BTreeMap::new()))
            .collect();

        for entry in self.conflicts {
            if !known.contains(entry.task_id.as_str()) {
                return Err(PlanError::UnknownTask {
                    task_id: entry.task_id,
                    source_name: "conflict specification".to_string(),
                });
            }
            for other in entry.conflicts_with {
                if !known.contains(other.task_id.as_str()) {
                    return Err(PlanError::UnknownTask {
                        task_id: other.task_id,
                        source_name: "conflict specification".to_string(),
                    });
                }
                if other.task_id == entry.task_id {
                    log::warn!("Ignoring self-conflict declared for {}", entry.task_id);
                    continue;
                }

                let mirrored: Vec<PatternPair> = other
                    .conflicting_patterns
                    .iter()
                    .map(|p| PatternPair {
                        my_pattern: p.other_pattern.clone(),
                        other_pattern: p.my_pattern.clone(),
                    })
                    .collect();

                if let Some(map) = refs.get_mut(&other.task_id) {
                    map.entry(entry.task_id.clone()).or_insert(mirrored);
                }
                if let Some(map) = refs.get_mut(&entry.task_id) {
                    let slot = map.entry(other.task_id.clone()).or_default();
                    if slot.is_empty() {
                        *slot = other.conflicting_patterns;
                    }
                }
            }
        }

        Ok(assemble(tasks, refs, self.metadata.matcher))
    }
}

/// Derives the conflict graph from declared file patterns
pub struct ConflictGraphBuilder<'a> {
    matcher: &'a dyn PatternMatcher,
}

impl<'a> ConflictGraphBuilder<'a> {
    pub fn new(matcher: &'a dyn PatternMatcher) -> Self {
        Self { matcher }
    }

    /// Compare every pattern pair of every unordered task pair
    pub fn build(&self, tasks: &[TaskSpec]) -> ConflictGraph {
        let mut refs: BTreeMap<String, BTreeMap<String, Vec<PatternPair>>> = tasks
            .iter()
            .map(|t| (t.task_id.clone(), BTreeMap::new()))
            .collect();

        for (i, a) in tasks.iter().enumerate() {
            for b in &tasks[i + 1..] {
                let pairs = self.overlapping_patterns(a, b);
                if pairs.is_empty() {
                    continue;
                }

                log::debug!(
                    "Conflict: {} <-> {} ({} pattern pair(s))",
                    a.task_id,
                    b.task_id,
                    pairs.len()
                );

                let mirrored = pairs
                    .iter()
                    .map(|p| PatternPair {
                        my_pattern: p.other_pattern.clone(),
                        other_pattern: p.my_pattern.clone(),
                    })
                    .collect();
                if let Some(map) = refs.get_mut(&a.task_id) {
                    map.insert(b.task_id.clone(), pairs);
                }
                if let Some(map) = refs.get_mut(&b.task_id) {
                    map.insert(a.task_id.clone(), mirrored);
                }
            }
        }

        let graph = assemble(tasks, refs, Some(self.matcher.name().to_string()));
        log::info!(
            "Conflict graph: {} tasks, {} with conflicts, {} conflicting pairs",
            graph.metadata.total_tasks,
            graph.metadata.tasks_with_conflicts,
            graph.metadata.total_conflict_pairs
        );
        graph
    }

    fn overlapping_patterns(&self, a: &TaskSpec, b: &TaskSpec) -> Vec<PatternPair> {
        let mut pairs = Vec::new();
        for fa in &a.files {
            for fb in &b.files {
                if self
                    .matcher
                    .overlaps(&fa.pattern, fa.kind, &fb.pattern, fb.kind)
                {
                    pairs.push(PatternPair {
                        my_pattern: fa.pattern.clone(),
                        other_pattern: fb.pattern.clone(),
                    });
                }
            }
        }
        pairs
    }
}

fn assemble(
    tasks: &[TaskSpec],
    mut refs: BTreeMap<String, BTreeMap<String, Vec<PatternPair>>>,
    matcher: Option<String>,
) -> ConflictGraph {
    let conflicts: Vec<ConflictEntry> = tasks
        .iter()
        .map(|task| {
            let conflicts_with: Vec<ConflictRef> = refs
                .remove(&task.task_id)
                .unwrap_or_default()
                .into_iter()
                .map(|(task_id, conflicting_patterns)| ConflictRef {
                    task_id,
                    conflicting_patterns,
                })
                .collect();
            ConflictEntry {
                task_id: task.task_id.clone(),
                conflict_count: conflicts_with.len(),
                conflicts_with,
                files: task.files.iter().map(|f| f.pattern.clone()).collect(),
            }
        })
        .collect();

    let degree_sum: usize = conflicts.iter().map(|c| c.conflict_count).sum();
    ConflictGraph {
        metadata: ConflictMetadata {
            generated_at: Utc::now(),
            total_tasks: tasks.len(),
            tasks_with_conflicts: conflicts.iter().filter(|c| c.conflict_count > 0).count(),
            total_conflict_pairs: degree_sum / 2,
            matcher,
        },
        conflicts,
    }
}
