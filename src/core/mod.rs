//! Core engine - pattern overlap, conflict graph, dependency DAG, wave scheduling

mod conflicts;
mod graph;
mod pattern;
mod plan;
mod scheduler;
mod task;

pub use conflicts::{
    ConflictEntry, ConflictGraph, ConflictGraphBuilder, ConflictMetadata, ConflictRef, PatternPair,
};
pub use graph::DependencyGraph;
pub use pattern::{glob_to_regex, literal_prefix, HeuristicMatcher, PatternMatcher};
pub use plan::{
    write_json_atomic, EfficiencyMetrics, ExecutionPlan, PlanDocument, PlanMetadata, PlanSummary,
    StagedJson, Violation, Wave,
};
pub use scheduler::{GreedyWaveScheduler, WaveScheduler};
pub use task::{
    Completion, CompletionType, FilePattern, PatternKind, PlannedTask, TaskSpec, TaskStatus,
};
