//! Waveplan - conflict-aware parallel execution planner
//!
//! Takes work items with declared dependencies and file footprints, and
//! produces dependency-respecting, conflict-free waves of parallel work plus
//! a tracker that folds completion events back into the plan.

pub mod config;
pub mod core;
pub mod error;
pub mod inputs;
pub mod tracker;

// Re-exports
pub use crate::config::Config;
pub use crate::core::{
    ConflictGraph, ConflictGraphBuilder, DependencyGraph, ExecutionPlan, FilePattern,
    GreedyWaveScheduler, HeuristicMatcher, PatternKind, PatternMatcher, PlanDocument, PlannedTask,
    TaskSpec, TaskStatus, WaveScheduler,
};
pub use crate::error::{PlanError, Result};
pub use crate::tracker::{CompletionEvent, MarkOutcome, ProgressReport, StatusTracker};

/// Planning pipeline with pluggable matcher and scheduler
pub struct Planner {
    matcher: Box<dyn PatternMatcher>,
    scheduler: Box<dyn WaveScheduler>,
}

impl Default for Planner {
    fn default() -> Self {
        Self::new()
    }
}

impl Planner {
    /// Heuristic matcher with the greedy wave scheduler
    pub fn new() -> Self {
        Self {
            matcher: Box::new(HeuristicMatcher::new()),
            scheduler: Box::new(GreedyWaveScheduler::new()),
        }
    }

    pub fn with_matcher(mut self, matcher: Box<dyn PatternMatcher>) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn with_scheduler(mut self, scheduler: Box<dyn WaveScheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Derive the conflict graph from declared file patterns
    pub fn conflicts(&self, tasks: &[TaskSpec]) -> ConflictGraph {
        ConflictGraphBuilder::new(self.matcher.as_ref()).build(tasks)
    }

    /// Build conflicts and waves; fails without a partial plan on a cycle
    pub fn plan(&self, tasks: &[TaskSpec]) -> Result<(ConflictGraph, ExecutionPlan)> {
        let deps = DependencyGraph::build_validated(tasks)?;
        let conflicts = self.conflicts(tasks);
        let plan = self.scheduler.schedule(tasks, &deps, &conflicts)?;
        Ok((conflicts, plan))
    }

    /// Build waves from an externally supplied conflict specification
    pub fn plan_with_conflicts(
        &self,
        tasks: &[TaskSpec],
        conflicts: ConflictGraph,
    ) -> Result<(ConflictGraph, ExecutionPlan)> {
        let deps = DependencyGraph::build_validated(tasks)?;
        let conflicts = conflicts.reconcile(tasks)?;
        let plan = self.scheduler.schedule(tasks, &deps, &conflicts)?;
        Ok((conflicts, plan))
    }

    pub fn matcher_name(&self) -> &str {
        self.matcher.name()
    }

    pub fn scheduler_name(&self) -> &str {
        self.scheduler.name()
    }
}
