//! Wave scheduler - packs the dependency DAG into conflict-free parallel waves

use super::conflicts::ConflictGraph;
use super::graph::DependencyGraph;
use super::plan::{ExecutionPlan, Wave};
use super::task::{PlannedTask, TaskSpec};
use crate::error::{PlanError, Result};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Strategy that turns tasks, dependencies and conflicts into waves
pub trait WaveScheduler {
    fn schedule(
        &self,
        tasks: &[TaskSpec],
        deps: &DependencyGraph,
        conflicts: &ConflictGraph,
    ) -> Result<ExecutionPlan>;

    fn name(&self) -> &str;
}

/// Per-task state while waves are being built
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskState {
    /// At least one prerequisite is not yet in a closed wave
    Blocked,
    Ready,
    /// Assigned to a closed wave (terminal)
    Scheduled,
}

/// Greedy first-fit packing by ascending conflict degree
///
/// This is a heuristic: it never puts conflicting or dependent tasks in the
/// same wave, but does not promise the minimum number of waves.
#[derive(Debug, Clone, Copy, Default)]
pub struct GreedyWaveScheduler;

impl GreedyWaveScheduler {
    pub fn new() -> Self {
        Self
    }
}

impl WaveScheduler for GreedyWaveScheduler {
    fn schedule(
        &self,
        tasks: &[TaskSpec],
        deps: &DependencyGraph,
        conflicts: &ConflictGraph,
    ) -> Result<ExecutionPlan> {
        // A cycle must abort planning before any wave exists
        deps.topological_order()?;

        let adjacency = conflicts.adjacency();
        let no_conflicts = BTreeSet::new();
        let conflicts_of = |id: &str| adjacency.get(id).unwrap_or(&no_conflicts);

        let by_id: HashMap<&str, &TaskSpec> =
            tasks.iter().map(|t| (t.task_id.as_str(), t)).collect();
        let mut states: BTreeMap<&str, TaskState> = tasks
            .iter()
            .map(|t| (t.task_id.as_str(), TaskState::Blocked))
            .collect();
        let mut waves: Vec<Wave> = Vec::new();

        while states.values().any(|s| *s != TaskState::Scheduled) {
            let wave_number = waves.len() + 1;

            // Promote tasks whose prerequisites are all in closed waves
            let ids: Vec<&str> = states.keys().copied().collect();
            for id in ids {
                if states[id] != TaskState::Blocked {
                    continue;
                }
                let unblocked = deps
                    .dependencies(id)
                    .all(|dep| states.get(dep.as_str()) == Some(&TaskState::Scheduled));
                if unblocked {
                    states.insert(id, TaskState::Ready);
                }
            }

            let mut ready: Vec<&str> = states
                .iter()
                .filter(|(_, s)| **s == TaskState::Ready)
                .map(|(&id, _)| id)
                .collect();

            if ready.is_empty() {
                let remaining: Vec<String> = states
                    .iter()
                    .filter(|(_, s)| **s != TaskState::Scheduled)
                    .map(|(id, _)| id.to_string())
                    .collect();
                return Err(PlanError::Unschedulable { remaining });
            }

            // Tasks that unblock the most downstream work come first
            ready.sort_by_key(|id| (Reverse(deps.dependent_count(id)), *id));
            let priority: HashMap<&str, usize> =
                ready.iter().enumerate().map(|(rank, &id)| (id, rank)).collect();

            let mut candidates = ready.clone();
            candidates.sort_by_key(|id| (conflicts_of(*id).len(), *id));

            let mut admitted: Vec<&str> = Vec::new();
            for id in candidates {
                let clash = admitted
                    .iter()
                    .find(|other| conflicts_of(id).contains(**other));
                match clash {
                    Some(other) => {
                        log::debug!(
                            "Wave {}: deferring {} (conflicts with {})",
                            wave_number,
                            id,
                            other
                        );
                    }
                    None => admitted.push(id),
                }
            }

            admitted.sort_by_key(|id| priority[id]);
            for &id in &admitted {
                states.insert(id, TaskState::Scheduled);
            }

            let wave_tasks: Vec<PlannedTask> = admitted
                .iter()
                .map(|id| {
                    let conflicts_with = conflicts_of(*id).iter().cloned().collect();
                    PlannedTask::new(by_id[id].clone(), conflicts_with)
                })
                .collect();
            let wave = Wave::new(wave_number, wave_tasks);

            log::debug!(
                "Wave {}: {} task(s), {} min ({} deferred)",
                wave.wave_number,
                wave.parallel_task_count,
                wave.estimated_wave_time_min,
                ready.len() - admitted.len()
            );
            waves.push(wave);
        }

        let plan = ExecutionPlan::new(waves);
        log::info!(
            "Scheduled {} tasks into {} waves ({} min parallel vs {} min sequential)",
            plan.summary.total_tasks,
            plan.summary.total_waves,
            plan.summary.efficiency_metrics.parallel_time_min,
            plan.summary.efficiency_metrics.sequential_time_min
        );
        Ok(plan)
    }

    fn name(&self) -> &str {
        "greedy"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::conflicts::{ConflictGraphBuilder, ConflictRef};
    use crate::core::pattern::HeuristicMatcher;
    use crate::core::task::FilePattern;

    fn schedule(tasks: &[TaskSpec]) -> Result<ExecutionPlan> {
        let matcher = HeuristicMatcher::new();
        let conflicts = ConflictGraphBuilder::new(&matcher).build(tasks);
        let deps = DependencyGraph::build(tasks)?;
        GreedyWaveScheduler::new().schedule(tasks, &deps, &conflicts)
    }

    fn wave_ids(plan: &ExecutionPlan) -> Vec<Vec<&str>> {
        plan.waves
            .iter()
            .map(|w| w.tasks.iter().map(|t| t.id()).collect())
            .collect()
    }

    #[test]
    fn test_independent_tasks_share_a_wave() {
        let tasks = vec![
            TaskSpec::new("a").with_runtime(10),
            TaskSpec::new("b").with_runtime(30),
            TaskSpec::new("c").with_runtime(20),
        ];
        let plan = schedule(&tasks).unwrap();
        assert_eq!(plan.waves.len(), 1);
        assert_eq!(plan.waves[0].estimated_wave_time_min, 30);
        assert_eq!(plan.summary.efficiency_metrics.sequential_time_min, 60);
    }

    #[test]
    fn test_chain_gets_one_wave_per_task() {
        let tasks = vec![
            TaskSpec::new("c").with_deps(["b"]),
            TaskSpec::new("b").with_deps(["a"]),
            TaskSpec::new("a"),
        ];
        let plan = schedule(&tasks).unwrap();
        assert_eq!(wave_ids(&plan), vec![vec!["a"], vec!["b"], vec!["c"]]);
        assert!(plan.verify().is_empty());
    }

    #[test]
    fn test_conflicting_tasks_are_split() {
        // A and C touch the same file; B depends on A
        let tasks = vec![
            TaskSpec::new("A").with_file(FilePattern::exact("src/app.ts")),
            TaskSpec::new("B").with_deps(["A"]),
            TaskSpec::new("C").with_file(FilePattern::regex("src/.*")),
        ];
        let plan = schedule(&tasks).unwrap();
        let index = plan.wave_index();

        assert_ne!(index["A"], index["C"]);
        assert!(index["B"] > index["A"]);
        assert!(plan.verify().is_empty());
        assert_eq!(plan.summary.total_tasks, 3);
    }

    #[test]
    fn test_fewer_conflicts_admitted_first() {
        // hub conflicts with x and y; x and y are compatible with each other
        let tasks = vec![
            TaskSpec::new("hub").with_file(FilePattern::regex("src/.*")),
            TaskSpec::new("x").with_file(FilePattern::exact("src/x.rs")),
            TaskSpec::new("y").with_file(FilePattern::exact("src/y.rs")),
        ];
        let plan = schedule(&tasks).unwrap();
        assert_eq!(wave_ids(&plan), vec![vec!["x", "y"], vec!["hub"]]);
    }

    #[test]
    fn test_wave_order_follows_dependent_count() {
        let tasks = vec![
            TaskSpec::new("a"),
            TaskSpec::new("z"),
            TaskSpec::new("m").with_deps(["z"]),
            TaskSpec::new("n").with_deps(["z"]),
        ];
        let plan = schedule(&tasks).unwrap();
        assert_eq!(wave_ids(&plan)[0], vec!["z", "a"]);
        assert_eq!(wave_ids(&plan)[1], vec!["m", "n"]);
    }

    #[test]
    fn test_cycle_aborts_planning() {
        let tasks = vec![
            TaskSpec::new("a").with_deps(["b"]),
            TaskSpec::new("b").with_deps(["a"]),
            TaskSpec::new("c"),
        ];
        let err = schedule(&tasks).unwrap_err();
        assert!(matches!(err, PlanError::CircularDependency { .. }));
    }

    #[test]
    fn test_conflicts_copied_onto_tasks() {
        let tasks = vec![TaskSpec::new("A"), TaskSpec::new("B"), TaskSpec::new("C")];
        let deps = DependencyGraph::build(&tasks).unwrap();
        let mut conflicts = ConflictGraphBuilder::new(&HeuristicMatcher::new()).build(&tasks);
        conflicts.conflicts[0].conflicts_with.push(ConflictRef {
            task_id: "C".to_string(),
            conflicting_patterns: Vec::new(),
        });
        let conflicts = conflicts.reconcile(&tasks).unwrap();

        let plan = GreedyWaveScheduler::new()
            .schedule(&tasks, &deps, &conflicts)
            .unwrap();
        let (_, c) = plan.find_task("C").unwrap();
        assert_eq!(c.conflicts_with, vec!["A".to_string()]);
        assert_eq!(wave_ids(&plan), vec![vec!["A", "B"], vec!["C"]]);
    }

    #[test]
    fn test_empty_task_set() {
        let plan = schedule(&[]).unwrap();
        assert!(plan.waves.is_empty());
        assert_eq!(plan.summary.efficiency_metrics.time_savings_percent, 0.0);
    }

    #[test]
    fn test_every_task_scheduled_once_with_gapless_waves() {
        let mut tasks = Vec::new();
        for i in 0..30 {
            let id = format!("t{:02}", i);
            let mut task = TaskSpec::new(&id)
                .with_runtime((i % 7) * 10)
                .with_file(FilePattern::exact(format!("src/mod{}.rs", i % 5)));
            if i >= 3 {
                task.depends_on.push(format!("t{:02}", i / 3));
            }
            tasks.push(task);
        }

        let plan = schedule(&tasks).unwrap();
        assert!(plan.verify().is_empty(), "{:?}", plan.verify());
        assert_eq!(plan.summary.total_tasks, 30);
        let numbers: Vec<usize> = plan.waves.iter().map(|w| w.wave_number).collect();
        assert_eq!(numbers, (1..=plan.waves.len()).collect::<Vec<_>>());
    }
}
