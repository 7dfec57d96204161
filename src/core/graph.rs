//! Dependency graph - validated task DAG built from declared prerequisites

use super::task::TaskSpec;
use crate::error::{PlanError, Result};
use std::collections::{BTreeMap, BTreeSet};

/// Forward (task -> prerequisites) and reverse (prerequisite -> dependents)
/// adjacency over a task set
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    forward: BTreeMap<String, BTreeSet<String>>,
    reverse: BTreeMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
    /// Build the graph, dropping prerequisites that are not in the task set
    pub fn build(tasks: &[TaskSpec]) -> Result<Self> {
        let mut forward: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for task in tasks {
            if forward
                .insert(task.task_id.clone(), BTreeSet::new())
                .is_some()
            {
                return Err(PlanError::DuplicateTask(task.task_id.clone()));
            }
        }
        let mut reverse: BTreeMap<String, BTreeSet<String>> = forward
            .keys()
            .map(|id| (id.clone(), BTreeSet::new()))
            .collect();

        for task in tasks {
            for dep in &task.depends_on {
                if !reverse.contains_key(dep) {
                    log::debug!("Dropping dangling dependency {} -> {}", task.task_id, dep);
                    continue;
                }
                if let Some(prereqs) = forward.get_mut(&task.task_id) {
                    prereqs.insert(dep.clone());
                }
                if let Some(dependents) = reverse.get_mut(dep) {
                    dependents.insert(task.task_id.clone());
                }
            }
        }

        Ok(Self { forward, reverse })
    }

    /// Prerequisites of a task (after dangling references were dropped)
    pub fn dependencies(&self, task_id: &str) -> impl Iterator<Item = &String> {
        self.forward.get(task_id).into_iter().flatten()
    }

    /// Tasks that list `task_id` as a prerequisite
    pub fn dependents(&self, task_id: &str) -> impl Iterator<Item = &String> {
        self.reverse.get(task_id).into_iter().flatten()
    }

    /// Reverse-edge fan-out of a task
    pub fn dependent_count(&self, task_id: &str) -> usize {
        self.reverse.get(task_id).map_or(0, BTreeSet::len)
    }

    pub fn contains(&self, task_id: &str) -> bool {
        self.forward.contains_key(task_id)
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    /// Kahn's algorithm; ties are broken by task id so the order is stable
    ///
    /// Fails with [`PlanError::CircularDependency`] naming every task that
    /// could not be emitted.
    pub fn topological_order(&self) -> Result<Vec<String>> {
        let mut in_degree: BTreeMap<&str, usize> = self
            .forward
            .iter()
            .map(|(id, deps)| (id.as_str(), deps.len()))
            .collect();
        let mut ready: BTreeSet<&str> = in_degree
            .iter()
            .filter(|(_, &degree)| degree == 0)
            .map(|(&id, _)| id)
            .collect();
        let mut order = Vec::with_capacity(self.forward.len());

        while let Some(id) = ready.pop_first() {
            order.push(id.to_string());
            for dependent in self.dependents(id) {
                if let Some(degree) = in_degree.get_mut(dependent.as_str()) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.insert(dependent.as_str());
                    }
                }
            }
        }

        if order.len() < self.forward.len() {
            let emitted: BTreeSet<&str> = order.iter().map(String::as_str).collect();
            let tasks: Vec<String> = self
                .forward
                .keys()
                .filter(|id| !emitted.contains(id.as_str()))
                .cloned()
                .collect();
            log::error!("Circular dependency among: {}", tasks.join(", "));
            return Err(PlanError::CircularDependency { tasks });
        }

        Ok(order)
    }

    /// Build and check acyclicity in one step
    pub fn build_validated(tasks: &[TaskSpec]) -> Result<Self> {
        let graph = Self::build(tasks)?;
        graph.topological_order()?;
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: &str, deps: &[&str]) -> TaskSpec {
        TaskSpec::new(id).with_deps(deps.iter().copied())
    }

    #[test]
    fn test_topological_order_is_deterministic() {
        let tasks = vec![
            task("d", &["b", "c"]),
            task("c", &["a"]),
            task("b", &["a"]),
            task("a", &[]),
        ];
        let graph = DependencyGraph::build(&tasks).unwrap();
        assert_eq!(graph.topological_order().unwrap(), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_dangling_dependencies_are_dropped() {
        let tasks = vec![task("a", &["ghost"]), task("b", &["a", "missing"])];
        let graph = DependencyGraph::build(&tasks).unwrap();
        assert_eq!(graph.dependencies("a").count(), 0);
        assert_eq!(graph.dependencies("b").collect::<Vec<_>>(), vec!["a"]);
        assert_eq!(graph.dependent_count("a"), 1);
        assert!(graph.topological_order().is_ok());
    }

    #[test]
    fn test_cycle_is_reported() {
        let tasks = vec![task("a", &["c"]), task("b", &["a"]), task("c", &["b"]), task("x", &[])];
        let graph = DependencyGraph::build(&tasks).unwrap();
        match graph.topological_order() {
            Err(PlanError::CircularDependency { tasks }) => {
                assert_eq!(tasks, vec!["a", "b", "c"]);
            }
            other => panic!("expected cycle error, got {:?}", other),
        }
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let tasks = vec![task("a", &["a"])];
        let err = DependencyGraph::build_validated(&tasks).unwrap_err();
        assert!(matches!(err, PlanError::CircularDependency { .. }));
    }

    #[test]
    fn test_duplicate_ids_are_rejected() {
        let tasks = vec![task("a", &[]), task("a", &[])];
        let err = DependencyGraph::build(&tasks).unwrap_err();
        assert!(matches!(err, PlanError::DuplicateTask(id) if id == "a"));
    }

    #[test]
    fn test_dependents_fan_out() {
        let tasks = vec![task("root", &[]), task("x", &["root"]), task("y", &["root"])];
        let graph = DependencyGraph::build(&tasks).unwrap();
        assert_eq!(graph.dependent_count("root"), 2);
        assert_eq!(graph.dependents("root").collect::<Vec<_>>(), vec!["x", "y"]);
        assert_eq!(graph.dependent_count("x"), 0);
    }
}
