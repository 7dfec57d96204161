//! Execution plan - ordered waves plus summary statistics, and the persisted
//! document that wraps them

use super::task::PlannedTask;
use crate::error::{PlanError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// A set of tasks that can run concurrently
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wave {
    /// 1-based, gapless
    pub wave_number: usize,
    pub tasks: Vec<PlannedTask>,
    pub parallel_task_count: usize,
    /// Runtime of the slowest member
    pub estimated_wave_time_min: u32,
    #[serde(default)]
    pub size_distribution: BTreeMap<String, usize>,
}

impl Wave {
    pub fn new(wave_number: usize, tasks: Vec<PlannedTask>) -> Self {
        let estimated_wave_time_min = tasks
            .iter()
            .map(|t| t.spec.expected_runtime_min)
            .max()
            .unwrap_or(0);
        let mut size_distribution = BTreeMap::new();
        for task in &tasks {
            *size_distribution.entry(task.spec.size.clone()).or_insert(0) += 1;
        }

        Self {
            wave_number,
            parallel_task_count: tasks.len(),
            estimated_wave_time_min,
            size_distribution,
            tasks,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EfficiencyMetrics {
    pub sequential_time_min: u64,
    pub parallel_time_min: u64,
    pub time_savings_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanSummary {
    pub total_waves: usize,
    pub total_tasks: usize,
    pub estimated_total_time_min: u64,
    pub average_parallelism: f64,
    pub max_parallelism: usize,
    pub efficiency_metrics: EfficiencyMetrics,
}

impl PlanSummary {
    /// Summarize a list of waves
    pub fn from_waves(waves: &[Wave]) -> Self {
        let total_waves = waves.len();
        let total_tasks: usize = waves.iter().map(|w| w.tasks.len()).sum();
        let parallel: u64 = waves
            .iter()
            .map(|w| u64::from(w.estimated_wave_time_min))
            .sum();
        let sequential: u64 = waves
            .iter()
            .flat_map(|w| &w.tasks)
            .map(|t| u64::from(t.spec.expected_runtime_min))
            .sum();

        let average_parallelism = if total_waves == 0 {
            0.0
        } else {
            round2(total_tasks as f64 / total_waves as f64)
        };
        let time_savings_percent = if sequential == 0 {
            0.0
        } else {
            round2((1.0 - parallel as f64 / sequential as f64) * 100.0)
        };

        Self {
            total_waves,
            total_tasks,
            estimated_total_time_min: parallel,
            average_parallelism,
            max_parallelism: waves.iter().map(|w| w.parallel_task_count).max().unwrap_or(0),
            efficiency_metrics: EfficiencyMetrics {
                sequential_time_min: sequential,
                parallel_time_min: parallel,
                time_savings_percent,
            },
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Ordered waves with their summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub waves: Vec<Wave>,
    pub summary: PlanSummary,
}

impl ExecutionPlan {
    pub fn new(waves: Vec<Wave>) -> Self {
        let summary = PlanSummary::from_waves(&waves);
        Self { waves, summary }
    }

    /// Wave number of every task
    pub fn wave_index(&self) -> HashMap<&str, usize> {
        self.waves
            .iter()
            .flat_map(|w| w.tasks.iter().map(move |t| (t.id(), w.wave_number)))
            .collect()
    }

    pub fn tasks(&self) -> impl Iterator<Item = &PlannedTask> {
        self.waves.iter().flat_map(|w| w.tasks.iter())
    }

    pub fn find_task(&self, task_id: &str) -> Option<(usize, &PlannedTask)> {
        self.waves.iter().find_map(|w| {
            w.tasks
                .iter()
                .find(|t| t.id() == task_id)
                .map(|t| (w.wave_number, t))
        })
    }

    pub fn find_task_mut(&mut self, task_id: &str) -> Option<&mut PlannedTask> {
        self.waves
            .iter_mut()
            .flat_map(|w| w.tasks.iter_mut())
            .find(|t| t.id() == task_id)
    }

    /// Re-check scheduling guarantees on a (possibly hand-edited) plan
    pub fn verify(&self) -> Vec<Violation> {
        let mut violations = Vec::new();

        for (i, wave) in self.waves.iter().enumerate() {
            if wave.wave_number != i + 1 {
                violations.push(Violation::WaveNumbering {
                    position: i + 1,
                    found: wave.wave_number,
                });
            }
            if wave.tasks.is_empty() {
                violations.push(Violation::EmptyWave(wave.wave_number));
            }
            let slowest = wave
                .tasks
                .iter()
                .map(|t| t.spec.expected_runtime_min)
                .max()
                .unwrap_or(0);
            if wave.estimated_wave_time_min != slowest {
                violations.push(Violation::WaveTime {
                    wave: wave.wave_number,
                    recorded: wave.estimated_wave_time_min,
                    expected: slowest,
                });
            }

            let members: HashSet<&str> = wave.tasks.iter().map(|t| t.id()).collect();
            for task in &wave.tasks {
                for other in &task.conflicts_with {
                    if task.id() < other.as_str() && members.contains(other.as_str()) {
                        violations.push(Violation::ConflictInWave {
                            wave: wave.wave_number,
                            a: task.id().to_string(),
                            b: other.clone(),
                        });
                    }
                }
            }
        }

        let mut seen: HashMap<&str, usize> = HashMap::new();
        for task in self.tasks() {
            *seen.entry(task.id()).or_insert(0) += 1;
        }
        let mut duplicates: Vec<&str> = seen
            .iter()
            .filter(|(_, &count)| count > 1)
            .map(|(&id, _)| id)
            .collect();
        duplicates.sort_unstable();
        violations.extend(
            duplicates
                .into_iter()
                .map(|id| Violation::DuplicateTask(id.to_string())),
        );

        let index = self.wave_index();
        for wave in &self.waves {
            for task in &wave.tasks {
                for dep in &task.spec.depends_on {
                    if let Some(&dep_wave) = index.get(dep.as_str()) {
                        if dep_wave >= wave.wave_number {
                            violations.push(Violation::DependencyOrder {
                                task: task.id().to_string(),
                                dependency: dep.clone(),
                                task_wave: wave.wave_number,
                                dependency_wave: dep_wave,
                            });
                        }
                    }
                }
            }
        }

        violations
    }
}

/// A broken scheduling guarantee found by [`ExecutionPlan::verify`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    WaveNumbering { position: usize, found: usize },
    EmptyWave(usize),
    WaveTime { wave: usize, recorded: u32, expected: u32 },
    ConflictInWave { wave: usize, a: String, b: String },
    DuplicateTask(String),
    DependencyOrder {
        task: String,
        dependency: String,
        task_wave: usize,
        dependency_wave: usize,
    },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WaveNumbering { position, found } => {
                write!(f, "wave at position {} is numbered {}", position, found)
            }
            Self::EmptyWave(wave) => write!(f, "wave {} has no tasks", wave),
            Self::WaveTime {
                wave,
                recorded,
                expected,
            } => write!(
                f,
                "wave {} records {} min but its slowest task takes {} min",
                wave, recorded, expected
            ),
            Self::ConflictInWave { wave, a, b } => {
                write!(f, "conflicting tasks {} and {} share wave {}", a, b, wave)
            }
            Self::DuplicateTask(id) => write!(f, "task {} is scheduled more than once", id),
            Self::DependencyOrder {
                task,
                dependency,
                task_wave,
                dependency_wave,
            } => write!(
                f,
                "task {} (wave {}) does not run after its dependency {} (wave {})",
                task, task_wave, dependency, dependency_wave
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanMetadata {
    pub generated_at: DateTime<Utc>,
    pub generator: String,
}

impl PlanMetadata {
    pub fn now() -> Self {
        Self {
            generated_at: Utc::now(),
            generator: format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
        }
    }
}

/// On-disk plan file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<PlanMetadata>,
    pub execution_plan: ExecutionPlan,
}

impl PlanDocument {
    pub fn new(execution_plan: ExecutionPlan) -> Self {
        Self {
            metadata: Some(PlanMetadata::now()),
            execution_plan,
        }
    }

    /// Load plan from JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| PlanError::io(path, e))?;
        serde_json::from_str(&content).map_err(|e| PlanError::json(path, e))
    }

    /// Save plan to JSON file
    pub fn save(&self, path: &Path) -> Result<()> {
        write_json_atomic(path, self)
    }
}

/// Serialize to `<path>.tmp` and rename over `path`
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    StagedJson::write(path, value)?.commit()
}

/// A JSON document written to `<path>.tmp` but not yet renamed into place
///
/// Dropping it without `commit` removes the temporary file, so several
/// documents can be staged and only published once all of them serialized
/// and wrote successfully.
#[derive(Debug)]
pub struct StagedJson {
    tmp: PathBuf,
    path: PathBuf,
    committed: bool,
}

impl StagedJson {
    pub fn write<T: Serialize>(path: &Path, value: &T) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| PlanError::io(parent, e))?;
        }

        let json = serde_json::to_string_pretty(value).map_err(|e| PlanError::json(path, e))?;
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, json).map_err(|e| PlanError::io(&tmp, e))?;
        Ok(Self {
            tmp,
            path: path.to_path_buf(),
            committed: false,
        })
    }

    /// Rename the staged file over its target
    pub fn commit(mut self) -> Result<()> {
        fs::rename(&self.tmp, &self.path).map_err(|e| PlanError::io(&self.path, e))?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for StagedJson {
    fn drop(&mut self) {
        if !self.committed {
            if let Err(e) = fs::remove_file(&self.tmp) {
                log::debug!("Could not remove {}: {}", self.tmp.display(), e);
            }
        }
    }
}
