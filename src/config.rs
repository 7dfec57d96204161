//! Configuration - input/output locations and tracker tuning
//!
//! Looked up in this order:
//! 1. an explicit `--config` path
//! 2. `waveplan.yml` in the current directory
//! 3. `~/.waveplan/config.yml`
//! 4. built-in defaults

use crate::error::{PlanError, Result};
use crate::tracker::DEFAULT_INCIDENTAL_THRESHOLD;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const LOCAL_CONFIG: &str = "waveplan.yml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Task descriptor list
    pub tasks: PathBuf,
    /// File list with declared patterns
    pub files: PathBuf,
    /// Optional task descriptions
    pub descriptions: Option<PathBuf>,
    /// Where `plan` writes the derived conflict graph
    pub conflict_graph: PathBuf,
    /// Plan file written by `plan` and updated by the tracker commands
    pub plan: PathBuf,
    /// Share of declared files that must be modified for an incidental completion
    pub incidental_threshold: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tasks: PathBuf::from("planning/tasks.json"),
            files: PathBuf::from("planning/files.json"),
            descriptions: None,
            conflict_graph: PathBuf::from("planning/conflict_graph.json"),
            plan: PathBuf::from("planning/execution_plan.json"),
            incidental_threshold: DEFAULT_INCIDENTAL_THRESHOLD,
        }
    }
}

impl Config {
    /// Load config from YAML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| PlanError::io(path, e))?;
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| PlanError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve the config file per the lookup order above
    pub fn auto_load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        let local = Path::new(LOCAL_CONFIG);
        if local.exists() {
            log::debug!("Using config {}", local.display());
            return Self::from_file(local);
        }

        if let Some(user) = Self::user_config_path().filter(|p| p.exists()) {
            log::debug!("Using config {}", user.display());
            return Self::from_file(&user);
        }

        Ok(Self::default())
    }

    pub fn user_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".waveplan").join("config.yml"))
    }

    pub fn validate(&self) -> Result<()> {
        let t = self.incidental_threshold;
        if !(t > 0.0 && t <= 1.0) {
            return Err(PlanError::Config(format!(
                "incidental_threshold must be in (0, 1], got {}",
                t
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.incidental_threshold, 0.5);
        assert_eq!(config.plan, PathBuf::from("planning/execution_plan.json"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("waveplan.yml");
        std::fs::write(&path, "plan: out/plan.json\nincidental_threshold: 0.75\n").unwrap();

        let config = Config::auto_load(Some(&path)).unwrap();
        assert_eq!(config.plan, PathBuf::from("out/plan.json"));
        assert_eq!(config.incidental_threshold, 0.75);
        assert_eq!(config.tasks, PathBuf::from("planning/tasks.json"));
        assert!(config.descriptions.is_none());
    }

    #[test]
    fn test_threshold_out_of_range() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.yml");
        std::fs::write(&path, "incidental_threshold: 1.5\n").unwrap();

        let err = Config::from_file(&path).unwrap_err();
        assert!(matches!(err, PlanError::Config(_)));
    }

    #[test]
    fn test_explicit_missing_config() {
        let err = Config::auto_load(Some(Path::new("/nonexistent/waveplan.yml"))).unwrap_err();
        assert!(matches!(err, PlanError::Io { .. }));
    }
}
