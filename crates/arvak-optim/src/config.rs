//! YAML run configuration.
//!
//! ```yaml
//! workers: 4
//! depth: 2
//! descent:
//!   learning_rate: 0.1
//!   iterations: 200        # -1 for no limit
//!   policy:
//!     kind: energy_change
//!     tolerance: 1.0e-6
//! quasi_newton:
//!   max_iter: 500
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::descent::{DescentConfig, IterationBudget};
use crate::error::{OptimError, OptimResult};
use crate::params::ParameterSet;
use crate::pool::DEFAULT_POOL_SIZE;
use crate::quasi_newton::QuasiNewtonConfig;

/// Starting value for every coordinate when no initial point is given.
pub const DEFAULT_INITIAL_VALUE: f64 = 0.6;

fn default_workers() -> usize {
    DEFAULT_POOL_SIZE
}

fn default_depth() -> usize {
    1
}

fn default_descent() -> DescentConfig {
    DescentConfig::new(0.1, IterationBudget::Bounded(100))
}

/// Everything one optimization run needs besides the objective.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Worker threads for gradient evaluation.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Layers per vector when `initial` is not given.
    #[serde(default = "default_depth")]
    pub depth: usize,
    /// Explicit starting point.
    #[serde(default)]
    pub initial: Option<ParameterSet>,
    #[serde(default = "default_descent")]
    pub descent: DescentConfig,
    #[serde(default)]
    pub quasi_newton: QuasiNewtonConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            depth: default_depth(),
            initial: None,
            descent: default_descent(),
            quasi_newton: QuasiNewtonConfig::default(),
        }
    }
}

impl RunConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml_str(text: &str) -> OptimResult<Self> {
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a YAML file.
    pub fn from_path(path: impl AsRef<Path>) -> OptimResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&text)
    }

    /// Check every section.
    pub fn validate(&self) -> OptimResult<()> {
        if self.workers == 0 {
            return Err(OptimError::InvalidConfig("workers must be >= 1".into()));
        }
        if self.depth == 0 {
            return Err(OptimError::InvalidConfig("depth must be >= 1".into()));
        }
        if let Some(initial) = &self.initial {
            if initial.is_empty() {
                return Err(OptimError::InvalidConfig(
                    "initial point has no vectors".into(),
                ));
            }
            initial.ensure_uniform_depth()?;
        }
        self.descent.validate()?;
        self.quasi_newton.validate()
    }

    /// The configured starting point, or `gamma`/`beta` filled with
    /// [`DEFAULT_INITIAL_VALUE`] at `depth` layers.
    pub fn initial_params(&self) -> ParameterSet {
        self.initial.clone().unwrap_or_else(|| {
            ParameterSet::qaoa(
                vec![DEFAULT_INITIAL_VALUE; self.depth],
                vec![DEFAULT_INITIAL_VALUE; self.depth],
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convergence::ConvergencePolicy;
    use crate::params::{BETA, GAMMA, PHI};
    use crate::quasi_newton::Bounds;

    #[test]
    fn test_defaults_from_empty_document() {
        let config = RunConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config, RunConfig::default());
        assert_eq!(config.workers, 2);

        let initial = config.initial_params();
        assert_eq!(initial.get(GAMMA), Some(&[0.6][..]));
        assert_eq!(initial.get(BETA), Some(&[0.6][..]));
    }

    #[test]
    fn test_full_document() {
        let yaml = r#"
workers: 4
initial:
  - name: gamma
    values: [0.1, 0.2]
  - name: beta
    values: [0.3, 0.4]
  - name: phi
    values: [0.5, 0.6]
descent:
  learning_rate: 0.05
  iterations: -1
  steps:
    default: 1.0e-4
    per_vector:
      phi: 1.0e-3
  policy:
    kind: energy_change
    tolerance: 1.0e-6
quasi_newton:
  max_iter: 200
  bounds: [[0.0, 1.0], [0.0, 1.0], [0.0, 1.0], [0.0, 1.0], [0.0, 1.0], [0.0, 1.0]]
"#;
        let config = RunConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.workers, 4);
        assert_eq!(config.descent.budget, IterationBudget::Unbounded);
        assert_eq!(config.descent.policy, ConvergencePolicy::energy(1e-6));
        assert_eq!(config.descent.steps.step_for(PHI), 1e-3);
        assert_eq!(config.descent.steps.step_for(GAMMA), 1e-4);
        assert_eq!(config.quasi_newton.max_iter, 200);
        assert_eq!(config.quasi_newton.bounds, Some(Bounds::uniform(6, 0.0, 1.0)));
        assert_eq!(config.initial_params().names(), vec!["gamma", "beta", "phi"]);
    }

    #[test]
    fn test_invalid_values_rejected() {
        for yaml in [
            "workers: 0",
            "depth: 0",
            "descent: { learning_rate: -1.0, iterations: 10 }",
            "descent: { learning_rate: 0.1, iterations: 0 }",
            "descent: { learning_rate: 0.1, iterations: -2 }",
            "quasi_newton: { history: 0 }",
        ] {
            assert!(RunConfig::from_yaml_str(yaml).is_err(), "{yaml}");
        }
    }

    #[test]
    fn test_ragged_initial_rejected() {
        let yaml = r#"
initial:
  - name: gamma
    values: [0.1, 0.2]
  - name: beta
    values: [0.3]
"#;
        assert!(matches!(
            RunConfig::from_yaml_str(yaml),
            Err(OptimError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.yaml");
        std::fs::write(&path, "depth: 3\n").unwrap();

        let config = RunConfig::from_path(&path).unwrap();
        assert_eq!(config.initial_params().coordinate_count(), 6);
        assert!(matches!(
            RunConfig::from_path(dir.path().join("missing.yaml")),
            Err(OptimError::Io(_))
        ));
    }
}
