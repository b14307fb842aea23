//! Central finite differences for single coordinates.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::{OptimError, OptimResult};
use crate::objective::Objective;
use crate::params::ParameterSet;

/// Default finite-difference step.
pub const DEFAULT_STEP: f64 = 1e-5;

/// Finite-difference steps, settable per parameter vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FiniteDiffSteps {
    /// Step used for vectors without an override.
    #[serde(default = "default_step")]
    pub default: f64,
    /// Per-vector overrides keyed by vector name.
    #[serde(default)]
    pub per_vector: FxHashMap<String, f64>,
}

fn default_step() -> f64 {
    DEFAULT_STEP
}

impl FiniteDiffSteps {
    /// Same step for every vector.
    pub fn uniform(step: f64) -> Self {
        Self {
            default: step,
            per_vector: FxHashMap::default(),
        }
    }

    /// Override the step of one vector.
    pub fn with_step(mut self, name: impl Into<String>, step: f64) -> Self {
        self.per_vector.insert(name.into(), step);
        self
    }

    /// Step for the named vector.
    pub fn step_for(&self, name: &str) -> f64 {
        self.per_vector.get(name).copied().unwrap_or(self.default)
    }

    /// Reject non-positive or non-finite steps.
    pub fn validate(&self) -> OptimResult<()> {
        let bad = std::iter::once(("default", self.default))
            .chain(self.per_vector.iter().map(|(k, v)| (k.as_str(), *v)))
            .find(|(_, h)| !(h.is_finite() && *h > 0.0));
        match bad {
            Some((name, h)) => Err(OptimError::InvalidConfig(format!(
                "finite-difference step for '{name}' must be positive, got {h}"
            ))),
            None => Ok(()),
        }
    }
}

impl Default for FiniteDiffSteps {
    fn default() -> Self {
        Self::uniform(DEFAULT_STEP)
    }
}

/// Two-sided derivative of the real energy along one coordinate.
///
/// Evaluates the objective exactly twice, at `x + h` and `x - h` for
/// coordinate `coordinate` of vector `vector_index`, everything else fixed.
pub fn central_difference<O: Objective + ?Sized>(
    objective: &O,
    params: &ParameterSet,
    vector_index: usize,
    coordinate: usize,
    h: f64,
) -> OptimResult<f64> {
    if !(h.is_finite() && h > 0.0) {
        return Err(OptimError::InvalidConfig(format!(
            "finite-difference step must be positive, got {h}"
        )));
    }
    let len = params.vector(vector_index).map(<[f64]>::len);
    match len {
        None => return Err(OptimError::shape("vector index", params.len(), vector_index)),
        Some(n) if coordinate >= n => {
            return Err(OptimError::shape("coordinate index", n, coordinate));
        }
        Some(_) => {}
    }

    let plus = params.perturbed(vector_index, coordinate, h);
    let minus = params.perturbed(vector_index, coordinate, -h);

    let e_plus = objective.evaluate(&plus).map_err(OptimError::objective)?;
    let e_minus = objective.evaluate(&minus).map_err(OptimError::objective)?;

    Ok((e_plus.re - e_minus.re) / (2.0 * h))
}
