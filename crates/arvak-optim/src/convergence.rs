//! Convergence detection for the descent driver.
//!
//! Two criteria are in use for variational runs and neither is canonical,
//! so both are exposed as named policies:
//!
//! - **Parameter change**: every vector's largest relative coordinate change
//!   is below a fixed threshold.
//! - **Energy change**: the relative change of the energy's real part is
//!   below a caller-supplied tolerance.
//!
//! Relative changes add [`EPSILON`] to the denominator. A NaN or infinite
//! change never counts as converged.

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::error::{OptimError, OptimResult};
use crate::params::ParameterSet;

/// Denominator guard for relative changes.
pub const EPSILON: f64 = 1e-10;

/// Default threshold for [`ConvergencePolicy::ParameterChange`].
pub const DEFAULT_PARAMETER_THRESHOLD: f64 = 1e-4;

/// Stopping rule applied after the warm-up period.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConvergencePolicy {
    /// Stop when every vector moved less than `threshold` (relative).
    ParameterChange {
        #[serde(default = "default_parameter_threshold")]
        threshold: f64,
    },
    /// Stop when the energy changed less than `tolerance` (relative).
    EnergyChange { tolerance: f64 },
}

fn default_parameter_threshold() -> f64 {
    DEFAULT_PARAMETER_THRESHOLD
}

impl Default for ConvergencePolicy {
    fn default() -> Self {
        ConvergencePolicy::ParameterChange {
            threshold: DEFAULT_PARAMETER_THRESHOLD,
        }
    }
}

impl ConvergencePolicy {
    /// Energy-based policy.
    pub fn energy(tolerance: f64) -> Self {
        ConvergencePolicy::EnergyChange { tolerance }
    }

    /// Parameter-based policy.
    pub fn parameters(threshold: f64) -> Self {
        ConvergencePolicy::ParameterChange { threshold }
    }

    /// Reject non-positive tolerances.
    pub fn validate(&self) -> OptimResult<()> {
        let (name, value) = match *self {
            ConvergencePolicy::ParameterChange { threshold } => ("threshold", threshold),
            ConvergencePolicy::EnergyChange { tolerance } => ("tolerance", tolerance),
        };
        if value.is_finite() && value > 0.0 {
            Ok(())
        } else {
            Err(OptimError::InvalidConfig(format!(
                "convergence {name} must be positive, got {value}"
            )))
        }
    }

    /// Whether `changes` satisfies this policy.
    pub fn is_satisfied(&self, changes: &StepChanges) -> bool {
        match *self {
            ConvergencePolicy::ParameterChange { threshold } => {
                !changes.parameters.is_empty()
                    && changes
                        .parameters
                        .iter()
                        .all(|&c| below(c, threshold))
            }
            ConvergencePolicy::EnergyChange { tolerance } => changes
                .energy
                .is_some_and(|c| below(c, tolerance)),
        }
    }
}

fn below(change: f64, limit: f64) -> bool {
    change.is_finite() && change < limit
}

/// `max_i |(current_i - previous_i) / (previous_i + ε)|`.
pub fn max_relative_change(previous: &[f64], current: &[f64]) -> f64 {
    previous
        .iter()
        .zip(current)
        .map(|(&p, &c)| ((c - p) / (p + EPSILON)).abs())
        .fold(0.0, |acc: f64, x| {
            if acc.is_nan() || x.is_nan() {
                f64::NAN
            } else {
                acc.max(x)
            }
        })
}

/// `|(current - previous) / (previous + ε)|` on the real parts.
///
/// The imaginary part is kept for the history only and never affects stopping.
pub fn energy_relative_change(previous: Complex64, current: Complex64) -> f64 {
    ((current.re - previous.re) / (previous.re + EPSILON)).abs()
}

/// Relative changes produced by one descent step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepChanges {
    /// One entry per parameter vector, in canonical order.
    pub parameters: Vec<f64>,
    /// `None` when there is no previous energy to compare with.
    pub energy: Option<f64>,
}

/// Previous iterate, kept only to compute relative changes.
#[derive(Debug, Clone)]
pub struct ConvergenceState {
    previous: ParameterSet,
    previous_energy: Option<Complex64>,
}

impl ConvergenceState {
    /// Start tracking from the initial guess.
    pub fn new(initial: &ParameterSet) -> Self {
        Self {
            previous: initial.clone(),
            previous_energy: None,
        }
    }

    /// Overwrite the snapshot with the current iterate.
    pub fn snapshot(&mut self, params: &ParameterSet, energy: Option<Complex64>) {
        self.previous.clone_from(params);
        self.previous_energy = energy;
    }

    /// Energy of the snapshot, if one was evaluated.
    pub fn previous_energy(&self) -> Option<Complex64> {
        self.previous_energy
    }

    /// Relative changes from the snapshot to `(params, energy)`.
    pub fn changes(&self, params: &ParameterSet, energy: Complex64) -> StepChanges {
        let parameters = self
            .previous
            .iter()
            .zip(params.iter())
            .map(|((_, prev), (_, cur))| max_relative_change(prev, cur))
            .collect();
        let energy = self
            .previous_energy
            .map(|prev| energy_relative_change(prev, energy));
        StepChanges { parameters, energy }
    }
}

/// Iterations that must pass before convergence may be declared.
///
/// `max(1, floor(0.1 × budget))` for a bounded budget, `1` otherwise.
pub fn warmup_iterations(budget: Option<usize>) -> usize {
    match budget {
        Some(n) => (n / 10).max(1),
        None => 1,
    }
}
