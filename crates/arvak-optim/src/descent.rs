//! Fixed-step steepest descent with parallel finite-difference gradients.
//!
//! Each iteration snapshots the current iterate, computes the full gradient
//! through a [`GradientCoordinator`], applies `v ← v − α·∇v` to every vector,
//! evaluates the energy and checks the configured [`ConvergencePolicy`].
//! No momentum and no step-size control: an `α` that is too large diverges,
//! which the driver reports but does not correct.

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::convergence::{ConvergencePolicy, ConvergenceState, warmup_iterations};
use crate::error::{OptimError, OptimResult};
use crate::finite_diff::FiniteDiffSteps;
use crate::gradient::GradientCoordinator;
use crate::logger::{IterationRecord, IterationSink};
use crate::objective::Objective;
use crate::params::ParameterSet;
use crate::pool::Backend;

/// How many iterations the descent may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum IterationBudget {
    /// At most this many iterations.
    Bounded(usize),
    /// Run until the convergence policy fires.
    Unbounded,
}

impl IterationBudget {
    /// Upper bound on iterations, if any.
    pub fn limit(&self) -> Option<usize> {
        match *self {
            IterationBudget::Bounded(n) => Some(n),
            IterationBudget::Unbounded => None,
        }
    }
}

impl TryFrom<i64> for IterationBudget {
    type Error = OptimError;

    /// `-1` means unbounded, any positive count is a bound.
    fn try_from(count: i64) -> OptimResult<Self> {
        match count {
            -1 => Ok(IterationBudget::Unbounded),
            n if n >= 1 => Ok(IterationBudget::Bounded(n as usize)),
            n => Err(OptimError::InvalidConfig(format!(
                "iteration budget must be >= 1 or -1, got {n}"
            ))),
        }
    }
}

impl From<IterationBudget> for i64 {
    fn from(budget: IterationBudget) -> i64 {
        match budget {
            IterationBudget::Bounded(n) => n as i64,
            IterationBudget::Unbounded => -1,
        }
    }
}

/// Tunables of the descent driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DescentConfig {
    /// Step length `α`.
    pub learning_rate: f64,
    /// Finite-difference steps per vector.
    #[serde(default)]
    pub steps: FiniteDiffSteps,
    /// Iteration budget.
    #[serde(rename = "iterations")]
    pub budget: IterationBudget,
    /// Stopping rule.
    #[serde(default)]
    pub policy: ConvergencePolicy,
}

impl DescentConfig {
    /// Config with the given learning rate and iteration budget, default steps and policy.
    pub fn new(learning_rate: f64, budget: IterationBudget) -> Self {
        Self {
            learning_rate,
            steps: FiniteDiffSteps::default(),
            budget,
            policy: ConvergencePolicy::default(),
        }
    }

    /// Set the finite-difference steps.
    pub fn with_steps(mut self, steps: FiniteDiffSteps) -> Self {
        self.steps = steps;
        self
    }

    /// Set the convergence policy.
    pub fn with_policy(mut self, policy: ConvergencePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Check every tunable.
    pub fn validate(&self) -> OptimResult<()> {
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(OptimError::InvalidConfig(format!(
                "learning rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if self.budget == IterationBudget::Bounded(0) {
            return Err(OptimError::InvalidConfig(
                "iteration budget must be >= 1".into(),
            ));
        }
        self.steps.validate()?;
        self.policy.validate()
    }
}

/// Driver state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DescentStatus {
    /// Still iterating.
    Running,
    /// The convergence policy fired after warm-up.
    Converged,
    /// The iteration budget ran out. Not an error.
    MaxIterReached,
}

/// Result of a descent run.
#[derive(Debug, Clone)]
pub struct DescentOutcome {
    /// Final parameters.
    pub params: ParameterSet,
    /// Energy at the final parameters.
    pub energy: Complex64,
    /// Iterations performed, including a converging one that was not recorded.
    pub iterations: usize,
    /// Terminal state.
    pub status: DescentStatus,
    /// Objective evaluations spent.
    pub evaluations: usize,
}

impl DescentOutcome {
    /// True if the run stopped on its convergence policy.
    pub fn converged(&self) -> bool {
        self.status == DescentStatus::Converged
    }
}

/// Steepest descent driver.
#[derive(Debug, Clone)]
pub struct GradientDescentOptimizer {
    config: DescentConfig,
}

impl GradientDescentOptimizer {
    /// Create a driver. Fails on invalid tunables.
    pub fn new(config: DescentConfig) -> OptimResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// The configuration in use.
    pub fn config(&self) -> &DescentConfig {
        &self.config
    }

    /// Minimize `objective` starting from `initial`.
    ///
    /// Gradients run on `backend`, which the caller creates once and keeps
    /// for the whole run. Every accepted iteration goes to `sink`. Errors
    /// from the objective or the sink abort the run.
    pub fn minimize<O, B, S>(
        &self,
        objective: &O,
        initial: ParameterSet,
        backend: &B,
        sink: &mut S,
    ) -> OptimResult<DescentOutcome>
    where
        O: Objective + ?Sized,
        B: Backend,
        S: IterationSink + ?Sized,
    {
        initial.ensure_uniform_depth()?;
        if initial.is_empty() {
            return Err(OptimError::InvalidConfig(
                "no parameter vectors to optimize".into(),
            ));
        }

        let coordinator = GradientCoordinator::new(backend, self.config.steps.clone())?;
        let limit = self.config.budget.limit();
        let warmup = warmup_iterations(limit);
        let alpha = self.config.learning_rate;

        let mut params = initial;
        let mut tracker = ConvergenceState::new(&params);
        let mut energy: Option<Complex64> = None;
        let mut evaluations = 0usize;
        let mut iteration = 0usize;
        let mut status = DescentStatus::Running;

        tracing::info!(
            vectors = params.len(),
            depth = params.depth()?,
            workers = backend.size(),
            learning_rate = alpha,
            ?limit,
            "starting gradient descent"
        );

        while status == DescentStatus::Running {
            tracker.snapshot(&params, energy);

            let gradient = coordinator.compute(objective, &params)?;
            evaluations += coordinator.evaluations_per_gradient(&params);

            for (index, (_, grad)) in gradient.iter().enumerate() {
                if let Some(values) = params.vector_mut(index) {
                    for (v, g) in values.iter_mut().zip(grad) {
                        *v -= alpha * g;
                    }
                }
            }

            let current = objective.evaluate(&params).map_err(OptimError::objective)?;
            evaluations += 1;
            energy = Some(current);

            if !current.re.is_finite() {
                tracing::warn!(iteration, energy = %current, "energy is not finite, step size may be too large");
            }

            let changes = tracker.changes(&params, current);
            tracing::debug!(
                iteration,
                energy = current.re,
                energy_change = ?changes.energy,
                parameter_change = ?changes.parameters,
                "descent step"
            );

            if iteration >= warmup && self.config.policy.is_satisfied(&changes) {
                tracing::info!(iteration, energy = current.re, "converged");
                status = DescentStatus::Converged;
            } else {
                sink.record(&IterationRecord::new(iteration, current, &params)?)?;
                if limit.is_some_and(|n| iteration + 1 >= n) {
                    tracing::info!(iteration, energy = current.re, "iteration budget exhausted");
                    status = DescentStatus::MaxIterReached;
                }
            }
            iteration += 1;
        }

        Ok(DescentOutcome {
            params,
            energy: energy.unwrap_or_default(),
            iterations: iteration,
            status,
            evaluations,
        })
    }
}
