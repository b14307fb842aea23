//! Box-constrained quasi-Newton search over the flattened parameters.
//!
//! All vectors are concatenated in canonical order (`gamma`, `beta`,
//! `phi`, `theta`, ...) and handed to argmin's L-BFGS with a More–Thuente
//! line search. Bounds are enforced by clamping before every evaluation
//! and by zeroing gradient components that push further out of an active
//! bound. Termination is left entirely to the solver.
//!
//! The gradient is a serial 3-point central difference inside the solver
//! problem; it does not use the worker pool.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use argmin::core::observers::{Observe, ObserverMode};
use argmin::core::{
    CostFunction, Error as ArgminError, Executor, Gradient, KV, State, TerminationReason,
    TerminationStatus,
};
use argmin::solver::linesearch::MoreThuenteLineSearch;
use argmin::solver::quasinewton::LBFGS;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::error::{OptimError, OptimResult};
use crate::logger::{IterationRecord, IterationSink};
use crate::objective::Objective;
use crate::params::ParameterSet;

/// Tolerance for treating a coordinate as sitting on its bound.
const BOUND_EPS: f64 = 1e-12;

/// Per-coordinate `(lower, upper)` bounds over the flattened parameters.
///
/// Serialized as `[lower, upper]` pairs where `null` marks an unbounded
/// side, e.g. `[[0.0, null]]` for `[0, ∞)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<BoundPair>", into = "Vec<BoundPair>")]
pub struct Bounds(Vec<(f64, f64)>);

type BoundPair = (Option<f64>, Option<f64>);

impl From<Vec<BoundPair>> for Bounds {
    fn from(pairs: Vec<BoundPair>) -> Self {
        Self(
            pairs
                .into_iter()
                .map(|(lo, hi)| (lo.unwrap_or(f64::NEG_INFINITY), hi.unwrap_or(f64::INFINITY)))
                .collect(),
        )
    }
}

impl From<Bounds> for Vec<BoundPair> {
    fn from(bounds: Bounds) -> Self {
        let side = |v: f64| v.is_finite().then_some(v);
        bounds.0.into_iter().map(|(lo, hi)| (side(lo), side(hi))).collect()
    }
}

impl Bounds {
    /// Explicit bounds, one pair per flattened coordinate.
    pub fn new(bounds: Vec<(f64, f64)>) -> Self {
        Self(bounds)
    }

    /// `[0, ∞)` for `n` coordinates.
    pub fn non_negative(n: usize) -> Self {
        Self(vec![(0.0, f64::INFINITY); n])
    }

    /// The same interval for `n` coordinates.
    pub fn uniform(n: usize, lower: f64, upper: f64) -> Self {
        Self(vec![(lower, upper); n])
    }

    /// Number of coordinates covered.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if no coordinate is covered.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Check the count and that every interval is non-empty.
    pub fn validate(&self, coordinates: usize) -> OptimResult<()> {
        if self.0.len() != coordinates {
            return Err(OptimError::shape("bounds", coordinates, self.0.len()));
        }
        match self.0.iter().position(|&(lo, hi)| lo.is_nan() || hi.is_nan() || lo > hi) {
            Some(i) => Err(OptimError::InvalidConfig(format!(
                "bound {i} is empty: {:?}",
                self.0[i]
            ))),
            None => Ok(()),
        }
    }

    /// Project `x` into the box.
    pub fn clamp(&self, x: &[f64]) -> Vec<f64> {
        x.iter()
            .zip(&self.0)
            .map(|(&v, &(lo, hi))| v.clamp(lo, hi))
            .collect()
    }

    /// Zero gradient components that would push an active coordinate out of the box.
    fn project_gradient(&self, x: &[f64], gradient: &mut [f64]) {
        for ((g, &v), &(lo, hi)) in gradient.iter_mut().zip(x).zip(&self.0) {
            if (v <= lo + BOUND_EPS && *g > 0.0) || (v >= hi - BOUND_EPS && *g < 0.0) {
                *g = 0.0;
            }
        }
    }
}

/// Tunables of the quasi-Newton search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuasiNewtonConfig {
    /// Maximum solver iterations.
    pub max_iter: u64,
    /// Gradient-norm tolerance.
    pub gtol: f64,
    /// Cost-change tolerance.
    pub ftol: f64,
    /// Number of L-BFGS correction pairs.
    pub history: usize,
    /// Bounds over the flattened parameters; `[0, ∞)` everywhere if unset.
    pub bounds: Option<Bounds>,
}

impl Default for QuasiNewtonConfig {
    fn default() -> Self {
        Self {
            max_iter: 15_000,
            gtol: 1e-8,
            ftol: 1e-10,
            history: 10,
            bounds: None,
        }
    }
}

impl QuasiNewtonConfig {
    /// Override the bounds.
    pub fn with_bounds(mut self, bounds: Bounds) -> Self {
        self.bounds = Some(bounds);
        self
    }

    /// Override the iteration limit.
    pub fn with_max_iter(mut self, max_iter: u64) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Check tolerances and history size.
    pub fn validate(&self) -> OptimResult<()> {
        if self.max_iter == 0 {
            return Err(OptimError::InvalidConfig("max_iter must be >= 1".into()));
        }
        if self.history == 0 {
            return Err(OptimError::InvalidConfig("history must be >= 1".into()));
        }
        for (name, value) in [("gtol", self.gtol), ("ftol", self.ftol)] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(OptimError::InvalidConfig(format!(
                    "{name} must be non-negative, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Result of a quasi-Newton run.
#[derive(Debug, Clone)]
pub struct QuasiNewtonOutcome {
    /// Best parameters, split back into named vectors and inside the box.
    pub params: ParameterSet,
    /// Energy at `params`.
    pub energy: Complex64,
    /// Solver iterations.
    pub iterations: u64,
    /// Objective evaluations spent, including gradient estimation.
    pub evaluations: usize,
    /// True if the solver met its own tolerance.
    pub converged: bool,
    /// Solver termination message.
    pub message: String,
}

/// Evaluations seen since the last accepted step.
type EvalCache = Arc<Mutex<Vec<(Vec<f64>, Complex64)>>>;
/// First engine-side failure raised inside the solver.
type FailureSlot = Arc<Mutex<Option<OptimError>>>;

fn store_failure(slot: &FailureSlot, err: OptimError) -> ArgminError {
    let message = err.to_string();
    if let Ok(mut guard) = slot.lock() {
        guard.get_or_insert(err);
    }
    ArgminError::msg(message)
}

struct BoxedProblem<'a, O: ?Sized> {
    objective: &'a O,
    template: &'a ParameterSet,
    bounds: &'a Bounds,
    cache: EvalCache,
    failure: FailureSlot,
    evaluations: Arc<AtomicUsize>,
}

impl<O: Objective + ?Sized> BoxedProblem<'_, O> {
    fn energy(&self, x: &[f64]) -> Result<Complex64, ArgminError> {
        let params = self
            .template
            .split_flat(x)
            .map_err(|e| store_failure(&self.failure, e))?;
        self.evaluations.fetch_add(1, Ordering::Relaxed);
        self.objective
            .evaluate(&params)
            .map_err(|e| store_failure(&self.failure, OptimError::objective(e)))
    }
}

impl<O: Objective + ?Sized> CostFunction for BoxedProblem<'_, O> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, param: &Self::Param) -> Result<Self::Output, ArgminError> {
        let x = self.bounds.clamp(param);
        let energy = self.energy(&x)?;
        if let Ok(mut cache) = self.cache.lock() {
            cache.push((x, energy));
        }
        Ok(energy.re)
    }
}

impl<O: Objective + ?Sized> BoxedProblem<'_, O> {
    /// 3-point difference along coordinate `i` that never leaves the box.
    ///
    /// Central when `x_i ± h` fits, otherwise the one-sided 3-point rule
    /// pointing into the box. If the box is narrower than `2h` the step is
    /// shrunk to fit a central difference.
    fn difference(&self, x: &[f64], i: usize, f0: &mut Option<f64>) -> Result<f64, ArgminError> {
        let (lo, hi) = self.bounds.0[i];
        let xi = x[i];
        let h = f64::EPSILON.cbrt() * xi.abs().max(1.0);
        let mut shifted = x.to_vec();
        let mut at = |offset: f64| -> Result<f64, ArgminError> {
            shifted[i] = xi + offset;
            Ok(self.energy(&shifted)?.re)
        };

        if xi - h >= lo && xi + h <= hi {
            return Ok((at(h)? - at(-h)?) / (2.0 * h));
        }

        let mut center = || -> Result<f64, ArgminError> {
            match *f0 {
                Some(f) => Ok(f),
                None => {
                    let f = self.energy(x)?.re;
                    *f0 = Some(f);
                    Ok(f)
                }
            }
        };

        if xi + 2.0 * h <= hi {
            let c = center()?;
            Ok((-3.0 * c + 4.0 * at(h)? - at(2.0 * h)?) / (2.0 * h))
        } else if xi - 2.0 * h >= lo {
            let c = center()?;
            Ok((3.0 * c - 4.0 * at(-h)? + at(-2.0 * h)?) / (2.0 * h))
        } else {
            let fit = (xi - lo).min(hi - xi);
            if fit > 0.0 {
                Ok((at(fit)? - at(-fit)?) / (2.0 * fit))
            } else {
                Ok(0.0)
            }
        }
    }
}

impl<O: Objective + ?Sized> Gradient for BoxedProblem<'_, O> {
    type Param = Vec<f64>;
    type Gradient = Vec<f64>;

    fn gradient(&self, param: &Self::Param) -> Result<Self::Gradient, ArgminError> {
        let x = self.bounds.clamp(param);
        let mut f0 = None;
        let mut grad = (0..x.len())
            .map(|i| self.difference(&x, i, &mut f0))
            .collect::<Result<Vec<_>, _>>()?;

        self.bounds.project_gradient(&x, &mut grad);
        Ok(grad)
    }
}

/// Splits every accepted step back into named vectors and records it.
struct StepObserver<S> {
    template: ParameterSet,
    bounds: Bounds,
    cache: EvalCache,
    failure: FailureSlot,
    sink: Arc<Mutex<S>>,
    accepted: usize,
}

impl<S: IterationSink> StepObserver<S> {
    fn accepted_energy(&self, x: &[f64], fallback: f64) -> Complex64 {
        let hit = self.cache.lock().ok().and_then(|mut cache| {
            let found = cache
                .iter()
                .rev()
                .find(|(seen, _)| same_point(seen, x))
                .map(|(_, e)| *e);
            cache.clear();
            found
        });
        hit.unwrap_or_else(|| Complex64::new(fallback, 0.0))
    }

    fn record(&mut self, x: &[f64], energy: Complex64) -> OptimResult<()> {
        let params = self.template.split_flat(x)?;
        let record = IterationRecord::new(self.accepted, energy, &params)?;
        let mut sink = self
            .sink
            .lock()
            .map_err(|_| OptimError::Solver("iteration sink lock poisoned".into()))?;
        sink.record(&record)
    }
}

fn same_point(a: &[f64], b: &[f64]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.to_bits() == y.to_bits())
}

impl<I, S> Observe<I> for StepObserver<S>
where
    I: State<Param = Vec<f64>, Float = f64>,
    S: IterationSink,
{
    fn observe_iter(&mut self, state: &I, _kv: &KV) -> Result<(), ArgminError> {
        let Some(param) = state.get_param() else {
            return Ok(());
        };
        let x = self.bounds.clamp(param);
        let energy = self.accepted_energy(&x, state.get_cost());
        self.accepted += 1;

        tracing::debug!(step = self.accepted, energy = energy.re, "quasi-Newton step");
        self.record(&x, energy)
            .map_err(|e| store_failure(&self.failure, e))
    }
}

/// L-BFGS over the flattened parameter vectors with box constraints.
#[derive(Debug, Clone, Default)]
pub struct BoxedQuasiNewtonOptimizer {
    config: QuasiNewtonConfig,
}

impl BoxedQuasiNewtonOptimizer {
    /// Create an optimizer. Fails on invalid tunables.
    pub fn new(config: QuasiNewtonConfig) -> OptimResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// The configuration in use.
    pub fn config(&self) -> &QuasiNewtonConfig {
        &self.config
    }

    /// Minimize `objective` from `initial`, recording each accepted step in `sink`.
    ///
    /// `sink` is shared with the solver's observer for the duration of the
    /// run; records are written as the solver accepts them, 1-based.
    pub fn minimize<O, S>(
        &self,
        objective: &O,
        initial: &ParameterSet,
        sink: Arc<Mutex<S>>,
    ) -> OptimResult<QuasiNewtonOutcome>
    where
        O: Objective + ?Sized,
        S: IterationSink + Send + 'static,
    {
        initial.ensure_uniform_depth()?;
        let n = initial.coordinate_count();
        if n == 0 {
            return Err(OptimError::InvalidConfig(
                "no parameters to optimize".into(),
            ));
        }

        let bounds = self
            .config
            .bounds
            .clone()
            .unwrap_or_else(|| Bounds::non_negative(n));
        bounds.validate(n)?;

        let x0 = bounds.clamp(&initial.flatten());
        let cache: EvalCache = Arc::default();
        let failure: FailureSlot = Arc::default();
        let evaluations = Arc::new(AtomicUsize::new(0));

        let problem = BoxedProblem {
            objective,
            template: initial,
            bounds: &bounds,
            cache: Arc::clone(&cache),
            failure: Arc::clone(&failure),
            evaluations: Arc::clone(&evaluations),
        };
        let observer = StepObserver {
            template: initial.clone(),
            bounds: bounds.clone(),
            cache,
            failure: Arc::clone(&failure),
            sink,
            accepted: 0,
        };

        let linesearch = MoreThuenteLineSearch::new();
        let solver = LBFGS::new(linesearch, self.config.history)
            .with_tolerance_grad(self.config.gtol)
            .map_err(|e| OptimError::InvalidConfig(format!("gtol: {e}")))?
            .with_tolerance_cost(self.config.ftol)
            .map_err(|e| OptimError::InvalidConfig(format!("ftol: {e}")))?;

        tracing::info!(
            coordinates = n,
            vectors = initial.len(),
            max_iter = self.config.max_iter,
            "starting boxed L-BFGS"
        );

        let max_iter = self.config.max_iter;
        let run = Executor::new(problem, solver)
            .configure(|state| state.param(x0).max_iters(max_iter))
            .add_observer(observer, ObserverMode::Always)
            .run();

        let taken = failure.lock().ok().and_then(|mut slot| slot.take());
        if let Some(err) = taken {
            return Err(err);
        }
        let res = run.map_err(|e| OptimError::Solver(e.to_string()))?;

        let state = res.state();
        let best = state
            .get_best_param()
            .ok_or_else(|| OptimError::Solver("solver returned no parameters".into()))?;
        let best = bounds.clamp(best);
        let termination = state.get_termination_status();
        let converged = matches!(
            termination,
            TerminationStatus::Terminated(TerminationReason::SolverConverged)
                | TerminationStatus::Terminated(TerminationReason::TargetCostReached)
        );
        let message = termination.to_string();
        let iterations = state.get_iter();
        let mut evaluations = evaluations.load(Ordering::Relaxed);

        let params = initial.split_flat(&best)?;
        let energy = objective.evaluate(&params).map_err(OptimError::objective)?;
        evaluations += 1;

        tracing::info!(iterations, energy = energy.re, converged, %message, "boxed L-BFGS finished");

        Ok(QuasiNewtonOutcome {
            params,
            energy,
            iterations,
            evaluations,
            converged,
            message,
        })
    }
}
