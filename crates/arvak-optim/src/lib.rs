//! Arvak variational parameter optimization.
//!
//! This crate drives the classical half of a hybrid variational loop: given an
//! objective that maps named angle vectors (`gamma`, `beta`, optionally `phi`,
//! `theta`) to an energy, it searches for parameters that minimize that energy.
//!
//! # Features
//!
//! - **Finite Differences**: Two-sided central differences per coordinate
//! - **Parallel Gradients**: Coordinate tasks fanned out over a fixed worker pool
//! - **Gradient Descent**: Fixed learning rate with parameter- or energy-based convergence
//! - **Boxed L-BFGS**: Quasi-Newton search with per-coordinate bounds
//! - **Iteration History**: Crash-safe CSV log, flushed per row, plus a JSON manifest
//!
//! # Example
//!
//! ```ignore
//! use arvak_optim::{
//!     DescentConfig, GradientDescentOptimizer, IterationBudget, IterationLogger,
//!     ColumnLayout, ParameterSet, WorkerPool,
//! };
//!
//! let pool = WorkerPool::new(4)?;
//! let initial = ParameterSet::qaoa(vec![0.6; 2], vec![0.6; 2]);
//! let mut log = IterationLogger::open("history.csv", ColumnLayout::from_params(&initial)?)?;
//!
//! let optimizer = GradientDescentOptimizer::new(
//!     DescentConfig::new(0.05, IterationBudget::Bounded(200)),
//! )?;
//! let outcome = optimizer.minimize(&my_objective, initial, &pool, &mut log)?;
//! println!("E = {} after {} iterations", outcome.energy, outcome.iterations);
//! ```

pub mod config;
pub mod convergence;
pub mod descent;
pub mod error;
pub mod finite_diff;
pub mod gradient;
pub mod landscapes;
pub mod logger;
pub mod manifest;
pub mod objective;
pub mod params;
pub mod pool;
pub mod quasi_newton;

// Re-exports
pub use config::RunConfig;
pub use convergence::{ConvergencePolicy, ConvergenceState, StepChanges};
pub use descent::{
    DescentConfig, DescentOutcome, DescentStatus, GradientDescentOptimizer, IterationBudget,
};
pub use error::{BoxError, OptimError, OptimResult};
pub use finite_diff::{FiniteDiffSteps, central_difference};
pub use gradient::{Gradient, GradientCoordinator};
pub use landscapes::{CosineLandscape, LinearSum, Quadratic};
pub use logger::{ColumnLayout, IterationLogger, IterationRecord, IterationSink, NullSink};
pub use manifest::{Driver, RunManifest, RunSummary};
pub use objective::{FnObjective, Objective};
pub use params::{BETA, GAMMA, NamedVector, PHI, ParameterSet, THETA};
pub use pool::{Backend, SerialBackend, WorkerPool};
pub use quasi_newton::{
    BoxedQuasiNewtonOptimizer, Bounds, QuasiNewtonConfig, QuasiNewtonOutcome,
};
