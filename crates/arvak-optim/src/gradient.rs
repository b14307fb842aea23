//! Parallel finite-difference gradients.
//!
//! One task per coordinate per parameter vector is fanned out over a
//! [`Backend`]; each task performs the two-sided evaluation of
//! [`central_difference`]. Results are placed back by the task's explicit
//! `(vector, coordinate)` index, so completion order never matters.

use crate::error::{OptimError, OptimResult};
use crate::finite_diff::{FiniteDiffSteps, central_difference};
use crate::objective::Objective;
use crate::params::ParameterSet;
use crate::pool::Backend;

/// Gradient with the same names and shape as the parameters it was taken at.
pub type Gradient = ParameterSet;

/// One unit of gradient work.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateTask {
    /// Position of the vector in canonical order.
    pub vector_index: usize,
    /// Coordinate within that vector.
    pub coordinate: usize,
    /// Finite-difference step.
    pub step: f64,
}

/// Fans finite-difference tasks out over a backend and assembles gradients.
pub struct GradientCoordinator<'b, B: Backend> {
    backend: &'b B,
    steps: FiniteDiffSteps,
}

impl<'b, B: Backend> GradientCoordinator<'b, B> {
    /// Create a coordinator. Fails if any step is not positive.
    pub fn new(backend: &'b B, steps: FiniteDiffSteps) -> OptimResult<Self> {
        steps.validate()?;
        Ok(Self { backend, steps })
    }

    /// The finite-difference steps in use.
    pub fn steps(&self) -> &FiniteDiffSteps {
        &self.steps
    }

    /// Number of objective evaluations one gradient costs.
    pub fn evaluations_per_gradient(&self, params: &ParameterSet) -> usize {
        2 * params.coordinate_count()
    }

    /// Build the task list for `params`, vector-major.
    pub fn tasks(&self, params: &ParameterSet) -> Vec<CoordinateTask> {
        params
            .iter()
            .enumerate()
            .flat_map(|(vector_index, (name, values))| {
                let step = self.steps.step_for(name);
                (0..values.len()).map(move |coordinate| CoordinateTask {
                    vector_index,
                    coordinate,
                    step,
                })
            })
            .collect()
    }

    /// Compute the full gradient at `params`.
    ///
    /// Fails with [`OptimError::ShapeMismatch`] before evaluating anything
    /// if the vectors have different lengths. If several tasks fail, the
    /// error of the first task in vector-major order is returned.
    pub fn compute<O: Objective + ?Sized>(
        &self,
        objective: &O,
        params: &ParameterSet,
    ) -> OptimResult<Gradient> {
        params.ensure_uniform_depth()?;

        let tasks = self.tasks(params);
        tracing::trace!(
            tasks = tasks.len(),
            workers = self.backend.size(),
            "dispatching gradient tasks"
        );

        let results = self.backend.execute(tasks, |task| {
            central_difference(
                objective,
                params,
                task.vector_index,
                task.coordinate,
                task.step,
            )
        });

        let mut gradient = params.zeros_like();
        let mut first_error: Option<(CoordinateTask, OptimError)> = None;

        for (task, result) in results {
            match result {
                Ok(derivative) => {
                    let slot = gradient
                        .vector_mut(task.vector_index)
                        .and_then(|v| v.get_mut(task.coordinate))
                        .ok_or_else(|| {
                            OptimError::shape("gradient slot", params.len(), task.vector_index)
                        })?;
                    *slot = derivative;
                }
                Err(err) => {
                    let earlier = first_error.as_ref().is_some_and(|(seen, _)| {
                        (seen.vector_index, seen.coordinate) < (task.vector_index, task.coordinate)
                    });
                    if !earlier {
                        first_error = Some((task, err));
                    }
                }
            }
        }

        match first_error {
            Some((_, err)) => Err(err),
            None => Ok(gradient),
        }
    }
}
