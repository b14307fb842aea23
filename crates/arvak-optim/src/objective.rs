//! The objective contract.
//!
//! The engine never looks inside the energy function. It only needs a pure
//! callable from named parameter vectors to a complex expectation value.

use num_complex::Complex64;

use crate::error::BoxError;
use crate::params::ParameterSet;

/// A variational energy evaluated by an external simulator.
///
/// Implementations must be pure: identical inputs give identical outputs.
/// Gradient estimation re-evaluates the objective from several worker
/// threads at once, hence `Send + Sync` and `&self`.
pub trait Objective: Send + Sync {
    /// Evaluate the energy at `params`. Only the real part drives decisions.
    fn evaluate(&self, params: &ParameterSet) -> Result<Complex64, BoxError>;
}

impl<F> Objective for F
where
    F: Fn(&ParameterSet) -> Result<Complex64, BoxError> + Send + Sync,
{
    fn evaluate(&self, params: &ParameterSet) -> Result<Complex64, BoxError> {
        self(params)
    }
}

/// Adapter for objectives that cannot fail.
pub struct FnObjective<F> {
    f: F,
}

impl<F> FnObjective<F>
where
    F: Fn(&ParameterSet) -> Complex64 + Send + Sync,
{
    /// Wrap an infallible closure.
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> Objective for FnObjective<F>
where
    F: Fn(&ParameterSet) -> Complex64 + Send + Sync,
{
    fn evaluate(&self, params: &ParameterSet) -> Result<Complex64, BoxError> {
        Ok((self.f)(params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_objective() {
        let objective = |params: &ParameterSet| -> Result<Complex64, BoxError> {
            Ok(Complex64::new(params.flatten().iter().sum(), 0.0))
        };
        let params = ParameterSet::qaoa(vec![1.0], vec![2.0]);
        assert_eq!(objective.evaluate(&params).unwrap().re, 3.0);
    }

    #[test]
    fn test_fn_objective_keeps_imaginary_part() {
        let objective = FnObjective::new(|_: &ParameterSet| Complex64::new(-1.0, 0.25));
        let value = objective.evaluate(&ParameterSet::new()).unwrap();
        assert_eq!(value.im, 0.25);
    }
}
