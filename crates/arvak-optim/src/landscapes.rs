//! Analytic energy landscapes.
//!
//! Cheap stand-ins for circuit expectation values, used to exercise the
//! drivers from the command line and in tests.

use num_complex::Complex64;

use crate::error::{BoxError, OptimError};
use crate::objective::Objective;
use crate::params::{BETA, GAMMA, ParameterSet};

/// Sum of every coordinate. Gradient is 1 everywhere.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearSum;

impl Objective for LinearSum {
    fn evaluate(&self, params: &ParameterSet) -> Result<Complex64, BoxError> {
        Ok(Complex64::new(params.flatten().iter().sum(), 0.0))
    }
}

/// `Σ (v - v*)² + offset` over the flattened coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Quadratic {
    pub targets: Vec<f64>,
    pub offset: f64,
}

impl Quadratic {
    pub fn new(targets: Vec<f64>, offset: f64) -> Self {
        Self { targets, offset }
    }

    /// Same target for every coordinate of `params`.
    pub fn centered(params: &ParameterSet, target: f64, offset: f64) -> Self {
        Self::new(vec![target; params.coordinate_count()], offset)
    }
}

impl Objective for Quadratic {
    fn evaluate(&self, params: &ParameterSet) -> Result<Complex64, BoxError> {
        let flat = params.flatten();
        if flat.len() != self.targets.len() {
            return Err(OptimError::shape("quadratic targets", self.targets.len(), flat.len()).into());
        }
        let e: f64 = flat
            .iter()
            .zip(&self.targets)
            .map(|(v, t)| (v - t).powi(2))
            .sum();
        Ok(Complex64::new(e + self.offset, 0.0))
    }
}

/// `Σ_i -cos(γ_i)·cos(β_i)`, a periodic surface shaped like a one-edge
/// QAOA expectation. Minimum `-p` at the origin.
#[derive(Debug, Clone, Copy, Default)]
pub struct CosineLandscape;

impl Objective for CosineLandscape {
    fn evaluate(&self, params: &ParameterSet) -> Result<Complex64, BoxError> {
        let gamma = params
            .get(GAMMA)
            .ok_or_else(|| OptimError::UnknownVector(GAMMA.into()))?;
        let beta = params
            .get(BETA)
            .ok_or_else(|| OptimError::UnknownVector(BETA.into()))?;
        let e: f64 = gamma
            .iter()
            .zip(beta)
            .map(|(g, b)| -g.cos() * b.cos())
            .sum();
        Ok(Complex64::new(e, 0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::PHI;
    use approx::assert_relative_eq;

    #[test]
    fn test_linear_sum() {
        let params = ParameterSet::qaoa(vec![0.6, 0.1], vec![0.6, 0.2]);
        assert_relative_eq!(LinearSum.evaluate(&params).unwrap().re, 1.5);
    }

    #[test]
    fn test_quadratic_minimum_is_offset() {
        let params = ParameterSet::qaoa(vec![0.3], vec![0.3]).with_vector(PHI, vec![0.3]);
        let bowl = Quadratic::centered(&params, 0.3, -2.0);
        assert_relative_eq!(bowl.evaluate(&params).unwrap().re, -2.0);
    }

    #[test]
    fn test_quadratic_shape_mismatch() {
        let bowl = Quadratic::new(vec![0.0; 3], 0.0);
        let err = bowl
            .evaluate(&ParameterSet::qaoa(vec![0.0], vec![0.0]))
            .unwrap_err();
        assert!(err.to_string().contains("quadratic targets"));
    }

    #[test]
    fn test_cosine_landscape() {
        let origin = ParameterSet::qaoa(vec![0.0; 3], vec![0.0; 3]);
        assert_relative_eq!(CosineLandscape.evaluate(&origin).unwrap().re, -3.0);

        let quarter = ParameterSet::qaoa(vec![std::f64::consts::FRAC_PI_2], vec![0.0]);
        assert_relative_eq!(
            CosineLandscape.evaluate(&quarter).unwrap().re,
            0.0,
            epsilon = 1e-15
        );
        assert!(CosineLandscape.evaluate(&ParameterSet::new()).is_err());
    }
}
