//! Named parameter vectors.
//!
//! A variational ansatz of depth `p` is driven by two to four angle vectors
//! (`gamma`, `beta`, and optionally `phi`, `theta`), each of length `p`.
//! [`ParameterSet`] keeps them as an ordered mapping from name to vector.
//! The insertion order is the canonical order for flattening, splitting,
//! gradient assembly and history columns.

use serde::{Deserialize, Serialize};

use crate::error::{OptimError, OptimResult};

/// Cost-layer angles.
pub const GAMMA: &str = "gamma";
/// Mixer-layer angles.
pub const BETA: &str = "beta";
/// Optional third angle family.
pub const PHI: &str = "phi";
/// Optional fourth angle family.
pub const THETA: &str = "theta";

/// A single named parameter vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedVector {
    /// Vector name, e.g. `gamma`.
    pub name: String,
    /// Angles, one per layer.
    pub values: Vec<f64>,
}

/// Ordered mapping from vector name to parameter vector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterSet {
    vectors: Vec<NamedVector>,
}

impl ParameterSet {
    /// Create an empty parameter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from `(name, values)` pairs, keeping their order.
    ///
    /// Later duplicates replace earlier entries in place.
    pub fn from_vectors<N, I>(vectors: I) -> Self
    where
        N: Into<String>,
        I: IntoIterator<Item = (N, Vec<f64>)>,
    {
        vectors
            .into_iter()
            .fold(Self::new(), |set, (name, values)| set.with_vector(name, values))
    }

    /// The common two-vector QAOA layout.
    pub fn qaoa(gamma: Vec<f64>, beta: Vec<f64>) -> Self {
        Self::new().with_vector(GAMMA, gamma).with_vector(BETA, beta)
    }

    /// Append a vector, or replace the values of an existing one.
    pub fn with_vector(mut self, name: impl Into<String>, values: Vec<f64>) -> Self {
        self.insert(name, values);
        self
    }

    /// Insert a vector, or replace the values of an existing one in place.
    pub fn insert(&mut self, name: impl Into<String>, values: Vec<f64>) {
        let name = name.into();
        match self.vectors.iter_mut().find(|v| v.name == name) {
            Some(existing) => existing.values = values,
            None => self.vectors.push(NamedVector { name, values }),
        }
    }

    /// Look up a vector by name.
    pub fn get(&self, name: &str) -> Option<&[f64]> {
        self.vectors
            .iter()
            .find(|v| v.name == name)
            .map(|v| v.values.as_slice())
    }

    /// Mutable lookup by name.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Vec<f64>> {
        self.vectors
            .iter_mut()
            .find(|v| v.name == name)
            .map(|v| &mut v.values)
    }

    /// Vector at a position in canonical order.
    pub fn vector(&self, index: usize) -> Option<&[f64]> {
        self.vectors.get(index).map(|v| v.values.as_slice())
    }

    /// Mutable vector at a position in canonical order.
    pub fn vector_mut(&mut self, index: usize) -> Option<&mut Vec<f64>> {
        self.vectors.get_mut(index).map(|v| &mut v.values)
    }

    /// Vector names in canonical order.
    pub fn names(&self) -> Vec<&str> {
        self.vectors.iter().map(|v| v.name.as_str()).collect()
    }

    /// Number of vectors.
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    /// True if no vectors are present.
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Iterate `(name, values)` in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.vectors
            .iter()
            .map(|v| (v.name.as_str(), v.values.as_slice()))
    }

    /// Total number of coordinates across all vectors.
    pub fn coordinate_count(&self) -> usize {
        self.vectors.iter().map(|v| v.values.len()).sum()
    }

    /// Common vector length `p`.
    ///
    /// Fails with [`OptimError::ShapeMismatch`] if the vectors disagree.
    pub fn depth(&self) -> OptimResult<usize> {
        let expected = self.vectors.first().map_or(0, |v| v.values.len());
        for v in &self.vectors {
            if v.values.len() != expected {
                return Err(OptimError::shape(
                    format!("parameter vector '{}'", v.name),
                    expected,
                    v.values.len(),
                ));
            }
        }
        Ok(expected)
    }

    /// Check that every vector has the same length.
    pub fn ensure_uniform_depth(&self) -> OptimResult<()> {
        self.depth().map(|_| ())
    }

    /// Concatenate all vectors in canonical order.
    pub fn flatten(&self) -> Vec<f64> {
        self.vectors
            .iter()
            .flat_map(|v| v.values.iter().copied())
            .collect()
    }

    /// Split a flat vector back into vectors shaped like `self`.
    pub fn split_flat(&self, flat: &[f64]) -> OptimResult<ParameterSet> {
        let total = self.coordinate_count();
        if flat.len() != total {
            return Err(OptimError::shape("flattened parameters", total, flat.len()));
        }

        let mut offset = 0;
        let vectors = self
            .vectors
            .iter()
            .map(|v| {
                let end = offset + v.values.len();
                let values = flat[offset..end].to_vec();
                offset = end;
                NamedVector {
                    name: v.name.clone(),
                    values,
                }
            })
            .collect();

        Ok(ParameterSet { vectors })
    }

    /// Coordinates interleaved by layer: `v0[0], v1[0], …, v0[1], v1[1], …`.
    ///
    /// Requires uniform depth.
    pub fn interleaved(&self) -> OptimResult<Vec<f64>> {
        let depth = self.depth()?;
        let mut out = Vec::with_capacity(self.coordinate_count());
        for layer in 0..depth {
            out.extend(self.vectors.iter().map(|v| v.values[layer]));
        }
        Ok(out)
    }

    /// Copy of `self` with one coordinate shifted by `delta`.
    pub fn perturbed(&self, vector_index: usize, coordinate: usize, delta: f64) -> ParameterSet {
        let mut shifted = self.clone();
        if let Some(value) = shifted
            .vectors
            .get_mut(vector_index)
            .and_then(|v| v.values.get_mut(coordinate))
        {
            *value += delta;
        }
        shifted
    }

    /// Same names and shape, every coordinate zero.
    pub fn zeros_like(&self) -> ParameterSet {
        ParameterSet {
            vectors: self
                .vectors
                .iter()
                .map(|v| NamedVector {
                    name: v.name.clone(),
                    values: vec![0.0; v.values.len()],
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn four_vectors() -> ParameterSet {
        ParameterSet::qaoa(vec![1.0, 2.0], vec![3.0, 4.0])
            .with_vector(PHI, vec![5.0, 6.0])
            .with_vector(THETA, vec![7.0, 8.0])
    }

    #[test]
    fn test_order_is_insertion_order() {
        let set = four_vectors();
        assert_eq!(set.names(), vec!["gamma", "beta", "phi", "theta"]);
        assert_eq!(set.depth().unwrap(), 2);
        assert_eq!(set.coordinate_count(), 8);
    }

    #[test]
    fn test_insert_replaces_in_place() {
        let mut set = ParameterSet::qaoa(vec![0.1], vec![0.2]);
        set.insert(GAMMA, vec![0.9]);
        assert_eq!(set.names(), vec!["gamma", "beta"]);
        assert_eq!(set.get(GAMMA), Some(&[0.9][..]));
    }

    #[test]
    fn test_get_mut_edits_by_name() {
        let mut set = four_vectors();
        if let Some(phi) = set.get_mut(PHI) {
            phi[1] = -6.0;
        }
        assert_eq!(set.get(PHI), Some(&[5.0, -6.0][..]));
        assert!(set.get_mut("delta").is_none());
        assert_eq!(set.names(), vec!["gamma", "beta", "phi", "theta"]);
    }

    #[test]
    fn test_flatten_and_split() {
        let set = four_vectors();
        let flat = set.flatten();
        assert_eq!(flat, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);

        let shifted: Vec<f64> = flat.iter().map(|x| x * 10.0).collect();
        let split = set.split_flat(&shifted).unwrap();
        assert_eq!(split.get(PHI), Some(&[50.0, 60.0][..]));
        assert_eq!(split.names(), set.names());
    }

    #[test]
    fn test_split_rejects_wrong_length() {
        let set = ParameterSet::qaoa(vec![0.0; 2], vec![0.0; 2]);
        let err = set.split_flat(&[0.0; 3]).unwrap_err();
        assert!(matches!(
            err,
            OptimError::ShapeMismatch {
                expected: 4,
                found: 3,
                ..
            }
        ));
    }

    #[test]
    fn test_interleaved() {
        let set = four_vectors();
        assert_eq!(
            set.interleaved().unwrap(),
            vec![1.0, 3.0, 5.0, 7.0, 2.0, 4.0, 6.0, 8.0]
        );
    }

    #[test]
    fn test_uneven_depth_is_rejected() {
        let set = ParameterSet::qaoa(vec![0.1, 0.2], vec![0.3]);
        assert!(set.ensure_uniform_depth().is_err());
        assert!(set.interleaved().is_err());
    }

    #[test]
    fn test_perturbed_leaves_original() {
        let set = ParameterSet::qaoa(vec![0.5], vec![0.5]);
        let shifted = set.perturbed(1, 0, 0.25);
        assert_eq!(shifted.get(BETA), Some(&[0.75][..]));
        assert_eq!(set.get(BETA), Some(&[0.5][..]));
    }
}
