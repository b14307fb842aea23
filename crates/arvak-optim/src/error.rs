//! Error types for the optimization engine.

use thiserror::Error;

/// Boxed error returned by objective implementations.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur while optimizing a variational objective.
#[derive(Debug, Error)]
pub enum OptimError {
    /// Parameter vectors (or bounds, or log rows) do not have the expected shape.
    #[error("Shape mismatch in {context}: expected {expected}, found {found}")]
    ShapeMismatch {
        context: String,
        expected: usize,
        found: usize,
    },

    /// The objective collaborator failed. Never retried.
    #[error("Objective evaluation failed: {source}")]
    Objective {
        #[source]
        source: BoxError,
    },

    /// A tunable is out of its valid range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The quasi-Newton solver aborted.
    #[error("Solver error: {0}")]
    Solver(String),

    /// Unknown parameter vector name.
    #[error("Unknown parameter vector: {0}")]
    UnknownVector(String),

    /// The worker pool could not be started.
    #[error("Worker pool error: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    /// I/O error while writing history.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed YAML run configuration.
    #[error("Config error: {0}")]
    Config(#[from] serde_yaml::Error),

    /// Manifest serialization failed.
    #[error("Manifest error: {0}")]
    Manifest(#[from] serde_json::Error),
}

impl OptimError {
    /// Build a shape mismatch error.
    pub fn shape(context: impl Into<String>, expected: usize, found: usize) -> Self {
        OptimError::ShapeMismatch {
            context: context.into(),
            expected,
            found,
        }
    }

    /// Wrap an objective failure.
    pub fn objective(source: BoxError) -> Self {
        OptimError::Objective { source }
    }
}

/// Result type for optimization operations.
pub type OptimResult<T> = Result<T, OptimError>;
