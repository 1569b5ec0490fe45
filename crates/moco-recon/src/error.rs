//! Error types for projection and reconstruction operations.

use thiserror::Error;

/// Main error type for the projection drivers.
///
/// Every dimensional check runs before the first projection is launched, so
/// a returned error never leaves a half-processed destination behind.
/// Sampling outside a volume or field is defined behaviour (zero) and is
/// never reported here.
#[derive(Error, Debug)]
pub enum ReconError {
    /// Invalid configuration (missing inputs, inconsistent parameters).
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Dimension mismatch.
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// Shape mismatch.
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// A projection number with no geometry record, weights row or signal value.
    #[error("Projection {index} out of range (available: {available})")]
    ProjectionOutOfRange { index: i64, available: usize },

    /// Backend failure (allocation, launch, read-back).
    #[error("Device error: {0}")]
    Device(String),

    /// Stopped by a progress callback between projections.
    #[error("Cancelled after {completed} of {total} projections")]
    Cancelled { completed: usize, total: usize },
}

/// Result type for projection operations.
pub type Result<T> = std::result::Result<T, ReconError>;

impl ReconError {
    /// Create an invalid configuration error.
    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Create a dimension mismatch error.
    pub fn dimension_mismatch(msg: impl Into<String>) -> Self {
        Self::DimensionMismatch(msg.into())
    }

    /// Create a shape mismatch error from two shapes.
    pub fn shape_mismatch(expected: &[usize], actual: &[usize]) -> Self {
        Self::ShapeMismatch {
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    }

    /// Create a device error.
    pub fn device(msg: impl Into<String>) -> Self {
        Self::Device(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = ReconError::invalid_configuration("missing signal");
        assert!(matches!(err, ReconError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_error_display() {
        let err = ReconError::dimension_mismatch("weights rows");
        assert_eq!(err.to_string(), "Dimension mismatch: weights rows");

        let err = ReconError::ProjectionOutOfRange { index: 12, available: 10 };
        assert_eq!(err.to_string(), "Projection 12 out of range (available: 10)");
    }

    #[test]
    fn test_shape_mismatch() {
        let err = ReconError::shape_mismatch(&[10, 10], &[5, 5]);
        let err_str = err.to_string();
        assert!(err_str.contains("expected"));
        assert!(err_str.contains("got"));
    }
}
