//! Error types for the gridshift workspace.

use thiserror::Error;

/// Result type alias using ShiftError.
pub type ShiftResult<T> = Result<T, ShiftError>;

/// Primary error type for grid-shift and transformation operations.
#[derive(Debug, Error)]
pub enum ShiftError {
    // === Argument errors: fail immediately, no retry ===
    #[error("Invalid parameter value for '{param}': {message}")]
    InvalidParameter { param: String, message: String },

    #[error("Invalid bounding rectangle: {0}")]
    InvalidBbox(String),

    // === Grid errors ===
    #[error("Grid {0} is not available. Consult the resource file index of your grid distribution for where to obtain it.")]
    GridUnavailable(String),

    #[error("Invalid grid data in {grid}: {reason}")]
    Decode { grid: String, reason: String },

    // === Transformation errors ===
    #[error("Point outside of available coverage: {0}")]
    OutOfDomain(String),

    #[error("Network error while fetching remote grid: {0}")]
    Network(String),

    #[error("Iteration failed to converge: {0}")]
    Convergence(String),

    #[error("No applicable coordinate operation for the given point")]
    NoOperation,

    #[error("Batch transform failed for differing reasons")]
    MixedTransformFailure,

    // === Infrastructure ===
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ShiftError {
    /// Get the aggregate error code for this error, as reported by the
    /// batch transform entry points. 0 is reserved for success.
    pub fn code(&self) -> i32 {
        match self {
            ShiftError::InvalidParameter { .. } | ShiftError::InvalidBbox(_) => 1024,
            ShiftError::GridUnavailable(_) => 2049,
            ShiftError::Decode { .. } => 2050,
            ShiftError::OutOfDomain(_) => 2051,
            ShiftError::Network(_) => 2052,
            ShiftError::Convergence(_) => 2053,
            ShiftError::NoOperation => 2054,
            ShiftError::MixedTransformFailure => 2048,
            ShiftError::Io(_) => 4096,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_distinct_from_success() {
        let errors = [
            ShiftError::GridUnavailable("x".into()),
            ShiftError::OutOfDomain("y".into()),
            ShiftError::NoOperation,
            ShiftError::MixedTransformFailure,
        ];
        for err in &errors {
            assert_ne!(err.code(), 0);
        }
    }

    #[test]
    fn test_grid_unavailable_names_grid() {
        let err = ShiftError::GridUnavailable("ntv2_0.gsb".into());
        assert!(err.to_string().contains("ntv2_0.gsb"));
    }
}
