//! Error types for the Krylov solvers.
//!
//! Only problems detected before the first iteration are errors. Numerical
//! breakdown and exhausting the iteration budget are reported through
//! [`SolveStatus`](crate::SolveStatus) on a successful return.

use thiserror::Error;

/// Errors that can occur when setting up or entering a solve.
#[derive(Debug, Error)]
pub enum SolverError {
    /// Operator is not square or does not match the right-hand side.
    #[error("operator is {rows}x{cols} but the right-hand side has length {rhs}")]
    DimensionMismatch {
        /// Rows of the operator
        rows: usize,
        /// Columns of the operator
        cols: usize,
        /// Length of the right-hand side
        rhs: usize,
    },

    /// Starting guess has the wrong length.
    #[error("x0 dimension mismatch: expected {expected}, got {got}")]
    InitialGuessMismatch {
        /// Expected length
        expected: usize,
        /// Actual length provided
        got: usize,
    },

    /// Preconditioner dimension differs from the system dimension.
    #[error("preconditioner dimension mismatch: expected {expected}, got {got}")]
    PreconditionerMismatch {
        /// Expected dimension
        expected: usize,
        /// Actual dimension of the preconditioner
        got: usize,
    },

    /// The method needs A^H products but the operator cannot provide them.
    #[error("{method} requires the adjoint of the operator, which is not available")]
    MissingAdjoint {
        /// Name of the method
        method: &'static str,
    },

    /// Left/right preconditioners were given to a method that takes one.
    #[error("{method} accepts a single preconditioner, not a left/right pair")]
    UnsupportedPreconditioning {
        /// Name of the method
        method: &'static str,
    },

    /// GMRES restart length of zero.
    #[error("restart length must be at least 1")]
    InvalidRestart,

    /// Iteration cap of zero.
    #[error("maximum number of iterations must be at least 1")]
    InvalidMaxIterations,

    /// An integer entry could not be represented as a float.
    #[error("entry {index} cannot be converted to a floating point value")]
    Promotion {
        /// Flat index of the offending entry
        index: usize,
    },

    /// The bound solver was entered while a previous call was still running.
    #[error("{method} is already running on this solver instance")]
    Reentrant {
        /// Name of the method
        method: &'static str,
    },
}

/// A specialized `Result` type for solver setup.
pub type Result<T> = std::result::Result<T, SolverError>;

impl SolverError {
    /// Returns `true` if this is a dimension-related error.
    pub fn is_dimension_error(&self) -> bool {
        matches!(
            self,
            SolverError::DimensionMismatch { .. }
                | SolverError::InitialGuessMismatch { .. }
                | SolverError::PreconditionerMismatch { .. }
        )
    }

    /// Returns `true` if this is a configuration-related error.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SolverError::InvalidRestart
                | SolverError::InvalidMaxIterations
                | SolverError::UnsupportedPreconditioning { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SolverError::DimensionMismatch {
            rows: 3,
            cols: 3,
            rhs: 4,
        };
        assert_eq!(
            err.to_string(),
            "operator is 3x3 but the right-hand side has length 4"
        );

        let err = SolverError::Reentrant { method: "cg" };
        assert_eq!(err.to_string(), "cg is already running on this solver instance");
    }

    #[test]
    fn test_error_categories() {
        let dim_err = SolverError::InitialGuessMismatch {
            expected: 10,
            got: 5,
        };
        let config_err = SolverError::InvalidRestart;

        assert!(dim_err.is_dimension_error());
        assert!(!dim_err.is_config_error());
        assert!(config_err.is_config_error());
        assert!(!config_err.is_dimension_error());
        assert!(!SolverError::MissingAdjoint { method: "qmr" }.is_dimension_error());
    }
}
