//! Solver results

use crate::traits::ComplexField;
use ndarray::Array1;

/// How a solve ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    /// Tolerance reached
    Converged,
    /// Iteration cap reached without meeting the tolerance
    MaxIterations(usize),
    /// Numerical breakdown or illegal input detected by a recurrence (negative code)
    Breakdown(i32),
}

impl SolveStatus {
    /// Integer convention: 0 success, positive iteration count, negative breakdown
    pub fn code(&self) -> i64 {
        match *self {
            SolveStatus::Converged => 0,
            SolveStatus::MaxIterations(n) => n as i64,
            SolveStatus::Breakdown(code) => i64::from(code),
        }
    }

    /// Map a kernel `info` value onto a status
    pub fn from_info(info: i32) -> Self {
        match info {
            0 => SolveStatus::Converged,
            n if n > 0 => SolveStatus::MaxIterations(n as usize),
            code => SolveStatus::Breakdown(code),
        }
    }
}

/// Krylov solver result
#[derive(Debug, Clone)]
pub struct KrylovSolution<T: ComplexField> {
    /// Solution vector (best iterate when not converged)
    pub x: Array1<T>,
    /// How the solve ended
    pub status: SolveStatus,
    /// Completed iterations (restart cycles for GMRES)
    pub iterations: usize,
    /// Last residual norm known to the solver
    pub residual: T::Real,
}

impl<T: ComplexField> KrylovSolution<T> {
    pub(crate) fn new(
        x: Array1<T>,
        status: SolveStatus,
        iterations: usize,
        residual: T::Real,
    ) -> Self {
        Self {
            x,
            status,
            iterations,
            residual,
        }
    }

    pub(crate) fn converged(x: Array1<T>, iterations: usize, residual: T::Real) -> Self {
        Self::new(x, SolveStatus::Converged, iterations, residual)
    }

    /// Whether the tolerance was reached
    pub fn is_converged(&self) -> bool {
        self.status == SolveStatus::Converged
    }

    /// Status as an integer code
    pub fn info(&self) -> i64 {
        self.status.code()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(SolveStatus::Converged.code(), 0);
        assert_eq!(SolveStatus::MaxIterations(12).code(), 12);
        assert_eq!(SolveStatus::Breakdown(-1).code(), -1);
    }

    #[test]
    fn test_from_info() {
        assert_eq!(SolveStatus::from_info(0), SolveStatus::Converged);
        assert_eq!(SolveStatus::from_info(7), SolveStatus::MaxIterations(7));
        assert_eq!(SolveStatus::from_info(-10), SolveStatus::Breakdown(-10));
    }
}
