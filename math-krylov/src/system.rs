//! System setup and validation shared by every method
//!
//! Everything here runs before the first operator application, so a failure
//! never leaves a half-finished iterate behind.

use crate::error::{Result, SolverError};
use crate::traits::{ComplexField, LinearOperator, Preconditioner};
use ndarray::{Array1, Array2};
use num_traits::ToPrimitive;

/// Check that the operator is square and matches the right-hand side
pub fn check_system<T, A>(operator: &A, b: &Array1<T>) -> Result<()>
where
    T: ComplexField,
    A: LinearOperator<T> + ?Sized,
{
    let (rows, cols) = (operator.num_rows(), operator.num_cols());
    if rows != cols || rows != b.len() {
        return Err(SolverError::DimensionMismatch {
            rows,
            cols,
            rhs: b.len(),
        });
    }
    Ok(())
}

/// Check a preconditioner against the system dimension
pub fn check_preconditioner<T, P>(precond: &P, n: usize) -> Result<()>
where
    T: ComplexField,
    P: Preconditioner<T> + ?Sized,
{
    match precond.dimension() {
        Some(got) if got != n => Err(SolverError::PreconditionerMismatch { expected: n, got }),
        _ => Ok(()),
    }
}

/// Fail early when a transpose-using method gets an operator without adjoint
pub fn require_adjoint<T, A>(operator: &A, method: &'static str) -> Result<()>
where
    T: ComplexField,
    A: LinearOperator<T> + ?Sized,
{
    if operator.has_adjoint() {
        Ok(())
    } else {
        Err(SolverError::MissingAdjoint { method })
    }
}

/// Copy the starting guess, or start from zero
pub fn initial_guess<T: ComplexField>(x0: Option<&Array1<T>>, n: usize) -> Result<Array1<T>> {
    match x0 {
        Some(x0) if x0.len() != n => Err(SolverError::InitialGuessMismatch {
            expected: n,
            got: x0.len(),
        }),
        Some(x0) => Ok(x0.clone()),
        None => Ok(Array1::from_elem(n, T::zero())),
    }
}

/// Resolve the configured iteration cap
pub fn max_iterations(configured: Option<usize>, default: usize) -> Result<usize> {
    match configured {
        Some(0) => Err(SolverError::InvalidMaxIterations),
        Some(n) => Ok(n),
        None => Ok(default),
    }
}

/// Validate a single-preconditioner system and return the starting iterate
pub(crate) fn make_system<T, A, P>(
    operator: &A,
    b: &Array1<T>,
    x0: Option<&Array1<T>>,
    precond: &P,
) -> Result<Array1<T>>
where
    T: ComplexField,
    A: LinearOperator<T> + ?Sized,
    P: Preconditioner<T> + ?Sized,
{
    check_system(operator, b)?;
    check_preconditioner(precond, b.len())?;
    initial_guess(x0, b.len())
}

/// Promote an integer matrix to `f64`
///
/// Solvers only accept [`ComplexField`] element types; integer inputs have to
/// go through this (and [`promote_vector`]) first.
pub fn promote_matrix<I: ToPrimitive>(a: &Array2<I>) -> Result<Array2<f64>> {
    let ncols = a.ncols();
    let mut out = Array2::zeros(a.raw_dim());
    for ((i, j), v) in a.indexed_iter() {
        out[[i, j]] = v
            .to_f64()
            .ok_or(SolverError::Promotion { index: i * ncols + j })?;
    }
    Ok(out)
}

/// Promote an integer vector to `f64`
pub fn promote_vector<I: ToPrimitive>(b: &Array1<I>) -> Result<Array1<f64>> {
    b.iter()
        .enumerate()
        .map(|(index, v)| v.to_f64().ok_or(SolverError::Promotion { index }))
        .collect()
}
