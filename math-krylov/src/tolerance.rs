//! Tolerance resolution and stopping tests
//!
//! Two stopping conventions coexist in this crate:
//! - GMRES and QMR compare the residual norm against one absolute threshold
//!   produced by [`resolve_threshold`] and checked with [`stop_test`].
//! - The direct engines compare `‖r‖ / ‖r0‖` against a relative tolerance that
//!   [`relative_tolerance`] pre-scales once from `atol`.
//!
//! The two are not numerically equivalent and are kept distinct on purpose.

use crate::blas_helpers::vector_norm;
use crate::traits::ComplexField;
use ndarray::{ArrayBase, Data, Ix1};
use num_traits::Float;

/// Absolute tolerance policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Atol<R> {
    /// No absolute tolerance given.
    ///
    /// Direct engines use a pure relative test; GMRES and QMR fall back to
    /// [`Atol::Legacy`] and log a warning.
    Unset,
    /// Emulate the historical behaviour: exit immediately when the initial
    /// residual norm is already below `tol`, otherwise use `tol * ‖b‖`.
    Legacy,
    /// Converge when `‖r‖ <= max(atol, tol * ‖b‖)`.
    Absolute(R),
}

impl<R> Default for Atol<R> {
    fn default() -> Self {
        Atol::Unset
    }
}

/// Outcome of resolving the user tolerances.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Threshold<R> {
    /// The starting guess already satisfies the legacy criterion.
    Exit,
    /// Converge when `‖r‖ <= value`.
    Absolute(R),
}

/// Resolve `tol`/`atol` into a single absolute threshold.
///
/// `initial_residual` is only evaluated in legacy mode.
pub fn resolve_threshold<R, F>(
    tol: R,
    atol: Atol<R>,
    b_norm: R,
    initial_residual: F,
) -> Threshold<R>
where
    R: Float,
    F: FnOnce() -> R,
{
    match atol {
        Atol::Unset | Atol::Legacy => {
            if initial_residual() <= tol {
                Threshold::Exit
            } else if b_norm.is_zero() {
                Threshold::Absolute(tol)
            } else {
                Threshold::Absolute(tol * b_norm)
            }
        }
        Atol::Absolute(atol) => Threshold::Absolute(atol.max(tol * b_norm)),
    }
}

/// Successful termination condition: returns `(‖residual‖, ‖residual‖ <= threshold)`.
pub fn stop_test<T, S>(residual: &ArrayBase<S, Ix1>, threshold: T::Real) -> (T::Real, bool)
where
    T: ComplexField,
    S: Data<Elem = T>,
{
    let resid = vector_norm(residual);
    (resid, resid <= threshold)
}

/// Pre-scale the relative tolerance used by the direct engines.
///
/// Returns `None` when the legacy criterion says the starting guess is already
/// good enough (`r0_norm <= tol`).
pub fn relative_tolerance<R: Float>(tol: R, atol: Atol<R>, r0_norm: R) -> Option<R> {
    match atol {
        Atol::Unset => Some(tol),
        Atol::Legacy => {
            if r0_norm <= tol {
                None
            } else {
                Some(tol)
            }
        }
        Atol::Absolute(atol) => Some((atol / r0_norm).max(tol)),
    }
}
