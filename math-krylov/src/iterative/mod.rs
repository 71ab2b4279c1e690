//! Iterative solvers for linear systems
//!
//! Krylov subspace methods, all with the call shape
//! `method(A, b, x0, M, config, callback) -> Result<KrylovSolution>`:
//! - [`cg`]: Conjugate Gradient, for Hermitian positive definite systems
//! - [`bicg`]: BiConjugate Gradient (needs A^H)
//! - [`bicgstab`]: BiCGSTAB, a smoother alternative to BiCG without A^H
//! - [`cgs`]: CGS, faster but less stable than BiCGSTAB
//! - [`icgs`]: Improved CGS on the preconditioned residual
//! - [`cgne`] / [`cgnr`]: CG on the normal equations (need A^H)
//! - [`gmres`]: GMRES(m) with restart, driven through [`crate::revcom`]
//! - [`qmr`]: QMR with left/right preconditioning, driven through [`crate::revcom`]
//!
//! The engines other than GMRES and QMR stop on `‖r‖ / ‖r0‖ < tol`, with `tol`
//! pre-scaled once from the absolute tolerance. GMRES and QMR use the absolute
//! threshold of [`crate::tolerance::resolve_threshold`].

mod bicg;
mod bicgstab;
mod cg;
mod cgne;
mod cgnr;
mod cgs;
mod gmres;
mod icgs;
mod qmr;

pub use bicg::bicg;
pub use bicgstab::bicgstab;
pub use cg::cg;
pub use cgne::cgne;
pub use cgnr::cgnr;
pub use cgs::cgs;
pub use gmres::{gmres, GmresCallback};
pub use icgs::icgs;
pub use qmr::qmr;

use crate::blas_helpers::vector_norm;
use crate::config::{KrylovConfig, DEFAULT_MAX_ITERATIONS};
use crate::error::Result;
use crate::solution::{KrylovSolution, SolveStatus};
use crate::system::{make_system, max_iterations, require_adjoint};
use crate::tolerance::relative_tolerance;
use crate::traits::{ComplexField, LinearOperator, Preconditioner};
use ndarray::Array1;
use num_traits::Zero;

/// Progress callback of the direct engines, called with the current iterate
pub type IterateCallback<'a, T> = Option<&'a mut dyn FnMut(&Array1<T>)>;

/// State handed to a direct engine once the shared set-up is done
pub(crate) struct Prepared<T: ComplexField> {
    pub x: Array1<T>,
    pub r: Array1<T>,
    pub r0_norm: T::Real,
    pub tol: T::Real,
    pub max_iter: usize,
}

pub(crate) enum Start<T: ComplexField> {
    /// Answer known without iterating
    Done(KrylovSolution<T>),
    Run(Prepared<T>),
}

/// Validate, build the system, compute r0 and pre-scale the tolerance
pub(crate) fn prepare<T, A, P>(
    method: &'static str,
    operator: &A,
    b: &Array1<T>,
    x0: Option<&Array1<T>>,
    precond: &P,
    config: &KrylovConfig<T::Real>,
    needs_adjoint: bool,
) -> Result<Start<T>>
where
    T: ComplexField,
    A: LinearOperator<T> + ?Sized,
    P: Preconditioner<T> + ?Sized,
{
    if needs_adjoint {
        require_adjoint(operator, method)?;
    }
    let x = make_system(operator, b, x0, precond)?;
    let max_iter = max_iterations(config.max_iterations, DEFAULT_MAX_ITERATIONS)?;

    if vector_norm(b).is_zero() {
        log::debug!("{}: zero right-hand side, returning zero", method);
        return Ok(Start::Done(KrylovSolution::converged(
            b.clone(),
            0,
            T::Real::zero(),
        )));
    }

    let r = b - &operator.apply(&x);
    let r0_norm = vector_norm(&r);
    if r0_norm.is_zero() {
        log::debug!("{}: initial guess is exact", method);
        return Ok(Start::Done(KrylovSolution::converged(x, 0, r0_norm)));
    }

    match relative_tolerance(config.tolerance, config.atol, r0_norm) {
        Some(tol) => Ok(Start::Run(Prepared {
            x,
            r,
            r0_norm,
            tol,
            max_iter,
        })),
        None => {
            log::debug!("{}: initial residual below legacy tolerance", method);
            Ok(Start::Done(KrylovSolution::converged(x, 0, r0_norm)))
        }
    }
}

/// Status for a recurrence that hit a zero denominator
pub(crate) fn breakdown<T: ComplexField>(
    method: &str,
    what: &str,
    x: Array1<T>,
    iterations: usize,
    residual: T::Real,
) -> KrylovSolution<T> {
    log::debug!("{} breakdown after {} iterations: {} = 0", method, iterations, what);
    KrylovSolution::new(x, SolveStatus::Breakdown(-1), iterations, residual)
}

/// Status once the iteration budget is spent
pub(crate) fn exhausted<T: ComplexField>(
    x: Array1<T>,
    max_iter: usize,
    residual: T::Real,
) -> KrylovSolution<T> {
    KrylovSolution::new(x, SolveStatus::MaxIterations(max_iter), max_iter, residual)
}
