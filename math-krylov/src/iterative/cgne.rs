//! CGNE (Conjugate Gradient on the Normal Equations, error minimising)
//!
//! Craig's method: CG applied to A A^H y = b with x = A^H y. Works for any
//! nonsingular A, at the price of squaring the condition number.

use super::{exhausted, prepare, IterateCallback, Prepared, Start};
use crate::blas_helpers::{axpby, axpy, inner_product, vector_norm};
use crate::config::KrylovConfig;
use crate::error::Result;
use crate::solution::KrylovSolution;
use crate::traits::{ComplexField, LinearOperator, Preconditioner};
use ndarray::Array1;
use num_traits::ToPrimitive;

/// Solve Ax = b with CGNE
///
/// Requires [`LinearOperator::apply_hermitian`].
pub fn cgne<T, A, P>(
    operator: &A,
    b: &Array1<T>,
    x0: Option<&Array1<T>>,
    precond: &P,
    config: &KrylovConfig<T::Real>,
    mut callback: IterateCallback<'_, T>,
) -> Result<KrylovSolution<T>>
where
    T: ComplexField,
    A: LinearOperator<T> + ?Sized,
    P: Preconditioner<T> + ?Sized,
{
    let Prepared {
        mut x,
        mut r,
        r0_norm,
        tol,
        max_iter,
    } = match prepare("CGNE", operator, b, x0, precond, config, true)? {
        Start::Done(solution) => return Ok(solution),
        Start::Run(state) => state,
    };

    let z = precond.apply(&r);
    let mut p = operator.apply_hermitian(&z);
    let mut ztr_old = inner_product(&z, &r);
    let mut resid = r0_norm;

    for iter in 0..max_iter {
        let w = operator.apply(&p);
        let alpha = ztr_old / inner_product(&p, &p);
        axpy(alpha, &p, &mut x);
        axpy(-alpha, &w, &mut r);

        resid = vector_norm(&r);
        let rel_residual = resid / r0_norm;

        if let Some(cb) = callback.as_deref_mut() {
            cb(&x);
        }

        if config.print_interval > 0 && (iter + 1) % config.print_interval == 0 {
            log::info!(
                "CGNE iteration {}: relative residual = {:.6e}",
                iter + 1,
                rel_residual.to_f64().unwrap_or(0.0)
            );
        }

        if rel_residual < tol {
            return Ok(KrylovSolution::converged(x, iter + 1, resid));
        }
        if iter + 1 == max_iter {
            break;
        }

        let z = precond.apply(&r);
        let ztr = inner_product(&z, &r);
        let beta = ztr / ztr_old;
        // p = A^H z + beta p
        axpby(T::one(), &operator.apply_hermitian(&z), beta, &mut p);
        ztr_old = ztr;
    }

    Ok(exhausted(x, max_iter, resid))
}
