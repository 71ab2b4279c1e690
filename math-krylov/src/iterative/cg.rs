//! CG (Conjugate Gradient) solver
//!
//! The Conjugate Gradient method for Hermitian positive definite systems.
//! This is the method of choice for such matrices as it has optimal convergence.

use super::{breakdown, exhausted, prepare, IterateCallback, Prepared, Start};
use crate::blas_helpers::{axpby, axpy, inner_product, vector_norm};
use crate::config::KrylovConfig;
use crate::error::Result;
use crate::solution::KrylovSolution;
use crate::traits::{ComplexField, LinearOperator, Preconditioner};
use ndarray::Array1;
use num_traits::ToPrimitive;

/// Solve Ax = b using the preconditioned Conjugate Gradient method
///
/// Note: This method is only correct for Hermitian positive definite matrices.
/// For non-symmetric systems, use GMRES or BiCGSTAB instead, or run CG on the
/// normal equations with [`cgnr`](crate::cgnr).
pub fn cg<T, A, P>(
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
    } = match prepare("CG", operator, b, x0, precond, config, false)? {
        Start::Done(solution) => return Ok(solution),
        Start::Run(state) => state,
    };

    let mut z = precond.apply(&r);
    let mut p = z.clone();
    let mut resid = r0_norm;

    for iter in 0..max_iter {
        let rho0 = inner_product(&r, &z);
        let q = operator.apply(&p);

        let ptq = inner_product(&p, &q);
        if ptq.is_zero() {
            return Ok(breakdown("CG", "<p, Ap>", x, iter, resid));
        }

        let alpha = rho0 / ptq;
        axpy(alpha, &p, &mut x);
        axpy(-alpha, &q, &mut r);

        resid = vector_norm(&r);
        let rel_residual = resid / r0_norm;

        if let Some(cb) = callback.as_deref_mut() {
            cb(&x);
        }

        if config.print_interval > 0 && (iter + 1) % config.print_interval == 0 {
            log::info!(
                "CG iteration {}: relative residual = {:.6e}",
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

        z = precond.apply(&r);
        let rho1 = inner_product(&r, &z);
        let beta = rho1 / rho0;

        // p = z + beta * p
        axpby(T::one(), &z, beta, &mut p);
    }

    Ok(exhausted(x, max_iter, resid))
}
