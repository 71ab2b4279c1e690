//! ICGS (Improved Conjugate Gradient Squared) solver
//!
//! CGS run on the preconditioned system M A x = M b: the shadow residual is
//! M r0 and every direction is preconditioned right after the operator
//! application.

use super::{breakdown, exhausted, prepare, IterateCallback, Prepared, Start};
use crate::blas_helpers::{axpy, inner_product, vector_norm};
use crate::config::KrylovConfig;
use crate::error::Result;
use crate::solution::KrylovSolution;
use crate::traits::{ComplexField, LinearOperator, Preconditioner};
use ndarray::Array1;
use num_traits::ToPrimitive;

/// Solve Ax = b using the improved CGS method
pub fn icgs<T, A, P>(
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
    } = match prepare("ICGS", operator, b, x0, precond, config, false)? {
        Start::Done(solution) => return Ok(solution),
        Start::Run(state) => state,
    };

    let r_hat = precond.apply(&r);
    let mut z = r_hat.clone();
    let mut d_old = inner_product(&r_hat, &z);
    let mut p = r.clone();
    let mut q = r.clone();
    let mut beta = T::zero();
    let mut resid = r0_norm;

    for iter in 0..max_iter {
        // w = z + beta q, p = w + beta q + beta^2 p
        let mut w = z.clone();
        axpy(beta, &q, &mut w);
        p.mapv_inplace(|pi| pi * beta * beta);
        p += &w;
        axpy(beta, &q, &mut p);

        let ap = operator.apply(&p);
        z = precond.apply(&ap);

        let d = inner_product(&r_hat, &z);
        if d.is_zero() {
            return Ok(breakdown("ICGS", "<r_hat, MAp>", x, iter, resid));
        }
        let alpha = d_old / d;

        // q = w - alpha z, then w = w + q
        q.assign(&w);
        axpy(-alpha, &z, &mut q);
        w += &q;

        axpy(alpha, &w, &mut x);
        let aw = operator.apply(&w);
        axpy(-alpha, &aw, &mut r);

        resid = vector_norm(&r);
        let rel_residual = resid / r0_norm;

        if let Some(cb) = callback.as_deref_mut() {
            cb(&x);
        }

        if config.print_interval > 0 && (iter + 1) % config.print_interval == 0 {
            log::info!(
                "ICGS iteration {}: relative residual = {:.6e}",
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
        let d = inner_product(&r_hat, &z);
        if d.is_zero() {
            return Ok(breakdown("ICGS", "<r_hat, Mr>", x, iter + 1, resid));
        }
        beta = d / d_old;
        d_old = d;
    }

    Ok(exhausted(x, max_iter, resid))
}
