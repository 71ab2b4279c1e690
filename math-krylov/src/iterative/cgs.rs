//! CGS (Conjugate Gradient Squared) solver
//!
//! CGS applies the BiCG residual polynomial twice, so it needs no adjoint
//! product and often converges about twice as fast as BiCG. The squaring also
//! amplifies rounding errors, making the convergence erratic.

use super::{breakdown, exhausted, prepare, IterateCallback, Prepared, Start};
use crate::blas_helpers::{axpy, inner_product, vector_norm};
use crate::config::KrylovConfig;
use crate::error::Result;
use crate::solution::KrylovSolution;
use crate::traits::{ComplexField, LinearOperator, Preconditioner};
use ndarray::Array1;
use num_traits::ToPrimitive;

/// Solve Ax = b using the preconditioned CGS method
pub fn cgs<T, A, P>(
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
    } = match prepare("CGS", operator, b, x0, precond, config, false)? {
        Start::Done(solution) => return Ok(solution),
        Start::Run(state) => state,
    };

    let r_hat = r.clone();
    let mut d_old = inner_product(&r_hat, &r);
    let mut p = r.clone();
    let mut q = r.clone();
    let mut beta = T::zero();
    let mut resid = r0_norm;

    for iter in 0..max_iter {
        // w = r + beta q, p = w + beta q + beta^2 p
        let mut w = r.clone();
        axpy(beta, &q, &mut w);
        p.mapv_inplace(|pi| pi * beta * beta);
        p += &w;
        axpy(beta, &q, &mut p);

        let z = precond.apply(&p);
        let az = operator.apply(&z);

        let rhat_az = inner_product(&r_hat, &az);
        if rhat_az.is_zero() {
            return Ok(breakdown("CGS", "<r_hat, Az>", x, iter, resid));
        }
        let alpha = d_old / rhat_az;

        // q = w - alpha Az, then w = w + q
        q.assign(&w);
        axpy(-alpha, &az, &mut q);
        w += &q;

        let mut z = precond.apply(&w);
        z.mapv_inplace(|zi| zi * alpha);
        x += &z;
        let az = operator.apply(&z);
        r -= &az;

        resid = vector_norm(&r);
        let rel_residual = resid / r0_norm;

        if let Some(cb) = callback.as_deref_mut() {
            cb(&x);
        }

        if config.print_interval > 0 && (iter + 1) % config.print_interval == 0 {
            log::info!(
                "CGS iteration {}: relative residual = {:.6e}",
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

        let d = inner_product(&r_hat, &r);
        if d.is_zero() {
            return Ok(breakdown("CGS", "<r_hat, r>", x, iter + 1, resid));
        }
        beta = d / d_old;
        d_old = d;
    }

    Ok(exhausted(x, max_iter, resid))
}
