//! BiCGSTAB (Biconjugate Gradient Stabilized) solver
//!
//! BiCGSTAB is an iterative method for solving non-symmetric linear systems.
//! It combines BiCG with a local minimisation step, which smooths the
//! convergence behaviour, and needs no adjoint product.

use super::{breakdown, exhausted, prepare, IterateCallback, Prepared, Start};
use crate::blas_helpers::{axpy, inner_product, vector_norm};
use crate::config::KrylovConfig;
use crate::error::Result;
use crate::solution::KrylovSolution;
use crate::traits::{ComplexField, LinearOperator, Preconditioner};
use ndarray::Array1;
use num_traits::{FromPrimitive, ToPrimitive, Zero};

/// ‖s‖ below this ends the solve successfully after the half step
const HALF_STEP_EXIT: f64 = 1e-14;

/// Solve Ax = b using the preconditioned BiCGSTAB method
pub fn bicgstab<T, A, P>(
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
    } = match prepare("BiCGSTAB", operator, b, x0, precond, config, false)? {
        Start::Done(solution) => return Ok(solution),
        Start::Run(state) => state,
    };

    let half_step_exit = T::Real::from_f64(HALF_STEP_EXIT).unwrap_or_else(T::Real::zero);
    let r_hat = r.clone();
    let mut p = r.clone();
    let mut v = Array1::from_elem(r.len(), T::zero());
    let mut rho0 = T::one();
    let mut alpha = T::one();
    let mut omega = T::one();
    let mut resid = r0_norm;

    for iter in 0..max_iter {
        let rho1 = inner_product(&r_hat, &r);
        if rho1.is_zero() {
            log::warn!(
                "BiCGSTAB iteration {}: inner product of residuals is zero",
                iter + 1
            );
        }

        if iter > 0 {
            // p = r + beta (p - omega v)
            let beta = (rho1 / rho0) * (alpha / omega);
            axpy(-omega, &v, &mut p);
            p.mapv_inplace(|pi| pi * beta);
            p += &r;
        }

        let p_hat = precond.apply(&p);
        v = operator.apply(&p_hat);

        let rhat_v = inner_product(&r_hat, &v);
        if rhat_v.is_zero() {
            return Ok(breakdown("BiCGSTAB", "<r_hat, v>", x, iter, resid));
        }
        alpha = rho1 / rhat_v;

        // s = r - alpha v
        let mut s = r.clone();
        axpy(-alpha, &v, &mut s);

        let s_norm = vector_norm(&s);
        if s_norm < half_step_exit {
            axpy(alpha, &p_hat, &mut x);
            log::debug!(
                "BiCGSTAB: ‖s‖ = {:.3e} after half step",
                s_norm.to_f64().unwrap_or(0.0)
            );
            return Ok(KrylovSolution::converged(x, iter + 1, s_norm));
        }

        let s_hat = precond.apply(&s);
        let t = operator.apply(&s_hat);
        let tt = inner_product(&t, &t);
        if tt.is_zero() {
            return Ok(breakdown("BiCGSTAB", "<t, t>", x, iter, resid));
        }
        omega = inner_product(&t, &s) / tt;

        axpy(alpha, &p_hat, &mut x);
        axpy(omega, &s_hat, &mut x);

        // r = s - omega t
        axpy(-omega, &t, &mut s);
        r = s;

        resid = vector_norm(&r);
        let rel_residual = resid / r0_norm;

        if let Some(cb) = callback.as_deref_mut() {
            cb(&x);
        }

        if config.print_interval > 0 && (iter + 1) % config.print_interval == 0 {
            log::info!(
                "BiCGSTAB iteration {}: relative residual = {:.6e}",
                iter + 1,
                rel_residual.to_f64().unwrap_or(0.0)
            );
        }

        if rel_residual < tol {
            return Ok(KrylovSolution::converged(x, iter + 1, resid));
        }

        rho0 = rho1;
    }

    Ok(exhausted(x, max_iter, resid))
}
