//! BiCG (BiConjugate Gradient) solver
//!
//! Runs the CG recurrence on A together with a shadow recurrence on A^H, so it
//! applies to non-Hermitian systems at the cost of one adjoint product per
//! iteration. Convergence is irregular; BiCGSTAB or QMR are usually smoother.

use super::{breakdown, exhausted, prepare, IterateCallback, Prepared, Start};
use crate::blas_helpers::{axpby, axpy, inner_product, vector_norm};
use crate::config::KrylovConfig;
use crate::error::Result;
use crate::solution::KrylovSolution;
use crate::traits::{ComplexField, LinearOperator, Preconditioner};
use ndarray::Array1;
use num_traits::ToPrimitive;

/// Solve Ax = b using the preconditioned BiConjugate Gradient method
///
/// Requires [`LinearOperator::apply_hermitian`]; the preconditioner adjoint
/// comes from [`Preconditioner::apply_hermitian`].
pub fn bicg<T, A, P>(
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
    } = match prepare("BiCG", operator, b, x0, precond, config, true)? {
        Start::Done(solution) => return Ok(solution),
        Start::Run(state) => state,
    };

    let mut z = precond.apply(&r);
    let mut r_hat = z.clone();
    let mut z_hat = precond.apply_hermitian(&r_hat);
    let mut d_old = inner_product(&r_hat, &z);
    let mut p = r.clone();
    let mut p_hat = z.clone();
    let mut beta = T::zero();
    let mut resid = r0_norm;

    for iter in 0..max_iter {
        // p = z + beta p, p_hat = z_hat + conj(beta) p_hat
        axpby(T::one(), &z, beta, &mut p);
        axpby(T::one(), &z_hat, beta.conj(), &mut p_hat);

        let ap = operator.apply(&p);
        let phat_ap = inner_product(&p_hat, &ap);
        if phat_ap.is_zero() {
            return Ok(breakdown("BiCG", "<p_hat, Ap>", x, iter, resid));
        }

        let alpha = d_old / phat_ap;
        axpy(alpha, &p, &mut x);
        axpy(-alpha, &ap, &mut r);

        resid = vector_norm(&r);
        let rel_residual = resid / r0_norm;

        if let Some(cb) = callback.as_deref_mut() {
            cb(&x);
        }

        if config.print_interval > 0 && (iter + 1) % config.print_interval == 0 {
            log::info!(
                "BiCG iteration {}: relative residual = {:.6e}",
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

        let ahp = operator.apply_hermitian(&p_hat);
        axpy(-alpha.conj(), &ahp, &mut r_hat);
        z = precond.apply(&r);

        let d = inner_product(&r_hat, &z);
        if d.is_zero() {
            return Ok(breakdown("BiCG", "<r_hat, z>", x, iter + 1, resid));
        }
        beta = d / d_old;
        d_old = d;
        z_hat = precond.apply_hermitian(&r_hat);
    }

    Ok(exhausted(x, max_iter, resid))
}
