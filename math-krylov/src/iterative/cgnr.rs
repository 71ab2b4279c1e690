//! CGNR (Conjugate Gradient on the Normal equations, Residual minimising)
//!
//! CG applied to A^H A x = A^H b. Each iteration minimises ‖b - A x‖ over the
//! Krylov space of A^H A, so convergence is monotone but governed by the
//! squared condition number.

use super::{exhausted, prepare, IterateCallback, Prepared, Start};
use crate::blas_helpers::{axpby, axpy, inner_product, vector_norm};
use crate::config::KrylovConfig;
use crate::error::Result;
use crate::solution::KrylovSolution;
use crate::traits::{ComplexField, LinearOperator, Preconditioner};
use ndarray::Array1;
use num_traits::ToPrimitive;

/// Solve Ax = b with CGNR
///
/// Requires [`LinearOperator::apply_hermitian`]. The preconditioner acts on
/// the normal-equation residual A^H r.
pub fn cgnr<T, A, P>(
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
    } = match prepare("CGNR", operator, b, x0, precond, config, true)? {
        Start::Done(solution) => return Ok(solution),
        Start::Run(state) => state,
    };

    let r_hat = operator.apply_hermitian(&r);
    let z = precond.apply(&r_hat);
    let mut p = z.clone();
    let mut ztrhat_old = inner_product(&z, &r_hat);
    let mut resid = r0_norm;

    for iter in 0..max_iter {
        let w = operator.apply(&p);
        let alpha = ztrhat_old / inner_product(&w, &w);
        axpy(alpha, &p, &mut x);
        axpy(-alpha, &w, &mut r);

        resid = vector_norm(&r);
        let rel_residual = resid / r0_norm;

        if let Some(cb) = callback.as_deref_mut() {
            cb(&x);
        }

        if config.print_interval > 0 && (iter + 1) % config.print_interval == 0 {
            log::info!(
                "CGNR iteration {}: relative residual = {:.6e}",
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

        let r_hat = operator.apply_hermitian(&r);
        let z = precond.apply(&r_hat);
        let ztrhat = inner_product(&z, &r_hat);
        let beta = ztrhat / ztrhat_old;
        axpby(T::one(), &z, beta, &mut p);
        ztrhat_old = ztrhat;
    }

    Ok(exhausted(x, max_iter, resid))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solution::SolveStatus;
    use crate::sparse::CsrMatrix;
    use crate::traits::IdentityPreconditioner;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_cgnr_nonsymmetric() {
        let a = CsrMatrix::from_dense(
            &array![[3.0_f64, 2.0, 0.0], [1.0, -1.0, 0.0], [0.0, 5.0, 1.0]],
            1e-15,
        );
        let b = array![2.0_f64, 4.0, -1.0];

        let solution = cgnr(
            &a,
            &b,
            None,
            &IdentityPreconditioner,
            &KrylovConfig::default().with_tolerance(1e-10),
            None,
        )
        .unwrap();

        assert!(solution.is_converged());
        assert_relative_eq!(solution.x[0], 2.0, epsilon = 1e-6);
        assert_relative_eq!(solution.x[1], -2.0, epsilon = 1e-6);
        assert_relative_eq!(solution.x[2], 9.0, epsilon = 1e-6);
    }

    #[test]
    fn test_cgnr_residual_never_grows() {
        let n = 15;
        let mut triplets = Vec::new();
        for i in 0..n {
            triplets.push((i, i, 3.0_f64));
            if i + 1 < n {
                triplets.push((i, i + 1, -1.0));
                triplets.push((i + 1, i, -2.0));
            }
        }
        let a = CsrMatrix::from_triplets(n, n, triplets);
        let b = Array1::from_elem(n, 1.0_f64);

        let mut norms = Vec::new();
        let mut record = |x: &Array1<f64>| norms.push(vector_norm(&(&b - &a.matvec(x))));
        let solution = cgnr(
            &a,
            &b,
            None,
            &IdentityPreconditioner,
            &KrylovConfig::default()
                .with_tolerance(1e-14)
                .with_max_iterations(4),
            Some(&mut record),
        )
        .unwrap();

        assert_eq!(solution.status, SolveStatus::MaxIterations(4));
        assert_eq!(norms.len(), 4);
        for pair in norms.windows(2) {
            assert!(pair[1] <= pair[0] * (1.0 + 1e-12));
        }
    }
}
