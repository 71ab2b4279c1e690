//! GMRES (Generalized Minimal Residual) solver
//!
//! Restarted GMRES (Saad & Schultz, 1986) on the left-preconditioned system.
//! The numerics live in [`GmresKernel`]; this driver performs the operator
//! and preconditioner applications the kernel asks for, runs the stopping
//! test on the true residual and adapts the kernel's inner tolerance.
//!
//! GMRES is often the best choice for large non-symmetric systems.
//! It minimizes the residual in a Krylov subspace and has smooth, monotonic
//! convergence behavior.

use crate::blas_helpers::{axpby, vector_norm};
use crate::config::{GmresConfig, DEFAULT_RESTART};
use crate::error::{Result, SolverError};
use crate::revcom::{GmresJob, GmresKernel, RevcomControl};
use crate::solution::{KrylovSolution, SolveStatus};
use crate::system::{make_system, max_iterations};
use crate::tolerance::{resolve_threshold, stop_test, Atol, Threshold};
use crate::traits::{ComplexField, LinearOperator, Preconditioner};
use ndarray::Array1;
use num_traits::{Float, FromPrimitive, One, ToPrimitive, Zero};

/// Progress callback for [`gmres`]
pub enum GmresCallback<'a, T: ComplexField> {
    /// Called with the current iterate after every restart cycle
    Iterate(&'a mut dyn FnMut(&Array1<T>)),
    /// Called with the preconditioned residual norm relative to ‖b‖ after
    /// every inner iteration
    PrNorm(&'a mut dyn FnMut(T::Real)),
    /// As [`PrNorm`](Self::PrNorm), but `max_iterations` counts inner
    /// iterations and running past it ends the solve
    Legacy(&'a mut dyn FnMut(T::Real)),
}

impl<T: ComplexField> GmresCallback<'_, T> {
    fn report_residual(&mut self, value: T::Real) {
        match self {
            GmresCallback::PrNorm(f) | GmresCallback::Legacy(f) => f(value),
            GmresCallback::Iterate(_) => {}
        }
    }

    fn report_iterate(&mut self, x: &Array1<T>) {
        if let GmresCallback::Iterate(f) = self {
            f(x)
        }
    }

    fn is_legacy(&self) -> bool {
        matches!(self, GmresCallback::Legacy(_))
    }
}

/// Solve Ax = b using the restarted GMRES method
///
/// `max_iterations` defaults to 10 N restart cycles and `restart` to 20,
/// clamped to N. Without an absolute tolerance the legacy criterion is used
/// and a warning is logged.
pub fn gmres<T, A, P>(
    operator: &A,
    b: &Array1<T>,
    x0: Option<&Array1<T>>,
    precond: &P,
    config: &GmresConfig<T::Real>,
    mut callback: Option<GmresCallback<'_, T>>,
) -> Result<KrylovSolution<T>>
where
    T: ComplexField,
    A: LinearOperator<T> + ?Sized,
    P: Preconditioner<T> + ?Sized,
{
    let mut x = make_system(operator, b, x0, precond)?;
    let n = b.len();
    let restart = match config.restart {
        Some(0) => return Err(SolverError::InvalidRestart),
        Some(m) => m,
        None => DEFAULT_RESTART,
    };
    let max_iter = max_iterations(config.max_iterations, 10 * n)?;

    let b_norm = vector_norm(b);
    if b_norm.is_zero() {
        log::debug!("GMRES: zero right-hand side, returning zero");
        return Ok(KrylovSolution::converged(b.clone(), 0, T::Real::zero()));
    }

    if config.atol == Atol::Unset {
        log::warn!(
            "GMRES called without an absolute tolerance; using the legacy criterion. \
             Set `atol` explicitly, the default will change"
        );
    }
    let mut r0_norm = T::Real::zero();
    let threshold = match resolve_threshold(config.tolerance, config.atol, b_norm, || {
        r0_norm = vector_norm(&(&operator.apply(&x) - b));
        r0_norm
    }) {
        Threshold::Exit => {
            log::debug!("GMRES: initial residual below legacy tolerance");
            return Ok(KrylovSolution::converged(x, 0, r0_norm));
        }
        Threshold::Absolute(threshold) => threshold,
    };

    // The kernel's inner tolerance applies to the left-preconditioned residual
    let mb_norm = vector_norm(&precond.apply(b));
    let mut ptol_max_factor = T::Real::one();
    let mut ptol = mb_norm * ptol_max_factor.min(threshold / b_norm);

    let mut kernel = GmresKernel::new(n, restart);
    let mut work = kernel.workspace();
    let mut work2 = kernel.hessenberg();
    let mut ctl = RevcomControl::new(max_iter, ptol);

    let legacy = callback.as_ref().is_some_and(GmresCallback::is_legacy);
    let growth = T::Real::from_f64(1.5).unwrap_or_else(T::Real::one);
    let shrink = T::Real::from_f64(0.25).unwrap_or_else(T::Real::one);
    let floor = T::Real::from_f64(1e-16).unwrap_or_else(T::Real::epsilon);

    let mut resid: Option<T::Real> = None;
    let mut passed = false;
    let mut first_pass = true;
    let mut resid_ready = false;
    let mut previous_code = 0;
    let mut inner_iter = 1usize;
    let mut stop_tests = 0usize;
    let mut forced_stop = false;

    loop {
        let cycles = ctl.iter;
        ctl.tol = ptol;
        let job = kernel.step(&mut ctl, b, &mut x, &mut work, &mut work2);

        if ctl.iter != cycles {
            if let Some(cb) = callback.as_mut() {
                cb.report_iterate(&x);
            }
        }

        match job {
            GmresJob::Done => {
                if resid_ready {
                    if let Some(cb) = callback.as_mut() {
                        cb.report_residual(ctl.resid / b_norm);
                    }
                }
                break;
            }
            GmresJob::ResidualUpdate { ndx2, sclr1, sclr2 } => {
                let ax = operator.apply(&x);
                axpby(sclr1, &ax, sclr2, &mut work.slot_mut(ndx2));
            }
            GmresJob::Precondition { ndx1, ndx2 } => {
                let y = precond.apply(&work.slot(ndx2).to_owned());
                work.slot_mut(ndx1).assign(&y);
                if !first_pass && previous_code == 3 {
                    resid_ready = true;
                }
                first_pass = false;
            }
            GmresJob::Matvec {
                ndx1,
                ndx2,
                sclr1,
                sclr2,
            } => {
                let y = operator.apply(&work.slot(ndx1).to_owned());
                axpby(sclr1, &y, sclr2, &mut work.slot_mut(ndx2));
                if resid_ready {
                    if let Some(cb) = callback.as_mut() {
                        cb.report_residual(ctl.resid / b_norm);
                    }
                    resid_ready = false;
                    inner_iter += 1;
                }
            }
            GmresJob::StopTest { ndx1 } => {
                let (r, ok) = stop_test(&work.slot(ndx1), threshold);
                ctl.info = i32::from(ok);
                passed = ok;
                resid = Some(r);
                stop_tests += 1;

                let presid = ctl.resid;
                if ok || presid > ptol {
                    ptol_max_factor = T::Real::one().min(growth * ptol_max_factor);
                } else {
                    // Inner tolerance met but the true residual is not there yet
                    ptol_max_factor = floor.max(shrink * ptol_max_factor);
                }
                ptol = if r.is_zero() {
                    presid * ptol_max_factor
                } else {
                    presid * ptol_max_factor.min(threshold / r)
                };

                if config.print_interval > 0 && stop_tests % config.print_interval == 0 {
                    log::info!(
                        "GMRES restart {}: residual = {:.6e}, preconditioned = {:.6e}",
                        ctl.iter,
                        r.to_f64().unwrap_or(0.0),
                        presid.to_f64().unwrap_or(0.0)
                    );
                }
            }
        }
        previous_code = job.code();

        if legacy && inner_iter > max_iter {
            forced_stop = true;
            break;
        }
    }

    let max_info = i32::try_from(max_iter).unwrap_or(i32::MAX);
    let mut info = if forced_stop { max_info } else { ctl.info };
    if info >= 0 && !passed {
        info = max_info;
    }
    if info < 0 {
        log::debug!("GMRES breakdown: preconditioned residual vanished before the true residual");
    }

    let status = SolveStatus::from_info(info);
    Ok(KrylovSolution::new(x, status, ctl.iter, resid.unwrap_or(ctl.resid)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preconditioners::DiagonalPreconditioner;
    use crate::sparse::CsrMatrix;
    use crate::traits::IdentityPreconditioner;
    use approx::assert_relative_eq;
    use ndarray::array;
    use num_complex::Complex64;

    fn config(tol: f64) -> GmresConfig<f64> {
        GmresConfig::default()
            .with_tolerance(tol)
            .with_atol(Atol::Absolute(0.0))
    }

    fn laplacian(n: usize) -> CsrMatrix<f64> {
        let mut triplets = Vec::new();
        for i in 0..n {
            triplets.push((i, i, 2.0));
            if i > 0 {
                triplets.push((i, i - 1, -1.0));
                triplets.push((i - 1, i, -1.0));
            }
        }
        CsrMatrix::from_triplets(n, n, triplets)
    }

    #[test]
    fn test_gmres_simple() {
        let dense = array![
            [Complex64::new(4.0, 0.0), Complex64::new(1.0, 0.0)],
            [Complex64::new(1.0, 0.0), Complex64::new(3.0, 0.0)],
        ];

        let a = CsrMatrix::from_dense(&dense, 1e-15);
        let b = array![Complex64::new(1.0, 0.0), Complex64::new(2.0, 0.0)];

        let solution = gmres(&a, &b, None, &IdentityPreconditioner, &config(1e-10), None).unwrap();

        assert!(solution.is_converged(), "GMRES should converge");

        let ax = a.matvec(&solution.x);
        let error: f64 = (&ax - &b).iter().map(|e| e.norm_sqr()).sum::<f64>().sqrt();
        assert!(error < 1e-8, "Solution should satisfy Ax = b");
    }

    #[test]
    fn test_gmres_identity() {
        let n = 5;
        let id: CsrMatrix<Complex64> = CsrMatrix::identity(n);
        let b = Array1::from_iter((1..=n).map(|i| Complex64::new(i as f64, 0.0)));

        let solution = gmres(&id, &b, None, &IdentityPreconditioner, &config(1e-12), None).unwrap();

        assert!(solution.is_converged());
        assert_eq!(solution.iterations, 1);

        let error: f64 = (&solution.x - &b)
            .iter()
            .map(|e| e.norm_sqr())
            .sum::<f64>()
            .sqrt();
        assert!(error < 1e-10);
    }

    #[test]
    fn test_gmres_nonsymmetric_preconditioned() {
        let a = CsrMatrix::from_dense(
            &array![[3.0_f64, 2.0, 0.0], [1.0, -1.0, 0.0], [0.0, 5.0, 1.0]],
            1e-15,
        );
        let b = array![2.0_f64, 4.0, -1.0];
        let m = DiagonalPreconditioner::from_csr(&a);

        let solution = gmres(&a, &b, None, &m, &config(1e-10), None).unwrap();

        assert!(solution.is_converged());
        assert_relative_eq!(solution.x[0], 2.0, epsilon = 1e-8);
        assert_relative_eq!(solution.x[1], -2.0, epsilon = 1e-8);
        assert_relative_eq!(solution.x[2], 9.0, epsilon = 1e-8);
    }

    #[test]
    fn test_gmres_restart_cap() {
        let a = laplacian(20);
        let b = Array1::from_elem(20, 1.0_f64);

        let cfg = config(1e-12).with_restart(2).with_max_iterations(3);
        let solution = gmres(&a, &b, None, &IdentityPreconditioner, &cfg, None).unwrap();

        assert_eq!(solution.status, SolveStatus::MaxIterations(3));
        assert_eq!(solution.iterations, 3);
        assert!(solution.residual <= vector_norm(&b));
    }

    #[test]
    fn test_gmres_iterate_callback_per_cycle() {
        let a = laplacian(20);
        let b = Array1::from_elem(20, 1.0_f64);

        let mut cycles = 0;
        let mut on_iterate = |_: &Array1<f64>| cycles += 1;
        let cfg = config(1e-12).with_restart(2).with_max_iterations(4);
        let solution = gmres(
            &a,
            &b,
            None,
            &IdentityPreconditioner,
            &cfg,
            Some(GmresCallback::Iterate(&mut on_iterate)),
        )
        .unwrap();

        assert_eq!(solution.iterations, 4);
        assert_eq!(cycles, 4);
    }

    #[test]
    fn test_gmres_pr_norm_callback_decreases() {
        let a = laplacian(10);
        let b = Array1::from_elem(10, 1.0_f64);

        let mut values = Vec::new();
        let mut on_residual = |v: f64| values.push(v);
        let solution = gmres(
            &a,
            &b,
            None,
            &IdentityPreconditioner,
            &config(1e-10),
            Some(GmresCallback::PrNorm(&mut on_residual)),
        )
        .unwrap();

        assert!(solution.is_converged());
        assert!(!values.is_empty());
        assert!(values.iter().all(|v| *v <= 1.0 + 1e-12));
        assert!(values[values.len() - 1] < values[0]);
    }

    #[test]
    fn test_gmres_legacy_counts_inner_iterations() {
        let a = laplacian(20);
        let b = Array1::from_elem(20, 1.0_f64);

        let mut calls = 0;
        let mut on_residual = |_: f64| calls += 1;
        let cfg = config(1e-14).with_max_iterations(3);
        let solution = gmres(
            &a,
            &b,
            None,
            &IdentityPreconditioner,
            &cfg,
            Some(GmresCallback::Legacy(&mut on_residual)),
        )
        .unwrap();

        assert_eq!(solution.status, SolveStatus::MaxIterations(3));
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_gmres_zero_restart_rejected() {
        let a = laplacian(3);
        let b = Array1::from_elem(3, 1.0_f64);
        let cfg = config(1e-8).with_restart(0);

        assert!(matches!(
            gmres(&a, &b, None, &IdentityPreconditioner, &cfg, None),
            Err(SolverError::InvalidRestart)
        ));
    }

    #[test]
    fn test_gmres_legacy_exit_returns_guess() {
        let a = laplacian(3);
        let x_exact = array![1.0_f64, 2.0, 3.0];
        let b = a.matvec(&x_exact);
        let cfg = GmresConfig::default().with_atol(Atol::Legacy);

        let solution = gmres(&a, &b, Some(&x_exact), &IdentityPreconditioner, &cfg, None).unwrap();

        assert!(solution.is_converged());
        assert_eq!(solution.iterations, 0);
        assert_eq!(solution.x, x_exact);
    }
}
