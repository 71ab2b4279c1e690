//! QMR (Quasi-Minimal Residual) solver
//!
//! Split-preconditioned QMR without look-ahead (Freund & Nachtigal, 1991),
//! driving [`QmrKernel`]. Each iteration needs one product with A and one
//! with Aᴴ, plus the left and right preconditioners and their adjoints.
//!
//! Unlike BiCG the residual norm decreases almost monotonically, which makes
//! QMR a robust choice for non-Hermitian systems when an adjoint is cheap.

use super::IterateCallback;
use crate::blas_helpers::{axpby, vector_norm};
use crate::config::KrylovConfig;
use crate::error::Result;
use crate::revcom::{QmrJob, QmrKernel, RevcomControl};
use crate::solution::{KrylovSolution, SolveStatus};
use crate::system::{
    check_preconditioner, check_system, initial_guess, max_iterations, require_adjoint,
};
use crate::tolerance::{resolve_threshold, stop_test, Atol, Threshold};
use crate::traits::{ComplexField, LinearOperator, Preconditioner};
use ndarray::Array1;
use num_traits::{ToPrimitive, Zero};

/// Solve Ax = b using QMR with left preconditioner `left` and right
/// preconditioner `right`
///
/// The system actually iterated on is `M1 A M2 y = M1 b` with `x = M2 y`.
/// Pass [`IdentityPreconditioner`](crate::IdentityPreconditioner) for a side
/// that is not preconditioned. `max_iterations` defaults to 10 N.
///
/// `callback` sees `x` only when an iteration has updated it. It is not
/// called again when the solve finishes, so a breakdown on the first
/// iteration or a zero right-hand side produce no calls at all.
pub fn qmr<T, A, L, R>(
    operator: &A,
    b: &Array1<T>,
    x0: Option<&Array1<T>>,
    left: &L,
    right: &R,
    config: &KrylovConfig<T::Real>,
    mut callback: IterateCallback<'_, T>,
) -> Result<KrylovSolution<T>>
where
    T: ComplexField,
    A: LinearOperator<T> + ?Sized,
    L: Preconditioner<T> + ?Sized,
    R: Preconditioner<T> + ?Sized,
{
    require_adjoint(operator, "QMR")?;
    check_system(operator, b)?;
    let n = b.len();
    check_preconditioner(left, n)?;
    check_preconditioner(right, n)?;
    let mut x = initial_guess(x0, n)?;
    let max_iter = max_iterations(config.max_iterations, 10 * n)?;

    let b_norm = vector_norm(b);
    if b_norm.is_zero() {
        log::debug!("QMR: zero right-hand side, returning zero");
        return Ok(KrylovSolution::converged(b.clone(), 0, T::Real::zero()));
    }

    if config.atol == Atol::Unset {
        log::warn!(
            "QMR called without an absolute tolerance; using the legacy criterion. \
             Set `atol` explicitly, the default will change"
        );
    }
    let mut r0_norm = T::Real::zero();
    let threshold = match resolve_threshold(config.tolerance, config.atol, b_norm, || {
        r0_norm = vector_norm(&(&operator.apply(&x) - b));
        r0_norm
    }) {
        Threshold::Exit => {
            log::debug!("QMR: initial residual below legacy tolerance");
            return Ok(KrylovSolution::converged(x, 0, r0_norm));
        }
        Threshold::Absolute(threshold) => threshold,
    };

    let mut kernel = QmrKernel::new(n);
    let mut work = kernel.workspace();
    let mut ctl = RevcomControl::new(max_iter, threshold);
    let mut passed = false;

    loop {
        let previous = ctl.iter;
        let job = kernel.step(&mut ctl, b, &mut x, &mut work);

        if ctl.iter > previous {
            if let Some(cb) = callback.as_deref_mut() {
                cb(&x);
            }
        }

        match job {
            QmrJob::Done => break,
            QmrJob::Matvec {
                ndx1,
                ndx2,
                sclr1,
                sclr2,
            } => {
                let y = operator.apply(&work.slot(ndx1).to_owned());
                axpby(sclr1, &y, sclr2, &mut work.slot_mut(ndx2));
            }
            QmrJob::MatvecAdjoint {
                ndx1,
                ndx2,
                sclr1,
                sclr2,
            } => {
                let y = operator.apply_hermitian(&work.slot(ndx1).to_owned());
                axpby(sclr1, &y, sclr2, &mut work.slot_mut(ndx2));
            }
            QmrJob::LeftPrecondition { ndx1, ndx2 } => {
                let y = left.apply(&work.slot(ndx2).to_owned());
                work.slot_mut(ndx1).assign(&y);
            }
            QmrJob::RightPrecondition { ndx1, ndx2 } => {
                let y = right.apply(&work.slot(ndx2).to_owned());
                work.slot_mut(ndx1).assign(&y);
            }
            QmrJob::LeftPrecondAdjoint { ndx1, ndx2 } => {
                let y = left.apply_hermitian(&work.slot(ndx2).to_owned());
                work.slot_mut(ndx1).assign(&y);
            }
            QmrJob::RightPrecondAdjoint { ndx1, ndx2 } => {
                let y = right.apply_hermitian(&work.slot(ndx2).to_owned());
                work.slot_mut(ndx1).assign(&y);
            }
            QmrJob::ResidualUpdate { ndx2, sclr1, sclr2 } => {
                let ax = operator.apply(&x);
                axpby(sclr1, &ax, sclr2, &mut work.slot_mut(ndx2));
            }
            QmrJob::StopTest { ndx1 } => {
                let (resid, ok) = stop_test(&work.slot(ndx1), threshold);
                ctl.resid = resid;
                ctl.info = i32::from(ok);
                passed = ok;

                if config.print_interval > 0
                    && ctl.iter > 0
                    && ctl.iter % config.print_interval == 0
                {
                    log::info!(
                        "QMR iteration {}: relative residual = {:.6e}",
                        ctl.iter,
                        (resid / b_norm).to_f64().unwrap_or(0.0)
                    );
                }
            }
        }
    }

    let mut info = ctl.info;
    if info > 0 && ctl.iter == max_iter && !passed {
        info = i32::try_from(ctl.iter).unwrap_or(i32::MAX);
    }
    if info < 0 {
        log::debug!("QMR breakdown after {} iterations (info = {})", ctl.iter, info);
    }

    Ok(KrylovSolution::new(
        x,
        SolveStatus::from_info(info),
        ctl.iter,
        ctl.resid,
    ))
}
