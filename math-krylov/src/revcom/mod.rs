//! Reverse-communication kernels for GMRES and QMR
//!
//! A kernel never touches the operator or the preconditioners. Each call to
//! `step` advances its state machine until it needs an operator application,
//! a preconditioner solve or a stopping test, and returns that request as a
//! job. The driver performs the job on the [`Workspace`] slots named by the
//! job's 1-based offsets and calls `step` again. [`RevcomControl`] carries the
//! scalar values exchanged in both directions.
//!
//! Kernels are deterministic in (kernel state, control block, workspace).

mod gmres;
mod qmr;
mod workspace;

pub use gmres::{GmresJob, GmresKernel};
pub use qmr::{QmrJob, QmrKernel};
pub use workspace::Workspace;

use num_traits::Float;

/// Scalars shared between a kernel and its driver
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RevcomControl<R> {
    /// Iteration budget (restart cycles for GMRES)
    pub max_iter: usize,
    /// Iterations completed so far
    pub iter: usize,
    /// Latest residual norm: the preconditioned estimate of the GMRES kernel,
    /// or the last stop-test value recorded by the QMR driver
    pub resid: R,
    /// Stop-test verdict (1 passed, 0 not) on the way in; final status on the
    /// way out (0 converged, > 0 budget exhausted, < 0 breakdown)
    pub info: i32,
    /// GMRES inner tolerance on the preconditioned residual
    pub tol: R,
}

impl<R: Float> RevcomControl<R> {
    pub fn new(max_iter: usize, tol: R) -> Self {
        Self {
            max_iter,
            iter: 0,
            resid: R::zero(),
            info: 0,
            tol,
        }
    }
}
