//! Method selection behind a single solver object
//!
//! [`KrylovSolver`] binds a method to a configuration and dispatches to the
//! free functions in [`crate::iterative`]. Unlike the free functions it refuses
//! to be re-entered: calling `solve` from inside its own callback returns
//! [`SolverError::Reentrant`].

use crate::config::{GmresConfig, KrylovConfig};
use crate::error::{Result, SolverError};
use crate::iterative::{
    bicg, bicgstab, cg, cgne, cgnr, cgs, gmres, icgs, qmr, GmresCallback, IterateCallback,
};
use crate::reentrancy::ReentrancyGuard;
use crate::solution::KrylovSolution;
use crate::traits::{ComplexField, IdentityPreconditioner, LinearOperator, Preconditioner};
use ndarray::Array1;
use num_traits::{Float, FromPrimitive};

/// Krylov method and its method-specific parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KrylovMethod {
    BiCg,
    BiCgstab,
    Cg,
    Cgs,
    Cgne,
    Cgnr,
    Icgs,
    /// Restarted GMRES; `None` uses the default restart length
    Gmres { restart: Option<usize> },
    Qmr,
}

impl KrylovMethod {
    /// Display name, as used in log messages and errors
    pub fn name(&self) -> &'static str {
        match self {
            KrylovMethod::BiCg => "BiCG",
            KrylovMethod::BiCgstab => "BiCGSTAB",
            KrylovMethod::Cg => "CG",
            KrylovMethod::Cgs => "CGS",
            KrylovMethod::Cgne => "CGNE",
            KrylovMethod::Cgnr => "CGNR",
            KrylovMethod::Icgs => "ICGS",
            KrylovMethod::Gmres { .. } => "GMRES",
            KrylovMethod::Qmr => "QMR",
        }
    }

    /// Whether the method applies the adjoint of the operator
    pub fn needs_adjoint(&self) -> bool {
        matches!(
            self,
            KrylovMethod::BiCg | KrylovMethod::Cgne | KrylovMethod::Cgnr | KrylovMethod::Qmr
        )
    }
}

/// Preconditioning handed to [`KrylovSolver::solve`]
pub enum Preconditioning<'a, T: ComplexField> {
    /// No preconditioning
    Identity,
    /// One preconditioner; QMR uses it as the left factor
    Single(&'a dyn Preconditioner<T>),
    /// Left and right factors, accepted by QMR only
    Split {
        left: &'a dyn Preconditioner<T>,
        right: &'a dyn Preconditioner<T>,
    },
}

/// A Krylov method bound to its configuration
#[derive(Debug)]
pub struct KrylovSolver<R> {
    method: KrylovMethod,
    config: KrylovConfig<R>,
    guard: ReentrancyGuard,
}

impl<R: Float + FromPrimitive + 'static> KrylovSolver<R> {
    pub fn new(method: KrylovMethod, config: KrylovConfig<R>) -> Self {
        Self {
            method,
            config,
            guard: ReentrancyGuard::new(),
        }
    }

    pub fn method(&self) -> KrylovMethod {
        self.method
    }

    pub fn config(&self) -> &KrylovConfig<R> {
        &self.config
    }

    /// Whether a call to [`solve`](Self::solve) is in progress
    pub fn is_running(&self) -> bool {
        self.guard.is_busy()
    }

    /// Solve `A x = b` with the bound method
    ///
    /// GMRES reports the iterate after every restart cycle through `callback`;
    /// every other method reports it after every iteration.
    pub fn solve<T>(
        &self,
        operator: &dyn LinearOperator<T>,
        b: &Array1<T>,
        x0: Option<&Array1<T>>,
        preconditioning: Preconditioning<'_, T>,
        callback: IterateCallback<'_, T>,
    ) -> Result<KrylovSolution<T>>
    where
        T: ComplexField<Real = R>,
    {
        let name = self.method.name();
        let _entered = self.guard.enter(name)?;
        log::debug!("{}: solving a system of size {}", name, b.len());

        let identity = IdentityPreconditioner;
        let (precond, right): (&dyn Preconditioner<T>, &dyn Preconditioner<T>) =
            match (self.method, preconditioning) {
                (_, Preconditioning::Identity) => (&identity, &identity),
                (_, Preconditioning::Single(m)) => (m, &identity),
                (KrylovMethod::Qmr, Preconditioning::Split { left, right }) => (left, right),
                (_, Preconditioning::Split { .. }) => {
                    return Err(SolverError::UnsupportedPreconditioning { method: name });
                }
            };

        let config = &self.config;
        match self.method {
            KrylovMethod::BiCg => bicg(operator, b, x0, precond, config, callback),
            KrylovMethod::BiCgstab => bicgstab(operator, b, x0, precond, config, callback),
            KrylovMethod::Cg => cg(operator, b, x0, precond, config, callback),
            KrylovMethod::Cgs => cgs(operator, b, x0, precond, config, callback),
            KrylovMethod::Cgne => cgne(operator, b, x0, precond, config, callback),
            KrylovMethod::Cgnr => cgnr(operator, b, x0, precond, config, callback),
            KrylovMethod::Icgs => icgs(operator, b, x0, precond, config, callback),
            KrylovMethod::Gmres { restart } => {
                let gmres_config = GmresConfig::from_base(config, restart);
                gmres(
                    operator,
                    b,
                    x0,
                    precond,
                    &gmres_config,
                    callback.map(GmresCallback::Iterate),
                )
            }
            KrylovMethod::Qmr => qmr(operator, b, x0, precond, right, config, callback),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preconditioners::DiagonalPreconditioner;
    use crate::sparse::CsrMatrix;
    use crate::tolerance::Atol;
    use ndarray::array;

    fn system() -> (CsrMatrix<f64>, Array1<f64>) {
        let a = CsrMatrix::from_dense(
            &array![[4.0_f64, 1.0, 0.0], [1.0, 3.0, 1.0], [0.0, 1.0, 2.0]],
            1e-15,
        );
        (a, array![1.0_f64, 2.0, 3.0])
    }

    fn config() -> KrylovConfig<f64> {
        KrylovConfig::default()
            .with_tolerance(1e-10)
            .with_atol(Atol::Absolute(0.0))
    }

    #[test]
    fn test_every_method_solves_spd_system() {
        let (a, b) = system();
        let methods = [
            KrylovMethod::BiCg,
            KrylovMethod::BiCgstab,
            KrylovMethod::Cg,
            KrylovMethod::Cgs,
            KrylovMethod::Cgne,
            KrylovMethod::Cgnr,
            KrylovMethod::Icgs,
            KrylovMethod::Gmres { restart: None },
            KrylovMethod::Gmres { restart: Some(2) },
            KrylovMethod::Qmr,
        ];

        for method in methods {
            let solver = KrylovSolver::new(method, config());
            let solution = solver
                .solve(&a, &b, None, Preconditioning::Identity, None)
                .unwrap();
            assert!(solution.is_converged(), "{} did not converge", method.name());
            let r = &b - &a.matvec(&solution.x);
            assert!(
                r.iter().all(|ri| ri.abs() < 1e-6),
                "{} residual too large",
                method.name()
            );
        }
    }

    #[test]
    fn test_split_rejected_outside_qmr() {
        let (a, b) = system();
        let jacobi = DiagonalPreconditioner::from_csr(&a);
        let solver = KrylovSolver::new(KrylovMethod::Cg, config());

        let err = solver
            .solve(
                &a,
                &b,
                None,
                Preconditioning::Split {
                    left: &jacobi,
                    right: &jacobi,
                },
                None,
            )
            .unwrap_err();

        assert!(matches!(
            err,
            SolverError::UnsupportedPreconditioning { method: "CG" }
        ));
        assert!(err.is_config_error());
        assert!(!solver.is_running());
    }

    #[test]
    fn test_qmr_accepts_split() {
        let (a, b) = system();
        let jacobi = DiagonalPreconditioner::from_csr(&a);
        let solver = KrylovSolver::new(KrylovMethod::Qmr, config());

        let solution = solver
            .solve(
                &a,
                &b,
                None,
                Preconditioning::Split {
                    left: &jacobi,
                    right: &IdentityPreconditioner,
                },
                None,
            )
            .unwrap();

        assert!(solution.is_converged());
    }

    #[test]
    fn test_guard_released_after_solve() {
        let (a, b) = system();
        let solver = KrylovSolver::new(KrylovMethod::BiCgstab, config());

        solver
            .solve(&a, &b, None, Preconditioning::Identity, None)
            .unwrap();
        assert!(!solver.is_running());
        solver
            .solve(&a, &b, None, Preconditioning::Identity, None)
            .unwrap();
    }

    #[test]
    fn test_needs_adjoint() {
        assert!(KrylovMethod::Qmr.needs_adjoint());
        assert!(KrylovMethod::Cgnr.needs_adjoint());
        assert!(!KrylovMethod::Gmres { restart: None }.needs_adjoint());
        assert!(!KrylovMethod::Cg.needs_adjoint());
    }

    #[test]
    fn test_single_precision_solver() {
        let a = CsrMatrix::from_dense(
            &array![[4.0_f32, 1.0, 0.0], [1.0, 3.0, 1.0], [0.0, 1.0, 2.0]],
            0.0,
        );
        let b = array![1.0_f32, 2.0, 3.0];
        let config = KrylovConfig::<f32>::default()
            .with_tolerance(1e-5)
            .with_atol(Atol::Absolute(0.0));

        for method in [KrylovMethod::Gmres { restart: None }, KrylovMethod::Cg] {
            let solver = KrylovSolver::new(method, config.clone());
            let solution = solver
                .solve(&a, &b, None, Preconditioning::Identity, None)
                .unwrap();
            assert!(solution.is_converged(), "{} did not converge", method.name());
            let r = &b - &a.matvec(&solution.x);
            assert!(r.iter().all(|ri| ri.abs() < 1e-3));
        }
    }
}
