//! Krylov subspace solvers for linear systems
//!
//! This crate solves `A x = b` for square operators over `f32`, `f64`,
//! `Complex32` and `Complex64` with the classical Krylov methods, each with an
//! optional preconditioner, a progress callback and a uniform status report.
//!
//! # Features
//!
//! - **Short-recurrence solvers**: CG, BiCG, BiCGSTAB, CGS, ICGS, CGNE, CGNR
//! - **Reverse-communication solvers**: restarted GMRES and split-preconditioned
//!   QMR, built on the step-wise kernels in [`revcom`]
//! - **Operators**: CSR matrices, dense `Array2`, closures ([`FnOperator`])
//! - **Preconditioners**: Jacobi, closures, identity
//! - **Bound solver**: [`KrylovSolver`] picks the method at runtime and refuses
//!   reentrant calls
//!
//! # Status convention
//!
//! Setup problems (dimension mismatch, missing adjoint, invalid restart) are
//! returned as [`SolverError`]. A solve that runs returns a [`KrylovSolution`]
//! whose [`SolveStatus`] is `0` on convergence, the iteration budget when it
//! ran out, and a negative code on breakdown.
//!
//! # Example
//!
//! ```ignore
//! use math_audio_krylov::{gmres, Atol, CsrMatrix, GmresConfig, IdentityPreconditioner};
//!
//! let matrix = CsrMatrix::from_dense(&dense_matrix, 1e-12);
//! let config = GmresConfig::default()
//!     .with_tolerance(1e-8)
//!     .with_atol(Atol::Absolute(0.0))
//!     .with_restart(30);
//!
//! let solution = gmres(&matrix, &rhs, None, &IdentityPreconditioner, &config, None)?;
//! if !solution.is_converged() {
//!     log::warn!("GMRES stopped with info = {}", solution.info());
//! }
//! ```

pub mod blas_helpers;
pub mod config;
pub mod error;
pub mod iterative;
pub mod operators;
pub mod preconditioners;
pub mod reentrancy;
pub mod revcom;
pub mod solution;
pub mod solver;
pub mod sparse;
pub mod system;
pub mod tolerance;
pub mod traits;

// Re-export main types
pub use config::{GmresConfig, KrylovConfig, DEFAULT_MAX_ITERATIONS, DEFAULT_RESTART};
pub use error::{Result, SolverError};
pub use operators::{FnOperator, FnPreconditioner};
pub use solution::{KrylovSolution, SolveStatus};
pub use solver::{KrylovMethod, KrylovSolver, Preconditioning};
pub use sparse::CsrMatrix;
pub use tolerance::Atol;
pub use traits::{ComplexField, LinearOperator, Preconditioner};

// Re-export iterative solvers
pub use iterative::{
    bicg, bicgstab, cg, cgne, cgnr, cgs, gmres, icgs, qmr, GmresCallback, IterateCallback,
};

// Re-export preconditioners
pub use preconditioners::{DiagonalPreconditioner, IdentityPreconditioner};

// Integer inputs
pub use system::{promote_matrix, promote_vector};
