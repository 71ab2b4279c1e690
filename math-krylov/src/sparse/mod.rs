//! Sparse matrix structures (CSR format)
//!
//! A minimal CSR operator so the solvers can be exercised on real sparse
//! systems; storage formats are otherwise out of scope for this crate.

mod csr;

pub use csr::CsrMatrix;
