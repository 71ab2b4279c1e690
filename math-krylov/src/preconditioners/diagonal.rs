//! Diagonal (Jacobi) preconditioner
//!
//! Scales by the inverse diagonal of A. Only element-wise work, so the
//! `rayon` feature parallelises it for long vectors.

use crate::sparse::CsrMatrix;
use crate::traits::{ComplexField, Preconditioner};
use ndarray::Array1;
use num_traits::{Float, FromPrimitive};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Diagonal (Jacobi) preconditioner
///
/// M = diag(A)^(-1). Zero diagonal entries are replaced by one.
#[derive(Debug, Clone)]
pub struct DiagonalPreconditioner<T: ComplexField> {
    /// Inverse diagonal elements
    inv_diag: Array1<T>,
}

impl<T: ComplexField> DiagonalPreconditioner<T> {
    /// Create a diagonal preconditioner from a CSR matrix
    pub fn from_csr(matrix: &CsrMatrix<T>) -> Self {
        Self::from_diagonal(&matrix.diagonal())
    }

    /// Create from a diagonal vector directly
    pub fn from_diagonal(diag: &Array1<T>) -> Self {
        let cutoff = T::Real::from_f64(1e-30).unwrap_or_else(T::Real::min_positive_value);
        Self::from_inverse_diagonal(
            diag.mapv(|d| if d.norm() > cutoff { d.inv() } else { T::one() }),
        )
    }

    /// Create from inverse diagonal vector directly
    pub fn from_inverse_diagonal(inv_diag: Array1<T>) -> Self {
        Self { inv_diag }
    }

    fn scale(&self, r: &Array1<T>, conjugate: bool) -> Array1<T> {
        #[cfg(feature = "rayon")]
        {
            if r.len() >= 1000 {
                if let (Some(rs), Some(ds)) = (r.as_slice(), self.inv_diag.as_slice()) {
                    let results: Vec<T> = rs
                        .par_iter()
                        .zip(ds.par_iter())
                        .map(|(&ri, &di)| ri * if conjugate { di.conj() } else { di })
                        .collect();
                    return Array1::from_vec(results);
                }
            }
        }

        r.iter()
            .zip(self.inv_diag.iter())
            .map(|(&ri, &di)| ri * if conjugate { di.conj() } else { di })
            .collect()
    }
}

impl<T: ComplexField> Preconditioner<T> for DiagonalPreconditioner<T> {
    fn apply(&self, r: &Array1<T>) -> Array1<T> {
        self.scale(r, false)
    }

    fn apply_hermitian(&self, r: &Array1<T>) -> Array1<T> {
        self.scale(r, true)
    }

    fn dimension(&self) -> Option<usize> {
        Some(self.inv_diag.len())
    }
}
