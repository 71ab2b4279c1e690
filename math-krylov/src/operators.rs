//! Ready-made operator adapters
//!
//! - [`FnOperator`]: matrix-free operator built from closures
//! - [`FnPreconditioner`]: preconditioner built from closures
//! - `LinearOperator` for dense `Array2<T>`

use crate::traits::{ComplexField, LinearOperator, Preconditioner};
use ndarray::{Array1, Array2};

type Product<'a, T> = Box<dyn Fn(&Array1<T>) -> Array1<T> + Send + Sync + 'a>;

/// Matrix-free square operator
///
/// `matvec` computes `A x`. The optional `rmatvec` computes `A^H x`; without
/// it [`has_adjoint`](LinearOperator::has_adjoint) is false and BiCG, CGNE,
/// CGNR and QMR refuse the operator.
pub struct FnOperator<'a, T: ComplexField> {
    n: usize,
    matvec: Product<'a, T>,
    rmatvec: Option<Product<'a, T>>,
}

impl<'a, T: ComplexField> FnOperator<'a, T> {
    /// Operator with only a forward product
    pub fn new<F>(n: usize, matvec: F) -> Self
    where
        F: Fn(&Array1<T>) -> Array1<T> + Send + Sync + 'a,
    {
        Self {
            n,
            matvec: Box::new(matvec),
            rmatvec: None,
        }
    }

    /// Attach the adjoint product `x -> A^H x`
    pub fn with_adjoint<G>(mut self, rmatvec: G) -> Self
    where
        G: Fn(&Array1<T>) -> Array1<T> + Send + Sync + 'a,
    {
        self.rmatvec = Some(Box::new(rmatvec));
        self
    }
}

impl<T: ComplexField> std::fmt::Debug for FnOperator<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnOperator")
            .field("n", &self.n)
            .field("has_adjoint", &self.rmatvec.is_some())
            .finish()
    }
}

impl<T: ComplexField> LinearOperator<T> for FnOperator<'_, T> {
    fn num_rows(&self) -> usize {
        self.n
    }

    fn num_cols(&self) -> usize {
        self.n
    }

    fn apply(&self, x: &Array1<T>) -> Array1<T> {
        (self.matvec)(x)
    }

    /// A^T x = conj(A^H conj(x))
    ///
    /// # Panics
    /// If no adjoint was attached. Solvers check `has_adjoint` before any
    /// iteration, so this only fires on direct calls.
    fn apply_transpose(&self, x: &Array1<T>) -> Array1<T> {
        let x_conj = x.mapv(|v| v.conj());
        self.apply_hermitian(&x_conj).mapv(|v| v.conj())
    }

    fn apply_hermitian(&self, x: &Array1<T>) -> Array1<T> {
        match &self.rmatvec {
            Some(rmatvec) => rmatvec(x),
            None => panic!("FnOperator has no adjoint product"),
        }
    }

    fn has_adjoint(&self) -> bool {
        self.rmatvec.is_some()
    }
}

/// Preconditioner built from closures
///
/// Without an explicit adjoint, `M^H` falls back to `M`.
pub struct FnPreconditioner<'a, T: ComplexField> {
    n: Option<usize>,
    apply: Product<'a, T>,
    apply_hermitian: Option<Product<'a, T>>,
}

impl<'a, T: ComplexField> FnPreconditioner<'a, T> {
    pub fn new<F>(apply: F) -> Self
    where
        F: Fn(&Array1<T>) -> Array1<T> + Send + Sync + 'a,
    {
        Self {
            n: None,
            apply: Box::new(apply),
            apply_hermitian: None,
        }
    }

    /// Declare the dimension so it is checked against the system
    pub fn with_dimension(mut self, n: usize) -> Self {
        self.n = Some(n);
        self
    }

    /// Attach `r -> M^H r`
    pub fn with_adjoint<G>(mut self, apply_hermitian: G) -> Self
    where
        G: Fn(&Array1<T>) -> Array1<T> + Send + Sync + 'a,
    {
        self.apply_hermitian = Some(Box::new(apply_hermitian));
        self
    }
}

impl<T: ComplexField> Preconditioner<T> for FnPreconditioner<'_, T> {
    fn apply(&self, r: &Array1<T>) -> Array1<T> {
        (self.apply)(r)
    }

    fn apply_hermitian(&self, r: &Array1<T>) -> Array1<T> {
        match &self.apply_hermitian {
            Some(f) => f(r),
            None => (self.apply)(r),
        }
    }

    fn dimension(&self) -> Option<usize> {
        self.n
    }
}

impl<T: ComplexField> LinearOperator<T> for Array2<T> {
    fn num_rows(&self) -> usize {
        self.nrows()
    }

    fn num_cols(&self) -> usize {
        self.ncols()
    }

    fn apply(&self, x: &Array1<T>) -> Array1<T> {
        assert_eq!(x.len(), self.ncols(), "Input vector size mismatch");
        self.rows()
            .into_iter()
            .map(|row| {
                row.iter()
                    .zip(x.iter())
                    .fold(T::zero(), |acc, (&a, &xi)| acc + a * xi)
            })
            .collect()
    }

    fn apply_transpose(&self, x: &Array1<T>) -> Array1<T> {
        assert_eq!(x.len(), self.nrows(), "Input vector size mismatch");
        let mut y = Array1::from_elem(self.ncols(), T::zero());
        for (row, &xi) in self.rows().into_iter().zip(x.iter()) {
            for (yj, &a) in y.iter_mut().zip(row.iter()) {
                *yj += a * xi;
            }
        }
        y
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;
    use num_complex::Complex64;

    #[test]
    fn test_dense_operator() {
        let a = array![[1.0_f64, 2.0], [3.0, 4.0]];
        let x = array![1.0_f64, 1.0];

        assert_eq!(a.apply(&x), array![3.0, 7.0]);
        assert_eq!(a.apply_transpose(&x), array![4.0, 6.0]);
        assert!(LinearOperator::<f64>::has_adjoint(&a));
    }

    #[test]
    fn test_dense_complex_hermitian() {
        let a = array![
            [Complex64::new(1.0, 1.0), Complex64::new(0.0, 0.0)],
            [Complex64::new(0.0, 2.0), Complex64::new(1.0, 0.0)],
        ];
        let x = array![Complex64::new(1.0, 0.0), Complex64::new(1.0, 0.0)];

        let y = a.apply_hermitian(&x);
        assert_relative_eq!(y[0].re, 1.0, epsilon = 1e-12);
        assert_relative_eq!(y[0].im, -3.0, epsilon = 1e-12);
        assert_relative_eq!(y[1].re, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_fn_operator_without_adjoint() {
        let op = FnOperator::new(2, |x: &Array1<f64>| x.mapv(|v| 2.0 * v));
        assert_eq!(op.apply(&array![1.0, 2.0]), array![2.0, 4.0]);
        assert!(!op.has_adjoint());
        assert!(op.is_square());
    }

    #[test]
    fn test_fn_operator_transpose_from_adjoint() {
        let a = array![[1.0_f64, 2.0], [3.0, 4.0]];
        let at = a.t().to_owned();
        let op = FnOperator::new(2, move |x: &Array1<f64>| a.apply(x))
            .with_adjoint(move |x: &Array1<f64>| at.apply(x));

        assert!(op.has_adjoint());
        assert_eq!(op.apply_transpose(&array![1.0, 1.0]), array![4.0, 6.0]);
    }

    #[test]
    fn test_fn_preconditioner() {
        let m = FnPreconditioner::new(|r: &Array1<f64>| r.mapv(|v| 0.5 * v)).with_dimension(2);
        assert_eq!(m.apply(&array![2.0, 4.0]), array![1.0, 2.0]);
        assert_eq!(m.apply_hermitian(&array![2.0, 4.0]), array![1.0, 2.0]);
        assert_eq!(m.dimension(), Some(2));
    }
}
