//! Level-1 vector operations used by the recurrences
//!
//! All helpers accept any one-dimensional ndarray storage, so they work both on
//! owned vectors and on views into a reverse-communication workspace.

use crate::traits::ComplexField;
use ndarray::{ArrayBase, Data, DataMut, Ix1};
use num_traits::{Float, Zero};

/// Compute inner product (x, y) = Σ conj(x_i) * y_i
#[inline]
pub fn inner_product<T, S1, S2>(x: &ArrayBase<S1, Ix1>, y: &ArrayBase<S2, Ix1>) -> T
where
    T: ComplexField,
    S1: Data<Elem = T>,
    S2: Data<Elem = T>,
{
    assert_eq!(
        x.len(),
        y.len(),
        "Vector lengths must match for inner product"
    );
    let mut sum = T::zero();
    for (xi, yi) in x.iter().zip(y.iter()) {
        sum += xi.conj() * *yi;
    }
    sum
}

/// Compute vector 2-norm: ||x||_2 = sqrt(Σ |x_i|^2)
#[inline]
pub fn vector_norm<T, S>(x: &ArrayBase<S, Ix1>) -> T::Real
where
    T: ComplexField,
    S: Data<Elem = T>,
{
    vector_norm_sqr(x).sqrt()
}

/// Compute vector norm squared: ||x||_2^2 = Σ |x_i|^2
#[inline]
pub fn vector_norm_sqr<T, S>(x: &ArrayBase<S, Ix1>) -> T::Real
where
    T: ComplexField,
    S: Data<Elem = T>,
{
    let mut sum = T::Real::zero();
    for xi in x.iter() {
        sum += xi.norm_sqr();
    }
    sum
}

/// Infinity norm: max_i |x_i|
pub fn vector_norm_inf<T, S>(x: &ArrayBase<S, Ix1>) -> T::Real
where
    T: ComplexField,
    S: Data<Elem = T>,
{
    x.iter()
        .map(|xi| xi.norm())
        .fold(T::Real::zero(), |acc, v| acc.max(v))
}

/// Compute axpy: y = α * x + y
#[inline]
pub fn axpy<T, S1, S2>(alpha: T, x: &ArrayBase<S1, Ix1>, y: &mut ArrayBase<S2, Ix1>)
where
    T: ComplexField,
    S1: Data<Elem = T>,
    S2: DataMut<Elem = T>,
{
    for (xi, yi) in x.iter().zip(y.iter_mut()) {
        *yi += alpha * *xi;
    }
}

/// Compute the scaled update in place: y = α * x + β * y
///
/// When β is zero the previous contents of `y` are ignored.
#[inline]
pub fn axpby<T, S1, S2>(alpha: T, x: &ArrayBase<S1, Ix1>, beta: T, y: &mut ArrayBase<S2, Ix1>)
where
    T: ComplexField,
    S1: Data<Elem = T>,
    S2: DataMut<Elem = T>,
{
    if beta.is_zero() {
        for (xi, yi) in x.iter().zip(y.iter_mut()) {
            *yi = alpha * *xi;
        }
    } else {
        for (xi, yi) in x.iter().zip(y.iter_mut()) {
            *yi = alpha * *xi + beta * *yi;
        }
    }
}

/// Compute vector scale in-place: x = α * x
#[inline]
pub fn scale_inplace<T, S>(x: &mut ArrayBase<S, Ix1>, alpha: T)
where
    T: ComplexField,
    S: DataMut<Elem = T>,
{
    for xi in x.iter_mut() {
        *xi *= alpha;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{array, s};
    use num_complex::Complex64;

    #[test]
    fn test_inner_product_real() {
        let x = array![1.0_f64, 2.0, 3.0];
        let y = array![4.0_f64, 5.0, 6.0];

        let ip: f64 = inner_product(&x, &y);
        assert_relative_eq!(ip, 32.0, epsilon = 1e-10);
    }

    #[test]
    fn test_inner_product_complex() {
        let x = array![Complex64::new(1.0, 2.0), Complex64::new(3.0, 4.0)];
        let y = array![Complex64::new(5.0, 6.0), Complex64::new(7.0, 8.0)];

        let ip = inner_product(&x, &y);
        assert_relative_eq!(ip.re, 70.0, epsilon = 1e-10);
        assert_relative_eq!(ip.im, -8.0, epsilon = 1e-10);
    }

    #[test]
    fn test_inner_product_on_views() {
        let work = array![1.0_f64, 2.0, 3.0, 4.0];
        let ip: f64 = inner_product(&work.slice(s![0..2]), &work.slice(s![2..4]));
        assert_relative_eq!(ip, 11.0, epsilon = 1e-12);
    }

    #[test]
    fn test_vector_norms() {
        let x = array![Complex64::new(3.0, 0.0), Complex64::new(0.0, 4.0)];
        assert_relative_eq!(vector_norm(&x), 5.0, epsilon = 1e-10);
        assert_relative_eq!(vector_norm_sqr(&x), 25.0, epsilon = 1e-10);
        assert_relative_eq!(vector_norm_inf(&x), 4.0, epsilon = 1e-10);

        let zero = array![0.0_f64, 0.0, 0.0];
        assert_relative_eq!(vector_norm(&zero), 0.0);
    }

    #[test]
    fn test_axpy() {
        let x = array![1.0_f64, 2.0, 3.0];
        let mut y = array![1.0_f64, 1.0, 1.0];

        axpy(2.0, &x, &mut y);

        assert_eq!(y, array![3.0, 5.0, 7.0]);
    }

    #[test]
    fn test_axpby_ignores_previous_when_beta_zero() {
        let x = array![1.0_f64, 2.0];
        let mut y = array![f64::NAN, f64::NAN];

        axpby(3.0, &x, 0.0, &mut y);
        assert_eq!(y, array![3.0, 6.0]);

        axpby(1.0, &x, 0.5, &mut y);
        assert_eq!(y, array![2.5, 5.0]);
    }

    #[test]
    fn test_scale_inplace() {
        let mut x = array![1.0_f64, 2.0, 3.0];
        scale_inplace(&mut x, 0.5);
        assert_eq!(x, array![0.5, 1.0, 1.5]);
    }
}
