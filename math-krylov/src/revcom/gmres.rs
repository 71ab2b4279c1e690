//! Restarted GMRES kernel
//!
//! Saad & Schultz (1986) with modified Gram-Schmidt and Givens rotations,
//! applied to the left-preconditioned system M A x = M b.
//!
//! Workspace layout (`6 + restart` slots of length N):
//!
//! | slot | content |
//! |---|---|
//! | 0 | residual `b - A x` |
//! | 1 | preconditioned residual |
//! | 2 | new Arnoldi vector before normalisation |
//! | 3 | least-squares solution `y` (first `k` entries) |
//! | 4 | `A v_j` |
//! | 5.. | Krylov basis `v_0 ..= v_restart` |
//!
//! The Hessenberg block has shape `(restart + 1, 2 restart + 2)`: columns
//! `0..restart` hold H, then one column each for the rotation cosines, the
//! rotation sines and the rotated right-hand side.

use super::{RevcomControl, Workspace};
use crate::blas_helpers::{axpy, inner_product, scale_inplace, vector_norm};
use crate::traits::ComplexField;
use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2};
use num_traits::{Float, FromPrimitive, One, Zero};
use std::marker::PhantomData;

const RESIDUAL: usize = 0;
const PRECOND_RESIDUAL: usize = 1;
const ARNOLDI: usize = 2;
const LSQ: usize = 3;
const MATVEC: usize = 4;
const BASIS: usize = 5;

/// Request issued by [`GmresKernel::step`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GmresJob<T> {
    /// `work[ndx2] = sclr2 * work[ndx2] + sclr1 * A x` (code 1)
    ResidualUpdate { ndx2: usize, sclr1: T, sclr2: T },
    /// `work[ndx1] = M work[ndx2]` (code 2)
    Precondition { ndx1: usize, ndx2: usize },
    /// `work[ndx2] = sclr2 * work[ndx2] + sclr1 * A work[ndx1]` (code 3)
    Matvec {
        ndx1: usize,
        ndx2: usize,
        sclr1: T,
        sclr2: T,
    },
    /// Run the stopping test on `work[ndx1]` and report it in `info` (code 4)
    StopTest { ndx1: usize },
    /// Terminal (code -1)
    Done,
}

impl<T> GmresJob<T> {
    /// Integer job code
    pub fn code(&self) -> i32 {
        match self {
            GmresJob::ResidualUpdate { .. } => 1,
            GmresJob::Precondition { .. } => 2,
            GmresJob::Matvec { .. } => 3,
            GmresJob::StopTest { .. } => 4,
            GmresJob::Done => -1,
        }
    }

    pub fn ndx1(&self) -> Option<usize> {
        match *self {
            GmresJob::Precondition { ndx1, .. }
            | GmresJob::Matvec { ndx1, .. }
            | GmresJob::StopTest { ndx1 } => Some(ndx1),
            _ => None,
        }
    }

    pub fn ndx2(&self) -> Option<usize> {
        match *self {
            GmresJob::ResidualUpdate { ndx2, .. }
            | GmresJob::Precondition { ndx2, .. }
            | GmresJob::Matvec { ndx2, .. } => Some(ndx2),
            _ => None,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, GmresJob::Done)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resume {
    Start,
    InitialResidual,
    CycleStart,
    Matvec(usize),
    Inner(usize),
    CycleResidual,
    StopTest,
    ZeroResidual,
    Finished,
}

/// GMRES(restart) state machine
#[derive(Debug, Clone)]
pub struct GmresKernel<T: ComplexField> {
    n: usize,
    restart: usize,
    resume: Resume,
    _marker: PhantomData<T>,
}

impl<T: ComplexField> GmresKernel<T> {
    /// Kernel for systems of size `n`; `restart` is clamped to `1..=n`
    pub fn new(n: usize, restart: usize) -> Self {
        Self {
            n,
            restart: restart.min(n).max(1),
            resume: Resume::Start,
            _marker: PhantomData,
        }
    }

    pub fn restart(&self) -> usize {
        self.restart
    }

    /// Workspace sized for this kernel
    pub fn workspace(&self) -> Workspace<T> {
        Workspace::new(self.n, 6 + self.restart)
    }

    /// Hessenberg block sized for this kernel
    pub fn hessenberg(&self) -> Array2<T> {
        Array2::from_elem((self.restart + 1, 2 * self.restart + 2), T::zero())
    }

    pub fn is_finished(&self) -> bool {
        self.resume == Resume::Finished
    }

    fn ndx(&self, slot: usize) -> usize {
        slot * self.n + 1
    }

    /// Advance to the next job
    ///
    /// `ctl.tol` is the inner tolerance on the preconditioned residual; the
    /// driver may change it between calls. After a `StopTest` job the driver
    /// sets `ctl.info` to 1 when the test passed and 0 otherwise.
    pub fn step(
        &mut self,
        ctl: &mut RevcomControl<T::Real>,
        b: &Array1<T>,
        x: &mut Array1<T>,
        work: &mut Workspace<T>,
        work2: &mut Array2<T>,
    ) -> GmresJob<T> {
        match self.resume {
            Resume::Start => {
                work.slot_mut(self.ndx(RESIDUAL)).assign(b);
                self.resume = Resume::InitialResidual;
                self.residual_update()
            }
            Resume::InitialResidual => self.begin_cycle(),
            Resume::CycleStart => {
                let rnorm = vector_norm(&work.slot(self.ndx(PRECOND_RESIDUAL)));
                ctl.resid = rnorm;
                if rnorm.is_zero() {
                    self.resume = Resume::ZeroResidual;
                    return GmresJob::StopTest {
                        ndx1: self.ndx(RESIDUAL),
                    };
                }

                let v0 = self.ndx(BASIS);
                work.copy(self.ndx(PRECOND_RESIDUAL), v0);
                scale_inplace(&mut work.slot_mut(v0), T::from_real(rnorm.recip()));

                work2.fill(T::zero());
                work2[[0, self.restart + 2]] = T::from_real(rnorm);

                self.resume = Resume::Matvec(0);
                self.matvec(0)
            }
            Resume::Matvec(i) => {
                self.resume = Resume::Inner(i);
                GmresJob::Precondition {
                    ndx1: self.ndx(ARNOLDI),
                    ndx2: self.ndx(MATVEC),
                }
            }
            Resume::Inner(i) => {
                let h_next = self.arnoldi(i, work, work2);
                let presid = self.rotate(i, work2);
                ctl.resid = presid;

                if presid <= ctl.tol || h_next.is_zero() || i + 1 == self.restart {
                    self.update_solution(i + 1, x, work, work2);
                    ctl.iter += 1;
                    work.slot_mut(self.ndx(RESIDUAL)).assign(b);
                    self.resume = Resume::CycleResidual;
                    self.residual_update()
                } else {
                    self.resume = Resume::Matvec(i + 1);
                    self.matvec(i + 1)
                }
            }
            Resume::CycleResidual => {
                self.resume = Resume::StopTest;
                GmresJob::StopTest {
                    ndx1: self.ndx(RESIDUAL),
                }
            }
            Resume::StopTest => {
                if ctl.info == 1 {
                    ctl.info = 0;
                    self.finish()
                } else if ctl.iter >= ctl.max_iter {
                    ctl.info = i32::try_from(ctl.iter).unwrap_or(i32::MAX);
                    self.finish()
                } else {
                    ctl.info = 0;
                    self.begin_cycle()
                }
            }
            Resume::ZeroResidual => {
                // M r vanished: either r is zero or M is singular
                ctl.info = if ctl.info == 1 { 0 } else { -1 };
                self.finish()
            }
            Resume::Finished => GmresJob::Done,
        }
    }

    fn residual_update(&self) -> GmresJob<T> {
        GmresJob::ResidualUpdate {
            ndx2: self.ndx(RESIDUAL),
            sclr1: -T::one(),
            sclr2: T::one(),
        }
    }

    fn matvec(&self, i: usize) -> GmresJob<T> {
        GmresJob::Matvec {
            ndx1: self.ndx(BASIS + i),
            ndx2: self.ndx(MATVEC),
            sclr1: T::one(),
            sclr2: T::zero(),
        }
    }

    fn begin_cycle(&mut self) -> GmresJob<T> {
        self.resume = Resume::CycleStart;
        GmresJob::Precondition {
            ndx1: self.ndx(PRECOND_RESIDUAL),
            ndx2: self.ndx(RESIDUAL),
        }
    }

    fn finish(&mut self) -> GmresJob<T> {
        self.resume = Resume::Finished;
        GmresJob::Done
    }

    /// Orthogonalise the new vector against the basis (MGS); returns h[i+1, i]
    fn arnoldi(&self, i: usize, work: &mut Workspace<T>, work2: &mut Array2<T>) -> T::Real {
        let w = self.ndx(ARNOLDI);
        for k in 0..=i {
            let (vk, mut wv) = work.pair_mut(self.ndx(BASIS + k), w);
            let h_ki = inner_product(&vk, &wv);
            axpy(-h_ki, &vk, &mut wv);
            work2[[k, i]] = h_ki;
        }

        let h_next = vector_norm(&work.slot(w));
        work2[[i + 1, i]] = T::from_real(h_next);
        if !h_next.is_zero() {
            let v_next = self.ndx(BASIS + i + 1);
            work.copy(w, v_next);
            scale_inplace(&mut work.slot_mut(v_next), T::from_real(h_next.recip()));
        }
        h_next
    }

    /// Apply previous rotations to column i, annihilate h[i+1, i] and return |g[i+1]|
    fn rotate(&self, i: usize, work2: &mut Array2<T>) -> T::Real {
        let m = self.restart;
        let (cs, sn, g) = (m, m + 1, m + 2);

        for k in 0..i {
            let (c, s) = (work2[[k, cs]], work2[[k, sn]]);
            let temp = c.conj() * work2[[k, i]] + s.conj() * work2[[k + 1, i]];
            work2[[k + 1, i]] = -s * work2[[k, i]] + c * work2[[k + 1, i]];
            work2[[k, i]] = temp;
        }

        let (c, s) = givens_rotation(work2[[i, i]], work2[[i + 1, i]]);
        work2[[i, cs]] = c;
        work2[[i, sn]] = s;

        work2[[i, i]] = c.conj() * work2[[i, i]] + s.conj() * work2[[i + 1, i]];
        work2[[i + 1, i]] = T::zero();

        let temp = c.conj() * work2[[i, g]] + s.conj() * work2[[i + 1, g]];
        work2[[i + 1, g]] = -s * work2[[i, g]] + c * work2[[i + 1, g]];
        work2[[i, g]] = temp;

        work2[[i + 1, g]].norm()
    }

    /// x += V y with H y = g over the first k columns
    fn update_solution(
        &self,
        k: usize,
        x: &mut Array1<T>,
        work: &mut Workspace<T>,
        work2: &Array2<T>,
    ) {
        let g = self.restart + 2;
        let y = solve_upper_triangular(work2.slice(s![..k, ..k]), work2.slice(s![..k, g]));

        {
            let mut lsq = work.slot_mut(self.ndx(LSQ));
            lsq.fill(T::zero());
            lsq.slice_mut(s![..k]).assign(&y);
        }

        for (j, &yj) in y.iter().enumerate() {
            axpy(yj, &work.slot(self.ndx(BASIS + j)), x);
        }
    }
}

/// Compute Givens rotation coefficients
#[inline]
fn givens_rotation<T: ComplexField>(a: T, b: T) -> (T, T) {
    let tol = T::Real::from_f64(1e-30).unwrap_or_else(T::Real::zero);
    if b.norm() < tol {
        return (T::one(), T::zero());
    }
    if a.norm() < tol {
        return (T::zero(), T::one());
    }

    let r = (a.norm_sqr() + b.norm_sqr()).sqrt();
    let c = a * T::from_real(T::Real::one() / r);
    let s = b * T::from_real(T::Real::one() / r);

    (c, s)
}

/// Solve upper triangular system Hy = g
fn solve_upper_triangular<T: ComplexField>(
    h: ArrayView2<'_, T>,
    g: ArrayView1<'_, T>,
) -> Array1<T> {
    let k = g.len();
    let mut y = Array1::from_elem(k, T::zero());
    let tol = T::Real::from_f64(1e-30).unwrap_or_else(T::Real::zero);

    for i in (0..k).rev() {
        let mut sum = g[i];
        for j in (i + 1)..k {
            sum -= h[[i, j]] * y[j];
        }
        if h[[i, i]].norm() > tol {
            y[i] = sum * h[[i, i]].inv();
        }
    }

    y
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blas_helpers::axpby;
    use crate::tolerance::stop_test;
    use crate::traits::LinearOperator;
    use approx::assert_relative_eq;
    use ndarray::array;
    use num_complex::Complex64;

    /// Run the kernel against a dense operator with identity preconditioning
    fn drive<T: ComplexField>(
        a: &Array2<T>,
        b: &Array1<T>,
        restart: usize,
        max_iter: usize,
        threshold: T::Real,
    ) -> (Array1<T>, RevcomControl<T::Real>, Vec<usize>) {
        let n = b.len();
        let mut kernel = GmresKernel::new(n, restart);
        let mut work = kernel.workspace();
        let mut work2 = kernel.hessenberg();
        let mut ctl = RevcomControl::new(max_iter, threshold);
        let mut x = Array1::from_elem(n, T::zero());
        let mut offsets = Vec::new();

        loop {
            let job = kernel.step(&mut ctl, b, &mut x, &mut work, &mut work2);
            assert_eq!(kernel.is_finished(), matches!(job, GmresJob::Done));
            offsets.extend(job.ndx1());
            offsets.extend(job.ndx2());
            match job {
                GmresJob::ResidualUpdate { ndx2, sclr1, sclr2 } => {
                    let ax = a.apply(&x);
                    axpby(sclr1, &ax, sclr2, &mut work.slot_mut(ndx2));
                }
                GmresJob::Precondition { ndx1, ndx2 } => {
                    let src = work.slot(ndx2).to_owned();
                    work.slot_mut(ndx1).assign(&src);
                }
                GmresJob::Matvec {
                    ndx1,
                    ndx2,
                    sclr1,
                    sclr2,
                } => {
                    let av = a.apply(&work.slot(ndx1).to_owned());
                    axpby(sclr1, &av, sclr2, &mut work.slot_mut(ndx2));
                }
                GmresJob::StopTest { ndx1 } => {
                    let (_, ok) = stop_test(&work.slot(ndx1), threshold);
                    ctl.info = i32::from(ok);
                }
                GmresJob::Done => break,
            }
        }

        assert!(offsets.iter().all(|&ndx| work.contains(ndx)));
        (x, ctl, offsets)
    }

    #[test]
    fn test_gmres_kernel_converges() {
        let a = array![[3.0_f64, 2.0, 0.0], [1.0, -1.0, 0.0], [0.0, 5.0, 1.0]];
        let b = array![2.0_f64, 4.0, -1.0];

        let (x, ctl, _) = drive(&a, &b, 20, 30, 1e-10);

        assert_eq!(ctl.info, 0);
        assert_eq!(ctl.iter, 1);
        assert_relative_eq!(x[0], 2.0, epsilon = 1e-8);
        assert_relative_eq!(x[1], -2.0, epsilon = 1e-8);
        assert_relative_eq!(x[2], 9.0, epsilon = 1e-8);
    }

    #[test]
    fn test_gmres_kernel_exhausts_budget() {
        let n = 12;
        let mut a = Array2::from_elem((n, n), 0.0_f64);
        for i in 0..n {
            a[[i, i]] = 2.0;
            if i > 0 {
                a[[i, i - 1]] = -1.0;
            }
            if i + 1 < n {
                a[[i, i + 1]] = -1.0;
            }
        }
        let b = Array1::from_elem(n, 1.0_f64);

        let (_, ctl, _) = drive(&a, &b, 1, 3, 1e-12);

        assert_eq!(ctl.iter, 3);
        assert_eq!(ctl.info, 3);
    }

    #[test]
    fn test_gmres_kernel_complex() {
        let a = array![
            [Complex64::new(4.0, 1.0), Complex64::new(1.0, 0.0)],
            [Complex64::new(0.0, -1.0), Complex64::new(3.0, 0.0)],
        ];
        let b = array![Complex64::new(1.0, 0.0), Complex64::new(0.0, 2.0)];

        let (x, ctl, _) = drive(&a, &b, 2, 10, 1e-12);

        assert_eq!(ctl.info, 0);
        let r = &b - &a.apply(&x);
        assert!(vector_norm(&r) < 1e-10);
    }

    #[test]
    fn test_gmres_job_protocol() {
        let job: GmresJob<f64> = GmresJob::Matvec {
            ndx1: 11,
            ndx2: 9,
            sclr1: 1.0,
            sclr2: 0.0,
        };
        assert_eq!(job.code(), 3);
        assert_eq!(job.ndx1(), Some(11));
        assert_eq!(job.ndx2(), Some(9));
        assert_eq!(GmresJob::<f64>::Done.code(), -1);
        assert_eq!(GmresJob::<f64>::StopTest { ndx1: 1 }.ndx2(), None);

        let kernel: GmresKernel<f64> = GmresKernel::new(3, 20);
        assert_eq!(kernel.restart(), 3);
        assert_eq!(kernel.workspace().len(), 9 * 3);
        assert_eq!(kernel.hessenberg().dim(), (4, 8));
    }
}
