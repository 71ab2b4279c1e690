//! QMR kernel (without look-ahead)
//!
//! Two-sided Lanczos with coupled recurrences and the quasi-minimal residual
//! smoothing of Freund & Nachtigal, split-preconditioned with M1 (left) and
//! M2 (right). Breakdowns of the Lanczos process stop the kernel with a
//! negative `info`:
//!
//! | info | vanishing quantity |
//! |---|---|
//! | -10 | ρ = ‖M1 ṽ‖ |
//! | -11 | ξ = ‖M2ᴴ w̃‖ |
//! | -12 | δ = ⟨z, y⟩ |
//! | -13 | ε = ⟨q, A p⟩ |
//! | -14 | β = ε / δ |
//! | -15 | γ |

use super::{RevcomControl, Workspace};
use crate::blas_helpers::{axpby, axpy, inner_product, scale_inplace, vector_norm};
use crate::traits::ComplexField;
use ndarray::Array1;
use num_traits::{Float, One, Zero};

const RESIDUAL: usize = 0;
const D: usize = 1;
const S: usize = 2;
const P: usize = 3;
const Q: usize = 4;
const PTLD: usize = 5;
const V: usize = 6;
const W: usize = 7;
const Y: usize = 8;
const Z: usize = 9;
const TLD: usize = 10;

/// Number of N-length workspace slots used by the QMR kernel
pub const QMR_SLOTS: usize = 11;

/// Request issued by [`QmrKernel::step`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QmrJob<T> {
    /// `work[ndx2] = sclr2 * work[ndx2] + sclr1 * A work[ndx1]` (code 1)
    Matvec {
        ndx1: usize,
        ndx2: usize,
        sclr1: T,
        sclr2: T,
    },
    /// `work[ndx2] = sclr2 * work[ndx2] + sclr1 * Aᴴ work[ndx1]` (code 2)
    MatvecAdjoint {
        ndx1: usize,
        ndx2: usize,
        sclr1: T,
        sclr2: T,
    },
    /// `work[ndx1] = M1 work[ndx2]` (code 3)
    LeftPrecondition { ndx1: usize, ndx2: usize },
    /// `work[ndx1] = M2 work[ndx2]` (code 4)
    RightPrecondition { ndx1: usize, ndx2: usize },
    /// `work[ndx1] = M1ᴴ work[ndx2]` (code 5)
    LeftPrecondAdjoint { ndx1: usize, ndx2: usize },
    /// `work[ndx1] = M2ᴴ work[ndx2]` (code 6)
    RightPrecondAdjoint { ndx1: usize, ndx2: usize },
    /// `work[ndx2] = sclr2 * work[ndx2] + sclr1 * A x` (code 7)
    ResidualUpdate { ndx2: usize, sclr1: T, sclr2: T },
    /// Run the stopping test on `work[ndx1]` and report it in `info` (code 8)
    StopTest { ndx1: usize },
    /// Terminal (code -1)
    Done,
}

impl<T> QmrJob<T> {
    /// Integer job code
    pub fn code(&self) -> i32 {
        match self {
            QmrJob::Matvec { .. } => 1,
            QmrJob::MatvecAdjoint { .. } => 2,
            QmrJob::LeftPrecondition { .. } => 3,
            QmrJob::RightPrecondition { .. } => 4,
            QmrJob::LeftPrecondAdjoint { .. } => 5,
            QmrJob::RightPrecondAdjoint { .. } => 6,
            QmrJob::ResidualUpdate { .. } => 7,
            QmrJob::StopTest { .. } => 8,
            QmrJob::Done => -1,
        }
    }

    pub fn ndx1(&self) -> Option<usize> {
        match *self {
            QmrJob::Matvec { ndx1, .. }
            | QmrJob::MatvecAdjoint { ndx1, .. }
            | QmrJob::LeftPrecondition { ndx1, .. }
            | QmrJob::RightPrecondition { ndx1, .. }
            | QmrJob::LeftPrecondAdjoint { ndx1, .. }
            | QmrJob::RightPrecondAdjoint { ndx1, .. }
            | QmrJob::StopTest { ndx1 } => Some(ndx1),
            _ => None,
        }
    }

    pub fn ndx2(&self) -> Option<usize> {
        match *self {
            QmrJob::Matvec { ndx2, .. }
            | QmrJob::MatvecAdjoint { ndx2, .. }
            | QmrJob::LeftPrecondition { ndx2, .. }
            | QmrJob::RightPrecondition { ndx2, .. }
            | QmrJob::LeftPrecondAdjoint { ndx2, .. }
            | QmrJob::RightPrecondAdjoint { ndx2, .. }
            | QmrJob::ResidualUpdate { ndx2, .. } => Some(ndx2),
            _ => None,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, QmrJob::Done)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resume {
    Start,
    InitialResidual,
    InitialStop,
    InitialY,
    InitialZ,
    AfterYtld,
    AfterZtld,
    AfterPtld,
    AfterY,
    AfterW,
    AfterZ,
    AfterStop,
    Finished,
}

/// QMR state machine
#[derive(Debug, Clone)]
pub struct QmrKernel<T: ComplexField> {
    n: usize,
    resume: Resume,
    first: bool,
    rho: T::Real,
    rho_old: T::Real,
    xi: T::Real,
    gamma: T::Real,
    theta: T::Real,
    eta: T,
    delta: T,
    eps: T,
    beta: T,
}

impl<T: ComplexField> QmrKernel<T> {
    pub fn new(n: usize) -> Self {
        Self {
            n,
            resume: Resume::Start,
            first: true,
            rho: T::Real::zero(),
            rho_old: T::Real::zero(),
            xi: T::Real::zero(),
            gamma: T::Real::one(),
            theta: T::Real::zero(),
            eta: -T::one(),
            delta: T::zero(),
            eps: T::zero(),
            beta: T::zero(),
        }
    }

    /// Workspace sized for this kernel
    pub fn workspace(&self) -> Workspace<T> {
        Workspace::new(self.n, QMR_SLOTS)
    }

    pub fn is_finished(&self) -> bool {
        self.resume == Resume::Finished
    }

    fn ndx(&self, slot: usize) -> usize {
        slot * self.n + 1
    }

    /// Advance to the next job
    ///
    /// After a `StopTest` job the driver sets `ctl.info` to 1 when the test
    /// passed and 0 otherwise. `ctl.iter` counts completed iterations, each of
    /// which moves `x`.
    pub fn step(
        &mut self,
        ctl: &mut RevcomControl<T::Real>,
        b: &Array1<T>,
        x: &mut Array1<T>,
        work: &mut Workspace<T>,
    ) -> QmrJob<T> {
        match self.resume {
            Resume::Start => {
                work.slot_mut(self.ndx(RESIDUAL)).assign(b);
                self.resume = Resume::InitialResidual;
                QmrJob::ResidualUpdate {
                    ndx2: self.ndx(RESIDUAL),
                    sclr1: -T::one(),
                    sclr2: T::one(),
                }
            }
            Resume::InitialResidual => {
                self.resume = Resume::InitialStop;
                QmrJob::StopTest {
                    ndx1: self.ndx(RESIDUAL),
                }
            }
            Resume::InitialStop => {
                if ctl.info == 1 {
                    ctl.info = 0;
                    return self.finish();
                }
                ctl.info = 0;
                work.copy(self.ndx(RESIDUAL), self.ndx(V));
                self.resume = Resume::InitialY;
                QmrJob::LeftPrecondition {
                    ndx1: self.ndx(Y),
                    ndx2: self.ndx(V),
                }
            }
            Resume::InitialY => {
                self.rho = vector_norm(&work.slot(self.ndx(Y)));
                work.copy(self.ndx(RESIDUAL), self.ndx(W));
                self.resume = Resume::InitialZ;
                QmrJob::RightPrecondAdjoint {
                    ndx1: self.ndx(Z),
                    ndx2: self.ndx(W),
                }
            }
            Resume::InitialZ => {
                self.xi = vector_norm(&work.slot(self.ndx(Z)));
                self.begin_iteration(ctl, work)
            }
            Resume::AfterYtld => {
                let (tld, mut p) = work.pair_mut(self.ndx(TLD), self.ndx(P));
                if self.first {
                    p.assign(&tld);
                } else {
                    let coef = T::from_real(self.xi) * self.delta / self.eps;
                    axpby(T::one(), &tld, -coef, &mut p);
                }
                self.resume = Resume::AfterZtld;
                QmrJob::LeftPrecondAdjoint {
                    ndx1: self.ndx(TLD),
                    ndx2: self.ndx(Z),
                }
            }
            Resume::AfterZtld => {
                let (tld, mut q) = work.pair_mut(self.ndx(TLD), self.ndx(Q));
                if self.first {
                    q.assign(&tld);
                } else {
                    let coef = (T::from_real(self.rho) * self.delta / self.eps).conj();
                    axpby(T::one(), &tld, -coef, &mut q);
                }
                self.resume = Resume::AfterPtld;
                QmrJob::Matvec {
                    ndx1: self.ndx(P),
                    ndx2: self.ndx(PTLD),
                    sclr1: T::one(),
                    sclr2: T::zero(),
                }
            }
            Resume::AfterPtld => {
                self.eps = inner_product(&work.slot(self.ndx(Q)), &work.slot(self.ndx(PTLD)));
                if self.eps.is_zero() {
                    return self.breakdown(ctl, -13);
                }
                self.beta = self.eps / self.delta;
                if self.beta.is_zero() {
                    return self.breakdown(ctl, -14);
                }

                let (ptld, mut v) = work.pair_mut(self.ndx(PTLD), self.ndx(V));
                axpby(T::one(), &ptld, -self.beta, &mut v);

                self.resume = Resume::AfterY;
                QmrJob::LeftPrecondition {
                    ndx1: self.ndx(Y),
                    ndx2: self.ndx(V),
                }
            }
            Resume::AfterY => {
                self.rho_old = self.rho;
                self.rho = vector_norm(&work.slot(self.ndx(Y)));
                self.resume = Resume::AfterW;
                QmrJob::MatvecAdjoint {
                    ndx1: self.ndx(Q),
                    ndx2: self.ndx(W),
                    sclr1: T::one(),
                    sclr2: -self.beta.conj(),
                }
            }
            Resume::AfterW => {
                self.resume = Resume::AfterZ;
                QmrJob::RightPrecondAdjoint {
                    ndx1: self.ndx(Z),
                    ndx2: self.ndx(W),
                }
            }
            Resume::AfterZ => {
                self.xi = vector_norm(&work.slot(self.ndx(Z)));

                let gamma_old = self.gamma;
                let theta_old = self.theta;
                self.theta = self.rho / (gamma_old * self.beta.norm());
                self.gamma = T::Real::one() / (T::Real::one() + self.theta * self.theta).sqrt();
                if self.gamma.is_zero() {
                    return self.breakdown(ctl, -15);
                }
                let ratio = self.rho_old * self.gamma * self.gamma / (gamma_old * gamma_old);
                self.eta = -self.eta * T::from_real(ratio) / self.beta;

                let carry = theta_old * self.gamma;
                let carry = T::from_real(carry * carry);
                self.smooth(D, P, carry, work);
                self.smooth(S, PTLD, carry, work);
                self.first = false;

                axpy(T::one(), &work.slot(self.ndx(D)), x);
                {
                    let (s, mut r) = work.pair_mut(self.ndx(S), self.ndx(RESIDUAL));
                    axpy(-T::one(), &s, &mut r);
                }
                ctl.iter += 1;

                self.resume = Resume::AfterStop;
                QmrJob::StopTest {
                    ndx1: self.ndx(RESIDUAL),
                }
            }
            Resume::AfterStop => {
                if ctl.info == 1 {
                    ctl.info = 0;
                    self.finish()
                } else if ctl.iter >= ctl.max_iter {
                    ctl.info = i32::try_from(ctl.iter).unwrap_or(i32::MAX);
                    self.finish()
                } else {
                    ctl.info = 0;
                    self.begin_iteration(ctl, work)
                }
            }
            Resume::Finished => QmrJob::Done,
        }
    }

    /// Normalise the Lanczos vectors and request M2 y
    fn begin_iteration(
        &mut self,
        ctl: &mut RevcomControl<T::Real>,
        work: &mut Workspace<T>,
    ) -> QmrJob<T> {
        if self.rho.is_zero() {
            return self.breakdown(ctl, -10);
        }
        if self.xi.is_zero() {
            return self.breakdown(ctl, -11);
        }

        let inv_rho = T::from_real(self.rho.recip());
        let inv_xi = T::from_real(self.xi.recip());
        scale_inplace(&mut work.slot_mut(self.ndx(V)), inv_rho);
        scale_inplace(&mut work.slot_mut(self.ndx(Y)), inv_rho);
        scale_inplace(&mut work.slot_mut(self.ndx(W)), inv_xi);
        scale_inplace(&mut work.slot_mut(self.ndx(Z)), inv_xi);

        self.delta = inner_product(&work.slot(self.ndx(Z)), &work.slot(self.ndx(Y)));
        if self.delta.is_zero() {
            return self.breakdown(ctl, -12);
        }

        self.resume = Resume::AfterYtld;
        QmrJob::RightPrecondition {
            ndx1: self.ndx(TLD),
            ndx2: self.ndx(Y),
        }
    }

    /// target = eta * source + carry * target (first iteration: eta * source)
    fn smooth(&self, target: usize, source: usize, carry: T, work: &mut Workspace<T>) {
        let beta = if self.first { T::zero() } else { carry };
        let (src, mut dst) = work.pair_mut(self.ndx(source), self.ndx(target));
        axpby(self.eta, &src, beta, &mut dst);
    }

    fn breakdown(&mut self, ctl: &mut RevcomControl<T::Real>, code: i32) -> QmrJob<T> {
        ctl.info = code;
        self.finish()
    }

    fn finish(&mut self) -> QmrJob<T> {
        self.resume = Resume::Finished;
        QmrJob::Done
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tolerance::stop_test;
    use crate::traits::LinearOperator;
    use approx::assert_relative_eq;
    use ndarray::{array, Array2};
    use num_complex::Complex64;

    /// Run the kernel against a dense operator with identity preconditioners
    fn drive<T: ComplexField>(
        a: &Array2<T>,
        b: &Array1<T>,
        max_iter: usize,
        threshold: T::Real,
    ) -> (Array1<T>, RevcomControl<T::Real>, Vec<i32>) {
        let n = b.len();
        let mut kernel = QmrKernel::new(n);
        let mut work = kernel.workspace();
        let mut ctl = RevcomControl::new(max_iter, threshold);
        let mut x = Array1::from_elem(n, T::zero());
        let mut codes = Vec::new();

        loop {
            let job = kernel.step(&mut ctl, b, &mut x, &mut work);
            codes.push(job.code());
            assert_eq!(kernel.is_finished(), matches!(job, QmrJob::Done));
            for ndx in job.ndx1().into_iter().chain(job.ndx2()) {
                assert!(work.contains(ndx), "offset {} out of range", ndx);
            }
            match job {
                QmrJob::Matvec {
                    ndx1,
                    ndx2,
                    sclr1,
                    sclr2,
                } => {
                    let y = a.apply(&work.slot(ndx1).to_owned());
                    axpby(sclr1, &y, sclr2, &mut work.slot_mut(ndx2));
                }
                QmrJob::MatvecAdjoint {
                    ndx1,
                    ndx2,
                    sclr1,
                    sclr2,
                } => {
                    let y = a.apply_hermitian(&work.slot(ndx1).to_owned());
                    axpby(sclr1, &y, sclr2, &mut work.slot_mut(ndx2));
                }
                QmrJob::LeftPrecondition { ndx1, ndx2 }
                | QmrJob::RightPrecondition { ndx1, ndx2 }
                | QmrJob::LeftPrecondAdjoint { ndx1, ndx2 }
                | QmrJob::RightPrecondAdjoint { ndx1, ndx2 } => work.copy(ndx2, ndx1),
                QmrJob::ResidualUpdate { ndx2, sclr1, sclr2 } => {
                    let ax = a.apply(&x);
                    axpby(sclr1, &ax, sclr2, &mut work.slot_mut(ndx2));
                }
                QmrJob::StopTest { ndx1 } => {
                    let (_, ok) = stop_test(&work.slot(ndx1), threshold);
                    ctl.info = i32::from(ok);
                }
                QmrJob::Done => break,
            }
        }

        (x, ctl, codes)
    }

    #[test]
    fn test_qmr_kernel_converges() {
        let a = array![[3.0_f64, 2.0, 0.0], [1.0, -1.0, 0.0], [0.0, 5.0, 1.0]];
        let b = array![2.0_f64, 4.0, -1.0];

        let (x, ctl, codes) = drive(&a, &b, 30, 1e-10);

        assert_eq!(ctl.info, 0);
        assert!(ctl.iter <= 4);
        assert_eq!(codes[0], 7);
        assert_eq!(codes[1], 8);
        assert_eq!(*codes.last().unwrap(), -1);
        assert_relative_eq!(x[0], 2.0, epsilon = 1e-8);
        assert_relative_eq!(x[1], -2.0, epsilon = 1e-8);
        assert_relative_eq!(x[2], 9.0, epsilon = 1e-8);
    }

    #[test]
    fn test_qmr_kernel_complex() {
        let a = array![
            [Complex64::new(4.0, 1.0), Complex64::new(1.0, 0.0)],
            [Complex64::new(0.0, -1.0), Complex64::new(3.0, 0.0)],
        ];
        let b = array![Complex64::new(1.0, 0.0), Complex64::new(0.0, 2.0)];

        let (x, ctl, _) = drive(&a, &b, 20, 1e-12);

        assert_eq!(ctl.info, 0);
        let r = &b - &a.apply(&x);
        assert!(vector_norm(&r) < 1e-10);
    }

    #[test]
    fn test_qmr_kernel_exact_guess_stops_immediately() {
        let a = array![[2.0_f64, 0.0], [0.0, 4.0]];
        let b = array![0.0_f64, 0.0];

        let (_, ctl, codes) = drive(&a, &b, 10, 1e-10);

        assert_eq!(ctl.info, 0);
        assert_eq!(ctl.iter, 0);
        assert_eq!(codes, vec![7, 8, -1]);
    }

    #[test]
    fn test_qmr_kernel_budget() {
        let n = 10;
        let mut a = Array2::from_elem((n, n), 0.0_f64);
        for i in 0..n {
            a[[i, i]] = 2.0;
            if i + 1 < n {
                a[[i, i + 1]] = -1.0;
                a[[i + 1, i]] = -0.5;
            }
        }
        let b = Array1::from_elem(n, 1.0_f64);

        let (_, ctl, _) = drive(&a, &b, 2, 1e-14);

        assert_eq!(ctl.iter, 2);
        assert_eq!(ctl.info, 2);
    }

    #[test]
    fn test_qmr_job_protocol() {
        let job: QmrJob<f64> = QmrJob::RightPrecondAdjoint { ndx1: 19, ndx2: 15 };
        assert_eq!(job.code(), 6);
        assert_eq!(job.ndx1(), Some(19));
        assert_eq!(job.ndx2(), Some(15));
        assert_eq!(QmrJob::<f64>::Done.code(), -1);
        assert_eq!(QmrKernel::<f64>::new(4).workspace().len(), 44);
    }

    #[test]
    fn test_qmr_kernel_reports_epsilon_breakdown() {
        let a = array![[0.0_f64, 1.0], [-1.0, 0.0]];
        let b = array![1.0_f64, 0.0];

        let (x, ctl, codes) = drive(&a, &b, 10, 1e-10);

        assert_eq!(ctl.info, -13);
        assert_eq!(ctl.iter, 0);
        assert_eq!(x, Array1::<f64>::zeros(2));
        assert_eq!(codes.last(), Some(&-1));
    }
}
