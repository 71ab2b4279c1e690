//! Flat scratch buffer shared between a kernel and its driver
//!
//! The buffer is a sequence of N-length slots. Jobs address a slot by the
//! 1-based position of its first entry, so slot `k` starts at `k * N + 1`.

use crate::traits::ComplexField;
use ndarray::{s, Array1, ArrayView1, ArrayViewMut1};
use std::ops::Range;

/// Caller-owned workspace of `slots` vectors of length `n`
#[derive(Debug, Clone)]
pub struct Workspace<T: ComplexField> {
    data: Array1<T>,
    n: usize,
}

impl<T: ComplexField> Workspace<T> {
    /// Zero-filled workspace
    pub fn new(n: usize, slots: usize) -> Self {
        Self {
            data: Array1::from_elem(n * slots, T::zero()),
            n,
        }
    }

    /// Length of one slot
    pub fn n(&self) -> usize {
        self.n
    }

    /// Total number of entries
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of slots
    pub fn slot_count(&self) -> usize {
        if self.n == 0 {
            0
        } else {
            self.data.len() / self.n
        }
    }

    /// 1-based offset of slot `k`
    pub fn offset(&self, k: usize) -> usize {
        k * self.n + 1
    }

    /// Whether `ndx` starts an N-length slice inside the buffer
    pub fn contains(&self, ndx: usize) -> bool {
        ndx >= 1 && ndx - 1 + self.n <= self.data.len()
    }

    fn range(&self, ndx: usize) -> Range<usize> {
        assert!(
            self.contains(ndx),
            "offset {} outside workspace of length {}",
            ndx,
            self.data.len()
        );
        ndx - 1..ndx - 1 + self.n
    }

    /// Read the slot starting at `ndx`
    pub fn slot(&self, ndx: usize) -> ArrayView1<'_, T> {
        let r = self.range(ndx);
        self.data.slice(s![r.start..r.end])
    }

    /// Write the slot starting at `ndx`
    pub fn slot_mut(&mut self, ndx: usize) -> ArrayViewMut1<'_, T> {
        let r = self.range(ndx);
        self.data.slice_mut(s![r.start..r.end])
    }

    /// Two distinct slots at once
    ///
    /// # Panics
    /// If the slots overlap.
    pub fn pair_mut(&mut self, a: usize, b: usize) -> (ArrayViewMut1<'_, T>, ArrayViewMut1<'_, T>) {
        let (ra, rb) = (self.range(a), self.range(b));
        self.data
            .multi_slice_mut((s![ra.start..ra.end], s![rb.start..rb.end]))
    }

    /// Copy slot `src` into slot `dst`
    pub fn copy(&mut self, src: usize, dst: usize) {
        if src != dst {
            let (from, mut to) = self.pair_mut(src, dst);
            to.assign(&from);
        }
    }

    /// The whole buffer
    pub fn as_array(&self) -> &Array1<T> {
        &self.data
    }
}
