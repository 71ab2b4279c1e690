//! Guard against re-entering a solver instance
//!
//! The bound [`KrylovSolver`](crate::KrylovSolver) owns one guard. A call that
//! arrives while another call on the same instance is still running (for
//! example from inside its own callback) is refused instead of corrupting the
//! shared state.

use crate::error::{Result, SolverError};
use std::sync::atomic::{AtomicBool, Ordering};

/// Busy flag for one solver instance
#[derive(Debug, Default)]
pub struct ReentrancyGuard {
    busy: AtomicBool,
}

/// Held for the duration of one solve; releases the guard on drop
#[derive(Debug)]
pub struct Entered<'a> {
    guard: &'a ReentrancyGuard,
}

impl ReentrancyGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the instance busy, or fail if it already is
    pub fn enter(&self, method: &'static str) -> Result<Entered<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .map_err(|_| SolverError::Reentrant { method })?;
        Ok(Entered { guard: self })
    }

    /// Whether a solve is currently in flight
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

impl Drop for Entered<'_> {
    fn drop(&mut self) {
        self.guard.busy.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_entry_is_refused() {
        let guard = ReentrancyGuard::new();
        let first = guard.enter("cg").unwrap();
        assert!(guard.is_busy());
        assert!(matches!(
            guard.enter("cg"),
            Err(SolverError::Reentrant { method: "cg" })
        ));
        drop(first);
        assert!(!guard.is_busy());
        assert!(guard.enter("cg").is_ok());
    }
}
