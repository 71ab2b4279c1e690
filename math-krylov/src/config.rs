//! Solver configuration

use crate::tolerance::Atol;
use num_traits::{Float, FromPrimitive};

/// Iteration cap used by the direct engines when none is configured
pub const DEFAULT_MAX_ITERATIONS: usize = 10_000;

/// GMRES restart length used when none is configured
pub const DEFAULT_RESTART: usize = 20;

/// Configuration shared by all Krylov methods
#[derive(Debug, Clone)]
pub struct KrylovConfig<R> {
    /// Relative tolerance
    pub tolerance: R,
    /// Absolute tolerance policy
    pub atol: Atol<R>,
    /// Maximum number of iterations (`None` = method default)
    pub max_iterations: Option<usize>,
    /// Log progress every N iterations (0 = no output)
    pub print_interval: usize,
}

impl Default for KrylovConfig<f64> {
    fn default() -> Self {
        Self {
            tolerance: 1e-5,
            atol: Atol::Unset,
            max_iterations: None,
            print_interval: 0,
        }
    }
}

impl Default for KrylovConfig<f32> {
    fn default() -> Self {
        Self {
            tolerance: 1e-5,
            atol: Atol::Unset,
            max_iterations: None,
            print_interval: 0,
        }
    }
}

impl<R: Float + FromPrimitive> KrylovConfig<R> {
    /// Set the relative tolerance
    pub fn with_tolerance(mut self, tolerance: R) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Set the absolute tolerance policy
    pub fn with_atol(mut self, atol: Atol<R>) -> Self {
        self.atol = atol;
        self
    }

    /// Set the iteration cap
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = Some(max_iterations);
        self
    }

    /// Log progress every `interval` iterations
    pub fn with_print_interval(mut self, interval: usize) -> Self {
        self.print_interval = interval;
        self
    }
}

/// GMRES solver configuration
#[derive(Debug, Clone)]
pub struct GmresConfig<R> {
    /// Relative tolerance
    pub tolerance: R,
    /// Absolute tolerance policy
    pub atol: Atol<R>,
    /// Maximum number of restart cycles (`None` = 10 * N)
    ///
    /// With a [`GmresCallback::Legacy`](crate::GmresCallback::Legacy) callback
    /// this counts inner iterations instead.
    pub max_iterations: Option<usize>,
    /// Number of inner iterations between restarts (`None` = 20), clamped to N
    pub restart: Option<usize>,
    /// Log progress every N stop tests (0 = no output)
    pub print_interval: usize,
}

impl Default for GmresConfig<f64> {
    fn default() -> Self {
        Self::from_base(&KrylovConfig::default(), None)
    }
}

impl Default for GmresConfig<f32> {
    fn default() -> Self {
        Self::from_base(&KrylovConfig::default(), None)
    }
}

impl<R: Float + FromPrimitive> GmresConfig<R> {
    /// Build a GMRES configuration from the shared settings
    pub fn from_base(base: &KrylovConfig<R>, restart: Option<usize>) -> Self {
        Self {
            tolerance: base.tolerance,
            atol: base.atol,
            max_iterations: base.max_iterations,
            restart,
            print_interval: base.print_interval,
        }
    }

    /// Create config with specific restart parameter
    pub fn with_restart(mut self, restart: usize) -> Self {
        self.restart = Some(restart);
        self
    }

    /// Set the relative tolerance
    pub fn with_tolerance(mut self, tolerance: R) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Set the absolute tolerance policy
    pub fn with_atol(mut self, atol: Atol<R>) -> Self {
        self.atol = atol;
        self
    }

    /// Set the iteration cap
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = Some(max_iterations);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = KrylovConfig::<f64>::default();
        assert_eq!(config.tolerance, 1e-5);
        assert_eq!(config.atol, Atol::Unset);
        assert_eq!(config.max_iterations, None);

        let gmres = GmresConfig::<f64>::default();
        assert_eq!(gmres.restart, None);
        assert_eq!(gmres.tolerance, 1e-5);
    }

    #[test]
    fn test_builders() {
        let config = KrylovConfig::<f64>::default()
            .with_tolerance(1e-8)
            .with_atol(Atol::Absolute(1e-12))
            .with_max_iterations(50)
            .with_print_interval(10);
        assert_eq!(config.tolerance, 1e-8);
        assert_eq!(config.atol, Atol::Absolute(1e-12));
        assert_eq!(config.max_iterations, Some(50));
        assert_eq!(config.print_interval, 10);

        let gmres = GmresConfig::from_base(&config, Some(5)).with_restart(7);
        assert_eq!(gmres.restart, Some(7));
        assert_eq!(gmres.max_iterations, Some(50));
        assert_eq!(gmres.print_interval, 10);
    }
}
