//! Engine Constants and Solver Configuration
//!
//! Geometric tolerances are compile-time constants. Everything a caller may
//! want to tune per world (iteration counts, Baumgarte factors, sleep
//! thresholds, feature flags) lives in [`SolverConfig`], which is passed to
//! [`World::new`](crate::world::World::new). No global mutable state.

use crate::error::PhysicsError;
use crate::math::{Fix64, Vec2Fix};

// ============================================================================
// Geometric constants
// ============================================================================

/// Collision and constraint tolerance (0.005 m).
pub const LINEAR_SLOP: Fix64 = Fix64::from_ratio(5, 1000);

/// Angular tolerance (2 degrees).
pub const ANGULAR_SLOP: Fix64 = Fix64::from_raw(149_922_641);

/// Skin radius around polygons and edges, keeps cores apart for TOI.
pub const POLYGON_RADIUS: Fix64 = Fix64::from_ratio(1, 100);

/// Vertex limit of a convex polygon.
pub const MAX_POLYGON_VERTICES: usize = 8;

/// Points in a contact manifold.
pub const MAX_MANIFOLD_POINTS: usize = 2;

/// Fattening applied to every broad-phase AABB.
pub const AABB_EXTENSION: Fix64 = Fix64::from_ratio(1, 10);

/// Scale of the predictive AABB displacement.
pub const AABB_MULTIPLIER: Fix64 = Fix64::from_int(2);

/// Iteration cap for GJK.
pub const MAX_DISTANCE_ITERATIONS: usize = 20;

/// Outer iteration cap for time of impact.
pub const MAX_TOI_ITERATIONS: usize = 20;

/// Root finder iteration cap for time of impact.
pub const MAX_TOI_ROOT_ITERATIONS: usize = 50;

/// Condition number bound for the two-point block contact solver.
pub const MAX_BLOCK_CONDITION: Fix64 = Fix64::from_int(1000);

/// Slack below 1 under which a TOI alpha counts as "end of step".
pub const TOI_ALPHA_EPSILON: Fix64 = Fix64::from_raw(4096);

// ============================================================================
// SolverConfig
// ============================================================================

/// Per-world solver configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SolverConfig {
    /// Gravitational acceleration.
    pub gravity: Vec2Fix,
    /// Velocity iterations per step.
    pub velocity_iterations: usize,
    /// Position iterations per step.
    pub position_iterations: usize,
    /// Position iterations inside a TOI sub-step.
    pub toi_position_iterations: usize,
    /// Sub-steps a single contact may trigger before it is ignored for the rest of the step.
    pub max_sub_steps: u32,
    /// Capacity of the mini island built around a TOI event.
    pub max_toi_contacts: usize,
    /// Relative normal speed above which restitution applies.
    pub velocity_threshold: Fix64,
    /// Fraction of overlap resolved per position iteration.
    pub baumgarte: Fix64,
    /// Baumgarte factor used inside TOI sub-steps.
    pub toi_baumgarte: Fix64,
    /// Largest linear position correction per iteration.
    pub max_linear_correction: Fix64,
    /// Largest angular position correction per iteration.
    pub max_angular_correction: Fix64,
    /// Largest distance a body may travel in one step.
    pub max_translation: Fix64,
    /// Largest angle a body may turn in one step.
    pub max_rotation: Fix64,
    /// Seconds a body must rest before it may sleep.
    pub time_to_sleep: Fix64,
    /// Linear speed under which a body counts as resting.
    pub linear_sleep_tolerance: Fix64,
    /// Angular speed under which a body counts as resting.
    pub angular_sleep_tolerance: Fix64,
    /// Enable island sleeping.
    pub allow_sleep: bool,
    /// Reuse last step's impulses as the initial guess.
    pub warm_starting: bool,
    /// Run continuous collision after the discrete solve.
    pub continuous_physics: bool,
    /// Resolve one TOI event per step (debugging aid).
    pub sub_stepping: bool,
    /// Zero accumulated forces at the end of every step.
    pub auto_clear_forces: bool,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            gravity: Vec2Fix::from_int(0, -10),
            velocity_iterations: 8,
            position_iterations: 3,
            toi_position_iterations: 20,
            max_sub_steps: 8,
            max_toi_contacts: 32,
            velocity_threshold: Fix64::ONE,
            baumgarte: Fix64::from_ratio(2, 10),
            toi_baumgarte: Fix64::from_ratio(75, 100),
            max_linear_correction: Fix64::from_ratio(2, 10),
            max_angular_correction: Fix64::from_raw(599_690_565),
            max_translation: Fix64::from_int(2),
            max_rotation: Fix64::HALF_PI,
            time_to_sleep: Fix64::HALF,
            linear_sleep_tolerance: Fix64::from_ratio(1, 100),
            angular_sleep_tolerance: ANGULAR_SLOP,
            allow_sleep: true,
            warm_starting: true,
            continuous_physics: true,
            sub_stepping: false,
            auto_clear_forces: true,
        }
    }
}

impl SolverConfig {
    /// Zero-gravity configuration, otherwise default.
    pub fn zero_gravity() -> Self {
        Self {
            gravity: Vec2Fix::ZERO,
            ..Self::default()
        }
    }

    /// Check the configuration for values the solver cannot run with.
    pub fn validate(&self) -> Result<(), PhysicsError> {
        if !self.gravity.is_valid() {
            return Err(PhysicsError::InvalidConfiguration {
                reason: "gravity is saturated",
            });
        }
        if self.velocity_iterations == 0 {
            return Err(PhysicsError::InvalidConfiguration {
                reason: "velocity_iterations must be > 0",
            });
        }
        if self.position_iterations == 0 || self.toi_position_iterations == 0 {
            return Err(PhysicsError::InvalidConfiguration {
                reason: "position iterations must be > 0",
            });
        }
        if self.max_sub_steps == 0 {
            return Err(PhysicsError::InvalidConfiguration {
                reason: "max_sub_steps must be > 0",
            });
        }
        if self.max_toi_contacts == 0 {
            return Err(PhysicsError::InvalidConfiguration {
                reason: "max_toi_contacts must be > 0",
            });
        }
        let unit = |x: Fix64| x.is_positive() && x <= Fix64::ONE;
        if !unit(self.baumgarte) || !unit(self.toi_baumgarte) {
            return Err(PhysicsError::InvalidConfiguration {
                reason: "baumgarte factors must lie in (0, 1]",
            });
        }
        if !self.max_translation.is_positive() || !self.max_rotation.is_positive() {
            return Err(PhysicsError::InvalidConfiguration {
                reason: "max_translation and max_rotation must be > 0",
            });
        }
        if self.time_to_sleep.is_negative()
            || self.linear_sleep_tolerance.is_negative()
            || self.angular_sleep_tolerance.is_negative()
            || self.velocity_threshold.is_negative()
        {
            return Err(PhysicsError::InvalidConfiguration {
                reason: "tolerances must be >= 0",
            });
        }
        Ok(())
    }
}

/// Time step data shared by the island and joint solvers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TimeStep {
    /// Step length in seconds
    pub dt: Fix64,
    /// Inverse step length (zero when `dt` is zero)
    pub inv_dt: Fix64,
    /// `dt / previous dt`, scales warm-start impulses
    pub dt_ratio: Fix64,
    /// Velocity iterations
    pub velocity_iterations: usize,
    /// Position iterations
    pub position_iterations: usize,
    /// Whether warm starting is applied
    pub warm_starting: bool,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(SolverConfig::default().validate(), Ok(()));
        assert_eq!(SolverConfig::zero_gravity().gravity, Vec2Fix::ZERO);
    }

    #[test]
    fn test_constants() {
        assert_eq!(POLYGON_RADIUS, LINEAR_SLOP.double());
        assert!(ANGULAR_SLOP > Fix64::from_ratio(349, 10_000));
        assert!(ANGULAR_SLOP < Fix64::from_ratio(350, 10_000));
    }

    #[test]
    fn test_rejects_zero_iterations() {
        let config = SolverConfig {
            velocity_iterations: 0,
            ..SolverConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(PhysicsError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn test_rejects_bad_baumgarte() {
        let config = SolverConfig {
            baumgarte: Fix64::from_int(2),
            ..SolverConfig::default()
        };
        assert!(config.validate().is_err());
        let config = SolverConfig {
            toi_baumgarte: Fix64::ZERO,
            ..SolverConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
