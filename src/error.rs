//! Physics Error Types
//!
//! Unified error type for the 2D engine. Fallible construction (polygon
//! hulls, joint definitions, solver configuration, id lookups) returns
//! `Result<T, PhysicsError>`. Caller bugs such as stale ids passed to the
//! panicking accessors or double removal are assertions instead.
//!
//! Author: Moroya Sakamoto

use core::fmt;

/// Unified error type for physics operations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PhysicsError {
    /// Body id is stale or was never issued.
    InvalidBody {
        /// Slot index of the offending id
        index: u32,
    },
    /// Fixture id is stale or was never issued.
    InvalidFixture {
        /// Slot index of the offending id
        index: u32,
    },
    /// Joint id is stale or was never issued.
    InvalidJoint {
        /// Slot index of the offending id
        index: u32,
    },
    /// A joint definition cannot be satisfied.
    InvalidConstraint {
        /// Human-readable description of the problem
        reason: &'static str,
    },
    /// Geometry is degenerate (collinear hull, zero-length edge, ...).
    DegenerateGeometry {
        /// Human-readable description of the problem
        reason: &'static str,
    },
    /// A capacity limit was exceeded.
    CapacityExceeded {
        /// What resource was exhausted
        resource: &'static str,
        /// The limit that was exceeded
        limit: usize,
    },
    /// Invalid configuration parameter.
    InvalidConfiguration {
        /// Description of the invalid configuration
        reason: &'static str,
    },
}

impl fmt::Display for PhysicsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidBody { index } => write!(f, "invalid body id (slot {index})"),
            Self::InvalidFixture { index } => write!(f, "invalid fixture id (slot {index})"),
            Self::InvalidJoint { index } => write!(f, "invalid joint id (slot {index})"),
            Self::InvalidConstraint { reason } => {
                write!(f, "invalid constraint: {reason}")
            }
            Self::DegenerateGeometry { reason } => {
                write!(f, "degenerate geometry: {reason}")
            }
            Self::CapacityExceeded { resource, limit } => {
                write!(f, "{resource} capacity exceeded (limit={limit})")
            }
            Self::InvalidConfiguration { reason } => {
                write!(f, "invalid configuration: {reason}")
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for PhysicsError {}

// ============================================================================
// Tests
// ============================================================================

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = PhysicsError::InvalidBody { index: 5 };
        let s = format!("{}", e);
        assert!(s.contains("body"));
        assert!(s.contains('5'));
    }

    #[test]
    fn test_error_variants() {
        let e1 = PhysicsError::InvalidFixture { index: 0 };
        let e2 = PhysicsError::InvalidJoint { index: 0 };
        let e3 = PhysicsError::InvalidConstraint {
            reason: "body A == body B",
        };
        let e4 = PhysicsError::DegenerateGeometry {
            reason: "collinear hull",
        };
        assert_ne!(e1, e2);
        assert_ne!(e3, e4);
    }

    #[test]
    fn test_capacity_exceeded() {
        let e = PhysicsError::CapacityExceeded {
            resource: "polygon vertices",
            limit: 8,
        };
        let s = format!("{}", e);
        assert!(s.contains("polygon vertices"));
        assert!(s.contains('8'));
    }

    #[test]
    fn test_invalid_configuration() {
        let e = PhysicsError::InvalidConfiguration {
            reason: "velocity_iterations must be > 0",
        };
        let s = format!("{}", e);
        assert!(s.contains("velocity_iterations"));
    }

    #[test]
    fn test_is_std_error() {
        fn takes(_: &dyn std::error::Error) {}
        takes(&PhysicsError::InvalidJoint { index: 1 });
    }
}
