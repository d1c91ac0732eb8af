//! Joint Constraints
//!
//! Velocity-level constraints between two bodies, solved by sequential
//! impulses together with the contacts of an island.
//!
//! # Joint Types
//!
//! - **DistanceJoint**: fixed or springy distance between two anchors
//! - **RevoluteJoint**: shared anchor, free rotation with limits and motor
//! - **PrismaticJoint**: translation along an axis with limits and motor
//! - **WeldJoint**: glue (optionally soft in rotation)
//! - **WheelJoint**: suspension axis with spring and drive motor
//! - **GearJoint**: couples two revolute/prismatic joints by a ratio
//! - **PulleyJoint**: `length_a + ratio * length_b = constant` over two ground anchors
//! - **RopeJoint**: maximum distance only
//! - **MotorJoint**: drives the relative pose towards an offset
//! - **FrictionJoint**: top-down friction
//! - **MouseJoint**: soft spring towards a world target
//! - **AngleJoint**: keeps a relative angle
//!
//! Every kind implements [`JointSolver`]. The island hands each joint the
//! island-local slots of its bodies in [`JointBodies`] and the shared
//! position/velocity arrays in [`SolverData`].

mod angle;
mod distance;
mod friction;
mod gear;
mod motor;
mod mouse;
mod prismatic;
mod pulley;
mod revolute;
mod rope;
mod weld;
mod wheel;

pub use angle::AngleJoint;
pub use distance::DistanceJoint;
pub use friction::FrictionJoint;
pub use gear::GearJoint;
pub use motor::MotorJoint;
pub use mouse::MouseJoint;
pub use prismatic::PrismaticJoint;
pub use pulley::PulleyJoint;
pub use revolute::RevoluteJoint;
pub use rope::RopeJoint;
pub use weld::WeldJoint;
pub use wheel::WheelJoint;

use crate::body::Body;
use crate::error::PhysicsError;
use crate::island::{Position, Velocity};
use crate::math::{Fix64, Rot, Transform, Vec2Fix};
use crate::pool::{BodyId, JointId};
use crate::settings::{SolverConfig, TimeStep};

/// Joint type enumeration
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum JointType {
    Distance,
    Revolute,
    Prismatic,
    Weld,
    Wheel,
    Gear,
    Pulley,
    Rope,
    Motor,
    Friction,
    Mouse,
    Angle,
}

/// Classification of a limited degree of freedom, recomputed every step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LimitState {
    /// Within the limits, no limit impulse
    #[default]
    Inactive,
    /// At or below the lower limit; the impulse may only push up
    AtLower,
    /// At or above the upper limit; the impulse may only push down
    AtUpper,
    /// Lower and upper limits coincide
    Equal,
}

/// Island-local view of one body as seen by a joint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SolverBody {
    /// Slot in the island position/velocity arrays
    pub index: usize,
    /// Center of mass in body coordinates
    pub local_center: Vec2Fix,
    /// Inverse mass
    pub inv_mass: Fix64,
    /// Inverse rotational inertia
    pub inv_i: Fix64,
}

impl SolverBody {
    /// Mass, zero for static bodies.
    pub fn mass(&self) -> Fix64 {
        if self.inv_mass.is_positive() {
            Fix64::ONE / self.inv_mass
        } else {
            Fix64::ZERO
        }
    }
}

/// Bodies of a joint. `c` and `d` are only used by gear joints.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct JointBodies {
    pub a: SolverBody,
    pub b: SolverBody,
    pub c: SolverBody,
    pub d: SolverBody,
}

/// Island state shared by the joint and contact solvers.
#[derive(Debug)]
pub struct SolverData<'a> {
    /// Current step
    pub step: TimeStep,
    /// Correction limits
    pub config: &'a SolverConfig,
    /// Center-of-mass positions and angles
    pub positions: &'a mut [Position],
    /// Linear and angular velocities
    pub velocities: &'a mut [Velocity],
}

/// Sequential-impulse contract implemented by every joint kind.
pub trait JointSolver {
    /// Compute effective masses and apply the (scaled) warm-start impulse.
    fn init_velocity_constraints(&mut self, bodies: &JointBodies, data: &mut SolverData<'_>);

    /// One velocity iteration.
    fn solve_velocity_constraints(&mut self, data: &mut SolverData<'_>);

    /// One position iteration; `true` when the error is within tolerance.
    fn solve_position_constraints(&mut self, data: &mut SolverData<'_>) -> bool;

    /// Reaction force on body B at the anchor.
    fn reaction_force(&self, inv_dt: Fix64) -> Vec2Fix;

    /// Reaction torque on body B.
    fn reaction_torque(&self, inv_dt: Fix64) -> Fix64;

    /// World anchor on body A.
    fn anchor_a(&self, xf_a: &Transform) -> Vec2Fix;

    /// World anchor on body B.
    fn anchor_b(&self, xf_b: &Transform) -> Vec2Fix;

    /// Move world-space data after the world origin changed.
    fn shift_origin(&mut self, _new_origin: Vec2Fix) {}
}

macro_rules! joint_kinds {
    ($($variant:ident($ty:ident) => $as_ref:ident, $as_mut:ident;)*) => {
        /// Kind-specific parameters and solver state.
        #[derive(Clone, Copy, Debug)]
        pub enum JointKind {
            $(
                #[allow(missing_docs)]
                $variant($ty),
            )*
        }

        impl JointKind {
            /// Which kind this is
            pub fn joint_type(&self) -> JointType {
                match self {
                    $(Self::$variant(_) => JointType::$variant,)*
                }
            }

            /// Dynamic view of the solver contract
            pub fn solver(&self) -> &dyn JointSolver {
                match self {
                    $(Self::$variant(j) => j,)*
                }
            }

            /// Mutable dynamic view of the solver contract
            pub fn solver_mut(&mut self) -> &mut dyn JointSolver {
                match self {
                    $(Self::$variant(j) => j,)*
                }
            }

            $(
                #[allow(missing_docs)]
                pub fn $as_ref(&self) -> Option<&$ty> {
                    match self {
                        Self::$variant(j) => Some(j),
                        #[allow(unreachable_patterns)]
                        _ => None,
                    }
                }

                #[allow(missing_docs)]
                pub fn $as_mut(&mut self) -> Option<&mut $ty> {
                    match self {
                        Self::$variant(j) => Some(j),
                        #[allow(unreachable_patterns)]
                        _ => None,
                    }
                }
            )*
        }

        $(
            impl From<$ty> for JointKind {
                fn from(joint: $ty) -> Self {
                    Self::$variant(joint)
                }
            }
        )*
    };
}

joint_kinds! {
    Distance(DistanceJoint) => as_distance, as_distance_mut;
    Revolute(RevoluteJoint) => as_revolute, as_revolute_mut;
    Prismatic(PrismaticJoint) => as_prismatic, as_prismatic_mut;
    Weld(WeldJoint) => as_weld, as_weld_mut;
    Wheel(WheelJoint) => as_wheel, as_wheel_mut;
    Gear(GearJoint) => as_gear, as_gear_mut;
    Pulley(PulleyJoint) => as_pulley, as_pulley_mut;
    Rope(RopeJoint) => as_rope, as_rope_mut;
    Motor(MotorJoint) => as_motor, as_motor_mut;
    Friction(FrictionJoint) => as_friction, as_friction_mut;
    Mouse(MouseJoint) => as_mouse, as_mouse_mut;
    Angle(AngleJoint) => as_angle, as_angle_mut;
}

/// Everything needed to add a joint to the world.
#[derive(Clone, Copy, Debug)]
pub struct JointDef {
    /// First body (ground for mouse joints)
    pub body_a: BodyId,
    /// Second body
    pub body_b: BodyId,
    /// Let the two bodies keep colliding
    pub collide_connected: bool,
    /// Reaction force that disables the joint
    pub breakpoint: Option<Fix64>,
    /// Application data
    pub user_data: u64,
    /// Kind-specific parameters
    pub kind: JointKind,
}

impl JointDef {
    /// Joint between `body_a` and `body_b`.
    ///
    /// Gear joints take their bodies from the joints they couple; the ids
    /// given here are replaced when the joint is added.
    pub fn new(body_a: BodyId, body_b: BodyId, kind: impl Into<JointKind>) -> Self {
        Self {
            body_a,
            body_b,
            collide_connected: false,
            breakpoint: None,
            user_data: 0,
            kind: kind.into(),
        }
    }

    pub fn collide_connected(mut self, flag: bool) -> Self {
        self.collide_connected = flag;
        self
    }

    pub fn with_breakpoint(mut self, force: Fix64) -> Self {
        self.breakpoint = Some(force);
        self
    }

    pub fn with_user_data(mut self, user_data: u64) -> Self {
        self.user_data = user_data;
        self
    }

    /// Reject definitions the solver cannot run.
    pub fn validate(&self) -> Result<(), PhysicsError> {
        if self.body_a == self.body_b && self.kind.joint_type() != JointType::Gear {
            return Err(PhysicsError::InvalidConstraint {
                reason: "joint connects a body to itself",
            });
        }
        if let Some(force) = self.breakpoint {
            if force.is_negative() {
                return Err(PhysicsError::InvalidConstraint {
                    reason: "breakpoint must be >= 0",
                });
            }
        }
        match &self.kind {
            JointKind::Pulley(p) if !p.ratio().is_positive() => Err(PhysicsError::InvalidConstraint {
                reason: "pulley ratio must be positive",
            }),
            JointKind::Gear(g) if g.ratio().is_zero() => Err(PhysicsError::InvalidConstraint {
                reason: "gear ratio must be non-zero",
            }),
            JointKind::Mouse(m) if !m.frequency().is_positive() => Err(PhysicsError::InvalidConstraint {
                reason: "mouse joint needs a positive frequency",
            }),
            _ => Ok(()),
        }
    }
}

/// A joint owned by the world.
#[derive(Clone, Debug)]
pub struct Joint {
    pub(crate) id: JointId,
    pub(crate) body_a: BodyId,
    pub(crate) body_b: BodyId,
    pub(crate) collide_connected: bool,
    pub(crate) enabled: bool,
    pub(crate) breakpoint: Option<Fix64>,
    pub(crate) user_data: u64,
    pub(crate) kind: JointKind,
    pub(crate) island_flag: bool,
    pub(crate) in_world: bool,
}

impl Joint {
    pub(crate) fn new(id: JointId, def: &JointDef) -> Self {
        Self {
            id,
            body_a: def.body_a,
            body_b: def.body_b,
            collide_connected: def.collide_connected,
            enabled: true,
            breakpoint: def.breakpoint,
            user_data: def.user_data,
            kind: def.kind,
            island_flag: false,
            in_world: false,
        }
    }

    #[inline]
    pub fn id(&self) -> JointId {
        self.id
    }

    #[inline]
    pub fn body_a(&self) -> BodyId {
        self.body_a
    }

    #[inline]
    pub fn body_b(&self) -> BodyId {
        self.body_b
    }

    /// Id of the other body, if `body` is one of this joint's bodies.
    pub fn other(&self, body: BodyId) -> Option<BodyId> {
        if body == self.body_a {
            Some(self.body_b)
        } else if body == self.body_b {
            Some(self.body_a)
        } else {
            None
        }
    }

    #[inline]
    pub fn joint_type(&self) -> JointType {
        self.kind.joint_type()
    }

    #[inline]
    pub fn kind(&self) -> &JointKind {
        &self.kind
    }

    /// Mutable kind parameters. Prefer `World::joint_mut`, which also wakes
    /// the attached bodies.
    #[inline]
    pub fn kind_mut(&mut self) -> &mut JointKind {
        &mut self.kind
    }

    /// Disabled joints are not solved and stop filtering collisions.
    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[inline]
    pub fn collide_connected(&self) -> bool {
        self.collide_connected
    }

    #[inline]
    pub fn breakpoint(&self) -> Option<Fix64> {
        self.breakpoint
    }

    pub fn set_breakpoint(&mut self, force: Option<Fix64>) {
        self.breakpoint = force;
    }

    #[inline]
    pub fn user_data(&self) -> u64 {
        self.user_data
    }

    pub fn set_user_data(&mut self, user_data: u64) {
        self.user_data = user_data;
    }

    /// Was the joint admitted by `process_changes`?
    #[inline]
    pub fn is_in_world(&self) -> bool {
        self.in_world
    }

    /// Reaction force on body B, given the inverse step of the last step.
    pub fn reaction_force(&self, inv_dt: Fix64) -> Vec2Fix {
        self.kind.solver().reaction_force(inv_dt)
    }

    /// Reaction torque on body B.
    pub fn reaction_torque(&self, inv_dt: Fix64) -> Fix64 {
        self.kind.solver().reaction_torque(inv_dt)
    }

    /// World anchor on body A.
    pub fn anchor_a(&self, body_a: &Body) -> Vec2Fix {
        self.kind.solver().anchor_a(body_a.transform())
    }

    /// World anchor on body B.
    pub fn anchor_b(&self, body_b: &Body) -> Vec2Fix {
        self.kind.solver().anchor_b(body_b.transform())
    }

    /// Extra bodies that must share the island (gear joints).
    pub(crate) fn coupled_bodies(&self) -> Option<(BodyId, BodyId)> {
        match &self.kind {
            JointKind::Gear(g) => g.body_c().zip(g.body_d()),
            _ => None,
        }
    }
}

// ============================================================================
// Shared helpers
// ============================================================================

/// `(gamma, bias)` of a soft constraint with effective `mass` and position
/// error `c`. A non-positive frequency gives a rigid constraint.
pub(crate) fn soft_constraint(
    mass: Fix64,
    frequency_hz: Fix64,
    damping_ratio: Fix64,
    c: Fix64,
    h: Fix64,
) -> (Fix64, Fix64) {
    if !frequency_hz.is_positive() {
        return (Fix64::ZERO, Fix64::ZERO);
    }
    let omega = Fix64::TWO_PI * frequency_hz;
    let d = Fix64::TWO * mass * damping_ratio * omega;
    let k = mass * omega * omega;

    let gamma = h * (d + h * k);
    let gamma = if gamma.is_zero() { Fix64::ZERO } else { Fix64::ONE / gamma };
    (gamma, c * h * k * gamma)
}

/// Inverse of `x`, zero when `x` is zero.
#[inline]
pub(crate) fn inv_or_zero(x: Fix64) -> Fix64 {
    if x.is_zero() {
        Fix64::ZERO
    } else {
        Fix64::ONE / x
    }
}

/// Anchor relative to the center of mass, in world orientation.
#[inline]
pub(crate) fn lever(q: Rot, local_anchor: Vec2Fix, local_center: Vec2Fix) -> Vec2Fix {
    q.apply(local_anchor - local_center)
}

// ============================================================================
// Test rig
// ============================================================================

#[cfg(test)]
pub(crate) mod rig {
    //! Minimal island loop for exercising one joint in isolation.

    use super::*;

    pub(crate) struct Rig {
        pub positions: Vec<Position>,
        pub velocities: Vec<Velocity>,
        pub bodies: JointBodies,
        pub config: SolverConfig,
        pub gravity: Vec2Fix,
        pub step: TimeStep,
    }

    pub(crate) fn body(index: usize, inv_mass: Fix64, inv_i: Fix64) -> SolverBody {
        SolverBody {
            index,
            local_center: Vec2Fix::ZERO,
            inv_mass,
            inv_i,
        }
    }

    impl Rig {
        /// Static body at slot 0, unit-mass dynamic body at `position` in slot 1.
        pub fn pair(position: Vec2Fix) -> Self {
            let mut rig = Self::empty();
            rig.add(Vec2Fix::ZERO, Fix64::ZERO, Fix64::ZERO);
            rig.add(position, Fix64::ONE, Fix64::from_int(6));
            rig.bodies.a = body(0, Fix64::ZERO, Fix64::ZERO);
            rig.bodies.b = body(1, Fix64::ONE, Fix64::from_int(6));
            rig
        }

        pub fn empty() -> Self {
            Self {
                positions: Vec::new(),
                velocities: Vec::new(),
                bodies: JointBodies::default(),
                config: SolverConfig::default(),
                gravity: Vec2Fix::from_int(0, -10),
                step: TimeStep {
                    dt: Fix64::from_ratio(1, 60),
                    inv_dt: Fix64::from_int(60),
                    dt_ratio: Fix64::ONE,
                    velocity_iterations: 8,
                    position_iterations: 3,
                    warm_starting: true,
                },
            }
        }

        pub fn add(&mut self, c: Vec2Fix, inv_mass: Fix64, inv_i: Fix64) -> SolverBody {
            let index = self.positions.len();
            self.positions.push(Position { c, a: Fix64::ZERO });
            self.velocities.push(Velocity::default());
            body(index, inv_mass, inv_i)
        }

        fn inv_masses(&self) -> Vec<Fix64> {
            let mut m = vec![Fix64::ZERO; self.positions.len()];
            for b in [self.bodies.a, self.bodies.b, self.bodies.c, self.bodies.d] {
                if b.index < m.len() {
                    m[b.index] = m[b.index].max(b.inv_mass);
                }
            }
            m
        }

        pub fn data(&mut self) -> SolverData<'_> {
            SolverData {
                step: self.step,
                config: &self.config,
                positions: &mut self.positions,
                velocities: &mut self.velocities,
            }
        }

        /// Run `steps` full steps: gravity, velocity solve, integrate, position solve.
        pub fn run(&mut self, joint: &mut dyn JointSolver, steps: usize) {
            let inv_masses = self.inv_masses();
            let h = self.step.dt;
            for _ in 0..steps {
                for (v, m) in self.velocities.iter_mut().zip(&inv_masses) {
                    if m.is_positive() {
                        v.v += self.gravity * h;
                    }
                }
                let bodies = self.bodies;
                let iterations = self.step.velocity_iterations;
                let mut data = self.data();
                joint.init_velocity_constraints(&bodies, &mut data);
                for _ in 0..iterations {
                    joint.solve_velocity_constraints(&mut data);
                }
                for (p, v) in self.positions.iter_mut().zip(&self.velocities) {
                    p.c += v.v * h;
                    p.a += h * v.w;
                }
                for _ in 0..self.step.position_iterations {
                    let mut data = self.data();
                    if joint.solve_position_constraints(&mut data) {
                        break;
                    }
                }
            }
        }

        /// Transform of the body in `slot`, centers at the origin.
        pub fn transform(&self, slot: usize) -> Transform {
            Transform::new(self.positions[slot].c, self.positions[slot].a)
        }
    }
}
