//! Gear joint: couples the coordinates of two revolute or prismatic joints,
//! `coordinate_1 + ratio * coordinate_2 == constant`.
//!
//! Each coupled joint must connect its second body to a first body (usually
//! the ground). Bodies are named after the coupled joints: joint 1 links C to
//! A, joint 2 links D to B, and the gear itself acts between A and B. The
//! world resolves the coupled joints when the gear is added, and removing
//! either coupled joint removes the gear as well.

use super::{inv_or_zero, Joint, JointBodies, JointSolver, JointType, SolverBody, SolverData};
use crate::body::Body;
use crate::error::PhysicsError;
use crate::island::{Position, Velocity};
use crate::math::{Fix64, Rot, Transform, Vec2Fix};
use crate::pool::{BodyId, JointId, Pool, PoolKey};
use crate::settings::LINEAR_SLOP;

/// Parameters of one side of the gear, copied from a coupled joint.
#[derive(Clone, Copy, Debug)]
struct GearSide {
    joint_type: JointType,
    /// Anchor on the ground-side body (C or D)
    local_anchor_ground: Vec2Fix,
    /// Anchor on the geared body (A or B)
    local_anchor_body: Vec2Fix,
    /// Prismatic axis in the ground-side frame
    local_axis: Vec2Fix,
    reference_angle: Fix64,
}

impl GearSide {
    const UNRESOLVED: Self = Self {
        joint_type: JointType::Revolute,
        local_anchor_ground: Vec2Fix::ZERO,
        local_anchor_body: Vec2Fix::ZERO,
        local_axis: Vec2Fix::ZERO,
        reference_angle: Fix64::ZERO,
    };

    fn from_joint(joint: &Joint) -> Result<Self, PhysicsError> {
        if let Some(revolute) = joint.kind().as_revolute() {
            Ok(Self {
                joint_type: JointType::Revolute,
                local_anchor_ground: revolute.local_anchor_a(),
                local_anchor_body: revolute.local_anchor_b(),
                local_axis: Vec2Fix::ZERO,
                reference_angle: revolute.reference_angle(),
            })
        } else if let Some(prismatic) = joint.kind().as_prismatic() {
            Ok(Self {
                joint_type: JointType::Prismatic,
                local_anchor_ground: prismatic.local_anchor_a(),
                local_anchor_body: prismatic.local_anchor_b(),
                local_axis: prismatic.local_axis_a(),
                reference_angle: prismatic.reference_angle(),
            })
        } else {
            Err(PhysicsError::InvalidConstraint {
                reason: "gear joints couple revolute or prismatic joints only",
            })
        }
    }

    /// Joint coordinate from body-origin transforms.
    fn coordinate(&self, xf_ground: &Transform, xf_body: &Transform) -> Fix64 {
        match self.joint_type {
            JointType::Revolute => xf_body.q.angle() - xf_ground.q.angle() - self.reference_angle,
            _ => {
                let p_ground = self.local_anchor_ground;
                let p_body = xf_ground
                    .q
                    .apply_inv(xf_body.q.apply(self.local_anchor_body) + (xf_body.p - xf_ground.p));
                (p_body - p_ground).dot(self.local_axis)
            }
        }
    }
}

/// Jacobian of one gear side, already scaled by the ratio on side two.
#[derive(Clone, Copy, Debug, Default)]
struct SideJacobian {
    jv: Vec2Fix,
    jw_body: Fix64,
    jw_ground: Fix64,
    mass: Fix64,
    coordinate: Fix64,
}

#[derive(Clone, Copy, Debug)]
pub struct GearJoint {
    joint1: JointId,
    joint2: JointId,
    ratio: Fix64,

    side1: GearSide,
    side2: GearSide,
    body_c: Option<BodyId>,
    body_d: Option<BodyId>,
    constant: Fix64,

    impulse: Fix64,
    a: SolverBody,
    b: SolverBody,
    c: SolverBody,
    d: SolverBody,
    j1: SideJacobian,
    j2: SideJacobian,
    mass: Fix64,
}

impl GearJoint {
    /// Couple `joint1` and `joint2`. The body ids of the joint definition
    /// are replaced by the geared bodies when the joint is added.
    pub fn new(joint1: JointId, joint2: JointId, ratio: Fix64) -> Self {
        Self {
            joint1,
            joint2,
            ratio,
            side1: GearSide::UNRESOLVED,
            side2: GearSide::UNRESOLVED,
            body_c: None,
            body_d: None,
            constant: Fix64::ZERO,
            impulse: Fix64::ZERO,
            a: SolverBody::default(),
            b: SolverBody::default(),
            c: SolverBody::default(),
            d: SolverBody::default(),
            j1: SideJacobian::default(),
            j2: SideJacobian::default(),
            mass: Fix64::ZERO,
        }
    }

    pub fn joint1(&self) -> JointId {
        self.joint1
    }

    pub fn joint2(&self) -> JointId {
        self.joint2
    }

    pub fn ratio(&self) -> Fix64 {
        self.ratio
    }

    pub fn set_ratio(&mut self, ratio: Fix64) {
        assert!(ratio.is_valid() && !ratio.is_zero(), "gear ratio must be non-zero");
        self.ratio = ratio;
    }

    /// Ground-side body of joint 1, once resolved.
    pub fn body_c(&self) -> Option<BodyId> {
        self.body_c
    }

    /// Ground-side body of joint 2, once resolved.
    pub fn body_d(&self) -> Option<BodyId> {
        self.body_d
    }

    pub fn constant(&self) -> Fix64 {
        self.constant
    }

    /// Does this gear couple `joint`?
    pub fn couples(&self, joint: JointId) -> bool {
        self.joint1 == joint || self.joint2 == joint
    }

    /// Copy the coupled joints' frames and compute the gear constant from the
    /// current body transforms. Returns the geared bodies `(A, B)`.
    pub(crate) fn resolve(
        &mut self,
        joints: &Pool<JointId, Joint>,
        bodies: &Pool<BodyId, Body>,
    ) -> Result<(BodyId, BodyId), PhysicsError> {
        let lookup = |id: JointId| joints.get(id).ok_or(PhysicsError::InvalidJoint { index: id.index() });
        let body = |id: BodyId| bodies.get(id).ok_or(PhysicsError::InvalidBody { index: id.index() });

        let joint1 = lookup(self.joint1)?;
        let joint2 = lookup(self.joint2)?;
        let side1 = GearSide::from_joint(joint1)?;
        let side2 = GearSide::from_joint(joint2)?;

        let (c, a) = (joint1.body_a(), joint1.body_b());
        let (d, b) = (joint2.body_a(), joint2.body_b());

        let coordinate1 = side1.coordinate(body(c)?.transform(), body(a)?.transform());
        let coordinate2 = side2.coordinate(body(d)?.transform(), body(b)?.transform());

        self.side1 = side1;
        self.side2 = side2;
        self.body_c = Some(c);
        self.body_d = Some(d);
        self.constant = coordinate1 + self.ratio * coordinate2;
        Ok((a, b))
    }

    /// Jacobian of one side at the given positions. `ratio` is one for side 1.
    fn side_jacobian(
        side: &GearSide,
        ratio: Fix64,
        ground: &SolverBody,
        body: &SolverBody,
        p_ground: Position,
        p_body: Position,
    ) -> SideJacobian {
        match side.joint_type {
            JointType::Revolute => SideJacobian {
                jv: Vec2Fix::ZERO,
                jw_body: ratio,
                jw_ground: ratio,
                mass: ratio * ratio * (body.inv_i + ground.inv_i),
                coordinate: p_body.a - p_ground.a - side.reference_angle,
            },
            _ => {
                let q_ground = Rot::from_angle(p_ground.a);
                let q_body = Rot::from_angle(p_body.a);
                let u = q_ground.apply(side.local_axis);
                let r_ground = q_ground.apply(side.local_anchor_ground - ground.local_center);
                let r_body = q_body.apply(side.local_anchor_body - body.local_center);
                let jw_ground = ratio * r_ground.cross(u);
                let jw_body = ratio * r_body.cross(u);

                let p_g = side.local_anchor_ground - ground.local_center;
                let p_b = q_ground.apply_inv(r_body + (p_body.c - p_ground.c));

                SideJacobian {
                    jv: u * ratio,
                    jw_body,
                    jw_ground,
                    mass: ratio * ratio * (ground.inv_mass + body.inv_mass)
                        + ground.inv_i * jw_ground * jw_ground
                        + body.inv_i * jw_body * jw_body,
                    coordinate: (p_b - p_g).dot(side.local_axis),
                }
            }
        }
    }

    /// Apply `impulse` along the gear Jacobian. Bodies are updated one at a
    /// time so a ground body shared by both sides accumulates both terms.
    fn apply_velocity_impulse(&self, impulse: Fix64, velocities: &mut [Velocity]) {
        let terms = [
            (self.a, self.j1.jv, self.j1.jw_body),
            (self.b, self.j2.jv, self.j2.jw_body),
            (self.c, -self.j1.jv, -self.j1.jw_ground),
            (self.d, -self.j2.jv, -self.j2.jw_ground),
        ];
        for (body, jv, jw) in terms {
            let v = &mut velocities[body.index];
            v.v += jv * (body.inv_mass * impulse);
            v.w += body.inv_i * impulse * jw;
        }
    }
}

impl JointSolver for GearJoint {
    fn init_velocity_constraints(&mut self, bodies: &JointBodies, data: &mut SolverData<'_>) {
        self.a = bodies.a;
        self.b = bodies.b;
        self.c = bodies.c;
        self.d = bodies.d;

        let p = |s: SolverBody| data.positions[s.index];
        self.j1 = Self::side_jacobian(&self.side1, Fix64::ONE, &self.c, &self.a, p(self.c), p(self.a));
        self.j2 = Self::side_jacobian(&self.side2, self.ratio, &self.d, &self.b, p(self.d), p(self.b));
        self.mass = inv_or_zero(self.j1.mass + self.j2.mass);

        if data.step.warm_starting {
            self.impulse *= data.step.dt_ratio;
            self.apply_velocity_impulse(self.impulse, data.velocities);
        } else {
            self.impulse = Fix64::ZERO;
        }
    }

    fn solve_velocity_constraints(&mut self, data: &mut SolverData<'_>) {
        let va = data.velocities[self.a.index];
        let vb = data.velocities[self.b.index];
        let vc = data.velocities[self.c.index];
        let vd = data.velocities[self.d.index];

        let cdot = self.j1.jv.dot(va.v - vc.v)
            + self.j2.jv.dot(vb.v - vd.v)
            + (self.j1.jw_body * va.w - self.j1.jw_ground * vc.w)
            + (self.j2.jw_body * vb.w - self.j2.jw_ground * vd.w);

        let impulse = -self.mass * cdot;
        self.impulse += impulse;
        self.apply_velocity_impulse(impulse, data.velocities);
    }

    fn solve_position_constraints(&mut self, data: &mut SolverData<'_>) -> bool {
        let p = |s: SolverBody| data.positions[s.index];
        let j1 = Self::side_jacobian(&self.side1, Fix64::ONE, &self.c, &self.a, p(self.c), p(self.a));
        let j2 = Self::side_jacobian(&self.side2, self.ratio, &self.d, &self.b, p(self.d), p(self.b));

        // side_jacobian scales side 2 by the ratio, the raw coordinate is not
        let c = j1.coordinate + self.ratio * j2.coordinate - self.constant;
        let mass = j1.mass + j2.mass;
        let impulse = if mass.is_positive() { -c / mass } else { Fix64::ZERO };

        let terms = [
            (self.a, j1.jv, j1.jw_body),
            (self.b, j2.jv, j2.jw_body),
            (self.c, -j1.jv, -j1.jw_ground),
            (self.d, -j2.jv, -j2.jw_ground),
        ];
        for (body, jv, jw) in terms {
            let pos = &mut data.positions[body.index];
            pos.c += jv * (body.inv_mass * impulse);
            pos.a += body.inv_i * impulse * jw;
        }

        c.abs() < LINEAR_SLOP
    }

    fn reaction_force(&self, inv_dt: Fix64) -> Vec2Fix {
        self.j1.jv * (inv_dt * self.impulse)
    }

    fn reaction_torque(&self, inv_dt: Fix64) -> Fix64 {
        inv_dt * self.impulse * self.j1.jw_body
    }

    fn anchor_a(&self, xf_a: &Transform) -> Vec2Fix {
        xf_a.apply(self.side1.local_anchor_body)
    }

    fn anchor_b(&self, xf_b: &Transform) -> Vec2Fix {
        xf_b.apply(self.side2.local_anchor_body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::BodyDef;
    use crate::joint::rig::{body, Rig};
    use crate::joint::{JointDef, PrismaticJoint, RevoluteJoint, WeldJoint};

    struct Scene {
        bodies: Pool<BodyId, Body>,
        joints: Pool<JointId, Joint>,
        ground: BodyId,
        a: BodyId,
        b: BodyId,
    }

    fn scene() -> Scene {
        let mut bodies = Pool::new();
        let ground = bodies.insert_with(|id| Body::new(id, &BodyDef::default()));
        let a = bodies.insert_with(|id| Body::new(id, &BodyDef::dynamic().with_position(Vec2Fix::from_int(-2, 0))));
        let b = bodies.insert_with(|id| Body::new(id, &BodyDef::dynamic().with_position(Vec2Fix::from_int(2, 0))));
        Scene {
            bodies,
            joints: Pool::new(),
            ground,
            a,
            b,
        }
    }

    fn add(scene: &mut Scene, def: JointDef) -> JointId {
        let id = scene.joints.insert_with(|id| Joint::new(id, &def));
        scene.joints[id].in_world = true;
        id
    }

    fn gear_rig() -> Rig {
        let mut rig = Rig::empty();
        rig.gravity = Vec2Fix::ZERO;
        rig.add(Vec2Fix::ZERO, Fix64::ZERO, Fix64::ZERO);
        rig.add(Vec2Fix::from_int(-2, 0), Fix64::ONE, Fix64::from_int(6));
        rig.add(Vec2Fix::from_int(2, 0), Fix64::ONE, Fix64::from_int(6));
        rig.bodies.c = body(0, Fix64::ZERO, Fix64::ZERO);
        rig.bodies.d = body(0, Fix64::ZERO, Fix64::ZERO);
        rig.bodies.a = body(1, Fix64::ONE, Fix64::from_int(6));
        rig.bodies.b = body(2, Fix64::ONE, Fix64::from_int(6));
        rig
    }

    #[test]
    fn test_resolve_picks_bodies_from_coupled_joints() {
        let mut s = scene();
        let (g, a, b) = (s.ground, s.a, s.b);
        let j1 = add(&mut s, JointDef::new(g, a, RevoluteJoint::new(Vec2Fix::from_int(-2, 0), Vec2Fix::ZERO, Fix64::ZERO)));
        let j2 = add(&mut s, JointDef::new(g, b, RevoluteJoint::new(Vec2Fix::from_int(2, 0), Vec2Fix::ZERO, Fix64::ZERO)));

        let mut gear = GearJoint::new(j1, j2, Fix64::TWO);
        assert_eq!(gear.body_c(), None);
        let (ra, rb) = gear.resolve(&s.joints, &s.bodies).unwrap();
        assert_eq!((ra, rb), (a, b));
        assert_eq!(gear.body_c(), Some(g));
        assert_eq!(gear.body_d(), Some(g));
        assert_eq!(gear.constant(), Fix64::ZERO);
        assert!(gear.couples(j1) && gear.couples(j2));
    }

    #[test]
    fn test_resolve_rejects_other_kinds() {
        let mut s = scene();
        let (g, a, b) = (s.ground, s.a, s.b);
        let j1 = add(&mut s, JointDef::new(g, a, WeldJoint::new(Vec2Fix::ZERO, Vec2Fix::ZERO, Fix64::ZERO)));
        let j2 = add(&mut s, JointDef::new(g, b, RevoluteJoint::new(Vec2Fix::ZERO, Vec2Fix::ZERO, Fix64::ZERO)));
        let mut gear = GearJoint::new(j1, j2, Fix64::ONE);
        assert!(matches!(
            gear.resolve(&s.joints, &s.bodies),
            Err(PhysicsError::InvalidConstraint { .. })
        ));

        s.joints.remove(j2);
        let mut gear = GearJoint::new(j2, j2, Fix64::ONE);
        assert!(matches!(
            gear.resolve(&s.joints, &s.bodies),
            Err(PhysicsError::InvalidJoint { .. })
        ));
    }

    #[test]
    fn test_revolute_pair_keeps_ratio() {
        let mut s = scene();
        let (g, a, b) = (s.ground, s.a, s.b);
        let j1 = add(&mut s, JointDef::new(g, a, RevoluteJoint::new(Vec2Fix::from_int(-2, 0), Vec2Fix::ZERO, Fix64::ZERO)));
        let j2 = add(&mut s, JointDef::new(g, b, RevoluteJoint::new(Vec2Fix::from_int(2, 0), Vec2Fix::ZERO, Fix64::ZERO)));
        let mut gear = GearJoint::new(j1, j2, Fix64::TWO);
        gear.resolve(&s.joints, &s.bodies).unwrap();

        let mut rig = gear_rig();
        rig.velocities[1].w = Fix64::ONE;
        rig.run(&mut gear, 30);

        let (wa, wb) = (rig.velocities[1].w, rig.velocities[2].w);
        assert!((wa + Fix64::TWO * wb).abs() < Fix64::from_ratio(1, 1000), "wa={wa} wb={wb}");
        // Single impulse: 1 / (6 + 4 * 6) = 1/30
        assert!((wa - Fix64::from_ratio(8, 10)).abs() < Fix64::from_ratio(1, 100));
        let (aa, ab) = (rig.positions[1].a, rig.positions[2].a);
        assert!((aa + Fix64::TWO * ab).abs() < Fix64::from_ratio(1, 100));
    }

    #[test]
    fn test_rack_and_pinion() {
        let mut s = scene();
        let (g, a, b) = (s.ground, s.a, s.b);
        let j1 = add(&mut s, JointDef::new(g, a, RevoluteJoint::new(Vec2Fix::from_int(-2, 0), Vec2Fix::ZERO, Fix64::ZERO)));
        let j2 = add(
            &mut s,
            JointDef::new(g, b, PrismaticJoint::new(Vec2Fix::from_int(2, 0), Vec2Fix::ZERO, Vec2Fix::UNIT_X, Fix64::ZERO)),
        );
        let mut gear = GearJoint::new(j1, j2, Fix64::ONE);
        gear.resolve(&s.joints, &s.bodies).unwrap();

        let mut rig = gear_rig();
        rig.velocities[2].v = Vec2Fix::from_int(1, 0);
        rig.run(&mut gear, 1);

        // w_a + v_b.x stays zero
        let (wa, vb) = (rig.velocities[1].w, rig.velocities[2].v.x);
        assert!((wa + vb).abs() < Fix64::from_ratio(1, 1000), "wa={wa} vb={vb}");
        assert!(vb < Fix64::ONE);
    }
}
