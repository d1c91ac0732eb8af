//! Weld joint: glues two bodies together. A positive frequency makes the
//! angular part a damped spring.

use super::{inv_or_zero, lever, soft_constraint, JointBodies, JointSolver, SolverBody, SolverData};
use crate::body::Body;
use crate::island::{Position, Velocity};
use crate::math::{Fix64, Mat33, Rot, Transform, Vec2Fix, Vec3Fix};
use crate::settings::{ANGULAR_SLOP, LINEAR_SLOP};

#[derive(Clone, Copy, Debug)]
pub struct WeldJoint {
    local_anchor_a: Vec2Fix,
    local_anchor_b: Vec2Fix,
    reference_angle: Fix64,
    frequency_hz: Fix64,
    damping_ratio: Fix64,

    impulse: Vec3Fix,
    gamma: Fix64,
    bias: Fix64,
    a: SolverBody,
    b: SolverBody,
    r_a: Vec2Fix,
    r_b: Vec2Fix,
    mass: Mat33,
}

impl WeldJoint {
    pub fn new(local_anchor_a: Vec2Fix, local_anchor_b: Vec2Fix, reference_angle: Fix64) -> Self {
        Self {
            local_anchor_a,
            local_anchor_b,
            reference_angle,
            frequency_hz: Fix64::ZERO,
            damping_ratio: Fix64::ZERO,
            impulse: Vec3Fix::ZERO,
            gamma: Fix64::ZERO,
            bias: Fix64::ZERO,
            a: SolverBody::default(),
            b: SolverBody::default(),
            r_a: Vec2Fix::ZERO,
            r_b: Vec2Fix::ZERO,
            mass: Mat33::ZERO,
        }
    }

    /// Weld at a world anchor, keeping the current relative angle.
    pub fn from_world_anchor(body_a: &Body, body_b: &Body, anchor: Vec2Fix) -> Self {
        Self::new(
            body_a.local_point(anchor),
            body_b.local_point(anchor),
            body_b.angle() - body_a.angle(),
        )
    }

    /// Soften the angular constraint.
    pub fn with_spring(mut self, frequency_hz: Fix64, damping_ratio: Fix64) -> Self {
        self.frequency_hz = frequency_hz;
        self.damping_ratio = damping_ratio;
        self
    }

    pub fn local_anchor_a(&self) -> Vec2Fix {
        self.local_anchor_a
    }

    pub fn local_anchor_b(&self) -> Vec2Fix {
        self.local_anchor_b
    }

    pub fn reference_angle(&self) -> Fix64 {
        self.reference_angle
    }

    pub fn frequency(&self) -> Fix64 {
        self.frequency_hz
    }

    pub fn set_frequency(&mut self, hz: Fix64) {
        self.frequency_hz = hz;
    }

    pub fn damping_ratio(&self) -> Fix64 {
        self.damping_ratio
    }

    pub fn set_damping_ratio(&mut self, ratio: Fix64) {
        self.damping_ratio = ratio;
    }

    fn mass_matrix(&self, r_a: Vec2Fix, r_b: Vec2Fix) -> Mat33 {
        let (m_a, m_b, i_a, i_b) = (self.a.inv_mass, self.b.inv_mass, self.a.inv_i, self.b.inv_i);
        let ex = Vec3Fix::new(
            m_a + m_b + r_a.y * r_a.y * i_a + r_b.y * r_b.y * i_b,
            -r_a.y * r_a.x * i_a - r_b.y * r_b.x * i_b,
            -r_a.y * i_a - r_b.y * i_b,
        );
        let ey = Vec3Fix::new(
            ex.y,
            m_a + m_b + r_a.x * r_a.x * i_a + r_b.x * r_b.x * i_b,
            r_a.x * i_a + r_b.x * i_b,
        );
        let ez = Vec3Fix::new(ex.z, ey.z, i_a + i_b);
        Mat33 { ex, ey, ez }
    }
}

impl JointSolver for WeldJoint {
    fn init_velocity_constraints(&mut self, bodies: &JointBodies, data: &mut SolverData<'_>) {
        self.a = bodies.a;
        self.b = bodies.b;
        let (m_a, m_b, i_a, i_b) = (self.a.inv_mass, self.b.inv_mass, self.a.inv_i, self.b.inv_i);

        let a_a = data.positions[self.a.index].a;
        let Velocity { v: mut v_a, w: mut w_a } = data.velocities[self.a.index];
        let a_b = data.positions[self.b.index].a;
        let Velocity { v: mut v_b, w: mut w_b } = data.velocities[self.b.index];

        self.r_a = lever(Rot::from_angle(a_a), self.local_anchor_a, self.a.local_center);
        self.r_b = lever(Rot::from_angle(a_b), self.local_anchor_b, self.b.local_center);

        let k = self.mass_matrix(self.r_a, self.r_b);

        if self.frequency_hz.is_positive() {
            self.mass = k.inverse22();

            let inv_m = i_a + i_b;
            let m = inv_or_zero(inv_m);
            let c = a_b - a_a - self.reference_angle;
            let (gamma, bias) = soft_constraint(m, self.frequency_hz, self.damping_ratio, c, data.step.dt);
            self.gamma = gamma;
            self.bias = bias;
            self.mass.ez.z = inv_or_zero(inv_m + gamma);
        } else if k.ez.z.is_zero() {
            self.mass = k.inverse22();
            self.gamma = Fix64::ZERO;
            self.bias = Fix64::ZERO;
        } else {
            self.mass = k.sym_inverse33();
            self.gamma = Fix64::ZERO;
            self.bias = Fix64::ZERO;
        }

        if data.step.warm_starting {
            // Scale impulses to support a variable time step
            self.impulse = self.impulse * data.step.dt_ratio;
            let p = Vec2Fix::new(self.impulse.x, self.impulse.y);

            v_a -= p * m_a;
            w_a -= i_a * (self.r_a.cross(p) + self.impulse.z);
            v_b += p * m_b;
            w_b += i_b * (self.r_b.cross(p) + self.impulse.z);
        } else {
            self.impulse = Vec3Fix::ZERO;
        }

        data.velocities[self.a.index] = Velocity { v: v_a, w: w_a };
        data.velocities[self.b.index] = Velocity { v: v_b, w: w_b };
    }

    fn solve_velocity_constraints(&mut self, data: &mut SolverData<'_>) {
        let (m_a, m_b, i_a, i_b) = (self.a.inv_mass, self.b.inv_mass, self.a.inv_i, self.b.inv_i);
        let Velocity { v: mut v_a, w: mut w_a } = data.velocities[self.a.index];
        let Velocity { v: mut v_b, w: mut w_b } = data.velocities[self.b.index];
        let (r_a, r_b) = (self.r_a, self.r_b);

        if self.frequency_hz.is_positive() {
            let cdot2 = w_b - w_a;
            let impulse2 = -self.mass.ez.z * (cdot2 + self.bias + self.gamma * self.impulse.z);
            self.impulse.z += impulse2;

            w_a -= i_a * impulse2;
            w_b += i_b * impulse2;

            let cdot1 = v_b + Vec2Fix::scalar_cross(w_b, r_b) - v_a - Vec2Fix::scalar_cross(w_a, r_a);
            let impulse1 = -self.mass.mul_vec22(cdot1);
            self.impulse.x += impulse1.x;
            self.impulse.y += impulse1.y;

            v_a -= impulse1 * m_a;
            w_a -= i_a * r_a.cross(impulse1);
            v_b += impulse1 * m_b;
            w_b += i_b * r_b.cross(impulse1);
        } else {
            let cdot1 = v_b + Vec2Fix::scalar_cross(w_b, r_b) - v_a - Vec2Fix::scalar_cross(w_a, r_a);
            let cdot2 = w_b - w_a;
            let cdot = Vec3Fix::new(cdot1.x, cdot1.y, cdot2);

            let impulse = -self.mass.mul_vec(cdot);
            self.impulse = self.impulse + impulse;

            let p = Vec2Fix::new(impulse.x, impulse.y);
            v_a -= p * m_a;
            w_a -= i_a * (r_a.cross(p) + impulse.z);
            v_b += p * m_b;
            w_b += i_b * (r_b.cross(p) + impulse.z);
        }

        data.velocities[self.a.index] = Velocity { v: v_a, w: w_a };
        data.velocities[self.b.index] = Velocity { v: v_b, w: w_b };
    }

    fn solve_position_constraints(&mut self, data: &mut SolverData<'_>) -> bool {
        let (m_a, m_b, i_a, i_b) = (self.a.inv_mass, self.b.inv_mass, self.a.inv_i, self.b.inv_i);
        let Position { c: mut c_a, a: mut a_a } = data.positions[self.a.index];
        let Position { c: mut c_b, a: mut a_b } = data.positions[self.b.index];

        let r_a = lever(Rot::from_angle(a_a), self.local_anchor_a, self.a.local_center);
        let r_b = lever(Rot::from_angle(a_b), self.local_anchor_b, self.b.local_center);
        let k = self.mass_matrix(r_a, r_b);

        let c1 = c_b + r_b - c_a - r_a;
        let position_error = c1.length();
        let angular_error;

        if self.frequency_hz.is_positive() {
            angular_error = Fix64::ZERO;
            let p = -k.solve22(c1);

            c_a -= p * m_a;
            a_a -= i_a * r_a.cross(p);
            c_b += p * m_b;
            a_b += i_b * r_b.cross(p);
        } else {
            let c2 = a_b - a_a - self.reference_angle;
            angular_error = c2.abs();

            let impulse = if k.ez.z.is_positive() {
                -k.solve33(Vec3Fix::new(c1.x, c1.y, c2))
            } else {
                let impulse2 = -k.solve22(c1);
                Vec3Fix::new(impulse2.x, impulse2.y, Fix64::ZERO)
            };

            let p = Vec2Fix::new(impulse.x, impulse.y);
            c_a -= p * m_a;
            a_a -= i_a * (r_a.cross(p) + impulse.z);
            c_b += p * m_b;
            a_b += i_b * (r_b.cross(p) + impulse.z);
        }

        data.positions[self.a.index] = Position { c: c_a, a: a_a };
        data.positions[self.b.index] = Position { c: c_b, a: a_b };

        position_error <= LINEAR_SLOP && angular_error <= ANGULAR_SLOP
    }

    fn reaction_force(&self, inv_dt: Fix64) -> Vec2Fix {
        Vec2Fix::new(self.impulse.x, self.impulse.y) * inv_dt
    }

    fn reaction_torque(&self, inv_dt: Fix64) -> Fix64 {
        inv_dt * self.impulse.z
    }

    fn anchor_a(&self, xf_a: &Transform) -> Vec2Fix {
        xf_a.apply(self.local_anchor_a)
    }

    fn anchor_b(&self, xf_b: &Transform) -> Vec2Fix {
        xf_b.apply(self.local_anchor_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::joint::rig::Rig;

    #[test]
    fn test_cantilever_holds_pose() {
        let mut rig = Rig::pair(Vec2Fix::from_int(1, 0));
        let mut joint = WeldJoint::new(Vec2Fix::ZERO, Vec2Fix::from_int(-1, 0), Fix64::ZERO);
        rig.run(&mut joint, 60);
        let p = rig.positions[1];
        assert!((p.c - Vec2Fix::from_int(1, 0)).length() < Fix64::from_ratio(2, 100), "{p:?}");
        assert!(p.a.abs() < Fix64::from_ratio(2, 100));
        // Holding a unit mass against gravity
        let force = joint.reaction_force(rig.step.inv_dt);
        assert!((force.y - Fix64::from_int(10)).abs() < Fix64::ONE, "{force:?}");
    }

    #[test]
    fn test_soft_weld_sags_but_holds_anchor() {
        let mut rig = Rig::pair(Vec2Fix::from_int(1, 0));
        let mut joint =
            WeldJoint::new(Vec2Fix::ZERO, Vec2Fix::from_int(-1, 0), Fix64::ZERO).with_spring(Fix64::ONE, Fix64::ONE);
        rig.run(&mut joint, 30);
        assert!(rig.positions[1].a < Fix64::from_ratio(-5, 100));
        let anchor = joint.anchor_b(&rig.transform(1));
        assert!(anchor.length() < Fix64::from_ratio(2, 100));
    }
}
