//! Distance joint: keeps two anchor points at a fixed distance, rigidly or
//! as a damped spring.

use super::{inv_or_zero, lever, soft_constraint, JointBodies, JointSolver, SolverBody, SolverData};
use crate::body::Body;
use crate::island::{Position, Velocity};
use crate::math::{Fix64, Rot, Transform, Vec2Fix};
use crate::settings::LINEAR_SLOP;

/// Rod or spring between two anchors.
#[derive(Clone, Copy, Debug)]
pub struct DistanceJoint {
    local_anchor_a: Vec2Fix,
    local_anchor_b: Vec2Fix,
    length: Fix64,
    frequency_hz: Fix64,
    damping_ratio: Fix64,

    impulse: Fix64,
    gamma: Fix64,
    bias: Fix64,
    a: SolverBody,
    b: SolverBody,
    u: Vec2Fix,
    r_a: Vec2Fix,
    r_b: Vec2Fix,
    mass: Fix64,
}

impl DistanceJoint {
    /// Rigid rod of `length` between body-local anchors.
    pub fn new(local_anchor_a: Vec2Fix, local_anchor_b: Vec2Fix, length: Fix64) -> Self {
        Self {
            local_anchor_a,
            local_anchor_b,
            length: length.max(LINEAR_SLOP),
            frequency_hz: Fix64::ZERO,
            damping_ratio: Fix64::ZERO,
            impulse: Fix64::ZERO,
            gamma: Fix64::ZERO,
            bias: Fix64::ZERO,
            a: SolverBody::default(),
            b: SolverBody::default(),
            u: Vec2Fix::ZERO,
            r_a: Vec2Fix::ZERO,
            r_b: Vec2Fix::ZERO,
            mass: Fix64::ZERO,
        }
    }

    /// Rod between two world anchors at their current distance.
    pub fn from_world_anchors(body_a: &Body, body_b: &Body, anchor_a: Vec2Fix, anchor_b: Vec2Fix) -> Self {
        Self::new(
            body_a.local_point(anchor_a),
            body_b.local_point(anchor_b),
            (anchor_b - anchor_a).length(),
        )
    }

    /// Make the joint a spring. Zero frequency keeps it rigid.
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

    pub fn length(&self) -> Fix64 {
        self.length
    }

    pub fn set_length(&mut self, length: Fix64) {
        self.length = length.max(LINEAR_SLOP);
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
}

impl JointSolver for DistanceJoint {
    fn init_velocity_constraints(&mut self, bodies: &JointBodies, data: &mut SolverData<'_>) {
        self.a = bodies.a;
        self.b = bodies.b;
        let (m_a, m_b, i_a, i_b) = (self.a.inv_mass, self.b.inv_mass, self.a.inv_i, self.b.inv_i);

        let Position { c: c_a, a: a_a } = data.positions[self.a.index];
        let Velocity { v: mut v_a, w: mut w_a } = data.velocities[self.a.index];
        let Position { c: c_b, a: a_b } = data.positions[self.b.index];
        let Velocity { v: mut v_b, w: mut w_b } = data.velocities[self.b.index];

        self.r_a = lever(Rot::from_angle(a_a), self.local_anchor_a, self.a.local_center);
        self.r_b = lever(Rot::from_angle(a_b), self.local_anchor_b, self.b.local_center);
        let d = c_b + self.r_b - c_a - self.r_a;

        // Handle singularity
        let length = d.length();
        self.u = if length > LINEAR_SLOP { d / length } else { Vec2Fix::ZERO };

        let cr_a = self.r_a.cross(self.u);
        let cr_b = self.r_b.cross(self.u);
        let mut inv_mass = m_a + i_a * cr_a * cr_a + m_b + i_b * cr_b * cr_b;
        self.mass = inv_or_zero(inv_mass);

        if self.frequency_hz.is_positive() {
            let (gamma, bias) = soft_constraint(
                self.mass,
                self.frequency_hz,
                self.damping_ratio,
                length - self.length,
                data.step.dt,
            );
            self.gamma = gamma;
            self.bias = bias;
            inv_mass += gamma;
            self.mass = inv_or_zero(inv_mass);
        } else {
            self.gamma = Fix64::ZERO;
            self.bias = Fix64::ZERO;
        }

        if data.step.warm_starting {
            // Scale the impulse to support a variable time step
            self.impulse *= data.step.dt_ratio;
            let p = self.u * self.impulse;
            v_a -= p * m_a;
            w_a -= i_a * self.r_a.cross(p);
            v_b += p * m_b;
            w_b += i_b * self.r_b.cross(p);
        } else {
            self.impulse = Fix64::ZERO;
        }

        data.velocities[self.a.index] = Velocity { v: v_a, w: w_a };
        data.velocities[self.b.index] = Velocity { v: v_b, w: w_b };
    }

    fn solve_velocity_constraints(&mut self, data: &mut SolverData<'_>) {
        let (m_a, m_b, i_a, i_b) = (self.a.inv_mass, self.b.inv_mass, self.a.inv_i, self.b.inv_i);
        let Velocity { v: mut v_a, w: mut w_a } = data.velocities[self.a.index];
        let Velocity { v: mut v_b, w: mut w_b } = data.velocities[self.b.index];

        // Cdot = dot(u, v + cross(w, r))
        let vp_a = v_a + Vec2Fix::scalar_cross(w_a, self.r_a);
        let vp_b = v_b + Vec2Fix::scalar_cross(w_b, self.r_b);
        let cdot = self.u.dot(vp_b - vp_a);

        let impulse = -self.mass * (cdot + self.bias + self.gamma * self.impulse);
        self.impulse += impulse;

        let p = self.u * impulse;
        v_a -= p * m_a;
        w_a -= i_a * self.r_a.cross(p);
        v_b += p * m_b;
        w_b += i_b * self.r_b.cross(p);

        data.velocities[self.a.index] = Velocity { v: v_a, w: w_a };
        data.velocities[self.b.index] = Velocity { v: v_b, w: w_b };
    }

    fn solve_position_constraints(&mut self, data: &mut SolverData<'_>) -> bool {
        if self.frequency_hz.is_positive() {
            // There is no position correction for soft distance constraints
            return true;
        }
        let (m_a, m_b, i_a, i_b) = (self.a.inv_mass, self.b.inv_mass, self.a.inv_i, self.b.inv_i);
        let Position { c: mut c_a, a: mut a_a } = data.positions[self.a.index];
        let Position { c: mut c_b, a: mut a_b } = data.positions[self.b.index];

        let r_a = lever(Rot::from_angle(a_a), self.local_anchor_a, self.a.local_center);
        let r_b = lever(Rot::from_angle(a_b), self.local_anchor_b, self.b.local_center);
        let (u, length) = (c_b + r_b - c_a - r_a).normalize_with_length();
        let max = data.config.max_linear_correction;
        let c = (length - self.length).clamp(-max, max);

        let impulse = -self.mass * c;
        let p = u * impulse;

        c_a -= p * m_a;
        a_a -= i_a * r_a.cross(p);
        c_b += p * m_b;
        a_b += i_b * r_b.cross(p);

        data.positions[self.a.index] = Position { c: c_a, a: a_a };
        data.positions[self.b.index] = Position { c: c_b, a: a_b };

        c.abs() < LINEAR_SLOP
    }

    fn reaction_force(&self, inv_dt: Fix64) -> Vec2Fix {
        self.u * (inv_dt * self.impulse)
    }

    fn reaction_torque(&self, _inv_dt: Fix64) -> Fix64 {
        Fix64::ZERO
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
    fn test_pendulum_keeps_length() {
        let mut rig = Rig::pair(Vec2Fix::from_int(2, 0));
        let mut joint = DistanceJoint::new(Vec2Fix::ZERO, Vec2Fix::ZERO, Fix64::TWO);
        rig.run(&mut joint, 60);

        let d = (rig.positions[1].c - rig.positions[0].c).length();
        assert!((d - Fix64::TWO).abs() < Fix64::from_ratio(1, 100), "d={d}");
        // Swung below the pivot
        assert!(rig.positions[1].c.y < Fix64::ZERO);
        assert!(joint.reaction_force(rig.step.inv_dt).length() > Fix64::ZERO);
    }

    #[test]
    fn test_spring_stretches_under_load() {
        let mut rig = Rig::pair(Vec2Fix::from_int(0, -1));
        let mut joint =
            DistanceJoint::new(Vec2Fix::ZERO, Vec2Fix::ZERO, Fix64::ONE).with_spring(Fix64::ONE, Fix64::ONE);
        rig.run(&mut joint, 30);
        assert!(rig.positions[1].c.y < Fix64::from_int(-1));
        assert!(joint.solve_position_constraints(&mut rig.data()));
    }

    #[test]
    fn test_length_clamped_to_slop() {
        let mut joint = DistanceJoint::new(Vec2Fix::ZERO, Vec2Fix::ZERO, Fix64::ZERO);
        assert_eq!(joint.length(), LINEAR_SLOP);
        joint.set_length(Fix64::from_int(3));
        assert_eq!(joint.length(), Fix64::from_int(3));
    }
}
