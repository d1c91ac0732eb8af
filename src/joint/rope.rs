//! Rope joint: an upper bound on the distance between two anchors.

use super::{inv_or_zero, lever, JointBodies, JointSolver, LimitState, SolverBody, SolverData};
use crate::island::{Position, Velocity};
use crate::math::{Fix64, Rot, Transform, Vec2Fix};
use crate::settings::LINEAR_SLOP;

#[derive(Clone, Copy, Debug)]
pub struct RopeJoint {
    local_anchor_a: Vec2Fix,
    local_anchor_b: Vec2Fix,
    max_length: Fix64,

    impulse: Fix64,
    length: Fix64,
    state: LimitState,
    a: SolverBody,
    b: SolverBody,
    u: Vec2Fix,
    r_a: Vec2Fix,
    r_b: Vec2Fix,
    mass: Fix64,
}

impl RopeJoint {
    pub fn new(local_anchor_a: Vec2Fix, local_anchor_b: Vec2Fix, max_length: Fix64) -> Self {
        Self {
            local_anchor_a,
            local_anchor_b,
            max_length,
            impulse: Fix64::ZERO,
            length: Fix64::ZERO,
            state: LimitState::Inactive,
            a: SolverBody::default(),
            b: SolverBody::default(),
            u: Vec2Fix::ZERO,
            r_a: Vec2Fix::ZERO,
            r_b: Vec2Fix::ZERO,
            mass: Fix64::ZERO,
        }
    }

    pub fn local_anchor_a(&self) -> Vec2Fix {
        self.local_anchor_a
    }

    pub fn local_anchor_b(&self) -> Vec2Fix {
        self.local_anchor_b
    }

    pub fn max_length(&self) -> Fix64 {
        self.max_length
    }

    pub fn set_max_length(&mut self, length: Fix64) {
        self.max_length = length;
    }

    /// `AtUpper` while the rope is taut.
    pub fn limit_state(&self) -> LimitState {
        self.state
    }

    /// Accumulated tension impulse; never positive.
    pub fn limit_impulse(&self) -> Fix64 {
        self.impulse
    }
}

impl JointSolver for RopeJoint {
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

        self.length = d.length();
        self.state = if self.length > self.max_length {
            LimitState::AtUpper
        } else {
            LimitState::Inactive
        };

        if self.length > LINEAR_SLOP {
            self.u = d / self.length;
        } else {
            self.u = Vec2Fix::ZERO;
            self.mass = Fix64::ZERO;
            self.impulse = Fix64::ZERO;
            return;
        }

        // Compute effective mass
        let cr_a = self.r_a.cross(self.u);
        let cr_b = self.r_b.cross(self.u);
        self.mass = inv_or_zero(m_a + i_a * cr_a * cr_a + m_b + i_b * cr_b * cr_b);

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
        let c = self.length - self.max_length;
        let mut cdot = self.u.dot(vp_b - vp_a);

        // Predictive constraint
        if c.is_negative() {
            cdot += data.step.inv_dt * c;
        }

        let impulse = -self.mass * cdot;
        let old = self.impulse;
        self.impulse = (old + impulse).min(Fix64::ZERO);
        let impulse = self.impulse - old;

        let p = self.u * impulse;
        v_a -= p * m_a;
        w_a -= i_a * self.r_a.cross(p);
        v_b += p * m_b;
        w_b += i_b * self.r_b.cross(p);

        data.velocities[self.a.index] = Velocity { v: v_a, w: w_a };
        data.velocities[self.b.index] = Velocity { v: v_b, w: w_b };
    }

    fn solve_position_constraints(&mut self, data: &mut SolverData<'_>) -> bool {
        let (m_a, m_b, i_a, i_b) = (self.a.inv_mass, self.b.inv_mass, self.a.inv_i, self.b.inv_i);
        let Position { c: mut c_a, a: mut a_a } = data.positions[self.a.index];
        let Position { c: mut c_b, a: mut a_b } = data.positions[self.b.index];

        let r_a = lever(Rot::from_angle(a_a), self.local_anchor_a, self.a.local_center);
        let r_b = lever(Rot::from_angle(a_b), self.local_anchor_b, self.b.local_center);
        let (u, length) = (c_b + r_b - c_a - r_a).normalize_with_length();
        let c = (length - self.max_length).clamp(Fix64::ZERO, data.config.max_linear_correction);

        let impulse = -self.mass * c;
        let p = u * impulse;

        c_a -= p * m_a;
        a_a -= i_a * r_a.cross(p);
        c_b += p * m_b;
        a_b += i_b * r_b.cross(p);

        data.positions[self.a.index] = Position { c: c_a, a: a_a };
        data.positions[self.b.index] = Position { c: c_b, a: a_b };

        length - self.max_length < LINEAR_SLOP
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
    fn test_slack_rope_does_nothing() {
        let mut rig = Rig::pair(Vec2Fix::from_int(0, -1));
        let mut joint = RopeJoint::new(Vec2Fix::ZERO, Vec2Fix::ZERO, Fix64::from_int(5));
        rig.run(&mut joint, 10);
        assert_eq!(joint.limit_state(), LimitState::Inactive);
        // Free fall for 10 steps
        assert!(rig.velocities[1].v.y < Fix64::from_ratio(-16, 10));
    }

    #[test]
    fn test_taut_rope_holds_and_only_pulls() {
        let mut rig = Rig::pair(Vec2Fix::from_int(0, -1));
        let mut joint = RopeJoint::new(Vec2Fix::ZERO, Vec2Fix::ZERO, Fix64::TWO);
        for _ in 0..120 {
            rig.run(&mut joint, 1);
            assert!(!joint.limit_impulse().is_positive());
        }
        let d = rig.positions[1].c.length();
        assert!(d < Fix64::TWO + Fix64::from_ratio(2, 100), "d={d}");
        assert_eq!(joint.limit_state(), LimitState::AtUpper);
    }
}
