//! Angle joint: keeps the relative angle of two bodies at a target using a
//! biased angular impulse. No position pass.

use super::{inv_or_zero, JointBodies, JointSolver, SolverBody, SolverData};
use crate::math::{Fix64, Transform, Vec2Fix};

#[derive(Clone, Copy, Debug)]
pub struct AngleJoint {
    target_angle: Fix64,
    bias_factor: Fix64,
    max_impulse: Fix64,
    softness: Fix64,

    impulse: Fix64,
    bias: Fix64,
    mass_factor: Fix64,
    a: SolverBody,
    b: SolverBody,
}

impl AngleJoint {
    /// Hold `angle_b - angle_a` at `target_angle`.
    pub fn new(target_angle: Fix64) -> Self {
        Self {
            target_angle,
            bias_factor: Fix64::from_ratio(2, 10),
            max_impulse: Fix64::MAX,
            softness: Fix64::ZERO,
            impulse: Fix64::ZERO,
            bias: Fix64::ZERO,
            mass_factor: Fix64::ZERO,
            a: SolverBody::default(),
            b: SolverBody::default(),
        }
    }

    pub fn with_bias_factor(mut self, factor: Fix64) -> Self {
        self.bias_factor = factor;
        self
    }

    pub fn with_max_impulse(mut self, impulse: Fix64) -> Self {
        self.max_impulse = impulse;
        self
    }

    /// `0` is rigid, values towards `1` let the angle drift.
    pub fn with_softness(mut self, softness: Fix64) -> Self {
        self.softness = softness;
        self
    }

    pub fn target_angle(&self) -> Fix64 {
        self.target_angle
    }

    pub fn set_target_angle(&mut self, angle: Fix64) {
        self.target_angle = angle;
    }

    pub fn bias_factor(&self) -> Fix64 {
        self.bias_factor
    }

    pub fn max_impulse(&self) -> Fix64 {
        self.max_impulse
    }

    pub fn set_max_impulse(&mut self, impulse: Fix64) {
        self.max_impulse = impulse;
    }

    pub fn softness(&self) -> Fix64 {
        self.softness
    }
}

impl JointSolver for AngleJoint {
    fn init_velocity_constraints(&mut self, bodies: &JointBodies, data: &mut SolverData<'_>) {
        self.a = bodies.a;
        self.b = bodies.b;

        let a_a = data.positions[self.a.index].a;
        let a_b = data.positions[self.b.index].a;

        self.bias = -self.bias_factor * data.step.inv_dt * (a_b - a_a - self.target_angle);
        self.mass_factor = (Fix64::ONE - self.softness) * inv_or_zero(self.a.inv_i + self.b.inv_i);
        self.impulse = Fix64::ZERO;
    }

    fn solve_velocity_constraints(&mut self, data: &mut SolverData<'_>) {
        let w_a = data.velocities[self.a.index].w;
        let w_b = data.velocities[self.b.index].w;

        let p = ((self.bias - w_b + w_a) * self.mass_factor).clamp(-self.max_impulse, self.max_impulse);
        self.impulse += p;

        data.velocities[self.a.index].w -= self.a.inv_i * p;
        data.velocities[self.b.index].w += self.b.inv_i * p;
    }

    fn solve_position_constraints(&mut self, _data: &mut SolverData<'_>) -> bool {
        true
    }

    fn reaction_force(&self, _inv_dt: Fix64) -> Vec2Fix {
        Vec2Fix::ZERO
    }

    fn reaction_torque(&self, inv_dt: Fix64) -> Fix64 {
        inv_dt * self.impulse
    }

    fn anchor_a(&self, xf_a: &Transform) -> Vec2Fix {
        xf_a.p
    }

    fn anchor_b(&self, xf_b: &Transform) -> Vec2Fix {
        xf_b.p
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::island::Velocity;
    use crate::joint::rig::Rig;

    #[test]
    fn test_converges_to_target_angle() {
        let mut rig = Rig::pair(Vec2Fix::ZERO);
        rig.gravity = Vec2Fix::ZERO;
        let mut joint = AngleJoint::new(Fix64::HALF);
        rig.run(&mut joint, 120);
        let a = rig.positions[1].a;
        assert!((a - Fix64::HALF).abs() < Fix64::from_ratio(1, 100), "a={a}");
    }

    #[test]
    fn test_max_impulse_caps_each_iteration() {
        let mut rig = Rig::pair(Vec2Fix::ZERO);
        rig.gravity = Vec2Fix::ZERO;
        rig.velocities[1] = Velocity {
            v: Vec2Fix::ZERO,
            w: Fix64::from_int(10),
        };
        let cap = Fix64::from_ratio(1, 100);
        let mut joint = AngleJoint::new(Fix64::ZERO).with_max_impulse(cap);
        rig.run(&mut joint, 1);
        // inv_i = 6, 8 iterations
        let expected = Fix64::from_int(10) - Fix64::from_int(6) * cap * Fix64::from_int(8);
        assert!((rig.velocities[1].w - expected).abs() < Fix64::from_ratio(1, 1000));
        assert!(joint.reaction_torque(rig.step.inv_dt).is_negative());
    }
}
