//! Friction joint: top-down linear and angular friction between two bodies.

use super::{inv_or_zero, lever, JointBodies, JointSolver, SolverBody, SolverData};
use crate::body::Body;
use crate::island::Velocity;
use crate::math::{Fix64, Mat22, Rot, Transform, Vec2Fix};

#[derive(Clone, Copy, Debug)]
pub struct FrictionJoint {
    local_anchor_a: Vec2Fix,
    local_anchor_b: Vec2Fix,
    max_force: Fix64,
    max_torque: Fix64,

    linear_impulse: Vec2Fix,
    angular_impulse: Fix64,
    a: SolverBody,
    b: SolverBody,
    r_a: Vec2Fix,
    r_b: Vec2Fix,
    linear_mass: Mat22,
    angular_mass: Fix64,
}

impl FrictionJoint {
    pub fn new(local_anchor_a: Vec2Fix, local_anchor_b: Vec2Fix) -> Self {
        Self {
            local_anchor_a,
            local_anchor_b,
            max_force: Fix64::ZERO,
            max_torque: Fix64::ZERO,
            linear_impulse: Vec2Fix::ZERO,
            angular_impulse: Fix64::ZERO,
            a: SolverBody::default(),
            b: SolverBody::default(),
            r_a: Vec2Fix::ZERO,
            r_b: Vec2Fix::ZERO,
            linear_mass: Mat22::ZERO,
            angular_mass: Fix64::ZERO,
        }
    }

    pub fn from_world_anchor(body_a: &Body, body_b: &Body, anchor: Vec2Fix) -> Self {
        Self::new(body_a.local_point(anchor), body_b.local_point(anchor))
    }

    pub fn with_max_force(mut self, force: Fix64) -> Self {
        self.set_max_force(force);
        self
    }

    pub fn with_max_torque(mut self, torque: Fix64) -> Self {
        self.set_max_torque(torque);
        self
    }

    pub fn local_anchor_a(&self) -> Vec2Fix {
        self.local_anchor_a
    }

    pub fn local_anchor_b(&self) -> Vec2Fix {
        self.local_anchor_b
    }

    pub fn max_force(&self) -> Fix64 {
        self.max_force
    }

    pub fn set_max_force(&mut self, force: Fix64) {
        assert!(force.is_valid() && !force.is_negative(), "max force must be >= 0");
        self.max_force = force;
    }

    pub fn max_torque(&self) -> Fix64 {
        self.max_torque
    }

    pub fn set_max_torque(&mut self, torque: Fix64) {
        assert!(torque.is_valid() && !torque.is_negative(), "max torque must be >= 0");
        self.max_torque = torque;
    }
}

impl JointSolver for FrictionJoint {
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
        let (r_a, r_b) = (self.r_a, self.r_b);

        let k11 = m_a + m_b + i_a * r_a.y * r_a.y + i_b * r_b.y * r_b.y;
        let k12 = -i_a * r_a.x * r_a.y - i_b * r_b.x * r_b.y;
        let k22 = m_a + m_b + i_a * r_a.x * r_a.x + i_b * r_b.x * r_b.x;
        self.linear_mass = Mat22::from_cols(Vec2Fix::new(k11, k12), Vec2Fix::new(k12, k22)).inverse();
        self.angular_mass = inv_or_zero(i_a + i_b);

        if data.step.warm_starting {
            // Scale impulses to support a variable time step
            self.linear_impulse *= data.step.dt_ratio;
            self.angular_impulse *= data.step.dt_ratio;

            let p = self.linear_impulse;
            v_a -= p * m_a;
            w_a -= i_a * (r_a.cross(p) + self.angular_impulse);
            v_b += p * m_b;
            w_b += i_b * (r_b.cross(p) + self.angular_impulse);
        } else {
            self.linear_impulse = Vec2Fix::ZERO;
            self.angular_impulse = Fix64::ZERO;
        }

        data.velocities[self.a.index] = Velocity { v: v_a, w: w_a };
        data.velocities[self.b.index] = Velocity { v: v_b, w: w_b };
    }

    fn solve_velocity_constraints(&mut self, data: &mut SolverData<'_>) {
        let (m_a, m_b, i_a, i_b) = (self.a.inv_mass, self.b.inv_mass, self.a.inv_i, self.b.inv_i);
        let Velocity { v: mut v_a, w: mut w_a } = data.velocities[self.a.index];
        let Velocity { v: mut v_b, w: mut w_b } = data.velocities[self.b.index];
        let (r_a, r_b) = (self.r_a, self.r_b);
        let h = data.step.dt;

        // Angular friction
        {
            let cdot = w_b - w_a;
            let impulse = -self.angular_mass * cdot;

            let old = self.angular_impulse;
            let max = h * self.max_torque;
            self.angular_impulse = (old + impulse).clamp(-max, max);
            let impulse = self.angular_impulse - old;

            w_a -= i_a * impulse;
            w_b += i_b * impulse;
        }

        // Linear friction
        {
            let cdot = v_b + Vec2Fix::scalar_cross(w_b, r_b) - v_a - Vec2Fix::scalar_cross(w_a, r_a);

            let impulse = -self.linear_mass.mul_vec(cdot);
            let old = self.linear_impulse;
            self.linear_impulse += impulse;

            let max = h * self.max_force;
            if self.linear_impulse.length_squared() > max * max {
                self.linear_impulse = self.linear_impulse.normalize() * max;
            }
            let impulse = self.linear_impulse - old;

            v_a -= impulse * m_a;
            w_a -= i_a * r_a.cross(impulse);
            v_b += impulse * m_b;
            w_b += i_b * r_b.cross(impulse);
        }

        data.velocities[self.a.index] = Velocity { v: v_a, w: w_a };
        data.velocities[self.b.index] = Velocity { v: v_b, w: w_b };
    }

    fn solve_position_constraints(&mut self, _data: &mut SolverData<'_>) -> bool {
        true
    }

    fn reaction_force(&self, inv_dt: Fix64) -> Vec2Fix {
        self.linear_impulse * inv_dt
    }

    fn reaction_torque(&self, inv_dt: Fix64) -> Fix64 {
        inv_dt * self.angular_impulse
    }

    fn anchor_a(&self, xf_a: &Transform) -> Vec2Fix {
        xf_a.apply(self.local_anchor_a)
    }

    fn anchor_b(&self, xf_b: &Transform) -> Vec2Fix {
        xf_b.apply(self.local_anchor_b)
    }
}
