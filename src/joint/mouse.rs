//! Mouse joint: a soft spring pulling a point on body B towards a world
//! target. Body A is only a placeholder (usually the ground) and is never
//! touched by the solver.

use super::{inv_or_zero, lever, JointBodies, JointSolver, SolverBody, SolverData};
use crate::body::Body;
use crate::island::{Position, Velocity};
use crate::math::{Fix64, Mat22, Rot, Transform, Vec2Fix};

#[derive(Clone, Copy, Debug)]
pub struct MouseJoint {
    target: Vec2Fix,
    local_anchor_b: Vec2Fix,
    max_force: Fix64,
    frequency_hz: Fix64,
    damping_ratio: Fix64,

    impulse: Vec2Fix,
    gamma: Fix64,
    beta: Fix64,
    b: SolverBody,
    r_b: Vec2Fix,
    c: Vec2Fix,
    mass: Mat22,
}

impl MouseJoint {
    /// Grab `body_b` at the world point `target`.
    pub fn new(body_b: &Body, target: Vec2Fix) -> Self {
        Self::with_local_anchor(body_b.local_point(target), target)
    }

    pub fn with_local_anchor(local_anchor_b: Vec2Fix, target: Vec2Fix) -> Self {
        Self {
            target,
            local_anchor_b,
            max_force: Fix64::ZERO,
            frequency_hz: Fix64::from_int(5),
            damping_ratio: Fix64::from_ratio(7, 10),
            impulse: Vec2Fix::ZERO,
            gamma: Fix64::ZERO,
            beta: Fix64::ZERO,
            b: SolverBody::default(),
            r_b: Vec2Fix::ZERO,
            c: Vec2Fix::ZERO,
            mass: Mat22::ZERO,
        }
    }

    pub fn with_max_force(mut self, force: Fix64) -> Self {
        self.set_max_force(force);
        self
    }

    pub fn with_spring(mut self, frequency_hz: Fix64, damping_ratio: Fix64) -> Self {
        self.frequency_hz = frequency_hz;
        self.damping_ratio = damping_ratio;
        self
    }

    pub fn target(&self) -> Vec2Fix {
        self.target
    }

    /// Move the target. Use `World::joint_mut` so the body wakes up.
    pub fn set_target(&mut self, target: Vec2Fix) {
        self.target = target;
    }

    pub fn local_anchor_b(&self) -> Vec2Fix {
        self.local_anchor_b
    }

    pub fn max_force(&self) -> Fix64 {
        self.max_force
    }

    pub fn set_max_force(&mut self, force: Fix64) {
        self.max_force = force;
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

impl JointSolver for MouseJoint {
    fn init_velocity_constraints(&mut self, bodies: &JointBodies, data: &mut SolverData<'_>) {
        self.b = bodies.b;
        let (m_b, i_b) = (self.b.inv_mass, self.b.inv_i);
        let mass = self.b.mass();

        let Position { c: c_b, a: a_b } = data.positions[self.b.index];
        let Velocity { v: mut v_b, w: mut w_b } = data.velocities[self.b.index];

        // Frequency
        let omega = Fix64::TWO_PI * self.frequency_hz;
        // Damping coefficient
        let d = Fix64::TWO * mass * self.damping_ratio * omega;
        // Spring stiffness
        let k = mass * (omega * omega);

        // magic formulas
        // gamma has units of inverse mass.
        // beta has units of inverse time.
        let h = data.step.dt;
        self.gamma = inv_or_zero(h * (d + h * k));
        self.beta = h * k * self.gamma;

        self.r_b = lever(Rot::from_angle(a_b), self.local_anchor_b, self.b.local_center);
        let r_b = self.r_b;

        // K = [(1/m1 + 1/m2) * eye(2) - skew(r1) * invI1 * skew(r1) - skew(r2) * invI2 * skew(r2)]
        let k11 = m_b + i_b * r_b.y * r_b.y + self.gamma;
        let k12 = -i_b * r_b.x * r_b.y;
        let k22 = m_b + i_b * r_b.x * r_b.x + self.gamma;
        self.mass = Mat22::from_cols(Vec2Fix::new(k11, k12), Vec2Fix::new(k12, k22)).inverse();

        self.c = (c_b + r_b - self.target) * self.beta;

        // Cheat with some damping
        w_b *= Fix64::from_ratio(98, 100);

        if data.step.warm_starting {
            self.impulse *= data.step.dt_ratio;
            v_b += self.impulse * m_b;
            w_b += i_b * r_b.cross(self.impulse);
        } else {
            self.impulse = Vec2Fix::ZERO;
        }

        data.velocities[self.b.index] = Velocity { v: v_b, w: w_b };
    }

    fn solve_velocity_constraints(&mut self, data: &mut SolverData<'_>) {
        let (m_b, i_b) = (self.b.inv_mass, self.b.inv_i);
        let Velocity { v: mut v_b, w: mut w_b } = data.velocities[self.b.index];
        let r_b = self.r_b;

        // Cdot = v + cross(w, r)
        let cdot = v_b + Vec2Fix::scalar_cross(w_b, r_b);
        let impulse = self.mass.mul_vec(-(cdot + self.c + self.impulse * self.gamma));

        let old = self.impulse;
        self.impulse += impulse;
        let max = data.step.dt * self.max_force;
        if self.impulse.length_squared() > max * max {
            self.impulse = self.impulse * (max / self.impulse.length());
        }
        let impulse = self.impulse - old;

        v_b += impulse * m_b;
        w_b += i_b * r_b.cross(impulse);

        data.velocities[self.b.index] = Velocity { v: v_b, w: w_b };
    }

    fn solve_position_constraints(&mut self, _data: &mut SolverData<'_>) -> bool {
        true
    }

    fn reaction_force(&self, inv_dt: Fix64) -> Vec2Fix {
        self.impulse * inv_dt
    }

    fn reaction_torque(&self, _inv_dt: Fix64) -> Fix64 {
        Fix64::ZERO
    }

    fn anchor_a(&self, _xf_a: &Transform) -> Vec2Fix {
        self.target
    }

    fn anchor_b(&self, xf_b: &Transform) -> Vec2Fix {
        xf_b.apply(self.local_anchor_b)
    }

    fn shift_origin(&mut self, new_origin: Vec2Fix) {
        self.target -= new_origin;
    }
}
