//! Pulley joint: two bodies hang from fixed ground anchors with
//! `length_a + ratio * length_b == constant`.

use super::{inv_or_zero, lever, JointBodies, JointSolver, SolverBody, SolverData};
use crate::body::Body;
use crate::island::{Position, Velocity};
use crate::math::{Fix64, Rot, Transform, Vec2Fix};
use crate::settings::LINEAR_SLOP;

/// Rope over two pulleys.
#[derive(Clone, Copy, Debug)]
pub struct PulleyJoint {
    ground_anchor_a: Vec2Fix,
    ground_anchor_b: Vec2Fix,
    local_anchor_a: Vec2Fix,
    local_anchor_b: Vec2Fix,
    length_a: Fix64,
    length_b: Fix64,
    ratio: Fix64,
    constant: Fix64,

    impulse: Fix64,
    a: SolverBody,
    b: SolverBody,
    u_a: Vec2Fix,
    u_b: Vec2Fix,
    r_a: Vec2Fix,
    r_b: Vec2Fix,
    mass: Fix64,
}

impl PulleyJoint {
    /// Pulley from world ground anchors and world body anchors.
    pub fn new(
        body_a: &Body,
        body_b: &Body,
        ground_anchor_a: Vec2Fix,
        ground_anchor_b: Vec2Fix,
        anchor_a: Vec2Fix,
        anchor_b: Vec2Fix,
        ratio: Fix64,
    ) -> Self {
        let length_a = (anchor_a - ground_anchor_a).length();
        let length_b = (anchor_b - ground_anchor_b).length();
        Self {
            ground_anchor_a,
            ground_anchor_b,
            local_anchor_a: body_a.local_point(anchor_a),
            local_anchor_b: body_b.local_point(anchor_b),
            length_a,
            length_b,
            ratio,
            constant: length_a + ratio * length_b,
            impulse: Fix64::ZERO,
            a: SolverBody::default(),
            b: SolverBody::default(),
            u_a: Vec2Fix::ZERO,
            u_b: Vec2Fix::ZERO,
            r_a: Vec2Fix::ZERO,
            r_b: Vec2Fix::ZERO,
            mass: Fix64::ZERO,
        }
    }

    pub fn ground_anchor_a(&self) -> Vec2Fix {
        self.ground_anchor_a
    }

    pub fn ground_anchor_b(&self) -> Vec2Fix {
        self.ground_anchor_b
    }

    /// Rope length on side A at creation.
    pub fn length_a(&self) -> Fix64 {
        self.length_a
    }

    pub fn length_b(&self) -> Fix64 {
        self.length_b
    }

    pub fn ratio(&self) -> Fix64 {
        self.ratio
    }

    /// Current rope length on side A.
    pub fn current_length_a(&self, body_a: &Body) -> Fix64 {
        (body_a.world_point(self.local_anchor_a) - self.ground_anchor_a).length()
    }

    /// Current rope length on side B.
    pub fn current_length_b(&self, body_b: &Body) -> Fix64 {
        (body_b.world_point(self.local_anchor_b) - self.ground_anchor_b).length()
    }

    fn rope_direction(v: Vec2Fix) -> (Vec2Fix, Fix64) {
        let length = v.length();
        if length > LINEAR_SLOP * Fix64::from_int(10) {
            (v / length, length)
        } else {
            (Vec2Fix::ZERO, length)
        }
    }
}

impl JointSolver for PulleyJoint {
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

        // Get the pulley axes
        self.u_a = Self::rope_direction(c_a + self.r_a - self.ground_anchor_a).0;
        self.u_b = Self::rope_direction(c_b + self.r_b - self.ground_anchor_b).0;

        // Compute effective mass
        let ru_a = self.r_a.cross(self.u_a);
        let ru_b = self.r_b.cross(self.u_b);
        let mass_a = m_a + i_a * ru_a * ru_a;
        let mass_b = m_b + i_b * ru_b * ru_b;
        let mass = mass_a + self.ratio * self.ratio * mass_b;
        self.mass = if mass.is_positive() { Fix64::ONE / mass } else { Fix64::ZERO };

        if data.step.warm_starting {
            // Scale impulses to support variable time steps
            self.impulse *= data.step.dt_ratio;

            let p_a = self.u_a * -self.impulse;
            let p_b = self.u_b * (-self.ratio * self.impulse);
            v_a += p_a * m_a;
            w_a += i_a * self.r_a.cross(p_a);
            v_b += p_b * m_b;
            w_b += i_b * self.r_b.cross(p_b);
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

        let vp_a = v_a + Vec2Fix::scalar_cross(w_a, self.r_a);
        let vp_b = v_b + Vec2Fix::scalar_cross(w_b, self.r_b);

        let cdot = -self.u_a.dot(vp_a) - self.ratio * self.u_b.dot(vp_b);
        let impulse = -self.mass * cdot;
        self.impulse += impulse;

        let p_a = self.u_a * -impulse;
        let p_b = self.u_b * (-self.ratio * impulse);
        v_a += p_a * m_a;
        w_a += i_a * self.r_a.cross(p_a);
        v_b += p_b * m_b;
        w_b += i_b * self.r_b.cross(p_b);

        data.velocities[self.a.index] = Velocity { v: v_a, w: w_a };
        data.velocities[self.b.index] = Velocity { v: v_b, w: w_b };
    }

    fn solve_position_constraints(&mut self, data: &mut SolverData<'_>) -> bool {
        let (m_a, m_b, i_a, i_b) = (self.a.inv_mass, self.b.inv_mass, self.a.inv_i, self.b.inv_i);
        let Position { c: mut c_a, a: mut a_a } = data.positions[self.a.index];
        let Position { c: mut c_b, a: mut a_b } = data.positions[self.b.index];

        let r_a = lever(Rot::from_angle(a_a), self.local_anchor_a, self.a.local_center);
        let r_b = lever(Rot::from_angle(a_b), self.local_anchor_b, self.b.local_center);

        let (u_a, length_a) = Self::rope_direction(c_a + r_a - self.ground_anchor_a);
        let (u_b, length_b) = Self::rope_direction(c_b + r_b - self.ground_anchor_b);

        // Compute effective mass
        let ru_a = r_a.cross(u_a);
        let ru_b = r_b.cross(u_b);
        let mass_a = m_a + i_a * ru_a * ru_a;
        let mass_b = m_b + i_b * ru_b * ru_b;
        let mass = inv_or_zero(mass_a + self.ratio * self.ratio * mass_b);

        let c = self.constant - length_a - self.ratio * length_b;
        let linear_error = c.abs();

        let impulse = -mass * c;

        let p_a = u_a * -impulse;
        let p_b = u_b * (-self.ratio * impulse);
        c_a += p_a * m_a;
        a_a += i_a * r_a.cross(p_a);
        c_b += p_b * m_b;
        a_b += i_b * r_b.cross(p_b);

        data.positions[self.a.index] = Position { c: c_a, a: a_a };
        data.positions[self.b.index] = Position { c: c_b, a: a_b };

        linear_error < LINEAR_SLOP
    }

    fn reaction_force(&self, inv_dt: Fix64) -> Vec2Fix {
        self.u_b * (inv_dt * self.impulse)
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

    fn shift_origin(&mut self, new_origin: Vec2Fix) {
        self.ground_anchor_a -= new_origin;
        self.ground_anchor_b -= new_origin;
    }
}
