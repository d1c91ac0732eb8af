//! Wheel joint: body B slides on an axis fixed in body A, held by a
//! suspension spring, and rotates freely with an optional drive motor.

use super::{inv_or_zero, lever, soft_constraint, JointBodies, JointSolver, SolverBody, SolverData};
use crate::body::Body;
use crate::island::{Position, Velocity};
use crate::math::{Fix64, Rot, Transform, Vec2Fix};
use crate::settings::LINEAR_SLOP;

/// Vehicle suspension.
#[derive(Clone, Copy, Debug)]
pub struct WheelJoint {
    local_anchor_a: Vec2Fix,
    local_anchor_b: Vec2Fix,
    local_x_axis_a: Vec2Fix,
    local_y_axis_a: Vec2Fix,
    enable_motor: bool,
    motor_speed: Fix64,
    max_motor_torque: Fix64,
    frequency_hz: Fix64,
    damping_ratio: Fix64,

    impulse: Fix64,
    motor_impulse: Fix64,
    spring_impulse: Fix64,
    a: SolverBody,
    b: SolverBody,
    ax: Vec2Fix,
    ay: Vec2Fix,
    s_ax: Fix64,
    s_bx: Fix64,
    s_ay: Fix64,
    s_by: Fix64,
    mass: Fix64,
    motor_mass: Fix64,
    spring_mass: Fix64,
    bias: Fix64,
    gamma: Fix64,
}

impl WheelJoint {
    /// Suspension along `local_axis_a` (normalized here); 2 Hz, 0.7 damping.
    pub fn new(local_anchor_a: Vec2Fix, local_anchor_b: Vec2Fix, local_axis_a: Vec2Fix) -> Self {
        let local_x_axis_a = local_axis_a.normalize();
        Self {
            local_anchor_a,
            local_anchor_b,
            local_x_axis_a,
            local_y_axis_a: Vec2Fix::scalar_cross(Fix64::ONE, local_x_axis_a),
            enable_motor: false,
            motor_speed: Fix64::ZERO,
            max_motor_torque: Fix64::ZERO,
            frequency_hz: Fix64::TWO,
            damping_ratio: Fix64::from_ratio(7, 10),
            impulse: Fix64::ZERO,
            motor_impulse: Fix64::ZERO,
            spring_impulse: Fix64::ZERO,
            a: SolverBody::default(),
            b: SolverBody::default(),
            ax: Vec2Fix::ZERO,
            ay: Vec2Fix::ZERO,
            s_ax: Fix64::ZERO,
            s_bx: Fix64::ZERO,
            s_ay: Fix64::ZERO,
            s_by: Fix64::ZERO,
            mass: Fix64::ZERO,
            motor_mass: Fix64::ZERO,
            spring_mass: Fix64::ZERO,
            bias: Fix64::ZERO,
            gamma: Fix64::ZERO,
        }
    }

    /// Wheel at a world anchor with a world suspension axis.
    pub fn from_world_anchor(body_a: &Body, body_b: &Body, anchor: Vec2Fix, axis: Vec2Fix) -> Self {
        Self::new(body_a.local_point(anchor), body_b.local_point(anchor), body_a.local_vector(axis))
    }

    pub fn with_spring(mut self, frequency_hz: Fix64, damping_ratio: Fix64) -> Self {
        self.frequency_hz = frequency_hz;
        self.damping_ratio = damping_ratio;
        self
    }

    pub fn with_motor(mut self, speed: Fix64, max_torque: Fix64) -> Self {
        self.enable_motor = true;
        self.motor_speed = speed;
        self.max_motor_torque = max_torque;
        self
    }

    pub fn local_anchor_a(&self) -> Vec2Fix {
        self.local_anchor_a
    }

    pub fn local_anchor_b(&self) -> Vec2Fix {
        self.local_anchor_b
    }

    pub fn local_axis_a(&self) -> Vec2Fix {
        self.local_x_axis_a
    }

    /// Current suspension travel.
    pub fn joint_translation(&self, body_a: &Body, body_b: &Body) -> Fix64 {
        let p_a = body_a.world_point(self.local_anchor_a);
        let p_b = body_b.world_point(self.local_anchor_b);
        (p_b - p_a).dot(body_a.world_vector(self.local_x_axis_a))
    }

    pub fn is_motor_enabled(&self) -> bool {
        self.enable_motor
    }

    pub fn enable_motor(&mut self, flag: bool) {
        self.enable_motor = flag;
    }

    pub fn motor_speed(&self) -> Fix64 {
        self.motor_speed
    }

    pub fn set_motor_speed(&mut self, speed: Fix64) {
        self.motor_speed = speed;
    }

    pub fn max_motor_torque(&self) -> Fix64 {
        self.max_motor_torque
    }

    pub fn set_max_motor_torque(&mut self, torque: Fix64) {
        self.max_motor_torque = torque;
    }

    pub fn motor_torque(&self, inv_dt: Fix64) -> Fix64 {
        inv_dt * self.motor_impulse
    }

    pub fn spring_frequency(&self) -> Fix64 {
        self.frequency_hz
    }

    pub fn set_spring_frequency(&mut self, hz: Fix64) {
        self.frequency_hz = hz;
    }

    pub fn spring_damping_ratio(&self) -> Fix64 {
        self.damping_ratio
    }

    pub fn set_spring_damping_ratio(&mut self, ratio: Fix64) {
        self.damping_ratio = ratio;
    }
}

impl JointSolver for WheelJoint {
    fn init_velocity_constraints(&mut self, bodies: &JointBodies, data: &mut SolverData<'_>) {
        self.a = bodies.a;
        self.b = bodies.b;
        let (m_a, m_b, i_a, i_b) = (self.a.inv_mass, self.b.inv_mass, self.a.inv_i, self.b.inv_i);

        let Position { c: c_a, a: a_a } = data.positions[self.a.index];
        let Velocity { v: mut v_a, w: mut w_a } = data.velocities[self.a.index];
        let Position { c: c_b, a: a_b } = data.positions[self.b.index];
        let Velocity { v: mut v_b, w: mut w_b } = data.velocities[self.b.index];

        let q_a = Rot::from_angle(a_a);
        let r_a = lever(q_a, self.local_anchor_a, self.a.local_center);
        let r_b = lever(Rot::from_angle(a_b), self.local_anchor_b, self.b.local_center);
        let d = c_b + r_b - c_a - r_a;

        // Point to line constraint
        self.ay = q_a.apply(self.local_y_axis_a);
        self.s_ay = (d + r_a).cross(self.ay);
        self.s_by = r_b.cross(self.ay);
        self.mass = inv_or_zero(
            m_a + m_b + i_a * self.s_ay * self.s_ay + i_b * self.s_by * self.s_by,
        );

        // Spring constraint
        self.ax = q_a.apply(self.local_x_axis_a);
        self.s_ax = (d + r_a).cross(self.ax);
        self.s_bx = r_b.cross(self.ax);
        self.spring_mass = Fix64::ZERO;
        self.bias = Fix64::ZERO;
        self.gamma = Fix64::ZERO;
        if self.frequency_hz.is_positive() {
            let inv_mass = m_a + m_b + i_a * self.s_ax * self.s_ax + i_b * self.s_bx * self.s_bx;
            if inv_mass.is_positive() {
                let c = d.dot(self.ax);
                let (gamma, bias) = soft_constraint(
                    Fix64::ONE / inv_mass,
                    self.frequency_hz,
                    self.damping_ratio,
                    c,
                    data.step.dt,
                );
                self.gamma = gamma;
                self.bias = bias;
                self.spring_mass = inv_or_zero(inv_mass + gamma);
            }
        } else {
            self.spring_impulse = Fix64::ZERO;
        }

        // Rotational motor
        if self.enable_motor {
            self.motor_mass = inv_or_zero(i_a + i_b);
        } else {
            self.motor_mass = Fix64::ZERO;
            self.motor_impulse = Fix64::ZERO;
        }

        if data.step.warm_starting {
            // Account for variable time step
            self.impulse *= data.step.dt_ratio;
            self.spring_impulse *= data.step.dt_ratio;
            self.motor_impulse *= data.step.dt_ratio;

            let p = self.ay * self.impulse + self.ax * self.spring_impulse;
            let l_a = self.impulse * self.s_ay + self.spring_impulse * self.s_ax + self.motor_impulse;
            let l_b = self.impulse * self.s_by + self.spring_impulse * self.s_bx + self.motor_impulse;

            v_a -= p * m_a;
            w_a -= i_a * l_a;
            v_b += p * m_b;
            w_b += i_b * l_b;
        } else {
            self.impulse = Fix64::ZERO;
            self.spring_impulse = Fix64::ZERO;
            self.motor_impulse = Fix64::ZERO;
        }

        data.velocities[self.a.index] = Velocity { v: v_a, w: w_a };
        data.velocities[self.b.index] = Velocity { v: v_b, w: w_b };
    }

    fn solve_velocity_constraints(&mut self, data: &mut SolverData<'_>) {
        let (m_a, m_b, i_a, i_b) = (self.a.inv_mass, self.b.inv_mass, self.a.inv_i, self.b.inv_i);
        let Velocity { v: mut v_a, w: mut w_a } = data.velocities[self.a.index];
        let Velocity { v: mut v_b, w: mut w_b } = data.velocities[self.b.index];

        // Solve spring constraint
        {
            let cdot = self.ax.dot(v_b - v_a) + self.s_bx * w_b - self.s_ax * w_a;
            let impulse = -self.spring_mass * (cdot + self.bias + self.gamma * self.spring_impulse);
            self.spring_impulse += impulse;

            let p = self.ax * impulse;
            v_a -= p * m_a;
            w_a -= i_a * impulse * self.s_ax;
            v_b += p * m_b;
            w_b += i_b * impulse * self.s_bx;
        }

        // Solve rotational motor constraint
        {
            let cdot = w_b - w_a - self.motor_speed;
            let impulse = -self.motor_mass * cdot;
            let old = self.motor_impulse;
            let max = data.step.dt * self.max_motor_torque;
            self.motor_impulse = (old + impulse).clamp(-max, max);
            let impulse = self.motor_impulse - old;

            w_a -= i_a * impulse;
            w_b += i_b * impulse;
        }

        // Solve point to line constraint
        {
            let cdot = self.ay.dot(v_b - v_a) + self.s_by * w_b - self.s_ay * w_a;
            let impulse = -self.mass * cdot;
            self.impulse += impulse;

            let p = self.ay * impulse;
            v_a -= p * m_a;
            w_a -= i_a * impulse * self.s_ay;
            v_b += p * m_b;
            w_b += i_b * impulse * self.s_by;
        }

        data.velocities[self.a.index] = Velocity { v: v_a, w: w_a };
        data.velocities[self.b.index] = Velocity { v: v_b, w: w_b };
    }

    fn solve_position_constraints(&mut self, data: &mut SolverData<'_>) -> bool {
        let (m_a, m_b, i_a, i_b) = (self.a.inv_mass, self.b.inv_mass, self.a.inv_i, self.b.inv_i);
        let Position { c: mut c_a, a: mut a_a } = data.positions[self.a.index];
        let Position { c: mut c_b, a: mut a_b } = data.positions[self.b.index];

        let q_a = Rot::from_angle(a_a);
        let r_a = lever(q_a, self.local_anchor_a, self.a.local_center);
        let r_b = lever(Rot::from_angle(a_b), self.local_anchor_b, self.b.local_center);
        let d = c_b - c_a + r_b - r_a;

        let ay = q_a.apply(self.local_y_axis_a);
        let s_ay = (d + r_a).cross(ay);
        let s_by = r_b.cross(ay);

        let c = d.dot(ay);
        let k = m_a + m_b + i_a * s_ay * s_ay + i_b * s_by * s_by;
        let impulse = if k.is_zero() { Fix64::ZERO } else { -c / k };

        let p = ay * impulse;
        c_a -= p * m_a;
        a_a -= i_a * impulse * s_ay;
        c_b += p * m_b;
        a_b += i_b * impulse * s_by;

        data.positions[self.a.index] = Position { c: c_a, a: a_a };
        data.positions[self.b.index] = Position { c: c_b, a: a_b };

        c.abs() <= LINEAR_SLOP
    }

    fn reaction_force(&self, inv_dt: Fix64) -> Vec2Fix {
        (self.ay * self.impulse + self.ax * self.spring_impulse) * inv_dt
    }

    fn reaction_torque(&self, inv_dt: Fix64) -> Fix64 {
        inv_dt * self.motor_impulse
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

    fn wheel() -> (Rig, WheelJoint) {
        let rig = Rig::pair(Vec2Fix::ZERO);
        let joint = WheelJoint::new(Vec2Fix::ZERO, Vec2Fix::ZERO, Vec2Fix::from_int(0, 1));
        (rig, joint)
    }

    #[test]
    fn test_suspension_settles_below_rest() {
        let (mut rig, mut joint) = wheel();
        rig.run(&mut joint, 180);
        let y = rig.positions[1].c.y;
        // Static deflection g / omega^2 for 2 Hz is about 0.063
        assert!(y < Fix64::ZERO && y > Fix64::from_ratio(-15, 100), "y={y}");
        assert!(rig.positions[1].c.x.abs() < Fix64::from_ratio(1, 100));
    }

    #[test]
    fn test_motor_spins_wheel() {
        let (mut rig, joint) = wheel();
        rig.gravity = Vec2Fix::ZERO;
        let mut joint = joint.with_motor(Fix64::from_int(-3), Fix64::from_int(50));
        rig.run(&mut joint, 10);
        assert!((rig.velocities[1].w + Fix64::from_int(3)).abs() < Fix64::from_ratio(1, 100));
    }

    #[test]
    fn test_rigid_axis_without_spring() {
        let (mut rig, joint) = wheel();
        rig.gravity = Vec2Fix::from_int(10, 0);
        let mut joint = joint.with_spring(Fix64::ZERO, Fix64::ZERO);
        rig.run(&mut joint, 30);
        // Sideways load is carried by the point-to-line row
        assert!(rig.positions[1].c.x.abs() < Fix64::from_ratio(1, 100));
    }
}
