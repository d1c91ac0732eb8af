//! Prismatic joint: relative translation along one axis fixed in body A,
//! no relative rotation. Optional translation limits and a force-limited
//! motor.

use super::{inv_or_zero, lever, JointBodies, JointSolver, LimitState, SolverBody, SolverData};
use crate::body::Body;
use crate::island::{Position, Velocity};
use crate::math::{Fix64, Mat22, Mat33, Rot, Transform, Vec2Fix, Vec3Fix};
use crate::settings::{ANGULAR_SLOP, LINEAR_SLOP};

/// Slider between two bodies.
#[derive(Clone, Copy, Debug)]
pub struct PrismaticJoint {
    local_anchor_a: Vec2Fix,
    local_anchor_b: Vec2Fix,
    local_x_axis_a: Vec2Fix,
    local_y_axis_a: Vec2Fix,
    reference_angle: Fix64,
    enable_limit: bool,
    lower_translation: Fix64,
    upper_translation: Fix64,
    enable_motor: bool,
    motor_speed: Fix64,
    max_motor_force: Fix64,

    impulse: Vec3Fix,
    motor_impulse: Fix64,
    limit_state: LimitState,
    a: SolverBody,
    b: SolverBody,
    axis: Vec2Fix,
    perp: Vec2Fix,
    s1: Fix64,
    s2: Fix64,
    a1: Fix64,
    a2: Fix64,
    k: Mat33,
    motor_mass: Fix64,
}

/// Jacobian terms at the current poses.
struct Jacobian {
    axis: Vec2Fix,
    perp: Vec2Fix,
    s1: Fix64,
    s2: Fix64,
    a1: Fix64,
    a2: Fix64,
    d: Vec2Fix,
}

impl PrismaticJoint {
    /// Slider along `local_axis_a` (normalized here) in body A.
    pub fn new(local_anchor_a: Vec2Fix, local_anchor_b: Vec2Fix, local_axis_a: Vec2Fix, reference_angle: Fix64) -> Self {
        let local_x_axis_a = local_axis_a.normalize();
        Self {
            local_anchor_a,
            local_anchor_b,
            local_x_axis_a,
            local_y_axis_a: Vec2Fix::scalar_cross(Fix64::ONE, local_x_axis_a),
            reference_angle,
            enable_limit: false,
            lower_translation: Fix64::ZERO,
            upper_translation: Fix64::ZERO,
            enable_motor: false,
            motor_speed: Fix64::ZERO,
            max_motor_force: Fix64::ZERO,
            impulse: Vec3Fix::ZERO,
            motor_impulse: Fix64::ZERO,
            limit_state: LimitState::Inactive,
            a: SolverBody::default(),
            b: SolverBody::default(),
            axis: Vec2Fix::ZERO,
            perp: Vec2Fix::ZERO,
            s1: Fix64::ZERO,
            s2: Fix64::ZERO,
            a1: Fix64::ZERO,
            a2: Fix64::ZERO,
            k: Mat33::ZERO,
            motor_mass: Fix64::ZERO,
        }
    }

    /// Slider through a world anchor along a world axis.
    pub fn from_world_anchor(body_a: &Body, body_b: &Body, anchor: Vec2Fix, axis: Vec2Fix) -> Self {
        Self::new(
            body_a.local_point(anchor),
            body_b.local_point(anchor),
            body_a.local_vector(axis),
            body_b.angle() - body_a.angle(),
        )
    }

    pub fn with_limits(mut self, lower: Fix64, upper: Fix64) -> Self {
        self.enable_limit = true;
        self.set_limits(lower, upper);
        self
    }

    pub fn with_motor(mut self, speed: Fix64, max_force: Fix64) -> Self {
        self.enable_motor = true;
        self.motor_speed = speed;
        self.max_motor_force = max_force;
        self
    }

    pub fn local_anchor_a(&self) -> Vec2Fix {
        self.local_anchor_a
    }

    pub fn local_anchor_b(&self) -> Vec2Fix {
        self.local_anchor_b
    }

    /// Unit slide axis in body A.
    pub fn local_axis_a(&self) -> Vec2Fix {
        self.local_x_axis_a
    }

    pub fn reference_angle(&self) -> Fix64 {
        self.reference_angle
    }

    /// Current translation along the axis.
    pub fn joint_translation(&self, body_a: &Body, body_b: &Body) -> Fix64 {
        let p_a = body_a.world_point(self.local_anchor_a);
        let p_b = body_b.world_point(self.local_anchor_b);
        let axis = body_a.world_vector(self.local_x_axis_a);
        (p_b - p_a).dot(axis)
    }

    pub fn is_limit_enabled(&self) -> bool {
        self.enable_limit
    }

    pub fn enable_limit(&mut self, flag: bool) {
        if flag != self.enable_limit {
            self.enable_limit = flag;
            self.impulse.z = Fix64::ZERO;
        }
    }

    pub fn lower_limit(&self) -> Fix64 {
        self.lower_translation
    }

    pub fn upper_limit(&self) -> Fix64 {
        self.upper_translation
    }

    /// Set the translation limits; `lower` must not exceed `upper`.
    pub fn set_limits(&mut self, lower: Fix64, upper: Fix64) {
        assert!(lower <= upper, "prismatic lower limit above upper limit");
        if lower != self.lower_translation || upper != self.upper_translation {
            self.lower_translation = lower;
            self.upper_translation = upper;
            self.impulse.z = Fix64::ZERO;
        }
    }

    pub fn limit_state(&self) -> LimitState {
        self.limit_state
    }

    /// Accumulated limit impulse of the last step.
    pub fn limit_impulse(&self) -> Fix64 {
        self.impulse.z
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

    pub fn max_motor_force(&self) -> Fix64 {
        self.max_motor_force
    }

    pub fn set_max_motor_force(&mut self, force: Fix64) {
        self.max_motor_force = force;
    }

    pub fn motor_force(&self, inv_dt: Fix64) -> Fix64 {
        inv_dt * self.motor_impulse
    }

    fn jacobian(&self, c_a: Vec2Fix, a_a: Fix64, c_b: Vec2Fix, a_b: Fix64) -> Jacobian {
        let q_a = Rot::from_angle(a_a);
        let r_a = lever(q_a, self.local_anchor_a, self.a.local_center);
        let r_b = lever(Rot::from_angle(a_b), self.local_anchor_b, self.b.local_center);
        let d = c_b - c_a + r_b - r_a;

        let axis = q_a.apply(self.local_x_axis_a);
        let perp = q_a.apply(self.local_y_axis_a);
        Jacobian {
            axis,
            perp,
            a1: (d + r_a).cross(axis),
            a2: r_b.cross(axis),
            s1: (d + r_a).cross(perp),
            s2: r_b.cross(perp),
            d,
        }
    }

    fn mass_matrix(&self, j: &Jacobian) -> Mat33 {
        let (m_a, m_b, i_a, i_b) = (self.a.inv_mass, self.b.inv_mass, self.a.inv_i, self.b.inv_i);
        let k11 = m_a + m_b + i_a * j.s1 * j.s1 + i_b * j.s2 * j.s2;
        let k12 = i_a * j.s1 + i_b * j.s2;
        let k13 = i_a * j.s1 * j.a1 + i_b * j.s2 * j.a2;
        let mut k22 = i_a + i_b;
        if k22.is_zero() {
            // For bodies with fixed rotation
            k22 = Fix64::ONE;
        }
        let k23 = i_a * j.a1 + i_b * j.a2;
        let k33 = m_a + m_b + i_a * j.a1 * j.a1 + i_b * j.a2 * j.a2;
        Mat33 {
            ex: Vec3Fix::new(k11, k12, k13),
            ey: Vec3Fix::new(k12, k22, k23),
            ez: Vec3Fix::new(k13, k23, k33),
        }
    }
}

impl JointSolver for PrismaticJoint {
    fn init_velocity_constraints(&mut self, bodies: &JointBodies, data: &mut SolverData<'_>) {
        self.a = bodies.a;
        self.b = bodies.b;
        let (m_a, m_b, i_a, i_b) = (self.a.inv_mass, self.b.inv_mass, self.a.inv_i, self.b.inv_i);

        let Position { c: c_a, a: a_a } = data.positions[self.a.index];
        let Velocity { v: mut v_a, w: mut w_a } = data.velocities[self.a.index];
        let Position { c: c_b, a: a_b } = data.positions[self.b.index];
        let Velocity { v: mut v_b, w: mut w_b } = data.velocities[self.b.index];

        let j = self.jacobian(c_a, a_a, c_b, a_b);
        self.axis = j.axis;
        self.perp = j.perp;
        self.a1 = j.a1;
        self.a2 = j.a2;
        self.s1 = j.s1;
        self.s2 = j.s2;

        // Motor and limit share the axis row
        self.motor_mass = inv_or_zero(m_a + m_b + i_a * j.a1 * j.a1 + i_b * j.a2 * j.a2);
        self.k = self.mass_matrix(&j);

        if self.enable_limit {
            let translation = self.axis.dot(j.d);
            if (self.upper_translation - self.lower_translation).abs() < LINEAR_SLOP.double() {
                self.limit_state = LimitState::Equal;
            } else if translation <= self.lower_translation {
                if self.limit_state != LimitState::AtLower {
                    self.limit_state = LimitState::AtLower;
                    self.impulse.z = Fix64::ZERO;
                }
            } else if translation >= self.upper_translation {
                if self.limit_state != LimitState::AtUpper {
                    self.limit_state = LimitState::AtUpper;
                    self.impulse.z = Fix64::ZERO;
                }
            } else {
                self.limit_state = LimitState::Inactive;
                self.impulse.z = Fix64::ZERO;
            }
        } else {
            self.limit_state = LimitState::Inactive;
            self.impulse.z = Fix64::ZERO;
        }

        if !self.enable_motor {
            self.motor_impulse = Fix64::ZERO;
        }

        if data.step.warm_starting {
            // Account for variable time step
            self.impulse = self.impulse * data.step.dt_ratio;
            self.motor_impulse *= data.step.dt_ratio;

            let axial = self.motor_impulse + self.impulse.z;
            let p = self.perp * self.impulse.x + self.axis * axial;
            let l_a = self.impulse.x * self.s1 + self.impulse.y + axial * self.a1;
            let l_b = self.impulse.x * self.s2 + self.impulse.y + axial * self.a2;

            v_a -= p * m_a;
            w_a -= i_a * l_a;
            v_b += p * m_b;
            w_b += i_b * l_b;
        } else {
            self.impulse = Vec3Fix::ZERO;
            self.motor_impulse = Fix64::ZERO;
        }

        data.velocities[self.a.index] = Velocity { v: v_a, w: w_a };
        data.velocities[self.b.index] = Velocity { v: v_b, w: w_b };
    }

    fn solve_velocity_constraints(&mut self, data: &mut SolverData<'_>) {
        let (m_a, m_b, i_a, i_b) = (self.a.inv_mass, self.b.inv_mass, self.a.inv_i, self.b.inv_i);
        let Velocity { v: mut v_a, w: mut w_a } = data.velocities[self.a.index];
        let Velocity { v: mut v_b, w: mut w_b } = data.velocities[self.b.index];

        // Solve linear motor constraint
        if self.enable_motor && self.limit_state != LimitState::Equal {
            let cdot = self.axis.dot(v_b - v_a) + self.a2 * w_b - self.a1 * w_a;
            let impulse = self.motor_mass * (self.motor_speed - cdot);
            let old = self.motor_impulse;
            let max = data.step.dt * self.max_motor_force;
            self.motor_impulse = (old + impulse).clamp(-max, max);
            let impulse = self.motor_impulse - old;

            let p = self.axis * impulse;
            v_a -= p * m_a;
            w_a -= i_a * impulse * self.a1;
            v_b += p * m_b;
            w_b += i_b * impulse * self.a2;
        }

        let cdot1 = Vec2Fix::new(
            self.perp.dot(v_b - v_a) + self.s2 * w_b - self.s1 * w_a,
            w_b - w_a,
        );

        let df = if self.enable_limit && self.limit_state != LimitState::Inactive {
            // Solve prismatic and limit constraint in block form
            let cdot2 = self.axis.dot(v_b - v_a) + self.a2 * w_b - self.a1 * w_a;
            let cdot = Vec3Fix::new(cdot1.x, cdot1.y, cdot2);

            let f1 = self.impulse;
            let df = self.k.solve33(-cdot);
            self.impulse = self.impulse + df;

            match self.limit_state {
                LimitState::AtLower => self.impulse.z = self.impulse.z.max(Fix64::ZERO),
                LimitState::AtUpper => self.impulse.z = self.impulse.z.min(Fix64::ZERO),
                _ => {}
            }

            // f2(1:2) = invK(1:2,1:2) * (-Cdot(1:2) - K(1:2,3) * (f2(3) - f1(3))) + f1(1:2)
            let b = -cdot1 - Vec2Fix::new(self.k.ez.x, self.k.ez.y) * (self.impulse.z - f1.z);
            let f2r = self.k.solve22(b) + Vec2Fix::new(f1.x, f1.y);
            self.impulse.x = f2r.x;
            self.impulse.y = f2r.y;

            self.impulse - f1
        } else {
            // Limit is inactive, just solve the prismatic constraint in block form
            let df = self.k.solve22(-cdot1);
            self.impulse.x += df.x;
            self.impulse.y += df.y;
            Vec3Fix::new(df.x, df.y, Fix64::ZERO)
        };

        let p = self.perp * df.x + self.axis * df.z;
        let l_a = df.x * self.s1 + df.y + df.z * self.a1;
        let l_b = df.x * self.s2 + df.y + df.z * self.a2;

        v_a -= p * m_a;
        w_a -= i_a * l_a;
        v_b += p * m_b;
        w_b += i_b * l_b;

        data.velocities[self.a.index] = Velocity { v: v_a, w: w_a };
        data.velocities[self.b.index] = Velocity { v: v_b, w: w_b };
    }

    fn solve_position_constraints(&mut self, data: &mut SolverData<'_>) -> bool {
        let (m_a, m_b, i_a, i_b) = (self.a.inv_mass, self.b.inv_mass, self.a.inv_i, self.b.inv_i);
        let Position { c: mut c_a, a: mut a_a } = data.positions[self.a.index];
        let Position { c: mut c_b, a: mut a_b } = data.positions[self.b.index];

        let j = self.jacobian(c_a, a_a, c_b, a_b);

        let c1 = Vec2Fix::new(j.perp.dot(j.d), a_b - a_a - self.reference_angle);
        let mut linear_error = c1.x.abs();
        let angular_error = c1.y.abs();

        let max = data.config.max_linear_correction;
        let mut active = false;
        let mut c2 = Fix64::ZERO;
        if self.enable_limit {
            let translation = j.axis.dot(j.d);
            if (self.upper_translation - self.lower_translation).abs() < LINEAR_SLOP.double() {
                // Prevent large linear corrections
                c2 = (translation - self.lower_translation).clamp(-max, max);
                linear_error = linear_error.max((translation - self.lower_translation).abs());
                active = true;
            } else if translation <= self.lower_translation {
                // Prevent large linear corrections and allow some slop
                c2 = (translation - self.lower_translation + LINEAR_SLOP).clamp(-max, Fix64::ZERO);
                linear_error = linear_error.max(self.lower_translation - translation);
                active = true;
            } else if translation >= self.upper_translation {
                c2 = (translation - self.upper_translation - LINEAR_SLOP).clamp(Fix64::ZERO, max);
                linear_error = linear_error.max(translation - self.upper_translation);
                active = true;
            }
        }

        let impulse = if active {
            let k = self.mass_matrix(&j);
            -k.solve33(Vec3Fix::new(c1.x, c1.y, c2))
        } else {
            let k3 = self.mass_matrix(&j);
            let k = Mat22::from_cols(Vec2Fix::new(k3.ex.x, k3.ex.y), Vec2Fix::new(k3.ey.x, k3.ey.y));
            let impulse1 = k.solve(-c1);
            Vec3Fix::new(impulse1.x, impulse1.y, Fix64::ZERO)
        };

        let p = j.perp * impulse.x + j.axis * impulse.z;
        let l_a = impulse.x * j.s1 + impulse.y + impulse.z * j.a1;
        let l_b = impulse.x * j.s2 + impulse.y + impulse.z * j.a2;

        c_a -= p * m_a;
        a_a -= i_a * l_a;
        c_b += p * m_b;
        a_b += i_b * l_b;

        data.positions[self.a.index] = Position { c: c_a, a: a_a };
        data.positions[self.b.index] = Position { c: c_b, a: a_b };

        linear_error <= LINEAR_SLOP && angular_error <= ANGULAR_SLOP
    }

    fn reaction_force(&self, inv_dt: Fix64) -> Vec2Fix {
        (self.perp * self.impulse.x + self.axis * (self.motor_impulse + self.impulse.z)) * inv_dt
    }

    fn reaction_torque(&self, inv_dt: Fix64) -> Fix64 {
        inv_dt * self.impulse.y
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

    fn vertical_slider() -> (Rig, PrismaticJoint) {
        let rig = Rig::pair(Vec2Fix::ZERO);
        let joint = PrismaticJoint::new(Vec2Fix::ZERO, Vec2Fix::ZERO, Vec2Fix::from_int(0, 1), Fix64::ZERO);
        (rig, joint)
    }

    #[test]
    fn test_slides_only_along_axis() {
        let (mut rig, mut joint) = vertical_slider();
        rig.gravity = Vec2Fix::from_int(5, -10);
        rig.run(&mut joint, 30);
        let p = rig.positions[1];
        assert!(p.c.x.abs() < Fix64::from_ratio(1, 100));
        assert!(p.a.abs() < Fix64::from_ratio(1, 100));
        assert!(p.c.y < Fix64::from_int(-1));
    }

    #[test]
    fn test_lower_limit_holds_and_pushes() {
        let (mut rig, joint) = vertical_slider();
        let mut joint = joint.with_limits(-Fix64::ONE, Fix64::ONE);
        for _ in 0..60 {
            rig.run(&mut joint, 1);
            if joint.limit_state() == LimitState::AtLower {
                assert!(!joint.limit_impulse().is_negative());
            }
        }
        assert_eq!(joint.limit_state(), LimitState::AtLower);
        assert!(rig.positions[1].c.y > -Fix64::ONE - Fix64::from_ratio(2, 100));
    }

    #[test]
    fn test_upper_limit_only_pulls_back() {
        let (mut rig, joint) = vertical_slider();
        rig.gravity = Vec2Fix::from_int(0, 10);
        let mut joint = joint.with_limits(-Fix64::ONE, Fix64::ONE);
        for _ in 0..60 {
            rig.run(&mut joint, 1);
            if joint.limit_state() == LimitState::AtUpper {
                assert!(!joint.limit_impulse().is_positive());
            }
        }
        assert_eq!(joint.limit_state(), LimitState::AtUpper);
    }

    #[test]
    fn test_motor_lifts_against_gravity() {
        let (mut rig, joint) = vertical_slider();
        let mut joint = joint.with_motor(Fix64::ONE, Fix64::from_int(1000));
        rig.run(&mut joint, 30);
        assert!((rig.velocities[1].v.y - Fix64::ONE).abs() < Fix64::from_ratio(5, 100));
        assert!(rig.positions[1].c.y > Fix64::ZERO);
    }

    #[test]
    fn test_axis_is_normalized() {
        let joint = PrismaticJoint::new(Vec2Fix::ZERO, Vec2Fix::ZERO, Vec2Fix::from_int(3, 4), Fix64::ZERO);
        let axis = joint.local_axis_a();
        assert!((axis.length() - Fix64::ONE).abs() < Fix64::from_ratio(1, 1000));
    }
}
