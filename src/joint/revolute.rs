//! Revolute joint: a shared anchor point with free relative rotation,
//! optional angle limits and a torque-limited motor.

use super::{inv_or_zero, lever, JointBodies, JointSolver, LimitState, SolverBody, SolverData};
use crate::body::Body;
use crate::island::{Position, Velocity};
use crate::math::{Fix64, Mat22, Mat33, Rot, Transform, Vec2Fix, Vec3Fix};
use crate::settings::{ANGULAR_SLOP, LINEAR_SLOP};

/// Hinge between two bodies.
#[derive(Clone, Copy, Debug)]
pub struct RevoluteJoint {
    local_anchor_a: Vec2Fix,
    local_anchor_b: Vec2Fix,
    reference_angle: Fix64,
    enable_limit: bool,
    lower_angle: Fix64,
    upper_angle: Fix64,
    enable_motor: bool,
    motor_speed: Fix64,
    max_motor_torque: Fix64,

    impulse: Vec3Fix,
    motor_impulse: Fix64,
    limit_state: LimitState,
    a: SolverBody,
    b: SolverBody,
    r_a: Vec2Fix,
    r_b: Vec2Fix,
    mass: Mat33,
    motor_mass: Fix64,
}

impl RevoluteJoint {
    /// Hinge at body-local anchors; `reference_angle` is `angle_b - angle_a`
    /// at zero joint angle.
    pub fn new(local_anchor_a: Vec2Fix, local_anchor_b: Vec2Fix, reference_angle: Fix64) -> Self {
        Self {
            local_anchor_a,
            local_anchor_b,
            reference_angle,
            enable_limit: false,
            lower_angle: Fix64::ZERO,
            upper_angle: Fix64::ZERO,
            enable_motor: false,
            motor_speed: Fix64::ZERO,
            max_motor_torque: Fix64::ZERO,
            impulse: Vec3Fix::ZERO,
            motor_impulse: Fix64::ZERO,
            limit_state: LimitState::Inactive,
            a: SolverBody::default(),
            b: SolverBody::default(),
            r_a: Vec2Fix::ZERO,
            r_b: Vec2Fix::ZERO,
            mass: Mat33::ZERO,
            motor_mass: Fix64::ZERO,
        }
    }

    /// Hinge at a world anchor, using the current body poses.
    pub fn from_world_anchor(body_a: &Body, body_b: &Body, anchor: Vec2Fix) -> Self {
        Self::new(
            body_a.local_point(anchor),
            body_b.local_point(anchor),
            body_b.angle() - body_a.angle(),
        )
    }

    pub fn with_limits(mut self, lower: Fix64, upper: Fix64) -> Self {
        self.enable_limit = true;
        self.set_limits(lower, upper);
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

    pub fn reference_angle(&self) -> Fix64 {
        self.reference_angle
    }

    /// Current joint angle.
    pub fn joint_angle(&self, body_a: &Body, body_b: &Body) -> Fix64 {
        body_b.sweep().a - body_a.sweep().a - self.reference_angle
    }

    /// Current relative angular speed.
    pub fn joint_speed(&self, body_a: &Body, body_b: &Body) -> Fix64 {
        body_b.angular_velocity() - body_a.angular_velocity()
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
        self.lower_angle
    }

    pub fn upper_limit(&self) -> Fix64 {
        self.upper_angle
    }

    /// Set the angle limits; `lower` must not exceed `upper`.
    pub fn set_limits(&mut self, lower: Fix64, upper: Fix64) {
        assert!(lower <= upper, "revolute lower limit above upper limit");
        if lower != self.lower_angle || upper != self.upper_angle {
            self.impulse.z = Fix64::ZERO;
            self.lower_angle = lower;
            self.upper_angle = upper;
        }
    }

    /// Limit classification of the last step.
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

    pub fn max_motor_torque(&self) -> Fix64 {
        self.max_motor_torque
    }

    pub fn set_max_motor_torque(&mut self, torque: Fix64) {
        self.max_motor_torque = torque;
    }

    /// Motor torque applied in the last step.
    pub fn motor_torque(&self, inv_dt: Fix64) -> Fix64 {
        inv_dt * self.motor_impulse
    }
}

impl JointSolver for RevoluteJoint {
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

        // J = [-I -r1_skew I r2_skew]
        //     [ 0       -1 0       1]
        let fixed_rotation = (i_a + i_b).is_zero();

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
        self.mass = Mat33 { ex, ey, ez };

        self.motor_mass = inv_or_zero(i_a + i_b);

        if !self.enable_motor || fixed_rotation {
            self.motor_impulse = Fix64::ZERO;
        }

        if self.enable_limit && !fixed_rotation {
            let joint_angle = a_b - a_a - self.reference_angle;
            if (self.upper_angle - self.lower_angle).abs() < ANGULAR_SLOP.double() {
                self.limit_state = LimitState::Equal;
            } else if joint_angle <= self.lower_angle {
                if self.limit_state != LimitState::AtLower {
                    self.impulse.z = Fix64::ZERO;
                }
                self.limit_state = LimitState::AtLower;
            } else if joint_angle >= self.upper_angle {
                if self.limit_state != LimitState::AtUpper {
                    self.impulse.z = Fix64::ZERO;
                }
                self.limit_state = LimitState::AtUpper;
            } else {
                self.limit_state = LimitState::Inactive;
                self.impulse.z = Fix64::ZERO;
            }
        } else {
            self.limit_state = LimitState::Inactive;
        }

        if data.step.warm_starting {
            // Scale impulses to support a variable time step
            self.impulse = self.impulse * data.step.dt_ratio;
            self.motor_impulse *= data.step.dt_ratio;

            let p = Vec2Fix::new(self.impulse.x, self.impulse.y);
            v_a -= p * m_a;
            w_a -= i_a * (r_a.cross(p) + self.motor_impulse + self.impulse.z);
            v_b += p * m_b;
            w_b += i_b * (r_b.cross(p) + self.motor_impulse + self.impulse.z);
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
        let (r_a, r_b) = (self.r_a, self.r_b);

        let fixed_rotation = (i_a + i_b).is_zero();

        // Solve motor constraint
        if self.enable_motor && self.limit_state != LimitState::Equal && !fixed_rotation {
            let cdot = w_b - w_a - self.motor_speed;
            let impulse = -self.motor_mass * cdot;
            let old = self.motor_impulse;
            let max = data.step.dt * self.max_motor_torque;
            self.motor_impulse = (old + impulse).clamp(-max, max);
            let impulse = self.motor_impulse - old;

            w_a -= i_a * impulse;
            w_b += i_b * impulse;
        }

        // Solve limit constraint
        if self.enable_limit && self.limit_state != LimitState::Inactive && !fixed_rotation {
            let cdot1 = v_b + Vec2Fix::scalar_cross(w_b, r_b) - v_a - Vec2Fix::scalar_cross(w_a, r_a);
            let cdot2 = w_b - w_a;
            let cdot = Vec3Fix::new(cdot1.x, cdot1.y, cdot2);

            let mut impulse = -self.mass.solve33(cdot);

            match self.limit_state {
                LimitState::Equal => self.impulse = self.impulse + impulse,
                LimitState::AtLower | LimitState::AtUpper => {
                    let new_impulse = self.impulse.z + impulse.z;
                    let violates = match self.limit_state {
                        LimitState::AtLower => new_impulse.is_negative(),
                        _ => new_impulse.is_positive(),
                    };
                    if violates {
                        // Drop the limit row and solve the point constraint alone
                        let rhs = -cdot1 + Vec2Fix::new(self.mass.ez.x, self.mass.ez.y) * self.impulse.z;
                        let reduced = self.mass.solve22(rhs);
                        impulse = Vec3Fix::new(reduced.x, reduced.y, -self.impulse.z);
                        self.impulse.x += reduced.x;
                        self.impulse.y += reduced.y;
                        self.impulse.z = Fix64::ZERO;
                    } else {
                        self.impulse = self.impulse + impulse;
                    }
                }
                LimitState::Inactive => {}
            }

            let p = Vec2Fix::new(impulse.x, impulse.y);
            v_a -= p * m_a;
            w_a -= i_a * (r_a.cross(p) + impulse.z);
            v_b += p * m_b;
            w_b += i_b * (r_b.cross(p) + impulse.z);
        } else {
            // Solve point to point constraint
            let cdot = v_b + Vec2Fix::scalar_cross(w_b, r_b) - v_a - Vec2Fix::scalar_cross(w_a, r_a);
            let impulse = self.mass.solve22(-cdot);

            self.impulse.x += impulse.x;
            self.impulse.y += impulse.y;

            v_a -= impulse * m_a;
            w_a -= i_a * r_a.cross(impulse);
            v_b += impulse * m_b;
            w_b += i_b * r_b.cross(impulse);
        }

        data.velocities[self.a.index] = Velocity { v: v_a, w: w_a };
        data.velocities[self.b.index] = Velocity { v: v_b, w: w_b };
    }

    fn solve_position_constraints(&mut self, data: &mut SolverData<'_>) -> bool {
        let (m_a, m_b, i_a, i_b) = (self.a.inv_mass, self.b.inv_mass, self.a.inv_i, self.b.inv_i);
        let Position { c: mut c_a, a: mut a_a } = data.positions[self.a.index];
        let Position { c: mut c_b, a: mut a_b } = data.positions[self.b.index];

        let mut angular_error = Fix64::ZERO;
        let fixed_rotation = (i_a + i_b).is_zero();

        // Solve angular limit constraint
        if self.enable_limit && self.limit_state != LimitState::Inactive && !fixed_rotation {
            let angle = a_b - a_a - self.reference_angle;
            let max = data.config.max_angular_correction;

            let c = match self.limit_state {
                LimitState::Equal => {
                    // Prevent large angular corrections
                    let c = (angle - self.lower_angle).clamp(-max, max);
                    angular_error = c.abs();
                    c
                }
                LimitState::AtLower => {
                    let c = angle - self.lower_angle;
                    angular_error = -c;
                    // Prevent large angular corrections and allow some slop
                    (c + ANGULAR_SLOP).clamp(-max, Fix64::ZERO)
                }
                LimitState::AtUpper => {
                    let c = angle - self.upper_angle;
                    angular_error = c;
                    (c - ANGULAR_SLOP).clamp(Fix64::ZERO, max)
                }
                LimitState::Inactive => Fix64::ZERO,
            };
            let limit_impulse = -self.motor_mass * c;
            a_a -= i_a * limit_impulse;
            a_b += i_b * limit_impulse;
        }

        // Solve point to point constraint
        let r_a = lever(Rot::from_angle(a_a), self.local_anchor_a, self.a.local_center);
        let r_b = lever(Rot::from_angle(a_b), self.local_anchor_b, self.b.local_center);

        let c = c_b + r_b - c_a - r_a;
        let position_error = c.length();

        let k = Mat22::from_cols(
            Vec2Fix::new(
                m_a + m_b + i_a * r_a.y * r_a.y + i_b * r_b.y * r_b.y,
                -i_a * r_a.x * r_a.y - i_b * r_b.x * r_b.y,
            ),
            Vec2Fix::new(
                -i_a * r_a.x * r_a.y - i_b * r_b.x * r_b.y,
                m_a + m_b + i_a * r_a.x * r_a.x + i_b * r_b.x * r_b.x,
            ),
        );
        let impulse = -k.solve(c);

        c_a -= impulse * m_a;
        a_a -= i_a * r_a.cross(impulse);
        c_b += impulse * m_b;
        a_b += i_b * r_b.cross(impulse);

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

    fn hinge_at_origin() -> (Rig, RevoluteJoint) {
        // Body B centered at (1, 0), hinged to the ground at the origin
        let rig = Rig::pair(Vec2Fix::from_int(1, 0));
        let joint = RevoluteJoint::new(Vec2Fix::ZERO, Vec2Fix::from_int(-1, 0), Fix64::ZERO);
        (rig, joint)
    }

    #[test]
    fn test_anchor_stays_together() {
        let (mut rig, mut joint) = hinge_at_origin();
        rig.run(&mut joint, 60);
        let anchor_b = joint.anchor_b(&rig.transform(1));
        assert!(anchor_b.length() < Fix64::from_ratio(1, 100), "anchor drift {anchor_b:?}");
        assert!(rig.positions[1].a < Fix64::ZERO);
    }

    #[test]
    fn test_lower_limit_only_pushes() {
        let (mut rig, joint) = hinge_at_origin();
        let quarter = Fix64::HALF_PI.half();
        let mut joint = joint.with_limits(-quarter, quarter);

        for _ in 0..60 {
            rig.run(&mut joint, 1);
            if joint.limit_state() == LimitState::AtLower {
                assert!(!joint.limit_impulse().is_negative());
            }
        }
        assert_eq!(joint.limit_state(), LimitState::AtLower);
        assert!(rig.positions[1].a > -quarter - Fix64::from_ratio(5, 100));
    }

    #[test]
    fn test_upper_limit_only_pushes() {
        let (mut rig, joint) = hinge_at_origin();
        rig.gravity = Vec2Fix::from_int(0, 10);
        let quarter = Fix64::HALF_PI.half();
        let mut joint = joint.with_limits(-quarter, quarter);

        for _ in 0..60 {
            rig.run(&mut joint, 1);
            if joint.limit_state() == LimitState::AtUpper {
                assert!(!joint.limit_impulse().is_positive());
            }
        }
        assert_eq!(joint.limit_state(), LimitState::AtUpper);
        assert!(rig.positions[1].a < quarter + Fix64::from_ratio(5, 100));
    }

    #[test]
    fn test_motor_drives_speed() {
        let (mut rig, joint) = hinge_at_origin();
        rig.gravity = Vec2Fix::ZERO;
        let mut joint = joint.with_motor(Fix64::TWO, Fix64::from_int(100));
        rig.run(&mut joint, 10);
        assert!((rig.velocities[1].w - Fix64::TWO).abs() < Fix64::from_ratio(5, 100));
        assert!(joint.motor_torque(rig.step.inv_dt).abs() <= Fix64::from_ratio(100_001, 1000));
    }

    #[test]
    fn test_motor_torque_is_capped() {
        let (mut rig, joint) = hinge_at_origin();
        rig.gravity = Vec2Fix::ZERO;
        let mut joint = joint.with_motor(Fix64::from_int(50), Fix64::ONE);
        rig.run(&mut joint, 1);
        // One step at 1 N·m cannot spin the lever up to 50 rad/s
        assert!(rig.velocities[1].w < Fix64::ONE);
    }

    #[test]
    #[should_panic(expected = "lower limit above upper")]
    fn test_inverted_limits_panic() {
        RevoluteJoint::new(Vec2Fix::ZERO, Vec2Fix::ZERO, Fix64::ZERO).with_limits(Fix64::ONE, Fix64::ZERO);
    }
}
