//! Rigid Bodies
//!
//! A body is a rigid frame carrying fixtures. Its pose lives twice: as a
//! [`Transform`] of the body origin and as a [`Sweep`] of the center of mass
//! over the current step (for continuous collision).
//!
//! Structural changes (adding fixtures, changing type, teleporting) go
//! through [`World`](crate::world::World) because they touch the broad
//! phase and contacts. Velocity, force and impulse setters live here.

use crate::fixture::Fixture;
use crate::joint::Joint;
use crate::math::{Fix64, Rot, Sweep, Transform, Vec2Fix};
use crate::pool::{BodyId, ContactId, FixtureId, JointId, Pool};
use crate::shape::MassData;

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

/// Body simulation type
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BodyType {
    /// Zero velocity, infinite mass, moved only by the user
    #[default]
    Static,
    /// Moved by its velocity, infinite mass
    Kinematic,
    /// Fully simulated
    Dynamic,
}

/// Body construction parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BodyDef {
    /// Simulation type
    pub body_type: BodyType,
    /// World position of the body origin
    pub position: Vec2Fix,
    /// World angle in radians
    pub angle: Fix64,
    /// Linear velocity of the origin
    pub linear_velocity: Vec2Fix,
    /// Angular velocity
    pub angular_velocity: Fix64,
    /// Linear damping
    pub linear_damping: Fix64,
    /// Angular damping
    pub angular_damping: Fix64,
    /// May this body fall asleep?
    pub allow_sleep: bool,
    /// Initially awake?
    pub awake: bool,
    /// Prevent rotation
    pub fixed_rotation: bool,
    /// Continuous collision against other dynamic bodies
    pub bullet: bool,
    /// Participates in the simulation
    pub enabled: bool,
    /// Gravity multiplier
    pub gravity_scale: Fix64,
    /// Application data
    pub user_data: u64,
}

impl Default for BodyDef {
    fn default() -> Self {
        Self {
            body_type: BodyType::Static,
            position: Vec2Fix::ZERO,
            angle: Fix64::ZERO,
            linear_velocity: Vec2Fix::ZERO,
            angular_velocity: Fix64::ZERO,
            linear_damping: Fix64::ZERO,
            angular_damping: Fix64::ZERO,
            allow_sleep: true,
            awake: true,
            fixed_rotation: false,
            bullet: false,
            enabled: true,
            gravity_scale: Fix64::ONE,
            user_data: 0,
        }
    }
}

impl BodyDef {
    /// Definition of the given type, otherwise default
    pub fn new(body_type: BodyType) -> Self {
        Self {
            body_type,
            ..Self::default()
        }
    }

    /// Dynamic body definition
    pub fn dynamic() -> Self {
        Self::new(BodyType::Dynamic)
    }

    /// Kinematic body definition
    pub fn kinematic() -> Self {
        Self::new(BodyType::Kinematic)
    }

    /// Builder: position
    #[must_use]
    pub fn with_position(mut self, position: Vec2Fix) -> Self {
        self.position = position;
        self
    }

    /// Builder: angle
    #[must_use]
    pub fn with_angle(mut self, angle: Fix64) -> Self {
        self.angle = angle;
        self
    }

    /// Builder: linear velocity
    #[must_use]
    pub fn with_linear_velocity(mut self, v: Vec2Fix) -> Self {
        self.linear_velocity = v;
        self
    }

    /// Builder: angular velocity
    #[must_use]
    pub fn with_angular_velocity(mut self, w: Fix64) -> Self {
        self.angular_velocity = w;
        self
    }

    /// Builder: damping
    #[must_use]
    pub fn with_damping(mut self, linear: Fix64, angular: Fix64) -> Self {
        self.linear_damping = linear;
        self.angular_damping = angular;
        self
    }

    /// Builder: gravity scale
    #[must_use]
    pub fn with_gravity_scale(mut self, scale: Fix64) -> Self {
        self.gravity_scale = scale;
        self
    }

    /// Builder: bullet flag
    #[must_use]
    pub fn bullet(mut self) -> Self {
        self.bullet = true;
        self
    }

    /// Builder: fixed rotation
    #[must_use]
    pub fn fixed_rotation(mut self) -> Self {
        self.fixed_rotation = true;
        self
    }

    /// Builder: sleeping allowed
    #[must_use]
    pub fn with_allow_sleep(mut self, allow: bool) -> Self {
        self.allow_sleep = allow;
        self
    }

    /// Builder: start asleep
    #[must_use]
    pub fn asleep(mut self) -> Self {
        self.awake = false;
        self
    }

    /// Builder: start disabled
    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Builder: user data
    #[must_use]
    pub fn with_user_data(mut self, user_data: u64) -> Self {
        self.user_data = user_data;
        self
    }
}

/// Adjacency entry: a joint attached to this body.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct JointEdge {
    /// Body on the other end
    pub other: BodyId,
    /// The joint
    pub joint: JointId,
}

/// Adjacency entry: a contact involving this body.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ContactEdge {
    /// Body on the other side
    pub other: BodyId,
    /// The contact
    pub contact: ContactId,
}

/// A rigid body.
#[derive(Clone, Debug)]
pub struct Body {
    pub(crate) id: BodyId,
    pub(crate) body_type: BodyType,

    pub(crate) xf: Transform,
    pub(crate) sweep: Sweep,

    pub(crate) linear_velocity: Vec2Fix,
    pub(crate) angular_velocity: Fix64,
    pub(crate) force: Vec2Fix,
    pub(crate) torque: Fix64,

    pub(crate) mass: Fix64,
    pub(crate) inv_mass: Fix64,
    /// Rotational inertia about the center of mass
    pub(crate) inertia: Fix64,
    pub(crate) inv_i: Fix64,

    pub(crate) linear_damping: Fix64,
    pub(crate) angular_damping: Fix64,
    pub(crate) gravity_scale: Fix64,
    pub(crate) sleep_time: Fix64,

    pub(crate) awake: bool,
    pub(crate) auto_sleep: bool,
    pub(crate) bullet: bool,
    pub(crate) fixed_rotation: bool,
    pub(crate) enabled: bool,
    pub(crate) island_flag: bool,
    /// Set once `process_changes` has admitted the body
    pub(crate) in_world: bool,
    pub(crate) island_index: usize,

    pub(crate) fixtures: Vec<FixtureId>,
    pub(crate) joint_edges: Vec<JointEdge>,
    pub(crate) contact_edges: Vec<ContactEdge>,

    pub(crate) user_data: u64,
}

impl Body {
    pub(crate) fn new(id: BodyId, def: &BodyDef) -> Self {
        assert!(def.position.is_valid(), "body position must be valid");
        assert!(def.angle.is_valid(), "body angle must be valid");
        assert!(def.linear_velocity.is_valid(), "body velocity must be valid");
        assert!(def.angular_velocity.is_valid(), "body angular velocity must be valid");
        assert!(
            !def.linear_damping.is_negative() && !def.angular_damping.is_negative(),
            "damping must be >= 0"
        );

        let xf = Transform::new(def.position, def.angle);
        let sweep = Sweep {
            local_center: Vec2Fix::ZERO,
            c0: xf.p,
            c: xf.p,
            a0: def.angle,
            a: def.angle,
            alpha0: Fix64::ZERO,
        };

        let dynamic = def.body_type == BodyType::Dynamic;
        let (mass, inv_mass) = if dynamic {
            (Fix64::ONE, Fix64::ONE)
        } else {
            (Fix64::ZERO, Fix64::ZERO)
        };
        let moving = def.body_type != BodyType::Static;

        Self {
            id,
            body_type: def.body_type,
            xf,
            sweep,
            linear_velocity: if moving { def.linear_velocity } else { Vec2Fix::ZERO },
            angular_velocity: if moving { def.angular_velocity } else { Fix64::ZERO },
            force: Vec2Fix::ZERO,
            torque: Fix64::ZERO,
            mass,
            inv_mass,
            inertia: Fix64::ZERO,
            inv_i: Fix64::ZERO,
            linear_damping: def.linear_damping,
            angular_damping: def.angular_damping,
            gravity_scale: def.gravity_scale,
            sleep_time: Fix64::ZERO,
            awake: def.awake && moving,
            auto_sleep: def.allow_sleep,
            bullet: def.bullet,
            fixed_rotation: def.fixed_rotation,
            enabled: def.enabled,
            island_flag: false,
            in_world: false,
            island_index: 0,
            fixtures: Vec::new(),
            joint_edges: Vec::new(),
            contact_edges: Vec::new(),
            user_data: def.user_data,
        }
    }

    // =========== Accessors ===========

    /// Handle of this body
    #[inline]
    pub fn id(&self) -> BodyId {
        self.id
    }

    /// Simulation type
    #[inline]
    pub fn body_type(&self) -> BodyType {
        self.body_type
    }

    /// World position of the body origin
    #[inline]
    pub fn position(&self) -> Vec2Fix {
        self.xf.p
    }

    /// World angle in radians (not wrapped)
    #[inline]
    pub fn angle(&self) -> Fix64 {
        self.sweep.a
    }

    /// Rotation of the body frame
    #[inline]
    pub fn rotation(&self) -> Rot {
        self.xf.q
    }

    /// Body transform
    #[inline]
    pub fn transform(&self) -> &Transform {
        &self.xf
    }

    /// Motion of the center of mass over the current step
    #[inline]
    pub fn sweep(&self) -> &Sweep {
        &self.sweep
    }

    /// World center of mass
    #[inline]
    pub fn world_center(&self) -> Vec2Fix {
        self.sweep.c
    }

    /// Local center of mass
    #[inline]
    pub fn local_center(&self) -> Vec2Fix {
        self.sweep.local_center
    }

    /// Linear velocity of the center of mass
    #[inline]
    pub fn linear_velocity(&self) -> Vec2Fix {
        self.linear_velocity
    }

    /// Angular velocity
    #[inline]
    pub fn angular_velocity(&self) -> Fix64 {
        self.angular_velocity
    }

    /// Accumulated force
    #[inline]
    pub fn force(&self) -> Vec2Fix {
        self.force
    }

    /// Accumulated torque
    #[inline]
    pub fn torque(&self) -> Fix64 {
        self.torque
    }

    /// Total mass
    #[inline]
    pub fn mass(&self) -> Fix64 {
        self.mass
    }

    /// Inverse mass (zero for static and kinematic bodies)
    #[inline]
    pub fn inv_mass(&self) -> Fix64 {
        self.inv_mass
    }

    /// Rotational inertia about the body origin
    pub fn inertia(&self) -> Fix64 {
        let lc = self.sweep.local_center;
        self.inertia + self.mass * lc.dot(lc)
    }

    /// Mass properties relative to the body origin
    pub fn mass_data(&self) -> MassData {
        MassData {
            mass: self.mass,
            center: self.sweep.local_center,
            inertia: self.inertia(),
        }
    }

    /// Linear damping
    #[inline]
    pub fn linear_damping(&self) -> Fix64 {
        self.linear_damping
    }

    /// Angular damping
    #[inline]
    pub fn angular_damping(&self) -> Fix64 {
        self.angular_damping
    }

    /// Gravity multiplier
    #[inline]
    pub fn gravity_scale(&self) -> Fix64 {
        self.gravity_scale
    }

    /// Time spent below the sleep tolerances
    #[inline]
    pub fn sleep_time(&self) -> Fix64 {
        self.sleep_time
    }

    /// Is the body awake?
    #[inline]
    pub fn is_awake(&self) -> bool {
        self.awake
    }

    /// May the body fall asleep?
    #[inline]
    pub fn is_sleeping_allowed(&self) -> bool {
        self.auto_sleep
    }

    /// Bullet (continuous collision against dynamic bodies)?
    #[inline]
    pub fn is_bullet(&self) -> bool {
        self.bullet
    }

    /// Rotation locked?
    #[inline]
    pub fn is_fixed_rotation(&self) -> bool {
        self.fixed_rotation
    }

    /// Participates in the simulation?
    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Has the body been admitted by `process_changes`?
    #[inline]
    pub fn is_in_world(&self) -> bool {
        self.in_world
    }

    /// Attached fixtures
    #[inline]
    pub fn fixtures(&self) -> &[FixtureId] {
        &self.fixtures
    }

    /// Attached joints
    #[inline]
    pub fn joint_edges(&self) -> &[JointEdge] {
        &self.joint_edges
    }

    /// Contacts involving this body
    #[inline]
    pub fn contact_edges(&self) -> &[ContactEdge] {
        &self.contact_edges
    }

    /// Application data
    #[inline]
    pub fn user_data(&self) -> u64 {
        self.user_data
    }

    /// Set application data
    pub fn set_user_data(&mut self, user_data: u64) {
        self.user_data = user_data;
    }

    // =========== Coordinate helpers ===========

    /// Local point to world
    #[inline]
    pub fn world_point(&self, local_point: Vec2Fix) -> Vec2Fix {
        self.xf.apply(local_point)
    }

    /// Local vector to world
    #[inline]
    pub fn world_vector(&self, local_vector: Vec2Fix) -> Vec2Fix {
        self.xf.q.apply(local_vector)
    }

    /// World point to local
    #[inline]
    pub fn local_point(&self, world_point: Vec2Fix) -> Vec2Fix {
        self.xf.apply_inv(world_point)
    }

    /// World vector to local
    #[inline]
    pub fn local_vector(&self, world_vector: Vec2Fix) -> Vec2Fix {
        self.xf.q.apply_inv(world_vector)
    }

    /// Velocity of a world point attached to this body
    pub fn linear_velocity_from_world_point(&self, world_point: Vec2Fix) -> Vec2Fix {
        self.linear_velocity
            + Vec2Fix::scalar_cross(self.angular_velocity, world_point - self.sweep.c)
    }

    /// Velocity of a local point attached to this body
    pub fn linear_velocity_from_local_point(&self, local_point: Vec2Fix) -> Vec2Fix {
        self.linear_velocity_from_world_point(self.world_point(local_point))
    }

    // =========== Velocity / force API ===========

    /// Set the linear velocity of the center of mass. Ignored for static bodies.
    pub fn set_linear_velocity(&mut self, v: Vec2Fix) {
        assert!(v.is_valid(), "linear velocity must be valid");
        if self.body_type == BodyType::Static {
            return;
        }
        if v.dot(v).is_positive() {
            self.set_awake(true);
        }
        self.linear_velocity = v;
    }

    /// Set the angular velocity. Ignored for static bodies.
    pub fn set_angular_velocity(&mut self, w: Fix64) {
        assert!(w.is_valid(), "angular velocity must be valid");
        if self.body_type == BodyType::Static {
            return;
        }
        if !w.is_zero() {
            self.set_awake(true);
        }
        self.angular_velocity = w;
    }

    /// Apply a force at a world point.
    pub fn apply_force(&mut self, force: Vec2Fix, point: Vec2Fix, wake: bool) {
        assert!(force.is_valid() && point.is_valid(), "force must be valid");
        if self.body_type != BodyType::Dynamic {
            return;
        }
        if wake && !self.awake {
            self.set_awake(true);
        }
        if self.awake {
            self.force += force;
            self.torque += (point - self.sweep.c).cross(force);
        }
    }

    /// Apply a force at the center of mass.
    pub fn apply_force_to_center(&mut self, force: Vec2Fix, wake: bool) {
        assert!(force.is_valid(), "force must be valid");
        if self.body_type != BodyType::Dynamic {
            return;
        }
        if wake && !self.awake {
            self.set_awake(true);
        }
        if self.awake {
            self.force += force;
        }
    }

    /// Apply a torque.
    pub fn apply_torque(&mut self, torque: Fix64, wake: bool) {
        assert!(torque.is_valid(), "torque must be valid");
        if self.body_type != BodyType::Dynamic {
            return;
        }
        if wake && !self.awake {
            self.set_awake(true);
        }
        if self.awake {
            self.torque += torque;
        }
    }

    /// Apply an impulse at a world point; changes velocity immediately.
    pub fn apply_linear_impulse(&mut self, impulse: Vec2Fix, point: Vec2Fix, wake: bool) {
        assert!(impulse.is_valid() && point.is_valid(), "impulse must be valid");
        if self.body_type != BodyType::Dynamic {
            return;
        }
        if wake && !self.awake {
            self.set_awake(true);
        }
        if self.awake {
            self.linear_velocity += impulse * self.inv_mass;
            self.angular_velocity += self.inv_i * (point - self.sweep.c).cross(impulse);
        }
    }

    /// Apply an angular impulse.
    pub fn apply_angular_impulse(&mut self, impulse: Fix64, wake: bool) {
        assert!(impulse.is_valid(), "impulse must be valid");
        if self.body_type != BodyType::Dynamic {
            return;
        }
        if wake && !self.awake {
            self.set_awake(true);
        }
        if self.awake {
            self.angular_velocity += self.inv_i * impulse;
        }
    }

    /// Wake the body, or put it to sleep (zeroing velocities and forces).
    /// Static bodies never wake.
    pub fn set_awake(&mut self, flag: bool) {
        if self.body_type == BodyType::Static {
            return;
        }
        if flag {
            if !self.awake {
                self.awake = true;
                self.sleep_time = Fix64::ZERO;
            }
        } else {
            self.awake = false;
            self.sleep_time = Fix64::ZERO;
            self.linear_velocity = Vec2Fix::ZERO;
            self.angular_velocity = Fix64::ZERO;
            self.force = Vec2Fix::ZERO;
            self.torque = Fix64::ZERO;
        }
    }

    /// Allow or forbid sleeping; forbidding wakes the body.
    pub fn set_sleeping_allowed(&mut self, flag: bool) {
        self.auto_sleep = flag;
        if !flag {
            self.set_awake(true);
        }
    }

    /// Toggle continuous collision against dynamic bodies.
    pub fn set_bullet(&mut self, flag: bool) {
        self.bullet = flag;
    }

    /// Set the gravity multiplier.
    pub fn set_gravity_scale(&mut self, scale: Fix64) {
        self.gravity_scale = scale;
    }

    /// Set linear damping.
    pub fn set_linear_damping(&mut self, damping: Fix64) {
        self.linear_damping = damping;
    }

    /// Set angular damping.
    pub fn set_angular_damping(&mut self, damping: Fix64) {
        self.angular_damping = damping;
    }

    // =========== Mass ===========

    /// Recompute mass, center and inertia from the attached fixtures.
    ///
    /// Zero-density fixtures contribute nothing; a dynamic body without mass
    /// gets unit mass.
    pub fn reset_mass_data(&mut self, fixtures: &Pool<FixtureId, Fixture>) {
        self.mass = Fix64::ZERO;
        self.inv_mass = Fix64::ZERO;
        self.inertia = Fix64::ZERO;
        self.inv_i = Fix64::ZERO;
        self.sweep.local_center = Vec2Fix::ZERO;

        if self.body_type != BodyType::Dynamic {
            self.sweep.c0 = self.xf.p;
            self.sweep.c = self.xf.p;
            self.sweep.a0 = self.sweep.a;
            return;
        }

        let mut local_center = Vec2Fix::ZERO;
        for &fid in &self.fixtures {
            let fixture = &fixtures[fid];
            if fixture.density.is_zero() {
                continue;
            }
            let md = fixture.mass_data();
            self.mass += md.mass;
            local_center += md.center * md.mass;
            self.inertia += md.inertia;
        }

        if self.mass.is_positive() {
            self.inv_mass = Fix64::ONE / self.mass;
            local_center *= self.inv_mass;
        } else {
            self.mass = Fix64::ONE;
            self.inv_mass = Fix64::ONE;
        }

        self.apply_rotational_inertia(local_center);
        self.move_center(local_center);
    }

    /// Override the mass properties. Ignored for non-dynamic bodies.
    pub fn set_mass_data(&mut self, data: &MassData) {
        assert!(data.mass.is_valid() && data.inertia.is_valid(), "mass data must be valid");
        if self.body_type != BodyType::Dynamic {
            return;
        }

        self.inv_mass = Fix64::ZERO;
        self.inertia = data.inertia;
        self.inv_i = Fix64::ZERO;

        self.mass = if data.mass.is_positive() { data.mass } else { Fix64::ONE };
        self.inv_mass = Fix64::ONE / self.mass;

        self.apply_rotational_inertia(data.center);
        self.move_center(data.center);
    }

    /// `self.inertia` holds inertia about the origin on entry.
    fn apply_rotational_inertia(&mut self, local_center: Vec2Fix) {
        if self.inertia.is_positive() && !self.fixed_rotation {
            // Shift to the center of mass
            self.inertia -= self.mass * local_center.dot(local_center);
            debug_assert!(self.inertia.is_positive());
            self.inv_i = Fix64::ONE / self.inertia;
        } else {
            self.inertia = Fix64::ZERO;
            self.inv_i = Fix64::ZERO;
        }
    }

    fn move_center(&mut self, local_center: Vec2Fix) {
        let old_center = self.sweep.c;
        self.sweep.local_center = local_center;
        self.sweep.c = self.xf.apply(local_center);
        self.sweep.c0 = self.sweep.c;

        // Keep the velocity of the origin
        self.linear_velocity +=
            Vec2Fix::scalar_cross(self.angular_velocity, self.sweep.c - old_center);
    }

    // =========== Internal ===========

    pub(crate) fn set_transform_internal(&mut self, position: Vec2Fix, angle: Fix64) {
        assert!(position.is_valid() && angle.is_valid(), "transform must be valid");
        self.xf = Transform::new(position, angle);
        self.sweep.c = self.xf.apply(self.sweep.local_center);
        self.sweep.a = angle;
        self.sweep.c0 = self.sweep.c;
        self.sweep.a0 = angle;
    }

    /// Transform at the start of the sweep.
    pub(crate) fn sweep_start_transform(&self) -> Transform {
        let q = Rot::from_angle(self.sweep.a0);
        Transform {
            p: self.sweep.c0 - q.apply(self.sweep.local_center),
            q,
        }
    }

    /// Rebuild the transform from the end of the sweep.
    pub(crate) fn synchronize_transform(&mut self) {
        self.xf.q = Rot::from_angle(self.sweep.a);
        self.xf.p = self.sweep.c - self.xf.q.apply(self.sweep.local_center);
    }

    /// Advance to the time of impact and snap the end of the sweep to it.
    pub(crate) fn advance(&mut self, alpha: Fix64) {
        self.sweep.advance(alpha);
        self.sweep.c = self.sweep.c0;
        self.sweep.a = self.sweep.a0;
        self.synchronize_transform();
    }

    /// Can contacts between these two bodies exist at all?
    ///
    /// One side must be dynamic and no enabled joint between them may
    /// disable collision.
    pub(crate) fn should_collide(&self, other: &Body, joints: &Pool<JointId, Joint>) -> bool {
        if self.body_type != BodyType::Dynamic && other.body_type != BodyType::Dynamic {
            return false;
        }
        !self.joint_edges.iter().any(|edge| {
            edge.other == other.id && {
                let joint = &joints[edge.joint];
                joint.enabled && !joint.collide_connected
            }
        })
    }

    pub(crate) fn remove_contact_edge(&mut self, contact: ContactId) {
        self.contact_edges.retain(|edge| edge.contact != contact);
    }

    pub(crate) fn remove_joint_edge(&mut self, joint: JointId) {
        self.joint_edges.retain(|edge| edge.joint != joint);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::FixtureDef;
    use crate::pool::PoolKey;
    use crate::shape::{CircleShape, PolygonShape};

    fn near(a: Fix64, b: Fix64) -> bool {
        (a - b).abs() < Fix64::from_ratio(1, 1000)
    }

    fn make_body(def: &BodyDef) -> Body {
        Body::new(BodyId::from_parts(0, 0), def)
    }

    fn attach(body: &mut Body, fixtures: &mut Pool<FixtureId, Fixture>, def: FixtureDef) {
        let id = fixtures.insert(Fixture::new(body.id, def));
        body.fixtures.push(id);
    }

    #[test]
    fn test_mass_aggregation() {
        let mut fixtures = Pool::new();
        let mut body = make_body(&BodyDef::dynamic());

        let left = PolygonShape::new_oriented_box(
            Fix64::HALF,
            Fix64::HALF,
            Vec2Fix::from_int(-1, 0),
            Fix64::ZERO,
        );
        let right = PolygonShape::new_oriented_box(
            Fix64::HALF,
            Fix64::HALF,
            Vec2Fix::from_int(1, 0),
            Fix64::ZERO,
        );
        attach(&mut body, &mut fixtures, FixtureDef::new(left).with_density(Fix64::ONE));
        attach(&mut body, &mut fixtures, FixtureDef::new(right).with_density(Fix64::from_int(3)));
        body.reset_mass_data(&fixtures);

        // m = 1 + 3, center = (1 * -1 + 3 * 1) / 4
        assert!(near(body.mass(), Fix64::from_int(4)));
        assert!(near(body.local_center().x, Fix64::HALF));
        assert!(near(body.local_center().y, Fix64::ZERO));
        assert!(near(body.inv_mass, Fix64::from_ratio(1, 4)));
        assert!(body.inertia > Fix64::ZERO);
        assert_eq!(body.world_center(), body.world_point(body.local_center()));
    }

    #[test]
    fn test_zero_density_forces_unit_mass() {
        let mut fixtures = Pool::new();
        let mut body = make_body(&BodyDef::dynamic());
        attach(&mut body, &mut fixtures, FixtureDef::new(CircleShape::new(Fix64::ONE)));
        body.reset_mass_data(&fixtures);
        assert_eq!(body.mass(), Fix64::ONE);
        assert_eq!(body.inv_mass(), Fix64::ONE);
        assert_eq!(body.inv_i, Fix64::ZERO);
    }

    #[test]
    fn test_static_body_has_no_mass() {
        let mut fixtures = Pool::new();
        let mut body = make_body(&BodyDef::default());
        attach(
            &mut body,
            &mut fixtures,
            FixtureDef::new(CircleShape::new(Fix64::ONE)).with_density(Fix64::ONE),
        );
        body.reset_mass_data(&fixtures);
        assert_eq!(body.mass(), Fix64::ZERO);
        assert_eq!(body.inv_mass(), Fix64::ZERO);
    }

    #[test]
    fn test_fixed_rotation_has_no_inertia() {
        let mut fixtures = Pool::new();
        let mut body = make_body(&BodyDef::dynamic().fixed_rotation());
        attach(
            &mut body,
            &mut fixtures,
            FixtureDef::new(CircleShape::new(Fix64::ONE)).with_density(Fix64::ONE),
        );
        body.reset_mass_data(&fixtures);
        assert!(body.mass() > Fix64::ZERO);
        assert_eq!(body.inv_i, Fix64::ZERO);
    }

    #[test]
    fn test_sleep_zeroes_motion() {
        let mut body = make_body(&BodyDef::dynamic().with_linear_velocity(Vec2Fix::from_int(3, 0)));
        body.apply_force_to_center(Vec2Fix::from_int(1, 1), true);
        body.set_awake(false);
        assert!(!body.is_awake());
        assert_eq!(body.linear_velocity(), Vec2Fix::ZERO);
        assert_eq!(body.force(), Vec2Fix::ZERO);

        body.sleep_time = Fix64::ONE;
        body.set_awake(true);
        assert_eq!(body.sleep_time(), Fix64::ZERO);
    }

    #[test]
    fn test_forces_ignored_on_static() {
        let mut body = make_body(&BodyDef::default());
        body.apply_force_to_center(Vec2Fix::from_int(5, 0), true);
        body.apply_linear_impulse(Vec2Fix::from_int(5, 0), Vec2Fix::ZERO, true);
        body.set_linear_velocity(Vec2Fix::from_int(1, 0));
        assert_eq!(body.force(), Vec2Fix::ZERO);
        assert_eq!(body.linear_velocity(), Vec2Fix::ZERO);
        assert!(!body.is_awake());
    }

    #[test]
    fn test_impulse_off_center_spins() {
        let mut fixtures = Pool::new();
        let mut body = make_body(&BodyDef::dynamic());
        attach(
            &mut body,
            &mut fixtures,
            FixtureDef::new(PolygonShape::new_box(Fix64::ONE, Fix64::ONE)).with_density(Fix64::ONE),
        );
        body.reset_mass_data(&fixtures);
        body.apply_linear_impulse(Vec2Fix::from_int(0, 1), Vec2Fix::from_int(1, 0), true);
        assert!(body.angular_velocity() > Fix64::ZERO);
        assert!(body.linear_velocity().y > Fix64::ZERO);
    }

    #[test]
    #[should_panic(expected = "linear velocity must be valid")]
    fn test_saturated_velocity_fails_fast() {
        let mut body = make_body(&BodyDef::dynamic());
        body.set_linear_velocity(Vec2Fix::new(Fix64::MAX, Fix64::ZERO));
    }

    #[test]
    fn test_advance_snaps_to_sweep() {
        let mut body = make_body(&BodyDef::dynamic());
        body.sweep.c = Vec2Fix::from_int(10, 0);
        body.advance(Fix64::HALF);
        assert_eq!(body.world_center(), Vec2Fix::from_int(5, 0));
        assert_eq!(body.position(), Vec2Fix::from_int(5, 0));
    }
}
