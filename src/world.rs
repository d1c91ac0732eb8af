//! World
//!
//! The world owns every body, fixture, joint, contact and controller and runs
//! the step pipeline:
//!
//! 1. flush deferred body/joint additions and removals ([`World::process_changes`])
//! 2. pair new proxies if a fixture was added
//! 3. run controllers
//! 4. narrow phase on existing contacts
//! 5. island solve, fixture synchronization, broad-phase pairing
//! 6. continuous collision (TOI sub-steps)
//! 7. clear forces, shatter broken bodies, collect statistics
//!
//! Bodies and joints are never inserted into or removed from the live
//! simulation in the middle of a step. `create_body`, `remove_body`,
//! `add_joint` and `remove_joint` only queue the change; the queues are
//! flushed at the top of the next step or by an explicit
//! `process_changes` call.

use crate::body::{Body, BodyDef, BodyType, JointEdge};
use crate::breakable::BreakableBody;
use crate::broad_phase::BroadPhase;
use crate::collision::{Aabb, RayCastInput};
use crate::contact::Contact;
use crate::contact_manager::ContactManager;
use crate::controller::Controller;
use crate::distance::DistanceProxy;
use crate::error::PhysicsError;
use crate::event::{ContactListener, EventCollector, WorldEvent};
use crate::filter::Filter;
use crate::fixture::{Fixture, FixtureDef, FixtureProxyKey};
use crate::island::{solve_islands, Island, IslandPlan};
use crate::joint::{Joint, JointDef, JointKind, JointSolver};
use crate::math::{Fix64, Vec2Fix};
use crate::pool::{BodyId, ContactId, ControllerId, FixtureId, JointId, Pool, PoolKey};
use crate::profiling::{StepProfile, StepStats};
use crate::settings::{SolverConfig, TimeStep, TOI_ALPHA_EPSILON};
use crate::shape::MassData;
use crate::toi::{time_of_impact, ToiInput, ToiState};

use tracing::{debug, info, trace, warn};

#[cfg(not(feature = "std"))]
use alloc::{boxed::Box, vec, vec::Vec};

/// Closest hit of a ray cast.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RayHit {
    /// Fixture that was hit
    pub fixture: FixtureId,
    /// World hit point
    pub point: Vec2Fix,
    /// Surface normal at the hit point
    pub normal: Vec2Fix,
    /// Fraction along the ray
    pub fraction: Fix64,
}

/// The simulation world.
pub struct World {
    config: SolverConfig,

    bodies: Pool<BodyId, Body>,
    fixtures: Pool<FixtureId, Fixture>,
    joints: Pool<JointId, Joint>,
    contact_manager: ContactManager,
    controllers: Pool<ControllerId, Box<dyn Controller>>,
    breakables: Vec<BreakableBody>,
    events: EventCollector,

    bodies_to_add: Vec<BodyId>,
    bodies_to_remove: Vec<BodyId>,
    joints_to_add: Vec<JointId>,
    joints_to_remove: Vec<JointId>,

    new_fixture: bool,
    step_complete: bool,
    /// Controllers are running
    locked: bool,
    inv_dt0: Fix64,

    stats: StepStats,
    profile: StepProfile,
}

impl core::fmt::Debug for World {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("World")
            .field("bodies", &self.bodies.len())
            .field("fixtures", &self.fixtures.len())
            .field("joints", &self.joints.len())
            .field("contacts", &self.contact_manager.contacts.len())
            .field("controllers", &self.controllers.len())
            .field("stats", &self.stats)
            .finish()
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new(SolverConfig::default())
    }
}

impl World {
    /// Create an empty world.
    ///
    /// # Panics
    ///
    /// If `config` does not pass [`SolverConfig::validate`].
    pub fn new(config: SolverConfig) -> Self {
        if let Err(e) = config.validate() {
            panic!("{e}");
        }
        Self {
            config,
            bodies: Pool::new(),
            fixtures: Pool::new(),
            joints: Pool::new(),
            contact_manager: ContactManager::new(),
            controllers: Pool::new(),
            breakables: Vec::new(),
            events: EventCollector::new(),
            bodies_to_add: Vec::new(),
            bodies_to_remove: Vec::new(),
            joints_to_add: Vec::new(),
            joints_to_remove: Vec::new(),
            new_fixture: false,
            step_complete: true,
            locked: false,
            inv_dt0: Fix64::ZERO,
            stats: StepStats::default(),
            profile: StepProfile::default(),
        }
    }

    // ========================================================================
    // Configuration
    // ========================================================================

    #[inline]
    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Replace the solver configuration.
    pub fn set_config(&mut self, config: SolverConfig) -> Result<(), PhysicsError> {
        config.validate()?;
        self.config = config;
        Ok(())
    }

    #[inline]
    pub fn gravity(&self) -> Vec2Fix {
        self.config.gravity
    }

    pub fn set_gravity(&mut self, gravity: Vec2Fix) {
        assert!(gravity.is_valid(), "gravity must be valid");
        self.config.gravity = gravity;
    }

    // ========================================================================
    // Bodies
    // ========================================================================

    /// Create a body. It joins the simulation at the next `process_changes`.
    pub fn create_body(&mut self, def: BodyDef) -> BodyId {
        let id = self.bodies.insert_with(|id| Body::new(id, &def));
        self.bodies_to_add.push(id);
        trace!(?id, body_type = ?def.body_type, "body queued");
        id
    }

    /// Queue a body for removal together with its fixtures, contacts and
    /// joints.
    ///
    /// # Panics
    ///
    /// If the id is stale or the body is already queued for removal.
    pub fn remove_body(&mut self, id: BodyId) {
        assert!(self.bodies.contains(id), "remove_body: stale body id");
        assert!(!self.bodies_to_remove.contains(&id), "remove_body: body already queued for removal");
        self.bodies_to_remove.push(id);
    }

    /// Panics on a stale id.
    #[inline]
    pub fn body(&self, id: BodyId) -> &Body {
        &self.bodies[id]
    }

    /// Mutable body for forces, impulses, velocities and sleep control.
    #[inline]
    pub fn body_mut(&mut self, id: BodyId) -> &mut Body {
        &mut self.bodies[id]
    }

    pub fn try_body(&self, id: BodyId) -> Result<&Body, PhysicsError> {
        self.bodies.get(id).ok_or(PhysicsError::InvalidBody { index: id.index() })
    }

    pub fn try_body_mut(&mut self, id: BodyId) -> Result<&mut Body, PhysicsError> {
        self.bodies
            .get_mut(id)
            .ok_or(PhysicsError::InvalidBody { index: id.index() })
    }

    /// Bodies in slot order, including ones still waiting to be admitted.
    pub fn bodies(&self) -> impl Iterator<Item = (BodyId, &Body)> + '_ {
        self.bodies.iter()
    }

    pub fn body_ids(&self) -> Vec<BodyId> {
        self.bodies.keys()
    }

    #[inline]
    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    /// Teleport a body. Contacts are re-evaluated at the next step.
    ///
    /// The body's sleep state is left alone. A sleeping body keeps its
    /// contacts until it is woken with [`Body::set_awake`].
    pub fn set_transform(&mut self, id: BodyId, position: Vec2Fix, angle: Fix64) {
        let body = &mut self.bodies[id];
        body.set_transform_internal(position, angle);
        let xf = body.xf;
        for &fid in &body.fixtures {
            self.fixtures[fid].synchronize(&mut self.contact_manager.broad_phase, &xf, &xf);
        }
        self.new_fixture = true;
    }

    /// Change the body type, recomputing mass and dropping its contacts.
    pub fn set_body_type(&mut self, id: BodyId, body_type: BodyType) {
        let body = &mut self.bodies[id];
        if body.body_type == body_type {
            return;
        }
        body.body_type = body_type;
        body.reset_mass_data(&self.fixtures);

        if body_type == BodyType::Static {
            body.linear_velocity = Vec2Fix::ZERO;
            body.angular_velocity = Fix64::ZERO;
            body.sweep.a0 = body.sweep.a;
            body.sweep.c0 = body.sweep.c;
            body.awake = false;
            synchronize_fixtures(body, &mut self.fixtures, &mut self.contact_manager.broad_phase);
        }

        let body = &mut self.bodies[id];
        body.set_awake(true);
        body.force = Vec2Fix::ZERO;
        body.torque = Fix64::ZERO;

        self.destroy_body_contacts(id);

        // Re-pair against everything, the type decides what may collide
        for &fid in &self.bodies[id].fixtures {
            self.fixtures[fid].touch_proxies(&mut self.contact_manager.broad_phase);
        }
        debug!(?id, ?body_type, "body type changed");
    }

    /// Enable or disable a body. Disabled bodies have no proxies or
    /// contacts and are skipped by the solver; their joints are kept.
    pub fn set_enabled(&mut self, id: BodyId, flag: bool) {
        let body = &mut self.bodies[id];
        if body.enabled == flag {
            return;
        }
        body.enabled = flag;
        if !body.in_world {
            return;
        }

        if flag {
            let xf = body.xf;
            for &fid in &body.fixtures {
                self.fixtures[fid].create_proxies(fid, &mut self.contact_manager.broad_phase, &xf);
            }
            self.new_fixture = true;
        } else {
            for &fid in &body.fixtures {
                self.fixtures[fid].destroy_proxies(&mut self.contact_manager.broad_phase);
            }
            self.destroy_body_contacts(id);
        }
        debug!(?id, enabled = flag, "body enabled state changed");
    }

    /// Lock or unlock rotation; recomputes the mass data.
    pub fn set_fixed_rotation(&mut self, id: BodyId, flag: bool) {
        let body = &mut self.bodies[id];
        if body.fixed_rotation == flag {
            return;
        }
        body.fixed_rotation = flag;
        body.angular_velocity = Fix64::ZERO;
        body.reset_mass_data(&self.fixtures);
    }

    /// Recompute mass, center and inertia from the fixtures.
    pub fn reset_mass_data(&mut self, id: BodyId) {
        self.bodies[id].reset_mass_data(&self.fixtures);
    }

    /// Override mass, center and inertia.
    pub fn set_mass_data(&mut self, id: BodyId, data: &MassData) {
        self.bodies[id].set_mass_data(data);
    }

    // ========================================================================
    // Fixtures
    // ========================================================================

    /// Attach a fixture. Takes effect immediately; a body with positive
    /// density fixtures gets its mass recomputed.
    pub fn create_fixture(&mut self, body_id: BodyId, def: FixtureDef) -> FixtureId {
        assert!(self.bodies.contains(body_id), "create_fixture: stale body id");
        let density = def.density;
        let id = self.fixtures.insert(Fixture::new(body_id, def));

        let body = &mut self.bodies[body_id];
        body.fixtures.push(id);
        if body.in_world && body.enabled {
            let xf = body.xf;
            self.fixtures[id].create_proxies(id, &mut self.contact_manager.broad_phase, &xf);
            self.new_fixture = true;
        }
        if density.is_positive() {
            self.bodies[body_id].reset_mass_data(&self.fixtures);
        }

        self.events.push(WorldEvent::FixtureAdded(id));
        trace!(?id, body = ?body_id, "fixture created");
        id
    }

    /// Detach and destroy a fixture with its contacts and proxies.
    pub fn destroy_fixture(&mut self, id: FixtureId) {
        let body_id = match self.fixtures.get(id) {
            Some(fixture) => fixture.body,
            None => panic!("destroy_fixture: stale fixture id"),
        };

        let doomed: Vec<ContactId> = self.bodies[body_id]
            .contact_edges
            .iter()
            .filter(|edge| {
                let contact = &self.contact_manager.contacts[edge.contact];
                contact.fixture_a == id || contact.fixture_b == id
            })
            .map(|edge| edge.contact)
            .collect();
        for contact in doomed {
            self.contact_manager
                .destroy(contact, &mut self.fixtures, &mut self.bodies, &mut self.events);
        }

        self.fixtures[id].destroy_proxies(&mut self.contact_manager.broad_phase);
        self.fixtures.remove(id);

        let body = &mut self.bodies[body_id];
        body.fixtures.retain(|&f| f != id);
        body.reset_mass_data(&self.fixtures);

        self.events.push(WorldEvent::FixtureRemoved(id));
        trace!(?id, body = ?body_id, "fixture destroyed");
    }

    #[inline]
    pub fn fixture(&self, id: FixtureId) -> &Fixture {
        &self.fixtures[id]
    }

    /// Mutable fixture for material and handler changes.
    #[inline]
    pub fn fixture_mut(&mut self, id: FixtureId) -> &mut Fixture {
        &mut self.fixtures[id]
    }

    pub fn try_fixture(&self, id: FixtureId) -> Result<&Fixture, PhysicsError> {
        self.fixtures
            .get(id)
            .ok_or(PhysicsError::InvalidFixture { index: id.index() })
    }

    /// Change a fixture's filter; its contacts are re-filtered next step.
    pub fn set_filter(&mut self, id: FixtureId, filter: Filter) {
        let fixture = &mut self.fixtures[id];
        fixture.filter = filter;
        let body_id = fixture.body;

        for edge in &self.bodies[body_id].contact_edges {
            let contact = &mut self.contact_manager.contacts[edge.contact];
            if contact.fixture_a == id || contact.fixture_b == id {
                contact.flag_for_filtering();
            }
        }
        self.fixtures[id].touch_proxies(&mut self.contact_manager.broad_phase);
    }

    /// Turn a fixture into a sensor or back.
    pub fn set_sensor(&mut self, id: FixtureId, flag: bool) {
        let fixture = &mut self.fixtures[id];
        if fixture.is_sensor != flag {
            fixture.is_sensor = flag;
            let body = fixture.body;
            self.bodies[body].set_awake(true);
        }
    }

    // ========================================================================
    // Joints
    // ========================================================================

    /// Queue a joint. Gear joints take their bodies from the joints they
    /// couple.
    pub fn add_joint(&mut self, def: JointDef) -> Result<JointId, PhysicsError> {
        def.validate()?;
        let mut def = def;

        if let JointKind::Gear(gear) = &mut def.kind {
            let (a, b) = gear.resolve(&self.joints, &self.bodies)?;
            def.body_a = a;
            def.body_b = b;
        }
        for body in [def.body_a, def.body_b] {
            if !self.bodies.contains(body) {
                return Err(PhysicsError::InvalidBody { index: body.index() });
            }
        }

        let id = self.joints.insert_with(|id| Joint::new(id, &def));
        self.joints_to_add.push(id);
        trace!(?id, joint_type = ?def.kind.joint_type(), "joint queued");
        Ok(id)
    }

    /// Queue a joint for removal. Gear joints coupling it go with it.
    ///
    /// # Panics
    ///
    /// If the id is stale or the joint is already queued for removal.
    pub fn remove_joint(&mut self, id: JointId) {
        assert!(self.joints.contains(id), "remove_joint: stale joint id");
        assert!(!self.joints_to_remove.contains(&id), "remove_joint: joint already queued for removal");
        self.joints_to_remove.push(id);
    }

    #[inline]
    pub fn joint(&self, id: JointId) -> &Joint {
        &self.joints[id]
    }

    /// Mutable joint access; wakes both bodies so parameter changes apply.
    pub fn joint_mut(&mut self, id: JointId) -> &mut Joint {
        let joint = &self.joints[id];
        let (a, b) = (joint.body_a, joint.body_b);
        for body in [a, b] {
            if let Some(body) = self.bodies.get_mut(body) {
                body.set_awake(true);
            }
        }
        &mut self.joints[id]
    }

    pub fn try_joint(&self, id: JointId) -> Result<&Joint, PhysicsError> {
        self.joints.get(id).ok_or(PhysicsError::InvalidJoint { index: id.index() })
    }

    pub fn joints(&self) -> impl Iterator<Item = (JointId, &Joint)> + '_ {
        self.joints.iter()
    }

    #[inline]
    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    /// Re-enable a joint that broke or was disabled.
    pub fn set_joint_enabled(&mut self, id: JointId, flag: bool) {
        let joint = self.joint_mut(id);
        if joint.enabled == flag {
            return;
        }
        joint.enabled = flag;
        let (a, b, collide_connected) = (joint.body_a, joint.body_b, joint.collide_connected);
        if !collide_connected {
            self.flag_contacts_between(a, b);
            if !flag {
                self.touch_body_proxies(b);
            }
        }
    }

    // ========================================================================
    // Contacts, events, listeners
    // ========================================================================

    pub fn contacts(&self) -> impl Iterator<Item = (ContactId, &Contact)> + '_ {
        self.contact_manager.contacts.iter()
    }

    pub fn contact(&self, id: ContactId) -> Option<&Contact> {
        self.contact_manager.contacts.get(id)
    }

    #[inline]
    pub fn contact_count(&self) -> usize {
        self.contact_manager.contacts.len()
    }

    #[inline]
    pub fn broad_phase(&self) -> &BroadPhase<FixtureProxyKey> {
        &self.contact_manager.broad_phase
    }

    /// Install (or remove) the synchronous contact listener.
    pub fn set_contact_listener(&mut self, listener: Option<Box<dyn ContactListener + Send>>) {
        self.events.set_listener(listener);
    }

    /// Events since the last drain
    pub fn events(&self) -> &[WorldEvent] {
        self.events.events()
    }

    pub fn drain_events(&mut self) -> Vec<WorldEvent> {
        self.events.drain()
    }

    // ========================================================================
    // Controllers and breakable bodies
    // ========================================================================

    /// Register a controller; it runs once per step in registration order.
    pub fn add_controller(&mut self, controller: impl Controller + 'static) -> ControllerId {
        assert!(!self.locked, "add_controller: controllers are running");
        let id = self.controllers.insert(Box::new(controller));
        self.events.push(WorldEvent::ControllerAdded(id));
        id
    }

    /// Unregister a controller and hand it back.
    pub fn remove_controller(&mut self, id: ControllerId) -> Option<Box<dyn Controller>> {
        assert!(!self.locked, "remove_controller: controllers are running");
        let controller = self.controllers.remove(id)?;
        self.events.push(WorldEvent::ControllerRemoved(id));
        Some(controller)
    }

    #[inline]
    pub fn controller_count(&self) -> usize {
        self.controllers.len()
    }

    /// Make `body` shatter into its fixtures once a contact impulse exceeds
    /// `strength`.
    pub fn add_breakable_body(&mut self, body: BodyId, strength: Fix64) -> Result<(), PhysicsError> {
        if !self.bodies.contains(body) {
            return Err(PhysicsError::InvalidBody { index: body.index() });
        }
        if self.breakables.iter().any(|b| b.body() == body) {
            return Err(PhysicsError::InvalidConstraint {
                reason: "body is already breakable",
            });
        }
        self.breakables.push(BreakableBody::new(body, strength));
        Ok(())
    }

    pub fn breakables(&self) -> &[BreakableBody] {
        &self.breakables
    }

    // ========================================================================
    // Deferred changes
    // ========================================================================

    /// Apply queued additions and removals: bodies are admitted, then
    /// joints, then bodies are removed, then joints.
    pub fn process_changes(&mut self) {
        for id in core::mem::take(&mut self.bodies_to_add) {
            self.admit_body(id);
        }
        for id in core::mem::take(&mut self.joints_to_add) {
            self.admit_joint(id);
        }
        for id in core::mem::take(&mut self.bodies_to_remove) {
            self.destroy_body(id);
        }
        for id in core::mem::take(&mut self.joints_to_remove) {
            self.destroy_joint(id);
        }
    }

    fn admit_body(&mut self, id: BodyId) {
        let Some(body) = self.bodies.get_mut(id) else {
            return;
        };
        body.in_world = true;
        if body.enabled {
            let xf = body.xf;
            for &fid in &body.fixtures {
                self.fixtures[fid].create_proxies(fid, &mut self.contact_manager.broad_phase, &xf);
                self.new_fixture = true;
            }
        }
        self.events.push(WorldEvent::BodyAdded(id));
        debug!(?id, "body added");
    }

    fn admit_joint(&mut self, id: JointId) {
        let Some(joint) = self.joints.get_mut(id) else {
            return;
        };
        joint.in_world = true;
        let (a, b, collide_connected) = (joint.body_a, joint.body_b, joint.collide_connected);

        let body_a = &mut self.bodies[a];
        body_a.joint_edges.push(JointEdge { other: b, joint: id });
        body_a.set_awake(true);
        let body_b = &mut self.bodies[b];
        body_b.joint_edges.push(JointEdge { other: a, joint: id });
        body_b.set_awake(true);

        // Existing contacts between the bodies may now be filtered out
        if !collide_connected {
            self.flag_contacts_between(a, b);
        }

        self.events.push(WorldEvent::JointAdded(id));
        debug!(?id, body_a = ?a, body_b = ?b, "joint added");
    }

    fn destroy_body(&mut self, id: BodyId) {
        let Some(body) = self.bodies.get(id) else {
            return;
        };
        let joints: Vec<JointId> = body.joint_edges.iter().map(|edge| edge.joint).collect();
        for joint in joints {
            self.destroy_joint(joint);
        }

        self.destroy_body_contacts(id);

        let fixtures = core::mem::take(&mut self.bodies[id].fixtures);
        for fid in fixtures {
            if let Some(mut fixture) = self.fixtures.remove(fid) {
                fixture.destroy_proxies(&mut self.contact_manager.broad_phase);
            }
            self.events.push(WorldEvent::FixtureRemoved(fid));
        }

        self.bodies.remove(id);
        self.breakables.retain(|b| b.body() != id);
        self.events.push(WorldEvent::BodyRemoved(id));
        debug!(?id, "body removed");
    }

    fn destroy_joint(&mut self, id: JointId) {
        let gears: Vec<JointId> = self
            .joints
            .iter()
            .filter(|(_, joint)| matches!(&joint.kind, JointKind::Gear(g) if g.couples(id)))
            .map(|(gear, _)| gear)
            .collect();
        for gear in gears {
            self.destroy_joint(gear);
        }

        let Some(joint) = self.joints.remove(id) else {
            return;
        };
        self.joints_to_add.retain(|&j| j != id);

        if joint.in_world {
            for body in [joint.body_a, joint.body_b] {
                if let Some(body) = self.bodies.get_mut(body) {
                    body.remove_joint_edge(id);
                    body.set_awake(true);
                }
            }
            if !joint.collide_connected {
                self.flag_contacts_between(joint.body_a, joint.body_b);
            }
        }

        self.events.push(WorldEvent::JointRemoved(id));
        debug!(?id, "joint removed");
    }

    fn destroy_body_contacts(&mut self, id: BodyId) {
        let contacts: Vec<ContactId> = self.bodies[id]
            .contact_edges
            .iter()
            .map(|edge| edge.contact)
            .collect();
        for contact in contacts {
            self.contact_manager
                .destroy(contact, &mut self.fixtures, &mut self.bodies, &mut self.events);
        }
    }

    fn flag_contacts_between(&mut self, a: BodyId, b: BodyId) {
        let Some(body_b) = self.bodies.get(b) else {
            return;
        };
        for edge in &body_b.contact_edges {
            if edge.other == a {
                self.contact_manager.contacts[edge.contact].flag_for_filtering();
            }
        }
    }

    fn touch_body_proxies(&mut self, id: BodyId) {
        if let Some(body) = self.bodies.get(id) {
            for &fid in &body.fixtures {
                self.fixtures[fid].touch_proxies(&mut self.contact_manager.broad_phase);
            }
        }
    }

    // ========================================================================
    // Step
    // ========================================================================

    /// Advance the simulation by `dt` seconds. Use a constant `dt` for
    /// reproducible results.
    pub fn step(&mut self, dt: Fix64) {
        assert!(dt.is_valid() && !dt.is_negative(), "dt must be >= 0");
        let mut stats = StepStats::default();

        self.process_changes();

        // New fixtures pair before the narrow phase sees them
        if self.new_fixture {
            stats.broad_phase_pairs += self.find_new_contacts();
            self.new_fixture = false;
        }

        let inv_dt = if dt.is_positive() { Fix64::ONE / dt } else { Fix64::ZERO };
        let step = TimeStep {
            dt,
            inv_dt,
            dt_ratio: self.inv_dt0 * dt,
            velocity_iterations: self.config.velocity_iterations,
            position_iterations: self.config.position_iterations,
            warm_starting: self.config.warm_starting,
        };

        trace!("controllers");
        self.update_controllers(dt);

        trace!("collide");
        self.contact_manager
            .collide(&mut self.fixtures, &mut self.bodies, &self.joints, &mut self.events);

        if step.dt.is_positive() {
            trace!("solve");
            let (islands, pairs) = self.solve(&step);
            stats.islands = islands;
            stats.broad_phase_pairs += pairs;
        }

        if self.config.continuous_physics && step.dt.is_positive() {
            trace!("solve toi");
            let (toi_events, pairs) = self.solve_toi(&step);
            stats.toi_events = toi_events;
            stats.broad_phase_pairs += pairs;
        }

        if step.dt.is_positive() {
            self.inv_dt0 = step.inv_dt;
        }

        if self.config.auto_clear_forces {
            self.clear_forces();
        }

        self.break_bodies();
        self.collect_stats(&mut stats);
        self.profile.record(&stats);
        self.stats = stats;
    }

    /// Zero the accumulated force and torque of every body.
    pub fn clear_forces(&mut self) {
        for (_, body) in self.bodies.iter_mut() {
            body.force = Vec2Fix::ZERO;
            body.torque = Fix64::ZERO;
        }
    }

    /// Counters of the last step
    #[inline]
    pub fn stats(&self) -> &StepStats {
        &self.stats
    }

    /// Totals since creation
    #[inline]
    pub fn profile(&self) -> &StepProfile {
        &self.profile
    }

    fn find_new_contacts(&mut self) -> u32 {
        let pairs = self
            .contact_manager
            .find_new_contacts(&self.fixtures, &mut self.bodies, &self.joints);
        u32::try_from(pairs).unwrap_or(u32::MAX)
    }

    fn update_controllers(&mut self, dt: Fix64) {
        if self.controllers.is_empty() {
            return;
        }
        let mut controllers = core::mem::take(&mut self.controllers);
        self.locked = true;
        for (_, controller) in controllers.iter_mut() {
            controller.update(self, dt);
        }
        self.locked = false;
        self.controllers = controllers;
    }

    /// Discrete island solve. Returns the island count and the broad-phase
    /// pairs found after synchronizing.
    fn solve(&mut self, step: &TimeStep) -> (u32, u32) {
        let plans = IslandPlan::build_all(
            &mut self.bodies,
            &mut self.contact_manager.contacts,
            &mut self.joints,
            &self.fixtures,
        );

        let mut islands: Vec<Island> = plans
            .iter()
            .map(|plan| {
                Island::gather(
                    plan,
                    &mut self.bodies,
                    &self.contact_manager.contacts,
                    &self.joints,
                    &self.fixtures,
                )
            })
            .collect();
        debug!(islands = islands.len(), "solving islands");

        solve_islands(&mut islands, step, &self.config);

        let mut broken_joints = Vec::new();
        for island in &islands {
            let before = self.events.events().len();
            island.write_back(
                &mut self.bodies,
                &mut self.contact_manager.contacts,
                &mut self.joints,
                &mut self.events,
                step.inv_dt,
            );
            for event in &self.events.events()[before..] {
                if let WorldEvent::JointBroke { joint, .. } = event {
                    broken_joints.push(*joint);
                }
            }
            self.record_impulses(island);
        }

        // Broken joints stop filtering: let the pair be found again
        for id in broken_joints {
            let joint = &self.joints[id];
            let (a, b) = (joint.body_a, joint.body_b);
            if !joint.collide_connected {
                self.flag_contacts_between(a, b);
            }
            self.touch_body_proxies(b);
        }

        // Synchronize fixtures of every body that was solved
        for (_, body) in self.bodies.iter() {
            if !body.island_flag || body.body_type == BodyType::Static {
                continue;
            }
            synchronize_fixtures(body, &mut self.fixtures, &mut self.contact_manager.broad_phase);
        }

        let pairs = self.find_new_contacts();
        (u32::try_from(islands.len()).unwrap_or(u32::MAX), pairs)
    }

    fn record_impulses(&mut self, island: &Island) {
        if self.breakables.is_empty() {
            return;
        }
        for (id, impulse) in island.contact_impulses() {
            let contact = &self.contact_manager.contacts[id];
            for breakable in &mut self.breakables {
                if breakable.record(contact, &impulse) {
                    info!(body = ?breakable.body(), impulse = %impulse.max_normal_impulse(), "body broke");
                }
            }
        }
    }

    /// Continuous collision. Returns the number of TOI sub-steps and the
    /// broad-phase pairs found along the way.
    fn solve_toi(&mut self, step: &TimeStep) -> (u32, u32) {
        let mut toi_events = 0u32;
        let mut pairs = 0u32;

        if self.step_complete {
            for (_, body) in self.bodies.iter_mut() {
                body.island_flag = false;
                body.sweep.alpha0 = Fix64::ZERO;
            }
            for (_, contact) in self.contact_manager.contacts.iter_mut() {
                contact.toi_flag = false;
                contact.island_flag = false;
                contact.toi_count = 0;
                contact.toi = Fix64::ONE;
            }
        }

        let mut capped = false;

        // Find TOI events and solve them
        loop {
            let Some((min_id, min_alpha)) = self.find_min_toi(&mut capped) else {
                self.step_complete = true;
                break;
            };
            if Fix64::ONE - TOI_ALPHA_EPSILON < min_alpha {
                // No more TOI events
                self.step_complete = true;
                break;
            }

            let (ia, ib) = {
                let contact = &self.contact_manager.contacts[min_id];
                (contact.body_a, contact.body_b)
            };
            let backup_a = self.bodies[ia].sweep;
            let backup_b = self.bodies[ib].sweep;

            self.bodies[ia].advance(min_alpha);
            self.bodies[ib].advance(min_alpha);

            // The TOI contact likely has some new contact points
            self.contact_manager.contacts[min_id].update(&mut self.fixtures, &mut self.bodies, &mut self.events);
            let contact = &mut self.contact_manager.contacts[min_id];
            contact.toi_flag = false;
            contact.toi_count += 1;

            // Is the contact solid?
            if !contact.enabled || !contact.touching {
                // Restore the sweeps
                contact.enabled = false;
                for (id, backup) in [(ia, backup_a), (ib, backup_b)] {
                    let body = &mut self.bodies[id];
                    body.sweep = backup;
                    body.synchronize_transform();
                }
                continue;
            }

            self.bodies[ia].set_awake(true);
            self.bodies[ib].set_awake(true);

            // Build the island
            let mut plan = IslandPlan {
                bodies: vec![ia, ib],
                contacts: vec![min_id],
                joints: Vec::new(),
            };
            self.bodies[ia].island_flag = true;
            self.bodies[ib].island_flag = true;
            self.contact_manager.contacts[min_id].island_flag = true;

            // Get contacts on body A and body B
            for id in [ia, ib] {
                self.gather_toi_contacts(id, min_alpha, &mut plan);
            }

            let dt = (Fix64::ONE - min_alpha) * step.dt;
            let sub_step = TimeStep {
                dt,
                inv_dt: if dt.is_positive() { Fix64::ONE / dt } else { Fix64::ZERO },
                dt_ratio: Fix64::ONE,
                velocity_iterations: step.velocity_iterations,
                position_iterations: self.config.toi_position_iterations,
                warm_starting: false,
            };

            let mut island = Island::gather(
                &plan,
                &mut self.bodies,
                &self.contact_manager.contacts,
                &self.joints,
                &self.fixtures,
            );
            island.solve_toi(&sub_step, &self.config, 0, 1);
            island.write_back_toi(&mut self.bodies, &self.contact_manager.contacts, &mut self.events);
            self.record_impulses(&island);
            toi_events += 1;
            debug!(contact = ?min_id, alpha = %min_alpha, bodies = plan.bodies.len(), "toi sub-step");

            // Reset island flags and synchronize broad-phase proxies
            for &id in &plan.bodies {
                let body = &mut self.bodies[id];
                body.island_flag = false;
                if body.body_type != BodyType::Dynamic {
                    continue;
                }
                synchronize_fixtures(body, &mut self.fixtures, &mut self.contact_manager.broad_phase);

                // Invalidate all contact TOIs on this displaced body
                for edge in &self.bodies[id].contact_edges {
                    let contact = &mut self.contact_manager.contacts[edge.contact];
                    contact.toi_flag = false;
                    contact.island_flag = false;
                }
            }

            // Commit proxy movements so new contacts are created
            pairs += self.find_new_contacts();

            if self.config.sub_stepping {
                self.step_complete = false;
                break;
            }
        }

        if capped {
            warn!(max_sub_steps = self.config.max_sub_steps, "contact hit the TOI sub-step cap");
        }
        (toi_events, pairs)
    }

    /// Contact with the smallest time of impact, computing missing TOIs.
    fn find_min_toi(&mut self, capped: &mut bool) -> Option<(ContactId, Fix64)> {
        let mut min_contact = None;
        let mut min_alpha = Fix64::ONE;

        for id in self.contact_manager.contacts.keys() {
            let contact = &self.contact_manager.contacts[id];

            // Is this contact disabled?
            if !contact.enabled {
                continue;
            }
            // Prevent excessive sub-stepping
            if contact.toi_count > self.config.max_sub_steps {
                *capped = true;
                continue;
            }

            let alpha = if contact.toi_flag {
                // This contact has a valid cached TOI
                contact.toi
            } else {
                let Contact {
                    fixture_a,
                    fixture_b,
                    child_a,
                    child_b,
                    body_a: ia,
                    body_b: ib,
                    ..
                } = *contact;
                let fa = &self.fixtures[fixture_a];
                let fb = &self.fixtures[fixture_b];

                // Is there a sensor?
                if fa.is_sensor || fb.is_sensor {
                    continue;
                }

                let ba = &self.bodies[ia];
                let bb = &self.bodies[ib];
                let active_a = ba.awake && ba.body_type != BodyType::Static;
                let active_b = bb.awake && bb.body_type != BodyType::Static;

                // Is at least one body active (awake and dynamic or kinematic)?
                if !active_a && !active_b {
                    continue;
                }

                let collide_a = ba.bullet || ba.body_type != BodyType::Dynamic;
                let collide_b = bb.bullet || bb.body_type != BodyType::Dynamic;

                // Are these two non-bullet dynamic bodies?
                if !collide_a && !collide_b {
                    continue;
                }

                // Put the sweeps onto the same time interval
                let mut alpha0 = ba.sweep.alpha0;
                if ba.sweep.alpha0 < bb.sweep.alpha0 {
                    alpha0 = bb.sweep.alpha0;
                    self.bodies[ia].sweep.advance(alpha0);
                } else if bb.sweep.alpha0 < ba.sweep.alpha0 {
                    alpha0 = ba.sweep.alpha0;
                    self.bodies[ib].sweep.advance(alpha0);
                }
                debug_assert!(alpha0 < Fix64::ONE);

                let input = ToiInput {
                    proxy_a: DistanceProxy::new(&fa.shape, child_a),
                    proxy_b: DistanceProxy::new(&fb.shape, child_b),
                    sweep_a: self.bodies[ia].sweep,
                    sweep_b: self.bodies[ib].sweep,
                    t_max: Fix64::ONE,
                };
                let output = time_of_impact(&input);

                // Beta is the fraction of the remaining portion of the step
                let alpha = if output.state == ToiState::Touching {
                    (alpha0 + (Fix64::ONE - alpha0) * output.t).min(Fix64::ONE)
                } else {
                    Fix64::ONE
                };

                let contact = &mut self.contact_manager.contacts[id];
                contact.toi = alpha;
                contact.toi_flag = true;
                alpha
            };

            if alpha < min_alpha {
                // This is the minimum TOI found so far
                min_contact = Some(id);
                min_alpha = alpha;
            }
        }

        min_contact.map(|id| (id, min_alpha))
    }

    /// Add the static, kinematic and bullet neighbours of `id` to a TOI
    /// island, advancing them to `min_alpha`.
    fn gather_toi_contacts(&mut self, id: BodyId, min_alpha: Fix64, plan: &mut IslandPlan) {
        let body = &self.bodies[id];
        if body.body_type != BodyType::Dynamic {
            return;
        }
        let bullet = body.bullet;
        let edges = body.contact_edges.clone();

        for edge in edges {
            if plan.contacts.len() >= self.config.max_toi_contacts {
                debug!(body = ?id, max_toi_contacts = self.config.max_toi_contacts, "TOI contact cap reached");
                break;
            }
            let contact = &self.contact_manager.contacts[edge.contact];

            // Has this contact already been added to the island?
            if contact.island_flag {
                continue;
            }

            // Only add static, kinematic, or bullet bodies
            let other = &self.bodies[edge.other];
            if other.body_type == BodyType::Dynamic && !bullet && !other.bullet {
                continue;
            }

            // Skip sensors
            if self.fixtures[contact.fixture_a].is_sensor || self.fixtures[contact.fixture_b].is_sensor {
                continue;
            }

            // Tentatively advance the body to the TOI
            let backup = other.sweep;
            if !other.island_flag {
                self.bodies[edge.other].advance(min_alpha);
            }

            // Update the contact points
            self.contact_manager.contacts[edge.contact].update(&mut self.fixtures, &mut self.bodies, &mut self.events);
            let contact = &self.contact_manager.contacts[edge.contact];
            if !contact.enabled || !contact.touching {
                let other = &mut self.bodies[edge.other];
                other.sweep = backup;
                other.synchronize_transform();
                continue;
            }

            // Add the contact to the island
            self.contact_manager.contacts[edge.contact].island_flag = true;
            plan.contacts.push(edge.contact);

            // Has the other body already been added to the island?
            let other = &mut self.bodies[edge.other];
            if other.island_flag {
                continue;
            }
            other.island_flag = true;
            other.set_awake(true);
            plan.bodies.push(edge.other);
        }
    }

    /// Replace broken breakable bodies with one body per fixture.
    fn break_bodies(&mut self) {
        let broken: Vec<BodyId> = self
            .breakables
            .iter()
            .filter(|b| b.is_broken())
            .map(BreakableBody::body)
            .collect();
        if broken.is_empty() {
            return;
        }
        self.breakables.retain(|b| !b.is_broken());

        for id in broken {
            if self.bodies_to_remove.contains(&id) {
                continue;
            }
            let Some(body) = self.bodies.get(id) else {
                continue;
            };
            let position = body.position();
            let angle = body.angle();
            // Velocity of the body origin; each piece recenters it on its own mass
            let origin_velocity = body.linear_velocity_from_world_point(position);
            let angular_velocity = body.angular_velocity();

            let pieces: Vec<FixtureDef> = body
                .fixtures
                .iter()
                .map(|&fid| {
                    let f = &self.fixtures[fid];
                    FixtureDef {
                        shape: f.shape,
                        density: f.density,
                        friction: f.friction,
                        restitution: f.restitution,
                        is_sensor: f.is_sensor,
                        filter: f.filter,
                        user_data: f.user_data,
                    }
                })
                .collect();

            let piece_count = pieces.len();
            for def in pieces {
                let piece = self.create_body(
                    BodyDef::dynamic()
                        .with_position(position)
                        .with_angle(angle)
                        .with_linear_velocity(origin_velocity)
                        .with_angular_velocity(angular_velocity),
                );
                self.create_fixture(piece, def);
            }
            self.remove_body(id);
            debug!(?id, pieces = piece_count, "breakable body split");
        }
    }

    fn collect_stats(&self, stats: &mut StepStats) {
        let count = |n: usize| u32::try_from(n).unwrap_or(u32::MAX);
        stats.bodies = count(self.bodies.len());
        stats.awake_bodies = count(
            self.bodies
                .iter()
                .filter(|(_, b)| b.awake && b.body_type != BodyType::Static)
                .count(),
        );
        stats.contacts = count(self.contact_manager.contacts.len());
        stats.touching_contacts = count(
            self.contact_manager
                .contacts
                .iter()
                .filter(|(_, c)| c.touching)
                .count(),
        );
        stats.joints = count(self.joints.len());
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Visit every fixture whose fat AABB overlaps `aabb`. Return `false`
    /// from the callback to stop.
    pub fn query_aabb<F: FnMut(FixtureId) -> bool>(&self, aabb: &Aabb, mut callback: F) {
        let broad_phase = &self.contact_manager.broad_phase;
        broad_phase.query(aabb, |proxy| callback(broad_phase.user_data(proxy).fixture));
    }

    /// Cast a ray from `p1` to `p2`.
    ///
    /// The callback receives the fixture, hit point, normal and fraction and
    /// returns the new max fraction: `0` stops, a negative value ignores the
    /// hit, the hit fraction clips the ray, `1` continues unclipped.
    pub fn ray_cast<F>(&self, p1: Vec2Fix, p2: Vec2Fix, mut callback: F)
    where
        F: FnMut(FixtureId, Vec2Fix, Vec2Fix, Fix64) -> Fix64,
    {
        let input = RayCastInput {
            p1,
            p2,
            max_fraction: Fix64::ONE,
        };
        let broad_phase = &self.contact_manager.broad_phase;
        broad_phase.ray_cast(&input, |sub_input, proxy| {
            let key = broad_phase.user_data(proxy);
            let fixture = &self.fixtures[key.fixture];
            let xf = self.bodies[fixture.body].transform();
            match fixture.ray_cast(sub_input, xf, key.child_index as usize) {
                Some(output) => {
                    let point = p1 + (p2 - p1) * output.fraction;
                    callback(key.fixture, point, output.normal, output.fraction)
                }
                None => sub_input.max_fraction,
            }
        });
    }

    /// Nearest hit along the ray.
    pub fn ray_cast_closest(&self, p1: Vec2Fix, p2: Vec2Fix) -> Option<RayHit> {
        let mut closest: Option<RayHit> = None;
        self.ray_cast(p1, p2, |fixture, point, normal, fraction| {
            closest = Some(RayHit {
                fixture,
                point,
                normal,
                fraction,
            });
            fraction
        });
        closest
    }

    /// Any hit along the ray; stops at the first one found.
    pub fn ray_cast_any(&self, p1: Vec2Fix, p2: Vec2Fix) -> Option<RayHit> {
        let mut hit: Option<RayHit> = None;
        self.ray_cast(p1, p2, |fixture, point, normal, fraction| {
            hit = Some(RayHit {
                fixture,
                point,
                normal,
                fraction,
            });
            Fix64::ZERO
        });
        hit
    }

    /// First fixture containing `point`.
    pub fn test_point(&self, point: Vec2Fix) -> Option<FixtureId> {
        let d = Vec2Fix::new(Fix64::EPSILON, Fix64::EPSILON);
        let aabb = Aabb::new(point - d, point + d);
        let mut found = None;
        self.query_aabb(&aabb, |fid| {
            let fixture = &self.fixtures[fid];
            if fixture.test_point(self.bodies[fixture.body].transform(), point) {
                found = Some(fid);
                return false;
            }
            true
        });
        found
    }

    /// Move the world origin to `new_origin`. Body poses, joint world
    /// targets and the broad phase are all shifted.
    pub fn shift_origin(&mut self, new_origin: Vec2Fix) {
        for (_, body) in self.bodies.iter_mut() {
            body.xf.p -= new_origin;
            body.sweep.c0 -= new_origin;
            body.sweep.c -= new_origin;
        }
        for (_, joint) in self.joints.iter_mut() {
            joint.kind.solver_mut().shift_origin(new_origin);
        }
        self.contact_manager.broad_phase.shift_origin(new_origin);
        debug!(origin = ?new_origin, "origin shifted");
    }
}

/// Sweep the proxies of `body` from the start to the end of its sweep.
fn synchronize_fixtures(
    body: &Body,
    fixtures: &mut Pool<FixtureId, Fixture>,
    broad_phase: &mut BroadPhase<FixtureProxyKey>,
) {
    let xf1 = body.sweep_start_transform();
    for &fid in &body.fixtures {
        fixtures[fid].synchronize(broad_phase, &xf1, &body.xf);
    }
}
