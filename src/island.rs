//! Islands and the Sequential-Impulse Step
//!
//! An island is a connected group of awake bodies linked by touching
//! contacts and enabled joints. Static bodies end the traversal, so they
//! may appear in several islands but never join two of them.
//!
//! # Pipeline
//!
//! 1. [`IslandPlan::build_all`] walks the body graph depth-first in slot
//!    order and records the members of every island.
//! 2. [`Island::gather`] copies the members into owned solver state with
//!    island-local indices.
//! 3. [`Island::solve`] integrates, runs the velocity and position
//!    iterations and evaluates sleep. It touches nothing outside the island,
//!    so islands can be solved in parallel.
//! 4. [`Island::write_back`] stores poses, velocities, impulses and joint
//!    state in the world, in island order.
//!
//! The TOI sub-step reuses the same owned state through
//! [`Island::solve_toi`] and [`Island::write_back_toi`].

use crate::body::{Body, BodyType};
use crate::contact::Contact;
use crate::contact_solver::{ContactSolver, ContactSolverInput};
use crate::event::{ContactImpulse, EventCollector, WorldEvent};
use crate::fixture::Fixture;
use crate::joint::{Joint, JointBodies, JointKind, SolverBody, SolverData};
use crate::math::{Fix64, Sweep, Vec2Fix};
use crate::pool::{BodyId, ContactId, FixtureId, JointId, Pool};
use crate::settings::{SolverConfig, TimeStep};

use tracing::info;

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

/// Center of mass position and angle of an island body.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Position {
    /// World center of mass
    pub c: Vec2Fix,
    /// Angle
    pub a: Fix64,
}

/// Linear and angular velocity of an island body.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Velocity {
    /// Linear velocity of the center of mass
    pub v: Vec2Fix,
    /// Angular velocity
    pub w: Fix64,
}

// ============================================================================
// Planning
// ============================================================================

/// Members of one island, in discovery order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IslandPlan {
    /// Bodies, including the static bodies the island touches
    pub bodies: Vec<BodyId>,
    /// Touching, enabled, non-sensor contacts
    pub contacts: Vec<ContactId>,
    /// Enabled joints
    pub joints: Vec<JointId>,
}

impl IslandPlan {
    /// Partition every awake, enabled, non-static body into islands.
    ///
    /// Seeds are taken in body slot order and edges in insertion order, so
    /// the result only depends on the world contents. Bodies reached by the
    /// traversal are woken up.
    pub fn build_all(
        bodies: &mut Pool<BodyId, Body>,
        contacts: &mut Pool<ContactId, Contact>,
        joints: &mut Pool<JointId, Joint>,
        fixtures: &Pool<FixtureId, Fixture>,
    ) -> Vec<IslandPlan> {
        for (_, body) in bodies.iter_mut() {
            body.island_flag = false;
        }
        for (_, contact) in contacts.iter_mut() {
            contact.island_flag = false;
        }
        for (_, joint) in joints.iter_mut() {
            joint.island_flag = false;
        }

        let mut plans = Vec::new();
        let mut stack = Vec::with_capacity(bodies.len());

        for seed in bodies.keys() {
            let body = &bodies[seed];
            if body.island_flag || !body.awake || !body.enabled || !body.in_world {
                continue;
            }
            if body.body_type == BodyType::Static {
                continue;
            }

            let mut plan = IslandPlan::default();
            stack.clear();
            stack.push(seed);
            bodies[seed].island_flag = true;

            while let Some(id) = stack.pop() {
                plan.bodies.push(id);
                let body = &mut bodies[id];
                body.set_awake(true);

                // Do not propagate through static bodies
                if body.body_type == BodyType::Static {
                    continue;
                }

                let contact_edges = body.contact_edges.clone();
                for edge in contact_edges {
                    let contact = &contacts[edge.contact];
                    if contact.island_flag || !contact.enabled || !contact.touching {
                        continue;
                    }
                    if fixtures[contact.fixture_a].is_sensor || fixtures[contact.fixture_b].is_sensor {
                        continue;
                    }
                    contacts[edge.contact].island_flag = true;
                    plan.contacts.push(edge.contact);

                    Self::visit(bodies, &mut stack, edge.other);
                }

                let joint_edges = bodies[id].joint_edges.clone();
                for edge in joint_edges {
                    let joint = &joints[edge.joint];
                    if joint.island_flag || !joint.enabled || !joint.in_world {
                        continue;
                    }
                    // Joints to disabled bodies are not simulated
                    if !bodies[edge.other].enabled {
                        continue;
                    }
                    let coupled = joint.coupled_bodies();
                    if let Some((c, d)) = coupled {
                        if !bodies[c].enabled || !bodies[d].enabled {
                            continue;
                        }
                    }
                    joints[edge.joint].island_flag = true;
                    plan.joints.push(edge.joint);

                    Self::visit(bodies, &mut stack, edge.other);
                    if let Some((c, d)) = coupled {
                        Self::visit(bodies, &mut stack, c);
                        Self::visit(bodies, &mut stack, d);
                    }
                }
            }

            // Static bodies may take part in other islands
            for &id in &plan.bodies {
                let body = &mut bodies[id];
                if body.body_type == BodyType::Static {
                    body.island_flag = false;
                }
            }

            plans.push(plan);
        }

        plans
    }

    fn visit(bodies: &mut Pool<BodyId, Body>, stack: &mut Vec<BodyId>, id: BodyId) {
        if let Some(body) = bodies.get_mut(id) {
            if !body.island_flag && body.enabled {
                body.island_flag = true;
                stack.push(id);
            }
        }
    }
}

// ============================================================================
// Owned island state
// ============================================================================

/// Copy of the body fields the solver reads and writes.
#[derive(Clone, Copy, Debug)]
struct IslandBody {
    id: BodyId,
    body_type: BodyType,
    sweep: Sweep,
    force: Vec2Fix,
    torque: Fix64,
    inv_mass: Fix64,
    inv_i: Fix64,
    gravity_scale: Fix64,
    linear_damping: Fix64,
    angular_damping: Fix64,
    sleep_time: Fix64,
    auto_sleep: bool,
}

#[derive(Clone, Copy, Debug)]
struct IslandJoint {
    id: JointId,
    kind: JointKind,
    bodies: JointBodies,
}

/// Result of solving one island.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IslandOutcome {
    /// Position iterations converged
    pub position_solved: bool,
    /// The island fell asleep
    pub asleep: bool,
}

/// Owned solver state of one island.
#[derive(Clone, Debug, Default)]
pub struct Island {
    bodies: Vec<IslandBody>,
    positions: Vec<Position>,
    velocities: Vec<Velocity>,
    contacts: Vec<ContactId>,
    contact_inputs: Vec<ContactSolverInput>,
    joints: Vec<IslandJoint>,
    solver: ContactSolver,
    outcome: IslandOutcome,
}

impl Island {
    /// Copy the members of `plan` out of the world.
    ///
    /// Sets every member body's `island_index`, which is only meaningful
    /// until the next island is gathered.
    pub fn gather(
        plan: &IslandPlan,
        bodies: &mut Pool<BodyId, Body>,
        contacts: &Pool<ContactId, Contact>,
        joints: &Pool<JointId, Joint>,
        fixtures: &Pool<FixtureId, Fixture>,
    ) -> Self {
        let mut island = Self {
            bodies: Vec::with_capacity(plan.bodies.len()),
            positions: Vec::with_capacity(plan.bodies.len()),
            velocities: Vec::with_capacity(plan.bodies.len()),
            contacts: plan.contacts.clone(),
            contact_inputs: Vec::with_capacity(plan.contacts.len()),
            joints: Vec::with_capacity(plan.joints.len()),
            solver: ContactSolver::default(),
            outcome: IslandOutcome::default(),
        };

        for (index, &id) in plan.bodies.iter().enumerate() {
            let body = &mut bodies[id];
            body.island_index = index;
            island.bodies.push(IslandBody {
                id,
                body_type: body.body_type,
                sweep: body.sweep,
                force: body.force,
                torque: body.torque,
                inv_mass: body.inv_mass,
                inv_i: body.inv_i,
                gravity_scale: body.gravity_scale,
                linear_damping: body.linear_damping,
                angular_damping: body.angular_damping,
                sleep_time: body.sleep_time,
                auto_sleep: body.auto_sleep,
            });
            island.positions.push(Position {
                c: body.sweep.c,
                a: body.sweep.a,
            });
            island.velocities.push(Velocity {
                v: body.linear_velocity,
                w: body.angular_velocity,
            });
        }

        let solver_body = |id: BodyId| {
            let body = &bodies[id];
            SolverBody {
                index: body.island_index,
                local_center: body.sweep.local_center,
                inv_mass: body.inv_mass,
                inv_i: body.inv_i,
            }
        };

        for &id in &plan.contacts {
            let contact = &contacts[id];
            let fixture_a = &fixtures[contact.fixture_a];
            let fixture_b = &fixtures[contact.fixture_b];
            let a = solver_body(contact.body_a);
            let b = solver_body(contact.body_b);
            island.contact_inputs.push(ContactSolverInput {
                manifold: contact.manifold,
                friction: contact.friction,
                restitution: contact.restitution,
                tangent_speed: contact.tangent_speed,
                index_a: a.index,
                index_b: b.index,
                inv_mass_a: a.inv_mass,
                inv_mass_b: b.inv_mass,
                inv_i_a: a.inv_i,
                inv_i_b: b.inv_i,
                local_center_a: a.local_center,
                local_center_b: b.local_center,
                radius_a: fixture_a.shape.radius(),
                radius_b: fixture_b.shape.radius(),
            });
        }

        for &id in &plan.joints {
            let joint = &joints[id];
            let mut joint_bodies = JointBodies {
                a: solver_body(joint.body_a),
                b: solver_body(joint.body_b),
                ..JointBodies::default()
            };
            if let Some((c, d)) = joint.coupled_bodies() {
                joint_bodies.c = solver_body(c);
                joint_bodies.d = solver_body(d);
            }
            island.joints.push(IslandJoint {
                id,
                kind: joint.kind,
                bodies: joint_bodies,
            });
        }

        island
    }

    /// Number of bodies, including static ones
    #[inline]
    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    /// Number of contact constraints
    #[inline]
    pub fn contact_count(&self) -> usize {
        self.contacts.len()
    }

    /// Number of joints
    #[inline]
    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    /// Outcome of the last solve
    #[inline]
    pub fn outcome(&self) -> IslandOutcome {
        self.outcome
    }

    /// Positions after the last solve, in island order.
    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    /// Velocities after the last solve, in island order.
    pub fn velocities(&self) -> &[Velocity] {
        &self.velocities
    }

    /// Contact impulses of the last solve, in island order.
    pub fn contact_impulses(&self) -> impl Iterator<Item = (ContactId, ContactImpulse)> + '_ {
        self.contacts
            .iter()
            .zip(self.solver.impulses())
            .map(|(&id, (normal_impulses, tangent_impulses, count))| {
                (
                    id,
                    ContactImpulse {
                        normal_impulses,
                        tangent_impulses,
                        count,
                    },
                )
            })
    }

    /// Integrate, solve constraints and evaluate sleep.
    pub fn solve(&mut self, step: &TimeStep, config: &SolverConfig) -> IslandOutcome {
        let h = step.dt;

        // Integrate velocities
        for (i, body) in self.bodies.iter_mut().enumerate() {
            // Store positions for continuous collision
            body.sweep.c0 = body.sweep.c;
            body.sweep.a0 = body.sweep.a;

            if body.body_type != BodyType::Dynamic {
                continue;
            }
            let vel = &mut self.velocities[i];
            vel.v += (config.gravity * body.gravity_scale + body.force * body.inv_mass) * h;
            vel.w += h * body.inv_i * body.torque;

            // Pade approximation of exp(-damping * h)
            vel.v *= Fix64::ONE / (Fix64::ONE + h * body.linear_damping);
            vel.w *= Fix64::ONE / (Fix64::ONE + h * body.angular_damping);
        }

        self.solver = ContactSolver::new(step, config, &self.contact_inputs);
        self.solver.initialize_velocity_constraints(&self.positions, &self.velocities);
        if step.warm_starting {
            self.solver.warm_start(&mut self.velocities);
        }

        {
            let mut data = SolverData {
                step: *step,
                config,
                positions: &mut self.positions,
                velocities: &mut self.velocities,
            };
            for joint in &mut self.joints {
                let bodies = joint.bodies;
                joint.kind.solver_mut().init_velocity_constraints(&bodies, &mut data);
            }

            for _ in 0..step.velocity_iterations {
                for joint in &mut self.joints {
                    joint.kind.solver_mut().solve_velocity_constraints(&mut data);
                }
                self.solver.solve_velocity_constraints(data.velocities);
            }
        }

        self.solver.store_impulses();

        integrate_positions(&mut self.positions, &mut self.velocities, h, config);

        let mut position_solved = false;
        for _ in 0..step.position_iterations {
            let contacts_okay = self.solver.solve_position_constraints(&mut self.positions);

            let mut data = SolverData {
                step: *step,
                config,
                positions: &mut self.positions,
                velocities: &mut self.velocities,
            };
            let mut joints_okay = true;
            for joint in &mut self.joints {
                let okay = joint.kind.solver_mut().solve_position_constraints(&mut data);
                joints_okay = joints_okay && okay;
            }

            if contacts_okay && joints_okay {
                // Exit early if the position errors are small
                position_solved = true;
                break;
            }
        }

        for (body, pos) in self.bodies.iter_mut().zip(&self.positions) {
            body.sweep.c = pos.c;
            body.sweep.a = pos.a;
        }

        let mut asleep = false;
        if config.allow_sleep {
            let mut min_sleep_time = Fix64::MAX;
            let lin_tol_sqr = config.linear_sleep_tolerance * config.linear_sleep_tolerance;
            let ang_tol_sqr = config.angular_sleep_tolerance * config.angular_sleep_tolerance;

            for (body, vel) in self.bodies.iter_mut().zip(&self.velocities) {
                if body.body_type == BodyType::Static {
                    continue;
                }
                if !body.auto_sleep || vel.w * vel.w > ang_tol_sqr || vel.v.dot(vel.v) > lin_tol_sqr {
                    body.sleep_time = Fix64::ZERO;
                    min_sleep_time = Fix64::ZERO;
                } else {
                    body.sleep_time += h;
                    min_sleep_time = min_sleep_time.min(body.sleep_time);
                }
            }

            asleep = min_sleep_time >= config.time_to_sleep && position_solved;
        }

        self.outcome = IslandOutcome {
            position_solved,
            asleep,
        };
        self.outcome
    }

    /// Store the solve results in the world, report contact impulses and
    /// break overloaded joints.
    pub fn write_back(
        &self,
        bodies: &mut Pool<BodyId, Body>,
        contacts: &mut Pool<ContactId, Contact>,
        joints: &mut Pool<JointId, Joint>,
        events: &mut EventCollector,
        inv_dt: Fix64,
    ) {
        for (i, ib) in self.bodies.iter().enumerate() {
            let body = &mut bodies[ib.id];
            if ib.body_type == BodyType::Static {
                continue;
            }
            body.sweep = ib.sweep;
            body.linear_velocity = self.velocities[i].v;
            body.angular_velocity = self.velocities[i].w;
            body.sleep_time = ib.sleep_time;
            body.synchronize_transform();
        }

        for (&id, manifold) in self.contacts.iter().zip(self.solver.manifolds()) {
            contacts[id].manifold = *manifold;
        }

        if events.has_listener() {
            for (id, impulse) in self.contact_impulses() {
                events.post_solve(&contacts[id], &impulse);
            }
        }

        for joint in &self.joints {
            let stored = &mut joints[joint.id];
            stored.kind = joint.kind;

            let Some(breakpoint) = stored.breakpoint else {
                continue;
            };
            let force = joint.kind.solver().reaction_force(inv_dt).length();
            if force > breakpoint {
                stored.enabled = false;
                info!(joint = ?joint.id, %force, %breakpoint, "joint broke");
                events.push(WorldEvent::JointBroke { joint: joint.id, force });
            }
        }

        if self.outcome.asleep {
            for ib in &self.bodies {
                bodies[ib.id].set_awake(false);
            }
        }
    }

    /// TOI sub-step: push the two TOI bodies out of overlap, then solve
    /// velocities and integrate the remainder of the step. No warm starting
    /// and no joints.
    pub fn solve_toi(&mut self, sub_step: &TimeStep, config: &SolverConfig, toi_index_a: usize, toi_index_b: usize) {
        debug_assert!(toi_index_a < self.bodies.len() && toi_index_b < self.bodies.len());

        self.solver = ContactSolver::new(sub_step, config, &self.contact_inputs);

        // Solve position constraints
        for _ in 0..config.toi_position_iterations {
            if self
                .solver
                .solve_toi_position_constraints(&mut self.positions, toi_index_a, toi_index_b)
            {
                break;
            }
        }

        // Leap of faith to the new safe state
        for index in [toi_index_a, toi_index_b] {
            self.bodies[index].sweep.c0 = self.positions[index].c;
            self.bodies[index].sweep.a0 = self.positions[index].a;
        }

        // No warm starting is needed for TOI events because warm
        // starting impulses were applied in the discrete solver.
        self.solver.initialize_velocity_constraints(&self.positions, &self.velocities);

        for _ in 0..sub_step.velocity_iterations {
            self.solver.solve_velocity_constraints(&mut self.velocities);
        }

        integrate_positions(&mut self.positions, &mut self.velocities, sub_step.dt, config);

        for (body, pos) in self.bodies.iter_mut().zip(&self.positions) {
            body.sweep.c = pos.c;
            body.sweep.a = pos.a;
        }
    }

    /// Store the TOI sub-step results. Contact impulses are reported but not
    /// kept for warm starting.
    pub fn write_back_toi(&self, bodies: &mut Pool<BodyId, Body>, contacts: &Pool<ContactId, Contact>, events: &mut EventCollector) {
        for (i, ib) in self.bodies.iter().enumerate() {
            if ib.body_type == BodyType::Static {
                continue;
            }
            let body = &mut bodies[ib.id];
            body.sweep = ib.sweep;
            body.linear_velocity = self.velocities[i].v;
            body.angular_velocity = self.velocities[i].w;
            body.synchronize_transform();
        }

        if events.has_listener() {
            for (id, impulse) in self.contact_impulses() {
                events.post_solve(&contacts[id], &impulse);
            }
        }
    }

    /// Island-local index of `id`, if it is a member.
    pub fn index_of(&self, id: BodyId) -> Option<usize> {
        self.bodies.iter().position(|b| b.id == id)
    }
}

/// `c += h * v`, `a += h * w` with the per-step motion clamped.
fn integrate_positions(positions: &mut [Position], velocities: &mut [Velocity], h: Fix64, config: &SolverConfig) {
    for (pos, vel) in positions.iter_mut().zip(velocities.iter_mut()) {
        let translation = vel.v * h;
        if translation.dot(translation) > config.max_translation * config.max_translation {
            let ratio = config.max_translation / translation.length();
            vel.v *= ratio;
        }

        let rotation = h * vel.w;
        if rotation * rotation > config.max_rotation * config.max_rotation {
            let ratio = config.max_rotation / rotation.abs();
            vel.w *= ratio;
        }

        pos.c += vel.v * h;
        pos.a += h * vel.w;
    }
}

/// Solve every island, in parallel when the `parallel` feature is on.
///
/// Islands only read their own state, so both paths produce identical
/// results; write-back happens afterwards in island order.
pub fn solve_islands(islands: &mut [Island], step: &TimeStep, config: &SolverConfig) {
    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        islands.par_iter_mut().for_each(|island| {
            island.solve(step, config);
        });
    }

    #[cfg(not(feature = "parallel"))]
    for island in islands.iter_mut() {
        island.solve(step, config);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::{BodyDef, ContactEdge, JointEdge};
    use crate::fixture::FixtureDef;
    use crate::joint::{JointDef, RevoluteJoint};
    use crate::shape::CircleShape;

    struct Scene {
        bodies: Pool<BodyId, Body>,
        fixtures: Pool<FixtureId, Fixture>,
        contacts: Pool<ContactId, Contact>,
        joints: Pool<JointId, Joint>,
    }

    impl Scene {
        fn new() -> Self {
            Self {
                bodies: Pool::new(),
                fixtures: Pool::new(),
                contacts: Pool::new(),
                joints: Pool::new(),
            }
        }

        fn body(&mut self, def: BodyDef) -> BodyId {
            let id = self.bodies.insert_with(|id| Body::new(id, &def));
            let fixture = self.fixtures.insert(Fixture::new(id, FixtureDef::new(CircleShape::new(Fix64::HALF))));
            let body = &mut self.bodies[id];
            body.fixtures.push(fixture);
            body.in_world = true;
            id
        }

        fn dynamic(&mut self, x: i64) -> BodyId {
            self.body(BodyDef::dynamic().with_position(Vec2Fix::from_int(x, 0)))
        }

        /// Touching contact between the first fixtures of `a` and `b`.
        fn touch(&mut self, a: BodyId, b: BodyId) -> ContactId {
            let fa = self.bodies[a].fixtures[0];
            let fb = self.bodies[b].fixtures[0];
            let fixtures = &self.fixtures;
            let id = self.contacts.insert_with(|id| Contact::new(id, fa, 0, fb, 0, fixtures));
            self.contacts[id].touching = true;
            self.bodies[a].contact_edges.push(ContactEdge { other: b, contact: id });
            self.bodies[b].contact_edges.push(ContactEdge { other: a, contact: id });
            id
        }

        fn hinge(&mut self, a: BodyId, b: BodyId) -> JointId {
            let def = JointDef::new(a, b, RevoluteJoint::new(Vec2Fix::ZERO, Vec2Fix::ZERO, Fix64::ZERO));
            let id = self.joints.insert_with(|id| Joint::new(id, &def));
            self.joints[id].in_world = true;
            self.bodies[a].joint_edges.push(JointEdge { other: b, joint: id });
            self.bodies[b].joint_edges.push(JointEdge { other: a, joint: id });
            id
        }

        fn plans(&mut self) -> Vec<IslandPlan> {
            IslandPlan::build_all(&mut self.bodies, &mut self.contacts, &mut self.joints, &self.fixtures)
        }
    }

    #[test]
    fn test_static_ground_separates_islands() {
        let mut s = Scene::new();
        let ground = s.body(BodyDef::default());
        let a = s.dynamic(-5);
        let b = s.dynamic(-4);
        let c = s.dynamic(4);
        let d = s.dynamic(5);
        let ab = s.touch(a, b);
        s.touch(a, ground);
        s.touch(ground, d);
        let cd = s.hinge(c, d);

        let plans = s.plans();
        assert_eq!(plans.len(), 2);

        assert_eq!(plans[0].bodies.len(), 3);
        assert!(plans[0].bodies.contains(&a) && plans[0].bodies.contains(&b));
        assert!(plans[0].contacts.contains(&ab));
        assert!(plans[0].joints.is_empty());

        assert!(plans[1].bodies.contains(&c) && plans[1].bodies.contains(&d));
        assert_eq!(plans[1].joints, vec![cd]);
        assert!(!plans[1].contacts.contains(&ab));

        // The ground shows up in both islands
        assert!(plans.iter().all(|p| p.bodies.contains(&ground)));
    }

    #[test]
    fn test_non_touching_and_sensor_contacts_do_not_link() {
        let mut s = Scene::new();
        let a = s.dynamic(0);
        let b = s.dynamic(1);
        let contact = s.touch(a, b);
        s.contacts[contact].touching = false;
        assert_eq!(s.plans().len(), 2);

        s.contacts[contact].touching = true;
        let fa = s.bodies[a].fixtures[0];
        s.fixtures[fa].is_sensor = true;
        assert_eq!(s.plans().len(), 2);
    }

    #[test]
    fn test_sleeping_and_disabled_bodies_do_not_seed() {
        let mut s = Scene::new();
        let a = s.dynamic(0);
        let b = s.dynamic(3);
        s.bodies[a].set_awake(false);
        s.bodies[b].enabled = false;
        assert!(s.plans().is_empty());
    }

    #[test]
    fn test_traversal_wakes_reached_bodies() {
        let mut s = Scene::new();
        let a = s.dynamic(0);
        let b = s.dynamic(1);
        s.touch(a, b);
        s.bodies[b].awake = false;
        let plans = s.plans();
        assert_eq!(plans.len(), 1);
        assert!(s.bodies[b].is_awake());
    }

    #[test]
    fn test_free_fall_solve_and_write_back() {
        let mut s = Scene::new();
        let a = s.dynamic(0);
        let plans = s.plans();
        let mut island = Island::gather(&plans[0], &mut s.bodies, &s.contacts, &s.joints, &s.fixtures);
        assert_eq!(island.body_count(), 1);

        let config = SolverConfig::default();
        let step = TimeStep {
            dt: Fix64::from_ratio(1, 60),
            inv_dt: Fix64::from_int(60),
            dt_ratio: Fix64::ONE,
            velocity_iterations: 8,
            position_iterations: 3,
            warm_starting: true,
        };
        let outcome = island.solve(&step, &config);
        assert!(outcome.position_solved);
        assert!(!outcome.asleep);

        let mut events = EventCollector::new();
        island.write_back(&mut s.bodies, &mut s.contacts, &mut s.joints, &mut events, step.inv_dt);
        let body = &s.bodies[a];
        let expected_v = Fix64::from_int(-10) * step.dt;
        assert!((body.linear_velocity().y - expected_v).abs() < Fix64::from_ratio(1, 10_000));
        assert!(body.position().y.is_negative());
        assert_eq!(body.sweep().c0, Vec2Fix::ZERO);
    }

    #[test]
    fn test_resting_island_falls_asleep() {
        let mut s = Scene::new();
        let a = s.dynamic(0);
        let config = SolverConfig::zero_gravity();
        let step = TimeStep {
            dt: Fix64::from_ratio(1, 60),
            inv_dt: Fix64::from_int(60),
            dt_ratio: Fix64::ONE,
            velocity_iterations: 8,
            position_iterations: 3,
            warm_starting: true,
        };
        let mut events = EventCollector::new();
        for _ in 0..60 {
            let plans = s.plans();
            if plans.is_empty() {
                break;
            }
            let mut island = Island::gather(&plans[0], &mut s.bodies, &s.contacts, &s.joints, &s.fixtures);
            island.solve(&step, &config);
            island.write_back(&mut s.bodies, &mut s.contacts, &mut s.joints, &mut events, step.inv_dt);
        }
        assert!(!s.bodies[a].is_awake());
    }

    #[test]
    fn test_motion_is_clamped_per_step() {
        let mut positions = vec![Position::default()];
        let mut velocities = vec![Velocity {
            v: Vec2Fix::from_int(1000, 0),
            w: Fix64::from_int(1000),
        }];
        let config = SolverConfig::default();
        integrate_positions(&mut positions, &mut velocities, Fix64::from_ratio(1, 60), &config);
        assert!(positions[0].c.x <= config.max_translation + Fix64::from_ratio(1, 1000));
        assert!(positions[0].a <= config.max_rotation + Fix64::from_ratio(1, 1000));
    }
}
