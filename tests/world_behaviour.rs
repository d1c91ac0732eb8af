//! Integration tests for ALICE-Physics2D
//!
//! End-to-end scenarios through the public API only. Every scene is
//! deterministic: fixed-point state, fixed dt, stable iteration order.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use alice_physics2d::joint::LimitState;
use alice_physics2d::prelude::*;

// ============================================================================
// Helpers
// ============================================================================

fn dt() -> Fix64 {
    Fix64::from_ratio(1, 60)
}

fn tol(num: i64, den: i64) -> Fix64 {
    Fix64::from_ratio(num, den)
}

fn run(world: &mut World, steps: usize) {
    for _ in 0..steps {
        world.step(dt());
    }
}

/// Static ground whose top surface is y = 0.
fn add_ground(world: &mut World) -> BodyId {
    let ground = world.create_body(BodyDef::default().with_position(Vec2Fix::from_int(0, -1)));
    world.create_fixture(ground, FixtureDef::new(PolygonShape::new_box(Fix64::from_int(40), Fix64::ONE)));
    ground
}

fn add_box(world: &mut World, x: Fix64, y: Fix64) -> BodyId {
    let body = world.create_body(BodyDef::dynamic().with_position(Vec2Fix::new(x, y)));
    world.create_fixture(
        body,
        FixtureDef::new(PolygonShape::new_box(Fix64::HALF, Fix64::HALF))
            .with_density(Fix64::ONE)
            .with_friction(Fix64::from_ratio(6, 10)),
    );
    body
}

fn add_ball(world: &mut World, position: Vec2Fix, radius: Fix64) -> BodyId {
    let body = world.create_body(BodyDef::dynamic().with_position(position));
    world.create_fixture(body, FixtureDef::new(CircleShape::new(radius)).with_density(Fix64::ONE));
    body
}

fn pyramid(world: &mut World, rows: i64) -> Vec<BodyId> {
    let mut bodies = Vec::new();
    for row in 0..rows {
        for col in 0..(rows - row) {
            let x = Fix64::from_int(col) + Fix64::from_int(row) * Fix64::HALF - Fix64::from_int(rows) * Fix64::HALF;
            let y = Fix64::HALF + Fix64::from_int(row);
            bodies.push(add_box(world, x, y));
        }
    }
    bodies
}

// ============================================================================
// Determinism
// ============================================================================

/// Two independent runs of the same scene are bit-identical.
#[test]
fn test_pyramid_determinism() {
    fn simulate() -> Vec<(Vec2Fix, Fix64, Vec2Fix, Fix64)> {
        let mut world = World::new(SolverConfig::default());
        add_ground(&mut world);
        let boxes = pyramid(&mut world, 5);
        let ball = add_ball(&mut world, Vec2Fix::from_int(-8, 3), Fix64::HALF);
        world.body_mut(ball).set_linear_velocity(Vec2Fix::from_int(12, 0));
        run(&mut world, 180);

        boxes
            .iter()
            .chain(core::iter::once(&ball))
            .map(|&id| {
                let body = world.body(id);
                (body.position(), body.angle(), body.linear_velocity(), body.angular_velocity())
            })
            .collect()
    }

    let first = simulate();
    let second = simulate();
    assert_eq!(first, second, "runs diverged");
}

// ============================================================================
// Resting contact
// ============================================================================

/// Re-stepping a converged stack does not inject energy.
#[test]
fn test_warm_started_stack_stays_at_rest() {
    let config = SolverConfig {
        allow_sleep: false,
        ..SolverConfig::default()
    };
    let mut world = World::new(config);
    add_ground(&mut world);
    let bottom = add_box(&mut world, Fix64::ZERO, Fix64::HALF);
    let top = add_box(&mut world, Fix64::ZERO, Fix64::from_ratio(3, 2));
    run(&mut world, 240);

    let before: Vec<Vec2Fix> = [bottom, top].iter().map(|&id| world.body(id).position()).collect();
    run(&mut world, 120);

    for (i, &id) in [bottom, top].iter().enumerate() {
        let body = world.body(id);
        let drift = (body.position() - before[i]).length();
        assert!(drift < tol(1, 1000), "body {i} drifted {drift}");
        assert!(body.linear_velocity().length() < tol(1, 100), "body {i} moving {:?}", body.linear_velocity());
    }
}

/// Resting bodies fall asleep and wake on an impulse.
#[test]
fn test_island_sleeps_and_wakes() {
    let mut world = World::new(SolverConfig::default());
    add_ground(&mut world);
    let body = add_box(&mut world, Fix64::ZERO, Fix64::HALF);
    run(&mut world, 180);
    assert!(!world.body(body).is_awake());
    assert_eq!(world.body(body).linear_velocity(), Vec2Fix::ZERO);

    let center = world.body(body).world_center();
    world.body_mut(body).apply_linear_impulse(Vec2Fix::from_int(0, 5), center, true);
    assert!(world.body(body).is_awake());
    run(&mut world, 1);
    assert!(world.body(body).position().y > Fix64::HALF);
}

/// Alternating step sizes keep a resting box resting.
#[test]
fn test_variable_dt_does_not_destabilize_contact() {
    let config = SolverConfig {
        allow_sleep: false,
        ..SolverConfig::default()
    };
    let mut world = World::new(config);
    add_ground(&mut world);
    let body = add_box(&mut world, Fix64::ZERO, Fix64::HALF);

    let steps = [Fix64::from_ratio(1, 30), Fix64::from_ratio(1, 120), Fix64::from_ratio(1, 60)];
    for i in 0..300 {
        world.step(steps[i % steps.len()]);
    }

    let body = world.body(body);
    assert!((body.position().y - Fix64::HALF).abs() < tol(2, 100), "y = {}", body.position().y);
    assert!(body.linear_velocity().length() < tol(5, 100));
    assert!(body.angle().abs() < tol(1, 100));
}

/// A zero-length step runs the narrow phase but moves nothing.
#[test]
fn test_zero_dt_step_moves_nothing() {
    let mut world = World::new(SolverConfig::default());
    add_ground(&mut world);
    let ball = add_ball(&mut world, Vec2Fix::from_int(0, 3), Fix64::HALF);
    world.step(Fix64::ZERO);
    assert_eq!(world.body(ball).position(), Vec2Fix::from_int(0, 3));
    assert!(world.body(ball).is_in_world());
}

// ============================================================================
// Restitution and friction
// ============================================================================

/// Equal masses, head-on: separating speed is `e` times closing speed.
#[test]
fn test_restitution_head_on() {
    let mut world = World::new(SolverConfig::zero_gravity());
    let ball = |world: &mut World, x: i64, vx: i64| {
        let body = world.create_body(
            BodyDef::dynamic()
                .with_position(Vec2Fix::from_int(x, 0))
                .with_linear_velocity(Vec2Fix::from_int(vx, 0)),
        );
        world.create_fixture(
            body,
            FixtureDef::new(CircleShape::new(Fix64::HALF))
                .with_density(Fix64::ONE)
                .with_friction(Fix64::ZERO)
                .with_restitution(Fix64::HALF),
        );
        body
    };
    let a = ball(&mut world, -2, 5);
    let b = ball(&mut world, 2, -5);
    run(&mut world, 60);

    let va = world.body(a).linear_velocity().x;
    let vb = world.body(b).linear_velocity().x;
    let separating = vb - va;
    assert!((separating - Fix64::from_int(5)).abs() < tol(5, 100), "separating speed {separating}");
    // Momentum is conserved
    assert!((va + vb).abs() < tol(1, 100));
}

/// A box on a slope with high friction does not slide.
#[test]
fn test_friction_holds_box_on_slope() {
    let mut world = World::new(SolverConfig::default());
    let slope = world.create_body(BodyDef::default().with_angle(Fix64::from_ratio(2, 10)));
    world.create_fixture(
        slope,
        FixtureDef::new(PolygonShape::new_box(Fix64::from_int(20), Fix64::ONE)).with_friction(Fix64::ONE),
    );
    let top = world.body(slope).world_point(Vec2Fix::new(Fix64::ZERO, Fix64::from_ratio(3, 2)));
    let body = world.create_body(
        BodyDef::dynamic()
            .with_position(top)
            .with_angle(Fix64::from_ratio(2, 10)),
    );
    world.create_fixture(
        body,
        FixtureDef::new(PolygonShape::new_box(Fix64::HALF, Fix64::HALF))
            .with_density(Fix64::ONE)
            .with_friction(Fix64::ONE),
    );
    run(&mut world, 120);
    let moved = (world.body(body).position() - top).length();
    assert!(moved < tol(1, 10), "box slid {moved}");
}

// ============================================================================
// Continuous collision
// ============================================================================

fn bullet_scene(continuous: bool) -> (World, BodyId) {
    let config = SolverConfig {
        continuous_physics: continuous,
        ..SolverConfig::zero_gravity()
    };
    let mut world = World::new(config);
    let wall = world.create_body(BodyDef::default().with_position(Vec2Fix::from_int(1, 0)));
    world.create_fixture(wall, FixtureDef::new(PolygonShape::new_box(Fix64::from_ratio(5, 100), Fix64::from_int(2))));

    let bullet = world.create_body(
        BodyDef::dynamic()
            .with_linear_velocity(Vec2Fix::from_int(200, 0))
            .bullet(),
    );
    world.create_fixture(
        bullet,
        FixtureDef::new(CircleShape::new(Fix64::from_ratio(1, 10))).with_density(Fix64::ONE),
    );
    (world, bullet)
}

/// Without CCD the bullet tunnels through the wall.
#[test]
fn test_bullet_tunnels_without_ccd() {
    let (mut world, bullet) = bullet_scene(false);
    run(&mut world, 1);
    assert!(world.body(bullet).position().x > Fix64::from_int(1));
}

/// With CCD the bullet stops at the wall surface.
#[test]
fn test_bullet_stopped_by_thin_wall() {
    let (mut world, bullet) = bullet_scene(true);
    // Wall face at 0.95, bullet radius 0.1
    let contact_x = Fix64::from_ratio(85, 100);

    run(&mut world, 1);
    assert!(world.stats().toi_events >= 1);
    for _ in 0..30 {
        let x = world.body(bullet).position().x;
        assert!(x <= contact_x + tol(1, 100), "bullet passed the wall: x = {x}");
        world.step(dt());
    }
}

/// A TOI island capped at one contact still stops the bullet at the first wall.
#[test]
fn test_toi_contact_cap_still_stops_bullet() {
    let config = SolverConfig {
        max_toi_contacts: 1,
        ..SolverConfig::zero_gravity()
    };
    let mut world = World::new(config);
    for y in [-1, 1] {
        let wall = world.create_body(BodyDef::default().with_position(Vec2Fix::new(Fix64::ONE, tol(y, 10))));
        world.create_fixture(wall, FixtureDef::new(PolygonShape::new_box(Fix64::from_ratio(5, 100), Fix64::from_int(2))));
    }
    let bullet = world.create_body(
        BodyDef::dynamic()
            .with_linear_velocity(Vec2Fix::from_int(200, 0))
            .bullet(),
    );
    world.create_fixture(
        bullet,
        FixtureDef::new(CircleShape::new(Fix64::from_ratio(1, 10))).with_density(Fix64::ONE),
    );

    let contact_x = Fix64::from_ratio(85, 100);
    for _ in 0..10 {
        world.step(dt());
        let x = world.body(bullet).position().x;
        assert!(x.is_valid());
        assert!(x <= contact_x + tol(1, 100), "bullet passed the walls: x = {x}");
    }
}

// ============================================================================
// Joints
// ============================================================================

/// Limit impulses only ever push out of the violated limit.
#[test]
fn test_revolute_limit_impulse_sign() {
    let mut world = World::new(SolverConfig::default());
    let pivot = world.create_body(BodyDef::default().with_position(Vec2Fix::from_int(0, 10)));
    let arm = world.create_body(BodyDef::dynamic().with_position(Vec2Fix::from_int(2, 10)));
    world.create_fixture(
        arm,
        FixtureDef::new(PolygonShape::new_box(Fix64::from_int(2), Fix64::from_ratio(1, 10))).with_density(Fix64::ONE),
    );
    let quarter = Fix64::from_ratio(1, 4);
    let joint = world
        .add_joint(JointDef::new(
            pivot,
            arm,
            RevoluteJoint::new(Vec2Fix::ZERO, Vec2Fix::from_int(-2, 0), Fix64::ZERO).with_limits(-quarter, quarter),
        ))
        .expect("revolute");

    let mut saw_lower = false;
    for step in 0..240 {
        // Kick the arm upwards halfway through to exercise the upper limit
        if step == 120 {
            world.body_mut(arm).set_angular_velocity(Fix64::from_int(3));
        }
        world.step(dt());

        let revolute = world.joint(joint).kind().as_revolute().expect("revolute kind");
        let impulse = revolute.limit_impulse();
        match revolute.limit_state() {
            LimitState::AtLower => {
                saw_lower = true;
                assert!(!impulse.is_negative(), "lower limit pulled: {impulse}");
            }
            LimitState::AtUpper => assert!(!impulse.is_positive(), "upper limit pulled: {impulse}"),
            _ => {}
        }
        let angle = revolute.joint_angle(world.body(pivot), world.body(arm));
        assert!(angle > -quarter - tol(1, 10) && angle < quarter + tol(1, 10), "angle {angle}");
    }
    assert!(saw_lower);
}

/// A gear keeps `w1 + ratio * w2 = 0` between two hinged wheels.
#[test]
fn test_gear_couples_wheels() {
    let mut world = World::new(SolverConfig::zero_gravity());
    let ground = world.create_body(BodyDef::default());
    let wheel1 = add_ball(&mut world, Vec2Fix::ZERO, Fix64::ONE);
    let wheel2 = add_ball(&mut world, Vec2Fix::from_int(4, 0), Fix64::ONE);

    let hinge1 = world
        .add_joint(JointDef::new(
            ground,
            wheel1,
            RevoluteJoint::new(Vec2Fix::ZERO, Vec2Fix::ZERO, Fix64::ZERO)
                .with_motor(Fix64::from_int(2), Fix64::from_int(1000)),
        ))
        .expect("hinge1");
    let hinge2 = world
        .add_joint(JointDef::new(
            ground,
            wheel2,
            RevoluteJoint::new(Vec2Fix::from_int(4, 0), Vec2Fix::ZERO, Fix64::ZERO),
        ))
        .expect("hinge2");
    // Hinges must be in the world before the gear can read them
    world.process_changes();
    let ratio = Fix64::TWO;
    world
        .add_joint(JointDef::new(wheel1, wheel2, GearJoint::new(hinge1, hinge2, ratio)))
        .expect("gear");

    run(&mut world, 60);
    let w1 = world.body(wheel1).angular_velocity();
    let w2 = world.body(wheel2).angular_velocity();
    assert!(w1.abs() > tol(1, 2), "motor did not turn wheel1");
    assert!((w1 + ratio * w2).abs() < tol(5, 100), "w1 = {w1}, w2 = {w2}");
}

/// A mouse joint drags a body onto its target.
#[test]
fn test_mouse_joint_drags_body() {
    let mut world = World::new(SolverConfig::zero_gravity());
    let ground = world.create_body(BodyDef::default());
    let body = add_ball(&mut world, Vec2Fix::ZERO, Fix64::HALF);
    world.process_changes();

    let target = Vec2Fix::from_int(3, 1);
    let grab = MouseJoint::new(world.body(body), world.body(body).position());
    let joint = world
        .add_joint(JointDef::new(ground, body, grab.with_max_force(Fix64::from_int(500))))
        .expect("mouse");
    world.process_changes();
    if let Some(mouse) = world.joint_mut(joint).kind_mut().as_mouse_mut() {
        mouse.set_target(target);
    }

    run(&mut world, 180);
    let error = (world.body(body).position() - target).length();
    assert!(error < tol(5, 100), "error {error}");
}

/// Joined bodies do not collide unless asked to.
#[test]
fn test_joint_suppresses_collision_between_its_bodies() {
    let mut world = World::new(SolverConfig::zero_gravity());
    let a = add_ball(&mut world, Vec2Fix::ZERO, Fix64::ONE);
    let b = add_ball(&mut world, Vec2Fix::new(Fix64::HALF, Fix64::ZERO), Fix64::ONE);
    world
        .add_joint(JointDef::new(a, b, RopeJoint::new(Vec2Fix::ZERO, Vec2Fix::ZERO, Fix64::from_int(3))))
        .expect("rope");
    run(&mut world, 5);
    assert_eq!(world.stats().touching_contacts, 0);
    assert!(world.body(a).position().length() < tol(1, 1000));
}

// ============================================================================
// Contacts and islands
// ============================================================================

/// Begin and end events bracket a touch.
#[test]
fn test_contact_lifecycle_events() {
    let mut world = World::new(SolverConfig::default());
    add_ground(&mut world);
    let ball = add_ball(&mut world, Vec2Fix::from_int(0, 2), Fix64::HALF);

    let mut began = false;
    for _ in 0..120 {
        world.step(dt());
        began |= world
            .drain_events()
            .iter()
            .any(|e| matches!(e, WorldEvent::BeginContact { .. }));
        if began {
            break;
        }
    }
    assert!(began, "no begin event");

    world.set_transform(ball, Vec2Fix::from_int(0, 20), Fix64::ZERO);
    world.step(dt());
    let events = world.drain_events();
    assert!(events.iter().any(|e| matches!(e, WorldEvent::EndContact { .. })), "{events:?}");
    assert_eq!(world.contact_count(), 0);
}

/// Collision and separation handlers each fire once per touch, even while
/// the body rests on the ground.
#[test]
fn test_fixture_handlers_fire_once_per_touch() {
    let mut world = World::new(SolverConfig::default());
    add_ground(&mut world);
    let ball = add_ball(&mut world, Vec2Fix::from_int(0, 2), Fix64::HALF);

    let hits = Arc::new(AtomicU32::new(0));
    let seps = Arc::new(AtomicU32::new(0));
    let fixture = world.body(ball).fixtures()[0];
    {
        let hits = Arc::clone(&hits);
        world.fixture_mut(fixture).set_on_collision(Box::new(move |_: FixtureId, _: FixtureId, _: &Contact| {
            hits.fetch_add(1, Ordering::Relaxed);
            true
        }));
    }
    {
        let seps = Arc::clone(&seps);
        world.fixture_mut(fixture).set_on_separation(Box::new(move |_: FixtureId, _: FixtureId| {
            seps.fetch_add(1, Ordering::Relaxed);
        }));
    }

    run(&mut world, 300);
    assert_eq!(hits.load(Ordering::Relaxed), 1);
    assert_eq!(seps.load(Ordering::Relaxed), 0);

    // Resting bodies may be asleep; teleporting alone keeps their contacts
    world.set_transform(ball, Vec2Fix::from_int(0, 20), Fix64::ZERO);
    world.body_mut(ball).set_awake(true);
    run(&mut world, 5);
    assert_eq!(hits.load(Ordering::Relaxed), 1);
    assert_eq!(seps.load(Ordering::Relaxed), 1);
    assert_eq!(world.contact_count(), 0);
}

/// A contact listener can veto contacts in pre-solve.
#[test]
fn test_pre_solve_can_disable_contact() {
    struct OneWay;
    impl ContactListener for OneWay {
        fn pre_solve(&mut self, contact: &mut Contact, _old: &Manifold) {
            contact.set_enabled(false);
        }
    }

    let mut world = World::new(SolverConfig::default());
    add_ground(&mut world);
    let ball = add_ball(&mut world, Vec2Fix::from_int(0, 1), Fix64::HALF);
    world.set_contact_listener(Some(Box::new(OneWay)));
    run(&mut world, 120);
    assert!(world.body(ball).position().y < Fix64::ZERO);
}

/// Static bodies never join islands together.
#[test]
fn test_island_partition() {
    let mut world = World::new(SolverConfig {
        allow_sleep: false,
        ..SolverConfig::default()
    });
    add_ground(&mut world);
    let left = add_box(&mut world, Fix64::from_int(-5), Fix64::HALF);
    add_box(&mut world, Fix64::from_int(-5), Fix64::from_ratio(3, 2));
    let right = add_box(&mut world, Fix64::from_int(5), Fix64::HALF);
    run(&mut world, 30);
    assert_eq!(world.stats().islands, 2);

    world
        .add_joint(JointDef::new(
            left,
            right,
            DistanceJoint::new(Vec2Fix::ZERO, Vec2Fix::ZERO, Fix64::from_int(10)),
        ))
        .expect("distance");
    run(&mut world, 1);
    assert_eq!(world.stats().islands, 1);
}

/// Sensors report overlap without pushing back.
#[test]
fn test_sensor_detects_without_response() {
    let mut world = World::new(SolverConfig::default());
    let zone = world.create_body(BodyDef::default());
    world.create_fixture(
        zone,
        FixtureDef::new(PolygonShape::new_box(Fix64::from_int(2), Fix64::from_int(2))).sensor(),
    );
    let ball = add_ball(&mut world, Vec2Fix::from_int(0, 4), Fix64::HALF);

    let mut detected = false;
    for _ in 0..120 {
        world.step(dt());
        detected |= world.contacts().any(|(_, c)| c.is_touching());
    }
    assert!(detected);
    assert!(world.body(ball).position().y < Fix64::from_int(-2));
}

// ============================================================================
// Controllers
// ============================================================================

/// The velocity limit caps a falling body's speed.
#[test]
fn test_velocity_limit_controller_caps_fall() {
    let mut world = World::new(SolverConfig::default());
    let ball = add_ball(&mut world, Vec2Fix::from_int(0, 100), Fix64::HALF);
    world.add_controller(VelocityLimitController::new(Some(Fix64::from_int(3)), None));
    run(&mut world, 120);
    // Gravity adds at most one step of speed after the clamp
    let speed = world.body(ball).linear_velocity().length();
    assert!(speed <= Fix64::from_int(3) + tol(2, 10), "speed {speed}");
}
