#![no_main]
use libfuzzer_sys::fuzz_target;
use arbitrary::Arbitrary;
use alice_physics2d::prelude::*;

#[derive(Debug, Arbitrary)]
struct FuzzBody {
    /// Position in tenths of a meter
    x: i16,
    y: i16,
    /// Velocity in m/s
    vx: i8,
    vy: i8,
    /// Box (true) or circle (false)
    is_box: bool,
    /// Size in tenths of a meter, 0 is clamped to 1
    size: u8,
    bullet: bool,
}

#[derive(Debug, Arbitrary)]
struct FuzzInput {
    /// Bodies to add (capped)
    bodies: Vec<FuzzBody>,
    /// Distance joints between consecutive bodies
    join: Vec<bool>,
    /// Simulation steps (capped)
    step_count: u8,
    /// Remove the first body halfway through
    remove_first: bool,
}

// Fuzz the world pipeline: random scene, joints, removal mid-run.
// Must never panic regardless of input.
fuzz_target!(|input: FuzzInput| {
    let mut world = World::new(SolverConfig::default());
    let ground = world.create_body(BodyDef::default().with_position(Vec2Fix::from_int(0, -1)));
    world.create_fixture(ground, FixtureDef::new(PolygonShape::new_box(Fix64::from_int(50), Fix64::ONE)));

    let tenth = |v: i64| Fix64::from_ratio(v, 10);
    let mut ids = Vec::new();
    for body in input.bodies.iter().take(24) {
        let mut def = BodyDef::dynamic()
            .with_position(Vec2Fix::new(tenth(body.x as i64), tenth(body.y as i64)))
            .with_linear_velocity(Vec2Fix::from_int(body.vx as i64, body.vy as i64));
        if body.bullet {
            def = def.bullet();
        }
        let id = world.create_body(def);
        let size = tenth(body.size.max(1) as i64);
        let fixture = if body.is_box {
            FixtureDef::new(PolygonShape::new_box(size, size))
        } else {
            FixtureDef::new(CircleShape::new(size))
        };
        world.create_fixture(id, fixture.with_density(Fix64::ONE));
        ids.push(id);
    }

    for (pair, &join) in ids.windows(2).zip(input.join.iter()) {
        if join {
            let _ = world.add_joint(JointDef::new(
                pair[0],
                pair[1],
                DistanceJoint::new(Vec2Fix::ZERO, Vec2Fix::ZERO, Fix64::ONE),
            ));
        }
    }

    let dt = Fix64::from_ratio(1, 60);
    let steps = (input.step_count as usize).min(64);
    for i in 0..steps {
        if input.remove_first && i == steps / 2 {
            if let Some(&first) = ids.first() {
                world.remove_body(first);
            }
        }
        world.step(dt);
    }
});
