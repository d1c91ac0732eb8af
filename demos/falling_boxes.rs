//! Falling Boxes Example
//!
//! Drops a column of boxes and a ball onto the ground, then prints the
//! per-step counters while the stack settles and falls asleep.
//!
//! ```bash
//! cargo run --example falling_boxes
//! ```

use alice_physics2d::prelude::*;

fn main() {
    let mut world = World::new(SolverConfig::default());

    // Static ground, top surface at y = 0
    let ground = world.create_body(BodyDef::default().with_position(Vec2Fix::from_int(0, -1)));
    world.create_fixture(ground, FixtureDef::new(PolygonShape::new_box(Fix64::from_int(20), Fix64::ONE)));

    // A column of boxes, slightly staggered
    let mut boxes = Vec::new();
    for i in 0..6 {
        let x = Fix64::from_ratio(i % 2, 10);
        let y = Fix64::from_int(1 + 2 * i);
        let body = world.create_body(BodyDef::dynamic().with_position(Vec2Fix::new(x, y)));
        world.create_fixture(
            body,
            FixtureDef::new(PolygonShape::new_box(Fix64::HALF, Fix64::HALF))
                .with_density(Fix64::ONE)
                .with_friction(Fix64::from_ratio(6, 10)),
        );
        boxes.push(body);
    }

    // A bouncy ball off to the side
    let ball = world.create_body(BodyDef::dynamic().with_position(Vec2Fix::from_int(4, 8)));
    world.create_fixture(
        ball,
        FixtureDef::new(CircleShape::new(Fix64::HALF))
            .with_density(Fix64::ONE)
            .with_restitution(Fix64::from_ratio(7, 10)),
    );

    println!("ALICE-Physics2D Falling Boxes");
    println!("=============================");

    let dt = Fix64::from_ratio(1, 60);
    for step in 0..=300 {
        world.step(dt);
        if step % 30 == 0 {
            let stats = world.stats();
            println!(
                "t={:>5.2}s  awake={:>2}  contacts={:>2}/{:<2}  islands={}  top box y={}  ball y={}",
                step as f32 / 60.0,
                stats.awake_bodies,
                stats.touching_contacts,
                stats.contacts,
                stats.islands,
                world.body(boxes[boxes.len() - 1]).position().y,
                world.body(ball).position().y,
            );
        }
    }

    let profile = world.profile();
    println!();
    println!("Steps: {}", profile.steps);
    println!("Average broad-phase pairs per step: {}", profile.broad_phase.average());
    println!("Peak touching contacts: {}", profile.narrow_phase.peak);
}
