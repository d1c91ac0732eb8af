//! Bullet vs. Thin Wall Example
//!
//! Fires a small fast ball at a thin wall twice: once with continuous
//! collision disabled (it tunnels) and once enabled (it stops).
//!
//! ```bash
//! cargo run --example bullet_wall
//! ```

use alice_physics2d::prelude::*;

fn fire(continuous_physics: bool) -> (Fix64, u32) {
    let config = SolverConfig {
        continuous_physics,
        ..SolverConfig::zero_gravity()
    };
    let mut world = World::new(config);

    // 10 cm thick wall at x = 1
    let wall = world.create_body(BodyDef::default().with_position(Vec2Fix::from_int(1, 0)));
    world.create_fixture(wall, FixtureDef::new(PolygonShape::new_box(Fix64::from_ratio(5, 100), Fix64::from_int(2))));

    let bullet = world.create_body(
        BodyDef::dynamic()
            .with_linear_velocity(Vec2Fix::from_int(200, 0))
            .bullet(),
    );
    world.create_fixture(bullet, FixtureDef::new(CircleShape::new(Fix64::from_ratio(1, 10))).with_density(Fix64::ONE));

    let dt = Fix64::from_ratio(1, 60);
    let mut toi_events = 0;
    for _ in 0..10 {
        world.step(dt);
        toi_events += world.stats().toi_events;
    }
    (world.body(bullet).position().x, toi_events)
}

fn main() {
    println!("ALICE-Physics2D Bullet vs. Wall");
    println!("===============================");

    let (x, _) = fire(false);
    println!("discrete:   bullet x = {x} (wall at 0.95..1.05)");

    let (x, toi_events) = fire(true);
    println!("continuous: bullet x = {x} after {toi_events} TOI sub-steps");
}
