//! Benchmarks for ALICE-Physics2D
//!
//! Run with: `cargo bench`

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use alice_physics2d::broad_phase::BroadPhase;
use alice_physics2d::collision::Aabb;
use alice_physics2d::prelude::*;

fn dt() -> Fix64 {
    Fix64::from_ratio(1, 60)
}

fn pyramid_world(rows: i64) -> World {
    let mut world = World::new(SolverConfig::default());
    let ground = world.create_body(BodyDef::default().with_position(Vec2Fix::from_int(0, -1)));
    world.create_fixture(ground, FixtureDef::new(PolygonShape::new_box(Fix64::from_int(40), Fix64::ONE)));

    for row in 0..rows {
        for col in 0..(rows - row) {
            let x = Fix64::from_int(col) + Fix64::from_int(row) * Fix64::HALF - Fix64::from_int(rows) * Fix64::HALF;
            let y = Fix64::HALF + Fix64::from_int(row);
            let body = world.create_body(BodyDef::dynamic().with_position(Vec2Fix::new(x, y)));
            world.create_fixture(
                body,
                FixtureDef::new(PolygonShape::new_box(Fix64::HALF, Fix64::HALF)).with_density(Fix64::ONE),
            );
        }
    }
    world
}

// ============================================================================
// World step benchmarks
// ============================================================================

fn bench_world_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("world_step");

    group.bench_function("single_ball_60_steps", |b| {
        b.iter(|| {
            let mut world = World::new(SolverConfig::default());
            let ball = world.create_body(BodyDef::dynamic().with_position(Vec2Fix::from_int(0, 100)));
            world.create_fixture(ball, FixtureDef::new(CircleShape::new(Fix64::HALF)).with_density(Fix64::ONE));
            for _ in 0..60 {
                world.step(black_box(dt()));
            }
            world.body(ball).position()
        });
    });

    group.bench_function("pyramid_10_rows_60_steps", |b| {
        b.iter(|| {
            let mut world = pyramid_world(10);
            for _ in 0..60 {
                world.step(black_box(dt()));
            }
            world.stats().touching_contacts
        });
    });

    group.bench_function("bullet_through_wall_ccd", |b| {
        b.iter(|| {
            let mut world = World::new(SolverConfig::zero_gravity());
            let wall = world.create_body(BodyDef::default().with_position(Vec2Fix::from_int(1, 0)));
            world.create_fixture(wall, FixtureDef::new(PolygonShape::new_box(Fix64::from_ratio(5, 100), Fix64::from_int(2))));
            let bullet = world.create_body(
                BodyDef::dynamic()
                    .with_linear_velocity(Vec2Fix::from_int(200, 0))
                    .bullet(),
            );
            world.create_fixture(bullet, FixtureDef::new(CircleShape::new(Fix64::from_ratio(1, 10))).with_density(Fix64::ONE));
            world.step(black_box(dt()));
            world.body(bullet).position()
        });
    });

    group.finish();
}

// ============================================================================
// Broad phase benchmarks
// ============================================================================

fn bench_broad_phase(c: &mut Criterion) {
    let mut group = c.benchmark_group("broad_phase");

    let aabbs: Vec<Aabb> = (0..1000)
        .map(|i| {
            let x = Fix64::from_int(i % 40);
            let y = Fix64::from_int(i / 40);
            let h = Vec2Fix::new(Fix64::from_ratio(6, 10), Fix64::from_ratio(6, 10));
            let c = Vec2Fix::new(x, y);
            Aabb::new(c - h, c + h)
        })
        .collect();

    group.bench_function("create_1000_and_pair", |b| {
        b.iter(|| {
            let mut bp: BroadPhase<u32> = BroadPhase::new();
            for (i, aabb) in aabbs.iter().enumerate() {
                bp.create_proxy(aabb, i as u32);
            }
            let mut pairs = 0u32;
            bp.update_pairs(|_, _| pairs += 1);
            black_box(pairs)
        });
    });

    let mut bp: BroadPhase<u32> = BroadPhase::new();
    for (i, aabb) in aabbs.iter().enumerate() {
        bp.create_proxy(aabb, i as u32);
    }
    bp.update_pairs(|_, _| {});

    group.bench_function("query_1000", |b| {
        let query = Aabb::new(Vec2Fix::from_int(10, 5), Vec2Fix::from_int(15, 10));
        b.iter(|| {
            let mut hits = 0u32;
            bp.query(black_box(&query), |_| {
                hits += 1;
                true
            });
            hits
        });
    });

    group.finish();
}

criterion_group!(benches, bench_world_step, bench_broad_phase);
criterion_main!(benches);
