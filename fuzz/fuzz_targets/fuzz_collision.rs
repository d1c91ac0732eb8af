#![no_main]
use libfuzzer_sys::fuzz_target;
use arbitrary::Arbitrary;
use alice_physics2d::collide::{collide_polygon_and_circle, collide_polygons};
use alice_physics2d::prelude::*;

#[derive(Debug, Arbitrary)]
struct CollisionInput {
    /// Hull points of polygon A in hundredths of a meter
    points: Vec<(i8, i8)>,
    /// Pose of shape B in hundredths of a meter / radians
    x: i16,
    y: i16,
    angle: i8,
    radius: u8,
}

// Fuzz hull construction and the polygon manifolds.
// Must never panic; degenerate hulls are rejected with an error.
fuzz_target!(|input: CollisionInput| {
    let points: Vec<Vec2Fix> = input
        .points
        .iter()
        .take(16)
        .map(|&(x, y)| Vec2Fix::new(Fix64::from_ratio(x as i64, 100), Fix64::from_ratio(y as i64, 100)))
        .collect();
    let Ok(hull) = PolygonShape::from_points(&points) else {
        return;
    };

    let xf_a = Transform::IDENTITY;
    let xf_b = Transform::new(
        Vec2Fix::new(Fix64::from_ratio(input.x as i64, 100), Fix64::from_ratio(input.y as i64, 100)),
        Fix64::from_ratio(input.angle as i64, 10),
    );

    let mut manifold = Manifold::default();
    let other = PolygonShape::new_box(Fix64::HALF, Fix64::HALF);
    collide_polygons(&mut manifold, &hull, &xf_a, &other, &xf_b);
    assert!(manifold.point_count <= 2);

    let circle = CircleShape::new(Fix64::from_ratio(input.radius.max(1) as i64, 100));
    collide_polygon_and_circle(&mut manifold, &hull, &xf_a, &circle, &xf_b);
    assert!(manifold.point_count <= 1);
});
