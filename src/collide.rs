//! Narrow-Phase Manifold Generation
//!
//! Contact manifolds for every supported shape pair. Each function writes a
//! [`Manifold`] in the local frame of the reference shape so the contact
//! solver can re-evaluate it cheaply at any transform.
//!
//! | A \ B    | Circle | Polygon |
//! |----------|--------|---------|
//! | Circle   | yes    |         |
//! | Polygon  | yes    | yes     |
//! | Edge     | yes    | yes     |
//!
//! Edges collide with polygons as two-sided two-vertex polygons; ghost
//! vertices only smooth edge-circle contacts.

use crate::collision::{
    clip_segment_to_line, ClipVertex, ContactFeature, FeatureType, Manifold, ManifoldType,
};
use crate::math::{Fix64, Transform, Vec2Fix};
use crate::settings::{LINEAR_SLOP, MAX_POLYGON_VERTICES};
use crate::shape::{CircleShape, EdgeShape, PolygonShape};

// ============================================================================
// Circles
// ============================================================================

/// Circle A against circle B.
pub fn collide_circles(
    manifold: &mut Manifold,
    circle_a: &CircleShape,
    xf_a: &Transform,
    circle_b: &CircleShape,
    xf_b: &Transform,
) {
    manifold.point_count = 0;

    let p_a = xf_a.apply(circle_a.p);
    let p_b = xf_b.apply(circle_b.p);
    let radius = circle_a.radius + circle_b.radius;
    if p_a.distance_squared(p_b) > radius * radius {
        return;
    }

    manifold.kind = ManifoldType::Circles;
    manifold.local_point = circle_a.p;
    manifold.local_normal = Vec2Fix::ZERO;
    manifold.point_count = 1;
    manifold.points[0].local_point = circle_b.p;
    manifold.points[0].id = ContactFeature::default();
}

/// Polygon A against circle B.
pub fn collide_polygon_and_circle(
    manifold: &mut Manifold,
    poly_a: &PolygonShape,
    xf_a: &Transform,
    circle_b: &CircleShape,
    xf_b: &Transform,
) {
    manifold.point_count = 0;

    // Circle center in the polygon frame
    let c_local = xf_a.apply_inv(xf_b.apply(circle_b.p));
    let radius = poly_a.radius + circle_b.radius;
    let vertices = poly_a.vertices();
    let normals = poly_a.normals();

    // Find the min separating edge
    let mut normal_index = 0;
    let mut separation = Fix64::MIN;
    for (i, (&v, &n)) in vertices.iter().zip(normals).enumerate() {
        let s = n.dot(c_local - v);
        if s > radius {
            return;
        }
        if s > separation {
            separation = s;
            normal_index = i;
        }
    }

    let v1 = vertices[normal_index];
    let v2 = vertices[(normal_index + 1) % vertices.len()];

    // Center inside the polygon
    if separation < Fix64::EPSILON {
        write_single_face_point(
            manifold,
            normals[normal_index],
            (v1 + v2).scale(Fix64::HALF),
            circle_b.p,
        );
        return;
    }

    // Voronoi region of the closest feature
    let u1 = (c_local - v1).dot(v2 - v1);
    let u2 = (c_local - v2).dot(v1 - v2);
    if !u1.is_positive() {
        if c_local.distance_squared(v1) > radius * radius {
            return;
        }
        write_single_face_point(manifold, (c_local - v1).normalize(), v1, circle_b.p);
    } else if !u2.is_positive() {
        if c_local.distance_squared(v2) > radius * radius {
            return;
        }
        write_single_face_point(manifold, (c_local - v2).normalize(), v2, circle_b.p);
    } else {
        let face_center = (v1 + v2).scale(Fix64::HALF);
        if (c_local - face_center).dot(normals[normal_index]) > radius {
            return;
        }
        write_single_face_point(manifold, normals[normal_index], face_center, circle_b.p);
    }
}

fn write_single_face_point(
    manifold: &mut Manifold,
    local_normal: Vec2Fix,
    local_point: Vec2Fix,
    circle_center: Vec2Fix,
) {
    manifold.kind = ManifoldType::FaceA;
    manifold.local_normal = local_normal;
    manifold.local_point = local_point;
    manifold.point_count = 1;
    manifold.points[0].local_point = circle_center;
    manifold.points[0].id = ContactFeature::default();
}

// ============================================================================
// Polygons (SAT + clipping)
// ============================================================================

/// Largest separation of `poly2` along the face normals of `poly1`.
fn find_max_separation(
    poly1: &PolygonShape,
    xf1: &Transform,
    poly2: &PolygonShape,
    xf2: &Transform,
) -> (usize, Fix64) {
    // Work in the frame of poly2
    let xf = xf2.mul_inv(xf1);

    let mut best_index = 0;
    let mut max_separation = Fix64::MIN;
    for (i, (&v1, &n1)) in poly1.vertices().iter().zip(poly1.normals()).enumerate() {
        let n = xf.q.apply(n1);
        let v1 = xf.apply(v1);

        let si = poly2
            .vertices()
            .iter()
            .map(|&v2| n.dot(v2 - v1))
            .fold(Fix64::MAX, Fix64::min);

        if si > max_separation {
            max_separation = si;
            best_index = i;
        }
    }
    (best_index, max_separation)
}

/// Edge of `poly2` most anti-parallel to reference face `edge1` of `poly1`.
fn find_incident_edge(
    poly1: &PolygonShape,
    xf1: &Transform,
    edge1: usize,
    poly2: &PolygonShape,
    xf2: &Transform,
) -> [ClipVertex; 2] {
    // Reference normal in the frame of poly2
    let normal1 = xf2.q.apply_inv(xf1.q.apply(poly1.normals[edge1]));

    let mut index = 0;
    let mut min_dot = Fix64::MAX;
    for (i, &n2) in poly2.normals().iter().enumerate() {
        let dot = normal1.dot(n2);
        if dot < min_dot {
            min_dot = dot;
            index = i;
        }
    }

    let i1 = index;
    let i2 = if i1 + 1 < poly2.count { i1 + 1 } else { 0 };

    let make = |i: usize| ClipVertex {
        v: xf2.apply(poly2.vertices[i]),
        id: ContactFeature {
            index_a: edge1 as u8,
            index_b: i as u8,
            type_a: FeatureType::Face,
            type_b: FeatureType::Vertex,
        },
    };
    [make(i1), make(i2)]
}

/// Polygon A against polygon B.
///
/// Finds the reference face by SAT (preferring A within a small tolerance),
/// then clips the incident edge of the other polygon against the side planes
/// of the reference face.
pub fn collide_polygons(
    manifold: &mut Manifold,
    poly_a: &PolygonShape,
    xf_a: &Transform,
    poly_b: &PolygonShape,
    xf_b: &Transform,
) {
    manifold.point_count = 0;
    let total_radius = poly_a.radius + poly_b.radius;

    let (edge_a, separation_a) = find_max_separation(poly_a, xf_a, poly_b, xf_b);
    if separation_a > total_radius {
        return;
    }

    let (edge_b, separation_b) = find_max_separation(poly_b, xf_b, poly_a, xf_a);
    if separation_b > total_radius {
        return;
    }

    let tolerance = LINEAR_SLOP / Fix64::from_int(10);
    let (poly1, xf1, poly2, xf2, edge1, flip) = if separation_b > separation_a + tolerance {
        manifold.kind = ManifoldType::FaceB;
        (poly_b, xf_b, poly_a, xf_a, edge_b, true)
    } else {
        manifold.kind = ManifoldType::FaceA;
        (poly_a, xf_a, poly_b, xf_b, edge_a, false)
    };

    let incident_edge = find_incident_edge(poly1, xf1, edge1, poly2, xf2);

    let iv1 = edge1;
    let iv2 = if edge1 + 1 < poly1.count { edge1 + 1 } else { 0 };
    let mut v11 = poly1.vertices[iv1];
    let mut v12 = poly1.vertices[iv2];

    let local_tangent = (v12 - v11).normalize();
    let local_normal = local_tangent.cross_scalar(Fix64::ONE);
    let plane_point = (v11 + v12).scale(Fix64::HALF);

    let tangent = xf1.q.apply(local_tangent);
    let normal = tangent.cross_scalar(Fix64::ONE);

    v11 = xf1.apply(v11);
    v12 = xf1.apply(v12);

    // Face offset
    let front_offset = normal.dot(v11);

    // Side offsets, extended by the polygon skins
    let side_offset1 = -tangent.dot(v11) + total_radius;
    let side_offset2 = tangent.dot(v12) + total_radius;

    let (clip1, np) = clip_segment_to_line(&incident_edge, -tangent, side_offset1, iv1 as u8);
    if np < 2 {
        return;
    }
    let (clip2, np) = clip_segment_to_line(&clip1, tangent, side_offset2, iv2 as u8);
    if np < 2 {
        return;
    }

    manifold.local_normal = local_normal;
    manifold.local_point = plane_point;

    let mut point_count = 0;
    for cv in &clip2 {
        let separation = normal.dot(cv.v) - front_offset;
        if separation <= total_radius {
            let cp = &mut manifold.points[point_count];
            cp.local_point = xf2.apply_inv(cv.v);
            cp.id = if flip { cv.id.swapped() } else { cv.id };
            point_count += 1;
        }
    }
    manifold.point_count = point_count;
}

// ============================================================================
// Edges
// ============================================================================

/// Edge A against circle B.
///
/// The circle is classified into the Voronoi regions of the segment. When a
/// ghost vertex exists, vertex contacts that belong to the neighbouring edge
/// are dropped so chains do not snag.
pub fn collide_edge_and_circle(
    manifold: &mut Manifold,
    edge_a: &EdgeShape,
    xf_a: &Transform,
    circle_b: &CircleShape,
    xf_b: &Transform,
) {
    manifold.point_count = 0;

    // Circle center in the edge frame
    let q = xf_a.apply_inv(xf_b.apply(circle_b.p));

    let a = edge_a.v1;
    let b = edge_a.v2;
    let e = b - a;

    // Barycentric coordinates
    let u = e.dot(b - q);
    let v = e.dot(q - a);

    let radius = edge_a.radius + circle_b.radius;
    let radius_sq = radius * radius;

    let vertex_feature = |index_a: u8| ContactFeature {
        index_a,
        index_b: 0,
        type_a: FeatureType::Vertex,
        type_b: FeatureType::Vertex,
    };

    // Region A
    if !v.is_positive() {
        if q.distance_squared(a) > radius_sq {
            return;
        }
        if let Some(v0) = edge_a.v0 {
            // Is the circle in region AB of the previous edge?
            if (a - v0).dot(a - q).is_positive() {
                return;
            }
        }
        write_circles_point(manifold, a, circle_b.p, vertex_feature(0));
        return;
    }

    // Region B
    if !u.is_positive() {
        if q.distance_squared(b) > radius_sq {
            return;
        }
        if let Some(v3) = edge_a.v3 {
            // Is the circle in region AB of the next edge?
            if (v3 - b).dot(q - b).is_positive() {
                return;
            }
        }
        write_circles_point(manifold, b, circle_b.p, vertex_feature(1));
        return;
    }

    // Region AB
    let den = e.length_squared();
    if !den.is_positive() {
        return;
    }
    let p = (a * u + b * v) / den;
    if q.distance_squared(p) > radius_sq {
        return;
    }

    let mut n = Vec2Fix::new(-e.y, e.x);
    if n.dot(q - a).is_negative() {
        n = -n;
    }

    manifold.kind = ManifoldType::FaceA;
    manifold.local_normal = n.normalize();
    manifold.local_point = a;
    manifold.point_count = 1;
    manifold.points[0].local_point = circle_b.p;
    manifold.points[0].id = ContactFeature {
        index_a: 0,
        index_b: 0,
        type_a: FeatureType::Face,
        type_b: FeatureType::Vertex,
    };
}

fn write_circles_point(
    manifold: &mut Manifold,
    local_point: Vec2Fix,
    circle_center: Vec2Fix,
    id: ContactFeature,
) {
    manifold.kind = ManifoldType::Circles;
    manifold.local_normal = Vec2Fix::ZERO;
    manifold.local_point = local_point;
    manifold.point_count = 1;
    manifold.points[0].local_point = circle_center;
    manifold.points[0].id = id;
}

/// Edge A against polygon B.
pub fn collide_edge_and_polygon(
    manifold: &mut Manifold,
    edge_a: &EdgeShape,
    xf_a: &Transform,
    poly_b: &PolygonShape,
    xf_b: &Transform,
) {
    let segment = edge_polygon(edge_a);
    collide_polygons(manifold, &segment, xf_a, poly_b, xf_b);
}

/// Two-sided two-vertex polygon spanning an edge.
fn edge_polygon(edge: &EdgeShape) -> PolygonShape {
    let e = (edge.v2 - edge.v1).normalize();
    let n = e.cross_scalar(Fix64::ONE);

    let mut vertices = [Vec2Fix::ZERO; MAX_POLYGON_VERTICES];
    let mut normals = [Vec2Fix::ZERO; MAX_POLYGON_VERTICES];
    vertices[0] = edge.v1;
    vertices[1] = edge.v2;
    normals[0] = n;
    normals[1] = -n;

    PolygonShape {
        vertices,
        normals,
        count: 2,
        centroid: (edge.v1 + edge.v2).scale(Fix64::HALF),
        radius: edge.radius,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::WorldManifold;
    use crate::settings::POLYGON_RADIUS;

    fn at(x: i64, y: i64) -> Transform {
        Transform::new(Vec2Fix::from_int(x, y), Fix64::ZERO)
    }

    fn close(a: Fix64, b: Fix64) -> bool {
        (a - b).abs() < Fix64::from_ratio(1, 1000)
    }

    #[test]
    fn test_circles_touching_and_apart() {
        let c = CircleShape::new(Fix64::ONE);
        let mut m = Manifold::default();

        collide_circles(&mut m, &c, &at(0, 0), &c, &at(3, 0));
        assert_eq!(m.point_count, 0);

        let xf_b = Transform::new(Vec2Fix::from_ratio(3, 0, 2), Fix64::ZERO);
        collide_circles(&mut m, &c, &at(0, 0), &c, &xf_b);
        assert_eq!(m.point_count, 1);
        assert_eq!(m.kind, ManifoldType::Circles);

        let wm = WorldManifold::new(&m, &at(0, 0), c.radius, &xf_b, c.radius);
        assert_eq!(wm.normal, Vec2Fix::UNIT_X);
        assert!(close(wm.separations[0], Fix64::from_ratio(-1, 2)));
    }

    #[test]
    fn test_polygon_circle_face_region() {
        let poly = PolygonShape::new_box(Fix64::ONE, Fix64::ONE);
        let circle = CircleShape::new(Fix64::HALF);
        let mut m = Manifold::default();

        let xf_b = Transform::new(Vec2Fix::from_ratio(0, 7, 5), Fix64::ZERO);
        collide_polygon_and_circle(&mut m, &poly, &Transform::IDENTITY, &circle, &xf_b);
        assert_eq!(m.point_count, 1);
        assert_eq!(m.kind, ManifoldType::FaceA);
        assert_eq!(m.local_normal, Vec2Fix::UNIT_Y);
    }

    #[test]
    fn test_polygon_circle_vertex_region() {
        let poly = PolygonShape::new_box(Fix64::ONE, Fix64::ONE);
        let circle = CircleShape::new(Fix64::ONE);
        let mut m = Manifold::default();

        let xf_b = Transform::new(Vec2Fix::from_ratio(3, 3, 2), Fix64::ZERO);
        collide_polygon_and_circle(&mut m, &poly, &Transform::IDENTITY, &circle, &xf_b);
        assert_eq!(m.point_count, 1);
        assert_eq!(m.local_point, Vec2Fix::from_int(1, 1));
        assert!(close(m.local_normal.x, m.local_normal.y));

        collide_polygon_and_circle(&mut m, &poly, &Transform::IDENTITY, &circle, &at(3, 3));
        assert_eq!(m.point_count, 0);
    }

    #[test]
    fn test_box_resting_on_box_has_two_points() {
        let ground = PolygonShape::new_box(Fix64::from_int(5), Fix64::ONE);
        let crate_box = PolygonShape::new_box(Fix64::HALF, Fix64::HALF);
        let xf_b = Transform::new(
            Vec2Fix::new(Fix64::ZERO, Fix64::from_ratio(3, 2) - Fix64::from_ratio(1, 100)),
            Fix64::ZERO,
        );

        let mut m = Manifold::default();
        collide_polygons(&mut m, &ground, &at(0, 0), &crate_box, &xf_b);
        assert_eq!(m.point_count, 2);

        let wm = WorldManifold::new(&m, &at(0, 0), ground.radius, &xf_b, crate_box.radius);
        assert!(close(wm.normal.y, Fix64::ONE));
        for s in &wm.separations[..2] {
            assert!(s.is_negative());
        }
        assert_ne!(m.points[0].id.key(), m.points[1].id.key());
    }

    #[test]
    fn test_polygons_separated() {
        let a = PolygonShape::new_box(Fix64::ONE, Fix64::ONE);
        let mut m = Manifold::default();
        collide_polygons(&mut m, &a, &at(0, 0), &a, &at(5, 0));
        assert_eq!(m.point_count, 0);
    }

    #[test]
    fn test_reference_face_flip_keeps_normal_a_to_b() {
        let small = PolygonShape::new_box(Fix64::HALF, Fix64::HALF);
        let big = PolygonShape::new_box(Fix64::from_int(4), Fix64::HALF);
        // Big box below the small one, passed as B
        let xf_a = Transform::new(Vec2Fix::from_ratio(0, 19, 20), Fix64::ZERO);
        let mut m = Manifold::default();
        collide_polygons(&mut m, &small, &xf_a, &big, &at(0, 0));
        assert!(m.point_count > 0);
        let wm = WorldManifold::new(&m, &xf_a, small.radius, &at(0, 0), big.radius);
        assert!(wm.normal.y < Fix64::ZERO);
    }

    #[test]
    fn test_edge_circle_regions() {
        let edge = EdgeShape::new(Vec2Fix::from_int(-2, 0), Vec2Fix::from_int(2, 0));
        let circle = CircleShape::new(Fix64::HALF);
        let mut m = Manifold::default();

        let above = Transform::new(Vec2Fix::from_ratio(0, 2, 5), Fix64::ZERO);
        collide_edge_and_circle(&mut m, &edge, &Transform::IDENTITY, &circle, &above);
        assert_eq!(m.kind, ManifoldType::FaceA);
        assert_eq!(m.local_normal, Vec2Fix::UNIT_Y);

        let below = Transform::new(Vec2Fix::from_ratio(0, -2, 5), Fix64::ZERO);
        collide_edge_and_circle(&mut m, &edge, &Transform::IDENTITY, &circle, &below);
        assert_eq!(m.local_normal, -Vec2Fix::UNIT_Y);

        let past_end = Transform::new(Vec2Fix::from_ratio(22, 0, 10), Fix64::ZERO);
        collide_edge_and_circle(&mut m, &edge, &Transform::IDENTITY, &circle, &past_end);
        assert_eq!(m.kind, ManifoldType::Circles);
        assert_eq!(m.local_point, edge.v2);
    }

    #[test]
    fn test_edge_circle_ghost_vertex_suppresses_vertex_contact() {
        let mut edge = EdgeShape::new(Vec2Fix::from_int(-2, 0), Vec2Fix::from_int(2, 0));
        edge.v3 = Some(Vec2Fix::from_int(6, 0));
        let circle = CircleShape::new(Fix64::HALF);
        let mut m = Manifold::default();
        let past_end = Transform::new(Vec2Fix::from_ratio(22, 2, 10), Fix64::ZERO);
        collide_edge_and_circle(&mut m, &edge, &Transform::IDENTITY, &circle, &past_end);
        assert_eq!(m.point_count, 0);
    }

    #[test]
    fn test_box_on_edge() {
        let edge = EdgeShape::new(Vec2Fix::from_int(-5, 0), Vec2Fix::from_int(5, 0));
        let crate_box = PolygonShape::new_box(Fix64::HALF, Fix64::HALF);
        let xf_b = Transform::new(
            Vec2Fix::new(Fix64::ONE, Fix64::HALF + POLYGON_RADIUS),
            Fix64::ZERO,
        );
        let mut m = Manifold::default();
        collide_edge_and_polygon(&mut m, &edge, &Transform::IDENTITY, &crate_box, &xf_b);
        assert_eq!(m.point_count, 2);
        let wm = WorldManifold::new(&m, &Transform::IDENTITY, edge.radius, &xf_b, crate_box.radius);
        assert!(close(wm.normal.y, Fix64::ONE));
    }
}
