//! Collision Shapes
//!
//! Circles, convex polygons and two-sided edge segments. A shape is pure
//! geometry: it knows its mass properties for a given density, its bounding
//! box under a transform, and how to answer point and ray queries. Material
//! and filtering live on the [`Fixture`](crate::fixture::Fixture) that owns
//! it.

use crate::collision::{Aabb, RayCastInput, RayCastOutput};
use crate::error::PhysicsError;
use crate::math::{Fix64, Transform, Vec2Fix};
use crate::settings::{LINEAR_SLOP, MAX_POLYGON_VERTICES, POLYGON_RADIUS};

// ============================================================================
// MassData
// ============================================================================

/// Mass properties of a shape or a body.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MassData {
    /// Mass in kilograms
    pub mass: Fix64,
    /// Center of mass relative to the shape (or body) origin
    pub center: Vec2Fix,
    /// Rotational inertia about the shape (or body) origin
    pub inertia: Fix64,
}

// ============================================================================
// CircleShape
// ============================================================================

/// Solid circle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CircleShape {
    /// Center in body coordinates
    pub p: Vec2Fix,
    /// Radius
    pub radius: Fix64,
}

impl CircleShape {
    /// Circle of `radius` centered on the body origin.
    #[must_use]
    pub const fn new(radius: Fix64) -> Self {
        Self {
            p: Vec2Fix::ZERO,
            radius,
        }
    }

    /// Circle of `radius` centered at `p` in body coordinates.
    #[must_use]
    pub const fn with_center(p: Vec2Fix, radius: Fix64) -> Self {
        Self { p, radius }
    }

    fn compute_mass(&self, density: Fix64) -> MassData {
        let rr = self.radius * self.radius;
        let mass = density * Fix64::PI * rr;
        MassData {
            mass,
            center: self.p,
            inertia: mass * (rr.half() + self.p.dot(self.p)),
        }
    }

    fn ray_cast(&self, input: &RayCastInput, xf: &Transform) -> Option<RayCastOutput> {
        let position = xf.apply(self.p);
        let s = input.p1 - position;
        let b = s.dot(s) - self.radius * self.radius;

        let r = input.p2 - input.p1;
        let c = s.dot(r);
        let rr = r.dot(r);
        let sigma = c * c - rr * b;

        if sigma.is_negative() || rr.is_zero() {
            return None;
        }

        // Smaller root of the line/circle quadratic
        let a = -(c + sigma.sqrt());
        if !a.is_negative() && a <= input.max_fraction * rr {
            let fraction = a / rr;
            Some(RayCastOutput {
                fraction,
                normal: (s + r * fraction).normalize(),
            })
        } else {
            None
        }
    }
}

// ============================================================================
// PolygonShape
// ============================================================================

/// Convex polygon with counter-clockwise winding and a small skin radius.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PolygonShape {
    /// Vertices (only the first `count` are valid)
    pub vertices: [Vec2Fix; MAX_POLYGON_VERTICES],
    /// Outward edge normals, `normals[i]` belongs to edge `i -> i + 1`
    pub normals: [Vec2Fix; MAX_POLYGON_VERTICES],
    /// Number of vertices
    pub count: usize,
    /// Area centroid
    pub centroid: Vec2Fix,
    /// Skin radius
    pub radius: Fix64,
}

impl PolygonShape {
    /// Axis-aligned box with half-widths `hx`, `hy` centered on the origin.
    #[must_use]
    pub fn new_box(hx: Fix64, hy: Fix64) -> Self {
        let mut poly = Self::empty();
        poly.count = 4;
        poly.vertices[0] = Vec2Fix::new(-hx, -hy);
        poly.vertices[1] = Vec2Fix::new(hx, -hy);
        poly.vertices[2] = Vec2Fix::new(hx, hy);
        poly.vertices[3] = Vec2Fix::new(-hx, hy);
        poly.normals[0] = Vec2Fix::new(Fix64::ZERO, Fix64::NEG_ONE);
        poly.normals[1] = Vec2Fix::UNIT_X;
        poly.normals[2] = Vec2Fix::UNIT_Y;
        poly.normals[3] = Vec2Fix::new(Fix64::NEG_ONE, Fix64::ZERO);
        poly
    }

    /// Box with half-widths `hx`, `hy`, centered at `center` and rotated by `angle`.
    #[must_use]
    pub fn new_oriented_box(hx: Fix64, hy: Fix64, center: Vec2Fix, angle: Fix64) -> Self {
        let mut poly = Self::new_box(hx, hy);
        poly.centroid = center;
        let xf = Transform::new(center, angle);
        for i in 0..poly.count {
            poly.vertices[i] = xf.apply(poly.vertices[i]);
            poly.normals[i] = xf.q.apply(poly.normals[i]);
        }
        poly
    }

    /// Convex hull of `points` (gift wrapping).
    ///
    /// Points closer than half a linear slop are welded. Fails when fewer than
    /// three distinct points remain, when more than
    /// [`MAX_POLYGON_VERTICES`] are given, or when the points are collinear.
    pub fn from_points(points: &[Vec2Fix]) -> Result<Self, PhysicsError> {
        if points.len() > MAX_POLYGON_VERTICES {
            return Err(PhysicsError::CapacityExceeded {
                resource: "polygon vertices",
                limit: MAX_POLYGON_VERTICES,
            });
        }
        if points.len() < 3 {
            return Err(PhysicsError::DegenerateGeometry {
                reason: "polygon needs at least three points",
            });
        }

        // Weld close points
        let weld = LINEAR_SLOP.half();
        let weld_sq = weld * weld;
        let mut ps = [Vec2Fix::ZERO; MAX_POLYGON_VERTICES];
        let mut n = 0;
        for &v in points {
            if !v.is_valid() {
                return Err(PhysicsError::DegenerateGeometry {
                    reason: "polygon vertex is saturated",
                });
            }
            if ps[..n].iter().all(|p| v.distance_squared(*p) >= weld_sq) {
                ps[n] = v;
                n += 1;
            }
        }
        if n < 3 {
            return Err(PhysicsError::DegenerateGeometry {
                reason: "polygon points are welded together",
            });
        }

        // Rightmost point is on the hull (lowest y breaks ties)
        let mut i0 = 0;
        for i in 1..n {
            let (x, x0) = (ps[i].x, ps[i0].x);
            if x > x0 || (x == x0 && ps[i].y < ps[i0].y) {
                i0 = i;
            }
        }

        let mut hull = [0usize; MAX_POLYGON_VERTICES];
        let mut m = 0;
        let mut ih = i0;
        loop {
            if m == MAX_POLYGON_VERTICES {
                return Err(PhysicsError::DegenerateGeometry {
                    reason: "hull construction did not close",
                });
            }
            hull[m] = ih;

            let mut ie = 0;
            for j in 1..n {
                if ie == ih {
                    ie = j;
                    continue;
                }
                let r = ps[ie] - ps[hull[m]];
                let v = ps[j] - ps[hull[m]];
                let c = r.cross(v);
                if c.is_negative() {
                    ie = j;
                }
                // Collinear: keep the farthest point
                if c.is_zero() && v.length_squared() > r.length_squared() {
                    ie = j;
                }
            }

            m += 1;
            ih = ie;
            if ie == i0 {
                break;
            }
        }

        if m < 3 {
            return Err(PhysicsError::DegenerateGeometry {
                reason: "polygon points are collinear",
            });
        }

        let mut poly = Self::empty();
        poly.count = m;
        for i in 0..m {
            poly.vertices[i] = ps[hull[i]];
        }
        for i in 0..m {
            let i2 = if i + 1 < m { i + 1 } else { 0 };
            let edge = poly.vertices[i2] - poly.vertices[i];
            if edge.length_squared() <= Fix64::EPSILON {
                return Err(PhysicsError::DegenerateGeometry {
                    reason: "polygon has a zero-length edge",
                });
            }
            poly.normals[i] = edge.cross_scalar(Fix64::ONE).normalize();
        }
        poly.centroid = compute_centroid(&poly.vertices[..m]);
        Ok(poly)
    }

    fn empty() -> Self {
        Self {
            vertices: [Vec2Fix::ZERO; MAX_POLYGON_VERTICES],
            normals: [Vec2Fix::ZERO; MAX_POLYGON_VERTICES],
            count: 0,
            centroid: Vec2Fix::ZERO,
            radius: POLYGON_RADIUS,
        }
    }

    /// Valid vertices.
    #[inline]
    pub fn vertices(&self) -> &[Vec2Fix] {
        &self.vertices[..self.count]
    }

    /// Valid normals.
    #[inline]
    pub fn normals(&self) -> &[Vec2Fix] {
        &self.normals[..self.count]
    }

    fn compute_mass(&self, density: Fix64) -> MassData {
        // Triangle fan from the first vertex keeps intermediate values small
        let s = self.vertices[0];
        let k_inv3 = Fix64::from_ratio(1, 3);
        let quarter = Fix64::from_ratio(1, 4);

        let mut center = Vec2Fix::ZERO;
        let mut area = Fix64::ZERO;
        let mut inertia = Fix64::ZERO;

        for i in 0..self.count {
            let e1 = self.vertices[i] - s;
            let e2 = if i + 1 < self.count {
                self.vertices[i + 1] - s
            } else {
                self.vertices[0] - s
            };

            let d = e1.cross(e2);
            let triangle_area = d.half();
            area += triangle_area;
            center += (e1 + e2) * (triangle_area * k_inv3);

            let int_x2 = e1.x * e1.x + e2.x * e1.x + e2.x * e2.x;
            let int_y2 = e1.y * e1.y + e2.y * e1.y + e2.y * e2.y;
            inertia += (quarter * k_inv3 * d) * (int_x2 + int_y2);
        }

        let mass = density * area;
        let center = center / area;
        let world_center = center + s;
        // Shift from the fan origin to the shape origin
        let inertia = density * inertia + mass * (world_center.dot(world_center) - center.dot(center));
        MassData {
            mass,
            center: world_center,
            inertia,
        }
    }

    fn ray_cast(&self, input: &RayCastInput, xf: &Transform) -> Option<RayCastOutput> {
        let p1 = xf.q.apply_inv(input.p1 - xf.p);
        let p2 = xf.q.apply_inv(input.p2 - xf.p);
        let d = p2 - p1;

        let mut lower = Fix64::ZERO;
        let mut upper = input.max_fraction;
        let mut index = None;

        for i in 0..self.count {
            // p = p1 + a * d; dot(normal, p - v) = 0
            let numerator = self.normals[i].dot(self.vertices[i] - p1);
            let denominator = self.normals[i].dot(d);

            if denominator.is_zero() {
                if numerator.is_negative() {
                    return None;
                }
            } else if denominator.is_negative() && numerator < lower * denominator {
                // Entering this half-space
                lower = numerator / denominator;
                index = Some(i);
            } else if denominator.is_positive() && numerator < upper * denominator {
                // Leaving this half-space
                upper = numerator / denominator;
            }

            if upper < lower {
                return None;
            }
        }

        index.map(|i| RayCastOutput {
            fraction: lower,
            normal: xf.q.apply(self.normals[i]),
        })
    }
}

fn compute_centroid(vs: &[Vec2Fix]) -> Vec2Fix {
    let s = vs[0];
    let inv3 = Fix64::from_ratio(1, 3);
    let mut c = Vec2Fix::ZERO;
    let mut area = Fix64::ZERO;
    for i in 0..vs.len() {
        let e1 = vs[i] - s;
        let e2 = if i + 1 < vs.len() { vs[i + 1] - s } else { vs[0] - s };
        let a = e1.cross(e2).half();
        area += a;
        c += (e1 + e2) * (a * inv3);
    }
    c / area + s
}

// ============================================================================
// EdgeShape
// ============================================================================

/// Two-sided line segment. Optional ghost vertices smooth collisions along chains.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EdgeShape {
    /// First vertex
    pub v1: Vec2Fix,
    /// Second vertex
    pub v2: Vec2Fix,
    /// Ghost vertex before `v1`
    pub v0: Option<Vec2Fix>,
    /// Ghost vertex after `v2`
    pub v3: Option<Vec2Fix>,
    /// Skin radius
    pub radius: Fix64,
}

impl EdgeShape {
    /// Segment from `v1` to `v2`.
    #[must_use]
    pub const fn new(v1: Vec2Fix, v2: Vec2Fix) -> Self {
        Self {
            v1,
            v2,
            v0: None,
            v3: None,
            radius: POLYGON_RADIUS,
        }
    }

    fn ray_cast(&self, input: &RayCastInput, xf: &Transform) -> Option<RayCastOutput> {
        let p1 = xf.q.apply_inv(input.p1 - xf.p);
        let p2 = xf.q.apply_inv(input.p2 - xf.p);
        let d = p2 - p1;

        let e = self.v2 - self.v1;
        let normal = Vec2Fix::new(e.y, -e.x).normalize();

        // q = p1 + t * d; dot(normal, q - v1) = 0
        let numerator = normal.dot(self.v1 - p1);
        let denominator = normal.dot(d);
        if denominator.is_zero() {
            return None;
        }

        let t = numerator / denominator;
        if t.is_negative() || input.max_fraction < t {
            return None;
        }

        let q = p1 + d * t;
        let rr = e.dot(e);
        if rr.is_zero() {
            return None;
        }
        let s = (q - self.v1).dot(e) / rr;
        if s.is_negative() || Fix64::ONE < s {
            return None;
        }

        let n = xf.q.apply(normal);
        Some(RayCastOutput {
            fraction: t,
            normal: if numerator.is_positive() { -n } else { n },
        })
    }
}

// ============================================================================
// Shape
// ============================================================================

/// Discriminant used to order shape pairs in the narrow phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ShapeType {
    /// [`CircleShape`]
    Circle,
    /// [`EdgeShape`]
    Edge,
    /// [`PolygonShape`]
    Polygon,
}

/// Any collision shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Shape {
    /// Solid circle
    Circle(CircleShape),
    /// Two-sided segment
    Edge(EdgeShape),
    /// Convex polygon
    Polygon(PolygonShape),
}

impl Shape {
    /// Discriminant
    pub fn shape_type(&self) -> ShapeType {
        match self {
            Self::Circle(_) => ShapeType::Circle,
            Self::Edge(_) => ShapeType::Edge,
            Self::Polygon(_) => ShapeType::Polygon,
        }
    }

    /// Skin (or circle) radius
    pub fn radius(&self) -> Fix64 {
        match self {
            Self::Circle(c) => c.radius,
            Self::Edge(e) => e.radius,
            Self::Polygon(p) => p.radius,
        }
    }

    /// Number of broad-phase children; always one for these primitives.
    pub fn child_count(&self) -> usize {
        1
    }

    /// Mass properties at `density`. Edges are massless.
    pub fn compute_mass(&self, density: Fix64) -> MassData {
        match self {
            Self::Circle(c) => c.compute_mass(density),
            Self::Polygon(p) => p.compute_mass(density),
            Self::Edge(e) => MassData {
                mass: Fix64::ZERO,
                center: (e.v1 + e.v2).scale(Fix64::HALF),
                inertia: Fix64::ZERO,
            },
        }
    }

    /// Bounding box of child `_child` under `xf`, including the skin radius.
    pub fn compute_aabb(&self, xf: &Transform, _child: usize) -> Aabb {
        match self {
            Self::Circle(c) => {
                let p = xf.apply(c.p);
                Aabb::new(p, p).expanded(c.radius)
            }
            Self::Edge(e) => {
                let v1 = xf.apply(e.v1);
                let v2 = xf.apply(e.v2);
                Aabb::new(v1.min(v2), v1.max(v2)).expanded(e.radius)
            }
            Self::Polygon(p) => {
                let first = xf.apply(p.vertices[0]);
                let (lower, upper) = p.vertices()[1..]
                    .iter()
                    .fold((first, first), |(lo, hi), v| {
                        let w = xf.apply(*v);
                        (lo.min(w), hi.max(w))
                    });
                Aabb::new(lower, upper).expanded(p.radius)
            }
        }
    }

    /// `true` if the world point lies inside the shape. Edges contain nothing.
    pub fn test_point(&self, xf: &Transform, p: Vec2Fix) -> bool {
        match self {
            Self::Circle(c) => {
                let center = xf.apply(c.p);
                (p - center).length_squared() <= c.radius * c.radius
            }
            Self::Polygon(poly) => {
                let local = xf.apply_inv(p);
                poly.vertices()
                    .iter()
                    .zip(poly.normals())
                    .all(|(v, n)| !n.dot(local - *v).is_positive())
            }
            Self::Edge(_) => false,
        }
    }

    /// Ray cast against child `_child` under `xf`.
    pub fn ray_cast(
        &self,
        input: &RayCastInput,
        xf: &Transform,
        _child: usize,
    ) -> Option<RayCastOutput> {
        match self {
            Self::Circle(c) => c.ray_cast(input, xf),
            Self::Edge(e) => e.ray_cast(input, xf),
            Self::Polygon(p) => p.ray_cast(input, xf),
        }
    }
}

impl From<CircleShape> for Shape {
    fn from(c: CircleShape) -> Self {
        Self::Circle(c)
    }
}

impl From<PolygonShape> for Shape {
    fn from(p: PolygonShape) -> Self {
        Self::Polygon(p)
    }
}

impl From<EdgeShape> for Shape {
    fn from(e: EdgeShape) -> Self {
        Self::Edge(e)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn near(a: Fix64, b: Fix64, tol: Fix64) -> bool {
        (a - b).abs() <= tol
    }

    #[test]
    fn test_circle_mass() {
        let c = CircleShape::new(Fix64::ONE);
        let md = Shape::Circle(c).compute_mass(Fix64::ONE);
        assert!(near(md.mass, Fix64::PI, Fix64::from_raw(16)));
        assert_eq!(md.center, Vec2Fix::ZERO);
        assert!(near(md.inertia, Fix64::PI.half(), Fix64::from_raw(16)));
    }

    #[test]
    fn test_box_mass() {
        let b = Shape::Polygon(PolygonShape::new_box(Fix64::ONE, Fix64::HALF));
        let md = b.compute_mass(Fix64::from_int(2));
        // 2 x 1 box at density 2
        assert!(near(md.mass, Fix64::from_int(4), Fix64::from_raw(64)));
        assert!(md.center.length() < Fix64::from_raw(64));
        // I = m (w^2 + h^2) / 12 = 4 * 5 / 12
        assert!(near(md.inertia, Fix64::from_ratio(5, 3), Fix64::from_ratio(1, 10_000)));
    }

    #[test]
    fn test_offset_box_mass_center() {
        let b = PolygonShape::new_oriented_box(
            Fix64::ONE,
            Fix64::ONE,
            Vec2Fix::from_int(3, 0),
            Fix64::ZERO,
        );
        let md = Shape::Polygon(b).compute_mass(Fix64::ONE);
        assert!(near(md.center.x, Fix64::from_int(3), Fix64::from_ratio(1, 100_000)));
        assert_eq!(b.centroid, Vec2Fix::from_int(3, 0));
    }

    #[test]
    fn test_hull_from_points() {
        let pts = [
            Vec2Fix::from_int(0, 0),
            Vec2Fix::from_int(2, 0),
            Vec2Fix::from_int(1, 1), // interior
            Vec2Fix::from_int(2, 2),
            Vec2Fix::from_int(0, 2),
        ];
        let poly = PolygonShape::from_points(&pts).unwrap();
        assert_eq!(poly.count, 4);
        // Counter-clockwise: all cross products positive
        for i in 0..poly.count {
            let a = poly.vertices[i];
            let b = poly.vertices[(i + 1) % poly.count];
            let c = poly.vertices[(i + 2) % poly.count];
            assert!((b - a).cross(c - b).is_positive());
        }
        let tol = Fix64::from_ratio(1, 100_000);
        assert!(near(poly.centroid.x, Fix64::ONE, tol));
        assert!(near(poly.centroid.y, Fix64::ONE, tol));
    }

    #[test]
    fn test_hull_rejects_degenerate() {
        let collinear = [
            Vec2Fix::from_int(0, 0),
            Vec2Fix::from_int(1, 0),
            Vec2Fix::from_int(2, 0),
        ];
        assert!(matches!(
            PolygonShape::from_points(&collinear),
            Err(PhysicsError::DegenerateGeometry { .. })
        ));
        let welded = [Vec2Fix::ZERO, Vec2Fix::ZERO, Vec2Fix::from_int(1, 0)];
        assert!(PolygonShape::from_points(&welded).is_err());
        let too_many = [Vec2Fix::ZERO; MAX_POLYGON_VERTICES + 1];
        assert!(matches!(
            PolygonShape::from_points(&too_many),
            Err(PhysicsError::CapacityExceeded { .. })
        ));
    }

    #[test]
    fn test_point_queries() {
        let xf = Transform::new(Vec2Fix::from_int(5, 0), Fix64::ZERO);
        let square = Shape::Polygon(PolygonShape::new_box(Fix64::ONE, Fix64::ONE));
        assert!(square.test_point(&xf, Vec2Fix::from_ratio(11, 1, 2)));
        assert!(!square.test_point(&xf, Vec2Fix::from_int(7, 0)));
        let circle = Shape::Circle(CircleShape::new(Fix64::ONE));
        assert!(circle.test_point(&xf, Vec2Fix::from_ratio(9, 0, 2)));
        let edge = Shape::Edge(EdgeShape::new(Vec2Fix::ZERO, Vec2Fix::UNIT_X));
        assert!(!edge.test_point(&xf, Vec2Fix::from_int(5, 0)));
    }

    #[test]
    fn test_ray_casts() {
        let input = RayCastInput {
            p1: Vec2Fix::from_int(-5, 0),
            p2: Vec2Fix::from_int(5, 0),
            max_fraction: Fix64::ONE,
        };
        let tol = Fix64::from_ratio(1, 10_000);

        let circle = Shape::Circle(CircleShape::new(Fix64::ONE));
        let hit = circle.ray_cast(&input, &Transform::IDENTITY, 0).unwrap();
        assert!(near(hit.fraction, Fix64::from_ratio(4, 10), tol));
        assert!(near(hit.normal.x, Fix64::NEG_ONE, tol));

        let square = Shape::Polygon(PolygonShape::new_box(Fix64::ONE, Fix64::ONE));
        let hit = square.ray_cast(&input, &Transform::IDENTITY, 0).unwrap();
        assert!(near(hit.fraction, Fix64::from_ratio(4, 10), tol));
        assert_eq!(hit.normal, Vec2Fix::new(Fix64::NEG_ONE, Fix64::ZERO));

        let edge = Shape::Edge(EdgeShape::new(Vec2Fix::from_int(0, -1), Vec2Fix::from_int(0, 1)));
        let hit = edge.ray_cast(&input, &Transform::IDENTITY, 0).unwrap();
        assert!(near(hit.fraction, Fix64::HALF, tol));
        assert!(near(hit.normal.x, Fix64::NEG_ONE, tol));

        let short = RayCastInput {
            max_fraction: Fix64::from_ratio(1, 10),
            ..input
        };
        assert!(circle.ray_cast(&short, &Transform::IDENTITY, 0).is_none());
    }

    #[test]
    fn test_aabb() {
        let xf = Transform::new(Vec2Fix::from_int(1, 2), Fix64::ZERO);
        let circle = Shape::Circle(CircleShape::new(Fix64::ONE));
        let aabb = circle.compute_aabb(&xf, 0);
        assert_eq!(aabb.lower, Vec2Fix::from_int(0, 1));
        assert_eq!(aabb.upper, Vec2Fix::from_int(2, 3));
    }

    proptest! {
        #[test]
        fn prop_box_mass_scales_with_density(d in 1i64..100) {
            let b = Shape::Polygon(PolygonShape::new_box(Fix64::ONE, Fix64::ONE));
            let m1 = b.compute_mass(Fix64::ONE).mass;
            let md = b.compute_mass(Fix64::from_int(d)).mass;
            prop_assert!((md - m1 * Fix64::from_int(d)).abs() < Fix64::from_ratio(1, 1000));
        }
    }
}
