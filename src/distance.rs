//! GJK Distance
//!
//! Closest points between two convex proxies using the Gilbert-Johnson-Keerthi
//! algorithm with barycentric simplex solving. A [`SimplexCache`] carries the
//! last simplex between calls so that time-of-impact iterations warm start.

use crate::math::{Fix64, Transform, Vec2Fix};
use crate::settings::{MAX_DISTANCE_ITERATIONS, MAX_POLYGON_VERTICES};
use crate::shape::Shape;

// ============================================================================
// DistanceProxy
// ============================================================================

/// Convex vertex cloud plus radius, the GJK view of a shape child.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DistanceProxy {
    vertices: [Vec2Fix; MAX_POLYGON_VERTICES],
    count: usize,
    /// Skin (or circle) radius
    pub radius: Fix64,
}

impl DistanceProxy {
    /// Proxy for child `_index` of `shape`.
    pub fn new(shape: &Shape, _index: usize) -> Self {
        let mut vertices = [Vec2Fix::ZERO; MAX_POLYGON_VERTICES];
        match shape {
            Shape::Circle(c) => {
                vertices[0] = c.p;
                Self {
                    vertices,
                    count: 1,
                    radius: c.radius,
                }
            }
            Shape::Edge(e) => {
                vertices[0] = e.v1;
                vertices[1] = e.v2;
                Self {
                    vertices,
                    count: 2,
                    radius: e.radius,
                }
            }
            Shape::Polygon(p) => Self {
                vertices: p.vertices,
                count: p.count,
                radius: p.radius,
            },
        }
    }

    /// Number of vertices.
    #[inline]
    pub fn count(&self) -> usize {
        self.count
    }

    /// Vertex by index.
    #[inline]
    pub fn vertex(&self, index: usize) -> Vec2Fix {
        self.vertices[index]
    }

    /// Index of the vertex farthest along `d`.
    pub fn support(&self, d: Vec2Fix) -> usize {
        let mut best = 0;
        let mut best_value = self.vertices[0].dot(d);
        for i in 1..self.count {
            let value = self.vertices[i].dot(d);
            if value > best_value {
                best = i;
                best_value = value;
            }
        }
        best
    }
}

// ============================================================================
// Simplex
// ============================================================================

/// Simplex carried between GJK calls.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SimplexCache {
    /// Length or area of the cached simplex
    pub metric: Fix64,
    /// Number of cached vertices
    pub count: usize,
    /// Vertex indices on proxy A
    pub index_a: [u8; 3],
    /// Vertex indices on proxy B
    pub index_b: [u8; 3],
}

/// Input of [`distance`].
#[derive(Clone, Copy, Debug)]
pub struct DistanceInput {
    pub proxy_a: DistanceProxy,
    pub proxy_b: DistanceProxy,
    pub transform_a: Transform,
    pub transform_b: Transform,
    /// Account for the proxies' radii in the result
    pub use_radii: bool,
}

/// Output of [`distance`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DistanceOutput {
    /// Closest point on A
    pub point_a: Vec2Fix,
    /// Closest point on B
    pub point_b: Vec2Fix,
    /// Distance between the points
    pub distance: Fix64,
    /// GJK iterations used
    pub iterations: usize,
}

#[derive(Clone, Copy, Debug, Default)]
struct SimplexVertex {
    w_a: Vec2Fix,
    w_b: Vec2Fix,
    w: Vec2Fix,
    a: Fix64,
    index_a: usize,
    index_b: usize,
}

#[derive(Clone, Copy, Debug, Default)]
struct Simplex {
    v: [SimplexVertex; 3],
    count: usize,
}

impl Simplex {
    fn vertex(proxy_a: &DistanceProxy, xf_a: &Transform, ia: usize, proxy_b: &DistanceProxy, xf_b: &Transform, ib: usize) -> SimplexVertex {
        let w_a = xf_a.apply(proxy_a.vertex(ia));
        let w_b = xf_b.apply(proxy_b.vertex(ib));
        SimplexVertex {
            w_a,
            w_b,
            w: w_b - w_a,
            a: Fix64::ZERO,
            index_a: ia,
            index_b: ib,
        }
    }

    fn read_cache(
        cache: &SimplexCache,
        proxy_a: &DistanceProxy,
        xf_a: &Transform,
        proxy_b: &DistanceProxy,
        xf_b: &Transform,
    ) -> Self {
        let mut s = Self {
            count: cache.count,
            ..Self::default()
        };
        for i in 0..s.count {
            s.v[i] = Self::vertex(
                proxy_a,
                xf_a,
                cache.index_a[i] as usize,
                proxy_b,
                xf_b,
                cache.index_b[i] as usize,
            );
        }

        // Flush the cache if the simplex changed shape too much
        if s.count > 1 {
            let metric1 = cache.metric;
            let metric2 = s.metric();
            if metric2 < metric1.half() || metric1.double() < metric2 || metric2 <= Fix64::EPSILON {
                s.count = 0;
            }
        }

        if s.count == 0 {
            s.v[0] = Self::vertex(proxy_a, xf_a, 0, proxy_b, xf_b, 0);
            s.v[0].a = Fix64::ONE;
            s.count = 1;
        }
        s
    }

    fn write_cache(&self, cache: &mut SimplexCache) {
        cache.metric = self.metric();
        cache.count = self.count;
        for i in 0..self.count {
            cache.index_a[i] = self.v[i].index_a as u8;
            cache.index_b[i] = self.v[i].index_b as u8;
        }
    }

    fn search_direction(&self) -> Vec2Fix {
        match self.count {
            1 => -self.v[0].w,
            2 => {
                let e12 = self.v[1].w - self.v[0].w;
                let sgn = e12.cross(-self.v[0].w);
                if sgn.is_positive() {
                    // Origin is left of e12
                    Vec2Fix::scalar_cross(Fix64::ONE, e12)
                } else {
                    e12.cross_scalar(Fix64::ONE)
                }
            }
            _ => Vec2Fix::ZERO,
        }
    }

    fn witness_points(&self) -> (Vec2Fix, Vec2Fix) {
        let v = &self.v;
        match self.count {
            1 => (v[0].w_a, v[0].w_b),
            2 => (
                v[0].w_a * v[0].a + v[1].w_a * v[1].a,
                v[0].w_b * v[0].a + v[1].w_b * v[1].a,
            ),
            3 => {
                let p = v[0].w_a * v[0].a + v[1].w_a * v[1].a + v[2].w_a * v[2].a;
                (p, p)
            }
            _ => (Vec2Fix::ZERO, Vec2Fix::ZERO),
        }
    }

    fn metric(&self) -> Fix64 {
        match self.count {
            2 => self.v[0].w.distance_to(self.v[1].w),
            3 => (self.v[1].w - self.v[0].w).cross(self.v[2].w - self.v[0].w),
            _ => Fix64::ZERO,
        }
    }

    // Closest point on segment w1-w2 to the origin, in barycentric form
    fn solve2(&mut self) {
        let w1 = self.v[0].w;
        let w2 = self.v[1].w;
        let e12 = w2 - w1;

        // w1 region
        let d12_2 = -w1.dot(e12);
        if !d12_2.is_positive() {
            self.v[0].a = Fix64::ONE;
            self.count = 1;
            return;
        }

        // w2 region
        let d12_1 = w2.dot(e12);
        if !d12_1.is_positive() {
            self.v[1].a = Fix64::ONE;
            self.count = 1;
            self.v[0] = self.v[1];
            return;
        }

        let inv = Fix64::ONE / (d12_1 + d12_2);
        self.v[0].a = d12_1 * inv;
        self.v[1].a = d12_2 * inv;
        self.count = 2;
    }

    // Voronoi regions of the triangle w1-w2-w3
    fn solve3(&mut self) {
        let w1 = self.v[0].w;
        let w2 = self.v[1].w;
        let w3 = self.v[2].w;

        let e12 = w2 - w1;
        let d12_1 = w2.dot(e12);
        let d12_2 = -w1.dot(e12);

        let e13 = w3 - w1;
        let d13_1 = w3.dot(e13);
        let d13_2 = -w1.dot(e13);

        let e23 = w3 - w2;
        let d23_1 = w3.dot(e23);
        let d23_2 = -w2.dot(e23);

        let n123 = e12.cross(e13);
        let d123_1 = n123 * w2.cross(w3);
        let d123_2 = n123 * w3.cross(w1);
        let d123_3 = n123 * w1.cross(w2);

        let pos = |x: Fix64| x.is_positive();

        if !pos(d12_2) && !pos(d13_2) {
            self.v[0].a = Fix64::ONE;
            self.count = 1;
            return;
        }

        if pos(d12_1) && pos(d12_2) && !pos(d123_3) {
            let inv = Fix64::ONE / (d12_1 + d12_2);
            self.v[0].a = d12_1 * inv;
            self.v[1].a = d12_2 * inv;
            self.count = 2;
            return;
        }

        if pos(d13_1) && pos(d13_2) && !pos(d123_2) {
            let inv = Fix64::ONE / (d13_1 + d13_2);
            self.v[0].a = d13_1 * inv;
            self.v[2].a = d13_2 * inv;
            self.count = 2;
            self.v[1] = self.v[2];
            return;
        }

        if !pos(d12_1) && !pos(d23_2) {
            self.v[1].a = Fix64::ONE;
            self.count = 1;
            self.v[0] = self.v[1];
            return;
        }

        if !pos(d13_1) && !pos(d23_1) {
            self.v[2].a = Fix64::ONE;
            self.count = 1;
            self.v[0] = self.v[2];
            return;
        }

        if pos(d23_1) && pos(d23_2) && !pos(d123_1) {
            let inv = Fix64::ONE / (d23_1 + d23_2);
            self.v[1].a = d23_1 * inv;
            self.v[2].a = d23_2 * inv;
            self.count = 2;
            self.v[0] = self.v[2];
            return;
        }

        // Origin inside the triangle
        let inv = Fix64::ONE / (d123_1 + d123_2 + d123_3);
        self.v[0].a = d123_1 * inv;
        self.v[1].a = d123_2 * inv;
        self.v[2].a = d123_3 * inv;
        self.count = 3;
    }
}

// ============================================================================
// distance
// ============================================================================

/// Closest points between two proxies. Updates `cache` for the next call.
pub fn distance(cache: &mut SimplexCache, input: &DistanceInput) -> DistanceOutput {
    let proxy_a = &input.proxy_a;
    let proxy_b = &input.proxy_b;
    let xf_a = &input.transform_a;
    let xf_b = &input.transform_b;

    let mut simplex = Simplex::read_cache(cache, proxy_a, xf_a, proxy_b, xf_b);

    let mut save_a = [0usize; 3];
    let mut save_b = [0usize; 3];

    let mut iter = 0;
    while iter < MAX_DISTANCE_ITERATIONS {
        let save_count = simplex.count;
        for i in 0..save_count {
            save_a[i] = simplex.v[i].index_a;
            save_b[i] = simplex.v[i].index_b;
        }

        match simplex.count {
            2 => simplex.solve2(),
            3 => simplex.solve3(),
            _ => {}
        }

        // Origin is inside the triangle: overlap
        if simplex.count == 3 {
            break;
        }

        let d = simplex.search_direction();
        if d.length_squared() <= Fix64::EPSILON {
            // Origin is (numerically) on the simplex
            break;
        }

        let ia = proxy_a.support(xf_a.q.apply_inv(-d));
        let ib = proxy_b.support(xf_b.q.apply_inv(d));
        simplex.v[simplex.count] = Simplex::vertex(proxy_a, xf_a, ia, proxy_b, xf_b, ib);

        iter += 1;

        // A repeated support point means no progress
        let duplicate = (0..save_count).any(|i| save_a[i] == ia && save_b[i] == ib);
        if duplicate {
            break;
        }

        simplex.count += 1;
    }

    let (mut point_a, mut point_b) = simplex.witness_points();
    let mut dist = point_a.distance_to(point_b);
    simplex.write_cache(cache);

    if input.use_radii {
        let r_a = proxy_a.radius;
        let r_b = proxy_b.radius;
        if dist > r_a + r_b && dist > Fix64::EPSILON {
            // Shapes are still separated: move the witness points to the surfaces
            dist -= r_a + r_b;
            let normal = (point_b - point_a).normalize();
            point_a += normal * r_a;
            point_b -= normal * r_b;
        } else {
            let p = (point_a + point_b).scale(Fix64::HALF);
            point_a = p;
            point_b = p;
            dist = Fix64::ZERO;
        }
    }

    DistanceOutput {
        point_a,
        point_b,
        distance: dist,
        iterations: iter,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::{CircleShape, EdgeShape, PolygonShape};

    fn input(a: &Shape, xa: Transform, b: &Shape, xb: Transform, use_radii: bool) -> DistanceInput {
        DistanceInput {
            proxy_a: DistanceProxy::new(a, 0),
            proxy_b: DistanceProxy::new(b, 0),
            transform_a: xa,
            transform_b: xb,
            use_radii,
        }
    }

    #[test]
    fn test_box_box_distance() {
        let a = Shape::Polygon(PolygonShape::new_box(Fix64::ONE, Fix64::ONE));
        let xb = Transform::new(Vec2Fix::from_int(5, 0), Fix64::ZERO);
        let mut cache = SimplexCache::default();
        let out = distance(&mut cache, &input(&a, Transform::IDENTITY, &a, xb, false));
        assert_eq!(out.distance, Fix64::from_int(3));
        assert_eq!(out.point_a.x, Fix64::ONE);
        assert_eq!(out.point_b.x, Fix64::from_int(4));
    }

    #[test]
    fn test_circle_radii() {
        let c = Shape::Circle(CircleShape::new(Fix64::ONE));
        let xb = Transform::new(Vec2Fix::from_int(0, 5), Fix64::ZERO);
        let mut cache = SimplexCache::default();
        let out = distance(&mut cache, &input(&c, Transform::IDENTITY, &c, xb, true));
        assert_eq!(out.distance, Fix64::from_int(3));
        assert_eq!(out.point_a, Vec2Fix::from_int(0, 1));
        assert_eq!(out.point_b, Vec2Fix::from_int(0, 4));
    }

    #[test]
    fn test_overlap_reports_zero() {
        let a = Shape::Polygon(PolygonShape::new_box(Fix64::ONE, Fix64::ONE));
        let xb = Transform::new(Vec2Fix::from_ratio(1, 1, 2), Fix64::ZERO);
        let mut cache = SimplexCache::default();
        let out = distance(&mut cache, &input(&a, Transform::IDENTITY, &a, xb, true));
        assert_eq!(out.distance, Fix64::ZERO);
    }

    #[test]
    fn test_edge_circle_distance_and_cache() {
        let e = Shape::Edge(EdgeShape::new(Vec2Fix::from_int(-2, 0), Vec2Fix::from_int(2, 0)));
        let c = Shape::Circle(CircleShape::new(Fix64::HALF));
        let xb = Transform::new(Vec2Fix::from_int(1, 3), Fix64::ZERO);
        let mut cache = SimplexCache::default();
        let out = distance(&mut cache, &input(&e, Transform::IDENTITY, &c, xb, false));
        assert_eq!(out.distance, Fix64::from_int(3));
        assert_eq!(cache.count, 2);

        // Warm-started call converges immediately to the same answer
        let again = distance(&mut cache, &input(&e, Transform::IDENTITY, &c, xb, false));
        assert_eq!(again.distance, out.distance);
        assert!(again.iterations <= out.iterations);
    }

    #[test]
    fn test_support() {
        let b = Shape::Polygon(PolygonShape::new_box(Fix64::ONE, Fix64::ONE));
        let proxy = DistanceProxy::new(&b, 0);
        let i = proxy.support(Vec2Fix::from_int(1, 1));
        assert_eq!(proxy.vertex(i), Vec2Fix::from_int(1, 1));
        assert_eq!(proxy.count(), 4);
    }
}
