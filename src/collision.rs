//! Collision Primitives
//!
//! Axis-aligned boxes, ray-cast records and contact manifolds shared by the
//! broad phase, the narrow phase and the contact solver.
//!
//! A [`Manifold`] is stored in the local frame of one of the two shapes so it
//! stays valid while the bodies move within a step; [`WorldManifold`]
//! re-expresses it in world space on demand.

use crate::distance::{distance, DistanceInput, DistanceProxy, SimplexCache};
use crate::math::{Fix64, Transform, Vec2Fix};
use crate::settings::MAX_MANIFOLD_POINTS;
use crate::shape::Shape;

// ============================================================================
// Aabb
// ============================================================================

/// Axis-aligned bounding box.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Aabb {
    /// Lower corner
    pub lower: Vec2Fix,
    /// Upper corner
    pub upper: Vec2Fix,
}

impl Aabb {
    /// Create from corners.
    #[inline]
    #[must_use]
    pub const fn new(lower: Vec2Fix, upper: Vec2Fix) -> Self {
        Self { lower, upper }
    }

    /// Lower corner does not exceed upper corner.
    pub fn is_valid(&self) -> bool {
        let d = self.upper - self.lower;
        !d.x.is_negative() && !d.y.is_negative() && self.lower.is_valid() && self.upper.is_valid()
    }

    /// Center point.
    #[inline]
    pub fn center(&self) -> Vec2Fix {
        (self.lower + self.upper).scale(Fix64::HALF)
    }

    /// Half extents.
    #[inline]
    pub fn extents(&self) -> Vec2Fix {
        (self.upper - self.lower).scale(Fix64::HALF)
    }

    /// Perimeter, the cost metric of the dynamic tree.
    #[inline]
    pub fn perimeter(&self) -> Fix64 {
        let w = self.upper.x - self.lower.x;
        let h = self.upper.y - self.lower.y;
        (w + h).double()
    }

    /// Smallest box containing both.
    #[inline]
    #[must_use]
    pub fn combine(&self, other: &Self) -> Self {
        Self::new(self.lower.min(other.lower), self.upper.max(other.upper))
    }

    /// Box grown by `margin` on every side.
    #[inline]
    #[must_use]
    pub fn expanded(&self, margin: Fix64) -> Self {
        let r = Vec2Fix::new(margin, margin);
        Self::new(self.lower - r, self.upper + r)
    }

    /// `true` if `other` lies fully inside.
    pub fn contains(&self, other: &Self) -> bool {
        self.lower.x <= other.lower.x
            && self.lower.y <= other.lower.y
            && other.upper.x <= self.upper.x
            && other.upper.y <= self.upper.y
    }

    /// `true` if the boxes touch or overlap.
    #[inline]
    pub fn overlaps(&self, other: &Self) -> bool {
        !(other.lower.x > self.upper.x
            || other.lower.y > self.upper.y
            || self.lower.x > other.upper.x
            || self.lower.y > other.upper.y)
    }

    /// Slab ray cast.
    pub fn ray_cast(&self, input: &RayCastInput) -> Option<RayCastOutput> {
        let mut tmin = Fix64::MIN;
        let mut tmax = Fix64::MAX;

        let p = input.p1;
        let d = input.p2 - input.p1;
        let abs_d = d.abs();
        let mut normal = Vec2Fix::ZERO;

        for axis in 0..2 {
            let (pi, di, adi, lo, hi) = if axis == 0 {
                (p.x, d.x, abs_d.x, self.lower.x, self.upper.x)
            } else {
                (p.y, d.y, abs_d.y, self.lower.y, self.upper.y)
            };
            if adi.is_zero() {
                // Parallel to this slab
                if pi < lo || hi < pi {
                    return None;
                }
            } else {
                let inv_d = Fix64::ONE / di;
                let mut t1 = (lo - pi) * inv_d;
                let mut t2 = (hi - pi) * inv_d;
                let mut s = Fix64::NEG_ONE;
                if t1 > t2 {
                    core::mem::swap(&mut t1, &mut t2);
                    s = Fix64::ONE;
                }
                if t1 > tmin {
                    normal = if axis == 0 {
                        Vec2Fix::new(s, Fix64::ZERO)
                    } else {
                        Vec2Fix::new(Fix64::ZERO, s)
                    };
                    tmin = t1;
                }
                tmax = tmax.min(t2);
                if tmin > tmax {
                    return None;
                }
            }
        }

        // Starts inside or hits beyond the allowed fraction
        if tmin.is_negative() || input.max_fraction < tmin {
            return None;
        }
        Some(RayCastOutput {
            normal,
            fraction: tmin,
        })
    }
}

// ============================================================================
// Ray casting
// ============================================================================

/// Ray segment from `p1` to `p1 + max_fraction * (p2 - p1)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RayCastInput {
    /// Start point
    pub p1: Vec2Fix,
    /// End point at fraction one
    pub p2: Vec2Fix,
    /// Clip fraction along `p2 - p1`
    pub max_fraction: Fix64,
}

/// Hit record of a ray cast.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RayCastOutput {
    /// Surface normal at the hit point
    pub normal: Vec2Fix,
    /// Hit fraction along `p2 - p1`
    pub fraction: Fix64,
}

// ============================================================================
// Manifold
// ============================================================================

/// Which geometric features produced a contact point.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum FeatureType {
    /// A vertex
    #[default]
    Vertex,
    /// A face (edge in 2D)
    Face,
}

/// Feature pair identifying a contact point across steps (for warm starting).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ContactFeature {
    /// Feature index on shape A
    pub index_a: u8,
    /// Feature index on shape B
    pub index_b: u8,
    /// Feature kind on shape A
    pub type_a: FeatureType,
    /// Feature kind on shape B
    pub type_b: FeatureType,
}

impl ContactFeature {
    /// Packed comparison key.
    #[inline]
    pub fn key(&self) -> u32 {
        u32::from(self.index_a)
            | u32::from(self.index_b) << 8
            | (self.type_a as u32) << 16
            | (self.type_b as u32) << 24
    }

    /// Same feature seen from the other shape.
    #[inline]
    #[must_use]
    pub fn swapped(&self) -> Self {
        Self {
            index_a: self.index_b,
            index_b: self.index_a,
            type_a: self.type_b,
            type_b: self.type_a,
        }
    }
}

/// One contact point of a manifold.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ManifoldPoint {
    /// Meaning depends on the manifold type (see [`ManifoldType`])
    pub local_point: Vec2Fix,
    /// Accumulated normal impulse
    pub normal_impulse: Fix64,
    /// Accumulated friction impulse
    pub tangent_impulse: Fix64,
    /// Feature pair for matching across steps
    pub id: ContactFeature,
}

/// How to interpret the local data of a [`Manifold`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ManifoldType {
    /// `local_point` is circle A's center, point is circle B's center
    #[default]
    Circles,
    /// Reference face on A; points are clip points on B
    FaceA,
    /// Reference face on B; points are clip points on A
    FaceB,
}

/// Contact manifold in shape-local coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Manifold {
    /// Contact points
    pub points: [ManifoldPoint; MAX_MANIFOLD_POINTS],
    /// Reference face normal (unused for circles)
    pub local_normal: Vec2Fix,
    /// Reference point (see [`ManifoldType`])
    pub local_point: Vec2Fix,
    /// Interpretation of the local data
    pub kind: ManifoldType,
    /// Number of valid points
    pub point_count: usize,
}

impl Manifold {
    /// Valid points.
    #[inline]
    pub fn points(&self) -> &[ManifoldPoint] {
        &self.points[..self.point_count]
    }
}

/// Manifold expressed in world coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WorldManifold {
    /// Normal from A to B
    pub normal: Vec2Fix,
    /// Contact points, midway between the two surfaces
    pub points: [Vec2Fix; MAX_MANIFOLD_POINTS],
    /// Signed separations, negative when overlapping
    pub separations: [Fix64; MAX_MANIFOLD_POINTS],
}

impl WorldManifold {
    /// Evaluate `manifold` at the given body transforms.
    pub fn new(
        manifold: &Manifold,
        xf_a: &Transform,
        radius_a: Fix64,
        xf_b: &Transform,
        radius_b: Fix64,
    ) -> Self {
        let mut wm = Self::default();
        if manifold.point_count == 0 {
            return wm;
        }

        match manifold.kind {
            ManifoldType::Circles => {
                wm.normal = Vec2Fix::UNIT_X;
                let point_a = xf_a.apply(manifold.local_point);
                let point_b = xf_b.apply(manifold.points[0].local_point);
                if point_a.distance_squared(point_b) > Fix64::EPSILON {
                    wm.normal = (point_b - point_a).normalize();
                }
                let c_a = point_a + wm.normal * radius_a;
                let c_b = point_b - wm.normal * radius_b;
                wm.points[0] = (c_a + c_b).scale(Fix64::HALF);
                wm.separations[0] = (c_b - c_a).dot(wm.normal);
            }
            ManifoldType::FaceA => {
                wm.normal = xf_a.q.apply(manifold.local_normal);
                let plane_point = xf_a.apply(manifold.local_point);
                for (i, mp) in manifold.points().iter().enumerate() {
                    let clip = xf_b.apply(mp.local_point);
                    let c_a = clip + wm.normal * (radius_a - (clip - plane_point).dot(wm.normal));
                    let c_b = clip - wm.normal * radius_b;
                    wm.points[i] = (c_a + c_b).scale(Fix64::HALF);
                    wm.separations[i] = (c_b - c_a).dot(wm.normal);
                }
            }
            ManifoldType::FaceB => {
                wm.normal = xf_b.q.apply(manifold.local_normal);
                let plane_point = xf_b.apply(manifold.local_point);
                for (i, mp) in manifold.points().iter().enumerate() {
                    let clip = xf_a.apply(mp.local_point);
                    let c_b = clip + wm.normal * (radius_b - (clip - plane_point).dot(wm.normal));
                    let c_a = clip - wm.normal * radius_a;
                    wm.points[i] = (c_a + c_b).scale(Fix64::HALF);
                    wm.separations[i] = (c_a - c_b).dot(wm.normal);
                }
                // Report the normal from A to B
                wm.normal = -wm.normal;
            }
        }
        wm
    }
}

/// Fate of a manifold point between two updates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PointState {
    /// Point does not exist
    #[default]
    Null,
    /// Point was added in the update
    Add,
    /// Point persisted across the update
    Persist,
    /// Point was removed in the update
    Remove,
}

/// Classify the points of two manifolds by feature id.
pub fn get_point_states(
    manifold1: &Manifold,
    manifold2: &Manifold,
) -> ([PointState; MAX_MANIFOLD_POINTS], [PointState; MAX_MANIFOLD_POINTS]) {
    let mut state1 = [PointState::Null; MAX_MANIFOLD_POINTS];
    let mut state2 = [PointState::Null; MAX_MANIFOLD_POINTS];

    for (i, p) in manifold1.points().iter().enumerate() {
        let key = p.id.key();
        state1[i] = if manifold2.points().iter().any(|q| q.id.key() == key) {
            PointState::Persist
        } else {
            PointState::Remove
        };
    }
    for (i, p) in manifold2.points().iter().enumerate() {
        let key = p.id.key();
        state2[i] = if manifold1.points().iter().any(|q| q.id.key() == key) {
            PointState::Persist
        } else {
            PointState::Add
        };
    }
    (state1, state2)
}

// ============================================================================
// Clipping
// ============================================================================

/// Vertex of a clipped segment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ClipVertex {
    /// Position
    pub v: Vec2Fix,
    /// Feature pair that produced it
    pub id: ContactFeature,
}

/// Sutherland-Hodgman clip of a segment against the half plane
/// `dot(normal, x) <= offset`.
pub fn clip_segment_to_line(
    v_in: &[ClipVertex; 2],
    normal: Vec2Fix,
    offset: Fix64,
    vertex_index_a: u8,
) -> ([ClipVertex; 2], usize) {
    let mut v_out = [ClipVertex::default(); 2];
    let mut count = 0;

    let d0 = normal.dot(v_in[0].v) - offset;
    let d1 = normal.dot(v_in[1].v) - offset;

    if !d0.is_positive() {
        v_out[count] = v_in[0];
        count += 1;
    }
    if !d1.is_positive() {
        v_out[count] = v_in[1];
        count += 1;
    }

    let straddles =
        (d0.is_negative() && d1.is_positive()) || (d0.is_positive() && d1.is_negative());
    if straddles && count < 2 {
        let interp = d0 / (d0 - d1);
        v_out[count].v = v_in[0].v + (v_in[1].v - v_in[0].v) * interp;
        v_out[count].id = ContactFeature {
            index_a: vertex_index_a,
            index_b: v_in[0].id.index_b,
            type_a: FeatureType::Vertex,
            type_b: FeatureType::Face,
        };
        count += 1;
    }

    (v_out, count)
}

/// Exact overlap test of two shape children (GJK distance below tolerance).
pub fn test_overlap(
    shape_a: &Shape,
    index_a: usize,
    shape_b: &Shape,
    index_b: usize,
    xf_a: &Transform,
    xf_b: &Transform,
) -> bool {
    let input = DistanceInput {
        proxy_a: DistanceProxy::new(shape_a, index_a),
        proxy_b: DistanceProxy::new(shape_b, index_b),
        transform_a: *xf_a,
        transform_b: *xf_b,
        use_radii: true,
    };
    let mut cache = SimplexCache::default();
    let output = distance(&mut cache, &input);
    output.distance < Fix64::from_raw(42_950) // ~1e-5
}

// ============================================================================
// Tests
// ============================================================================
