//! Time of Impact
//!
//! Conservative advancement with separating-axis root finding. Given two
//! proxies moving along [`Sweep`]s, computes the earliest fraction of the
//! step at which their cores come within `target` of each other, where the
//! target keeps a little skin overlap so the discrete solver can take over.

use crate::distance::{distance, DistanceInput, DistanceProxy, SimplexCache};
use crate::math::{Fix64, Sweep, Transform, Vec2Fix};
use crate::settings::{LINEAR_SLOP, MAX_POLYGON_VERTICES, MAX_TOI_ITERATIONS, MAX_TOI_ROOT_ITERATIONS};

/// Input of [`time_of_impact`].
#[derive(Clone, Copy, Debug)]
pub struct ToiInput {
    pub proxy_a: DistanceProxy,
    pub proxy_b: DistanceProxy,
    pub sweep_a: Sweep,
    pub sweep_b: Sweep,
    /// Upper bound of the search interval, usually one
    pub t_max: Fix64,
}

/// Outcome classification of [`time_of_impact`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToiState {
    /// Not evaluated
    Unknown,
    /// Root finder gave up; `t` is a conservative lower bound
    Failed,
    /// Cores already overlap at the start of the interval
    Overlapped,
    /// Cores reach the target separation at `t`
    Touching,
    /// Shapes stay apart over the whole interval
    Separated,
}

/// Result of [`time_of_impact`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ToiOutput {
    pub state: ToiState,
    /// Fraction of the interval
    pub t: Fix64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SeparationKind {
    Points,
    FaceA,
    FaceB,
}

struct SeparationFunction<'a> {
    proxy_a: &'a DistanceProxy,
    proxy_b: &'a DistanceProxy,
    sweep_a: Sweep,
    sweep_b: Sweep,
    kind: SeparationKind,
    local_point: Vec2Fix,
    axis: Vec2Fix,
}

impl<'a> SeparationFunction<'a> {
    fn new(
        cache: &SimplexCache,
        proxy_a: &'a DistanceProxy,
        sweep_a: Sweep,
        proxy_b: &'a DistanceProxy,
        sweep_b: Sweep,
        t1: Fix64,
    ) -> Self {
        let xf_a = sweep_a.transform(t1);
        let xf_b = sweep_b.transform(t1);
        let ia = |i: usize| cache.index_a[i] as usize;
        let ib = |i: usize| cache.index_b[i] as usize;

        let mut f = Self {
            proxy_a,
            proxy_b,
            sweep_a,
            sweep_b,
            kind: SeparationKind::Points,
            local_point: Vec2Fix::ZERO,
            axis: Vec2Fix::ZERO,
        };

        if cache.count == 1 {
            let point_a = xf_a.apply(proxy_a.vertex(ia(0)));
            let point_b = xf_b.apply(proxy_b.vertex(ib(0)));
            f.axis = (point_b - point_a).normalize();
        } else if cache.index_a[0] == cache.index_a[1] {
            // Two points on B and one on A
            f.kind = SeparationKind::FaceB;
            let b1 = proxy_b.vertex(ib(0));
            let b2 = proxy_b.vertex(ib(1));
            f.axis = (b2 - b1).cross_scalar(Fix64::ONE).normalize();
            let normal = xf_b.q.apply(f.axis);
            f.local_point = (b1 + b2).scale(Fix64::HALF);
            let point_b = xf_b.apply(f.local_point);
            let point_a = xf_a.apply(proxy_a.vertex(ia(0)));
            if (point_a - point_b).dot(normal).is_negative() {
                f.axis = -f.axis;
            }
        } else {
            // Two points on A and one or two on B
            f.kind = SeparationKind::FaceA;
            let a1 = proxy_a.vertex(ia(0));
            let a2 = proxy_a.vertex(ia(1));
            f.axis = (a2 - a1).cross_scalar(Fix64::ONE).normalize();
            let normal = xf_a.q.apply(f.axis);
            f.local_point = (a1 + a2).scale(Fix64::HALF);
            let point_a = xf_a.apply(f.local_point);
            let point_b = xf_b.apply(proxy_b.vertex(ib(0)));
            if (point_b - point_a).dot(normal).is_negative() {
                f.axis = -f.axis;
            }
        }
        f
    }

    fn transforms(&self, t: Fix64) -> (Transform, Transform) {
        (self.sweep_a.transform(t), self.sweep_b.transform(t))
    }

    /// Deepest points along the axis at time `t`, with their separation.
    fn find_min_separation(&self, t: Fix64) -> (usize, usize, Fix64) {
        let (xf_a, xf_b) = self.transforms(t);
        match self.kind {
            SeparationKind::Points => {
                let ia = self.proxy_a.support(xf_a.q.apply_inv(self.axis));
                let ib = self.proxy_b.support(xf_b.q.apply_inv(-self.axis));
                let point_a = xf_a.apply(self.proxy_a.vertex(ia));
                let point_b = xf_b.apply(self.proxy_b.vertex(ib));
                (ia, ib, (point_b - point_a).dot(self.axis))
            }
            SeparationKind::FaceA => {
                let normal = xf_a.q.apply(self.axis);
                let point_a = xf_a.apply(self.local_point);
                let ib = self.proxy_b.support(xf_b.q.apply_inv(-normal));
                let point_b = xf_b.apply(self.proxy_b.vertex(ib));
                (0, ib, (point_b - point_a).dot(normal))
            }
            SeparationKind::FaceB => {
                let normal = xf_b.q.apply(self.axis);
                let point_b = xf_b.apply(self.local_point);
                let ia = self.proxy_a.support(xf_a.q.apply_inv(-normal));
                let point_a = xf_a.apply(self.proxy_a.vertex(ia));
                (ia, 0, (point_a - point_b).dot(normal))
            }
        }
    }

    /// Separation of the given vertex pair at time `t`.
    fn evaluate(&self, ia: usize, ib: usize, t: Fix64) -> Fix64 {
        let (xf_a, xf_b) = self.transforms(t);
        match self.kind {
            SeparationKind::Points => {
                let point_a = xf_a.apply(self.proxy_a.vertex(ia));
                let point_b = xf_b.apply(self.proxy_b.vertex(ib));
                (point_b - point_a).dot(self.axis)
            }
            SeparationKind::FaceA => {
                let normal = xf_a.q.apply(self.axis);
                let point_a = xf_a.apply(self.local_point);
                let point_b = xf_b.apply(self.proxy_b.vertex(ib));
                (point_b - point_a).dot(normal)
            }
            SeparationKind::FaceB => {
                let normal = xf_b.q.apply(self.axis);
                let point_b = xf_b.apply(self.local_point);
                let point_a = xf_a.apply(self.proxy_a.vertex(ia));
                (point_a - point_b).dot(normal)
            }
        }
    }
}

/// Earliest time in `[0, t_max]` at which the proxies come within touching
/// distance. The returned `t` never lies past the true impact.
pub fn time_of_impact(input: &ToiInput) -> ToiOutput {
    let mut output = ToiOutput {
        state: ToiState::Unknown,
        t: input.t_max,
    };

    let proxy_a = &input.proxy_a;
    let proxy_b = &input.proxy_b;

    let mut sweep_a = input.sweep_a;
    let mut sweep_b = input.sweep_b;
    // Large rotations make the root finder hard
    sweep_a.normalize();
    sweep_b.normalize();

    let t_max = input.t_max;
    let total_radius = proxy_a.radius + proxy_b.radius;
    let target = LINEAR_SLOP.max(total_radius - LINEAR_SLOP * Fix64::from_int(3));
    let tolerance = LINEAR_SLOP * Fix64::from_ratio(1, 4);
    debug_assert!(target > tolerance);

    let mut t1 = Fix64::ZERO;
    let mut iter = 0;
    let mut cache = SimplexCache::default();

    loop {
        let dist_input = DistanceInput {
            proxy_a: *proxy_a,
            proxy_b: *proxy_b,
            transform_a: sweep_a.transform(t1),
            transform_b: sweep_b.transform(t1),
            use_radii: false,
        };
        let dist = distance(&mut cache, &dist_input);

        // Overlapping cores: give up on continuous collision
        if !dist.distance.is_positive() {
            output.state = ToiState::Overlapped;
            output.t = Fix64::ZERO;
            break;
        }

        if dist.distance < target + tolerance {
            output.state = ToiState::Touching;
            output.t = t1;
            break;
        }

        let fcn = SeparationFunction::new(&cache, proxy_a, sweep_a, proxy_b, sweep_b, t1);

        // Resolve the deepest point on this axis, pushing t2 back per vertex
        let mut done = false;
        let mut t2 = t_max;
        let mut push_back_iter = 0;
        loop {
            let (ia, ib, mut s2) = fcn.find_min_separation(t2);

            // Final configuration is separated
            if s2 > target + tolerance {
                output.state = ToiState::Separated;
                output.t = t_max;
                done = true;
                break;
            }

            // Separation reached at t2: advance the sweep
            if s2 > target - tolerance {
                t1 = t2;
                break;
            }

            let mut s1 = fcn.evaluate(ia, ib, t1);

            // Initial overlap on this axis: the root finder cannot help
            if s1 < target - tolerance {
                output.state = ToiState::Failed;
                output.t = t1;
                done = true;
                break;
            }

            if s1 <= target + tolerance {
                output.state = ToiState::Touching;
                output.t = t1;
                done = true;
                break;
            }

            // Mixed secant / bisection on [a1, a2]
            let mut root_iter = 0;
            let mut a1 = t1;
            let mut a2 = t2;
            loop {
                let t = if root_iter & 1 == 1 {
                    a1 + (target - s1) * (a2 - a1) / (s2 - s1)
                } else {
                    (a1 + a2).half()
                };
                root_iter += 1;

                let s = fcn.evaluate(ia, ib, t);
                if (s - target).abs() < tolerance {
                    t2 = t;
                    break;
                }

                if s > target {
                    a1 = t;
                    s1 = s;
                } else {
                    a2 = t;
                    s2 = s;
                }

                if root_iter == MAX_TOI_ROOT_ITERATIONS {
                    break;
                }
            }

            push_back_iter += 1;
            if push_back_iter == MAX_POLYGON_VERTICES {
                break;
            }
        }

        iter += 1;
        if done {
            break;
        }
        if iter == MAX_TOI_ITERATIONS {
            output.state = ToiState::Failed;
            output.t = t1;
            break;
        }
    }

    output
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::{CircleShape, PolygonShape, Shape};

    fn sweep(c0: Vec2Fix, c: Vec2Fix) -> Sweep {
        Sweep {
            local_center: Vec2Fix::ZERO,
            c0,
            c,
            a0: Fix64::ZERO,
            a: Fix64::ZERO,
            alpha0: Fix64::ZERO,
        }
    }

    #[test]
    fn test_bullet_against_wall() {
        let wall = Shape::Polygon(PolygonShape::new_box(Fix64::from_ratio(1, 20), Fix64::ONE));
        let bullet = Shape::Circle(CircleShape::new(Fix64::from_ratio(1, 10)));
        let input = ToiInput {
            proxy_a: DistanceProxy::new(&wall, 0),
            proxy_b: DistanceProxy::new(&bullet, 0),
            sweep_a: sweep(Vec2Fix::from_int(1, 0), Vec2Fix::from_int(1, 0)),
            sweep_b: sweep(Vec2Fix::ZERO, Vec2Fix::from_int(4, 0)),
            t_max: Fix64::ONE,
        };
        let out = time_of_impact(&input);
        assert_eq!(out.state, ToiState::Touching);

        // Bullet center at impact lies in front of the wall face (x = 0.95)
        let x = Fix64::from_int(4) * out.t;
        assert!(x < Fix64::from_ratio(95, 100), "x = {x}");
        assert!(x > Fix64::from_ratio(80, 100), "x = {x}");
    }

    #[test]
    fn test_separated_sweep() {
        let a = Shape::Circle(CircleShape::new(Fix64::HALF));
        let input = ToiInput {
            proxy_a: DistanceProxy::new(&a, 0),
            proxy_b: DistanceProxy::new(&a, 0),
            sweep_a: sweep(Vec2Fix::ZERO, Vec2Fix::ZERO),
            sweep_b: sweep(Vec2Fix::from_int(0, 5), Vec2Fix::from_int(3, 5)),
            t_max: Fix64::ONE,
        };
        let out = time_of_impact(&input);
        assert_eq!(out.state, ToiState::Separated);
        assert_eq!(out.t, Fix64::ONE);
    }

    #[test]
    fn test_overlapped_start() {
        let a = Shape::Polygon(PolygonShape::new_box(Fix64::ONE, Fix64::ONE));
        let input = ToiInput {
            proxy_a: DistanceProxy::new(&a, 0),
            proxy_b: DistanceProxy::new(&a, 0),
            sweep_a: sweep(Vec2Fix::ZERO, Vec2Fix::ZERO),
            sweep_b: sweep(Vec2Fix::from_ratio(1, 0, 2), Vec2Fix::from_int(5, 0)),
            t_max: Fix64::ONE,
        };
        let out = time_of_impact(&input);
        assert_eq!(out.state, ToiState::Overlapped);
        assert_eq!(out.t, Fix64::ZERO);
    }
}
