//! Contact Constraint Solver
//!
//! Sequential-impulse solver for non-penetration and friction.
//!
//! # Algorithm
//!
//! 1. Build velocity constraints from the world manifold (effective masses,
//!    restitution bias)
//! 2. Warm start with last step's impulses scaled by `dt_ratio`
//! 3. Iterate: friction first, then normal impulses. Two-point manifolds
//!    are solved as a 2x2 LCP by enumerating the four complementarity cases
//!    (block solver); ill-conditioned pairs fall back to a single point
//! 4. Position correction with pseudo-impulses (no velocity change)

use crate::collision::{Manifold, ManifoldType, WorldManifold};
use crate::island::{Position, Velocity};
use crate::math::{Fix64, Mat22, Rot, Transform, Vec2Fix};
use crate::settings::{SolverConfig, TimeStep, LINEAR_SLOP, MAX_BLOCK_CONDITION, MAX_MANIFOLD_POINTS};

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

/// Per-contact input gathered by the island.
#[derive(Clone, Copy, Debug)]
pub struct ContactSolverInput {
    /// Manifold with last step's impulses
    pub manifold: Manifold,
    /// Mixed friction
    pub friction: Fix64,
    /// Mixed restitution
    pub restitution: Fix64,
    /// Conveyor speed
    pub tangent_speed: Fix64,
    /// Island-local index of body A
    pub index_a: usize,
    /// Island-local index of body B
    pub index_b: usize,
    /// Inverse mass of body A
    pub inv_mass_a: Fix64,
    /// Inverse mass of body B
    pub inv_mass_b: Fix64,
    /// Inverse inertia of body A
    pub inv_i_a: Fix64,
    /// Inverse inertia of body B
    pub inv_i_b: Fix64,
    /// Local center of mass of body A
    pub local_center_a: Vec2Fix,
    /// Local center of mass of body B
    pub local_center_b: Vec2Fix,
    /// Skin radius of shape A
    pub radius_a: Fix64,
    /// Skin radius of shape B
    pub radius_b: Fix64,
}

#[derive(Clone, Copy, Debug, Default)]
struct VelocityConstraintPoint {
    r_a: Vec2Fix,
    r_b: Vec2Fix,
    normal_impulse: Fix64,
    tangent_impulse: Fix64,
    normal_mass: Fix64,
    tangent_mass: Fix64,
    velocity_bias: Fix64,
}

#[derive(Clone, Copy, Debug)]
struct ContactVelocityConstraint {
    points: [VelocityConstraintPoint; MAX_MANIFOLD_POINTS],
    normal: Vec2Fix,
    normal_mass: Mat22,
    k: Mat22,
    index_a: usize,
    index_b: usize,
    inv_mass_a: Fix64,
    inv_mass_b: Fix64,
    inv_i_a: Fix64,
    inv_i_b: Fix64,
    friction: Fix64,
    restitution: Fix64,
    tangent_speed: Fix64,
    point_count: usize,
}

#[derive(Clone, Copy, Debug)]
struct ContactPositionConstraint {
    local_points: [Vec2Fix; MAX_MANIFOLD_POINTS],
    local_normal: Vec2Fix,
    local_point: Vec2Fix,
    index_a: usize,
    index_b: usize,
    inv_mass_a: Fix64,
    inv_mass_b: Fix64,
    local_center_a: Vec2Fix,
    local_center_b: Vec2Fix,
    inv_i_a: Fix64,
    inv_i_b: Fix64,
    kind: ManifoldType,
    radius_a: Fix64,
    radius_b: Fix64,
    point_count: usize,
}

/// Contact constraints of one island.
#[derive(Clone, Debug, Default)]
pub struct ContactSolver {
    manifolds: Vec<Manifold>,
    velocity_constraints: Vec<ContactVelocityConstraint>,
    position_constraints: Vec<ContactPositionConstraint>,
    velocity_threshold: Fix64,
    baumgarte: Fix64,
    toi_baumgarte: Fix64,
    max_linear_correction: Fix64,
}

impl ContactSolver {
    /// Build constraints; impulses are scaled by `dt_ratio` or cleared.
    pub fn new(step: &TimeStep, config: &SolverConfig, inputs: &[ContactSolverInput]) -> Self {
        let mut manifolds = Vec::with_capacity(inputs.len());
        let mut velocity_constraints = Vec::with_capacity(inputs.len());
        let mut position_constraints = Vec::with_capacity(inputs.len());

        for input in inputs {
            let manifold = input.manifold;
            let point_count = manifold.point_count;
            debug_assert!(point_count > 0);

            let mut vc = ContactVelocityConstraint {
                points: [VelocityConstraintPoint::default(); MAX_MANIFOLD_POINTS],
                normal: Vec2Fix::ZERO,
                normal_mass: Mat22::ZERO,
                k: Mat22::ZERO,
                index_a: input.index_a,
                index_b: input.index_b,
                inv_mass_a: input.inv_mass_a,
                inv_mass_b: input.inv_mass_b,
                inv_i_a: input.inv_i_a,
                inv_i_b: input.inv_i_b,
                friction: input.friction,
                restitution: input.restitution,
                tangent_speed: input.tangent_speed,
                point_count,
            };
            let mut pc = ContactPositionConstraint {
                local_points: [Vec2Fix::ZERO; MAX_MANIFOLD_POINTS],
                local_normal: manifold.local_normal,
                local_point: manifold.local_point,
                index_a: input.index_a,
                index_b: input.index_b,
                inv_mass_a: input.inv_mass_a,
                inv_mass_b: input.inv_mass_b,
                local_center_a: input.local_center_a,
                local_center_b: input.local_center_b,
                inv_i_a: input.inv_i_a,
                inv_i_b: input.inv_i_b,
                kind: manifold.kind,
                radius_a: input.radius_a,
                radius_b: input.radius_b,
                point_count,
            };

            for (j, mp) in manifold.points().iter().enumerate() {
                let vcp = &mut vc.points[j];
                if step.warm_starting {
                    vcp.normal_impulse = step.dt_ratio * mp.normal_impulse;
                    vcp.tangent_impulse = step.dt_ratio * mp.tangent_impulse;
                }
                pc.local_points[j] = mp.local_point;
            }

            manifolds.push(manifold);
            velocity_constraints.push(vc);
            position_constraints.push(pc);
        }

        Self {
            manifolds,
            velocity_constraints,
            position_constraints,
            velocity_threshold: config.velocity_threshold,
            baumgarte: config.baumgarte,
            toi_baumgarte: config.toi_baumgarte,
            max_linear_correction: config.max_linear_correction,
        }
    }

    /// Number of constraints
    #[inline]
    pub fn len(&self) -> usize {
        self.velocity_constraints.len()
    }

    /// No constraints?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.velocity_constraints.is_empty()
    }

    /// Compute anchors, effective masses and restitution bias.
    pub fn initialize_velocity_constraints(&mut self, positions: &[Position], velocities: &[Velocity]) {
        let threshold = self.velocity_threshold;
        for ((vc, pc), manifold) in self
            .velocity_constraints
            .iter_mut()
            .zip(&self.position_constraints)
            .zip(&self.manifolds)
        {
            let (m_a, m_b) = (vc.inv_mass_a, vc.inv_mass_b);
            let (i_a, i_b) = (vc.inv_i_a, vc.inv_i_b);

            let Position { c: c_a, a: a_a } = positions[vc.index_a];
            let Velocity { v: v_a, w: w_a } = velocities[vc.index_a];
            let Position { c: c_b, a: a_b } = positions[vc.index_b];
            let Velocity { v: v_b, w: w_b } = velocities[vc.index_b];

            let xf_a = body_transform(c_a, a_a, pc.local_center_a);
            let xf_b = body_transform(c_b, a_b, pc.local_center_b);

            let wm = WorldManifold::new(manifold, &xf_a, pc.radius_a, &xf_b, pc.radius_b);
            vc.normal = wm.normal;
            let tangent = vc.normal.cross_scalar(Fix64::ONE);

            for (j, vcp) in vc.points.iter_mut().take(vc.point_count).enumerate() {
                vcp.r_a = wm.points[j] - c_a;
                vcp.r_b = wm.points[j] - c_b;

                let rn_a = vcp.r_a.cross(vc.normal);
                let rn_b = vcp.r_b.cross(vc.normal);
                let k_normal = m_a + m_b + i_a * rn_a * rn_a + i_b * rn_b * rn_b;
                vcp.normal_mass = inverse_or_zero(k_normal);

                let rt_a = vcp.r_a.cross(tangent);
                let rt_b = vcp.r_b.cross(tangent);
                let k_tangent = m_a + m_b + i_a * rt_a * rt_a + i_b * rt_b * rt_b;
                vcp.tangent_mass = inverse_or_zero(k_tangent);

                // Velocity bias for restitution
                vcp.velocity_bias = Fix64::ZERO;
                let dv = v_b + Vec2Fix::scalar_cross(w_b, vcp.r_b)
                    - v_a
                    - Vec2Fix::scalar_cross(w_a, vcp.r_a);
                let v_rel = vc.normal.dot(dv);
                if v_rel < -threshold {
                    vcp.velocity_bias = -vc.restitution * v_rel;
                }
            }

            // Prepare the block solver
            if vc.point_count == 2 {
                let vcp1 = vc.points[0];
                let vcp2 = vc.points[1];

                let rn1_a = vcp1.r_a.cross(vc.normal);
                let rn1_b = vcp1.r_b.cross(vc.normal);
                let rn2_a = vcp2.r_a.cross(vc.normal);
                let rn2_b = vcp2.r_b.cross(vc.normal);

                let k11 = m_a + m_b + i_a * rn1_a * rn1_a + i_b * rn1_b * rn1_b;
                let k22 = m_a + m_b + i_a * rn2_a * rn2_a + i_b * rn2_b * rn2_b;
                let k12 = m_a + m_b + i_a * rn1_a * rn2_a + i_b * rn1_b * rn2_b;

                if k11 * k11 < MAX_BLOCK_CONDITION * (k11 * k22 - k12 * k12) {
                    // K is safe to invert
                    vc.k = Mat22::from_cols(Vec2Fix::new(k11, k12), Vec2Fix::new(k12, k22));
                    vc.normal_mass = vc.k.inverse();
                } else {
                    // The constraints are redundant, just use one
                    vc.point_count = 1;
                }
            }
        }
    }

    /// Apply the warm-start impulses.
    pub fn warm_start(&mut self, velocities: &mut [Velocity]) {
        for vc in &self.velocity_constraints {
            let mut va = velocities[vc.index_a];
            let mut vb = velocities[vc.index_b];
            let tangent = vc.normal.cross_scalar(Fix64::ONE);

            for vcp in &vc.points[..vc.point_count] {
                let p = vc.normal * vcp.normal_impulse + tangent * vcp.tangent_impulse;
                va.w -= vc.inv_i_a * vcp.r_a.cross(p);
                va.v -= p * vc.inv_mass_a;
                vb.w += vc.inv_i_b * vcp.r_b.cross(p);
                vb.v += p * vc.inv_mass_b;
            }

            velocities[vc.index_a] = va;
            velocities[vc.index_b] = vb;
        }
    }

    /// One sequential-impulse sweep over all contacts.
    pub fn solve_velocity_constraints(&mut self, velocities: &mut [Velocity]) {
        for vc in &mut self.velocity_constraints {
            let (m_a, m_b) = (vc.inv_mass_a, vc.inv_mass_b);
            let (i_a, i_b) = (vc.inv_i_a, vc.inv_i_b);

            let Velocity { v: mut v_a, w: mut w_a } = velocities[vc.index_a];
            let Velocity { v: mut v_b, w: mut w_b } = velocities[vc.index_b];

            let normal = vc.normal;
            let tangent = normal.cross_scalar(Fix64::ONE);
            let friction = vc.friction;

            // Friction first: non-penetration matters more
            for vcp in vc.points[..vc.point_count].iter_mut() {
                let dv = v_b + Vec2Fix::scalar_cross(w_b, vcp.r_b)
                    - v_a
                    - Vec2Fix::scalar_cross(w_a, vcp.r_a);

                let vt = dv.dot(tangent) - vc.tangent_speed;
                let lambda = vcp.tangent_mass * (-vt);

                // Clamp the accumulated impulse to the friction cone
                let max_friction = friction * vcp.normal_impulse;
                let new_impulse = (vcp.tangent_impulse + lambda).clamp(-max_friction, max_friction);
                let lambda = new_impulse - vcp.tangent_impulse;
                vcp.tangent_impulse = new_impulse;

                let p = tangent * lambda;
                v_a -= p * m_a;
                w_a -= i_a * vcp.r_a.cross(p);
                v_b += p * m_b;
                w_b += i_b * vcp.r_b.cross(p);
            }

            if vc.point_count == 1 {
                let vcp = &mut vc.points[0];
                let dv = v_b + Vec2Fix::scalar_cross(w_b, vcp.r_b)
                    - v_a
                    - Vec2Fix::scalar_cross(w_a, vcp.r_a);

                let vn = dv.dot(normal);
                let lambda = -vcp.normal_mass * (vn - vcp.velocity_bias);

                // Clamp the accumulated impulse
                let new_impulse = (vcp.normal_impulse + lambda).max(Fix64::ZERO);
                let lambda = new_impulse - vcp.normal_impulse;
                vcp.normal_impulse = new_impulse;

                let p = normal * lambda;
                v_a -= p * m_a;
                w_a -= i_a * vcp.r_a.cross(p);
                v_b += p * m_b;
                w_b += i_b * vcp.r_b.cross(p);
            } else {
                // Block solver: find x with vn = A * x + b, vn >= 0, x >= 0, vn_i * x_i = 0,
                // working on the incremental impulse x - a.
                let cp1 = vc.points[0];
                let cp2 = vc.points[1];

                let a = Vec2Fix::new(cp1.normal_impulse, cp2.normal_impulse);
                debug_assert!(!a.x.is_negative() && !a.y.is_negative());

                let dv1 = v_b + Vec2Fix::scalar_cross(w_b, cp1.r_b)
                    - v_a
                    - Vec2Fix::scalar_cross(w_a, cp1.r_a);
                let dv2 = v_b + Vec2Fix::scalar_cross(w_b, cp2.r_b)
                    - v_a
                    - Vec2Fix::scalar_cross(w_a, cp2.r_a);

                let vn1 = dv1.dot(normal);
                let vn2 = dv2.dot(normal);

                let mut b = Vec2Fix::new(vn1 - cp1.velocity_bias, vn2 - cp2.velocity_bias);
                b -= vc.k.mul_vec(a);

                let x = solve_block(&vc.k, &vc.normal_mass, cp1.normal_mass, cp2.normal_mass, b);
                if let Some(x) = x {
                    // Incremental impulse
                    let d = x - a;
                    let p1 = normal * d.x;
                    let p2 = normal * d.y;
                    v_a -= (p1 + p2) * m_a;
                    w_a -= i_a * (cp1.r_a.cross(p1) + cp2.r_a.cross(p2));
                    v_b += (p1 + p2) * m_b;
                    w_b += i_b * (cp1.r_b.cross(p1) + cp2.r_b.cross(p2));

                    vc.points[0].normal_impulse = x.x;
                    vc.points[1].normal_impulse = x.y;
                }
            }

            velocities[vc.index_a] = Velocity { v: v_a, w: w_a };
            velocities[vc.index_b] = Velocity { v: v_b, w: w_b };
        }
    }

    /// Copy the accumulated impulses back into the manifolds.
    pub fn store_impulses(&mut self) {
        for (vc, manifold) in self.velocity_constraints.iter().zip(&mut self.manifolds) {
            for (j, mp) in manifold.points.iter_mut().take(manifold.point_count).enumerate() {
                mp.normal_impulse = vc.points[j].normal_impulse;
                mp.tangent_impulse = vc.points[j].tangent_impulse;
            }
        }
    }

    /// Manifolds with stored impulses, in input order.
    #[inline]
    pub fn manifolds(&self) -> &[Manifold] {
        &self.manifolds
    }

    /// Per-constraint (normal, tangent) impulses and point count, in input order.
    pub fn impulses(&self) -> impl Iterator<Item = ([Fix64; 2], [Fix64; 2], usize)> + '_ {
        self.velocity_constraints.iter().map(|vc| {
            (
                [vc.points[0].normal_impulse, vc.points[1].normal_impulse],
                [vc.points[0].tangent_impulse, vc.points[1].tangent_impulse],
                vc.point_count,
            )
        })
    }

    /// Sequential position correction. Returns `true` once the largest
    /// overlap is within `3 * LINEAR_SLOP`.
    pub fn solve_position_constraints(&self, positions: &mut [Position]) -> bool {
        let min_separation = self.solve_positions(positions, self.baumgarte, None);
        // Cannot expect the overlap to vanish: position correction keeps `LINEAR_SLOP`
        min_separation >= LINEAR_SLOP * Fix64::from_int(-3)
    }

    /// Position correction for a TOI sub-step. Only the two TOI bodies move.
    pub fn solve_toi_position_constraints(
        &self,
        positions: &mut [Position],
        toi_index_a: usize,
        toi_index_b: usize,
    ) -> bool {
        let min_separation =
            self.solve_positions(positions, self.toi_baumgarte, Some((toi_index_a, toi_index_b)));
        min_separation >= -(LINEAR_SLOP + LINEAR_SLOP.half())
    }

    fn solve_positions(
        &self,
        positions: &mut [Position],
        baumgarte: Fix64,
        toi_bodies: Option<(usize, usize)>,
    ) -> Fix64 {
        let mut min_separation = Fix64::ZERO;

        for pc in &self.position_constraints {
            let movable = |index: usize| match toi_bodies {
                Some((ta, tb)) => index == ta || index == tb,
                None => true,
            };
            let (m_a, i_a) = if movable(pc.index_a) {
                (pc.inv_mass_a, pc.inv_i_a)
            } else {
                (Fix64::ZERO, Fix64::ZERO)
            };
            let (m_b, i_b) = if movable(pc.index_b) {
                (pc.inv_mass_b, pc.inv_i_b)
            } else {
                (Fix64::ZERO, Fix64::ZERO)
            };

            let Position { c: mut c_a, a: mut a_a } = positions[pc.index_a];
            let Position { c: mut c_b, a: mut a_b } = positions[pc.index_b];

            // Solve normal constraints
            for j in 0..pc.point_count {
                let xf_a = body_transform(c_a, a_a, pc.local_center_a);
                let xf_b = body_transform(c_b, a_b, pc.local_center_b);

                let (normal, point, separation) = position_manifold(pc, &xf_a, &xf_b, j);

                let r_a = point - c_a;
                let r_b = point - c_b;

                min_separation = min_separation.min(separation);

                // Prevent large corrections and allow slop
                let c = (baumgarte * (separation + LINEAR_SLOP))
                    .clamp(-self.max_linear_correction, Fix64::ZERO);

                let rn_a = r_a.cross(normal);
                let rn_b = r_b.cross(normal);
                let k = m_a + m_b + i_a * rn_a * rn_a + i_b * rn_b * rn_b;

                let impulse = if k.is_positive() { -c / k } else { Fix64::ZERO };
                let p = normal * impulse;

                c_a -= p * m_a;
                a_a -= i_a * r_a.cross(p);
                c_b += p * m_b;
                a_b += i_b * r_b.cross(p);
            }

            positions[pc.index_a] = Position { c: c_a, a: a_a };
            positions[pc.index_b] = Position { c: c_b, a: a_b };
        }

        min_separation
    }
}

/// Transform of a body given its center of mass pose.
#[inline]
fn body_transform(c: Vec2Fix, a: Fix64, local_center: Vec2Fix) -> Transform {
    let q = Rot::from_angle(a);
    Transform {
        p: c - q.apply(local_center),
        q,
    }
}

#[inline]
fn inverse_or_zero(k: Fix64) -> Fix64 {
    if k.is_positive() {
        Fix64::ONE / k
    } else {
        Fix64::ZERO
    }
}

/// Enumerate the four complementarity cases of the 2x2 contact LCP.
///
/// `b` already has `K * a` removed. Returns the new total impulse, or `None`
/// if no case is feasible (numerical corner; impulses stay unchanged).
fn solve_block(k: &Mat22, normal_mass: &Mat22, mass1: Fix64, mass2: Fix64, b: Vec2Fix) -> Option<Vec2Fix> {
    let non_neg = |x: Fix64| !x.is_negative();

    // Case 1: both constraints active, vn = 0
    let x = -normal_mass.mul_vec(b);
    if non_neg(x.x) && non_neg(x.y) {
        return Some(x);
    }

    // Case 2: vn1 = 0, x2 = 0
    let x = Vec2Fix::new(-mass1 * b.x, Fix64::ZERO);
    let vn2 = k.ex.y * x.x + b.y;
    if non_neg(x.x) && non_neg(vn2) {
        return Some(x);
    }

    // Case 3: vn2 = 0, x1 = 0
    let x = Vec2Fix::new(Fix64::ZERO, -mass2 * b.y);
    let vn1 = k.ey.x * x.y + b.x;
    if non_neg(x.y) && non_neg(vn1) {
        return Some(x);
    }

    // Case 4: x1 = x2 = 0
    if non_neg(b.x) && non_neg(b.y) {
        return Some(Vec2Fix::ZERO);
    }

    None
}

/// Normal, point and separation of manifold point `index` at the current poses.
fn position_manifold(
    pc: &ContactPositionConstraint,
    xf_a: &Transform,
    xf_b: &Transform,
    index: usize,
) -> (Vec2Fix, Vec2Fix, Fix64) {
    match pc.kind {
        ManifoldType::Circles => {
            let point_a = xf_a.apply(pc.local_point);
            let point_b = xf_b.apply(pc.local_points[0]);
            let normal = (point_b - point_a).normalize();
            let point = (point_a + point_b).scale(Fix64::HALF);
            let separation = (point_b - point_a).dot(normal) - pc.radius_a - pc.radius_b;
            (normal, point, separation)
        }
        ManifoldType::FaceA => {
            let normal = xf_a.q.apply(pc.local_normal);
            let plane_point = xf_a.apply(pc.local_point);
            let clip_point = xf_b.apply(pc.local_points[index]);
            let separation = (clip_point - plane_point).dot(normal) - pc.radius_a - pc.radius_b;
            (normal, clip_point, separation)
        }
        ManifoldType::FaceB => {
            let normal = xf_b.q.apply(pc.local_normal);
            let plane_point = xf_b.apply(pc.local_point);
            let clip_point = xf_a.apply(pc.local_points[index]);
            let separation = (clip_point - plane_point).dot(normal) - pc.radius_a - pc.radius_b;
            // Ensure normal points from A to B
            (-normal, clip_point, separation)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collide::{collide_circles, collide_polygons};
    use crate::shape::{CircleShape, PolygonShape};

    fn step() -> TimeStep {
        TimeStep {
            dt: Fix64::from_ratio(1, 60),
            inv_dt: Fix64::from_int(60),
            dt_ratio: Fix64::ONE,
            velocity_iterations: 8,
            position_iterations: 3,
            warm_starting: true,
        }
    }

    fn input(manifold: Manifold, radius_a: Fix64, radius_b: Fix64) -> ContactSolverInput {
        ContactSolverInput {
            manifold,
            friction: Fix64::ZERO,
            restitution: Fix64::ZERO,
            tangent_speed: Fix64::ZERO,
            index_a: 0,
            index_b: 1,
            inv_mass_a: Fix64::ONE,
            inv_mass_b: Fix64::ONE,
            inv_i_a: Fix64::ZERO,
            inv_i_b: Fix64::ZERO,
            local_center_a: Vec2Fix::ZERO,
            local_center_b: Vec2Fix::ZERO,
            radius_a,
            radius_b,
        }
    }

    fn head_on_circles() -> (ContactSolverInput, Vec<Position>, Vec<Velocity>) {
        let c = CircleShape::new(Fix64::HALF);
        let xf_a = Transform::new(Vec2Fix::ZERO, Fix64::ZERO);
        let xf_b = Transform::new(Vec2Fix::from_ratio(9, 0, 10), Fix64::ZERO);
        let mut m = Manifold::default();
        collide_circles(&mut m, &c, &xf_a, &c, &xf_b);
        let positions = vec![
            Position { c: xf_a.p, a: Fix64::ZERO },
            Position { c: xf_b.p, a: Fix64::ZERO },
        ];
        let velocities = vec![
            Velocity { v: Vec2Fix::from_int(2, 0), w: Fix64::ZERO },
            Velocity { v: Vec2Fix::from_int(-2, 0), w: Fix64::ZERO },
        ];
        (input(m, c.radius, c.radius), positions, velocities)
    }

    #[test]
    fn test_inelastic_head_on_stops() {
        let (inp, positions, mut velocities) = head_on_circles();
        let mut solver = ContactSolver::new(&step(), &SolverConfig::default(), &[inp]);
        solver.initialize_velocity_constraints(&positions, &velocities);
        solver.warm_start(&mut velocities);
        for _ in 0..8 {
            solver.solve_velocity_constraints(&mut velocities);
        }
        let rel = velocities[1].v.x - velocities[0].v.x;
        assert!(rel.abs() < Fix64::from_ratio(1, 1000), "rel={rel}");
        solver.store_impulses();
        assert!(solver.manifolds()[0].points[0].normal_impulse > Fix64::ZERO);
    }

    #[test]
    fn test_restitution_bias() {
        let (mut inp, positions, mut velocities) = head_on_circles();
        inp.restitution = Fix64::ONE;
        let mut solver = ContactSolver::new(&step(), &SolverConfig::default(), &[inp]);
        solver.initialize_velocity_constraints(&positions, &velocities);
        for _ in 0..8 {
            solver.solve_velocity_constraints(&mut velocities);
        }
        // Elastic: the bodies swap velocities
        assert!((velocities[0].v.x + Fix64::TWO).abs() < Fix64::from_ratio(1, 1000));
        assert!((velocities[1].v.x - Fix64::TWO).abs() < Fix64::from_ratio(1, 1000));
    }

    #[test]
    fn test_warm_start_disabled_clears_impulses() {
        let (mut inp, positions, mut velocities) = head_on_circles();
        inp.manifold.points[0].normal_impulse = Fix64::from_int(5);
        let mut ts = step();
        ts.warm_starting = false;
        let mut solver = ContactSolver::new(&ts, &SolverConfig::default(), &[inp]);
        solver.initialize_velocity_constraints(&positions, &velocities);
        let before = velocities.clone();
        solver.warm_start(&mut velocities);
        assert_eq!(velocities, before);
    }

    #[test]
    fn test_block_solver_resting_box() {
        let ground = PolygonShape::new_box(Fix64::from_int(5), Fix64::HALF);
        let crate_box = PolygonShape::new_box(Fix64::HALF, Fix64::HALF);
        let xf_a = Transform::IDENTITY;
        let xf_b = Transform::new(Vec2Fix::from_ratio(0, 99, 100), Fix64::ZERO);
        let mut m = Manifold::default();
        collide_polygons(&mut m, &ground, &xf_a, &crate_box, &xf_b);
        assert_eq!(m.point_count, 2);

        let mut inp = input(m, ground.radius, crate_box.radius);
        inp.inv_mass_a = Fix64::ZERO;
        inp.inv_i_b = Fix64::from_ratio(6, 1);
        let positions = vec![
            Position { c: xf_a.p, a: Fix64::ZERO },
            Position { c: xf_b.p, a: Fix64::ZERO },
        ];
        let mut velocities = vec![
            Velocity { v: Vec2Fix::ZERO, w: Fix64::ZERO },
            Velocity { v: Vec2Fix::from_int(0, -3), w: Fix64::ZERO },
        ];
        let mut solver = ContactSolver::new(&step(), &SolverConfig::default(), &[inp]);
        solver.initialize_velocity_constraints(&positions, &velocities);
        for _ in 0..8 {
            solver.solve_velocity_constraints(&mut velocities);
        }
        assert!(velocities[1].v.y.abs() < Fix64::from_ratio(1, 100));
        assert!(velocities[1].w.abs() < Fix64::from_ratio(1, 100));
        let impulses: Vec<_> = solver.impulses().collect();
        assert_eq!(impulses[0].2, 2);
        assert!(impulses[0].0[0] > Fix64::ZERO && impulses[0].0[1] > Fix64::ZERO);
    }

    #[test]
    fn test_position_correction_pushes_apart() {
        let (inp, mut positions, _) = head_on_circles();
        let solver = ContactSolver::new(&step(), &SolverConfig::default(), &[inp]);
        let before = positions[1].c.x - positions[0].c.x;
        for _ in 0..20 {
            solver.solve_position_constraints(&mut positions);
        }
        let after = positions[1].c.x - positions[0].c.x;
        assert!(after > before);
        assert!(solver.solve_position_constraints(&mut positions));
    }

    #[test]
    fn test_toi_position_only_moves_toi_bodies() {
        let (inp, mut positions, _) = head_on_circles();
        let solver = ContactSolver::new(&step(), &SolverConfig::default(), &[inp]);
        let fixed = positions[0];
        solver.solve_toi_position_constraints(&mut positions, 1, 1);
        assert_eq!(positions[0], fixed);
        assert!(positions[1].c.x > Fix64::from_ratio(9, 10));
    }
}
