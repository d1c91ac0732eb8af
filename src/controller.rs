//! Controllers
//!
//! A controller is user logic the world runs once per step, after the
//! deferred changes are flushed and before the narrow phase. It receives the
//! whole world and may apply forces, change velocities or queue structural
//! changes; it may not add or remove controllers while running.
//!
//! Two stock controllers are provided:
//!
//! - [`VelocityLimitController`]: caps linear and angular speed.
//! - [`GravityController`]: attracts bodies towards points and other bodies.

use crate::body::BodyType;
use crate::math::{Fix64, Vec2Fix};
use crate::pool::BodyId;
use crate::world::World;

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

/// Per-step hook with full access to the world.
pub trait Controller: Send {
    /// Called once per step with the step length.
    fn update(&mut self, world: &mut World, dt: Fix64);
}

// ============================================================================
// VelocityLimitController
// ============================================================================

/// Clamps the speed of a set of bodies.
///
/// An empty body list means every dynamic body in the world.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VelocityLimitController {
    max_linear_velocity: Option<Fix64>,
    max_angular_velocity: Option<Fix64>,
    bodies: Vec<BodyId>,
}

impl VelocityLimitController {
    pub fn new(max_linear_velocity: Option<Fix64>, max_angular_velocity: Option<Fix64>) -> Self {
        for limit in [max_linear_velocity, max_angular_velocity].into_iter().flatten() {
            assert!(limit.is_valid() && !limit.is_negative(), "velocity limit must be >= 0");
        }
        Self {
            max_linear_velocity,
            max_angular_velocity,
            bodies: Vec::new(),
        }
    }

    /// Restrict the controller to `body`.
    pub fn add_body(&mut self, body: BodyId) {
        if !self.bodies.contains(&body) {
            self.bodies.push(body);
        }
    }

    pub fn remove_body(&mut self, body: BodyId) {
        self.bodies.retain(|&b| b != body);
    }

    pub fn bodies(&self) -> &[BodyId] {
        &self.bodies
    }

    pub fn max_linear_velocity(&self) -> Option<Fix64> {
        self.max_linear_velocity
    }

    pub fn max_angular_velocity(&self) -> Option<Fix64> {
        self.max_angular_velocity
    }
}

impl Controller for VelocityLimitController {
    fn update(&mut self, world: &mut World, _dt: Fix64) {
        let targets = if self.bodies.is_empty() {
            world.body_ids()
        } else {
            // Drop bodies that left the world
            self.bodies.retain(|&id| world.try_body(id).is_ok());
            self.bodies.clone()
        };

        for id in targets {
            let body = world.body_mut(id);
            if body.body_type() != BodyType::Dynamic || !body.is_awake() {
                continue;
            }

            if let Some(max) = self.max_linear_velocity {
                let v = body.linear_velocity();
                if v.length_squared() > max * max {
                    body.set_linear_velocity(v.normalize() * max);
                }
            }

            if let Some(max) = self.max_angular_velocity {
                let w = body.angular_velocity();
                if w.abs() > max {
                    body.set_angular_velocity(w.signum() * max);
                }
            }
        }
    }
}

// ============================================================================
// GravityController
// ============================================================================

/// How attraction decays with distance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GravityFalloff {
    /// `strength / r`
    Linear,
    /// `strength / r^2`
    InverseSquare,
}

/// Point and body attractors acting on every awake dynamic body.
///
/// Forces are proportional to the attracted body's mass, and for body
/// attractors also to the attractor's mass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GravityController {
    strength: Fix64,
    min_radius: Fix64,
    max_radius: Fix64,
    falloff: GravityFalloff,
    points: Vec<Vec2Fix>,
    bodies: Vec<BodyId>,
}

impl GravityController {
    pub fn new(strength: Fix64) -> Self {
        Self {
            strength,
            min_radius: Fix64::ZERO,
            max_radius: Fix64::MAX,
            falloff: GravityFalloff::InverseSquare,
            points: Vec::new(),
            bodies: Vec::new(),
        }
    }

    /// Ignore attractors closer than `min` or farther than `max`.
    #[must_use]
    pub fn with_radius(mut self, min: Fix64, max: Fix64) -> Self {
        assert!(!min.is_negative() && min <= max, "invalid attraction radius");
        self.min_radius = min;
        self.max_radius = max;
        self
    }

    #[must_use]
    pub fn with_falloff(mut self, falloff: GravityFalloff) -> Self {
        self.falloff = falloff;
        self
    }

    pub fn add_point(&mut self, point: Vec2Fix) {
        self.points.push(point);
    }

    pub fn add_body(&mut self, body: BodyId) {
        if !self.bodies.contains(&body) {
            self.bodies.push(body);
        }
    }

    pub fn remove_body(&mut self, body: BodyId) {
        self.bodies.retain(|&b| b != body);
    }

    pub fn points(&self) -> &[Vec2Fix] {
        &self.points
    }

    pub fn strength(&self) -> Fix64 {
        self.strength
    }

    /// Force pulling a body at `from` with mass `mass` towards `to`.
    fn attraction(&self, from: Vec2Fix, to: Vec2Fix, mass: Fix64) -> Option<Vec2Fix> {
        let d = to - from;
        let r2 = d.length_squared();
        if r2 <= Fix64::EPSILON {
            return None;
        }
        let r = r2.sqrt();
        if r < self.min_radius || r > self.max_radius {
            return None;
        }
        let scale = match self.falloff {
            GravityFalloff::Linear => self.strength * mass / r,
            GravityFalloff::InverseSquare => self.strength * mass / r2,
        };
        Some(d / r * scale)
    }
}

impl Controller for GravityController {
    fn update(&mut self, world: &mut World, _dt: Fix64) {
        self.bodies.retain(|&id| world.try_body(id).is_ok());

        let attractors: Vec<(BodyId, Vec2Fix, Fix64)> = self
            .bodies
            .iter()
            .map(|&id| {
                let body = world.body(id);
                (id, body.world_center(), body.mass())
            })
            .collect();

        for id in world.body_ids() {
            let body = world.body(id);
            if body.body_type() != BodyType::Dynamic || !body.is_awake() || !body.is_enabled() {
                continue;
            }
            let center = body.world_center();
            let mass = body.mass();

            let mut force = Vec2Fix::ZERO;
            for &(attractor, position, attractor_mass) in &attractors {
                if attractor == id {
                    continue;
                }
                if let Some(f) = self.attraction(center, position, mass * attractor_mass) {
                    force += f;
                }
            }
            for &point in &self.points {
                if let Some(f) = self.attraction(center, point, mass) {
                    force += f;
                }
            }

            if force != Vec2Fix::ZERO {
                world.body_mut(id).apply_force_to_center(force, false);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::BodyDef;
    use crate::settings::SolverConfig;

    fn world_with_body(def: BodyDef) -> (World, BodyId) {
        let mut world = World::new(SolverConfig::zero_gravity());
        let body = world.create_body(def);
        world.process_changes();
        (world, body)
    }

    #[test]
    fn test_velocity_limit_clamps_speed() {
        let (mut world, body) =
            world_with_body(BodyDef::dynamic().with_linear_velocity(Vec2Fix::from_int(30, 40)).with_angular_velocity(Fix64::from_int(-9)));
        let mut limit = VelocityLimitController::new(Some(Fix64::from_int(5)), Some(Fix64::from_int(2)));
        limit.update(&mut world, Fix64::from_ratio(1, 60));

        let v = world.body(body).linear_velocity();
        assert!((v.length() - Fix64::from_int(5)).abs() < Fix64::from_ratio(1, 1000));
        assert!(v.x.is_positive() && v.y.is_positive());
        assert_eq!(world.body(body).angular_velocity(), Fix64::from_int(-2));
    }

    #[test]
    fn test_velocity_limit_forgets_removed_bodies() {
        let (mut world, body) = world_with_body(BodyDef::dynamic());
        let mut limit = VelocityLimitController::new(Some(Fix64::ONE), None);
        limit.add_body(body);
        world.remove_body(body);
        world.process_changes();
        limit.update(&mut world, Fix64::from_ratio(1, 60));
        assert!(limit.bodies().is_empty());
    }

    #[test]
    fn test_point_gravity_pulls_towards_point() {
        let (mut world, body) = world_with_body(BodyDef::dynamic());
        let mut gravity = GravityController::new(Fix64::from_int(4));
        gravity.add_point(Vec2Fix::from_int(2, 0));
        gravity.update(&mut world, Fix64::from_ratio(1, 60));

        // Unit mass at distance 2: 4 / 2^2 = 1
        let force = world.body(body).force();
        assert!((force.x - Fix64::ONE).abs() < Fix64::from_ratio(1, 1000), "{force:?}");
        assert!(force.y.abs() < Fix64::from_ratio(1, 1000));
    }

    #[test]
    fn test_gravity_respects_radius_window() {
        let (mut world, body) = world_with_body(BodyDef::dynamic());
        let mut gravity =
            GravityController::new(Fix64::ONE).with_radius(Fix64::ZERO, Fix64::ONE).with_falloff(GravityFalloff::Linear);
        gravity.add_point(Vec2Fix::from_int(3, 0));
        gravity.update(&mut world, Fix64::from_ratio(1, 60));
        assert_eq!(world.body(body).force(), Vec2Fix::ZERO);
    }
}
