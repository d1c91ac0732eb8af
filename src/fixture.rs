//! Fixtures
//!
//! A fixture binds a [`Shape`] to a body together with its material,
//! filtering and sensor data. It owns the broad-phase proxies of the shape's
//! children and optional per-fixture contact handlers.

use crate::broad_phase::{BroadPhase, NULL_PROXY};
use crate::collision::{Aabb, RayCastInput, RayCastOutput};
use crate::contact::Contact;
use crate::filter::Filter;
use crate::math::{Fix64, Transform};
use crate::pool::{BodyId, FixtureId};
use crate::shape::{MassData, Shape};

#[cfg(not(feature = "std"))]
use alloc::{boxed::Box, vec::Vec};

/// Broad-phase payload: which fixture child a proxy belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FixtureProxyKey {
    /// Owning fixture
    pub fixture: FixtureId,
    /// Shape child index
    pub child_index: u32,
}

/// Called on the first touching manifold of a contact. Returning `false`
/// vetoes the contact for this step.
pub type CollisionHandler = Box<dyn FnMut(FixtureId, FixtureId, &Contact) -> bool + Send>;

/// Called when a touching contact stops touching or is destroyed.
pub type SeparationHandler = Box<dyn FnMut(FixtureId, FixtureId) + Send>;

/// Broad-phase proxy of one shape child.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FixtureProxy {
    /// Tight AABB swept over the last step
    pub aabb: Aabb,
    /// Shape child index
    pub child_index: u32,
    /// Broad-phase proxy id
    pub proxy_id: u32,
}

/// Fixture construction parameters.
#[derive(Clone, Debug)]
pub struct FixtureDef {
    /// Geometry in body-local coordinates
    pub shape: Shape,
    /// Density in kg/m^2
    pub density: Fix64,
    /// Coulomb friction coefficient
    pub friction: Fix64,
    /// Restitution (bounciness)
    pub restitution: Fix64,
    /// Sensors detect overlap but generate no response
    pub is_sensor: bool,
    /// Collision filter
    pub filter: Filter,
    /// Application data
    pub user_data: u64,
}

impl FixtureDef {
    /// Definition with default material (density 0, friction 0.2).
    pub fn new(shape: impl Into<Shape>) -> Self {
        Self {
            shape: shape.into(),
            density: Fix64::ZERO,
            friction: Fix64::from_ratio(2, 10),
            restitution: Fix64::ZERO,
            is_sensor: false,
            filter: Filter::DEFAULT,
            user_data: 0,
        }
    }

    /// Builder: density
    #[must_use]
    pub fn with_density(mut self, density: Fix64) -> Self {
        self.density = density;
        self
    }

    /// Builder: friction
    #[must_use]
    pub fn with_friction(mut self, friction: Fix64) -> Self {
        self.friction = friction;
        self
    }

    /// Builder: restitution
    #[must_use]
    pub fn with_restitution(mut self, restitution: Fix64) -> Self {
        self.restitution = restitution;
        self
    }

    /// Builder: sensor flag
    #[must_use]
    pub fn sensor(mut self) -> Self {
        self.is_sensor = true;
        self
    }

    /// Builder: filter
    #[must_use]
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    /// Builder: user data
    #[must_use]
    pub fn with_user_data(mut self, user_data: u64) -> Self {
        self.user_data = user_data;
        self
    }
}

/// A shape attached to a body.
pub struct Fixture {
    pub(crate) body: BodyId,
    pub(crate) shape: Shape,
    pub(crate) density: Fix64,
    pub(crate) friction: Fix64,
    pub(crate) restitution: Fix64,
    pub(crate) is_sensor: bool,
    pub(crate) filter: Filter,
    pub(crate) proxies: Vec<FixtureProxy>,
    pub(crate) user_data: u64,
    pub(crate) on_collision: Option<CollisionHandler>,
    pub(crate) on_separation: Option<SeparationHandler>,
}

impl core::fmt::Debug for Fixture {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Fixture")
            .field("body", &self.body)
            .field("shape", &self.shape)
            .field("density", &self.density)
            .field("is_sensor", &self.is_sensor)
            .field("filter", &self.filter)
            .field("proxies", &self.proxies.len())
            .finish_non_exhaustive()
    }
}

impl Fixture {
    pub(crate) fn new(body: BodyId, def: FixtureDef) -> Self {
        debug_assert!(def.density.is_valid() && !def.density.is_negative());
        debug_assert!(def.friction.is_valid() && !def.friction.is_negative());
        debug_assert!(def.restitution.is_valid() && !def.restitution.is_negative());
        Self {
            body,
            shape: def.shape,
            density: def.density,
            friction: def.friction,
            restitution: def.restitution,
            is_sensor: def.is_sensor,
            filter: def.filter,
            proxies: Vec::new(),
            user_data: def.user_data,
            on_collision: None,
            on_separation: None,
        }
    }

    /// Owning body
    #[inline]
    pub fn body(&self) -> BodyId {
        self.body
    }

    /// Shape in body coordinates
    #[inline]
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Density
    #[inline]
    pub fn density(&self) -> Fix64 {
        self.density
    }

    /// Friction coefficient
    #[inline]
    pub fn friction(&self) -> Fix64 {
        self.friction
    }

    /// Set friction; existing contacts keep their mixed value.
    pub fn set_friction(&mut self, friction: Fix64) {
        self.friction = friction;
    }

    /// Restitution
    #[inline]
    pub fn restitution(&self) -> Fix64 {
        self.restitution
    }

    /// Set restitution; existing contacts keep their mixed value.
    pub fn set_restitution(&mut self, restitution: Fix64) {
        self.restitution = restitution;
    }

    /// Sensor flag
    #[inline]
    pub fn is_sensor(&self) -> bool {
        self.is_sensor
    }

    /// Collision filter
    #[inline]
    pub fn filter(&self) -> Filter {
        self.filter
    }

    /// Application data
    #[inline]
    pub fn user_data(&self) -> u64 {
        self.user_data
    }

    /// Set application data
    pub fn set_user_data(&mut self, user_data: u64) {
        self.user_data = user_data;
    }

    /// Install the first-touch handler.
    pub fn set_on_collision(&mut self, handler: CollisionHandler) {
        self.on_collision = Some(handler);
    }

    /// Install the separation handler.
    pub fn set_on_separation(&mut self, handler: SeparationHandler) {
        self.on_separation = Some(handler);
    }

    /// Mass properties of the shape at this density.
    #[inline]
    pub fn mass_data(&self) -> MassData {
        self.shape.compute_mass(self.density)
    }

    /// Swept AABB of a child as of the last synchronization.
    pub fn aabb(&self, child_index: usize) -> Aabb {
        self.proxies[child_index].aabb
    }

    /// Broad-phase proxies (empty while the body is disabled)
    #[inline]
    pub fn proxies(&self) -> &[FixtureProxy] {
        &self.proxies
    }

    /// Point containment test against the world transform of the body.
    pub fn test_point(&self, xf: &Transform, p: crate::math::Vec2Fix) -> bool {
        self.shape.test_point(xf, p)
    }

    /// Ray cast one child.
    pub fn ray_cast(
        &self,
        input: &RayCastInput,
        xf: &Transform,
        child_index: usize,
    ) -> Option<RayCastOutput> {
        self.shape.ray_cast(input, xf, child_index)
    }

    pub(crate) fn create_proxies(
        &mut self,
        id: FixtureId,
        broad_phase: &mut BroadPhase<FixtureProxyKey>,
        xf: &Transform,
    ) {
        debug_assert!(self.proxies.is_empty());
        for child in 0..self.shape.child_count() {
            let aabb = self.shape.compute_aabb(xf, child);
            let key = FixtureProxyKey {
                fixture: id,
                child_index: child as u32,
            };
            let proxy_id = broad_phase.create_proxy(&aabb, key);
            self.proxies.push(FixtureProxy {
                aabb,
                child_index: child as u32,
                proxy_id,
            });
        }
    }

    pub(crate) fn destroy_proxies(&mut self, broad_phase: &mut BroadPhase<FixtureProxyKey>) {
        for proxy in self.proxies.drain(..) {
            broad_phase.destroy_proxy(proxy.proxy_id);
        }
    }

    /// Sweep every proxy from `xf1` to `xf2`.
    pub(crate) fn synchronize(
        &mut self,
        broad_phase: &mut BroadPhase<FixtureProxyKey>,
        xf1: &Transform,
        xf2: &Transform,
    ) {
        let displacement = xf2.p - xf1.p;
        for proxy in &mut self.proxies {
            let child = proxy.child_index as usize;
            let aabb1 = self.shape.compute_aabb(xf1, child);
            let aabb2 = self.shape.compute_aabb(xf2, child);
            proxy.aabb = aabb1.combine(&aabb2);
            broad_phase.move_proxy(proxy.proxy_id, &proxy.aabb, displacement);
        }
    }

    pub(crate) fn touch_proxies(&self, broad_phase: &mut BroadPhase<FixtureProxyKey>) {
        for proxy in &self.proxies {
            if proxy.proxy_id != NULL_PROXY {
                broad_phase.touch_proxy(proxy.proxy_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Vec2Fix;
    use crate::pool::{Pool, PoolKey};
    use crate::shape::{CircleShape, PolygonShape};

    fn body_id() -> BodyId {
        BodyId::from_parts(0, 0)
    }

    #[test]
    fn test_def_builders() {
        let def = FixtureDef::new(CircleShape::new(Fix64::ONE))
            .with_density(Fix64::TWO)
            .with_friction(Fix64::HALF)
            .with_restitution(Fix64::from_ratio(1, 4))
            .sensor()
            .with_user_data(7);
        assert_eq!(def.density, Fix64::TWO);
        assert_eq!(def.friction, Fix64::HALF);
        assert!(def.is_sensor);
        assert_eq!(def.user_data, 7);
    }

    #[test]
    fn test_proxy_lifecycle() {
        let mut fixtures: Pool<FixtureId, Fixture> = Pool::new();
        let mut bp = BroadPhase::new();
        let id = fixtures.insert(Fixture::new(
            body_id(),
            FixtureDef::new(PolygonShape::new_box(Fix64::ONE, Fix64::ONE)),
        ));

        fixtures[id].create_proxies(id, &mut bp, &Transform::IDENTITY);
        assert_eq!(bp.proxy_count(), 1);
        let key = bp.user_data(fixtures[id].proxies()[0].proxy_id);
        assert_eq!(key.fixture, id);

        let xf2 = Transform::new(Vec2Fix::from_int(10, 0), Fix64::ZERO);
        fixtures[id].synchronize(&mut bp, &Transform::IDENTITY, &xf2);
        let swept = fixtures[id].aabb(0);
        assert!(swept.lower.x < Fix64::ZERO && swept.upper.x > Fix64::from_int(10));

        fixtures[id].destroy_proxies(&mut bp);
        assert_eq!(bp.proxy_count(), 0);
        assert!(fixtures[id].proxies().is_empty());
    }

    #[test]
    fn test_mass_data_uses_density() {
        let fixture = Fixture::new(
            body_id(),
            FixtureDef::new(PolygonShape::new_box(Fix64::ONE, Fix64::ONE)).with_density(Fix64::TWO),
        );
        assert!((fixture.mass_data().mass - Fix64::from_int(8)).abs() < Fix64::from_raw(256));
    }
}
