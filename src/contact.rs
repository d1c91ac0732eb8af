//! Contacts
//!
//! A contact exists for every pair of fixture children whose fat AABBs
//! overlap. It caches the manifold across steps (for warm starting) and
//! tracks the touching state that drives begin/end notifications.

use crate::body::Body;
use crate::collide::{
    collide_circles, collide_edge_and_circle, collide_edge_and_polygon, collide_polygon_and_circle,
    collide_polygons,
};
use crate::collision::{test_overlap, Manifold, WorldManifold};
use crate::event::EventCollector;
use crate::fixture::Fixture;
use crate::math::{Fix64, Transform};
use crate::pool::{BodyId, ContactId, FixtureId, Pool};
use crate::shape::{Shape, ShapeType};

/// Geometric mean of two friction coefficients.
#[inline]
pub fn mix_friction(friction1: Fix64, friction2: Fix64) -> Fix64 {
    (friction1 * friction2).sqrt()
}

/// Larger of two restitution coefficients.
#[inline]
pub fn mix_restitution(restitution1: Fix64, restitution2: Fix64) -> Fix64 {
    restitution1.max(restitution2)
}

/// Does the narrow phase handle this ordered shape pair?
#[inline]
pub(crate) fn supports_pair(type_a: ShapeType, type_b: ShapeType) -> bool {
    use ShapeType::{Circle, Edge, Polygon};
    matches!(
        (type_a, type_b),
        (Circle, Circle) | (Polygon, Circle) | (Polygon, Polygon) | (Edge, Circle) | (Edge, Polygon)
    )
}

/// Compute the manifold of an ordered shape pair.
pub(crate) fn evaluate(
    manifold: &mut Manifold,
    shape_a: &Shape,
    xf_a: &Transform,
    shape_b: &Shape,
    xf_b: &Transform,
) {
    match (shape_a, shape_b) {
        (Shape::Circle(a), Shape::Circle(b)) => collide_circles(manifold, a, xf_a, b, xf_b),
        (Shape::Polygon(a), Shape::Circle(b)) => {
            collide_polygon_and_circle(manifold, a, xf_a, b, xf_b)
        }
        (Shape::Polygon(a), Shape::Polygon(b)) => collide_polygons(manifold, a, xf_a, b, xf_b),
        (Shape::Edge(a), Shape::Circle(b)) => collide_edge_and_circle(manifold, a, xf_a, b, xf_b),
        (Shape::Edge(a), Shape::Polygon(b)) => collide_edge_and_polygon(manifold, a, xf_a, b, xf_b),
        _ => manifold.point_count = 0,
    }
}

/// A potential or actual touch between two fixture children.
#[derive(Clone, Debug)]
pub struct Contact {
    pub(crate) id: ContactId,
    pub(crate) fixture_a: FixtureId,
    pub(crate) fixture_b: FixtureId,
    pub(crate) child_a: usize,
    pub(crate) child_b: usize,
    pub(crate) body_a: BodyId,
    pub(crate) body_b: BodyId,

    pub(crate) manifold: Manifold,

    /// Cleared by listeners/handlers to skip solving this step
    pub(crate) enabled: bool,
    pub(crate) touching: bool,
    pub(crate) island_flag: bool,
    /// Filtering changed; re-check before the next update
    pub(crate) filter_flag: bool,
    /// `toi` holds a valid cached time of impact
    pub(crate) toi_flag: bool,
    pub(crate) toi_count: u32,
    pub(crate) toi: Fix64,

    pub(crate) friction: Fix64,
    pub(crate) restitution: Fix64,
    pub(crate) tangent_speed: Fix64,
}

impl Contact {
    pub(crate) fn new(
        id: ContactId,
        fixture_a: FixtureId,
        child_a: usize,
        fixture_b: FixtureId,
        child_b: usize,
        fixtures: &Pool<FixtureId, Fixture>,
    ) -> Self {
        let fa = &fixtures[fixture_a];
        let fb = &fixtures[fixture_b];
        Self {
            id,
            fixture_a,
            fixture_b,
            child_a,
            child_b,
            body_a: fa.body,
            body_b: fb.body,
            manifold: Manifold::default(),
            enabled: true,
            touching: false,
            island_flag: false,
            filter_flag: false,
            toi_flag: false,
            toi_count: 0,
            toi: Fix64::ZERO,
            friction: mix_friction(fa.friction, fb.friction),
            restitution: mix_restitution(fa.restitution, fb.restitution),
            tangent_speed: Fix64::ZERO,
        }
    }

    /// Handle of this contact
    #[inline]
    pub fn id(&self) -> ContactId {
        self.id
    }

    /// First fixture
    #[inline]
    pub fn fixture_a(&self) -> FixtureId {
        self.fixture_a
    }

    /// Second fixture
    #[inline]
    pub fn fixture_b(&self) -> FixtureId {
        self.fixture_b
    }

    /// Child index on fixture A
    #[inline]
    pub fn child_index_a(&self) -> usize {
        self.child_a
    }

    /// Child index on fixture B
    #[inline]
    pub fn child_index_b(&self) -> usize {
        self.child_b
    }

    /// Body of fixture A
    #[inline]
    pub fn body_a(&self) -> BodyId {
        self.body_a
    }

    /// Body of fixture B
    #[inline]
    pub fn body_b(&self) -> BodyId {
        self.body_b
    }

    /// Local manifold
    #[inline]
    pub fn manifold(&self) -> &Manifold {
        &self.manifold
    }

    /// Mutable manifold (for pre-solve adjustments)
    #[inline]
    pub fn manifold_mut(&mut self) -> &mut Manifold {
        &mut self.manifold
    }

    /// Manifold in world coordinates
    pub fn world_manifold(
        &self,
        xf_a: &Transform,
        radius_a: Fix64,
        xf_b: &Transform,
        radius_b: Fix64,
    ) -> WorldManifold {
        WorldManifold::new(&self.manifold, xf_a, radius_a, xf_b, radius_b)
    }

    /// Do the shapes touch?
    #[inline]
    pub fn is_touching(&self) -> bool {
        self.touching
    }

    /// Will the contact be solved this step?
    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Enable or disable for the current step (re-enabled on the next update).
    pub fn set_enabled(&mut self, flag: bool) {
        self.enabled = flag;
    }

    /// Mixed friction
    #[inline]
    pub fn friction(&self) -> Fix64 {
        self.friction
    }

    /// Override the mixed friction
    pub fn set_friction(&mut self, friction: Fix64) {
        self.friction = friction;
    }

    /// Mixed restitution
    #[inline]
    pub fn restitution(&self) -> Fix64 {
        self.restitution
    }

    /// Override the mixed restitution
    pub fn set_restitution(&mut self, restitution: Fix64) {
        self.restitution = restitution;
    }

    /// Surface speed along the tangent (conveyor belts)
    #[inline]
    pub fn tangent_speed(&self) -> Fix64 {
        self.tangent_speed
    }

    /// Set the surface speed along the tangent
    pub fn set_tangent_speed(&mut self, speed: Fix64) {
        self.tangent_speed = speed;
    }

    /// Sub-steps this contact caused in the current step
    #[inline]
    pub fn toi_count(&self) -> u32 {
        self.toi_count
    }

    /// Mark for re-filtering before the next update.
    pub(crate) fn flag_for_filtering(&mut self) {
        self.filter_flag = true;
    }

    /// Recompute the manifold and dispatch touch transitions.
    ///
    /// Manifold points that persist by feature id inherit their impulses.
    /// The first touching manifold asks both fixtures' collision handlers;
    /// a veto keeps the contact non-touching so it is asked again next step.
    pub(crate) fn update(
        &mut self,
        fixtures: &mut Pool<FixtureId, Fixture>,
        bodies: &mut Pool<BodyId, Body>,
        events: &mut EventCollector,
    ) {
        let old_manifold = self.manifold;

        // Re-enable; handlers and listeners may clear this again
        self.enabled = true;

        let was_touching = self.touching;

        let sensor = fixtures[self.fixture_a].is_sensor || fixtures[self.fixture_b].is_sensor;
        let xf_a = bodies[self.body_a].xf;
        let xf_b = bodies[self.body_b].xf;

        let mut touching = if sensor {
            let shape_a = &fixtures[self.fixture_a].shape;
            let shape_b = &fixtures[self.fixture_b].shape;
            self.manifold.point_count = 0;
            test_overlap(shape_a, self.child_a, shape_b, self.child_b, &xf_a, &xf_b)
        } else {
            evaluate(
                &mut self.manifold,
                &fixtures[self.fixture_a].shape,
                &xf_a,
                &fixtures[self.fixture_b].shape,
                &xf_b,
            );

            // Match old contact ids to new contact ids and copy the impulses
            for mp2 in self.manifold.points.iter_mut().take(self.manifold.point_count) {
                mp2.normal_impulse = Fix64::ZERO;
                mp2.tangent_impulse = Fix64::ZERO;
                let key = mp2.id.key();
                if let Some(mp1) = old_manifold.points().iter().find(|mp1| mp1.id.key() == key) {
                    mp2.normal_impulse = mp1.normal_impulse;
                    mp2.tangent_impulse = mp1.tangent_impulse;
                }
            }

            let touching = self.manifold.point_count > 0;
            if touching != was_touching {
                bodies[self.body_a].set_awake(true);
                bodies[self.body_b].set_awake(true);
            }
            touching
        };

        if !was_touching && touching {
            let enabled_a = self.ask_collision_handler(fixtures, self.fixture_a, self.fixture_b);
            let enabled_b = self.ask_collision_handler(fixtures, self.fixture_b, self.fixture_a);
            self.enabled = enabled_a && enabled_b;

            if self.enabled {
                self.touching = true;
                events.begin_contact(self);
            } else {
                touching = false;
            }
        } else if was_touching && !touching {
            self.notify_separation(fixtures, events);
        }
        self.touching = touching;

        if !sensor && touching {
            events.pre_solve(self, &old_manifold);
        }
    }

    fn ask_collision_handler(
        &self,
        fixtures: &mut Pool<FixtureId, Fixture>,
        fixture: FixtureId,
        other: FixtureId,
    ) -> bool {
        match fixtures[fixture].on_collision.take() {
            Some(mut handler) => {
                let enabled = handler(fixture, other, self);
                fixtures[fixture].on_collision = Some(handler);
                enabled
            }
            None => true,
        }
    }

    /// Fire separation handlers and the end-contact event.
    pub(crate) fn notify_separation(
        &self,
        fixtures: &mut Pool<FixtureId, Fixture>,
        events: &mut EventCollector,
    ) {
        for (fixture, other) in [(self.fixture_a, self.fixture_b), (self.fixture_b, self.fixture_a)] {
            if let Some(fx) = fixtures.get_mut(fixture) {
                if let Some(mut handler) = fx.on_separation.take() {
                    handler(fixture, other);
                    fx.on_separation = Some(handler);
                }
            }
        }
        events.end_contact(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::BodyDef;
    use crate::event::WorldEvent;
    use crate::fixture::FixtureDef;
    use crate::math::Vec2Fix;
    use crate::pool::PoolKey;
    use crate::shape::{CircleShape, EdgeShape, PolygonShape};

    struct Scene {
        bodies: Pool<BodyId, Body>,
        fixtures: Pool<FixtureId, Fixture>,
        events: EventCollector,
        contact: Contact,
    }

    fn scene(def_a: FixtureDef, def_b: FixtureDef, x_b: Fix64) -> Scene {
        let mut bodies = Pool::new();
        let a = bodies.insert_with(|id| Body::new(id, &BodyDef::dynamic()));
        let b = bodies.insert_with(|id| {
            Body::new(id, &BodyDef::dynamic().with_position(Vec2Fix::new(x_b, Fix64::ZERO)))
        });
        let mut fixtures = Pool::new();
        let fa = fixtures.insert(Fixture::new(a, def_a));
        let fb = fixtures.insert(Fixture::new(b, def_b));
        let contact = Contact::new(ContactId::from_parts(0, 0), fa, 0, fb, 0, &fixtures);
        Scene {
            bodies,
            fixtures,
            events: EventCollector::new(),
            contact,
        }
    }

    fn circle() -> FixtureDef {
        FixtureDef::new(CircleShape::new(Fix64::ONE))
    }

    fn begin_count(events: &EventCollector) -> usize {
        events
            .events()
            .iter()
            .filter(|e| matches!(e, WorldEvent::BeginContact { .. }))
            .count()
    }

    #[test]
    fn test_pair_support_table() {
        use ShapeType::*;
        assert!(supports_pair(Circle, Circle));
        assert!(supports_pair(Polygon, Circle));
        assert!(!supports_pair(Circle, Polygon));
        assert!(supports_pair(Edge, Polygon));
        assert!(!supports_pair(Edge, Edge));
    }

    #[test]
    fn test_mixing() {
        assert_eq!(mix_friction(Fix64::from_int(4), Fix64::ONE), Fix64::TWO);
        assert_eq!(mix_restitution(Fix64::HALF, Fix64::ZERO), Fix64::HALF);
        let s = scene(
            circle().with_friction(Fix64::from_int(4)),
            circle().with_friction(Fix64::ONE).with_restitution(Fix64::HALF),
            Fix64::from_int(5),
        );
        assert_eq!(s.contact.friction(), Fix64::TWO);
        assert_eq!(s.contact.restitution(), Fix64::HALF);
    }

    #[test]
    fn test_begin_then_end() {
        let mut s = scene(circle(), circle(), Fix64::from_ratio(3, 2));
        s.contact.update(&mut s.fixtures, &mut s.bodies, &mut s.events);
        assert!(s.contact.is_touching());
        assert_eq!(begin_count(&s.events), 1);

        // Persisting touch: no duplicate
        s.contact.update(&mut s.fixtures, &mut s.bodies, &mut s.events);
        assert_eq!(begin_count(&s.events), 1);

        let b = s.contact.body_b;
        s.bodies[b].set_transform_internal(Vec2Fix::from_int(5, 0), Fix64::ZERO);
        s.contact.update(&mut s.fixtures, &mut s.bodies, &mut s.events);
        assert!(!s.contact.is_touching());
        assert!(matches!(s.events.events().last(), Some(WorldEvent::EndContact { .. })));
    }

    #[test]
    fn test_impulses_carry_over_by_feature() {
        let mut s = scene(circle(), circle(), Fix64::from_ratio(3, 2));
        s.contact.update(&mut s.fixtures, &mut s.bodies, &mut s.events);
        s.contact.manifold.points[0].normal_impulse = Fix64::from_int(7);
        s.contact.update(&mut s.fixtures, &mut s.bodies, &mut s.events);
        assert_eq!(s.contact.manifold.points[0].normal_impulse, Fix64::from_int(7));
    }

    #[test]
    fn test_handler_veto_is_asked_again() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let mut s = scene(circle(), circle(), Fix64::from_ratio(3, 2));
        let asked = Arc::new(AtomicUsize::new(0));
        let counter = asked.clone();
        let fa = s.contact.fixture_a;
        s.fixtures[fa].set_on_collision(Box::new(move |_: FixtureId, _: FixtureId, _: &Contact| {
            counter.fetch_add(1, Ordering::SeqCst);
            false
        }));

        s.contact.update(&mut s.fixtures, &mut s.bodies, &mut s.events);
        assert!(!s.contact.is_touching());
        assert!(!s.contact.is_enabled());
        s.contact.update(&mut s.fixtures, &mut s.bodies, &mut s.events);
        assert_eq!(asked.load(Ordering::SeqCst), 2);
        assert_eq!(begin_count(&s.events), 0);
    }

    #[test]
    fn test_sensor_touches_without_points() {
        let mut s = scene(circle().sensor(), circle(), Fix64::from_ratio(3, 2));
        s.contact.update(&mut s.fixtures, &mut s.bodies, &mut s.events);
        assert!(s.contact.is_touching());
        assert_eq!(s.contact.manifold().point_count, 0);
    }

    #[test]
    fn test_evaluate_edge_edge_is_empty() {
        let edge: Shape = EdgeShape::new(Vec2Fix::ZERO, Vec2Fix::from_int(1, 0)).into();
        let mut m = Manifold::default();
        m.point_count = 1;
        evaluate(&mut m, &edge, &Transform::IDENTITY, &edge, &Transform::IDENTITY);
        assert_eq!(m.point_count, 0);

        let boxed: Shape = PolygonShape::new_box(Fix64::ONE, Fix64::ONE).into();
        evaluate(&mut m, &edge, &Transform::IDENTITY, &boxed, &Transform::IDENTITY);
        assert!(m.point_count > 0);
    }
}
