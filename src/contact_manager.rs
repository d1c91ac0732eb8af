//! Contact Manager
//!
//! Owns the broad phase and the contact pool. New pairs come from the broad
//! phase; [`ContactManager::collide`] refreshes every existing contact and
//! destroys the ones whose fat boxes stopped overlapping or whose filtering
//! changed.

use crate::body::{Body, BodyType, ContactEdge};
use crate::broad_phase::BroadPhase;
use crate::contact::{supports_pair, Contact};
use crate::event::EventCollector;
use crate::filter::Filter;
use crate::fixture::{Fixture, FixtureProxyKey};
use crate::joint::Joint;
use crate::pool::{BodyId, ContactId, FixtureId, JointId, Pool};

use tracing::trace;

/// Broad phase plus live contacts.
#[derive(Debug, Default)]
pub struct ContactManager {
    pub(crate) broad_phase: BroadPhase<FixtureProxyKey>,
    pub(crate) contacts: Pool<ContactId, Contact>,
}

impl ContactManager {
    /// Create an empty manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Live contacts
    #[inline]
    pub fn contacts(&self) -> &Pool<ContactId, Contact> {
        &self.contacts
    }

    /// The broad phase
    #[inline]
    pub fn broad_phase(&self) -> &BroadPhase<FixtureProxyKey> {
        &self.broad_phase
    }

    /// Pull new overlapping pairs out of the broad phase and create contacts.
    ///
    /// Returns the number of candidate pairs the broad phase reported.
    pub(crate) fn find_new_contacts(
        &mut self,
        fixtures: &Pool<FixtureId, Fixture>,
        bodies: &mut Pool<BodyId, Body>,
        joints: &Pool<JointId, Joint>,
    ) -> usize {
        let Self {
            broad_phase,
            contacts,
        } = self;
        broad_phase.update_pairs(|proxy_a, proxy_b| {
            Self::add_pair(contacts, proxy_a, proxy_b, fixtures, bodies, joints);
        })
    }

    fn add_pair(
        contacts: &mut Pool<ContactId, Contact>,
        proxy_a: FixtureProxyKey,
        proxy_b: FixtureProxyKey,
        fixtures: &Pool<FixtureId, Fixture>,
        bodies: &mut Pool<BodyId, Body>,
        joints: &Pool<JointId, Joint>,
    ) {
        let (mut fixture_a, mut index_a) = (proxy_a.fixture, proxy_a.child_index as usize);
        let (mut fixture_b, mut index_b) = (proxy_b.fixture, proxy_b.child_index as usize);

        let body_a = fixtures[fixture_a].body;
        let body_b = fixtures[fixture_b].body;

        // Are the fixtures on the same body?
        if body_a == body_b {
            return;
        }

        // Does a contact already exist?
        let exists = bodies[body_b].contact_edges.iter().any(|edge| {
            if edge.other != body_a {
                return false;
            }
            let c = &contacts[edge.contact];
            let same = c.fixture_a == fixture_a
                && c.fixture_b == fixture_b
                && c.child_a == index_a
                && c.child_b == index_b;
            let swapped = c.fixture_a == fixture_b
                && c.fixture_b == fixture_a
                && c.child_a == index_b
                && c.child_b == index_a;
            same || swapped
        });
        if exists {
            return;
        }

        if !bodies[body_b].should_collide(&bodies[body_a], joints) {
            return;
        }
        if !Filter::should_collide(&fixtures[fixture_a].filter, &fixtures[fixture_b].filter) {
            return;
        }

        // Order the pair the way the narrow phase expects
        let type_a = fixtures[fixture_a].shape.shape_type();
        let type_b = fixtures[fixture_b].shape.shape_type();
        if !supports_pair(type_a, type_b) {
            if !supports_pair(type_b, type_a) {
                return;
            }
            core::mem::swap(&mut fixture_a, &mut fixture_b);
            core::mem::swap(&mut index_a, &mut index_b);
        }

        let id = contacts
            .insert_with(|id| Contact::new(id, fixture_a, index_a, fixture_b, index_b, fixtures));
        let (body_a, body_b) = (contacts[id].body_a, contacts[id].body_b);

        bodies[body_a].contact_edges.push(ContactEdge {
            other: body_b,
            contact: id,
        });
        bodies[body_b].contact_edges.push(ContactEdge {
            other: body_a,
            contact: id,
        });
        trace!(?id, ?fixture_a, ?fixture_b, "contact created");
    }

    /// Destroy a contact, reporting the end of touch if it was touching.
    pub(crate) fn destroy(
        &mut self,
        id: ContactId,
        fixtures: &mut Pool<FixtureId, Fixture>,
        bodies: &mut Pool<BodyId, Body>,
        events: &mut EventCollector,
    ) {
        let Some(contact) = self.contacts.remove(id) else {
            return;
        };
        if contact.touching {
            contact.notify_separation(fixtures, events);
        }
        if let Some(body) = bodies.get_mut(contact.body_a) {
            body.remove_contact_edge(id);
        }
        if let Some(body) = bodies.get_mut(contact.body_b) {
            body.remove_contact_edge(id);
        }
        trace!(?id, "contact destroyed");
    }

    /// Narrow phase: update every contact, destroying stale ones.
    pub(crate) fn collide(
        &mut self,
        fixtures: &mut Pool<FixtureId, Fixture>,
        bodies: &mut Pool<BodyId, Body>,
        joints: &Pool<JointId, Joint>,
        events: &mut EventCollector,
    ) {
        for id in self.contacts.keys() {
            let contact = &self.contacts[id];
            let (fixture_a, fixture_b) = (contact.fixture_a, contact.fixture_b);
            let (body_a, body_b) = (contact.body_a, contact.body_b);

            // Is this contact flagged for filtering?
            if contact.filter_flag {
                if !bodies[body_b].should_collide(&bodies[body_a], joints)
                    || !Filter::should_collide(&fixtures[fixture_a].filter, &fixtures[fixture_b].filter)
                {
                    self.destroy(id, fixtures, bodies, events);
                    continue;
                }
                self.contacts[id].filter_flag = false;
            }

            let active = |b: &Body| b.awake && b.body_type != BodyType::Static;
            // At least one body must be awake and it must be dynamic or kinematic
            if !active(&bodies[body_a]) && !active(&bodies[body_b]) {
                continue;
            }

            let contact = &self.contacts[id];
            let proxy_a = fixtures[fixture_a].proxies[contact.child_a].proxy_id;
            let proxy_b = fixtures[fixture_b].proxies[contact.child_b].proxy_id;

            // Destroy contacts that cease to overlap in the broad phase
            if !self.broad_phase.test_overlap(proxy_a, proxy_b) {
                self.destroy(id, fixtures, bodies, events);
                continue;
            }

            self.contacts[id].update(fixtures, bodies, events);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::BodyDef;
    use crate::fixture::FixtureDef;
    use crate::math::{Fix64, Vec2Fix};
    use crate::shape::{CircleShape, EdgeShape, PolygonShape};

    struct Scene {
        bodies: Pool<BodyId, Body>,
        fixtures: Pool<FixtureId, Fixture>,
        joints: Pool<JointId, Joint>,
        events: EventCollector,
        manager: ContactManager,
    }

    impl Scene {
        fn new() -> Self {
            Self {
                bodies: Pool::new(),
                fixtures: Pool::new(),
                joints: Pool::new(),
                events: EventCollector::new(),
                manager: ContactManager::new(),
            }
        }

        fn add(&mut self, def: BodyDef, fixture: FixtureDef) -> (BodyId, FixtureId) {
            let body = self.bodies.insert_with(|id| Body::new(id, &def));
            let fid = self.fixtures.insert(Fixture::new(body, fixture));
            self.bodies[body].fixtures.push(fid);
            let xf = self.bodies[body].xf;
            self.fixtures[fid].create_proxies(fid, &mut self.manager.broad_phase, &xf);
            (body, fid)
        }

        fn add_circle(&mut self, x: i64) -> (BodyId, FixtureId) {
            let (body, fixture) = circle_at(x);
            self.add(body, fixture)
        }

        fn find(&mut self) {
            self.manager
                .find_new_contacts(&self.fixtures, &mut self.bodies, &self.joints);
        }

        fn collide(&mut self) {
            self.manager
                .collide(&mut self.fixtures, &mut self.bodies, &self.joints, &mut self.events);
        }
    }

    fn circle_at(x: i64) -> (BodyDef, FixtureDef) {
        (
            BodyDef::dynamic().with_position(Vec2Fix::from_int(x, 0)),
            FixtureDef::new(CircleShape::new(Fix64::ONE)),
        )
    }

    #[test]
    fn test_pair_creates_one_contact_with_edges() {
        let mut s = Scene::new();
        let (a, _) = s.add_circle(0);
        let (b, _) = s.add_circle(1);
        s.find();
        assert_eq!(s.manager.contacts().len(), 1);
        assert_eq!(s.bodies[a].contact_edges().len(), 1);
        assert_eq!(s.bodies[b].contact_edges()[0].other, a);

        // Touching the proxy again must not duplicate the contact
        let proxy = s.fixtures[s.bodies[a].fixtures[0]].proxies[0].proxy_id;
        s.manager.broad_phase.touch_proxy(proxy);
        s.find();
        assert_eq!(s.manager.contacts().len(), 1);
    }

    #[test]
    fn test_static_pair_is_skipped() {
        let mut s = Scene::new();
        let shape = FixtureDef::new(PolygonShape::new_box(Fix64::ONE, Fix64::ONE));
        s.add(BodyDef::default(), shape.clone());
        s.add(BodyDef::kinematic(), shape);
        s.find();
        assert!(s.manager.contacts().is_empty());
    }

    #[test]
    fn test_pair_order_puts_polygon_first() {
        let mut s = Scene::new();
        let (_, circle) = s.add_circle(0);
        let (_, boxed) = s.add(
            BodyDef::default(),
            FixtureDef::new(PolygonShape::new_box(Fix64::ONE, Fix64::ONE)),
        );
        s.find();
        let (_, contact) = s.manager.contacts().iter().next().expect("contact");
        assert_eq!(contact.fixture_a(), boxed);
        assert_eq!(contact.fixture_b(), circle);
    }

    #[test]
    fn test_edge_edge_never_pairs() {
        let mut s = Scene::new();
        let edge = EdgeShape::new(Vec2Fix::from_int(-1, 0), Vec2Fix::from_int(1, 0));
        s.add(BodyDef::dynamic(), FixtureDef::new(edge));
        s.add(BodyDef::dynamic(), FixtureDef::new(edge));
        s.find();
        assert!(s.manager.contacts().is_empty());
    }

    #[test]
    fn test_filter_blocks_pair() {
        let mut s = Scene::new();
        let (b0, f0) = circle_at(0);
        s.add(b0, f0.with_filter(Filter::DEFAULT.with_group(-1)));
        let (b1, f1) = circle_at(1);
        s.add(b1, f1.with_filter(Filter::DEFAULT.with_group(-1)));
        s.find();
        assert!(s.manager.contacts().is_empty());
    }

    #[test]
    fn test_collide_destroys_when_proxies_separate() {
        let mut s = Scene::new();
        let (a, fa) = s.add_circle(0);
        s.add_circle(1);
        s.find();
        s.collide();
        assert_eq!(s.manager.contacts().iter().filter(|(_, c)| c.is_touching()).count(), 1);

        // Teleport far away and resync the proxy
        s.bodies[a].set_transform_internal(Vec2Fix::from_int(100, 0), Fix64::ZERO);
        let xf = s.bodies[a].xf;
        s.fixtures[fa].synchronize(&mut s.manager.broad_phase, &xf, &xf);
        s.collide();
        assert!(s.manager.contacts().is_empty());
        assert!(s.bodies[a].contact_edges().is_empty());
        assert!(s
            .events
            .events()
            .iter()
            .any(|e| matches!(e, crate::event::WorldEvent::EndContact { .. })));
    }
}
