//! Physics Event System
//!
//! World events are queued during `step()` and structural calls and can be
//! drained after each frame. A [`ContactListener`] additionally receives
//! synchronous callbacks from inside the step, where it may inspect and
//! disable contacts before they are solved.

use crate::collision::Manifold;
use crate::contact::Contact;
use crate::math::Fix64;
use crate::pool::{BodyId, ContactId, ControllerId, FixtureId, JointId};
use crate::settings::MAX_MANIFOLD_POINTS;

#[cfg(not(feature = "std"))]
use alloc::{boxed::Box, vec::Vec};

/// Something that happened in the world.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorldEvent {
    /// A contact got its first touching manifold
    BeginContact {
        /// The contact
        contact: ContactId,
        /// First fixture
        fixture_a: FixtureId,
        /// Second fixture
        fixture_b: FixtureId,
    },
    /// A touching contact stopped touching or was destroyed
    EndContact {
        /// The contact (may already be destroyed)
        contact: ContactId,
        /// First fixture
        fixture_a: FixtureId,
        /// Second fixture
        fixture_b: FixtureId,
    },
    /// A joint exceeded its breakpoint and was disabled
    JointBroke {
        /// The joint
        joint: JointId,
        /// Reaction force magnitude that broke it
        force: Fix64,
    },
    /// A body was admitted by `process_changes`
    BodyAdded(BodyId),
    /// A body was removed by `process_changes`
    BodyRemoved(BodyId),
    /// A fixture was attached
    FixtureAdded(FixtureId),
    /// A fixture was destroyed
    FixtureRemoved(FixtureId),
    /// A joint was admitted by `process_changes`
    JointAdded(JointId),
    /// A joint was removed
    JointRemoved(JointId),
    /// A controller was registered
    ControllerAdded(ControllerId),
    /// A controller was removed
    ControllerRemoved(ControllerId),
}

/// Impulses applied to a contact by the solver, reported after solving.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ContactImpulse {
    /// Normal impulses per manifold point
    pub normal_impulses: [Fix64; MAX_MANIFOLD_POINTS],
    /// Tangent impulses per manifold point
    pub tangent_impulses: [Fix64; MAX_MANIFOLD_POINTS],
    /// Number of valid entries
    pub count: usize,
}

impl ContactImpulse {
    /// Largest normal impulse
    pub fn max_normal_impulse(&self) -> Fix64 {
        self.normal_impulses[..self.count]
            .iter()
            .copied()
            .fold(Fix64::ZERO, Fix64::max)
    }
}

/// Synchronous contact callbacks invoked from inside the step.
///
/// All methods default to doing nothing.
pub trait ContactListener {
    /// Two fixtures began touching.
    fn begin_contact(&mut self, _contact: &Contact) {}

    /// Two fixtures stopped touching (or the contact was destroyed).
    fn end_contact(&mut self, _contact: &Contact) {}

    /// Called after the manifold update, before solving. Disabling the
    /// contact here skips it for the current step.
    fn pre_solve(&mut self, _contact: &mut Contact, _old_manifold: &Manifold) {}

    /// Impulses the solver applied to a touching contact.
    fn post_solve(&mut self, _contact: &Contact, _impulse: &ContactImpulse) {}
}

/// Event queue plus the optional listener.
#[derive(Default)]
pub struct EventCollector {
    events: Vec<WorldEvent>,
    listener: Option<Box<dyn ContactListener + Send>>,
}

impl core::fmt::Debug for EventCollector {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EventCollector")
            .field("events", &self.events.len())
            .field("listener", &self.listener.is_some())
            .finish()
    }
}

impl EventCollector {
    /// Create an empty collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Install (or clear) the contact listener
    pub fn set_listener(&mut self, listener: Option<Box<dyn ContactListener + Send>>) {
        self.listener = listener;
    }

    /// Queue an event
    #[inline]
    pub fn push(&mut self, event: WorldEvent) {
        self.events.push(event);
    }

    /// Queued events
    #[inline]
    pub fn events(&self) -> &[WorldEvent] {
        &self.events
    }

    /// Take all queued events
    pub fn drain(&mut self) -> Vec<WorldEvent> {
        core::mem::take(&mut self.events)
    }

    pub(crate) fn has_listener(&self) -> bool {
        self.listener.is_some()
    }

    pub(crate) fn begin_contact(&mut self, contact: &Contact) {
        self.events.push(WorldEvent::BeginContact {
            contact: contact.id(),
            fixture_a: contact.fixture_a(),
            fixture_b: contact.fixture_b(),
        });
        if let Some(listener) = self.listener.as_mut() {
            listener.begin_contact(contact);
        }
    }

    pub(crate) fn end_contact(&mut self, contact: &Contact) {
        self.events.push(WorldEvent::EndContact {
            contact: contact.id(),
            fixture_a: contact.fixture_a(),
            fixture_b: contact.fixture_b(),
        });
        if let Some(listener) = self.listener.as_mut() {
            listener.end_contact(contact);
        }
    }

    pub(crate) fn pre_solve(&mut self, contact: &mut Contact, old_manifold: &Manifold) {
        if let Some(listener) = self.listener.as_mut() {
            listener.pre_solve(contact, old_manifold);
        }
    }

    pub(crate) fn post_solve(&mut self, contact: &Contact, impulse: &ContactImpulse) {
        if let Some(listener) = self.listener.as_mut() {
            listener.post_solve(contact, impulse);
        }
    }
}
