//! Breakable Bodies
//!
//! A breakable body watches the contact impulses reported by the solver.
//! Once a single contact pushes harder than its strength it is marked
//! broken, and at the end of the step the world replaces it with one new
//! body per fixture. The replacement goes through the deferred add/remove
//! queues, so the pieces appear at the next `process_changes`.

use crate::contact::Contact;
use crate::event::ContactImpulse;
use crate::math::Fix64;
use crate::pool::BodyId;

/// A body that shatters into its fixtures under a strong enough impact.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BreakableBody {
    body: BodyId,
    strength: Fix64,
    broken: bool,
}

impl BreakableBody {
    /// Watch `body`; `strength` is the normal impulse it survives.
    pub fn new(body: BodyId, strength: Fix64) -> Self {
        assert!(strength.is_valid() && !strength.is_negative(), "strength must be >= 0");
        Self {
            body,
            strength,
            broken: false,
        }
    }

    #[inline]
    pub fn body(&self) -> BodyId {
        self.body
    }

    #[inline]
    pub fn strength(&self) -> Fix64 {
        self.strength
    }

    #[inline]
    pub fn is_broken(&self) -> bool {
        self.broken
    }

    /// Feed one solved contact. Returns `true` if this impulse broke the body.
    pub(crate) fn record(&mut self, contact: &Contact, impulse: &ContactImpulse) -> bool {
        if self.broken || (contact.body_a() != self.body && contact.body_b() != self.body) {
            return false;
        }
        if impulse.max_normal_impulse() > self.strength {
            self.broken = true;
            return true;
        }
        false
    }
}
