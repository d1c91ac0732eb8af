//! Generational Slot Arena
//!
//! Bodies, fixtures, joints, contacts and controllers live in [`Pool`]s and
//! refer to each other by typed ids instead of pointers. Freed slots go on a
//! LIFO free list and are reused; every reuse bumps the slot generation so a
//! stale id can never alias the new occupant.
//!
//! Iteration is always in slot order, which keeps every traversal of the
//! world deterministic.

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

use core::marker::PhantomData;
use core::ops::{Index, IndexMut};

/// Typed handle into a [`Pool`].
pub trait PoolKey: Copy + Eq {
    /// Build from slot index and generation.
    fn from_parts(index: u32, generation: u32) -> Self;
    /// Slot index.
    fn index(self) -> u32;
    /// Slot generation.
    fn generation(self) -> u32;
}

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name {
            index: u32,
            generation: u32,
        }

        impl PoolKey for $name {
            #[inline]
            fn from_parts(index: u32, generation: u32) -> Self {
                Self { index, generation }
            }

            #[inline]
            fn index(self) -> u32 {
                self.index
            }

            #[inline]
            fn generation(self) -> u32 {
                self.generation
            }
        }
    };
}

define_id!(
    /// Handle to a [`Body`](crate::body::Body).
    BodyId
);
define_id!(
    /// Handle to a [`Fixture`](crate::fixture::Fixture).
    FixtureId
);
define_id!(
    /// Handle to a [`Joint`](crate::joint::Joint).
    JointId
);
define_id!(
    /// Handle to a [`Contact`](crate::contact::Contact).
    ContactId
);
define_id!(
    /// Handle to a registered [`Controller`](crate::controller::Controller).
    ControllerId
);

const NO_FREE: u32 = u32::MAX;

#[derive(Clone, Debug)]
enum Slot<T> {
    Occupied { generation: u32, value: T },
    Free { generation: u32, next_free: u32 },
}

/// Slot arena with generational keys.
#[derive(Clone, Debug)]
pub struct Pool<K, T> {
    slots: Vec<Slot<T>>,
    free_head: u32,
    len: usize,
    _key: PhantomData<fn() -> K>,
}

impl<K: PoolKey, T> Pool<K, T> {
    /// Create an empty pool.
    pub const fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_head: NO_FREE,
            len: 0,
            _key: PhantomData,
        }
    }

    /// Create an empty pool with room for `capacity` values.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free_head: NO_FREE,
            len: 0,
            _key: PhantomData,
        }
    }

    /// Number of live values.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// `true` if no value is live.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of slots ever allocated (live plus free).
    #[inline]
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Insert a value, reusing a free slot when one exists.
    pub fn insert(&mut self, value: T) -> K {
        self.insert_with(|_| value)
    }

    /// Insert a value that needs to know its own key.
    pub fn insert_with(&mut self, make: impl FnOnce(K) -> T) -> K {
        self.len += 1;
        if self.free_head != NO_FREE {
            let index = self.free_head;
            let (generation, next_free) = match self.slots[index as usize] {
                Slot::Free {
                    generation,
                    next_free,
                } => (generation, next_free),
                Slot::Occupied { .. } => unreachable!("free list points at an occupied slot"),
            };
            let key = K::from_parts(index, generation);
            self.slots[index as usize] = Slot::Occupied {
                generation,
                value: make(key),
            };
            self.free_head = next_free;
            key
        } else {
            let index = self.slots.len() as u32;
            let key = K::from_parts(index, 0);
            self.slots.push(Slot::Occupied {
                generation: 0,
                value: make(key),
            });
            key
        }
    }

    /// Remove and return the value behind `key`; `None` for stale keys.
    pub fn remove(&mut self, key: K) -> Option<T> {
        let index = key.index();
        let slot = self.slots.get_mut(index as usize)?;
        let generation = match slot {
            Slot::Occupied { generation, .. } if *generation == key.generation() => *generation,
            _ => return None,
        };
        let old = core::mem::replace(
            slot,
            Slot::Free {
                generation: generation.wrapping_add(1),
                next_free: self.free_head,
            },
        );
        self.free_head = index;
        self.len -= 1;
        match old {
            Slot::Occupied { value, .. } => Some(value),
            Slot::Free { .. } => None,
        }
    }

    /// `true` if `key` refers to a live value.
    #[inline]
    pub fn contains(&self, key: K) -> bool {
        self.get(key).is_some()
    }

    /// Shared access; `None` for stale keys.
    #[inline]
    pub fn get(&self, key: K) -> Option<&T> {
        match self.slots.get(key.index() as usize)? {
            Slot::Occupied { generation, value } if *generation == key.generation() => Some(value),
            _ => None,
        }
    }

    /// Mutable access; `None` for stale keys.
    #[inline]
    pub fn get_mut(&mut self, key: K) -> Option<&mut T> {
        match self.slots.get_mut(key.index() as usize)? {
            Slot::Occupied { generation, value } if *generation == key.generation() => Some(value),
            _ => None,
        }
    }

    /// Mutable access to two distinct values at once.
    pub fn get2_mut(&mut self, a: K, b: K) -> Option<(&mut T, &mut T)> {
        let (ia, ib) = (a.index() as usize, b.index() as usize);
        if ia == ib || !self.contains(a) || !self.contains(b) {
            return None;
        }
        let (lo, hi, swapped) = if ia < ib { (ia, ib, false) } else { (ib, ia, true) };
        let (head, tail) = self.slots.split_at_mut(hi);
        let first = match &mut head[lo] {
            Slot::Occupied { value, .. } => value,
            Slot::Free { .. } => return None,
        };
        let second = match &mut tail[0] {
            Slot::Occupied { value, .. } => value,
            Slot::Free { .. } => return None,
        };
        if swapped {
            Some((second, first))
        } else {
            Some((first, second))
        }
    }

    /// Live entries in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (K, &T)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| match slot {
                Slot::Occupied { generation, value } => {
                    Some((K::from_parts(i as u32, *generation), value))
                }
                Slot::Free { .. } => None,
            })
    }

    /// Live entries in slot order, mutably.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (K, &mut T)> + '_ {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(i, slot)| match slot {
                Slot::Occupied { generation, value } => {
                    Some((K::from_parts(i as u32, *generation), value))
                }
                Slot::Free { .. } => None,
            })
    }

    /// Snapshot of the live keys in slot order.
    pub fn keys(&self) -> Vec<K> {
        self.iter().map(|(k, _)| k).collect()
    }

    /// Drop every value. Generations survive so old keys stay stale.
    pub fn clear(&mut self) {
        let keys = self.keys();
        for key in keys {
            self.remove(key);
        }
    }
}

impl<K: PoolKey, T> Default for Pool<K, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: PoolKey, T> Index<K> for Pool<K, T> {
    type Output = T;

    /// # Panics
    ///
    /// Panics on a stale key.
    fn index(&self, key: K) -> &T {
        match self.get(key) {
            Some(v) => v,
            None => panic!("stale or foreign id (slot {})", key.index()),
        }
    }
}

impl<K: PoolKey, T> IndexMut<K> for Pool<K, T> {
    fn index_mut(&mut self, key: K) -> &mut T {
        match self.get_mut(key) {
            Some(v) => v,
            None => panic!("stale or foreign id (slot {})", key.index()),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_get_remove() {
        let mut pool: Pool<BodyId, i32> = Pool::new();
        let a = pool.insert(1);
        let b = pool.insert(2);
        assert_eq!(pool.len(), 2);
        assert_eq!(pool[a], 1);
        assert_eq!(pool.remove(a), Some(1));
        assert_eq!(pool.get(a), None);
        assert_eq!(pool[b], 2);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_slot_reuse_bumps_generation() {
        let mut pool: Pool<ContactId, &str> = Pool::new();
        let a = pool.insert("a");
        pool.remove(a);
        let b = pool.insert("b");
        assert_eq!(a.index(), b.index());
        assert_ne!(a.generation(), b.generation());
        assert!(!pool.contains(a));
        assert_eq!(pool.slot_count(), 1);
    }

    #[test]
    fn test_lifo_free_list() {
        let mut pool: Pool<JointId, u8> = Pool::new();
        let ids: Vec<_> = (0..4).map(|i| pool.insert(i)).collect();
        pool.remove(ids[1]);
        pool.remove(ids[3]);
        assert_eq!(pool.insert(9).index(), ids[3].index());
        assert_eq!(pool.insert(9).index(), ids[1].index());
        assert_eq!(pool.insert(9).index(), 4);
    }

    #[test]
    fn test_iteration_in_slot_order() {
        let mut pool: Pool<FixtureId, u32> = Pool::new();
        let ids: Vec<_> = (0..5).map(|i| pool.insert(i)).collect();
        pool.remove(ids[2]);
        let seen: Vec<u32> = pool.iter().map(|(_, v)| *v).collect();
        assert_eq!(seen, vec![0, 1, 3, 4]);
        assert_eq!(pool.keys().len(), 4);
    }

    #[test]
    fn test_get2_mut() {
        let mut pool: Pool<BodyId, i32> = Pool::new();
        let a = pool.insert(1);
        let b = pool.insert(2);
        {
            let (x, y) = pool.get2_mut(b, a).unwrap();
            assert_eq!((*x, *y), (2, 1));
            *x += 10;
            *y += 20;
        }
        assert_eq!(pool[a], 21);
        assert_eq!(pool[b], 12);
        assert!(pool.get2_mut(a, a).is_none());
    }

    #[test]
    fn test_insert_with_sees_key() {
        let mut pool: Pool<BodyId, Option<BodyId>> = Pool::new();
        let id = pool.insert_with(Some);
        assert_eq!(pool[id], Some(id));
    }

    #[test]
    #[should_panic]
    fn test_index_stale_panics() {
        let mut pool: Pool<BodyId, i32> = Pool::new();
        let a = pool.insert(1);
        pool.remove(a);
        let _ = pool[a];
    }
}
