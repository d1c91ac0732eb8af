//! Broad Phase
//!
//! Wraps a [`DynamicTree`] with a move buffer. Proxies created, moved out
//! of their fat box, or touched are queued; [`BroadPhase::update_pairs`]
//! queries each queued proxy and reports every newly overlapping pair once,
//! in sorted proxy-id order.

use crate::collision::{Aabb, RayCastInput};
use crate::dynamic_tree::{DynamicTree, NULL_NODE};
use crate::math::{Fix64, Vec2Fix};

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

/// Null proxy id
pub const NULL_PROXY: u32 = NULL_NODE;

/// Pair-generating spatial index over fat AABBs.
#[derive(Clone, Debug)]
pub struct BroadPhase<T> {
    tree: DynamicTree<T>,
    move_buffer: Vec<u32>,
    pair_buffer: Vec<(u32, u32)>,
}

impl<T: Copy> BroadPhase<T> {
    /// Create an empty broad phase
    pub fn new() -> Self {
        Self {
            tree: DynamicTree::new(),
            move_buffer: Vec::with_capacity(16),
            pair_buffer: Vec::with_capacity(16),
        }
    }

    /// Create a proxy; it will be paired on the next update.
    pub fn create_proxy(&mut self, aabb: &Aabb, user_data: T) -> u32 {
        let proxy_id = self.tree.create_proxy(aabb, user_data);
        self.buffer_move(proxy_id);
        proxy_id
    }

    /// Destroy a proxy; pairs with it are not reported any more.
    pub fn destroy_proxy(&mut self, proxy_id: u32) {
        self.unbuffer_move(proxy_id);
        self.tree.destroy_proxy(proxy_id);
    }

    /// Move a proxy. Only re-pairs if it left its fat box.
    pub fn move_proxy(&mut self, proxy_id: u32, aabb: &Aabb, displacement: Vec2Fix) {
        if self.tree.move_proxy(proxy_id, aabb, displacement) {
            self.buffer_move(proxy_id);
        }
    }

    /// Force a proxy to be re-paired on the next update.
    pub fn touch_proxy(&mut self, proxy_id: u32) {
        self.buffer_move(proxy_id);
    }

    /// Fat AABB of a proxy
    #[inline]
    pub fn fat_aabb(&self, proxy_id: u32) -> Aabb {
        self.tree.fat_aabb(proxy_id)
    }

    /// User data of a proxy
    #[inline]
    pub fn user_data(&self, proxy_id: u32) -> T {
        self.tree.user_data(proxy_id)
    }

    /// Do the fat AABBs of two proxies overlap?
    #[inline]
    pub fn test_overlap(&self, proxy_a: u32, proxy_b: u32) -> bool {
        self.tree.fat_aabb(proxy_a).overlaps(&self.tree.fat_aabb(proxy_b))
    }

    /// Number of proxies
    #[inline]
    pub fn proxy_count(&self) -> usize {
        self.tree.proxy_count()
    }

    /// Number of proxies waiting to be paired
    #[inline]
    pub fn move_count(&self) -> usize {
        self.move_buffer.iter().filter(|&&p| p != NULL_PROXY).count()
    }

    /// Underlying tree (for diagnostics)
    #[inline]
    pub fn tree(&self) -> &DynamicTree<T> {
        &self.tree
    }

    /// Report new candidate pairs through `callback(user_a, user_b)`.
    ///
    /// Returns the number of distinct pairs reported.
    pub fn update_pairs<F: FnMut(T, T)>(&mut self, mut callback: F) -> usize {
        self.pair_buffer.clear();

        for &query_proxy in &self.move_buffer {
            if query_proxy == NULL_PROXY {
                continue;
            }
            let fat = self.tree.fat_aabb(query_proxy);
            let pairs = &mut self.pair_buffer;
            self.tree.query(&fat, |proxy_id| {
                if proxy_id != query_proxy {
                    pairs.push((proxy_id.min(query_proxy), proxy_id.max(query_proxy)));
                }
                true
            });
        }
        self.move_buffer.clear();

        self.pair_buffer.sort_unstable();
        self.pair_buffer.dedup();

        for &(a, b) in &self.pair_buffer {
            callback(self.tree.user_data(a), self.tree.user_data(b));
        }
        self.pair_buffer.len()
    }

    /// Visit proxies overlapping `aabb`; return `false` to stop.
    pub fn query<F: FnMut(u32) -> bool>(&self, aabb: &Aabb, callback: F) {
        self.tree.query(aabb, callback);
    }

    /// Ray cast against proxy fat boxes (see [`DynamicTree::ray_cast`]).
    pub fn ray_cast<F: FnMut(&RayCastInput, u32) -> Fix64>(&self, input: &RayCastInput, callback: F) {
        self.tree.ray_cast(input, callback);
    }

    /// Translate all proxies by `-new_origin`.
    pub fn shift_origin(&mut self, new_origin: Vec2Fix) {
        self.tree.shift_origin(new_origin);
    }

    fn buffer_move(&mut self, proxy_id: u32) {
        self.move_buffer.push(proxy_id);
    }

    fn unbuffer_move(&mut self, proxy_id: u32) {
        for slot in self.move_buffer.iter_mut().filter(|p| **p == proxy_id) {
            *slot = NULL_PROXY;
        }
    }
}

impl<T: Copy> Default for BroadPhase<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_box(x: i64, y: i64) -> Aabb {
        Aabb::new(Vec2Fix::from_int(x, y), Vec2Fix::from_int(x + 1, y + 1))
    }

    fn collect_pairs(bp: &mut BroadPhase<u32>) -> Vec<(u32, u32)> {
        let mut pairs = Vec::new();
        bp.update_pairs(|a, b| pairs.push((a.min(b), a.max(b))));
        pairs
    }

    #[test]
    fn test_new_overlaps_reported_once() {
        let mut bp = BroadPhase::new();
        bp.create_proxy(&unit_box(0, 0), 10u32);
        bp.create_proxy(&unit_box(0, 0), 11);
        bp.create_proxy(&unit_box(50, 50), 12);

        // Both proxies are in the move buffer, the pair is still reported once
        assert_eq!(collect_pairs(&mut bp), vec![(10, 11)]);
        // Nothing moved since
        assert!(collect_pairs(&mut bp).is_empty());
    }

    #[test]
    fn test_move_inside_fat_box_is_silent() {
        let mut bp = BroadPhase::new();
        let a = bp.create_proxy(&unit_box(0, 0), 0u32);
        bp.create_proxy(&unit_box(0, 0), 1);
        collect_pairs(&mut bp);

        bp.move_proxy(a, &unit_box(0, 0), Vec2Fix::ZERO);
        assert_eq!(bp.move_count(), 0);

        bp.touch_proxy(a);
        assert_eq!(collect_pairs(&mut bp), vec![(0, 1)]);
    }

    #[test]
    fn test_destroyed_proxy_not_paired() {
        let mut bp = BroadPhase::new();
        let a = bp.create_proxy(&unit_box(0, 0), 0u32);
        bp.create_proxy(&unit_box(0, 0), 1);
        bp.destroy_proxy(a);
        assert!(collect_pairs(&mut bp).is_empty());
        assert_eq!(bp.proxy_count(), 1);
    }

    #[test]
    fn test_pairs_are_sorted() {
        let mut bp = BroadPhase::new();
        for i in 0..5u32 {
            bp.create_proxy(&unit_box(0, 0), i);
        }
        let pairs = collect_pairs(&mut bp);
        assert_eq!(pairs.len(), 10);
        let mut sorted = pairs.clone();
        sorted.sort_unstable();
        assert_eq!(pairs, sorted);
    }

    #[test]
    fn test_fat_overlap() {
        let mut bp = BroadPhase::new();
        let a = bp.create_proxy(&unit_box(0, 0), 0u32);
        let b = bp.create_proxy(&Aabb::new(
            Vec2Fix::new(Fix64::from_ratio(105, 100), Fix64::ZERO),
            Vec2Fix::from_int(2, 1),
        ), 1);
        let c = bp.create_proxy(&unit_box(5, 0), 2);
        assert!(bp.test_overlap(a, b));
        assert!(!bp.test_overlap(a, c));
    }
}
