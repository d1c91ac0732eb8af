//! Dynamic AABB Tree (Incremental BVH)
//!
//! A self-balancing binary tree of fat AABBs backing the broad phase. Leaves
//! are proxies; internal nodes bound their two children. The tree supports
//! O(log n) insert, remove and move, plus region and ray queries.
//!
//! # Features
//!
//! - **Fat AABBs**: every proxy is enlarged by [`AABB_EXTENSION`] so small
//!   motions do not touch the tree
//! - **Predictive enlargement**: a moved proxy is additionally stretched along
//!   its displacement, scaled by [`AABB_MULTIPLIER`]
//! - **Perimeter heuristic**: insertion descends by branch-and-bound on the
//!   perimeter cost
//! - **Tree rotations**: AVL-style balancing keeps queries logarithmic
//! - **Deterministic**: fixed-point comparisons, LIFO node reuse

use crate::collision::{Aabb, RayCastInput};
use crate::math::{Fix64, Vec2Fix};
use crate::settings::{AABB_EXTENSION, AABB_MULTIPLIER};

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

/// Null node sentinel
pub const NULL_NODE: u32 = u32::MAX;

/// A node in the dynamic AABB tree
#[derive(Clone, Debug)]
struct TreeNode<T> {
    /// Fat AABB (enlarged for movement prediction)
    aabb: Aabb,
    /// Parent node index (NULL_NODE if root); next free node when unused
    parent: u32,
    /// Left child (NULL_NODE if leaf)
    left: u32,
    /// Right child (NULL_NODE if leaf)
    right: u32,
    /// Height (0 for leaf, -1 when free)
    height: i32,
    /// Proxy payload, present on leaves only
    user_data: Option<T>,
}

impl<T> TreeNode<T> {
    fn empty() -> Self {
        Self {
            aabb: Aabb::default(),
            parent: NULL_NODE,
            left: NULL_NODE,
            right: NULL_NODE,
            height: -1,
            user_data: None,
        }
    }

    #[inline]
    fn is_leaf(&self) -> bool {
        self.left == NULL_NODE
    }
}

/// Dynamic AABB tree keyed by `u32` proxy ids.
#[derive(Clone, Debug)]
pub struct DynamicTree<T> {
    /// Node pool
    nodes: Vec<TreeNode<T>>,
    /// Free list (indices of unused nodes)
    free_list: Vec<u32>,
    /// Root node index
    root: u32,
    /// Number of live proxies
    proxy_count: usize,
}

impl<T: Copy> DynamicTree<T> {
    /// Create a new empty tree
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            free_list: Vec::new(),
            root: NULL_NODE,
            proxy_count: 0,
        }
    }

    /// Insert a proxy for `aabb`; the stored box is fattened.
    pub fn create_proxy(&mut self, aabb: &Aabb, user_data: T) -> u32 {
        let id = self.alloc_node();
        let node = &mut self.nodes[id as usize];
        node.aabb = aabb.expanded(AABB_EXTENSION);
        node.user_data = Some(user_data);
        node.height = 0;
        self.insert_leaf(id);
        self.proxy_count += 1;
        id
    }

    /// Remove a proxy.
    pub fn destroy_proxy(&mut self, proxy_id: u32) {
        debug_assert!(self.nodes[proxy_id as usize].is_leaf());
        self.remove_leaf(proxy_id);
        self.free_node(proxy_id);
        self.proxy_count -= 1;
    }

    /// Move a proxy to a new tight `aabb` with the given per-step displacement.
    ///
    /// Returns `true` if the proxy was re-inserted (its fat box no longer
    /// contained `aabb`). The new fat box is stretched along `displacement`.
    pub fn move_proxy(&mut self, proxy_id: u32, aabb: &Aabb, displacement: Vec2Fix) -> bool {
        debug_assert!(self.nodes[proxy_id as usize].is_leaf());
        if self.nodes[proxy_id as usize].aabb.contains(aabb) {
            return false;
        }

        self.remove_leaf(proxy_id);

        let mut b = aabb.expanded(AABB_EXTENSION);
        let d = displacement * AABB_MULTIPLIER;
        if d.x.is_negative() {
            b.lower.x += d.x;
        } else {
            b.upper.x += d.x;
        }
        if d.y.is_negative() {
            b.lower.y += d.y;
        } else {
            b.upper.y += d.y;
        }
        self.nodes[proxy_id as usize].aabb = b;

        self.insert_leaf(proxy_id);
        true
    }

    /// Payload of a proxy.
    #[inline]
    pub fn user_data(&self, proxy_id: u32) -> T {
        match self.nodes[proxy_id as usize].user_data {
            Some(data) => data,
            None => panic!("proxy {proxy_id} is not a leaf"),
        }
    }

    /// Fat AABB of a proxy.
    #[inline]
    pub fn fat_aabb(&self, proxy_id: u32) -> Aabb {
        self.nodes[proxy_id as usize].aabb
    }

    /// Visit every proxy whose fat AABB overlaps `aabb`.
    ///
    /// The callback returns `false` to stop the query.
    pub fn query<F: FnMut(u32) -> bool>(&self, aabb: &Aabb, mut callback: F) {
        if self.root == NULL_NODE {
            return;
        }

        let mut stack = Vec::with_capacity(64);
        stack.push(self.root);

        while let Some(node_id) = stack.pop() {
            let node = &self.nodes[node_id as usize];
            if !node.aabb.overlaps(aabb) {
                continue;
            }

            if node.is_leaf() {
                if !callback(node_id) {
                    return;
                }
            } else {
                stack.push(node.left);
                stack.push(node.right);
            }
        }
    }

    /// Ray cast against the proxies' fat boxes.
    ///
    /// The callback receives the (possibly clipped) input and a proxy id and
    /// returns the new max fraction: zero terminates, a negative value
    /// ignores the proxy, a positive value clips the ray.
    pub fn ray_cast<F: FnMut(&RayCastInput, u32) -> Fix64>(
        &self,
        input: &RayCastInput,
        mut callback: F,
    ) {
        if self.root == NULL_NODE {
            return;
        }

        let p1 = input.p1;
        let p2 = input.p2;
        let r = (p2 - p1).normalize();
        if r == Vec2Fix::ZERO {
            return;
        }

        // Separating axis of the segment
        let v = Vec2Fix::scalar_cross(Fix64::ONE, r);
        let abs_v = v.abs();

        let mut max_fraction = input.max_fraction;
        let segment_aabb = |max_fraction: Fix64| {
            let t = p1 + (p2 - p1) * max_fraction;
            Aabb::new(p1.min(t), p1.max(t))
        };
        let mut seg = segment_aabb(max_fraction);

        let mut stack = Vec::with_capacity(64);
        stack.push(self.root);

        while let Some(node_id) = stack.pop() {
            let node = &self.nodes[node_id as usize];
            if !node.aabb.overlaps(&seg) {
                continue;
            }

            // |dot(v, p1 - c)| > dot(|v|, h)
            let c = node.aabb.center();
            let h = node.aabb.extents();
            let separation = v.dot(p1 - c).abs() - abs_v.dot(h);
            if separation.is_positive() {
                continue;
            }

            if node.is_leaf() {
                let sub_input = RayCastInput {
                    p1,
                    p2,
                    max_fraction,
                };
                let value = callback(&sub_input, node_id);
                if value.is_zero() {
                    return;
                }
                if value.is_positive() {
                    max_fraction = value;
                    seg = segment_aabb(max_fraction);
                }
            } else {
                stack.push(node.left);
                stack.push(node.right);
            }
        }
    }

    /// Number of live proxies.
    #[inline]
    pub fn proxy_count(&self) -> usize {
        self.proxy_count
    }

    /// Total node count (including internal)
    #[inline]
    pub fn node_count(&self) -> usize {
        self.nodes.len() - self.free_list.len()
    }

    /// Tree height
    pub fn height(&self) -> i32 {
        if self.root == NULL_NODE {
            0
        } else {
            self.nodes[self.root as usize].height
        }
    }

    /// Largest height difference between siblings.
    pub fn max_balance(&self) -> i32 {
        self.nodes
            .iter()
            .filter(|n| n.height > 1)
            .map(|n| (self.nodes[n.right as usize].height - self.nodes[n.left as usize].height).abs())
            .max()
            .unwrap_or(0)
    }

    /// Sum of all node perimeters over the root perimeter; a quality metric.
    pub fn area_ratio(&self) -> Fix64 {
        if self.root == NULL_NODE {
            return Fix64::ZERO;
        }
        let root_area = self.nodes[self.root as usize].aabb.perimeter();
        let total = self
            .nodes
            .iter()
            .filter(|n| n.height >= 0)
            .fold(Fix64::ZERO, |acc, n| acc + n.aabb.perimeter());
        total / root_area
    }

    /// Translate every box by `-new_origin`.
    pub fn shift_origin(&mut self, new_origin: Vec2Fix) {
        for node in &mut self.nodes {
            node.aabb.lower -= new_origin;
            node.aabb.upper -= new_origin;
        }
    }

    /// Check structure, heights and bounds. Returns a description of the first fault.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.root != NULL_NODE && self.nodes[self.root as usize].parent != NULL_NODE {
            return Err("root has a parent");
        }
        self.validate_node(self.root)?;
        let live = self.nodes.iter().filter(|n| n.height >= 0).count();
        if live + self.free_list.len() != self.nodes.len() {
            return Err("free list does not account for every dead node");
        }
        Ok(())
    }

    fn validate_node(&self, index: u32) -> Result<(), &'static str> {
        if index == NULL_NODE {
            return Ok(());
        }
        let node = &self.nodes[index as usize];
        if node.is_leaf() {
            if node.right != NULL_NODE || node.height != 0 || node.user_data.is_none() {
                return Err("malformed leaf");
            }
            return Ok(());
        }
        let (l, r) = (node.left, node.right);
        if self.nodes[l as usize].parent != index || self.nodes[r as usize].parent != index {
            return Err("child does not point back to its parent");
        }
        let height = 1 + self.nodes[l as usize].height.max(self.nodes[r as usize].height);
        if node.height != height {
            return Err("stale height");
        }
        let bound = self.nodes[l as usize].aabb.combine(&self.nodes[r as usize].aabb);
        if bound != node.aabb {
            return Err("stale bounds");
        }
        self.validate_node(l)?;
        self.validate_node(r)
    }

    // =========== Internal methods ===========

    fn alloc_node(&mut self) -> u32 {
        if let Some(id) = self.free_list.pop() {
            self.nodes[id as usize] = TreeNode::empty();
            id
        } else {
            let id = self.nodes.len() as u32;
            self.nodes.push(TreeNode::empty());
            id
        }
    }

    fn free_node(&mut self, node_id: u32) {
        self.nodes[node_id as usize] = TreeNode::empty();
        self.free_list.push(node_id);
    }

    fn insert_leaf(&mut self, leaf: u32) {
        if self.root == NULL_NODE {
            self.root = leaf;
            self.nodes[leaf as usize].parent = NULL_NODE;
            return;
        }

        // Find best sibling by branch and bound on perimeter cost
        let leaf_aabb = self.nodes[leaf as usize].aabb;
        let mut sibling = self.root;

        while !self.nodes[sibling as usize].is_leaf() {
            let left = self.nodes[sibling as usize].left;
            let right = self.nodes[sibling as usize].right;

            let area = self.nodes[sibling as usize].aabb.perimeter();
            let combined_area = leaf_aabb.combine(&self.nodes[sibling as usize].aabb).perimeter();

            // Cost of creating a new parent for this node and the new leaf
            let cost = combined_area.double();
            // Minimum cost of pushing the leaf further down the tree
            let inheritance_cost = (combined_area - area).double();

            let cost_left = self.child_insertion_cost(left, &leaf_aabb, inheritance_cost);
            let cost_right = self.child_insertion_cost(right, &leaf_aabb, inheritance_cost);

            if cost < cost_left && cost < cost_right {
                break;
            }

            sibling = if cost_left < cost_right { left } else { right };
        }

        // Create new parent
        let old_parent = self.nodes[sibling as usize].parent;
        let new_parent = self.alloc_node();
        {
            let sibling_node = &self.nodes[sibling as usize];
            let aabb = leaf_aabb.combine(&sibling_node.aabb);
            let height = sibling_node.height + 1;
            let parent = &mut self.nodes[new_parent as usize];
            parent.parent = old_parent;
            parent.aabb = aabb;
            parent.height = height;
            parent.left = sibling;
            parent.right = leaf;
        }

        if old_parent != NULL_NODE {
            if self.nodes[old_parent as usize].left == sibling {
                self.nodes[old_parent as usize].left = new_parent;
            } else {
                self.nodes[old_parent as usize].right = new_parent;
            }
        } else {
            self.root = new_parent;
        }

        self.nodes[sibling as usize].parent = new_parent;
        self.nodes[leaf as usize].parent = new_parent;

        // Walk up and fix heights + AABBs + balance
        self.fix_upwards(new_parent);
    }

    fn child_insertion_cost(&self, child: u32, leaf_aabb: &Aabb, inheritance: Fix64) -> Fix64 {
        let node = &self.nodes[child as usize];
        let combined = leaf_aabb.combine(&node.aabb);
        if node.is_leaf() {
            combined.perimeter() + inheritance
        } else {
            (combined.perimeter() - node.aabb.perimeter()) + inheritance
        }
    }

    fn remove_leaf(&mut self, leaf: u32) {
        if leaf == self.root {
            self.root = NULL_NODE;
            return;
        }

        let parent = self.nodes[leaf as usize].parent;
        let grand_parent = self.nodes[parent as usize].parent;
        let sibling = if self.nodes[parent as usize].left == leaf {
            self.nodes[parent as usize].right
        } else {
            self.nodes[parent as usize].left
        };

        if grand_parent != NULL_NODE {
            // Reconnect sibling to grandparent
            if self.nodes[grand_parent as usize].left == parent {
                self.nodes[grand_parent as usize].left = sibling;
            } else {
                self.nodes[grand_parent as usize].right = sibling;
            }
            self.nodes[sibling as usize].parent = grand_parent;
            self.free_node(parent);

            self.fix_upwards(grand_parent);
        } else {
            self.root = sibling;
            self.nodes[sibling as usize].parent = NULL_NODE;
            self.free_node(parent);
        }
    }

    fn fix_upwards(&mut self, start: u32) {
        let mut node_id = start;
        while node_id != NULL_NODE {
            node_id = self.balance(node_id);
            self.refit(node_id);
            node_id = self.nodes[node_id as usize].parent;
        }
    }

    fn refit(&mut self, node_id: u32) {
        let left = self.nodes[node_id as usize].left;
        let right = self.nodes[node_id as usize].right;
        let (l, r) = (&self.nodes[left as usize], &self.nodes[right as usize]);
        let height = 1 + l.height.max(r.height);
        let aabb = l.aabb.combine(&r.aabb);
        let node = &mut self.nodes[node_id as usize];
        node.height = height;
        node.aabb = aabb;
    }

    /// AVL-style rotation; returns the index now at this position.
    fn balance(&mut self, a: u32) -> u32 {
        let node = &self.nodes[a as usize];
        if node.is_leaf() || node.height < 2 {
            return a;
        }

        let b = node.left;
        let c = node.right;
        let balance_factor = self.nodes[c as usize].height - self.nodes[b as usize].height;

        if balance_factor > 1 {
            self.rotate_left(a)
        } else if balance_factor < -1 {
            self.rotate_right(a)
        } else {
            a
        }
    }

    /// Lift the right child `c` of `a` into `a`'s place.
    fn rotate_left(&mut self, a: u32) -> u32 {
        let b = self.nodes[a as usize].left;
        let c = self.nodes[a as usize].right;
        let f = self.nodes[c as usize].left;
        let g = self.nodes[c as usize].right;

        // Swap A and C
        let a_parent = self.nodes[a as usize].parent;
        self.nodes[c as usize].left = a;
        self.nodes[c as usize].parent = a_parent;
        self.nodes[a as usize].parent = c;
        self.replace_child(a_parent, a, c);

        // The taller grandchild stays under C
        let (keep, give) = if self.nodes[f as usize].height > self.nodes[g as usize].height {
            (f, g)
        } else {
            (g, f)
        };
        self.nodes[c as usize].right = keep;
        self.nodes[a as usize].right = give;
        self.nodes[give as usize].parent = a;

        self.refit(a);
        self.refit(c);
        c
    }

    /// Lift the left child `b` of `a` into `a`'s place.
    fn rotate_right(&mut self, a: u32) -> u32 {
        let b = self.nodes[a as usize].left;
        let d = self.nodes[b as usize].left;
        let e = self.nodes[b as usize].right;

        // Swap A and B
        let a_parent = self.nodes[a as usize].parent;
        self.nodes[b as usize].left = a;
        self.nodes[b as usize].parent = a_parent;
        self.nodes[a as usize].parent = b;
        self.replace_child(a_parent, a, b);

        // The taller grandchild stays under B
        let (keep, give) = if self.nodes[d as usize].height > self.nodes[e as usize].height {
            (d, e)
        } else {
            (e, d)
        };
        self.nodes[b as usize].right = keep;
        self.nodes[a as usize].left = give;
        self.nodes[give as usize].parent = a;

        self.refit(a);
        self.refit(b);
        b
    }

    fn replace_child(&mut self, parent: u32, old: u32, new: u32) {
        if parent == NULL_NODE {
            self.root = new;
        } else if self.nodes[parent as usize].left == old {
            self.nodes[parent as usize].left = new;
        } else {
            self.nodes[parent as usize].right = new;
        }
    }
}

impl<T: Copy> Default for DynamicTree<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_aabb(x: i64, y: i64) -> Aabb {
        Aabb::new(Vec2Fix::from_int(x, y), Vec2Fix::from_int(x + 1, y + 1))
    }

    fn query_all(tree: &DynamicTree<u32>, aabb: &Aabb) -> Vec<u32> {
        let mut out = Vec::new();
        tree.query(aabb, |id| {
            out.push(tree.user_data(id));
            true
        });
        out.sort_unstable();
        out
    }

    #[test]
    fn test_insert_and_query() {
        let mut tree = DynamicTree::new();
        tree.create_proxy(&make_aabb(0, 0), 0u32);
        tree.create_proxy(&make_aabb(10, 10), 1);
        tree.create_proxy(&make_aabb(20, 20), 2);
        assert_eq!(tree.proxy_count(), 3);

        let near = query_all(&tree, &make_aabb(-1, -1));
        assert_eq!(near, vec![0]);

        let all = query_all(
            &tree,
            &Aabb::new(Vec2Fix::from_int(-100, -100), Vec2Fix::from_int(100, 100)),
        );
        assert_eq!(all, vec![0, 1, 2]);
        assert_eq!(tree.validate(), Ok(()));
    }

    #[test]
    fn test_destroy() {
        let mut tree = DynamicTree::new();
        tree.create_proxy(&make_aabb(0, 0), 0u32);
        let p1 = tree.create_proxy(&make_aabb(5, 5), 1);
        tree.create_proxy(&make_aabb(10, 10), 2);
        tree.destroy_proxy(p1);
        assert_eq!(tree.proxy_count(), 2);
        let all = query_all(
            &tree,
            &Aabb::new(Vec2Fix::from_int(-100, -100), Vec2Fix::from_int(100, 100)),
        );
        assert_eq!(all, vec![0, 2]);
        assert_eq!(tree.validate(), Ok(()));
    }

    #[test]
    fn test_move_within_fat_margin() {
        let mut tree = DynamicTree::new();
        let p0 = tree.create_proxy(&make_aabb(0, 0), 0u32);
        let nudge = Aabb::new(
            Vec2Fix::new(Fix64::from_ratio(1, 20), Fix64::ZERO),
            Vec2Fix::new(Fix64::ONE + Fix64::from_ratio(1, 20), Fix64::ONE),
        );
        assert!(!tree.move_proxy(p0, &nudge, Vec2Fix::ZERO));
    }

    #[test]
    fn test_move_is_predictive() {
        let mut tree = DynamicTree::new();
        let p0 = tree.create_proxy(&make_aabb(0, 0), 0u32);
        assert!(tree.move_proxy(p0, &make_aabb(5, 0), Vec2Fix::from_int(5, 0)));
        let fat = tree.fat_aabb(p0);
        // Stretched forward by twice the displacement, not backward
        assert_eq!(fat.upper.x, Fix64::from_int(16) + AABB_EXTENSION);
        assert_eq!(fat.lower.x, Fix64::from_int(5) - AABB_EXTENSION);
        assert_eq!(query_all(&tree, &make_aabb(14, 0)), vec![0]);
    }

    #[test]
    fn test_query_early_exit() {
        let mut tree = DynamicTree::new();
        for i in 0..10 {
            tree.create_proxy(&make_aabb(0, 0), i as u32);
        }
        let mut visits = 0;
        tree.query(&make_aabb(0, 0), |_| {
            visits += 1;
            visits < 3
        });
        assert_eq!(visits, 3);
    }

    #[test]
    fn test_ray_cast_clips() {
        let mut tree = DynamicTree::new();
        tree.create_proxy(&make_aabb(5, 0), 0u32);
        tree.create_proxy(&make_aabb(10, 0), 1);
        tree.create_proxy(&make_aabb(5, 10), 2);
        let input = RayCastInput {
            p1: Vec2Fix::from_ratio(0, 1, 2),
            p2: Vec2Fix::from_ratio(40, 1, 2),
            max_fraction: Fix64::ONE,
        };
        let mut hits = Vec::new();
        tree.ray_cast(&input, |_, id| {
            hits.push(tree.user_data(id));
            Fix64::NEG_ONE
        });
        hits.sort_unstable();
        assert_eq!(hits, vec![0, 1]);
    }

    #[test]
    fn test_tree_balance() {
        let mut tree = DynamicTree::new();
        for i in 0..100 {
            tree.create_proxy(&make_aabb(i * 3, 0), i as u32);
        }
        assert_eq!(tree.proxy_count(), 100);
        assert!(tree.height() < 16, "height={}", tree.height());
        assert!(tree.max_balance() <= 1);
        assert_eq!(tree.validate(), Ok(()));
        assert!(tree.area_ratio() >= Fix64::ONE);
    }

    #[test]
    fn test_shift_origin() {
        let mut tree = DynamicTree::new();
        let p = tree.create_proxy(&make_aabb(10, 10), 0u32);
        tree.shift_origin(Vec2Fix::from_int(10, 10));
        assert_eq!(query_all(&tree, &make_aabb(0, 0)), vec![0]);
        assert_eq!(tree.fat_aabb(p).lower, Vec2Fix::ZERO - Vec2Fix::new(AABB_EXTENSION, AABB_EXTENSION));
    }

    #[test]
    fn test_empty_tree() {
        let tree: DynamicTree<u32> = DynamicTree::new();
        assert_eq!(tree.proxy_count(), 0);
        assert_eq!(tree.height(), 0);
        assert!(query_all(&tree, &make_aabb(0, 0)).is_empty());
        assert_eq!(tree.validate(), Ok(()));
    }
}
