//! Collision Filtering (Category/Mask/Group)
//!
//! Bitmask-based collision filtering for controlling which fixtures can touch.
//!
//! # Usage
//!
//! ```ignore
//! use alice_physics2d::filter::{categories, Filter};
//!
//! let player = Filter::new(categories::PLAYER, categories::ENEMY | categories::STATIC);
//! let enemy  = Filter::new(categories::ENEMY, categories::PLAYER | categories::STATIC);
//! let ragdoll_part = Filter::DEFAULT.with_group(-1); // parts of one ragdoll never touch
//! ```

/// Collision filter data of a fixture.
///
/// Two fixtures in the same non-zero group always collide (positive group)
/// or never collide (negative group). Otherwise they collide iff
/// `(a.category & b.mask) != 0 && (b.category & a.mask) != 0`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Filter {
    /// Which categories this fixture belongs to
    pub category_bits: u16,
    /// Which categories this fixture accepts
    pub mask_bits: u16,
    /// Group override (zero means none)
    pub group_index: i16,
}

impl Filter {
    /// Default filter: category 1, collides with everything
    pub const DEFAULT: Self = Self {
        category_bits: 0x0001,
        mask_bits: 0xFFFF,
        group_index: 0,
    };

    /// Filter that collides with nothing
    pub const NONE: Self = Self {
        category_bits: 0,
        mask_bits: 0,
        group_index: 0,
    };

    /// Create a new filter
    #[inline]
    pub const fn new(category_bits: u16, mask_bits: u16) -> Self {
        Self {
            category_bits,
            mask_bits,
            group_index: 0,
        }
    }

    /// Set the group index
    #[inline]
    #[must_use]
    pub const fn with_group(mut self, group_index: i16) -> Self {
        self.group_index = group_index;
        self
    }

    /// Check if two filters allow collision
    #[inline]
    pub fn should_collide(a: &Self, b: &Self) -> bool {
        if a.group_index == b.group_index && a.group_index != 0 {
            return a.group_index > 0;
        }
        (a.mask_bits & b.category_bits) != 0 && (a.category_bits & b.mask_bits) != 0
    }
}

impl Default for Filter {
    #[inline]
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Predefined categories for common game setups
pub mod categories {
    /// Default category
    pub const DEFAULT: u16 = 1 << 0;
    /// Static geometry
    pub const STATIC: u16 = 1 << 1;
    /// Player
    pub const PLAYER: u16 = 1 << 2;
    /// Enemy
    pub const ENEMY: u16 = 1 << 3;
    /// Projectile
    pub const PROJECTILE: u16 = 1 << 4;
    /// Sensor volumes
    pub const SENSOR: u16 = 1 << 5;
    /// Debris
    pub const DEBRIS: u16 = 1 << 6;
    /// All categories combined
    pub const ALL: u16 = u16::MAX;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter() {
        assert!(Filter::should_collide(&Filter::DEFAULT, &Filter::DEFAULT));
    }

    #[test]
    fn test_none_filter() {
        assert!(!Filter::should_collide(&Filter::NONE, &Filter::DEFAULT));
    }

    #[test]
    fn test_category_mask() {
        let player = Filter::new(categories::PLAYER, categories::ENEMY | categories::STATIC);
        let enemy = Filter::new(categories::ENEMY, categories::PLAYER | categories::STATIC);
        let debris = Filter::new(categories::DEBRIS, categories::STATIC);
        let wall = Filter::new(categories::STATIC, categories::ALL);

        assert!(Filter::should_collide(&player, &enemy));
        assert!(Filter::should_collide(&player, &wall));
        assert!(Filter::should_collide(&debris, &wall));
        assert!(!Filter::should_collide(&player, &debris));
    }

    #[test]
    fn test_one_way_mask() {
        let a = Filter::new(1 << 0, 1 << 1);
        let b = Filter::new(1 << 1, 0);
        assert!(!Filter::should_collide(&a, &b));
        assert!(!Filter::should_collide(&b, &a));
    }

    #[test]
    fn test_negative_group_never_collides() {
        let a = Filter::DEFAULT.with_group(-3);
        let b = Filter::DEFAULT.with_group(-3);
        let c = Filter::DEFAULT.with_group(-4);
        assert!(!Filter::should_collide(&a, &b));
        assert!(Filter::should_collide(&a, &c));
    }

    #[test]
    fn test_positive_group_overrides_mask() {
        let a = Filter::NONE.with_group(2);
        let b = Filter::NONE.with_group(2);
        assert!(Filter::should_collide(&a, &b));
        assert!(!Filter::should_collide(&a, &Filter::NONE.with_group(1)));
    }
}
