//! Shape categories and interaction filters.

use rapier2d::prelude::{Group, InteractionGroups};

/// Category bit set on each entity's collider; controls which entities can
/// collide with each other.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeCategory {
    /// Static arena walls
    Wall = 1 << 0,
    /// Dynamic (movable) walls
    FloatingWall = 1 << 1,
    /// Projectiles and their proximity sensors
    Projectile = 1 << 2,
    /// Weapon pickup sensors
    WeaponPickup = 1 << 3,
    /// Agent-controlled drones
    Drone = 1 << 4,
}

impl ShapeCategory {
    pub fn bit(self) -> u32 {
        self as u32
    }
}

/// Build rapier interaction groups from a category bit and a mask of
/// category bits.
pub fn interaction_groups(category: u32, mask: u32) -> InteractionGroups {
    InteractionGroups::new(
        Group::from_bits_truncate(category),
        Group::from_bits_truncate(mask),
    )
}

/// The two-way category/mask test rapier applies between a query filter and
/// a collider, exposed for the manual overlap walks.
pub fn groups_pass(query: InteractionGroups, collider: InteractionGroups) -> bool {
    query.test(collider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_are_distinct_bits() {
        let bits = [
            ShapeCategory::Wall.bit(),
            ShapeCategory::FloatingWall.bit(),
            ShapeCategory::Projectile.bit(),
            ShapeCategory::WeaponPickup.bit(),
            ShapeCategory::Drone.bit(),
        ];
        let mut combined = 0;
        for b in bits {
            assert_eq!(combined & b, 0, "category bits overlap");
            combined |= b;
        }
    }

    #[test]
    fn group_test_is_two_way() {
        // A projectile proximity sensor is category Projectile but only
        // masks drones, so a projectile-vs-projectile query must not see it.
        let query = interaction_groups(
            ShapeCategory::Projectile.bit(),
            ShapeCategory::Projectile.bit() | ShapeCategory::Drone.bit(),
        );
        let sensor = interaction_groups(ShapeCategory::Projectile.bit(), ShapeCategory::Drone.bit());
        let drone = interaction_groups(
            ShapeCategory::Drone.bit(),
            ShapeCategory::Wall.bit() | ShapeCategory::Projectile.bit() | ShapeCategory::Drone.bit(),
        );
        assert!(!groups_pass(query, sensor));
        assert!(groups_pass(query, drone));
    }
}
