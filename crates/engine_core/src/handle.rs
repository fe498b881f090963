//! Entity tags and packed handles.
//!
//! Every physics collider carries a packed [`EntityHandle`] in its user
//! data. Reverse lookups resolve through the owning collection, so a stale
//! handle reads back as `None` instead of a dangling pointer.

/// Tag identifying what kind of entity a body or shape belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EntityKind {
    StandardWall = 0,
    BouncyWall = 1,
    DeathWall = 2,
    Pickup = 3,
    Drone = 4,
    Projectile = 5,
}

impl EntityKind {
    pub fn is_wall(self) -> bool {
        matches!(
            self,
            EntityKind::StandardWall | EntityKind::BouncyWall | EntityKind::DeathWall
        )
    }

    fn from_u8(raw: u8) -> Option<Self> {
        Some(match raw {
            0 => EntityKind::StandardWall,
            1 => EntityKind::BouncyWall,
            2 => EntityKind::DeathWall,
            3 => EntityKind::Pickup,
            4 => EntityKind::Drone,
            5 => EntityKind::Projectile,
            _ => return None,
        })
    }
}

/// Reference to an entity: its kind, which collection stores it (walls come
/// in a fixed and a floating variant), and its slot within that collection.
///
/// `generation` disambiguates reused arena slots; entities stored in plain
/// vectors use generation 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityHandle {
    pub kind: EntityKind,
    pub floating: bool,
    pub index: u32,
    pub generation: u32,
}

// Marks user data as holding a packed handle; freshly created colliders
// default to user data 0, which must not decode as a valid handle.
const HANDLE_MARKER: u128 = 1 << 96;

impl EntityHandle {
    pub fn new(kind: EntityKind, index: u32, generation: u32) -> Self {
        Self {
            kind,
            floating: false,
            index,
            generation,
        }
    }

    /// Handle into a plain vector (static walls, drones).
    pub fn fixed(kind: EntityKind, index: u32) -> Self {
        Self::new(kind, index, 0)
    }

    pub fn with_floating(mut self, floating: bool) -> Self {
        self.floating = floating;
        self
    }

    /// Pack into a physics `user_data` word.
    pub fn pack(self) -> u128 {
        HANDLE_MARKER
            | ((self.floating as u128) << 72)
            | ((self.kind as u128) << 64)
            | ((self.generation as u128) << 32)
            | self.index as u128
    }

    /// Decode a `user_data` word; `None` if it never held a handle.
    pub fn unpack(raw: u128) -> Option<Self> {
        if raw & HANDLE_MARKER == 0 {
            return None;
        }
        let kind = EntityKind::from_u8((raw >> 64) as u8)?;
        Some(Self {
            kind,
            floating: (raw >> 72) & 1 == 1,
            index: raw as u32,
            generation: (raw >> 32) as u32,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_roundtrip() {
        let handles = [
            EntityHandle::fixed(EntityKind::StandardWall, 0),
            EntityHandle::fixed(EntityKind::Drone, 3),
            EntityHandle::new(EntityKind::Projectile, 17, 42),
            EntityHandle::new(EntityKind::BouncyWall, 9, 2).with_floating(true),
            EntityHandle::new(EntityKind::Pickup, u32::MAX, u32::MAX),
        ];
        for h in handles {
            assert_eq!(EntityHandle::unpack(h.pack()), Some(h));
        }
    }

    #[test]
    fn default_user_data_is_not_a_handle() {
        assert_eq!(EntityHandle::unpack(0), None);
    }

    #[test]
    fn wall_kinds() {
        assert!(EntityKind::StandardWall.is_wall());
        assert!(EntityKind::BouncyWall.is_wall());
        assert!(EntityKind::DeathWall.is_wall());
        assert!(!EntityKind::Pickup.is_wall());
        assert!(!EntityKind::Drone.is_wall());
        assert!(!EntityKind::Projectile.is_wall());
    }
}
