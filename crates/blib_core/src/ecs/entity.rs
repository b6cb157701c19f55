//! Entity handle with versioned index
//!
//! Entities are lightweight 8-byte handles. The version counter makes a
//! handle to a destroyed entity compare unequal to whatever later occupies
//! the same index.

use std::fmt;

/// Version counter stored in the upper 16 bits of an [`Entity`].
pub type Version = u16;

/// Index of the simulation world an entity belongs to (3 bits).
pub type WorldIndex = u8;

/// Entity handle (version-indexed for safety)
///
/// Format (low to high bits):
/// - `0..32`  index into per-entity tables
/// - `32..35` world index
/// - `40..48` [`EntityFlags`]
/// - `48..64` version
///
/// Example:
/// ```ignore
/// let entity = registry.create_entity();
/// registry.destroy_entity(entity)?;
/// assert!(!registry.entity_exists(entity)); // version mismatch
/// ```
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Entity(u64);

const INDEX_MASK: u64 = 0xFFFF_FFFF;
const WORLD_SHIFT: u32 = 32;
const WORLD_MASK: u64 = 0b111;
const FLAGS_SHIFT: u32 = 40;
const FLAGS_MASK: u64 = 0xFF;
const VERSION_SHIFT: u32 = 48;

/// Highest world index encodable in an entity handle.
pub const MAX_WORLD_INDEX: WorldIndex = WORLD_MASK as WorldIndex;

impl Entity {
    /// Sentinel that never compares equal to a live entity.
    pub const INVALID: Entity = Entity(u64::MAX);

    pub(crate) const fn new(
        index: u32,
        version: Version,
        world: WorldIndex,
        flags: EntityFlags,
    ) -> Self {
        Self(
            (index as u64)
                | (((world as u64) & WORLD_MASK) << WORLD_SHIFT)
                | ((flags.bits() as u64) << FLAGS_SHIFT)
                | ((version as u64) << VERSION_SHIFT),
        )
    }

    #[inline]
    pub fn index(self) -> u32 {
        (self.0 & INDEX_MASK) as u32
    }

    #[inline]
    pub fn version(self) -> Version {
        (self.0 >> VERSION_SHIFT) as Version
    }

    #[inline]
    pub fn world(self) -> WorldIndex {
        ((self.0 >> WORLD_SHIFT) & WORLD_MASK) as WorldIndex
    }

    #[inline]
    pub fn flags(self) -> EntityFlags {
        EntityFlags::from_bits(((self.0 >> FLAGS_SHIFT) & FLAGS_MASK) as u8)
    }

    #[inline]
    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }

    /// Serialize to 64-bit integer (for save files and debugging)
    pub fn to_bits(self) -> u64 {
        self.0
    }

    /// Deserialize from 64-bit integer
    pub fn from_bits(bits: u64) -> Self {
        Self(bits)
    }
}

impl Default for Entity {
    fn default() -> Self {
        Self::INVALID
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_valid() {
            return f.write_str("Entity(INVALID)");
        }
        write!(f, "Entity({}v{}", self.index(), self.version())?;
        if self.world() != 0 {
            write!(f, " w{}", self.world())?;
        }
        if !self.flags().is_empty() {
            write!(f, " {:?}", self.flags())?;
        }
        f.write_str(")")
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index(), self.version())
    }
}

/// Classification bits carried inside every entity handle.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct EntityFlags(u8);

impl EntityFlags {
    pub const NONE: EntityFlags = EntityFlags(0);
    /// Entity belongs to a simulation world and is cleaned up with it.
    pub const WORLD_OBJECT: EntityFlags = EntityFlags(1 << 0);
    /// Entity is short-lived (particles, effects) and safe to purge in bulk.
    pub const TRANSIENT: EntityFlags = EntityFlags(1 << 1);
    /// First bit available for game-defined flags.
    pub const USER: EntityFlags = EntityFlags(1 << 4);

    #[inline]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    #[inline]
    pub const fn bits(self) -> u8 {
        self.0
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True if every bit in `other` is set.
    #[inline]
    pub const fn contains(self, other: EntityFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// True if any bit in `other` is set.
    #[inline]
    pub const fn intersects(self, other: EntityFlags) -> bool {
        self.0 & other.0 != 0
    }
}

impl std::ops::BitOr for EntityFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for EntityFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for EntityFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityFlags({:#010b})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_layout_round_trips_fields() {
        let flags = EntityFlags::WORLD_OBJECT | EntityFlags::TRANSIENT;
        let entity = Entity::new(123_456, 42, 5, flags);

        assert_eq!(entity.index(), 123_456);
        assert_eq!(entity.version(), 42);
        assert_eq!(entity.world(), 5);
        assert_eq!(entity.flags(), flags);
        assert_eq!(Entity::from_bits(entity.to_bits()), entity);
    }

    #[test]
    fn invalid_is_distinct_from_every_constructible_entity() {
        let max = Entity::new(u32::MAX, Version::MAX - 1, MAX_WORLD_INDEX, EntityFlags::NONE);
        assert_ne!(max, Entity::INVALID);
        assert!(!Entity::INVALID.is_valid());
        assert_eq!(Entity::default(), Entity::INVALID);
    }

    #[test]
    fn versions_distinguish_same_index() {
        let a = Entity::new(7, 1, 0, EntityFlags::NONE);
        let b = Entity::new(7, 2, 0, EntityFlags::NONE);
        assert_ne!(a, b);
        assert_eq!(a.index(), b.index());
    }

    #[test]
    fn flag_queries() {
        let flags = EntityFlags::WORLD_OBJECT | EntityFlags::USER;
        assert!(flags.contains(EntityFlags::WORLD_OBJECT));
        assert!(!flags.contains(EntityFlags::TRANSIENT));
        assert!(flags.intersects(EntityFlags::TRANSIENT | EntityFlags::USER));
        assert!(EntityFlags::NONE.is_empty());
    }
}
