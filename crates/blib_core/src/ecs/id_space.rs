// id_space.rs - Entity id allocation and recycling
//
// Freed indices are reused FIFO so a just-destroyed handle is not
// immediately aliased by the next create. Each reuse bumps the index's
// version; an index whose version would wrap is retired instead.

use crate::ecs::{Entity, EntityFlags, Version, WorldIndex, MAX_WORLD_INDEX};
use std::collections::VecDeque;

const FIRST_VERSION: Version = 1;

/// Issues unique entity handles and recycles freed index slots.
pub struct EntityIdSpace {
    /// Live occupant per index, `Entity::INVALID` when free.
    live: Vec<Entity>,
    /// Version the next occupant of each index receives.
    next_version: Vec<Version>,
    free: VecDeque<u32>,
    alive_count: usize,
    retired: usize,
}

impl EntityIdSpace {
    pub fn new() -> Self {
        Self {
            live: Vec::new(),
            next_version: Vec::new(),
            free: VecDeque::new(),
            alive_count: 0,
            retired: 0,
        }
    }

    /// Create an entity with no flags in world 0.
    pub fn create(&mut self) -> Entity {
        self.create_with(EntityFlags::NONE, 0)
    }

    /// Create an entity, reusing a freed index when one is available.
    pub fn create_with(&mut self, flags: EntityFlags, world: WorldIndex) -> Entity {
        let world = world.min(MAX_WORLD_INDEX);
        let entity = match self.free.pop_front() {
            Some(index) => {
                let slot = index as usize;
                let entity = Entity::new(index, self.next_version[slot], world, flags);
                self.live[slot] = entity;
                entity
            }
            None => {
                let index = self.live.len() as u32;
                let entity = Entity::new(index, FIRST_VERSION, world, flags);
                self.live.push(entity);
                self.next_version.push(FIRST_VERSION);
                entity
            }
        };
        self.alive_count += 1;
        entity
    }

    /// Release an entity's index for reuse.
    ///
    /// Returns `false` without side effects when `entity` is not the live
    /// occupant of its index (stale or double destroy).
    pub fn destroy(&mut self, entity: Entity) -> bool {
        if !self.is_alive(entity) {
            return false;
        }
        let slot = entity.index() as usize;
        self.live[slot] = Entity::INVALID;
        self.alive_count -= 1;
        match entity.version().checked_add(1) {
            Some(next) => {
                self.next_version[slot] = next;
                self.free.push_back(entity.index());
            }
            None => {
                self.retired += 1;
                tracing::debug!(index = entity.index(), "entity index retired after version exhaustion");
            }
        }
        true
    }

    #[inline]
    pub fn is_alive(&self, entity: Entity) -> bool {
        entity.is_valid()
            && self
                .live
                .get(entity.index() as usize)
                .is_some_and(|live| *live == entity)
    }

    /// Live occupant of an index, if any.
    #[inline]
    pub fn occupant(&self, index: u32) -> Option<Entity> {
        self.live
            .get(index as usize)
            .copied()
            .filter(|e| e.is_valid())
    }

    pub fn len(&self) -> usize {
        self.alive_count
    }

    pub fn is_empty(&self) -> bool {
        self.alive_count == 0
    }

    /// Number of index slots ever allocated (live, free and retired).
    pub fn capacity(&self) -> usize {
        self.live.len()
    }

    pub fn retired(&self) -> usize {
        self.retired
    }

    /// Iterate all live entities in index order.
    pub fn iter(&self) -> impl Iterator<Item = Entity> + '_ {
        self.live.iter().copied().filter(|e| e.is_valid())
    }

    /// Release every live entity, keeping version history intact.
    pub fn clear(&mut self) {
        let live: Vec<Entity> = self.iter().collect();
        for entity in live {
            self.destroy(entity);
        }
    }
}

impl Default for EntityIdSpace {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::DeterministicRng;
    use std::collections::HashSet;

    #[test]
    fn reused_index_gets_greater_version() {
        let mut ids = EntityIdSpace::new();
        let a = ids.create();
        assert!(ids.destroy(a));
        let b = ids.create();

        assert_eq!(a.index(), b.index());
        assert!(b.version() > a.version());
        assert!(!ids.is_alive(a));
        assert!(ids.is_alive(b));
    }

    #[test]
    fn double_destroy_is_noop() {
        let mut ids = EntityIdSpace::new();
        let a = ids.create();
        assert!(ids.destroy(a));
        let b = ids.create();
        assert!(!ids.destroy(a));
        assert!(ids.is_alive(b));
        assert_eq!(ids.len(), 1);
    }

    #[test]
    fn invalid_is_never_alive() {
        let mut ids = EntityIdSpace::new();
        ids.create();
        assert!(!ids.is_alive(Entity::INVALID));
        assert!(!ids.destroy(Entity::INVALID));
    }

    #[test]
    fn exhausted_index_is_retired() {
        let mut ids = EntityIdSpace::new();
        let first = ids.create();
        ids.destroy(first);
        ids.next_version[first.index() as usize] = Version::MAX;

        let last = ids.create();
        assert_eq!(last.version(), Version::MAX);
        assert!(ids.destroy(last));
        assert_eq!(ids.retired(), 1);

        let fresh = ids.create();
        assert_ne!(fresh.index(), first.index());
    }

    #[test]
    fn random_sequences_keep_live_entities_unique() {
        let mut rng = DeterministicRng::new(0xB11B);
        let mut ids = EntityIdSpace::new();
        let mut live: Vec<Entity> = Vec::new();
        let mut last_version: Vec<Version> = Vec::new();

        for _ in 0..2_000 {
            if live.is_empty() || rng.next_u32() % 3 != 0 {
                let e = ids.create();
                let slot = e.index() as usize;
                if slot >= last_version.len() {
                    last_version.resize(slot + 1, 0);
                }
                assert!(e.version() > last_version[slot]);
                last_version[slot] = e.version();
                live.push(e);
            } else {
                let pick = rng.next_u32() as usize % live.len();
                let e = live.swap_remove(pick);
                assert!(ids.destroy(e));
            }

            let unique: HashSet<Entity> = live.iter().copied().collect();
            assert_eq!(unique.len(), live.len());
        }
        assert_eq!(ids.len(), live.len());
    }
}
