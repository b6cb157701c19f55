use blib_core::ecs::Entity;

/// Fixed-capacity pool of object slots with a LIFO free list.
///
/// Releasing a free slot is a no-op, so release paths may run twice for
/// the same object.
#[derive(Debug, Clone)]
pub struct SlotPool {
    capacity: u32,
    occupants: Vec<Entity>,
    free: Vec<u32>,
}

impl SlotPool {
    pub fn new(capacity: u32) -> Self {
        Self {
            capacity,
            occupants: Vec::new(),
            free: Vec::new(),
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Occupied slots.
    pub fn len(&self) -> usize {
        self.occupants.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity as usize
    }

    /// One past the highest slot ever handed out.
    pub fn high_water(&self) -> u32 {
        self.occupants.len() as u32
    }

    pub fn allocate(&mut self, entity: Entity) -> Option<u32> {
        if let Some(slot) = self.free.pop() {
            self.occupants[slot as usize] = entity;
            return Some(slot);
        }
        if self.occupants.len() >= self.capacity as usize {
            return None;
        }
        self.occupants.push(entity);
        Some(self.occupants.len() as u32 - 1)
    }

    /// Free `slot`, returning its previous occupant.
    pub fn release(&mut self, slot: u32) -> Option<Entity> {
        let occupant = self.occupants.get_mut(slot as usize)?;
        if *occupant == Entity::INVALID {
            return None;
        }
        let entity = std::mem::replace(occupant, Entity::INVALID);
        self.free.push(slot);
        Some(entity)
    }

    pub fn occupant(&self, slot: u32) -> Option<Entity> {
        self.occupants
            .get(slot as usize)
            .copied()
            .filter(|e| *e != Entity::INVALID)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, Entity)> + '_ {
        self.occupants
            .iter()
            .enumerate()
            .filter(|(_, e)| **e != Entity::INVALID)
            .map(|(slot, e)| (slot as u32, *e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blib_core::ecs::Registry;

    #[test]
    fn full_pool_rejects_without_touching_slots() {
        let mut registry = Registry::new();
        let a = registry.create_entity();
        let b = registry.create_entity();
        let c = registry.create_entity();

        let mut pool = SlotPool::new(2);
        assert_eq!(pool.allocate(a), Some(0));
        assert_eq!(pool.allocate(b), Some(1));
        assert!(pool.is_full());
        assert_eq!(pool.allocate(c), None);
        assert_eq!(pool.occupant(0), Some(a));
        assert_eq!(pool.occupant(1), Some(b));
    }

    #[test]
    fn release_is_idempotent_and_slots_are_reused() {
        let mut registry = Registry::new();
        let a = registry.create_entity();
        let b = registry.create_entity();

        let mut pool = SlotPool::new(4);
        let slot = pool.allocate(a).unwrap();
        assert_eq!(pool.release(slot), Some(a));
        assert_eq!(pool.release(slot), None);
        assert_eq!(pool.release(99), None);
        assert_eq!(pool.len(), 0);
        assert_eq!(pool.allocate(b), Some(slot));
        assert_eq!(pool.iter().collect::<Vec<_>>(), vec![(slot, b)]);
    }
}
