// pool.rs - Sparse/dense storage for a single component type
//
// Components live packed in `dense`; `sparse` maps entity index to the
// dense slot. Removal swap-removes, so references into a pool are only
// valid until its next structural change (enforced by the borrow checker
// at the public API).

use crate::ecs::{Component, ComponentId, EcsError, Entity};
use rayon::prelude::*;
use std::any::Any;

const NO_SLOT: u32 = u32::MAX;

/// Storage for every instance of one component type.
pub struct ComponentPool<T> {
    id: ComponentId,
    dense: Vec<T>,
    owners: Vec<Entity>,
    sparse: Vec<u32>,
}

impl<T: Component> ComponentPool<T> {
    pub(crate) fn new(id: ComponentId) -> Self {
        Self {
            id,
            dense: Vec::new(),
            owners: Vec::new(),
            sparse: Vec::new(),
        }
    }

    #[inline]
    pub fn id(&self) -> ComponentId {
        self.id
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.dense.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.dense.is_empty()
    }

    #[inline]
    fn slot_of(&self, entity: Entity) -> Option<usize> {
        let slot = *self.sparse.get(entity.index() as usize)?;
        if slot == NO_SLOT {
            return None;
        }
        let slot = slot as usize;
        (self.owners[slot] == entity).then_some(slot)
    }

    #[inline]
    pub fn contains(&self, entity: Entity) -> bool {
        self.slot_of(entity).is_some()
    }

    /// Insert a component for `entity`. Fails if one already exists.
    pub(crate) fn emplace(&mut self, entity: Entity, value: T) -> Result<&mut T, EcsError> {
        let index = entity.index() as usize;
        if index >= self.sparse.len() {
            self.sparse.resize(index + 1, NO_SLOT);
        }
        let existing = self.sparse[index];
        if existing != NO_SLOT {
            let owner = self.owners[existing as usize];
            if owner == entity {
                return Err(EcsError::DuplicateComponent {
                    entity,
                    component: T::NAME,
                });
            }
            // Leftover from a previous occupant of this index. The registry
            // clears pools on destruction, so only direct pool use gets here.
            tracing::warn!(component = T::NAME, stale = ?owner, ?entity, "replacing stale pool entry");
            self.remove(owner);
        }

        let slot = self.dense.len();
        self.dense.push(value);
        self.owners.push(entity);
        self.sparse[index] = slot as u32;
        Ok(&mut self.dense[slot])
    }

    /// Remove and return the component owned by `entity`.
    pub(crate) fn remove(&mut self, entity: Entity) -> Option<T> {
        let slot = self.slot_of(entity)?;
        let last = self.dense.len() - 1;
        if slot != last {
            let moved = self.owners[last];
            self.sparse[moved.index() as usize] = slot as u32;
        }
        self.sparse[entity.index() as usize] = NO_SLOT;
        self.owners.swap_remove(slot);
        Some(self.dense.swap_remove(slot))
    }

    #[inline]
    pub fn get(&self, entity: Entity) -> Option<&T> {
        self.slot_of(entity).map(|slot| &self.dense[slot])
    }

    #[inline]
    pub fn get_mut(&mut self, entity: Entity) -> Option<&mut T> {
        self.slot_of(entity).map(move |slot| &mut self.dense[slot])
    }

    /// Entities owning a component, in storage order.
    pub fn entities(&self) -> &[Entity] {
        &self.owners
    }

    pub fn iter(&self) -> impl Iterator<Item = (Entity, &T)> {
        self.owners.iter().copied().zip(self.dense.iter())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Entity, &mut T)> {
        self.owners.iter().copied().zip(self.dense.iter_mut())
    }

    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(Entity, &T),
    {
        for (entity, component) in self.iter() {
            f(entity, component);
        }
    }

    /// Visit every component from the rayon pool. Read-only.
    pub fn par_for_each<F>(&self, f: F)
    where
        F: Fn(Entity, &T) + Send + Sync,
    {
        self.owners
            .par_iter()
            .zip(self.dense.par_iter())
            .for_each(|(entity, component)| f(*entity, component));
    }

    /// Mutable parallel visit; structural changes are impossible while borrowed.
    pub fn par_for_each_mut<F>(&mut self, f: F)
    where
        F: Fn(Entity, &mut T) + Send + Sync,
    {
        self.owners
            .par_iter()
            .zip(self.dense.par_iter_mut())
            .for_each(|(entity, component)| f(*entity, component));
    }

    pub(crate) fn clear_all(&mut self) {
        self.dense.clear();
        self.owners.clear();
        self.sparse.clear();
    }
}

/// Type-erased pool interface used by the registry for cross-type operations.
pub(crate) trait ErasedPool: Send + Sync {
    fn id(&self) -> ComponentId;
    fn name(&self) -> &'static str;
    fn contains(&self, entity: Entity) -> bool;
    fn remove_erased(&mut self, entity: Entity) -> bool;
    fn clear(&mut self);
    fn len(&self) -> usize;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Component> ErasedPool for ComponentPool<T> {
    fn id(&self) -> ComponentId {
        self.id
    }

    fn name(&self) -> &'static str {
        T::NAME
    }

    fn contains(&self, entity: Entity) -> bool {
        ComponentPool::contains(self, entity)
    }

    fn remove_erased(&mut self, entity: Entity) -> bool {
        self.remove(entity).is_some()
    }

    fn clear(&mut self) {
        self.clear_all();
    }

    fn len(&self) -> usize {
        self.dense.len()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::EntityFlags;
    use std::sync::atomic::{AtomicI32, Ordering};

    #[derive(Debug, PartialEq)]
    struct Health(i32);
    crate::define_component!(Health);

    fn entity(index: u32, version: u16) -> Entity {
        Entity::new(index, version, 0, EntityFlags::NONE)
    }

    #[test]
    fn emplace_get_remove() {
        let mut pool = ComponentPool::<Health>::new(0);
        let a = entity(3, 1);
        pool.emplace(a, Health(10)).unwrap();

        assert_eq!(pool.get(a), Some(&Health(10)));
        pool.get_mut(a).unwrap().0 = 11;
        assert_eq!(pool.remove(a), Some(Health(11)));
        assert!(pool.get(a).is_none());
        assert!(pool.is_empty());
    }

    #[test]
    fn duplicate_emplace_is_rejected() {
        let mut pool = ComponentPool::<Health>::new(0);
        let a = entity(0, 1);
        pool.emplace(a, Health(1)).unwrap();
        let err = pool.emplace(a, Health(2)).unwrap_err();
        assert_eq!(
            err,
            EcsError::DuplicateComponent {
                entity: a,
                component: "Health"
            }
        );
        assert_eq!(pool.get(a), Some(&Health(1)));
    }

    #[test]
    fn stale_version_does_not_resolve() {
        let mut pool = ComponentPool::<Health>::new(0);
        pool.emplace(entity(5, 2), Health(1)).unwrap();
        assert!(pool.get(entity(5, 1)).is_none());
        assert!(pool.remove(entity(5, 3)).is_none());
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn newer_occupant_replaces_stale_entry() {
        let mut pool = ComponentPool::<Health>::new(0);
        pool.emplace(entity(4, 1), Health(1)).unwrap();
        pool.emplace(entity(4, 2), Health(2)).unwrap();
        assert!(pool.get(entity(4, 1)).is_none());
        assert_eq!(pool.get(entity(4, 2)), Some(&Health(2)));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn swap_remove_keeps_lookups_consistent() {
        let mut pool = ComponentPool::<Health>::new(0);
        let es: Vec<Entity> = (0..5).map(|i| entity(i, 1)).collect();
        for (i, e) in es.iter().enumerate() {
            pool.emplace(*e, Health(i as i32)).unwrap();
        }
        pool.remove(es[1]);
        pool.remove(es[0]);

        for (i, e) in es.iter().enumerate().skip(2) {
            assert_eq!(pool.get(*e), Some(&Health(i as i32)));
        }
        assert_eq!(pool.len(), 3);
    }

    #[test]
    fn parallel_visit_sees_every_component() {
        let mut pool = ComponentPool::<Health>::new(0);
        for i in 0..100 {
            pool.emplace(entity(i, 1), Health(1)).unwrap();
        }
        let sum = AtomicI32::new(0);
        pool.par_for_each(|_, h| {
            sum.fetch_add(h.0, Ordering::Relaxed);
        });
        assert_eq!(sum.load(Ordering::Relaxed), 100);

        pool.par_for_each_mut(|_, h| h.0 *= 2);
        assert!(pool.iter().all(|(_, h)| h.0 == 2));
    }
}
