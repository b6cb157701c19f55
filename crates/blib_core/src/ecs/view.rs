// view.rs - Cached, incrementally maintained query results
//
// A view holds the entities matching one ComponentMask. The registry
// patches it on every structural change touching a type in the mask.
// While a view is being iterated, patches are queued and re-tested
// against the entity's current component set when iteration ends.
// Removal swap-removes, so result order is not stable.

use crate::ecs::{ComponentBits, ComponentMask, Entity};
use std::fmt;

const NOT_PRESENT: u32 = u32::MAX;

/// Handle to a view owned by a [`Registry`](crate::ecs::Registry).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ViewId(u32);

impl ViewId {
    pub(crate) fn new(index: u32) -> Self {
        Self(index)
    }

    #[inline]
    pub fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub struct View {
    mask: ComponentMask,
    results: Vec<Entity>,
    entity_to_index: Vec<u32>,
    pending: Vec<Entity>,
    iteration_depth: u32,
    rebuild_pending: bool,
}

impl View {
    pub(crate) fn new(mask: ComponentMask) -> Self {
        Self {
            mask,
            results: Vec::with_capacity(256),
            entity_to_index: Vec::new(),
            pending: Vec::new(),
            iteration_depth: 0,
            rebuild_pending: false,
        }
    }

    #[inline]
    pub fn mask(&self) -> &ComponentMask {
        &self.mask
    }

    /// Matching entities as of the last flush.
    #[inline]
    pub fn entities(&self) -> &[Entity] {
        &self.results
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn contains(&self, entity: Entity) -> bool {
        match self.entity_to_index.get(entity.index() as usize) {
            Some(&i) if i != NOT_PRESENT => self.results[i as usize] == entity,
            _ => false,
        }
    }

    #[inline]
    pub fn is_iterating(&self) -> bool {
        self.iteration_depth > 0
    }

    /// Queued structural changes not yet applied.
    #[inline]
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty() || self.rebuild_pending
    }

    /// Entity gained a relevant component (or lost an excluded one).
    pub(crate) fn try_add(&mut self, entity: Entity, bits: &ComponentBits) {
        if self.is_iterating() {
            self.pending.push(entity);
        } else if self.mask.passes(bits) {
            self.insert(entity);
        }
    }

    /// Entity lost a required component, gained an excluded one, or died.
    pub(crate) fn remove_entity(&mut self, entity: Entity) {
        if self.is_iterating() {
            self.pending.push(entity);
        } else {
            self.erase(entity);
        }
    }

    pub(crate) fn begin_iteration(&mut self) {
        self.iteration_depth += 1;
    }

    /// Returns `true` once the outermost iteration has ended.
    pub(crate) fn end_iteration(&mut self) -> bool {
        self.iteration_depth = self.iteration_depth.saturating_sub(1);
        self.iteration_depth == 0
    }

    pub(crate) fn request_rebuild(&mut self) {
        self.rebuild_pending = true;
    }

    #[inline]
    pub(crate) fn rebuild_requested(&self) -> bool {
        self.rebuild_pending
    }

    /// Apply queued changes. `current` returns the live component set of an
    /// entity, or `None` if it no longer exists.
    pub(crate) fn flush<F>(&mut self, current: F)
    where
        F: Fn(Entity) -> Option<ComponentBits>,
    {
        if self.is_iterating() {
            return;
        }
        let pending = std::mem::take(&mut self.pending);
        for entity in pending.iter().copied() {
            match current(entity) {
                Some(bits) if self.mask.passes(&bits) => self.insert(entity),
                _ => self.erase(entity),
            }
        }
        // Reuse the allocation.
        self.pending = pending;
        self.pending.clear();
    }

    /// Drop all results and repopulate from a full scan.
    pub(crate) fn clear_and_refresh<I>(&mut self, entities: I)
    where
        I: IntoIterator<Item = (Entity, ComponentBits)>,
    {
        self.results.clear();
        self.entity_to_index.fill(NOT_PRESENT);
        self.pending.clear();
        self.rebuild_pending = false;
        for (entity, bits) in entities {
            if self.mask.passes(&bits) {
                self.insert(entity);
            }
        }
    }

    fn insert(&mut self, entity: Entity) {
        let slot = entity.index() as usize;
        if slot >= self.entity_to_index.len() {
            self.entity_to_index.resize(slot + 1, NOT_PRESENT);
        }
        let existing = self.entity_to_index[slot];
        if existing != NOT_PRESENT {
            let occupant = self.results[existing as usize];
            if occupant == entity {
                return;
            }
            self.erase(occupant);
        }
        self.entity_to_index[slot] = self.results.len() as u32;
        self.results.push(entity);
    }

    fn erase(&mut self, entity: Entity) {
        let slot = entity.index() as usize;
        let Some(&index) = self.entity_to_index.get(slot) else {
            return;
        };
        if index == NOT_PRESENT || self.results[index as usize] != entity {
            return;
        }
        let index = index as usize;
        let last = self.results.len() - 1;
        if index != last {
            let moved = self.results[last];
            self.entity_to_index[moved.index() as usize] = index as u32;
        }
        self.results.swap_remove(index);
        self.entity_to_index[slot] = NOT_PRESENT;
    }
}
