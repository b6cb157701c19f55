// registry.rs - Entity lifecycle, component storage, views and relations
//
// The registry is the only place entities and components are created or
// destroyed. Every structural change updates the per-entity component
// bitset first, then patches the views whose mask mentions the changed
// type, then records an event.

use crate::ecs::{
    query::Query, Component, ComponentBits, ComponentId, ComponentMask, ComponentMeta,
    ComponentPool, ComponentTypes, DependencyGraph, EcsError, EcsEvent, Entity, EntityFlags,
    EntityIdSpace, ErasedPool, ParentGraph, View, ViewId, WorldIndex,
};
use rayon::prelude::*;
use std::collections::HashMap;

/// Outcome of a destroy request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destruction {
    /// Components removed and the id returned for reuse.
    Destroyed,
    /// The entity is depended on; it will be destroyed once its last
    /// dependency is removed.
    Deferred,
}

/// Owner of all entities, component pools, cached views and relationships.
pub struct Registry {
    ids: EntityIdSpace,
    types: ComponentTypes,
    pools: Vec<Box<dyn ErasedPool>>,
    entity_bits: Vec<ComponentBits>,
    views: Vec<View>,
    view_lookup: HashMap<ComponentMask, ViewId>,
    /// Views whose membership depends on each component type.
    views_by_component: Vec<Vec<ViewId>>,
    parents: ParentGraph,
    dependencies: DependencyGraph,
    deletion_queue: Vec<Entity>,
    events: Vec<EcsEvent>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            ids: EntityIdSpace::new(),
            types: ComponentTypes::new(),
            pools: Vec::new(),
            entity_bits: Vec::new(),
            views: Vec::new(),
            view_lookup: HashMap::new(),
            views_by_component: Vec::new(),
            parents: ParentGraph::new(),
            dependencies: DependencyGraph::new(),
            deletion_queue: Vec::new(),
            events: Vec::new(),
        }
    }

    // ------------------------------------------------------------------
    // Entities
    // ------------------------------------------------------------------

    pub fn create_entity(&mut self) -> Entity {
        self.create_entity_with(EntityFlags::NONE, 0)
    }

    /// Create an entity tagged with `flags` in simulation world `world`.
    pub fn create_entity_with(&mut self, flags: EntityFlags, world: WorldIndex) -> Entity {
        let entity = self.ids.create_with(flags, world);
        let slot = entity.index() as usize;
        if slot >= self.entity_bits.len() {
            self.entity_bits.resize(slot + 1, ComponentBits::EMPTY);
        }
        self.entity_bits[slot].clear();
        self.events.push(EcsEvent::EntityCreated { entity });
        tracing::trace!(%entity, "entity created");
        entity
    }

    #[inline]
    pub fn entity_exists(&self, entity: Entity) -> bool {
        self.ids.is_alive(entity)
    }

    pub fn entity_count(&self) -> usize {
        self.ids.len()
    }

    /// Live entities in index order.
    pub fn entities(&self) -> impl Iterator<Item = Entity> + '_ {
        self.ids.iter()
    }

    fn check_alive(&self, entity: Entity) -> Result<(), EcsError> {
        if self.ids.is_alive(entity) {
            Ok(())
        } else {
            tracing::warn!(?entity, "operation on stale entity handle");
            Err(EcsError::StaleEntity { entity })
        }
    }

    /// Destroy an entity and every component it owns.
    ///
    /// Entities with children are rejected: detach or destroy the children
    /// first, or use [`destroy_entity_tree`](Self::destroy_entity_tree).
    pub fn destroy_entity(&mut self, entity: Entity) -> Result<Destruction, EcsError> {
        self.check_alive(entity)?;
        let children = self.parents.children(entity).len();
        if children > 0 {
            return Err(EcsError::HasChildren { entity, children });
        }
        if self.dependencies.is_depended_on(entity) {
            self.dependencies.mark_for_removal(entity);
            tracing::debug!(%entity, "destruction deferred until dependencies are released");
            return Ok(Destruction::Deferred);
        }
        self.destroy_now(entity);
        Ok(Destruction::Destroyed)
    }

    /// Destroy `root` and all of its descendants, deepest first.
    ///
    /// Returns how many entities were destroyed immediately. Depended-on
    /// descendants are detached and deferred instead.
    pub fn destroy_entity_tree(&mut self, root: Entity) -> Result<usize, EcsError> {
        self.check_alive(root)?;
        let mut order = self.parents.descendants(root);
        order.insert(0, root);

        let mut destroyed = 0;
        for entity in order.into_iter().rev() {
            if self.dependencies.is_depended_on(entity) {
                self.detach_parent(entity);
                self.dependencies.mark_for_removal(entity);
                continue;
            }
            // Deferred descendants were detached above, so nothing blocks this.
            for child in self.parents.detach_children(entity) {
                self.events.push(EcsEvent::ParentRemoved {
                    child,
                    previous: entity,
                });
            }
            self.destroy_now(entity);
            destroyed += 1;
        }
        Ok(destroyed)
    }

    /// Queue an entity for destruction at the next [`flush_deletions`](Self::flush_deletions).
    pub fn queue_destroy(&mut self, entity: Entity) {
        self.deletion_queue.push(entity);
    }

    pub fn pending_deletions(&self) -> usize {
        self.deletion_queue.len()
    }

    /// Destroy every queued entity. Returns how many were destroyed.
    pub fn flush_deletions(&mut self) -> usize {
        let queue = std::mem::take(&mut self.deletion_queue);
        let mut destroyed = 0;
        for entity in queue {
            if !self.ids.is_alive(entity) {
                continue;
            }
            match self.destroy_entity(entity) {
                Ok(Destruction::Destroyed) => destroyed += 1,
                Ok(Destruction::Deferred) => {}
                Err(err) => tracing::warn!(%entity, %err, "queued destruction failed"),
            }
        }
        destroyed
    }

    /// Destroy every entity carrying any of `flags`. Children of destroyed
    /// entities are detached, not destroyed.
    pub fn destroy_all_entities_with_flags(&mut self, flags: EntityFlags) -> usize {
        let targets: Vec<Entity> = self
            .ids
            .iter()
            .filter(|e| e.flags().intersects(flags))
            .collect();
        self.destroy_forced(targets)
    }

    /// Destroy every entity belonging to simulation world `world`.
    pub fn destroy_entities_in_world(&mut self, world: WorldIndex) -> usize {
        let targets: Vec<Entity> = self.ids.iter().filter(|e| e.world() == world).collect();
        self.destroy_forced(targets)
    }

    /// Destroy everything and rebuild every cached view.
    pub fn destroy_all_entities(&mut self) {
        let live: Vec<Entity> = self.ids.iter().collect();
        for pool in &mut self.pools {
            pool.clear();
        }
        self.ids.clear();
        for bits in &mut self.entity_bits {
            bits.clear();
        }
        self.parents.clear();
        self.dependencies.clear();
        self.deletion_queue.clear();
        self.events
            .extend(live.iter().map(|&entity| EcsEvent::EntityDestroyed { entity }));

        for index in 0..self.views.len() {
            let view = &mut self.views[index];
            if view.is_iterating() {
                view.request_rebuild();
            } else {
                view.clear_and_refresh(std::iter::empty());
            }
        }
        tracing::debug!(count = live.len(), "destroyed all entities");
    }

    fn destroy_forced(&mut self, targets: Vec<Entity>) -> usize {
        let mut destroyed = 0;
        for entity in targets {
            if !self.ids.is_alive(entity) {
                continue;
            }
            for child in self.parents.detach_children(entity) {
                self.events.push(EcsEvent::ParentRemoved {
                    child,
                    previous: entity,
                });
            }
            self.dependencies.forget(entity);
            self.destroy_now(entity);
            destroyed += 1;
        }
        destroyed
    }

    fn detach_parent(&mut self, child: Entity) {
        if let Some(previous) = self.parents.remove_parent(child) {
            self.events
                .push(EcsEvent::ParentRemoved { child, previous });
        }
    }

    /// Remove components, relations and the id. Caller guarantees the
    /// entity is alive and has no children.
    fn destroy_now(&mut self, entity: Entity) {
        self.detach_parent(entity);

        let slot = entity.index() as usize;
        let bits = std::mem::take(&mut self.entity_bits[slot]);
        for component in bits.iter() {
            self.pools[component as usize].remove_erased(entity);
            for view in &self.views_by_component[component as usize] {
                self.views[view.index() as usize].remove_entity(entity);
            }
            self.events
                .push(EcsEvent::ComponentRemoved { entity, component });
        }

        let released = self.dependencies.remove_user(entity);
        self.dependencies.forget(entity);
        self.ids.destroy(entity);
        self.events.push(EcsEvent::EntityDestroyed { entity });
        tracing::trace!(%entity, "entity destroyed");

        for resource in released {
            if let Err(err) = self.destroy_entity(resource) {
                tracing::warn!(%resource, %err, "deferred destruction failed");
            }
        }
    }

    // ------------------------------------------------------------------
    // Components
    // ------------------------------------------------------------------

    /// Register `T` and create its pool. Idempotent.
    pub fn register_component<T: Component>(&mut self) -> Result<ComponentId, EcsError> {
        let (id, is_new) = self.types.register::<T>()?;
        if is_new {
            self.pools.push(Box::new(ComponentPool::<T>::new(id)));
            self.views_by_component.push(Vec::new());
        }
        Ok(id)
    }

    pub fn component_id<T: Component>(&self) -> Option<ComponentId> {
        self.types.id_of::<T>()
    }

    pub fn component_meta(&self, id: ComponentId) -> Option<&ComponentMeta> {
        self.types.meta(id)
    }

    pub fn component_types(&self) -> impl Iterator<Item = &ComponentMeta> {
        self.types.iter()
    }

    /// Component set of a live entity.
    pub fn component_bits(&self, entity: Entity) -> Option<ComponentBits> {
        self.ids
            .is_alive(entity)
            .then(|| self.entity_bits[entity.index() as usize])
    }

    pub fn pool<T: Component>(&self) -> Option<&ComponentPool<T>> {
        let id = self.component_id::<T>()?;
        self.pools[id as usize]
            .as_any()
            .downcast_ref::<ComponentPool<T>>()
    }

    /// Mutable pool access. Only non-structural operations are public on
    /// [`ComponentPool`], so views cannot be invalidated through this.
    pub fn pool_mut<T: Component>(&mut self) -> Option<&mut ComponentPool<T>> {
        let id = self.component_id::<T>()?;
        self.pools[id as usize]
            .as_any_mut()
            .downcast_mut::<ComponentPool<T>>()
    }

    /// Attach a component. Fails on stale entities and duplicates.
    pub fn emplace_component<T: Component>(
        &mut self,
        entity: Entity,
        value: T,
    ) -> Result<&mut T, EcsError> {
        self.check_alive(entity)?;
        let id = self.register_component::<T>()?;
        let slot = entity.index() as usize;
        if self.entity_bits[slot].contains(id) {
            return Err(EcsError::DuplicateComponent {
                entity,
                component: T::NAME,
            });
        }

        self.entity_bits[slot].insert(id);
        let bits = self.entity_bits[slot];
        for view_id in &self.views_by_component[id as usize] {
            let view = &mut self.views[view_id.index() as usize];
            if view.mask().required().contains(id) {
                view.try_add(entity, &bits);
            } else {
                view.remove_entity(entity);
            }
        }
        self.events.push(EcsEvent::ComponentAdded {
            entity,
            component: id,
        });

        let pool = self.pools[id as usize]
            .as_any_mut()
            .downcast_mut::<ComponentPool<T>>()
            .ok_or(EcsError::MissingComponent {
                entity,
                component: T::NAME,
            })?;
        pool.emplace(entity, value)
    }

    /// Detach and return a component.
    pub fn remove_component<T: Component>(&mut self, entity: Entity) -> Result<T, EcsError> {
        self.check_alive(entity)?;
        let missing = EcsError::MissingComponent {
            entity,
            component: T::NAME,
        };
        let id = self.component_id::<T>().ok_or(missing.clone())?;
        let value = self.pools[id as usize]
            .as_any_mut()
            .downcast_mut::<ComponentPool<T>>()
            .and_then(|pool| pool.remove(entity))
            .ok_or(missing)?;

        let slot = entity.index() as usize;
        self.entity_bits[slot].remove(id);
        let bits = self.entity_bits[slot];
        for view_id in &self.views_by_component[id as usize] {
            let view = &mut self.views[view_id.index() as usize];
            if view.mask().required().contains(id) {
                view.remove_entity(entity);
            } else {
                view.try_add(entity, &bits);
            }
        }
        self.events.push(EcsEvent::ComponentRemoved {
            entity,
            component: id,
        });
        Ok(value)
    }

    #[inline]
    pub fn get_component<T: Component>(&self, entity: Entity) -> Option<&T> {
        self.pool::<T>()?.get(entity)
    }

    #[inline]
    pub fn get_component_mut<T: Component>(&mut self, entity: Entity) -> Option<&mut T> {
        self.pool_mut::<T>()?.get_mut(entity)
    }

    pub fn has_component<T: Component>(&self, entity: Entity) -> bool {
        self.pool::<T>().is_some_and(|pool| pool.contains(entity))
    }

    /// Borrow two different component types of one entity mutably.
    pub fn get_pair_mut<A: Component, B: Component>(
        &mut self,
        entity: Entity,
    ) -> Option<(&mut A, &mut B)> {
        let a = self.component_id::<A>()? as usize;
        let b = self.component_id::<B>()? as usize;
        if a == b {
            return None;
        }
        let (low, high) = if a < b { (a, b) } else { (b, a) };
        let (head, tail) = self.pools.split_at_mut(high);
        let (low_pool, high_pool) = (&mut head[low], &mut tail[0]);
        let (pool_a, pool_b) = if a < b {
            (low_pool, high_pool)
        } else {
            (high_pool, low_pool)
        };
        let ca = pool_a
            .as_any_mut()
            .downcast_mut::<ComponentPool<A>>()?
            .get_mut(entity)?;
        let cb = pool_b
            .as_any_mut()
            .downcast_mut::<ComponentPool<B>>()?
            .get_mut(entity)?;
        Some((ca, cb))
    }

    // ------------------------------------------------------------------
    // Views
    // ------------------------------------------------------------------

    /// Resolve a type-level query into a mask, registering types as needed.
    pub fn resolve_query(&mut self, query: &Query) -> Result<ComponentMask, EcsError> {
        let mut resolve = |keys: &[crate::ecs::query::ComponentKey]| {
            let mut bits = ComponentBits::EMPTY;
            for key in keys {
                bits.insert((key.register)(self)?);
            }
            Ok::<_, EcsError>(bits)
        };
        let required = resolve(query.required_keys())?;
        let excluded = resolve(query.excluded_keys())?;
        let optional = resolve(query.optional_keys())?;
        ComponentMask::new(required, excluded, optional)
    }

    /// Cached view for a query, created and populated on first request.
    pub fn get_or_create_view(&mut self, query: &Query) -> Result<ViewId, EcsError> {
        let mask = self.resolve_query(query)?;
        Ok(self.get_or_create_view_for_mask(mask))
    }

    pub fn get_or_create_view_for_mask(&mut self, mask: ComponentMask) -> ViewId {
        if let Some(id) = self.view_lookup.get(&mask) {
            return *id;
        }
        let id = ViewId::new(self.views.len() as u32);
        let mut view = View::new(mask);
        view.clear_and_refresh(Self::scan(&self.ids, &self.entity_bits));
        for component in mask.required().iter().chain(mask.excluded().iter()) {
            self.views_by_component[component as usize].push(id);
        }
        self.views.push(view);
        self.view_lookup.insert(mask, id);
        tracing::debug!(view = %id, ?mask, "view created");
        id
    }

    fn scan<'a>(
        ids: &'a EntityIdSpace,
        bits: &'a [ComponentBits],
    ) -> impl Iterator<Item = (Entity, ComponentBits)> + 'a {
        ids.iter().map(move |e| (e, bits[e.index() as usize]))
    }

    pub fn view(&self, id: ViewId) -> Option<&View> {
        self.views.get(id.index() as usize)
    }

    pub fn view_count(&self) -> usize {
        self.views.len()
    }

    /// Apply a view's queued changes unless it is mid-iteration.
    pub fn flush_view(&mut self, id: ViewId) -> Result<(), EcsError> {
        let Registry {
            views,
            ids,
            entity_bits,
            ..
        } = self;
        let view = views
            .get_mut(id.index() as usize)
            .ok_or(EcsError::UnknownView { view: id })?;
        if view.is_iterating() {
            return Ok(());
        }
        if view.rebuild_requested() {
            view.clear_and_refresh(Self::scan(ids, entity_bits));
        } else if view.has_pending() {
            view.flush(|e| ids.is_alive(e).then(|| entity_bits[e.index() as usize]));
        }
        Ok(())
    }

    /// Flushed result list of a view.
    pub fn view_entities(&mut self, id: ViewId) -> Result<&[Entity], EcsError> {
        self.flush_view(id)?;
        Ok(self.views[id.index() as usize].entities())
    }

    /// Visit every entity in a view with full registry access.
    ///
    /// Structural changes made by `f` are deferred for this view (and any
    /// other view being iterated) and applied once iteration ends. Entities
    /// destroyed mid-iteration are skipped.
    pub fn for_each_in_view<F>(&mut self, id: ViewId, mut f: F) -> Result<(), EcsError>
    where
        F: FnMut(&mut Registry, Entity),
    {
        self.flush_view(id)?;
        let index = id.index() as usize;
        self.views[index].begin_iteration();

        let mut cursor = 0;
        while let Some(&entity) = self.views[index].entities().get(cursor) {
            cursor += 1;
            if self.ids.is_alive(entity) {
                f(self, entity);
            }
        }

        if self.views[index].end_iteration() {
            self.flush_view(id)?;
        }
        Ok(())
    }

    /// Visit every entity in a view from the rayon pool with read-only access.
    pub fn par_for_each_in_view<F>(&mut self, id: ViewId, f: F) -> Result<(), EcsError>
    where
        F: Fn(&Registry, Entity) + Send + Sync,
    {
        self.flush_view(id)?;
        let this: &Registry = self;
        this.views[id.index() as usize]
            .entities()
            .par_iter()
            .for_each(|entity| f(this, *entity));
        Ok(())
    }

    // ------------------------------------------------------------------
    // Parent graph
    // ------------------------------------------------------------------

    /// Make `parent` the parent of `child`. Rejects cycles.
    pub fn set_entity_parent(&mut self, child: Entity, parent: Entity) -> Result<(), EcsError> {
        self.check_alive(child)?;
        self.check_alive(parent)?;
        let previous = self.parents.set_parent(child, parent).inspect_err(|err| {
            tracing::warn!(%child, %parent, %err, "parent assignment rejected");
        })?;
        if previous != parent {
            self.events.push(EcsEvent::ParentSet {
                child,
                parent,
                previous,
            });
        }
        Ok(())
    }

    /// Detach `child` from its parent, returning the previous parent.
    pub fn remove_entity_parent(&mut self, child: Entity) -> Result<Option<Entity>, EcsError> {
        self.check_alive(child)?;
        let previous = self.parents.remove_parent(child);
        if let Some(previous) = previous {
            self.events
                .push(EcsEvent::ParentRemoved { child, previous });
        }
        Ok(previous)
    }

    /// Parent of `child`, or `Entity::INVALID`.
    pub fn entity_parent(&self, child: Entity) -> Entity {
        if !self.ids.is_alive(child) {
            return Entity::INVALID;
        }
        self.parents.parent(child)
    }

    pub fn children(&self, parent: Entity) -> &[Entity] {
        if !self.ids.is_alive(parent) {
            return &[];
        }
        self.parents.children(parent)
    }

    /// Component `T` of `child`'s parent.
    pub fn parent_component<T: Component>(&self, child: Entity) -> Option<&T> {
        let parent = self.entity_parent(child);
        if !self.ids.is_alive(parent) {
            return None;
        }
        self.get_component::<T>(parent)
    }

    // ------------------------------------------------------------------
    // Dependencies
    // ------------------------------------------------------------------

    /// Record that `user` keeps `resource` alive.
    pub fn add_dependency(&mut self, resource: Entity, user: Entity) -> Result<(), EcsError> {
        self.check_alive(resource)?;
        self.check_alive(user)?;
        self.dependencies.add(resource, user);
        Ok(())
    }

    /// Drop a dependency, completing a deferred destruction if it was the last.
    pub fn remove_dependency(&mut self, resource: Entity, user: Entity) -> Result<(), EcsError> {
        if self.dependencies.remove(resource, user) && self.ids.is_alive(resource) {
            self.destroy_entity(resource)?;
        }
        Ok(())
    }

    pub fn is_depended_on(&self, resource: Entity) -> bool {
        self.dependencies.is_depended_on(resource)
    }

    pub fn dependents(&self, resource: Entity) -> &[Entity] {
        self.dependencies.dependents(resource)
    }

    pub fn is_marked_for_removal(&self, entity: Entity) -> bool {
        self.dependencies.is_marked_for_removal(entity)
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    /// Structural events recorded since the last [`clear_events`](Self::clear_events).
    pub fn events(&self) -> &[EcsEvent] {
        &self.events
    }

    pub fn clear_events(&mut self) {
        self.events.clear();
    }

    /// Drop the oldest `count` events, keeping anything recorded after them.
    pub fn discard_events(&mut self, count: usize) {
        let count = count.min(self.events.len());
        self.events.drain(..count);
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
