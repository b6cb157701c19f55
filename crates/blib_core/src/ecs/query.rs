// query.rs - Type-level view queries
//
// A query lists component types by Rust type; the registry resolves it to
// a `ComponentMask`, registering unknown types on the way.

use crate::ecs::{Component, ComponentId, EcsError, Registry};
use std::any::TypeId;

/// Type-level description of a view, resolved to a mask by a registry.
///
/// ```ignore
/// let query = Query::new()
///     .require::<Transform2D>()
///     .require::<Texture>()
///     .exclude::<Hidden>();
/// let view = registry.get_or_create_view(&query)?;
/// ```
#[derive(Clone, Default)]
pub struct Query {
    required: Vec<ComponentKey>,
    excluded: Vec<ComponentKey>,
    optional: Vec<ComponentKey>,
}

#[derive(Clone, Copy)]
pub(crate) struct ComponentKey {
    type_id: TypeId,
    pub(crate) register: fn(&mut Registry) -> Result<ComponentId, EcsError>,
}

impl ComponentKey {
    fn of<T: Component>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            register: Registry::register_component::<T>,
        }
    }
}

fn push_unique(keys: &mut Vec<ComponentKey>, key: ComponentKey) {
    if !keys.iter().any(|k| k.type_id == key.type_id) {
        keys.push(key);
    }
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entities must have `T`.
    pub fn require<T: Component>(mut self) -> Self {
        push_unique(&mut self.required, ComponentKey::of::<T>());
        self
    }

    /// Entities must not have `T`.
    pub fn exclude<T: Component>(mut self) -> Self {
        push_unique(&mut self.excluded, ComponentKey::of::<T>());
        self
    }

    /// `T` is read when present but does not affect membership.
    pub fn optional<T: Component>(mut self) -> Self {
        push_unique(&mut self.optional, ComponentKey::of::<T>());
        self
    }

    pub(crate) fn required_keys(&self) -> &[ComponentKey] {
        &self.required
    }

    pub(crate) fn excluded_keys(&self) -> &[ComponentKey] {
        &self.excluded
    }

    pub(crate) fn optional_keys(&self) -> &[ComponentKey] {
        &self.optional
    }
}
