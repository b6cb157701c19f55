// component.rs - Component type registration
//
// Component types get a small integer id in registration order. Ids are
// scoped to one Registry so two engines in the same process never share
// hidden state.

use crate::ecs::EcsError;
use std::any::TypeId;
use std::collections::HashMap;
use std::mem::{align_of, size_of};

pub type ComponentId = u16;

/// Upper bound on distinct component types per registry (mask width).
pub const MAX_COMPONENT_TYPES: usize = 256;

/// Metadata describing a registered component type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ComponentMeta {
    pub id: ComponentId,
    pub name: &'static str,
    pub size: usize,
    pub align: usize,
}

/// Trait for component value types.
///
/// Components are plain data owned by exactly one entity at a time and
/// must be `Send + Sync` so views can be iterated from worker threads.
pub trait Component: 'static + Sized + Send + Sync {
    /// Human-readable name for logs and errors.
    const NAME: &'static str;
}

/// Helper macro to implement [`Component`].
///
/// # Example
/// ```ignore
/// #[derive(Clone, Copy)]
/// struct Position { x: f32, y: f32 }
///
/// define_component!(Position);
/// define_component!(Velocity, "Velocity2D");
/// ```
#[macro_export]
macro_rules! define_component {
    ($ty:ty) => {
        $crate::define_component!($ty, stringify!($ty));
    };
    ($ty:ty, $name:expr) => {
        impl $crate::ecs::Component for $ty {
            const NAME: &'static str = $name;
        }
    };
}

/// Per-registry table of component type ids.
#[derive(Default)]
pub(crate) struct ComponentTypes {
    by_type: HashMap<TypeId, ComponentId>,
    metas: Vec<ComponentMeta>,
}

impl ComponentTypes {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn id_of<T: Component>(&self) -> Option<ComponentId> {
        self.by_type.get(&TypeId::of::<T>()).copied()
    }

    /// Assign an id to `T`, or return the one it already has.
    ///
    /// The second value is `true` when the type was newly registered.
    pub fn register<T: Component>(&mut self) -> Result<(ComponentId, bool), EcsError> {
        if let Some(id) = self.id_of::<T>() {
            return Ok((id, false));
        }
        if self.metas.len() >= MAX_COMPONENT_TYPES {
            return Err(EcsError::TooManyComponentTypes {
                component: T::NAME,
                limit: MAX_COMPONENT_TYPES,
            });
        }
        let id = self.metas.len() as ComponentId;
        self.metas.push(ComponentMeta {
            id,
            name: T::NAME,
            size: size_of::<T>(),
            align: align_of::<T>(),
        });
        self.by_type.insert(TypeId::of::<T>(), id);
        tracing::debug!(component = T::NAME, id, "registered component type");
        Ok((id, true))
    }

    pub fn meta(&self, id: ComponentId) -> Option<&ComponentMeta> {
        self.metas.get(id as usize)
    }

    pub fn len(&self) -> usize {
        self.metas.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ComponentMeta> {
        self.metas.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Position;
    define_component!(Position);

    struct Velocity;
    define_component!(Velocity, "Velocity2D");

    #[test]
    fn ids_follow_registration_order() {
        let mut types = ComponentTypes::new();
        assert_eq!(types.register::<Velocity>(), Ok((0, true)));
        assert_eq!(types.register::<Position>(), Ok((1, true)));
        assert_eq!(types.register::<Velocity>(), Ok((0, false)));
        assert_eq!(types.id_of::<Position>(), Some(1));
    }

    #[test]
    fn meta_records_name_and_layout() {
        let mut types = ComponentTypes::new();
        let (id, _) = types.register::<Velocity>().unwrap();
        let meta = types.meta(id).unwrap();
        assert_eq!(meta.name, "Velocity2D");
        assert_eq!(meta.size, 0);
        assert_eq!(types.len(), 1);
    }
}
