use crate::ecs::{ComponentId, Entity};

/// Structural change recorded by the registry.
///
/// Events accumulate for the current frame and are cleared by the engine
/// once every frame stage has run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EcsEvent {
    EntityCreated {
        entity: Entity,
    },
    /// Emitted after the entity's components were removed.
    EntityDestroyed {
        entity: Entity,
    },
    ComponentAdded {
        entity: Entity,
        component: ComponentId,
    },
    /// Also emitted for every component of a destroyed entity.
    ComponentRemoved {
        entity: Entity,
        component: ComponentId,
    },
    ParentSet {
        child: Entity,
        parent: Entity,
        previous: Entity,
    },
    ParentRemoved {
        child: Entity,
        previous: Entity,
    },
}

impl EcsEvent {
    /// The entity the event is primarily about.
    pub fn entity(&self) -> Entity {
        match *self {
            EcsEvent::EntityCreated { entity }
            | EcsEvent::EntityDestroyed { entity }
            | EcsEvent::ComponentAdded { entity, .. }
            | EcsEvent::ComponentRemoved { entity, .. } => entity,
            EcsEvent::ParentSet { child, .. } | EcsEvent::ParentRemoved { child, .. } => child,
        }
    }
}
