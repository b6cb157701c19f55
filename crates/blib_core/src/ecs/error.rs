use crate::ecs::{ComponentId, Entity, ViewId};
use thiserror::Error;

/// Errors reported by the registry and its storages.
///
/// Every variant is recoverable: the operation that produced it left the
/// registry unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EcsError {
    #[error("entity {entity:?} is not alive")]
    StaleEntity { entity: Entity },

    #[error("entity {entity:?} already has a '{component}' component")]
    DuplicateComponent {
        entity: Entity,
        component: &'static str,
    },

    #[error("entity {entity:?} has no '{component}' component")]
    MissingComponent {
        entity: Entity,
        component: &'static str,
    },

    #[error("setting parent of {child:?} to {parent:?} would create a cycle")]
    ParentCycle { child: Entity, parent: Entity },

    #[error("entity {entity:?} cannot be its own parent")]
    SelfParent { entity: Entity },

    #[error("entity {entity:?} still has {children} children attached")]
    HasChildren { entity: Entity, children: usize },

    #[error("view {view} does not exist")]
    UnknownView { view: ViewId },

    #[error("component {component} is both required and excluded")]
    RequiredExcludedOverlap { component: ComponentId },

    #[error("component {component} is both optional and excluded")]
    OptionalExcludedOverlap { component: ComponentId },

    #[error("a query must require at least one component type")]
    EmptyQuery,

    #[error("component type limit of {limit} reached while registering '{component}'")]
    TooManyComponentTypes {
        component: &'static str,
        limit: usize,
    },
}
