//! Entity Component System.
//!
//! Entities are versioned ids handed out by [`EntityIdSpace`]. Each
//! component type lives in its own sparse/dense [`ComponentPool`]. Queries
//! are cached as [`View`]s keyed by [`ComponentMask`] and patched
//! incrementally on every structural change. [`Registry`] owns all of it,
//! together with the parent graph and the dependency graph.

mod component;
mod dependency_graph;
mod entity;
mod error;
mod event;
mod id_space;
mod mask;
mod parent_graph;
mod pool;
mod query;
mod registry;
mod view;

pub use component::{Component, ComponentId, ComponentMeta, MAX_COMPONENT_TYPES};
pub(crate) use component::ComponentTypes;
pub use dependency_graph::DependencyGraph;
pub use entity::{Entity, EntityFlags, Version, WorldIndex, MAX_WORLD_INDEX};
pub use error::EcsError;
pub use event::EcsEvent;
pub use id_space::EntityIdSpace;
pub use mask::{ComponentBits, ComponentMask};
pub use parent_graph::ParentGraph;
pub use pool::ComponentPool;
pub(crate) use pool::ErasedPool;
pub use query::Query;
pub use registry::{Destruction, Registry};
pub use view::{View, ViewId};
