use crate::scene::{PipelineId, SceneId, UpdateSpeed};
use blib_core::ecs::{EcsError, Entity};
use thiserror::Error;

/// Failures while placing entities into scenes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SceneError {
    #[error("scene {scene} has no free {speed:?} slot (capacity {capacity})")]
    CapacityExhausted {
        scene: SceneId,
        speed: UpdateSpeed,
        capacity: u32,
    },

    #[error("scene {scene} no longer exists")]
    StaleScene { scene: SceneId },

    #[error("pipeline {pipeline} is not registered")]
    UnknownPipeline { pipeline: PipelineId },

    #[error("no descriptor set factory for kind '{kind}'")]
    UnknownDescriptorSet { kind: &'static str },

    #[error("entity {entity:?} is already in scene {scene}")]
    ObjectExists { entity: Entity, scene: SceneId },

    #[error("entity {entity:?} has no '{component}' component")]
    MissingComponent {
        entity: Entity,
        component: &'static str,
    },

    #[error(transparent)]
    Ecs(#[from] EcsError),
}

/// Failures while building or executing a render graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("task '{task}' has no asset for required input {tags:?}")]
    MissingRequiredInput {
        task: &'static str,
        tags: Vec<&'static str>,
    },

    #[error("task '{task}' expected asset '{tag}' to be a {expected}")]
    AssetTypeMismatch {
        task: &'static str,
        tag: &'static str,
        expected: &'static str,
    },

    #[error("no task writes the final output")]
    FinalOutputNotProduced,

    #[error("no asset creator registered for tag '{tag}'")]
    UnknownAssetTag { tag: &'static str },

    #[error("asset '{tag}' has {count} instances and cannot be replaced")]
    CannotReplaceMultiInstance { tag: &'static str, count: usize },

    #[error("task '{task}' refers to an asset that was released")]
    ReleasedAsset { task: &'static str },

    #[error("task '{task}' depends on its own output")]
    DependencyCycle { task: &'static str },

    #[error("failed to create asset '{tag}': {reason}")]
    AssetCreation { tag: &'static str, reason: String },
}

#[derive(Debug, Error)]
pub enum GpuError {
    #[error("no compatible graphics adapter found")]
    NoAdapter,

    #[error("failed to open graphics device: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),
}

/// Umbrella error for renderer setup.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error(transparent)]
    Scene(#[from] SceneError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Gpu(#[from] GpuError),

    #[error("invalid render configuration: {reason}")]
    InvalidConfig { reason: String },
}
