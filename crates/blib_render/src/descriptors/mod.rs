//! Descriptor set instances: per-scene mirrors of component data laid out
//! for the GPU.

mod sink;
mod storage;

pub use sink::{BufferSink, BufferTarget, MemorySink};
pub use storage::{DescriptorComponentStorage, DirtyRange};

use crate::components::{DescriptorComponent, Texture, Transform2D, Transform3D};
use crate::scene::{DescriptorSetKind, SceneId, SceneKey, UpdateSpeed};
use crate::{RenderConfig, SceneError};
use blib_core::ecs::{Entity, Registry};
use std::collections::HashMap;

pub const TRANSFORM_2D: DescriptorSetKind = "transform2d";
pub const TRANSFORM_3D: DescriptorSetKind = "transform3d";
pub const TEXTURE: DescriptorSetKind = "texture";

/// Where one object's record lives.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ObjectBinding {
    pub target: BufferTarget,
    pub offset: u64,
    pub size: u64,
}

/// Buffer range a pipeline binds for all objects of one speed.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SetBinding {
    pub target: BufferTarget,
    pub size: u64,
    pub stride: u64,
}

/// Work done by descriptor syncs, summed over sets and scenes.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub slots_copied: u64,
    pub bytes_uploaded: u64,
    pub uploads: u64,
    pub rebinds: u64,
}

impl SyncStats {
    pub fn merge(&mut self, other: SyncStats) {
        self.slots_copied += other.slots_copied;
        self.bytes_uploaded += other.bytes_uploaded;
        self.uploads += other.uploads;
        self.rebinds += other.rebinds;
    }
}

/// One descriptor set kind instantiated in a scene, shared by every
/// pipeline of that scene that binds the kind.
pub trait DescriptorSetInstance: Send + Sync {
    fn kind(&self) -> DescriptorSetKind;

    /// Start mirroring `entity` into `key`. Fails without side effects.
    fn allocate_object(
        &mut self,
        registry: &Registry,
        entity: Entity,
        key: SceneKey,
    ) -> Result<(), SceneError>;

    /// Stop mirroring `key`. Never touches the registry, so it is safe
    /// after the entity is gone, and a no-op for free slots.
    fn release_object(&mut self, key: SceneKey);

    /// Pick up component changes. Returns the number of changed objects.
    fn copy_from_ecs(&mut self, registry: &Registry) -> usize;

    /// Refresh the copy used by `frame` and upload what changed.
    fn perform_sync(&mut self, frame: u32, sink: &mut dyn BufferSink, stats: &mut SyncStats);

    /// True when the last sync grew the buffers backing `speed`.
    fn descriptor_update_required(&self, speed: UpdateSpeed) -> bool;

    fn bind_for_object(&self, key: SceneKey, frame: u32) -> ObjectBinding;

    fn bind_for_pipeline(&self, speed: UpdateSpeed, frame: u32) -> SetBinding;
}

type Factory =
    Box<dyn Fn(SceneId, &RenderConfig) -> Box<dyn DescriptorSetInstance> + Send + Sync>;

/// Creates descriptor set instances by kind.
pub struct DescriptorFactories {
    factories: HashMap<DescriptorSetKind, Factory>,
}

impl DescriptorFactories {
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Factories for the built-in descriptor components.
    pub fn with_builtins() -> Self {
        let mut factories = Self::empty();
        factories.register_component::<Transform2D>(TRANSFORM_2D);
        factories.register_component::<Transform3D>(TRANSFORM_3D);
        factories.register_component::<Texture>(TEXTURE);
        factories
    }

    pub fn register<F>(&mut self, kind: DescriptorSetKind, factory: F)
    where
        F: Fn(SceneId, &RenderConfig) -> Box<dyn DescriptorSetInstance> + Send + Sync + 'static,
    {
        self.factories.insert(kind, Box::new(factory));
    }

    /// Mirror component `C` under `kind`.
    pub fn register_component<C: DescriptorComponent>(&mut self, kind: DescriptorSetKind) {
        self.register(kind, move |scene, config| {
            Box::new(DescriptorComponentStorage::<C>::new(scene, kind, config))
        });
    }

    pub fn contains(&self, kind: DescriptorSetKind) -> bool {
        self.factories.contains_key(kind)
    }

    pub fn create(
        &self,
        kind: DescriptorSetKind,
        scene: SceneId,
        config: &RenderConfig,
    ) -> Result<Box<dyn DescriptorSetInstance>, SceneError> {
        let factory = self
            .factories
            .get(kind)
            .ok_or(SceneError::UnknownDescriptorSet { kind })?;
        Ok(factory(scene, config))
    }
}

impl Default for DescriptorFactories {
    fn default() -> Self {
        Self::with_builtins()
    }
}
