//! Scenes: bounded pools of render objects and the descriptor sets that
//! mirror their component data.

mod pipeline;
mod scenes;
mod slots;

pub use pipeline::{DescriptorSetKind, PipelineDesc, PipelineId, Pipelines};
pub use scenes::Scenes;
pub use slots::SlotPool;

use crate::descriptors::{
    BufferSink, DescriptorFactories, DescriptorSetInstance, ObjectBinding, SyncStats,
};
use crate::{RenderConfig, SceneError};
use blib_core::ecs::{Entity, Registry};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// How often an object's descriptor data is expected to change.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UpdateSpeed {
    /// Rarely changes; a single buffered copy.
    Static,
    /// Changes most frames; one copy per frame in flight.
    Dynamic,
}

/// Slot of an object inside a scene.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SceneKey {
    pub speed: UpdateSpeed,
    pub slot: u32,
}

impl SceneKey {
    pub const fn new(speed: UpdateSpeed, slot: u32) -> Self {
        Self { speed, slot }
    }
}

/// Generation-checked handle of a scene in [`Scenes`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SceneId {
    index: u32,
    generation: u32,
}

impl SceneId {
    pub(crate) const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub fn index(self) -> u32 {
        self.index
    }

    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for SceneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scene#{}v{}", self.index, self.generation)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneObject {
    pub key: SceneKey,
    pub pipeline: PipelineId,
    sets: Vec<usize>,
}

pub struct Scene {
    id: SceneId,
    config: RenderConfig,
    static_slots: SlotPool,
    dynamic_slots: SlotPool,
    sets: Vec<Box<dyn DescriptorSetInstance>>,
    set_index: HashMap<DescriptorSetKind, usize>,
    objects: HashMap<Entity, SceneObject>,
    batches: HashMap<PipelineId, Vec<Entity>>,
}

impl Scene {
    pub fn new(id: SceneId, config: &RenderConfig) -> Self {
        Self {
            id,
            config: config.clone(),
            static_slots: SlotPool::new(config.static_capacity),
            dynamic_slots: SlotPool::new(config.dynamic_capacity),
            sets: Vec::new(),
            set_index: HashMap::new(),
            objects: HashMap::new(),
            batches: HashMap::new(),
        }
    }

    pub fn id(&self) -> SceneId {
        self.id
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn contains(&self, entity: Entity) -> bool {
        self.objects.contains_key(&entity)
    }

    pub fn object(&self, entity: Entity) -> Option<&SceneObject> {
        self.objects.get(&entity)
    }

    pub fn slots(&self, speed: UpdateSpeed) -> &SlotPool {
        match speed {
            UpdateSpeed::Static => &self.static_slots,
            UpdateSpeed::Dynamic => &self.dynamic_slots,
        }
    }

    fn slots_mut(&mut self, speed: UpdateSpeed) -> &mut SlotPool {
        match speed {
            UpdateSpeed::Static => &mut self.static_slots,
            UpdateSpeed::Dynamic => &mut self.dynamic_slots,
        }
    }

    /// Entities drawn with `pipeline`, in insertion order until removals.
    pub fn objects_for_pipeline(&self, pipeline: PipelineId) -> &[Entity] {
        self.batches.get(&pipeline).map_or(&[], Vec::as_slice)
    }

    pub fn descriptor_set(&self, kind: DescriptorSetKind) -> Option<&dyn DescriptorSetInstance> {
        let index = *self.set_index.get(kind)?;
        Some(self.sets[index].as_ref())
    }

    pub fn descriptor_set_count(&self) -> usize {
        self.sets.len()
    }

    fn set_for_kind(
        &mut self,
        kind: DescriptorSetKind,
        factories: &DescriptorFactories,
    ) -> Result<usize, SceneError> {
        if let Some(&index) = self.set_index.get(kind) {
            return Ok(index);
        }
        let set = factories.create(kind, self.id, &self.config)?;
        self.sets.push(set);
        let index = self.sets.len() - 1;
        self.set_index.insert(kind, index);
        Ok(index)
    }

    /// Reserve a slot for `entity` and allocate it in every descriptor set
    /// `pipeline` binds. On failure nothing stays allocated.
    pub fn add_object(
        &mut self,
        registry: &Registry,
        factories: &DescriptorFactories,
        pipelines: &Pipelines,
        entity: Entity,
        pipeline: PipelineId,
        speed: UpdateSpeed,
    ) -> Result<SceneKey, SceneError> {
        if self.objects.contains_key(&entity) {
            return Err(SceneError::ObjectExists {
                entity,
                scene: self.id,
            });
        }
        if !registry.entity_exists(entity) {
            return Err(blib_core::ecs::EcsError::StaleEntity { entity }.into());
        }
        let desc = pipelines.get(pipeline)?;

        let Some(slot) = self.slots_mut(speed).allocate(entity) else {
            let capacity = self.slots(speed).capacity();
            tracing::warn!(scene = %self.id, ?speed, capacity, "scene object capacity exhausted");
            return Err(SceneError::CapacityExhausted {
                scene: self.id,
                speed,
                capacity,
            });
        };
        let key = SceneKey::new(speed, slot);

        let mut allocated = Vec::with_capacity(desc.sets.len());
        for &kind in &desc.sets {
            let result = self
                .set_for_kind(kind, factories)
                .and_then(|index| {
                    self.sets[index].allocate_object(registry, entity, key)?;
                    Ok(index)
                });
            match result {
                Ok(index) => allocated.push(index),
                Err(err) => {
                    for &index in allocated.iter().rev() {
                        self.sets[index].release_object(key);
                    }
                    self.slots_mut(speed).release(slot);
                    return Err(err);
                }
            }
        }

        self.objects.insert(
            entity,
            SceneObject {
                key,
                pipeline,
                sets: allocated,
            },
        );
        self.batches.entry(pipeline).or_default().push(entity);
        tracing::trace!(scene = %self.id, ?entity, ?key, "object added");
        Ok(key)
    }

    /// Release `entity`'s slot. Uses only scene-local bookkeeping, so it is
    /// safe after the entity was destroyed. Returns false when the entity
    /// was not in the scene.
    pub fn remove_object(&mut self, entity: Entity) -> bool {
        let Some(object) = self.objects.remove(&entity) else {
            return false;
        };
        for &index in &object.sets {
            self.sets[index].release_object(object.key);
        }
        self.slots_mut(object.key.speed).release(object.key.slot);
        if let Some(batch) = self.batches.get_mut(&object.pipeline) {
            if let Some(pos) = batch.iter().position(|e| *e == entity) {
                batch.swap_remove(pos);
            }
        }
        tracing::trace!(scene = %self.id, ?entity, "object removed");
        true
    }

    /// Copy component changes and upload the copy used by `frame`.
    pub fn sync_descriptors(
        &mut self,
        registry: &Registry,
        frame: u32,
        sink: &mut dyn BufferSink,
    ) -> SyncStats {
        let mut stats = SyncStats::default();
        for set in &mut self.sets {
            set.copy_from_ecs(registry);
            set.perform_sync(frame, sink, &mut stats);
        }
        stats
    }

    /// Bindings of `entity` in every set its pipeline uses.
    pub fn bind_for_object(&self, entity: Entity, frame: u32) -> Vec<ObjectBinding> {
        self.objects.get(&entity).map_or_else(Vec::new, |object| {
            object
                .sets
                .iter()
                .map(|&index| self.sets[index].bind_for_object(object.key, frame))
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Texture, Transform2D};
    use crate::descriptors::{MemorySink, TEXTURE, TRANSFORM_2D};
    use blib_core::math::{DeterministicRng, Vec2};

    struct Fixture {
        registry: Registry,
        factories: DescriptorFactories,
        pipelines: Pipelines,
        sprite: PipelineId,
        scene: Scene,
    }

    fn fixture(static_capacity: u32, dynamic_capacity: u32) -> Fixture {
        let mut pipelines = Pipelines::new();
        let sprite = pipelines.register("sprite", &[TRANSFORM_2D, TEXTURE]);
        let config = RenderConfig {
            static_capacity,
            dynamic_capacity,
            ..RenderConfig::default()
        };
        Fixture {
            registry: Registry::new(),
            factories: DescriptorFactories::with_builtins(),
            pipelines,
            sprite,
            scene: Scene::new(SceneId::new(0, 1), &config),
        }
    }

    impl Fixture {
        fn sprite_entity(&mut self, x: f32) -> Entity {
            let e = self.registry.create_entity();
            self.registry
                .emplace_component(e, Transform2D::new(Vec2::new(x, 0.0)))
                .unwrap();
            self.registry.emplace_component(e, Texture::new(1)).unwrap();
            e
        }

        fn add(&mut self, e: Entity, speed: UpdateSpeed) -> Result<SceneKey, SceneError> {
            self.scene.add_object(
                &self.registry,
                &self.factories,
                &self.pipelines,
                e,
                self.sprite,
                speed,
            )
        }
    }

    #[test]
    fn pipelines_share_descriptor_sets() {
        let mut f = fixture(4, 4);
        let other = f.pipelines.register("outline", &[TRANSFORM_2D]);
        let a = f.sprite_entity(0.0);
        let b = f.sprite_entity(1.0);
        f.add(a, UpdateSpeed::Dynamic).unwrap();
        f.scene
            .add_object(&f.registry, &f.factories, &f.pipelines, b, other, UpdateSpeed::Dynamic)
            .unwrap();
        assert_eq!(f.scene.descriptor_set_count(), 2);
        assert_eq!(f.scene.objects_for_pipeline(f.sprite), &[a]);
        assert_eq!(f.scene.objects_for_pipeline(other), &[b]);
        assert_eq!(f.scene.bind_for_object(a, 0).len(), 2);
        assert_eq!(f.scene.bind_for_object(b, 0).len(), 1);
    }

    #[test]
    fn capacity_exhaustion_leaves_existing_slots_intact() {
        let mut f = fixture(1, 2);
        let mut keys = Vec::new();
        for i in 0..2 {
            let e = f.sprite_entity(i as f32);
            keys.push((e, f.add(e, UpdateSpeed::Dynamic).unwrap()));
        }
        let extra = f.sprite_entity(9.0);
        let err = f.add(extra, UpdateSpeed::Dynamic).unwrap_err();
        assert!(matches!(
            err,
            SceneError::CapacityExhausted {
                speed: UpdateSpeed::Dynamic,
                capacity: 2,
                ..
            }
        ));
        assert!(!f.scene.contains(extra));
        for (e, key) in keys {
            assert_eq!(f.scene.object(e).unwrap().key, key);
            assert_eq!(f.scene.slots(UpdateSpeed::Dynamic).occupant(key.slot), Some(e));
        }
        // The static pool is separate.
        assert!(f.add(extra, UpdateSpeed::Static).is_ok());
    }

    #[test]
    fn partial_allocation_is_rolled_back() {
        let mut f = fixture(4, 4);
        let e = f.registry.create_entity();
        f.registry
            .emplace_component(e, Transform2D::new(Vec2::ZERO))
            .unwrap();
        // No texture component: the second set fails.
        let err = f.add(e, UpdateSpeed::Static).unwrap_err();
        assert!(matches!(err, SceneError::MissingComponent { component: "Texture", .. }));
        assert!(f.scene.is_empty());
        assert!(f.scene.slots(UpdateSpeed::Static).is_empty());
        let set = f.scene.descriptor_set(TRANSFORM_2D).unwrap();
        let binding = set.bind_for_pipeline(UpdateSpeed::Static, 0);
        assert_eq!(binding.target.kind, TRANSFORM_2D);
    }

    #[test]
    fn duplicate_and_unknown_pipeline_are_rejected() {
        let mut f = fixture(4, 4);
        let e = f.sprite_entity(0.0);
        f.add(e, UpdateSpeed::Static).unwrap();
        assert!(matches!(
            f.add(e, UpdateSpeed::Dynamic),
            Err(SceneError::ObjectExists { .. })
        ));
        let other = f.sprite_entity(1.0);
        let mut elsewhere = Pipelines::new();
        elsewhere.register("a", &[]);
        let bogus = elsewhere.register("b", &[]);
        assert!(matches!(
            f.scene.add_object(&f.registry, &f.factories, &f.pipelines, other, bogus, UpdateSpeed::Static),
            Err(SceneError::UnknownPipeline { .. })
        ));
        assert!(!f.scene.contains(other));
    }

    #[test]
    fn removal_after_entity_destruction_is_idempotent() {
        let mut f = fixture(4, 4);
        let e = f.sprite_entity(0.0);
        let key = f.add(e, UpdateSpeed::Dynamic).unwrap();
        f.registry.destroy_entity(e).unwrap();
        assert!(f.scene.remove_object(e));
        assert!(!f.scene.remove_object(e));
        assert_eq!(f.scene.slots(UpdateSpeed::Dynamic).occupant(key.slot), None);
        assert!(f.scene.objects_for_pipeline(f.sprite).is_empty());

        let mut sink = MemorySink::new();
        let stats = f.scene.sync_descriptors(&f.registry, 0, &mut sink);
        assert_eq!(stats.slots_copied, 0);
    }

    #[test]
    fn random_churn_never_exceeds_capacity() {
        let mut f = fixture(3, 5);
        let mut rng = DeterministicRng::new(42);
        let mut live: Vec<Entity> = Vec::new();
        for _ in 0..400 {
            if rng.next_u32() % 3 == 0 && !live.is_empty() {
                let idx = rng.next_u32() as usize % live.len();
                let e = live.swap_remove(idx);
                assert!(f.scene.remove_object(e));
            } else {
                let e = f.sprite_entity(rng.next_f32());
                let speed = if rng.next_u32() % 2 == 0 {
                    UpdateSpeed::Static
                } else {
                    UpdateSpeed::Dynamic
                };
                let full = f.scene.slots(speed).is_full();
                match f.add(e, speed) {
                    Ok(_) => {
                        assert!(!full);
                        live.push(e);
                    }
                    Err(SceneError::CapacityExhausted { .. }) => assert!(full),
                    Err(other) => panic!("unexpected error {other}"),
                }
            }
            assert_eq!(f.scene.len(), live.len());
            assert!(f.scene.len() <= 8);
            for &e in &live {
                let key = f.scene.object(e).unwrap().key;
                assert_eq!(f.scene.slots(key.speed).occupant(key.slot), Some(e));
            }
        }
    }
}
