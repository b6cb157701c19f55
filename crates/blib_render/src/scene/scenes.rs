use crate::components::SceneLink;
use crate::descriptors::DescriptorFactories;
use crate::scene::{PipelineId, Pipelines, Scene, SceneId, SceneKey, UpdateSpeed};
use crate::{RenderConfig, SceneError};
use blib_core::ecs::{Entity, Registry};

struct Entry {
    generation: u32,
    scene: Option<Scene>,
}

/// Arena of scenes addressed by generation-checked [`SceneId`]s.
pub struct Scenes {
    entries: Vec<Entry>,
    free: Vec<u32>,
    config: RenderConfig,
}

impl Scenes {
    pub fn new(config: RenderConfig) -> Self {
        Self {
            entries: Vec::new(),
            free: Vec::new(),
            config,
        }
    }

    pub fn create(&mut self) -> SceneId {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.entries.push(Entry {
                    generation: 0,
                    scene: None,
                });
                self.entries.len() as u32 - 1
            }
        };
        let entry = &mut self.entries[index as usize];
        entry.generation += 1;
        let id = SceneId::new(index, entry.generation);
        entry.scene = Some(Scene::new(id, &self.config));
        tracing::debug!(scene = %id, "scene created");
        id
    }

    /// Remove a scene. Links that still name it become stale.
    pub fn destroy(&mut self, id: SceneId) -> Option<Scene> {
        let entry = self.entries.get_mut(id.index() as usize)?;
        if entry.generation != id.generation() {
            return None;
        }
        let scene = entry.scene.take()?;
        self.free.push(id.index());
        tracing::debug!(scene = %id, objects = scene.len(), "scene destroyed");
        Some(scene)
    }

    pub fn get(&self, id: SceneId) -> Result<&Scene, SceneError> {
        self.entries
            .get(id.index() as usize)
            .filter(|entry| entry.generation == id.generation())
            .and_then(|entry| entry.scene.as_ref())
            .ok_or(SceneError::StaleScene { scene: id })
    }

    pub fn get_mut(&mut self, id: SceneId) -> Result<&mut Scene, SceneError> {
        self.entries
            .get_mut(id.index() as usize)
            .filter(|entry| entry.generation == id.generation())
            .and_then(|entry| entry.scene.as_mut())
            .ok_or(SceneError::StaleScene { scene: id })
    }

    pub fn contains(&self, id: SceneId) -> bool {
        self.get(id).is_ok()
    }

    pub fn len(&self) -> usize {
        self.entries.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &Scene> {
        self.entries.iter().filter_map(|entry| entry.scene.as_ref())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Scene> {
        self.entries
            .iter_mut()
            .filter_map(|entry| entry.scene.as_mut())
    }

    /// Add `entity` to `scene` and record the [`SceneLink`] on it. An
    /// entity is linked to one live scene at a time.
    #[allow(clippy::too_many_arguments)]
    pub fn add_object(
        &mut self,
        registry: &mut Registry,
        factories: &DescriptorFactories,
        pipelines: &Pipelines,
        scene: SceneId,
        entity: Entity,
        pipeline: PipelineId,
        speed: UpdateSpeed,
    ) -> Result<SceneKey, SceneError> {
        if let Some(link) = registry.get_component::<SceneLink>(entity) {
            if self.contains(link.scene) {
                return Err(SceneError::ObjectExists {
                    entity,
                    scene: link.scene,
                });
            }
        }

        let target = self.get_mut(scene)?;
        let key = target.add_object(registry, factories, pipelines, entity, pipeline, speed)?;
        let link = SceneLink { scene, key };
        let linked = match registry.get_component_mut::<SceneLink>(entity) {
            Some(existing) => {
                *existing = link;
                Ok(())
            }
            None => registry.emplace_component(entity, link).map(|_| ()),
        };
        if let Err(err) = linked {
            target.remove_object(entity);
            return Err(err.into());
        }
        Ok(key)
    }

    /// Remove a live entity from the scene its link names and drop the
    /// link. Returns false when the entity was in no scene.
    pub fn remove_object(&mut self, registry: &mut Registry, entity: Entity) -> bool {
        match registry.remove_component::<SceneLink>(entity) {
            Ok(link) => self
                .get_mut(link.scene)
                .map(|scene| scene.remove_object(entity))
                .unwrap_or(false),
            Err(_) => self.release_entity(entity) > 0,
        }
    }

    /// Release `entity` from every scene without touching the registry.
    /// Used once the entity is gone. Returns how many scenes held it.
    pub fn release_entity(&mut self, entity: Entity) -> usize {
        self.iter_mut()
            .map(|scene| scene.remove_object(entity))
            .filter(|removed| *removed)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::Transform2D;
    use crate::descriptors::TRANSFORM_2D;
    use blib_core::math::Vec2;

    fn setup() -> (Registry, DescriptorFactories, Pipelines, PipelineId, Scenes) {
        let mut pipelines = Pipelines::new();
        let pipeline = pipelines.register("sprite", &[TRANSFORM_2D]);
        (
            Registry::new(),
            DescriptorFactories::with_builtins(),
            pipelines,
            pipeline,
            Scenes::new(RenderConfig::default()),
        )
    }

    #[test]
    fn destroyed_scene_ids_go_stale() {
        let mut scenes = Scenes::new(RenderConfig::default());
        let a = scenes.create();
        assert!(scenes.destroy(a).is_some());
        assert!(scenes.destroy(a).is_none());
        let b = scenes.create();
        assert_eq!(a.index(), b.index());
        assert_ne!(a, b);
        assert!(matches!(scenes.get(a), Err(SceneError::StaleScene { .. })));
        assert_eq!(scenes.get(b).unwrap().id(), b);
        assert_eq!(scenes.len(), 1);
    }

    #[test]
    fn add_links_and_remove_unlinks() {
        let (mut registry, factories, pipelines, pipeline, mut scenes) = setup();
        let scene = scenes.create();
        let e = registry.create_entity();
        registry
            .emplace_component(e, Transform2D::new(Vec2::ZERO))
            .unwrap();

        let key = scenes
            .add_object(&mut registry, &factories, &pipelines, scene, e, pipeline, UpdateSpeed::Static)
            .unwrap();
        assert_eq!(
            registry.get_component::<SceneLink>(e),
            Some(&SceneLink { scene, key })
        );

        let other = scenes.create();
        assert!(matches!(
            scenes.add_object(&mut registry, &factories, &pipelines, other, e, pipeline, UpdateSpeed::Static),
            Err(SceneError::ObjectExists { .. })
        ));

        assert!(scenes.remove_object(&mut registry, e));
        assert!(!registry.has_component::<SceneLink>(e));
        assert!(scenes.get(scene).unwrap().is_empty());
        assert!(!scenes.remove_object(&mut registry, e));
    }

    #[test]
    fn stale_link_is_overwritten() {
        let (mut registry, factories, pipelines, pipeline, mut scenes) = setup();
        let first = scenes.create();
        let e = registry.create_entity();
        registry
            .emplace_component(e, Transform2D::new(Vec2::ZERO))
            .unwrap();
        scenes
            .add_object(&mut registry, &factories, &pipelines, first, e, pipeline, UpdateSpeed::Dynamic)
            .unwrap();
        scenes.destroy(first);

        let second = scenes.create();
        scenes
            .add_object(&mut registry, &factories, &pipelines, second, e, pipeline, UpdateSpeed::Dynamic)
            .unwrap();
        assert_eq!(registry.get_component::<SceneLink>(e).unwrap().scene, second);
    }

    #[test]
    fn release_entity_works_after_destruction() {
        let (mut registry, factories, pipelines, pipeline, mut scenes) = setup();
        let scene = scenes.create();
        let e = registry.create_entity();
        registry
            .emplace_component(e, Transform2D::new(Vec2::ZERO))
            .unwrap();
        scenes
            .add_object(&mut registry, &factories, &pipelines, scene, e, pipeline, UpdateSpeed::Static)
            .unwrap();
        registry.destroy_entity(e).unwrap();
        assert_eq!(scenes.release_entity(e), 1);
        assert_eq!(scenes.release_entity(e), 0);
    }
}
