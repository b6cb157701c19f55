// renderer.rs - Render state shared by the render systems
//
// Lives in the engine resources. Owns the scenes, the pipeline layouts,
// the descriptor sink and one render graph with its asset pool per
// observer.

use crate::descriptors::{BufferSink, DescriptorFactories, MemorySink, SyncStats};
use crate::gpu::{GpuBufferSink, GpuContext, TextureTargetAsset};
use crate::graph::tasks::{CompositePass, ScenePass};
use crate::graph::{
    tags, AssetFactory, AssetPool, ExecutionContext, GraphId, InitContext, RenderGraph, TargetSize,
};
use crate::scene::{PipelineId, Pipelines, SceneId, SceneKey, Scenes, UpdateSpeed};
use crate::{GraphError, RenderConfig, RenderError, SceneError};
use blib_core::ecs::{Entity, Registry};
use blib_core::math::UVec2;
use blib_metrics::Counter;
use std::sync::Arc;

/// A view into one scene with its own render graph.
pub struct Observer {
    scene: Option<SceneId>,
    size: UVec2,
    graph: RenderGraph,
    pool: AssetPool,
}

impl Observer {
    pub fn scene(&self) -> Option<SceneId> {
        self.scene
    }

    pub fn set_scene(&mut self, scene: Option<SceneId>) {
        self.scene = scene;
    }

    pub fn size(&self) -> UVec2 {
        self.size
    }

    pub fn graph(&self) -> &RenderGraph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut RenderGraph {
        &mut self.graph
    }

    pub fn pool(&self) -> &AssetPool {
        &self.pool
    }

    pub fn pool_mut(&mut self) -> &mut AssetPool {
        &mut self.pool
    }
}

pub struct Renderer {
    config: RenderConfig,
    gpu: Option<Arc<GpuContext>>,
    pipelines: Pipelines,
    factories: DescriptorFactories,
    scenes: Scenes,
    observers: Vec<Observer>,
    sink: Box<dyn BufferSink>,
    frame_index: u32,
    frames_rendered: u64,
    last_sync: SyncStats,
    counters: Counter,
}

impl Renderer {
    /// Renderer uploading to `gpu`, or to an in-memory mirror without one.
    pub fn new(config: RenderConfig, gpu: Option<Arc<GpuContext>>) -> Result<Self, RenderError> {
        config.validate()?;
        let sink: Box<dyn BufferSink> = match &gpu {
            Some(gpu) => Box::new(GpuBufferSink::new(gpu.clone())),
            None => Box::new(MemorySink::new()),
        };
        tracing::info!(
            frames_in_flight = config.frames_in_flight,
            gpu = gpu.is_some(),
            "renderer created"
        );
        Ok(Self {
            scenes: Scenes::new(config.clone()),
            config,
            gpu,
            pipelines: Pipelines::new(),
            factories: DescriptorFactories::with_builtins(),
            observers: Vec::new(),
            sink,
            frame_index: 0,
            frames_rendered: 0,
            last_sync: SyncStats::default(),
            counters: Counter::new(),
        })
    }

    /// Open a device when `config.use_gpu` is set, falling back to the
    /// in-memory mirror when none is available.
    pub fn from_config(config: RenderConfig) -> Result<Self, RenderError> {
        let gpu = if config.use_gpu {
            match GpuContext::new_headless() {
                Ok(gpu) => Some(Arc::new(gpu)),
                Err(err) => {
                    tracing::warn!(%err, "no gpu, rendering headless");
                    None
                }
            }
        } else {
            None
        };
        Self::new(config, gpu)
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn gpu(&self) -> Option<&GpuContext> {
        self.gpu.as_deref()
    }

    pub fn pipelines(&self) -> &Pipelines {
        &self.pipelines
    }

    pub fn register_pipeline(&mut self, name: &str, sets: &[&'static str]) -> PipelineId {
        self.pipelines.register(name, sets)
    }

    pub fn factories_mut(&mut self) -> &mut DescriptorFactories {
        &mut self.factories
    }

    pub fn scenes(&self) -> &Scenes {
        &self.scenes
    }

    pub fn scenes_mut(&mut self) -> &mut Scenes {
        &mut self.scenes
    }

    pub fn sink(&self) -> &dyn BufferSink {
        self.sink.as_ref()
    }

    /// Frame in flight the next sync and render use.
    pub fn frame_index(&self) -> u32 {
        self.frame_index
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    pub fn last_sync(&self) -> SyncStats {
        self.last_sync
    }

    pub fn counters(&self) -> &Counter {
        &self.counters
    }

    pub fn create_scene(&mut self) -> SceneId {
        self.scenes.create()
    }

    pub fn destroy_scene(&mut self, scene: SceneId) -> bool {
        if self.scenes.destroy(scene).is_none() {
            return false;
        }
        self.sink.release_scene(scene);
        for observer in &mut self.observers {
            if observer.scene == Some(scene) {
                observer.scene = None;
            }
        }
        true
    }

    /// Add an observer with an empty graph. Its asset pool already holds
    /// the final output target. Returns the observer index.
    pub fn add_observer(&mut self, scene: Option<SceneId>) -> usize {
        let index = self.observers.len();
        let mut factory = AssetFactory::new();
        factory.register(tags::SCENE_COLOR, || {
            TextureTargetAsset::new(tags::SCENE_COLOR, TargetSize::ObserverSize)
        });
        let mut pool = AssetPool::new(factory);
        pool.put_asset(
            tags::FINAL_OUTPUT,
            TextureTargetAsset::new(tags::FINAL_OUTPUT, TargetSize::ObserverSize),
            true,
        );
        self.observers.push(Observer {
            scene,
            size: UVec2::from_array(self.config.initial_size),
            graph: RenderGraph::new(GraphId::new(index as u32)),
            pool,
        });
        tracing::debug!(observer = index, ?scene, "observer added");
        index
    }

    /// Observer drawing `scene` through the built-in scene and composite
    /// passes.
    pub fn add_default_observer(&mut self, scene: SceneId) -> Result<usize, GraphError> {
        let index = self.add_observer(Some(scene));
        let size = self.observers[index].size;
        let Renderer {
            gpu,
            config,
            observers,
            ..
        } = self;
        let ctx = InitContext::new(gpu.as_deref(), size, config.frames_in_flight);
        let graph = &mut observers[index].graph;
        graph.put_task(ScenePass::new([0.0, 0.0, 0.0, 1.0]), &ctx)?;
        graph.put_task(CompositePass::new(), &ctx)?;
        Ok(index)
    }

    pub fn observer(&self, index: usize) -> Option<&Observer> {
        self.observers.get(index)
    }

    pub fn observer_mut(&mut self, index: usize) -> Option<&mut Observer> {
        self.observers.get_mut(index)
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Resize an observer's targets and rebuild its graph before the next
    /// frame.
    pub fn resize_observer(&mut self, index: usize, size: UVec2) {
        let Some(observer) = self.observers.get_mut(index) else {
            return;
        };
        if observer.size == size {
            return;
        }
        observer.size = size;
        let ctx = InitContext::new(self.gpu.as_deref(), size, self.config.frames_in_flight);
        observer.pool.notify_resize(&ctx);
        observer.graph.mark_dirty();
        tracing::debug!(observer = index, width = size.x, height = size.y, "observer resized");
    }

    pub fn add_object(
        &mut self,
        registry: &mut Registry,
        scene: SceneId,
        entity: Entity,
        pipeline: PipelineId,
        speed: UpdateSpeed,
    ) -> Result<SceneKey, SceneError> {
        self.scenes.add_object(
            registry,
            &self.factories,
            &self.pipelines,
            scene,
            entity,
            pipeline,
            speed,
        )
    }

    pub fn remove_object(&mut self, registry: &mut Registry, entity: Entity) -> bool {
        self.scenes.remove_object(registry, entity)
    }

    /// Release a destroyed entity from every scene.
    pub fn release_entity(&mut self, entity: Entity) -> usize {
        self.scenes.release_entity(entity)
    }

    /// Copy changed component data of every scene into the current frame's
    /// buffers.
    pub fn sync_descriptors(&mut self, registry: &Registry) -> SyncStats {
        let mut stats = SyncStats::default();
        for scene in self.scenes.iter_mut() {
            stats.merge(scene.sync_descriptors(registry, self.frame_index, self.sink.as_mut()));
        }
        self.counters.add("descriptor_slots_copied", stats.slots_copied);
        self.counters.add("descriptor_bytes_uploaded", stats.bytes_uploaded);
        self.counters.add("descriptor_uploads", stats.uploads);
        self.last_sync = stats;
        stats
    }

    /// Build every observer graph that needs it.
    pub fn build_graphs(&mut self) -> Result<(), GraphError> {
        for index in 0..self.observers.len() {
            let size = self.observers[index].size;
            let ctx = InitContext::new(self.gpu.as_deref(), size, self.config.frames_in_flight);
            let observer = &mut self.observers[index];
            if observer.graph.needs_rebuild() {
                observer.graph.build(&mut observer.pool, &ctx)?;
            }
        }
        Ok(())
    }

    /// Execute every observer graph, then advance to the next frame in
    /// flight. A graph that fails to rebuild is skipped for the frame.
    pub fn render(&mut self) -> Result<(), GraphError> {
        let frame = self.frame_index;
        let Renderer {
            config,
            gpu,
            scenes,
            observers,
            ..
        } = self;
        let mut result = Ok(());
        for observer in observers.iter_mut() {
            let init = InitContext::new(gpu.as_deref(), observer.size, config.frames_in_flight);
            let ctx = ExecutionContext {
                gpu: gpu.as_deref(),
                scene: observer.scene.and_then(|id| scenes.get(id).ok()),
                observer_size: observer.size,
                frame,
            };
            if let Err(err) = observer.graph.execute(&mut observer.pool, &init, &ctx) {
                tracing::error!(graph = %observer.graph.id(), %err, "render graph failed");
                result = Err(err);
            }
        }
        self.frame_index = (self.frame_index + 1) % self.config.frames_in_flight;
        self.frames_rendered += 1;
        self.counters.add("frames_rendered", 1);
        result
    }

    /// Release pooled assets no graph owns anymore.
    pub fn release_unused_assets(&mut self) -> usize {
        self.observers
            .iter_mut()
            .map(|observer| observer.pool.release_unused())
            .sum()
    }
}
