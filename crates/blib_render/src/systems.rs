//! Render systems for the `RenderObjectSync`, `RenderDescriptorRefresh`
//! and `Render` frame stages. All of them work on the [`Renderer`]
//! resource.

use crate::components::{Rendered, SceneLink, Texture, Transform2D, Transform3D};
use crate::{Renderer, SceneError};
use blib_core::ecs::{EcsEvent, Registry};
use blib_core::engine::{
    Engine, EngineContext, EngineError, FrameStage, Resources, StateMask, System,
    SystemDescriptor, SystemError,
};
use blib_core::time::StepTime;
use parking_lot::Mutex;

/// Keeps scene membership in line with the `Rendered` component by
/// replaying the registry event log.
#[derive(Default)]
pub struct ObjectSyncSystem {
    events: Vec<EcsEvent>,
}

impl ObjectSyncSystem {
    pub fn new() -> Self {
        Self::default()
    }

    fn sync(&mut self, renderer: &mut Renderer, registry: &mut Registry) {
        let Some(rendered) = registry.component_id::<Rendered>() else {
            return;
        };
        self.events.clear();
        self.events.extend_from_slice(registry.events());

        for event in &self.events {
            match *event {
                EcsEvent::ComponentAdded { entity, component } if component == rendered => {
                    // Gone again before this stage ran.
                    let Some(request) = registry.get_component::<Rendered>(entity).copied() else {
                        continue;
                    };
                    match renderer.add_object(
                        registry,
                        request.scene,
                        entity,
                        request.pipeline,
                        request.speed,
                    ) {
                        Ok(key) => tracing::trace!(?entity, ?key, "entity added to scene"),
                        Err(SceneError::ObjectExists { .. }) => {}
                        Err(err) => tracing::warn!(?entity, %err, "entity not added to scene"),
                    }
                }
                EcsEvent::ComponentRemoved { entity, component } if component == rendered => {
                    if registry.entity_exists(entity) {
                        renderer.remove_object(registry, entity);
                    } else {
                        renderer.release_entity(entity);
                    }
                }
                EcsEvent::EntityDestroyed { entity } => {
                    renderer.release_entity(entity);
                }
                _ => {}
            }
        }
    }
}

impl System for ObjectSyncSystem {
    fn descriptor(&self) -> SystemDescriptor {
        SystemDescriptor::new("render-object-sync")
            .reads::<Rendered>()
            .writes::<SceneLink>()
    }

    fn update(&mut self, ctx: &mut EngineContext, _stage_mutex: &Mutex<()>, _time: &StepTime) {
        Resources::scoped::<Renderer, _>(ctx, |renderer, ctx| {
            self.sync(renderer, &mut ctx.registry)
        });
    }
}

/// Copies changed descriptor components into the current frame's buffers.
#[derive(Default)]
pub struct DescriptorSyncSystem;

impl System for DescriptorSyncSystem {
    fn descriptor(&self) -> SystemDescriptor {
        SystemDescriptor::new("render-descriptor-sync")
            .reads::<Transform2D>()
            .reads::<Transform3D>()
            .reads::<Texture>()
    }

    fn update(&mut self, ctx: &mut EngineContext, _stage_mutex: &Mutex<()>, _time: &StepTime) {
        if let Some(renderer) = ctx.resources.get_mut::<Renderer>() {
            let stats = renderer.sync_descriptors(&ctx.registry);
            tracing::trace!(copied = stats.slots_copied, bytes = stats.bytes_uploaded, "descriptors synced");
        }
    }
}

/// Executes the observer graphs.
#[derive(Default)]
pub struct RenderSystem {
    failed_frames: u64,
}

impl RenderSystem {
    pub fn failed_frames(&self) -> u64 {
        self.failed_frames
    }
}

impl System for RenderSystem {
    fn descriptor(&self) -> SystemDescriptor {
        SystemDescriptor::new("render")
    }

    /// Builds every graph so topology errors stop startup.
    fn init(&mut self, ctx: &mut EngineContext) -> Result<(), SystemError> {
        let renderer = ctx
            .resources
            .get_mut::<Renderer>()
            .ok_or("no Renderer resource")?;
        renderer.build_graphs()?;
        Ok(())
    }

    fn update(&mut self, ctx: &mut EngineContext, _stage_mutex: &Mutex<()>, _time: &StepTime) {
        if let Some(renderer) = ctx.resources.get_mut::<Renderer>() {
            if renderer.render().is_err() {
                self.failed_frames += 1;
            }
        }
    }
}

/// Insert `renderer` as a resource and register the three render systems.
pub fn install(engine: &mut Engine, renderer: Renderer) -> Result<(), EngineError> {
    engine.resources_mut().insert(renderer);
    engine.register_system(
        FrameStage::RenderObjectSync,
        StateMask::ALL,
        ObjectSyncSystem::new(),
    )?;
    engine.register_system(
        FrameStage::RenderDescriptorRefresh,
        StateMask::ALL,
        DescriptorSyncSystem,
    )?;
    engine.register_system(FrameStage::Render, StateMask::ALL, RenderSystem::default())?;
    Ok(())
}
