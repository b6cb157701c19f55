//! Engine loop: frame stages, system scheduling and the shared context.

mod config;
mod context;
mod descriptor;
mod error;
mod scheduler;
mod stage;
mod system;
mod task;

pub use config::EngineConfig;
pub use context::{EngineContext, Resources};
pub use descriptor::{AccessKey, SystemDescriptor, SystemHandle};
pub use error::{EngineError, SystemError, SystemRegistrationError};
pub use scheduler::Systems;
pub use stage::{FrameStage, StateMask};
pub use system::{AsAny, System};
pub use task::{FrameTasks, TaskHandle};

use crate::ecs::Registry;
use blib_metrics::{FrameTimer, StageProfiler};

/// What one call to [`Engine::run_frame`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameReport {
    pub frame: u64,
    pub ticks: u32,
    pub destroyed: usize,
}

/// Owns the context and the systems and drives them through the frame
/// stages.
pub struct Engine {
    ctx: EngineContext,
    systems: Systems,
    initialized: bool,
    /// Events up to this index were visible to `RenderObjectSync` this frame.
    events_consumed: usize,
    profiler: StageProfiler,
    frame_timer: FrameTimer,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        tracing::info!(
            tick_rate_hz = config.tick_rate_hz,
            variable_timestep = config.variable_timestep,
            "engine created"
        );
        Ok(Self {
            ctx: EngineContext::new(config)?,
            systems: Systems::new(),
            initialized: false,
            events_consumed: 0,
            profiler: StageProfiler::new(120),
            frame_timer: FrameTimer::new(120),
        })
    }

    pub fn context(&self) -> &EngineContext {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut EngineContext {
        &mut self.ctx
    }

    pub fn registry(&self) -> &Registry {
        &self.ctx.registry
    }

    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.ctx.registry
    }

    pub fn resources(&self) -> &Resources {
        &self.ctx.resources
    }

    pub fn resources_mut(&mut self) -> &mut Resources {
        &mut self.ctx.resources
    }

    pub fn systems(&self) -> &Systems {
        &self.systems
    }

    pub fn systems_mut(&mut self) -> &mut Systems {
        &mut self.systems
    }

    pub fn state(&self) -> StateMask {
        self.ctx.state
    }

    pub fn set_state(&mut self, state: StateMask) {
        tracing::debug!(from = ?self.ctx.state, to = ?state, "engine state changed");
        self.ctx.state = state;
    }

    pub fn profiler(&self) -> &StageProfiler {
        &self.profiler
    }

    pub fn frame_timer(&self) -> &FrameTimer {
        &self.frame_timer
    }

    /// Register a system into `stage`, active while the engine state
    /// intersects `mask`. Systems added after [`init`](Self::init) are
    /// initialized immediately.
    pub fn register_system<S: System>(
        &mut self,
        stage: FrameStage,
        mask: StateMask,
        system: S,
    ) -> Result<SystemHandle, EngineError> {
        let handle = self.systems.register(stage, mask, system)?;
        if self.initialized {
            self.systems.init_pending(&mut self.ctx)?;
        }
        Ok(handle)
    }

    /// Queue a closure for the worker pool during the next run of `stage`.
    pub fn add_frame_task<F>(&self, stage: FrameStage, task: F) -> TaskHandle
    where
        F: FnOnce() + Send + 'static,
    {
        self.ctx.tasks.add(stage, task)
    }

    /// Initialize every registered system. Called by the first frame if
    /// not called explicitly.
    pub fn init(&mut self) -> Result<(), EngineError> {
        if self.initialized {
            return Ok(());
        }
        self.systems.init_pending(&mut self.ctx)?;
        self.initialized = true;
        tracing::info!(systems = self.systems.len(), "engine initialized");
        Ok(())
    }

    /// Advance by `real_dt` seconds of wall time: run the per-tick stages
    /// for every due simulation tick, then the per-frame stages once.
    ///
    /// At frame end, queued destructions are flushed and events already
    /// seen by `RenderObjectSync` are discarded; later events carry over
    /// to the next frame.
    pub fn run_frame(&mut self, real_dt: f32) -> Result<FrameReport, EngineError> {
        self.init()?;
        self.frame_timer.begin();

        let ticks = self.ctx.clock.begin_frame(real_dt);
        for _ in 0..ticks {
            let time = self.ctx.clock.tick();
            for stage in FrameStage::per_tick() {
                self.run_stage(stage, &time);
            }
        }

        let time = self.ctx.clock.frame_time();
        for stage in FrameStage::per_frame() {
            self.run_stage(stage, &time);
            if stage == FrameStage::RenderObjectSync {
                self.events_consumed = self.ctx.registry.events().len();
            }
        }

        self.ctx.registry.discard_events(self.events_consumed);
        self.events_consumed = 0;
        let destroyed = self.ctx.registry.flush_deletions();

        self.ctx.frame += 1;
        self.frame_timer.end();
        Ok(FrameReport {
            frame: self.ctx.frame,
            ticks,
            destroyed,
        })
    }

    fn run_stage(&mut self, stage: FrameStage, time: &crate::time::StepTime) {
        let Engine {
            ctx,
            systems,
            profiler,
            ..
        } = self;
        blib_metrics::time_scope!(profiler, stage.name(), {
            systems.run_stage(stage, ctx, time);
        });
    }

    /// Destroy every entity and drop all resources.
    pub fn shutdown(&mut self) {
        self.ctx.registry.destroy_all_entities();
        self.ctx.registry.clear_events();
        self.ctx.resources = Resources::new();
        tracing::info!(frames = self.ctx.frame, "engine shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::StepTime;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Clone, Copy)]
    struct Position(f32);
    crate::define_component!(Position);

    #[derive(Default)]
    struct Log(Vec<FrameStage>);

    struct Recorder(FrameStage);

    impl System for Recorder {
        fn descriptor(&self) -> SystemDescriptor {
            SystemDescriptor::new(format!("recorder-{}", self.0))
        }

        fn update(&mut self, ctx: &mut EngineContext, _m: &Mutex<()>, _t: &StepTime) {
            if let Some(log) = ctx.resources.get_mut::<Log>() {
                log.0.push(self.0);
            }
        }
    }

    struct Mover;

    impl System for Mover {
        fn descriptor(&self) -> SystemDescriptor {
            SystemDescriptor::new("mover").writes::<Position>()
        }

        fn update(&mut self, ctx: &mut EngineContext, _m: &Mutex<()>, time: &StepTime) {
            if let Some(pool) = ctx.registry.pool_mut::<Position>() {
                for (_, p) in pool.iter_mut() {
                    p.0 += time.dt;
                }
            }
        }
    }

    struct OtherMover;

    impl System for OtherMover {
        fn descriptor(&self) -> SystemDescriptor {
            SystemDescriptor::new("other").writes::<Position>()
        }

        fn update(&mut self, _ctx: &mut EngineContext, _m: &Mutex<()>, _t: &StepTime) {}
    }

    struct Failing;

    impl System for Failing {
        fn descriptor(&self) -> SystemDescriptor {
            SystemDescriptor::new("failing")
        }

        fn init(&mut self, _ctx: &mut EngineContext) -> Result<(), SystemError> {
            Err("missing device".into())
        }

        fn update(&mut self, _ctx: &mut EngineContext, _m: &Mutex<()>, _t: &StepTime) {}
    }

    fn engine() -> Engine {
        Engine::new(EngineConfig {
            tick_rate_hz: 10.0,
            worker_threads: 2,
            ..EngineConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn stages_run_in_order_with_ticks_per_frame() {
        let mut engine = engine();
        engine.resources_mut().insert(Log::default());
        engine
            .register_system(FrameStage::Update1, StateMask::ALL, Recorder(FrameStage::Update1))
            .unwrap();
        struct FrameRecorder;
        impl System for FrameRecorder {
            fn descriptor(&self) -> SystemDescriptor {
                SystemDescriptor::new("frame-recorder")
            }
            fn update(&mut self, ctx: &mut EngineContext, _m: &Mutex<()>, _t: &StepTime) {
                if let Some(log) = ctx.resources.get_mut::<Log>() {
                    log.0.push(FrameStage::Render);
                }
            }
        }
        engine
            .register_system(FrameStage::Render, StateMask::ALL, FrameRecorder)
            .unwrap();

        let report = engine.run_frame(0.25).unwrap();
        assert_eq!(report.ticks, 2);
        assert_eq!(
            engine.resources().get::<Log>().unwrap().0,
            vec![FrameStage::Update1, FrameStage::Update1, FrameStage::Render]
        );
    }

    #[test]
    fn state_mask_filters_systems() {
        let mut engine = engine();
        engine.resources_mut().insert(Log::default());
        engine
            .register_system(FrameStage::Update2, StateMask::EDITOR, Recorder(FrameStage::Update2))
            .unwrap();
        engine.run_frame(0.1).unwrap();
        assert!(engine.resources().get::<Log>().unwrap().0.is_empty());

        engine.set_state(StateMask::EDITOR);
        engine.run_frame(0.1).unwrap();
        assert_eq!(engine.resources().get::<Log>().unwrap().0.len(), 1);
    }

    #[test]
    fn write_conflicts_are_rejected_per_stage() {
        let mut engine = engine();
        engine
            .register_system(FrameStage::Update1, StateMask::RUNNING, Mover)
            .unwrap();
        let err = engine
            .register_system(FrameStage::Update1, StateMask::RUNNING, OtherMover)
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Registration(SystemRegistrationError::ComponentWriteConflict {
                component: "Position",
                ..
            })
        ));
        engine
            .register_system(FrameStage::Update2, StateMask::RUNNING, OtherMover)
            .unwrap();
        assert!(matches!(
            engine.register_system(FrameStage::Animate, StateMask::RUNNING, Mover),
            Err(EngineError::Registration(SystemRegistrationError::DuplicateType { .. }))
        ));
    }

    #[test]
    fn systems_mutate_components_each_tick() {
        let mut engine = engine();
        let e = engine.registry_mut().create_entity();
        engine.registry_mut().emplace_component(e, Position(0.0)).unwrap();
        engine
            .register_system(FrameStage::Physics, StateMask::RUNNING, Mover)
            .unwrap();
        engine.run_frame(0.35).unwrap();
        let x = engine.registry().get_component::<Position>(e).unwrap().0;
        assert!((x - 0.3).abs() < 1e-4);
        assert!(engine.systems().get::<Mover>().is_some());
        assert!(engine.systems().get::<OtherMover>().is_none());
    }

    #[test]
    fn init_failure_is_reported() {
        let mut engine = engine();
        engine
            .register_system(FrameStage::FrameStart, StateMask::ALL, Failing)
            .unwrap();
        let err = engine.init().unwrap_err();
        assert!(matches!(err, EngineError::SystemInit { ref system, .. } if system == "failing"));
    }

    #[test]
    fn frame_tasks_join_at_stage_end() {
        let mut engine = engine();
        let hits = Arc::new(AtomicUsize::new(0));
        let handles: Vec<TaskHandle> = (0..4)
            .map(|_| {
                let hits = hits.clone();
                engine.add_frame_task(FrameStage::FrameEnd, move || {
                    hits.fetch_add(1, Ordering::SeqCst);
                })
            })
            .collect();
        engine.run_frame(0.0).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 4);
        assert!(handles.iter().all(TaskHandle::is_finished));
    }

    #[test]
    fn queued_deletions_flush_at_frame_end() {
        let mut engine = engine();
        let e = engine.registry_mut().create_entity();
        engine.registry_mut().queue_destroy(e);
        let report = engine.run_frame(0.0).unwrap();
        assert_eq!(report.destroyed, 1);
        assert!(!engine.registry().entity_exists(e));
        // The destruction event survives for the next frame's consumers.
        assert!(engine
            .registry()
            .events()
            .iter()
            .any(|ev| matches!(ev, crate::ecs::EcsEvent::EntityDestroyed { entity } if *entity == e)));
    }
}
