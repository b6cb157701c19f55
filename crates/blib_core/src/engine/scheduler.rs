// scheduler.rs - Systems bucketed into frame stages
//
// Registration enforces two rules: one instance per system type, and no
// two systems in the same stage writing the same component type. Systems
// in a stage run in registration order on the calling thread while the
// stage's frame tasks run on the worker pool.

use crate::engine::{
    AsAny, EngineContext, EngineError, FrameStage, StateMask, System, SystemDescriptor,
    SystemHandle, SystemRegistrationError,
};
use crate::time::StepTime;
use parking_lot::Mutex;
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

struct RegisteredSystem {
    mask: StateMask,
    descriptor: SystemDescriptor,
    type_name: &'static str,
    initialized: bool,
    system: Box<dyn System>,
}

struct StageSet {
    mutex: Arc<Mutex<()>>,
    systems: Vec<RegisteredSystem>,
}

pub struct Systems {
    stages: [StageSet; FrameStage::COUNT],
    type_map: HashMap<TypeId, SystemHandle>,
}

impl Systems {
    pub fn new() -> Self {
        Self {
            stages: std::array::from_fn(|_| StageSet {
                mutex: Arc::new(Mutex::new(())),
                systems: Vec::new(),
            }),
            type_map: HashMap::new(),
        }
    }

    pub fn register<S: System>(
        &mut self,
        stage: FrameStage,
        mask: StateMask,
        system: S,
    ) -> Result<SystemHandle, SystemRegistrationError> {
        let type_name = std::any::type_name::<S>();
        if self.type_map.contains_key(&TypeId::of::<S>()) {
            return Err(SystemRegistrationError::DuplicateType { name: type_name });
        }

        let descriptor = system.descriptor();
        let set = &mut self.stages[stage.index()];
        for existing in &set.systems {
            if let Some(key) = existing.descriptor.write_conflict(&descriptor) {
                return Err(SystemRegistrationError::ComponentWriteConflict {
                    component: key.name(),
                    stage,
                    existing: existing.descriptor.name().to_string(),
                    requested: descriptor.name().to_string(),
                });
            }
        }

        let handle = SystemHandle::new(stage, set.systems.len() as u32);
        tracing::debug!(system = descriptor.name(), %stage, "system registered");
        set.systems.push(RegisteredSystem {
            mask,
            descriptor,
            type_name,
            initialized: false,
            system: Box::new(system),
        });
        self.type_map.insert(TypeId::of::<S>(), handle);
        Ok(handle)
    }

    fn entry(&self, handle: SystemHandle) -> Option<&RegisteredSystem> {
        self.stages[handle.stage().index()]
            .systems
            .get(handle.index() as usize)
    }

    pub fn get<S: System>(&self) -> Option<&S> {
        let handle = self.type_map.get(&TypeId::of::<S>())?;
        let entry = self.entry(*handle)?;
        AsAny::as_any(&*entry.system).downcast_ref::<S>()
    }

    pub fn get_mut<S: System>(&mut self) -> Option<&mut S> {
        let handle = *self.type_map.get(&TypeId::of::<S>())?;
        let entry = self.stages[handle.stage().index()]
            .systems
            .get_mut(handle.index() as usize)?;
        AsAny::as_any_mut(&mut *entry.system).downcast_mut::<S>()
    }

    pub fn descriptor(&self, handle: SystemHandle) -> Option<&SystemDescriptor> {
        self.entry(handle).map(|entry| &entry.descriptor)
    }

    pub fn len(&self) -> usize {
        self.type_map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.type_map.is_empty()
    }

    pub fn stage_len(&self, stage: FrameStage) -> usize {
        self.stages[stage.index()].systems.len()
    }

    /// Mutex handed to every system and available to frame tasks of `stage`.
    pub fn stage_mutex(&self, stage: FrameStage) -> Arc<Mutex<()>> {
        self.stages[stage.index()].mutex.clone()
    }

    /// Initialize every system that has not been initialized yet, in stage order.
    pub(crate) fn init_pending(&mut self, ctx: &mut EngineContext) -> Result<(), EngineError> {
        for set in &mut self.stages {
            for entry in set.systems.iter_mut().filter(|e| !e.initialized) {
                entry
                    .system
                    .init(ctx)
                    .map_err(|source| EngineError::SystemInit {
                        system: entry.descriptor.name().to_string(),
                        source,
                    })?;
                entry.initialized = true;
                tracing::trace!(system = entry.type_name, "system initialized");
            }
        }
        Ok(())
    }

    /// Run one stage: launch its queued tasks, update every system whose
    /// mask matches the engine state, then join the tasks.
    pub(crate) fn run_stage(&mut self, stage: FrameStage, ctx: &mut EngineContext, time: &StepTime) {
        let set = &mut self.stages[stage.index()];
        let mut joins = ctx.tasks.launch(stage, &ctx.workers);

        for entry in set.systems.iter_mut() {
            if entry.initialized && entry.mask.intersects(ctx.state) {
                entry.system.update(ctx, &set.mutex, time);
            }
        }

        // Tasks queued by this stage's own systems still belong to it.
        joins.extend(ctx.tasks.launch(stage, &ctx.workers));
        for join in joins {
            join.join();
        }
    }
}

impl Default for Systems {
    fn default() -> Self {
        Self::new()
    }
}
