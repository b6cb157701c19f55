use crate::ecs::Registry;
use crate::engine::{EngineConfig, EngineError, FrameTasks, StateMask};
use crate::time::FixedTimestep;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::any::{Any, TypeId};
use std::collections::HashMap;

/// Type-keyed storage for engine-wide singletons such as render scenes.
#[derive(Default)]
pub struct Resources {
    map: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Resources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a resource, returning the one it replaced.
    pub fn insert<T: Any + Send + Sync>(&mut self, value: T) -> Option<T> {
        self.map
            .insert(TypeId::of::<T>(), Box::new(value))
            .and_then(|old| old.downcast::<T>().ok())
            .map(|old| *old)
    }

    pub fn get<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.map.get(&TypeId::of::<T>())?.downcast_ref::<T>()
    }

    pub fn get_mut<T: Any + Send + Sync>(&mut self) -> Option<&mut T> {
        self.map.get_mut(&TypeId::of::<T>())?.downcast_mut::<T>()
    }

    pub fn remove<T: Any + Send + Sync>(&mut self) -> Option<T> {
        self.map
            .remove(&TypeId::of::<T>())
            .and_then(|old| old.downcast::<T>().ok())
            .map(|old| *old)
    }

    pub fn contains<T: Any + Send + Sync>(&self) -> bool {
        self.map.contains_key(&TypeId::of::<T>())
    }

    /// Temporarily take a resource out so it can be used alongside
    /// `&mut EngineContext`.
    pub fn scoped<T, R>(
        ctx: &mut EngineContext,
        f: impl FnOnce(&mut T, &mut EngineContext) -> R,
    ) -> Option<R>
    where
        T: Any + Send + Sync,
    {
        let mut value = ctx.resources.remove::<T>()?;
        let result = f(&mut value, ctx);
        ctx.resources.insert(value);
        Some(result)
    }
}

/// Everything a system can reach during an update.
///
/// Fields are public so a system can borrow the registry and a resource
/// at the same time.
pub struct EngineContext {
    pub registry: Registry,
    pub resources: Resources,
    pub config: EngineConfig,
    pub clock: FixedTimestep,
    pub state: StateMask,
    pub tasks: FrameTasks,
    pub workers: ThreadPool,
    /// Rendered frames completed so far.
    pub frame: u64,
}

impl EngineContext {
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let workers = ThreadPoolBuilder::new()
            .num_threads(config.worker_threads)
            .thread_name(|i| format!("blib-worker-{i}"))
            .build()?;
        tracing::debug!(threads = workers.current_num_threads(), "worker pool started");
        Ok(Self {
            registry: Registry::new(),
            resources: Resources::new(),
            clock: FixedTimestep::from_config(&config),
            config,
            state: StateMask::RUNNING,
            tasks: FrameTasks::new(),
            workers,
            frame: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Gravity(f32);

    #[test]
    fn resources_are_typed() {
        let mut res = Resources::new();
        assert!(res.insert(Gravity(9.8)).is_none());
        assert_eq!(res.insert(Gravity(1.6)), Some(Gravity(9.8)));
        res.get_mut::<Gravity>().unwrap().0 = 3.7;
        assert_eq!(res.get::<Gravity>(), Some(&Gravity(3.7)));
        assert!(!res.contains::<u32>());
        assert_eq!(res.remove::<Gravity>(), Some(Gravity(3.7)));
        assert!(res.get::<Gravity>().is_none());
    }

    #[test]
    fn scoped_access_reinserts() {
        let mut ctx = EngineContext::new(EngineConfig {
            worker_threads: 1,
            ..EngineConfig::default()
        })
        .unwrap();
        ctx.resources.insert(Gravity(1.0));
        let entity = Resources::scoped::<Gravity, _>(&mut ctx, |g, ctx| {
            g.0 = 2.0;
            ctx.registry.create_entity()
        })
        .unwrap();
        assert!(ctx.registry.entity_exists(entity));
        assert_eq!(ctx.resources.get::<Gravity>(), Some(&Gravity(2.0)));
    }
}
