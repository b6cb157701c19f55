//! Render graph: tasks (render passes) connected through pooled assets.
//!
//! A build links every task input to an existing asset or to a task that
//! can create it, keeps the tasks that contribute to the final output and
//! orders them into timeline steps. Execution walks the steps, moving each
//! asset through its input/output states around the task that uses it.

mod asset;
mod context;
mod pool;
mod task;
pub mod tasks;

pub use asset::{Asset, AssetState, PooledAsset, TargetSize};
pub use context::{ExecutionContext, InitContext};
pub use pool::{AssetFactory, AssetId, AssetPool};
pub use task::{Task, TaskAssetTags, TaskAssets};

use crate::GraphError;
use blib_core::engine::AsAny;
use std::fmt;

/// Well-known asset tags.
pub mod tags {
    /// The observer's presented target.
    pub const FINAL_OUTPUT: &str = "final_output";
    pub const SCENE_COLOR: &str = "scene_color";
}

/// Identifies a graph as an owner of pooled assets.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GraphId(u32);

impl GraphId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }
}

impl fmt::Display for GraphId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "graph#{}", self.0)
    }
}

struct TaskEntry {
    task: Box<dyn Task>,
    tags: TaskAssetTags,
    assets: Option<TaskAssets>,
}

pub struct RenderGraph {
    id: GraphId,
    tasks: Vec<TaskEntry>,
    timeline: Vec<Vec<usize>>,
    needs_rebuild: bool,
}

/// Links found while building, indexed like `RenderGraph::tasks`.
struct Links {
    required: Vec<Vec<Option<AssetId>>>,
    optional: Vec<Vec<Option<AssetId>>>,
    outputs: Vec<Option<AssetId>>,
}

impl Links {
    fn inputs(&self, task: usize) -> impl Iterator<Item = AssetId> + '_ {
        self.required[task]
            .iter()
            .chain(self.optional[task].iter())
            .flatten()
            .copied()
    }
}

impl RenderGraph {
    pub fn new(id: GraphId) -> Self {
        Self {
            id,
            tasks: Vec::new(),
            timeline: Vec::new(),
            needs_rebuild: true,
        }
    }

    pub fn id(&self) -> GraphId {
        self.id
    }

    /// Add a task and run its `create` hook. Returns the task index.
    pub fn put_task<T: Task>(&mut self, mut task: T, ctx: &InitContext) -> Result<usize, GraphError> {
        task.create(ctx)?;
        tracing::debug!(graph = %self.id, task = task.name(), "task added");
        self.tasks.push(TaskEntry {
            tags: task.tags(),
            task: Box::new(task),
            assets: None,
        });
        self.needs_rebuild = true;
        Ok(self.tasks.len() - 1)
    }

    /// Add `task` unless a task of the same type exists.
    pub fn put_unique_task<T: Task>(&mut self, task: T, ctx: &InitContext) -> Result<usize, GraphError> {
        match self.task_index::<T>() {
            Some(index) => Ok(index),
            None => self.put_task(task, ctx),
        }
    }

    fn task_index<T: Task>(&self) -> Option<usize> {
        self.tasks
            .iter()
            .position(|entry| AsAny::as_any(entry.task.as_ref()).is::<T>())
    }

    pub fn has_task<T: Task>(&self) -> bool {
        self.task_index::<T>().is_some()
    }

    pub fn find_task<T: Task>(&self) -> Option<&T> {
        self.tasks
            .iter()
            .find_map(|entry| AsAny::as_any(entry.task.as_ref()).downcast_ref::<T>())
    }

    pub fn find_task_mut<T: Task>(&mut self) -> Option<&mut T> {
        self.tasks
            .iter_mut()
            .find_map(|entry| AsAny::as_any_mut(entry.task.as_mut()).downcast_mut::<T>())
    }

    pub fn remove_task<T: Task>(&mut self) -> bool {
        match self.task_index::<T>() {
            Some(index) => {
                self.tasks.remove(index);
                self.needs_rebuild = true;
                true
            }
            None => false,
        }
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Assets linked to task `index` by the last build, `None` when the
    /// task does not contribute to the final output.
    pub fn task_assets(&self, index: usize) -> Option<&TaskAssets> {
        self.tasks.get(index)?.assets.as_ref()
    }

    /// Task indices grouped into steps; a step only reads what earlier
    /// steps wrote.
    pub fn timeline(&self) -> &[Vec<usize>] {
        &self.timeline
    }

    pub fn mark_dirty(&mut self) {
        self.needs_rebuild = true;
    }

    pub fn needs_rebuild(&self) -> bool {
        self.needs_rebuild
    }

    pub fn build(&mut self, pool: &mut AssetPool, ctx: &InitContext) -> Result<(), GraphError> {
        pool.reset(self.id);
        self.timeline.clear();
        for entry in &mut self.tasks {
            entry.tags = entry.task.tags();
            entry.assets = None;
        }

        let links = self.link_assets(pool)?;
        let reachable = self.reachable_tasks(pool, &links)?;

        for (index, _) in reachable.iter().enumerate().filter(|(_, r)| **r) {
            if let Some(output) = links.outputs[index] {
                pool.create(output, ctx)?;
            }
            for input in links.inputs(index) {
                pool.create(input, ctx)?;
            }
        }

        let mut steps: Vec<Option<usize>> = vec![None; self.tasks.len()];
        let mut visiting = vec![false; self.tasks.len()];
        for index in 0..self.tasks.len() {
            if reachable[index] {
                self.step_of(index, &links, &reachable, &mut steps, &mut visiting)?;
            }
        }
        for (index, step) in steps.iter().enumerate() {
            if let Some(step) = *step {
                if self.timeline.len() <= step {
                    self.timeline.resize_with(step + 1, Vec::new);
                }
                self.timeline[step].push(index);
            }
        }

        for step in &self.timeline {
            for &index in step {
                let (Some(output), Some(required)) = (
                    links.outputs[index],
                    links.required[index].iter().copied().collect::<Option<Vec<_>>>(),
                ) else {
                    continue;
                };
                let assets = TaskAssets {
                    required,
                    optional: links.optional[index].clone(),
                    output,
                };
                let entry = &mut self.tasks[index];
                entry.task.on_graph_init(&assets, pool)?;
                entry.assets = Some(assets);
            }
        }

        self.needs_rebuild = false;
        tracing::debug!(
            graph = %self.id,
            steps = self.timeline.len(),
            active = reachable.iter().filter(|r| **r).count(),
            tasks = self.tasks.len(),
            "render graph built"
        );
        Ok(())
    }

    fn link_assets(&self, pool: &mut AssetPool) -> Result<Links, GraphError> {
        let graph = self.id;
        let find_any = |pool: &mut AssetPool, options: &[&'static str]| {
            options.iter().find_map(|tag| pool.find_existing(tag, graph))
        };

        let mut links = Links {
            required: Vec::with_capacity(self.tasks.len()),
            optional: Vec::with_capacity(self.tasks.len()),
            outputs: vec![None; self.tasks.len()],
        };
        for entry in &self.tasks {
            let required = entry
                .tags
                .required_inputs
                .iter()
                .map(|o| find_any(pool, o.as_slice()))
                .collect();
            let optional = entry
                .tags
                .optional_inputs
                .iter()
                .map(|o| find_any(pool, o.as_slice()))
                .collect();
            links.required.push(required);
            links.optional.push(optional);
        }

        for index in 0..self.tasks.len() {
            let tags = &self.tasks[index].tags;
            for (slot, options) in tags.required_inputs.iter().enumerate() {
                if links.required[index][slot].is_some() {
                    continue;
                }
                let found = match find_any(pool, options.as_slice()) {
                    Some(id) => Some(id),
                    None => self.create_from_task(index, options, pool, &mut links)?,
                };
                if found.is_none() {
                    tracing::error!(
                        graph = %self.id,
                        task = self.tasks[index].task.name(),
                        ?options,
                        "required input has no source"
                    );
                    return Err(GraphError::MissingRequiredInput {
                        task: self.tasks[index].task.name(),
                        tags: options.clone(),
                    });
                }
                links.required[index][slot] = found;
            }
            for (slot, options) in tags.optional_inputs.iter().enumerate() {
                if links.optional[index][slot].is_some() {
                    continue;
                }
                links.optional[index][slot] = match find_any(pool, options.as_slice()) {
                    Some(id) => Some(id),
                    None => self.create_from_task(index, options, pool, &mut links)?,
                };
            }
        }

        for (index, entry) in self.tasks.iter().enumerate() {
            if links.outputs[index].is_none() {
                links.outputs[index] = entry
                    .tags
                    .concrete_outputs
                    .iter()
                    .find_map(|tag| pool.find_existing(tag, graph));
            }
        }
        Ok(links)
    }

    /// Let another task whose output is still unlinked create one of
    /// `options` for `consumer`.
    fn create_from_task(
        &self,
        consumer: usize,
        options: &[&'static str],
        pool: &mut AssetPool,
        links: &mut Links,
    ) -> Result<Option<AssetId>, GraphError> {
        for (index, entry) in self.tasks.iter().enumerate() {
            if index == consumer || links.outputs[index].is_some() {
                continue;
            }
            let Some(tag) = entry.tags.created_output.filter(|tag| options.contains(tag)) else {
                continue;
            };
            let id = pool.get_or_create_asset(tag, self.id)?;
            links.outputs[index] = Some(id);
            return Ok(Some(id));
        }
        Ok(None)
    }

    /// Tasks that contribute to the final output, found by walking inputs
    /// back from it.
    fn reachable_tasks(&self, pool: &AssetPool, links: &Links) -> Result<Vec<bool>, GraphError> {
        let final_output = pool.final_output().ok_or(GraphError::FinalOutputNotProduced)?;
        let mut reachable = vec![false; self.tasks.len()];
        let mut visited = vec![final_output];
        let mut pending = vec![final_output];
        while let Some(asset) = pending.pop() {
            for index in 0..self.tasks.len() {
                if reachable[index] || links.outputs[index] != Some(asset) {
                    continue;
                }
                reachable[index] = true;
                for input in links.inputs(index) {
                    if !visited.contains(&input) {
                        visited.push(input);
                        pending.push(input);
                    }
                }
            }
        }
        if !reachable.iter().any(|r| *r) {
            return Err(GraphError::FinalOutputNotProduced);
        }
        Ok(reachable)
    }

    fn step_of(
        &self,
        index: usize,
        links: &Links,
        reachable: &[bool],
        steps: &mut [Option<usize>],
        visiting: &mut [bool],
    ) -> Result<usize, GraphError> {
        if let Some(step) = steps[index] {
            return Ok(step);
        }
        if visiting[index] {
            return Err(GraphError::DependencyCycle {
                task: self.tasks[index].task.name(),
            });
        }
        visiting[index] = true;
        let mut step = 0;
        for input in links.inputs(index) {
            for producer in 0..self.tasks.len() {
                if producer != index && reachable[producer] && links.outputs[producer] == Some(input) {
                    step = step.max(self.step_of(producer, links, reachable, steps, visiting)? + 1);
                }
            }
        }
        visiting[index] = false;
        steps[index] = Some(step);
        Ok(step)
    }

    /// Run every active task in timeline order, rebuilding first if the
    /// graph is dirty.
    pub fn execute(
        &mut self,
        pool: &mut AssetPool,
        init: &InitContext,
        ctx: &ExecutionContext,
    ) -> Result<(), GraphError> {
        if self.needs_rebuild {
            self.build(pool, init)?;
        }
        for step in &self.timeline {
            for &index in step {
                let entry = &mut self.tasks[index];
                let Some(assets) = entry.assets.as_ref() else {
                    continue;
                };
                for &input in &assets.required {
                    pool.prepare_for_input(input, ctx);
                }
                for input in assets.optional.iter().flatten() {
                    pool.prepare_for_input(*input, ctx);
                }
                pool.start_output(assets.output, ctx);
                entry.task.execute(ctx, assets, pool);
            }
        }
        for step in &self.timeline {
            for &index in step {
                if let Some(assets) = &self.tasks[index].assets {
                    pool.end_output(assets.output, ctx);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blib_core::math::UVec2;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Default)]
    struct Image {
        resets: u32,
    }

    impl Asset for Image {
        fn create(&mut self, _ctx: &InitContext) -> Result<(), GraphError> {
            Ok(())
        }

        fn on_reset(&mut self) {
            self.resets += 1;
        }
    }

    struct Buffer;

    impl Asset for Buffer {
        fn create(&mut self, _ctx: &InitContext) -> Result<(), GraphError> {
            Ok(())
        }
    }

    type Log = Arc<Mutex<Vec<&'static str>>>;

    /// Generic pass recording its execution order.
    struct Pass {
        name: &'static str,
        tags: TaskAssetTags,
        log: Log,
        seen_states: Vec<AssetState>,
    }

    impl Pass {
        fn new(name: &'static str, tags: TaskAssetTags, log: &Log) -> Self {
            Self {
                name,
                tags,
                log: log.clone(),
                seen_states: Vec::new(),
            }
        }
    }

    impl Task for Pass {
        fn name(&self) -> &'static str {
            self.name
        }

        fn tags(&self) -> TaskAssetTags {
            self.tags.clone()
        }

        fn execute(&mut self, _ctx: &ExecutionContext, assets: &TaskAssets, pool: &AssetPool) {
            self.log.lock().push(self.name);
            self.seen_states.clear();
            for id in &assets.required {
                self.seen_states.extend(pool.state(*id));
            }
            self.seen_states.extend(pool.state(assets.output));
        }
    }

    /// Insists that its input is an `Image`.
    struct Sampler;

    impl Task for Sampler {
        fn tags(&self) -> TaskAssetTags {
            TaskAssetTags::new().require(&["shadow"]).writes(tags::FINAL_OUTPUT)
        }

        fn on_graph_init(&mut self, assets: &TaskAssets, pool: &AssetPool) -> Result<(), GraphError> {
            pool.expect_asset::<Image>(assets.required[0], self.name())?;
            Ok(())
        }

        fn execute(&mut self, _ctx: &ExecutionContext, _assets: &TaskAssets, _pool: &AssetPool) {}
    }

    fn pool_with_final() -> (AssetPool, AssetId) {
        let mut factory = AssetFactory::new();
        factory.register("scene", Image::default);
        factory.register("bloom", Image::default);
        factory.register("shadow", || Buffer);
        let mut pool = AssetPool::new(factory);
        let final_output = pool.put_asset(tags::FINAL_OUTPUT, Image::default(), true);
        (pool, final_output)
    }

    fn init() -> InitContext<'static> {
        InitContext::headless(UVec2::new(64, 64), 2)
    }

    fn exec() -> ExecutionContext<'static> {
        ExecutionContext::headless(UVec2::new(64, 64), 0)
    }

    #[test]
    fn producers_run_before_consumers() {
        let log = Log::default();
        let (mut pool, final_output) = pool_with_final();
        let mut graph = RenderGraph::new(GraphId::new(0));
        let ctx = init();
        // Declared out of order on purpose.
        let composite = graph
            .put_task(
                Pass::new(
                    "composite",
                    TaskAssetTags::new()
                        .require(&["scene"])
                        .optional(&["bloom"])
                        .writes(tags::FINAL_OUTPUT),
                    &log,
                ),
                &ctx,
            )
            .unwrap();
        graph
            .put_task(Pass::new("bloom", TaskAssetTags::new().require(&["scene"]).creates("bloom"), &log), &ctx)
            .unwrap();
        graph
            .put_task(Pass::new("scene", TaskAssetTags::new().creates("scene"), &log), &ctx)
            .unwrap();

        graph.execute(&mut pool, &ctx, &exec()).unwrap();
        assert_eq!(*log.lock(), vec!["scene", "bloom", "composite"]);
        assert_eq!(graph.timeline(), &[vec![2], vec![1], vec![0]]);

        let assets = graph.task_assets(composite).unwrap();
        assert_eq!(assets.output, final_output);
        assert!(assets.optional[0].is_some());
        assert_eq!(pool.state(final_output), Some(AssetState::Created));

        let seen = &graph.find_task::<Pass>().unwrap().seen_states;
        assert_eq!(seen, &[AssetState::PreparedForInput, AssetState::StartedOutput]);
    }

    #[test]
    fn tasks_not_feeding_the_final_output_are_skipped() {
        let log = Log::default();
        let (mut pool, _) = pool_with_final();
        let mut graph = RenderGraph::new(GraphId::new(0));
        let ctx = init();
        graph
            .put_task(Pass::new("present", TaskAssetTags::new().writes(tags::FINAL_OUTPUT), &log), &ctx)
            .unwrap();
        let orphan = graph
            .put_task(Pass::new("orphan", TaskAssetTags::new().creates("scene"), &log), &ctx)
            .unwrap();
        graph.execute(&mut pool, &ctx, &exec()).unwrap();
        assert_eq!(*log.lock(), vec!["present"]);
        assert!(graph.task_assets(orphan).is_none());
    }

    #[test]
    fn missing_required_input_fails_the_build() {
        let log = Log::default();
        let (mut pool, _) = pool_with_final();
        let mut graph = RenderGraph::new(GraphId::new(0));
        let ctx = init();
        graph
            .put_task(
                Pass::new("lighting", TaskAssetTags::new().require(&["gbuffer", "scene"]).writes(tags::FINAL_OUTPUT), &log),
                &ctx,
            )
            .unwrap();
        let err = graph.build(&mut pool, &ctx).unwrap_err();
        assert_eq!(
            err,
            GraphError::MissingRequiredInput {
                task: "lighting",
                tags: vec!["gbuffer", "scene"],
            }
        );
    }

    #[test]
    fn graph_without_final_writer_fails() {
        let log = Log::default();
        let (mut pool, _) = pool_with_final();
        let mut graph = RenderGraph::new(GraphId::new(0));
        let ctx = init();
        graph
            .put_task(Pass::new("scene", TaskAssetTags::new().creates("scene"), &log), &ctx)
            .unwrap();
        assert_eq!(graph.build(&mut pool, &ctx), Err(GraphError::FinalOutputNotProduced));

        let mut empty_pool = AssetPool::new(AssetFactory::new());
        assert_eq!(graph.build(&mut empty_pool, &ctx), Err(GraphError::FinalOutputNotProduced));
    }

    #[test]
    fn asset_type_mismatch_fails_fast() {
        let log = Log::default();
        let (mut pool, _) = pool_with_final();
        let mut graph = RenderGraph::new(GraphId::new(0));
        let ctx = init();
        graph.put_task(Sampler, &ctx).unwrap();
        graph
            .put_task(Pass::new("shadows", TaskAssetTags::new().creates("shadow"), &log), &ctx)
            .unwrap();
        let err = graph.build(&mut pool, &ctx).unwrap_err();
        assert!(matches!(err, GraphError::AssetTypeMismatch { tag: "shadow", .. }));
    }

    #[test]
    fn rebuild_resets_and_reuses_assets() {
        let log = Log::default();
        let (mut pool, _) = pool_with_final();
        let mut graph = RenderGraph::new(GraphId::new(0));
        let ctx = init();
        graph
            .put_task(Pass::new("present", TaskAssetTags::new().require(&["scene"]).writes(tags::FINAL_OUTPUT), &log), &ctx)
            .unwrap();
        graph
            .put_task(Pass::new("scene", TaskAssetTags::new().creates("scene"), &log), &ctx)
            .unwrap();
        graph.execute(&mut pool, &ctx, &exec()).unwrap();
        let scene = pool.ids_with_tag("scene").next().unwrap();

        graph.mark_dirty();
        graph.execute(&mut pool, &ctx, &exec()).unwrap();
        assert_eq!(pool.ids_with_tag("scene").collect::<Vec<_>>(), vec![scene]);
        assert_eq!(pool.asset::<Image>(scene).unwrap().resets, 1);
        assert_eq!(pool.state(scene), Some(AssetState::PreparedForInput));
        assert_eq!(pool.release_unused(), 0);

        assert!(graph.remove_task::<Pass>());
        assert!(graph.needs_rebuild());
    }

    #[test]
    fn separate_graphs_get_separate_instances() {
        let log = Log::default();
        let (mut pool, _) = pool_with_final();
        let ctx = init();
        let mut graphs: Vec<RenderGraph> = (0..2).map(|i| RenderGraph::new(GraphId::new(i))).collect();
        for graph in &mut graphs {
            graph
                .put_task(Pass::new("present", TaskAssetTags::new().require(&["scene"]).writes(tags::FINAL_OUTPUT), &log), &ctx)
                .unwrap();
            graph
                .put_task(Pass::new("scene", TaskAssetTags::new().creates("scene"), &log), &ctx)
                .unwrap();
            graph.build(&mut pool, &ctx).unwrap();
        }
        assert_eq!(pool.ids_with_tag("scene").count(), 2);
    }
}
