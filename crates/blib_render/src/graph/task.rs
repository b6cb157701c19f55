use crate::graph::{AssetId, AssetPool, ExecutionContext, InitContext};
use crate::GraphError;
use blib_core::engine::AsAny;

/// Asset tags a task consumes and produces.
///
/// Each input is a list of acceptable tags tried in order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TaskAssetTags {
    pub required_inputs: Vec<Vec<&'static str>>,
    pub optional_inputs: Vec<Vec<&'static str>>,
    /// Tags of existing assets the task may write to.
    pub concrete_outputs: Vec<&'static str>,
    /// Tag the task can create when another task needs it.
    pub created_output: Option<&'static str>,
}

impl TaskAssetTags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn require(mut self, tags: &[&'static str]) -> Self {
        self.required_inputs.push(tags.to_vec());
        self
    }

    pub fn optional(mut self, tags: &[&'static str]) -> Self {
        self.optional_inputs.push(tags.to_vec());
        self
    }

    pub fn writes(mut self, tag: &'static str) -> Self {
        self.concrete_outputs.push(tag);
        self
    }

    pub fn creates(mut self, tag: &'static str) -> Self {
        self.created_output = Some(tag);
        self
    }
}

/// Assets linked to a task by the last graph build, in declaration order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskAssets {
    pub required: Vec<AssetId>,
    pub optional: Vec<Option<AssetId>>,
    pub output: AssetId,
}

/// A render pass in a [`RenderGraph`](crate::graph::RenderGraph).
pub trait Task: AsAny + Send + Sync {
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    fn tags(&self) -> TaskAssetTags;

    /// Called once when the task is added to a graph.
    fn create(&mut self, _ctx: &InitContext) -> Result<(), GraphError> {
        Ok(())
    }

    /// Called after each build with the linked assets. Resolve concrete
    /// asset types here so mismatches fail the build.
    fn on_graph_init(&mut self, _assets: &TaskAssets, _pool: &AssetPool) -> Result<(), GraphError> {
        Ok(())
    }

    /// Record the pass. Must not allocate GPU resources.
    fn execute(&mut self, ctx: &ExecutionContext, assets: &TaskAssets, pool: &AssetPool);
}
