use crate::SceneError;
use std::collections::HashMap;
use std::fmt;

/// Name of a kind of descriptor set, e.g. `"transform2d"`. Instances are
/// created per scene from a registered factory.
pub type DescriptorSetKind = &'static str;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PipelineId(u32);

impl PipelineId {
    pub fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for PipelineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pipeline#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineDesc {
    pub name: String,
    /// Descriptor set kinds bound by the pipeline, in binding order.
    pub sets: Vec<DescriptorSetKind>,
}

/// Pipeline layouts known to the renderer.
#[derive(Debug, Default)]
pub struct Pipelines {
    descs: Vec<PipelineDesc>,
    by_name: HashMap<String, PipelineId>,
}

impl Pipelines {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pipeline. Registering a name again replaces its sets and
    /// keeps the id.
    pub fn register(&mut self, name: &str, sets: &[DescriptorSetKind]) -> PipelineId {
        let desc = PipelineDesc {
            name: name.to_string(),
            sets: sets.to_vec(),
        };
        if let Some(&id) = self.by_name.get(name) {
            self.descs[id.0 as usize] = desc;
            return id;
        }
        let id = PipelineId(self.descs.len() as u32);
        self.descs.push(desc);
        self.by_name.insert(name.to_string(), id);
        tracing::debug!(pipeline = name, ?sets, "pipeline registered");
        id
    }

    pub fn get(&self, id: PipelineId) -> Result<&PipelineDesc, SceneError> {
        self.descs
            .get(id.0 as usize)
            .ok_or(SceneError::UnknownPipeline { pipeline: id })
    }

    pub fn find(&self, name: &str) -> Option<PipelineId> {
        self.by_name.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.descs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descs.is_empty()
    }
}
