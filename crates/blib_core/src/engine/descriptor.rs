use crate::ecs::Component;
use crate::engine::FrameStage;
use std::any::TypeId;
use std::fmt;

/// A component type a system touches, identified independently of any
/// registry.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AccessKey {
    type_id: TypeId,
    name: &'static str,
}

impl AccessKey {
    pub fn of<T: Component>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            name: T::NAME,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Metadata describing how a system interacts with the registry.
///
/// The scheduler uses the write set to reject two writers of the same
/// component type in one stage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SystemDescriptor {
    name: String,
    reads: Vec<AccessKey>,
    writes: Vec<AccessKey>,
}

impl SystemDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reads: Vec::new(),
            writes: Vec::new(),
        }
    }

    pub fn reads<T: Component>(mut self) -> Self {
        Self::insert(&mut self.reads, AccessKey::of::<T>());
        self
    }

    pub fn writes<T: Component>(mut self) -> Self {
        Self::insert(&mut self.writes, AccessKey::of::<T>());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn read_components(&self) -> &[AccessKey] {
        &self.reads
    }

    pub fn write_components(&self) -> &[AccessKey] {
        &self.writes
    }

    /// First component type both descriptors write.
    pub fn write_conflict(&self, other: &SystemDescriptor) -> Option<AccessKey> {
        self.writes
            .iter()
            .find(|key| other.writes.binary_search(key).is_ok())
            .copied()
    }

    fn insert(list: &mut Vec<AccessKey>, key: AccessKey) {
        if let Err(pos) = list.binary_search(&key) {
            list.insert(pos, key);
        }
    }
}

/// Handle assigned to each registered system.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SystemHandle {
    stage: FrameStage,
    index: u32,
}

impl SystemHandle {
    pub(crate) fn new(stage: FrameStage, index: u32) -> Self {
        Self { stage, index }
    }

    pub fn stage(self) -> FrameStage {
        self.stage
    }

    /// Position within the stage, in registration order.
    #[inline]
    pub fn index(self) -> u32 {
        self.index
    }
}

impl fmt::Display for SystemHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.stage, self.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Position;
    crate::define_component!(Position);
    struct Velocity;
    crate::define_component!(Velocity);

    #[test]
    fn access_sets_are_deduplicated() {
        let d = SystemDescriptor::new("movement")
            .reads::<Velocity>()
            .reads::<Velocity>()
            .writes::<Position>();
        assert_eq!(d.read_components().len(), 1);
        assert_eq!(d.write_components()[0].name(), "Position");
    }

    #[test]
    fn detects_shared_writes() {
        let a = SystemDescriptor::new("a").writes::<Position>();
        let b = SystemDescriptor::new("b")
            .reads::<Position>()
            .writes::<Velocity>();
        let c = SystemDescriptor::new("c").writes::<Velocity>().writes::<Position>();
        assert!(a.write_conflict(&b).is_none());
        assert_eq!(a.write_conflict(&c), Some(AccessKey::of::<Position>()));
    }
}
