use crate::scene::{DescriptorSetKind, SceneId, UpdateSpeed};
use std::collections::HashMap;

/// Identifies one GPU-visible buffer: a descriptor set kind in one scene,
/// for one update speed and one buffered copy.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct BufferTarget {
    pub scene: SceneId,
    pub kind: DescriptorSetKind,
    pub speed: UpdateSpeed,
    pub copy: u32,
}

/// Destination of descriptor uploads.
pub trait BufferSink: Send + Sync {
    /// Write `bytes` at byte `offset` of `target`, growing it if needed.
    fn upload(&mut self, target: BufferTarget, offset: u64, bytes: &[u8]);

    /// Drop every buffer of `scene`.
    fn release_scene(&mut self, scene: SceneId);
}

/// CPU mirror of the uploaded buffers, used when no GPU is available.
#[derive(Debug, Default)]
pub struct MemorySink {
    buffers: HashMap<BufferTarget, Vec<u8>>,
    uploads: u64,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn buffer(&self, target: &BufferTarget) -> Option<&[u8]> {
        self.buffers.get(target).map(Vec::as_slice)
    }

    /// Number of `upload` calls so far.
    pub fn upload_count(&self) -> u64 {
        self.uploads
    }
}

impl BufferSink for MemorySink {
    fn upload(&mut self, target: BufferTarget, offset: u64, bytes: &[u8]) {
        let buffer = self.buffers.entry(target).or_default();
        let start = offset as usize;
        let end = start + bytes.len();
        if buffer.len() < end {
            buffer.resize(end, 0);
        }
        buffer[start..end].copy_from_slice(bytes);
        self.uploads += 1;
    }

    fn release_scene(&mut self, scene: SceneId) {
        self.buffers.retain(|target, _| target.scene != scene);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uploads_land_at_offset() {
        let target = BufferTarget {
            scene: SceneId::new(0, 1),
            kind: "texture",
            speed: UpdateSpeed::Dynamic,
            copy: 0,
        };
        let mut sink = MemorySink::new();
        sink.upload(target, 4, &[1, 2]);
        sink.upload(target, 0, &[9]);
        assert_eq!(sink.buffer(&target), Some(&[9, 0, 0, 0, 1, 2][..]));
        assert_eq!(sink.upload_count(), 2);
        sink.release_scene(target.scene);
        assert!(sink.buffer(&target).is_none());
    }
}
