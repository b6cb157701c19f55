// storage.rs - Per-scene mirror of one descriptor component type
//
// Each update speed keeps the latest payload per slot plus a number of
// buffered copies: one for static objects, one per frame in flight for
// dynamic objects. A change sets one pending bit per copy; syncing frame
// `f` refreshes copy `f % copies` for every slot with that bit set and
// uploads the touched slot range as one write.
//
// Versions only order changes of one component instance, so a component
// added to an entity since the event log was cleared is always recopied.

use crate::components::DescriptorComponent;
use crate::descriptors::{
    BufferSink, BufferTarget, DescriptorSetInstance, ObjectBinding, SetBinding, SyncStats,
};
use crate::scene::{DescriptorSetKind, SceneId, SceneKey, UpdateSpeed};
use crate::config::MAX_FRAMES_IN_FLIGHT;
use crate::{RenderConfig, SceneError};
use blib_core::ecs::{Component, EcsEvent, Entity, Registry};
use std::collections::HashSet;
use std::mem::size_of;

/// Inclusive slot range. Empty while `start > end`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DirtyRange {
    pub start: u32,
    pub end: u32,
}

impl DirtyRange {
    pub const EMPTY: DirtyRange = DirtyRange {
        start: u32::MAX,
        end: 0,
    };

    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }

    pub fn include(&mut self, slot: u32) {
        self.start = self.start.min(slot);
        self.end = self.end.max(slot);
    }

    pub fn len(&self) -> u32 {
        if self.is_empty() {
            0
        } else {
            self.end - self.start + 1
        }
    }
}

struct SpeedPart<P> {
    speed: UpdateSpeed,
    entities: Vec<Entity>,
    synced_version: Vec<Option<u32>>,
    latest: Vec<P>,
    pending: Vec<u8>,
    copies: Vec<Vec<P>>,
    /// Slots covered by the bound buffers.
    bound_slots: u32,
    /// One bit per copy whose binding must be refreshed.
    rebind: u8,
    rebind_this_frame: bool,
}

impl<P: bytemuck::Pod + Default> SpeedPart<P> {
    fn new(speed: UpdateSpeed, copy_count: u32) -> Self {
        Self {
            speed,
            entities: Vec::new(),
            synced_version: Vec::new(),
            latest: Vec::new(),
            pending: Vec::new(),
            copies: (0..copy_count).map(|_| Vec::new()).collect(),
            bound_slots: 0,
            rebind: 0,
            rebind_this_frame: false,
        }
    }

    fn all_copies(&self) -> u8 {
        ((1u16 << self.copies.len()) - 1) as u8
    }

    fn copy_index(&self, frame: u32) -> usize {
        frame as usize % self.copies.len()
    }

    fn ensure_slot(&mut self, slot: u32) {
        let needed = slot as usize + 1;
        if self.entities.len() < needed {
            self.entities.resize(needed, Entity::INVALID);
            self.synced_version.resize(needed, None);
            self.latest.resize(needed, P::default());
            self.pending.resize(needed, 0);
            for copy in &mut self.copies {
                copy.resize(needed, P::default());
            }
        }
        if slot >= self.bound_slots {
            self.bound_slots = (slot + 1).next_power_of_two();
            self.rebind = self.all_copies();
        }
    }
}

/// Descriptor data of component `C` for every object of one scene.
pub struct DescriptorComponentStorage<C: DescriptorComponent> {
    scene: SceneId,
    kind: DescriptorSetKind,
    static_part: SpeedPart<C::Payload>,
    dynamic_part: SpeedPart<C::Payload>,
}

/// Entities that received a new `C` since the registry event log was
/// last cleared.
fn added_since_clear<C: Component>(registry: &Registry) -> HashSet<Entity> {
    let Some(id) = registry.component_id::<C>() else {
        return HashSet::new();
    };
    registry
        .events()
        .iter()
        .filter_map(|event| match *event {
            EcsEvent::ComponentAdded { entity, component } if component == id => Some(entity),
            _ => None,
        })
        .collect()
}

impl<C: DescriptorComponent> DescriptorComponentStorage<C> {
    /// Dynamic objects get one copy per frame in flight, clamped to
    /// `1..=MAX_FRAMES_IN_FLIGHT` so every copy has a pending bit.
    pub fn new(scene: SceneId, kind: DescriptorSetKind, config: &RenderConfig) -> Self {
        let copies = config.frames_in_flight.clamp(1, MAX_FRAMES_IN_FLIGHT);
        if copies != config.frames_in_flight {
            tracing::warn!(
                requested = config.frames_in_flight,
                copies,
                kind,
                "frames in flight out of range, clamped"
            );
        }
        Self {
            scene,
            kind,
            static_part: SpeedPart::new(UpdateSpeed::Static, 1),
            dynamic_part: SpeedPart::new(UpdateSpeed::Dynamic, copies),
        }
    }

    fn part(&self, speed: UpdateSpeed) -> &SpeedPart<C::Payload> {
        match speed {
            UpdateSpeed::Static => &self.static_part,
            UpdateSpeed::Dynamic => &self.dynamic_part,
        }
    }

    fn part_mut(&mut self, speed: UpdateSpeed) -> &mut SpeedPart<C::Payload> {
        match speed {
            UpdateSpeed::Static => &mut self.static_part,
            UpdateSpeed::Dynamic => &mut self.dynamic_part,
        }
    }

    /// Buffered copies kept for `speed`.
    pub fn copy_count(&self, speed: UpdateSpeed) -> u32 {
        self.part(speed).copies.len() as u32
    }

    /// Payload a sync of `frame` would bind.
    pub fn copy(&self, speed: UpdateSpeed, frame: u32) -> &[C::Payload] {
        let part = self.part(speed);
        &part.copies[part.copy_index(frame)]
    }

    pub fn latest(&self, key: SceneKey) -> Option<&C::Payload> {
        let part = self.part(key.speed);
        let slot = key.slot as usize;
        (part.entities.get(slot)? != &Entity::INVALID).then(|| &part.latest[slot])
    }

    /// Copies of `key` not yet refreshed, one bit per copy.
    pub fn pending_mask(&self, key: SceneKey) -> u8 {
        self.part(key.speed)
            .pending
            .get(key.slot as usize)
            .copied()
            .unwrap_or(0)
    }

    fn target(&self, speed: UpdateSpeed, copy: usize) -> BufferTarget {
        BufferTarget {
            scene: self.scene,
            kind: self.kind,
            speed,
            copy: copy as u32,
        }
    }

    fn sync_part(
        &mut self,
        speed: UpdateSpeed,
        frame: u32,
        sink: &mut dyn BufferSink,
        stats: &mut SyncStats,
    ) {
        let scene = self.scene;
        let kind = self.kind;
        let part = self.part_mut(speed);
        let copy = part.copy_index(frame);
        let bit = 1u8 << copy;

        let mut range = DirtyRange::EMPTY;
        for slot in 0..part.pending.len() {
            if part.pending[slot] & bit != 0 {
                part.copies[copy][slot] = part.latest[slot];
                part.pending[slot] &= !bit;
                range.include(slot as u32);
                stats.slots_copied += 1;
            }
        }

        part.rebind_this_frame = part.rebind & bit != 0;
        part.rebind &= !bit;
        if part.rebind_this_frame {
            stats.rebinds += 1;
        }

        if range.is_empty() {
            return;
        }
        let data = &part.copies[copy][range.start as usize..=range.end as usize];
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let target = BufferTarget {
            scene,
            kind,
            speed,
            copy: copy as u32,
        };
        sink.upload(
            target,
            range.start as u64 * size_of::<C::Payload>() as u64,
            bytes,
        );
        stats.bytes_uploaded += bytes.len() as u64;
        stats.uploads += 1;
    }
}

impl<C: DescriptorComponent> DescriptorSetInstance for DescriptorComponentStorage<C> {
    fn kind(&self) -> DescriptorSetKind {
        self.kind
    }

    fn allocate_object(
        &mut self,
        registry: &Registry,
        entity: Entity,
        key: SceneKey,
    ) -> Result<(), SceneError> {
        let component =
            registry
                .get_component::<C>(entity)
                .ok_or(SceneError::MissingComponent {
                    entity,
                    component: C::NAME,
                })?;
        let part = self.part_mut(key.speed);
        part.ensure_slot(key.slot);
        let slot = key.slot as usize;
        part.entities[slot] = entity;
        part.synced_version[slot] = Some(component.version());
        part.latest[slot] = C::Payload::default();
        component.refresh_descriptor(&mut part.latest[slot]);
        part.pending[slot] = part.all_copies();
        Ok(())
    }

    fn release_object(&mut self, key: SceneKey) {
        let part = self.part_mut(key.speed);
        let slot = key.slot as usize;
        if slot < part.entities.len() {
            part.entities[slot] = Entity::INVALID;
            part.synced_version[slot] = None;
            part.pending[slot] = 0;
        }
    }

    fn copy_from_ecs(&mut self, registry: &Registry) -> usize {
        let Some(pool) = registry.pool::<C>() else {
            return 0;
        };
        let added = added_since_clear::<C>(registry);
        let mut changed = 0;
        for part in [&mut self.static_part, &mut self.dynamic_part] {
            let all = part.all_copies();
            for slot in 0..part.entities.len() {
                let entity = part.entities[slot];
                if entity == Entity::INVALID {
                    continue;
                }
                // A removed component keeps its last payload.
                let Some(component) = pool.get(entity) else {
                    continue;
                };
                let version = component.version();
                if part.synced_version[slot] != Some(version) || added.contains(&entity) {
                    component.refresh_descriptor(&mut part.latest[slot]);
                    part.synced_version[slot] = Some(version);
                    part.pending[slot] = all;
                    changed += 1;
                }
            }
        }
        changed
    }

    fn perform_sync(&mut self, frame: u32, sink: &mut dyn BufferSink, stats: &mut SyncStats) {
        self.sync_part(UpdateSpeed::Static, frame, sink, stats);
        self.sync_part(UpdateSpeed::Dynamic, frame, sink, stats);
    }

    fn descriptor_update_required(&self, speed: UpdateSpeed) -> bool {
        self.part(speed).rebind_this_frame
    }

    fn bind_for_object(&self, key: SceneKey, frame: u32) -> ObjectBinding {
        let part = self.part(key.speed);
        let stride = size_of::<C::Payload>() as u64;
        ObjectBinding {
            target: self.target(key.speed, part.copy_index(frame)),
            offset: key.slot as u64 * stride,
            size: stride,
        }
    }

    fn bind_for_pipeline(&self, speed: UpdateSpeed, frame: u32) -> SetBinding {
        let part = self.part(speed);
        SetBinding {
            target: self.target(speed, part.copy_index(frame)),
            size: part.bound_slots as u64 * size_of::<C::Payload>() as u64,
            stride: size_of::<C::Payload>() as u64,
        }
    }
}
