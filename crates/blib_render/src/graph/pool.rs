// pool.rs - Assets shared by the render graphs of one observer
//
// Assets are grouped by tag. Ownership is tracked per graph instead of
// locked: a request either claims an asset nobody owns or creates another
// instance. External assets (e.g. the presented target) are never
// reclaimed.

use crate::graph::{Asset, AssetState, ExecutionContext, GraphId, InitContext, PooledAsset};
use crate::GraphError;
use std::collections::HashMap;

type AssetCreator = Box<dyn Fn() -> Box<dyn Asset> + Send + Sync>;

/// Creators of pooled assets, by tag.
#[derive(Default)]
pub struct AssetFactory {
    creators: HashMap<&'static str, AssetCreator>,
}

impl AssetFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F, A>(&mut self, tag: &'static str, creator: F)
    where
        F: Fn() -> A + Send + Sync + 'static,
        A: Asset,
    {
        self.creators
            .insert(tag, Box::new(move || Box::new(creator()) as Box<dyn Asset>));
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.creators.contains_key(tag)
    }

    fn create(&self, tag: &'static str) -> Result<Box<dyn Asset>, GraphError> {
        let creator = self
            .creators
            .get(tag)
            .ok_or(GraphError::UnknownAssetTag { tag })?;
        Ok(creator())
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssetId(u32);

impl AssetId {
    pub fn index(self) -> u32 {
        self.0
    }
}

pub struct AssetPool {
    factory: AssetFactory,
    slots: Vec<Option<PooledAsset>>,
    free: Vec<u32>,
}

impl AssetPool {
    pub fn new(factory: AssetFactory) -> Self {
        Self {
            factory,
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    pub fn factory(&self) -> &AssetFactory {
        &self.factory
    }

    pub fn factory_mut(&mut self) -> &mut AssetFactory {
        &mut self.factory
    }

    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert(&mut self, pooled: PooledAsset) -> AssetId {
        match self.free.pop() {
            Some(index) => {
                self.slots[index as usize] = Some(pooled);
                AssetId(index)
            }
            None => {
                self.slots.push(Some(pooled));
                AssetId(self.slots.len() as u32 - 1)
            }
        }
    }

    /// Add an external asset. Terminal assets are final graph outputs.
    pub fn put_asset<A: Asset>(&mut self, tag: &'static str, asset: A, terminal: bool) -> AssetId {
        tracing::debug!(tag, terminal, "external asset added");
        self.insert(PooledAsset::new(tag, Box::new(asset), true, terminal))
    }

    /// Swap the single instance of `tag` for `asset`, or add it if there is
    /// none. Graphs using it must be rebuilt.
    pub fn replace_asset<A: Asset>(&mut self, tag: &'static str, asset: A) -> Result<AssetId, GraphError> {
        let ids: Vec<AssetId> = self.ids_with_tag(tag).collect();
        match ids.as_slice() {
            [] => Ok(self.put_asset(tag, asset, false)),
            [id] => {
                if let Some(pooled) = self.slot_mut(*id) {
                    pooled.replace(Box::new(asset));
                }
                Ok(*id)
            }
            _ => Err(GraphError::CannotReplaceMultiInstance {
                tag,
                count: ids.len(),
            }),
        }
    }

    pub fn ids_with_tag<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = AssetId> + 'a {
        self.iter()
            .filter(move |(_, pooled)| pooled.tag() == tag)
            .map(|(id, _)| id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (AssetId, &PooledAsset)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|pooled| (AssetId(i as u32), pooled)))
    }

    pub fn get(&self, id: AssetId) -> Option<&PooledAsset> {
        self.slots.get(id.0 as usize)?.as_ref()
    }

    fn slot_mut(&mut self, id: AssetId) -> Option<&mut PooledAsset> {
        self.slots.get_mut(id.0 as usize)?.as_mut()
    }

    pub fn state(&self, id: AssetId) -> Option<AssetState> {
        self.get(id).map(PooledAsset::state)
    }

    pub fn asset<T: Asset>(&self, id: AssetId) -> Option<&T> {
        self.get(id)?.downcast_ref::<T>()
    }

    pub fn asset_mut<T: Asset>(&mut self, id: AssetId) -> Option<&mut T> {
        self.slot_mut(id)?.downcast_mut::<T>()
    }

    /// Typed access for `on_graph_init`; a wrong type is a graph error.
    pub fn expect_asset<T: Asset>(&self, id: AssetId, task: &'static str) -> Result<&T, GraphError> {
        let pooled = self.get(id).ok_or(GraphError::ReleasedAsset { task })?;
        pooled
            .downcast_ref::<T>()
            .ok_or(GraphError::AssetTypeMismatch {
                task,
                tag: pooled.tag(),
                expected: std::any::type_name::<T>(),
            })
    }

    /// Existing asset for `tag` a graph may read or write: one it already
    /// owns, else an external one. Claims ownership.
    pub fn find_existing(&mut self, tag: &str, graph: GraphId) -> Option<AssetId> {
        let owned = self
            .iter()
            .find(|(_, p)| p.tag() == tag && p.is_owned_by(graph))
            .map(|(id, _)| id);
        let id = owned.or_else(|| {
            self.iter()
                .find(|(_, p)| p.tag() == tag && p.is_external())
                .map(|(id, _)| id)
        })?;
        self.slot_mut(id)?.add_owner(graph);
        Some(id)
    }

    /// Claim an unowned pooled instance of `tag` or create a new one.
    pub fn get_or_create_asset(&mut self, tag: &'static str, graph: GraphId) -> Result<AssetId, GraphError> {
        let free = self
            .iter()
            .find(|(_, p)| p.tag() == tag && !p.is_external() && p.owners().is_empty())
            .map(|(id, _)| id);
        let id = match free {
            Some(id) => id,
            None => {
                let asset = self.factory.create(tag)?;
                tracing::debug!(tag, ?graph, "pooled asset created");
                self.insert(PooledAsset::new(tag, asset, false, false))
            }
        };
        if let Some(pooled) = self.slot_mut(id) {
            pooled.add_owner(graph);
        }
        Ok(id)
    }

    /// Final output of the observer: the first terminal asset.
    pub fn final_output(&self) -> Option<AssetId> {
        self.iter().find(|(_, p)| p.is_terminal()).map(|(id, _)| id)
    }

    /// Drop `graph`'s ownership, moving its pooled assets to `Reset`.
    pub fn reset(&mut self, graph: GraphId) {
        for pooled in self.slots.iter_mut().flatten() {
            if pooled.is_owned_by(graph) {
                pooled.remove_owner(graph);
                if !pooled.is_external() {
                    pooled.reset();
                }
            }
        }
    }

    /// Destroy assets that no graph owns and that are not external.
    pub fn release_unused(&mut self) -> usize {
        let mut released = 0;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            let unused = slot
                .as_ref()
                .is_some_and(|p| !p.is_external() && p.owners().is_empty());
            if unused {
                *slot = None;
                self.free.push(index as u32);
                released += 1;
            }
        }
        if released > 0 {
            tracing::debug!(released, "unused assets released");
        }
        released
    }

    /// Forward an observer resize to every created asset.
    pub fn notify_resize(&mut self, ctx: &InitContext) {
        for pooled in self.slots.iter_mut().flatten() {
            pooled.resize(ctx);
        }
    }

    pub(crate) fn create(&mut self, id: AssetId, ctx: &InitContext) -> Result<(), GraphError> {
        match self.slot_mut(id) {
            Some(pooled) => pooled.create(ctx),
            None => Ok(()),
        }
    }

    pub(crate) fn prepare_for_input(&mut self, id: AssetId, ctx: &ExecutionContext) {
        if let Some(pooled) = self.slot_mut(id) {
            pooled.prepare_for_input(ctx);
        }
    }

    pub(crate) fn start_output(&mut self, id: AssetId, ctx: &ExecutionContext) {
        if let Some(pooled) = self.slot_mut(id) {
            pooled.start_output(ctx);
        }
    }

    pub(crate) fn end_output(&mut self, id: AssetId, ctx: &ExecutionContext) {
        if let Some(pooled) = self.slot_mut(id) {
            pooled.end_output(ctx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Color(u32);

    impl Asset for Color {
        fn create(&mut self, _ctx: &InitContext) -> Result<(), GraphError> {
            Ok(())
        }
    }

    struct Depth;

    impl Asset for Depth {
        fn create(&mut self, _ctx: &InitContext) -> Result<(), GraphError> {
            Ok(())
        }
    }

    fn pool() -> AssetPool {
        let mut factory = AssetFactory::new();
        factory.register("color", || Color(0));
        AssetPool::new(factory)
    }

    const A: GraphId = GraphId::new(0);
    const B: GraphId = GraphId::new(1);

    #[test]
    fn contention_creates_more_instances() {
        let mut pool = pool();
        let first = pool.get_or_create_asset("color", A).unwrap();
        let second = pool.get_or_create_asset("color", B).unwrap();
        assert_ne!(first, second);
        assert_eq!(pool.ids_with_tag("color").count(), 2);

        pool.reset(A);
        let reused = pool.get_or_create_asset("color", B).unwrap();
        assert_eq!(reused, first);
        assert!(matches!(
            pool.get_or_create_asset("normals", A),
            Err(GraphError::UnknownAssetTag { tag: "normals" })
        ));
    }

    #[test]
    fn release_unused_keeps_external_and_owned() {
        let mut pool = pool();
        let external = pool.put_asset("final", Color(1), true);
        let owned = pool.get_or_create_asset("color", A).unwrap();
        let orphan = pool.get_or_create_asset("color", B).unwrap();
        pool.reset(B);

        assert_eq!(pool.release_unused(), 1);
        assert!(pool.get(orphan).is_none());
        assert!(pool.get(owned).is_some());
        assert!(pool.get(external).is_some());
        assert_eq!(pool.final_output(), Some(external));
    }

    #[test]
    fn replace_requires_a_single_instance() {
        let mut pool = pool();
        let id = pool.replace_asset("shadow", Color(1)).unwrap();
        let replaced = pool.replace_asset("shadow", Color(2)).unwrap();
        assert_eq!(id, replaced);
        assert_eq!(pool.asset::<Color>(id).unwrap().0, 2);

        pool.get_or_create_asset("color", A).unwrap();
        pool.get_or_create_asset("color", B).unwrap();
        assert!(matches!(
            pool.replace_asset("color", Color(3)),
            Err(GraphError::CannotReplaceMultiInstance { count: 2, .. })
        ));
    }

    #[test]
    fn find_existing_prefers_owned_then_external() {
        let mut pool = pool();
        assert!(pool.find_existing("color", A).is_none());
        let external = pool.put_asset("color", Color(7), false);
        assert_eq!(pool.find_existing("color", A), Some(external));
        assert!(pool.get(external).unwrap().is_owned_by(A));
    }

    #[test]
    fn expect_asset_reports_type_mismatch() {
        let mut pool = pool();
        let id = pool.put_asset("depth", Depth, false);
        assert!(pool.expect_asset::<Depth>(id, "lighting").is_ok());
        let err = pool.expect_asset::<Color>(id, "lighting").unwrap_err();
        assert!(matches!(
            err,
            GraphError::AssetTypeMismatch {
                task: "lighting",
                tag: "depth",
                ..
            }
        ));
    }
}
