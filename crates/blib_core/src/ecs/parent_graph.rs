//! Parent/child relationships between entities.
//!
//! Stored flat, indexed by entity index: one parent slot per entity and an
//! adjacency list of children. The graph is kept acyclic by walking the
//! proposed parent's ancestors on every `set_parent`.

use crate::ecs::{EcsError, Entity};

#[derive(Default)]
pub struct ParentGraph {
    parents: Vec<Entity>,
    children: Vec<Vec<Entity>>,
}

impl ParentGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure(&mut self, entity: Entity) {
        let needed = entity.index() as usize + 1;
        if self.parents.len() < needed {
            self.parents.resize(needed, Entity::INVALID);
            self.children.resize_with(needed, Vec::new);
        }
    }

    /// Current parent, `Entity::INVALID` if none.
    pub fn parent(&self, child: Entity) -> Entity {
        self.parents
            .get(child.index() as usize)
            .copied()
            .unwrap_or(Entity::INVALID)
    }

    pub fn children(&self, parent: Entity) -> &[Entity] {
        self.children
            .get(parent.index() as usize)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn has_children(&self, parent: Entity) -> bool {
        !self.children(parent).is_empty()
    }

    /// True if `ancestor` appears on the parent chain of `entity`.
    pub fn is_ancestor(&self, ancestor: Entity, entity: Entity) -> bool {
        let mut current = self.parent(entity);
        while current.is_valid() {
            if current == ancestor {
                return true;
            }
            current = self.parent(current);
        }
        false
    }

    /// Attach `child` under `parent`, replacing any previous parent.
    ///
    /// Returns the previous parent. Rejected without changes if `parent` is
    /// `child` itself or one of its descendants.
    pub fn set_parent(&mut self, child: Entity, parent: Entity) -> Result<Entity, EcsError> {
        if child == parent {
            return Err(EcsError::SelfParent { entity: child });
        }
        if self.is_ancestor(child, parent) {
            return Err(EcsError::ParentCycle { child, parent });
        }
        self.ensure(child);
        self.ensure(parent);

        let previous = self.parents[child.index() as usize];
        if previous == parent {
            return Ok(previous);
        }
        if previous.is_valid() {
            self.unlink_child(previous, child);
        }
        self.parents[child.index() as usize] = parent;
        self.children[parent.index() as usize].push(child);
        Ok(previous)
    }

    /// Detach `child` from its parent, returning the old parent if any.
    pub fn remove_parent(&mut self, child: Entity) -> Option<Entity> {
        let slot = self.parents.get_mut(child.index() as usize)?;
        let previous = std::mem::replace(slot, Entity::INVALID);
        if !previous.is_valid() {
            return None;
        }
        self.unlink_child(previous, child);
        Some(previous)
    }

    /// Detach every child of `parent`, returning them.
    pub fn detach_children(&mut self, parent: Entity) -> Vec<Entity> {
        let Some(list) = self.children.get_mut(parent.index() as usize) else {
            return Vec::new();
        };
        let detached = std::mem::take(list);
        for child in &detached {
            self.parents[child.index() as usize] = Entity::INVALID;
        }
        detached
    }

    /// Descendants of `root` in breadth-first order, excluding `root`.
    pub fn descendants(&self, root: Entity) -> Vec<Entity> {
        let mut out: Vec<Entity> = self.children(root).to_vec();
        let mut cursor = 0;
        while cursor < out.len() {
            let next = out[cursor];
            out.extend_from_slice(self.children(next));
            cursor += 1;
        }
        out
    }

    pub fn clear(&mut self) {
        self.parents.clear();
        self.children.clear();
    }

    fn unlink_child(&mut self, parent: Entity, child: Entity) {
        if let Some(list) = self.children.get_mut(parent.index() as usize) {
            if let Some(pos) = list.iter().position(|c| *c == child) {
                list.swap_remove(pos);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::EntityFlags;
    use crate::math::DeterministicRng;

    fn e(index: u32) -> Entity {
        Entity::new(index, 1, 0, EntityFlags::NONE)
    }

    #[test]
    fn set_and_remove_parent() {
        let mut graph = ParentGraph::new();
        assert_eq!(graph.set_parent(e(5), e(9)), Ok(Entity::INVALID));
        assert_eq!(graph.parent(e(5)), e(9));
        assert_eq!(graph.children(e(9)), &[e(5)]);

        assert_eq!(graph.remove_parent(e(5)), Some(e(9)));
        assert!(!graph.parent(e(5)).is_valid());
        assert!(!graph.has_children(e(9)));
        assert_eq!(graph.remove_parent(e(5)), None);
    }

    #[test]
    fn reparenting_moves_child() {
        let mut graph = ParentGraph::new();
        graph.set_parent(e(1), e(2)).unwrap();
        assert_eq!(graph.set_parent(e(1), e(3)), Ok(e(2)));
        assert!(graph.children(e(2)).is_empty());
        assert_eq!(graph.children(e(3)), &[e(1)]);
    }

    #[test]
    fn cycle_is_rejected_and_graph_unchanged() {
        let mut graph = ParentGraph::new();
        // 9 -> 5 -> 1 (parent -> child)
        graph.set_parent(e(5), e(9)).unwrap();
        graph.set_parent(e(1), e(5)).unwrap();

        let before = graph.parent(e(9));
        assert_eq!(
            graph.set_parent(e(9), e(1)),
            Err(EcsError::ParentCycle {
                child: e(9),
                parent: e(1)
            })
        );
        assert_eq!(graph.parent(e(9)), before);
        assert_eq!(graph.set_parent(e(3), e(3)), Err(EcsError::SelfParent { entity: e(3) }));
    }

    #[test]
    fn descendants_breadth_first() {
        let mut graph = ParentGraph::new();
        graph.set_parent(e(1), e(0)).unwrap();
        graph.set_parent(e(2), e(0)).unwrap();
        graph.set_parent(e(3), e(1)).unwrap();
        let d = graph.descendants(e(0));
        assert_eq!(d.len(), 3);
        assert_eq!(d[2], e(3));
    }

    #[test]
    fn random_parenting_never_creates_cycles() {
        let mut rng = DeterministicRng::new(77);
        let mut graph = ParentGraph::new();
        for _ in 0..1_000 {
            let child = e(rng.next_u32() % 32);
            let parent = e(rng.next_u32() % 32);
            let before = graph.parent(child);
            if graph.set_parent(child, parent).is_err() {
                assert_eq!(graph.parent(child), before);
            }
        }
        for i in 0..32 {
            // Walking up terminates within the node count.
            let mut steps = 0;
            let mut cur = graph.parent(e(i));
            while cur.is_valid() {
                steps += 1;
                assert!(steps <= 32);
                cur = graph.parent(cur);
            }
        }
    }
}
