//! Tracks which entities are kept alive by which users.
//!
//! A resource entity with at least one dependent cannot be destroyed
//! outright; destruction is deferred until the last dependency goes away.

use crate::ecs::Entity;
use std::collections::{HashMap, HashSet};

#[derive(Default)]
pub struct DependencyGraph {
    users_of: HashMap<Entity, Vec<Entity>>,
    resources_of: HashMap<Entity, Vec<Entity>>,
    marked_for_removal: HashSet<Entity>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `user` depends on `resource`. Duplicate edges are ignored.
    pub fn add(&mut self, resource: Entity, user: Entity) {
        let users = self.users_of.entry(resource).or_default();
        if users.contains(&user) {
            return;
        }
        users.push(user);
        self.resources_of.entry(user).or_default().push(resource);
    }

    /// Remove an edge. Returns `true` if `resource` became free of
    /// dependents while marked for removal.
    pub fn remove(&mut self, resource: Entity, user: Entity) -> bool {
        if let Some(users) = self.users_of.get_mut(&resource) {
            users.retain(|u| *u != user);
            if users.is_empty() {
                self.users_of.remove(&resource);
            }
        }
        if let Some(resources) = self.resources_of.get_mut(&user) {
            resources.retain(|r| *r != resource);
            if resources.is_empty() {
                self.resources_of.remove(&user);
            }
        }
        !self.is_depended_on(resource) && self.marked_for_removal.contains(&resource)
    }

    /// Remove every edge where `user` is the dependent. Returns resources
    /// that are now free and were marked for removal.
    pub fn remove_user(&mut self, user: Entity) -> Vec<Entity> {
        let Some(resources) = self.resources_of.remove(&user) else {
            return Vec::new();
        };
        let mut released = Vec::new();
        for resource in resources {
            if let Some(users) = self.users_of.get_mut(&resource) {
                users.retain(|u| *u != user);
                if users.is_empty() {
                    self.users_of.remove(&resource);
                    if self.marked_for_removal.contains(&resource) {
                        released.push(resource);
                    }
                }
            }
        }
        released
    }

    pub fn is_depended_on(&self, resource: Entity) -> bool {
        self.users_of.contains_key(&resource)
    }

    pub fn dependents(&self, resource: Entity) -> &[Entity] {
        self.users_of
            .get(&resource)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn mark_for_removal(&mut self, resource: Entity) {
        self.marked_for_removal.insert(resource);
    }

    pub fn is_marked_for_removal(&self, resource: Entity) -> bool {
        self.marked_for_removal.contains(&resource)
    }

    /// Forget a destroyed resource entirely.
    pub fn forget(&mut self, resource: Entity) {
        self.marked_for_removal.remove(&resource);
        if let Some(users) = self.users_of.remove(&resource) {
            for user in users {
                if let Some(resources) = self.resources_of.get_mut(&user) {
                    resources.retain(|r| *r != resource);
                    if resources.is_empty() {
                        self.resources_of.remove(&user);
                    }
                }
            }
        }
    }

    pub fn clear(&mut self) {
        self.users_of.clear();
        self.resources_of.clear();
        self.marked_for_removal.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::EntityFlags;

    fn e(index: u32) -> Entity {
        Entity::new(index, 1, 0, EntityFlags::NONE)
    }

    #[test]
    fn edges_add_and_remove() {
        let mut graph = DependencyGraph::new();
        graph.add(e(0), e(1));
        graph.add(e(0), e(1));
        graph.add(e(0), e(2));
        assert_eq!(graph.dependents(e(0)), &[e(1), e(2)]);

        assert!(!graph.remove(e(0), e(1)));
        assert!(graph.is_depended_on(e(0)));
        assert!(!graph.remove(e(0), e(2)));
        assert!(!graph.is_depended_on(e(0)));
    }

    #[test]
    fn marked_resource_released_by_last_removal() {
        let mut graph = DependencyGraph::new();
        graph.add(e(0), e(1));
        graph.mark_for_removal(e(0));
        assert!(graph.remove(e(0), e(1)));
    }

    #[test]
    fn removing_user_releases_marked_resources() {
        let mut graph = DependencyGraph::new();
        graph.add(e(0), e(5));
        graph.add(e(1), e(5));
        graph.mark_for_removal(e(1));
        assert_eq!(graph.remove_user(e(5)), vec![e(1)]);
        assert!(!graph.is_depended_on(e(0)));
    }
}
