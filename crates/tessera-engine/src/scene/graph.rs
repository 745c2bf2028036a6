use std::collections::HashMap;

use glam::Vec2;

use crate::error::{Error, Result};

use super::TransformNode;

/// Collection of root-level transform nodes keyed by id.
///
/// Policies:
/// - `create_node` with an existing id fails with `DuplicateId`; the existing
///   node is untouched.
/// - every mutator (`set_*`, `remove_node`) fails with `NotFound` for an
///   unknown id.
///
/// Iteration follows insertion order.
#[derive(Debug, Default)]
pub struct SceneGraph {
    nodes: HashMap<String, TransformNode>,
    order: Vec<String>,
    next_revision: u64,
}

impl SceneGraph {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a node at the origin with unit scale.
    pub fn create_node(&mut self, id: impl Into<String>) -> Result<&TransformNode> {
        let id = id.into();
        if self.nodes.contains_key(&id) {
            return Err(Error::DuplicateId(id));
        }

        let revision = self.bump();
        self.order.push(id.clone());
        log::trace!("scene: created node `{id}`");
        Ok(self
            .nodes
            .entry(id.clone())
            .or_insert_with(|| TransformNode::new(id, revision)))
    }

    pub fn set_position(&mut self, id: &str, x: f32, y: f32) -> Result<()> {
        let revision = self.bump();
        self.node_mut(id)?.set_position(Vec2::new(x, y), revision);
        Ok(())
    }

    /// Sets the node size in scene units.
    pub fn set_scale(&mut self, id: &str, width: f32, height: f32) -> Result<()> {
        let revision = self.bump();
        self.node_mut(id)?.set_scale(Vec2::new(width, height), revision);
        Ok(())
    }

    /// Sets the rotation in radians.
    pub fn set_rotation(&mut self, id: &str, theta: f32) -> Result<()> {
        let revision = self.bump();
        self.node_mut(id)?.set_rotation(theta, revision);
        Ok(())
    }

    /// Removes and returns the node. Renderers referencing it skip it from the
    /// next frame on.
    pub fn remove_node(&mut self, id: &str) -> Result<TransformNode> {
        let node = self
            .nodes
            .remove(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        self.order.retain(|n| n != id);
        log::trace!("scene: removed node `{id}`");
        Ok(node)
    }

    #[inline]
    pub fn get_node(&self, id: &str) -> Option<&TransformNode> {
        self.nodes.get(id)
    }

    #[inline]
    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &TransformNode> {
        self.order.iter().filter_map(|id| self.nodes.get(id))
    }

    /// Ids of nodes mutated since the last `clear_dirty`.
    pub fn dirty_ids(&self) -> impl Iterator<Item = &str> {
        self.iter().filter(|n| n.is_dirty()).map(TransformNode::id)
    }

    /// Marks every node as consumed. Revisions are kept.
    pub fn clear_dirty(&mut self) {
        for node in self.nodes.values_mut() {
            node.clear_dirty();
        }
    }

    /// Drops every node.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.order.clear();
    }

    fn node_mut(&mut self, id: &str) -> Result<&mut TransformNode> {
        self.nodes
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    fn bump(&mut self) -> u64 {
        self.next_revision += 1;
        self.next_revision
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_write_wins() {
        let mut g = SceneGraph::new();
        g.create_node("a").unwrap();
        g.set_position("a", 1.0, 2.0).unwrap();
        g.set_scale("a", 10.0, 20.0).unwrap();
        g.set_position("a", 5.0, 6.0).unwrap();
        g.set_rotation("a", 0.5).unwrap();
        g.set_scale("a", 30.0, 40.0).unwrap();

        let n = g.get_node("a").unwrap();
        assert_eq!(n.position(), Vec2::new(5.0, 6.0));
        assert_eq!(n.scale(), Vec2::new(30.0, 40.0));
        assert_eq!(n.rotation(), 0.5);
    }

    #[test]
    fn duplicate_create_fails_and_keeps_original() {
        let mut g = SceneGraph::new();
        for id in ["a", "b", "rect_0", ""] {
            g.create_node(id).unwrap();
            g.set_position(id, 3.0, 4.0).unwrap();
            assert!(matches!(g.create_node(id), Err(Error::DuplicateId(d)) if d == id));
            assert_eq!(g.get_node(id).unwrap().position(), Vec2::new(3.0, 4.0));
        }
        assert_eq!(g.len(), 4);
    }

    #[test]
    fn mutating_missing_node_is_not_found() {
        let mut g = SceneGraph::new();
        assert!(matches!(g.set_position("x", 0.0, 0.0), Err(Error::NotFound(_))));
        assert!(matches!(g.set_scale("x", 1.0, 1.0), Err(Error::NotFound(_))));
        assert!(matches!(g.set_rotation("x", 1.0), Err(Error::NotFound(_))));
        assert!(matches!(g.remove_node("x"), Err(Error::NotFound(_))));
        assert!(g.is_empty());
    }

    #[test]
    fn dirty_flags_and_revisions() {
        let mut g = SceneGraph::new();
        g.create_node("a").unwrap();
        g.create_node("b").unwrap();
        assert_eq!(g.dirty_ids().collect::<Vec<_>>(), ["a", "b"]);

        g.clear_dirty();
        assert_eq!(g.dirty_ids().count(), 0);

        let before = g.get_node("b").unwrap().revision();
        g.set_rotation("b", 1.0).unwrap();
        assert_eq!(g.dirty_ids().collect::<Vec<_>>(), ["b"]);
        assert!(g.get_node("b").unwrap().revision() > before);
    }

    #[test]
    fn recreated_node_gets_fresh_revision() {
        let mut g = SceneGraph::new();
        let old = g.create_node("a").unwrap().revision();
        g.remove_node("a").unwrap();
        let new = g.create_node("a").unwrap().revision();
        assert_ne!(old, new);
    }

    #[test]
    fn iteration_follows_insertion_order() {
        let mut g = SceneGraph::new();
        for id in ["c", "a", "b"] {
            g.create_node(id).unwrap();
        }
        g.remove_node("a").unwrap();
        let ids: Vec<_> = g.iter().map(TransformNode::id).collect();
        assert_eq!(ids, ["c", "b"]);
    }

    #[test]
    fn model_matrix_maps_unit_quad_to_rect() {
        let mut g = SceneGraph::new();
        g.create_node("r").unwrap();
        g.set_position("r", 100.0, 50.0).unwrap();
        g.set_scale("r", 20.0, 10.0).unwrap();

        let m = g.get_node("r").unwrap().model_matrix();
        let far = m.transform_point3(glam::Vec3::new(1.0, 1.0, 0.0));
        assert!((far.x - 120.0).abs() < 1e-4);
        assert!((far.y - 60.0).abs() < 1e-4);
    }
}
