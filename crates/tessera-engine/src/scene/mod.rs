//! Scene graph: addressable 2D transform nodes.
//!
//! Nodes are root-level and keyed by caller-chosen string ids. The graph knows
//! nothing about GPU state; renderers read it by id each frame and use node
//! revisions to detect changes.

mod graph;
mod node;

pub use graph::SceneGraph;
pub use node::TransformNode;
