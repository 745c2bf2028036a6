//! Host-facing facade over the rendering core.
//!
//! `Editor` owns the renderer, scene graph, resource manager and quad
//! renderer, and exposes the operations a shell needs: add rectangles and
//! images, upload textures, render and capture frames, dispose.

mod config;
mod facade;

pub use config::EditorConfig;
pub use facade::Editor;
