//! Tessera engine crate.
//!
//! A wgpu-backed 2D quad renderer: a scene graph of transform nodes, a GPU
//! resource manager with deferred release, a frame-lifecycle renderer and a
//! batched quad renderer, tied together by `editor::Editor` and hosted in a
//! winit window by `window::Runtime`.

pub mod core;
pub mod device;
pub mod editor;
pub mod error;
pub mod logging;
pub mod paint;
pub mod render;
pub mod resources;
pub mod scene;
pub mod time;
pub mod window;

pub use editor::{Editor, EditorConfig};
pub use error::{Error, Result};
