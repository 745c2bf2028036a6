//! GPU rendering subsystem.
//!
//! Renderers record into the pass opened by `device::Renderer::begin_frame`
//! and allocate their buffers and textures through `ResourceManager`.
//!
//! Convention:
//! - scene units are logical pixels (top-left origin, +Y down)
//! - the vertex shader applies `projection * view * model`
//! - fragment output is premultiplied alpha

mod common;
pub mod quad;

pub use quad::{FrameStats, QuadRenderer};
