//! GPU resource ownership.
//!
//! `ResourceManager` is the only owner of wgpu buffers and textures created on
//! behalf of callers. Entries are keyed by caller-supplied ids and reference
//! counted; a handle whose count reaches zero is parked until the GPU timeline
//! shows every submission that could reference it has retired, and only then
//! destroyed.

mod format;
mod manager;
mod registry;

pub use format::PixelFormat;
pub use manager::{ResourceInfo, ResourceManager, TextureState};
pub use registry::ResourceKind;

/// Caller-supplied resource key.
pub type ResourceId = String;
