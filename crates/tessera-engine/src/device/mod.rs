//! GPU device, presentation target and frame lifecycle.
//!
//! This module is responsible for:
//! - creating the wgpu Instance/Adapter/Device/Queue
//! - configuring the surface (or an offscreen target when headless)
//! - opening/closing per-frame render passes and tracking submissions
//! - the orthographic camera used by renderers

mod camera;
mod capture;
mod context;
mod error;
mod frame;
mod init;
mod renderer;
mod surface;

pub use camera::Camera;
pub use capture::FrameCapture;
pub use context::{GpuContext, GpuTimeline};
pub use error::SurfaceErrorAction;
pub use frame::Frame;
pub use init::RendererConfig;
pub use renderer::{Renderer, RendererState};
