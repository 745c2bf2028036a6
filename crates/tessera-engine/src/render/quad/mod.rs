//! Batched quad rendering.

mod instances;
mod renderer;

pub use instances::FrameStats;
pub use renderer::QuadRenderer;
