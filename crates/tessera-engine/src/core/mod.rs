//! Core engine-facing contracts.
//!
//! This module defines the interface between the runtime (platform loop) and
//! host applications. Apps see the `Editor` and a small per-frame context,
//! never the winit loop itself.

mod app;
mod ctx;

pub use app::{App, AppControl};
pub use ctx::{FrameCtx, WindowCtx};
