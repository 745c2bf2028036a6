//! Color model shared by the editor and the quad renderer.
//!
//! Colors are straight-alpha RGBA in `[0, 1]`; the quad shader premultiplies
//! before blending.

pub mod color;

pub use color::Color;
