//! Engine error taxonomy.
//!
//! Validation errors (`DuplicateId`, `NotFound`, `SizeMismatch`, `OutOfBounds`,
//! `Misaligned`) are returned before any state is touched. Frame errors abort
//! the current frame only; `Disposed` is terminal.

/// Errors produced by the rendering core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No GPU backend could create a surface for the given target.
    #[error("no GPU API available: {0}")]
    Unsupported(String),

    /// Adapter request yielded nothing usable.
    #[error("no suitable GPU adapter: {0}")]
    NoAdapter(String),

    /// Device creation failed, or the device became unusable.
    #[error("GPU device error: {0}")]
    Device(String),

    /// Surface could not be acquired even after reconfiguring it.
    #[error("surface lost: {0}")]
    SurfaceLost(String),

    /// Transient acquisition failure (timeout, zero-sized surface); retry next frame.
    #[error("frame skipped: {0}")]
    FrameSkipped(String),

    /// `begin_frame` called while a previous frame is still open.
    #[error("a frame is already in progress")]
    FrameInProgress,

    /// The renderer has been disposed.
    #[error("renderer has been disposed")]
    Disposed,

    #[error("duplicate id `{0}`")]
    DuplicateId(String),

    #[error("`{0}` not found")]
    NotFound(String),

    #[error("pixel data for `{id}` is {actual} bytes, expected {expected}")]
    SizeMismatch {
        id: String,
        expected: usize,
        actual: usize,
    },

    #[error("write of {len} bytes at offset {offset} exceeds `{id}` ({size} bytes)")]
    OutOfBounds {
        id: String,
        offset: u64,
        len: u64,
        size: u64,
    },

    #[error("write to `{id}` at offset {offset} with {len} bytes is not 4-byte aligned")]
    Misaligned { id: String, offset: u64, len: u64 },

    /// GPU allocation rejected (exceeds device limits or out of memory). Not retried.
    #[error("allocation of `{id}` failed: {reason}")]
    Allocation { id: String, reason: String },

    /// Frame readback failed.
    #[error("frame capture failed: {0}")]
    Capture(String),

    #[error("invalid color `{0}`")]
    InvalidColor(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns true for errors that only cost the current frame.
    pub fn is_frame_local(&self) -> bool {
        matches!(self, Error::FrameSkipped(_) | Error::SurfaceLost(_))
    }
}
