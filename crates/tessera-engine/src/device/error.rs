/// High-level response after a surface acquisition error.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SurfaceErrorAction {
    /// Reconfigure the surface and retry once.
    Reconfigure,
    /// Transient error; skip the current frame.
    SkipFrame,
    /// Unrecoverable (commonly OOM); the renderer is disposed.
    Fatal,
}

impl SurfaceErrorAction {
    pub fn classify(err: &wgpu::SurfaceError) -> Self {
        match err {
            wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated => Self::Reconfigure,
            wgpu::SurfaceError::OutOfMemory => Self::Fatal,
            wgpu::SurfaceError::Timeout => Self::SkipFrame,
            wgpu::SurfaceError::Other => Self::SkipFrame,
        }
    }
}
