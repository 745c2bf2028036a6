/// Where a frame's color output lands.
pub(crate) enum FrameTarget {
    /// Acquired swapchain image; presented by `end_frame`.
    Surface(wgpu::SurfaceTexture),
    /// Renderer-owned offscreen texture (headless renderers).
    Offscreen,
    /// One-shot copy-source texture read back by `end_capture_frame`.
    Capture(wgpu::Texture),
}

/// A single open frame: the render pass plus the encoder it records into.
///
/// Obtained from `Renderer::begin_frame` and handed back to
/// `Renderer::end_frame`. Holding a surface frame blocks acquisition of the
/// next one, so finish it promptly.
pub struct Frame {
    // Declared first: the pass must be dropped before the encoder finishes.
    pub(crate) pass: wgpu::RenderPass<'static>,
    pub(crate) encoder: wgpu::CommandEncoder,
    pub(crate) target: FrameTarget,
    pub(crate) format: wgpu::TextureFormat,
    pub(crate) sample_count: u32,
    pub(crate) size: (u32, u32),
}

impl Frame {
    /// The open render pass, already cleared to the background color.
    #[inline]
    pub fn pass(&mut self) -> &mut wgpu::RenderPass<'static> {
        &mut self.pass
    }

    /// Color format of the pass attachment; pipelines must match it.
    #[inline]
    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }

    #[inline]
    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }
}
