use crate::paint::Color;

/// Initialization parameters for the renderer.
///
/// Add configuration flags only when a concrete platform or backend
/// requirement exists.
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Prefer an sRGB surface format when available.
    pub prefer_srgb: bool,

    /// Present mode (swap behavior). FIFO is supported everywhere.
    pub present_mode: wgpu::PresentMode,

    /// Optional alpha mode preference. Falls back to a supported mode.
    pub alpha_mode: Option<wgpu::CompositeAlphaMode>,

    pub power_preference: wgpu::PowerPreference,

    /// Required wgpu features. Keep empty for portability.
    pub required_features: wgpu::Features,

    /// Limits requested from the adapter/device.
    pub required_limits: wgpu::Limits,

    /// Desired maximum frame latency for the surface (a hint).
    pub desired_maximum_frame_latency: u32,

    /// Clear color of every frame's render pass.
    pub clear_color: Color,

    /// Requested MSAA sample count. Reduced to 1 when the target format does
    /// not support it.
    pub sample_count: u32,

    /// Physical pixels per scene unit (device pixel ratio).
    pub resolution_scale: f32,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            prefer_srgb: true,
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: None,
            power_preference: wgpu::PowerPreference::HighPerformance,
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            desired_maximum_frame_latency: 2,
            clear_color: Color::WHITE,
            sample_count: 1,
            resolution_scale: 1.0,
        }
    }
}
