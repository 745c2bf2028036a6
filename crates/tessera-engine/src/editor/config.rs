use crate::device::RendererConfig;
use crate::error::Result;
use crate::paint::Color;

/// Sample count requested when antialiasing is on.
pub const MSAA_SAMPLES: u32 = 4;

/// Editor construction options.
#[derive(Debug, Clone)]
pub struct EditorConfig {
    /// Canvas clear color as `#rgb`, `#rrggbb` or `#rrggbbaa`. White when unset.
    pub background_color: Option<String>,

    /// Physical pixels per scene unit. Falls back to the host's device pixel
    /// ratio.
    pub resolution_scale: Option<f32>,

    /// Multisampled rendering, if the target format supports it.
    pub antialiasing: bool,

    /// Base renderer settings; the fields above override it.
    pub renderer: RendererConfig,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            background_color: None,
            resolution_scale: None,
            antialiasing: true,
            renderer: RendererConfig::default(),
        }
    }
}

impl EditorConfig {
    /// Resolves the renderer configuration. Fails with `InvalidColor` before
    /// any GPU work if the background color does not parse.
    pub fn renderer_config(&self, device_pixel_ratio: f32) -> Result<RendererConfig> {
        let mut config = self.renderer.clone();

        config.clear_color = match &self.background_color {
            Some(hex) => Color::from_hex(hex)?,
            None => Color::WHITE,
        };
        config.resolution_scale = self.resolution_scale.unwrap_or(device_pixel_ratio);
        config.sample_count = if self.antialiasing { MSAA_SAMPLES } else { 1 };
        Ok(config)
    }
}
