/// Pixel formats accepted for texture uploads.
///
/// Closed set, validated once at texture creation.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub enum PixelFormat {
    Rgba8Unorm,
    /// Default for decoded images.
    #[default]
    Rgba8UnormSrgb,
    Bgra8Unorm,
    Bgra8UnormSrgb,
    /// Single-channel coverage/mask data.
    R8Unorm,
}

impl PixelFormat {
    #[inline]
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::R8Unorm => 1,
            PixelFormat::Rgba8Unorm
            | PixelFormat::Rgba8UnormSrgb
            | PixelFormat::Bgra8Unorm
            | PixelFormat::Bgra8UnormSrgb => 4,
        }
    }

    /// Expected upload length for a `width × height` image.
    #[inline]
    pub fn byte_len(self, width: u32, height: u32) -> usize {
        width as usize * height as usize * self.bytes_per_pixel()
    }

    pub const fn to_wgpu(self) -> wgpu::TextureFormat {
        match self {
            PixelFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
            PixelFormat::Rgba8UnormSrgb => wgpu::TextureFormat::Rgba8UnormSrgb,
            PixelFormat::Bgra8Unorm => wgpu::TextureFormat::Bgra8Unorm,
            PixelFormat::Bgra8UnormSrgb => wgpu::TextureFormat::Bgra8UnormSrgb,
            PixelFormat::R8Unorm => wgpu::TextureFormat::R8Unorm,
        }
    }
}
