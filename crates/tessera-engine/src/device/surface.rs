pub(crate) fn choose_surface_format(
    caps: &wgpu::SurfaceCapabilities,
    prefer_srgb: bool,
) -> Option<wgpu::TextureFormat> {
    if caps.formats.is_empty() {
        return None;
    }

    if prefer_srgb {
        let preferred = [
            wgpu::TextureFormat::Bgra8UnormSrgb,
            wgpu::TextureFormat::Rgba8UnormSrgb,
        ];
        for f in preferred {
            if caps.formats.contains(&f) {
                return Some(f);
            }
        }
    }

    Some(caps.formats[0])
}

pub(crate) fn choose_alpha_mode(
    caps: &wgpu::SurfaceCapabilities,
    requested: Option<wgpu::CompositeAlphaMode>,
) -> wgpu::CompositeAlphaMode {
    requested
        .filter(|m| caps.alpha_modes.contains(m))
        .or_else(|| caps.alpha_modes.first().copied())
        .unwrap_or(wgpu::CompositeAlphaMode::Auto)
}

pub(crate) fn choose_present_mode(
    caps: &wgpu::SurfaceCapabilities,
    requested: wgpu::PresentMode,
) -> wgpu::PresentMode {
    if caps.present_modes.contains(&requested) {
        requested
    } else {
        wgpu::PresentMode::Fifo
    }
}

/// Largest of `requested`, 4, 2, 1 that `format` supports for multisampling.
pub(crate) fn choose_sample_count(
    adapter: &wgpu::Adapter,
    format: wgpu::TextureFormat,
    requested: u32,
) -> u32 {
    let flags = adapter.get_texture_format_features(format).flags;
    [requested, 4, 2]
        .into_iter()
        .filter(|&n| n > 1 && n <= requested)
        .find(|&n| flags.sample_count_supported(n))
        .unwrap_or(1)
}

/// RGBA readback format matching the sRGB-ness of `format`.
pub(crate) fn capture_format(format: wgpu::TextureFormat) -> wgpu::TextureFormat {
    if format.is_srgb() {
        wgpu::TextureFormat::Rgba8UnormSrgb
    } else {
        wgpu::TextureFormat::Rgba8Unorm
    }
}

/// Applies a new size to the configuration. Zero-sized surfaces cannot be
/// configured; the caller defers configuration until the size is non-zero.
pub(crate) fn apply_resize(config: &mut wgpu::SurfaceConfiguration, width: u32, height: u32) -> bool {
    if width == 0 || height == 0 {
        return false;
    }
    config.width = width;
    config.height = height;
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(formats: Vec<wgpu::TextureFormat>) -> wgpu::SurfaceCapabilities {
        wgpu::SurfaceCapabilities {
            formats,
            present_modes: vec![wgpu::PresentMode::Fifo],
            alpha_modes: vec![wgpu::CompositeAlphaMode::Opaque],
            usages: wgpu::TextureUsages::RENDER_ATTACHMENT,
        }
    }

    #[test]
    fn prefers_srgb_when_asked() {
        let c = caps(vec![
            wgpu::TextureFormat::Bgra8Unorm,
            wgpu::TextureFormat::Bgra8UnormSrgb,
        ]);
        assert_eq!(choose_surface_format(&c, true), Some(wgpu::TextureFormat::Bgra8UnormSrgb));
        assert_eq!(choose_surface_format(&c, false), Some(wgpu::TextureFormat::Bgra8Unorm));
        assert_eq!(choose_surface_format(&caps(vec![]), true), None);
    }

    #[test]
    fn unsupported_modes_fall_back() {
        let c = caps(vec![wgpu::TextureFormat::Rgba8Unorm]);
        assert_eq!(
            choose_alpha_mode(&c, Some(wgpu::CompositeAlphaMode::PreMultiplied)),
            wgpu::CompositeAlphaMode::Opaque
        );
        assert_eq!(
            choose_present_mode(&c, wgpu::PresentMode::Mailbox),
            wgpu::PresentMode::Fifo
        );
    }

    #[test]
    fn capture_format_keeps_srgb() {
        assert_eq!(
            capture_format(wgpu::TextureFormat::Bgra8UnormSrgb),
            wgpu::TextureFormat::Rgba8UnormSrgb
        );
        assert_eq!(
            capture_format(wgpu::TextureFormat::Bgra8Unorm),
            wgpu::TextureFormat::Rgba8Unorm
        );
    }

    #[test]
    fn zero_resize_is_deferred() {
        let mut config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: wgpu::TextureFormat::Rgba8Unorm,
            width: 800,
            height: 600,
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: wgpu::CompositeAlphaMode::Auto,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        assert!(!apply_resize(&mut config, 0, 600));
        assert_eq!(config.width, 800);
        assert!(apply_resize(&mut config, 1024, 768));
        assert_eq!((config.width, config.height), (1024, 768));
    }
}
