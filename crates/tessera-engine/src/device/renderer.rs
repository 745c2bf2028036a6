use std::sync::mpsc;

use glam::{Mat4, Vec2};
use winit::dpi::PhysicalSize;

use crate::error::{Error, Result};

use super::camera::Camera;
use super::capture::{padded_bytes_per_row, strip_row_padding, FrameCapture};
use super::frame::{Frame, FrameTarget};
use super::surface;
use super::{GpuContext, RendererConfig, SurfaceErrorAction};

/// Frame-lifecycle state.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum RendererState {
    Ready,
    FrameOpen,
    Disposed,
}

/// Texture + view pair for renderer-owned attachments.
struct ColorTarget {
    texture: wgpu::Texture,
    format: wgpu::TextureFormat,
    size: (u32, u32),
    sample_count: u32,
}

impl ColorTarget {
    fn new(
        device: &wgpu::Device,
        label: &str,
        format: wgpu::TextureFormat,
        size: (u32, u32),
        sample_count: u32,
        usage: wgpu::TextureUsages,
    ) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: size.0.max(1),
                height: size.1.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        });
        Self {
            texture,
            format,
            size,
            sample_count,
        }
    }

    fn matches(&self, format: wgpu::TextureFormat, size: (u32, u32), sample_count: u32) -> bool {
        self.format == format && self.size == size && self.sample_count == sample_count
    }

    fn view(&self) -> wgpu::TextureView {
        self.texture.create_view(&wgpu::TextureViewDescriptor::default())
    }
}

/// Owns the wgpu device, the presentation target and the per-frame lifecycle.
///
/// - `begin_frame` acquires the target and opens a cleared render pass
/// - `end_frame` closes the pass, submits, presents and polls the device
/// - `dispose` waits for the GPU and releases the device
///
/// Other components get device access through [`GpuContext`] clones.
pub struct Renderer<'w> {
    /// Kept alive for the surface.
    _instance: wgpu::Instance,
    ctx: GpuContext,

    /// Presentation surface; `None` for headless renderers.
    surface: Option<wgpu::Surface<'w>>,
    config: wgpu::SurfaceConfiguration,
    size: PhysicalSize<u32>,

    offscreen: Option<ColorTarget>,
    msaa: Option<ColorTarget>,
    sample_count: u32,

    clear_color: wgpu::Color,
    resolution_scale: f32,
    camera: Camera,
    state: RendererState,
}

impl<'w> Renderer<'w> {
    /// Creates a renderer presenting to `target`.
    ///
    /// `size` is the drawable size in physical pixels. A zero size is allowed;
    /// surface configuration is deferred until `resize`.
    pub async fn new(
        target: impl Into<wgpu::SurfaceTarget<'w>>,
        size: PhysicalSize<u32>,
        config: RendererConfig,
    ) -> Result<Self> {
        let instance = create_instance();

        let surface = instance
            .create_surface(target)
            .map_err(|e| Error::Unsupported(e.to_string()))?;

        let adapter = request_adapter(&instance, Some(&surface), &config).await?;
        let (device, queue) = request_device(&adapter, &config).await?;

        let caps = surface.get_capabilities(&adapter);
        let format = surface::choose_surface_format(&caps, config.prefer_srgb)
            .ok_or_else(|| Error::Unsupported("surface reports no formats".to_string()))?;

        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: surface::choose_present_mode(&caps, config.present_mode),
            alpha_mode: surface::choose_alpha_mode(&caps, config.alpha_mode),
            view_formats: vec![],
            desired_maximum_frame_latency: config.desired_maximum_frame_latency,
        };

        if size.width > 0 && size.height > 0 {
            surface.configure(&device, &surface_config);
        }

        Ok(Self::assemble(
            instance,
            adapter,
            GpuContext::new(device, queue),
            Some(surface),
            surface_config,
            size,
            &config,
        ))
    }

    fn assemble(
        instance: wgpu::Instance,
        adapter: wgpu::Adapter,
        ctx: GpuContext,
        surface: Option<wgpu::Surface<'w>>,
        config: wgpu::SurfaceConfiguration,
        size: PhysicalSize<u32>,
        init: &RendererConfig,
    ) -> Self {
        let sample_count = surface::choose_sample_count(&adapter, config.format, init.sample_count);
        let scale = sanitize_scale(init.resolution_scale);

        let info = adapter.get_info();
        log::info!(
            "renderer ready: {} ({:?}), format {:?}, {}x{}, msaa x{}",
            info.name,
            info.backend,
            config.format,
            size.width,
            size.height,
            sample_count
        );

        Self {
            _instance: instance,
            ctx,
            surface,
            config,
            size,
            offscreen: None,
            msaa: None,
            sample_count,
            clear_color: init.clear_color.to_wgpu(),
            resolution_scale: scale,
            camera: Camera::new(size.width as f32 / scale, size.height as f32 / scale),
            state: RendererState::Ready,
        }
    }

    /// Device/queue/timeline handle for resource owners.
    #[inline]
    pub fn context(&self) -> &GpuContext {
        &self.ctx
    }

    #[inline]
    pub fn state(&self) -> RendererState {
        self.state
    }

    #[inline]
    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    #[inline]
    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    /// Drawable size in physical pixels.
    #[inline]
    pub fn size(&self) -> PhysicalSize<u32> {
        self.size
    }

    #[inline]
    pub fn resolution_scale(&self) -> f32 {
        self.resolution_scale
    }

    pub fn set_clear_color(&mut self, color: crate::paint::Color) {
        self.clear_color = color.to_wgpu();
    }

    /// Reconfigures the target after a resize. Zero sizes are recorded and
    /// frames are skipped until a non-zero size arrives.
    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        if self.state == RendererState::Disposed {
            return;
        }

        self.size = new_size;
        self.camera.set_logical_size(
            new_size.width as f32 / self.resolution_scale,
            new_size.height as f32 / self.resolution_scale,
        );

        if !surface::apply_resize(&mut self.config, new_size.width, new_size.height) {
            return;
        }
        if let Some(surface) = &self.surface {
            surface.configure(self.ctx.device(), &self.config);
        }
        log::debug!("renderer resized to {}x{}", new_size.width, new_size.height);
    }

    pub fn set_resolution_scale(&mut self, scale: f32) {
        self.resolution_scale = sanitize_scale(scale);
        self.camera.set_logical_size(
            self.size.width as f32 / self.resolution_scale,
            self.size.height as f32 / self.resolution_scale,
        );
    }

    /// Orthographic projection for the current canvas; cached between resizes.
    pub fn projection_matrix(&mut self) -> Mat4 {
        self.camera.projection_matrix()
    }

    pub fn view_matrix(&self) -> Mat4 {
        self.camera.view_matrix()
    }

    pub fn set_view(&mut self, pan: Vec2, zoom: f32) {
        self.camera.set_view(pan, zoom);
    }

    /// Converts a logical-pixel canvas position to scene units.
    pub fn screen_to_world(&mut self, x: f32, y: f32) -> Vec2 {
        self.camera.screen_to_world(x, y)
    }

    /// Acquires the next render target and opens a render pass cleared to the
    /// background color.
    ///
    /// A lost/outdated surface is reconfigured and acquisition retried once.
    pub fn begin_frame(&mut self) -> Result<Frame> {
        self.ensure_ready()?;

        let size = (self.size.width, self.size.height);
        if size.0 == 0 || size.1 == 0 {
            return Err(Error::FrameSkipped("zero-sized surface".to_string()));
        }

        let format = self.config.format;
        let (target, view) = if self.surface.is_some() {
            let st = self.acquire_surface_texture()?;
            let view = st
                .texture
                .create_view(&wgpu::TextureViewDescriptor::default());
            (FrameTarget::Surface(st), view)
        } else {
            (FrameTarget::Offscreen, self.offscreen_view(format, size))
        };

        let msaa_view = self.msaa_view(format, size);
        let frame = self.open_frame(target, &view, msaa_view.as_ref(), format, size, "tessera frame");
        self.state = RendererState::FrameOpen;
        Ok(frame)
    }

    /// Closes the pass, submits the command buffer and presents.
    ///
    /// Returns the submission serial of the frame.
    pub fn end_frame(&mut self, frame: Frame) -> Result<u64> {
        if self.state == RendererState::Disposed {
            return Err(Error::Disposed);
        }

        let Frame {
            pass,
            encoder,
            target,
            ..
        } = frame;
        drop(pass);

        let serial = self.ctx.submit(std::iter::once(encoder.finish()));

        if let FrameTarget::Surface(st) = target {
            let suboptimal = st.suboptimal;
            st.present();
            if suboptimal {
                log::debug!("surface suboptimal; reconfiguring");
                if let Some(surface) = &self.surface {
                    surface.configure(self.ctx.device(), &self.config);
                }
            }
        }

        self.ctx.poll();
        self.state = RendererState::Ready;
        log::trace!("frame {serial} submitted");
        Ok(serial)
    }

    /// Drops an open frame without submitting it.
    pub fn abort_frame(&mut self, frame: Frame) {
        drop(frame);
        if self.state == RendererState::FrameOpen {
            self.state = RendererState::Ready;
        }
    }

    /// Opens a frame that renders into a readable RGBA8 texture instead of
    /// the surface. Finish it with [`end_capture_frame`](Self::end_capture_frame).
    pub fn begin_capture_frame(&mut self) -> Result<Frame> {
        self.ensure_ready()?;

        let size = (self.size.width, self.size.height);
        if size.0 == 0 || size.1 == 0 {
            return Err(Error::Capture("zero-sized canvas".to_string()));
        }

        let format = surface::capture_format(self.config.format);
        let target = ColorTarget::new(
            self.ctx.device(),
            "tessera capture target",
            format,
            size,
            1,
            wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        );
        let view = target.view();
        let msaa_view = self.msaa_view(format, size);

        let frame = self.open_frame(
            FrameTarget::Capture(target.texture),
            &view,
            msaa_view.as_ref(),
            format,
            size,
            "tessera capture",
        );
        self.state = RendererState::FrameOpen;
        Ok(frame)
    }

    /// Submits a capture frame, then blocks until its pixels are read back.
    pub fn end_capture_frame(&mut self, frame: Frame) -> Result<FrameCapture> {
        if self.state == RendererState::Disposed {
            return Err(Error::Disposed);
        }

        let Frame {
            pass,
            mut encoder,
            target,
            format,
            size: (width, height),
            ..
        } = frame;
        drop(pass);

        let FrameTarget::Capture(texture) = target else {
            self.state = RendererState::Ready;
            return Err(Error::Capture(
                "frame was not opened by begin_capture_frame".to_string(),
            ));
        };

        let padded_row = padded_bytes_per_row(width);
        let readback = self.ctx.device().create_buffer(&wgpu::BufferDescriptor {
            label: Some("tessera capture readback"),
            size: padded_row as u64 * height as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &readback,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );

        self.ctx.submit(std::iter::once(encoder.finish()));
        self.state = RendererState::Ready;

        let slice = readback.slice(..);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.ctx.wait_idle();

        rx.recv()
            .map_err(|_| Error::Capture("readback callback never fired".to_string()))?
            .map_err(|e| Error::Capture(e.to_string()))?;

        let pixels = {
            let data = slice.get_mapped_range();
            strip_row_padding(&data, width, height, padded_row)
        };
        readback.unmap();
        texture.destroy();

        log::debug!("captured {width}x{height} frame");
        Ok(FrameCapture {
            width,
            height,
            format,
            pixels,
        })
    }

    /// Submits any pending queue writes and blocks until the GPU is idle.
    pub fn flush(&mut self) -> Result<u64> {
        if self.state == RendererState::Disposed {
            return Err(Error::Disposed);
        }
        let serial = self.ctx.submit(std::iter::empty());
        self.ctx.wait_idle();
        Ok(serial)
    }

    /// Waits for in-flight work, then releases the surface and device.
    /// Later frame calls fail with `Disposed`.
    pub fn dispose(&mut self) {
        if self.state == RendererState::Disposed {
            return;
        }
        self.ctx.wait_idle();
        self.release();
        log::info!("renderer disposed");
    }

    fn release(&mut self) {
        self.msaa = None;
        self.offscreen = None;
        self.surface = None;
        self.ctx.device().destroy();
        self.state = RendererState::Disposed;
    }

    fn ensure_ready(&self) -> Result<()> {
        match self.state {
            RendererState::Ready => Ok(()),
            RendererState::FrameOpen => Err(Error::FrameInProgress),
            RendererState::Disposed => Err(Error::Disposed),
        }
    }

    fn acquire_surface_texture(&mut self) -> Result<wgpu::SurfaceTexture> {
        let Some(surface) = self.surface.as_ref() else {
            return Err(Error::Disposed);
        };

        let err = match surface.get_current_texture() {
            Ok(st) => return Ok(st),
            Err(err) => err,
        };

        match SurfaceErrorAction::classify(&err) {
            SurfaceErrorAction::Reconfigure => {
                log::warn!("surface {err}; reconfiguring and retrying");
                surface.configure(self.ctx.device(), &self.config);
                surface.get_current_texture().map_err(|retry| {
                    log::error!("surface still unavailable after reconfigure: {retry}");
                    Error::SurfaceLost(retry.to_string())
                })
            }
            SurfaceErrorAction::SkipFrame => {
                log::debug!("skipping frame: {err}");
                Err(Error::FrameSkipped(err.to_string()))
            }
            SurfaceErrorAction::Fatal => {
                log::error!("unrecoverable surface error: {err}");
                self.release();
                Err(Error::Device(err.to_string()))
            }
        }
    }

    fn offscreen_view(&mut self, format: wgpu::TextureFormat, size: (u32, u32)) -> wgpu::TextureView {
        match &self.offscreen {
            Some(target) if target.matches(format, size, 1) => target.view(),
            _ => {
                let target = ColorTarget::new(
                    self.ctx.device(),
                    "tessera offscreen target",
                    format,
                    size,
                    1,
                    wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
                );
                let view = target.view();
                self.offscreen = Some(target);
                view
            }
        }
    }

    fn msaa_view(&mut self, format: wgpu::TextureFormat, size: (u32, u32)) -> Option<wgpu::TextureView> {
        if self.sample_count <= 1 {
            return None;
        }
        match &self.msaa {
            Some(target) if target.matches(format, size, self.sample_count) => Some(target.view()),
            _ => {
                let target = ColorTarget::new(
                    self.ctx.device(),
                    "tessera msaa target",
                    format,
                    size,
                    self.sample_count,
                    wgpu::TextureUsages::RENDER_ATTACHMENT,
                );
                let view = target.view();
                self.msaa = Some(target);
                Some(view)
            }
        }
    }

    fn open_frame(
        &self,
        target: FrameTarget,
        view: &wgpu::TextureView,
        msaa_view: Option<&wgpu::TextureView>,
        format: wgpu::TextureFormat,
        size: (u32, u32),
        label: &str,
    ) -> Frame {
        let mut encoder = self
            .ctx
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) });

        // Multisampled frames render into the MSAA target and resolve into `view`.
        let (attachment, resolve_target, store) = match msaa_view {
            Some(msaa) => (msaa, Some(view), wgpu::StoreOp::Discard),
            None => (view, None, wgpu::StoreOp::Store),
        };

        let pass = encoder
            .begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(label),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: attachment,
                    resolve_target,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.clear_color),
                        store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            })
            .forget_lifetime();

        Frame {
            pass,
            encoder,
            target,
            format,
            sample_count: if msaa_view.is_some() { self.sample_count } else { 1 },
            size,
        }
    }
}

impl Renderer<'static> {
    /// Creates a renderer with no window; frames render into an offscreen
    /// texture. Used by tests and capture-only hosts.
    pub async fn headless(size: PhysicalSize<u32>, config: RendererConfig) -> Result<Self> {
        let instance = create_instance();
        let adapter = request_adapter(&instance, None, &config).await?;
        let (device, queue) = request_device(&adapter, &config).await?;

        let format = if config.prefer_srgb {
            wgpu::TextureFormat::Rgba8UnormSrgb
        } else {
            wgpu::TextureFormat::Rgba8Unorm
        };

        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: wgpu::CompositeAlphaMode::Opaque,
            view_formats: vec![],
            desired_maximum_frame_latency: config.desired_maximum_frame_latency,
        };

        Ok(Self::assemble(
            instance,
            adapter,
            GpuContext::new(device, queue),
            None,
            surface_config,
            size,
            &config,
        ))
    }
}

fn sanitize_scale(scale: f32) -> f32 {
    if scale.is_finite() && scale > 0.0 { scale } else { 1.0 }
}

fn create_instance() -> wgpu::Instance {
    wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        ..Default::default()
    })
}

async fn request_adapter(
    instance: &wgpu::Instance,
    surface: Option<&wgpu::Surface<'_>>,
    config: &RendererConfig,
) -> Result<wgpu::Adapter> {
    instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: config.power_preference,
            compatible_surface: surface,
            force_fallback_adapter: false,
        })
        .await
        .map_err(|e| Error::NoAdapter(e.to_string()))
}

async fn request_device(
    adapter: &wgpu::Adapter,
    config: &RendererConfig,
) -> Result<(wgpu::Device, wgpu::Queue)> {
    adapter
        .request_device(&wgpu::DeviceDescriptor {
            label: Some("tessera device"),
            required_features: config.required_features,
            required_limits: config.required_limits.clone(),
            experimental_features: wgpu::ExperimentalFeatures::disabled(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::Off,
        })
        .await
        .map_err(|e| Error::Device(e.to_string()))
}
