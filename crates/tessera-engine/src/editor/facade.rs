use glam::Vec2;
use winit::dpi::PhysicalSize;

use crate::device::{FrameCapture, Renderer};
use crate::error::{Error, Result};
use crate::paint::Color;
use crate::render::{FrameStats, QuadRenderer};
use crate::resources::{PixelFormat, ResourceManager};
use crate::scene::SceneGraph;
use crate::time::FrameClock;

use super::EditorConfig;

/// A canvas of rectangles and images.
///
/// Rectangles and images are scene nodes with a quad of the same id.
/// Everything lives until `dispose`, which tears the components down in
/// dependency order: quads, resources, GPU flush, renderer.
pub struct Editor<'w> {
    renderer: Renderer<'w>,
    scene: SceneGraph,
    resources: ResourceManager,
    quads: QuadRenderer,
    clock: FrameClock,
    next_texture: u64,
    next_image: u64,
    disposed: bool,
}

impl<'w> Editor<'w> {
    /// Creates an editor drawing into `target`.
    ///
    /// `size` is the drawable size in physical pixels; `device_pixel_ratio`
    /// is used when the config does not set a resolution scale.
    pub async fn new(
        target: impl Into<wgpu::SurfaceTarget<'w>>,
        size: PhysicalSize<u32>,
        device_pixel_ratio: f32,
        config: EditorConfig,
    ) -> Result<Self> {
        let renderer_config = config.renderer_config(device_pixel_ratio)?;
        let renderer = Renderer::new(target, size, renderer_config).await?;
        Self::with_renderer(renderer)
    }

    /// Builds the remaining components on top of an existing renderer.
    pub fn with_renderer(renderer: Renderer<'w>) -> Result<Self> {
        let mut resources = ResourceManager::new(renderer.context().clone());
        let quads = QuadRenderer::new(renderer.context().clone(), &mut resources)?;

        Ok(Self {
            renderer,
            scene: SceneGraph::new(),
            resources,
            quads,
            clock: FrameClock::new(),
            next_texture: 0,
            next_image: 0,
            disposed: false,
        })
    }

    /// Adds a white rectangle at `(x, y)` sized `width × height` scene units.
    pub fn add_rectangle(&mut self, id: &str, x: f32, y: f32, width: f32, height: f32) -> Result<()> {
        self.add_element(id, x, y, width, height, None)?;
        log::debug!("added rectangle `{id}`");
        Ok(())
    }

    /// Removes a rectangle or image added through this editor.
    pub fn remove_rectangle(&mut self, id: &str) -> Result<()> {
        self.quads.remove_quad(id)?;
        if self.scene.remove_node(id).is_err() {
            log::debug!("node `{id}` was already gone");
        }
        Ok(())
    }

    pub fn set_rectangle_color(&mut self, id: &str, color: Color) -> Result<()> {
        if !color.is_finite() {
            return Err(Error::InvalidColor(format!("{color:?}")));
        }
        self.quads.set_quad_color(id, color)
    }

    /// Binds `texture_id` to the rectangle, or unbinds with `None`.
    pub fn set_rectangle_texture(&mut self, id: &str, texture_id: Option<&str>) -> Result<()> {
        self.quads.set_quad_texture(id, texture_id)
    }

    /// Moves an element. Equivalent to `scene_mut().set_position`.
    pub fn move_rectangle(&mut self, id: &str, x: f32, y: f32) -> Result<()> {
        self.scene.set_position(id, x, y)
    }

    /// Uploads tightly packed sRGB RGBA8 pixels and returns the new texture id.
    pub fn load_texture(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<String> {
        if self.disposed {
            return Err(Error::Disposed);
        }
        let id = next_free_id("image", &mut self.next_texture, |id| self.resources.contains(id));
        let id = self
            .resources
            .create_texture(id, pixels, width, height, PixelFormat::Rgba8UnormSrgb)?;
        log::info!("loaded texture `{id}` ({width}x{height})");
        Ok(id)
    }

    /// Places a texture at `(x, y)` at its native pixel size. Returns the id
    /// of the created element.
    pub fn add_image(&mut self, texture_id: &str, x: f32, y: f32) -> Result<String> {
        let (width, height) = self
            .resources
            .texture_size(texture_id)
            .ok_or_else(|| Error::NotFound(texture_id.to_string()))?;

        let (scene, quads) = (&self.scene, &self.quads);
        let id = next_free_id("image_node", &mut self.next_image, |id| {
            scene.contains(id) || quads.contains(id)
        });
        self.add_element(&id, x, y, width as f32, height as f32, Some(texture_id))?;
        log::debug!("added image `{id}` using `{texture_id}`");
        Ok(id)
    }

    /// Removes every element, including quads whose node was removed through
    /// `scene_mut`. Textures stay loaded.
    pub fn clear(&mut self) {
        let nodes = self.scene.len();
        self.quads.clear();
        self.scene.clear();
        log::debug!("cleared {nodes} elements");
    }

    /// Renders one frame to the surface.
    ///
    /// Transient surface problems surface as `FrameSkipped`/`SurfaceLost`;
    /// the caller may simply try again next frame.
    pub fn render_frame(&mut self) -> Result<FrameStats> {
        self.clock.tick();

        let mut frame = self.renderer.begin_frame()?;
        let projection = self.renderer.projection_matrix();
        let view = self.renderer.view_matrix();

        let stats = match self.quads.render(
            &mut frame,
            projection,
            view,
            &self.scene,
            &mut self.resources,
        ) {
            Ok(stats) => stats,
            Err(e) => {
                self.renderer.abort_frame(frame);
                return Err(e);
            }
        };

        self.renderer.end_frame(frame)?;
        self.scene.clear_dirty();
        self.resources.collect();
        Ok(stats)
    }

    /// Renders the current scene offscreen and reads the pixels back.
    /// Blocks until the GPU is done.
    pub fn capture_frame(&mut self) -> Result<FrameCapture> {
        let mut frame = self.renderer.begin_capture_frame()?;
        let projection = self.renderer.projection_matrix();
        let view = self.renderer.view_matrix();

        if let Err(e) = self.quads.render(
            &mut frame,
            projection,
            view,
            &self.scene,
            &mut self.resources,
        ) {
            self.renderer.abort_frame(frame);
            return Err(e);
        }

        let capture = self.renderer.end_capture_frame(frame)?;
        self.resources.collect();
        Ok(capture)
    }

    /// Frames per second measured at the last `render_frame`.
    #[inline]
    pub fn frame_rate(&self) -> u32 {
        self.clock.fps()
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.renderer.resize(PhysicalSize::new(width, height));
    }

    pub fn set_view(&mut self, pan: Vec2, zoom: f32) {
        self.renderer.set_view(pan, zoom);
    }

    /// Converts a logical-pixel canvas position to scene units.
    pub fn screen_to_world(&mut self, x: f32, y: f32) -> Vec2 {
        self.renderer.screen_to_world(x, y)
    }

    #[inline]
    pub fn scene(&self) -> &SceneGraph {
        &self.scene
    }

    #[inline]
    pub fn scene_mut(&mut self) -> &mut SceneGraph {
        &mut self.scene
    }

    #[inline]
    pub fn resources(&self) -> &ResourceManager {
        &self.resources
    }

    #[inline]
    pub fn resources_mut(&mut self) -> &mut ResourceManager {
        &mut self.resources
    }

    #[inline]
    pub fn renderer(&self) -> &Renderer<'w> {
        &self.renderer
    }

    #[inline]
    pub fn quads(&self) -> &QuadRenderer {
        &self.quads
    }

    #[inline]
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Releases every GPU resource and the device. Idempotent.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }

        self.quads.dispose(&mut self.resources);
        self.resources.dispose_all();
        if let Err(e) = self.renderer.flush() {
            log::warn!("flush before dispose failed: {e}");
        }
        let released = self.resources.collect();
        let leaked = self.resources.pending_release_count();
        if leaked > 0 {
            log::warn!("{leaked} resources still pending at dispose");
        }

        self.renderer.dispose();
        self.scene.clear();
        self.disposed = true;
        log::info!("editor disposed ({released} resources released)");
    }

    fn add_element(
        &mut self,
        id: &str,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        texture_id: Option<&str>,
    ) -> Result<()> {
        if self.disposed {
            return Err(Error::Disposed);
        }

        self.scene.create_node(id)?;
        self.scene.set_position(id, x, y)?;
        self.scene.set_scale(id, width, height)?;

        if let Err(e) = self.quads.add_quad(id, id, texture_id, Color::WHITE) {
            // Roll back so the id stays free.
            let _ = self.scene.remove_node(id);
            return Err(e);
        }
        Ok(())
    }
}

impl Editor<'static> {
    /// Creates an editor that renders offscreen. Frames are only observable
    /// through [`capture_frame`](Self::capture_frame).
    pub async fn headless(width: u32, height: u32, config: EditorConfig) -> Result<Self> {
        let renderer_config = config.renderer_config(1.0)?;
        let renderer = Renderer::headless(PhysicalSize::new(width, height), renderer_config).await?;
        Self::with_renderer(renderer)
    }
}

impl Drop for Editor<'_> {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Returns `{prefix}_{n}` for the first `n >= *counter` not `taken`, and moves
/// the counter past it.
fn next_free_id(prefix: &str, counter: &mut u64, taken: impl Fn(&str) -> bool) -> String {
    loop {
        let id = format!("{prefix}_{counter}");
        *counter += 1;
        if !taken(&id) {
            return id;
        }
    }
}
