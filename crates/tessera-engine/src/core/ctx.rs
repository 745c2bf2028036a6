use winit::window::{Window, WindowId};

use crate::editor::Editor;
use crate::error::Error;
use crate::render::FrameStats;
use crate::window::RuntimeCtx;

use super::app::AppControl;

/// Window handle and metadata for the current callback.
pub struct WindowCtx<'a> {
    pub id: WindowId,
    pub window: &'a Window,
}

impl WindowCtx<'_> {
    /// Returns the logical window size as `(width, height)`.
    pub fn logical_size(&self) -> (f32, f32) {
        let phys = self.window.inner_size();
        let logi: winit::dpi::LogicalSize<f64> = phys.to_logical(self.window.scale_factor());
        (logi.width as f32, logi.height as f32)
    }
}

/// Per-frame context passed to `core::App::on_frame`.
///
/// Lifetimes:
/// - `'a` is the duration of the callback invocation
/// - `'w` is the window-borrow lifetime carried by `Editor<'w>`
pub struct FrameCtx<'a, 'w> {
    pub window: WindowCtx<'a>,
    pub editor: &'a mut Editor<'w>,
    pub runtime: &'a mut RuntimeCtx,
    /// Stats of the frame rendered by the last `render` call, if it succeeded.
    pub stats: Option<FrameStats>,
}

impl FrameCtx<'_, '_> {
    /// Renders and presents one frame.
    ///
    /// Transient surface errors skip the frame; device loss or disposal ends
    /// the app.
    pub fn render(&mut self) -> AppControl {
        self.window.window.pre_present_notify();
        match self.editor.render_frame() {
            Ok(stats) => {
                self.stats = Some(stats);
                AppControl::Continue
            }
            Err(e) if e.is_frame_local() => {
                log::debug!("frame skipped: {e}");
                AppControl::Continue
            }
            Err(e @ (Error::Disposed | Error::Device(_))) => {
                log::error!("renderer unusable: {e}");
                AppControl::Exit
            }
            Err(e) => {
                log::warn!("frame failed: {e}");
                AppControl::Continue
            }
        }
    }
}
