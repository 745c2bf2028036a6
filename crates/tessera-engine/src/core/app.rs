use winit::event::WindowEvent;

use crate::editor::Editor;

use super::ctx::FrameCtx;

/// Control directive returned by app callbacks.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum AppControl {
    Continue,
    Exit,
}

/// Application contract implemented by hosts.
pub trait App {
    /// Called once after the window and editor exist, before the first frame.
    fn on_start(&mut self, editor: &mut Editor<'_>) -> anyhow::Result<()> {
        let _ = editor;
        Ok(())
    }

    /// Called for window events before the runtime handles them.
    fn on_window_event(&mut self, editor: &mut Editor<'_>, event: &WindowEvent) -> AppControl {
        let _ = (editor, event);
        AppControl::Continue
    }

    /// Called once per redraw. The default renders the scene as is.
    fn on_frame(&mut self, ctx: &mut FrameCtx<'_, '_>) -> AppControl {
        ctx.render()
    }
}
