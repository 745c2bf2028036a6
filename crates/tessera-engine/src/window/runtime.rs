use anyhow::{Context, Result};
use ouroboros::self_referencing;

use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use crate::core::{App as CoreApp, AppControl, FrameCtx, WindowCtx};
use crate::editor::{Editor, EditorConfig};

/// Window/runtime configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub title: String,
    pub initial_size: LogicalSize<f64>,
    pub editor: EditorConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            title: "tessera".to_string(),
            initial_size: LogicalSize::new(1280.0, 720.0),
            editor: EditorConfig::default(),
        }
    }
}

/// Runtime context passed to the application.
///
/// Commands are buffered and applied after the current callback returns.
#[derive(Default)]
pub struct RuntimeCtx {
    commands: Vec<Command>,
}

impl RuntimeCtx {
    pub fn set_title(&mut self, title: impl Into<String>) {
        self.commands.push(Command::SetTitle(title.into()));
    }

    pub fn exit(&mut self) {
        self.commands.push(Command::Exit);
    }
}

enum Command {
    SetTitle(String),
    Exit,
}

/// Entry point for the runtime.
pub struct Runtime;

impl Runtime {
    /// Opens one window, builds an `Editor` on it and drives `app` with
    /// continuous redraws until the window closes or the app exits.
    pub fn run<A>(config: RuntimeConfig, app: A) -> Result<()>
    where
        A: 'static + CoreApp,
    {
        let event_loop = EventLoop::new().context("failed to create winit EventLoop")?;
        let mut state = AppState::new(config, app);

        event_loop
            .run_app(&mut state)
            .context("winit event loop terminated with error")?;

        state.failure.map_or(Ok(()), Err)
    }
}

#[self_referencing]
struct WindowEntry {
    window: Window,

    #[borrows(window)]
    #[covariant]
    editor: Editor<'this>,
}

struct AppState<A>
where
    A: CoreApp + 'static,
{
    config: RuntimeConfig,
    app: A,

    entry: Option<WindowEntry>,
    exit_requested: bool,
    /// First fatal error; returned from `Runtime::run`.
    failure: Option<anyhow::Error>,
}

impl<A> AppState<A>
where
    A: CoreApp + 'static,
{
    fn new(config: RuntimeConfig, app: A) -> Self {
        Self {
            config,
            app,
            entry: None,
            exit_requested: false,
            failure: None,
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        log::error!("{err:#}");
        self.failure.get_or_insert(err);
        self.close(event_loop);
    }

    /// Disposes the editor before the window it borrows goes away.
    fn close(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(mut entry) = self.entry.take() {
            entry.with_editor_mut(|editor| editor.dispose());
        }
        self.exit_requested = true;
        event_loop.exit();
    }

    fn create_window_entry(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let attrs = Window::default_attributes()
            .with_title(self.config.title.clone())
            .with_inner_size(self.config.initial_size);

        let window = event_loop
            .create_window(attrs)
            .context("failed to create window")?;

        let size = window.inner_size();
        let scale = window.scale_factor() as f32;
        let editor_config = self.config.editor.clone();

        let mut entry = WindowEntryTryBuilder {
            window,
            editor_builder: |w| pollster::block_on(Editor::new(w, size, scale, editor_config)),
        }
        .try_build()
        .context("GPU initialization failed for window")?;

        let app = &mut self.app;
        entry
            .with_editor_mut(|editor| app.on_start(editor))
            .context("app start-up failed")?;

        entry.with_window(|w| w.request_redraw());
        self.entry = Some(entry);
        Ok(())
    }

    fn apply_commands(&mut self, event_loop: &ActiveEventLoop, mut ctx: RuntimeCtx) {
        for cmd in ctx.commands.drain(..) {
            match cmd {
                Command::SetTitle(title) => {
                    if let Some(entry) = &self.entry {
                        entry.with_window(|w| w.set_title(&title));
                    }
                }
                Command::Exit => self.exit_requested = true,
            }
        }

        if self.exit_requested {
            self.close(event_loop);
        }
    }
}

impl<A> ApplicationHandler for AppState<A>
where
    A: CoreApp + 'static,
{
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.entry.is_some() {
            return;
        }

        if let Err(e) = self.create_window_entry(event_loop) {
            self.fail(event_loop, e);
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.exit_requested {
            event_loop.exit();
            return;
        }

        event_loop.set_control_flow(ControlFlow::Wait);

        // Continuous redraw.
        if let Some(entry) = &self.entry {
            entry.with_window(|w| w.request_redraw());
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if self.exit_requested {
            event_loop.exit();
            return;
        }

        // Split borrows to avoid `self` capture inside `ouroboros` closures.
        let (app, entry) = (&mut self.app, &mut self.entry);

        let Some(entry) = entry.as_mut() else {
            return;
        };
        if entry.with_window(|w| w.id()) != window_id {
            return;
        }

        let control = entry.with_editor_mut(|editor| app.on_window_event(editor, &event));
        if control == AppControl::Exit {
            self.close(event_loop);
            return;
        }

        // Runtime-managed window lifecycle / resize / redraw handling.
        match &event {
            WindowEvent::CloseRequested => self.close(event_loop),

            WindowEvent::Resized(new_size) => {
                entry.with_editor_mut(|editor| editor.resize(new_size.width, new_size.height));
                entry.with_window(|w| w.request_redraw());
            }

            WindowEvent::ScaleFactorChanged { .. } => {
                let new_size = entry.with_window(|w| w.inner_size());
                entry.with_editor_mut(|editor| editor.resize(new_size.width, new_size.height));
                entry.with_window(|w| w.request_redraw());
            }

            WindowEvent::RedrawRequested => {
                let mut runtime_ctx = RuntimeCtx::default();
                let mut app_control = AppControl::Continue;

                entry.with_mut(|fields| {
                    let mut ctx = FrameCtx {
                        window: WindowCtx {
                            id: window_id,
                            window: fields.window,
                        },
                        editor: fields.editor,
                        runtime: &mut runtime_ctx,
                        stats: None,
                    };
                    app_control = app.on_frame(&mut ctx);
                });

                if app_control == AppControl::Exit {
                    runtime_ctx.exit();
                }

                self.apply_commands(event_loop, runtime_ctx);
            }

            _ => {}
        }
    }
}
