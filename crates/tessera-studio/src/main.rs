use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use winit::dpi::LogicalSize;
use winit::event::{ElementState, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

use tessera_engine::core::{App, AppControl, FrameCtx};
use tessera_engine::logging::{init_logging, LoggingConfig};
use tessera_engine::paint::Color;
use tessera_engine::window::{Runtime, RuntimeConfig};
use tessera_engine::{Editor, EditorConfig};

const SHAPE_COLORS: [Color; 5] = [
    Color::new(1.0, 0.0, 0.0, 1.0),
    Color::new(0.0, 1.0, 0.0, 1.0),
    Color::new(0.0, 0.0, 1.0, 1.0),
    Color::new(1.0, 1.0, 0.0, 1.0),
    Color::new(1.0, 0.0, 1.0, 1.0),
];

/// Window title refresh interval, in frames.
const TITLE_EVERY: u64 = 30;

/// Demo shell: five test rectangles, optional image, keyboard actions.
///
/// Keys: `R` add rectangle, `P` export PNG, `C` clear, `Esc` quit.
struct Studio {
    image_path: Option<PathBuf>,
    added: u32,
    frames: u64,
}

impl Studio {
    fn new(image_path: Option<PathBuf>) -> Self {
        Self {
            image_path,
            added: 0,
            frames: 0,
        }
    }

    fn add_test_shapes(&mut self, editor: &mut Editor<'_>) -> Result<()> {
        for (i, color) in SHAPE_COLORS.iter().enumerate() {
            let id = format!("rect_{i}");
            let i = i as f32;
            let width = 100.0 + (i * 13.0) % 50.0;
            let height = 100.0 + (i * 29.0) % 50.0;

            editor.add_rectangle(&id, 100.0 + i * 120.0, 100.0 + i * 80.0, width, height)?;
            editor.set_rectangle_color(&id, *color)?;
        }
        log::info!("added {} test shapes", SHAPE_COLORS.len());
        Ok(())
    }

    fn add_rectangle(&mut self, editor: &mut Editor<'_>) -> Result<()> {
        let n = self.added;
        self.added += 1;

        let id = format!("rect_extra_{n}");
        let step = n as f32;
        let x = 100.0 + (step * 97.0) % 500.0;
        let y = 100.0 + (step * 61.0) % 300.0;
        let size = 50.0 + (step * 43.0) % 150.0;

        editor.add_rectangle(&id, x, y, size, size * 0.75)?;
        editor.set_rectangle_color(&id, SHAPE_COLORS[n as usize % SHAPE_COLORS.len()])?;
        log::info!("added rectangle `{id}`");
        Ok(())
    }

    fn export_png(&self, editor: &mut Editor<'_>) -> Result<PathBuf> {
        let capture = editor.capture_frame().context("frame capture failed")?;

        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let path = PathBuf::from(format!("tessera-export-{stamp}.png"));

        let image = image::RgbaImage::from_raw(capture.width, capture.height, capture.pixels)
            .context("capture buffer does not match its dimensions")?;
        image
            .save(&path)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }
}

fn load_image(editor: &mut Editor<'_>, path: &Path) -> Result<String> {
    let decoded = image::open(path)
        .with_context(|| format!("failed to decode {}", path.display()))?
        .to_rgba8();
    let (width, height) = decoded.dimensions();

    let texture = editor
        .load_texture(decoded.as_raw(), width, height)
        .with_context(|| format!("failed to upload {}", path.display()))?;
    let node = editor.add_image(&texture, 100.0, 100.0)?;
    log::info!("loaded {} as `{texture}` ({node})", path.display());
    Ok(node)
}

impl App for Studio {
    fn on_start(&mut self, editor: &mut Editor<'_>) -> Result<()> {
        self.add_test_shapes(editor)?;
        if let Some(path) = self.image_path.clone() {
            // A bad image should not keep the canvas from opening.
            if let Err(e) = load_image(editor, &path) {
                log::error!("{e:#}");
            }
        }
        Ok(())
    }

    fn on_window_event(&mut self, editor: &mut Editor<'_>, event: &WindowEvent) -> AppControl {
        let WindowEvent::KeyboardInput { event: key, .. } = event else {
            return AppControl::Continue;
        };
        if key.state != ElementState::Pressed || key.repeat {
            return AppControl::Continue;
        }

        let result = match key.physical_key {
            PhysicalKey::Code(KeyCode::Escape) => return AppControl::Exit,
            PhysicalKey::Code(KeyCode::KeyR) => self.add_rectangle(editor),
            PhysicalKey::Code(KeyCode::KeyC) => {
                editor.clear();
                log::info!("canvas cleared");
                Ok(())
            }
            PhysicalKey::Code(KeyCode::KeyP) => self.export_png(editor).map(|path| {
                log::info!("exported {}", path.display());
            }),
            _ => Ok(()),
        };

        if let Err(e) = result {
            log::error!("{e:#}");
        }
        AppControl::Continue
    }

    fn on_frame(&mut self, ctx: &mut FrameCtx<'_, '_>) -> AppControl {
        let control = ctx.render();
        self.frames += 1;

        if self.frames % TITLE_EVERY == 0 {
            if let Some(stats) = ctx.stats {
                ctx.runtime.set_title(format!(
                    "tessera studio | {} fps | {} quads, {} draw calls",
                    ctx.editor.frame_rate(),
                    stats.drawn_instances,
                    stats.draw_calls
                ));
            }
        }
        control
    }
}

fn main() -> Result<()> {
    init_logging(LoggingConfig::default());

    let image_path = std::env::args_os().nth(1).map(PathBuf::from);

    let config = RuntimeConfig {
        title: "tessera studio".to_string(),
        initial_size: LogicalSize::new(1024.0, 768.0),
        editor: EditorConfig {
            background_color: Some("#ffffff".to_string()),
            antialiasing: true,
            ..Default::default()
        },
    };

    Runtime::run(config, Studio::new(image_path))
}
