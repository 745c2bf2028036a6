//! GPU-backed tests. Run with `--features gpu-tests`; each test returns early
//! when the machine has no usable adapter.
#![cfg(feature = "gpu-tests")]

use tessera_engine::device::{Renderer, RendererConfig, RendererState};
use tessera_engine::paint::Color;
use tessera_engine::resources::TextureState;
use tessera_engine::{Editor, EditorConfig, Error};
use winit::dpi::PhysicalSize;

fn headless_editor(width: u32, height: u32, background: &str) -> Option<Editor<'static>> {
    let config = EditorConfig {
        background_color: Some(background.to_string()),
        antialiasing: false,
        ..Default::default()
    };
    match pollster::block_on(Editor::headless(width, height, config)) {
        Ok(editor) => Some(editor),
        Err(e @ (Error::NoAdapter(_) | Error::Device(_))) => {
            eprintln!("skipping: {e}");
            None
        }
        Err(e) => panic!("editor creation failed: {e}"),
    }
}

#[test]
fn five_rectangles_render_in_one_draw_call() {
    let Some(mut editor) = headless_editor(800, 600, "#ffffff") else { return };

    for i in 0..5 {
        let x = 100.0 + i as f32 * 120.0;
        let y = 100.0 + i as f32 * 80.0;
        editor.add_rectangle(&format!("rect_{i}"), x, y, 100.0, 100.0).unwrap();
    }

    let stats = editor.render_frame().unwrap();
    assert_eq!(stats.live_instances, 5);
    assert_eq!(stats.drawn_instances, 5);
    assert_eq!(stats.draw_calls, 1);
    assert!(editor.resources().live_count() > 0);

    editor.dispose();
    assert!(editor.is_disposed());
    assert_eq!(editor.resources().live_count(), 0);
    assert_eq!(editor.resources().pending_release_count(), 0);
    assert_eq!(editor.renderer().state(), RendererState::Disposed);
    assert!(matches!(editor.render_frame(), Err(Error::Disposed)));
}

#[test]
fn capture_reads_back_rectangle_color() {
    let Some(mut editor) = headless_editor(64, 64, "#000000") else { return };

    editor.add_rectangle("r", 0.0, 0.0, 32.0, 64.0).unwrap();
    editor
        .set_rectangle_color("r", Color::new(1.0, 0.0, 0.0, 1.0))
        .unwrap();

    let capture = editor.capture_frame().unwrap();
    assert_eq!((capture.width, capture.height), (64, 64));
    assert_eq!(capture.pixels.len(), 64 * 64 * 4);
    assert_eq!(capture.pixel(8, 32), Some([255, 0, 0, 255]));
    assert_eq!(capture.pixel(56, 32), Some([0, 0, 0, 255]));
}

#[test]
fn images_follow_texture_lifetime() {
    let Some(mut editor) = headless_editor(128, 128, "#ffffff") else { return };

    assert!(matches!(
        editor.load_texture(&[0; 7], 2, 2),
        Err(Error::SizeMismatch { expected: 16, actual: 7, .. })
    ));

    let texture = editor.load_texture(&[200; 16], 2, 2).unwrap();
    assert_ne!(editor.resources().texture_state(&texture), TextureState::Missing);

    let image = editor.add_image(&texture, 10.0, 10.0).unwrap();
    let node = editor.scene().get_node(&image).unwrap();
    assert_eq!(node.scale(), glam::Vec2::new(2.0, 2.0));

    let stats = editor.render_frame().unwrap();
    assert_eq!(stats.drawn_instances, 1);

    assert_eq!(editor.resources_mut().dispose(&texture).unwrap(), 0);
    assert_eq!(editor.resources().texture_state(&texture), TextureState::Missing);
    assert!(matches!(
        editor.resources_mut().dispose(&texture),
        Err(Error::NotFound(_))
    ));

    let stats = editor.render_frame().unwrap();
    assert_eq!(stats.live_instances, 1);
    assert_eq!(stats.skipped_instances, 1);
    assert_eq!(stats.draw_calls, 0);
}

#[test]
fn instance_storage_grows_past_initial_capacity() {
    let Some(mut editor) = headless_editor(256, 256, "#ffffff") else { return };
    let initial = editor.quads().capacity();

    for i in 0..100 {
        editor
            .add_rectangle(&format!("r{i}"), (i % 10) as f32 * 20.0, (i / 10) as f32 * 20.0, 10.0, 10.0)
            .unwrap();
    }
    let stats = editor.render_frame().unwrap();
    assert_eq!(stats.drawn_instances, 100);
    assert_eq!(stats.draw_calls, 1);
    assert!(editor.quads().capacity() >= 128);
    assert!(editor.quads().capacity() > initial);

    editor.remove_rectangle("r3").unwrap();
    editor.add_rectangle("again", 0.0, 0.0, 5.0, 5.0).unwrap();
    assert_eq!(editor.quads().slot_of("again"), Some(3));
}

#[test]
fn buffer_writes_are_bounded_by_requested_length() {
    let Some(mut editor) = headless_editor(16, 16, "#ffffff") else { return };
    let resources = editor.resources_mut();

    resources
        .create_buffer("b6", 6, wgpu::BufferUsages::VERTEX)
        .unwrap();
    assert_eq!(resources.info("b6").unwrap().byte_size, 6);

    assert!(matches!(
        resources.write_buffer("b6", 4, &[0; 4]),
        Err(Error::OutOfBounds { size: 6, .. })
    ));
    assert!(matches!(
        resources.write_buffer("b6", 0, &[0; 8]),
        Err(Error::OutOfBounds { .. })
    ));

    // Full and tail writes of an unaligned length are accepted.
    resources.write_buffer("b6", 0, &[1; 6]).unwrap();
    resources.write_buffer("b6", 4, &[2; 2]).unwrap();
    assert!(matches!(
        resources.write_buffer("b6", 0, &[3; 2]),
        Err(Error::Misaligned { .. })
    ));
}

#[test]
fn removed_node_frees_its_element_id() {
    let Some(mut editor) = headless_editor(64, 64, "#ffffff") else { return };

    editor.add_rectangle("a", 0.0, 0.0, 10.0, 10.0).unwrap();
    editor.scene_mut().remove_node("a").unwrap();

    let stats = editor.render_frame().unwrap();
    assert_eq!(stats.skipped_instances, 1);
    assert_eq!(stats.pruned_instances, 1);
    assert!(editor.quads().is_empty());

    editor.add_rectangle("a", 0.0, 0.0, 10.0, 10.0).unwrap();
    assert_eq!(editor.render_frame().unwrap().drawn_instances, 1);
}

#[test]
fn clear_drops_quads_whose_node_is_gone() {
    let Some(mut editor) = headless_editor(64, 64, "#ffffff") else { return };

    editor.add_rectangle("a", 0.0, 0.0, 10.0, 10.0).unwrap();
    editor.add_rectangle("b", 20.0, 0.0, 10.0, 10.0).unwrap();
    editor.scene_mut().remove_node("a").unwrap();

    editor.clear();
    assert!(editor.quads().is_empty());
    assert!(editor.scene().is_empty());

    editor.add_rectangle("a", 0.0, 0.0, 10.0, 10.0).unwrap();
    editor.add_rectangle("b", 20.0, 0.0, 10.0, 10.0).unwrap();
    assert_eq!(editor.render_frame().unwrap().drawn_instances, 2);
}

#[test]
fn add_image_skips_element_ids_in_use() {
    let Some(mut editor) = headless_editor(64, 64, "#ffffff") else { return };

    let texture = editor.load_texture(&[255; 16], 2, 2).unwrap();
    editor.add_rectangle("image_node_0", 0.0, 0.0, 4.0, 4.0).unwrap();

    let first = editor.add_image(&texture, 10.0, 10.0).unwrap();
    let second = editor.add_image(&texture, 20.0, 10.0).unwrap();
    assert_eq!(first, "image_node_1");
    assert_eq!(second, "image_node_2");
}

#[test]
fn renderer_rejects_nested_frames_and_use_after_dispose() {
    let size = PhysicalSize::new(32, 32);
    let mut renderer = match pollster::block_on(Renderer::headless(size, RendererConfig::default())) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("skipping: {e}");
            return;
        }
    };

    assert_eq!(renderer.size(), size);
    assert_eq!(renderer.sample_count(), 1);

    let frame = renderer.begin_frame().unwrap();
    assert_eq!(renderer.state(), RendererState::FrameOpen);
    assert!(matches!(renderer.begin_frame(), Err(Error::FrameInProgress)));

    let serial = renderer.end_frame(frame).unwrap();
    assert!(serial >= 1);
    assert_eq!(renderer.state(), RendererState::Ready);

    renderer.dispose();
    assert!(matches!(renderer.begin_frame(), Err(Error::Disposed)));
}
