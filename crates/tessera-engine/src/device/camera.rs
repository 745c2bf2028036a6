use glam::{Mat4, Vec2, Vec3, Vec4};

/// Orthographic 2D camera.
///
/// Scene units map to logical pixels: origin top-left, +Y down. The view
/// applies `pan` (scene units) then `zoom`. The projection is cached and
/// recomputed only when the logical size changes.
#[derive(Debug, Clone)]
pub struct Camera {
    logical_size: Vec2,
    pan: Vec2,
    zoom: f32,
    projection: Mat4,
    projection_dirty: bool,
}

impl Camera {
    pub fn new(logical_width: f32, logical_height: f32) -> Self {
        Self {
            logical_size: Vec2::new(logical_width.max(1.0), logical_height.max(1.0)),
            pan: Vec2::ZERO,
            zoom: 1.0,
            projection: Mat4::IDENTITY,
            projection_dirty: true,
        }
    }

    pub fn set_logical_size(&mut self, width: f32, height: f32) {
        let size = Vec2::new(width.max(1.0), height.max(1.0));
        if size != self.logical_size {
            self.logical_size = size;
            self.projection_dirty = true;
        }
    }

    /// Sets the view transform. `zoom` is clamped to `[0.05, 32.0]`.
    pub fn set_view(&mut self, pan: Vec2, zoom: f32) {
        self.pan = pan;
        self.zoom = zoom.clamp(0.05, 32.0);
    }

    pub fn projection_matrix(&mut self) -> Mat4 {
        if self.projection_dirty {
            let Vec2 { x: w, y: h } = self.logical_size;
            self.projection = Mat4::orthographic_rh(0.0, w, h, 0.0, -1.0, 1.0);
            self.projection_dirty = false;
        }
        self.projection
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::from_scale(Vec3::new(self.zoom, self.zoom, 1.0))
            * Mat4::from_translation(Vec3::new(-self.pan.x, -self.pan.y, 0.0))
    }

    /// Converts a logical-pixel position on the canvas to scene units.
    pub fn screen_to_world(&mut self, screen_x: f32, screen_y: f32) -> Vec2 {
        let ndc_x = (screen_x / self.logical_size.x) * 2.0 - 1.0;
        let ndc_y = 1.0 - (screen_y / self.logical_size.y) * 2.0;

        let inv = (self.projection_matrix() * self.view_matrix()).inverse();
        let world = inv * Vec4::new(ndc_x, ndc_y, 0.0, 1.0);
        Vec2::new(world.x / world.w, world.y / world.w)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: Vec2, b: Vec2) -> bool {
        (a - b).abs().max_element() < 1e-3
    }

    #[test]
    fn projection_maps_canvas_corners_to_clip_space() {
        let mut cam = Camera::new(800.0, 600.0);
        let p = cam.projection_matrix();

        let tl = p.project_point3(Vec3::new(0.0, 0.0, 0.0));
        let br = p.project_point3(Vec3::new(800.0, 600.0, 0.0));
        assert!(approx(tl.truncate(), Vec2::new(-1.0, 1.0)));
        assert!(approx(br.truncate(), Vec2::new(1.0, -1.0)));
        assert!((0.0..=1.0).contains(&tl.z));
    }

    #[test]
    fn projection_is_cached_until_resize() {
        let mut cam = Camera::new(800.0, 600.0);
        let a = cam.projection_matrix();
        cam.set_logical_size(800.0, 600.0);
        assert!(!cam.projection_dirty);
        cam.set_logical_size(400.0, 300.0);
        let b = cam.projection_matrix();
        assert_ne!(a, b);
    }

    #[test]
    fn default_view_is_identity() {
        let cam = Camera::new(10.0, 10.0);
        assert_eq!(cam.view_matrix(), Mat4::IDENTITY);
    }

    #[test]
    fn screen_to_world_inverts_pan_and_zoom() {
        let mut cam = Camera::new(800.0, 600.0);
        assert!(approx(cam.screen_to_world(100.0, 50.0), Vec2::new(100.0, 50.0)));

        cam.set_view(Vec2::new(10.0, 20.0), 2.0);
        // world = screen / zoom + pan
        assert!(approx(cam.screen_to_world(100.0, 50.0), Vec2::new(60.0, 45.0)));
    }
}
