use glam::{Mat4, Quat, Vec2, Vec3};

/// Position, scale and rotation of one visual element.
///
/// `scale` is the element's size in scene units; the renderer draws a unit
/// quad spanning `[0, 1]²`, so `position` is the top-left corner and rotation
/// pivots around it.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformNode {
    id: String,
    position: Vec2,
    scale: Vec2,
    rotation: f32,
    dirty: bool,
    revision: u64,
}

impl TransformNode {
    pub(super) fn new(id: String, revision: u64) -> Self {
        Self {
            id,
            position: Vec2::ZERO,
            scale: Vec2::ONE,
            rotation: 0.0,
            dirty: true,
            revision,
        }
    }

    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[inline]
    pub fn position(&self) -> Vec2 {
        self.position
    }

    #[inline]
    pub fn scale(&self) -> Vec2 {
        self.scale
    }

    /// Rotation in radians.
    #[inline]
    pub fn rotation(&self) -> f32 {
        self.rotation
    }

    /// True if the node changed since the last `SceneGraph::clear_dirty`.
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Graph-wide stamp of the latest mutation. Never reused, even across
    /// remove/create of the same id.
    #[inline]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Model matrix: translate, then rotate about Z, then scale.
    pub fn model_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(
            Vec3::new(self.scale.x, self.scale.y, 1.0),
            Quat::from_rotation_z(self.rotation),
            Vec3::new(self.position.x, self.position.y, 0.0),
        )
    }

    pub(super) fn set_position(&mut self, position: Vec2, revision: u64) {
        self.position = position;
        self.touch(revision);
    }

    pub(super) fn set_scale(&mut self, scale: Vec2, revision: u64) {
        self.scale = scale;
        self.touch(revision);
    }

    pub(super) fn set_rotation(&mut self, rotation: f32, revision: u64) {
        self.rotation = rotation;
        self.touch(revision);
    }

    pub(super) fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    fn touch(&mut self, revision: u64) {
        self.dirty = true;
        self.revision = revision;
    }
}
