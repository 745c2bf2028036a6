use std::collections::{BTreeSet, HashMap};

use bytemuck::{Pod, Zeroable};

use crate::error::{Error, Result};
use crate::paint::Color;
use crate::resources::TextureState;
use crate::scene::SceneGraph;

/// GPU layout of one instance slot (WGSL `Instance`, 96-byte stride).
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub(super) struct InstanceData {
    pub model: [[f32; 4]; 4],
    pub color: [f32; 4],
    pub textured: f32,
    pub _pad: [f32; 3],
}

pub(super) const INSTANCE_STRIDE: u64 = std::mem::size_of::<InstanceData>() as u64;

/// Smallest slot capacity ever allocated on the GPU.
pub(super) const MIN_CAPACITY: u32 = 64;

/// Capacity needed to hold `required` slots, starting from `current`.
///
/// Never shrinks; grows to the next power of two.
pub(super) fn grown_capacity(current: u32, required: u32) -> u32 {
    if required <= current {
        return current;
    }
    required.next_power_of_two().max(MIN_CAPACITY)
}

/// Per-frame counters reported by `QuadRenderer::render`.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct FrameStats {
    /// Quads registered when the frame started.
    pub live_instances: usize,
    /// Quads that resolved and were drawn.
    pub drawn_instances: usize,
    /// Quads not drawn because their node or texture did not resolve.
    pub skipped_instances: usize,
    /// Skipped quads whose node was gone; they are removed from the renderer.
    pub pruned_instances: usize,
    /// Slots re-uploaded this frame.
    pub uploaded_instances: usize,
    pub draw_calls: usize,
}

/// Texture bound for a batch.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub(super) enum BatchTexture {
    /// White 1x1 texture: untextured quads and textures still uploading.
    Placeholder,
    Texture(String),
}

/// Contiguous run of the draw order sharing one texture.
#[derive(Debug, Clone, PartialEq)]
pub(super) struct Batch {
    pub texture: BatchTexture,
    pub start: u32,
    pub count: u32,
}

/// Everything `QuadRenderer` needs to upload and draw one frame.
#[derive(Debug, Default)]
pub(super) struct FramePlan {
    /// Slots whose GPU data is stale.
    pub writes: Vec<(u32, InstanceData)>,
    /// Slot indices in draw order, grouped by batch.
    pub order: Vec<u32>,
    pub batches: Vec<Batch>,
    /// Quads dropped because their node no longer exists.
    pub pruned: Vec<String>,
    pub stats: FrameStats,
}

#[derive(Debug)]
struct QuadInstance {
    node_id: String,
    texture_id: Option<String>,
    color: Color,
    slot: u32,
    /// Node revision and texture flag last written to the slot.
    written: Option<(u64, bool)>,
}

/// CPU side of the quad renderer: slot allocation, change tracking and
/// batching. Knows nothing about wgpu objects.
#[derive(Debug, Default)]
pub(super) struct InstanceTable {
    quads: HashMap<String, QuadInstance>,
    /// Insertion order; draw order within a batch follows it.
    order: Vec<String>,
    free_slots: BTreeSet<u32>,
    next_slot: u32,
}

impl InstanceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a quad and returns its slot. Freed slots are reused lowest
    /// first before the slot space grows.
    pub fn insert(
        &mut self,
        id: &str,
        node_id: &str,
        texture_id: Option<&str>,
        color: Color,
    ) -> Result<u32> {
        if self.quads.contains_key(id) {
            return Err(Error::DuplicateId(id.to_string()));
        }

        let slot = match self.free_slots.pop_first() {
            Some(slot) => slot,
            None => {
                let slot = self.next_slot;
                self.next_slot += 1;
                slot
            }
        };

        self.quads.insert(
            id.to_string(),
            QuadInstance {
                node_id: node_id.to_string(),
                texture_id: texture_id.map(str::to_string),
                color,
                slot,
                written: None,
            },
        );
        self.order.push(id.to_string());
        Ok(slot)
    }

    /// Frees the quad's slot. The slot space never shrinks.
    pub fn remove(&mut self, id: &str) -> Result<u32> {
        let quad = self
            .quads
            .remove(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        self.order.retain(|q| q != id);
        self.free_slots.insert(quad.slot);
        Ok(quad.slot)
    }

    pub fn set_color(&mut self, id: &str, color: Color) -> Result<()> {
        let quad = self.quad_mut(id)?;
        quad.color = color;
        quad.written = None;
        Ok(())
    }

    pub fn set_texture(&mut self, id: &str, texture_id: Option<&str>) -> Result<()> {
        let quad = self.quad_mut(id)?;
        quad.texture_id = texture_id.map(str::to_string);
        quad.written = None;
        Ok(())
    }

    #[inline]
    pub fn contains(&self, id: &str) -> bool {
        self.quads.contains_key(id)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.quads.len()
    }

    pub fn slot_of(&self, id: &str) -> Option<u32> {
        self.quads.get(id).map(|q| q.slot)
    }

    /// Number of slots ever handed out; GPU capacity must cover it.
    #[inline]
    pub fn slot_span(&self) -> u32 {
        self.next_slot
    }

    /// Forces every slot to be re-uploaded (after the GPU buffer was replaced).
    pub fn invalidate_all(&mut self) {
        for quad in self.quads.values_mut() {
            quad.written = None;
        }
    }

    pub fn clear(&mut self) {
        self.quads.clear();
        self.order.clear();
        self.free_slots.clear();
        self.next_slot = 0;
    }

    /// Resolves every quad against the scene and texture states and builds the
    /// frame's uploads, draw order and batches.
    ///
    /// Quads whose texture is `Missing` are skipped and kept, since the id may
    /// be uploaded again. Quads whose node is gone are skipped and pruned:
    /// their ids and slots are freed. Slots are marked written; the caller
    /// must apply `writes` before drawing.
    pub fn plan(
        &mut self,
        scene: &SceneGraph,
        texture_state: impl Fn(&str) -> TextureState,
    ) -> FramePlan {
        let mut plan = FramePlan::default();
        // (batch texture, slots) in first-appearance order.
        let mut groups: Vec<(BatchTexture, Vec<u32>)> = Vec::new();
        let mut group_index: HashMap<BatchTexture, usize> = HashMap::new();

        let live = self.quads.len();

        for id in &self.order {
            let Some(quad) = self.quads.get_mut(id) else { continue };
            let Some(node) = scene.get_node(&quad.node_id) else {
                plan.pruned.push(id.clone());
                continue;
            };

            let (batch_texture, textured) = match quad.texture_id.as_deref() {
                None => (BatchTexture::Placeholder, false),
                Some(tex) => match texture_state(tex) {
                    TextureState::Ready => (BatchTexture::Texture(tex.to_string()), true),
                    TextureState::Pending => (BatchTexture::Placeholder, false),
                    TextureState::Missing => continue,
                },
            };

            let stamp = (node.revision(), textured);
            if quad.written != Some(stamp) {
                plan.writes.push((
                    quad.slot,
                    InstanceData {
                        model: node.model_matrix().to_cols_array_2d(),
                        color: quad.color.to_array(),
                        textured: if textured { 1.0 } else { 0.0 },
                        _pad: [0.0; 3],
                    },
                ));
                quad.written = Some(stamp);
            }

            let g = *group_index.entry(batch_texture.clone()).or_insert_with(|| {
                groups.push((batch_texture, Vec::new()));
                groups.len() - 1
            });
            groups[g].1.push(quad.slot);
        }

        for (texture, slots) in groups {
            plan.batches.push(Batch {
                texture,
                start: plan.order.len() as u32,
                count: slots.len() as u32,
            });
            plan.order.extend(slots);
        }

        for id in &plan.pruned {
            if let Ok(slot) = self.remove(id) {
                log::debug!("pruned quad `{id}` (node gone, slot {slot} freed)");
            }
        }

        plan.stats = FrameStats {
            live_instances: live,
            drawn_instances: plan.order.len(),
            skipped_instances: live - plan.order.len(),
            pruned_instances: plan.pruned.len(),
            uploaded_instances: plan.writes.len(),
            draw_calls: plan.batches.len(),
        };
        plan
    }

    fn quad_mut(&mut self, id: &str) -> Result<&mut QuadInstance> {
        self.quads
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready(_: &str) -> TextureState {
        TextureState::Ready
    }

    fn scene_with(ids: &[&str]) -> SceneGraph {
        let mut scene = SceneGraph::new();
        for id in ids {
            scene.create_node(*id).unwrap();
        }
        scene
    }

    #[test]
    fn instance_stride_matches_wgsl_layout() {
        // mat4x4 (64) + vec4 (16) + f32, rounded up to 16-byte alignment.
        assert_eq!(INSTANCE_STRIDE, 96);
    }

    #[test]
    fn removed_slot_is_reused_before_growing() {
        let mut t = InstanceTable::new();
        assert_eq!(t.insert("a", "a", None, Color::WHITE).unwrap(), 0);
        assert_eq!(t.insert("b", "b", None, Color::WHITE).unwrap(), 1);
        assert_eq!(t.insert("c", "c", None, Color::WHITE).unwrap(), 2);

        assert_eq!(t.remove("b").unwrap(), 1);
        assert_eq!(t.insert("d", "d", None, Color::WHITE).unwrap(), 1);
        assert_eq!(t.slot_span(), 3);

        assert_eq!(t.insert("e", "e", None, Color::WHITE).unwrap(), 3);
        assert_eq!(t.slot_span(), 4);
    }

    #[test]
    fn duplicate_and_missing_quads() {
        let mut t = InstanceTable::new();
        t.insert("a", "n", None, Color::WHITE).unwrap();
        assert!(matches!(
            t.insert("a", "n", None, Color::BLACK),
            Err(Error::DuplicateId(_))
        ));
        assert!(matches!(t.remove("zz"), Err(Error::NotFound(_))));
        assert!(matches!(t.set_color("zz", Color::BLACK), Err(Error::NotFound(_))));
        assert!(matches!(t.set_texture("zz", None), Err(Error::NotFound(_))));
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn quads_sharing_a_texture_draw_in_one_call() {
        let ids = ["q0", "q1", "q2", "q3", "q4", "q5", "q6"];
        let scene = scene_with(&ids);
        let mut t = InstanceTable::new();
        for id in ids {
            t.insert(id, id, Some("atlas"), Color::WHITE).unwrap();
        }

        let plan = t.plan(&scene, ready);
        assert_eq!(plan.stats.draw_calls, 1);
        assert_eq!(plan.stats.drawn_instances, ids.len());
        assert_eq!(
            plan.batches,
            [Batch {
                texture: BatchTexture::Texture("atlas".into()),
                start: 0,
                count: ids.len() as u32,
            }]
        );
    }

    #[test]
    fn batches_group_by_texture_in_first_appearance_order() {
        let scene = scene_with(&["a", "b", "c", "d"]);
        let mut t = InstanceTable::new();
        t.insert("a", "a", Some("x"), Color::WHITE).unwrap();
        t.insert("b", "b", None, Color::WHITE).unwrap();
        t.insert("c", "c", Some("x"), Color::WHITE).unwrap();
        t.insert("d", "d", None, Color::WHITE).unwrap();

        let plan = t.plan(&scene, ready);
        assert_eq!(plan.stats.draw_calls, 2);
        assert_eq!(plan.order, [0, 2, 1, 3]);
        assert_eq!(plan.batches[0].texture, BatchTexture::Texture("x".into()));
        assert_eq!(plan.batches[1].texture, BatchTexture::Placeholder);
        assert_eq!((plan.batches[1].start, plan.batches[1].count), (2, 2));
    }

    #[test]
    fn stale_node_is_skipped_without_affecting_others() {
        let mut scene = scene_with(&["a", "b", "c"]);
        let mut t = InstanceTable::new();
        for id in ["a", "b", "c"] {
            t.insert(id, id, None, Color::WHITE).unwrap();
        }
        scene.remove_node("b").unwrap();

        let plan = t.plan(&scene, ready);
        assert_eq!(plan.stats.live_instances, 3);
        assert_eq!(plan.stats.drawn_instances, 2);
        assert_eq!(plan.stats.skipped_instances, 1);
        assert_eq!(plan.stats.pruned_instances, 1);
        assert_eq!(plan.order, [0, 2]);
    }

    #[test]
    fn quad_of_removed_node_is_pruned_and_its_id_freed() {
        let mut scene = scene_with(&["a", "b"]);
        let mut t = InstanceTable::new();
        t.insert("a", "a", None, Color::WHITE).unwrap();
        t.insert("b", "b", None, Color::WHITE).unwrap();
        scene.remove_node("a").unwrap();

        let plan = t.plan(&scene, ready);
        assert_eq!(plan.pruned, ["a"]);
        assert!(!t.contains("a"));
        assert_eq!(t.len(), 1);

        // Next frame reports only the survivor.
        let plan = t.plan(&scene, ready);
        assert_eq!(plan.stats.live_instances, 1);
        assert_eq!(plan.stats.skipped_instances, 0);

        // Both the id and the slot are reusable.
        scene.create_node("a").unwrap();
        assert_eq!(t.insert("a", "a", None, Color::WHITE).unwrap(), 0);
        assert_eq!(t.plan(&scene, ready).stats.drawn_instances, 2);
    }

    #[test]
    fn missing_texture_is_skipped_but_kept() {
        let scene = scene_with(&["a"]);
        let mut t = InstanceTable::new();
        t.insert("a", "a", Some("gone"), Color::WHITE).unwrap();

        let plan = t.plan(&scene, |_| TextureState::Missing);
        assert_eq!(plan.stats.skipped_instances, 1);
        assert_eq!(plan.stats.pruned_instances, 0);
        assert!(t.contains("a"));
    }

    #[test]
    fn texture_states_select_placeholder_or_skip() {
        let scene = scene_with(&["p", "m", "r"]);
        let mut t = InstanceTable::new();
        t.insert("p", "p", Some("pending"), Color::WHITE).unwrap();
        t.insert("m", "m", Some("missing"), Color::WHITE).unwrap();
        t.insert("r", "r", Some("ready"), Color::WHITE).unwrap();

        let state = |id: &str| match id {
            "pending" => TextureState::Pending,
            "ready" => TextureState::Ready,
            _ => TextureState::Missing,
        };
        let plan = t.plan(&scene, state);

        assert_eq!(plan.stats.drawn_instances, 2);
        assert_eq!(plan.stats.skipped_instances, 1);
        assert_eq!(plan.batches[0].texture, BatchTexture::Placeholder);
        let pending = plan.writes.iter().find(|(slot, _)| *slot == 0).unwrap();
        assert_eq!(pending.1.textured, 0.0);
        let ready = plan.writes.iter().find(|(slot, _)| *slot == 2).unwrap();
        assert_eq!(ready.1.textured, 1.0);
    }

    #[test]
    fn only_changed_slots_are_uploaded() {
        let mut scene = scene_with(&["a", "b"]);
        let mut t = InstanceTable::new();
        t.insert("a", "a", None, Color::WHITE).unwrap();
        t.insert("b", "b", None, Color::WHITE).unwrap();

        assert_eq!(t.plan(&scene, ready).writes.len(), 2);
        assert_eq!(t.plan(&scene, ready).writes.len(), 0);

        scene.set_position("b", 4.0, 2.0).unwrap();
        let plan = t.plan(&scene, ready);
        assert_eq!(plan.writes.len(), 1);
        assert_eq!(plan.writes[0].0, 1);
        assert_eq!(plan.writes[0].1.model[3][..2], [4.0, 2.0]);

        t.set_color("a", Color::BLACK).unwrap();
        assert_eq!(t.plan(&scene, ready).writes.len(), 1);

        t.invalidate_all();
        assert_eq!(t.plan(&scene, ready).stats.uploaded_instances, 2);
    }

    #[test]
    fn texture_becoming_ready_rewrites_slot() {
        let scene = scene_with(&["a"]);
        let mut t = InstanceTable::new();
        t.insert("a", "a", Some("img"), Color::WHITE).unwrap();

        let pending = t.plan(&scene, |_| TextureState::Pending);
        assert_eq!(pending.writes.len(), 1);
        let ready = t.plan(&scene, |_| TextureState::Ready);
        assert_eq!(ready.writes.len(), 1);
        assert_eq!(ready.writes[0].1.textured, 1.0);
    }

    #[test]
    fn capacity_doubles_and_never_shrinks() {
        assert_eq!(grown_capacity(0, 1), 64);
        assert_eq!(grown_capacity(64, 64), 64);
        assert_eq!(grown_capacity(64, 65), 128);
        assert_eq!(grown_capacity(128, 3), 128);
        assert_eq!(grown_capacity(128, 300), 512);
    }

    #[test]
    fn five_rectangles_one_batch() {
        let mut scene = SceneGraph::new();
        let mut t = InstanceTable::new();
        for i in 0..5 {
            let id = format!("rect_{i}");
            scene.create_node(id.as_str()).unwrap();
            scene.set_position(&id, 50.0 + i as f32 * 100.0, 50.0).unwrap();
            scene.set_scale(&id, 80.0, 80.0).unwrap();
            t.insert(&id, &id, None, Color::WHITE).unwrap();
        }

        let plan = t.plan(&scene, ready);
        assert_eq!(plan.stats.live_instances, 5);
        assert_eq!(plan.stats.drawn_instances, 5);
        assert_eq!(plan.stats.draw_calls, 1);
        assert!(grown_capacity(0, t.slot_span()) >= 5);
    }
}
