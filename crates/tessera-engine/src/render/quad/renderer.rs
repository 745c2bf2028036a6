use std::collections::HashMap;

use glam::Mat4;

use crate::device::{Frame, GpuContext};
use crate::error::{Error, Result};
use crate::paint::Color;
use crate::resources::{PixelFormat, ResourceManager};
use crate::scene::SceneGraph;

use super::super::common::{
    min_binding_size, premul_alpha_blend, CameraUniform, QuadVertex, QUAD_INDICES,
    QUAD_VERTICES,
};
use super::instances::{
    grown_capacity, BatchTexture, FrameStats, InstanceData, InstanceTable, INSTANCE_STRIDE,
};

const VERTICES_ID: &str = "quad_renderer/unit_vertices";
const INDICES_ID: &str = "quad_renderer/unit_indices";
const INSTANCES_ID: &str = "quad_renderer/instances";
const DRAW_ORDER_ID: &str = "quad_renderer/draw_order";
const CAMERA_ID: &str = "quad_renderer/camera";
const PLACEHOLDER_ID: &str = "quad_renderer/placeholder";

const INSTANCE_USAGE: wgpu::BufferUsages = wgpu::BufferUsages::STORAGE;
const DRAW_ORDER_USAGE: wgpu::BufferUsages = wgpu::BufferUsages::VERTEX;

/// Draws scene nodes as textured, tinted quads with as few draw calls as the
/// texture set allows.
///
/// Each registered quad owns a fixed slot in an instance storage buffer. Per
/// frame only slots whose node (or color/texture) changed are re-uploaded,
/// then a draw-order stream of slot indices is written and one
/// `draw_indexed` is issued per texture.
///
/// All buffers and the placeholder texture live in the `ResourceManager`
/// under `quad_renderer/*` ids.
pub struct QuadRenderer {
    ctx: GpuContext,
    table: InstanceTable,
    capacity: u32,

    camera_bgl: wgpu::BindGroupLayout,
    texture_bgl: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    shader: wgpu::ShaderModule,
    sampler: wgpu::Sampler,

    pipelines: HashMap<(wgpu::TextureFormat, u32), wgpu::RenderPipeline>,
    /// Rebuilt when the instance buffer generation changes.
    camera_bind_group: Option<(u64, wgpu::BindGroup)>,
    /// Texture id -> (resource generation, bind group).
    texture_bind_groups: HashMap<String, (u64, wgpu::BindGroup)>,

    last_stats: FrameStats,
    disposed: bool,
}

impl QuadRenderer {
    /// Creates the shared quad geometry, the camera uniform and an initial
    /// instance buffer of 64 slots.
    pub fn new(ctx: GpuContext, resources: &mut ResourceManager) -> Result<Self> {
        let device = ctx.device();

        resources.create_buffer(
            VERTICES_ID,
            std::mem::size_of_val(&QUAD_VERTICES) as u64,
            wgpu::BufferUsages::VERTEX,
        )?;
        resources.write_buffer(VERTICES_ID, 0, bytemuck::cast_slice(&QUAD_VERTICES))?;

        resources.create_buffer(
            INDICES_ID,
            std::mem::size_of_val(&QUAD_INDICES) as u64,
            wgpu::BufferUsages::INDEX,
        )?;
        resources.write_buffer(INDICES_ID, 0, bytemuck::cast_slice(&QUAD_INDICES))?;

        resources.create_buffer(
            CAMERA_ID,
            std::mem::size_of::<CameraUniform>() as u64,
            wgpu::BufferUsages::UNIFORM,
        )?;

        let capacity = grown_capacity(0, 1);
        resources.create_buffer(INSTANCES_ID, capacity as u64 * INSTANCE_STRIDE, INSTANCE_USAGE)?;
        resources.create_buffer(DRAW_ORDER_ID, capacity as u64 * 4, DRAW_ORDER_USAGE)?;

        resources.create_texture(PLACEHOLDER_ID, &[255; 4], 1, 1, PixelFormat::Rgba8Unorm)?;

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("tessera quad shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/quad.wgsl").into()),
        });

        let camera_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("tessera quad camera bgl"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: min_binding_size::<CameraUniform>(),
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: true },
                        has_dynamic_offset: false,
                        min_binding_size: min_binding_size::<InstanceData>(),
                    },
                    count: None,
                },
            ],
        });

        let texture_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("tessera quad texture bgl"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("tessera quad pipeline layout"),
            bind_group_layouts: &[&camera_bgl, &texture_bgl],
            immediate_size: 0,
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("tessera quad sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        log::debug!("quad renderer ready ({capacity} slots)");

        Ok(Self {
            ctx,
            table: InstanceTable::new(),
            capacity,
            camera_bgl,
            texture_bgl,
            pipeline_layout,
            shader,
            sampler,
            pipelines: HashMap::new(),
            camera_bind_group: None,
            texture_bind_groups: HashMap::new(),
            last_stats: FrameStats::default(),
            disposed: false,
        })
    }

    /// Registers a quad drawing `node_id`, optionally textured with
    /// `texture_id`. Both ids are resolved each frame; unresolved quads are
    /// skipped, not removed.
    pub fn add_quad(
        &mut self,
        id: &str,
        node_id: &str,
        texture_id: Option<&str>,
        color: Color,
    ) -> Result<()> {
        self.ensure_live()?;
        let slot = self.table.insert(id, node_id, texture_id, color)?;
        log::trace!("quad `{id}` -> slot {slot}");
        Ok(())
    }

    pub fn remove_quad(&mut self, id: &str) -> Result<()> {
        self.ensure_live()?;
        self.table.remove(id)?;
        Ok(())
    }

    pub fn set_quad_color(&mut self, id: &str, color: Color) -> Result<()> {
        self.ensure_live()?;
        self.table.set_color(id, color)
    }

    pub fn set_quad_texture(&mut self, id: &str, texture_id: Option<&str>) -> Result<()> {
        self.ensure_live()?;
        self.table.set_texture(id, texture_id)
    }

    /// Drops every quad, including ones whose node is already gone. The GPU
    /// capacity is kept.
    pub fn clear(&mut self) {
        let count = self.table.len();
        self.table.clear();
        log::debug!("cleared {count} quads");
    }

    #[inline]
    pub fn contains(&self, id: &str) -> bool {
        self.table.contains(id)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.table.len() == 0
    }

    /// Slot assigned to quad `id`.
    pub fn slot_of(&self, id: &str) -> Option<u32> {
        self.table.slot_of(id)
    }

    /// Slots allocated on the GPU.
    #[inline]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    #[inline]
    pub fn last_stats(&self) -> FrameStats {
        self.last_stats
    }

    /// Uploads changed instance data and records the frame's draws into
    /// `frame`'s render pass.
    pub fn render(
        &mut self,
        frame: &mut Frame,
        projection: Mat4,
        view: Mat4,
        scene: &SceneGraph,
        resources: &mut ResourceManager,
    ) -> Result<FrameStats> {
        self.ensure_live()?;
        self.ensure_capacity(resources)?;

        let camera = CameraUniform {
            view_proj: (projection * view).to_cols_array_2d(),
        };
        resources.write_buffer(CAMERA_ID, 0, bytemuck::bytes_of(&camera))?;

        let plan = self.table.plan(scene, |id| resources.texture_state(id));
        for (slot, data) in &plan.writes {
            resources.write_buffer(
                INSTANCES_ID,
                *slot as u64 * INSTANCE_STRIDE,
                bytemuck::bytes_of(data),
            )?;
        }
        resources.write_buffer(DRAW_ORDER_ID, 0, bytemuck::cast_slice(&plan.order))?;

        self.last_stats = plan.stats;
        if plan.batches.is_empty() {
            return Ok(plan.stats);
        }

        self.ensure_pipeline(frame.format(), frame.sample_count());
        self.ensure_camera_bind_group(resources)?;
        self.evict_stale_texture_bind_groups(resources);
        for batch in &plan.batches {
            self.ensure_texture_bind_group(texture_resource(&batch.texture), resources)?;
        }

        let pipeline = self
            .pipelines
            .get(&(frame.format(), frame.sample_count()))
            .ok_or_else(|| Error::NotFound("quad pipeline".to_string()))?;
        let (_, camera_bg) = self
            .camera_bind_group
            .as_ref()
            .ok_or_else(|| Error::NotFound("quad camera bind group".to_string()))?;
        let vertices = resource_buffer(resources, VERTICES_ID)?;
        let indices = resource_buffer(resources, INDICES_ID)?;
        let draw_order = resource_buffer(resources, DRAW_ORDER_ID)?;

        let pass = frame.pass();
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, camera_bg, &[]);
        pass.set_vertex_buffer(0, vertices.slice(..));
        pass.set_vertex_buffer(1, draw_order.slice(..));
        pass.set_index_buffer(indices.slice(..), wgpu::IndexFormat::Uint16);

        for batch in &plan.batches {
            let key = texture_resource(&batch.texture);
            let Some((_, texture_bg)) = self.texture_bind_groups.get(key) else {
                continue;
            };
            pass.set_bind_group(1, texture_bg, &[]);
            pass.draw_indexed(
                0..QUAD_INDICES.len() as u32,
                0,
                batch.start..batch.start + batch.count,
            );
        }

        Ok(plan.stats)
    }

    /// Releases every buffer and texture this renderer created. Later calls
    /// fail with `Disposed`.
    pub fn dispose(&mut self, resources: &mut ResourceManager) {
        if self.disposed {
            return;
        }
        for id in [
            VERTICES_ID,
            INDICES_ID,
            INSTANCES_ID,
            DRAW_ORDER_ID,
            CAMERA_ID,
            PLACEHOLDER_ID,
        ] {
            if let Err(e) = resources.dispose(id) {
                log::warn!("quad renderer dispose: {e}");
            }
        }
        self.table.clear();
        self.pipelines.clear();
        self.camera_bind_group = None;
        self.texture_bind_groups.clear();
        self.disposed = true;
        log::debug!("quad renderer disposed");
    }

    fn ensure_live(&self) -> Result<()> {
        if self.disposed {
            return Err(Error::Disposed);
        }
        Ok(())
    }

    /// Grows the instance and draw-order buffers to cover every slot.
    fn ensure_capacity(&mut self, resources: &mut ResourceManager) -> Result<()> {
        let required = self.table.slot_span();
        let new_cap = grown_capacity(self.capacity, required);
        if new_cap == self.capacity {
            return Ok(());
        }

        resources.replace_buffer(INSTANCES_ID, new_cap as u64 * INSTANCE_STRIDE, INSTANCE_USAGE)?;
        resources.replace_buffer(DRAW_ORDER_ID, new_cap as u64 * 4, DRAW_ORDER_USAGE)?;
        // Fresh buffers are zeroed; every slot must be uploaded again.
        self.table.invalidate_all();

        log::debug!("quad capacity {} -> {new_cap}", self.capacity);
        self.capacity = new_cap;
        Ok(())
    }

    fn ensure_pipeline(&mut self, format: wgpu::TextureFormat, sample_count: u32) {
        if self.pipelines.contains_key(&(format, sample_count)) {
            return;
        }

        let draw_order_attrs = wgpu::vertex_attr_array![1 => Uint32];
        let draw_order_layout = wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<u32>() as u64,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &draw_order_attrs,
        };

        let pipeline = self
            .ctx
            .device()
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("tessera quad pipeline"),
                layout: Some(&self.pipeline_layout),

                vertex: wgpu::VertexState {
                    module: &self.shader,
                    entry_point: Some("vs_main"),
                    compilation_options: Default::default(),
                    buffers: &[QuadVertex::layout(), draw_order_layout],
                },

                fragment: Some(wgpu::FragmentState {
                    module: &self.shader,
                    entry_point: Some("fs_main"),
                    compilation_options: Default::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format,
                        blend: Some(premul_alpha_blend()),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),

                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },

                depth_stencil: None,
                multisample: wgpu::MultisampleState {
                    count: sample_count,
                    mask: !0,
                    alpha_to_coverage_enabled: false,
                },

                multiview_mask: None,
                cache: None,
            });

        log::debug!("quad pipeline built for {format:?} x{sample_count}");
        self.pipelines.insert((format, sample_count), pipeline);
    }

    fn ensure_camera_bind_group(&mut self, resources: &ResourceManager) -> Result<()> {
        let generation = resources
            .generation(INSTANCES_ID)
            .ok_or_else(|| Error::NotFound(INSTANCES_ID.to_string()))?;
        if matches!(&self.camera_bind_group, Some((g, _)) if *g == generation) {
            return Ok(());
        }

        let camera = resource_buffer(resources, CAMERA_ID)?;
        let instances = resource_buffer(resources, INSTANCES_ID)?;
        let bind_group = self
            .ctx
            .device()
            .create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("tessera quad camera bind group"),
                layout: &self.camera_bgl,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: camera.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: instances.as_entire_binding(),
                    },
                ],
            });
        self.camera_bind_group = Some((generation, bind_group));
        Ok(())
    }

    fn evict_stale_texture_bind_groups(&mut self, resources: &ResourceManager) {
        self.texture_bind_groups
            .retain(|id, (generation, _)| resources.generation(id) == Some(*generation));
    }

    fn ensure_texture_bind_group(&mut self, id: &str, resources: &ResourceManager) -> Result<()> {
        if self.texture_bind_groups.contains_key(id) {
            return Ok(());
        }

        let view = resources
            .texture_view(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        let generation = resources
            .generation(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        let bind_group = self
            .ctx
            .device()
            .create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("tessera quad texture bind group"),
                layout: &self.texture_bgl,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::Sampler(&self.sampler),
                    },
                ],
            });
        self.texture_bind_groups
            .insert(id.to_string(), (generation, bind_group));
        Ok(())
    }
}

fn texture_resource(texture: &BatchTexture) -> &str {
    match texture {
        BatchTexture::Placeholder => PLACEHOLDER_ID,
        BatchTexture::Texture(id) => id,
    }
}

fn resource_buffer<'a>(resources: &'a ResourceManager, id: &str) -> Result<&'a wgpu::Buffer> {
    resources
        .buffer(id)
        .ok_or_else(|| Error::NotFound(id.to_string()))
}
