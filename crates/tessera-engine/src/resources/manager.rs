use std::borrow::Cow;

use crate::device::GpuContext;
use crate::error::{Error, Result};

use super::format::PixelFormat;
use super::registry::{check_write, GpuObject, Registry, ResourceKind};
use super::ResourceId;

/// Exclusively owned wgpu object behind a resource id.
#[derive(Debug)]
enum GpuHandle {
    Buffer(wgpu::Buffer),
    Texture {
        texture: wgpu::Texture,
        view: wgpu::TextureView,
        width: u32,
        height: u32,
    },
}

impl GpuObject for GpuHandle {
    fn destroy(self) {
        match self {
            GpuHandle::Buffer(buffer) => buffer.destroy(),
            GpuHandle::Texture { texture, .. } => texture.destroy(),
        }
    }
}

/// Upload visibility of a texture.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum TextureState {
    /// Upload enqueued; the carrying submission has not completed yet.
    Pending,
    Ready,
    /// Unknown id, disposed, or not a texture.
    Missing,
}

/// Inspection snapshot of one live resource.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ResourceInfo {
    pub kind: ResourceKind,
    pub byte_size: u64,
    pub ref_count: u32,
}

/// Owns buffers and textures created for callers, keyed by string id.
///
/// Lifetimes:
/// - creation registers the handle with a reference count of one
/// - `retain`/`dispose` adjust the count; at zero the id is freed at once and
///   the handle waits for the next submission serial to retire
/// - `collect` destroys every parked handle the GPU is done with
pub struct ResourceManager {
    ctx: GpuContext,
    registry: Registry<GpuHandle>,
}

impl ResourceManager {
    pub fn new(ctx: GpuContext) -> Self {
        Self {
            ctx,
            registry: Registry::new(),
        }
    }

    /// Creates a sampled texture and enqueues its pixel upload.
    ///
    /// `pixels` must hold exactly `width * height * bytes_per_pixel` tightly
    /// packed bytes. Returns once the upload is enqueued; see
    /// [`texture_state`](Self::texture_state) for when it becomes visible.
    pub fn create_texture(
        &mut self,
        id: impl Into<ResourceId>,
        pixels: &[u8],
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<ResourceId> {
        let id = id.into();
        self.registry.ensure_vacant(&id)?;

        let expected = format.byte_len(width, height);
        if pixels.len() != expected {
            return Err(Error::SizeMismatch {
                id,
                expected,
                actual: pixels.len(),
            });
        }

        let max = self.ctx.device().limits().max_texture_dimension_2d;
        if width == 0 || height == 0 || width > max || height > max {
            return Err(Error::Allocation {
                id,
                reason: format!("texture extent {width}x{height} outside 1..={max}"),
            });
        }

        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let texture = self.ctx.device().create_texture(&wgpu::TextureDescriptor {
            label: Some(id.as_str()),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: format.to_wgpu(),
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        self.ctx.queue().write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            pixels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(width * format.bytes_per_pixel() as u32),
                rows_per_image: Some(height),
            },
            size,
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        // Queue writes ride along with the next submission.
        let ready_after = self.ctx.timeline().next_serial();

        self.registry.insert(
            id.clone(),
            ResourceKind::Texture,
            expected as u64,
            ready_after,
            GpuHandle::Texture {
                texture,
                view,
                width,
                height,
            },
        )?;
        log::debug!("texture `{id}` {width}x{height} {format:?} uploaded (ready after #{ready_after})");
        Ok(id)
    }

    /// Creates a zero-initialised buffer of `byte_len` bytes. `COPY_DST` is
    /// always added.
    ///
    /// The allocation is rounded up to the copy alignment; writes are still
    /// bounded by `byte_len`.
    pub fn create_buffer(
        &mut self,
        id: impl Into<ResourceId>,
        byte_len: u64,
        usage: wgpu::BufferUsages,
    ) -> Result<ResourceId> {
        let id = id.into();
        self.registry.ensure_vacant(&id)?;

        let buffer = self.allocate_buffer(&id, byte_len, usage)?;
        self.registry
            .insert(id.clone(), ResourceKind::Buffer, byte_len, 0, GpuHandle::Buffer(buffer))?;
        log::debug!("buffer `{id}` created ({byte_len} bytes, {usage:?})");
        Ok(id)
    }

    /// Swaps the buffer behind `id` for a fresh one of `byte_len` bytes.
    ///
    /// Contents are not copied. The old buffer is parked until the GPU is
    /// done with it; the reference count is preserved.
    pub fn replace_buffer(
        &mut self,
        id: &str,
        byte_len: u64,
        usage: wgpu::BufferUsages,
    ) -> Result<()> {
        if self.registry.get(id)?.kind != ResourceKind::Buffer {
            return Err(Error::NotFound(id.to_string()));
        }

        let buffer = self.allocate_buffer(id, byte_len, usage)?;
        let serial = self.ctx.timeline().next_serial();
        self.registry
            .replace(id, GpuHandle::Buffer(buffer), byte_len, serial)?;
        log::debug!("buffer `{id}` replaced ({byte_len} bytes)");
        Ok(())
    }

    /// Enqueues a write of `data` at `offset`.
    ///
    /// The range must lie within the buffer's byte length and `offset` must be
    /// 4-byte aligned. An unaligned length is accepted only for a write that
    /// ends at the buffer's last byte.
    pub fn write_buffer(&self, id: &str, offset: u64, data: &[u8]) -> Result<()> {
        let entry = self.registry.get(id)?;
        let GpuHandle::Buffer(buffer) = &entry.handle else {
            return Err(Error::NotFound(id.to_string()));
        };

        let copy_len = check_write(id, entry.byte_size, offset, data.len() as u64)?;
        if data.is_empty() {
            return Ok(());
        }

        let bytes: Cow<'_, [u8]> = if copy_len == data.len() as u64 {
            Cow::Borrowed(data)
        } else {
            let mut padded = data.to_vec();
            padded.resize(copy_len as usize, 0);
            Cow::Owned(padded)
        };
        self.ctx.queue().write_buffer(buffer, offset, &bytes);
        Ok(())
    }

    pub fn retain(&mut self, id: &str) -> Result<u32> {
        self.registry.retain(id)
    }

    /// Drops one reference and returns the remaining count.
    ///
    /// At zero the id becomes free immediately; the handle is destroyed by a
    /// later [`collect`](Self::collect).
    pub fn dispose(&mut self, id: &str) -> Result<u32> {
        let serial = self.ctx.timeline().next_serial();
        let remaining = self.registry.release(id, serial)?;
        if remaining == 0 {
            log::debug!("`{id}` released (destroy after #{serial})");
        }
        Ok(remaining)
    }

    /// Releases every resource regardless of reference count.
    pub fn dispose_all(&mut self) -> usize {
        let serial = self.ctx.timeline().next_serial();
        let count = self.registry.release_all(serial);
        if count > 0 {
            log::debug!("released {count} resources (destroy after #{serial})");
        }
        count
    }

    /// Destroys parked handles whose submissions have completed.
    pub fn collect(&mut self) -> usize {
        self.registry.collect(self.ctx.timeline().completed())
    }

    pub fn buffer(&self, id: &str) -> Option<&wgpu::Buffer> {
        match &self.registry.get(id).ok()?.handle {
            GpuHandle::Buffer(buffer) => Some(buffer),
            GpuHandle::Texture { .. } => None,
        }
    }

    pub fn texture_view(&self, id: &str) -> Option<&wgpu::TextureView> {
        match &self.registry.get(id).ok()?.handle {
            GpuHandle::Texture { view, .. } => Some(view),
            GpuHandle::Buffer(_) => None,
        }
    }

    /// Texture extent in pixels.
    pub fn texture_size(&self, id: &str) -> Option<(u32, u32)> {
        match &self.registry.get(id).ok()?.handle {
            GpuHandle::Texture { width, height, .. } => Some((*width, *height)),
            GpuHandle::Buffer(_) => None,
        }
    }

    pub fn texture_state(&self, id: &str) -> TextureState {
        match self.registry.get(id) {
            Ok(entry) if entry.kind == ResourceKind::Texture => {
                if self.ctx.timeline().is_retired(entry.ready_after) {
                    TextureState::Ready
                } else {
                    TextureState::Pending
                }
            }
            _ => TextureState::Missing,
        }
    }

    /// Allocation generation of `id`; changes whenever the handle is replaced
    /// or the id is reused.
    pub fn generation(&self, id: &str) -> Option<u64> {
        self.registry.get(id).ok().map(|e| e.generation)
    }

    pub fn info(&self, id: &str) -> Result<ResourceInfo> {
        let e = self.registry.get(id)?;
        Ok(ResourceInfo {
            kind: e.kind,
            byte_size: e.byte_size,
            ref_count: e.ref_count,
        })
    }

    #[inline]
    pub fn contains(&self, id: &str) -> bool {
        self.registry.contains(id)
    }

    #[inline]
    pub fn live_count(&self) -> usize {
        self.registry.len()
    }

    /// Handles released but not yet destroyed.
    #[inline]
    pub fn pending_release_count(&self) -> usize {
        self.registry.pending_len()
    }

    /// Bytes held by live resources.
    pub fn total_bytes(&self) -> u64 {
        self.registry.total_bytes()
    }

    fn allocate_buffer(
        &self,
        id: &str,
        byte_len: u64,
        usage: wgpu::BufferUsages,
    ) -> Result<wgpu::Buffer> {
        let size = byte_len.next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT);
        let max = self.ctx.device().limits().max_buffer_size;
        if size == 0 || size > max {
            return Err(Error::Allocation {
                id: id.to_string(),
                reason: format!("buffer size {byte_len} outside 1..={max}"),
            });
        }

        let buffer = self.ctx.device().create_buffer(&wgpu::BufferDescriptor {
            label: Some(id),
            size,
            usage: usage | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Ok(buffer)
    }
}
