use std::borrow::Cow;
use std::collections::VecDeque;

use crate::descriptor::DescriptorPool;
use crate::device::{
    BufferDesc, BufferKind, DrawCall, GpuBackend, TexelFormat, TextureCopyLayout, TextureDesc,
};
use crate::error::{Result, StreamError};
use crate::handle::{
    IndexBufferId, IndexBufferKind, TextureId, TextureKind, VertexBufferId, VertexBufferKind,
};
use crate::render::{DrawConstants, Vertex};
use crate::stream::{align_up, UploadStream};
use crate::sync::{SyncPoint, SyncTracker};

use super::{ResourceState, ResourceTable, StreamConfig, StreamStats, UploadMode};

/// Buffer copy offsets and sizes must be multiples of this.
const COPY_ALIGNMENT: u64 = 4;

/// Row pitch of texel data staged in the upload stream.
pub const TEXTURE_ROW_PITCH_ALIGNMENT: u64 = 256;

/// Offset alignment of texel data staged in the upload stream.
pub const TEXTURE_PLACEMENT_ALIGNMENT: u64 = 512;

/// Offset alignment of per-draw constant blocks.
pub const CONSTANTS_ALIGNMENT: u64 = 256;

struct BufferEntry<B: GpuBackend> {
    buffer: B::Buffer,
    elements: u32,
}

struct TextureEntry<B: GpuBackend> {
    // Owns the texture the view points into.
    _texture: B::Texture,
    view: B::View,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Frame {
    Idle,
    Recording,
    /// Submitted by `end_frame`, waiting for `present`.
    Ended,
}

/// Explicit streaming context: the resource factory and frame API.
///
/// Owns the backend, the sync tracker, the upload stream, the descriptor pool
/// and one resource table per handle kind. Everything happens on the thread
/// that owns the context.
///
/// Frame flow: [`begin_frame`](Self::begin_frame), any number of
/// [`bind_view_for_draw`](Self::bind_view_for_draw) /
/// [`set_draw_constants`](Self::set_draw_constants) /
/// [`draw`](Self::draw), then [`end_frame`](Self::end_frame) to submit and
/// [`present`](Self::present) to pace and reclaim.
pub struct StreamContext<B: GpuBackend> {
    config: StreamConfig,
    sync: SyncTracker,
    uploads: UploadStream<B>,
    descriptors: DescriptorPool<B>,

    vertex_buffers: ResourceTable<VertexBufferKind, BufferEntry<B>>,
    index_buffers: ResourceTable<IndexBufferKind, BufferEntry<B>>,
    textures: ResourceTable<TextureKind, TextureEntry<B>>,

    frame: Frame,
    draw_constants: Option<DrawConstants>,
    in_flight: VecDeque<SyncPoint>,
    frames_presented: u64,

    // Last so every GPU object above is dropped before the device.
    backend: B,
}

impl<B: GpuBackend> StreamContext<B> {
    pub fn new(backend: B, config: StreamConfig) -> Result<Self> {
        config.validate()?;
        log::info!(
            "stream context: {}B pages, {}-slot ring, {} staging slots, {} frame(s) in flight, {:?} uploads",
            config.page_size,
            config.ring_capacity,
            config.staging_slots,
            config.frames_in_flight,
            config.upload_mode
        );

        Ok(Self {
            sync: SyncTracker::new(),
            uploads: UploadStream::new(config.page_size).with_ceiling(config.max_stream_bytes),
            descriptors: DescriptorPool::new(config.ring_capacity, config.staging_slots),
            vertex_buffers: ResourceTable::new(),
            index_buffers: ResourceTable::new(),
            textures: ResourceTable::new(),
            frame: Frame::Idle,
            draw_constants: None,
            in_flight: VecDeque::new(),
            frames_presented: 0,
            config,
            backend,
        })
    }

    #[inline]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Direct backend access. Commands recorded through it are submitted with
    /// the next frame.
    #[inline]
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    #[inline]
    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    #[inline]
    pub fn sync_tracker(&self) -> &SyncTracker {
        &self.sync
    }

    #[inline]
    pub fn in_frame(&self) -> bool {
        self.frame == Frame::Recording
    }

    // ── resource factory ───────────────────────────────────────────────────

    pub fn vertex_buffer_create(&mut self, vertices: &[Vertex]) -> Result<VertexBufferId> {
        let id = self.vertex_buffers.reserve()?;
        let bytes: &[u8] = bytemuck::cast_slice(vertices);
        match self.upload_buffer(BufferKind::Vertex, "nabu vertex buffer", bytes) {
            Ok((buffer, sync)) => {
                let entry = BufferEntry { buffer, elements: vertices.len() as u32 };
                self.vertex_buffers.begin_upload(id, entry, sync)?;
            }
            Err(err) => {
                self.vertex_buffers.abandon(id);
                return Err(err);
            }
        }
        self.finish_upload()?;
        log::debug!("created {id:?} ({} vertices)", vertices.len());
        Ok(id)
    }

    pub fn index_buffer_create(&mut self, indices: &[u32]) -> Result<IndexBufferId> {
        let id = self.index_buffers.reserve()?;
        let bytes: &[u8] = bytemuck::cast_slice(indices);
        match self.upload_buffer(BufferKind::Index, "nabu index buffer", bytes) {
            Ok((buffer, sync)) => {
                let entry = BufferEntry { buffer, elements: indices.len() as u32 };
                self.index_buffers.begin_upload(id, entry, sync)?;
            }
            Err(err) => {
                self.index_buffers.abandon(id);
                return Err(err);
            }
        }
        self.finish_upload()?;
        log::debug!("created {id:?} ({} indices)", indices.len());
        Ok(id)
    }

    /// Creates a texture from tightly packed 8-bit rows of `channels`
    /// interleaved channels.
    ///
    /// 1, 2 and 4 channels upload as R8, RG8 and RGBA8. Three-channel data is
    /// expanded to RGBA8 with opaque alpha.
    pub fn texture_create(
        &mut self,
        width: u32,
        height: u32,
        channels: u32,
        pixels: &[u8],
    ) -> Result<TextureId> {
        let format = TexelFormat::from_channels(channels)?;
        let expected = width as u64 * height as u64 * channels as u64;
        if expected == 0 {
            return Err(StreamError::ZeroSizedAllocation);
        }
        if pixels.len() as u64 != expected {
            return Err(StreamError::InvalidTextureData {
                expected,
                actual: pixels.len() as u64,
            });
        }

        let id = self.textures.reserve()?;
        match self.upload_texture(width, height, channels, format, pixels) {
            Ok((entry, sync)) => self.textures.begin_upload(id, entry, sync)?,
            Err(err) => {
                self.textures.abandon(id);
                return Err(err);
            }
        }
        self.finish_upload()?;
        log::debug!("created {id:?} ({width}x{height} {format:?})");
        Ok(id)
    }

    pub fn vertex_buffer_destroy(&mut self, id: VertexBufferId) -> Result<()> {
        let sync = self.sync.pending();
        self.vertex_buffers.retire(id, sync)?;
        self.finish_destroy()
    }

    pub fn index_buffer_destroy(&mut self, id: IndexBufferId) -> Result<()> {
        let sync = self.sync.pending();
        self.index_buffers.retire(id, sync)?;
        self.finish_destroy()
    }

    pub fn texture_destroy(&mut self, id: TextureId) -> Result<()> {
        let sync = self.sync.pending();
        let entry = self.textures.retire(id, sync)?;
        // A later commit must not re-stage a view of a dead texture.
        self.descriptors.forget_slots(|view| *view == entry.view);
        self.finish_destroy()
    }

    pub fn vertex_buffer_state(&self, id: VertexBufferId) -> Option<ResourceState> {
        self.vertex_buffers.state(id)
    }

    pub fn index_buffer_state(&self, id: IndexBufferId) -> Option<ResourceState> {
        self.index_buffers.state(id)
    }

    pub fn texture_state(&self, id: TextureId) -> Option<ResourceState> {
        self.textures.state(id)
    }

    pub fn vertex_count(&self, id: VertexBufferId) -> Result<u32> {
        self.vertex_buffers.get(id).map(|entry| entry.elements)
    }

    pub fn index_count(&self, id: IndexBufferId) -> Result<u32> {
        self.index_buffers.get(id).map(|entry| entry.elements)
    }

    // ── frame API ──────────────────────────────────────────────────────────

    pub fn begin_frame(&mut self) -> Result<()> {
        match self.frame {
            Frame::Idle => {}
            Frame::Recording => return Err(StreamError::FrameState("frame already begun")),
            Frame::Ended => return Err(StreamError::FrameState("previous frame not presented")),
        }
        self.backend.begin_frame()?;
        self.frame = Frame::Recording;
        Ok(())
    }

    /// Stages `texture` at binding `slot` for the next draw.
    pub fn bind_view_for_draw(&mut self, slot: u32, texture: TextureId) -> Result<()> {
        self.expect_recording("bind_view_for_draw outside a frame")?;
        let entry = self.textures.get(texture)?;
        self.descriptors.stage_view(slot, &entry.view)
    }

    /// Sets the constants for the next draw.
    ///
    /// They are streamed when the draw is recorded, so the upload is tagged
    /// with the submission that actually carries the draw.
    pub fn set_draw_constants(&mut self, constants: &DrawConstants) -> Result<()> {
        self.expect_recording("set_draw_constants outside a frame")?;
        self.draw_constants = Some(*constants);
        Ok(())
    }

    /// Records an indexed draw of `vertex_buffer` with `index_buffer`.
    ///
    /// Views staged since the previous draw are committed to the descriptor
    /// ring and bound; pending draw constants are streamed and consumed.
    pub fn draw(&mut self, vertex_buffer: VertexBufferId, index_buffer: IndexBufferId) -> Result<()> {
        self.expect_recording("draw outside a frame")?;
        let vertex = self.vertex_buffers.get(vertex_buffer)?;
        let index = self.index_buffers.get(index_buffer)?;

        let constants = match &self.draw_constants {
            Some(constants) => {
                let bytes = bytemuck::bytes_of(constants);
                let size = padded(bytes.len() as u64, CONSTANTS_ALIGNMENT)?;
                let sync = self.sync.pending();
                let alloc = self
                    .uploads
                    .allocate(&mut self.backend, size, CONSTANTS_ALIGNMENT, sync)?;
                self.uploads.write(&mut self.backend, &alloc, bytes)?;
                Some(alloc)
            }
            None => None,
        };
        let views = if self.descriptors.has_staged() {
            Some(self.descriptors.commit_staged(&mut self.backend)?)
        } else {
            None
        };
        self.draw_constants = None;
        let constants = constants
            .as_ref()
            .map(|alloc| self.uploads.staging_range(alloc))
            .transpose()?;

        self.backend.draw_indexed(DrawCall {
            views,
            vertex_buffer: &vertex.buffer,
            index_buffer: &index.buffer,
            index_count: index.elements,
            constants,
        });
        Ok(())
    }

    /// Submits the frame and tags its descriptor commits with the new sync
    /// point.
    pub fn end_frame(&mut self) -> Result<SyncPoint> {
        self.expect_recording("end_frame without begin_frame")?;
        if self.draw_constants.take().is_some() {
            log::warn!("draw constants set after the last draw were dropped");
        }

        let sync = self.sync.submit(&mut self.backend)?;
        self.descriptors.end_frame(sync);
        self.promote(sync);
        self.in_flight.push_back(sync);
        self.frame = Frame::Ended;
        Ok(sync)
    }

    /// Finishes the frame: blocks if the CPU is more than `frames_in_flight`
    /// frames ahead, then reclaims everything the GPU has completed.
    pub fn present(&mut self) -> Result<()> {
        if self.frame != Frame::Ended {
            return Err(StreamError::FrameState("present without end_frame"));
        }

        let completed = self.sync.completed_up_to(&self.backend);
        while self.in_flight.front().is_some_and(|sync| *sync <= completed) {
            self.in_flight.pop_front();
        }
        let limit = self.config.frames_in_flight as usize;
        while self.in_flight.len() > limit {
            let Some(oldest) = self.in_flight.pop_front() else { break };
            log::debug!("frame pacing: waiting for {oldest}");
            self.sync.wait_until(&mut self.backend, oldest)?;
        }

        self.frame = Frame::Idle;
        self.frames_presented += 1;
        self.reclaim()
    }

    /// Submits any recorded work, waits for the GPU to go idle and reclaims
    /// everything. Not allowed inside a frame.
    pub fn flush(&mut self) -> Result<SyncPoint> {
        if self.frame == Frame::Recording {
            return Err(StreamError::FrameState("flush inside a frame"));
        }
        let sync = self.sync.flush(&mut self.backend)?;
        self.promote(sync);
        self.in_flight.clear();
        self.reclaim()?;
        Ok(sync)
    }

    /// Drains the GPU and hands the backend back. Every resource is released.
    pub fn shutdown(mut self) -> Result<B> {
        if self.frame == Frame::Recording {
            log::warn!("shutdown inside a frame; submitting what was recorded");
            self.end_frame()?;
        }
        self.flush()?;
        log::info!("stream context shut down: {}", self.stats());
        let Self { backend, .. } = self;
        Ok(backend)
    }

    pub fn stats(&self) -> StreamStats {
        let ring = self.descriptors.ring();
        StreamStats {
            upload: self.uploads.stats(),
            ring_occupied: ring.occupied(),
            ring_capacity: ring.capacity(),
            ring_pending_frames: ring.pending_frames(),
            vertex_buffers: self.vertex_buffers.usable(),
            index_buffers: self.index_buffers.usable(),
            textures: self.textures.usable(),
            pending_destroys: self.vertex_buffers.pending_destroys()
                + self.index_buffers.pending_destroys()
                + self.textures.pending_destroys(),
            last_submitted: self.sync.last_submitted(),
            last_completed: self.sync.last_completed(),
            blocking_waits: self.sync.blocking_waits(),
            frames_presented: self.frames_presented,
        }
    }

    // ── internals ──────────────────────────────────────────────────────────

    fn expect_recording(&self, what: &'static str) -> Result<()> {
        if self.frame == Frame::Recording {
            Ok(())
        } else {
            Err(StreamError::FrameState(what))
        }
    }

    /// Stages `bytes` and records a copy into a new device-local buffer.
    fn upload_buffer(
        &mut self,
        kind: BufferKind,
        label: &str,
        bytes: &[u8],
    ) -> Result<(B::Buffer, SyncPoint)> {
        if bytes.is_empty() {
            return Err(StreamError::ZeroSizedAllocation);
        }
        let size = padded(bytes.len() as u64, COPY_ALIGNMENT)?;
        let sync = self.sync.pending();

        let alloc = self
            .uploads
            .allocate(&mut self.backend, size, COPY_ALIGNMENT, sync)?;
        self.uploads
            .write(&mut self.backend, &alloc, &zero_extend(bytes, size))?;

        let buffer = self.backend.create_buffer(&BufferDesc {
            label: Some(label),
            size,
            kind,
        })?;
        let src = self.uploads.staging_range(&alloc)?;
        self.backend
            .copy_buffer_region(&buffer, 0, src.buffer, src.offset, size);
        Ok((buffer, sync))
    }

    /// Re-pitches texel rows into the upload stream and records the copy.
    fn upload_texture(
        &mut self,
        width: u32,
        height: u32,
        channels: u32,
        format: TexelFormat,
        pixels: &[u8],
    ) -> Result<(TextureEntry<B>, SyncPoint)> {
        let src_row = width as usize * channels as usize;
        let dst_row = width as u64 * format.bytes_per_texel() as u64;
        let pitch = padded(dst_row, TEXTURE_ROW_PITCH_ALIGNMENT)?;
        let bytes_per_row = u32::try_from(pitch).map_err(|_| StreamError::InvalidTextureData {
            expected: u32::MAX as u64,
            actual: pitch,
        })?;
        let total = pitch * height as u64;

        let mut staged = vec![0u8; total as usize];
        for (src, dst) in pixels
            .chunks_exact(src_row)
            .zip(staged.chunks_exact_mut(pitch as usize))
        {
            if channels == 3 {
                for (rgb, rgba) in src.chunks_exact(3).zip(dst.chunks_exact_mut(4)) {
                    rgba[..3].copy_from_slice(rgb);
                    rgba[3] = u8::MAX;
                }
            } else {
                dst[..src.len()].copy_from_slice(src);
            }
        }

        let sync = self.sync.pending();
        let alloc = self
            .uploads
            .allocate(&mut self.backend, total, TEXTURE_PLACEMENT_ALIGNMENT, sync)?;
        self.uploads.write(&mut self.backend, &alloc, &staged)?;

        let (texture, view) = self.backend.create_texture(&TextureDesc {
            label: Some("nabu texture"),
            width,
            height,
            format,
        })?;
        let src = self.uploads.staging_range(&alloc)?;
        self.backend.copy_buffer_to_texture(
            &texture,
            src.buffer,
            TextureCopyLayout {
                offset: src.offset,
                bytes_per_row,
                width,
                height,
            },
        );
        Ok((TextureEntry { _texture: texture, view }, sync))
    }

    fn finish_upload(&mut self) -> Result<()> {
        if self.config.upload_mode == UploadMode::Blocking {
            let sync = self.sync.flush(&mut self.backend)?;
            self.promote(sync);
        }
        Ok(())
    }

    fn finish_destroy(&mut self) -> Result<()> {
        if self.config.upload_mode == UploadMode::Blocking {
            let sync = self.sync.flush(&mut self.backend)?;
            self.promote(sync);
            self.reclaim_destroyed(sync);
        }
        Ok(())
    }

    fn promote(&mut self, submitted: SyncPoint) {
        self.vertex_buffers.promote(submitted);
        self.index_buffers.promote(submitted);
        self.textures.promote(submitted);
    }

    fn reclaim_destroyed(&mut self, completed: SyncPoint) {
        let reclaimed = self.vertex_buffers.reclaim(completed)
            + self.index_buffers.reclaim(completed)
            + self.textures.reclaim(completed);
        if reclaimed > 0 {
            log::debug!("reclaimed {reclaimed} destroyed resource(s) through {completed}");
        }
    }

    /// Recycles pages, ring space and destroyed resources. Only valid
    /// outside a frame: in-frame ring commits have no sync point yet.
    fn reclaim(&mut self) -> Result<()> {
        debug_assert_ne!(self.frame, Frame::Recording);
        let completed = self.sync.completed_up_to(&self.backend);
        self.uploads.reclaim(completed);
        self.descriptors.reclaim(completed)?;
        self.reclaim_destroyed(completed);
        Ok(())
    }
}

fn padded(len: u64, align: u64) -> Result<u64> {
    align_up(len, align).ok_or(StreamError::AllocationOverflow { len, size: u64::MAX })
}

fn zero_extend(bytes: &[u8], size: u64) -> Cow<'_, [u8]> {
    if bytes.len() as u64 == size {
        Cow::Borrowed(bytes)
    } else {
        let mut owned = bytes.to_vec();
        owned.resize(size as usize, 0);
        Cow::Owned(owned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{Hazard, NullBackend};

    fn ctx(mode: UploadMode) -> StreamContext<NullBackend> {
        let config = StreamConfig {
            page_size: 4096,
            ring_capacity: 64,
            staging_slots: 4,
            upload_mode: mode,
            ..Default::default()
        };
        StreamContext::new(NullBackend::new(), config).unwrap()
    }

    fn tri() -> [Vertex; 3] {
        let v = |x: f32, y: f32| Vertex {
            position: [x, y, 0.0],
            normal: [0.0, 0.0, 1.0],
            color: [1.0; 4],
            uv: [x, y],
        };
        [v(0.0, 0.0), v(1.0, 0.0), v(0.0, 1.0)]
    }

    #[test]
    fn deferred_upload_goes_live_on_submit() {
        let mut ctx = ctx(UploadMode::Deferred);
        let vb = ctx.vertex_buffer_create(&tri()).unwrap();
        assert_eq!(ctx.vertex_buffer_state(vb), Some(ResourceState::Uploading));
        assert_eq!(ctx.backend().in_flight(), 0);

        ctx.begin_frame().unwrap();
        ctx.end_frame().unwrap();
        assert_eq!(ctx.vertex_buffer_state(vb), Some(ResourceState::Live));
        assert_eq!(ctx.stats().blocking_waits, 0);
    }

    #[test]
    fn blocking_upload_waits_immediately() {
        let mut ctx = ctx(UploadMode::Blocking);
        let ib = ctx.index_buffer_create(&[0, 1, 2]).unwrap();
        assert_eq!(ctx.index_buffer_state(ib), Some(ResourceState::Live));
        assert_eq!(ctx.stats().blocking_waits, 1);
        assert_eq!(ctx.index_count(ib).unwrap(), 3);
    }

    #[test]
    fn rgb_texture_is_expanded_and_repitched() {
        let mut ctx = ctx(UploadMode::Deferred);
        let vb = ctx.vertex_buffer_create(&tri()).unwrap();
        let ib = ctx.index_buffer_create(&[0, 1, 2]).unwrap();
        let pixels: Vec<u8> = (1..=12).collect();
        let tex = ctx.texture_create(2, 2, 3, &pixels).unwrap();

        ctx.begin_frame().unwrap();
        ctx.bind_view_for_draw(0, tex).unwrap();
        ctx.draw(vb, ib).unwrap();
        ctx.end_frame().unwrap();
        ctx.backend_mut().retire_all();
        ctx.present().unwrap();

        let gpu = ctx.backend();
        let view = gpu.executed_draws()[0].views[0].unwrap();
        assert_eq!(
            gpu.view_contents(view),
            &[1, 2, 3, 255, 4, 5, 6, 255, 7, 8, 9, 255, 10, 11, 12, 255]
        );
    }

    #[test]
    fn bad_texture_input_is_rejected() {
        let mut ctx = ctx(UploadMode::Deferred);
        assert_eq!(
            ctx.texture_create(2, 2, 4, &[0; 15]),
            Err(StreamError::InvalidTextureData { expected: 16, actual: 15 })
        );
        assert_eq!(
            ctx.texture_create(1, 1, 5, &[0; 5]),
            Err(StreamError::UnsupportedChannelCount(5))
        );
        assert_eq!(ctx.texture_create(0, 4, 4, &[]), Err(StreamError::ZeroSizedAllocation));
    }

    #[test]
    fn frame_api_enforces_ordering() {
        let mut ctx = ctx(UploadMode::Deferred);
        assert!(matches!(ctx.present(), Err(StreamError::FrameState(_))));
        assert!(matches!(ctx.end_frame(), Err(StreamError::FrameState(_))));

        ctx.begin_frame().unwrap();
        assert!(matches!(ctx.begin_frame(), Err(StreamError::FrameState(_))));
        assert!(matches!(ctx.flush(), Err(StreamError::FrameState(_))));
        ctx.end_frame().unwrap();
        assert!(matches!(ctx.begin_frame(), Err(StreamError::FrameState(_))));
        ctx.present().unwrap();
        ctx.begin_frame().unwrap();
    }

    #[test]
    fn draw_binds_committed_views_and_constants() {
        let mut ctx = ctx(UploadMode::Deferred);
        let vb = ctx.vertex_buffer_create(&tri()).unwrap();
        let ib = ctx.index_buffer_create(&[0, 1, 2]).unwrap();
        let tex = ctx.texture_create(1, 1, 4, &[255, 0, 0, 255]).unwrap();

        ctx.begin_frame().unwrap();
        ctx.bind_view_for_draw(0, tex).unwrap();
        let constants = DrawConstants { tint: [0.5; 4], ..Default::default() };
        ctx.set_draw_constants(&constants).unwrap();
        ctx.draw(vb, ib).unwrap();
        ctx.draw(vb, ib).unwrap();
        ctx.end_frame().unwrap();
        ctx.backend_mut().retire_all();
        ctx.present().unwrap();

        let draws = ctx.backend().executed_draws();
        assert_eq!(draws.len(), 2);
        assert_eq!(draws[0].views.len(), 1);
        assert!(draws[0].views[0].is_some());
        assert_eq!(draws[0].index_count, 3);
        assert_eq!(&draws[0].constants[..80], bytemuck::bytes_of(&constants));
        assert!(draws[1].views.is_empty());
        assert!(draws[1].constants.is_empty());
        assert!(ctx.backend().hazards().is_empty());
    }

    #[test]
    fn deferred_destroy_waits_for_gpu() {
        let mut ctx = ctx(UploadMode::Deferred);
        let vb = ctx.vertex_buffer_create(&tri()).unwrap();
        let ib = ctx.index_buffer_create(&[0, 1, 2]).unwrap();

        ctx.begin_frame().unwrap();
        ctx.draw(vb, ib).unwrap();
        ctx.vertex_buffer_destroy(vb).unwrap();
        assert_eq!(ctx.vertex_buffer_state(vb), Some(ResourceState::PendingDestroy));
        assert!(ctx.draw(vb, ib).is_err());
        ctx.end_frame().unwrap();
        ctx.present().unwrap();
        assert_eq!(ctx.vertex_buffer_state(vb), Some(ResourceState::PendingDestroy));

        ctx.backend_mut().retire_all();
        ctx.begin_frame().unwrap();
        ctx.end_frame().unwrap();
        ctx.present().unwrap();
        assert_eq!(ctx.vertex_buffer_state(vb), Some(ResourceState::Reclaimed));
        assert!(ctx.backend().hazards().is_empty());
    }

    #[test]
    fn blocking_destroy_reclaims_at_once() {
        let mut ctx = ctx(UploadMode::Blocking);
        let tex = ctx.texture_create(1, 1, 1, &[7]).unwrap();
        ctx.texture_destroy(tex).unwrap();
        assert_eq!(ctx.texture_state(tex), Some(ResourceState::Reclaimed));
        assert_eq!(ctx.stats().pending_destroys, 0);
    }

    #[test]
    fn destroyed_texture_is_unbound() {
        let mut ctx = ctx(UploadMode::Deferred);
        let vb = ctx.vertex_buffer_create(&tri()).unwrap();
        let ib = ctx.index_buffer_create(&[0, 1, 2]).unwrap();
        let a = ctx.texture_create(1, 1, 4, &[0; 4]).unwrap();
        let b = ctx.texture_create(1, 1, 4, &[0; 4]).unwrap();

        ctx.begin_frame().unwrap();
        ctx.bind_view_for_draw(0, a).unwrap();
        ctx.bind_view_for_draw(1, b).unwrap();
        ctx.draw(vb, ib).unwrap();
        ctx.texture_destroy(a).unwrap();
        ctx.bind_view_for_draw(1, b).unwrap();
        assert_eq!(ctx.draw(vb, ib), Err(StreamError::UnboundSlot(0)));
    }

    #[test]
    fn pacing_blocks_only_past_the_limit() {
        let mut ctx = ctx(UploadMode::Deferred);
        for _ in 0..2 {
            ctx.begin_frame().unwrap();
            ctx.end_frame().unwrap();
            ctx.present().unwrap();
        }
        assert_eq!(ctx.stats().blocking_waits, 0);

        ctx.begin_frame().unwrap();
        ctx.end_frame().unwrap();
        ctx.present().unwrap();
        assert_eq!(ctx.stats().blocking_waits, 1);
        assert_eq!(ctx.stats().last_completed, SyncPoint::new(1));
    }

    #[test]
    fn shutdown_drains_everything() {
        let mut ctx = ctx(UploadMode::Deferred);
        let vb = ctx.vertex_buffer_create(&tri()).unwrap();
        ctx.begin_frame().unwrap();
        ctx.vertex_buffer_destroy(vb).unwrap();
        let gpu = ctx.shutdown().unwrap();
        assert_eq!(gpu.in_flight(), 0);
        assert!(gpu.hazards().iter().all(|h| !matches!(h, Hazard::UseAfterDestroy { .. })));
    }
}
