use crate::descriptor::RingRange;
use crate::error::{Result, StreamError};
use crate::sync::SyncPoint;

/// Usage of a device-local buffer created through the factory.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum BufferKind {
    Vertex,
    Index,
}

#[derive(Debug, Clone)]
pub struct BufferDesc<'a> {
    pub label: Option<&'a str>,
    /// Size in bytes, already padded to the copy alignment.
    pub size: u64,
    pub kind: BufferKind,
}

/// Texel formats reachable from raw 8-bit channel data.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum TexelFormat {
    R8,
    Rg8,
    Rgba8,
}

impl TexelFormat {
    /// Picks the upload format for `channels` interleaved 8-bit channels.
    ///
    /// Three-channel data has no native format and is expanded to RGBA8 by
    /// the factory before upload.
    pub fn from_channels(channels: u32) -> Result<Self> {
        match channels {
            1 => Ok(TexelFormat::R8),
            2 => Ok(TexelFormat::Rg8),
            3 | 4 => Ok(TexelFormat::Rgba8),
            other => Err(StreamError::UnsupportedChannelCount(other)),
        }
    }

    #[inline]
    pub fn bytes_per_texel(self) -> u32 {
        match self {
            TexelFormat::R8 => 1,
            TexelFormat::Rg8 => 2,
            TexelFormat::Rgba8 => 4,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TextureDesc<'a> {
    pub label: Option<&'a str>,
    pub width: u32,
    pub height: u32,
    pub format: TexelFormat,
}

/// Placement of tightly re-pitched texel rows inside a staging buffer.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct TextureCopyLayout {
    pub offset: u64,
    pub bytes_per_row: u32,
    pub width: u32,
    pub height: u32,
}

/// A byte range inside a staging buffer.
pub struct StagingRange<'a, S> {
    pub buffer: &'a S,
    pub offset: u64,
    pub size: u64,
}

/// Everything a backend needs to issue one indexed draw.
pub struct DrawCall<'a, B: GpuBackend + ?Sized> {
    /// Committed descriptor range, if any views were bound for this draw.
    pub views: Option<RingRange>,
    pub vertex_buffer: &'a B::Buffer,
    pub index_buffer: &'a B::Buffer,
    pub index_count: u32,
    /// Per-draw constants streamed through the upload stream.
    pub constants: Option<StagingRange<'a, B::StagingBuffer>>,
}

/// The GPU context the streaming core is built on.
///
/// Commands are recorded in call order and only reach the GPU on
/// [`submit_recorded_work`](Self::submit_recorded_work), which also signals the
/// given sync point once the GPU has executed them. The GPU retires
/// submissions in order.
///
/// Errors from submission or waiting mean the device is gone; callers must not
/// retry them.
pub trait GpuBackend {
    /// Host-visible buffer backing an upload page.
    type StagingBuffer;
    /// Device-local buffer.
    type Buffer;
    type Texture;
    /// Shader-visible view of a texture; what the descriptor ring stores.
    type View: Clone + PartialEq;

    fn create_staging_buffer(&mut self, size: u64) -> Result<Self::StagingBuffer>;

    /// Writes through the host mapping of a staging buffer.
    fn write_staging(&mut self, buffer: &Self::StagingBuffer, offset: u64, data: &[u8]);

    fn create_buffer(&mut self, desc: &BufferDesc<'_>) -> Result<Self::Buffer>;

    fn create_texture(&mut self, desc: &TextureDesc<'_>) -> Result<(Self::Texture, Self::View)>;

    fn copy_buffer_region(
        &mut self,
        dst: &Self::Buffer,
        dst_offset: u64,
        src: &Self::StagingBuffer,
        src_offset: u64,
        size: u64,
    );

    fn copy_buffer_to_texture(
        &mut self,
        dst: &Self::Texture,
        src: &Self::StagingBuffer,
        layout: TextureCopyLayout,
    );

    /// Writes one entry of the GPU-visible descriptor ring.
    fn record_view_write(&mut self, ring_index: u32, view: &Self::View);

    /// Prepares the frame's render target (clears it).
    fn begin_frame(&mut self) -> Result<()>;

    fn draw_indexed(&mut self, draw: DrawCall<'_, Self>);

    fn submit_recorded_work(&mut self, signal: SyncPoint) -> Result<()>;

    /// Highest sync point the GPU has signalled. Never blocks.
    fn query_completed_sync_point(&self) -> SyncPoint;

    fn block_until_sync_point(&mut self, sync: SyncPoint) -> Result<()>;
}

/// Writes `view` into a descriptor table, growing it to reach `index`.
pub(crate) fn store_ring_entry<V: Clone>(ring: &mut Vec<Option<V>>, index: u32, view: &V) {
    let index = index as usize;
    if ring.len() <= index {
        log::debug!("descriptor table grown to {} entries", index + 1);
        ring.resize(index + 1, None);
    }
    ring[index] = Some(view.clone());
}
