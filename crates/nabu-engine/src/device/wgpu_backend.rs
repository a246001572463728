use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use wgpu::util::DeviceExt;

use crate::error::{Result, StreamError};
use crate::render::{DrawConstants, MeshPipeline, RenderTarget};
use crate::sync::SyncPoint;

use super::backend::{
    store_ring_entry, BufferDesc, BufferKind, DrawCall, GpuBackend, TexelFormat,
    TextureCopyLayout, TextureDesc,
};
use super::Gpu;

/// [`GpuBackend`] over a wgpu device and queue.
///
/// wgpu has neither persistently mapped memory nor descriptor heaps, so:
/// - staging pages are `COPY_SRC | COPY_DST | UNIFORM` buffers written with
///   `Queue::write_buffer`, which lands before the next submission's commands
/// - the descriptor ring is a table of texture views; each draw builds its
///   bind group from the first view of its committed range
///
/// Completion is observed through `Queue::on_submitted_work_done` callbacks
/// that publish the signalled sync point.
pub struct WgpuBackend {
    gpu: Gpu,
    pipeline: MeshPipeline,
    target: RenderTarget,
    encoder: Option<wgpu::CommandEncoder>,

    ring: Vec<Option<wgpu::TextureView>>,
    fallback_view: wgpu::TextureView,
    default_constants: wgpu::Buffer,
    clear_color: wgpu::Color,

    completed: Arc<AtomicU64>,
    lost: Arc<OnceLock<String>>,
}

impl WgpuBackend {
    /// `ring_capacity` presizes the descriptor table; writes past it grow it.
    pub fn new(gpu: Gpu, ring_capacity: u32) -> Self {
        let device = gpu.device();
        let pipeline = MeshPipeline::new(device, gpu.target_format());
        let target = RenderTarget::new(device, gpu.target_size(), gpu.target_format());

        let lost = Arc::new(OnceLock::new());
        {
            let lost = Arc::clone(&lost);
            device.set_device_lost_callback(move |reason, message| {
                log::error!("wgpu device lost ({reason:?}): {message}");
                let _ = lost.set(format!("{reason:?}: {message}"));
            });
        }

        let fallback_view = white_texture(device, gpu.queue());
        let default_constants = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("nabu default draw constants"),
            contents: bytemuck::bytes_of(&DrawConstants::IDENTITY),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        Self {
            gpu,
            pipeline,
            target,
            encoder: None,
            ring: vec![None; ring_capacity as usize],
            fallback_view,
            default_constants,
            clear_color: wgpu::Color::BLACK,
            completed: Arc::new(AtomicU64::new(0)),
            lost,
        }
    }

    pub fn gpu(&self) -> &Gpu {
        &self.gpu
    }

    pub fn target(&self) -> &RenderTarget {
        &self.target
    }

    pub fn set_clear_color(&mut self, color: wgpu::Color) {
        self.clear_color = color;
    }

    fn check_alive(&self) -> Result<()> {
        match self.lost.get() {
            Some(reason) => Err(StreamError::DeviceLost(reason.clone())),
            None => Ok(()),
        }
    }

    fn encoder(&mut self) -> &mut wgpu::CommandEncoder {
        let device = self.gpu.device();
        self.encoder.get_or_insert_with(|| frame_encoder(device))
    }
}

fn frame_encoder(device: &wgpu::Device) -> wgpu::CommandEncoder {
    device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("nabu frame encoder"),
    })
}

fn white_texture(device: &wgpu::Device, queue: &wgpu::Queue) -> wgpu::TextureView {
    let size = wgpu::Extent3d { width: 1, height: 1, depth_or_array_layers: 1 };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("nabu fallback texture"),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8UnormSrgb,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        &[255; 4],
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(4),
            rows_per_image: Some(1),
        },
        size,
    );
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}

fn texture_format(format: TexelFormat) -> wgpu::TextureFormat {
    match format {
        TexelFormat::R8 => wgpu::TextureFormat::R8Unorm,
        TexelFormat::Rg8 => wgpu::TextureFormat::Rg8Unorm,
        TexelFormat::Rgba8 => wgpu::TextureFormat::Rgba8UnormSrgb,
    }
}

impl GpuBackend for WgpuBackend {
    type StagingBuffer = wgpu::Buffer;
    type Buffer = wgpu::Buffer;
    type Texture = wgpu::Texture;
    type View = wgpu::TextureView;

    fn create_staging_buffer(&mut self, size: u64) -> Result<wgpu::Buffer> {
        self.check_alive()?;
        Ok(self.gpu.device().create_buffer(&wgpu::BufferDescriptor {
            label: Some("nabu upload page"),
            size,
            usage: wgpu::BufferUsages::COPY_SRC
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::UNIFORM,
            mapped_at_creation: false,
        }))
    }

    fn write_staging(&mut self, buffer: &wgpu::Buffer, offset: u64, data: &[u8]) {
        debug_assert!(offset % wgpu::COPY_BUFFER_ALIGNMENT == 0);
        debug_assert!(data.len() as u64 % wgpu::COPY_BUFFER_ALIGNMENT == 0);
        self.gpu.queue().write_buffer(buffer, offset, data);
    }

    fn create_buffer(&mut self, desc: &BufferDesc<'_>) -> Result<wgpu::Buffer> {
        self.check_alive()?;
        let usage = match desc.kind {
            BufferKind::Vertex => wgpu::BufferUsages::VERTEX,
            BufferKind::Index => wgpu::BufferUsages::INDEX,
        };
        Ok(self.gpu.device().create_buffer(&wgpu::BufferDescriptor {
            label: desc.label,
            size: desc.size,
            usage: usage | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        }))
    }

    fn create_texture(
        &mut self,
        desc: &TextureDesc<'_>,
    ) -> Result<(wgpu::Texture, wgpu::TextureView)> {
        self.check_alive()?;
        let texture = self.gpu.device().create_texture(&wgpu::TextureDescriptor {
            label: desc.label,
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: texture_format(desc.format),
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Ok((texture, view))
    }

    fn copy_buffer_region(
        &mut self,
        dst: &wgpu::Buffer,
        dst_offset: u64,
        src: &wgpu::Buffer,
        src_offset: u64,
        size: u64,
    ) {
        self.encoder()
            .copy_buffer_to_buffer(src, src_offset, dst, dst_offset, size);
    }

    fn copy_buffer_to_texture(
        &mut self,
        dst: &wgpu::Texture,
        src: &wgpu::Buffer,
        layout: TextureCopyLayout,
    ) {
        self.encoder().copy_buffer_to_texture(
            wgpu::TexelCopyBufferInfo {
                buffer: src,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: layout.offset,
                    bytes_per_row: Some(layout.bytes_per_row),
                    rows_per_image: Some(layout.height),
                },
            },
            wgpu::TexelCopyTextureInfo {
                texture: dst,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::Extent3d {
                width: layout.width,
                height: layout.height,
                depth_or_array_layers: 1,
            },
        );
    }

    fn record_view_write(&mut self, ring_index: u32, view: &wgpu::TextureView) {
        store_ring_entry(&mut self.ring, ring_index, view);
    }

    fn begin_frame(&mut self) -> Result<()> {
        self.check_alive()?;
        let clear = self.clear_color;
        let device = self.gpu.device();
        let encoder = self.encoder.get_or_insert_with(|| frame_encoder(device));

        let _clear_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("nabu clear pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: self.target.view(),
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(clear),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });
        Ok(())
    }

    fn draw_indexed(&mut self, draw: DrawCall<'_, Self>) {
        let device = self.gpu.device();

        let texture = draw
            .views
            .and_then(|range| self.ring.get(range.base as usize))
            .and_then(Option::as_ref)
            .unwrap_or(&self.fallback_view);
        let constants = match &draw.constants {
            Some(range) => wgpu::BufferBinding {
                buffer: range.buffer,
                offset: range.offset,
                size: NonZeroU64::new(range.size),
            },
            None => self.default_constants.as_entire_buffer_binding(),
        };
        let bind_group = self.pipeline.bind_group(device, texture, constants);

        let encoder = self.encoder.get_or_insert_with(|| frame_encoder(device));
        let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("nabu mesh pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: self.target.view(),
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });

        rpass.set_pipeline(self.pipeline.pipeline());
        rpass.set_bind_group(0, &bind_group, &[]);
        rpass.set_vertex_buffer(0, draw.vertex_buffer.slice(..));
        rpass.set_index_buffer(draw.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        rpass.draw_indexed(0..draw.index_count, 0, 0..1);
    }

    fn submit_recorded_work(&mut self, signal: SyncPoint) -> Result<()> {
        self.check_alive()?;
        let encoder = match self.encoder.take() {
            Some(encoder) => encoder,
            None => frame_encoder(self.gpu.device()),
        };
        let commands = encoder.finish();

        let queue = self.gpu.queue();
        queue.submit(std::iter::once(commands));
        let completed = Arc::clone(&self.completed);
        queue.on_submitted_work_done(move || {
            completed.fetch_max(signal.get(), Ordering::Release);
        });
        Ok(())
    }

    fn query_completed_sync_point(&self) -> SyncPoint {
        // Callbacks only fire while the device is polled.
        if let Err(err) = self.gpu.device().poll(wgpu::PollType::Poll) {
            log::warn!("device poll failed: {err}");
        }
        SyncPoint::new(self.completed.load(Ordering::Acquire))
    }

    fn block_until_sync_point(&mut self, sync: SyncPoint) -> Result<()> {
        self.check_alive()?;
        if self.completed.load(Ordering::Acquire) >= sync.get() {
            return Ok(());
        }
        self.gpu
            .device()
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|err| StreamError::DeviceLost(err.to_string()))?;
        self.check_alive()?;

        if self.completed.load(Ordering::Acquire) < sync.get() {
            return Err(StreamError::Invariant("waited on a sync point that was never submitted"));
        }
        Ok(())
    }
}
