//! Headless streaming demo.
//!
//! Renders spinning cubes offscreen for a fixed number of frames while
//! replacing their texture every few frames, so the upload stream, the
//! descriptor ring and deferred destruction all see steady traffic.
//!
//! Environment:
//! - `NABU_FRAMES`: frames to render (default 300)
//! - `NABU_PAGE_SIZE`: upload page size in bytes
//! - `NABU_UPLOAD_MODE`: `blocking` or `deferred`
//! - `RUST_LOG`: log filter

mod scene;

use anyhow::{Context, Result, anyhow};
use nabu_engine::device::{Gpu, GpuInit, WgpuBackend};
use nabu_engine::logging::{LoggingConfig, init_logging};
use nabu_engine::{StreamConfig, StreamContext, UploadMode};

const CUBES: u32 = 3;
const TEXTURE_SWAP_INTERVAL: u32 = 8;

fn main() -> Result<()> {
    init_logging(LoggingConfig::default());

    let frames = env_parse("NABU_FRAMES")?.unwrap_or(300u32);
    let config = stream_config()?;

    let gpu = Gpu::new_blocking(GpuInit::default()).context("failed to initialize GPU")?;

    let mut backend = WgpuBackend::new(gpu, config.ring_capacity);
    backend.set_clear_color(wgpu::Color { r: 0.05, g: 0.06, b: 0.08, a: 1.0 });
    let mut ctx = StreamContext::new(backend, config).context("invalid stream configuration")?;

    let (vertices, indices) = scene::cube();
    let vb = ctx.vertex_buffer_create(&vertices)?;
    let ib = ctx.index_buffer_create(&indices)?;
    let mut texture = ctx.texture_create(64, 64, 4, &scene::checker(64, 8, [230; 4], [40, 40, 60, 255]))?;

    for frame in 0..frames {
        if frame > 0 && frame % TEXTURE_SWAP_INTERVAL == 0 {
            // Old texture may still be referenced by frames in flight.
            let shade = (frame / TEXTURE_SWAP_INTERVAL % 200) as u8 + 40;
            let pixels = scene::checker(64, 8, [shade, 200, 255 - shade, 255], [20, 20, 20, 255]);
            let replacement = ctx.texture_create(64, 64, 4, &pixels)?;
            ctx.texture_destroy(texture)?;
            texture = replacement;
        }

        ctx.begin_frame()?;
        let angle = frame as f32 * 0.03;
        for cube in 0..CUBES {
            let offset = (cube as f32 - (CUBES - 1) as f32 * 0.5) * 0.6;
            ctx.set_draw_constants(&scene::spin(angle + cube as f32, offset, 0.3))?;
            ctx.bind_view_for_draw(0, texture)?;
            ctx.draw(vb, ib)?;
        }
        ctx.end_frame()?;
        ctx.present()?;

        if frame % 60 == 0 {
            log::info!("{}", ctx.stats());
        }
    }

    ctx.vertex_buffer_destroy(vb)?;
    ctx.index_buffer_destroy(ib)?;
    ctx.texture_destroy(texture)?;

    let stats = ctx.stats();
    ctx.shutdown().context("failed to drain the GPU")?;
    log::info!("rendered {} frames, {} blocking waits", stats.frames_presented, stats.blocking_waits);
    Ok(())
}

fn stream_config() -> Result<StreamConfig> {
    let mut config = StreamConfig::default();
    if let Some(page_size) = env_parse("NABU_PAGE_SIZE")? {
        config.page_size = page_size;
    }
    if let Ok(mode) = std::env::var("NABU_UPLOAD_MODE") {
        config.upload_mode =
            UploadMode::parse(&mode).ok_or_else(|| anyhow!("unknown upload mode {mode:?}"))?;
    }
    Ok(config)
}

fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(value) => value
            .parse()
            .map(Some)
            .with_context(|| format!("invalid {key}={value:?}")),
        Err(_) => Ok(None),
    }
}
