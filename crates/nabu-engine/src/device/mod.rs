//! GPU device management and the backend seam the streaming core drives.
//!
//! This module is responsible for:
//! - the [`GpuBackend`] trait (staging memory, copies, descriptor writes, submission)
//! - creating the headless wgpu Instance/Adapter/Device/Queue
//! - a wgpu implementation and a CPU-simulated one

mod backend;
mod gpu;
mod init;
mod null;
mod wgpu_backend;

pub use backend::{
    BufferDesc, BufferKind, DrawCall, GpuBackend, StagingRange, TexelFormat, TextureCopyLayout,
    TextureDesc,
};
pub use gpu::Gpu;
pub use init::GpuInit;
pub use null::{ExecutedDraw, Hazard, NullBackend, NullBuffer, NullTexture, NullView};
pub use wgpu_backend::WgpuBackend;
