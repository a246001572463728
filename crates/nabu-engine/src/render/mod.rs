//! GPU rendering used by the wgpu backend.
//!
//! One textured mesh pipeline drawing into an offscreen color target.
//! Geometry is in clip space after the per-draw transform.

mod pipeline;
mod target;
mod vertex;

pub use pipeline::MeshPipeline;
pub use target::RenderTarget;
pub use vertex::{DrawConstants, Vertex};
