//! Descriptor streaming.
//!
//! Per-draw resource views are staged on the CPU and committed into a
//! GPU-visible ring whose head only moves past frames the GPU has finished.

mod pool;
mod ring;

pub use pool::DescriptorPool;
pub use ring::{RingRange, RingRegion};
