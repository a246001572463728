//! Nabu engine crate.
//!
//! Frame-synchronized resource streaming: upload pages and descriptor ring
//! space are recycled only once the GPU has retired the sync points that
//! reference them.

pub mod descriptor;
pub mod device;
pub mod handle;
pub mod stream;
pub mod sync;

pub mod logging;
pub mod render;
pub mod resource;

mod error;

pub use error::{Result, StreamError};
pub use resource::{StreamConfig, StreamContext, UploadMode};
