//! Upload streaming.
//!
//! Short-lived host-visible memory for staging data before it is copied into
//! device-local resources. Pages are recycled once the GPU has consumed them.

mod align;
mod page;
mod upload;

pub use align::align_up;
pub use page::PageId;
pub use upload::{Allocation, UploadStats, UploadStream, DEFAULT_PAGE_SIZE};
