//! GPU timeline tracking.
//!
//! Sync points tag submitted work; everything that recycles memory asks the
//! tracker whether the GPU has moved past the tag before reusing it.

mod point;
mod tracker;

pub use point::SyncPoint;
pub use tracker::SyncTracker;
