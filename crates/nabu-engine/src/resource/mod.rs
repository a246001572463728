//! Resource factory glue.
//!
//! Ties the upload stream, descriptor pool, sync tracker and handle tables
//! together behind [`StreamContext`], the API draw code talks to.

mod config;
mod context;
mod state;
mod stats;
mod table;

pub use config::{StreamConfig, UploadMode};
pub use context::{
    StreamContext, CONSTANTS_ALIGNMENT, TEXTURE_PLACEMENT_ALIGNMENT, TEXTURE_ROW_PITCH_ALIGNMENT,
};
pub use state::ResourceState;
pub use stats::StreamStats;
pub use table::ResourceTable;
