use core::fmt;

use crate::stream::UploadStats;
use crate::sync::SyncPoint;

/// Point-in-time snapshot of a [`StreamContext`](super::StreamContext).
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct StreamStats {
    pub upload: UploadStats,
    pub ring_occupied: u32,
    pub ring_capacity: u32,
    /// Frames whose descriptor commits are not yet reclaimed.
    pub ring_pending_frames: usize,
    pub vertex_buffers: usize,
    pub index_buffers: usize,
    pub textures: usize,
    pub pending_destroys: usize,
    pub last_submitted: SyncPoint,
    pub last_completed: SyncPoint,
    pub blocking_waits: u64,
    pub frames_presented: u64,
}

impl StreamStats {
    #[inline]
    pub fn live_resources(&self) -> usize {
        self.vertex_buffers + self.index_buffers + self.textures
    }
}

impl fmt::Display for StreamStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "frame {} | pages {}/{} ({} KiB) | ring {}/{} | resources {} (+{} pending) | gpu {}/{} | waits {}",
            self.frames_presented,
            self.upload.pages_in_use,
            self.upload.pages,
            self.upload.reserved_bytes / 1024,
            self.ring_occupied,
            self.ring_capacity,
            self.live_resources(),
            self.pending_destroys,
            self.last_completed,
            self.last_submitted,
            self.blocking_waits,
        )
    }
}
