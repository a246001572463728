use crate::device::GpuBackend;
use crate::error::{Result, StreamError};

use super::SyncPoint;

/// Tracks the CPU side of the submission timeline.
///
/// The tracker owns the counter of submitted work and caches the highest
/// completion value ever observed, so [`completed_up_to`](Self::completed_up_to)
/// never goes backwards even if a backend reports a stale value.
#[derive(Debug, Default)]
pub struct SyncTracker {
    last_submitted: SyncPoint,
    last_completed: SyncPoint,
    blocking_waits: u64,
}

impl SyncTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest sync point handed out so far.
    #[inline]
    pub fn last_submitted(&self) -> SyncPoint {
        self.last_submitted
    }

    /// Highest completion value observed so far. Does not query the backend.
    #[inline]
    pub fn last_completed(&self) -> SyncPoint {
        self.last_completed
    }

    /// The sync point the next [`submit`](Self::submit) will return.
    ///
    /// Allocations made for work that is still being recorded are tagged with
    /// this value.
    #[inline]
    pub fn pending(&self) -> SyncPoint {
        self.last_submitted.next()
    }

    /// Number of times [`wait_until`](Self::wait_until) actually blocked.
    #[inline]
    pub fn blocking_waits(&self) -> u64 {
        self.blocking_waits
    }

    /// Submits all recorded work and returns the sync point that signals it.
    pub fn submit<B: GpuBackend>(&mut self, backend: &mut B) -> Result<SyncPoint> {
        let sync = self.last_submitted.next();
        backend.submit_recorded_work(sync).inspect_err(|err| {
            log::error!("submit of {sync} failed: {err}");
        })?;
        self.last_submitted = sync;
        log::trace!("submitted {sync}");
        Ok(sync)
    }

    /// Highest sync point the GPU has finished. Never blocks.
    pub fn completed_up_to<B: GpuBackend>(&mut self, backend: &B) -> SyncPoint {
        let reported = backend.query_completed_sync_point();
        debug_assert!(
            reported <= self.last_submitted,
            "backend reports {reported} complete but only {} was submitted",
            self.last_submitted
        );
        self.last_completed = self.last_completed.max(reported.min(self.last_submitted));
        self.last_completed
    }

    /// Returns true once everything up to `sync` has retired.
    pub fn is_complete<B: GpuBackend>(&mut self, backend: &B, sync: SyncPoint) -> bool {
        sync <= self.last_completed || sync <= self.completed_up_to(backend)
    }

    /// Blocks until the GPU has retired `sync`.
    ///
    /// Returns immediately when the value is already complete. Waiting on a
    /// value that was never submitted would never return, so it is rejected.
    pub fn wait_until<B: GpuBackend>(&mut self, backend: &mut B, sync: SyncPoint) -> Result<()> {
        if self.is_complete(backend, sync) {
            return Ok(());
        }
        if sync > self.last_submitted {
            return Err(StreamError::UnsubmittedSyncPoint {
                requested: sync,
                submitted: self.last_submitted,
            });
        }

        self.blocking_waits += 1;
        backend.block_until_sync_point(sync).inspect_err(|err| {
            log::error!("wait for {sync} failed: {err}");
        })?;
        self.last_completed = self.last_completed.max(sync);
        Ok(())
    }

    /// Submits outstanding work and waits for the whole pipeline to drain.
    pub fn flush<B: GpuBackend>(&mut self, backend: &mut B) -> Result<SyncPoint> {
        let sync = self.submit(backend)?;
        self.wait_until(backend, sync)?;
        Ok(sync)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::NullBackend;

    #[test]
    fn submit_is_strictly_increasing() {
        let mut gpu = NullBackend::new();
        let mut sync = SyncTracker::new();
        let a = sync.submit(&mut gpu).unwrap();
        let b = sync.submit(&mut gpu).unwrap();
        let c = sync.submit(&mut gpu).unwrap();
        assert!(a < b && b < c);
        assert_eq!(a, SyncPoint::new(1));
        assert_eq!(sync.pending(), SyncPoint::new(4));
    }

    #[test]
    fn completed_tracks_gpu_progress() {
        let mut gpu = NullBackend::new();
        let mut sync = SyncTracker::new();
        sync.submit(&mut gpu).unwrap();
        let second = sync.submit(&mut gpu).unwrap();
        assert_eq!(sync.completed_up_to(&gpu), SyncPoint::ZERO);

        gpu.retire_through(SyncPoint::new(1));
        assert_eq!(sync.completed_up_to(&gpu), SyncPoint::new(1));

        gpu.retire_through(second);
        assert!(sync.is_complete(&gpu, second));
    }

    #[test]
    fn wait_on_completed_point_does_not_block() {
        let mut gpu = NullBackend::new();
        let mut sync = SyncTracker::new();
        let sp = sync.submit(&mut gpu).unwrap();
        gpu.retire_all();

        sync.wait_until(&mut gpu, sp).unwrap();
        assert_eq!(sync.blocking_waits(), 0);
        assert_eq!(gpu.blocking_waits(), 0);
    }

    #[test]
    fn wait_blocks_until_retired() {
        let mut gpu = NullBackend::new();
        let mut sync = SyncTracker::new();
        let sp = sync.submit(&mut gpu).unwrap();

        sync.wait_until(&mut gpu, sp).unwrap();
        assert_eq!(sync.blocking_waits(), 1);
        assert!(sync.is_complete(&gpu, sp));
    }

    #[test]
    fn wait_on_unsubmitted_point_is_rejected() {
        let mut gpu = NullBackend::new();
        let mut sync = SyncTracker::new();
        let err = sync.wait_until(&mut gpu, SyncPoint::new(3)).unwrap_err();
        assert!(matches!(err, StreamError::UnsubmittedSyncPoint { .. }));
    }

    #[test]
    fn device_loss_propagates() {
        let mut gpu = NullBackend::new();
        let mut sync = SyncTracker::new();
        let sp = sync.submit(&mut gpu).unwrap();
        gpu.lose_device("driver reset");

        let err = sync.wait_until(&mut gpu, sp).unwrap_err();
        assert!(err.is_fatal());
        assert!(sync.submit(&mut gpu).is_err());
        assert_eq!(sync.last_submitted(), sp);
    }
}
