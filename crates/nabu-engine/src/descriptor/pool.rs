use crate::device::GpuBackend;
use crate::error::{Result, StreamError};
use crate::sync::SyncPoint;

use super::{RingRange, RingRegion};

/// Streams per-draw view bindings into a GPU-visible descriptor ring.
///
/// Views are staged into a small CPU-side table by binding slot, then
/// [`commit_staged`](Self::commit_staged) copies slots `0..=highest` into the
/// ring as one contiguous run. Staged values persist across commits; only the
/// staged-range tracker resets, so a draw that rebinds slot 0 but not slot 1
/// re-commits the previous slot 1 view.
pub struct DescriptorPool<B: GpuBackend> {
    staging: Vec<Option<B::View>>,
    highest_staged: Option<u32>,
    ring: RingRegion,
}

impl<B: GpuBackend> DescriptorPool<B> {
    pub fn new(ring_capacity: u32, staging_slots: u32) -> Self {
        debug_assert!(staging_slots > 0 && staging_slots <= ring_capacity);
        Self {
            staging: vec![None; staging_slots as usize],
            highest_staged: None,
            ring: RingRegion::new(ring_capacity),
        }
    }

    #[inline]
    pub fn ring(&self) -> &RingRegion {
        &self.ring
    }

    #[inline]
    pub fn staging_slots(&self) -> u32 {
        self.staging.len() as u32
    }

    #[inline]
    pub fn has_staged(&self) -> bool {
        self.highest_staged.is_some()
    }

    /// Copies `view` into the staging table at `slot`.
    pub fn stage_view(&mut self, slot: u32, view: &B::View) -> Result<()> {
        let slots = self.staging_slots();
        let entry = self
            .staging
            .get_mut(slot as usize)
            .ok_or(StreamError::SlotOutOfRange { slot, slots })?;
        *entry = Some(view.clone());
        self.highest_staged = Some(self.highest_staged.map_or(slot, |h| h.max(slot)));
        Ok(())
    }

    /// Copies the staged range into the ring at the current tail.
    ///
    /// Returns the committed range so the caller can bind it for the next
    /// draw. The ring is untouched if the run cannot fit.
    pub fn commit_staged(&mut self, backend: &mut B) -> Result<RingRange> {
        let highest = self.highest_staged.ok_or(StreamError::NothingStaged)?;
        let count = highest + 1;
        if let Some(unbound) = self.staging[..count as usize].iter().position(Option::is_none) {
            return Err(StreamError::UnboundSlot(unbound as u32));
        }

        let range = self.ring.commit(count)?;
        for (i, view) in self.staging[..count as usize].iter().flatten().enumerate() {
            backend.record_view_write(range.base + i as u32, view);
        }
        self.highest_staged = None;

        log::trace!("committed {count} view(s) at ring slot {}", range.base);
        Ok(range)
    }

    /// Assigns everything committed so far to `sync`.
    ///
    /// Staged views that were never committed are dropped.
    pub fn end_frame(&mut self, sync: SyncPoint) {
        if self.highest_staged.take().is_some() {
            log::warn!("discarding staged views that were never committed");
        }
        self.ring.end_frame(sync);
    }

    /// Releases ring space for frames the GPU has completed.
    pub fn reclaim(&mut self, completed: SyncPoint) -> Result<usize> {
        self.ring.reclaim(completed)
    }

    /// Forgets a view so it is not re-committed after its texture is gone.
    pub fn forget_slots<F>(&mut self, mut matches: F)
    where
        F: FnMut(&B::View) -> bool,
    {
        for entry in &mut self.staging {
            if entry.as_ref().is_some_and(&mut matches) {
                *entry = None;
            }
        }
    }
}
