use crate::sync::SyncPoint;

use super::align_up;

/// Index of a page in the upload stream's arena.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PageId(pub(crate) usize);

impl PageId {
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

/// A bump allocator over one host-visible buffer.
///
/// `tag` is the highest sync point of any allocation carved out since the last
/// reset. `epoch` counts resets so stale allocations can be detected.
pub(crate) struct Page<S> {
    pub(crate) buffer: S,
    pub(crate) capacity: u64,
    pub(crate) offset: u64,
    pub(crate) tag: SyncPoint,
    pub(crate) epoch: u32,
}

impl<S> Page<S> {
    pub(crate) fn new(buffer: S, capacity: u64) -> Self {
        Self {
            buffer,
            capacity,
            offset: 0,
            tag: SyncPoint::ZERO,
            epoch: 0,
        }
    }

    /// Reserves `size` bytes at the next `align`-aligned offset.
    pub(crate) fn try_bump(&mut self, size: u64, align: u64) -> Option<u64> {
        let start = align_up(self.offset, align)?;
        let end = start.checked_add(size)?;
        if end > self.capacity {
            return None;
        }
        self.offset = end;
        Some(start)
    }

    #[inline]
    pub(crate) fn tag_with(&mut self, sync: SyncPoint) {
        self.tag = self.tag.max(sync);
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.offset == 0
    }

    pub(crate) fn reset(&mut self) {
        self.offset = 0;
        self.tag = SyncPoint::ZERO;
        self.epoch = self.epoch.wrapping_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bump_respects_alignment_and_capacity() {
        let mut page = Page::new((), 256);
        assert_eq!(page.try_bump(10, 1), Some(0));
        assert_eq!(page.try_bump(16, 64), Some(64));
        assert_eq!(page.offset, 80);
        assert_eq!(page.try_bump(200, 1), None);
        assert_eq!(page.offset, 80);
        assert_eq!(page.try_bump(176, 1), Some(80));
        assert_eq!(page.offset, 256);
    }

    #[test]
    fn reset_clears_offset_and_tag() {
        let mut page = Page::new((), 64);
        page.try_bump(8, 8);
        page.tag_with(SyncPoint::new(3));
        page.tag_with(SyncPoint::new(2));
        assert_eq!(page.tag, SyncPoint::new(3));

        page.reset();
        assert!(page.is_empty());
        assert_eq!(page.tag, SyncPoint::ZERO);
        assert_eq!(page.epoch, 1);
    }
}
