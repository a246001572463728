use std::collections::VecDeque;

use crate::device::{GpuBackend, StagingRange};
use crate::error::{Result, StreamError};
use crate::sync::SyncPoint;

use super::align::check_alignment;
use super::page::{Page, PageId};

/// Default page size for upload streams.
pub const DEFAULT_PAGE_SIZE: u64 = 2 * 1024 * 1024;

/// A non-owning view into an upload page.
///
/// Valid until the page is reclaimed; writes through a stale allocation are
/// rejected with [`StreamError::StaleAllocation`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct Allocation {
    page: PageId,
    epoch: u32,
    offset: u64,
    size: u64,
}

impl Allocation {
    #[inline]
    pub fn page(&self) -> PageId {
        self.page
    }

    /// Byte offset of the allocation inside its page buffer.
    #[inline]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    #[inline]
    pub fn size(&self) -> u64 {
        self.size
    }
}

#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct UploadStats {
    pub pages: usize,
    pub pages_in_use: usize,
    pub free_pages: usize,
    /// Bytes of host-visible memory owned by the stream.
    pub reserved_bytes: u64,
    /// Bytes handed out from pages that are still in use.
    pub used_bytes: u64,
}

/// Linear streaming allocator for CPU→GPU uploads.
///
/// Pages live in an arena and are never freed while the stream exists. A page
/// is either in use (FIFO, newest at the back, the back page being the active
/// one) or free. In-use pages return to the free list once the GPU has
/// completed every sync point tagged onto them.
pub struct UploadStream<B: GpuBackend> {
    pages: Vec<Page<B::StagingBuffer>>,
    in_use: VecDeque<PageId>,
    free: VecDeque<PageId>,
    page_size: u64,
    ceiling: Option<u64>,
    reserved: u64,
}

impl<B: GpuBackend> UploadStream<B> {
    /// Creates an empty stream. Pages are created on first use.
    pub fn new(page_size: u64) -> Self {
        debug_assert!(page_size > 0);
        Self {
            pages: Vec::new(),
            in_use: VecDeque::new(),
            free: VecDeque::new(),
            page_size: page_size.max(1),
            ceiling: None,
            reserved: 0,
        }
    }

    /// Caps the total host-visible memory the stream may reserve.
    pub fn with_ceiling(mut self, ceiling: Option<u64>) -> Self {
        self.ceiling = ceiling;
        self
    }

    #[inline]
    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    /// Bump-allocates `size` bytes aligned to `align`, tagged with `sync`.
    ///
    /// Falls back to a recycled page, then to a new page of
    /// `max(page_size, size)` bytes, when the active page is full. The full
    /// page stays in use until reclaimed.
    pub fn allocate(
        &mut self,
        backend: &mut B,
        size: u64,
        align: u64,
        sync: SyncPoint,
    ) -> Result<Allocation> {
        if size == 0 {
            return Err(StreamError::ZeroSizedAllocation);
        }
        let align = check_alignment(align)?;

        if let Some(&id) = self.in_use.back() {
            let page = &mut self.pages[id.0];
            if let Some(offset) = page.try_bump(size, align) {
                page.tag_with(sync);
                log::trace!("upload alloc {size}B @ page {} +{offset} ({sync})", id.0);
                return Ok(Allocation { page: id, epoch: page.epoch, offset, size });
            }
        }

        let id = self.acquire_page(backend, size)?;
        let page = &mut self.pages[id.0];
        let offset = page
            .try_bump(size, align)
            .ok_or(StreamError::Invariant("fresh upload page cannot hold its sizing request"))?;
        page.tag_with(sync);
        self.in_use.push_back(id);

        log::trace!("upload alloc {size}B @ page {} +{offset} ({sync})", id.0);
        Ok(Allocation { page: id, epoch: page.epoch, offset, size })
    }

    /// Allocates room for `data` and copies it in.
    pub fn allocate_bytes(
        &mut self,
        backend: &mut B,
        data: &[u8],
        align: u64,
        sync: SyncPoint,
    ) -> Result<Allocation> {
        let alloc = self.allocate(backend, data.len() as u64, align, sync)?;
        self.write(backend, &alloc, data)?;
        Ok(alloc)
    }

    /// Copies `data` into the start of `alloc` through the host mapping.
    pub fn write(&self, backend: &mut B, alloc: &Allocation, data: &[u8]) -> Result<()> {
        let page = self.live_page(alloc)?;
        let len = data.len() as u64;
        if len > alloc.size {
            return Err(StreamError::AllocationOverflow { len, size: alloc.size });
        }
        backend.write_staging(&page.buffer, alloc.offset, data);
        Ok(())
    }

    /// Resolves an allocation to the staging buffer range that backs it.
    pub fn staging_range(&self, alloc: &Allocation) -> Result<StagingRange<'_, B::StagingBuffer>> {
        let page = self.live_page(alloc)?;
        Ok(StagingRange {
            buffer: &page.buffer,
            offset: alloc.offset,
            size: alloc.size,
        })
    }

    /// Resets every in-use page whose tag the GPU has completed, oldest first.
    ///
    /// Stops at the first page still in flight. Returns the number of pages
    /// moved to the free list.
    pub fn reclaim(&mut self, completed: SyncPoint) -> usize {
        let mut reclaimed = 0;
        while let Some(&id) = self.in_use.front() {
            let page = &mut self.pages[id.0];
            if page.tag > completed {
                break;
            }
            debug_assert!(!page.is_empty(), "in-use page {} holds no allocations", id.0);
            page.reset();
            self.in_use.pop_front();
            self.free.push_back(id);
            reclaimed += 1;
        }
        if reclaimed > 0 {
            log::debug!("upload stream reclaimed {reclaimed} page(s) through {completed}");
        }
        reclaimed
    }

    pub fn stats(&self) -> UploadStats {
        UploadStats {
            pages: self.pages.len(),
            pages_in_use: self.in_use.len(),
            free_pages: self.free.len(),
            reserved_bytes: self.reserved,
            used_bytes: self.in_use.iter().map(|id| self.pages[id.0].offset).sum(),
        }
    }

    /// Highest sync point tagged onto any in-use page, if any.
    pub fn newest_tag(&self) -> Option<SyncPoint> {
        self.in_use.iter().map(|id| self.pages[id.0].tag).max()
    }

    fn live_page(&self, alloc: &Allocation) -> Result<&Page<B::StagingBuffer>> {
        self.pages
            .get(alloc.page.0)
            .filter(|page| page.epoch == alloc.epoch)
            .ok_or(StreamError::StaleAllocation)
    }

    /// Takes the oldest free page large enough for `size`, or creates one.
    fn acquire_page(&mut self, backend: &mut B, size: u64) -> Result<PageId> {
        if let Some(pos) = self
            .free
            .iter()
            .position(|id| self.pages[id.0].capacity >= size)
        {
            if let Some(id) = self.free.remove(pos) {
                log::trace!("upload stream recycling page {}", id.0);
                return Ok(id);
            }
        }

        let capacity = self.page_size.max(size);
        if let Some(ceiling) = self.ceiling {
            if self.reserved.saturating_add(capacity) > ceiling {
                log::error!(
                    "upload stream ceiling hit: {capacity}B page over {}B reserved (ceiling {ceiling}B)",
                    self.reserved
                );
                return Err(StreamError::OutOfStreamingMemory {
                    requested: size,
                    reserved: self.reserved,
                    ceiling,
                });
            }
        }

        let buffer = backend.create_staging_buffer(capacity)?;
        let id = PageId(self.pages.len());
        self.pages.push(Page::new(buffer, capacity));
        self.reserved += capacity;

        if capacity > self.page_size {
            log::debug!("upload stream created oversized page {} ({capacity}B)", id.0);
        } else {
            log::debug!("upload stream created page {} ({capacity}B)", id.0);
        }
        Ok(id)
    }
}
