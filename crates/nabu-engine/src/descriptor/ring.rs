use std::collections::VecDeque;

use crate::error::{Result, StreamError};
use crate::sync::SyncPoint;

/// A committed, contiguous run of ring slots.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct RingRange {
    /// First slot, as an index into the GPU-visible table.
    pub base: u32,
    pub count: u32,
}

impl RingRange {
    #[inline]
    pub fn contains(&self, index: u32) -> bool {
        index >= self.base && index - self.base < self.count
    }

    #[inline]
    pub fn end(&self) -> u32 {
        self.base + self.count
    }
}

#[derive(Debug, Copy, Clone)]
struct PendingTail {
    tail: u64,
    sync: SyncPoint,
}

/// Head/tail bookkeeping for a ring over a fixed-capacity table.
///
/// Positions are kept as monotonically increasing virtual offsets; the
/// physical slot is `position % capacity`. A run never straddles the end of
/// the table: when it would, the tail skips to the next lap and the skipped
/// slots count as occupied until the head passes them. That keeps
/// `tail - head <= capacity` as the single overlap check.
#[derive(Debug)]
pub struct RingRegion {
    capacity: u32,
    head: u64,
    tail: u64,
    pending: VecDeque<PendingTail>,
}

impl RingRegion {
    pub fn new(capacity: u32) -> Self {
        debug_assert!(capacity > 0);
        Self {
            capacity: capacity.max(1),
            head: 0,
            tail: 0,
            pending: VecDeque::new(),
        }
    }

    #[inline]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Physical slot of the oldest unreclaimed entry.
    #[inline]
    pub fn head(&self) -> u32 {
        (self.head % self.capacity as u64) as u32
    }

    /// Physical slot the next commit would start at, barring a wrap.
    #[inline]
    pub fn tail(&self) -> u32 {
        (self.tail % self.capacity as u64) as u32
    }

    /// Slots between head and tail, including slots skipped by a wrap.
    #[inline]
    pub fn occupied(&self) -> u32 {
        (self.tail - self.head) as u32
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    #[inline]
    pub fn pending_frames(&self) -> usize {
        self.pending.len()
    }

    /// Reserves `count` contiguous slots at the tail, wrapping to slot 0 when
    /// the run does not fit before the end of the table.
    ///
    /// Fails without moving the tail if the run would reach into `[head, tail)`.
    pub fn commit(&mut self, count: u32) -> Result<RingRange> {
        debug_assert!(count > 0);
        let cap = self.capacity as u64;
        let exhausted = || StreamError::RingExhausted {
            requested: count,
            occupied: self.occupied(),
            capacity: self.capacity,
        };
        if count as u64 > cap {
            return Err(exhausted());
        }

        let slot = self.tail % cap;
        let base = if slot + count as u64 > cap {
            self.tail + (cap - slot)
        } else {
            self.tail
        };
        if base + count as u64 - self.head > cap {
            log::error!(
                "descriptor ring exhausted: {count} slots at tail {}, head {}, capacity {cap}",
                self.tail(),
                self.head()
            );
            return Err(exhausted());
        }

        if base != self.tail {
            log::debug!("descriptor ring wrapped (head {})", self.head());
        }
        self.tail = base + count as u64;
        Ok(RingRange {
            base: (base % cap) as u32,
            count,
        })
    }

    /// Tags everything committed so far with `sync`.
    pub fn end_frame(&mut self, sync: SyncPoint) {
        debug_assert!(
            self.pending.back().is_none_or(|p| p.sync <= sync),
            "frame sync points must not decrease"
        );
        self.pending.push_back(PendingTail { tail: self.tail, sync });
    }

    /// Advances the head past every frame whose sync point has completed.
    ///
    /// Once the pending queue drains the ring must be empty; anything else
    /// means commits escaped frame tracking.
    pub fn reclaim(&mut self, completed: SyncPoint) -> Result<usize> {
        let mut frames = 0;
        while let Some(front) = self.pending.front() {
            if front.sync > completed {
                break;
            }
            self.head = front.tail;
            self.pending.pop_front();
            frames += 1;
        }

        if frames > 0 && self.pending.is_empty() && self.head != self.tail {
            log::error!("descriptor ring drained with {} slots unaccounted", self.occupied());
            debug_assert_eq!(self.head, self.tail, "descriptor ring drained but head != tail");
            return Err(StreamError::Invariant("descriptor ring head != tail after full drain"));
        }
        Ok(frames)
    }
}
