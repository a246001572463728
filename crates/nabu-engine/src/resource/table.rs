use std::cmp::Ordering;
use std::collections::VecDeque;

use crate::error::{Result, StreamError};
use crate::handle::{Handle, HandleAllocator, HandleKind};
use crate::sync::SyncPoint;

use super::ResourceState;

struct Slot<R> {
    state: ResourceState,
    resource: Option<R>,
    /// Upload sync point while `Uploading`, retire sync point while
    /// `PendingDestroy`.
    sync: SyncPoint,
}

/// Handle-indexed storage for one kind of GPU resource.
///
/// Couples a [`HandleAllocator`] with per-id lifecycle state. Destroyed
/// resources stay owned here until the GPU has retired their sync point; only
/// then is the backing object dropped and the id returned to the allocator.
pub struct ResourceTable<K: HandleKind, R> {
    ids: HandleAllocator<K>,
    slots: Vec<Slot<R>>,
    uploading: VecDeque<(Handle<K>, SyncPoint)>,
    retiring: VecDeque<(Handle<K>, SyncPoint)>,
}

impl<K: HandleKind, R> ResourceTable<K, R> {
    pub fn new() -> Self {
        Self {
            ids: HandleAllocator::new(),
            slots: Vec::new(),
            uploading: VecDeque::new(),
            retiring: VecDeque::new(),
        }
    }

    /// Issues a handle in the `Requested` state.
    pub fn reserve(&mut self) -> Result<Handle<K>> {
        let id = self.ids.alloc()?;
        let index = id.raw() as usize;
        match index.cmp(&self.slots.len()) {
            Ordering::Less => {
                let slot = &mut self.slots[index];
                debug_assert!(slot.state.can_transition_to(ResourceState::Requested));
                slot.state = ResourceState::Requested;
                slot.resource = None;
            }
            Ordering::Equal => self.slots.push(Slot {
                state: ResourceState::Requested,
                resource: None,
                sync: SyncPoint::ZERO,
            }),
            Ordering::Greater => {
                return Err(StreamError::Invariant("handle allocator skipped an id"));
            }
        }
        Ok(id)
    }

    /// Returns a `Requested` handle whose creation failed.
    pub fn abandon(&mut self, id: Handle<K>) {
        if let Ok(slot) = self.slot_mut(id, ResourceState::Requested) {
            slot.state = ResourceState::Reclaimed;
            self.ids.free(id);
        }
    }

    /// Stores the GPU object and marks its upload as recorded for `sync`.
    pub fn begin_upload(&mut self, id: Handle<K>, resource: R, sync: SyncPoint) -> Result<()> {
        let slot = self.slot_mut(id, ResourceState::Requested)?;
        slot.state = ResourceState::Uploading;
        slot.resource = Some(resource);
        slot.sync = sync;
        self.uploading.push_back((id, sync));
        Ok(())
    }

    /// Marks every upload recorded for `submitted` or earlier as `Live`.
    pub fn promote(&mut self, submitted: SyncPoint) -> usize {
        let mut promoted = 0;
        while let Some(&(id, sync)) = self.uploading.front() {
            if sync > submitted {
                break;
            }
            self.uploading.pop_front();
            // Destroyed (or destroyed and reissued) entries are skipped.
            if let Some(slot) = self.slots.get_mut(id.raw() as usize)
                && slot.state == ResourceState::Uploading
                && slot.sync == sync
            {
                slot.state = ResourceState::Live;
                promoted += 1;
            }
        }
        promoted
    }

    pub fn get(&self, id: Handle<K>) -> Result<&R> {
        self.slots
            .get(id.raw() as usize)
            .filter(|slot| slot.state.is_usable())
            .and_then(|slot| slot.resource.as_ref())
            .ok_or(invalid(id))
    }

    pub fn state(&self, id: Handle<K>) -> Option<ResourceState> {
        self.slots.get(id.raw() as usize).map(|slot| slot.state)
    }

    /// Parks a usable resource until the GPU retires `sync`.
    pub fn retire(&mut self, id: Handle<K>, sync: SyncPoint) -> Result<&R> {
        let slot = self
            .slots
            .get_mut(id.raw() as usize)
            .filter(|slot| slot.state.is_usable())
            .ok_or(invalid(id))?;
        slot.state = ResourceState::PendingDestroy;
        slot.sync = sync;
        self.retiring.push_back((id, sync));
        log::debug!("{id:?} pending destroy until {sync}");
        slot.resource.as_ref().ok_or(invalid(id))
    }

    /// Drops every parked resource whose retire point has completed.
    pub fn reclaim(&mut self, completed: SyncPoint) -> usize {
        let mut reclaimed = 0;
        while let Some(&(id, sync)) = self.retiring.front() {
            if sync > completed {
                break;
            }
            self.retiring.pop_front();
            let Some(slot) = self.slots.get_mut(id.raw() as usize) else { continue };
            debug_assert_eq!(slot.state, ResourceState::PendingDestroy);
            slot.state = ResourceState::Reclaimed;
            slot.resource = None;
            self.ids.free(id);
            reclaimed += 1;
        }
        reclaimed
    }

    /// Resources that draws may currently reference.
    pub fn usable(&self) -> usize {
        self.slots.iter().filter(|slot| slot.state.is_usable()).count()
    }

    pub fn pending_destroys(&self) -> usize {
        self.retiring.len()
    }

    fn slot_mut(&mut self, id: Handle<K>, expected: ResourceState) -> Result<&mut Slot<R>> {
        self.slots
            .get_mut(id.raw() as usize)
            .filter(|slot| slot.state == expected)
            .ok_or(invalid(id))
    }
}

impl<K: HandleKind, R> Default for ResourceTable<K, R> {
    fn default() -> Self {
        Self::new()
    }
}

fn invalid<K: HandleKind>(id: Handle<K>) -> StreamError {
    StreamError::InvalidHandle {
        kind: K::NAME,
        raw: id.raw(),
    }
}
