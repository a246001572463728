use core::fmt;
use core::hash::{Hash, Hasher};
use core::marker::PhantomData;

use crate::error::{Result, StreamError};

/// Names a family of handles so ids of different kinds never mix.
pub trait HandleKind {
    const NAME: &'static str;
}

/// Small recyclable identifier for a resource of kind `K`.
///
/// `Handle::INVALID` is never issued by an allocator.
pub struct Handle<K> {
    raw: u32,
    _kind: PhantomData<fn() -> K>,
}

impl<K> Handle<K> {
    pub const INVALID: Self = Self::from_raw(u32::MAX);

    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self { raw, _kind: PhantomData }
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.raw
    }

    #[inline]
    pub const fn is_valid(self) -> bool {
        self.raw != u32::MAX
    }
}

// Manual impls: derives would put bounds on `K`, which is only a marker.
impl<K> Clone for Handle<K> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl<K> Copy for Handle<K> {}

impl<K> PartialEq for Handle<K> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<K> Eq for Handle<K> {}

impl<K> PartialOrd for Handle<K> {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<core::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<K> Ord for Handle<K> {
    #[inline]
    fn cmp(&self, other: &Self) -> core::cmp::Ordering {
        self.raw.cmp(&other.raw)
    }
}

impl<K> Hash for Handle<K> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl<K: HandleKind> fmt::Debug for Handle<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "{}({})", K::NAME, self.raw)
        } else {
            write!(f, "{}(invalid)", K::NAME)
        }
    }
}

impl<K> Default for Handle<K> {
    fn default() -> Self {
        Self::INVALID
    }
}

/// Free-list backed id generator.
///
/// Freed ids are reused LIFO before any new id is issued. Liveness is not
/// tracked beyond debug-build double-free detection; callers own that.
pub struct HandleAllocator<K> {
    next: u32,
    free: Vec<u32>,
    _kind: PhantomData<fn() -> K>,
}

impl<K: HandleKind> HandleAllocator<K> {
    pub fn new() -> Self {
        Self {
            next: 0,
            free: Vec::new(),
            _kind: PhantomData,
        }
    }

    pub fn alloc(&mut self) -> Result<Handle<K>> {
        if let Some(raw) = self.free.pop() {
            return Ok(Handle::from_raw(raw));
        }
        if self.next == u32::MAX {
            return Err(StreamError::HandleSpaceExhausted(K::NAME));
        }
        let raw = self.next;
        self.next += 1;
        Ok(Handle::from_raw(raw))
    }

    pub fn free(&mut self, handle: Handle<K>) {
        debug_assert!(
            handle.is_valid() && handle.raw < self.next,
            "freeing {handle:?} that was never issued"
        );
        debug_assert!(!self.free.contains(&handle.raw), "double free of {handle:?}");
        self.free.push(handle.raw);
    }

    /// Number of ids currently handed out.
    #[inline]
    pub fn live(&self) -> usize {
        self.next as usize - self.free.len()
    }

    /// Upper bound (exclusive) of every id issued so far.
    #[inline]
    pub fn high_water(&self) -> u32 {
        self.next
    }
}

impl<K: HandleKind> Default for HandleAllocator<K> {
    fn default() -> Self {
        Self::new()
    }
}
