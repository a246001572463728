use std::fmt;

/// Position on the GPU submission timeline.
///
/// Values are handed out by [`SyncTracker`](super::SyncTracker) in strictly
/// increasing order. `SyncPoint::ZERO` is never issued; it stands for "nothing
/// submitted" and is always complete.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct SyncPoint(u64);

impl SyncPoint {
    pub const ZERO: SyncPoint = SyncPoint(0);

    #[inline]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    #[inline]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// The sync point that follows this one.
    #[inline]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl From<u64> for SyncPoint {
    #[inline]
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for SyncPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sync#{}", self.0)
    }
}
