use crate::sync::SyncPoint;

/// Errors produced by the streaming allocators and the resource factory.
///
/// Only `OutOfStreamingMemory` can occur in a healthy program, and only when a
/// hard ceiling is configured. Everything else is either a caller contract
/// violation or a fatal device condition; none of it is retried internally.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    #[error("upload stream out of memory: requested {requested} bytes, {reserved} reserved, ceiling {ceiling}")]
    OutOfStreamingMemory {
        requested: u64,
        reserved: u64,
        ceiling: u64,
    },
    #[error("alignment {0} is not a power of two")]
    InvalidAlignment(u64),
    #[error("zero-sized upload allocation")]
    ZeroSizedAllocation,
    #[error("allocation refers to a page that has been reset since it was handed out")]
    StaleAllocation,
    #[error("write of {len} bytes overflows a {size}-byte allocation")]
    AllocationOverflow { len: u64, size: u64 },

    #[error("descriptor ring exhausted: {requested} slots requested, {occupied}/{capacity} occupied")]
    RingExhausted {
        requested: u32,
        occupied: u32,
        capacity: u32,
    },
    #[error("commit called with no staged views")]
    NothingStaged,
    #[error("binding slot {slot} out of range (table has {slots} slots)")]
    SlotOutOfRange { slot: u32, slots: u32 },
    #[error("binding slot {0} was never staged")]
    UnboundSlot(u32),

    #[error("{kind} handle {raw} is not live")]
    InvalidHandle { kind: &'static str, raw: u32 },
    #[error("{0} handle space exhausted")]
    HandleSpaceExhausted(&'static str),
    #[error("unsupported texture channel count {0}")]
    UnsupportedChannelCount(u32),
    #[error("texture data has {actual} bytes, expected {expected}")]
    InvalidTextureData { expected: u64, actual: u64 },

    #[error("cannot wait for {requested}: last submitted is {submitted}")]
    UnsubmittedSyncPoint {
        requested: SyncPoint,
        submitted: SyncPoint,
    },
    #[error("invalid stream configuration: {0}")]
    InvalidConfig(&'static str),
    #[error("frame state: {0}")]
    FrameState(&'static str),
    #[error("internal invariant violated: {0}")]
    Invariant(&'static str),
    #[error("gpu device lost: {0}")]
    DeviceLost(String),
}

impl StreamError {
    /// Returns true for conditions the process cannot continue from.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            StreamError::DeviceLost(_) | StreamError::Invariant(_) | StreamError::RingExhausted { .. }
        )
    }
}

pub type Result<T, E = StreamError> = std::result::Result<T, E>;
