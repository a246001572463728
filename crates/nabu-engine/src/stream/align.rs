use crate::error::{Result, StreamError};

/// Rounds `value` up to the next multiple of `align`.
///
/// `align` must be a non-zero power of two. Returns `None` on overflow.
#[inline]
pub fn align_up(value: u64, align: u64) -> Option<u64> {
    debug_assert!(align.is_power_of_two());
    value.checked_add(align - 1).map(|v| v & !(align - 1))
}

/// Validates an alignment argument coming from a caller.
#[inline]
pub(crate) fn check_alignment(align: u64) -> Result<u64> {
    if align.is_power_of_two() {
        Ok(align)
    } else {
        Err(StreamError::InvalidAlignment(align))
    }
}
