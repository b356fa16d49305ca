//! Utility helpers for page size, alignment, and safe range calculations.

use std::ops::Range;

use crate::errors::{MmapError, Result};

/// Get the system page size in bytes.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn page_size() -> usize {
    // SAFETY: sysconf with _SC_PAGESIZE is safe to call.
    let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    // Page sizes are always positive and small
    page_size.max(0) as usize
}

/// Align a value down to the nearest multiple of `alignment`.
#[must_use]
pub fn align_down(value: usize, alignment: usize) -> usize {
    if alignment == 0 {
        return value;
    }
    if alignment.is_power_of_two() {
        value & !(alignment - 1)
    } else {
        value - value % alignment
    }
}

/// Whether a file offset is a multiple of `page`.
///
/// A page size of zero (a failed `sysconf`) makes every offset unaligned.
#[must_use]
pub fn is_page_aligned(offset: u64, page: usize) -> bool {
    offset.checked_rem(page as u64) == Some(0)
}

/// Ensure the requested [offset, offset+len) range is within [0, total).
/// Returns `Ok(())` if valid; otherwise an `OutOfBounds` error.
///
/// # Errors
///
/// Returns `MmapError::OutOfBounds` if the range exceeds bounds.
pub fn ensure_in_bounds(offset: u64, len: u64, total: u64) -> Result<()> {
    if offset > total {
        return Err(MmapError::OutOfBounds { offset, len, total });
    }
    let end = offset.saturating_add(len);
    if end > total {
        return Err(MmapError::OutOfBounds { offset, len, total });
    }
    Ok(())
}

/// Compute a safe byte slice range for a given total length, returning start..end as usize tuple.
///
/// # Errors
///
/// Returns `MmapError::OutOfBounds` if the requested range exceeds the total length.
pub fn slice_range(offset: usize, len: usize, total: usize) -> Result<(usize, usize)> {
    ensure_in_bounds(offset as u64, len as u64, total as u64)?;
    Ok((offset, offset + len))
}

/// Clamp an optional `[offset, offset+len)` request to `[0, total)`.
///
/// `len == None` means "to the end". A `len` past the end is capped at `total`.
/// Returns `None` when the clamped window is empty, including `offset >= total`.
#[must_use]
pub fn clamp_range(offset: usize, len: Option<usize>, total: usize) -> Option<Range<usize>> {
    if offset >= total {
        return None;
    }
    let remaining = total - offset;
    let len = len.map_or(remaining, |l| l.min(remaining));
    if len == 0 {
        return None;
    }
    Some(offset..offset + len)
}
