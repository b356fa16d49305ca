//! Byte windows over a mapping.

use std::sync::Arc;

use crate::errors::Result;
use crate::flags::SyncFlags;
use crate::handle::MappingHandle;
use crate::mmap::{MappedSlice, MappedSliceMut, Mapping};
use crate::utils::slice_range;

/// A window `[offset, offset+len)` over a mapping.
///
/// A view shares ownership of the [`MappingHandle`] but not authority over its lifetime:
/// once the mapping is unmapped the view reports a length of zero and every access fails
/// with `MmapError::UseAfterRelease`.
///
/// # Examples
///
/// ```no_run
/// use mmap_region::{MappingOptions, SyncFlags};
///
/// let map = MappingOptions::new(4096).map()?;
/// let header = map.view_range(0, 64)?;
/// header.write(0, b"MAGIC")?;
/// header.sync(SyncFlags::ASYNC)?;
///
/// map.unmap();
/// assert_eq!(header.len(), 0);
/// # Ok::<(), mmap_region::MmapError>(())
/// ```
#[derive(Clone, Debug)]
pub struct MappedView {
    handle: Arc<MappingHandle>,
    offset: usize,
    len: usize,
}

impl MappedView {
    /// Create a view, checking the window against the live mapping.
    ///
    /// # Errors
    ///
    /// Returns `MmapError::UseAfterRelease` if the mapping has been released.
    /// Returns `MmapError::OutOfBounds` if the window exceeds the mapping.
    pub(crate) fn new(handle: Arc<MappingHandle>, offset: usize, len: usize) -> Result<Self> {
        {
            let region = handle.read_region()?;
            slice_range(offset, len, region.len)?;
        }
        Ok(Self { handle, offset, len })
    }

    /// Effective length: the window length while mapped, zero after release.
    #[must_use]
    pub fn len(&self) -> usize {
        if self.handle.is_released() {
            0
        } else {
            self.len
        }
    }

    /// Whether the effective length is zero.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Offset of the view within the mapping.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Whether the underlying mapping is still live.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.handle.is_released()
    }

    /// The mapping this view belongs to.
    #[must_use]
    pub fn mapping(&self) -> Mapping {
        Mapping {
            handle: Arc::clone(&self.handle),
        }
    }

    // Translate a view-relative range into a mapping-relative offset.
    fn absolute(&self, offset: usize, len: usize) -> Result<usize> {
        slice_range(offset, len, self.len)?;
        Ok(self.offset + offset)
    }

    /// Read-only slice of the whole view.
    ///
    /// # Errors
    ///
    /// Returns `MmapError::UseAfterRelease` or `MmapError::ProtectionViolation`.
    pub fn as_slice(&self) -> Result<MappedSlice<'_>> {
        self.handle.slice(self.offset, self.len)
    }

    /// Mutable slice of the whole view.
    ///
    /// # Errors
    ///
    /// Returns `MmapError::UseAfterRelease` or `MmapError::ProtectionViolation`.
    pub fn as_slice_mut(&self) -> Result<MappedSliceMut<'_>> {
        self.handle.slice_mut(self.offset, self.len)
    }

    /// Read `buf.len()` bytes at a view-relative `offset`.
    ///
    /// # Errors
    ///
    /// Returns `MmapError::OutOfBounds` if the read leaves the view, plus the errors of
    /// [`Mapping::read_into`].
    pub fn read_into(&self, offset: usize, buf: &mut [u8]) -> Result<()> {
        let abs = self.absolute(offset, buf.len())?;
        self.handle.read_at(abs, buf)
    }

    /// Write `data` at a view-relative `offset`.
    ///
    /// # Errors
    ///
    /// Returns `MmapError::OutOfBounds` if the write leaves the view, plus the errors of
    /// [`Mapping::write_at`].
    pub fn write(&self, offset: usize, data: &[u8]) -> Result<()> {
        let abs = self.absolute(offset, data.len())?;
        self.handle.write_at(abs, data)
    }

    /// Copy the view into a new vector.
    ///
    /// # Errors
    ///
    /// Returns `MmapError::UseAfterRelease` or `MmapError::ProtectionViolation`.
    pub fn to_vec(&self) -> Result<Vec<u8>> {
        Ok(self.as_slice()?.to_vec())
    }

    /// Flush exactly this view's window.
    ///
    /// # Errors
    ///
    /// Returns `MmapError::UseAfterRelease` if the mapping has been released.
    pub fn sync(&self, flags: SyncFlags) -> Result<bool> {
        self.handle.sync(self.offset, Some(self.len), flags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::MmapError;
    use crate::mmap::MappingOptions;

    #[test]
    fn view_is_bounds_checked() {
        let map = MappingOptions::new(4096).map().expect("map");
        assert!(map.view_range(4000, 96).is_ok());
        assert!(matches!(
            map.view_range(4000, 97),
            Err(MmapError::OutOfBounds { .. })
        ));

        let view = map.view_range(100, 10).expect("view");
        assert!(matches!(
            view.write(8, b"abc"),
            Err(MmapError::OutOfBounds { offset: 8, len: 3, total: 10 })
        ));
    }

    #[test]
    fn view_writes_land_in_mapping() {
        let map = MappingOptions::new(4096).map().expect("map");
        let view = map.view_range(100, 10).expect("view");
        view.write(2, b"xyz").expect("write");
        let mut buf = [0u8; 3];
        map.read_into(102, &mut buf).expect("read");
        assert_eq!(&buf, b"xyz");
        assert_eq!(view.to_vec().expect("to_vec")[2..5], *b"xyz");
    }

    #[test]
    fn view_is_invalidated_by_unmap() {
        let map = MappingOptions::new(4096).map().expect("map");
        let view = map.view().expect("view");
        assert_eq!(view.len(), 4096);
        assert!(view.mapping().unmap());
        assert!(!view.is_valid());
        assert_eq!(view.len(), 0);
        assert!(view.is_empty());
        assert!(matches!(view.as_slice(), Err(MmapError::UseAfterRelease)));
        assert!(matches!(view.sync(SyncFlags::SYNC), Err(MmapError::UseAfterRelease)));
        assert!(matches!(map.view(), Err(MmapError::UseAfterRelease)));
    }

    #[test]
    fn len_does_not_block_while_slice_guard_is_held() {
        use std::sync::mpsc;
        use std::time::Duration;

        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let map = MappingOptions::new(4096).map().expect("map");
            let view = map.view_range(0, 64).expect("view");
            let mut guard = map.as_slice_mut(0, 4).expect("slice_mut");
            guard.as_mut().copy_from_slice(b"lock");
            let seen = (view.len(), view.is_valid(), map.len(), map.is_released(), format!("{map:?}"));
            drop(guard);
            tx.send(seen).expect("send");
        });
        let (view_len, valid, map_len, released, debug) =
            rx.recv_timeout(Duration::from_secs(5)).expect("len blocked on the held guard");
        assert_eq!(view_len, 64);
        assert!(valid);
        assert_eq!(map_len, 4096);
        assert!(!released);
        assert!(debug.contains("Mapped"));
    }
}
