//! The user-facing mapping object: create, byte access, sync, and unmap.

use std::fs::File;
use std::ops::{Deref, Range};
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::Arc;

use log::debug;
use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

use crate::errors::{MmapError, Result};
use crate::flags::{MapFlags, ProtFlags, SyncFlags, NO_FD};
use crate::handle::{MappingHandle, MappingState, Region, ReleaseOutcome};
use crate::sys;
use crate::utils::{is_page_aligned, page_size};
use crate::view::MappedView;

// Error message constants
const ERR_ZERO_LENGTH: &str = "length must be greater than zero";
const ERR_UNALIGNED_OFFSET: &str = "offset must be a multiple of the page size";
const ERR_OFFSET_RANGE: &str = "offset does not fit in off_t";
const ERR_FIXED: &str = "MAP_FIXED is not supported; the kernel must choose the address";

/// A live memory mapping of a file or of anonymous memory.
///
/// # Examples
///
/// ```no_run
/// use mmap_region::{Mapping, MapFlags, ProtFlags, SyncFlags, NO_FD};
///
/// let map = Mapping::create(4096, ProtFlags::READ | ProtFlags::WRITE, MapFlags::PRIVATE, NO_FD, 0)?;
/// map.write_at(0, b"hello")?;
///
/// let mut buf = [0u8; 5];
/// map.read_into(0, &mut buf)?;
/// assert_eq!(&buf, b"hello");
///
/// map.sync(0, None, SyncFlags::SYNC)?;
/// assert!(map.unmap());
/// # Ok::<(), mmap_region::MmapError>(())
/// ```
///
/// Cloning this struct is cheap; it clones an Arc to the owning [`MappingHandle`]. The range
/// is released by [`Mapping::unmap`], or when the last clone and the last [`MappedView`] drop.
#[derive(Clone)]
pub struct Mapping {
    pub(crate) handle: Arc<MappingHandle>,
}

impl std::fmt::Debug for Mapping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mapping")
            .field("len", &self.len())
            .field("state", &self.state())
            .field("prot", &self.protection())
            .field("flags", &self.flags())
            .finish()
    }
}

impl Mapping {
    /// Map `len` bytes of `fd` starting at `offset`, or anonymous memory when `fd` is [`NO_FD`].
    ///
    /// For anonymous mappings `MapFlags::ANONYMOUS` is added and `offset` is ignored.
    ///
    /// # Errors
    ///
    /// Returns `MmapError::InvalidArgument` if `len` is zero, `flags` carries `MAP_FIXED`, or a
    /// file offset is not page aligned.
    /// Returns `MmapError::MappingFailed` with the OS error if `mmap` fails.
    pub fn create(len: usize, prot: ProtFlags, flags: MapFlags, fd: RawFd, offset: u64) -> Result<Self> {
        if len == 0 {
            return Err(MmapError::InvalidArgument(ERR_ZERO_LENGTH));
        }
        if flags.bits() & libc::MAP_FIXED != 0 {
            return Err(MmapError::InvalidArgument(ERR_FIXED));
        }
        let mut flags = flags;
        let offset = if fd == NO_FD {
            flags |= MapFlags::ANONYMOUS;
            0
        } else {
            if !is_page_aligned(offset, page_size()) {
                return Err(MmapError::InvalidArgument(ERR_UNALIGNED_OFFSET));
            }
            libc::off_t::try_from(offset).map_err(|_| MmapError::InvalidArgument(ERR_OFFSET_RANGE))?
        };

        // SAFETY: len is non-zero and the kernel picks the address, so nothing existing is replaced.
        let addr = unsafe { sys::map(len, prot, flags, fd, offset) }.map_err(MmapError::MappingFailed)?;
        debug!("mapped {len} bytes at {addr:p} (fd={fd}, offset={offset}, prot={prot:?}, flags={flags:?})");

        // SAFETY: addr..addr+len was just returned by mmap and has no other owner.
        let handle = unsafe { MappingHandle::from_raw(addr, len, prot, flags) };
        Ok(Self {
            handle: Arc::new(handle),
        })
    }

    /// Start building a mapping of `len` bytes.
    #[must_use]
    pub fn options(len: usize) -> MappingOptions {
        MappingOptions::new(len)
    }

    /// The owning handle.
    #[must_use]
    pub fn handle(&self) -> &MappingHandle {
        &self.handle
    }

    /// Length in bytes; zero once released.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handle.len()
    }

    /// Whether the mapping is empty, i.e. released.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handle.is_empty()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> MappingState {
        self.handle.state()
    }

    /// Whether the mapping has been released.
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.handle.is_released()
    }

    /// Protection the mapping was created with.
    #[must_use]
    pub fn protection(&self) -> ProtFlags {
        self.handle.protection()
    }

    /// Flags the mapping was created with.
    #[must_use]
    pub fn flags(&self) -> MapFlags {
        self.handle.flags()
    }

    /// Base address of the mapping.
    ///
    /// The pointer is only valid until the mapping is released.
    ///
    /// # Errors
    ///
    /// Returns `MmapError::UseAfterRelease` if the mapping has been released.
    pub fn as_ptr(&self) -> Result<*const u8> {
        Ok(self.handle.read_region()?.addr.cast_const())
    }

    /// A view spanning the whole mapping.
    ///
    /// # Errors
    ///
    /// Returns `MmapError::UseAfterRelease` if the mapping has been released.
    pub fn view(&self) -> Result<MappedView> {
        MappedView::new(Arc::clone(&self.handle), 0, self.len())
    }

    /// A view over `[offset, offset+len)`.
    ///
    /// # Errors
    ///
    /// Returns `MmapError::OutOfBounds` if the range exceeds the mapping.
    /// Returns `MmapError::UseAfterRelease` if the mapping has been released.
    pub fn view_range(&self, offset: usize, len: usize) -> Result<MappedView> {
        MappedView::new(Arc::clone(&self.handle), offset, len)
    }

    /// Get a zero-copy read-only slice for `[offset, offset+len)`.
    /// The slice holds a shared lock that blocks writers and unmap until it is dropped.
    ///
    /// # Errors
    ///
    /// Returns `MmapError::UseAfterRelease`, `MmapError::ProtectionViolation` without `READ`,
    /// or `MmapError::OutOfBounds`.
    pub fn as_slice(&self, offset: usize, len: usize) -> Result<MappedSlice<'_>> {
        self.handle.slice(offset, len)
    }

    /// Get a zero-copy mutable slice for `[offset, offset+len)`.
    /// The slice holds the exclusive lock until it is dropped.
    ///
    /// # Errors
    ///
    /// Returns `MmapError::UseAfterRelease`, `MmapError::ProtectionViolation` without `WRITE`,
    /// or `MmapError::OutOfBounds`.
    pub fn as_slice_mut(&self, offset: usize, len: usize) -> Result<MappedSliceMut<'_>> {
        self.handle.slice_mut(offset, len)
    }

    /// Read bytes from the mapping into `buf` starting at `offset`.
    ///
    /// # Errors
    ///
    /// Same as [`Mapping::as_slice`].
    pub fn read_into(&self, offset: usize, buf: &mut [u8]) -> Result<()> {
        self.handle.read_at(offset, buf)
    }

    /// Copy `data` into the mapping at `offset`.
    ///
    /// # Errors
    ///
    /// Same as [`Mapping::as_slice_mut`].
    pub fn write_at(&self, offset: usize, data: &[u8]) -> Result<()> {
        self.handle.write_at(offset, data)
    }

    /// Flush `[offset, offset+len)` to the backing store.
    ///
    /// `len == None` flushes to the end; a longer `len` is capped at the end of the mapping.
    /// Returns `Ok(false)` when `offset` is past the end or `msync` fails, `Ok(true)` otherwise.
    ///
    /// # Errors
    ///
    /// Returns `MmapError::UseAfterRelease` if the mapping has been released.
    pub fn sync(&self, offset: usize, len: Option<usize>, flags: SyncFlags) -> Result<bool> {
        self.handle.sync(offset, len, flags)
    }

    /// Like [`Mapping::sync`], but reports an `msync` failure with its OS error.
    ///
    /// # Errors
    ///
    /// Returns `MmapError::UseAfterRelease` if released, `MmapError::SyncFailed` if `msync` fails.
    pub fn try_sync(&self, offset: usize, len: Option<usize>, flags: SyncFlags) -> Result<bool> {
        self.handle.try_sync(offset, len, flags)
    }

    /// Synchronously flush the whole mapping.
    ///
    /// # Errors
    ///
    /// Returns `MmapError::UseAfterRelease` if released, `MmapError::SyncFailed` if `msync` fails.
    pub fn flush(&self) -> Result<()> {
        self.handle.try_sync(0, None, SyncFlags::SYNC).map(|_| ())
    }

    /// Release the mapping. Returns `true` on success or if it was already released.
    ///
    /// A failed `munmap` returns `false` and leaves the mapping in place.
    pub fn unmap(&self) -> bool {
        self.try_unmap().is_ok()
    }

    /// Release the mapping and report what happened.
    ///
    /// # Errors
    ///
    /// Returns `MmapError::UnmapFailed` if `munmap` fails. The mapping stays valid in that case.
    pub fn try_unmap(&self) -> Result<ReleaseOutcome> {
        self.handle.release()
    }
}

/// Builder for [`Mapping`] with the same defaults as the raw `create` call.
///
/// ```no_run
/// use mmap_region::{MappingOptions, MapFlags, ProtFlags};
///
/// let file = std::fs::OpenOptions::new().read(true).write(true).open("data.bin")?;
/// let map = MappingOptions::new(8192)
///     .protection(ProtFlags::READ | ProtFlags::WRITE)
///     .flags(MapFlags::SHARED)
///     .file(&file)
///     .offset(4096)
///     .map()?;
/// # Ok::<(), mmap_region::MmapError>(())
/// ```
#[derive(Debug, Clone, Copy)]
pub struct MappingOptions {
    len: usize,
    prot: ProtFlags,
    flags: MapFlags,
    fd: RawFd,
    offset: u64,
}

impl MappingOptions {
    /// Private, read-write, anonymous, offset 0.
    #[must_use]
    pub fn new(len: usize) -> Self {
        Self {
            len,
            prot: ProtFlags::READ | ProtFlags::WRITE,
            flags: MapFlags::PRIVATE,
            fd: NO_FD,
            offset: 0,
        }
    }

    /// Set the page protection.
    #[must_use]
    pub fn protection(mut self, prot: ProtFlags) -> Self {
        self.prot = prot;
        self
    }

    /// Set the mapping flags.
    #[must_use]
    pub fn flags(mut self, flags: MapFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Map from a raw descriptor. [`NO_FD`] selects anonymous memory.
    #[must_use]
    pub fn fd(mut self, fd: RawFd) -> Self {
        self.fd = fd;
        self
    }

    /// Map from an open file. The caller keeps the file open for as long as it needs it.
    #[must_use]
    pub fn file(self, file: &File) -> Self {
        self.fd(file.as_raw_fd())
    }

    /// Byte offset into the file; must be page aligned.
    #[must_use]
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    /// Create the mapping.
    ///
    /// # Errors
    ///
    /// Returns errors from [`Mapping::create`].
    pub fn map(self) -> Result<Mapping> {
        Mapping::create(self.len, self.prot, self.flags, self.fd, self.offset)
    }
}

/// Read-only slice into a mapping. Holds a shared lock so the range cannot be
/// written or unmapped while the slice is alive.
pub struct MappedSlice<'a> {
    guard: RwLockReadGuard<'a, Region>,
    range: Range<usize>,
}

impl<'a> MappedSlice<'a> {
    pub(crate) fn new(guard: RwLockReadGuard<'a, Region>, range: Range<usize>) -> Self {
        Self { guard, range }
    }
}

impl Deref for MappedSlice<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        // SAFETY: the range was bounds-checked against the live region, which the guard keeps mapped.
        unsafe { std::slice::from_raw_parts(self.guard.addr.add(self.range.start), self.range.len()) }
    }
}

impl AsRef<[u8]> for MappedSlice<'_> {
    fn as_ref(&self) -> &[u8] {
        self
    }
}

/// Wrapper for a mutable slice that holds the exclusive lock,
/// ensuring exclusive access for the lifetime of the slice.
pub struct MappedSliceMut<'a> {
    guard: RwLockWriteGuard<'a, Region>,
    range: Range<usize>,
}

impl<'a> MappedSliceMut<'a> {
    pub(crate) fn new(guard: RwLockWriteGuard<'a, Region>, range: Range<usize>) -> Self {
        Self { guard, range }
    }

    /// Get the mutable slice.
    ///
    /// Note: This method is intentionally named `as_mut` for consistency,
    /// even though it conflicts with the standard trait naming.
    #[allow(clippy::should_implement_trait)]
    pub fn as_mut(&mut self) -> &mut [u8] {
        // SAFETY: the range was bounds-checked and the exclusive guard rules out other access.
        unsafe { std::slice::from_raw_parts_mut(self.guard.addr.add(self.range.start), self.range.len()) }
    }
}

impl Deref for MappedSliceMut<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        // SAFETY: as above.
        unsafe { std::slice::from_raw_parts(self.guard.addr.add(self.range.start), self.range.len()) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_length_is_rejected_before_mmap() {
        let err = Mapping::create(0, ProtFlags::READ, MapFlags::PRIVATE, NO_FD, 0).unwrap_err();
        assert!(matches!(err, MmapError::InvalidArgument(ERR_ZERO_LENGTH)));
    }

    #[test]
    fn fixed_placement_is_rejected() {
        let flags = MapFlags::PRIVATE | MapFlags::from_bits_retain(libc::MAP_FIXED);
        let err = Mapping::create(4096, ProtFlags::READ, flags, NO_FD, 0).unwrap_err();
        assert!(matches!(err, MmapError::InvalidArgument(ERR_FIXED)));
    }

    #[test]
    fn anonymous_flag_is_implied() {
        let map = MappingOptions::new(4096).map().expect("map");
        assert!(map.flags().is_anonymous());
        assert_eq!(map.len(), 4096);
        assert_eq!(map.state(), MappingState::Mapped);
    }

    #[test]
    fn anonymous_offset_is_ignored() {
        let map = MappingOptions::new(4096).offset(123).map().expect("map");
        assert_eq!(map.len(), 4096);
    }

    #[test]
    fn anonymous_memory_starts_zeroed() {
        let map = MappingOptions::new(4096).map().expect("map");
        let slice = map.as_slice(0, 4096).expect("slice");
        assert!(slice.iter().all(|&b| b == 0));
    }

    #[test]
    fn slice_mut_writes_are_visible() {
        let map = MappingOptions::new(4096).map().expect("map");
        {
            let mut guard = map.as_slice_mut(10, 6).expect("slice_mut");
            guard.as_mut().copy_from_slice(b"ABCDEF");
            assert_eq!(&*guard, b"ABCDEF");
        }
        let mut buf = [0u8; 6];
        map.read_into(10, &mut buf).expect("read_into");
        assert_eq!(&buf, b"ABCDEF");
    }

    #[test]
    fn as_ptr_tracks_release() {
        let map = MappingOptions::new(4096).map().expect("map");
        assert!(!map.as_ptr().expect("ptr").is_null());
        assert!(map.unmap());
        assert!(matches!(map.as_ptr(), Err(MmapError::UseAfterRelease)));
    }

    #[test]
    fn flush_on_anonymous_succeeds() {
        let map = MappingOptions::new(8192).map().expect("map");
        map.write_at(0, b"data").expect("write");
        map.flush().expect("flush");
    }
}
