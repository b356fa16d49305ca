//! Ownership and release state of a single OS mapping.
//!
//! A [`MappingHandle`] is the only thing allowed to call `munmap` on its range. The address and
//! length live behind one `RwLock`: byte reads and `msync` hold it shared, while writes and
//! release hold it exclusively. A length of zero means the range has been returned to the OS,
//! and every accessor checks for it before touching memory.
//!
//! The length is mirrored outside the lock so that `len` and `state` never block, even on a
//! thread that is itself holding a slice guard.

use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};

use log::{debug, trace, warn};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::errors::{MmapError, Result};
use crate::flags::{MapFlags, ProtFlags, SyncFlags};
use crate::mmap::{MappedSlice, MappedSliceMut};
use crate::sys;
use crate::utils::{align_down, clamp_range, page_size, slice_range};

const ERR_NOT_READABLE: &str = "mapping was created without PROT_READ";
const ERR_NOT_WRITABLE: &str = "mapping was created without PROT_WRITE";

/// Lifecycle state of a mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingState {
    /// The range is mapped and accessible.
    Mapped,
    /// The range has been returned to the OS.
    Released,
}

/// What a release call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// This call performed the `munmap`.
    Unmapped,
    /// The mapping was already released; no OS call was made.
    AlreadyReleased,
}

pub(crate) struct Region {
    pub(crate) addr: *mut u8,
    // Zero once released
    pub(crate) len: usize,
}

impl Region {
    fn is_released(&self) -> bool {
        self.len == 0
    }
}

/// Exclusive owner of one mapped address range.
pub struct MappingHandle {
    region: RwLock<Region>,
    // Mirror of region.len, only stored to while the write lock is held
    cached_len: AtomicUsize,
    prot: ProtFlags,
    flags: MapFlags,
}

// SAFETY: the range is owned by this handle alone and is only dereferenced while `region`
// is locked, so it may be shared and moved across threads.
unsafe impl Send for MappingHandle {}
// SAFETY: see above.
unsafe impl Sync for MappingHandle {}

impl std::fmt::Debug for MappingHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappingHandle")
            .field("len", &self.len())
            .field("prot", &self.prot)
            .field("flags", &self.flags)
            .finish()
    }
}

impl MappingHandle {
    /// Take ownership of a range returned by `mmap`.
    ///
    /// # Safety
    ///
    /// `addr..addr+len` must be a live mapping with `len > 0` that nothing else will unmap.
    pub(crate) unsafe fn from_raw(addr: *mut u8, len: usize, prot: ProtFlags, flags: MapFlags) -> Self {
        Self {
            region: RwLock::new(Region { addr, len }),
            cached_len: AtomicUsize::new(len),
            prot,
            flags,
        }
    }

    /// Current length in bytes; zero once released.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cached_len.load(Ordering::Acquire)
    }

    /// Whether the length is zero, which only happens after release.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> MappingState {
        if self.len() == 0 {
            MappingState::Released
        } else {
            MappingState::Mapped
        }
    }

    /// Whether the range has been returned to the OS.
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.state() == MappingState::Released
    }

    /// Protection the mapping was created with.
    #[must_use]
    pub fn protection(&self) -> ProtFlags {
        self.prot
    }

    /// Flags the mapping was created with, including any implied `ANONYMOUS`.
    #[must_use]
    pub fn flags(&self) -> MapFlags {
        self.flags
    }

    /// Shared access to a live region.
    ///
    /// # Errors
    ///
    /// Returns `MmapError::UseAfterRelease` if the mapping has been released.
    pub(crate) fn read_region(&self) -> Result<RwLockReadGuard<'_, Region>> {
        let region = self.region.read();
        if region.is_released() {
            return Err(MmapError::UseAfterRelease);
        }
        Ok(region)
    }

    /// Exclusive access to a live region.
    ///
    /// # Errors
    ///
    /// Returns `MmapError::UseAfterRelease` if the mapping has been released.
    pub(crate) fn write_region(&self) -> Result<RwLockWriteGuard<'_, Region>> {
        let region = self.region.write();
        if region.is_released() {
            return Err(MmapError::UseAfterRelease);
        }
        Ok(region)
    }

    fn require(&self, needed: ProtFlags, msg: &'static str) -> Result<()> {
        if self.prot.contains(needed) {
            Ok(())
        } else {
            Err(MmapError::ProtectionViolation(msg))
        }
    }

    pub(crate) fn slice(&self, offset: usize, len: usize) -> Result<MappedSlice<'_>> {
        let region = self.read_region()?;
        self.require(ProtFlags::READ, ERR_NOT_READABLE)?;
        let (start, end) = slice_range(offset, len, region.len)?;
        Ok(MappedSlice::new(region, start..end))
    }

    pub(crate) fn slice_mut(&self, offset: usize, len: usize) -> Result<MappedSliceMut<'_>> {
        let region = self.write_region()?;
        self.require(ProtFlags::WRITE, ERR_NOT_WRITABLE)?;
        let (start, end) = slice_range(offset, len, region.len)?;
        Ok(MappedSliceMut::new(region, start..end))
    }

    pub(crate) fn read_at(&self, offset: usize, buf: &mut [u8]) -> Result<()> {
        let slice = self.slice(offset, buf.len())?;
        buf.copy_from_slice(&slice);
        Ok(())
    }

    pub(crate) fn write_at(&self, offset: usize, data: &[u8]) -> Result<()> {
        let mut slice = self.slice_mut(offset, data.len())?;
        slice.as_mut().copy_from_slice(data);
        Ok(())
    }

    /// Flush `[offset, offset+len)` clamped to the mapping.
    ///
    /// `Ok(false)` when the clamped window is empty; no OS call is made in that case.
    ///
    /// # Errors
    ///
    /// Returns `MmapError::UseAfterRelease` if released, `MmapError::SyncFailed` if `msync` fails.
    pub(crate) fn try_sync(&self, offset: usize, len: Option<usize>, flags: SyncFlags) -> Result<bool> {
        let region = self.read_region()?;
        let Some(window) = clamp_range(offset, len, region.len) else {
            trace!("sync skipped: offset={offset} len={len:?} total={}", region.len);
            return Ok(false);
        };
        // msync wants a page-aligned address; the base itself always is
        let start = align_down(window.start, page_size());
        // SAFETY: start..window.end lies inside the live mapping, which the read lock keeps mapped.
        unsafe { sys::sync(region.addr.add(start), window.end - start, flags) }
            .map_err(MmapError::SyncFailed)?;
        trace!("synced [{}, {}) flags={flags:?}", window.start, window.end);
        Ok(true)
    }

    pub(crate) fn sync(&self, offset: usize, len: Option<usize>, flags: SyncFlags) -> Result<bool> {
        match self.try_sync(offset, len, flags) {
            Err(MmapError::SyncFailed(e)) => {
                debug!("msync failed: {e}");
                Ok(false)
            }
            other => other,
        }
    }

    /// Return the range to the OS.
    ///
    /// The state check and `munmap` run under the exclusive lock, so concurrent callers see
    /// exactly one `Unmapped`. On failure the handle stays `Mapped` and may be released again.
    ///
    /// # Errors
    ///
    /// Returns `MmapError::UnmapFailed` if `munmap` fails.
    pub fn release(&self) -> Result<ReleaseOutcome> {
        let mut region = self.region.write();
        if region.is_released() {
            return Ok(ReleaseOutcome::AlreadyReleased);
        }
        // SAFETY: the exclusive lock rules out any outstanding slice into the range.
        unsafe { sys::unmap(region.addr, region.len) }.map_err(|e| {
            warn!("munmap of {} bytes at {:p} failed: {e}", region.len, region.addr);
            MmapError::UnmapFailed(e)
        })?;
        debug!("unmapped {} bytes at {:p}", region.len, region.addr);
        region.len = 0;
        region.addr = ptr::null_mut();
        self.cached_len.store(0, Ordering::Release);
        Ok(ReleaseOutcome::Unmapped)
    }
}

impl Drop for MappingHandle {
    fn drop(&mut self) {
        let region = self.region.get_mut();
        if region.is_released() {
            return;
        }
        // SAFETY: no other owner exists and the length is non-zero, so the range is still mapped.
        match unsafe { sys::unmap(region.addr, region.len) } {
            Ok(()) => {
                debug!("released {} bytes at {:p} on drop", region.len, region.addr);
                region.len = 0;
                *self.cached_len.get_mut() = 0;
            }
            Err(e) => warn!(
                "munmap of {} bytes at {:p} failed on drop, leaking the range: {e}",
                region.len, region.addr
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::NO_FD;
    use crate::mmap::Mapping;

    fn anon(len: usize) -> Mapping {
        Mapping::create(len, ProtFlags::READ | ProtFlags::WRITE, MapFlags::PRIVATE, NO_FD, 0)
            .expect("anonymous map")
    }

    #[test]
    fn release_is_idempotent() {
        let m = anon(4096);
        let handle = m.handle();
        assert_eq!(handle.state(), MappingState::Mapped);
        assert_eq!(handle.release().expect("first"), ReleaseOutcome::Unmapped);
        assert_eq!(handle.len(), 0);
        assert!(handle.is_empty());
        assert_eq!(handle.release().expect("second"), ReleaseOutcome::AlreadyReleased);
        assert_eq!(handle.state(), MappingState::Released);
    }

    #[test]
    fn released_region_rejects_access() {
        let m = anon(4096);
        m.handle().release().expect("release");
        assert!(matches!(m.handle().read_region(), Err(MmapError::UseAfterRelease)));
        assert!(matches!(m.handle().write_region(), Err(MmapError::UseAfterRelease)));
        assert!(matches!(
            m.handle().try_sync(0, None, SyncFlags::SYNC),
            Err(MmapError::UseAfterRelease)
        ));
    }

    #[test]
    fn protection_is_enforced() {
        let m = Mapping::create(4096, ProtFlags::READ, MapFlags::PRIVATE, NO_FD, 0).expect("ro map");
        assert!(m.handle().slice(0, 16).is_ok());
        assert!(matches!(
            m.handle().write_at(0, b"x"),
            Err(MmapError::ProtectionViolation(_))
        ));

        let none = Mapping::create(4096, ProtFlags::NONE, MapFlags::PRIVATE, NO_FD, 0).expect("none map");
        let mut buf = [0u8; 1];
        assert!(matches!(
            none.handle().read_at(0, &mut buf),
            Err(MmapError::ProtectionViolation(_))
        ));
    }

    #[test]
    fn sync_of_unaligned_window_succeeds() {
        let ps = page_size();
        let m = anon(ps * 2);
        assert!(m.handle().try_sync(ps + 17, Some(5), SyncFlags::SYNC).expect("sync"));
    }

    #[test]
    fn failed_munmap_leaves_handle_mapped() {
        let ps = page_size();
        let flags = MapFlags::PRIVATE | MapFlags::ANONYMOUS;
        let prot = ProtFlags::READ | ProtFlags::WRITE;
        // SAFETY: fresh anonymous mapping of two pages.
        let base = unsafe { sys::map(ps * 2, prot, flags, NO_FD, 0) }.expect("raw map");

        // An unaligned base makes munmap fail with EINVAL and leaves the pages mapped.
        // SAFETY: the handle is pointed back at the real range before it drops.
        let handle = unsafe { MappingHandle::from_raw(base.add(1), ps, prot, flags) };
        match handle.release() {
            Err(err @ MmapError::UnmapFailed(_)) => assert_eq!(err.raw_os_error(), Some(libc::EINVAL)),
            other => panic!("expected UnmapFailed, got {other:?}"),
        }
        assert_eq!(handle.state(), MappingState::Mapped);
        assert_eq!(handle.len(), ps);
        assert!(handle.read_region().is_ok());

        {
            let mut region = handle.region.write();
            region.addr = base;
            region.len = ps * 2;
            handle.cached_len.store(ps * 2, Ordering::Release);
        }
        assert_eq!(handle.release().expect("retry"), ReleaseOutcome::Unmapped);
        assert_eq!(handle.state(), MappingState::Released);
    }
}
