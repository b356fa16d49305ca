//! Protection, mapping, and sync flag sets passed through to the OS.
//!
//! The values are the platform's own `PROT_*`, `MAP_*` and `MS_*` constants. Bits the crate
//! does not name can still be carried with `from_bits_retain`.

use std::os::unix::io::RawFd;

use bitflags::bitflags;

/// Descriptor sentinel requesting an anonymous mapping with no backing file.
pub const NO_FD: RawFd = -1;

bitflags! {
    /// Page protection for a mapping.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ProtFlags: i32 {
        /// Pages may not be accessed.
        const NONE = libc::PROT_NONE;
        /// Pages may be read.
        const READ = libc::PROT_READ;
        /// Pages may be written.
        const WRITE = libc::PROT_WRITE;
        /// Pages may be executed.
        const EXEC = libc::PROT_EXEC;
    }
}

cfg_if::cfg_if! {
    if #[cfg(any(target_os = "linux", target_os = "android"))] {
        const MAP_ANONYMOUS_BIT: i32 = libc::MAP_ANONYMOUS;
    } else {
        const MAP_ANONYMOUS_BIT: i32 = libc::MAP_ANON;
    }
}

bitflags! {
    /// Sharing semantics and OS modifiers for a mapping.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MapFlags: i32 {
        /// Writes are visible to other mappers and carried through to the file.
        const SHARED = libc::MAP_SHARED;
        /// Copy-on-write; writes stay local to this mapping.
        const PRIVATE = libc::MAP_PRIVATE;
        /// Not backed by any file. Added automatically when the descriptor is [`NO_FD`].
        const ANONYMOUS = MAP_ANONYMOUS_BIT;
        /// Do not reserve swap space.
        #[cfg(any(target_os = "linux", target_os = "android"))]
        const NORESERVE = libc::MAP_NORESERVE;
        /// Prefault page tables.
        #[cfg(any(target_os = "linux", target_os = "android"))]
        const POPULATE = libc::MAP_POPULATE;
        /// Back the mapping with huge pages.
        #[cfg(any(target_os = "linux", target_os = "android"))]
        const HUGETLB = libc::MAP_HUGETLB;
    }
}

bitflags! {
    /// Flush behavior for `msync`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SyncFlags: i32 {
        /// Schedule the write-back and return immediately.
        const ASYNC = libc::MS_ASYNC;
        /// Wait for the write-back to complete.
        const SYNC = libc::MS_SYNC;
        /// Invalidate other mappings of the same file.
        const INVALIDATE = libc::MS_INVALIDATE;
    }
}

impl Default for SyncFlags {
    fn default() -> Self {
        Self::SYNC
    }
}

impl MapFlags {
    /// Whether the mapping has no backing file.
    #[must_use]
    pub fn is_anonymous(self) -> bool {
        self.contains(Self::ANONYMOUS)
    }
}
