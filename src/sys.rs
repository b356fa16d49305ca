//! Thin wrappers over the POSIX mapping syscalls.
//!
//! Each wrapper turns the C error convention into an `io::Result` carrying `errno`.
//! Callers own every pointer/length invariant.

use std::io;
use std::os::unix::io::RawFd;
use std::ptr;

use crate::flags::{MapFlags, ProtFlags, SyncFlags};

/// `mmap(NULL, len, prot, flags, fd, offset)`.
///
/// # Safety
///
/// `len` must be non-zero and `flags` must not request a fixed placement, which could replace
/// memory owned elsewhere.
pub(crate) unsafe fn map(
    len: usize,
    prot: ProtFlags,
    flags: MapFlags,
    fd: RawFd,
    offset: libc::off_t,
) -> io::Result<*mut u8> {
    let addr = libc::mmap(ptr::null_mut(), len, prot.bits(), flags.bits(), fd, offset);
    if addr == libc::MAP_FAILED {
        return Err(io::Error::last_os_error());
    }
    Ok(addr.cast::<u8>())
}

/// `munmap(addr, len)`.
///
/// # Safety
///
/// `addr..addr+len` must be a live mapping owned by the caller, and nothing may reference it
/// after a successful return.
pub(crate) unsafe fn unmap(addr: *mut u8, len: usize) -> io::Result<()> {
    if libc::munmap(addr.cast::<libc::c_void>(), len) != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// `msync(addr, len, flags)`. `addr` must be page aligned.
///
/// # Safety
///
/// `addr..addr+len` must lie inside a live mapping.
pub(crate) unsafe fn sync(addr: *mut u8, len: usize, flags: SyncFlags) -> io::Result<()> {
    if libc::msync(addr.cast::<libc::c_void>(), len, flags.bits()) != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
