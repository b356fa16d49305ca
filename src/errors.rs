//! Crate-specific error types for mmap-region.

use std::io;
use thiserror::Error;

/// Result alias for mmap-region operations.
pub type Result<T> = std::result::Result<T, MmapError>;

/// Error type covering argument validation, OS mapping calls, bounds, and lifecycle misuse.
#[derive(Debug, Error)]
pub enum MmapError {
    /// Wrapper for `std::io::Error` raised outside the mapping syscalls (opening or sizing files).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Malformed call-site input, detected before any OS call.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// The OS rejected the `mmap` call.
    #[error("mmap failed: {0}")]
    MappingFailed(#[source] io::Error),

    /// The OS rejected the `munmap` call. The mapping is still in place.
    #[error("munmap failed: {0}")]
    UnmapFailed(#[source] io::Error),

    /// The OS rejected the `msync` call.
    #[error("msync failed: {0}")]
    SyncFailed(#[source] io::Error),

    /// Operation attempted on a mapping that has already been released.
    #[error("mapping has already been released")]
    UseAfterRelease,

    /// Error when a requested offset/length pair is out of bounds.
    #[error("range out of bounds: offset={offset}, len={len}, total={total}")]
    OutOfBounds {
        /// Requested offset.
        offset: u64,
        /// Requested length.
        len: u64,
        /// Total length of the mapping.
        total: u64,
    },

    /// Access that the mapping's protection flags do not permit.
    #[error("protection violation: {0}")]
    ProtectionViolation(&'static str),

    /// Error when `madvise` fails.
    #[cfg(feature = "advise")]
    #[error("advice failed: {0}")]
    AdviceFailed(String),

    /// Error when `mlock` fails.
    #[cfg(feature = "locking")]
    #[error("lock failed: {0}")]
    LockFailed(String),

    /// Error when `munlock` fails.
    #[cfg(feature = "locking")]
    #[error("unlock failed: {0}")]
    UnlockFailed(String),
}

impl MmapError {
    /// The OS error code carried by this error, if any.
    #[must_use]
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::Io(e) | Self::MappingFailed(e) | Self::UnmapFailed(e) | Self::SyncFailed(e) => {
                e.raw_os_error()
            }
            _ => None,
        }
    }
}
