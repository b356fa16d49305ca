//! High-level API for common mapping shapes.
//!
//! Provides convenience functions that wrap [`Mapping::create`].

use std::fs::{File, OpenOptions};
use std::os::unix::io::AsRawFd;
use std::path::Path;

use crate::errors::{MmapError, Result};
use crate::flags::{MapFlags, ProtFlags, NO_FD};
use crate::mmap::Mapping;

/// Map `len` bytes of private, zero-filled anonymous memory.
///
/// # Errors
///
/// Returns errors from [`Mapping::create`].
pub fn map_anonymous(len: usize, prot: ProtFlags) -> Result<Mapping> {
    Mapping::create(len, prot, MapFlags::PRIVATE, NO_FD, 0)
}

/// Map the first `len` bytes of an open file.
///
/// # Errors
///
/// Returns errors from [`Mapping::create`].
pub fn map_file(file: &File, len: usize, prot: ProtFlags, flags: MapFlags) -> Result<Mapping> {
    Mapping::create(len, prot, flags, file.as_raw_fd(), 0)
}

/// Create (truncating if it exists) a file of `len` bytes and map it shared read-write.
///
/// The mapping holds its own reference to the file, so the descriptor is closed on return.
///
/// # Errors
///
/// Returns `MmapError::InvalidArgument` if `len` is zero.
/// Returns `MmapError::Io` if the file cannot be created or sized.
/// Returns `MmapError::MappingFailed` if `mmap` fails.
pub fn create_file_mapping<P: AsRef<Path>>(path: P, len: usize) -> Result<Mapping> {
    if len == 0 {
        return Err(MmapError::InvalidArgument("length must be greater than zero"));
    }
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(true)
        .open(path.as_ref())?;
    file.set_len(len as u64)?;
    map_file(&file, len, ProtFlags::READ | ProtFlags::WRITE, MapFlags::SHARED)
}

#[cfg(feature = "async")]
pub mod r#async {
    //! Async helpers (Tokio) that keep blocking filesystem and `msync` work off the runtime threads.
    use std::path::Path;

    use tokio::fs as tfs;

    use crate::errors::{MmapError, Result};
    use crate::flags::{MapFlags, ProtFlags, SyncFlags};
    use crate::mmap::Mapping;

    /// Create and size a file asynchronously, then map it shared read-write.
    ///
    /// # Errors
    ///
    /// Returns errors from async file operations or mapping.
    pub async fn create_file_mapping_async<P: AsRef<Path>>(path: P, len: usize) -> Result<Mapping> {
        if len == 0 {
            return Err(MmapError::InvalidArgument("length must be greater than zero"));
        }
        let file = tfs::OpenOptions::new()
            .create(true)
            .write(true)
            .read(true)
            .truncate(true)
            .open(path.as_ref())
            .await?;
        file.set_len(len as u64).await?;
        let file = file.into_std().await;
        super::map_file(&file, len, ProtFlags::READ | ProtFlags::WRITE, MapFlags::SHARED)
    }

    /// Run [`Mapping::sync`] on the blocking pool.
    ///
    /// # Errors
    ///
    /// Returns errors from [`Mapping::sync`], or `MmapError::Io` if the blocking task panicked.
    pub async fn sync_async(
        mapping: &Mapping,
        offset: usize,
        len: Option<usize>,
        flags: SyncFlags,
    ) -> Result<bool> {
        let mapping = mapping.clone();
        tokio::task::spawn_blocking(move || mapping.sync(offset, len, flags))
            .await
            .map_err(|e| MmapError::Io(std::io::Error::other(e)))?
    }
}
