//! # mmap-region: safe lifecycle management for raw memory mappings
//!
//! This crate wraps `mmap`, `msync` and `munmap` so that a mapping is released exactly once
//! and no view can read or write a range after it has been returned to the OS.
//!
//! ## Features
//!
//! - **Raw flags**: any protection, sharing mode and descriptor the platform accepts
//! - **Exactly-once release**: explicit [`Mapping::unmap`] and `Drop` share one idempotent path
//! - **Race-free unmap**: the release check and `munmap` run under one exclusive lock
//! - **Invalidated views**: [`MappedView`]s report zero length after release
//! - **Clamped sync**: flush any sub-range without leaving the mapping
//!
//! ## Quick Start
//!
//! ```no_run
//! use mmap_region::{create_file_mapping, SyncFlags};
//!
//! // Create a 1MB file and map it shared read-write
//! let map = create_file_mapping("data.bin", 1024 * 1024)?;
//!
//! // Write data at offset 100
//! map.write_at(100, b"Hello, mmap!")?;
//!
//! // Ensure data is persisted
//! map.sync(0, None, SyncFlags::SYNC)?;
//!
//! // Release; later access fails with UseAfterRelease
//! assert!(map.unmap());
//! # Ok::<(), mmap_region::MmapError>(())
//! ```
//!
//! ## Modules
//!
//! - [`errors`]: Error types for all mapping operations
//! - [`flags`]: Protection, mapping and sync flags
//! - [`utils`]: Page size, alignment and bounds helpers
//! - [`handle`]: The owning [`MappingHandle`] and its state machine
//! - [`mmap`]: [`Mapping`], its builder and slice guards
//! - [`view`]: [`MappedView`] windows
//! - [`manager`]: High-level convenience functions
//!
//! ## Feature Flags
//!
//! - `advise` (default): `madvise` hints
//! - `locking`: `mlock`/`munlock`
//! - `async`: Tokio-based helpers

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![deny(missing_docs)]

#[cfg(not(unix))]
compile_error!("mmap-region requires a POSIX platform (mmap/msync/munmap)");

pub mod errors;
pub mod flags;
pub mod handle;
pub mod manager;
pub mod mmap;
pub mod utils;
pub mod view;

mod sys;

#[cfg(feature = "advise")]
pub mod advise;

#[cfg(feature = "locking")]
pub mod lock;

pub use errors::{MmapError, Result};
pub use flags::{MapFlags, ProtFlags, SyncFlags, NO_FD};
pub use handle::{MappingHandle, MappingState, ReleaseOutcome};
pub use manager::{create_file_mapping, map_anonymous, map_file};
pub use mmap::{MappedSlice, MappedSliceMut, Mapping, MappingOptions};
pub use utils::page_size;
pub use view::MappedView;

#[cfg(feature = "advise")]
pub use advise::MmapAdvice;
