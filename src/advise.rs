//! Memory advise operations for optimizing OS behavior.

use crate::errors::{MmapError, Result};
use crate::mmap::Mapping;
use crate::utils::{align_down, page_size, slice_range};

/// Memory access pattern advice for the OS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MmapAdvice {
    /// Normal access pattern (default).
    Normal,
    /// Random access pattern.
    Random,
    /// Sequential access pattern.
    Sequential,
    /// Will need this range soon.
    WillNeed,
    /// Won't need this range soon. Private anonymous pages read back as zero afterwards.
    DontNeed,
}

impl MmapAdvice {
    fn as_raw(self) -> libc::c_int {
        match self {
            Self::Normal => libc::MADV_NORMAL,
            Self::Random => libc::MADV_RANDOM,
            Self::Sequential => libc::MADV_SEQUENTIAL,
            Self::WillNeed => libc::MADV_WILLNEED,
            Self::DontNeed => libc::MADV_DONTNEED,
        }
    }
}

impl Mapping {
    /// Advise the OS about expected access patterns for a memory range.
    ///
    /// The start of the range is rounded down to a page boundary. The advice is a hint
    /// and may be ignored by the OS.
    ///
    /// # Errors
    ///
    /// Returns `MmapError::UseAfterRelease` if the mapping has been released.
    /// Returns `MmapError::OutOfBounds` if the range exceeds the mapping.
    /// Returns `MmapError::AdviceFailed` if `madvise` fails.
    pub fn advise(&self, offset: usize, len: usize, advice: MmapAdvice) -> Result<()> {
        let region = self.handle.read_region()?;
        let (start, end) = slice_range(offset, len, region.len)?;
        if start == end {
            return Ok(());
        }
        let start = align_down(start, page_size());

        // SAFETY: start..end lies inside the live mapping, which the read lock keeps mapped.
        let result = unsafe {
            libc::madvise(
                region.addr.add(start).cast::<libc::c_void>(),
                end - start,
                advice.as_raw(),
            )
        };

        if result != 0 {
            let err = std::io::Error::last_os_error();
            return Err(MmapError::AdviceFailed(format!("madvise failed: {err}")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::{MapFlags, ProtFlags, NO_FD};

    #[test]
    fn test_advise_operations() {
        let map = Mapping::create(8192, ProtFlags::READ | ProtFlags::WRITE, MapFlags::PRIVATE, NO_FD, 0)
            .expect("map");

        map.advise(0, 4096, MmapAdvice::Sequential).expect("sequential advice");
        map.advise(4096, 4096, MmapAdvice::Random).expect("random advice");
        map.advise(0, 8192, MmapAdvice::Normal).expect("normal advice");
        map.advise(0, 1024, MmapAdvice::WillNeed).expect("will need advice");
        map.advise(100, 10, MmapAdvice::Normal).expect("unaligned advice");

        // Test empty range (should be no-op)
        map.advise(0, 0, MmapAdvice::Normal).expect("empty range");

        // Test out of bounds
        assert!(map.advise(8192, 1, MmapAdvice::Normal).is_err());
        assert!(map.advise(0, 8193, MmapAdvice::Normal).is_err());
        assert!(matches!(
            map.advise(usize::MAX, 0, MmapAdvice::Normal),
            Err(MmapError::OutOfBounds { .. })
        ));
        map.advise(8192, 0, MmapAdvice::Normal).expect("empty range at end");
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn test_dont_need_discards_private_pages() {
        let map = Mapping::create(4096, ProtFlags::READ | ProtFlags::WRITE, MapFlags::PRIVATE, NO_FD, 0)
            .expect("map");
        map.write_at(0, b"gone").expect("write");
        map.advise(0, 4096, MmapAdvice::DontNeed).expect("dont need advice");
        let mut buf = [0xFFu8; 4];
        map.read_into(0, &mut buf).expect("read");
        assert_eq!(buf, [0u8; 4]);
    }

    #[test]
    fn test_advise_after_unmap() {
        let map = Mapping::create(4096, ProtFlags::READ, MapFlags::PRIVATE, NO_FD, 0).expect("map");
        assert!(map.unmap());
        assert!(matches!(
            map.advise(0, 4096, MmapAdvice::Normal),
            Err(MmapError::UseAfterRelease)
        ));
    }
}
