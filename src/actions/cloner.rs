//! Copy-on-write extent sharing primitives.
//!
//! # Overview
//!
//! [`ExtentCloner`] is the only filesystem capability the consolidation stage
//! needs beyond open/read/stat: "make `dest` share the extents of `source`".
//! One implementation exists per platform:
//!
//! - **Linux**: [`FicloneCloner`] issues the `FICLONE` ioctl (btrfs, XFS with
//!   reflink, bcachefs, OCFS2, ...). Extent sharing is probed with
//!   `FS_IOC_FIEMAP` so an already consolidated pair is not cloned again.
//! - **Everything else**: [`UnsupportedCloner`] refuses every request. There is
//!   no fallback to hard links; a hard link would merge the files' metadata
//!   identities, which consolidation must never do.
//!
//! The clone itself is atomic at the filesystem level: either `dest` now
//! references `source`'s extents or it is left untouched.

use std::fs::File;
use std::io;
use std::sync::Arc;

/// Filesystem capability for extent sharing between two open files.
pub trait ExtentCloner: Send + Sync {
    /// Short name for logs and reports.
    fn name(&self) -> &'static str;

    /// Replace `dest`'s data with a copy-on-write reference to `source`'s extents.
    ///
    /// `source` must be open for reading and `dest` for writing.
    fn clone_extents(&self, source: &File, dest: &File) -> io::Result<()>;

    /// Report whether `a` and `b` already reference the same physical extents.
    ///
    /// Implementations that cannot tell return `Ok(false)`.
    fn shares_extents(&self, _a: &File, _b: &File) -> io::Result<bool> {
        Ok(false)
    }
}

/// The extent cloner for the platform this binary was built for.
#[must_use]
pub fn platform_cloner() -> Arc<dyn ExtentCloner> {
    #[cfg(target_os = "linux")]
    {
        Arc::new(FicloneCloner)
    }
    #[cfg(not(target_os = "linux"))]
    {
        Arc::new(UnsupportedCloner)
    }
}

/// Cloner for platforms without a usable copy-on-write primitive.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedCloner;

impl ExtentCloner for UnsupportedCloner {
    fn name(&self) -> &'static str {
        "unsupported"
    }

    fn clone_extents(&self, _source: &File, _dest: &File) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "extent cloning is not supported on this platform",
        ))
    }
}

#[cfg(target_os = "linux")]
pub use linux::FicloneCloner;

#[cfg(target_os = "linux")]
mod linux {
    use std::fs::File;
    use std::io;
    use std::os::unix::io::AsRawFd;

    use super::ExtentCloner;

    // _IOW(0x94, 9, int); the write direction bit differs on these architectures
    #[cfg(not(any(
        target_arch = "powerpc",
        target_arch = "powerpc64",
        target_arch = "mips",
        target_arch = "mips64",
        target_arch = "sparc64"
    )))]
    const FICLONE: u32 = 0x4004_9409;
    #[cfg(any(
        target_arch = "powerpc",
        target_arch = "powerpc64",
        target_arch = "mips",
        target_arch = "mips64",
        target_arch = "sparc64"
    ))]
    const FICLONE: u32 = 0x8004_9409;

    // _IOWR('f', 11, struct fiemap)
    const FS_IOC_FIEMAP: u32 = 0xC020_660B;

    const FIEMAP_FLAG_SYNC: u32 = 0x0000_0001;
    const FIEMAP_EXTENT_LAST: u32 = 0x0000_0001;
    const FIEMAP_EXTENT_UNKNOWN: u32 = 0x0000_0002;
    const FIEMAP_EXTENT_DELALLOC: u32 = 0x0000_0004;
    const FIEMAP_EXTENT_ENCODED: u32 = 0x0000_0008;
    const FIEMAP_EXTENT_DATA_INLINE: u32 = 0x0000_0200;
    const FIEMAP_EXTENT_SHARED: u32 = 0x0000_2000;

    const UNCOMPARABLE: u32 = FIEMAP_EXTENT_UNKNOWN
        | FIEMAP_EXTENT_DELALLOC
        | FIEMAP_EXTENT_ENCODED
        | FIEMAP_EXTENT_DATA_INLINE;

    const EXTENT_BATCH: usize = 64;

    #[repr(C)]
    #[derive(Debug, Clone, Copy, Default)]
    struct FiemapExtent {
        fe_logical: u64,
        fe_physical: u64,
        fe_length: u64,
        fe_reserved64: [u64; 2],
        fe_flags: u32,
        fe_reserved: [u32; 3],
    }

    #[repr(C)]
    #[derive(Debug)]
    struct Fiemap {
        fm_start: u64,
        fm_length: u64,
        fm_flags: u32,
        fm_mapped_extents: u32,
        fm_extent_count: u32,
        fm_reserved: u32,
        fm_extents: [FiemapExtent; EXTENT_BATCH],
    }

    impl Fiemap {
        fn request(start: u64) -> Self {
            Self {
                fm_start: start,
                fm_length: u64::MAX - start,
                fm_flags: FIEMAP_FLAG_SYNC,
                fm_mapped_extents: 0,
                fm_extent_count: EXTENT_BATCH as u32,
                fm_reserved: 0,
                fm_extents: [FiemapExtent::default(); EXTENT_BATCH],
            }
        }
    }

    /// A physical extent as (logical offset, physical offset, length).
    type Extent = (u64, u64, u64);

    /// Linux `FICLONE` ioctl cloner.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct FicloneCloner;

    impl ExtentCloner for FicloneCloner {
        fn name(&self) -> &'static str {
            "ficlone"
        }

        fn clone_extents(&self, source: &File, dest: &File) -> io::Result<()> {
            // SAFETY: both descriptors are owned by live `File`s for the whole call,
            // and FICLONE takes the source descriptor by value.
            let ret = unsafe {
                libc::ioctl(dest.as_raw_fd(), FICLONE as _, source.as_raw_fd())
            };
            if ret == -1 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        }

        fn shares_extents(&self, a: &File, b: &File) -> io::Result<bool> {
            let Some(left) = shared_extent_map(a)? else {
                return Ok(false);
            };
            let Some(right) = shared_extent_map(b)? else {
                return Ok(false);
            };
            Ok(!left.is_empty() && left == right)
        }
    }

    /// Read the extent map of `file`.
    ///
    /// Returns `None` when any extent is not marked shared or has no stable
    /// physical location, because such a map cannot match another file's.
    fn shared_extent_map(file: &File) -> io::Result<Option<Vec<Extent>>> {
        let mut extents = Vec::new();
        let mut start = 0u64;

        loop {
            let mut map = Fiemap::request(start);
            // SAFETY: `map` is a properly sized, repr(C) fiemap with room for
            // `fm_extent_count` extents, and lives across the call.
            let ret = unsafe {
                libc::ioctl(
                    file.as_raw_fd(),
                    FS_IOC_FIEMAP as _,
                    &mut map as *mut Fiemap,
                )
            };
            if ret == -1 {
                return Err(io::Error::last_os_error());
            }

            let mapped = (map.fm_mapped_extents as usize).min(EXTENT_BATCH);
            if mapped == 0 {
                return Ok(Some(extents));
            }

            for extent in &map.fm_extents[..mapped] {
                if extent.fe_flags & UNCOMPARABLE != 0
                    || extent.fe_flags & FIEMAP_EXTENT_SHARED == 0
                {
                    return Ok(None);
                }
                extents.push((extent.fe_logical, extent.fe_physical, extent.fe_length));
                if extent.fe_flags & FIEMAP_EXTENT_LAST != 0 {
                    return Ok(Some(extents));
                }
            }

            let last = map.fm_extents[mapped - 1];
            let next = last.fe_logical.saturating_add(last.fe_length);
            if next <= start {
                return Ok(None);
            }
            start = next;
        }
    }

}
