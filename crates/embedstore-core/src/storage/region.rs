//! A single mmap-backed, append-only byte region with a persisted write cursor.

use crate::codec::ByteCodec;
use crate::error::{Error, Region, Result};

use memmap2::MmapMut;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

/// Width, in bytes, of the write-cursor header every region carries at offset zero.
const CURSOR_HEADER_SIZE: usize = 4;

/// A single append-only file, mapped into memory for the lifetime of the region.
///
/// Layout is `[u32 write_cursor][data...]`. All appends go through [`MappedRegion::append`],
/// which is the only checked mutation path; [`MappedRegion::write_at`] is an unchecked
/// positional write reserved for the inverted index's block-shifting insert.
pub struct MappedRegion {
    path: PathBuf,
    /// Which logical region this is, for error reporting (`CapacityExceeded { region }`).
    kind: Region,
    file: File,
    mmap: MmapMut,
    capacity: usize,
    write_cursor: usize,
}

impl MappedRegion {
    /// Opens `path` if it exists (adopting its on-disk size as capacity and its header as
    /// the write cursor), or creates it fresh at `requested_capacity` with the header
    /// initialized to the start of the data area.
    pub fn open_or_create<P: AsRef<Path>>(
        path: P,
        requested_capacity: usize,
        kind: Region,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let existed = path.exists();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        let capacity = if existed {
            let len = file.metadata()?.len();
            usize::try_from(len).map_err(|_| {
                Error::DecodeError(format!("region '{}' file length overflows usize", path.display()))
            })?
        } else {
            file.set_len(requested_capacity as u64)?;
            requested_capacity
        };

        if capacity < CURSOR_HEADER_SIZE {
            return Err(Error::DecodeError(format!(
                "region '{}' capacity {capacity} is smaller than the cursor header",
                path.display()
            )));
        }

        // SAFETY: `file` was just opened/created read-write above and its length is set
        // to exactly `capacity` bytes (either pre-existing or via `set_len`), so the
        // mapping covers a consistent, fully-allocated extent of the file.
        let mut mmap = unsafe { MmapMut::map_mut(&file)? };

        let write_cursor = if existed {
            let cursor = ByteCodec::read_u32(&mmap[..CURSOR_HEADER_SIZE]) as usize;
            if cursor < CURSOR_HEADER_SIZE || cursor > capacity {
                return Err(Error::DecodeError(format!(
                    "region '{}' has a corrupt write cursor {cursor} (capacity {capacity})",
                    path.display()
                )));
            }
            debug!(path = %path.display(), cursor, "reopened mapped region");
            cursor
        } else {
            ByteCodec::write_u32(&mut mmap[..CURSOR_HEADER_SIZE], CURSOR_HEADER_SIZE as u32);
            debug!(path = %path.display(), capacity, "created mapped region");
            CURSOR_HEADER_SIZE
        };

        Ok(Self {
            path,
            kind,
            file,
            mmap,
            capacity,
            write_cursor,
        })
    }

    /// Appends `bytes` at the current write cursor, advancing it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CapacityExceeded`] (leaving all state unchanged) if the region
    /// lacks room.
    pub fn append(&mut self, bytes: &[u8]) -> Result<usize> {
        let offset = self.write_cursor;
        let end = offset
            .checked_add(bytes.len())
            .ok_or(Error::CapacityExceeded { region: self.kind })?;

        if end > self.capacity {
            return Err(Error::CapacityExceeded { region: self.kind });
        }

        self.mmap[offset..end].copy_from_slice(bytes);
        self.write_cursor = end;
        Ok(offset)
    }

    /// Advances the write cursor by `len` bytes without writing anything, returning the
    /// offset at which the reserved span begins.
    ///
    /// Used by the inverted index to grow the region by one block's width when the
    /// block's contents are about to be filled in directly via [`MappedRegion::write_at`]
    /// rather than [`MappedRegion::append`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::CapacityExceeded`] (leaving the cursor unchanged) if the region
    /// lacks room.
    pub fn reserve(&mut self, len: usize) -> Result<usize> {
        let start = self.write_cursor;
        let end = start
            .checked_add(len)
            .ok_or(Error::CapacityExceeded { region: self.kind })?;

        if end > self.capacity {
            return Err(Error::CapacityExceeded { region: self.kind });
        }

        self.write_cursor = end;
        Ok(start)
    }

    /// Writes `bytes` at an arbitrary `offset`, bypassing the cursor and capacity check.
    ///
    /// Used by the inverted index's block-shifting insert, where the caller has already
    /// reasoned about bounds against `num_blocks * block_size`.
    ///
    /// # Panics
    ///
    /// Panics if `offset + bytes.len()` exceeds the region's capacity.
    pub fn write_at(&mut self, offset: usize, bytes: &[u8]) {
        let end = offset + bytes.len();
        assert!(
            end <= self.capacity,
            "write_at out of bounds: offset {offset} + len {} > capacity {}",
            bytes.len(),
            self.capacity
        );
        self.mmap[offset..end].copy_from_slice(bytes);
    }

    /// Copies `len` bytes starting at `src` to `dst` within the same mapping
    /// (`memmove` semantics -- source and destination ranges may overlap).
    ///
    /// Used by the inverted index to shift the block array forward by one slot.
    ///
    /// # Panics
    ///
    /// Panics if either range exceeds the region's capacity.
    pub fn copy_within(&mut self, src: usize, dst: usize, len: usize) {
        assert!(src + len <= self.capacity, "copy_within source out of bounds");
        assert!(dst + len <= self.capacity, "copy_within destination out of bounds");
        self.mmap.copy_within(src..src + len, dst);
    }

    /// The entire mapping, including the four-byte cursor header.
    #[must_use]
    pub fn base(&self) -> &[u8] {
        &self.mmap
    }

    /// Mutable access to the entire mapping. Exposed for the inverted index, which must
    /// interleave reads and writes during a block split.
    pub fn base_mut(&mut self) -> &mut [u8] {
        &mut self.mmap
    }

    /// Current write cursor (absolute byte offset of the next append).
    #[must_use]
    pub const fn cursor(&self) -> usize {
        self.write_cursor
    }

    /// Total capacity of the region, including the cursor header.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of bytes available for appends before [`Error::CapacityExceeded`].
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.capacity - self.write_cursor
    }

    /// Persists the current write cursor into the first four bytes of the mapping.
    ///
    /// This does not `fsync`; it only guarantees the header reflects `self.write_cursor`
    /// in the mapping, which the OS will write back to disk on its own schedule (or
    /// immediately, via [`MappedRegion::flush`]).
    pub fn flush_cursor(&mut self) {
        let cursor = self.write_cursor as u32;
        ByteCodec::write_u32(&mut self.mmap[..CURSOR_HEADER_SIZE], cursor);
    }

    /// Flushes the cursor header and asks the OS to write all dirty pages in the
    /// mapping back to the file. This is an `msync`, not an `fsync`: the design
    /// deliberately does not force a durable disk write on every call.
    pub fn flush(&mut self) {
        self.flush_cursor();
        if let Err(e) = self.mmap.flush() {
            warn!(path = %self.path.display(), error = %e, "failed to flush mapped region");
        }
    }
}

impl Drop for MappedRegion {
    fn drop(&mut self) {
        self.flush_cursor();
        if let Err(e) = self.mmap.flush() {
            error!(path = %self.path.display(), error = %e, "failed to flush mapped region on drop");
        }
        // `file` and `mmap` are dropped after this; the OS reclaims the mapping itself.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn creates_fresh_region_with_header_cursor() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("region.bin");
        let region = MappedRegion::open_or_create(&path, 64, Region::Vector).unwrap();
        assert_eq!(region.cursor(), CURSOR_HEADER_SIZE);
        assert_eq!(region.capacity(), 64);
    }

    #[test]
    fn append_advances_cursor_and_refuses_overflow() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("region.bin");
        let mut region = MappedRegion::open_or_create(&path, 4 + 8, Region::Vector).unwrap();

        let off = region.append(&[1, 2, 3, 4]).unwrap();
        assert_eq!(off, 4);
        assert_eq!(region.cursor(), 8);

        let off2 = region.append(&[5, 6, 7, 8]).unwrap();
        assert_eq!(off2, 8);
        assert_eq!(region.cursor(), 12);

        let err = region.append(&[9]).unwrap_err();
        assert!(matches!(err, Error::CapacityExceeded { .. }));
        assert_eq!(region.cursor(), 12, "failed append must not mutate state");
    }

    #[test]
    fn reopen_recovers_cursor_and_data() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("region.bin");

        {
            let mut region = MappedRegion::open_or_create(&path, 64, Region::Vector).unwrap();
            region.append(&[9, 9, 9, 9]).unwrap();
            region.flush();
        }

        let region = MappedRegion::open_or_create(&path, 64, Region::Vector).unwrap();
        assert_eq!(region.cursor(), 8);
        assert_eq!(&region.base()[4..8], &[9, 9, 9, 9]);
        assert_eq!(region.capacity(), 64, "capacity is adopted from the existing file size");
    }

    #[test]
    fn copy_within_shifts_overlapping_bytes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("region.bin");
        let mut region = MappedRegion::open_or_create(&path, 4 + 12, Region::Index).unwrap();
        region.write_at(4, &[1, 2, 3, 4, 5, 6, 7, 8]);
        region.copy_within(4, 8, 8);
        assert_eq!(&region.base()[8..16], &[1, 2, 3, 4, 5, 6, 7, 8]);
    }
}
