//! A sorted, block-structured on-disk inverted index.
//!
//! Keys are zero-padded to a fixed width `K` and stored, along with a fixed-size
//! postings slot array, in fixed-width `B`-byte blocks kept sorted by their padded key.
//! Lookups binary-search the block array; insertion splices a block into position via
//! `memmove`-style shifting, and chains overflow blocks (sharing the same padded key)
//! when a block's postings slots fill up.

use crate::error::{Error, Region as RegionKind, Result};
use crate::storage::MappedRegion;
use tracing::trace;

/// Default block width in bytes (`B`).
pub const DEFAULT_BLOCK_SIZE: usize = 64;
/// Default padded key width in bytes (`K`).
pub const DEFAULT_KEY_LENGTH: usize = 16;

/// A fixed-size, plain-old-data posting value with a reserved sentinel.
///
/// The default posting is a `u32` row index with sentinel `u32::MAX`; the index is
/// generic over this trait so that other fixed-size identifiers (document ids wider
/// than 32 bits, composite keys, etc.) can be stored in the same block layout.
pub trait Posting: Copy + PartialEq {
    /// On-disk width of one posting, in bytes.
    const SIZE: usize;

    /// The reserved value marking an unused postings slot.
    fn sentinel() -> Self;

    /// Encodes `self` into `buf`, which is exactly [`Posting::SIZE`] bytes.
    fn write_bytes(&self, buf: &mut [u8]);

    /// Decodes a value from `buf`, which is exactly [`Posting::SIZE`] bytes.
    fn read_bytes(buf: &[u8]) -> Self;

    /// True if `self` is the sentinel (unused-slot marker).
    fn is_sentinel(&self) -> bool {
        *self == Self::sentinel()
    }
}

impl Posting for u32 {
    const SIZE: usize = 4;

    fn sentinel() -> Self {
        u32::MAX
    }

    fn write_bytes(&self, buf: &mut [u8]) {
        crate::codec::ByteCodec::write_u32(buf, *self);
    }

    fn read_bytes(buf: &[u8]) -> Self {
        crate::codec::ByteCodec::read_u32(buf)
    }
}

/// Sorted, fixed-block keyword/identifier -> postings index over a [`MappedRegion`].
pub struct InvertedIndex<P: Posting = u32> {
    region: MappedRegion,
    block_size: usize,
    key_length: usize,
    _posting: std::marker::PhantomData<P>,
}

impl<P: Posting> InvertedIndex<P> {
    /// Opens or creates the index region at `path`, using the given block/key widths.
    pub fn open_or_create(
        path: &std::path::Path,
        capacity: usize,
        block_size: usize,
        key_length: usize,
    ) -> Result<Self> {
        assert!(key_length <= block_size, "key_length must fit within block_size");
        let region = MappedRegion::open_or_create(path, capacity, RegionKind::Index)?;
        Ok(Self {
            region,
            block_size,
            key_length,
            _posting: std::marker::PhantomData,
        })
    }

    /// Number of postings slots available per block.
    fn slots_per_block(&self) -> usize {
        (self.block_size - self.key_length) / P::SIZE
    }

    /// Number of blocks currently stored.
    fn num_blocks(&self) -> usize {
        (self.region.cursor() - 4) / self.block_size
    }

    fn block_offset(&self, index: usize) -> usize {
        4 + index * self.block_size
    }

    fn block_key(&self, index: usize) -> &[u8] {
        let off = self.block_offset(index);
        &self.region.base()[off..off + self.key_length]
    }

    /// Zero-pads `key` out to `key_length` bytes.
    fn pad_key(&self, key: &[u8]) -> Result<Vec<u8>> {
        if key.len() > self.key_length {
            return Err(Error::KeyTooLong {
                len: key.len(),
                max: self.key_length,
            });
        }
        let mut padded = vec![0u8; self.key_length];
        padded[..key.len()].copy_from_slice(key);
        Ok(padded)
    }

    /// Binary search for `padded_key`, returning `(position, found)` where `position` is
    /// an insertion point when not found.
    fn bsearch(&self, padded_key: &[u8]) -> (usize, bool) {
        let num_blocks = self.num_blocks();
        if num_blocks == 0 {
            return (0, false);
        }

        let mut lo: isize = 0;
        let mut hi: isize = num_blocks as isize - 1;
        while lo <= hi {
            let mid = lo + (hi - lo) / 2;
            match padded_key.cmp(self.block_key(mid as usize)) {
                std::cmp::Ordering::Equal => return (mid as usize, true),
                std::cmp::Ordering::Less => hi = mid - 1,
                std::cmp::Ordering::Greater => lo = mid + 1,
            }
        }
        (lo as usize, false)
    }

    /// Reads the non-sentinel prefix of postings stored in block `index`.
    fn block_postings(&self, index: usize) -> Vec<P> {
        let slots = self.slots_per_block();
        let key_len = self.key_length;
        let base = self.block_offset(index) + key_len;
        let region = self.region.base();

        let mut out = Vec::new();
        for slot in 0..slots {
            let start = base + slot * P::SIZE;
            let value = P::read_bytes(&region[start..start + P::SIZE]);
            if value.is_sentinel() {
                break;
            }
            out.push(value);
        }
        out
    }

    /// Index of the first sentinel slot in block `index` (or `slots_per_block()` if full).
    fn first_sentinel_slot(&self, index: usize) -> usize {
        let slots = self.slots_per_block();
        let key_len = self.key_length;
        let base = self.block_offset(index) + key_len;
        let region = self.region.base();

        for slot in 0..slots {
            let start = base + slot * P::SIZE;
            let value = P::read_bytes(&region[start..start + P::SIZE]);
            if value.is_sentinel() {
                return slot;
            }
        }
        slots
    }

    /// Looks up `key`, returning the concatenation of the overflow chain's postings:
    /// back-scan first, then forward-scan, matching the order blocks were discovered in.
    pub fn search(&self, key: &[u8]) -> Result<Vec<P>> {
        let padded = self.pad_key(key)?;
        let (idx, found) = self.bsearch(&padded);
        if !found {
            return Ok(Vec::new());
        }

        let mut out = Vec::new();

        let mut back = idx as isize;
        while back >= 0 && self.block_key(back as usize) == padded.as_slice() {
            out.extend(self.block_postings(back as usize));
            back -= 1;
        }

        let mut fwd = idx + 1;
        while fwd < self.num_blocks() && self.block_key(fwd) == padded.as_slice() {
            out.extend(self.block_postings(fwd));
            fwd += 1;
        }

        Ok(out)
    }

    /// Inserts `postings` under `key`, creating a new block or appending to the existing
    /// one (chaining overflow blocks as needed).
    pub fn insert(&mut self, key: &[u8], postings: &[P]) -> Result<()> {
        let padded = self.pad_key(key)?;
        let (pos, found) = self.bsearch(&padded);
        if found {
            self.insert_into_existing(pos, &padded, postings)
        } else {
            self.insert_new_block(pos, &padded, postings)
        }
    }

    fn ensure_room_for_block(&self) -> Result<()> {
        if self.region.cursor() + self.block_size > self.region.capacity() {
            return Err(Error::CapacityExceeded {
                region: RegionKind::Index,
            });
        }
        Ok(())
    }

    /// Builds one block's bytes (`padded_key` + as many `postings` as fit, sentinel
    /// filled), returning the bytes and the postings that did not fit.
    fn build_block_bytes<'a>(&self, padded_key: &[u8], postings: &'a [P]) -> (Vec<u8>, &'a [P]) {
        let slots = self.slots_per_block();
        let take = postings.len().min(slots);

        let mut bytes = vec![0u8; self.block_size];
        bytes[..self.key_length].copy_from_slice(padded_key);

        for (i, posting) in postings.iter().take(take).enumerate() {
            let start = self.key_length + i * P::SIZE;
            posting.write_bytes(&mut bytes[start..start + P::SIZE]);
        }
        for slot in take..slots {
            let start = self.key_length + slot * P::SIZE;
            P::sentinel().write_bytes(&mut bytes[start..start + P::SIZE]);
        }

        (bytes, &postings[take..])
    }

    fn insert_new_block(&mut self, pos: usize, padded_key: &[u8], postings: &[P]) -> Result<()> {
        self.ensure_room_for_block()?;

        let num_blocks = self.num_blocks();
        if pos != num_blocks {
            let shift_len = (num_blocks - pos) * self.block_size;
            let src = self.block_offset(pos);
            let dst = self.block_offset(pos + 1);
            self.region.copy_within(src, dst, shift_len);
        }

        let (bytes, leftover) = self.build_block_bytes(padded_key, postings);
        let offset = self.block_offset(pos);
        self.region.write_at(offset, &bytes);
        self.region.reserve(self.block_size)?;

        trace!(pos, num_blocks, leftover = leftover.len(), "inserted index block");

        if !leftover.is_empty() {
            let leftover = leftover.to_vec();
            self.insert_new_block(pos + 1, padded_key, &leftover)?;
        }
        Ok(())
    }

    fn insert_into_existing(&mut self, pos: usize, padded_key: &[u8], postings: &[P]) -> Result<()> {
        let first_empty = self.first_sentinel_slot(pos);
        let slots = self.slots_per_block();
        let available = slots - first_empty;
        let take = postings.len().min(available);

        let base = self.block_offset(pos) + self.key_length;
        for (i, posting) in postings.iter().take(take).enumerate() {
            let start = base + (first_empty + i) * P::SIZE;
            let mut buf = vec![0u8; P::SIZE];
            posting.write_bytes(&mut buf);
            self.region.write_at(start, &buf);
        }

        let leftover = &postings[take..];
        if !leftover.is_empty() {
            self.insert_new_block(pos + 1, padded_key, leftover)?;
        }
        Ok(())
    }

    /// Flushes the cursor header back to the mapping.
    pub fn flush(&mut self) {
        self.region.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn open(dir: &std::path::Path, block_size: usize, key_length: usize) -> InvertedIndex<u32> {
        InvertedIndex::open_or_create(&dir.join("idx.bin"), 4 + block_size * 64, block_size, key_length)
            .unwrap()
    }

    #[test]
    fn search_on_empty_index_is_empty() {
        let dir = tempdir().unwrap();
        let idx = open(dir.path(), DEFAULT_BLOCK_SIZE, DEFAULT_KEY_LENGTH);
        assert!(idx.search(b"missing").unwrap().is_empty());
    }

    #[test]
    fn insert_and_search_round_trips() {
        let dir = tempdir().unwrap();
        let mut idx = open(dir.path(), DEFAULT_BLOCK_SIZE, DEFAULT_KEY_LENGTH);
        idx.insert(b"alpha", &[1, 2, 3]).unwrap();
        idx.insert(b"beta", &[4]).unwrap();
        idx.insert(b"alpha", &[5]).unwrap();

        let mut got = idx.search(b"alpha").unwrap();
        got.sort_unstable();
        assert_eq!(got, vec![1, 2, 3, 5]);
        assert_eq!(idx.search(b"beta").unwrap(), vec![4]);
        assert!(idx.search(b"gamma").unwrap().is_empty());
    }

    #[test]
    fn blocks_stay_sorted_by_padded_key() {
        let dir = tempdir().unwrap();
        let mut idx = open(dir.path(), DEFAULT_BLOCK_SIZE, DEFAULT_KEY_LENGTH);
        for key in ["zeta", "alpha", "mu", "beta"] {
            idx.insert(key.as_bytes(), &[0]).unwrap();
        }

        let mut keys = Vec::new();
        for i in 0..idx.num_blocks() {
            keys.push(idx.block_key(i).to_vec());
        }
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn overflow_chain_spans_multiple_blocks() {
        let dir = tempdir().unwrap();
        // 4 postings per block: (32 - 16) / 4 = 4
        let mut idx = open(dir.path(), 32, 16);
        for i in 0..10u32 {
            idx.insert(b"key", &[i]).unwrap();
        }
        let mut got = idx.search(b"key").unwrap();
        got.sort_unstable();
        assert_eq!(got, (0..10).collect::<Vec<_>>());
        assert!(idx.num_blocks() >= 3, "10 postings at 4/block need >= 3 blocks");
    }

    #[test]
    fn key_too_long_is_rejected() {
        let dir = tempdir().unwrap();
        let mut idx = open(dir.path(), DEFAULT_BLOCK_SIZE, 4);
        let err = idx.insert(b"waytoolongforfour", &[1]).unwrap_err();
        assert!(matches!(err, Error::KeyTooLong { .. }));
    }

    #[test]
    fn capacity_exceeded_refuses_new_block() {
        let dir = tempdir().unwrap();
        // Room for exactly one block beyond the header.
        let mut idx =
            InvertedIndex::<u32>::open_or_create(&dir.join("idx.bin"), 4 + 32, 32, 16).unwrap();
        idx.insert(b"a", &[1]).unwrap();
        let err = idx.insert(b"b", &[2]).unwrap_err();
        assert!(matches!(err, Error::CapacityExceeded { .. }));
    }
}
