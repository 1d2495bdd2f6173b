//! Unaligned little-endian(-of-the-host) reads and writes for `u32`/`f32` over raw byte
//! regions.
//!
//! Mmap'd storage gives no alignment guarantee at arbitrary offsets, so every read here
//! copies bytes into a properly aligned local rather than casting through an unaligned
//! pointer. Values are written in host byte order -- this store never crosses machines, so
//! there is no endian-conversion cost to pay on the read path.

use crate::error::{Error, Result};

/// Width in bytes of the on-disk representation of `u32` and `f32`.
pub const WORD_SIZE: usize = 4;

/// Stateless unaligned codec for the four-byte scalars this store persists.
pub struct ByteCodec;

impl ByteCodec {
    /// Reads a `u32` from the first four bytes of `buf`.
    ///
    /// # Panics
    ///
    /// Panics if `buf` has fewer than four bytes; callers are expected to slice a
    /// region's mapping before calling this, so a short buffer indicates a logic error,
    /// not a malformed file.
    #[must_use]
    pub fn read_u32(buf: &[u8]) -> u32 {
        let mut local = [0u8; WORD_SIZE];
        local.copy_from_slice(&buf[..WORD_SIZE]);
        u32::from_ne_bytes(local)
    }

    /// Writes `value` as four bytes at the start of `buf`.
    ///
    /// # Panics
    ///
    /// Panics if `buf` has fewer than four bytes.
    pub fn write_u32(buf: &mut [u8], value: u32) {
        buf[..WORD_SIZE].copy_from_slice(&value.to_ne_bytes());
    }

    /// Reads an `f32` from `buf`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DecodeError`] if `buf` is not exactly four bytes long.
    pub fn read_f32(buf: &[u8]) -> Result<f32> {
        if buf.len() != WORD_SIZE {
            return Err(Error::DecodeError(format!(
                "expected {WORD_SIZE} bytes for f32, got {}",
                buf.len()
            )));
        }
        let mut local = [0u8; WORD_SIZE];
        local.copy_from_slice(buf);
        Ok(f32::from_ne_bytes(local))
    }

    /// Writes `value` as four bytes at the start of `buf`.
    ///
    /// # Panics
    ///
    /// Panics if `buf` has fewer than four bytes.
    pub fn write_f32(buf: &mut [u8], value: f32) {
        buf[..WORD_SIZE].copy_from_slice(&value.to_ne_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_u32() {
        let mut buf = [0u8; 4];
        ByteCodec::write_u32(&mut buf, 0xdead_beef);
        assert_eq!(ByteCodec::read_u32(&buf), 0xdead_beef);
    }

    #[test]
    fn round_trips_f32() {
        let mut buf = [0u8; 4];
        ByteCodec::write_f32(&mut buf, std::f32::consts::PI);
        assert_eq!(ByteCodec::read_f32(&buf).unwrap(), std::f32::consts::PI);
    }

    #[test]
    fn read_f32_rejects_wrong_length() {
        let buf = [0u8; 3];
        assert!(ByteCodec::read_f32(&buf).is_err());
    }

    #[test]
    fn read_u32_over_longer_buffer_reads_prefix() {
        let buf = [1u8, 0, 0, 0, 0xff, 0xff];
        assert_eq!(ByteCodec::read_u32(&buf), 1);
    }
}
