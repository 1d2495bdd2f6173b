//! Error types for `embedstore-core`.
//!
//! This module provides a unified error type for every fallible operation exposed by the
//! store, the inverted index, and the mmap-backed regions underneath them.

use thiserror::Error;

/// Result type alias for `embedstore-core` operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Which on-disk region an operation was acting on when it ran out of room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    /// The vector region (`embedding_store.bin`).
    Vector,
    /// The row -> payload offset map (`embedding_to_object_map.bin`).
    OffsetMap,
    /// The payload region (`object_store.bin`).
    Payload,
    /// The inverted index region (`inverted_index.bin`).
    Index,
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Vector => "vector",
            Self::OffsetMap => "offset_map",
            Self::Payload => "payload",
            Self::Index => "index",
        };
        f.write_str(name)
    }
}

/// Errors that can occur in `embedstore-core` operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Vector length did not match the store's configured dimension.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected dimension `D`.
        expected: usize,
        /// Actual length of the supplied vector.
        actual: usize,
    },

    /// An append would have exceeded a region's capacity.
    #[error("capacity exceeded in {region} region")]
    CapacityExceeded {
        /// The region that ran out of room.
        region: Region,
    },

    /// An inverted-index key exceeded the configured key length `K`.
    #[error("key too long: {len} bytes exceeds the configured key length of {max}")]
    KeyTooLong {
        /// Length of the offending key, in bytes.
        len: usize,
        /// Configured maximum key length `K`.
        max: usize,
    },

    /// Initialization found a partial set of store files (neither zero nor the full set).
    #[error("store directory '{0}' has a partial set of data files; refusing to open")]
    StateInconsistent(String),

    /// A region's on-disk structure could not be decoded (e.g. a malformed cursor header).
    #[error("failed to decode on-disk structure: {0}")]
    DecodeError(String),

    /// Underlying filesystem or mmap I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for [`Error::CapacityExceeded`].
    #[must_use]
    pub const fn capacity_exceeded(region: Region) -> Self {
        Self::CapacityExceeded { region }
    }
}
