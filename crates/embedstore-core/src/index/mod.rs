//! The on-disk inverted (keyword/identifier -> postings) index.

mod inverted;

pub use inverted::{InvertedIndex, Posting, DEFAULT_BLOCK_SIZE, DEFAULT_KEY_LENGTH};
