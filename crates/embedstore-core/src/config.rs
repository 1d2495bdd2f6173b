//! Layered configuration: built-in defaults, overridden by `embedstore.toml`, overridden
//! by `EMBEDSTORE_`-prefixed environment variables.
//!
//! Configuration is a convenience layer only. [`crate::EmbeddingStore::create`] and
//! [`crate::EmbeddingStore::open`] never require a config file to exist; callers that want
//! the defaults below can always construct a store directly from code.

use crate::error::Result;
use crate::index::{DEFAULT_BLOCK_SIZE, DEFAULT_KEY_LENGTH};
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

/// Default capacity, in bytes, for a freshly created region.
pub const DEFAULT_REGION_CAPACITY: usize = 64 * 1024 * 1024;

/// Default number of worker threads used by a parallel top-k scan.
pub const DEFAULT_WORKER_COUNT: usize = 4;

/// Tunables for the storage regions and the parallel scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Inverted-index block width `B`, in bytes.
    pub block_size: usize,
    /// Inverted-index padded key width `K`, in bytes.
    pub key_length: usize,
    /// Default number of worker threads for a parallel top-k scan (`0` means single-threaded).
    pub worker_count: usize,
    /// Capacity, in bytes, reserved for the vector region when a store is created fresh.
    pub vector_capacity: usize,
    /// Capacity, in bytes, reserved for the row -> payload offset map.
    pub offset_map_capacity: usize,
    /// Capacity, in bytes, reserved for the payload region.
    pub payload_capacity: usize,
    /// Capacity, in bytes, reserved for the inverted index region.
    pub index_capacity: usize,
    /// Path to a newline-delimited stop-word list, consulted once at tokenizer construction.
    pub stopword_path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            key_length: DEFAULT_KEY_LENGTH,
            worker_count: DEFAULT_WORKER_COUNT,
            vector_capacity: DEFAULT_REGION_CAPACITY,
            offset_map_capacity: DEFAULT_REGION_CAPACITY,
            payload_capacity: DEFAULT_REGION_CAPACITY,
            index_capacity: DEFAULT_REGION_CAPACITY,
            stopword_path: "common_words.txt".to_string(),
        }
    }
}

impl StoreConfig {
    /// Loads configuration by layering built-in defaults, an optional `embedstore.toml`
    /// in the current directory, and `EMBEDSTORE_`-prefixed environment variables, in
    /// that order of increasing precedence.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Error::DecodeError`] if a present `embedstore.toml` or an
    /// `EMBEDSTORE_*` variable cannot be parsed into the expected shape.
    pub fn load() -> Result<Self> {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file("embedstore.toml"))
            .merge(Env::prefixed("EMBEDSTORE_"))
            .extract()
            .map_err(|e| crate::error::Error::DecodeError(e.to_string()))
    }
}
