//! `EmbeddingStore`: the coordinator tying the four on-disk regions together into
//! persistent, hybrid vector + keyword retrieval.

use crate::codec::ByteCodec;
use crate::config::StoreConfig;
use crate::distance::{DistanceKernel, DistanceMetric};
use crate::error::{Error, Region, Result};
use crate::index::InvertedIndex;
use crate::search;
use crate::storage::MappedRegion;
use crate::tokenize::Tokenizer;

use rustc_hash::FxHashMap;
use std::path::Path;
use tracing::info;

const VECTOR_FILE: &str = "embedding_store.bin";
const OFFSET_MAP_FILE: &str = "embedding_to_object_map.bin";
const PAYLOAD_FILE: &str = "object_store.bin";
const INDEX_FILE: &str = "inverted_index.bin";

const OFFSET_ENTRY_SIZE: usize = 4; // a single payload-region offset into the payload store

/// A persistent, memory-mapped store of fixed-dimension vectors, each with an opaque
/// payload and, optionally, keyword postings in a shared inverted index.
pub struct EmbeddingStore {
    dimension: usize,
    vectors: MappedRegion,
    offsets: MappedRegion,
    payloads: MappedRegion,
    index: Option<InvertedIndex<u32>>,
    tokenizer: Tokenizer,
    default_workers: usize,
}

impl EmbeddingStore {
    /// Creates a fresh store rooted at `dir`, which must not already contain any of the
    /// store's region files. When `hybrid_enabled` is `false`, no inverted-index file is
    /// created and [`EmbeddingStore::top_k_hybrid`] always returns an empty result.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StateInconsistent`] if `dir` already contains some (but not all)
    /// of the store's files, and any [`Error::Io`] from creating them.
    pub fn create(dir: &Path, dimension: usize, config: &StoreConfig, hybrid_enabled: bool) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        Self::check_file_presence(dir, hybrid_enabled)?;

        let vectors = MappedRegion::open_or_create(
            &dir.join(VECTOR_FILE),
            config.vector_capacity,
            Region::Vector,
        )?;
        let offsets = MappedRegion::open_or_create(
            &dir.join(OFFSET_MAP_FILE),
            config.offset_map_capacity,
            Region::OffsetMap,
        )?;
        let payloads = MappedRegion::open_or_create(
            &dir.join(PAYLOAD_FILE),
            config.payload_capacity,
            Region::Payload,
        )?;
        let index = hybrid_enabled
            .then(|| {
                InvertedIndex::open_or_create(
                    &dir.join(INDEX_FILE),
                    config.index_capacity,
                    config.block_size,
                    config.key_length,
                )
            })
            .transpose()?;

        info!(dir = %dir.display(), dimension, hybrid_enabled, "created embedding store");

        Ok(Self {
            dimension,
            vectors,
            offsets,
            payloads,
            index,
            tokenizer: Tokenizer::with_stopword_file(Path::new(&config.stopword_path)),
            default_workers: config.worker_count,
        })
    }

    /// Opens a store previously created at `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StateInconsistent`] if `dir` has only some of the expected region
    /// files (a torn or partially-deleted store).
    pub fn open(dir: &Path, dimension: usize, config: &StoreConfig, hybrid_enabled: bool) -> Result<Self> {
        Self::check_file_presence(dir, hybrid_enabled)?;

        let vectors = MappedRegion::open_or_create(
            &dir.join(VECTOR_FILE),
            config.vector_capacity,
            Region::Vector,
        )?;
        let offsets = MappedRegion::open_or_create(
            &dir.join(OFFSET_MAP_FILE),
            config.offset_map_capacity,
            Region::OffsetMap,
        )?;
        let payloads = MappedRegion::open_or_create(
            &dir.join(PAYLOAD_FILE),
            config.payload_capacity,
            Region::Payload,
        )?;
        let index = hybrid_enabled
            .then(|| {
                InvertedIndex::open_or_create(
                    &dir.join(INDEX_FILE),
                    config.index_capacity,
                    config.block_size,
                    config.key_length,
                )
            })
            .transpose()?;

        info!(dir = %dir.display(), dimension, hybrid_enabled, "reopened embedding store");

        Ok(Self {
            dimension,
            vectors,
            offsets,
            payloads,
            index,
            tokenizer: Tokenizer::with_stopword_file(Path::new(&config.stopword_path)),
            default_workers: config.worker_count,
        })
    }

    /// Opens `dir` if it already holds a store, or creates one fresh.
    ///
    /// # Errors
    ///
    /// See [`EmbeddingStore::create`] and [`EmbeddingStore::open`].
    pub fn open_or_create(
        dir: &Path,
        dimension: usize,
        config: &StoreConfig,
        hybrid_enabled: bool,
    ) -> Result<Self> {
        if dir.join(VECTOR_FILE).exists() {
            Self::open(dir, dimension, config, hybrid_enabled)
        } else {
            Self::create(dir, dimension, config, hybrid_enabled)
        }
    }

    /// Refuses to proceed if `dir` holds some but not all of the expected region files.
    /// The inverted-index file is part of the expected set only when `hybrid_enabled`.
    fn check_file_presence(dir: &Path, hybrid_enabled: bool) -> Result<()> {
        let mut files = vec![VECTOR_FILE, OFFSET_MAP_FILE, PAYLOAD_FILE];
        if hybrid_enabled {
            files.push(INDEX_FILE);
        }
        let present = files.iter().filter(|f| dir.join(f).exists()).count();
        if present != 0 && present != files.len() {
            return Err(Error::StateInconsistent(dir.display().to_string()));
        }
        Ok(())
    }

    /// Number of rows currently stored.
    #[must_use]
    pub fn num_rows(&self) -> usize {
        (self.vectors.cursor() - 4) / (self.dimension * 4)
    }

    fn vector_bytes(&self, row: u32) -> &[u8] {
        let start = 4 + row as usize * self.dimension * 4;
        &self.vectors.base()[start..start + self.dimension * 4]
    }

    /// Appends a vector and its opaque payload, returning the new row index.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DimensionMismatch`] if `vector.len() != dimension`, or
    /// [`Error::CapacityExceeded`] if any region lacks room -- checked for the vector,
    /// offset-map, and payload regions before any of the three is mutated.
    pub fn add(&mut self, vector: &[f32], payload: &[u8]) -> Result<u32> {
        self.add_with_text(vector, payload, "")
    }

    /// Like [`EmbeddingStore::add`], additionally tokenizing `text` and indexing the row
    /// under each resulting keyword.
    ///
    /// # Errors
    ///
    /// See [`EmbeddingStore::add`].
    pub fn add_with_text(&mut self, vector: &[f32], payload: &[u8], text: &str) -> Result<u32> {
        if vector.len() != self.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }

        let vector_bytes_len = self.dimension * 4;
        if self.vectors.cursor() + vector_bytes_len > self.vectors.capacity() {
            return Err(Error::CapacityExceeded { region: Region::Vector });
        }
        if self.offsets.cursor() + OFFSET_ENTRY_SIZE > self.offsets.capacity() {
            return Err(Error::CapacityExceeded { region: Region::OffsetMap });
        }
        let payload_record_len = 4 + payload.len();
        if self.payloads.cursor() + payload_record_len > self.payloads.capacity() {
            return Err(Error::CapacityExceeded { region: Region::Payload });
        }

        let row = self.num_rows();

        let mut vec_bytes = vec![0u8; vector_bytes_len];
        for (i, &component) in vector.iter().enumerate() {
            ByteCodec::write_f32(&mut vec_bytes[i * 4..i * 4 + 4], component);
        }
        self.vectors.append(&vec_bytes)?;

        let payload_offset = self.payloads.cursor();
        let mut offset_entry = [0u8; OFFSET_ENTRY_SIZE];
        #[allow(clippy::cast_possible_truncation)]
        ByteCodec::write_u32(&mut offset_entry, payload_offset as u32);
        self.offsets.append(&offset_entry)?;

        let mut payload_record = vec![0u8; payload_record_len];
        #[allow(clippy::cast_possible_truncation)]
        ByteCodec::write_u32(&mut payload_record[0..4], payload.len() as u32);
        payload_record[4..].copy_from_slice(payload);
        self.payloads.append(&payload_record)?;

        if let Some(index) = self.index.as_mut() {
            for token in self.tokenizer.tokenize(text) {
                index.insert(token.as_bytes(), &[row_as_u32(row)])?;
            }
        }

        Ok(row_as_u32(row))
    }

    /// Returns the payload bytes stored for `row`.
    ///
    /// # Panics
    ///
    /// Panics if `row >= num_rows()`.
    #[must_use]
    pub fn payload(&self, row: u32) -> &[u8] {
        let entry_start = 4 + row as usize * OFFSET_ENTRY_SIZE;
        let entry = &self.offsets.base()[entry_start..entry_start + OFFSET_ENTRY_SIZE];
        let offset = ByteCodec::read_u32(entry) as usize;
        let len = ByteCodec::read_u32(&self.payloads.base()[offset..offset + 4]) as usize;
        &self.payloads.base()[offset + 4..offset + 4 + len]
    }

    /// Finds the `k` rows whose stored vector is closest to `query` under `metric`,
    /// scanning the whole store in parallel across `workers` threads (the store's
    /// configured default if `workers` is `None`).
    ///
    /// Returns an empty result, rather than an error, if `query.len() != dimension`,
    /// matching the original store's query-time behavior of refusing a bad query
    /// without raising an error.
    #[must_use]
    pub fn top_k(
        &self,
        query: &[f32],
        k: usize,
        metric: DistanceMetric,
        threshold: f32,
        workers: Option<usize>,
    ) -> Vec<(u32, f32)> {
        if query.len() != self.dimension {
            return Vec::new();
        }
        let workers = workers.unwrap_or(self.default_workers);
        search::top_k_scored(self.num_rows(), k, workers, |row| {
            DistanceKernel::distance(query, self.vector_bytes(row), metric, threshold)
        })
    }

    /// The store's dimension `D`.
    #[must_use]
    pub const fn dimension(&self) -> usize {
        self.dimension
    }

    /// Byte slice of the raw vector stored for `row`.
    ///
    /// # Panics
    ///
    /// Panics if `row >= num_rows()`.
    #[must_use]
    pub fn vector(&self, row: u32) -> &[u8] {
        self.vector_bytes(row)
    }

    /// Hybrid search: tokenizes `query_text`, gathers the union of postings for each
    /// resulting keyword, and ranks every row in the store (not just the keyword
    /// candidates) by a blend of normalized keyword hit count and vector distance,
    /// `(1 - norm) * weight + dist * (1 - weight)`. Rows with no keyword hits score
    /// `norm = 0`, so they still compete purely on distance rather than being dropped.
    ///
    /// Requires the store to have been created/opened with hybrid search enabled;
    /// otherwise returns an empty result. At `weight == 0.0` this degenerates to
    /// [`EmbeddingStore::top_k`] over the whole store (keyword matching plays no part,
    /// so rows are not filtered down to the keyword-matching candidate set).
    ///
    /// Returns an empty result, rather than an error, if `query.len() != dimension`,
    /// matching the original store's query-time behavior of refusing a bad query
    /// without raising an error.
    ///
    /// Scans the store in parallel across `workers` threads (the store's configured
    /// default if `workers` is `None`), the same as [`EmbeddingStore::top_k`].
    ///
    /// # Errors
    ///
    /// Propagates any [`Error`] from reading the inverted index.
    ///
    /// # Panics
    ///
    /// Panics if `weight` is outside `[0.0, 1.0]`.
    pub fn top_k_hybrid(
        &self,
        query: &[f32],
        query_text: &str,
        metric: DistanceMetric,
        threshold: f32,
        weight: f32,
        k: usize,
        workers: Option<usize>,
    ) -> Result<Vec<(u32, f32)>> {
        assert!((0.0..=1.0).contains(&weight), "weight must be in [0.0, 1.0]");

        if query.len() != self.dimension {
            return Ok(Vec::new());
        }

        let Some(index) = self.index.as_ref() else {
            return Ok(Vec::new());
        };

        if weight == 0.0 {
            return Ok(self.top_k(query, k, metric, threshold, workers));
        }

        let mut counts: FxHashMap<u32, u32> = FxHashMap::default();
        for token in self.tokenizer.tokenize(query_text) {
            for row in index.search(token.as_bytes())? {
                *counts.entry(row).or_insert(0) += 1;
            }
        }

        if counts.is_empty() {
            return Ok(Vec::new());
        }

        let max_c = *counts.values().max().expect("counts is non-empty");
        let min_c = *counts.values().min().expect("counts is non-empty");

        let workers = workers.unwrap_or(self.default_workers);
        let results = search::top_k_scored(self.num_rows(), k, workers, |row| {
            let norm = match counts.get(&row) {
                None => 0.0,
                Some(_) if max_c == min_c => 1.0,
                Some(&count) => (count - min_c) as f32 / (max_c - min_c) as f32,
            };
            let dist = DistanceKernel::distance(query, self.vector_bytes(row), metric, threshold);
            (1.0 - norm) * weight + dist * (1.0 - weight)
        });
        Ok(results)
    }

    /// Flushes every region's write cursor and dirty pages back to disk.
    pub fn close(&mut self) {
        self.vectors.flush();
        self.offsets.flush();
        self.payloads.flush();
        if let Some(index) = self.index.as_mut() {
            index.flush();
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn row_as_u32(row: usize) -> u32 {
    row as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn config() -> StoreConfig {
        StoreConfig {
            vector_capacity: 4 + 3 * 4 * 64,
            offset_map_capacity: 4 + 8 * 64,
            payload_capacity: 4 + 1024,
            index_capacity: 4 + 64 * 64,
            ..StoreConfig::default()
        }
    }

    #[test]
    fn add_and_payload_round_trip() {
        let dir = tempdir().unwrap();
        let mut store = EmbeddingStore::create(dir.path(), 3, &config(), false).unwrap();

        let row = store.add(&[1.0, 2.0, 3.0], b"hello").unwrap();
        assert_eq!(row, 0);
        assert_eq!(store.payload(row), b"hello");
        assert_eq!(store.num_rows(), 1);
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let dir = tempdir().unwrap();
        let mut store = EmbeddingStore::create(dir.path(), 3, &config(), false).unwrap();
        let err = store.add(&[1.0, 2.0], b"x").unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { .. }));
    }

    #[test]
    fn reopen_recovers_rows_and_payloads() {
        let dir = tempdir().unwrap();
        {
            let mut store = EmbeddingStore::create(dir.path(), 3, &config(), false).unwrap();
            store.add(&[1.0, 0.0, 0.0], b"a").unwrap();
            store.add(&[0.0, 1.0, 0.0], b"b").unwrap();
            store.close();
        }

        let store = EmbeddingStore::open(dir.path(), 3, &config(), false).unwrap();
        assert_eq!(store.num_rows(), 2);
        assert_eq!(store.payload(0), b"a");
        assert_eq!(store.payload(1), b"b");
    }

    #[test]
    fn partial_file_set_is_refused() {
        let dir = tempdir().unwrap();
        let mut store = EmbeddingStore::create(dir.path(), 3, &config(), true).unwrap();
        store.add(&[1.0, 0.0, 0.0], b"a").unwrap();
        store.close();
        drop(store);

        std::fs::remove_file(dir.path().join(INDEX_FILE)).unwrap();
        let err = EmbeddingStore::open(dir.path(), 3, &config(), true).unwrap_err();
        assert!(matches!(err, Error::StateInconsistent(_)));
    }

    #[test]
    fn top_k_finds_closest_vector() {
        let dir = tempdir().unwrap();
        let mut store = EmbeddingStore::create(dir.path(), 2, &config(), false).unwrap();
        store.add(&[1.0, 0.0], b"a").unwrap();
        store.add(&[0.0, 1.0], b"b").unwrap();
        store.add(&[0.9, 0.1], b"c").unwrap();

        let results = store.top_k(&[1.0, 0.0], 2, DistanceMetric::L2Squared, 0.0, None);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, 0);
    }

    #[test]
    fn hybrid_search_ranks_by_keyword_and_distance() {
        let dir = tempdir().unwrap();
        let mut store = EmbeddingStore::create(dir.path(), 2, &config(), true).unwrap();
        store.add_with_text(&[1.0, 0.0], b"a", "rust database").unwrap();
        store.add_with_text(&[0.0, 1.0], b"b", "rust rust rust").unwrap();

        let results = store
            .top_k_hybrid(&[1.0, 0.0], "rust", DistanceMetric::L2Squared, 0.0, 1.0, 2, None)
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, 1, "weight 1.0 should rank purely by keyword hit count");
    }

    #[test]
    fn hybrid_search_with_no_keyword_hits_is_empty() {
        let dir = tempdir().unwrap();
        let mut store = EmbeddingStore::create(dir.path(), 2, &config(), true).unwrap();
        store.add_with_text(&[1.0, 0.0], b"a", "rust").unwrap();

        let results = store
            .top_k_hybrid(&[1.0, 0.0], "golang", DistanceMetric::L2Squared, 0.0, 0.5, 5, None)
            .unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn hybrid_search_on_disabled_store_is_empty() {
        let dir = tempdir().unwrap();
        let mut store = EmbeddingStore::create(dir.path(), 2, &config(), false).unwrap();
        store.add_with_text(&[1.0, 0.0], b"a", "rust").unwrap();

        let results = store
            .top_k_hybrid(&[1.0, 0.0], "rust", DistanceMetric::L2Squared, 0.0, 0.5, 5, None)
            .unwrap();
        assert!(results.is_empty(), "hybrid search must be empty when the store was opened without it");
    }
}
