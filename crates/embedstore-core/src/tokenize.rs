//! Keyword tokenization for hybrid search.

use rustc_hash::FxHashSet;
use std::path::Path;
use tracing::debug;

/// Splits text into lowercase alphanumeric tokens, dropping stop-words.
///
/// The stop-word list is loaded once at construction time from a plain-text file (one
/// word per line); a missing file yields an empty stop-list rather than an error, since
/// stop-word filtering is a quality refinement, not a correctness requirement.
pub struct Tokenizer {
    stopwords: FxHashSet<String>,
}

impl Tokenizer {
    /// Builds a tokenizer with no stop-words.
    #[must_use]
    pub fn new() -> Self {
        Self {
            stopwords: FxHashSet::default(),
        }
    }

    /// Builds a tokenizer, loading stop-words from `path` if it exists.
    #[must_use]
    pub fn with_stopword_file(path: &Path) -> Self {
        let stopwords = match std::fs::read_to_string(path) {
            Ok(contents) => {
                let set: FxHashSet<String> = contents
                    .lines()
                    .map(str::trim)
                    .filter(|w| !w.is_empty())
                    .map(str::to_lowercase)
                    .collect();
                debug!(path = %path.display(), count = set.len(), "loaded stop-word list");
                set
            }
            Err(_) => {
                debug!(path = %path.display(), "no stop-word file found, using an empty list");
                FxHashSet::default()
            }
        };
        Self { stopwords }
    }

    /// Tokenizes `text`: lowercases, splits on runs of non-alphanumeric characters,
    /// and drops any token that is a stop-word.
    #[must_use]
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        text.to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .filter(|w| !self.stopwords.contains(*w))
            .map(str::to_string)
            .collect()
    }
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new()
    }
}
