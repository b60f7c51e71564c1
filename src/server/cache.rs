//! Synthesized output cache
//!
//! Maps a request digest to the WAV file produced for it. Insertion
//! ordered; once the map grows past its limit the older half is dropped.
//! The key covers the reference audio *content*, so repeating a request
//! with the same recording hits the cache even though every request gets a
//! fresh temp file.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::engine::InferenceMode;

/// Output cache with half-trim eviction
#[derive(Debug)]
pub struct OutputCache {
    entries: HashMap<String, PathBuf>,
    order: VecDeque<String>,
    size_limit: usize,
}

impl OutputCache {
    pub fn new(size_limit: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            size_limit,
        }
    }

    /// SHA-256 over `(text, mode, reference bytes)`, length-prefixed so that
    /// field boundaries cannot be shifted
    pub fn cache_key(text: &str, mode: InferenceMode, reference: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update((text.len() as u64).to_le_bytes());
        hasher.update(text.as_bytes());
        hasher.update(mode.as_str().as_bytes());
        hasher.update((reference.len() as u64).to_le_bytes());
        hasher.update(reference);
        format!("{:x}", hasher.finalize())
    }

    pub fn get(&self, key: &str) -> Option<&PathBuf> {
        self.entries.get(key)
    }

    /// Insert or update an entry, returning the paths no longer referenced:
    /// the path an update replaced plus those of trimmed entries.
    ///
    /// Updating an existing key keeps its original position.
    pub fn insert(&mut self, key: String, path: PathBuf) -> Vec<PathBuf> {
        let replaced = match self.entries.insert(key.clone(), path.clone()) {
            None => {
                self.order.push_back(key);
                None
            }
            Some(old) => Some(old).filter(|old| *old != path),
        };
        let mut released: Vec<PathBuf> = replaced.into_iter().collect();
        released.extend(self.trim());
        released
    }

    pub fn remove(&mut self, key: &str) -> Option<PathBuf> {
        let removed = self.entries.remove(key);
        if removed.is_some() {
            self.order.retain(|k| k != key);
        }
        removed
    }

    /// Drop the older half once over the limit
    fn trim(&mut self) -> Vec<PathBuf> {
        if self.entries.len() <= self.size_limit {
            return Vec::new();
        }
        let drop_count = self.order.len() / 2;
        debug!("Output cache over limit ({} entries), dropping {}", self.entries.len(), drop_count);
        self.order
            .drain(..drop_count)
            .filter_map(|key| self.entries.remove(&key))
            .collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn size_limit(&self) -> usize {
        self.size_limit
    }
}
