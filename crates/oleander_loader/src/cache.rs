//! Session-wide artifact byte cache and the staged library handed to the sandbox.
//!
//! The cache only grows: artifacts fetched for one run are reused by every
//! later run of the same session, and nothing is evicted until the session
//! is dropped.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use oleander_common::ArtifactPath;
use parking_lot::RwLock;

/// Path → bytes store shared by every run of a session.
#[derive(Default)]
pub struct ArtifactCache {
    entries: RwLock<HashMap<ArtifactPath, Arc<[u8]>>>,
}

/// Size summary of an [`ArtifactCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cached artifacts.
    pub entries: usize,
    /// Total payload bytes.
    pub bytes: usize,
}

impl ArtifactCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached bytes for `path`.
    pub fn get(&self, path: &ArtifactPath) -> Option<Arc<[u8]>> {
        self.entries.read().get(path).cloned()
    }

    /// Returns `true` if `path` is cached.
    pub fn contains(&self, path: &ArtifactPath) -> bool {
        self.entries.read().contains_key(path)
    }

    /// Caches `bytes` under `path`. An existing entry is kept; returns
    /// `true` if the entry was new.
    pub fn insert(&self, path: ArtifactPath, bytes: Arc<[u8]>) -> bool {
        let mut entries = self.entries.write();
        if entries.contains_key(&path) {
            return false;
        }
        entries.insert(path, bytes);
        true
    }

    /// Caches every entry of `files`; returns how many were new.
    pub fn extend(&self, files: impl IntoIterator<Item = (ArtifactPath, Arc<[u8]>)>) -> usize {
        let mut entries = self.entries.write();
        let mut added = 0;
        for (path, bytes) in files {
            if let std::collections::hash_map::Entry::Vacant(slot) = entries.entry(path) {
                slot.insert(bytes);
                added += 1;
            }
        }
        added
    }

    /// Returns the subset of `paths` not yet cached, preserving order.
    pub fn uncached(&self, paths: &[ArtifactPath]) -> Vec<ArtifactPath> {
        let entries = self.entries.read();
        paths
            .iter()
            .filter(|p| !entries.contains_key(*p))
            .cloned()
            .collect()
    }

    /// Collects the cached entries for `paths`. Paths not in the cache are
    /// left out.
    pub fn snapshot(&self, paths: &[ArtifactPath]) -> StagedLibrary {
        let entries = self.entries.read();
        StagedLibrary {
            files: paths
                .iter()
                .filter_map(|p| entries.get(p).map(|bytes| (p.clone(), Arc::clone(bytes))))
                .collect(),
        }
    }

    /// Number of cached artifacts.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns `true` if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Returns entry count and total bytes.
    pub fn stats(&self) -> CacheStats {
        let entries = self.entries.read();
        CacheStats {
            entries: entries.len(),
            bytes: entries.values().map(|b| b.len()).sum(),
        }
    }
}

/// The artifact files ready to be written into the sandbox filesystem,
/// keyed and ordered by path.
#[derive(Debug, Clone, Default)]
pub struct StagedLibrary {
    files: BTreeMap<ArtifactPath, Arc<[u8]>>,
}

impl StagedLibrary {
    /// Returns the bytes staged for `path`.
    pub fn get(&self, path: &ArtifactPath) -> Option<&[u8]> {
        self.files.get(path).map(|b| &b[..])
    }

    /// Iterates over staged files in path order.
    pub fn iter(&self) -> impl Iterator<Item = (&ArtifactPath, &[u8])> {
        self.files.iter().map(|(p, b)| (p, &b[..]))
    }

    /// Number of staged files.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Returns `true` if nothing is staged.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Total payload bytes.
    pub fn total_bytes(&self) -> usize {
        self.files.values().map(|b| b.len()).sum()
    }

    /// Returns `(name, bytes)` pairs with owned copies of the data.
    pub fn to_files(&self) -> Vec<(String, Vec<u8>)> {
        self.files
            .iter()
            .map(|(p, b)| (p.as_str().to_string(), b.to_vec()))
            .collect()
    }
}

impl FromIterator<(ArtifactPath, Arc<[u8]>)> for StagedLibrary {
    fn from_iter<I: IntoIterator<Item = (ArtifactPath, Arc<[u8]>)>>(iter: I) -> Self {
        Self {
            files: iter.into_iter().collect(),
        }
    }
}
