//! In-process storage backend.
//!
//! Pyramids live in shared maps keyed by path. Every [`MemoryStore`] handle
//! opened on the same path shares its chunks and its read/write counters,
//! which makes this backend the workhorse of the test suite.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;

use super::{check_chunk_write, check_level_channel, join_path, ChunkStore, PyramidStorage};
use crate::array::{ChunkKey, PyramidDescriptor};
use crate::error::StoreError;

type ChunkMap = Arc<RwLock<HashMap<ChunkKey, Bytes>>>;

#[derive(Clone)]
struct MemoryPyramid {
    descriptor: PyramidDescriptor,
    chunks: ChunkMap,
    counters: Arc<Counters>,
}

#[derive(Default)]
struct Counters {
    reads: AtomicU64,
    writes: AtomicU64,
}

#[derive(Default)]
struct MemoryState {
    pyramids: HashMap<String, MemoryPyramid>,
    /// Documents keyed by directory, then by name.
    documents: HashMap<String, HashMap<String, Bytes>>,
}

/// Storage backend holding pyramids in memory.
///
/// Cloning yields another handle onto the same state.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle onto an existing pyramid without going through `open`.
    pub async fn store(&self, path: &str) -> Option<MemoryStore> {
        let state = self.state.read().await;
        state
            .pyramids
            .get(&normalize(path))
            .map(|p| MemoryStore::from_pyramid(path, p))
    }

    /// A stored document, if present.
    pub async fn document(&self, path: &str, name: &str) -> Option<Bytes> {
        let state = self.state.read().await;
        state
            .documents
            .get(&normalize(path))
            .and_then(|docs| docs.get(name))
            .cloned()
    }

    /// Whether anything (pyramid or document) is stored at or below `path`.
    pub async fn exists(&self, path: &str) -> bool {
        let path = normalize(path);
        let state = self.state.read().await;
        state.pyramids.keys().any(|p| is_within(p, &path))
            || state.documents.keys().any(|p| is_within(p, &path))
    }

    /// Paths of all stored pyramids, sorted.
    pub async fn pyramid_paths(&self) -> Vec<String> {
        let state = self.state.read().await;
        let mut paths: Vec<String> = state.pyramids.keys().cloned().collect();
        paths.sort();
        paths
    }
}

#[async_trait]
impl PyramidStorage for MemoryStorage {
    type Store = MemoryStore;

    async fn open(&self, path: &str) -> Result<MemoryStore, StoreError> {
        self.store(path)
            .await
            .ok_or_else(|| StoreError::NotFound(path.to_string()))
    }

    async fn open_or_create(
        &self,
        path: &str,
        descriptor: &PyramidDescriptor,
    ) -> Result<MemoryStore, StoreError> {
        let key = normalize(path);
        let mut state = self.state.write().await;

        if let Some(existing) = state.pyramids.get_mut(&key) {
            let same_layout = existing.descriptor.chunk_shape() == descriptor.chunk_shape()
                && existing.descriptor.dtype() == descriptor.dtype()
                && existing.descriptor.channels() == descriptor.channels();
            let old = existing.descriptor.clone();
            existing
                .chunks
                .write()
                .await
                .retain(|k, _| {
                    same_layout
                        && match descriptor.level(k.level) {
                            Some(shape) => old.level(k.level) == Some(shape),
                            None => true,
                        }
                });
            existing.descriptor = descriptor.clone();
            return Ok(MemoryStore::from_pyramid(path, existing));
        }

        let pyramid = MemoryPyramid {
            descriptor: descriptor.clone(),
            chunks: Arc::new(RwLock::new(HashMap::new())),
            counters: Arc::new(Counters::default()),
        };
        let store = MemoryStore::from_pyramid(path, &pyramid);
        state.pyramids.insert(key, pyramid);
        Ok(store)
    }

    async fn remove(&self, path: &str) -> Result<(), StoreError> {
        let path = normalize(path);
        let mut state = self.state.write().await;
        state.pyramids.retain(|p, _| !is_within(p, &path));
        state.documents.retain(|p, _| !is_within(p, &path));
        Ok(())
    }

    async fn write_document(
        &self,
        path: &str,
        name: &str,
        contents: Bytes,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state
            .documents
            .entry(normalize(path))
            .or_default()
            .insert(name.to_string(), contents);
        Ok(())
    }

    async fn read_document(&self, path: &str, name: &str) -> Result<Option<Bytes>, StoreError> {
        Ok(self.document(path, name).await)
    }
}

fn normalize(path: &str) -> String {
    join_path(path, "")
}

fn is_within(candidate: &str, root: &str) -> bool {
    root.is_empty()
        || candidate == root
        || (candidate.starts_with(root) && candidate[root.len()..].starts_with('/'))
}

// =============================================================================
// MemoryStore
// =============================================================================

/// Handle onto one in-memory pyramid.
#[derive(Clone)]
pub struct MemoryStore {
    identifier: String,
    descriptor: PyramidDescriptor,
    chunks: ChunkMap,
    counters: Arc<Counters>,
}

impl MemoryStore {
    fn from_pyramid(path: &str, pyramid: &MemoryPyramid) -> Self {
        Self {
            identifier: format!("memory://{}", normalize(path)),
            descriptor: pyramid.descriptor.clone(),
            chunks: pyramid.chunks.clone(),
            counters: pyramid.counters.clone(),
        }
    }

    /// Number of `read_chunk` calls on this pyramid, across all handles.
    pub fn read_count(&self) -> u64 {
        self.counters.reads.load(Ordering::SeqCst)
    }

    /// Number of `write_chunk` calls on this pyramid, across all handles.
    pub fn write_count(&self) -> u64 {
        self.counters.writes.load(Ordering::SeqCst)
    }

    /// Number of chunks stored.
    pub async fn chunk_count(&self) -> usize {
        self.chunks.read().await.len()
    }
}

#[async_trait]
impl ChunkStore for MemoryStore {
    fn descriptor(&self) -> &PyramidDescriptor {
        &self.descriptor
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }

    async fn read_chunk(&self, key: &ChunkKey) -> Result<Option<Bytes>, StoreError> {
        self.counters.reads.fetch_add(1, Ordering::SeqCst);
        check_level_channel(&self.descriptor, key.level, key.channel)?;
        Ok(self.chunks.read().await.get(key).cloned())
    }

    async fn write_chunk(&self, key: &ChunkKey, data: Bytes) -> Result<(), StoreError> {
        self.counters.writes.fetch_add(1, Ordering::SeqCst);
        check_chunk_write(&self.descriptor, key, data.len())?;
        self.chunks.write().await.insert(*key, data);
        Ok(())
    }
}
