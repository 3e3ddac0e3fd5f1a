//! LRU chunk cache for source reads.

use std::num::NonZeroUsize;

use async_trait::async_trait;
use bytes::Bytes;
use lru::LruCache;
use tokio::sync::Mutex;

use super::{ChunkStore, SingleFlight};
use crate::array::{ChunkKey, PyramidDescriptor};
use crate::error::StoreError;

/// Default capacity in chunks.
/// 64 chunks * 1024x1024 u16 = 128MB worst case.
pub const DEFAULT_READ_CACHE_CAPACITY: usize = 64;

/// Chunk-level read cache that wraps any [`ChunkStore`].
///
/// Source pyramids are read in overlapping regions by neighbouring output
/// chunks, so the same source chunk is typically fetched several times in a
/// row. This cache keeps recently used chunks:
/// - LRU eviction when the cache reaches capacity
/// - Singleflight: concurrent reads of the same chunk share one fetch
/// - Absent chunks are cached too (as `None`)
/// - Writes go through to the inner store and refresh the cached entry
pub struct ChunkReadCache<S> {
    inner: S,
    cache: Mutex<LruCache<ChunkKey, Option<Bytes>>>,
    flights: SingleFlight<ChunkKey, Option<Bytes>, StoreError>,
}

impl<S: ChunkStore> ChunkReadCache<S> {
    /// Wrap `inner` with the default capacity.
    pub fn new(inner: S) -> Self {
        Self::with_capacity(inner, DEFAULT_READ_CACHE_CAPACITY)
    }

    /// Wrap `inner` caching at most `capacity` chunks (minimum 1).
    pub fn with_capacity(inner: S, capacity: usize) -> Self {
        Self {
            inner,
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
            )),
            flights: SingleFlight::new(),
        }
    }

    /// The wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Number of cached chunks.
    pub async fn len(&self) -> usize {
        self.cache.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.cache.lock().await.is_empty()
    }

    /// Drop every cached chunk.
    pub async fn clear(&self) {
        self.cache.lock().await.clear();
    }
}

#[async_trait]
impl<S: ChunkStore + 'static> ChunkStore for ChunkReadCache<S> {
    fn descriptor(&self) -> &PyramidDescriptor {
        self.inner.descriptor()
    }

    fn identifier(&self) -> &str {
        self.inner.identifier()
    }

    async fn read_chunk(&self, key: &ChunkKey) -> Result<Option<Bytes>, StoreError> {
        // Fast path: check cache
        if let Some(data) = self.cache.lock().await.get(key) {
            return Ok(data.clone());
        }

        let (result, _) = self
            .flights
            .run(*key, || async {
                // A previous leader may have filled the entry since our check
                if let Some(data) = self.cache.lock().await.peek(key) {
                    return Ok(data.clone());
                }
                let data = self.inner.read_chunk(key).await?;
                self.cache.lock().await.put(*key, data.clone());
                Ok(data)
            })
            .await;
        result
    }

    async fn write_chunk(&self, key: &ChunkKey, data: Bytes) -> Result<(), StoreError> {
        self.inner.write_chunk(key, data.clone()).await?;
        self.cache.lock().await.put(*key, Some(data));
        Ok(())
    }
}
