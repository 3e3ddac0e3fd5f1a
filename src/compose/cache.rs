//! Write-once cache of composed chunks.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::RwLock;

use crate::array::{Chunk, ChunkKey};
use crate::error::CompositionError;
use crate::store::SingleFlight;

/// How a chunk request was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    /// Served from the cache without any I/O.
    Hit,
    /// This request ran the build.
    Built,
    /// Another request's in-flight build was awaited.
    Shared,
}

/// Materialized output chunks keyed by [`ChunkKey`].
///
/// Entries are committed once and never overwritten; only [`clear`]
/// removes them. At most one build runs per key at any time. A failed build
/// leaves no entry, so the next request builds again.
///
/// [`clear`]: ChunkCache::clear
pub struct ChunkCache {
    entries: RwLock<HashMap<ChunkKey, Chunk>>,
    flights: SingleFlight<ChunkKey, (Chunk, CacheOutcome), CompositionError>,
    hits: AtomicU64,
    builds: AtomicU64,
}

impl ChunkCache {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            flights: SingleFlight::new(),
            hits: AtomicU64::new(0),
            builds: AtomicU64::new(0),
        }
    }

    pub async fn get(&self, key: &ChunkKey) -> Option<Chunk> {
        self.entries.read().await.get(key).cloned()
    }

    /// Return the cached chunk for `key`, or run `build` and commit its
    /// result.
    pub async fn get_or_build<F, Fut>(
        &self,
        key: ChunkKey,
        build: F,
    ) -> Result<(Chunk, CacheOutcome), CompositionError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Chunk, CompositionError>>,
    {
        if let Some(chunk) = self.get(&key).await {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok((chunk, CacheOutcome::Hit));
        }

        let (result, led) = self
            .flights
            .run(key, || async {
                // Committed by a flight that finished after our lookup
                if let Some(chunk) = self.get(&key).await {
                    return Ok((chunk, CacheOutcome::Hit));
                }
                let chunk = build().await?;
                self.builds.fetch_add(1, Ordering::Relaxed);
                let mut entries = self.entries.write().await;
                let committed = entries.entry(key).or_insert(chunk).clone();
                Ok((committed, CacheOutcome::Built))
            })
            .await;

        match result? {
            (chunk, CacheOutcome::Hit) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Ok((chunk, CacheOutcome::Hit))
            }
            (chunk, _) if !led => Ok((chunk, CacheOutcome::Shared)),
            (chunk, outcome) => Ok((chunk, outcome)),
        }
    }

    pub async fn contains(&self, key: &ChunkKey) -> bool {
        self.entries.read().await.contains_key(key)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Drop every entry. Hit and build counters are kept.
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// Requests served from the cache so far.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Successful builds so far.
    pub fn builds(&self) -> u64 {
        self.builds.load(Ordering::Relaxed)
    }
}

impl Default for ChunkCache {
    fn default() -> Self {
        Self::new()
    }
}
