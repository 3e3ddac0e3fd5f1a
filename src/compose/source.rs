//! Read-only access to the source pyramids of a composition.
//!
//! A source path names either a pyramid directly or an image root whose
//! levels live under [`IMAGE_GROUP`].

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use bytes::Bytes;

use crate::array::{PyramidDescriptor, Region};
use crate::error::StoreError;
use crate::store::{join_path, ChunkReadCache, ChunkStore, PyramidStorage};
use crate::metadata::ZATTRS;

/// Group under which composed and converted images keep their levels.
pub const IMAGE_GROUP: &str = "data.zarr/0";

/// Read-only handle onto one source pyramid.
///
/// Reads go through a [`ChunkReadCache`]; neighbouring output chunks
/// usually overlap the same source chunks. After [`close`](Self::close)
/// every read fails.
pub struct SourcePyramid<S> {
    path: String,
    store: ChunkReadCache<S>,
    reads: AtomicU64,
    closed: AtomicBool,
}

impl<S: ChunkStore + 'static> SourcePyramid<S> {
    pub fn new(path: impl Into<String>, store: S, cache_chunks: usize) -> Self {
        Self {
            path: path.into(),
            store: ChunkReadCache::with_capacity(store, cache_chunks),
            reads: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Open `path` through `storage`, preferring its `data.zarr/0` image
    /// group when one exists.
    pub async fn open<P>(storage: &P, path: &str, cache_chunks: usize) -> Result<Self, StoreError>
    where
        P: PyramidStorage<Store = S>,
    {
        let nested = join_path(path, IMAGE_GROUP);
        let store = if storage.read_document(&nested, ZATTRS).await?.is_some() {
            storage.open(&nested).await?
        } else {
            storage.open(path).await?
        };
        Ok(Self::new(path, store, cache_chunks))
    }

    /// Path as given in the composition map.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn descriptor(&self) -> &PyramidDescriptor {
        self.store.descriptor()
    }

    /// Read a region of one level and channel.
    pub async fn read_region(
        &self,
        level: usize,
        channel: u32,
        region: &Region,
    ) -> Result<Bytes, StoreError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::Closed(self.path.clone()));
        }
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.store.read_region(level, channel, region).await
    }

    /// Number of region reads served.
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }

    /// Release cached data and refuse further reads.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.store.clear().await;
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
