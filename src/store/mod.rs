//! Chunk store layer.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │   PyramidCompositor / PyramidGenerator  │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │           PyramidStorage Trait          │
//! │  (open / create / remove / documents)   │
//! └────────────────────┬────────────────────┘
//!                      │ opens
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │             ChunkStore Trait            │
//! │  (read_chunk / write_chunk / regions)   │
//! └────────────────────┬────────────────────┘
//!          ┌───────────┴───────────┐
//!          ▼                       ▼
//! ┌─────────────────┐    ┌─────────────────────┐
//! │ FilesystemStore │    │    MemoryStore      │
//! │ (zarr v2 raw)   │    │  (in-process)       │
//! └─────────────────┘    └─────────────────────┘
//! ```
//!
//! [`ChunkReadCache`] wraps any store with an LRU of decoded chunks, used on
//! the read side for source pyramids.

mod filesystem;
mod flight;
mod memory;
mod read_cache;

use async_trait::async_trait;
use bytes::Bytes;

use crate::array::{copy_box, ChunkIndex, ChunkKey, PyramidDescriptor, Region, X, Y, Z};
use crate::error::StoreError;

pub use filesystem::{FilesystemStorage, FilesystemStore};
pub use flight::SingleFlight;
pub use memory::{MemoryStorage, MemoryStore};
pub use read_cache::{ChunkReadCache, DEFAULT_READ_CACHE_CAPACITY};

// =============================================================================
// ChunkStore Trait
// =============================================================================

/// An opened chunked multiscale array.
///
/// Chunk payloads are dense C-order `(z, y, x)` little-endian buffers at the
/// chunk's truncated extent (see [`PyramidDescriptor::chunk_region`]).
/// Implementations must tolerate concurrent writes to distinct chunks.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Layout of the levels this handle was opened with.
    fn descriptor(&self) -> &PyramidDescriptor;

    /// Identifier for logging (path or URI).
    fn identifier(&self) -> &str;

    /// Read one chunk. Returns `None` if the chunk was never written, in
    /// which case it reads as the fill value (zero).
    async fn read_chunk(&self, key: &ChunkKey) -> Result<Option<Bytes>, StoreError>;

    /// Write one chunk.
    ///
    /// The write is atomic with respect to readers: a concurrent reader sees
    /// either the previous contents or the new contents.
    async fn write_chunk(&self, key: &ChunkKey, data: Bytes) -> Result<(), StoreError>;

    /// Read an arbitrary region of one level and channel.
    ///
    /// Unwritten chunks contribute zeros.
    async fn read_region(
        &self,
        level: usize,
        channel: u32,
        region: &Region,
    ) -> Result<Bytes, StoreError> {
        let descriptor = self.descriptor();
        let shape = check_level_channel(descriptor, level, channel)?;
        if region.is_empty() || !Region::full(shape).contains(region) {
            return Err(StoreError::RegionOutOfBounds {
                level,
                message: format!("region {} outside level shape {}", region, shape),
            });
        }

        let elem = descriptor.dtype().size();
        let out_shape = region.extent();
        let mut out = vec![0u8; out_shape.voxels() as usize * elem];

        let chunk = descriptor.chunk_shape().to_array();
        let first = [
            region.start[Z] / chunk[Z],
            region.start[Y] / chunk[Y],
            region.start[X] / chunk[X],
        ];
        let last = [
            (region.end[Z] - 1) / chunk[Z],
            (region.end[Y] - 1) / chunk[Y],
            (region.end[X] - 1) / chunk[X],
        ];

        for cz in first[Z]..=last[Z] {
            for cy in first[Y]..=last[Y] {
                for cx in first[X]..=last[X] {
                    let key = ChunkKey::new(level, channel, ChunkIndex::new(cz, cy, cx));
                    let Some(chunk_region) = descriptor.chunk_region(&key) else {
                        continue;
                    };
                    let Some(overlap) = chunk_region.intersect(region) else {
                        continue;
                    };
                    let Some(data) = self.read_chunk(&key).await? else {
                        continue;
                    };
                    let chunk_extent = chunk_region.extent();
                    let expected = chunk_extent.voxels() as usize * elem;
                    if data.len() != expected {
                        return Err(StoreError::BufferSize {
                            expected,
                            actual: data.len(),
                        });
                    }
                    copy_box(
                        &data,
                        chunk_extent,
                        overlap.relative_to(chunk_region.start).start,
                        &mut out,
                        out_shape,
                        overlap.relative_to(region.start).start,
                        overlap.extent(),
                        elem,
                    );
                }
            }
        }

        Ok(Bytes::from(out))
    }
}

/// Validate level and channel against a descriptor, returning the level's
/// spatial shape.
pub(crate) fn check_level_channel(
    descriptor: &PyramidDescriptor,
    level: usize,
    channel: u32,
) -> Result<crate::array::SpatialShape, StoreError> {
    let shape = descriptor.level(level).ok_or(StoreError::LevelNotFound {
        level,
        levels: descriptor.level_count(),
    })?;
    if channel >= descriptor.channels() {
        return Err(StoreError::ChannelOutOfRange {
            channel,
            channels: descriptor.channels(),
        });
    }
    Ok(shape)
}

/// Validate a chunk write, returning the chunk's region.
pub(crate) fn check_chunk_write(
    descriptor: &PyramidDescriptor,
    key: &ChunkKey,
    len: usize,
) -> Result<Region, StoreError> {
    check_level_channel(descriptor, key.level, key.channel)?;
    let region = descriptor
        .chunk_region(key)
        .ok_or_else(|| StoreError::RegionOutOfBounds {
            level: key.level,
            message: format!("{} outside chunk grid", key),
        })?;
    let expected = region.extent().voxels() as usize * descriptor.dtype().size();
    if len != expected {
        return Err(StoreError::BufferSize {
            expected,
            actual: len,
        });
    }
    Ok(region)
}

// =============================================================================
// PyramidStorage Trait
// =============================================================================

/// A storage backend that opens, creates and removes pyramids by path.
///
/// This abstraction lets the engines work with different backends
/// (local filesystem, in-memory) without being tied to one.
#[async_trait]
pub trait PyramidStorage: Send + Sync {
    /// The store type this backend opens.
    type Store: ChunkStore + 'static;

    /// Open an existing pyramid for reading and writing.
    async fn open(&self, path: &str) -> Result<Self::Store, StoreError>;

    /// Open a pyramid, creating any level of `descriptor` that is missing
    /// or whose layout differs. Matching existing levels and their chunks
    /// are kept.
    async fn open_or_create(
        &self,
        path: &str,
        descriptor: &PyramidDescriptor,
    ) -> Result<Self::Store, StoreError>;

    /// Create a pyramid, deleting anything previously stored at `path`.
    async fn create(
        &self,
        path: &str,
        descriptor: &PyramidDescriptor,
    ) -> Result<Self::Store, StoreError> {
        self.remove(path).await?;
        self.open_or_create(path, descriptor).await
    }

    /// Remove everything stored under `path`. Succeeds if nothing exists.
    async fn remove(&self, path: &str) -> Result<(), StoreError>;

    /// Write a metadata document (`.zattrs`, `.zgroup`, OME-XML) named
    /// `name` in directory `path`.
    async fn write_document(&self, path: &str, name: &str, contents: Bytes)
        -> Result<(), StoreError>;

    /// Read a metadata document, or `None` if absent.
    async fn read_document(&self, path: &str, name: &str) -> Result<Option<Bytes>, StoreError>;
}

/// Join two storage path segments with `/`.
pub fn join_path(base: &str, child: &str) -> String {
    let base = base.trim_end_matches('/');
    let child = child.trim_start_matches('/');
    if base.is_empty() {
        child.to_string()
    } else if child.is_empty() {
        base.to_string()
    } else {
        format!("{}/{}", base, child)
    }
}

/// Whether one path equals the other or lies beneath it.
pub fn paths_overlap(a: &str, b: &str) -> bool {
    path_components(a)
        .zip(path_components(b))
        .all(|(x, y)| x == y)
}

fn path_components(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|c| !c.is_empty() && *c != ".")
}
