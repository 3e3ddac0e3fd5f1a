//! On-demand composition of many source pyramids into one output pyramid.
//!
//! # Request flow
//!
//! ```text
//! get_chunk(level, channel, y, x[, z])
//!   │ validate: configured → level → channel → chunk grid
//!   ▼
//! ChunkCache ── hit ──────────────────────────────► Chunk
//!   │ miss (single flight per key)
//!   ▼
//! build: intersect chunk box with placed sources
//!   │ read overlaps concurrently (ChunkReadCache per source)
//!   │ assemble into zero-filled buffer
//!   ▼
//! write output chunk ──► commit to cache ─────────► Chunk
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::RwLock;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::cache::{CacheOutcome, ChunkCache};
use super::map::{CompositionMap, Placement};
use super::source::{SourcePyramid, IMAGE_GROUP};
use crate::array::{
    copy_box, downsample_factor, Chunk, ChunkIndex, ChunkKey, ChunkShape, PyramidDescriptor,
    Region, SpatialShape,
};
use crate::error::CompositionError;
use crate::generate::{task, Executor, Task};
use crate::metadata::{
    to_json_bytes, GroupMetadata, MultiscaleAttributes, OmeMetadata, PhysicalSize, OME_XML,
    ZATTRS, ZGROUP,
};
use crate::store::{
    join_path, paths_overlap, ChunkStore, PyramidStorage, DEFAULT_READ_CACHE_CAPACITY,
};

/// Default output chunk extent along y and x.
pub const DEFAULT_CHUNK_SIZE: u64 = 1024;

// =============================================================================
// Options, requests and responses
// =============================================================================

/// Settings for a [`PyramidCompositor`].
#[derive(Debug, Clone)]
pub struct CompositorOptions {
    /// Output chunk shape (`z`, `y`, `x`).
    pub chunk_shape: ChunkShape,
    /// Image name written to the metadata documents.
    pub name: String,
    /// Destination channel names; missing names default to `Channel <i>`.
    pub channel_names: Vec<String>,
    /// Physical size of one level-0 voxel.
    pub pixel_size: Option<PhysicalSize>,
    /// Read cache capacity per source, in chunks.
    pub source_cache_chunks: usize,
}

impl Default for CompositorOptions {
    fn default() -> Self {
        Self {
            chunk_shape: ChunkShape::new(1, DEFAULT_CHUNK_SIZE, DEFAULT_CHUNK_SIZE),
            name: "composition".to_string(),
            channel_names: Vec::new(),
            pixel_size: None,
            source_cache_chunks: DEFAULT_READ_CACHE_CAPACITY,
        }
    }
}

/// Identifies one output chunk by level, channel and grid position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkRequest {
    pub level: usize,
    pub channel: u32,
    pub z: u64,
    pub y: u64,
    pub x: u64,
}

impl ChunkRequest {
    /// A request for chunk row `y` and column `x` of the first z plane.
    pub fn new(level: usize, channel: u32, y: u64, x: u64) -> Self {
        Self {
            level,
            channel,
            z: 0,
            y,
            x,
        }
    }

    pub fn with_z(mut self, z: u64) -> Self {
        self.z = z;
        self
    }

    fn key(&self) -> ChunkKey {
        ChunkKey::new(self.level, self.channel, ChunkIndex::new(self.z, self.y, self.x))
    }
}

/// A materialized chunk and how it was obtained.
#[derive(Debug, Clone)]
pub struct ChunkResponse {
    pub chunk: Chunk,
    pub outcome: CacheOutcome,
}

impl ChunkResponse {
    /// Whether the chunk came straight from the cache.
    pub fn cache_hit(&self) -> bool {
        self.outcome == CacheOutcome::Hit
    }
}

// =============================================================================
// Composition state
// =============================================================================

/// One entry resolved against its source: per-level origin and extent.
#[derive(Debug, Clone)]
struct Placed {
    source: usize,
    source_channel: u32,
    origins: Vec<[u64; 3]>,
    extents: Vec<SpatialShape>,
}

impl Placed {
    fn region(&self, level: usize) -> Region {
        Region::from_origin(self.origins[level], self.extents[level])
    }
}

/// Everything owned by an active composition.
struct Composition<S> {
    descriptor: PyramidDescriptor,
    sources: Vec<Arc<SourcePyramid<S>>>,
    /// Placements per destination channel.
    channels: Vec<Vec<Placed>>,
    output: S,
}

impl<S: ChunkStore + 'static> Composition<S> {
    async fn close(&self) {
        for source in &self.sources {
            source.close().await;
        }
    }

    /// Assemble one output chunk from the sources and write it out.
    async fn build_chunk(&self, key: ChunkKey) -> Result<Chunk, CompositionError> {
        let region = self.descriptor.chunk_region(&key).ok_or_else(|| {
            chunk_out_of_bounds(&self.descriptor, key)
        })?;
        let extent = region.extent();
        let dtype = self.descriptor.dtype();
        let elem = dtype.size();
        let mut buffer = vec![0u8; extent.voxels() as usize * elem];

        let mut reads = JoinSet::new();
        for placed in &self.channels[key.channel as usize] {
            let origin = placed.origins[key.level];
            let Some(overlap) = region.intersect(&placed.region(key.level)) else {
                continue;
            };
            let source = self.sources[placed.source].clone();
            let source_region = overlap.relative_to(origin);
            let (level, channel) = (key.level, placed.source_channel);
            reads.spawn(async move {
                let data = source.read_region(level, channel, &source_region).await;
                (overlap, source.path().to_string(), data)
            });
        }

        let pieces = reads.len();
        while let Some(joined) = reads.join_next().await {
            let (overlap, path, data) = joined.map_err(|e| CompositionError::BuildAborted {
                key,
                message: e.to_string(),
            })?;
            let data = data.map_err(|source| CompositionError::Source { path, source })?;
            copy_box(
                &data,
                overlap.extent(),
                [0, 0, 0],
                &mut buffer,
                extent,
                overlap.relative_to(region.start).start,
                overlap.extent(),
                elem,
            );
        }

        let data = Bytes::from(buffer);
        self.output.write_chunk(&key, data.clone()).await?;
        debug!("Built {} from {} source piece(s)", key, pieces);

        Ok(Chunk {
            key,
            extent,
            dtype,
            data,
        })
    }
}

fn chunk_out_of_bounds(descriptor: &PyramidDescriptor, key: ChunkKey) -> CompositionError {
    let grid = descriptor.chunk_grid(key.level).unwrap_or_default();
    CompositionError::ChunkOutOfBounds {
        key,
        grid_z: grid.z,
        grid_y: grid.y,
        grid_x: grid.x,
    }
}

// =============================================================================
// PyramidCompositor
// =============================================================================

/// Composes source pyramids into an output pyramid, one chunk at a time.
///
/// The output hierarchy under `output` is:
///
/// ```text
/// <output>/METADATA.ome.xml
/// <output>/.zgroup
/// <output>/data.zarr/.zgroup
/// <output>/data.zarr/0/.zgroup
/// <output>/data.zarr/0/.zattrs
/// <output>/data.zarr/0/<level>/...
/// ```
///
/// `get_chunk` holds a shared lock on the composition for its whole
/// duration; `set_composition` and `reset_composition` take it exclusively
/// and therefore wait for in-flight builds.
pub struct PyramidCompositor<P: PyramidStorage> {
    storage: P,
    output: String,
    options: CompositorOptions,
    state: RwLock<Option<Composition<P::Store>>>,
    cache: ChunkCache,
}

impl<P: PyramidStorage> PyramidCompositor<P> {
    pub fn new(storage: P, output: impl Into<String>, options: CompositorOptions) -> Self {
        Self {
            storage,
            output: output.into(),
            options,
            state: RwLock::new(None),
            cache: ChunkCache::new(),
        }
    }

    /// Root of the output hierarchy.
    pub fn output_path(&self) -> &str {
        &self.output
    }

    /// Path of the image group holding the level arrays.
    pub fn image_path(&self) -> String {
        join_path(&self.output, IMAGE_GROUP)
    }

    pub fn storage(&self) -> &P {
        &self.storage
    }

    /// Descriptor of the active composition.
    pub async fn descriptor(&self) -> Option<PyramidDescriptor> {
        self.state.read().await.as_ref().map(|c| c.descriptor.clone())
    }

    /// Number of cached chunks.
    pub async fn cache_len(&self) -> usize {
        self.cache.len().await
    }

    /// Region reads served by the active sources.
    pub async fn source_read_count(&self) -> u64 {
        self.state
            .read()
            .await
            .as_ref()
            .map(|c| c.sources.iter().map(|s| s.read_count()).sum())
            .unwrap_or(0)
    }

    /// Validate `map` against its sources and make it the active
    /// composition.
    ///
    /// Sources are opened and checked before the current composition is
    /// touched, so a rejected map leaves the previous one in place.
    pub async fn set_composition(
        &self,
        map: CompositionMap,
    ) -> Result<PyramidDescriptor, CompositionError> {
        let (sources, channels, descriptor) = self.resolve(&map).await?;

        let mut state = self.state.write().await;
        if let Some(previous) = state.take() {
            previous.close().await;
        }
        self.cache.clear().await;
        self.storage.remove(&self.output).await?;

        let output = self
            .storage
            .create(&self.image_path(), &descriptor)
            .await?;
        self.write_auxiliary_files(&descriptor).await?;

        info!(
            "Composition set: {} entries from {} sources, {} channels, {} levels, level 0 {}",
            map.entries().len(),
            sources.len(),
            descriptor.channels(),
            descriptor.level_count(),
            descriptor.level(0).unwrap_or_default()
        );

        *state = Some(Composition {
            descriptor: descriptor.clone(),
            sources,
            channels,
            output,
        });
        Ok(descriptor)
    }

    /// Drop the active composition: close sources, clear the cache and
    /// delete the output. Succeeds when nothing is set.
    pub async fn reset_composition(&self) -> Result<(), CompositionError> {
        let mut state = self.state.write().await;
        if let Some(previous) = state.take() {
            previous.close().await;
            info!("Composition reset");
        }
        self.cache.clear().await;
        self.storage.remove(&self.output).await?;
        Ok(())
    }

    /// Return one output chunk, building it on first request.
    pub async fn get_chunk(&self, request: ChunkRequest) -> Result<ChunkResponse, CompositionError> {
        let state = self.state.read().await;
        let composition = state.as_ref().ok_or(CompositionError::NotConfigured)?;
        let descriptor = &composition.descriptor;

        if request.level > descriptor.max_level() {
            return Err(CompositionError::LevelOutOfRange {
                level: request.level,
                max_level: descriptor.max_level(),
            });
        }
        if request.channel >= descriptor.channels() {
            return Err(CompositionError::ChannelOutOfRange {
                channel: request.channel,
                channels: descriptor.channels(),
            });
        }
        let key = request.key();
        let grid = descriptor.chunk_grid(request.level).unwrap_or_default();
        if request.z >= grid.z || request.y >= grid.y || request.x >= grid.x {
            return Err(chunk_out_of_bounds(descriptor, key));
        }

        let result = self
            .cache
            .get_or_build(key, || composition.build_chunk(key))
            .await;

        match result {
            Ok((chunk, outcome)) => {
                if outcome == CacheOutcome::Hit {
                    debug!("Cache hit for {}", key);
                }
                Ok(ChunkResponse { chunk, outcome })
            }
            Err(e) => {
                warn!("Failed to build {}: {}", key, e);
                Err(e)
            }
        }
    }

    /// Write the OME-XML sidecar, group markers and multiscale attributes
    /// for the active composition. Safe to call repeatedly.
    pub async fn create_auxiliary_files(&self) -> Result<(), CompositionError> {
        let state = self.state.read().await;
        let composition = state.as_ref().ok_or(CompositionError::NotConfigured)?;
        self.write_auxiliary_files(&composition.descriptor).await
    }

    async fn write_auxiliary_files(
        &self,
        descriptor: &PyramidDescriptor,
    ) -> Result<(), CompositionError> {
        let metadata_error = |e: serde_json::Error| CompositionError::Metadata(e.to_string());

        let ome = OmeMetadata::from_descriptor(
            descriptor,
            &self.options.name,
            &self.options.channel_names,
            self.options.pixel_size.clone(),
        );
        self.storage
            .write_document(&self.output, OME_XML, Bytes::from(ome.to_xml()))
            .await?;

        let group = to_json_bytes(&GroupMetadata::default()).map_err(metadata_error)?;
        let image_path = self.image_path();
        for path in [
            self.output.clone(),
            join_path(&self.output, "data.zarr"),
            image_path.clone(),
        ] {
            self.storage
                .write_document(&path, ZGROUP, group.clone())
                .await?;
        }

        let attrs = MultiscaleAttributes::for_pyramid(
            descriptor,
            &self.options.name,
            self.options.pixel_size.as_ref(),
            None,
        );
        let attrs = to_json_bytes(&attrs).map_err(metadata_error)?;
        self.storage.write_document(&image_path, ZATTRS, attrs).await?;

        debug!("Wrote auxiliary files under {}", self.output);
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Validation against sources
    // -------------------------------------------------------------------------

    #[allow(clippy::type_complexity)]
    async fn resolve(
        &self,
        map: &CompositionMap,
    ) -> Result<
        (
            Vec<Arc<SourcePyramid<P::Store>>>,
            Vec<Vec<Placed>>,
            PyramidDescriptor,
        ),
        CompositionError,
    > {
        let invalid = |reason: String| CompositionError::InvalidComposition { reason };

        // The output is deleted when the composition is set
        for path in map.source_paths() {
            if paths_overlap(path, &self.output) {
                return Err(invalid(format!(
                    "source {} overlaps the output {}",
                    path, self.output
                )));
            }
        }

        // Open each distinct source once
        let mut sources = Vec::new();
        let mut index_of = HashMap::new();
        for path in map.source_paths() {
            let source =
                SourcePyramid::open(&self.storage, path, self.options.source_cache_chunks)
                    .await
                    .map_err(|source| CompositionError::SourceUnavailable {
                        path: path.to_string(),
                        source,
                    })?;
            index_of.insert(path.to_string(), sources.len());
            sources.push(Arc::new(source));
        }

        let dtype = sources[0].descriptor().dtype();
        for source in &sources {
            if source.descriptor().dtype() != dtype {
                return Err(invalid(format!(
                    "source {} has type {} but {} has type {}",
                    source.path(),
                    source.descriptor().dtype(),
                    sources[0].path(),
                    dtype
                )));
            }
        }

        let levels = sources
            .iter()
            .map(|s| s.descriptor().level_count())
            .min()
            .unwrap_or(0);
        if levels == 0 {
            return Err(invalid("sources have no levels".to_string()));
        }
        let coarsest = downsample_factor(levels - 1);

        // Grid cells all take the unit image shape
        let unit: Option<Vec<SpatialShape>> = if map.is_grid() {
            let unit: Vec<SpatialShape> = sources[0].descriptor().levels()[..levels].to_vec();
            for source in &sources {
                if source.descriptor().levels()[..levels] != unit[..] {
                    return Err(invalid(format!(
                        "grid source {} has shape {} but {} has shape {}",
                        source.path(),
                        source.descriptor().levels()[0],
                        sources[0].path(),
                        unit[0]
                    )));
                }
            }
            Some(unit)
        } else {
            None
        };

        let channel_count = map.channels();
        let mut channels: Vec<Vec<Placed>> = vec![Vec::new(); channel_count as usize];
        for entry in map.entries() {
            let source_index = index_of[entry.source.as_str()];
            let source = &sources[source_index];
            let source_desc = source.descriptor();
            if entry.source_channel >= source_desc.channels() {
                return Err(invalid(format!(
                    "source channel {} of {} out of range ({} channels)",
                    entry.source_channel,
                    entry.source,
                    source_desc.channels()
                )));
            }

            let extents = source_desc.levels()[..levels].to_vec();
            let origins: Vec<[u64; 3]> = match (entry.placement, &unit) {
                (Placement::Offset { y, x }, _) => {
                    if y % coarsest != 0 || x % coarsest != 0 {
                        return Err(invalid(format!(
                            "offset ({}, {}) of {} is not divisible by {} (required for {} levels)",
                            y, x, entry.source, coarsest, levels
                        )));
                    }
                    (0..levels)
                        .map(|l| {
                            let f = downsample_factor(l);
                            [0, y / f, x / f]
                        })
                        .collect()
                }
                (Placement::Grid { row, col }, Some(unit)) => unit
                    .iter()
                    .map(|cell| [0, row * cell.y, col * cell.x])
                    .collect(),
                (Placement::Grid { .. }, None) => {
                    return Err(invalid("grid placement in an offset map".to_string()));
                }
            };

            channels[entry.channel as usize].push(Placed {
                source: source_index,
                source_channel: entry.source_channel,
                origins,
                extents,
            });
        }

        // Entries of one channel must not overlap
        for (channel, placed) in channels.iter().enumerate() {
            for (i, a) in placed.iter().enumerate() {
                for b in &placed[i + 1..] {
                    if a.region(0).intersect(&b.region(0)).is_some() {
                        return Err(invalid(format!(
                            "{} and {} overlap on channel {} ({} vs {})",
                            sources[a.source].path(),
                            sources[b.source].path(),
                            channel,
                            a.region(0),
                            b.region(0)
                        )));
                    }
                }
            }
        }

        // Per-level output extent: union of placed rectangles
        let level_shapes = (0..levels)
            .map(|l| {
                channels
                    .iter()
                    .flatten()
                    .fold(SpatialShape::new(0, 0, 0), |acc, p| {
                        acc.max(&SpatialShape::from_array(p.region(l).end))
                    })
            })
            .collect();
        let descriptor = PyramidDescriptor::new(
            level_shapes,
            channel_count,
            self.options.chunk_shape,
            dtype,
        );
        if !descriptor.follows_halving_law() {
            debug!("Composed level shapes deviate from the halving law");
        }

        Ok((sources, channels, descriptor))
    }
}

impl<P> PyramidCompositor<P>
where
    P: PyramidStorage + 'static,
{
    /// Build every chunk of `level` (or of all levels) on `executor`. Chunks
    /// already cached are skipped. Returns the number of chunks built.
    pub async fn materialize<E: Executor>(
        self: &Arc<Self>,
        executor: &E,
        level: Option<usize>,
    ) -> Result<usize, CompositionError> {
        let descriptor = self
            .descriptor()
            .await
            .ok_or(CompositionError::NotConfigured)?;
        let levels: Vec<usize> = match level {
            Some(level) if level > descriptor.max_level() => {
                return Err(CompositionError::LevelOutOfRange {
                    level,
                    max_level: descriptor.max_level(),
                });
            }
            Some(level) => vec![level],
            None => (0..descriptor.level_count()).collect(),
        };

        let mut keys = Vec::new();
        let mut tasks: Vec<Task<Result<bool, CompositionError>>> = Vec::new();
        for level in levels {
            for key in descriptor.chunk_keys(level) {
                let compositor = self.clone();
                let request = ChunkRequest::new(key.level, key.channel, key.index.y, key.index.x)
                    .with_z(key.index.z);
                keys.push(key);
                tasks.push(task(async move {
                    let response = compositor.get_chunk(request).await?;
                    Ok(!response.cache_hit())
                }));
            }
        }

        let total = tasks.len();
        let mut built = 0;
        for (key, result) in keys.into_iter().zip(executor.execute(tasks).await) {
            let fresh = result.map_err(|e| CompositionError::BuildAborted {
                key,
                message: e.to_string(),
            })??;
            if fresh {
                built += 1;
            }
        }
        info!("Materialized {} of {} chunks", built, total);
        Ok(built)
    }
}
