//! Derivation of pyramid levels from a base level.
//!
//! Every level `l` is reduced straight from level 0 by averaging `2^l`
//! blocks, so levels do not depend on each other and run as independent
//! units on an [`Executor`]. Chunks within a level run as tasks bounded by
//! a semaphore shared across levels; each permit covers one base block of
//! `chunk_shape * 2^l` voxels in memory.

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::executor::{available_cores, Executor, Task};
use super::reduce::{reduce_mean, reduced_extent};
use crate::array::{downsample_factor, ChunkKey, PyramidDescriptor, Region, SpatialShape, X, Y, Z};
use crate::error::{GenerateError, StoreError};
use crate::metadata::{to_json_bytes, GroupMetadata, MultiscaleAttributes, PhysicalSize, ZATTRS, ZGROUP};
use crate::store::{ChunkStore, PyramidStorage};

/// Highest derived level a generator accepts.
pub const MAX_LEVELS: usize = 30;

/// Settings for a [`PyramidGenerator`].
#[derive(Debug, Clone)]
pub struct GeneratorOptions {
    /// Chunk tasks allowed in flight across all levels.
    pub workers: usize,
    /// Image name written to the multiscale attributes.
    pub name: String,
    /// Downsampling method recorded in the multiscale attributes.
    pub method: String,
    pub pixel_size: Option<PhysicalSize>,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        Self {
            workers: available_cores(),
            name: "image".to_string(),
            method: "mean".to_string(),
            pixel_size: None,
        }
    }
}

/// Outcome of one generated level.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelReport {
    pub level: usize,
    pub shape: [u64; 4],
    pub chunks_written: usize,
    pub elapsed_ms: u64,
}

/// Outcome of a [`PyramidGenerator::generate_pyramid`] run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationReport {
    pub base_shape: [u64; 4],
    pub levels: Vec<LevelReport>,
}

/// Generates downsampled levels of the pyramid at one path.
pub struct PyramidGenerator<P: PyramidStorage, E: Executor> {
    storage: P,
    path: String,
    base: Arc<P::Store>,
    executor: E,
    options: GeneratorOptions,
    permits: Arc<Semaphore>,
}

impl<P, E> PyramidGenerator<P, E>
where
    P: PyramidStorage,
    E: Executor,
{
    /// Open the pyramid at `path`; its level 0 is the base for every
    /// derived level.
    pub async fn open(
        storage: P,
        path: impl Into<String>,
        executor: E,
        options: GeneratorOptions,
    ) -> Result<Self, GenerateError> {
        let path = path.into();
        let base = storage.open(&path).await?;
        check_dataset_paths(&storage, &path).await?;
        debug!(
            "Opened base {} ({} channels, level 0 {})",
            base.identifier(),
            base.descriptor().channels(),
            base.descriptor().level(0).unwrap_or_default()
        );
        let permits = Arc::new(Semaphore::new(options.workers.max(1)));
        Ok(Self {
            storage,
            path,
            base: Arc::new(base),
            executor,
            options,
            permits,
        })
    }

    /// Layout of the base pyramid as opened.
    pub fn base_descriptor(&self) -> &PyramidDescriptor {
        self.base.descriptor()
    }

    /// Layout of a pyramid with `num_levels` derived levels above the base.
    pub fn target_descriptor(&self, num_levels: usize) -> Result<PyramidDescriptor, GenerateError> {
        self.base
            .descriptor()
            .with_level_count(num_levels + 1)
            .ok_or_else(|| {
                GenerateError::Store(StoreError::LevelNotFound {
                    level: 0,
                    levels: 0,
                })
            })
    }

    /// Write metadata for levels `0..=num_levels`, then derive levels
    /// `1..=num_levels` in parallel.
    ///
    /// Waits for every level. On failure the error of the lowest failing
    /// level is returned; levels that completed are left in place.
    pub async fn generate_pyramid(
        &self,
        num_levels: usize,
    ) -> Result<GenerationReport, GenerateError> {
        if num_levels == 0 || num_levels > MAX_LEVELS {
            return Err(GenerateError::InvalidLevelCount(num_levels));
        }
        let started = Instant::now();
        let descriptor = self.target_descriptor(num_levels)?;
        self.write_metadata(&descriptor).await?;
        let output = Arc::new(self.storage.open_or_create(&self.path, &descriptor).await?);

        info!(
            "Generating {} levels for {} with {} workers",
            num_levels,
            output.identifier(),
            self.options.workers
        );

        let tasks: Vec<Task<Result<LevelReport, GenerateError>>> = (1..=num_levels)
            .map(|level| {
                let task: Task<_> = Box::pin(downsample_level(
                    self.base.clone(),
                    output.clone(),
                    level,
                    self.permits.clone(),
                ));
                task
            })
            .collect();

        let mut levels = Vec::with_capacity(num_levels);
        let mut first_error = None;
        for (i, result) in self.executor.execute(tasks).await.into_iter().enumerate() {
            let level = i + 1;
            let result = result.map_err(|e| GenerateError::Worker {
                level,
                message: e.to_string(),
            });
            match result.and_then(|r| r) {
                Ok(report) => levels.push(report),
                Err(e) => {
                    warn!("Level {} failed: {}", level, e);
                    first_error.get_or_insert(e);
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        info!(
            "Generated {} levels in {:.2}s",
            num_levels,
            started.elapsed().as_secs_f64()
        );
        Ok(GenerationReport {
            base_shape: descriptor.level_dims(0).unwrap_or_default(),
            levels,
        })
    }

    /// Derive a single level from the base. Levels below `level` that do
    /// not exist yet are created empty.
    pub async fn downsample_pyramid(&self, level: usize) -> Result<LevelReport, GenerateError> {
        if level == 0 || level > MAX_LEVELS {
            return Err(GenerateError::InvalidLevel(level));
        }
        let descriptor = self.target_descriptor(level)?;
        let output = Arc::new(self.storage.open_or_create(&self.path, &descriptor).await?);
        downsample_level(self.base.clone(), output, level, self.permits.clone()).await
    }

    async fn write_metadata(&self, descriptor: &PyramidDescriptor) -> Result<(), GenerateError> {
        let metadata_error = |e: serde_json::Error| GenerateError::Metadata(e.to_string());
        let attrs = MultiscaleAttributes::for_pyramid(
            descriptor,
            &self.options.name,
            self.options.pixel_size.as_ref(),
            Some(&self.options.method),
        );
        self.storage
            .write_document(&self.path, ZATTRS, to_json_bytes(&attrs).map_err(metadata_error)?)
            .await?;
        self.storage
            .write_document(
                &self.path,
                ZGROUP,
                to_json_bytes(&GroupMetadata::default()).map_err(metadata_error)?,
            )
            .await?;
        Ok(())
    }
}

/// Generated levels are written to numbered datasets, so a base whose
/// multiscale attributes name its levels otherwise is refused.
async fn check_dataset_paths<P: PyramidStorage>(
    storage: &P,
    path: &str,
) -> Result<(), GenerateError> {
    let Some(attrs) = storage.read_document(path, ZATTRS).await? else {
        return Ok(());
    };
    let invalid = |message: String| {
        GenerateError::Store(StoreError::InvalidMetadata {
            path: path.to_string(),
            message,
        })
    };
    let attrs: MultiscaleAttributes =
        serde_json::from_slice(&attrs).map_err(|e| invalid(e.to_string()))?;
    for (level, dataset) in attrs.dataset_paths().iter().enumerate() {
        if *dataset != level.to_string() {
            return Err(invalid(format!(
                "dataset {} is stored at \"{}\", expected \"{}\"",
                level, dataset, level
            )));
        }
    }
    Ok(())
}

/// Reduce every chunk of `level` from the base and write it to `output`.
async fn downsample_level<B, S>(
    base: Arc<B>,
    output: Arc<S>,
    level: usize,
    permits: Arc<Semaphore>,
) -> Result<LevelReport, GenerateError>
where
    B: ChunkStore + 'static,
    S: ChunkStore + 'static,
{
    let started = Instant::now();
    let level_error = |source: StoreError| GenerateError::Level { level, source };

    let descriptor = output.descriptor().clone();
    let shape = descriptor
        .level_dims(level)
        .ok_or_else(|| level_error(missing_level(&descriptor, level)))?;
    let base_shape = base
        .descriptor()
        .level(0)
        .ok_or_else(|| level_error(missing_level(base.descriptor(), 0)))?;

    let keys = descriptor.chunk_keys(level);
    let total = keys.len();
    let mut tasks = JoinSet::new();
    let mut written = 0;

    for key in keys {
        // Bounds in-flight chunks (and their base blocks) across all levels
        let permit = permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| level_error(StoreError::Closed("worker permits".to_string())))?;

        while let Some(joined) = tasks.try_join_next() {
            written += collect(joined, level)?;
        }

        let base = base.clone();
        let output = output.clone();
        let descriptor = descriptor.clone();
        tasks.spawn(async move {
            let _permit = permit;
            downsample_chunk(&*base, &*output, &descriptor, key, base_shape).await
        });
    }

    while let Some(joined) = tasks.join_next().await {
        written += collect(joined, level)?;
    }

    let elapsed = started.elapsed();
    info!(
        "Level {} complete: {} chunks, shape {:?}, {:.2}s",
        level,
        written,
        shape,
        elapsed.as_secs_f64()
    );
    debug_assert_eq!(written, total);

    Ok(LevelReport {
        level,
        shape,
        chunks_written: written,
        elapsed_ms: elapsed.as_millis() as u64,
    })
}

fn collect(
    joined: Result<Result<(), StoreError>, tokio::task::JoinError>,
    level: usize,
) -> Result<usize, GenerateError> {
    match joined {
        Ok(Ok(())) => Ok(1),
        Ok(Err(source)) => Err(GenerateError::Level { level, source }),
        Err(e) => Err(GenerateError::Worker {
            level,
            message: e.to_string(),
        }),
    }
}

fn missing_level(descriptor: &PyramidDescriptor, level: usize) -> StoreError {
    StoreError::LevelNotFound {
        level,
        levels: descriptor.level_count(),
    }
}

/// Compute one output chunk: read its base block, reduce, write.
async fn downsample_chunk<B, S>(
    base: &B,
    output: &S,
    descriptor: &PyramidDescriptor,
    key: ChunkKey,
    base_shape: SpatialShape,
) -> Result<(), StoreError>
where
    B: ChunkStore + ?Sized,
    S: ChunkStore + ?Sized,
{
    let region = descriptor
        .chunk_region(&key)
        .ok_or_else(|| StoreError::RegionOutOfBounds {
            level: key.level,
            message: format!("{} outside chunk grid", key),
        })?;
    let factor = downsample_factor(key.level);
    let limits = base_shape.to_array();
    let mut start = [0u64; 3];
    let mut end = [0u64; 3];
    for axis in [Z, Y, X] {
        start[axis] = region.start[axis] * factor;
        end[axis] = (region.end[axis] * factor).min(limits[axis]);
    }
    let base_region = Region::new(start, end);

    let data = base.read_region(0, key.channel, &base_region).await?;
    let dtype = descriptor.dtype();
    let extent = base_region.extent();
    debug_assert_eq!(reduced_extent(extent, factor), region.extent());

    let reduced: Bytes = tokio::task::spawn_blocking(move || reduce_mean(dtype, &data, extent, factor))
        .await
        .map_err(|e| StoreError::Io {
            path: key.to_string(),
            message: format!("reduction task failed: {}", e),
        })?;

    output.write_chunk(&key, reduced).await
}
