//! zarr v2 directory storage with raw (uncompressed) chunks.
//!
//! Layout of one pyramid directory:
//!
//! ```text
//! <path>/.zattrs            multiscales (optional on read)
//! <path>/<level>/.zarray
//! <path>/<level>/<c>/<z>/<y>/<x>
//! ```
//!
//! Arrays of rank 2 `(y, x)`, 3 `(c, y, x)`, 4 `(c, z, y, x)` and 5
//! `(t, c, z, y, x)` with a single time point can be read. Arrays created
//! here are always rank 4 with `/` as the dimension separator.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use super::{check_chunk_write, check_level_channel, ChunkStore, PyramidStorage};
use crate::array::{
    copy_box, ChunkKey, ChunkShape, DataType, PyramidDescriptor, Region, SpatialShape,
};
use crate::error::StoreError;
use crate::metadata::{to_json_bytes, ArrayMetadata, MultiscaleAttributes, ZARRAY, ZATTRS};

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

// =============================================================================
// FilesystemStorage
// =============================================================================

/// Storage backend rooted at a local directory.
///
/// Paths passed to [`PyramidStorage`] methods are resolved against `root`;
/// absolute paths are used as-is.
#[derive(Debug, Clone)]
pub struct FilesystemStorage {
    root: PathBuf,
}

impl FilesystemStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }
}

#[async_trait]
impl PyramidStorage for FilesystemStorage {
    type Store = FilesystemStore;

    async fn open(&self, path: &str) -> Result<FilesystemStore, StoreError> {
        let dir = self.resolve(path);
        if !is_dir(&dir).await {
            return Err(StoreError::NotFound(path_string(&dir)));
        }

        let level_names = discover_levels(&dir).await?;
        if level_names.is_empty() {
            return Err(StoreError::NotFound(path_string(&dir.join(ZARRAY))));
        }

        let mut levels = Vec::with_capacity(level_names.len());
        for name in level_names {
            levels.push(LevelArray::load(dir.join(name)).await?);
        }

        let first = &levels[0];
        let (channels, chunk, dtype) = (first.channels, first.chunk, first.dtype);
        for level in &levels[1..] {
            if level.channels != channels || level.chunk != chunk || level.dtype != dtype {
                return Err(StoreError::InvalidMetadata {
                    path: path_string(&level.dir),
                    message: format!(
                        "level layout ({} channels, chunk {}, {}) differs from level 0 ({} channels, chunk {}, {})",
                        level.channels, level.chunk, level.dtype, channels, chunk, dtype
                    ),
                });
            }
        }

        let descriptor = PyramidDescriptor::new(
            levels.iter().map(|l| l.shape).collect(),
            channels,
            chunk,
            dtype,
        );
        debug!(
            "Opened {} ({} levels, {} channels, {})",
            path_string(&dir),
            descriptor.level_count(),
            channels,
            dtype
        );

        Ok(FilesystemStore {
            identifier: path_string(&dir),
            descriptor,
            levels,
        })
    }

    async fn open_or_create(
        &self,
        path: &str,
        descriptor: &PyramidDescriptor,
    ) -> Result<FilesystemStore, StoreError> {
        let dir = self.resolve(path);
        create_dir_all(&dir).await?;

        let mut levels = Vec::with_capacity(descriptor.level_count());
        for level in 0..descriptor.level_count() {
            let level_dir = dir.join(level.to_string());
            let wanted = ArrayMetadata::for_level(descriptor, level).ok_or_else(|| {
                StoreError::InvalidMetadata {
                    path: path_string(&level_dir),
                    message: format!("descriptor has no level {}", level),
                }
            })?;

            // Keep an existing level (and its chunks) when its layout matches
            if let Ok(existing) = LevelArray::load(level_dir.clone()).await {
                if existing.matches(descriptor, level) {
                    levels.push(existing);
                    continue;
                }
                debug!("Recreating level {} at {}", level, path_string(&level_dir));
            }

            remove_path(&level_dir).await?;
            create_dir_all(&level_dir).await?;
            let contents = to_json_bytes(&wanted).map_err(|e| StoreError::InvalidMetadata {
                path: path_string(&level_dir),
                message: e.to_string(),
            })?;
            write_atomic(&level_dir.join(ZARRAY), &contents).await?;
            levels.push(LevelArray::from_metadata(level_dir, &wanted)?);
        }

        Ok(FilesystemStore {
            identifier: path_string(&dir),
            descriptor: descriptor.clone(),
            levels,
        })
    }

    async fn remove(&self, path: &str) -> Result<(), StoreError> {
        remove_path(&self.resolve(path)).await
    }

    async fn write_document(
        &self,
        path: &str,
        name: &str,
        contents: Bytes,
    ) -> Result<(), StoreError> {
        let dir = self.resolve(path);
        create_dir_all(&dir).await?;
        write_atomic(&dir.join(name), &contents).await
    }

    async fn read_document(&self, path: &str, name: &str) -> Result<Option<Bytes>, StoreError> {
        let file = self.resolve(path).join(name);
        match tokio::fs::read(&file).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::io(path_string(&file), e)),
        }
    }
}

/// Level directory names, from `.zattrs` multiscales if present, otherwise
/// numeric sub-directories holding a `.zarray`.
async fn discover_levels(dir: &Path) -> Result<Vec<String>, StoreError> {
    let attrs_path = dir.join(ZATTRS);
    match tokio::fs::read(&attrs_path).await {
        Ok(data) => {
            let attrs: MultiscaleAttributes =
                serde_json::from_slice(&data).map_err(|e| StoreError::InvalidMetadata {
                    path: path_string(&attrs_path),
                    message: e.to_string(),
                })?;
            let paths = attrs.dataset_paths();
            if !paths.is_empty() {
                return Ok(paths);
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(StoreError::io(path_string(&attrs_path), e)),
    }

    let mut numbered = Vec::new();
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| StoreError::io(path_string(dir), e))?;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| StoreError::io(path_string(dir), e))?
    {
        let name = entry.file_name().to_string_lossy().into_owned();
        if let Ok(index) = name.parse::<usize>() {
            if is_file(&entry.path().join(ZARRAY)).await {
                numbered.push((index, name));
            }
        }
    }
    numbered.sort();
    Ok(numbered.into_iter().map(|(_, name)| name).collect())
}

// =============================================================================
// Level arrays
// =============================================================================

/// One level's zarr array and how its chunk keys are laid out on disk.
#[derive(Debug, Clone)]
struct LevelArray {
    dir: PathBuf,
    rank: usize,
    separator: String,
    channels: u32,
    shape: SpatialShape,
    chunk: ChunkShape,
    dtype: DataType,
}

impl LevelArray {
    async fn load(dir: PathBuf) -> Result<Self, StoreError> {
        let path = dir.join(ZARRAY);
        let data = tokio::fs::read(&path)
            .await
            .map_err(|e| StoreError::io(path_string(&path), e))?;
        let meta: ArrayMetadata =
            serde_json::from_slice(&data).map_err(|e| StoreError::InvalidMetadata {
                path: path_string(&path),
                message: e.to_string(),
            })?;
        Self::from_metadata(dir, &meta)
    }

    fn from_metadata(dir: PathBuf, meta: &ArrayMetadata) -> Result<Self, StoreError> {
        let path = path_string(&dir.join(ZARRAY));
        let invalid = |message: String| StoreError::InvalidMetadata {
            path: path.clone(),
            message,
        };

        if meta.zarr_format != 2 {
            return Err(invalid(format!("unsupported zarr_format {}", meta.zarr_format)));
        }
        if meta.order != "C" {
            return Err(invalid(format!("unsupported order {:?}", meta.order)));
        }
        if let Some(compressor) = &meta.compressor {
            if !compressor.is_null() {
                let id = compressor
                    .get("id")
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown")
                    .to_string();
                return Err(StoreError::UnsupportedCompressor {
                    path: path.clone(),
                    compressor: id,
                });
            }
        }
        let has_filters = meta
            .filters
            .as_ref()
            .is_some_and(|f| f.as_array().map_or(!f.is_null(), |a| !a.is_empty()));
        if has_filters {
            return Err(invalid("filters are not supported".to_string()));
        }
        if meta.shape.len() != meta.chunks.len() {
            return Err(invalid(format!(
                "shape rank {} does not match chunks rank {}",
                meta.shape.len(),
                meta.chunks.len()
            )));
        }
        if meta.chunks.contains(&0) {
            return Err(invalid("chunk extents must be positive".to_string()));
        }
        let dtype = DataType::from_zarr_str(&meta.dtype)?;

        let (s, c) = (&meta.shape, &meta.chunks);
        let (channels, shape, chunk) = match s.len() {
            2 => (1, SpatialShape::planar(s[0], s[1]), ChunkShape::planar(c[0], c[1])),
            3 => {
                if c[0] != 1 {
                    return Err(invalid("channel chunk size must be 1".to_string()));
                }
                (s[0], SpatialShape::planar(s[1], s[2]), ChunkShape::planar(c[1], c[2]))
            }
            4 => {
                if c[0] != 1 {
                    return Err(invalid("channel chunk size must be 1".to_string()));
                }
                (
                    s[0],
                    SpatialShape::new(s[1], s[2], s[3]),
                    ChunkShape::new(c[1], c[2], c[3]),
                )
            }
            5 => {
                if s[0] != 1 || c[0] != 1 || c[1] != 1 {
                    return Err(invalid(
                        "only a single time point and channel chunk size 1 are supported"
                            .to_string(),
                    ));
                }
                (
                    s[1],
                    SpatialShape::new(s[2], s[3], s[4]),
                    ChunkShape::new(c[2], c[3], c[4]),
                )
            }
            rank => return Err(invalid(format!("unsupported array rank {}", rank))),
        };
        let channels = u32::try_from(channels)
            .map_err(|_| invalid(format!("too many channels: {}", channels)))?;

        Ok(Self {
            dir,
            rank: s.len(),
            separator: meta.separator().to_string(),
            channels,
            shape,
            chunk,
            dtype,
        })
    }

    fn matches(&self, descriptor: &PyramidDescriptor, level: usize) -> bool {
        descriptor.level(level) == Some(self.shape)
            && descriptor.channels() == self.channels
            && descriptor.chunk_shape() == self.chunk
            && descriptor.dtype() == self.dtype
    }

    /// On-disk file of a chunk.
    fn chunk_path(&self, key: &ChunkKey) -> PathBuf {
        let c = u64::from(key.channel);
        let idx = key.index;
        let coords: Vec<u64> = match self.rank {
            2 => vec![idx.y, idx.x],
            3 => vec![c, idx.y, idx.x],
            4 => vec![c, idx.z, idx.y, idx.x],
            _ => vec![0, c, idx.z, idx.y, idx.x],
        };
        if self.separator == "/" {
            let mut path = self.dir.clone();
            for coord in coords {
                path.push(coord.to_string());
            }
            path
        } else {
            let name: Vec<String> = coords.iter().map(|c| c.to_string()).collect();
            self.dir.join(name.join(&self.separator))
        }
    }
}

// =============================================================================
// FilesystemStore
// =============================================================================

/// An opened pyramid directory.
#[derive(Debug)]
pub struct FilesystemStore {
    identifier: String,
    descriptor: PyramidDescriptor,
    levels: Vec<LevelArray>,
}

impl FilesystemStore {
    fn level_array(&self, key: &ChunkKey) -> Result<(&LevelArray, Region), StoreError> {
        check_level_channel(&self.descriptor, key.level, key.channel)?;
        let region =
            self.descriptor
                .chunk_region(key)
                .ok_or_else(|| StoreError::RegionOutOfBounds {
                    level: key.level,
                    message: format!("{} outside chunk grid", key),
                })?;
        let array = self
            .levels
            .get(key.level)
            .ok_or(StoreError::LevelNotFound {
                level: key.level,
                levels: self.levels.len(),
            })?;
        Ok((array, region))
    }
}

#[async_trait]
impl ChunkStore for FilesystemStore {
    fn descriptor(&self) -> &PyramidDescriptor {
        &self.descriptor
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }

    async fn read_chunk(&self, key: &ChunkKey) -> Result<Option<Bytes>, StoreError> {
        let (array, region) = self.level_array(key)?;
        let path = array.chunk_path(key);
        let data = match tokio::fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io(path_string(&path), e)),
        };

        // Stored chunks are always full size; crop boundary chunks
        let full = self.descriptor.chunk_bytes();
        if data.len() != full {
            return Err(StoreError::BufferSize {
                expected: full,
                actual: data.len(),
            });
        }
        let extent = region.extent();
        let chunk = self.descriptor.chunk_shape();
        if extent == chunk {
            return Ok(Some(Bytes::from(data)));
        }
        let elem = self.descriptor.dtype().size();
        let mut cropped = vec![0u8; extent.voxels() as usize * elem];
        copy_box(&data, chunk, [0, 0, 0], &mut cropped, extent, [0, 0, 0], extent, elem);
        Ok(Some(Bytes::from(cropped)))
    }

    async fn write_chunk(&self, key: &ChunkKey, data: Bytes) -> Result<(), StoreError> {
        check_chunk_write(&self.descriptor, key, data.len())?;
        let (array, region) = self.level_array(key)?;
        let path = array.chunk_path(key);

        let extent = region.extent();
        let chunk = self.descriptor.chunk_shape();
        let padded;
        let contents: &[u8] = if extent == chunk {
            &data
        } else {
            let elem = self.descriptor.dtype().size();
            let mut full = vec![0u8; self.descriptor.chunk_bytes()];
            copy_box(&data, extent, [0, 0, 0], &mut full, chunk, [0, 0, 0], extent, elem);
            padded = full;
            &padded
        };

        if let Some(parent) = path.parent() {
            create_dir_all(parent).await?;
        }
        write_atomic(&path, contents).await
    }
}

// =============================================================================
// File helpers
// =============================================================================

fn path_string(path: &Path) -> String {
    path.display().to_string()
}

async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

async fn create_dir_all(path: &Path) -> Result<(), StoreError> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| StoreError::io(path_string(path), e))
}

/// Remove a file or directory tree. Missing paths are not an error.
async fn remove_path(path: &Path) -> Result<(), StoreError> {
    let metadata = match tokio::fs::symlink_metadata(path).await {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(StoreError::io(path_string(path), e)),
    };
    let result = if metadata.is_dir() {
        tokio::fs::remove_dir_all(path).await
    } else {
        tokio::fs::remove_file(path).await
    };
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StoreError::io(path_string(path), e)),
    }
}

/// Write via a temporary sibling file and rename, so readers never see a
/// partial file.
async fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), StoreError> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp = path.with_file_name(format!(
        ".{}.{}.{}.tmp",
        file_name,
        std::process::id(),
        TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));

    if let Err(e) = tokio::fs::write(&temp, contents).await {
        return Err(StoreError::io(path_string(&temp), e));
    }
    if let Err(e) = tokio::fs::rename(&temp, path).await {
        let _ = tokio::fs::remove_file(&temp).await;
        return Err(StoreError::io(path_string(path), e));
    }
    Ok(())
}
