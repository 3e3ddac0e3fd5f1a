//! Shapes, regions and chunk-grid arithmetic.
//!
//! Spatial quantities are ordered `(z, y, x)`. Full array dimensions are
//! `(c, z, y, x)`; channels are always chunked one at a time.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::DataType;

/// Axis index of `z` in spatial arrays.
pub const Z: usize = 0;
/// Axis index of `y` in spatial arrays.
pub const Y: usize = 1;
/// Axis index of `x` in spatial arrays.
pub const X: usize = 2;

// =============================================================================
// Spatial Shape
// =============================================================================

/// Extent along the three spatial axes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpatialShape {
    pub z: u64,
    pub y: u64,
    pub x: u64,
}

/// Chunk shape along the spatial axes (constant across levels).
pub type ChunkShape = SpatialShape;

impl SpatialShape {
    pub const fn new(z: u64, y: u64, x: u64) -> Self {
        Self { z, y, x }
    }

    /// A single-plane shape (`z == 1`).
    pub const fn planar(y: u64, x: u64) -> Self {
        Self { z: 1, y, x }
    }

    pub fn from_array(values: [u64; 3]) -> Self {
        Self::new(values[Z], values[Y], values[X])
    }

    pub fn to_array(&self) -> [u64; 3] {
        [self.z, self.y, self.x]
    }

    /// Number of voxels.
    pub fn voxels(&self) -> u64 {
        self.z * self.y * self.x
    }

    pub fn is_empty(&self) -> bool {
        self.voxels() == 0
    }

    /// Shape after halving every axis `level` times, rounding up.
    pub fn downsampled(&self, level: usize) -> Self {
        let factor = downsample_factor(level);
        Self::new(
            self.z.div_ceil(factor),
            self.y.div_ceil(factor),
            self.x.div_ceil(factor),
        )
    }

    /// Number of chunks of `chunk` shape needed to cover this shape.
    pub fn chunk_grid(&self, chunk: &ChunkShape) -> SpatialShape {
        Self::new(
            self.z.div_ceil(chunk.z),
            self.y.div_ceil(chunk.y),
            self.x.div_ceil(chunk.x),
        )
    }

    /// Element-wise maximum.
    pub fn max(&self, other: &SpatialShape) -> SpatialShape {
        Self::new(
            self.z.max(other.z),
            self.y.max(other.y),
            self.x.max(other.x),
        )
    }
}

impl fmt::Display for SpatialShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.z, self.y, self.x)
    }
}

/// Scale factor of a level relative to level 0 (`2^level`).
#[inline]
pub fn downsample_factor(level: usize) -> u64 {
    1u64 << level
}

// =============================================================================
// Region
// =============================================================================

/// Half-open box `[start, end)` over `(z, y, x)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Region {
    pub start: [u64; 3],
    pub end: [u64; 3],
}

impl Region {
    pub fn new(start: [u64; 3], end: [u64; 3]) -> Self {
        Self { start, end }
    }

    pub fn from_origin(origin: [u64; 3], extent: SpatialShape) -> Self {
        let extent = extent.to_array();
        Self::new(
            origin,
            [
                origin[Z] + extent[Z],
                origin[Y] + extent[Y],
                origin[X] + extent[X],
            ],
        )
    }

    /// Region covering an entire shape.
    pub fn full(shape: SpatialShape) -> Self {
        Self::from_origin([0, 0, 0], shape)
    }

    pub fn extent(&self) -> SpatialShape {
        SpatialShape::new(
            self.end[Z].saturating_sub(self.start[Z]),
            self.end[Y].saturating_sub(self.start[Y]),
            self.end[X].saturating_sub(self.start[X]),
        )
    }

    pub fn is_empty(&self) -> bool {
        (0..3).any(|axis| self.end[axis] <= self.start[axis])
    }

    /// Intersection with another region, or `None` if they do not overlap.
    pub fn intersect(&self, other: &Region) -> Option<Region> {
        let mut start = [0u64; 3];
        let mut end = [0u64; 3];
        for axis in 0..3 {
            start[axis] = self.start[axis].max(other.start[axis]);
            end[axis] = self.end[axis].min(other.end[axis]);
        }
        let region = Region::new(start, end);
        if region.is_empty() {
            None
        } else {
            Some(region)
        }
    }

    /// Whether `other` lies entirely inside this region.
    pub fn contains(&self, other: &Region) -> bool {
        (0..3).all(|axis| {
            other.start[axis] >= self.start[axis] && other.end[axis] <= self.end[axis]
        })
    }

    /// Express this region relative to `origin`. `origin` must not exceed
    /// `start` on any axis.
    pub fn relative_to(&self, origin: [u64; 3]) -> Region {
        let mut start = self.start;
        let mut end = self.end;
        for axis in 0..3 {
            start[axis] -= origin[axis];
            end[axis] -= origin[axis];
        }
        Region::new(start, end)
    }

    /// Clip the end of this region to `shape`.
    pub fn clip_to(&self, shape: SpatialShape) -> Region {
        let limits = shape.to_array();
        let mut end = self.end;
        for axis in 0..3 {
            end[axis] = end[axis].min(limits[axis]);
        }
        Region::new(self.start, end)
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "z[{}..{}) y[{}..{}) x[{}..{})",
            self.start[Z], self.end[Z], self.start[Y], self.end[Y], self.start[X], self.end[X]
        )
    }
}

/// Copy a box of voxels between two dense C-order `(z, y, x)` buffers.
///
/// `box_extent` voxels starting at `src_start` in `src` (of shape
/// `src_shape`) are copied to `dst_start` in `dst` (of shape `dst_shape`).
/// Callers guarantee the box fits in both buffers.
#[allow(clippy::too_many_arguments)]
pub fn copy_box(
    src: &[u8],
    src_shape: SpatialShape,
    src_start: [u64; 3],
    dst: &mut [u8],
    dst_shape: SpatialShape,
    dst_start: [u64; 3],
    box_extent: SpatialShape,
    elem_size: usize,
) {
    let row_bytes = box_extent.x as usize * elem_size;
    if row_bytes == 0 {
        return;
    }
    for dz in 0..box_extent.z {
        for dy in 0..box_extent.y {
            let src_row = ((src_start[Z] + dz) * src_shape.y + src_start[Y] + dy) * src_shape.x
                + src_start[X];
            let dst_row = ((dst_start[Z] + dz) * dst_shape.y + dst_start[Y] + dy) * dst_shape.x
                + dst_start[X];
            let src_off = src_row as usize * elem_size;
            let dst_off = dst_row as usize * elem_size;
            dst[dst_off..dst_off + row_bytes].copy_from_slice(&src[src_off..src_off + row_bytes]);
        }
    }
}

// =============================================================================
// Pyramid Descriptor
// =============================================================================

/// Shape and layout of every level of a pyramid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PyramidDescriptor {
    levels: Vec<SpatialShape>,
    channels: u32,
    chunk: ChunkShape,
    dtype: DataType,
}

impl PyramidDescriptor {
    /// Build a descriptor from explicit per-level spatial shapes.
    pub fn new(
        levels: Vec<SpatialShape>,
        channels: u32,
        chunk: ChunkShape,
        dtype: DataType,
    ) -> Self {
        Self {
            levels,
            channels,
            chunk,
            dtype,
        }
    }

    /// Build `num_levels` levels from a level-0 shape using the halving law.
    pub fn from_base(
        base: SpatialShape,
        channels: u32,
        chunk: ChunkShape,
        dtype: DataType,
        num_levels: usize,
    ) -> Self {
        let levels = (0..num_levels).map(|l| base.downsampled(l)).collect();
        Self::new(levels, channels, chunk, dtype)
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// Highest valid level index (0 for an empty descriptor).
    pub fn max_level(&self) -> usize {
        self.levels.len().saturating_sub(1)
    }

    pub fn levels(&self) -> &[SpatialShape] {
        &self.levels
    }

    pub fn level(&self, level: usize) -> Option<SpatialShape> {
        self.levels.get(level).copied()
    }

    pub fn channels(&self) -> u32 {
        self.channels
    }

    pub fn chunk_shape(&self) -> ChunkShape {
        self.chunk
    }

    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    /// Full array dimensions `(c, z, y, x)` of a level.
    pub fn level_dims(&self, level: usize) -> Option<[u64; 4]> {
        self.level(level)
            .map(|s| [self.channels as u64, s.z, s.y, s.x])
    }

    /// Number of chunks along each spatial axis of a level.
    pub fn chunk_grid(&self, level: usize) -> Option<SpatialShape> {
        self.level(level).map(|s| s.chunk_grid(&self.chunk))
    }

    /// Bytes in one full (untruncated) chunk.
    pub fn chunk_bytes(&self) -> usize {
        self.chunk.voxels() as usize * self.dtype.size()
    }

    /// Region covered by a chunk, truncated at the level boundary. `None`
    /// if the key is outside the level's chunk grid.
    pub fn chunk_region(&self, key: &ChunkKey) -> Option<Region> {
        let shape = self.level(key.level)?;
        let grid = shape.chunk_grid(&self.chunk);
        let index = key.index.to_array();
        let grid = grid.to_array();
        if (0..3).any(|axis| index[axis] >= grid[axis]) || key.channel >= self.channels {
            return None;
        }
        let chunk = self.chunk.to_array();
        let origin = [
            index[Z] * chunk[Z],
            index[Y] * chunk[Y],
            index[X] * chunk[X],
        ];
        Some(Region::from_origin(origin, self.chunk).clip_to(shape))
    }

    /// Whether every level obeys `extent_l = ceil(extent_0 / 2^l)`.
    pub fn follows_halving_law(&self) -> bool {
        match self.levels.first() {
            Some(base) => self
                .levels
                .iter()
                .enumerate()
                .all(|(l, shape)| *shape == base.downsampled(l)),
            None => true,
        }
    }

    /// Same layout restricted or extended to `num_levels` halving-law levels
    /// from this descriptor's level 0.
    pub fn with_level_count(&self, num_levels: usize) -> Option<Self> {
        let base = self.level(0)?;
        Some(Self::from_base(
            base,
            self.channels,
            self.chunk,
            self.dtype,
            num_levels,
        ))
    }

    /// Iterate over every chunk key of a level, channel-major.
    pub fn chunk_keys(&self, level: usize) -> Vec<ChunkKey> {
        let Some(grid) = self.chunk_grid(level) else {
            return Vec::new();
        };
        let mut keys = Vec::with_capacity(grid.voxels() as usize * self.channels as usize);
        for channel in 0..self.channels {
            for z in 0..grid.z {
                for y in 0..grid.y {
                    for x in 0..grid.x {
                        keys.push(ChunkKey::new(level, channel, ChunkIndex::new(z, y, x)));
                    }
                }
            }
        }
        keys
    }
}

// =============================================================================
// Chunk Key
// =============================================================================

/// Position of a chunk in a level's chunk grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkIndex {
    pub z: u64,
    pub y: u64,
    pub x: u64,
}

impl ChunkIndex {
    pub const fn new(z: u64, y: u64, x: u64) -> Self {
        Self { z, y, x }
    }

    pub fn to_array(&self) -> [u64; 3] {
        [self.z, self.y, self.x]
    }
}

/// Identity of one chunk in a pyramid: level, channel and grid position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkKey {
    pub level: usize,
    pub channel: u32,
    pub index: ChunkIndex,
}

impl ChunkKey {
    pub const fn new(level: usize, channel: u32, index: ChunkIndex) -> Self {
        Self {
            level,
            channel,
            index,
        }
    }
}

impl fmt::Display for ChunkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "level {} channel {} chunk ({}, {}, {})",
            self.level, self.channel, self.index.z, self.index.y, self.index.x
        )
    }
}
