//! Chunked-array data model.
//!
//! - [`DataType`]: pixel types and their zarr / OME names
//! - [`SpatialShape`], [`Region`]: `(z, y, x)` extents and boxes
//! - [`PyramidDescriptor`]: per-level shapes, chunk shape, dtype, channels
//! - [`ChunkKey`]: identity of one chunk in a pyramid
//! - [`Chunk`]: materialized chunk data

mod dtype;
mod element;
mod shape;

use bytes::Bytes;

pub use dtype::DataType;
pub use element::{decode_elements, encode_elements, Element};
pub(crate) use element::dispatch_dtype;
pub use shape::{
    copy_box, downsample_factor, ChunkIndex, ChunkKey, ChunkShape, PyramidDescriptor, Region,
    SpatialShape, X, Y, Z,
};

/// A materialized chunk.
///
/// `extent` is the chunk's true extent, which is smaller than the
/// descriptor's chunk shape for boundary chunks. `data` holds
/// `extent.voxels()` little-endian elements in C order.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub key: ChunkKey,
    pub extent: SpatialShape,
    pub dtype: DataType,
    pub data: Bytes,
}

impl Chunk {
    /// Decode the chunk's elements.
    pub fn elements<T: Element>(&self) -> Vec<T> {
        decode_elements(&self.data)
    }
}
