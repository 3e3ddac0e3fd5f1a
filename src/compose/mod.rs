//! Composition of source pyramids into one output pyramid.
//!
//! - [`CompositionMap`]: validated placement of sources into channels
//! - [`SourcePyramid`]: read handle onto one source
//! - [`ChunkCache`]: write-once, single-flight cache of output chunks
//! - [`PyramidCompositor`]: the engine tying them together

mod cache;
mod engine;
mod map;
mod source;

pub use cache::{CacheOutcome, ChunkCache};
pub use engine::{
    ChunkRequest, ChunkResponse, CompositorOptions, PyramidCompositor, DEFAULT_CHUNK_SIZE,
};
pub use map::{CompositionEntry, CompositionMap, Placement};
pub use source::{SourcePyramid, IMAGE_GROUP};
