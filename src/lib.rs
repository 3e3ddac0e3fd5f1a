//! # ngff-pyramid
//!
//! Composition and downsampling of chunked OME-NGFF (zarr v2) image pyramids.
//!
//! Each pyramid holds a `(c, z, y, x)` array per resolution level, and every
//! level is half the previous one along each spatial axis (rounded up).
//! This crate builds such pyramids in two ways.
//!
//! ## Features
//!
//! - **Composition**: stitch source pyramids into one virtual output by channel
//!   and placement, materializing output chunks lazily on request
//! - **Write-once chunk cache**: each output chunk is built at most once, and
//!   concurrent requests for the same chunk share a single build
//! - **Generation**: derive levels `1..=N` from level 0 by block-mean
//!   reduction, with levels running as independent units on an executor
//! - **Storage**: uncompressed zarr v2 on the local filesystem, or in memory
//!
//! ## Architecture
//!
//! - [`array`] - Data types, shapes, regions and pyramid layout
//! - [`metadata`] - `.zarray`, `.zgroup`, NGFF multiscales and OME-XML documents
//! - [`store`] - Chunk store and storage traits with their backends
//! - [`compose`] - Composition maps, source handles, chunk cache and compositor
//! - [`generate`] - Executors, mean reduction and the level generator
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use ngff_pyramid::{
//!     ChunkRequest, CompositionEntry, CompositionMap, CompositorOptions, FilesystemStorage,
//!     PyramidCompositor,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let map = CompositionMap::new(vec![
//!         CompositionEntry::offset(0, "tiles/a", 0, 0),
//!         CompositionEntry::offset(0, "tiles/b", 0, 2048),
//!     ])?;
//!
//!     let storage = FilesystemStorage::new("/data");
//!     let compositor = PyramidCompositor::new(storage, "mosaic", CompositorOptions::default());
//!     compositor.set_composition(map).await?;
//!
//!     let response = compositor.get_chunk(ChunkRequest::new(0, 0, 0, 1)).await?;
//!     println!("{} bytes", response.chunk.data.len());
//!     Ok(())
//! }
//! ```

pub mod array;
pub mod compose;
pub mod config;
pub mod error;
pub mod generate;
pub mod metadata;
pub mod store;

// Re-export commonly used types
pub use array::{Chunk, ChunkIndex, ChunkKey, ChunkShape, DataType, PyramidDescriptor, Region, SpatialShape};
pub use compose::{
    CacheOutcome, ChunkCache, ChunkRequest, ChunkResponse, CompositionEntry, CompositionMap,
    CompositorOptions, Placement, PyramidCompositor, SourcePyramid,
};
pub use config::{Cli, Command, ComposeConfig, GenerateConfig};
pub use error::{CompositionError, ExecutorError, GenerateError, StoreError};
pub use generate::{
    Executor, GenerationReport, GeneratorOptions, LevelReport, PoolExecutor, PyramidGenerator,
    SerialExecutor, MAX_LEVELS,
};
pub use metadata::{OmeMetadata, PhysicalSize};
pub use store::{ChunkStore, FilesystemStorage, MemoryStorage, PyramidStorage};
