use thiserror::Error;

use crate::array::ChunkKey;

/// Errors raised by chunk stores and storage backends
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Path or array does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Underlying filesystem or backend failure
    #[error("I/O error at {path}: {message}")]
    Io { path: String, message: String },

    /// Array or group metadata could not be parsed or is inconsistent
    #[error("Invalid metadata at {path}: {message}")]
    InvalidMetadata { path: String, message: String },

    /// Unsupported zarr dtype string
    #[error("Unsupported data type: {0}")]
    UnsupportedDataType(String),

    /// Only uncompressed (raw) chunks are supported
    #[error("Unsupported compressor at {path}: {compressor}")]
    UnsupportedCompressor { path: String, compressor: String },

    /// Requested level is not part of this store
    #[error("Level {level} not found (store has {levels} levels)")]
    LevelNotFound { level: usize, levels: usize },

    /// Requested channel exceeds the array's channel count
    #[error("Channel {channel} out of range (array has {channels} channels)")]
    ChannelOutOfRange { channel: u32, channels: u32 },

    /// Requested region or chunk lies outside the array
    #[error("Region out of bounds at level {level}: {message}")]
    RegionOutOfBounds { level: usize, message: String },

    /// Buffer length does not match the expected chunk or region size
    #[error("Buffer size mismatch: expected {expected} bytes, got {actual}")]
    BufferSize { expected: usize, actual: usize },

    /// Handle was closed
    #[error("Store closed: {0}")]
    Closed(String),
}

impl StoreError {
    /// Wrap a `std::io::Error` with the path it occurred at.
    pub fn io(path: impl Into<String>, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            StoreError::NotFound(path.into())
        } else {
            StoreError::Io {
                path: path.into(),
                message: err.to_string(),
            }
        }
    }
}

/// Errors from the composition engine
#[derive(Debug, Clone, Error)]
pub enum CompositionError {
    /// No composition has been set
    #[error("No composition map is set")]
    NotConfigured,

    /// Composition map is empty, malformed, or inconsistent with its sources
    #[error("Invalid composition: {reason}")]
    InvalidComposition { reason: String },

    /// A source pyramid could not be opened while setting a composition
    #[error("Source pyramid unavailable: {path}: {source}")]
    SourceUnavailable {
        path: String,
        #[source]
        source: StoreError,
    },

    /// Requested level does not exist
    #[error("Level {level} out of range (max level is {max_level})")]
    LevelOutOfRange { level: usize, max_level: usize },

    /// Requested channel does not exist
    #[error("Channel {channel} out of range (composition has {channels} channels)")]
    ChannelOutOfRange { channel: u32, channels: u32 },

    /// Requested chunk index lies outside the level's chunk grid
    #[error("Chunk {key} out of bounds (grid is {grid_z}x{grid_y}x{grid_x})")]
    ChunkOutOfBounds {
        key: ChunkKey,
        grid_z: u64,
        grid_y: u64,
        grid_x: u64,
    },

    /// Reading from a source pyramid failed during a chunk build
    #[error("Source read failed for {path}: {source}")]
    Source {
        path: String,
        #[source]
        source: StoreError,
    },

    /// Writing to the output store failed
    #[error("Output store error: {0}")]
    Store(#[from] StoreError),

    /// Metadata could not be serialized
    #[error("Metadata error: {0}")]
    Metadata(String),

    /// A chunk build task failed to complete
    #[error("Chunk build for {key} aborted: {message}")]
    BuildAborted { key: ChunkKey, message: String },
}

/// Errors from the downsample generation engine
#[derive(Debug, Clone, Error)]
pub enum GenerateError {
    /// Number of levels to generate is outside `1..=MAX_LEVELS`
    #[error(
        "Invalid level count: {0} (must be between 1 and {max})",
        max = crate::generate::MAX_LEVELS
    )]
    InvalidLevelCount(usize),

    /// Level 0 cannot be derived by downsampling
    #[error(
        "Invalid level: {0} (derived levels are 1 to {max})",
        max = crate::generate::MAX_LEVELS
    )]
    InvalidLevel(usize),

    /// Reading the base pyramid or writing metadata failed
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Generating a specific level failed
    #[error("Level {level} failed: {source}")]
    Level {
        level: usize,
        #[source]
        source: StoreError,
    },

    /// A worker panicked or was cancelled
    #[error("Worker for level {level} failed: {message}")]
    Worker { level: usize, message: String },

    /// Metadata could not be serialized
    #[error("Metadata error: {0}")]
    Metadata(String),
}

impl GenerateError {
    /// The level this error is attributed to, if any.
    pub fn level(&self) -> Option<usize> {
        match self {
            GenerateError::Level { level, .. } | GenerateError::Worker { level, .. } => {
                Some(*level)
            }
            GenerateError::InvalidLevel(level) => Some(*level),
            _ => None,
        }
    }
}

/// Errors raised by an executor while running a unit of work
#[derive(Debug, Clone, Error)]
pub enum ExecutorError {
    /// The unit panicked
    #[error("Task panicked: {0}")]
    Panicked(String),

    /// The unit was cancelled before completing
    #[error("Task cancelled")]
    Cancelled,
}

impl From<tokio::task::JoinError> for ExecutorError {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_cancelled() {
            ExecutorError::Cancelled
        } else {
            ExecutorError::Panicked(err.to_string())
        }
    }
}
