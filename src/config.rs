//! Configuration management for ngff-pyramid.
//!
//! Both subcommands take their settings from command-line arguments via
//! clap, with environment-variable fallbacks using the `NGFF_` prefix.
//!
//! # Example
//!
//! ```ignore
//! use ngff_pyramid::config::{Cli, Command};
//!
//! let cli = Cli::parse();
//! match cli.into_command() {
//!     Command::Compose(config) => println!("composing into {}", config.output),
//!     Command::Generate(config) => println!("{} levels for {}", config.levels, config.input),
//! }
//! ```
//!
//! # Environment Variables
//!
//! - `NGFF_MAP` - Composition map JSON file (compose)
//! - `NGFF_OUTPUT` - Output directory (compose)
//! - `NGFF_ROOT` - Directory relative source and output paths resolve against (default: .)
//! - `NGFF_CHUNK_SIZE` - Output chunk extent along y and x (default: 1024)
//! - `NGFF_SOURCE_CACHE_CHUNKS` - Cached chunks per source (default: 64)
//! - `NGFF_INPUT` - Pyramid to downsample (generate)
//! - `NGFF_LEVELS` - Number of levels to derive (generate)
//! - `NGFF_WORKERS` - Worker count (default: available cores)
//! - `NGFF_NAME` - Image name written to metadata

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::array::ChunkShape;
use crate::compose::{CompositorOptions, DEFAULT_CHUNK_SIZE};
use crate::generate::{available_cores, GeneratorOptions};
use crate::metadata::PhysicalSize;
use crate::store::DEFAULT_READ_CACHE_CAPACITY;

// =============================================================================
// Default Values
// =============================================================================

/// Largest accepted chunk extent along y and x.
pub const MAX_CHUNK_SIZE: u64 = 16384;

pub use crate::generate::MAX_LEVELS;

/// Default image name for composed output.
pub const DEFAULT_COMPOSE_NAME: &str = "composition";

/// Default image name for generated pyramids.
pub const DEFAULT_GENERATE_NAME: &str = "image";

// =============================================================================
// CLI Arguments
// =============================================================================

/// ngff-pyramid - Compose and downsample OME-NGFF image pyramids.
#[derive(Parser, Debug, Clone)]
#[command(name = "ngff-pyramid")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn into_command(self) -> Command {
        self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Stitch source pyramids into one output pyramid.
    Compose(ComposeConfig),
    /// Derive downsampled levels from a pyramid's level 0.
    Generate(GenerateConfig),
}

/// Physical voxel size, shared by both subcommands.
#[derive(Args, Debug, Clone, Default)]
pub struct PixelSizeArgs {
    /// Physical size of a level-0 voxel along x, in micrometers.
    #[arg(long, env = "NGFF_PIXEL_SIZE_X")]
    pub pixel_size_x: Option<f64>,

    /// Physical size of a level-0 voxel along y, in micrometers.
    #[arg(long, env = "NGFF_PIXEL_SIZE_Y")]
    pub pixel_size_y: Option<f64>,

    /// Physical size of a level-0 voxel along z, in micrometers (default: 1).
    #[arg(long, env = "NGFF_PIXEL_SIZE_Z")]
    pub pixel_size_z: Option<f64>,
}

impl PixelSizeArgs {
    pub fn validate(&self) -> Result<(), String> {
        for (axis, value) in [
            ("x", self.pixel_size_x),
            ("y", self.pixel_size_y),
            ("z", self.pixel_size_z),
        ] {
            if let Some(v) = value {
                if !(v.is_finite() && v > 0.0) {
                    return Err(format!("pixel_size_{} must be a positive number", axis));
                }
            }
        }
        if self.pixel_size_x.is_some() != self.pixel_size_y.is_some() {
            return Err("pixel_size_x and pixel_size_y must be given together".to_string());
        }
        if self.pixel_size_z.is_some() && self.pixel_size_x.is_none() {
            return Err("pixel_size_z requires pixel_size_x and pixel_size_y".to_string());
        }
        Ok(())
    }

    /// The configured size, if any (call `validate()` first).
    pub fn physical_size(&self) -> Option<PhysicalSize> {
        match (self.pixel_size_x, self.pixel_size_y) {
            (Some(x), Some(y)) => Some(PhysicalSize::new(self.pixel_size_z.unwrap_or(1.0), y, x)),
            _ => None,
        }
    }
}

// =============================================================================
// Compose Command
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct ComposeConfig {
    /// Composition map JSON file.
    #[arg(long, env = "NGFF_MAP")]
    pub map: PathBuf,

    /// Output directory for the composed pyramid.
    #[arg(short, long, env = "NGFF_OUTPUT")]
    pub output: String,

    /// Directory that relative source and output paths resolve against.
    #[arg(long, default_value = ".", env = "NGFF_ROOT")]
    pub root: PathBuf,

    /// Output chunk extent along y and x.
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE, env = "NGFF_CHUNK_SIZE")]
    pub chunk_size: u64,

    /// Image name written to the metadata documents.
    #[arg(long, default_value = DEFAULT_COMPOSE_NAME, env = "NGFF_NAME")]
    pub name: String,

    /// Channel names (comma-separated), in destination channel order.
    #[arg(long, env = "NGFF_CHANNEL_NAMES", value_delimiter = ',')]
    pub channel_names: Option<Vec<String>>,

    #[command(flatten)]
    pub pixel_size: PixelSizeArgs,

    /// Maximum number of cached chunks per source pyramid.
    #[arg(long, default_value_t = DEFAULT_READ_CACHE_CAPACITY, env = "NGFF_SOURCE_CACHE_CHUNKS")]
    pub source_cache_chunks: usize,

    /// Build every output chunk instead of only writing metadata.
    #[arg(long, default_value_t = false, env = "NGFF_MATERIALIZE")]
    pub materialize: bool,

    /// Restrict materialization to one level.
    #[arg(long, requires = "materialize")]
    pub level: Option<usize>,

    /// Number of chunk builds in flight while materializing.
    #[arg(long, default_value_t = available_cores(), env = "NGFF_WORKERS")]
    pub workers: usize,

    /// Build chunks one at a time.
    #[arg(long, default_value_t = false)]
    pub serial: bool,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl ComposeConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.map.as_os_str().is_empty() {
            return Err("Composition map is required. Set --map or NGFF_MAP".to_string());
        }
        if self.output.trim().is_empty() {
            return Err("Output path is required. Set --output or NGFF_OUTPUT".to_string());
        }
        if self.chunk_size == 0 || self.chunk_size > MAX_CHUNK_SIZE {
            return Err(format!("chunk_size must be between 1 and {}", MAX_CHUNK_SIZE));
        }
        if self.source_cache_chunks == 0 {
            return Err("source_cache_chunks must be greater than 0".to_string());
        }
        if self.workers == 0 {
            return Err("workers must be greater than 0".to_string());
        }
        self.pixel_size.validate()
    }

    pub fn compositor_options(&self) -> CompositorOptions {
        CompositorOptions {
            chunk_shape: ChunkShape::new(1, self.chunk_size, self.chunk_size),
            name: self.name.clone(),
            channel_names: self.channel_names.clone().unwrap_or_default(),
            pixel_size: self.pixel_size.physical_size(),
            source_cache_chunks: self.source_cache_chunks,
        }
    }
}

// =============================================================================
// Generate Command
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct GenerateConfig {
    /// Pyramid directory whose level 0 is downsampled.
    #[arg(short, long, env = "NGFF_INPUT")]
    pub input: String,

    /// Number of levels to derive (levels 1..=N).
    #[arg(short, long, env = "NGFF_LEVELS")]
    pub levels: usize,

    /// Chunk tasks in flight across all levels.
    #[arg(long, default_value_t = available_cores(), env = "NGFF_WORKERS")]
    pub workers: usize,

    /// Image name written to the multiscale attributes.
    #[arg(long, default_value = DEFAULT_GENERATE_NAME, env = "NGFF_NAME")]
    pub name: String,

    #[command(flatten)]
    pub pixel_size: PixelSizeArgs,

    /// Run levels one after another instead of in parallel.
    #[arg(long, default_value_t = false)]
    pub serial: bool,

    /// Print the generation report as JSON.
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl GenerateConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.input.trim().is_empty() {
            return Err("Input pyramid is required. Set --input or NGFF_INPUT".to_string());
        }
        if self.levels == 0 || self.levels > MAX_LEVELS {
            return Err(format!("levels must be between 1 and {}", MAX_LEVELS));
        }
        if self.workers == 0 {
            return Err("workers must be greater than 0".to_string());
        }
        self.pixel_size.validate()
    }

    pub fn generator_options(&self) -> GeneratorOptions {
        GeneratorOptions {
            workers: self.workers,
            name: self.name.clone(),
            pixel_size: self.pixel_size.physical_size(),
            ..GeneratorOptions::default()
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
