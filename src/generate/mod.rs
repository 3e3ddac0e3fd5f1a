//! Downsampled level generation.
//!
//! - [`Executor`]: pluggable runner for independent units of work
//! - [`reduce_mean`]: block-mean reduction of one base block
//! - [`PyramidGenerator`]: derives levels `1..=N` from level 0

mod engine;
mod executor;
mod reduce;

pub use engine::{GenerationReport, GeneratorOptions, LevelReport, PyramidGenerator, MAX_LEVELS};
pub use executor::{available_cores, task, Executor, PoolExecutor, SerialExecutor, Task};
pub use reduce::{reduce_mean, reduced_extent};
