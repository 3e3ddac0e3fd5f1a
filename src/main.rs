//! ngff-pyramid - Compose and downsample OME-NGFF image pyramids.
//!
//! # Usage
//!
//! ```bash
//! # Stitch the sources named in a composition map and build every chunk
//! ngff-pyramid compose --map map.json --output mosaic.ngff --materialize
//!
//! # Derive four downsampled levels from an existing pyramid
//! ngff-pyramid generate --input image.zarr --levels 4
//! ```
//!
//! Run `ngff-pyramid <command> --help` for all options.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use ngff_pyramid::compose::{CompositionMap, PyramidCompositor};
use ngff_pyramid::config::{Cli, Command, ComposeConfig, GenerateConfig};
use ngff_pyramid::generate::{Executor, PoolExecutor, PyramidGenerator, SerialExecutor};
use ngff_pyramid::store::FilesystemStorage;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Compose(config) => run_compose(config).await,
        Command::Generate(config) => run_generate(config).await,
    }
}

// =============================================================================
// Compose Command
// =============================================================================

async fn run_compose(config: ComposeConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let json = match tokio::fs::read_to_string(&config.map).await {
        Ok(json) => json,
        Err(e) => {
            error!("Failed to read {}: {}", config.map.display(), e);
            return ExitCode::FAILURE;
        }
    };
    let map = match CompositionMap::from_json(&json) {
        Ok(map) => map,
        Err(e) => {
            error!("Invalid composition map {}: {}", config.map.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let storage = FilesystemStorage::new(config.root.clone());
    let compositor = Arc::new(PyramidCompositor::new(
        storage,
        config.output.clone(),
        config.compositor_options(),
    ));

    let descriptor = match compositor.set_composition(map).await {
        Ok(descriptor) => descriptor,
        Err(e) => {
            error!("Failed to set composition: {}", e);
            return ExitCode::FAILURE;
        }
    };

    println!();
    println!(
        "  Composition:  {} channels, {} levels, {}",
        descriptor.channels(),
        descriptor.level_count(),
        descriptor.dtype()
    );
    println!("  Level 0:      {}", descriptor.level(0).unwrap_or_default());
    println!("  Image group:  {}", compositor.image_path());
    println!();

    if !config.materialize {
        return ExitCode::SUCCESS;
    }

    if let Some(level) = config.level {
        if level > descriptor.max_level() {
            error!(
                "Level {} out of range (max level {})",
                level,
                descriptor.max_level()
            );
            return ExitCode::FAILURE;
        }
    }

    let result = if config.serial {
        compositor.materialize(&SerialExecutor, config.level).await
    } else {
        compositor
            .materialize(&PoolExecutor::new(config.workers), config.level)
            .await
    };

    match result {
        Ok(built) => {
            info!("Built {} chunks", built);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Materialization failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

// =============================================================================
// Generate Command
// =============================================================================

async fn run_generate(config: GenerateConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    if config.serial {
        generate_with(&config, SerialExecutor).await
    } else {
        generate_with(&config, PoolExecutor::new(config.workers)).await
    }
}

async fn generate_with<E: Executor>(config: &GenerateConfig, executor: E) -> ExitCode {
    // Input paths are used as given, relative to the working directory
    let storage = FilesystemStorage::new(PathBuf::new());

    let generator = match PyramidGenerator::open(
        storage,
        config.input.clone(),
        executor,
        config.generator_options(),
    )
    .await
    {
        Ok(generator) => generator,
        Err(e) => {
            error!("Failed to open {}: {}", config.input, e);
            return ExitCode::FAILURE;
        }
    };

    let report = match generator.generate_pyramid(config.levels).await {
        Ok(report) => report,
        Err(e) => {
            error!("Generation failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if config.json {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                error!("Failed to serialize report: {}", e);
                return ExitCode::FAILURE;
            }
        }
    } else {
        println!();
        println!("  Base shape:  {:?}", report.base_shape);
        for level in &report.levels {
            println!(
                "  Level {:>2}:    {:?}  ({} chunks, {} ms)",
                level.level, level.shape, level.chunks_written, level.elapsed_ms
            );
        }
        println!();
    }

    ExitCode::SUCCESS
}

// =============================================================================
// Utilities
// =============================================================================

fn init_logging(verbose: bool) {
    let filter = if verbose {
        "ngff_pyramid=debug"
    } else {
        "ngff_pyramid=info"
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
}
