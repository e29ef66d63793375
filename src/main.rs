//! Tile Mosaic - inspect and export stitched multi-resolution images.
//!
//! This binary loads a tile manifest and either prints its geometry or
//! renders one pyramid level to an image file.

use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use image::{Rgba, RgbaImage};
use tile_mosaic::{
    config::{Cli, Command, ExportConfig, InfoConfig},
    geometry::PixelInterval,
    FileTileSource, StitchedImage,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Info(config) => run_info(config).await,
        Command::Export(config) => run_export(config).await,
    }
}

// =============================================================================
// Info Command
// =============================================================================

async fn run_info(config: InfoConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let source = match FileTileSource::load(&config.manifest).await {
        Ok(source) => source,
        Err(e) => {
            error!("Failed to load manifest {}: {}", config.manifest.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let image = match StitchedImage::new(
        Arc::new(source),
        config.stitch_config(),
        Rgba([0, 0, 0, 0]),
    ) {
        Ok(image) => image,
        Err(e) => {
            error!("Cannot stitch tiles: {}", e);
            return ExitCode::FAILURE;
        }
    };

    println!("Manifest: {}", config.manifest.display());
    println!("═════════════════════════════════");

    let layout = image.layout();
    println!(
        "Tiles: {} (grid {}..={} x {}..={})",
        layout.len(),
        layout.min().x,
        layout.max().x,
        layout.min().y,
        layout.max().y
    );
    for (tile, position) in layout.iter() {
        println!(
            "  {:>4}  ({:>3}, {:>3})  {}",
            tile.to_string(),
            position.x,
            position.y,
            layout.name_of(tile).unwrap_or_default()
        );
    }

    println!();
    println!("Levels: {}", image.num_levels());
    println!("  level  factor        tile size    image size");
    for level in 0..image.num_levels() {
        let factor = image.downsampling_factor(level).unwrap_or([1.0, 1.0]);
        let size = image.tile_size(level).unwrap_or_default();
        let interval = match image.pixel_interval(level) {
            Some(interval) => interval,
            None => continue,
        };
        println!(
            "  {:>5}  {:>5.2}x{:<5.2}  {:>5}x{:<5}  {}x{}",
            level,
            factor[0],
            factor[1],
            size[0],
            size[1],
            interval.width(),
            interval.height()
        );
    }

    let mask = image.physical_mask();
    println!();
    println!(
        "Physical extent: [{:.3}, {:.3}] - [{:.3}, {:.3}]",
        mask.min[0], mask.min[1], mask.max[0], mask.max[1]
    );

    ExitCode::SUCCESS
}

// =============================================================================
// Export Command
// =============================================================================

async fn run_export(config: ExportConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }
    let background = match config.parse_background() {
        Ok(channels) => Rgba(channels),
        Err(e) => {
            error!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let source = match FileTileSource::load(&config.manifest).await {
        Ok(source) => source,
        Err(e) => {
            error!("Failed to load manifest {}: {}", config.manifest.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let image = match StitchedImage::new(Arc::new(source), config.stitch_config(), background) {
        Ok(image) => image,
        Err(e) => {
            error!("Cannot stitch tiles: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let Some(region) = image.pixel_interval(config.level) else {
        error!(
            "Level {} does not exist: the image has {} levels",
            config.level,
            image.num_levels()
        );
        return ExitCode::FAILURE;
    };
    let (width, height) = match export_dimensions(&region) {
        Ok(dimensions) => dimensions,
        Err(e) => {
            error!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    info!(
        "Loading {} tiles at level {}...",
        image.layout().len(),
        config.level
    );
    let started = Instant::now();
    let stats = image.wait_for_level(config.level).await;
    info!(
        "  {} open, {} failed in {:.2?}",
        stats.open,
        stats.failed,
        started.elapsed()
    );
    if stats.failed > 0 {
        warn!("  {} tile(s) failed to load and render as background", stats.failed);
    }

    let pixels = match image.final_view().render_region(config.level, &region) {
        Ok(pixels) => pixels,
        Err(e) => {
            error!("Failed to render level {}: {}", config.level, e);
            return ExitCode::FAILURE;
        }
    };

    let raw: Vec<u8> = pixels.iter().flat_map(|pixel| pixel.0).collect();
    let Some(output) = RgbaImage::from_raw(width, height, raw) else {
        error!("Rendered buffer does not match {}x{}", width, height);
        return ExitCode::FAILURE;
    };

    let path = config.output.clone();
    let saved = tokio::task::spawn_blocking(move || output.save(&path)).await;
    match saved {
        Ok(Ok(())) => {
            info!("Wrote {}x{} image to {}", width, height, config.output.display());
            ExitCode::SUCCESS
        }
        Ok(Err(e)) => {
            error!("Failed to write {}: {}", config.output.display(), e);
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("Image writer task failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Output image size for a level's pixel interval.
fn export_dimensions(region: &PixelInterval) -> Result<(u32, u32), String> {
    match (u32::try_from(region.width()), u32::try_from(region.height())) {
        (Ok(width), Ok(height)) => Ok((width, height)),
        _ => Err(format!(
            "level is {}x{} pixels, larger than an image file can hold",
            region.width(),
            region.height()
        )),
    }
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "tile_mosaic=debug"
    } else {
        "tile_mosaic=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
