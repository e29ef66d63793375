//! Configuration management for Tile Mosaic.
//!
//! Two layers live here:
//! - [`StitchConfig`]: library settings for building a stitched image
//! - [`Cli`]: command-line arguments for the `tile-mosaic` binary, parsed
//!   with clap
//!
//! # Example
//!
//! ```
//! use tile_mosaic::config::StitchConfig;
//!
//! let config = StitchConfig::new()
//!     .with_margin(0.1)
//!     .with_max_concurrent_opens(4);
//! assert!(config.validate().is_ok());
//! ```
//!
//! # Environment Variables
//!
//! Every command-line option can also be set via environment variables with
//! the `MOSAIC_` prefix:
//!
//! - `MOSAIC_MANIFEST` - Path to the tile manifest (required)
//! - `MOSAIC_MARGIN` - Margin fraction added around each tile (default: 0.0)
//! - `MOSAIC_LEVEL` - Pyramid level to export (default: 0)
//! - `MOSAIC_OUTPUT` - Output image path for `export`
//! - `MOSAIC_MAX_CONCURRENT_OPENS` - Tile opens running at once (default: 8)
//! - `MOSAIC_BACKGROUND` - Background RGBA as `r,g,b,a` (default: 0,0,0,0)

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::error::StitchError;
use crate::geometry::{DEFAULT_MARGIN, MAX_MARGIN};
use crate::tile::DEFAULT_MAX_CONCURRENT_OPENS;

// =============================================================================
// Default Values
// =============================================================================

/// Default background for exported images (transparent black).
pub const DEFAULT_BACKGROUND: &str = "0,0,0,0";

// =============================================================================
// Library Configuration
// =============================================================================

/// Settings for building a [`StitchedImage`](crate::stitch::StitchedImage).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StitchConfig {
    /// Extra space around each tile as a fraction of its size, per side
    pub margin: f64,

    /// Maximum number of tile opens running at once
    pub max_concurrent_opens: usize,
}

impl Default for StitchConfig {
    fn default() -> Self {
        Self {
            margin: DEFAULT_MARGIN,
            max_concurrent_opens: DEFAULT_MAX_CONCURRENT_OPENS,
        }
    }
}

impl StitchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_margin(mut self, margin: f64) -> Self {
        self.margin = margin;
        self
    }

    pub fn with_max_concurrent_opens(mut self, max_concurrent_opens: usize) -> Self {
        self.max_concurrent_opens = max_concurrent_opens;
        self
    }

    /// Check the margin is within `[0.0, 0.5]` and the pool is non-empty.
    pub fn validate(&self) -> Result<(), StitchError> {
        if !(0.0..=MAX_MARGIN).contains(&self.margin) {
            return Err(StitchError::InvalidMargin(self.margin));
        }
        if self.max_concurrent_opens == 0 {
            return Err(StitchError::InvalidConcurrency);
        }
        Ok(())
    }
}

// =============================================================================
// CLI Arguments
// =============================================================================

/// Tile Mosaic - present a grid of multi-resolution tiles as one image.
#[derive(Parser, Debug, Clone)]
#[command(name = "tile-mosaic")]
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

/// Available subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Print the pyramid geometry and grid layout of a manifest.
    Info(InfoConfig),

    /// Render one level of the stitched image to an image file.
    Export(ExportConfig),
}

/// Arguments of the `info` subcommand.
#[derive(Args, Debug, Clone)]
pub struct InfoConfig {
    /// Path to the JSON tile manifest.
    #[arg(long, env = "MOSAIC_MANIFEST")]
    pub manifest: PathBuf,

    /// Margin fraction added around each tile, per side (0.0-0.5).
    #[arg(long, default_value_t = DEFAULT_MARGIN, env = "MOSAIC_MARGIN")]
    pub margin: f64,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl InfoConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.manifest.as_os_str().is_empty() {
            return Err("Manifest path is required. Set --manifest or MOSAIC_MANIFEST".to_string());
        }
        self.stitch_config().validate().map_err(|e| e.to_string())
    }

    pub fn stitch_config(&self) -> StitchConfig {
        StitchConfig::new().with_margin(self.margin)
    }
}

/// Arguments of the `export` subcommand.
#[derive(Args, Debug, Clone)]
pub struct ExportConfig {
    /// Path to the JSON tile manifest.
    #[arg(long, env = "MOSAIC_MANIFEST")]
    pub manifest: PathBuf,

    /// Pyramid level to render (0 = full resolution).
    #[arg(short, long, default_value_t = 0, env = "MOSAIC_LEVEL")]
    pub level: usize,

    /// Output image path; the format follows the file extension.
    #[arg(short, long, env = "MOSAIC_OUTPUT")]
    pub output: PathBuf,

    /// Margin fraction added around each tile, per side (0.0-0.5).
    #[arg(long, default_value_t = DEFAULT_MARGIN, env = "MOSAIC_MARGIN")]
    pub margin: f64,

    /// Maximum number of tile opens running at once.
    #[arg(
        long,
        default_value_t = DEFAULT_MAX_CONCURRENT_OPENS,
        env = "MOSAIC_MAX_CONCURRENT_OPENS"
    )]
    pub max_concurrent_opens: usize,

    /// Background color as `r,g,b,a`, used for gaps and failed tiles.
    #[arg(long, default_value = DEFAULT_BACKGROUND, env = "MOSAIC_BACKGROUND")]
    pub background: String,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl ExportConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.manifest.as_os_str().is_empty() {
            return Err("Manifest path is required. Set --manifest or MOSAIC_MANIFEST".to_string());
        }
        if self.output.as_os_str().is_empty() {
            return Err("Output path is required. Set --output or MOSAIC_OUTPUT".to_string());
        }
        self.parse_background()?;
        self.stitch_config().validate().map_err(|e| e.to_string())
    }

    pub fn stitch_config(&self) -> StitchConfig {
        StitchConfig::new()
            .with_margin(self.margin)
            .with_max_concurrent_opens(self.max_concurrent_opens)
    }

    /// Parse the background option into RGBA channels.
    pub fn parse_background(&self) -> Result<[u8; 4], String> {
        parse_rgba(&self.background)
    }
}

/// Parse `r,g,b,a` (or `r,g,b`, opaque) into RGBA channels.
pub fn parse_rgba(value: &str) -> Result<[u8; 4], String> {
    let channels: Vec<u8> = value
        .split(',')
        .map(|part| {
            part.trim()
                .parse::<u8>()
                .map_err(|_| format!("Invalid color channel '{}' in '{}'", part.trim(), value))
        })
        .collect::<Result<_, _>>()?;

    match channels.as_slice() {
        [r, g, b] => Ok([*r, *g, *b, 255]),
        [r, g, b, a] => Ok([*r, *g, *b, *a]),
        _ => Err(format!(
            "Background must have 3 or 4 comma-separated channels, got '{}'",
            value
        )),
    }
}

// =============================================================================
// Tests
// =============================================================================
