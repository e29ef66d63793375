//! # Tile Mosaic
//!
//! Presents a grid of independently stored, multi-resolution image tiles as
//! one seamless multi-resolution image.
//!
//! Tile pixel data is loaded lazily and asynchronously: sampling never
//! blocks, and pixels of tiles that are still loading read as a background
//! value until the tile is available.
//!
//! ## Features
//!
//! - **Consistent pyramid**: cell sizes are chosen so tile boundaries line up
//!   exactly at every resolution level
//! - **Flexible layout**: explicit grid positions, automatic row-major
//!   placement, negative coordinates and gaps
//! - **Lazy loading**: each tile level is opened at most once, on a bounded
//!   pool of tokio tasks
//! - **Provisional samples**: a second view reports which values may still
//!   change
//! - **Pluggable storage**: anything implementing [`TileSource`]
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`geometry`] - Pyramid geometry and grid layout
//! - [`source`] - Tile source trait, in-memory and manifest-file backends
//! - [`tile`] - Samplers and the lazy tile cache
//! - [`stitch`] - The stitched image and its final and provisional views
//! - [`config`] - Library settings and CLI configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use image::Rgba;
//! use tile_mosaic::{FileTileSource, StitchConfig, StitchedImage};
//!
//! #[tokio::main]
//! async fn main() {
//!     let source = FileTileSource::load("mosaic/manifest.json".as_ref())
//!         .await
//!         .unwrap();
//!     let image = StitchedImage::new(
//!         Arc::new(source),
//!         StitchConfig::default().with_margin(0.05),
//!         Rgba([0, 0, 0, 0]),
//!     )
//!     .unwrap();
//!
//!     // Returns background and schedules the tile's open
//!     let pixel = image.final_view().sample(0, [128, 64]).unwrap();
//!     println!("{:?}", pixel);
//! }
//! ```

pub mod config;
pub mod error;
pub mod geometry;
pub mod source;
pub mod stitch;
pub mod tile;

// Re-export commonly used types
pub use config::{Cli, Command, ExportConfig, InfoConfig, StitchConfig};
pub use error::{GridError, ManifestError, SampleError, StitchError, TileOpenError};
pub use geometry::{GridLayout, GridPosition, PhysicalBox, PixelInterval, PyramidGeometry};
pub use source::{
    FileTileSource, LevelInfo, Manifest, ManifestLevel, ManifestTile, MemoryTileSource, TileId,
    TileInfo, TileSource,
};
pub use stitch::{FinalPyramid, ProvisionalPyramid, ProvisionalSample, StitchedImage, TileLocation};
pub use tile::{
    BufferSampler, CacheStats, LazyTileCache, LoadState, TileKey, TileSampler, TranslatedSampler,
};
