//! TileSource trait for backend-agnostic tile access.
//!
//! A tile source knows which tiles exist, describes each tile's pyramid
//! without loading pixels, and opens one tile at one level on demand.
//! Opening is assumed to be expensive (disk or network I/O) and is only ever
//! called from background workers of the lazy tile cache.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::TileOpenError;
use crate::geometry::GridPosition;
use crate::tile::TileSampler;

// =============================================================================
// Tile Identity and Metadata
// =============================================================================

/// Identifier of a tile: its index in [`TileSource::tiles`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileId(pub usize);

impl TileId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Metadata of a single pyramid level of one tile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelInfo {
    /// Width and height of the level in pixels
    pub dimensions: [u32; 2],

    /// Physical size of one pixel on each axis
    pub voxel_size: [f64; 2],
}

impl LevelInfo {
    pub fn new(dimensions: [u32; 2], voxel_size: [f64; 2]) -> Self {
        Self {
            dimensions,
            voxel_size,
        }
    }
}

/// Description of one tile, available without opening it.
#[derive(Debug, Clone, PartialEq)]
pub struct TileInfo {
    /// Human-readable tile name, used in logs and errors
    pub name: String,

    /// Explicit grid cell, or `None` to request auto layout
    pub grid_position: Option<GridPosition>,

    /// Per-level metadata, level 0 first
    pub levels: Vec<LevelInfo>,
}

impl TileInfo {
    pub fn new(
        name: impl Into<String>,
        grid_position: Option<GridPosition>,
        levels: Vec<LevelInfo>,
    ) -> Self {
        Self {
            name: name.into(),
            grid_position,
            levels,
        }
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }
}

// =============================================================================
// TileSource Trait
// =============================================================================

/// Capability interface implemented once per storage backend.
///
/// # Example
///
/// ```ignore
/// use tile_mosaic::source::{TileSource, TileId, TileInfo};
///
/// struct MySource { /* ... */ }
///
/// #[async_trait]
/// impl TileSource for MySource {
///     type Pixel = u16;
///
///     fn tiles(&self) -> Vec<TileInfo> {
///         // Describe every tile from cheap metadata
///     }
///
///     async fn open_tile(&self, tile: TileId, level: usize)
///         -> Result<Arc<dyn TileSampler<u16>>, TileOpenError> {
///         // Read and decode the tile's pixels
///     }
/// }
/// ```
#[async_trait]
pub trait TileSource: Send + Sync + 'static {
    /// Pixel value produced by this source's samplers.
    type Pixel: Copy + Send + Sync + 'static;

    /// Describe all tiles. The order defines each tile's [`TileId`].
    ///
    /// Called once when the stitched image is constructed.
    fn tiles(&self) -> Vec<TileInfo>;

    /// Open one tile at one level.
    ///
    /// The returned sampler addresses the tile's own pixel grid at that
    /// level, with `(0, 0)` at its top-left corner.
    ///
    /// # Errors
    ///
    /// Any error marks the tile as failed at this level; the cache never
    /// retries it.
    async fn open_tile(
        &self,
        tile: TileId,
        level: usize,
    ) -> Result<Arc<dyn TileSampler<Self::Pixel>>, TileOpenError>;
}
