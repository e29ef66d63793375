use std::sync::Arc;

use tokio::runtime::Handle;
use tracing::info;

use crate::config::StitchConfig;
use crate::error::{GridError, SampleError, StitchError};
use crate::geometry::{GridLayout, GridPosition, PhysicalBox, PixelInterval, PyramidGeometry};
use crate::source::{TileId, TileSource};
use crate::tile::{CacheStats, LazyTileCache, LoadState, TileKey};

use super::views::{FinalPyramid, ProvisionalPyramid};

// =============================================================================
// Tile Location
// =============================================================================

/// Where a global pixel coordinate lands in the grid.
///
/// For every located coordinate `p` at level `L`:
/// `key.tile_x * tile_size(L)[0] + local[0] == p[0]` (same on the y axis).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileLocation {
    /// Cache key of the grid cell
    pub key: TileKey,

    /// Tile occupying the cell, `None` for an empty cell
    pub tile: Option<TileId>,

    /// Coordinate inside the cell
    pub local: [i64; 2],
}

// =============================================================================
// Shared State
// =============================================================================

/// State shared by a stitched image and its views.
pub(crate) struct Mosaic<S: TileSource> {
    layout: GridLayout,
    geometry: PyramidGeometry,
    cache: LazyTileCache<S>,
}

impl<S: TileSource> Drop for Mosaic<S> {
    fn drop(&mut self) {
        self.cache.dispose();
    }
}

impl<S: TileSource> Mosaic<S> {
    pub(crate) fn layout(&self) -> &GridLayout {
        &self.layout
    }

    pub(crate) fn geometry(&self) -> &PyramidGeometry {
        &self.geometry
    }

    pub(crate) fn pixel_interval(&self, level: usize) -> Option<PixelInterval> {
        self.layout.pixel_interval(&self.geometry, level)
    }

    pub(crate) fn physical_mask(&self) -> PhysicalBox {
        self.layout.physical_mask(&self.geometry)
    }

    fn union(&self, level: usize) -> Result<(PixelInterval, [i64; 2]), SampleError> {
        match (self.pixel_interval(level), self.geometry.tile_size(level)) {
            (Some(union), Some(size)) => Ok((union, size)),
            _ => Err(SampleError::InvalidLevel {
                level,
                num_levels: self.geometry.num_levels(),
            }),
        }
    }

    pub(crate) fn locate(&self, level: usize, position: [i64; 2]) -> Result<TileLocation, SampleError> {
        let (union, size) = self.union(level)?;
        let [x, y] = position;
        if !union.contains(x, y) {
            return Err(SampleError::OutOfRange { level, x, y });
        }

        let tile_x = x.div_euclid(size[0]);
        let tile_y = y.div_euclid(size[1]);
        Ok(TileLocation {
            key: TileKey::new(level, tile_x, tile_y),
            tile: self.layout.tile_at(GridPosition::new(tile_x, tile_y)),
            local: [x - tile_x * size[0], y - tile_y * size[1]],
        })
    }

    /// Sample one pixel, scheduling the tile's open if it is still closed.
    ///
    /// Returns the value together with the tile's state at sample time.
    pub(crate) fn sample(
        &self,
        level: usize,
        position: [i64; 2],
    ) -> Result<(S::Pixel, LoadState), SampleError> {
        let location = self.locate(level, position)?;
        let state = self.cache.status(location.key);

        let value = match state {
            LoadState::Open => self
                .cache
                .sample(location.key, location.local)
                .unwrap_or_else(|| self.cache.background()),
            LoadState::Closed => {
                self.cache.ensure_opening(location.key);
                self.cache.background()
            }
            LoadState::Opening | LoadState::Failed | LoadState::Missing => {
                self.cache.background()
            }
        };

        Ok((value, state))
    }

    /// Check that `region` lies inside the union at `level`.
    pub(crate) fn check_region(&self, level: usize, region: &PixelInterval) -> Result<(), SampleError> {
        let (union, _) = self.union(level)?;
        if region.is_empty() || union.contains_interval(region) {
            return Ok(());
        }

        let [x, y] = if union.contains(region.min[0], region.min[1]) {
            [region.max[0] - 1, region.max[1] - 1]
        } else {
            region.min
        };
        Err(SampleError::OutOfRange { level, x, y })
    }
}

// =============================================================================
// Stitched Image
// =============================================================================

/// A grid of multi-resolution tiles presented as one multi-resolution image.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use tile_mosaic::config::StitchConfig;
/// use tile_mosaic::geometry::GridPosition;
/// use tile_mosaic::source::MemoryTileSource;
/// use tile_mosaic::stitch::StitchedImage;
///
/// # #[tokio::main]
/// # async fn main() {
/// let source = MemoryTileSource::new()
///     .with_uniform_tile("a", Some(GridPosition::new(0, 0)), [10, 10], 1, 1u8)
///     .with_uniform_tile("b", Some(GridPosition::new(1, 0)), [10, 10], 1, 2u8);
///
/// let image = StitchedImage::new(Arc::new(source), StitchConfig::default(), 0u8).unwrap();
/// image.wait_for_level(0).await;
///
/// assert_eq!(image.final_view().sample(0, [15, 5]), Ok(2));
/// # }
/// ```
pub struct StitchedImage<S: TileSource> {
    mosaic: Arc<Mosaic<S>>,
}

impl<S: TileSource> Clone for StitchedImage<S> {
    fn clone(&self) -> Self {
        Self {
            mosaic: Arc::clone(&self.mosaic),
        }
    }
}

impl<S: TileSource> StitchedImage<S> {
    /// Build a stitched image, scheduling tile opens on the current tokio
    /// runtime.
    ///
    /// # Errors
    ///
    /// Returns [`StitchError::NoRuntime`] when called outside a runtime, and
    /// the errors of [`with_runtime`](Self::with_runtime).
    pub fn new(
        source: Arc<S>,
        config: StitchConfig,
        background: S::Pixel,
    ) -> Result<Self, StitchError> {
        let runtime = Handle::try_current().map_err(|_| StitchError::NoRuntime)?;
        Self::with_runtime(source, config, background, runtime)
    }

    /// Build a stitched image that schedules tile opens on `runtime`.
    ///
    /// Only tile metadata is read here. The first tile is the reference for
    /// the pyramid geometry; every other tile must have at least as many
    /// levels.
    ///
    /// # Errors
    ///
    /// Invalid configuration, an empty or inconsistent grid, bad voxel
    /// sizes on the reference tile, or grid positions too far out to address
    /// in pixels.
    pub fn with_runtime(
        source: Arc<S>,
        config: StitchConfig,
        background: S::Pixel,
        runtime: Handle,
    ) -> Result<Self, StitchError> {
        config.validate()?;

        let tiles = source.tiles();
        let layout = GridLayout::new(&tiles)?;
        let reference = tiles.first().ok_or(GridError::Empty)?;
        let geometry = PyramidGeometry::compute(reference, config.margin)?;

        for tile in &tiles {
            if tile.level_count() < geometry.num_levels() {
                return Err(GridError::LevelCountMismatch {
                    tile: tile.name.clone(),
                    expected: geometry.num_levels(),
                    actual: tile.level_count(),
                }
                .into());
            }
        }
        layout.check_extent(&geometry)?;

        let cache = LazyTileCache::new(
            source,
            &layout,
            &geometry,
            background,
            config.max_concurrent_opens,
            runtime,
        );

        let tile_size = geometry.tile_size(0).unwrap_or_default();
        info!(
            tiles = layout.len(),
            levels = geometry.num_levels(),
            tile_width = tile_size[0],
            tile_height = tile_size[1],
            margin = config.margin,
            "Created stitched image"
        );

        Ok(Self {
            mosaic: Arc::new(Mosaic {
                layout,
                geometry,
                cache,
            }),
        })
    }

    /// View returning plain sample values.
    pub fn final_view(&self) -> FinalPyramid<S> {
        FinalPyramid::new(Arc::clone(&self.mosaic))
    }

    /// View returning samples flagged as provisional while tiles load.
    pub fn provisional_view(&self) -> ProvisionalPyramid<S> {
        ProvisionalPyramid::new(Arc::clone(&self.mosaic))
    }

    pub fn num_levels(&self) -> usize {
        self.mosaic.geometry.num_levels()
    }

    /// Cell size in pixels at a level.
    pub fn tile_size(&self, level: usize) -> Option<[i64; 2]> {
        self.mosaic.geometry.tile_size(level)
    }

    /// Downsampling factor of a level relative to the previous one.
    pub fn downsampling_factor(&self, level: usize) -> Option<[f64; 2]> {
        self.mosaic.geometry.downsampling_factor(level)
    }

    /// Physical bounding box of all tiles.
    pub fn physical_mask(&self) -> PhysicalBox {
        self.mosaic.physical_mask()
    }

    /// Pixel interval of all tiles at a level.
    pub fn pixel_interval(&self, level: usize) -> Option<PixelInterval> {
        self.mosaic.pixel_interval(level)
    }

    pub fn layout(&self) -> &GridLayout {
        self.mosaic.layout()
    }

    pub fn geometry(&self) -> &PyramidGeometry {
        self.mosaic.geometry()
    }

    pub fn background(&self) -> S::Pixel {
        self.mosaic.cache.background()
    }

    /// Map a global coordinate to its grid cell and cell-local coordinate.
    pub fn locate(&self, level: usize, position: [i64; 2]) -> Result<TileLocation, SampleError> {
        self.mosaic.locate(level, position)
    }

    /// Load state of one cache key.
    pub fn load_state(&self, key: TileKey) -> LoadState {
        self.mosaic.cache.status(key)
    }

    /// Tiles whose cells intersect a physical region.
    pub fn tiles_in_region(&self, region: &PhysicalBox) -> Vec<TileId> {
        self.mosaic
            .layout
            .tiles_in_region(&self.mosaic.geometry, region)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.mosaic.cache.stats()
    }

    /// Open every tile of a level and wait until each has settled.
    pub async fn wait_for_level(&self, level: usize) -> CacheStats {
        self.mosaic.cache.wait_for_level(level).await
    }

    /// Stop loading tiles. Views keep working; unloaded tiles stay background.
    pub fn dispose(&self) {
        self.mosaic.cache.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.mosaic.cache.is_disposed()
    }
}

// =============================================================================
// Tests
// =============================================================================
