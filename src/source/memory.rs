//! In-memory tile source.
//!
//! Holds every level of every tile as a [`BufferSampler`]. Besides serving
//! tests and demos, it records how often each tile level was opened and can
//! simulate slow or failing storage.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::TileOpenError;
use crate::geometry::GridPosition;
use crate::tile::{BufferSampler, TileSampler};

use super::{LevelInfo, TileId, TileInfo, TileSource};

/// One tile held in memory.
struct MemoryTile<T> {
    info: TileInfo,
    levels: Vec<Arc<BufferSampler<T>>>,
    /// Open count per level
    open_counts: Vec<AtomicUsize>,
    /// Error message returned instead of data, if set
    failure: Option<String>,
}

/// Tile source backed by in-memory pixel buffers.
///
/// # Example
///
/// ```
/// use tile_mosaic::geometry::GridPosition;
/// use tile_mosaic::source::MemoryTileSource;
/// use tile_mosaic::tile::BufferSampler;
///
/// let source = MemoryTileSource::new()
///     .with_tile(
///         "left",
///         Some(GridPosition::new(0, 0)),
///         vec![(BufferSampler::filled(10, 10, 1u8), [1.0, 1.0])],
///     )
///     .with_tile(
///         "right",
///         Some(GridPosition::new(1, 0)),
///         vec![(BufferSampler::filled(10, 10, 2u8), [1.0, 1.0])],
///     );
/// assert_eq!(source.tile_count(), 2);
/// ```
pub struct MemoryTileSource<T> {
    tiles: Vec<MemoryTile<T>>,
    open_delay: Option<Duration>,
    total_opens: AtomicUsize,
}

impl<T: Copy + Send + Sync + 'static> MemoryTileSource<T> {
    pub fn new() -> Self {
        Self {
            tiles: Vec::new(),
            open_delay: None,
            total_opens: AtomicUsize::new(0),
        }
    }

    /// Add a tile given its levels as `(pixels, voxel_size)` pairs, level 0 first.
    pub fn with_tile(
        mut self,
        name: impl Into<String>,
        grid_position: Option<GridPosition>,
        levels: Vec<(BufferSampler<T>, [f64; 2])>,
    ) -> Self {
        let infos = levels
            .iter()
            .map(|(buffer, voxel_size)| LevelInfo::new(buffer.dimensions(), *voxel_size))
            .collect();
        let open_counts = levels.iter().map(|_| AtomicUsize::new(0)).collect();
        self.tiles.push(MemoryTile {
            info: TileInfo::new(name, grid_position, infos),
            levels: levels.into_iter().map(|(buffer, _)| Arc::new(buffer)).collect(),
            open_counts,
            failure: None,
        });
        self
    }

    /// Add a uniformly filled tile with `level_count` levels, each half the
    /// size of the previous one with twice the voxel size.
    pub fn with_uniform_tile(
        self,
        name: impl Into<String>,
        grid_position: Option<GridPosition>,
        dimensions: [u32; 2],
        level_count: usize,
        value: T,
    ) -> Self {
        let mut levels = Vec::with_capacity(level_count);
        let mut dims = dimensions;
        let mut voxel = 1.0;
        for _ in 0..level_count {
            levels.push((BufferSampler::filled(dims[0], dims[1], value), [voxel, voxel]));
            dims = [dims[0].div_ceil(2).max(1), dims[1].div_ceil(2).max(1)];
            voxel *= 2.0;
        }
        self.with_tile(name, grid_position, levels)
    }

    /// Make every open of the named tile fail with `message`.
    pub fn with_failing_tile(mut self, name: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        for tile in self.tiles.iter_mut().filter(|t| t.info.name == name) {
            tile.failure = Some(message.clone());
        }
        self
    }

    /// Delay every open by `delay`, simulating slow storage.
    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = Some(delay);
        self
    }

    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    /// Total number of `open_tile` calls across all tiles and levels.
    pub fn total_opens(&self) -> usize {
        self.total_opens.load(Ordering::SeqCst)
    }

    /// Number of `open_tile` calls for one tile level.
    pub fn open_count(&self, tile: TileId, level: usize) -> usize {
        self.tiles
            .get(tile.index())
            .and_then(|t| t.open_counts.get(level))
            .map(|count| count.load(Ordering::SeqCst))
            .unwrap_or(0)
    }
}

impl<T: Copy + Send + Sync + 'static> Default for MemoryTileSource<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: Copy + Send + Sync + 'static> TileSource for MemoryTileSource<T> {
    type Pixel = T;

    fn tiles(&self) -> Vec<TileInfo> {
        self.tiles.iter().map(|t| t.info.clone()).collect()
    }

    async fn open_tile(
        &self,
        tile: TileId,
        level: usize,
    ) -> Result<Arc<dyn TileSampler<T>>, TileOpenError> {
        self.total_opens.fetch_add(1, Ordering::SeqCst);

        let entry = self
            .tiles
            .get(tile.index())
            .ok_or(TileOpenError::NotFound(tile.index()))?;
        if let Some(count) = entry.open_counts.get(level) {
            count.fetch_add(1, Ordering::SeqCst);
        }

        if let Some(delay) = self.open_delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(ref message) = entry.failure {
            return Err(TileOpenError::Source(message.clone()));
        }

        let buffer = entry
            .levels
            .get(level)
            .ok_or(TileOpenError::LevelOutOfRange {
                level,
                levels: entry.levels.len(),
            })?;
        Ok(buffer.clone() as Arc<dyn TileSampler<T>>)
    }
}
