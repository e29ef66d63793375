//! Grid layout of tiles.
//!
//! # Auto layout
//!
//! Tiles without an explicit grid position are placed on a row-major grid
//! with `ceil(sqrt(n))` columns, where `n` is the total number of tiles.
//! They take the first free cells in row-major order, in tile order, skipping
//! any cell already claimed by an explicitly positioned tile.

use std::collections::HashMap;

use crate::error::GridError;
use crate::source::{TileId, TileInfo};

use super::{GridPosition, PhysicalBox, PixelInterval, PyramidGeometry};

/// Assignment of every tile to a unique grid cell.
#[derive(Debug, Clone)]
pub struct GridLayout {
    /// Grid position of each tile, indexed by tile id
    positions: Vec<GridPosition>,

    /// Tile name, indexed by tile id
    names: Vec<String>,

    /// Level-0 pixel size, indexed by tile id
    dimensions: Vec<[u32; 2]>,

    /// Reverse lookup from cell to tile
    cells: HashMap<GridPosition, TileId>,

    /// Smallest grid coordinate on each axis
    min: GridPosition,

    /// Largest grid coordinate on each axis
    max: GridPosition,
}

impl GridLayout {
    /// Lay out tiles, honoring explicit positions and auto-placing the rest.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::Empty`] for an empty tile list and
    /// [`GridError::DuplicatePosition`] when two tiles claim the same cell.
    pub fn new(tiles: &[TileInfo]) -> Result<Self, GridError> {
        if tiles.is_empty() {
            return Err(GridError::Empty);
        }

        let mut cells: HashMap<GridPosition, TileId> = HashMap::with_capacity(tiles.len());
        let mut positions: Vec<Option<GridPosition>> = vec![None; tiles.len()];

        for (index, tile) in tiles.iter().enumerate() {
            if let Some(position) = tile.grid_position {
                if let Some(existing) = cells.get(&position) {
                    return Err(GridError::DuplicatePosition {
                        position,
                        first: tiles[existing.index()].name.clone(),
                        second: tile.name.clone(),
                    });
                }
                cells.insert(position, TileId(index));
                positions[index] = Some(position);
            }
        }

        let columns = auto_layout_columns(tiles.len());
        let mut next_cell = 0i64;
        for (index, slot) in positions.iter_mut().enumerate() {
            if slot.is_some() {
                continue;
            }
            let position = loop {
                let candidate = GridPosition::new(next_cell % columns, next_cell / columns);
                next_cell += 1;
                if !cells.contains_key(&candidate) {
                    break candidate;
                }
            };
            cells.insert(position, TileId(index));
            *slot = Some(position);
        }

        let positions: Vec<GridPosition> = positions.into_iter().flatten().collect();
        let min = GridPosition::new(
            positions.iter().map(|p| p.x).min().unwrap_or(0),
            positions.iter().map(|p| p.y).min().unwrap_or(0),
        );
        let max = GridPosition::new(
            positions.iter().map(|p| p.x).max().unwrap_or(0),
            positions.iter().map(|p| p.y).max().unwrap_or(0),
        );

        Ok(Self {
            positions,
            names: tiles.iter().map(|t| t.name.clone()).collect(),
            dimensions: tiles
                .iter()
                .map(|t| t.levels.first().map(|l| l.dimensions).unwrap_or_default())
                .collect(),
            cells,
            min,
            max,
        })
    }

    /// Number of tiles in the layout.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Smallest grid coordinate on each axis.
    pub fn min(&self) -> GridPosition {
        self.min
    }

    /// Largest grid coordinate on each axis.
    pub fn max(&self) -> GridPosition {
        self.max
    }

    /// Grid position of a tile.
    pub fn position_of(&self, tile: TileId) -> Option<GridPosition> {
        self.positions.get(tile.index()).copied()
    }

    /// Name of a tile.
    pub fn name_of(&self, tile: TileId) -> Option<&str> {
        self.names.get(tile.index()).map(String::as_str)
    }

    /// Level-0 pixel size of a tile.
    pub fn dimensions_of(&self, tile: TileId) -> Option<[u32; 2]> {
        self.dimensions.get(tile.index()).copied()
    }

    /// Tile occupying a grid cell, if any.
    pub fn tile_at(&self, position: GridPosition) -> Option<TileId> {
        self.cells.get(&position).copied()
    }

    /// Iterate over `(tile, position)` pairs in tile order.
    pub fn iter(&self) -> impl Iterator<Item = (TileId, GridPosition)> + '_ {
        self.positions
            .iter()
            .enumerate()
            .map(|(index, position)| (TileId(index), *position))
    }

    /// Pixel interval of the union of all cells at a level.
    ///
    /// Returns `None` for an unknown level, or when the interval does not fit
    /// in `i64` coordinates (see [`check_extent`](Self::check_extent)).
    pub fn pixel_interval(&self, geometry: &PyramidGeometry, level: usize) -> Option<PixelInterval> {
        let size = geometry.tile_size(level)?;
        self.checked_interval(size)
    }

    /// Check that the union of all cells is addressable in pixels.
    ///
    /// Level 0 has the largest cells, so a layout that fits at level 0 fits
    /// at every level.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::PositionOutOfRange`] when a cell edge or the
    /// union's width or height overflows `i64`.
    pub fn check_extent(&self, geometry: &PyramidGeometry) -> Result<(), GridError> {
        let fits = geometry
            .tile_size(0)
            .map(|size| self.checked_interval(size).is_some())
            .unwrap_or(true);
        if fits {
            Ok(())
        } else {
            Err(GridError::PositionOutOfRange {
                min: self.min,
                max: self.max,
            })
        }
    }

    fn checked_interval(&self, size: [i64; 2]) -> Option<PixelInterval> {
        let min = [self.min.x.checked_mul(size[0])?, self.min.y.checked_mul(size[1])?];
        let max = [
            self.max.x.checked_add(1)?.checked_mul(size[0])?,
            self.max.y.checked_add(1)?.checked_mul(size[1])?,
        ];
        max[0].checked_sub(min[0])?;
        max[1].checked_sub(min[1])?;
        Some(PixelInterval::new(min, max))
    }

    /// Physical bounding box of the union of all cells.
    pub fn physical_mask(&self, geometry: &PyramidGeometry) -> PhysicalBox {
        let size = geometry.tile_physical_size();
        PhysicalBox::new(
            [self.min.x as f64 * size[0], self.min.y as f64 * size[1]],
            [
                (self.max.x + 1) as f64 * size[0],
                (self.max.y + 1) as f64 * size[1],
            ],
        )
    }

    /// Physical box of a single tile's cell.
    pub fn cell_mask(&self, geometry: &PyramidGeometry, tile: TileId) -> Option<PhysicalBox> {
        let position = self.position_of(tile)?;
        let size = geometry.tile_physical_size();
        Some(PhysicalBox::new(
            [position.x as f64 * size[0], position.y as f64 * size[1]],
            [
                (position.x + 1) as f64 * size[0],
                (position.y + 1) as f64 * size[1],
            ],
        ))
    }

    /// Tiles whose cells overlap a physical region, in tile order.
    pub fn tiles_in_region(&self, geometry: &PyramidGeometry, region: &PhysicalBox) -> Vec<TileId> {
        self.iter()
            .filter_map(|(tile, _)| {
                self.cell_mask(geometry, tile)
                    .filter(|cell| cell.intersects(region))
                    .map(|_| tile)
            })
            .collect()
    }
}

/// Number of columns used by the auto layout for `count` tiles.
fn auto_layout_columns(count: usize) -> i64 {
    let mut columns = (count as f64).sqrt() as i64;
    while columns * columns < count as i64 {
        columns += 1;
    }
    columns.max(1)
}
