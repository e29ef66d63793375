//! Pyramid geometry calculator.
//!
//! Derives downsampling factors and per-level tile cell sizes from the voxel
//! sizes of one reference tile.

use crate::error::GridError;
use crate::source::TileInfo;

/// Default margin fraction reserved around every tile.
pub const DEFAULT_MARGIN: f64 = 0.0;

/// Largest accepted margin fraction.
pub const MAX_MARGIN: f64 = 0.5;

/// Per-level geometry shared by every tile of the mosaic.
///
/// Invariants:
/// - `tile_size(0)[a]` is a multiple of the product of all integer
///   downsampling factors on axis `a`
/// - `tile_size(l)[a] == tile_size(l - 1)[a] / integer_factor(l)[a]`
#[derive(Debug, Clone, PartialEq)]
pub struct PyramidGeometry {
    /// Voxel size ratio between level `l` and level `l - 1`
    downsampling_factors: Vec<[f64; 2]>,

    /// Downsampling factors rounded to integers (at least 1)
    integer_factors: Vec<[i64; 2]>,

    /// Product of integer factors from level 1 up to and including level `l`
    cumulative_factors: Vec<[i64; 2]>,

    /// Cell size in pixels at each level
    tile_sizes: Vec<[i64; 2]>,

    /// Physical size of one level-0 pixel
    voxel_size: [f64; 2],
}

impl PyramidGeometry {
    /// Compute the geometry from the reference tile's metadata.
    ///
    /// # Arguments
    ///
    /// * `reference` - Tile whose voxel sizes define the pyramid
    /// * `margin` - Fraction of the raw tile size reserved on each side
    ///
    /// # Errors
    ///
    /// Returns [`GridError::NoLevels`] when the tile has no levels,
    /// [`GridError::InvalidVoxelSize`] for non-positive or non-finite voxel
    /// sizes, and [`GridError::FactorOverflow`] when the factors do not fit
    /// in `i64` pixel sizes.
    pub fn compute(reference: &TileInfo, margin: f64) -> Result<Self, GridError> {
        let levels = &reference.levels;
        if levels.is_empty() {
            return Err(GridError::NoLevels(reference.name.clone()));
        }

        for (level, info) in levels.iter().enumerate() {
            for (axis, &value) in info.voxel_size.iter().enumerate() {
                if !value.is_finite() || value <= 0.0 {
                    return Err(GridError::InvalidVoxelSize { level, axis, value });
                }
            }
        }

        let mut downsampling_factors = Vec::with_capacity(levels.len());
        let mut integer_factors = Vec::with_capacity(levels.len());
        downsampling_factors.push([1.0, 1.0]);
        integer_factors.push([1, 1]);

        for (index, pair) in levels.windows(2).enumerate() {
            let level = index + 1;
            let (previous, current) = (pair[0].voxel_size, pair[1].voxel_size);
            let factor = [current[0] / previous[0], current[1] / previous[1]];
            downsampling_factors.push(factor);
            integer_factors.push([
                round_factor(factor[0], level, 0)?,
                round_factor(factor[1], level, 1)?,
            ]);
        }

        let mut cumulative_factors = Vec::with_capacity(levels.len());
        let mut running = [1i64, 1i64];
        for (level, factor) in integer_factors.iter().enumerate() {
            for axis in 0..2 {
                running[axis] = running[axis]
                    .checked_mul(factor[axis])
                    .ok_or(GridError::FactorOverflow { level, axis })?;
            }
            cumulative_factors.push(running);
        }
        let total = running;
        let last_level = levels.len() - 1;

        // Absorbs float noise such as 100.0 * 1.2 == 120.00000000000001
        const CEIL_TOLERANCE: f64 = 1e-9;

        let raw = levels[0].dimensions;
        let mut base = [0i64; 2];
        for axis in 0..2 {
            let padded = f64::from(raw[axis]) * (1.0 + 2.0 * margin);
            let multiples = (padded / total[axis] as f64 - CEIL_TOLERANCE)
                .ceil()
                .max(1.0) as i64;
            base[axis] = multiples
                .checked_mul(total[axis])
                .ok_or(GridError::FactorOverflow {
                    level: last_level,
                    axis,
                })?;
        }

        let mut tile_sizes = Vec::with_capacity(levels.len());
        tile_sizes.push(base);
        for factor in integer_factors.iter().skip(1) {
            let previous = tile_sizes[tile_sizes.len() - 1];
            tile_sizes.push([previous[0] / factor[0], previous[1] / factor[1]]);
        }

        Ok(Self {
            downsampling_factors,
            integer_factors,
            cumulative_factors,
            tile_sizes,
            voxel_size: levels[0].voxel_size,
        })
    }

    /// Number of resolution levels.
    pub fn num_levels(&self) -> usize {
        self.tile_sizes.len()
    }

    /// Cell size in pixels at a level, or `None` if the level does not exist.
    pub fn tile_size(&self, level: usize) -> Option<[i64; 2]> {
        self.tile_sizes.get(level).copied()
    }

    /// Voxel size ratio between `level` and `level - 1` (level 0 is `[1.0, 1.0]`).
    pub fn downsampling_factor(&self, level: usize) -> Option<[f64; 2]> {
        self.downsampling_factors.get(level).copied()
    }

    /// Integer factor actually used to divide cell sizes at `level`.
    pub fn integer_factor(&self, level: usize) -> Option<[i64; 2]> {
        self.integer_factors.get(level).copied()
    }

    /// Product of the integer factors of levels `1..=level`.
    pub fn product_of_factors(&self, level: usize) -> Option<[i64; 2]> {
        self.cumulative_factors.get(level).copied()
    }

    /// Downsampling of `level` relative to level 0.
    pub fn level_downsample(&self, level: usize) -> Option<[f64; 2]> {
        if level >= self.num_levels() {
            return None;
        }
        let mut downsample = [1.0, 1.0];
        for factor in &self.downsampling_factors[..=level] {
            downsample = [downsample[0] * factor[0], downsample[1] * factor[1]];
        }
        Some(downsample)
    }

    /// Find the coarsest level whose downsample does not exceed `downsample`.
    ///
    /// Renderers use this to pick a level for the current zoom. Returns level
    /// 0 when even level 1 is too coarse.
    pub fn best_level_for_downsample(&self, downsample: f64) -> usize {
        const EPSILON: f64 = 1e-9;
        (0..self.num_levels())
            .rev()
            .find(|&level| {
                self.level_downsample(level)
                    .map(|d| d[0].max(d[1]) <= downsample + EPSILON)
                    .unwrap_or(false)
            })
            .unwrap_or(0)
    }

    /// Position of a tile's `(0, 0)` inside its cell at `level`.
    ///
    /// `dimensions` is the tile's level-0 size. The tile is centered in its
    /// level-0 cell and coarser levels divide that offset by
    /// [`product_of_factors`](Self::product_of_factors), rounding down. All
    /// levels therefore agree on the tile origin to within one coarse pixel.
    pub fn centering_offset(&self, level: usize, dimensions: [u32; 2]) -> Option<[i64; 2]> {
        let product = self.product_of_factors(level)?;
        let cell = self.tile_sizes[0];
        Some([0, 1].map(|axis| {
            (cell[axis] - i64::from(dimensions[axis]))
                .div_euclid(2)
                .div_euclid(product[axis])
        }))
    }

    /// Physical size of one level-0 pixel of the reference tile.
    pub fn voxel_size(&self) -> [f64; 2] {
        self.voxel_size
    }

    /// Physical size of one grid cell, identical across the grid.
    pub fn tile_physical_size(&self) -> [f64; 2] {
        let size = self.tile_sizes[0];
        [
            size[0] as f64 * self.voxel_size[0],
            size[1] as f64 * self.voxel_size[1],
        ]
    }
}

/// Round a downsampling factor to an integer of at least 1.
fn round_factor(factor: f64, level: usize, axis: usize) -> Result<i64, GridError> {
    let rounded = factor.round();
    // `i64::MAX as f64` is 2^63, one past the largest i64
    if rounded >= i64::MAX as f64 {
        return Err(GridError::FactorOverflow { level, axis });
    }
    Ok((rounded as i64).max(1))
}
