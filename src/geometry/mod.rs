//! Geometry of the stitched image.
//!
//! This module derives everything positional about the mosaic from tile
//! metadata alone, before any pixel data is loaded:
//!
//! - [`PyramidGeometry`]: per-level downsampling factors and the per-level
//!   tile cell size, chosen so that cell boundaries coincide at every level
//! - [`GridLayout`]: assignment of tiles to integer grid cells and the
//!   union bounding box in pixels and in physical units
//!
//! # Cross-level consistency
//!
//! ```text
//!  level 0  |-----------12-----------|-----------12-----------|
//!  level 1  |-----6-----|-----6------|-----6-----|-----6------|
//!  level 2  |--3--|--3--|--3--|--3---|--3--|--3--|--3--|--3---|
//! ```
//!
//! The level-0 cell size is rounded up to a multiple of the product of all
//! downsampling factors, so every coarser cell size is an exact integer and
//! every cell edge lands on the same physical line.

mod grid;
mod pyramid;

pub use grid::GridLayout;
pub use pyramid::{PyramidGeometry, DEFAULT_MARGIN, MAX_MARGIN};

use serde::{Deserialize, Serialize};

/// Integer cell of the tile grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GridPosition {
    pub x: i64,
    pub y: i64,
}

impl GridPosition {
    pub fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }
}

impl From<[i64; 2]> for GridPosition {
    fn from([x, y]: [i64; 2]) -> Self {
        Self { x, y }
    }
}

/// Half-open pixel interval `[min, max)` on both axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelInterval {
    pub min: [i64; 2],
    pub max: [i64; 2],
}

impl PixelInterval {
    pub fn new(min: [i64; 2], max: [i64; 2]) -> Self {
        Self { min, max }
    }

    pub fn width(&self) -> i64 {
        self.max[0].saturating_sub(self.min[0])
    }

    pub fn height(&self) -> i64 {
        self.max[1].saturating_sub(self.min[1])
    }

    /// Whether the pixel `(x, y)` lies inside the interval.
    pub fn contains(&self, x: i64, y: i64) -> bool {
        x >= self.min[0] && x < self.max[0] && y >= self.min[1] && y < self.max[1]
    }

    /// Whether `other` lies entirely inside this interval.
    pub fn contains_interval(&self, other: &PixelInterval) -> bool {
        other.min[0] >= self.min[0]
            && other.min[1] >= self.min[1]
            && other.max[0] <= self.max[0]
            && other.max[1] <= self.max[1]
    }

    pub fn is_empty(&self) -> bool {
        self.width() <= 0 || self.height() <= 0
    }
}

/// Axis-aligned box in physical (real-world) units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhysicalBox {
    pub min: [f64; 2],
    pub max: [f64; 2],
}

impl PhysicalBox {
    pub fn new(min: [f64; 2], max: [f64; 2]) -> Self {
        Self { min, max }
    }

    pub fn size(&self) -> [f64; 2] {
        [self.max[0] - self.min[0], self.max[1] - self.min[1]]
    }

    /// Whether the two boxes overlap with non-zero area.
    pub fn intersects(&self, other: &PhysicalBox) -> bool {
        self.min[0] < other.max[0]
            && other.min[0] < self.max[0]
            && self.min[1] < other.max[1]
            && other.min[1] < self.max[1]
    }
}
