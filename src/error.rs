use thiserror::Error;

use crate::geometry::GridPosition;

/// Errors detected while building the grid and pyramid geometry.
///
/// These are fatal at construction time: no partial stitched image is
/// returned when any of them occurs.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GridError {
    /// No tiles were supplied
    #[error("Grid is empty: at least one tile is required")]
    Empty,

    /// Two tiles claim the same grid cell
    #[error("Duplicate grid position ({}, {}): tiles '{first}' and '{second}'", position.x, position.y)]
    DuplicatePosition {
        position: GridPosition,
        first: String,
        second: String,
    },

    /// A tile has fewer pyramid levels than the reference tile
    #[error("Tile '{tile}' has {actual} levels, the reference tile has {expected}")]
    LevelCountMismatch {
        tile: String,
        expected: usize,
        actual: usize,
    },

    /// The reference tile reports no pyramid levels at all
    #[error("Reference tile '{0}' has no pyramid levels")]
    NoLevels(String),

    /// A voxel size is zero, negative, or not finite
    #[error("Invalid voxel size {value} at level {level}, axis {axis}")]
    InvalidVoxelSize { level: usize, axis: usize, value: f64 },

    /// Downsampling factors multiply past the integer pixel range
    #[error("Downsampling factor overflow at level {level}, axis {axis}")]
    FactorOverflow { level: usize, axis: usize },

    /// Grid positions place cells outside the integer pixel range
    #[error(
        "Grid positions ({}, {}) to ({}, {}) exceed the pixel coordinate range",
        min.x, min.y, max.x, max.y
    )]
    PositionOutOfRange { min: GridPosition, max: GridPosition },
}

/// Errors raised by a tile source while opening one tile at one level.
///
/// The lazy tile cache absorbs these at the worker boundary: the tile is
/// marked failed and renders as background, the error is only logged.
#[derive(Debug, Clone, Error)]
pub enum TileOpenError {
    /// Underlying storage could not be read
    #[error("I/O error: {0}")]
    Io(String),

    /// Stored bytes could not be decoded into pixels
    #[error("Decode error: {0}")]
    Decode(String),

    /// The requested level does not exist for this tile
    #[error("Level {level} out of range: tile has {levels} levels")]
    LevelOutOfRange { level: usize, levels: usize },

    /// The tile identifier is unknown to the source
    #[error("Tile not found: {0}")]
    NotFound(usize),

    /// Any other backend-specific failure
    #[error("Tile source error: {0}")]
    Source(String),
}

/// Errors returned when sampling the stitched image.
///
/// Coordinates outside the union pixel interval are always reported with
/// [`SampleError::OutOfRange`]; callers are expected to clip first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SampleError {
    /// Global coordinate lies outside the union of all tiles
    #[error("Coordinate ({x}, {y}) is outside the stitched image at level {level}")]
    OutOfRange { level: usize, x: i64, y: i64 },

    /// Level does not exist in the pyramid
    #[error("Invalid level {level}: pyramid has {num_levels} levels")]
    InvalidLevel { level: usize, num_levels: usize },
}

/// Errors that prevent a stitched image from being constructed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StitchError {
    /// Grid or geometry is inconsistent
    #[error("Invalid grid: {0}")]
    Grid(#[from] GridError),

    /// Margin fraction outside the accepted range
    #[error("Invalid margin {0}: must be within [0.0, 0.5]")]
    InvalidMargin(f64),

    /// Worker pool would have no capacity
    #[error("max_concurrent_opens must be greater than 0")]
    InvalidConcurrency,

    /// Construction happened outside a tokio runtime and no handle was supplied
    #[error("No tokio runtime available to schedule tile opens")]
    NoRuntime,
}

/// Errors reading a tile manifest from disk.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// The manifest or one of its images could not be read
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The manifest is not valid JSON for the expected schema
    #[error("Invalid manifest JSON: {0}")]
    Parse(#[from] serde_json::Error),

    /// An image header could not be read
    #[error("Cannot read image {path}: {message}")]
    Image { path: String, message: String },

    /// The manifest parsed but describes an unusable tile set
    #[error("Invalid manifest: {0}")]
    Invalid(String),
}
