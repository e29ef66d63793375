//! JSON tile manifest.
//!
//! A manifest lists the tiles of a mosaic, their optional grid positions,
//! and one image file per pyramid level:
//!
//! ```json
//! {
//!   "tiles": [
//!     {
//!       "name": "A1",
//!       "grid_position": [0, 0],
//!       "levels": [
//!         { "path": "A1/0.png", "voxel_size": [0.5, 0.5] },
//!         { "path": "A1/1.png", "voxel_size": [1.0, 1.0] }
//!       ]
//!     }
//!   ]
//! }
//! ```
//!
//! Relative paths are resolved against the manifest's directory.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ManifestError;
use crate::geometry::GridPosition;

/// Top-level manifest document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub tiles: Vec<ManifestTile>,
}

/// One tile entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestTile {
    pub name: String,

    #[serde(default)]
    pub grid_position: Option<[i64; 2]>,

    pub levels: Vec<ManifestLevel>,
}

/// One level of a tile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestLevel {
    pub path: PathBuf,
    pub voxel_size: [f64; 2],
}

impl ManifestTile {
    pub fn grid_position(&self) -> Option<GridPosition> {
        self.grid_position.map(GridPosition::from)
    }
}

impl Manifest {
    /// Parse a manifest from JSON text.
    pub fn from_json(json: &str) -> Result<Self, ManifestError> {
        let manifest: Manifest = serde_json::from_str(json)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Read and parse a manifest file.
    pub async fn load(path: &Path) -> Result<Self, ManifestError> {
        let json = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ManifestError::Io {
                path: path.display().to_string(),
                source,
            })?;
        Self::from_json(&json)
    }

    /// Check that the manifest describes at least one tile and every tile
    /// has at least one level.
    pub fn validate(&self) -> Result<(), ManifestError> {
        if self.tiles.is_empty() {
            return Err(ManifestError::Invalid("manifest lists no tiles".to_string()));
        }
        for tile in &self.tiles {
            if tile.levels.is_empty() {
                return Err(ManifestError::Invalid(format!(
                    "tile '{}' has no levels",
                    tile.name
                )));
            }
        }
        Ok(())
    }

    /// Resolve every relative level path against `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        for level in self.tiles.iter_mut().flat_map(|t| t.levels.iter_mut()) {
            if level.path.is_relative() {
                level.path = base.join(&level.path);
            }
        }
    }
}
