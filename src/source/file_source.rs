//! File-backed tile source.
//!
//! Serves tiles described by a [`Manifest`], one image file per tile level.
//! Files are read asynchronously and decoded with the `image` crate on the
//! blocking thread pool, so opens never stall the runtime's worker threads.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use image::{Rgba, RgbaImage};
use tracing::debug;

use crate::error::{ManifestError, TileOpenError};
use crate::tile::TileSampler;

use super::{LevelInfo, Manifest, TileId, TileInfo, TileSource};

/// Tile source reading RGBA image files listed in a manifest.
///
/// # Example
///
/// ```ignore
/// use tile_mosaic::source::FileTileSource;
///
/// let source = FileTileSource::load("mosaic/manifest.json".as_ref()).await?;
/// println!("{} tiles", source.tiles().len());
/// ```
#[derive(Debug, Clone)]
pub struct FileTileSource {
    tiles: Vec<TileInfo>,
    /// Image path of each tile level, indexed by tile id then level
    paths: Vec<Vec<PathBuf>>,
}

impl FileTileSource {
    /// Load a manifest and read the dimensions of every level image.
    ///
    /// Only image headers are read here; pixel data is loaded lazily by
    /// [`TileSource::open_tile`].
    pub async fn load(manifest_path: &Path) -> Result<Self, ManifestError> {
        let mut manifest = Manifest::load(manifest_path).await?;
        let base = manifest_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        manifest.resolve_paths(&base);

        tokio::task::spawn_blocking(move || Self::from_manifest(manifest))
            .await
            .map_err(|e| ManifestError::Invalid(format!("manifest loader panicked: {}", e)))?
    }

    /// Build a source from an already resolved manifest.
    ///
    /// Reads image headers synchronously.
    pub fn from_manifest(manifest: Manifest) -> Result<Self, ManifestError> {
        manifest.validate()?;

        let mut tiles = Vec::with_capacity(manifest.tiles.len());
        let mut paths = Vec::with_capacity(manifest.tiles.len());

        for tile in &manifest.tiles {
            let mut levels = Vec::with_capacity(tile.levels.len());
            for level in &tile.levels {
                let (width, height) =
                    image::image_dimensions(&level.path).map_err(|e| ManifestError::Image {
                        path: level.path.display().to_string(),
                        message: e.to_string(),
                    })?;
                levels.push(LevelInfo::new([width, height], level.voxel_size));
            }
            tiles.push(TileInfo::new(
                tile.name.clone(),
                tile.grid_position(),
                levels,
            ));
            paths.push(tile.levels.iter().map(|l| l.path.clone()).collect());
        }

        Ok(Self { tiles, paths })
    }

    /// Image path of one tile level.
    pub fn level_path(&self, tile: TileId, level: usize) -> Option<&Path> {
        self.paths
            .get(tile.index())
            .and_then(|levels| levels.get(level))
            .map(PathBuf::as_path)
    }
}

#[async_trait]
impl TileSource for FileTileSource {
    type Pixel = Rgba<u8>;

    fn tiles(&self) -> Vec<TileInfo> {
        self.tiles.clone()
    }

    async fn open_tile(
        &self,
        tile: TileId,
        level: usize,
    ) -> Result<Arc<dyn TileSampler<Rgba<u8>>>, TileOpenError> {
        let levels = self
            .paths
            .get(tile.index())
            .ok_or(TileOpenError::NotFound(tile.index()))?;
        let path = levels.get(level).ok_or(TileOpenError::LevelOutOfRange {
            level,
            levels: levels.len(),
        })?;

        let data = tokio::fs::read(path)
            .await
            .map(Bytes::from)
            .map_err(|e| TileOpenError::Io(format!("{}: {}", path.display(), e)))?;
        debug!(path = %path.display(), bytes = data.len(), "Read tile image");

        let image = tokio::task::spawn_blocking(move || decode_rgba(&data))
            .await
            .map_err(|e| TileOpenError::Source(format!("decoder task failed: {}", e)))??;

        Ok(Arc::new(image))
    }
}

fn decode_rgba(data: &Bytes) -> Result<RgbaImage, TileOpenError> {
    image::load_from_memory(data)
        .map(|decoded| decoded.to_rgba8())
        .map_err(|e| TileOpenError::Decode(e.to_string()))
}
