//! Tile source abstraction layer.
//!
//! A tile source is the only component that touches storage. The stitching
//! engine sees it through the [`TileSource`] trait, implemented once per
//! storage backend:
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │            LazyTileCache                │
//! │  (schedules opens on worker tasks)      │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │           TileSource Trait              │
//! │  (tiles() metadata, open_tile())        │
//! └────────────────────┬────────────────────┘
//!                      │
//!          ┌───────────┴───────────┐
//!          ▼                       ▼
//! ┌─────────────────┐    ┌─────────────────────┐
//! │ MemoryTileSource│    │   FileTileSource    │
//! │  (in-memory)    │    │ (manifest + images) │
//! └─────────────────┘    └─────────────────────┘
//! ```
//!
//! Releasing whatever a source holds open is the source's own business; the
//! engine only reads from the samplers it is handed.

mod file_source;
mod manifest;
mod memory;
mod tile_source;

pub use file_source::FileTileSource;
pub use manifest::{Manifest, ManifestLevel, ManifestTile};
pub use memory::MemoryTileSource;
pub use tile_source::{LevelInfo, TileId, TileInfo, TileSource};
