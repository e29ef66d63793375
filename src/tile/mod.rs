//! Tile sampling and lazy loading.
//!
//! This module holds everything that deals with per-tile pixel data once a
//! tile source has produced it.
//!
//! # Architecture
//!
//! The cache sits between the stitched image and the tile source:
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │   StitchedImage (final + provisional)   │
//! └────────────────────┬────────────────────┘
//!                      │ status / sample / ensure_opening
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │             LazyTileCache               │
//! │  ┌──────────────┐  ┌─────────────────┐  │
//! │  │ entry table  │  │  worker tasks   │  │
//! │  │ (state +     │  │  (bounded by a  │  │
//! │  │  sampler)    │  │   semaphore)    │  │
//! │  └──────────────┘  └─────────────────┘  │
//! └────────────────────┬────────────────────┘
//!                      │ open_tile
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │               TileSource                │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`TileSampler`]: random access to one tile at one level
//! - [`BufferSampler`]: row-major in-memory sampler
//! - [`TranslatedSampler`]: sampler placed at an offset in its grid cell
//!   with a background extension
//! - [`LazyTileCache`]: per-key load state and asynchronous opens
//! - [`TileKey`], [`LoadState`], [`CacheStats`]: cache addressing and
//!   bookkeeping
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use tile_mosaic::tile::{BufferSampler, TileSampler, TranslatedSampler};
//!
//! let tile: Arc<dyn TileSampler<u8>> = Arc::new(BufferSampler::filled(8, 8, 9u8));
//!
//! // An 8x8 tile centered in a 10x10 cell
//! let placed = TranslatedSampler::new(tile, [1, 1], 0);
//! assert_eq!(placed.sample([0, 0]), 0);
//! assert_eq!(placed.sample([1, 1]), 9);
//! ```

mod cache;
mod sampler;

pub use cache::{CacheStats, LazyTileCache, LoadState, TileKey, DEFAULT_MAX_CONCURRENT_OPENS};
pub use sampler::{BufferSampler, TileSampler, TranslatedSampler};
