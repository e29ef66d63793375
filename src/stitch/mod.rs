//! Stitched multi-resolution image.
//!
//! A [`StitchedImage`] presents every tile of a [`TileSource`] as one
//! seamless image at every pyramid level. Tiles are loaded lazily: the first
//! sample that lands on a tile schedules its open, and until the tile is
//! available the image returns the background value.
//!
//! Two views share one tile cache:
//!
//! - [`FinalPyramid`]: plain values, for consumers that only want pixels
//! - [`ProvisionalPyramid`]: [`ProvisionalSample`]s that say whether the
//!   value may still change once the tile finishes loading
//!
//! ```text
//!  FinalPyramid ──┐                 ┌── ProvisionalPyramid
//!                 ▼                 ▼
//!          ┌──────────────────────────────┐
//!          │ layout + geometry + cache    │
//!          └──────────────────────────────┘
//! ```
//!
//! Dropping the last image or view handle disposes the cache: opens still
//! queued are abandoned and nothing new is scheduled.
//!
//! Stitched images cannot themselves be used as tiles of another stitched
//! image.
//!
//! [`TileSource`]: crate::source::TileSource

mod stitched;
mod views;

pub use stitched::{StitchedImage, TileLocation};
pub use views::{FinalPyramid, ProvisionalPyramid, ProvisionalSample};
