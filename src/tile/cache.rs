//! Lazy tile cache.
//!
//! Holds one entry per `(level, tile_x, tile_y)` for every tile of the grid.
//! Each entry owns an atomic load state and a write-once sampler slot:
//!
//! ```text
//!            ensure_opening            open succeeds
//!  Closed ──────────────────► Opening ──────────────► Open
//!                                │
//!                                │ open fails
//!                                ▼
//!                              Failed
//! ```
//!
//! # Concurrency
//!
//! The entry table is built once and never resized, so readers look entries
//! up without locking. `ensure_opening` wins the `Closed -> Opening`
//! transition with a compare-and-swap; only the winner schedules an open, so
//! concurrent callers for the same key produce exactly one open. The worker
//! installs the sampler before publishing `Open` with release ordering, and
//! readers load the state with acquire ordering, so an `Open` entry always
//! has its sampler.
//!
//! Opens run as tasks on a tokio runtime, bounded by a semaphore.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};

use tokio::runtime::Handle;
use tokio::sync::{watch, Semaphore};
use tracing::{debug, warn};

use crate::error::TileOpenError;
use crate::geometry::{GridLayout, PyramidGeometry};
use crate::source::{TileId, TileSource};

use super::sampler::TranslatedSampler;

/// Default number of tile opens allowed to run at once.
pub const DEFAULT_MAX_CONCURRENT_OPENS: usize = 8;

// =============================================================================
// Cache Key and State
// =============================================================================

/// Cache key: one tile at one level, addressed by its grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileKey {
    /// Pyramid level (0 = highest resolution)
    pub level: usize,

    /// Grid column
    pub tile_x: i64,

    /// Grid row
    pub tile_y: i64,
}

impl TileKey {
    pub fn new(level: usize, tile_x: i64, tile_y: i64) -> Self {
        Self {
            level,
            tile_x,
            tile_y,
        }
    }
}

/// Load state of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum LoadState {
    /// Not yet requested
    Closed = 0,
    /// Open scheduled or running
    Opening = 1,
    /// Sampler installed
    Open = 2,
    /// Open failed; the tile renders as background for good
    Failed = 3,
    /// No tile occupies this grid cell
    Missing = 4,
}

impl LoadState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => LoadState::Closed,
            1 => LoadState::Opening,
            2 => LoadState::Open,
            3 => LoadState::Failed,
            _ => LoadState::Missing,
        }
    }

    /// Whether the state can never change again.
    pub fn is_terminal(self) -> bool {
        matches!(self, LoadState::Open | LoadState::Failed | LoadState::Missing)
    }

    /// Whether sampling in this state yields a provisional value.
    pub fn is_pending(self) -> bool {
        matches!(self, LoadState::Closed | LoadState::Opening)
    }
}

/// Snapshot of entry counts per state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub closed: usize,
    pub opening: usize,
    pub open: usize,
    pub failed: usize,
}

impl CacheStats {
    pub fn total(&self) -> usize {
        self.closed + self.opening + self.open + self.failed
    }
}

// =============================================================================
// Cache Entry
// =============================================================================

struct CacheEntry<T> {
    tile: TileId,
    name: Arc<str>,
    /// Tile origin inside its cell at this entry's level
    offset: [i64; 2],
    state: AtomicU8,
    sampler: OnceLock<TranslatedSampler<T>>,
}

impl<T> CacheEntry<T> {
    fn state(&self) -> LoadState {
        LoadState::from_u8(self.state.load(Ordering::Acquire))
    }
}

// =============================================================================
// Lazy Tile Cache
// =============================================================================

/// Lazily loading, concurrently readable cache of tile samplers.
///
/// Cloning is cheap and yields another handle to the same cache.
pub struct LazyTileCache<S: TileSource> {
    inner: Arc<CacheInner<S>>,
}

struct CacheInner<S: TileSource> {
    source: Arc<S>,
    entries: HashMap<TileKey, CacheEntry<S::Pixel>>,
    background: S::Pixel,
    runtime: Handle,
    /// Bounds the number of opens running at once
    permits: Semaphore,
    disposed: AtomicBool,
    /// Bumped whenever an entry settles or the cache is disposed
    settled: watch::Sender<u64>,
}

impl<S: TileSource> Clone for LazyTileCache<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: TileSource> LazyTileCache<S> {
    /// Create a cache with one `Closed` entry per tile and level.
    ///
    /// # Arguments
    ///
    /// * `source` - Tile source that performs the actual opens
    /// * `layout` - Grid cell of every tile
    /// * `geometry` - Levels and cell sizes
    /// * `background` - Value returned wherever no data is available
    /// * `max_concurrent_opens` - Worker pool size (at least 1)
    /// * `runtime` - Runtime on which opens are spawned
    pub fn new(
        source: Arc<S>,
        layout: &GridLayout,
        geometry: &PyramidGeometry,
        background: S::Pixel,
        max_concurrent_opens: usize,
        runtime: Handle,
    ) -> Self {
        let mut entries = HashMap::with_capacity(layout.len() * geometry.num_levels());
        for level in 0..geometry.num_levels() {
            for (tile, position) in layout.iter() {
                let dimensions = layout.dimensions_of(tile).unwrap_or_default();
                let Some(offset) = geometry.centering_offset(level, dimensions) else {
                    continue;
                };
                let name: Arc<str> = Arc::from(layout.name_of(tile).unwrap_or_default());
                entries.insert(
                    TileKey::new(level, position.x, position.y),
                    CacheEntry {
                        tile,
                        name,
                        offset,
                        state: AtomicU8::new(LoadState::Closed as u8),
                        sampler: OnceLock::new(),
                    },
                );
            }
        }

        let (settled, _) = watch::channel(0);

        Self {
            inner: Arc::new(CacheInner {
                source,
                entries,
                background,
                runtime,
                permits: Semaphore::new(max_concurrent_opens.max(1)),
                disposed: AtomicBool::new(false),
                settled,
            }),
        }
    }

    /// Current state of a key. Never blocks.
    ///
    /// Keys whose grid cell holds no tile report [`LoadState::Missing`].
    pub fn status(&self, key: TileKey) -> LoadState {
        self.inner
            .entries
            .get(&key)
            .map(CacheEntry::state)
            .unwrap_or(LoadState::Missing)
    }

    /// Schedule the open of a `Closed` key. No-op in any other state.
    pub fn ensure_opening(&self, key: TileKey) {
        let Some(entry) = self.inner.entries.get(&key) else {
            return;
        };
        if self.inner.disposed.load(Ordering::Acquire) {
            return;
        }

        let won = entry
            .state
            .compare_exchange(
                LoadState::Closed as u8,
                LoadState::Opening as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if !won {
            return;
        }

        debug!(tile = %entry.name, level = key.level, "Scheduling tile open");
        let inner = Arc::clone(&self.inner);
        self.inner.runtime.spawn(inner.open_entry(key));
    }

    /// Sample an `Open` key at cell-local coordinates.
    ///
    /// Returns `None` unless the key is `Open`; callers check
    /// [`status`](Self::status) first.
    pub fn sample(&self, key: TileKey, local: [i64; 2]) -> Option<S::Pixel> {
        let entry = self.inner.entries.get(&key)?;
        if entry.state() != LoadState::Open {
            return None;
        }
        entry.sampler.get().map(|sampler| sampler.sample(local))
    }

    /// Value returned wherever no data is available.
    pub fn background(&self) -> S::Pixel {
        self.inner.background
    }

    /// Keys of all entries at a level.
    pub fn keys(&self, level: usize) -> Vec<TileKey> {
        let mut keys: Vec<TileKey> = self
            .inner
            .entries
            .keys()
            .filter(|key| key.level == level)
            .copied()
            .collect();
        keys.sort_by_key(|key| (key.tile_y, key.tile_x));
        keys
    }

    /// Open every tile of a level and wait until each is `Open` or `Failed`.
    ///
    /// Returns the level's final counts. Returns early if the cache is
    /// disposed while waiting.
    pub async fn wait_for_level(&self, level: usize) -> CacheStats {
        let mut settled = self.inner.settled.subscribe();
        let keys = self.keys(level);
        for key in &keys {
            self.ensure_opening(*key);
        }

        loop {
            if keys.iter().all(|key| self.status(*key).is_terminal()) {
                break;
            }
            if self.inner.disposed.load(Ordering::Acquire) {
                break;
            }
            if settled.changed().await.is_err() {
                break;
            }
        }

        self.level_stats(level)
    }

    /// Counts of entries per state across all levels.
    pub fn stats(&self) -> CacheStats {
        self.count_states(|_| true)
    }

    /// Counts of entries per state at one level.
    pub fn level_stats(&self, level: usize) -> CacheStats {
        self.count_states(|key| key.level == level)
    }

    fn count_states(&self, filter: impl Fn(&TileKey) -> bool) -> CacheStats {
        let mut stats = CacheStats::default();
        for (key, entry) in &self.inner.entries {
            if !filter(key) {
                continue;
            }
            match entry.state() {
                LoadState::Closed => stats.closed += 1,
                LoadState::Opening => stats.opening += 1,
                LoadState::Open => stats.open += 1,
                LoadState::Failed => stats.failed += 1,
                LoadState::Missing => {}
            }
        }
        stats
    }

    /// Stop scheduling and installing opens.
    ///
    /// Pending opens are abandoned; tiles that are already `Open` stay open.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!("Disposing tile cache");
        self.inner.permits.close();
        self.inner.settled.send_modify(|n| *n += 1);
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }
}

impl<S: TileSource> CacheInner<S> {
    /// Worker body: open one entry and publish the result.
    async fn open_entry(self: Arc<Self>, key: TileKey) {
        let Some(entry) = self.entries.get(&key) else {
            return;
        };

        // Closed on dispose, which abandons queued opens
        let Ok(_permit) = self.permits.acquire().await else {
            return;
        };
        if self.disposed.load(Ordering::Acquire) {
            return;
        }

        // A panicking source only fails its own tile
        let source = Arc::clone(&self.source);
        let tile = entry.tile;
        let level = key.level;
        let result = match tokio::spawn(async move { source.open_tile(tile, level).await }).await
        {
            Ok(result) => result,
            Err(e) => Err(TileOpenError::Source(format!("open task failed: {}", e))),
        };

        if self.disposed.load(Ordering::Acquire) {
            debug!(tile = %entry.name, level, "Discarding open result after dispose");
            return;
        }

        match result {
            Ok(sampler) => {
                let translated = TranslatedSampler::new(sampler, entry.offset, self.background);
                if entry.sampler.set(translated).is_err() {
                    debug!(tile = %entry.name, level, "Discarding duplicate completion");
                    return;
                }
                entry
                    .state
                    .store(LoadState::Open as u8, Ordering::Release);
                debug!(tile = %entry.name, level, "Tile open");
            }
            Err(e) => {
                warn!(tile = %entry.name, level, error = %e, "Failed to open tile");
                entry
                    .state
                    .store(LoadState::Failed as u8, Ordering::Release);
            }
        }

        self.settled.send_modify(|n| *n += 1);
    }
}

// =============================================================================
// Tests
// =============================================================================
