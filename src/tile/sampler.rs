//! Pixel samplers.
//!
//! [`TileSampler`] is the per-tile, per-level pixel accessor produced by tile
//! sources. [`TranslatedSampler`] is the wrapper the cache installs: it
//! places the tile inside its grid cell and extends it with a constant
//! background value outside the tile's bounds.

use std::sync::Arc;

use image::{ImageBuffer, Pixel};

/// Random access to the pixels of one tile at one level.
pub trait TileSampler<T>: Send + Sync {
    /// Width and height in pixels.
    fn dimensions(&self) -> [u32; 2];

    /// Pixel at `(x, y)`. Callers guarantee `x < width` and `y < height`.
    fn get(&self, x: u32, y: u32) -> T;
}

impl<P> TileSampler<P> for ImageBuffer<P, Vec<P::Subpixel>>
where
    P: Pixel + Send + Sync + 'static,
    P::Subpixel: Send + Sync,
{
    fn dimensions(&self) -> [u32; 2] {
        [self.width(), self.height()]
    }

    fn get(&self, x: u32, y: u32) -> P {
        *self.get_pixel(x, y)
    }
}

// =============================================================================
// Buffer Sampler
// =============================================================================

/// Row-major in-memory pixel buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct BufferSampler<T> {
    width: u32,
    height: u32,
    data: Vec<T>,
}

impl<T: Copy> BufferSampler<T> {
    /// Wrap a row-major buffer. Returns `None` if its length is not
    /// `width * height`.
    pub fn from_vec(width: u32, height: u32, data: Vec<T>) -> Option<Self> {
        if data.len() != width as usize * height as usize {
            return None;
        }
        Some(Self {
            width,
            height,
            data,
        })
    }

    /// Buffer of a single repeated value.
    pub fn filled(width: u32, height: u32, value: T) -> Self {
        Self {
            width,
            height,
            data: vec![value; width as usize * height as usize],
        }
    }

    /// Buffer whose pixel `(x, y)` is `f(x, y)`.
    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> T) -> Self {
        let mut data = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Self {
            width,
            height,
            data,
        }
    }
}

impl<T: Copy + Send + Sync> TileSampler<T> for BufferSampler<T> {
    fn dimensions(&self) -> [u32; 2] {
        [self.width, self.height]
    }

    fn get(&self, x: u32, y: u32) -> T {
        self.data[y as usize * self.width as usize + x as usize]
    }
}

// =============================================================================
// Translated Sampler
// =============================================================================

/// Tile sampler placed inside its grid cell.
///
/// The offset comes from
/// [`PyramidGeometry::centering_offset`](crate::geometry::PyramidGeometry::centering_offset):
/// a tile narrower than its cell (because of the margin, or because it is
/// smaller than the reference tile) gets a band of background on both sides.
pub struct TranslatedSampler<T> {
    inner: Arc<dyn TileSampler<T>>,

    /// Position of the tile's `(0, 0)` in cell-local coordinates
    offset: [i64; 2],

    dimensions: [i64; 2],

    background: T,
}

impl<T: Copy> TranslatedSampler<T> {
    /// Place `inner` with its origin at `offset` inside the cell.
    pub fn new(inner: Arc<dyn TileSampler<T>>, offset: [i64; 2], background: T) -> Self {
        let [width, height] = inner.dimensions();
        Self {
            inner,
            offset,
            dimensions: [i64::from(width), i64::from(height)],
            background,
        }
    }

    /// Offset of the tile inside its cell.
    pub fn offset(&self) -> [i64; 2] {
        self.offset
    }

    /// Sample at cell-local coordinates; background outside the tile.
    pub fn sample(&self, local: [i64; 2]) -> T {
        let x = local[0] - self.offset[0];
        let y = local[1] - self.offset[1];
        if x < 0 || y < 0 || x >= self.dimensions[0] || y >= self.dimensions[1] {
            return self.background;
        }
        self.inner.get(x as u32, y as u32)
    }
}
