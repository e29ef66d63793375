use std::sync::Arc;

use crate::error::SampleError;
use crate::geometry::{PhysicalBox, PixelInterval};
use crate::source::TileSource;

use super::stitched::Mosaic;

/// Sample value together with whether it may still change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProvisionalSample<T> {
    value: T,
    provisional: bool,
}

impl<T: Copy> ProvisionalSample<T> {
    pub fn new(value: T, provisional: bool) -> Self {
        Self { value, provisional }
    }

    pub fn value(&self) -> T {
        self.value
    }

    /// True while the tile behind this sample is still loading.
    ///
    /// Background from an empty cell or a failed tile is final. After the
    /// image is disposed, a tile whose open was abandoned stays `Opening` or
    /// `Closed`, so its samples stay provisional for good.
    pub fn is_provisional(&self) -> bool {
        self.provisional
    }

    pub fn into_value(self) -> T {
        self.value
    }
}

// =============================================================================
// Final View
// =============================================================================

/// View of a stitched image that returns plain values.
///
/// Pixels of tiles that are not loaded yet read as background.
pub struct FinalPyramid<S: TileSource> {
    mosaic: Arc<Mosaic<S>>,
}

impl<S: TileSource> Clone for FinalPyramid<S> {
    fn clone(&self) -> Self {
        Self {
            mosaic: Arc::clone(&self.mosaic),
        }
    }
}

impl<S: TileSource> FinalPyramid<S> {
    pub(crate) fn new(mosaic: Arc<Mosaic<S>>) -> Self {
        Self { mosaic }
    }

    /// Sample the global pixel `position` at `level`.
    pub fn sample(&self, level: usize, position: [i64; 2]) -> Result<S::Pixel, SampleError> {
        self.mosaic.sample(level, position).map(|(value, _)| value)
    }

    /// Rasterize `region` row-major.
    pub fn render_region(
        &self,
        level: usize,
        region: &PixelInterval,
    ) -> Result<Vec<S::Pixel>, SampleError> {
        render(&self.mosaic, level, region, |value, _| value)
    }

    pub fn num_levels(&self) -> usize {
        self.mosaic.geometry().num_levels()
    }

    pub fn tile_size(&self, level: usize) -> Option<[i64; 2]> {
        self.mosaic.geometry().tile_size(level)
    }

    pub fn downsampling_factor(&self, level: usize) -> Option<[f64; 2]> {
        self.mosaic.geometry().downsampling_factor(level)
    }

    pub fn physical_mask(&self) -> PhysicalBox {
        self.mosaic.physical_mask()
    }

    pub fn pixel_interval(&self, level: usize) -> Option<PixelInterval> {
        self.mosaic.pixel_interval(level)
    }
}

// =============================================================================
// Provisional View
// =============================================================================

/// View of a stitched image that flags samples of still-loading tiles.
pub struct ProvisionalPyramid<S: TileSource> {
    mosaic: Arc<Mosaic<S>>,
}

impl<S: TileSource> Clone for ProvisionalPyramid<S> {
    fn clone(&self) -> Self {
        Self {
            mosaic: Arc::clone(&self.mosaic),
        }
    }
}

impl<S: TileSource> ProvisionalPyramid<S> {
    pub(crate) fn new(mosaic: Arc<Mosaic<S>>) -> Self {
        Self { mosaic }
    }

    /// Sample the global pixel `position` at `level`.
    pub fn sample(
        &self,
        level: usize,
        position: [i64; 2],
    ) -> Result<ProvisionalSample<S::Pixel>, SampleError> {
        self.mosaic
            .sample(level, position)
            .map(|(value, state)| ProvisionalSample::new(value, state.is_pending()))
    }

    /// Rasterize `region` row-major.
    pub fn render_region(
        &self,
        level: usize,
        region: &PixelInterval,
    ) -> Result<Vec<ProvisionalSample<S::Pixel>>, SampleError> {
        render(&self.mosaic, level, region, |value, provisional| {
            ProvisionalSample::new(value, provisional)
        })
    }

    pub fn num_levels(&self) -> usize {
        self.mosaic.geometry().num_levels()
    }

    pub fn tile_size(&self, level: usize) -> Option<[i64; 2]> {
        self.mosaic.geometry().tile_size(level)
    }

    pub fn downsampling_factor(&self, level: usize) -> Option<[f64; 2]> {
        self.mosaic.geometry().downsampling_factor(level)
    }

    pub fn physical_mask(&self) -> PhysicalBox {
        self.mosaic.physical_mask()
    }

    pub fn pixel_interval(&self, level: usize) -> Option<PixelInterval> {
        self.mosaic.pixel_interval(level)
    }
}

fn render<S, U>(
    mosaic: &Mosaic<S>,
    level: usize,
    region: &PixelInterval,
    map: impl Fn(S::Pixel, bool) -> U,
) -> Result<Vec<U>, SampleError>
where
    S: TileSource,
{
    mosaic.check_region(level, region)?;
    if region.is_empty() {
        return Ok(Vec::new());
    }

    let mut pixels = Vec::with_capacity((region.width() * region.height()) as usize);
    for y in region.min[1]..region.max[1] {
        for x in region.min[0]..region.max[0] {
            let (value, state) = mosaic.sample(level, [x, y])?;
            pixels.push(map(value, state.is_pending()));
        }
    }
    Ok(pixels)
}
