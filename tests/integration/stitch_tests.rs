//! End-to-end tests of the stitched image: geometry, layout and sampling.

use std::sync::Arc;

use tile_mosaic::config::StitchConfig;
use tile_mosaic::error::{GridError, SampleError, StitchError};
use tile_mosaic::geometry::{GridPosition, PixelInterval, PyramidGeometry};
use tile_mosaic::source::TileId;
use tile_mosaic::stitch::StitchedImage;
use tile_mosaic::tile::{LoadState, TileKey};

use super::test_utils::{encode, square_tile, tile_with_voxels, CountingSource};

const BACKGROUND: u64 = 7;

fn stitch(source: CountingSource) -> (StitchedImage<CountingSource>, Arc<CountingSource>) {
    stitch_with(source, StitchConfig::default())
}

fn stitch_with(
    source: CountingSource,
    config: StitchConfig,
) -> (StitchedImage<CountingSource>, Arc<CountingSource>) {
    let source = Arc::new(source);
    let image = StitchedImage::new(Arc::clone(&source), config, BACKGROUND).unwrap();
    (image, source)
}

// =============================================================================
// End-to-end Scenarios
// =============================================================================

#[tokio::test]
async fn test_2x2_grid_of_10px_tiles() {
    let (image, _source) = stitch(CountingSource::grid(2, 2, 10, 1));

    assert_eq!(
        image.pixel_interval(0),
        Some(PixelInterval::new([0, 0], [20, 20]))
    );

    let location = image.locate(0, [9, 9]).unwrap();
    assert_eq!(location.key, TileKey::new(0, 0, 0));
    assert_eq!(location.local, [9, 9]);

    let location = image.locate(0, [10, 10]).unwrap();
    assert_eq!(location.key, TileKey::new(0, 1, 1));
    assert_eq!(location.local, [0, 0]);

    image.wait_for_level(0).await;
    let view = image.final_view();
    // Tile order is row-major: (1, 1) is tile 3
    assert_eq!(view.sample(0, [9, 9]), Ok(encode(0, 0, 9, 9)));
    assert_eq!(view.sample(0, [10, 10]), Ok(encode(3, 0, 0, 0)));
}

#[tokio::test]
async fn test_voxel_sizes_force_divisible_tile_size() {
    let reference = tile_with_voxels("ref", [10, 10], &[[1.0, 1.0], [2.0, 1.0], [4.0, 1.0]]);
    let geometry = PyramidGeometry::compute(&reference, 0.0).unwrap();

    assert_eq!(geometry.downsampling_factor(0), Some([1.0, 1.0]));
    assert_eq!(geometry.downsampling_factor(1), Some([2.0, 1.0]));
    assert_eq!(geometry.downsampling_factor(2), Some([2.0, 1.0]));
    assert_eq!(geometry.product_of_factors(2), Some([4, 1]));

    let source = CountingSource::new(vec![reference]);
    let (image, _source) = stitch(source);
    assert_eq!(image.tile_size(0), Some([12, 10]));
    assert_eq!(image.tile_size(1), Some([6, 10]));
    assert_eq!(image.tile_size(2), Some([3, 10]));
}

// =============================================================================
// Invariants
// =============================================================================

#[tokio::test]
async fn test_divisibility_invariant() {
    let voxel_sets: Vec<Vec<[f64; 2]>> = vec![
        vec![[1.0, 1.0], [2.0, 2.0], [4.0, 4.0], [8.0, 8.0]],
        vec![[0.25, 0.5], [0.75, 1.0], [1.5, 4.0]],
        vec![[1.0, 1.0], [1.4, 2.6], [2.8, 2.6]],
    ];

    for voxels in voxel_sets {
        for margin in [0.0, 0.05, 0.25] {
            let reference = tile_with_voxels("ref", [37, 23], &voxels);
            let geometry = PyramidGeometry::compute(&reference, margin).unwrap();
            let base = geometry.tile_size(0).unwrap();

            for level in 1..geometry.num_levels() {
                let product = geometry.product_of_factors(level).unwrap();
                let size = geometry.tile_size(level).unwrap();
                for axis in 0..2 {
                    assert_eq!(base[axis] % product[axis], 0);
                    assert_eq!(size[axis] * product[axis], base[axis]);
                }
            }
        }
    }
}

#[tokio::test]
async fn test_samples_match_tile_data_at_every_level() {
    let (image, _source) = stitch(CountingSource::grid(3, 2, 16, 3));
    let view = image.final_view();

    for level in 0..image.num_levels() {
        image.wait_for_level(level).await;
        let size = image.tile_size(level).unwrap();
        let union = image.pixel_interval(level).unwrap();

        for y in union.min[1]..union.max[1] {
            for x in union.min[0]..union.max[0] {
                let location = image.locate(level, [x, y]).unwrap();
                let tile = location.tile.unwrap().index();
                let expected = encode(
                    tile,
                    level,
                    location.local[0] as u32,
                    location.local[1] as u32,
                );
                assert_eq!(view.sample(level, [x, y]), Ok(expected));
                assert_eq!(location.key.tile_x * size[0] + location.local[0], x);
            }
        }
    }
}

#[tokio::test]
async fn test_missing_cell_returns_background_without_loading() {
    let source = CountingSource::new(vec![
        square_tile("left", Some(GridPosition::new(0, 0)), 8, 1),
        square_tile("right", Some(GridPosition::new(2, 0)), 8, 1),
    ]);
    let (image, source) = stitch(source);
    let view = image.provisional_view();

    for x in 8..16 {
        for y in 0..8 {
            let sample = view.sample(0, [x, y]).unwrap();
            assert_eq!(sample.value(), BACKGROUND);
            assert!(!sample.is_provisional());
        }
    }

    tokio::task::yield_now().await;
    assert_eq!(source.total_opens(), 0);
    assert_eq!(image.load_state(TileKey::new(0, 1, 0)), LoadState::Missing);
    assert_eq!(image.cache_stats().closed, 2);
}

#[tokio::test]
async fn test_negative_grid_positions() {
    let source = CountingSource::new(vec![
        square_tile("origin", Some(GridPosition::new(0, 0)), 4, 1),
        square_tile("upper_left", Some(GridPosition::new(-1, -1)), 4, 1),
    ]);
    let (image, _source) = stitch(source);

    assert_eq!(
        image.pixel_interval(0),
        Some(PixelInterval::new([-4, -4], [4, 4]))
    );

    image.wait_for_level(0).await;
    let view = image.final_view();
    assert_eq!(view.sample(0, [-1, -1]), Ok(encode(1, 0, 3, 3)));
    assert_eq!(view.sample(0, [-4, -4]), Ok(encode(1, 0, 0, 0)));
    assert_eq!(view.sample(0, [0, 0]), Ok(encode(0, 0, 0, 0)));
    // Empty cells of the union
    assert_eq!(view.sample(0, [-1, 0]), Ok(BACKGROUND));
    assert_eq!(view.sample(0, [0, -1]), Ok(BACKGROUND));
}

#[tokio::test]
async fn test_auto_layout() {
    let tiles = (0..5)
        .map(|i| square_tile(&format!("auto_{i}"), None, 10, 1))
        .collect();
    let (image, _source) = stitch(CountingSource::new(tiles));

    // ceil(sqrt(5)) = 3 columns, 2 rows
    assert_eq!(
        image.pixel_interval(0),
        Some(PixelInterval::new([0, 0], [30, 20]))
    );
    assert_eq!(image.layout().tile_at(GridPosition::new(2, 0)), Some(TileId(2)));
    assert_eq!(image.layout().tile_at(GridPosition::new(1, 1)), Some(TileId(4)));
    assert_eq!(image.layout().tile_at(GridPosition::new(2, 1)), None);
}

#[tokio::test]
async fn test_smaller_tile_is_centered_in_cell() {
    let source = CountingSource::new(vec![
        square_tile("reference", Some(GridPosition::new(0, 0)), 10, 1),
        square_tile("small", Some(GridPosition::new(1, 0)), 6, 1),
    ]);
    let (image, _source) = stitch(source);
    image.wait_for_level(0).await;
    let view = image.final_view();

    // 6px tile in a 10px cell: offset 2 on each axis
    assert_eq!(view.sample(0, [11, 5]), Ok(BACKGROUND));
    assert_eq!(view.sample(0, [12, 2]), Ok(encode(1, 0, 0, 0)));
    assert_eq!(view.sample(0, [17, 7]), Ok(encode(1, 0, 5, 5)));
    assert_eq!(view.sample(0, [18, 7]), Ok(BACKGROUND));
}

#[tokio::test]
async fn test_margin_scales_with_levels() {
    let config = StitchConfig::new().with_margin(0.1);
    let (image, _source) = stitch_with(CountingSource::grid(2, 1, 100, 2), config);

    assert_eq!(image.tile_size(0), Some([120, 120]));
    assert_eq!(image.tile_size(1), Some([60, 60]));
    assert_eq!(
        image.pixel_interval(1),
        Some(PixelInterval::new([0, 0], [120, 60]))
    );

    image.wait_for_level(1).await;
    let view = image.final_view();
    // 50px level-1 tile centered in a 60px cell
    assert_eq!(view.sample(1, [4, 30]), Ok(BACKGROUND));
    assert_eq!(view.sample(1, [5, 30]), Ok(encode(0, 1, 0, 25)));
    assert_eq!(view.sample(1, [65, 30]), Ok(encode(1, 1, 0, 25)));
}

#[tokio::test]
async fn test_coarse_offsets_follow_level_zero() {
    let source = CountingSource::new(vec![
        square_tile("reference", Some(GridPosition::new(0, 0)), 10, 2),
        square_tile("small", Some(GridPosition::new(1, 0)), 7, 2),
    ]);
    let (image, _source) = stitch(source);
    image.wait_for_level(0).await;
    image.wait_for_level(1).await;
    let view = image.final_view();

    // Level 0: 7px tile at offset 1 in a 10px cell
    assert_eq!(view.sample(0, [10, 4]), Ok(BACKGROUND));
    assert_eq!(view.sample(0, [11, 4]), Ok(encode(1, 0, 0, 3)));
    assert_eq!(view.sample(0, [17, 4]), Ok(encode(1, 0, 6, 3)));
    assert_eq!(view.sample(0, [18, 4]), Ok(BACKGROUND));

    // Level 1: offset 1 / 2 = 0, the 3px tile starts at the cell edge
    assert_eq!(view.sample(1, [5, 1]), Ok(encode(1, 1, 0, 1)));
    assert_eq!(view.sample(1, [7, 1]), Ok(encode(1, 1, 2, 1)));
    assert_eq!(view.sample(1, [8, 1]), Ok(BACKGROUND));
}

// =============================================================================
// Errors
// =============================================================================

#[tokio::test]
async fn test_sampling_errors_are_distinct() {
    let (image, source) = stitch(CountingSource::grid(1, 1, 8, 2));
    let final_view = image.final_view();
    let provisional_view = image.provisional_view();

    let out_of_range = SampleError::OutOfRange {
        level: 1,
        x: 4,
        y: 0,
    };
    assert_eq!(final_view.sample(1, [4, 0]), Err(out_of_range));
    assert_eq!(provisional_view.sample(1, [4, 0]), Err(out_of_range));

    let invalid_level = SampleError::InvalidLevel {
        level: 2,
        num_levels: 2,
    };
    assert_eq!(final_view.sample(2, [0, 0]), Err(invalid_level));
    assert_eq!(provisional_view.sample(2, [0, 0]), Err(invalid_level));

    tokio::task::yield_now().await;
    assert_eq!(source.total_opens(), 0);
}

#[tokio::test]
async fn test_duplicate_positions_rejected() {
    let source = Arc::new(CountingSource::new(vec![
        square_tile("a", Some(GridPosition::new(1, 1)), 8, 1),
        square_tile("b", Some(GridPosition::new(1, 1)), 8, 1),
    ]));
    let result = StitchedImage::new(source, StitchConfig::default(), BACKGROUND);

    match result {
        Err(StitchError::Grid(GridError::DuplicatePosition { first, second, .. })) => {
            assert_eq!(first, "a");
            assert_eq!(second, "b");
        }
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("duplicate positions were accepted"),
    }
}
