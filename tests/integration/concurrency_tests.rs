//! Tests for lazy loading under concurrency: single opens, state ordering,
//! failure isolation, pool bounds and disposal.

use std::sync::{Arc, Barrier};
use std::time::Duration;

use tile_mosaic::config::StitchConfig;
use tile_mosaic::stitch::StitchedImage;
use tile_mosaic::tile::{LoadState, TileKey};

use super::test_utils::{encode, CountingSource};

const BACKGROUND: u64 = 0;

fn rank(state: LoadState) -> u8 {
    match state {
        LoadState::Closed => 0,
        LoadState::Opening => 1,
        LoadState::Open | LoadState::Failed => 2,
        LoadState::Missing => 3,
    }
}

// =============================================================================
// Single Writer
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_samples_open_each_tile_once() {
    let source = Arc::new(CountingSource::grid(2, 2, 16, 2).with_delay(Duration::from_millis(30)));
    let image = StitchedImage::new(Arc::clone(&source), StitchConfig::default(), BACKGROUND).unwrap();

    let threads = 16;
    let barrier = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads)
        .map(|i| {
            let view = image.final_view();
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || {
                barrier.wait();
                for round in 0..200 {
                    let x = ((i + round) % 32) as i64;
                    let y = ((i * 7 + round) % 32) as i64;
                    view.sample(0, [x, y]).unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let stats = image.wait_for_level(0).await;
    assert_eq!(stats.open, 4);
    for tile in 0..4 {
        assert_eq!(source.open_count(tile, 0), 1, "tile {} opened more than once", tile);
        assert_eq!(source.open_count(tile, 1), 0);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_waits_share_opens() {
    let source = Arc::new(CountingSource::grid(3, 3, 8, 1).with_delay(Duration::from_millis(20)));
    let image = StitchedImage::new(Arc::clone(&source), StitchConfig::default(), BACKGROUND).unwrap();

    let waits: Vec<_> = (0..8)
        .map(|_| {
            let image = image.clone();
            tokio::spawn(async move { image.wait_for_level(0).await })
        })
        .collect();

    for wait in waits {
        let stats = wait.await.unwrap();
        assert_eq!(stats.open, 9);
    }
    assert_eq!(source.total_opens(), 9);
}

// =============================================================================
// State Ordering
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_states_are_monotonic() {
    let source = Arc::new(
        CountingSource::grid(2, 1, 8, 1)
            .failing(1)
            .with_delay(Duration::from_millis(40)),
    );
    let image = StitchedImage::new(source, StitchConfig::default(), BACKGROUND).unwrap();

    let observers: Vec<_> = [TileKey::new(0, 0, 0), TileKey::new(0, 1, 0)]
        .into_iter()
        .map(|key| {
            let image = image.clone();
            std::thread::spawn(move || {
                let mut seen = vec![image.load_state(key)];
                loop {
                    let state = image.load_state(key);
                    if Some(&state) != seen.last() {
                        seen.push(state);
                    }
                    if state.is_terminal() {
                        return seen;
                    }
                    std::thread::yield_now();
                }
            })
        })
        .collect();

    image.wait_for_level(0).await;

    let expected_terminal = [LoadState::Open, LoadState::Failed];
    for (observer, terminal) in observers.into_iter().zip(expected_terminal) {
        let seen = observer.join().unwrap();
        assert!(
            seen.windows(2).all(|w| rank(w[0]) < rank(w[1])),
            "states went backwards: {:?}",
            seen
        );
        assert_eq!(seen.last(), Some(&terminal));
        assert!(seen.contains(&LoadState::Opening), "Opening skipped: {:?}", seen);
    }
}

// =============================================================================
// Failure Isolation
// =============================================================================

#[tokio::test]
async fn test_failing_and_panicking_tiles_are_isolated() {
    let source = Arc::new(CountingSource::grid(3, 3, 8, 1).failing(4).panicking(2));
    let image = StitchedImage::new(Arc::clone(&source), StitchConfig::default(), BACKGROUND).unwrap();

    let stats = image.wait_for_level(0).await;
    assert_eq!(stats.open, 7);
    assert_eq!(stats.failed, 2);

    assert_eq!(image.load_state(TileKey::new(0, 1, 1)), LoadState::Failed);
    assert_eq!(image.load_state(TileKey::new(0, 2, 0)), LoadState::Failed);

    let view = image.provisional_view();
    for tile in 0..9usize {
        let (gx, gy) = ((tile % 3) as i64, (tile / 3) as i64);
        let sample = view.sample(0, [gx * 8 + 3, gy * 8 + 5]).unwrap();
        assert!(!sample.is_provisional());
        if tile == 2 || tile == 4 {
            assert_eq!(sample.value(), BACKGROUND);
        } else {
            assert_eq!(sample.value(), encode(tile, 0, 3, 5));
        }
    }

    // Failed tiles are never retried
    image.final_view().sample(0, [9, 9]).unwrap();
    image.wait_for_level(0).await;
    assert_eq!(source.open_count(4, 0), 1);
    assert_eq!(source.open_count(2, 0), 1);
}

// =============================================================================
// Worker Pool
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_open_concurrency_is_bounded() {
    let source = Arc::new(CountingSource::grid(4, 4, 8, 1).with_delay(Duration::from_millis(15)));
    let config = StitchConfig::new().with_max_concurrent_opens(3);
    let image = StitchedImage::new(Arc::clone(&source), config, BACKGROUND).unwrap();

    let stats = image.wait_for_level(0).await;
    assert_eq!(stats.open, 16);
    assert!(source.peak_in_flight() <= 3, "peak {}", source.peak_in_flight());
    assert!(source.peak_in_flight() >= 1);
}

// =============================================================================
// Disposal
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_drop_abandons_queued_opens() {
    let source = Arc::new(CountingSource::grid(2, 2, 8, 1).with_delay(Duration::from_millis(50)));
    let config = StitchConfig::new().with_max_concurrent_opens(1);
    let image = StitchedImage::new(Arc::clone(&source), config, BACKGROUND).unwrap();

    let view = image.final_view();
    let union = view.pixel_interval(0).unwrap();
    view.render_region(0, &union).unwrap();
    drop(view);
    drop(image);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(source.total_opens() <= 1, "opens: {}", source.total_opens());
}

#[tokio::test]
async fn test_dispose_keeps_open_tiles_and_stops_loading() {
    let source = Arc::new(CountingSource::grid(2, 1, 8, 2));
    let image = StitchedImage::new(Arc::clone(&source), StitchConfig::default(), BACKGROUND).unwrap();
    image.wait_for_level(0).await;

    image.dispose();
    assert!(image.is_disposed());

    let view = image.provisional_view();
    assert_eq!(view.sample(0, [1, 1]).unwrap().value(), encode(0, 0, 1, 1));

    // Level 1 was never loaded: background, nothing scheduled
    let sample = view.sample(1, [1, 1]).unwrap();
    assert_eq!(sample.value(), BACKGROUND);
    assert!(sample.is_provisional());
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(image.load_state(TileKey::new(1, 0, 0)), LoadState::Closed);
    assert_eq!(source.open_count(0, 1), 0);

    // Waiting on a disposed cache returns instead of hanging
    let stats = image.wait_for_level(1).await;
    assert_eq!(stats.open, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_abandoned_opens_stay_provisional_after_dispose() {
    let source = Arc::new(CountingSource::grid(2, 1, 8, 1).with_delay(Duration::from_millis(50)));
    let config = StitchConfig::new().with_max_concurrent_opens(1);
    let image = StitchedImage::new(Arc::clone(&source), config, BACKGROUND).unwrap();

    let view = image.provisional_view();
    assert!(view.sample(0, [1, 1]).unwrap().is_provisional());
    assert!(view.sample(0, [9, 1]).unwrap().is_provisional());

    // One open in flight, one queued behind the single permit
    image.dispose();
    tokio::time::sleep(Duration::from_millis(120)).await;

    for (key, position) in [(TileKey::new(0, 0, 0), [1, 1]), (TileKey::new(0, 1, 0), [9, 1])] {
        assert_eq!(image.load_state(key), LoadState::Opening);
        let sample = view.sample(0, position).unwrap();
        assert_eq!(sample.value(), BACKGROUND);
        assert!(sample.is_provisional());
    }
    assert_eq!(image.wait_for_level(0).await.opening, 2);
}
