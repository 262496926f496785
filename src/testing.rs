//! Helpers shared by unit tests, integration tests and benchmarks.

use crate::consts::TILE_SIZE;
use crate::errors::UmbraError;
use crate::fetcher::TileSource;
use crate::geo::GeoBounds;
use crate::grid::ElevationGrid;
use crate::terrain_rgb::encode_tile_png;
use crate::tile_address::TileAddress;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub fn assert_eq_approx<T>(a: T, b: T, tolerance: T)
where
    T: PartialOrd + std::ops::Sub<Output = T> + Copy + std::fmt::Debug + Abs,
{
    if (a - b).abs() > tolerance {
        panic!(
            "assertion failed: `(left ~= right)`\n  left: `{:?}`,\n right: `{:?}`",
            a, b
        );
    }
}

pub trait Abs {
    fn abs(self) -> Self;
}

impl Abs for f32 {
    fn abs(self) -> Self {
        f32::abs(self)
    }
}

impl Abs for f64 {
    fn abs(self) -> Self {
        f64::abs(self)
    }
}

/// A grid whose every sample has the same elevation.
pub fn flat_grid(
    width: usize,
    height: usize,
    elevation: f32,
    meters_per_pixel: f64,
) -> ElevationGrid {
    ElevationGrid::from_samples(
        width,
        height,
        vec![elevation; width * height],
        synthetic_bounds(),
        meters_per_pixel,
    )
}

/// A flat plain at `base` with a single sample raised to `peak`.
pub fn grid_with_peak(
    width: usize,
    height: usize,
    base: f32,
    peak_x: usize,
    peak_y: usize,
    peak: f32,
    meters_per_pixel: f64,
) -> ElevationGrid {
    let mut samples = vec![base; width * height];
    samples[peak_y * width + peak_x] = peak;
    ElevationGrid::from_samples(
        width,
        height,
        samples,
        synthetic_bounds(),
        meters_per_pixel,
    )
}

fn synthetic_bounds() -> GeoBounds {
    GeoBounds {
        west: 6.0,
        south: 45.0,
        east: 7.0,
        north: 46.0,
    }
}

type ElevationFn = dyn Fn(TileAddress, usize, usize) -> f32 + Send + Sync;

/// In-memory [`TileSource`] producing terrain-RGB PNG tiles from a function
/// of (tile, column, row). Counts every fetch it serves.
pub struct MemoryTileSource {
    elevation: Arc<ElevationFn>,
    failing: HashSet<TileAddress>,
    raw: HashMap<TileAddress, Vec<u8>>,
    delay: Option<Duration>,
    fetches: AtomicUsize,
}

impl MemoryTileSource {
    pub fn from_fn<F>(elevation: F) -> Self
    where
        F: Fn(TileAddress, usize, usize) -> f32 + Send + Sync + 'static,
    {
        MemoryTileSource {
            elevation: Arc::new(elevation),
            failing: HashSet::new(),
            raw: HashMap::new(),
            delay: None,
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn flat(elevation: f32) -> Self {
        Self::from_fn(move |_, _, _| elevation)
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn failing_on(mut self, address: TileAddress) -> Self {
        self.failing.insert(address);
        self
    }

    /// Serve these bytes verbatim for the given tile.
    pub fn with_raw(mut self, address: TileAddress, bytes: Vec<u8>) -> Self {
        self.raw.insert(address, bytes);
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl TileSource for MemoryTileSource {
    async fn fetch(&self, address: TileAddress) -> Result<Vec<u8>, UmbraError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing.contains(&address) {
            return Err(UmbraError::Http(format!("{} answered 404", address)));
        }

        if let Some(bytes) = self.raw.get(&address) {
            return Ok(bytes.clone());
        }

        let mut samples = Vec::with_capacity(TILE_SIZE * TILE_SIZE);
        for row in 0..TILE_SIZE {
            for col in 0..TILE_SIZE {
                samples.push((self.elevation)(address, col, row));
            }
        }
        encode_tile_png(&samples, TILE_SIZE as u32)
    }
}
