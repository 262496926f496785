//! Stitching terrain tiles into one contiguous elevation grid.

use crate::consts::{NO_DATA, NO_DATA_THRESHOLD, TILE_SIZE};
use crate::fetcher::{TileFetcher, TileSource};
use crate::geo::GeoBounds;
use crate::quality::QualityTier;
use crate::tile_address::{to_bounds, to_tile, TileAddress};
use futures_util::future::join_all;
use rayon::prelude::*;
use tracing::debug;

pub fn is_no_data(elevation: f32) -> bool {
    elevation < NO_DATA_THRESHOLD
}

/// The part of a grid that ends up in the output image. Everything outside
/// of it is buffer, only there for rays to travel through.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct VisibleWindow {
    pub x0: usize,
    pub y0: usize,
    pub width: usize,
    pub height: usize,
    pub bounds: GeoBounds,
}

#[derive(Debug)]
pub struct ElevationGrid {
    pub width: usize,
    pub height: usize,
    pub meters_per_pixel: f64,
    pub bounds: GeoBounds,
    pub visible: VisibleWindow,
    samples: Box<[f32]>,
}

impl ElevationGrid {
    /// Builds a grid whose visible window is the whole grid.
    pub fn from_samples(
        width: usize,
        height: usize,
        samples: Vec<f32>,
        bounds: GeoBounds,
        meters_per_pixel: f64,
    ) -> ElevationGrid {
        assert_eq!(
            samples.len(),
            width * height,
            "sample count does not match grid dimensions"
        );

        ElevationGrid {
            width,
            height,
            meters_per_pixel,
            bounds,
            visible: VisibleWindow {
                x0: 0,
                y0: 0,
                width,
                height,
                bounds,
            },
            samples: samples.into_boxed_slice(),
        }
    }

    pub fn with_visible_window(mut self, visible: VisibleWindow) -> ElevationGrid {
        assert!(
            visible.x0 + visible.width <= self.width
                && visible.y0 + visible.height <= self.height,
            "visible window does not fit in the grid"
        );
        self.visible = visible;
        self
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn elevation_at(&self, x: usize, y: usize) -> f32 {
        self.samples[y * self.width + x]
    }

    fn contains_point(&self, fx: f64, fy: f64) -> bool {
        fx >= -0.5
            && fy >= -0.5
            && fx < self.width as f64 - 0.5
            && fy < self.height as f64 - 0.5
    }

    /// Sample centers sit on integer coordinates. Returns `None` once the
    /// point leaves the grid.
    pub fn sample_nearest(&self, fx: f64, fy: f64) -> Option<f32> {
        if !self.contains_point(fx, fy) {
            return None;
        }
        let x = (fx.round().max(0.0) as usize).min(self.width - 1);
        let y = (fy.round().max(0.0) as usize).min(self.height - 1);
        Some(self.elevation_at(x, y))
    }

    /// Bilinear interpolation between the four surrounding samples, clamped
    /// at the grid edge. Any no-data corner makes the result [`NO_DATA`].
    pub fn sample_bilinear(&self, fx: f64, fy: f64) -> Option<f32> {
        if !self.contains_point(fx, fy) {
            return None;
        }

        let max_x = (self.width - 1) as f64;
        let max_y = (self.height - 1) as f64;
        let fx = fx.clamp(0.0, max_x);
        let fy = fy.clamp(0.0, max_y);

        let x0 = fx.floor() as usize;
        let y0 = fy.floor() as usize;
        let x1 = (x0 + 1).min(self.width - 1);
        let y1 = (y0 + 1).min(self.height - 1);
        let tx = (fx - x0 as f64) as f32;
        let ty = (fy - y0 as f64) as f32;

        let corners = [
            self.elevation_at(x0, y0),
            self.elevation_at(x1, y0),
            self.elevation_at(x0, y1),
            self.elevation_at(x1, y1),
        ];
        if corners.iter().any(|&c| is_no_data(c)) {
            return Some(NO_DATA);
        }

        let top = corners[0] + (corners[1] - corners[0]) * tx;
        let bottom = corners[2] + (corners[3] - corners[2]) * tx;
        Some(top + (bottom - top) * ty)
    }
}

/// The tile range chosen for a request, before anything is fetched.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct GridPlan {
    pub quality: QualityTier,
    pub zoom: u8,
    /// Top-left tile of the whole (buffered) range.
    pub x_min: u32,
    pub y_min: u32,
    pub tiles_x: u32,
    pub tiles_y: u32,
    /// Top-left tile of the visible range.
    pub visible_x_min: u32,
    pub visible_y_min: u32,
    pub visible_tiles_x: u32,
    pub visible_tiles_y: u32,
}

impl GridPlan {
    pub fn tile_count(&self) -> usize {
        self.tiles_x as usize * self.tiles_y as usize
    }

    pub fn pixel_width(&self) -> usize {
        self.tiles_x as usize * TILE_SIZE
    }

    pub fn pixel_height(&self) -> usize {
        self.tiles_y as usize * TILE_SIZE
    }

    /// Every tile of the range, row by row.
    pub fn addresses(&self) -> Vec<TileAddress> {
        let mut addresses = Vec::with_capacity(self.tile_count());
        for y in self.y_min..self.y_min + self.tiles_y {
            for x in self.x_min..self.x_min + self.tiles_x {
                addresses.push(TileAddress::new(x, y, self.zoom));
            }
        }
        addresses
    }

    pub fn grid_bounds(&self) -> GeoBounds {
        span_bounds(
            self.x_min,
            self.y_min,
            self.x_min + self.tiles_x - 1,
            self.y_min + self.tiles_y - 1,
            self.zoom,
        )
    }

    pub fn visible_bounds(&self) -> GeoBounds {
        span_bounds(
            self.visible_x_min,
            self.visible_y_min,
            self.visible_x_min + self.visible_tiles_x - 1,
            self.visible_y_min + self.visible_tiles_y - 1,
            self.zoom,
        )
    }

    pub fn visible_window(&self) -> VisibleWindow {
        VisibleWindow {
            x0: (self.visible_x_min - self.x_min) as usize * TILE_SIZE,
            y0: (self.visible_y_min - self.y_min) as usize * TILE_SIZE,
            width: self.visible_tiles_x as usize * TILE_SIZE,
            height: self.visible_tiles_y as usize * TILE_SIZE,
            bounds: self.visible_bounds(),
        }
    }
}

fn span_bounds(x0: u32, y0: u32, x1: u32, y1: u32, zoom: u8) -> GeoBounds {
    let top_left = to_bounds(x0, y0, zoom);
    let bottom_right = to_bounds(x1, y1, zoom);
    GeoBounds {
        west: top_left.west,
        south: bottom_right.south,
        east: bottom_right.east,
        north: top_left.north,
    }
}

/// Picks the tile range covering `bounds` (plus `buffer_tiles` on every side,
/// clamped to the world). When the range holds more than `tile_budget` tiles
/// the next-lower quality tier is tried; `None` once even the lowest tier is
/// too expensive.
pub fn plan_grid(
    bounds: &GeoBounds,
    quality: QualityTier,
    buffer_tiles: u32,
    tile_budget: usize,
) -> Option<GridPlan> {
    let zoom = quality.zoom();
    let last = TileAddress::tiles_per_axis(zoom) - 1;

    let north_west = to_tile(bounds.west, bounds.north, zoom);
    let south_east = to_tile(bounds.east, bounds.south, zoom);
    let top_left = TileAddress::new(
        north_west.x.min(south_east.x),
        north_west.y.min(south_east.y),
        zoom,
    );
    let bottom_right = TileAddress::new(
        north_west.x.max(south_east.x),
        north_west.y.max(south_east.y),
        zoom,
    );

    let x_min = top_left.x.saturating_sub(buffer_tiles);
    let y_min = top_left.y.saturating_sub(buffer_tiles);
    let x_max = (bottom_right.x + buffer_tiles).min(last);
    let y_max = (bottom_right.y + buffer_tiles).min(last);

    let plan = GridPlan {
        quality,
        zoom,
        x_min,
        y_min,
        tiles_x: x_max - x_min + 1,
        tiles_y: y_max - y_min + 1,
        visible_x_min: top_left.x,
        visible_y_min: top_left.y,
        visible_tiles_x: bottom_right.x - top_left.x + 1,
        visible_tiles_y: bottom_right.y - top_left.y + 1,
    };

    if plan.tile_count() <= tile_budget {
        return Some(plan);
    }

    debug!(
        quality = %quality,
        tiles = plan.tile_count(),
        budget = tile_budget,
        "tile budget exceeded"
    );
    quality
        .lower()
        .and_then(|lower| plan_grid(bounds, lower, buffer_tiles, tile_budget))
}

/// Fetches every tile of the plan concurrently and stitches them together.
pub async fn assemble_grid<S: TileSource>(
    fetcher: &TileFetcher<S>,
    plan: &GridPlan,
) -> ElevationGrid {
    let tiles = join_all(plan.addresses().into_iter().map(|a| fetcher.tile(a))).await;

    let width = plan.pixel_width();
    let height = plan.pixel_height();
    let tiles_x = plan.tiles_x as usize;

    let mut samples = vec![NO_DATA; width * height];
    samples
        .par_chunks_mut(width)
        .enumerate()
        .for_each(|(y, row)| {
            let tile_row = y / TILE_SIZE;
            let y_in_tile = y % TILE_SIZE;
            for (tile_col, out) in row.chunks_exact_mut(TILE_SIZE).enumerate() {
                let tile = &tiles[tile_row * tiles_x + tile_col];
                out.copy_from_slice(tile.row(y_in_tile));
            }
        });

    let bounds = plan.grid_bounds();
    let meters_per_pixel = bounds.meters_per_pixel(width, height);

    debug!(
        zoom = plan.zoom,
        tiles = plan.tile_count(),
        width,
        height,
        meters_per_pixel,
        "elevation grid assembled"
    );

    ElevationGrid::from_samples(width, height, samples, bounds, meters_per_pixel)
        .with_visible_window(plan.visible_window())
}
