//! The horizon ray march shared by both shadow engines.
//!
//! Starting at a pixel, the ray walks toward the sun in fixed steps. At
//! distance `d` the line of sight is at `base + d * tan(altitude)`; the pixel
//! is in shadow as soon as the terrain rises more than `tolerance_m` above it.

use crate::grid::{is_no_data, ElevationGrid};
use crate::sun::SunGeometry;
use crate::trig::smoothstep;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SampleMode {
    Nearest,
    Bilinear,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RayMarchPolicy {
    /// Step length in grid pixels.
    pub step_pixels: f64,
    pub max_distance_m: f64,
    /// Hard cap on the number of steps, on top of `max_distance_m`.
    pub max_steps: Option<u32>,
    pub tolerance_m: f64,
    pub sample_mode: SampleMode,
    /// Fraction of the output width/height over which the shadow fades in
    /// from each border; zero disables fading.
    pub edge_fade: f64,
}

impl RayMarchPolicy {
    /// The CPU engine's march over an unbuffered grid.
    pub const SEQUENTIAL: RayMarchPolicy = RayMarchPolicy {
        step_pixels: 2.0,
        max_distance_m: 5000.0,
        max_steps: None,
        tolerance_m: 5.0,
        sample_mode: SampleMode::Nearest,
        edge_fade: 0.0,
    };

    /// The GPU engine's march over a buffered grid.
    pub const PARALLEL: RayMarchPolicy = RayMarchPolicy {
        step_pixels: 1.5,
        max_distance_m: 8000.0,
        max_steps: Some(500),
        tolerance_m: 5.0,
        sample_mode: SampleMode::Bilinear,
        edge_fade: 0.05,
    };

    pub fn step_meters(&self, meters_per_pixel: f64) -> f64 {
        self.step_pixels * meters_per_pixel
    }

    /// How many steps a ray takes at most on a grid of this resolution.
    pub fn step_count(&self, meters_per_pixel: f64) -> u32 {
        let by_distance = (self.max_distance_m / self.step_meters(meters_per_pixel)
            + 1e-9)
            .floor()
            .clamp(0.0, u32::MAX as f64) as u32;
        match self.max_steps {
            Some(cap) => by_distance.min(cap),
            None => by_distance,
        }
    }

    /// Whether the terrain hides the sun from the sample at (`x`, `y`).
    /// The starting sample must hold data.
    pub fn is_shadowed(
        &self,
        grid: &ElevationGrid,
        x: usize,
        y: usize,
        sun: &SunGeometry,
    ) -> bool {
        let base = grid.elevation_at(x, y) as f64;
        let step_m = self.step_meters(grid.meters_per_pixel);
        let steps = self.step_count(grid.meters_per_pixel);

        for i in 1..=steps {
            // recomputed from the step index so positions do not drift
            let distance_px = self.step_pixels * i as f64;
            let fx = x as f64 + sun.dir_x * distance_px;
            let fy = y as f64 + sun.dir_y * distance_px;

            let sample = match self.sample_mode {
                SampleMode::Nearest => grid.sample_nearest(fx, fy),
                SampleMode::Bilinear => grid.sample_bilinear(fx, fy),
            };
            let Some(terrain) = sample else {
                return false;
            };
            if is_no_data(terrain) {
                continue;
            }

            let line_of_sight = base + step_m * i as f64 * sun.tan_altitude;
            if terrain as f64 > line_of_sight + self.tolerance_m {
                return true;
            }
        }

        false
    }

    /// Opacity factor for an output pixel at normalized position (`u`, `v`).
    pub fn fade_at(&self, u: f64, v: f64) -> f64 {
        edge_fade(u, v, self.edge_fade)
    }
}

/// Eases opacity in from 0 at the border to 1 at `fraction` of the way
/// inside, independently along both axes.
pub fn edge_fade(u: f64, v: f64, fraction: f64) -> f64 {
    if fraction <= 0.0 {
        return 1.0;
    }
    let along_u = smoothstep(0.0, fraction, u.min(1.0 - u));
    let along_v = smoothstep(0.0, fraction, v.min(1.0 - v));
    along_u * along_v
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::NO_DATA;
    use crate::geo::GeoBounds;
    use crate::sun::SunPosition;
    use crate::testing::{assert_eq_approx, flat_grid, grid_with_peak};

    #[test]
    fn step_counts() {
        assert_eq!(RayMarchPolicy::SEQUENTIAL.step_count(10.0), 250);
        assert_eq!(RayMarchPolicy::PARALLEL.step_count(10.0), 500);
        // at 20 m/px the parallel march runs out of distance before steps
        assert_eq!(RayMarchPolicy::PARALLEL.step_count(20.0), 266);
    }

    #[test]
    fn a_peak_in_the_sun_direction_casts_a_shadow() {
        // the peak is 2000 m east, 1000 m high; the ray is at ~353 m there
        let grid = grid_with_peak(300, 100, 0.0, 250, 50, 1000.0, 10.0);
        let sun = SunPosition::new(90.0, 10.0).geometry();

        assert!(RayMarchPolicy::SEQUENTIAL.is_shadowed(&grid, 50, 50, &sun));
        // sun in the west: the peak is behind us
        let west = SunPosition::new(270.0, 10.0).geometry();
        assert!(!RayMarchPolicy::SEQUENTIAL.is_shadowed(&grid, 50, 50, &west));
    }

    #[test]
    fn obstacles_beyond_max_distance_are_ignored() {
        // 6000 m away, out of reach of the sequential march only
        let grid = grid_with_peak(700, 20, 0.0, 650, 10, 3000.0, 10.0);
        let sun = SunPosition::new(90.0, 5.0).geometry();

        assert!(!RayMarchPolicy::SEQUENTIAL.is_shadowed(&grid, 50, 10, &sun));
    }

    #[test]
    fn no_data_along_the_ray_is_skipped() {
        let mut samples = vec![0.0f32; 100 * 10];
        samples[5 * 100 + 30] = NO_DATA;
        samples[5 * 100 + 40] = 500.0;
        let grid = ElevationGrid::from_samples(
            100,
            10,
            samples,
            GeoBounds::new(6.0, 45.0, 7.0, 46.0).unwrap(),
            10.0,
        );
        let sun = SunPosition::new(90.0, 20.0).geometry();

        assert!(RayMarchPolicy::SEQUENTIAL.is_shadowed(&grid, 20, 5, &sun));
    }

    #[test]
    fn rays_leaving_the_grid_are_lit() {
        let grid = flat_grid(10, 10, 100.0, 10.0);
        let sun = SunPosition::new(45.0, 1.0).geometry();
        assert!(!RayMarchPolicy::PARALLEL.is_shadowed(&grid, 5, 5, &sun));
    }

    #[test]
    fn edge_fade_profile() {
        assert_eq!(edge_fade(0.0, 0.5, 0.0), 1.0);
        assert_eq_approx(edge_fade(0.0, 0.5, 0.05), 0.0, 1e-12);
        assert_eq_approx(edge_fade(0.025, 0.5, 0.05), 0.5, 1e-12);
        assert_eq_approx(edge_fade(0.5, 0.5, 0.05), 1.0, 1e-12);
        assert_eq_approx(edge_fade(0.99, 0.5, 0.05), smoothstep(0.0, 0.05, 0.01), 1e-9);
        assert_eq_approx(
            edge_fade(0.025, 0.025, 0.05),
            0.25,
            1e-12,
        );
    }
}
