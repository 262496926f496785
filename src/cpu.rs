//! Ray-march shadow engine running on the CPU, one scanline at a time.

use crate::grid::{is_no_data, ElevationGrid};
use crate::mask::{shadow_alpha, ShadowMask};
use crate::raymarch::RayMarchPolicy;
use crate::sun::SunPosition;
use rayon::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Clone, Copy)]
pub struct CpuShadowEngine {
    policy: RayMarchPolicy,
}

impl Default for CpuShadowEngine {
    fn default() -> Self {
        CpuShadowEngine::new(RayMarchPolicy::SEQUENTIAL)
    }
}

impl CpuShadowEngine {
    pub fn new(policy: RayMarchPolicy) -> Self {
        CpuShadowEngine { policy }
    }

    pub fn policy(&self) -> &RayMarchPolicy {
        &self.policy
    }

    /// Computes the shadow mask of the grid's visible window.
    ///
    /// `progress` receives `0.5 + 0.5 * (row + 1) / rows` after every
    /// scanline. `cancel` is checked before every scanline; a cancelled
    /// render returns `None`.
    pub fn render(
        &self,
        grid: &ElevationGrid,
        sun: &SunPosition,
        progress: Option<&dyn Fn(f32)>,
        cancel: Option<&CancellationToken>,
    ) -> Option<ShadowMask> {
        let geometry = sun.geometry();
        let window = grid.visible;
        let mut mask = ShadowMask::new(window.width, window.height);

        for row in 0..window.height {
            if cancel.is_some_and(|token| token.is_cancelled()) {
                debug!(row, rows = window.height, "shadow march cancelled");
                return None;
            }

            let y = window.y0 + row;
            let v = (row as f64 + 0.5) / window.height as f64;
            mask.row_mut(row)
                .par_iter_mut()
                .enumerate()
                .for_each(|(col, alpha)| {
                    let x = window.x0 + col;
                    if is_no_data(grid.elevation_at(x, y)) {
                        return;
                    }
                    if self.policy.is_shadowed(grid, x, y, &geometry) {
                        let u = (col as f64 + 0.5) / window.width as f64;
                        *alpha = shadow_alpha(self.policy.fade_at(u, v));
                    }
                });

            if let Some(report) = progress {
                report(0.5 + 0.5 * (row + 1) as f32 / window.height as f32);
            }
        }

        Some(mask)
    }
}
