//! The entry point: from a region and a sun position to a shadow overlay.

use crate::consts::{BUFFER_TILES, CPU_TILE_BUDGET, GPU_TILE_BUDGET};
use crate::cpu::CpuShadowEngine;
use crate::errors::UmbraError;
use crate::fetcher::{TileFetcher, TileSource};
use crate::geo::GeoBounds;
use crate::gpu::GpuShadowEngine;
use crate::grid::{assemble_grid, plan_grid, GridPlan};
use crate::mask::ShadowMask;
use crate::quality::QualityTier;
use crate::raymarch::RayMarchPolicy;
use crate::shadow_cache::{ShadowCache, ShadowCacheKey};
use crate::sun::{SunCondition, SunPosition};
use parking_lot::Mutex;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// The engine that actually produced a result.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EngineKind {
    Cpu,
    Gpu,
}

impl EngineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::Cpu => "cpu",
            EngineKind::Gpu => "gpu",
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which engine the service should use.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum EnginePreference {
    Cpu,
    Gpu,
    /// The GPU when one is available, the CPU otherwise.
    #[default]
    Auto,
}

impl FromStr for EnginePreference {
    type Err = UmbraError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cpu" => Ok(EnginePreference::Cpu),
            "gpu" => Ok(EnginePreference::Gpu),
            "auto" => Ok(EnginePreference::Auto),
            other => Err(UmbraError::Config(format!(
                "unknown engine '{other}', expected cpu, gpu or auto"
            ))),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ServiceOptions {
    pub engine: EnginePreference,
    /// With [`EnginePreference::Gpu`]: run the GPU's march on the CPU when
    /// the GPU cannot be initialized, instead of giving up.
    pub gpu_fallback: bool,
    pub tile_cache_capacity: usize,
    pub result_cache_capacity: usize,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        ServiceOptions {
            engine: EnginePreference::Auto,
            gpu_fallback: true,
            tile_cache_capacity: 256,
            result_cache_capacity: 20,
        }
    }
}

#[derive(Debug)]
pub struct ShadowComputeResult {
    /// RGBA PNG of the visible area.
    pub image: Vec<u8>,
    /// Where the image goes on the map; always contains the requested bounds.
    pub bounds: GeoBounds,
    pub compute_time: Duration,
    pub tile_count: usize,
    pub width: usize,
    pub height: usize,
    pub quality: QualityTier,
    pub engine: EngineKind,
}

enum GpuState {
    Untried,
    Ready(GpuShadowEngine),
    Unavailable,
}

/// How one request gets rendered.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Route {
    Sequential,
    /// The GPU's buffered march, run on the CPU.
    CpuFallback,
    Gpu,
}

impl Route {
    fn engine_kind(&self) -> EngineKind {
        match self {
            Route::Sequential | Route::CpuFallback => EngineKind::Cpu,
            Route::Gpu => EngineKind::Gpu,
        }
    }

    fn buffer_tiles(&self) -> u32 {
        match self {
            Route::Sequential => 0,
            Route::CpuFallback | Route::Gpu => BUFFER_TILES,
        }
    }

    fn tile_budget(&self) -> usize {
        match self {
            Route::Sequential => CPU_TILE_BUDGET,
            Route::CpuFallback | Route::Gpu => GPU_TILE_BUDGET,
        }
    }
}

pub struct ShadowService<S: TileSource> {
    fetcher: TileFetcher<S>,
    results: Mutex<ShadowCache<ShadowComputeResult>>,
    gpu: tokio::sync::Mutex<GpuState>,
    options: ServiceOptions,
}

impl<S: TileSource> ShadowService<S> {
    pub fn new(source: S, options: ServiceOptions) -> Self {
        ShadowService {
            fetcher: TileFetcher::new(source, options.tile_cache_capacity),
            results: Mutex::new(ShadowCache::new(options.result_cache_capacity)),
            gpu: tokio::sync::Mutex::new(GpuState::Untried),
            options,
        }
    }

    pub fn options(&self) -> &ServiceOptions {
        &self.options
    }

    pub fn fetcher(&self) -> &TileFetcher<S> {
        &self.fetcher
    }

    pub fn cached_results(&self) -> usize {
        self.results.lock().len()
    }

    /// Never use the GPU from now on.
    pub async fn disable_gpu(&self) {
        *self.gpu.lock().await = GpuState::Unavailable;
    }

    /// Computes (or reuses) the shadow overlay for `bounds`.
    ///
    /// Returns `None` when there is nothing to draw or it cannot be drawn:
    /// the sun is down or nearly overhead, the region is too large even at
    /// the lowest quality, the computation was cancelled, or something went
    /// wrong internally (logged).
    pub async fn compute(
        &self,
        bounds: GeoBounds,
        sun: SunPosition,
        quality: QualityTier,
        progress: Option<&dyn Fn(f32)>,
        cancel: Option<&CancellationToken>,
    ) -> Option<Arc<ShadowComputeResult>> {
        match sun.condition() {
            SunCondition::Night => {
                debug!(altitude = sun.altitude_degrees, "sun below the horizon, no overlay");
                return None;
            }
            SunCondition::Overhead => {
                debug!(altitude = sun.altitude_degrees, "sun nearly overhead, no overlay");
                return None;
            }
            SunCondition::Undefined => {
                warn!(
                    azimuth = sun.azimuth_degrees,
                    altitude = sun.altitude_degrees,
                    "non-finite sun position, no overlay"
                );
                return None;
            }
            SunCondition::Casting => {}
        }

        let key = ShadowCacheKey::new(&bounds, &sun, quality);
        if let Some(hit) = self.results.lock().get(&key) {
            debug!(bounds = %bounds, quality = %quality, "shadow overlay cache hit");
            return Some(hit);
        }

        let started = Instant::now();
        let route = self.route().await?;
        let tile_budget = route.tile_budget();

        let Some(plan) = plan_grid(&bounds, quality, route.buffer_tiles(), tile_budget) else {
            debug!(bounds = %bounds, budget = tile_budget, "region too large at every quality");
            return None;
        };

        let grid = assemble_grid(&self.fetcher, &plan).await;
        if let Some(report) = progress {
            report(0.5);
        }
        if cancel.is_some_and(|token| token.is_cancelled()) {
            debug!(bounds = %bounds, "shadow computation cancelled");
            return None;
        }

        let mask = match route {
            Route::Sequential => CpuShadowEngine::new(RayMarchPolicy::SEQUENTIAL)
                .render(&grid, &sun, progress, cancel)?,
            Route::CpuFallback => CpuShadowEngine::new(RayMarchPolicy::PARALLEL)
                .render(&grid, &sun, progress, cancel)?,
            Route::Gpu => {
                let rendered = match &mut *self.gpu.lock().await {
                    GpuState::Ready(engine) => engine.render(&grid, &sun),
                    _ => Err(UmbraError::Gpu("GPU engine went away".to_string())),
                };
                match rendered {
                    Ok(mask) => {
                        if let Some(report) = progress {
                            report(1.0);
                        }
                        mask
                    }
                    Err(e) => {
                        error!(error = %e, "GPU shadow rendering failed");
                        return None;
                    }
                }
            }
        };

        let result = match self.package(mask, &plan, route.engine_kind(), started) {
            Ok(result) => Arc::new(result),
            Err(e) => {
                error!(error = %e, "failed to encode shadow overlay");
                return None;
            }
        };

        info!(
            bounds = %result.bounds,
            quality = %result.quality,
            engine = %result.engine,
            tiles = result.tile_count,
            width = result.width,
            height = result.height,
            elapsed_ms = result.compute_time.as_millis() as u64,
            "shadow overlay computed"
        );

        self.results.lock().insert(key, result.clone());
        Some(result)
    }

    fn package(
        &self,
        mask: ShadowMask,
        plan: &GridPlan,
        engine: EngineKind,
        started: Instant,
    ) -> Result<ShadowComputeResult, UmbraError> {
        let image = mask.encode_png()?;
        Ok(ShadowComputeResult {
            image,
            bounds: plan.visible_bounds(),
            compute_time: started.elapsed(),
            tile_count: plan.tile_count(),
            width: mask.width,
            height: mask.height,
            quality: plan.quality,
            engine,
        })
    }

    async fn route(&self) -> Option<Route> {
        match self.options.engine {
            EnginePreference::Cpu => Some(Route::Sequential),
            EnginePreference::Auto => {
                if self.gpu_ready().await {
                    Some(Route::Gpu)
                } else {
                    Some(Route::Sequential)
                }
            }
            EnginePreference::Gpu => {
                if self.gpu_ready().await {
                    Some(Route::Gpu)
                } else if self.options.gpu_fallback {
                    Some(Route::CpuFallback)
                } else {
                    warn!("GPU engine requested but unavailable");
                    None
                }
            }
        }
    }

    /// Initializes the GPU engine on first use. A failed initialization is
    /// final for this service.
    async fn gpu_ready(&self) -> bool {
        let mut state = self.gpu.lock().await;
        if let GpuState::Untried = *state {
            *state = match GpuShadowEngine::new(RayMarchPolicy::PARALLEL).await {
                Ok(engine) => GpuState::Ready(engine),
                Err(e) => {
                    warn!(error = %e, "GPU shadow engine unavailable");
                    GpuState::Unavailable
                }
            };
        }
        matches!(*state, GpuState::Ready(_))
    }
}
