//! Terrain shadow overlays for web-mercator maps: terrain-RGB elevation tiles
//! go in, a tinted PNG of the shadows cast by the sun comes out.

pub mod bounded_cache;
pub mod config;
pub mod consts;
pub mod cpu;
pub mod errors;
pub mod fetcher;
pub mod geo;
pub mod gpu;
pub mod grid;
pub mod mask;
pub mod quality;
pub mod raymarch;
pub mod service;
pub mod shadow_cache;
pub mod sun;
pub mod terrain_rgb;
pub mod testing;
pub mod tile_address;
pub mod trig;

pub use errors::UmbraError;
pub use geo::GeoBounds;
pub use quality::QualityTier;
pub use service::{EngineKind, EnginePreference, ServiceOptions, ShadowComputeResult, ShadowService};
pub use sun::SunPosition;
