/// Meters per degree of latitude (and of longitude at the equator), the
/// rounded figure map clients use for quick scale estimates.
pub const METERS_PER_DEGREE: f64 = 111_320.0;

/// Width and height (in pixels) of a terrain tile.
pub const TILE_SIZE: usize = 256;

/// Elevation written for samples we know nothing about.
pub const NO_DATA: f32 = -9999.0;

/// Anything below this elevation is treated as "no data".
pub const NO_DATA_THRESHOLD: f32 = -9000.0;

/// How many extra tiles the parallel engine fetches on each side of the
/// visible area so that shadows can be cast from outside of it.
pub const BUFFER_TILES: u32 = 2;

/// Tile budget of the sequential engine.
pub const CPU_TILE_BUDGET: usize = 25;

/// Tile budget of the parallel engine (buffer tiles included).
pub const GPU_TILE_BUDGET: usize = 64;

/// Above this sun altitude (degrees) terrain shadows are negligible.
pub const MAX_SHADOW_ALTITUDE_DEG: f64 = 75.0;

/// Alpha of a fully shadowed pixel.
pub const SHADOW_ALPHA: u8 = 115;

/// Near-black with a slight blue cast.
pub const SHADOW_TINT: [u8; 3] = [18, 22, 38];
