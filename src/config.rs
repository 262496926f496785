//! Runtime settings read from the environment (and a `.env` file, if any).

use crate::errors::UmbraError;
use crate::fetcher::HttpTileSource;
use crate::service::{EnginePreference, ServiceOptions};
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_TILE_URL: &str =
    "https://api.maptiler.com/tiles/terrain-rgb-v2/{z}/{x}/{y}.webp?key={key}";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub tile_url: String,
    pub tile_key: Option<String>,
    pub tile_cache_capacity: usize,
    pub result_cache_capacity: usize,
    pub engine: EnginePreference,
    pub gpu_fallback: bool,
    pub http_timeout: Option<Duration>,
}

impl Default for Settings {
    fn default() -> Self {
        let options = ServiceOptions::default();
        Settings {
            tile_url: DEFAULT_TILE_URL.to_string(),
            tile_key: None,
            tile_cache_capacity: options.tile_cache_capacity,
            result_cache_capacity: options.result_cache_capacity,
            engine: options.engine,
            gpu_fallback: options.gpu_fallback,
            http_timeout: None,
        }
    }
}

impl Settings {
    /// Loads `.env` from the working directory when present, then reads the
    /// `UMBRA_*` variables.
    pub fn from_env() -> Result<Settings, UmbraError> {
        dotenv::dotenv().ok();
        Settings::from_lookup(|key| env::var(key).ok())
    }

    /// Builds settings from any variable lookup; unset variables keep their
    /// defaults, malformed ones are an error.
    pub fn from_lookup<F>(lookup: F) -> Result<Settings, UmbraError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Settings::default();
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(Settings {
            tile_url: lookup("UMBRA_TILE_URL").unwrap_or(defaults.tile_url),
            tile_key: lookup("UMBRA_TILE_KEY").or(defaults.tile_key),
            tile_cache_capacity: parse_var(
                "UMBRA_TILE_CACHE_CAPACITY",
                lookup("UMBRA_TILE_CACHE_CAPACITY"),
            )?
            .unwrap_or(defaults.tile_cache_capacity),
            result_cache_capacity: parse_var(
                "UMBRA_RESULT_CACHE_CAPACITY",
                lookup("UMBRA_RESULT_CACHE_CAPACITY"),
            )?
            .unwrap_or(defaults.result_cache_capacity),
            engine: parse_var("UMBRA_ENGINE", lookup("UMBRA_ENGINE"))?
                .unwrap_or(defaults.engine),
            gpu_fallback: parse_var("UMBRA_GPU_FALLBACK", lookup("UMBRA_GPU_FALLBACK"))?
                .unwrap_or(defaults.gpu_fallback),
            http_timeout: parse_var::<u64>(
                "UMBRA_HTTP_TIMEOUT_SECS",
                lookup("UMBRA_HTTP_TIMEOUT_SECS"),
            )?
            .map(Duration::from_secs),
        })
    }

    pub fn service_options(&self) -> ServiceOptions {
        ServiceOptions {
            engine: self.engine,
            gpu_fallback: self.gpu_fallback,
            tile_cache_capacity: self.tile_cache_capacity,
            result_cache_capacity: self.result_cache_capacity,
        }
    }

    pub fn tile_source(&self) -> Result<HttpTileSource, UmbraError> {
        if self.tile_url.contains("{key}") && self.tile_key.is_none() {
            return Err(UmbraError::Config(
                "the tile URL needs an API key, set UMBRA_TILE_KEY".to_string(),
            ));
        }
        HttpTileSource::new(&self.tile_url, self.tile_key.clone(), self.http_timeout)
    }
}

fn parse_var<T>(key: &str, value: Option<String>) -> Result<Option<T>, UmbraError>
where
    T: FromStr,
{
    value
        .map(|v| {
            v.trim()
                .parse::<T>()
                .map_err(|_| UmbraError::Config(format!("{key}: cannot parse '{v}'")))
        })
        .transpose()
}
