use clap::{Parser, Subcommand};
use serde_json::json;
use std::error::Error;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;
use umbra::config::Settings;
use umbra::tile_address::to_tile;
use umbra::{EnginePreference, GeoBounds, QualityTier, ShadowService, SunPosition};

#[derive(Parser)]
#[command(name = "umbra")]
#[command(about = "Terrain shadow overlays from terrain-RGB elevation tiles", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compute the shadow overlay of a region and write it as a PNG
    Shadow {
        /// Region as west,south,east,north in degrees
        #[arg(long, value_parser = parse_bbox, allow_hyphen_values = true)]
        bbox: GeoBounds,

        /// Sun azimuth, degrees clockwise from north
        #[arg(long)]
        azimuth: f64,

        /// Sun altitude above the horizon, degrees
        #[arg(long, allow_negative_numbers = true)]
        altitude: f64,

        #[arg(long, default_value = "medium")]
        quality: QualityTier,

        /// cpu, gpu or auto (default: UMBRA_ENGINE or auto)
        #[arg(long)]
        engine: Option<EnginePreference>,

        /// Output PNG path
        #[arg(long)]
        out: PathBuf,
    },

    /// Print the tile containing a point
    Tile {
        #[arg(long, allow_negative_numbers = true)]
        lng: f64,

        #[arg(long, allow_negative_numbers = true)]
        lat: f64,

        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=24))]
        zoom: u8,
    },
}

fn parse_bbox(text: &str) -> Result<GeoBounds, String> {
    let values = text
        .split(',')
        .map(|v| v.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("invalid bbox '{text}': {e}"))?;

    match *values.as_slice() {
        [west, south, east, north] => {
            GeoBounds::new(west, south, east, north).map_err(|e| e.to_string())
        }
        _ => Err(format!("bbox needs 4 values, got {}", values.len())),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    match Args::parse().command {
        Command::Shadow {
            bbox,
            azimuth,
            altitude,
            quality,
            engine,
            out,
        } => {
            let mut settings = Settings::from_env()?;
            if let Some(engine) = engine {
                settings.engine = engine;
            }

            let service = ShadowService::new(settings.tile_source()?, settings.service_options());
            let sun = SunPosition::new(azimuth, altitude);

            let Some(result) = service.compute(bbox, sun, quality, None, None).await else {
                println!("{}", json!({ "overlay": null }));
                return Ok(());
            };

            std::fs::write(&out, &result.image)?;
            info!(path = %out.display(), "overlay written");

            let b = result.bounds;
            let metadata = json!({
                "overlay": out.display().to_string(),
                "bounds": [b.west, b.south, b.east, b.north],
                "width": result.width,
                "height": result.height,
                "quality": result.quality.as_str(),
                "engine": result.engine.as_str(),
                "tile_count": result.tile_count,
                "compute_time_ms": result.compute_time.as_millis() as u64,
                "fetcher": {
                    "network_requests": service.fetcher().stats().network_requests,
                    "cache_hits": service.fetcher().stats().cache_hits,
                    "coalesced": service.fetcher().stats().coalesced,
                },
            });
            println!("{}", serde_json::to_string_pretty(&metadata)?);
        }
        Command::Tile { lng, lat, zoom } => {
            let tile = to_tile(lng, lat, zoom);
            let b = tile.bounds();
            let metadata = json!({
                "tile": tile.to_string(),
                "x": tile.x,
                "y": tile.y,
                "zoom": tile.zoom,
                "bounds": [b.west, b.south, b.east, b.north],
            });
            println!("{}", serde_json::to_string_pretty(&metadata)?);
        }
    }

    Ok(())
}
