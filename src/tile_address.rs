//! Web-mercator slippy tile addressing.

use crate::geo::GeoBounds;
use crate::trig::{deg_to_rad, rad_to_deg};
use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

/// Latitude of the north edge of the mercator square.
pub const MAX_MERCATOR_LAT: f64 = 85.051_128_779_806_59;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileAddress {
    pub x: u32,
    pub y: u32,
    pub zoom: u8,
}

impl TileAddress {
    pub fn new(x: u32, y: u32, zoom: u8) -> Self {
        TileAddress { x, y, zoom }
    }

    /// Number of tiles along each axis at the given zoom level.
    pub fn tiles_per_axis(zoom: u8) -> u32 {
        1u32 << zoom
    }

    pub fn bounds(&self) -> GeoBounds {
        to_bounds(self.x, self.y, self.zoom)
    }
}

/// Returns the tile containing the point. Points outside of the mercator
/// square (east edge, beyond ~85.05° of latitude) are clamped to the
/// nearest valid tile.
pub fn to_tile(lng: f64, lat: f64, zoom: u8) -> TileAddress {
    let n = TileAddress::tiles_per_axis(zoom) as f64;
    let lat_rad = deg_to_rad(lat.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT));

    let x = ((lng + 180.0) / 360.0 * n).floor();
    let y = ((1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / PI) / 2.0
        * n)
        .floor();

    let max = n - 1.0;
    TileAddress {
        x: clamp_axis(x, max),
        y: clamp_axis(y, max),
        zoom,
    }
}

fn clamp_axis(value: f64, max: f64) -> u32 {
    if value.is_nan() {
        0
    } else {
        value.clamp(0.0, max) as u32
    }
}

/// Geographic extent of a tile.
pub fn to_bounds(x: u32, y: u32, zoom: u8) -> GeoBounds {
    let n = TileAddress::tiles_per_axis(zoom) as f64;

    let west = x as f64 / n * 360.0 - 180.0;
    let east = (x + 1) as f64 / n * 360.0 - 180.0;
    let north = tile_y_to_lat(y as f64, n);
    let south = tile_y_to_lat((y + 1) as f64, n);

    GeoBounds {
        west,
        south,
        east,
        north,
    }
}

fn tile_y_to_lat(y: f64, n: f64) -> f64 {
    rad_to_deg((PI * (1.0 - 2.0 * y / n)).sinh().atan())
}

impl fmt::Display for TileAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.x, self.y)
    }
}

impl FromStr for TileAddress {
    type Err = String;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = text.split('/').collect();
        if parts.len() != 3 {
            return Err(format!("Invalid tile address: {}", text));
        }

        let zoom = parts[0]
            .parse::<u8>()
            .map_err(|e| format!("Failed to parse zoom: {}", e))?;
        if zoom > 30 {
            return Err(format!("Zoom level out of range: {}", zoom));
        }
        let x = parts[1]
            .parse::<u32>()
            .map_err(|e| format!("Failed to parse x: {}", e))?;
        let y = parts[2]
            .parse::<u32>()
            .map_err(|e| format!("Failed to parse y: {}", e))?;

        let n = TileAddress::tiles_per_axis(zoom);
        if x >= n || y >= n {
            return Err(format!("Tile {} is outside of zoom {}", text, zoom));
        }

        Ok(TileAddress { x, y, zoom })
    }
}

#[cfg(test)]
mod tests {
    use super::{to_bounds, to_tile, TileAddress};
    use crate::testing::assert_eq_approx;
    use proptest::prelude::*;

    #[test]
    fn known_tiles() {
        assert_eq!(to_tile(0.0, 0.0, 0), TileAddress::new(0, 0, 0));
        assert_eq!(to_tile(0.0, 0.0, 1), TileAddress::new(1, 1, 1));
        // Mont Blanc massif
        assert_eq!(to_tile(6.85, 45.9, 10), TileAddress::new(531, 364, 10));
    }

    #[test]
    fn world_edges_are_clamped() {
        assert_eq!(to_tile(180.0, 0.0, 3).x, 7);
        assert_eq!(to_tile(-180.0, 0.0, 3).x, 0);
        assert_eq!(to_tile(0.0, 89.9, 3).y, 0);
        assert_eq!(to_tile(0.0, -89.9, 3).y, 7);
        assert_eq!(to_tile(0.0, 90.0, 3).y, 0);
        assert_eq!(to_tile(0.0, -90.0, 3).y, 7);
    }

    #[test]
    fn bounds_of_the_whole_world() {
        let world = to_bounds(0, 0, 0);
        assert_eq_approx(world.west, -180.0, 1e-9);
        assert_eq_approx(world.east, 180.0, 1e-9);
        assert_eq_approx(world.north, 85.0511287798, 1e-6);
        assert_eq_approx(world.south, -85.0511287798, 1e-6);
    }

    #[test]
    fn parsing_and_formatting_addresses() {
        let address: TileAddress = "10/531/364".parse().unwrap();
        assert_eq!(address, TileAddress::new(531, 364, 10));
        assert_eq!(address.to_string(), "10/531/364");

        assert!("10/531".parse::<TileAddress>().is_err());
        assert!("10/a/361".parse::<TileAddress>().is_err());
        assert!("2/4/0".parse::<TileAddress>().is_err());
        assert!("31/0/0".parse::<TileAddress>().is_err());
    }

    proptest! {
        #[test]
        fn center_of_tile_maps_back_to_tile(
            zoom in 0u8..=16,
            fx in 0.0f64..1.0,
            fy in 0.0f64..1.0,
        ) {
            let n = TileAddress::tiles_per_axis(zoom);
            let x = ((fx * n as f64) as u32).min(n - 1);
            let y = ((fy * n as f64) as u32).min(n - 1);

            let (lng, lat) = to_bounds(x, y, zoom).center();
            prop_assert_eq!(to_tile(lng, lat, zoom), TileAddress::new(x, y, zoom));
        }
    }
}
