use crate::consts::METERS_PER_DEGREE;
use crate::errors::UmbraError;
use crate::trig::deg_to_rad;
use std::fmt;

/// A lng/lat rectangle in degrees. `west < east` and `south < north` always
/// hold for values built through [`GeoBounds::new`].
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct GeoBounds {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl GeoBounds {
    pub fn new(
        west: f64,
        south: f64,
        east: f64,
        north: f64,
    ) -> Result<GeoBounds, UmbraError> {
        let finite = [west, south, east, north].iter().all(|v| v.is_finite());
        let on_earth = (-180.0..=180.0).contains(&west)
            && (-180.0..=180.0).contains(&east)
            && (-90.0..=90.0).contains(&south)
            && (-90.0..=90.0).contains(&north);
        if !finite || !on_earth || west >= east || south >= north {
            return Err(UmbraError::InvalidBounds(format!(
                "west={west} south={south} east={east} north={north}"
            )));
        }

        Ok(GeoBounds {
            west,
            south,
            east,
            north,
        })
    }

    pub fn width_deg(&self) -> f64 {
        self.east - self.west
    }

    pub fn height_deg(&self) -> f64 {
        self.north - self.south
    }

    /// Returns the (lng, lat) of the rectangle's center.
    pub fn center(&self) -> (f64, f64) {
        (
            (self.west + self.east) / 2.0,
            (self.south + self.north) / 2.0,
        )
    }

    pub fn contains(&self, other: &GeoBounds) -> bool {
        self.west <= other.west
            && self.south <= other.south
            && self.east >= other.east
            && self.north >= other.north
    }

    /// Ground size of one pixel when these bounds are rasterized into a
    /// `width` x `height` grid. The latitude and longitude scales are taken
    /// at the center latitude and averaged.
    pub fn meters_per_pixel(&self, width: usize, height: usize) -> f64 {
        let (_, center_lat) = self.center();
        let lat_meters = self.height_deg() * METERS_PER_DEGREE / height as f64;
        let lng_meters = self.width_deg()
            * METERS_PER_DEGREE
            * deg_to_rad(center_lat).cos()
            / width as f64;
        (lat_meters + lng_meters) / 2.0
    }
}

impl fmt::Display for GeoBounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:.5}, {:.5}, {:.5}, {:.5}]",
            self.west, self.south, self.east, self.north
        )
    }
}
