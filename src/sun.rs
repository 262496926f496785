use crate::consts::MAX_SHADOW_ALTITUDE_DEG;
use crate::trig::deg_to_rad;

/// Where the sun is, as seen from the area of interest.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SunPosition {
    /// Degrees clockwise from north.
    pub azimuth_degrees: f64,
    /// Degrees above the horizon.
    pub altitude_degrees: f64,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SunCondition {
    /// At or below the horizon: everything is dark, no overlay.
    Night,
    /// So high that terrain shadows are negligible.
    Overhead,
    /// A non-finite azimuth or altitude.
    Undefined,
    Casting,
}

impl SunPosition {
    pub fn new(azimuth_degrees: f64, altitude_degrees: f64) -> Self {
        SunPosition {
            azimuth_degrees,
            altitude_degrees,
        }
    }

    pub fn condition(&self) -> SunCondition {
        if !self.azimuth_degrees.is_finite() || !self.altitude_degrees.is_finite() {
            SunCondition::Undefined
        } else if self.altitude_degrees <= 0.0 {
            SunCondition::Night
        } else if self.altitude_degrees > MAX_SHADOW_ALTITUDE_DEG {
            SunCondition::Overhead
        } else {
            SunCondition::Casting
        }
    }

    pub fn geometry(&self) -> SunGeometry {
        let azimuth = deg_to_rad(self.azimuth_degrees);
        SunGeometry {
            dir_x: azimuth.sin(),
            dir_y: -azimuth.cos(),
            tan_altitude: deg_to_rad(self.altitude_degrees).tan(),
        }
    }
}

/// The sun direction in image space (x grows east, y grows south) together
/// with the slope of a ray pointing at it.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SunGeometry {
    pub dir_x: f64,
    pub dir_y: f64,
    pub tan_altitude: f64,
}
