use std::f64::consts::PI;

pub fn deg_to_rad(deg: f64) -> f64 {
    deg * (PI / 180.0)
}

pub fn rad_to_deg(rad: f64) -> f64 {
    rad * (180.0 / PI)
}

/// Hermite ease between `edge0` and `edge1`, same as the WGSL builtin.
pub fn smoothstep(edge0: f64, edge1: f64, x: f64) -> f64 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

#[cfg(test)]
mod tests {
    use super::{deg_to_rad, rad_to_deg, smoothstep};
    use crate::testing::assert_eq_approx;

    #[test]
    fn degrees_and_radians() {
        assert_eq_approx(deg_to_rad(180.0), std::f64::consts::PI, 1e-12);
        assert_eq_approx(rad_to_deg(deg_to_rad(37.5)), 37.5, 1e-12);
    }

    #[test]
    fn smoothstep_is_clamped_and_symmetric() {
        assert_eq!(smoothstep(0.0, 1.0, -1.0), 0.0);
        assert_eq!(smoothstep(0.0, 1.0, 2.0), 1.0);
        assert_eq_approx(smoothstep(0.0, 1.0, 0.5), 0.5, 1e-12);
        assert_eq_approx(
            smoothstep(0.0, 1.0, 0.25) + smoothstep(0.0, 1.0, 0.75),
            1.0,
            1e-12,
        );
    }
}
