//! Terrain-RGB elevation encoding: `elevation = -10000 + (R*65536 + G*256 + B) * 0.1`.

use crate::consts::{NO_DATA, TILE_SIZE};
use crate::errors::UmbraError;
use image::{ImageFormat, Rgba, RgbaImage};
use rayon::prelude::*;
use std::io::Cursor;

const ELEVATION_OFFSET: f64 = -10000.0;
const ELEVATION_STEP: f64 = 0.1;
const MAX_ENCODED: u32 = 0xFF_FFFF;

pub fn decode_elevation(r: u8, g: u8, b: u8) -> f64 {
    let value = (r as u32) << 16 | (g as u32) << 8 | b as u32;
    ELEVATION_OFFSET + value as f64 * ELEVATION_STEP
}

/// Inverse of [`decode_elevation`], clamped to the representable range.
pub fn encode_elevation(meters: f64) -> [u8; 3] {
    let value = ((meters - ELEVATION_OFFSET) / ELEVATION_STEP)
        .round()
        .clamp(0.0, MAX_ENCODED as f64) as u32;
    [(value >> 16) as u8, (value >> 8) as u8, value as u8]
}

/// Decodes an encoded terrain tile (any raster format the `image` crate
/// understands) into `TILE_SIZE * TILE_SIZE` elevation samples, row-major
/// from the north-west corner. Transparent pixels become [`NO_DATA`].
pub fn decode_tile(bytes: &[u8]) -> Result<Box<[f32]>, UmbraError> {
    let image = image::load_from_memory(bytes)
        .map_err(|e| UmbraError::Decode(e.to_string()))?
        .to_rgba8();

    let (width, height) = image.dimensions();
    if width as usize != TILE_SIZE || height as usize != TILE_SIZE {
        return Err(UmbraError::Decode(format!(
            "expected a {TILE_SIZE}x{TILE_SIZE} tile, got {width}x{height}"
        )));
    }

    let raw = image.as_raw();
    let mut samples = vec![NO_DATA; TILE_SIZE * TILE_SIZE];
    samples
        .par_chunks_mut(TILE_SIZE)
        .enumerate()
        .for_each(|(row, out)| {
            let pixels = &raw[row * TILE_SIZE * 4..(row + 1) * TILE_SIZE * 4];
            for (sample, px) in out.iter_mut().zip(pixels.chunks_exact(4)) {
                if px[3] != 0 {
                    *sample = decode_elevation(px[0], px[1], px[2]) as f32;
                }
            }
        });

    Ok(samples.into_boxed_slice())
}

/// Encodes `size * size` elevation samples as a terrain-RGB PNG. Samples
/// below the no-data threshold are written fully transparent.
pub fn encode_tile_png(samples: &[f32], size: u32) -> Result<Vec<u8>, UmbraError> {
    if samples.len() != (size * size) as usize {
        return Err(UmbraError::Decode(format!(
            "expected {} samples, got {}",
            size * size,
            samples.len()
        )));
    }

    let image = RgbaImage::from_fn(size, size, |x, y| {
        let elevation = samples[(y * size + x) as usize];
        if elevation < crate::consts::NO_DATA_THRESHOLD {
            Rgba([0, 0, 0, 0])
        } else {
            let [r, g, b] = encode_elevation(elevation as f64);
            Rgba([r, g, b, 255])
        }
    });

    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::assert_eq_approx;
    use proptest::prelude::*;

    #[test]
    fn decode_of_zero_is_the_offset() {
        assert_eq!(decode_elevation(0, 0, 0), -10000.0);
    }

    #[test]
    fn known_values() {
        // 0 m is encoded as 100000 = 0x0186A0
        assert_eq_approx(decode_elevation(0x01, 0x86, 0xA0), 0.0, 1e-9);
        assert_eq!(encode_elevation(0.0), [0x01, 0x86, 0xA0]);
        assert_eq_approx(decode_elevation(0x02, 0x42, 0x8B), 4810.7, 1e-6);
    }

    #[test]
    fn encoding_is_clamped() {
        assert_eq!(encode_elevation(-20000.0), [0, 0, 0]);
        assert_eq!(encode_elevation(2_000_000.0), [0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn tile_round_trip_keeps_elevations_and_no_data() {
        let size = TILE_SIZE as u32;
        let mut samples = vec![1234.5f32; TILE_SIZE * TILE_SIZE];
        samples[0] = NO_DATA;
        samples[TILE_SIZE + 7] = 4807.3;

        let png = encode_tile_png(&samples, size).unwrap();
        let decoded = decode_tile(&png).unwrap();

        assert_eq!(decoded[0], NO_DATA);
        assert_eq_approx(decoded[1], 1234.5, 0.05);
        assert_eq_approx(decoded[TILE_SIZE + 7], 4807.3, 0.05);
    }

    #[test]
    fn wrong_tile_size_is_a_decode_error() {
        let samples = vec![0.0f32; 16];
        let png = encode_tile_png(&samples, 4).unwrap();
        assert!(matches!(decode_tile(&png), Err(UmbraError::Decode(_))));
    }

    #[test]
    fn garbage_is_a_decode_error() {
        assert!(matches!(
            decode_tile(b"definitely not a png"),
            Err(UmbraError::Decode(_))
        ));
    }

    proptest! {
        #[test]
        fn decoding_is_strictly_increasing(a in 0u32..MAX_ENCODED) {
            let b = a + 1;
            let lower = decode_elevation((a >> 16) as u8, (a >> 8) as u8, a as u8);
            let higher = decode_elevation((b >> 16) as u8, (b >> 8) as u8, b as u8);
            prop_assert!(higher > lower);
        }

        #[test]
        fn encoding_inverts_decoding(r: u8, g: u8, b: u8) {
            prop_assert_eq!(encode_elevation(decode_elevation(r, g, b)), [r, g, b]);
        }
    }
}
