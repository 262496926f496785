use crate::consts::{SHADOW_ALPHA, SHADOW_TINT};
use crate::errors::UmbraError;
use image::{ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;

/// Per-pixel shadow opacity of the visible area. 0 means lit (or no data),
/// [`SHADOW_ALPHA`] means fully shadowed.
#[derive(Debug, Clone, PartialEq)]
pub struct ShadowMask {
    pub width: usize,
    pub height: usize,
    data: Box<[u8]>,
}

impl ShadowMask {
    /// Creates a mask with every pixel lit.
    pub fn new(width: usize, height: usize) -> ShadowMask {
        ShadowMask {
            width,
            height,
            data: vec![0; width * height].into_boxed_slice(),
        }
    }

    pub fn from_alphas(width: usize, height: usize, alphas: Vec<u8>) -> ShadowMask {
        assert_eq!(alphas.len(), width * height, "alpha count does not match mask size");
        ShadowMask {
            width,
            height,
            data: alphas.into_boxed_slice(),
        }
    }

    /// Builds a mask from RGBA8 pixels packed little-endian into `u32`s
    /// (red in the lowest byte), keeping only the alpha channel.
    pub fn from_packed_rgba(width: usize, height: usize, packed: &[u32]) -> ShadowMask {
        let alphas = packed.iter().map(|p| (p >> 24) as u8).collect();
        ShadowMask::from_alphas(width, height, alphas)
    }

    /// Gets the alpha of the pixel at the given coordinates.
    pub fn alpha(&self, x: usize, y: usize) -> u8 {
        if x >= self.width || y >= self.height {
            panic!("Pixel coordinates out of bounds");
        }
        self.data[y * self.width + x]
    }

    pub fn set_alpha(&mut self, x: usize, y: usize, alpha: u8) {
        if x >= self.width || y >= self.height {
            panic!("Pixel coordinates out of bounds");
        }
        self.data[y * self.width + x] = alpha;
    }

    pub fn row_mut(&mut self, y: usize) -> &mut [u8] {
        &mut self.data[y * self.width..(y + 1) * self.width]
    }

    pub fn alphas(&self) -> &[u8] {
        &self.data
    }

    pub fn shadowed_pixels(&self) -> usize {
        self.data.iter().filter(|&&a| a > 0).count()
    }

    /// Paints the mask in the shadow tint.
    pub fn to_rgba_image(&self) -> RgbaImage {
        let [r, g, b] = SHADOW_TINT;
        RgbaImage::from_fn(self.width as u32, self.height as u32, |x, y| {
            let alpha = self.data[y as usize * self.width + x as usize];
            if alpha == 0 {
                Rgba([0, 0, 0, 0])
            } else {
                Rgba([r, g, b, alpha])
            }
        })
    }

    pub fn encode_png(&self) -> Result<Vec<u8>, UmbraError> {
        let mut bytes = Vec::new();
        self.to_rgba_image()
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
        Ok(bytes)
    }
}

/// Scales the full shadow alpha by an opacity factor in `[0, 1]`.
pub fn shadow_alpha(opacity: f64) -> u8 {
    (SHADOW_ALPHA as f64 * opacity.clamp(0.0, 1.0)).round() as u8
}
