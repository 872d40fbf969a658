//! Alpha compositing of two same-size images under a mask

use crate::error::{Result, RoomcraftError};
use image::{GrayImage, Rgb, RgbImage};

/// Merges an overlay onto a base image under a single-channel alpha mask
pub struct AlphaCompositor;

impl AlphaCompositor {
    /// Blend `overlay * alpha + base * (1 - alpha)` pixel-wise
    ///
    /// Alpha is the mask value scaled from `[0, 255]` to `[0, 1]`. A mask value
    /// of 0 reproduces the base pixel exactly and 255 the overlay pixel exactly.
    ///
    /// # Errors
    /// Returns `RoomcraftError::DimensionMismatch` when the three inputs differ in size
    pub fn composite(base: &RgbImage, overlay: &RgbImage, alpha: &GrayImage) -> Result<RgbImage> {
        let dimensions = base.dimensions();
        if overlay.dimensions() != dimensions {
            return Err(RoomcraftError::dimension_mismatch(
                "compositor overlay",
                dimensions,
                overlay.dimensions(),
            ));
        }
        if alpha.dimensions() != dimensions {
            return Err(RoomcraftError::dimension_mismatch(
                "compositor mask",
                dimensions,
                alpha.dimensions(),
            ));
        }

        let mut result = RgbImage::new(dimensions.0, dimensions.1);
        for (((out, b), o), a) in result
            .pixels_mut()
            .zip(base.pixels())
            .zip(overlay.pixels())
            .zip(alpha.pixels())
        {
            let weight = u32::from(a[0]);
            *out = Rgb([
                blend_channel(b[0], o[0], weight),
                blend_channel(b[1], o[1], weight),
                blend_channel(b[2], o[2], weight),
            ]);
        }
        Ok(result)
    }

    /// Solid image of one colour, usable as a neutral overlay
    #[must_use]
    pub fn solid(width: u32, height: u32, color: [u8; 3]) -> RgbImage {
        RgbImage::from_pixel(width, height, Rgb(color))
    }
}

/// Rounded integer blend of one channel with weight in `[0, 255]`
fn blend_channel(base: u8, overlay: u8, weight: u32) -> u8 {
    let mixed = u32::from(overlay) * weight + u32::from(base) * (255 - weight) + 127;
    (mixed / 255) as u8
}
