//! Region mask rasterization and edge feathering

use crate::canvas::{CanvasSize, Region};
use image::{GrayImage, Luma};
use imageproc::{drawing::draw_filled_rect_mut, filter::gaussian_blur_f32, rect::Rect};

/// Mask value for "region affected"
pub const MASK_ON: u8 = 255;
/// Mask value for "keep original"
pub const MASK_OFF: u8 = 0;

/// Single-channel canvas-sized mask, 255 = regenerate, 0 = keep
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionMask {
    buffer: GrayImage,
}

impl RegionMask {
    /// All-zero mask of the canvas size
    #[must_use]
    pub fn empty(canvas: CanvasSize) -> Self {
        Self {
            buffer: GrayImage::from_pixel(canvas.width, canvas.height, Luma([MASK_OFF])),
        }
    }

    #[must_use]
    pub fn from_image(buffer: GrayImage) -> Self {
        Self { buffer }
    }

    /// Paint every region as a filled 255 rectangle, in sequence order
    ///
    /// Regions are clipped to the canvas; a region entirely outside paints nothing.
    #[must_use]
    pub fn rasterize(canvas: CanvasSize, regions: &[Region]) -> Self {
        let mut mask = Self::empty(canvas);
        for region in regions {
            if let Some(rect) = clipped_rect(region, canvas) {
                draw_filled_rect_mut(&mut mask.buffer, rect, Luma([MASK_ON]));
            }
        }
        mask
    }

    /// Blur the mask in place with an isotropic Gaussian of the given sigma
    ///
    /// A radius of zero leaves the hard edges untouched.
    pub fn feather(&mut self, radius: f32) {
        if radius > 0.0 && !self.is_blank() {
            self.buffer = gaussian_blur_f32(&self.buffer, radius);
        }
    }

    /// Consuming variant of [`RegionMask::feather`]
    #[must_use]
    pub fn feathered(mut self, radius: f32) -> Self {
        self.feather(radius);
        self
    }

    /// True when no pixel is marked for regeneration
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.buffer.as_raw().iter().all(|&v| v == MASK_OFF)
    }

    /// Fraction of pixels with a non-zero mask value
    #[must_use]
    pub fn coverage(&self) -> f32 {
        let raw = self.buffer.as_raw();
        if raw.is_empty() {
            return 0.0;
        }
        raw.iter().filter(|&&v| v != MASK_OFF).count() as f32 / raw.len() as f32
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.buffer.dimensions()
    }

    #[must_use]
    pub fn as_image(&self) -> &GrayImage {
        &self.buffer
    }

    #[must_use]
    pub fn into_image(self) -> GrayImage {
        self.buffer
    }
}

/// Free-function form of [`RegionMask::rasterize`]
#[must_use]
pub fn rasterize(canvas: CanvasSize, regions: &[Region]) -> RegionMask {
    RegionMask::rasterize(canvas, regions)
}

/// Free-function form of [`RegionMask::feather`]
#[must_use]
pub fn feather(mask: RegionMask, radius: f32) -> RegionMask {
    mask.feathered(radius)
}

fn clipped_rect(region: &Region, canvas: CanvasSize) -> Option<Rect> {
    if region.x >= canvas.width || region.y >= canvas.height {
        return None;
    }
    let width = region.width.min(canvas.width - region.x);
    let height = region.height.min(canvas.height - region.y);
    if width == 0 || height == 0 {
        return None;
    }
    let x = i32::try_from(region.x).ok()?;
    let y = i32::try_from(region.y).ok()?;
    Some(Rect::at(x, y).of_size(width, height))
}
