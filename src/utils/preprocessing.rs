//! Shared image preprocessing utilities
//!
//! Canvas fitting and edge extraction used by the orchestrator, plus the
//! tensor conversions the ONNX backends feed their sessions with.

use crate::{
    canvas::CanvasSize,
    error::{Result, RoomcraftError},
};
use image::{imageops::FilterType, DynamicImage, GrayImage, RgbImage};
use ndarray::Array4;

/// Per-channel normalization applied after scaling pixels to `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TensorNormalization {
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl TensorNormalization {
    /// Pixels scaled to `[0, 1]` without shifting
    pub const IDENTITY: Self = Self {
        mean: [0.0, 0.0, 0.0],
        std: [1.0, 1.0, 1.0],
    };

    /// Mean/std for salient-object segmentation models
    pub const SEGMENTATION: Self = Self {
        mean: [0.5, 0.5, 0.5],
        std: [1.0, 1.0, 1.0],
    };

    /// Every mean must be finite and every std finite and positive
    fn validate(&self) -> Result<()> {
        let unusable = self
            .mean
            .iter()
            .zip(&self.std)
            .enumerate()
            .find(|(_, (mean, std))| !mean.is_finite() || !std.is_finite() || **std <= 0.0);
        match unusable {
            Some((channel, (mean, std))) => Err(RoomcraftError::invalid_config(format!(
                "Tensor normalization for channel {} is unusable (mean={}, std={})",
                channel, mean, std
            ))),
            None => Ok(()),
        }
    }
}

/// Shared image preprocessing utilities
pub struct ImagePreprocessor;

impl ImagePreprocessor {
    /// Resize an image to exactly the canvas size with Lanczos resampling
    ///
    /// Images already at canvas size are returned unchanged.
    #[must_use]
    pub fn resize_to_canvas(image: &DynamicImage, canvas: CanvasSize) -> DynamicImage {
        if (image.width(), image.height()) == canvas.dimensions() {
            return image.clone();
        }
        log::debug!(
            "Resizing {}x{} image to {} canvas",
            image.width(),
            image.height(),
            canvas
        );
        image.resize_exact(canvas.width, canvas.height, FilterType::Lanczos3)
    }

    /// Binary Canny edge map of the image luminance (255 = edge)
    #[must_use]
    pub fn edge_map(image: &DynamicImage, low_threshold: f32, high_threshold: f32) -> GrayImage {
        imageproc::edges::canny(&image.to_luma8(), low_threshold, high_threshold)
    }

    /// Convert an RGB image into a normalized `1x3xHxW` tensor at the target size
    ///
    /// # Errors
    /// - Invalid normalization parameters
    /// - Zero target size
    #[allow(clippy::indexing_slicing)]
    pub fn rgb_to_nchw(
        image: &RgbImage,
        target: (u32, u32),
        normalization: &TensorNormalization,
    ) -> Result<Array4<f32>> {
        normalization.validate()?;
        let (width, height) = target;
        if width == 0 || height == 0 {
            return Err(RoomcraftError::internal(format!(
                "Tensor target size must be positive, got {}x{}",
                width, height
            )));
        }

        let resized = if image.dimensions() == target {
            image.clone()
        } else {
            image::imageops::resize(image, width, height, FilterType::Triangle)
        };

        let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));
        // Safe: tensor dimensions pre-allocated to match the resized image
        for (x, y, pixel) in resized.enumerate_pixels() {
            for channel in 0..3 {
                let value = f32::from(pixel[channel]) / 255.0;
                tensor[[0, channel, y as usize, x as usize]] =
                    (value - normalization.mean[channel]) / normalization.std[channel];
            }
        }
        Ok(tensor)
    }

    /// Convert a mask into a binary `1x1xHxW` tensor at the target size
    ///
    /// Any non-zero mask value counts as "regenerate".
    #[allow(clippy::indexing_slicing)]
    #[must_use]
    pub fn mask_to_nchw(mask: &GrayImage, target: (u32, u32)) -> Array4<f32> {
        let (width, height) = target;
        let resized = if mask.dimensions() == target {
            mask.clone()
        } else {
            image::imageops::resize(mask, width, height, FilterType::Nearest)
        };

        let mut tensor = Array4::<f32>::zeros((1, 1, height as usize, width as usize));
        // Safe: tensor dimensions pre-allocated to match the resized mask
        for (x, y, pixel) in resized.enumerate_pixels() {
            if pixel[0] > 0 {
                tensor[[0, 0, y as usize, x as usize]] = 1.0;
            }
        }
        tensor
    }
}
