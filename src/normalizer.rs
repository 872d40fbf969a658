//! Output normalization: every backend result becomes one canonical image
//!
//! This is the only place that inspects the shape of a backend's output.
//! Canonical images are RGB8, or RGBA8 when the source carries alpha.

use crate::{
    error::{Result, RoomcraftError},
    types::{RawOutput, ValueRange},
};
use image::{DynamicImage, GrayImage, RgbImage, RgbaImage};
use ndarray::{ArrayD, ArrayView3, Axis, Ix3};

/// Converts heterogeneous backend results into a single image
pub struct OutputNormalizer;

impl OutputNormalizer {
    /// Normalize a raw backend result
    ///
    /// Priority: a sequence yields its first image, a single image is used
    /// directly, a numeric tensor is converted with rounding and clamping.
    ///
    /// # Errors
    /// Returns `RoomcraftError::UnsupportedOutputShape` for empty sequences,
    /// zero-sized images, unknown tensor layouts and unrecognized results
    pub fn normalize(raw: RawOutput) -> Result<DynamicImage> {
        log::debug!("Normalizing backend output: {}", raw.describe());
        match raw {
            RawOutput::Sequence(images) => {
                let count = images.len();
                let first = images.into_iter().next().ok_or_else(|| {
                    RoomcraftError::unsupported_output("backend returned an empty image sequence")
                })?;
                if count > 1 {
                    log::debug!("Discarding {} extra candidate image(s)", count - 1);
                }
                Self::canonicalize(first)
            },
            RawOutput::Single(image) => Self::canonicalize(image),
            RawOutput::Tensor { data, range } => Self::tensor_to_image(&data, range),
            RawOutput::Unrecognized(description) => {
                Err(RoomcraftError::unsupported_output(description))
            },
        }
    }

    fn canonicalize(image: DynamicImage) -> Result<DynamicImage> {
        if image.width() == 0 || image.height() == 0 {
            return Err(RoomcraftError::unsupported_output(format!(
                "backend returned a {}x{} image",
                image.width(),
                image.height()
            )));
        }
        Ok(match image {
            DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_) => image,
            other if other.color().has_alpha() => DynamicImage::ImageRgba8(other.to_rgba8()),
            other => DynamicImage::ImageRgb8(other.to_rgb8()),
        })
    }

    /// Convert a raw pixel array into an image
    ///
    /// Leading size-1 axes are dropped. Rank-2 arrays are grayscale; rank-3
    /// arrays are read as `HWC` when the last axis has 1, 3 or 4 entries and
    /// as `CHW` otherwise.
    ///
    /// # Errors
    /// Returns `RoomcraftError::UnsupportedOutputShape` for unusable shapes
    pub fn tensor_to_image(data: &ArrayD<f32>, range: ValueRange) -> Result<DynamicImage> {
        let original_shape = data.shape().to_vec();
        let unsupported = |reason: &str| {
            RoomcraftError::unsupported_output(format!(
                "tensor with shape {:?}: {}",
                original_shape, reason
            ))
        };

        if data.is_empty() {
            return Err(unsupported("no elements"));
        }

        let mut view = data.view();
        while view.ndim() > 3 && view.len_of(Axis(0)) == 1 {
            view = view.index_axis_move(Axis(0), 0);
        }
        if view.ndim() == 2 {
            view = view.insert_axis(Axis(2));
        }
        let view: ArrayView3<'_, f32> = view
            .into_dimensionality::<Ix3>()
            .map_err(|_| unsupported("expected rank 2 or 3 after dropping batch axes"))?;

        let (first, _, last) = view.dim();
        let hwc = if is_channel_count(last) {
            view
        } else if is_channel_count(first) {
            view.permuted_axes([1, 2, 0])
        } else {
            return Err(unsupported("no channel axis of size 1, 3 or 4"));
        };

        let (height, width, channels) = hwc.dim();
        let width = u32::try_from(width).map_err(|_| unsupported("width too large"))?;
        let height = u32::try_from(height).map_err(|_| unsupported("height too large"))?;
        let raw: Vec<u8> = hwc.iter().map(|&value| to_byte(value, range)).collect();

        let image = match channels {
            1 => GrayImage::from_raw(width, height, raw)
                .map(|gray| DynamicImage::ImageRgb8(DynamicImage::ImageLuma8(gray).to_rgb8())),
            3 => RgbImage::from_raw(width, height, raw).map(DynamicImage::ImageRgb8),
            4 => RgbaImage::from_raw(width, height, raw).map(DynamicImage::ImageRgba8),
            _ => None,
        };
        image.ok_or_else(|| unsupported("pixel buffer does not match dimensions"))
    }
}

fn is_channel_count(len: usize) -> bool {
    matches!(len, 1 | 3 | 4)
}

fn to_byte(value: f32, range: ValueRange) -> u8 {
    if value.is_nan() {
        return 0;
    }
    let scaled = match range {
        ValueRange::Unit => value * 255.0,
        ValueRange::Byte => value,
    };
    scaled.round().clamp(0.0, 255.0) as u8
}
