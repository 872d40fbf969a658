//! Image I/O operations service
//!
//! Decoding of uploaded bytes and encoding of pipeline results, kept apart
//! from the generation logic so both sides can be tested on their own.

use crate::error::{Result, RoomcraftError};
use image::{DynamicImage, ImageFormat};
use std::path::Path;

/// Service for handling image decode/encode operations
pub struct ImageIOService;

impl ImageIOService {
    /// Decode an image from raw bytes, detecting the format from content
    ///
    /// # Errors
    /// Returns `RoomcraftError::InvalidImage` for empty input, undecodable
    /// data and images with a zero dimension
    ///
    /// # Examples
    /// ```rust,no_run
    /// use roomcraft::services::ImageIOService;
    ///
    /// let image_data = std::fs::read("room.jpg")?;
    /// let image = ImageIOService::load_from_bytes(&image_data)?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load_from_bytes(bytes: &[u8]) -> Result<DynamicImage> {
        if bytes.is_empty() {
            return Err(RoomcraftError::invalid_image("Image payload is empty"));
        }
        let image = image::load_from_memory(bytes).map_err(|e| {
            RoomcraftError::invalid_image(format!("Failed to decode image from bytes: {}", e))
        })?;
        if image.width() == 0 || image.height() == 0 {
            return Err(RoomcraftError::invalid_image(format!(
                "Decoded image has zero dimension ({}x{})",
                image.width(),
                image.height()
            )));
        }
        Ok(image)
    }

    /// Load an image from a file path
    ///
    /// # Errors
    /// - File cannot be read
    /// - Content is not a decodable image
    pub fn load_image<P: AsRef<Path>>(path: P) -> Result<DynamicImage> {
        let path_ref = path.as_ref();
        let data = std::fs::read(path_ref)?;
        Self::load_from_bytes(&data).map_err(|e| match e {
            RoomcraftError::InvalidImage(msg) => {
                RoomcraftError::invalid_image(format!("{}: {}", path_ref.display(), msg))
            },
            other => other,
        })
    }

    /// Encode an image as PNG bytes
    ///
    /// # Errors
    /// Returns `RoomcraftError::Internal` if the encoder fails
    pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
        Self::encode(image, ImageFormat::Png)
    }

    /// Encode an image into the given container format
    ///
    /// JPEG has no alpha channel, so RGBA input is flattened to RGB first.
    ///
    /// # Errors
    /// Returns `RoomcraftError::Internal` if the encoder fails
    pub fn encode(image: &DynamicImage, format: ImageFormat) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        let mut cursor = std::io::Cursor::new(&mut buffer);
        let result = if format == ImageFormat::Jpeg && image.color().has_alpha() {
            DynamicImage::ImageRgb8(image.to_rgb8()).write_to(&mut cursor, format)
        } else {
            image.write_to(&mut cursor, format)
        };
        result.map_err(|e| {
            RoomcraftError::internal(format!("Failed to encode {:?}: {}", format, e))
        })?;
        Ok(buffer)
    }
}
