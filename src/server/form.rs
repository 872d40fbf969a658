//! Multipart form parsing for the generation routes

use crate::{
    canvas::{CanvasRequest, Region},
    error::{Result, RoomcraftError},
    processor::InpaintRequest,
    types::Strategy,
};
use axum::{
    extract::{multipart::MultipartError, Multipart},
    http::StatusCode,
};
use tracing::debug;

/// Raw multipart fields of one generation request
#[derive(Debug, Default, Clone)]
pub struct InpaintForm {
    pub image: Option<Vec<u8>>,
    /// Image blended into the regions ahead of refinement or edge extraction
    pub overlay: Option<Vec<u8>>,
    pub prompt: Option<String>,
    pub furniture: Option<String>,
    pub erasure_spots: Option<String>,
    pub width: Option<String>,
    pub height: Option<String>,
    pub mode: Option<String>,
}

fn multipart_error(err: MultipartError) -> RoomcraftError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        RoomcraftError::payload_too_large(err.body_text())
    } else {
        RoomcraftError::invalid_request(format!("Malformed multipart body: {}", err))
    }
}

impl InpaintForm {
    /// Collect the known fields, ignoring anything else
    ///
    /// # Errors
    /// - `PayloadTooLarge` when the body passes the upload limit
    /// - `InvalidRequest` when the multipart stream cannot be read otherwise
    pub async fn from_multipart(mut multipart: Multipart) -> Result<Self> {
        let mut form = Self::default();

        while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
            let name = field.name().unwrap_or("").to_string();
            match name.as_str() {
                "image" => {
                    form.image = Some(field.bytes().await.map_err(multipart_error)?.to_vec());
                },
                "overlay" => {
                    form.overlay = Some(field.bytes().await.map_err(multipart_error)?.to_vec());
                },
                "prompt" => form.prompt = Some(field.text().await.map_err(multipart_error)?),
                "furniture" => form.furniture = Some(field.text().await.map_err(multipart_error)?),
                "erasure_spots" => {
                    form.erasure_spots = Some(field.text().await.map_err(multipart_error)?);
                },
                "width" => form.width = Some(field.text().await.map_err(multipart_error)?),
                "height" => form.height = Some(field.text().await.map_err(multipart_error)?),
                "mode" => form.mode = Some(field.text().await.map_err(multipart_error)?),
                other => debug!("Ignoring unknown form field '{}'", other),
            }
        }

        Ok(form)
    }

    /// Strategy selected by the `/inpaint/` `mode` field
    ///
    /// # Errors
    /// Returns `InvalidRequest` for modes that `/inpaint/` does not serve
    pub fn inpaint_strategy(&self) -> Result<Strategy> {
        let Some(mode) = self.mode.as_deref().map(str::trim).filter(|m| !m.is_empty()) else {
            return Ok(Strategy::Refinement);
        };
        match mode.parse::<Strategy>()? {
            strategy @ (Strategy::Refinement | Strategy::MaskInpaint | Strategy::EdgeConditioned) => {
                Ok(strategy)
            },
            other => Err(RoomcraftError::invalid_request(format!(
                "Mode '{}' ({}) is not served by /inpaint/",
                mode, other
            ))),
        }
    }

    /// Turn the collected fields into a pipeline request
    ///
    /// # Errors
    /// - `InvalidRequest` when the image field is absent
    /// - `InvalidRegion` for malformed region JSON
    /// - `InvalidCanvas` for non-integer dimensions
    pub fn into_request(self, strategy: Strategy) -> Result<InpaintRequest> {
        let image = self
            .image
            .ok_or_else(|| RoomcraftError::invalid_request("Missing 'image' field"))?;

        let region_json = match strategy {
            Strategy::BackgroundRemoval => None,
            Strategy::Erasure => self.erasure_spots.or(self.furniture),
            _ => self.furniture.or(self.erasure_spots),
        };
        let regions = match region_json {
            Some(json) => Region::parse_list(&json)?,
            None => Vec::new(),
        };

        let canvas = CanvasRequest::new(
            parse_dimension(self.width.as_deref(), "width")?,
            parse_dimension(self.height.as_deref(), "height")?,
        );

        let prompt = match strategy {
            Strategy::BackgroundRemoval => None,
            _ => self.prompt,
        };
        let overlay = self
            .overlay
            .filter(|bytes| strategy.blends_before_inference() && !bytes.is_empty());

        Ok(InpaintRequest::new(strategy, image)
            .with_prompt(prompt)
            .with_overlay(overlay)
            .with_regions(regions)
            .with_canvas(canvas))
    }
}

fn parse_dimension(value: Option<&str>, field: &str) -> Result<Option<u32>> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(raw) => raw.parse::<u32>().map(Some).map_err(|_| {
            RoomcraftError::invalid_canvas(format!(
                "'{}' must be a non-negative integer, got '{}'",
                field, raw
            ))
        }),
    }
}
