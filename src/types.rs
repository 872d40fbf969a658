//! Core types passed between the orchestrator and generative backends

use crate::{
    canvas::CanvasSize,
    error::{Result, RoomcraftError},
};
use image::{DynamicImage, GrayImage};
use ndarray::ArrayD;
use serde::{Deserialize, Serialize};

/// Generation strategy, selected explicitly per request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Regenerate the masked region from the prompt
    MaskInpaint,
    /// Regenerate the whole image under an edge map of the input
    EdgeConditioned,
    /// Low-strength img2img pass over the whole image
    Refinement,
    /// Inpaint the masked region with a fixed object-removal prompt
    Erasure,
    /// Make non-subject pixels transparent
    BackgroundRemoval,
}

impl Strategy {
    pub const ALL: [Strategy; 5] = [
        Strategy::MaskInpaint,
        Strategy::EdgeConditioned,
        Strategy::Refinement,
        Strategy::Erasure,
        Strategy::BackgroundRemoval,
    ];

    /// Whether the backend receives the region mask and its output is
    /// composited back over the input under that mask
    #[must_use]
    pub fn uses_mask(self) -> bool {
        matches!(self, Strategy::MaskInpaint | Strategy::Erasure)
    }

    /// Whether regions are blended into the input before a whole-image pass
    #[must_use]
    pub fn blends_before_inference(self) -> bool {
        matches!(self, Strategy::Refinement | Strategy::EdgeConditioned)
    }

    /// Whether an all-zero mask means the input is returned untouched
    #[must_use]
    pub fn requires_regions(self) -> bool {
        matches!(self, Strategy::MaskInpaint | Strategy::Erasure)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::MaskInpaint => "mask_inpaint",
            Strategy::EdgeConditioned => "edge_conditioned",
            Strategy::Refinement => "refinement",
            Strategy::Erasure => "erasure",
            Strategy::BackgroundRemoval => "background_removal",
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Strategy {
    type Err = RoomcraftError;

    /// Accepts the canonical names plus the short `/inpaint/` mode names
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mask_inpaint" | "inpaint" => Ok(Strategy::MaskInpaint),
            "edge_conditioned" | "edge" => Ok(Strategy::EdgeConditioned),
            "refinement" | "refine" => Ok(Strategy::Refinement),
            "erasure" | "erase" => Ok(Strategy::Erasure),
            "background_removal" | "remove_bg" => Ok(Strategy::BackgroundRemoval),
            other => Err(RoomcraftError::invalid_request(format!(
                "Unknown generation mode '{}'",
                other
            ))),
        }
    }
}

/// Immutable description of one generative call
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub strategy: Strategy,
    pub prompt: Option<String>,
    /// Canvas-sized input image
    pub image: DynamicImage,
    /// Feathered region mask for mask-guided strategies
    pub mask: Option<GrayImage>,
    /// Edge map for edge-conditioned generation
    pub control: Option<GrayImage>,
    pub strength: Option<f32>,
    pub guidance_scale: Option<f32>,
    pub canvas: CanvasSize,
}

impl GenerationRequest {
    #[must_use]
    pub fn new(strategy: Strategy, image: DynamicImage, canvas: CanvasSize) -> Self {
        Self {
            strategy,
            prompt: None,
            image,
            mask: None,
            control: None,
            strength: None,
            guidance_scale: None,
            canvas,
        }
    }

    #[must_use]
    pub fn with_prompt(mut self, prompt: Option<String>) -> Self {
        self.prompt = prompt;
        self
    }

    #[must_use]
    pub fn with_mask(mut self, mask: GrayImage) -> Self {
        self.mask = Some(mask);
        self
    }

    #[must_use]
    pub fn with_control(mut self, control: GrayImage) -> Self {
        self.control = Some(control);
        self
    }

    #[must_use]
    pub fn with_strength(mut self, strength: f32) -> Self {
        self.strength = Some(strength);
        self
    }

    #[must_use]
    pub fn with_guidance_scale(mut self, guidance_scale: f32) -> Self {
        self.guidance_scale = Some(guidance_scale);
        self
    }

    /// Mask reference, failing when the strategy needed one and none was attached
    ///
    /// # Errors
    /// Returns `RoomcraftError::Internal` when the mask is missing
    pub fn require_mask(&self) -> Result<&GrayImage> {
        self.mask.as_ref().ok_or_else(|| {
            RoomcraftError::internal(format!("{} request built without a mask", self.strategy))
        })
    }
}

/// Scale of raw numeric pixel data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueRange {
    /// Floats in `[0, 1]`
    Unit,
    /// Floats in `[0, 255]`
    Byte,
}

/// Result shapes a generative backend may hand back
#[derive(Debug, Clone)]
pub enum RawOutput {
    /// Several candidate images; the first one wins
    Sequence(Vec<DynamicImage>),
    /// Exactly one image
    Single(DynamicImage),
    /// Raw pixel array (`HW`, `HWC`, `CHW`, optionally with leading batch axes)
    Tensor { data: ArrayD<f32>, range: ValueRange },
    /// Anything else, described for diagnostics
    Unrecognized(String),
}

impl RawOutput {
    /// Short description of the shape for logs and errors
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            RawOutput::Sequence(images) => format!("sequence of {} image(s)", images.len()),
            RawOutput::Single(image) => {
                format!("single {}x{} image", image.width(), image.height())
            },
            RawOutput::Tensor { data, range } => {
                format!("{:?} tensor with shape {:?}", range, data.shape())
            },
            RawOutput::Unrecognized(description) => format!("unrecognized ({})", description),
        }
    }
}

/// Millisecond timings collected for one request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProcessingTimings {
    pub decode_ms: u64,
    pub mask_ms: u64,
    pub inference_ms: u64,
    pub normalize_ms: u64,
    pub composite_ms: u64,
    pub encode_ms: u64,
    pub total_ms: u64,
}
