//! Configuration types for region-guided generation

use crate::{
    error::{Result, RoomcraftError},
    types::Strategy,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Prompt used when a refinement or inpaint request carries no prompt
pub const DEFAULT_PROMPT: &str = "same layout, modern furniture with photorealistic textures, \
consistent lighting, volumetric shadows, 4k detail, realistic";

/// Fixed prompt for the erasure strategy
pub const ERASURE_PROMPT: &str =
    "same room without object, consistent lighting, 4k detail, realistic";

/// Neutral grey blended into regions ahead of refinement and edge extraction
pub const DEFAULT_OVERLAY_FILL: [u8; 3] = [128, 128, 128];

/// Hard ceiling for `max_canvas_dimension`
pub const MAX_CANVAS_LIMIT: u32 = 16384;

/// How regions that leave the canvas are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RegionPolicy {
    /// Clip the far edge of a region to the canvas
    #[default]
    Clamp,
    /// Fail any region that does not fit entirely
    Reject,
}

/// Process-wide generation tunables, constructed once at startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Gaussian sigma in pixels used to feather rasterized masks
    pub blur_radius: f32,
    /// Classifier-free guidance scale passed to every prompted backend
    pub guidance_scale: f32,
    /// Denoising step count for diffusion backends
    pub inference_steps: u32,
    /// Img2img strength for the refinement strategy (smaller = closer to input)
    pub refine_strength: f32,
    pub default_prompt: String,
    pub erasure_prompt: String,
    /// Canny thresholds for edge-conditioned generation
    pub edge_low_threshold: f32,
    pub edge_high_threshold: f32,
    /// Largest accepted canvas width or height
    pub max_canvas_dimension: u32,
    pub region_policy: RegionPolicy,
    /// Fill painted under the feathered mask before whole-image strategies
    /// run, when the request carries no overlay image of its own
    pub overlay_fill: [u8; 3],
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            blur_radius: 8.0,
            guidance_scale: 6.5,
            inference_steps: 30,
            refine_strength: 0.15,
            default_prompt: DEFAULT_PROMPT.to_string(),
            erasure_prompt: ERASURE_PROMPT.to_string(),
            edge_low_threshold: 100.0,
            edge_high_threshold: 200.0,
            max_canvas_dimension: 4096,
            region_policy: RegionPolicy::Clamp,
            overlay_fill: DEFAULT_OVERLAY_FILL,
        }
    }
}

impl GenerationConfig {
    /// Create a new configuration builder
    #[must_use]
    pub fn builder() -> GenerationConfigBuilder {
        GenerationConfigBuilder::new()
    }

    /// Load a configuration from a JSON file; missing keys keep their defaults
    ///
    /// # Errors
    /// - File cannot be read
    /// - JSON is malformed
    /// - Loaded values fail validation
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw).map_err(|e| {
            RoomcraftError::invalid_config(format!(
                "Failed to parse generation config '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    /// Returns `RoomcraftError::InvalidConfig` naming the first offending value
    pub fn validate(&self) -> Result<()> {
        if !self.blur_radius.is_finite() || self.blur_radius < 0.0 {
            return Err(RoomcraftError::config_value_error(
                "blur_radius",
                self.blur_radius,
                ">= 0.0",
            ));
        }
        if !self.guidance_scale.is_finite() || self.guidance_scale <= 0.0 {
            return Err(RoomcraftError::config_value_error(
                "guidance_scale",
                self.guidance_scale,
                "> 0.0",
            ));
        }
        if self.inference_steps == 0 {
            return Err(RoomcraftError::config_value_error(
                "inference_steps",
                self.inference_steps,
                ">= 1",
            ));
        }
        if !(0.0..=1.0).contains(&self.refine_strength) {
            return Err(RoomcraftError::config_value_error(
                "refine_strength",
                self.refine_strength,
                "0.0-1.0",
            ));
        }
        let (low, high) = (self.edge_low_threshold, self.edge_high_threshold);
        if !low.is_finite() || !high.is_finite() || low < 1.0 || high < low {
            return Err(RoomcraftError::invalid_config(format!(
                "Edge thresholds must be finite with 1.0 <= low <= high, got low={} high={}",
                low, high
            )));
        }
        if !(1..=MAX_CANVAS_LIMIT).contains(&self.max_canvas_dimension) {
            return Err(RoomcraftError::config_value_error(
                "max_canvas_dimension",
                self.max_canvas_dimension,
                &format!("1-{}", MAX_CANVAS_LIMIT),
            ));
        }
        if self.erasure_prompt.trim().is_empty() {
            return Err(RoomcraftError::invalid_config("erasure_prompt must not be empty"));
        }
        Ok(())
    }

    /// Pick the prompt for a request: the caller's if non-blank, else the default
    #[must_use]
    pub fn resolve_prompt(&self, strategy: Strategy, requested: Option<&str>) -> Option<String> {
        match strategy {
            Strategy::Erasure => Some(self.erasure_prompt.clone()),
            Strategy::BackgroundRemoval => None,
            Strategy::MaskInpaint | Strategy::EdgeConditioned | Strategy::Refinement => {
                let prompt = requested
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .unwrap_or(&self.default_prompt);
                Some(prompt.to_string())
            },
        }
    }
}

/// Builder for `GenerationConfig`
pub struct GenerationConfigBuilder {
    config: GenerationConfig,
}

impl GenerationConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: GenerationConfig::default(),
        }
    }

    #[must_use]
    pub fn blur_radius(mut self, radius: f32) -> Self {
        self.config.blur_radius = radius;
        self
    }

    #[must_use]
    pub fn guidance_scale(mut self, scale: f32) -> Self {
        self.config.guidance_scale = scale;
        self
    }

    #[must_use]
    pub fn inference_steps(mut self, steps: u32) -> Self {
        self.config.inference_steps = steps;
        self
    }

    #[must_use]
    pub fn refine_strength(mut self, strength: f32) -> Self {
        self.config.refine_strength = strength;
        self
    }

    #[must_use]
    pub fn default_prompt<S: Into<String>>(mut self, prompt: S) -> Self {
        self.config.default_prompt = prompt.into();
        self
    }

    #[must_use]
    pub fn erasure_prompt<S: Into<String>>(mut self, prompt: S) -> Self {
        self.config.erasure_prompt = prompt.into();
        self
    }

    #[must_use]
    pub fn edge_thresholds(mut self, low: f32, high: f32) -> Self {
        self.config.edge_low_threshold = low;
        self.config.edge_high_threshold = high;
        self
    }

    #[must_use]
    pub fn max_canvas_dimension(mut self, max: u32) -> Self {
        self.config.max_canvas_dimension = max;
        self
    }

    #[must_use]
    pub fn region_policy(mut self, policy: RegionPolicy) -> Self {
        self.config.region_policy = policy;
        self
    }

    #[must_use]
    pub fn overlay_fill(mut self, fill: [u8; 3]) -> Self {
        self.config.overlay_fill = fill;
        self
    }

    /// Build the configuration
    ///
    /// # Errors
    /// Returns `RoomcraftError::InvalidConfig` when any value is out of range
    pub fn build(self) -> Result<GenerationConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for GenerationConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Which engine serves one strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BackendKind {
    /// Stable Diffusion web-UI compatible HTTP service
    Remote { base_url: String, timeout_secs: u64 },
    /// Local ONNX model file
    Onnx { model_path: PathBuf },
    /// Strategy is not served by this process
    Disabled,
}

/// Backend wiring for every strategy plus remote tunables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendSettings {
    pub refinement: BackendKind,
    pub mask_inpaint: BackendKind,
    pub edge_conditioned: BackendKind,
    pub erasure: BackendKind,
    pub background_removal: BackendKind,
    /// ControlNet model name used for edge-conditioned generation
    pub controlnet_model: String,
    /// rembg model name used by the remote background removal endpoint
    pub rembg_model: String,
}

impl BackendSettings {
    /// Route every strategy to a single remote service
    #[must_use]
    pub fn remote<S: Into<String>>(base_url: S, timeout_secs: u64) -> Self {
        let kind = BackendKind::Remote {
            base_url: base_url.into(),
            timeout_secs,
        };
        Self {
            refinement: kind.clone(),
            mask_inpaint: kind.clone(),
            edge_conditioned: kind.clone(),
            erasure: kind.clone(),
            background_removal: kind,
            controlnet_model: "control_v11p_sd15_canny".to_string(),
            rembg_model: "u2net".to_string(),
        }
    }

    /// Backend kind configured for a strategy
    #[must_use]
    pub fn kind_for(&self, strategy: Strategy) -> &BackendKind {
        match strategy {
            Strategy::Refinement => &self.refinement,
            Strategy::MaskInpaint => &self.mask_inpaint,
            Strategy::EdgeConditioned => &self.edge_conditioned,
            Strategy::Erasure => &self.erasure,
            Strategy::BackgroundRemoval => &self.background_removal,
        }
    }

    /// Override the backend of one strategy
    #[must_use]
    pub fn with_kind(mut self, strategy: Strategy, kind: BackendKind) -> Self {
        match strategy {
            Strategy::Refinement => self.refinement = kind,
            Strategy::MaskInpaint => self.mask_inpaint = kind,
            Strategy::EdgeConditioned => self.edge_conditioned = kind,
            Strategy::Erasure => self.erasure = kind,
            Strategy::BackgroundRemoval => self.background_removal = kind,
        }
        self
    }
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self::remote("http://127.0.0.1:7860", 300)
    }
}
