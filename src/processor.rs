//! Request orchestrator for region-guided generation
//!
//! `InpaintProcessor` owns the whole per-request pipeline: decode, canvas
//! resolution, region validation and mask rasterization, then a strategy
//! specific blend. Masked strategies (inpaint, erasure) composite the model
//! output back over the input under the feathered mask. Whole-image strategies
//! (refinement, edge-conditioned) blend an overlay into the regions first and
//! return the model output as is. The processor is shared by every request
//! worker behind an `Arc`; the only state it carries across requests is the
//! read-mostly handle registry.

use crate::{
    canvas::{fit_regions, CanvasRequest, CanvasSize, Region},
    compositor::AlphaCompositor,
    config::{BackendKind, BackendSettings, GenerationConfig},
    error::{Result, RoomcraftError},
    inference::{GenerativeBackend, HandleRegistry},
    mask::RegionMask,
    normalizer::OutputNormalizer,
    services::ImageIOService,
    types::{GenerationRequest, ProcessingTimings, Strategy},
    utils::ImagePreprocessor,
};
use image::{imageops::FilterType, DynamicImage, RgbImage};
use instant::Instant;
use log::debug;
use std::sync::Arc;
use tracing::{info as trace_info, instrument, span, warn as trace_warn, Instrument, Level};

/// Factory trait for creating generative backends
pub trait BackendFactory: Send + Sync {
    /// Create the backend configured for a strategy
    ///
    /// Returns `Ok(None)` when the strategy is disabled.
    ///
    /// # Errors
    ///
    /// Returns `RoomcraftError` for:
    /// - Backend kinds not compiled into this build
    /// - Backend kinds that cannot serve the strategy
    fn create_backend(
        &self,
        strategy: Strategy,
        settings: &BackendSettings,
    ) -> Result<Option<Box<dyn GenerativeBackend>>>;
}

/// Default backend factory implementation
pub struct DefaultBackendFactory;

impl BackendFactory for DefaultBackendFactory {
    fn create_backend(
        &self,
        strategy: Strategy,
        settings: &BackendSettings,
    ) -> Result<Option<Box<dyn GenerativeBackend>>> {
        match settings.kind_for(strategy) {
            BackendKind::Disabled => Ok(None),
            #[cfg(feature = "remote")]
            BackendKind::Remote {
                base_url,
                timeout_secs,
            } => {
                let backend = crate::backends::RemoteBackend::new(
                    base_url.clone(),
                    instant::Duration::from_secs(*timeout_secs),
                )
                .with_controlnet_model(settings.controlnet_model.clone())
                .with_rembg_model(settings.rembg_model.clone());
                Ok(Some(Box::new(backend)))
            },
            #[cfg(not(feature = "remote"))]
            BackendKind::Remote { .. } => Err(RoomcraftError::invalid_config(format!(
                "{} is configured for the remote backend, but this build lacks the 'remote' feature",
                strategy
            ))),
            #[cfg(feature = "onnx")]
            BackendKind::Onnx { model_path } => match strategy {
                Strategy::BackgroundRemoval => Ok(Some(Box::new(
                    crate::backends::OnnxSegmentationBackend::new(model_path.clone()),
                ))),
                Strategy::Erasure => Ok(Some(Box::new(crate::backends::OnnxErasureBackend::new(
                    model_path.clone(),
                )))),
                other => Err(RoomcraftError::invalid_config(format!(
                    "No ONNX backend can serve {}",
                    other
                ))),
            },
            #[cfg(not(feature = "onnx"))]
            BackendKind::Onnx { .. } => Err(RoomcraftError::invalid_config(format!(
                "{} is configured for an ONNX model, but this build lacks the 'onnx' feature",
                strategy
            ))),
        }
    }
}

/// Create and initialize one handle per enabled strategy
///
/// # Errors
/// - Factory errors for misconfigured strategies
/// - `ModelUnavailable` when any backend fails to initialize
pub fn build_registry(
    factory: &dyn BackendFactory,
    settings: &BackendSettings,
    config: &GenerationConfig,
) -> Result<HandleRegistry> {
    let mut builder = HandleRegistry::builder();
    for strategy in Strategy::ALL {
        match factory.create_backend(strategy, settings)? {
            Some(backend) => {
                debug!("Registering '{}' for {}", backend.name(), strategy);
                builder = builder.register(strategy, backend);
            },
            None => debug!("{} is disabled", strategy),
        }
    }
    builder.initialize(config)
}

/// One parsed client request
#[derive(Debug, Clone)]
pub struct InpaintRequest {
    pub strategy: Strategy,
    pub image_bytes: Vec<u8>,
    pub prompt: Option<String>,
    pub regions: Vec<Region>,
    pub canvas: CanvasRequest,
    /// Encoded image blended into the regions of whole-image strategies
    pub overlay_bytes: Option<Vec<u8>>,
}

impl InpaintRequest {
    #[must_use]
    pub fn new(strategy: Strategy, image_bytes: Vec<u8>) -> Self {
        Self {
            strategy,
            image_bytes,
            prompt: None,
            regions: Vec::new(),
            canvas: CanvasRequest::default(),
            overlay_bytes: None,
        }
    }

    #[must_use]
    pub fn with_prompt(mut self, prompt: Option<String>) -> Self {
        self.prompt = prompt;
        self
    }

    #[must_use]
    pub fn with_regions(mut self, regions: Vec<Region>) -> Self {
        self.regions = regions;
        self
    }

    #[must_use]
    pub fn with_canvas(mut self, canvas: CanvasRequest) -> Self {
        self.canvas = canvas;
        self
    }

    #[must_use]
    pub fn with_overlay(mut self, overlay_bytes: Option<Vec<u8>>) -> Self {
        self.overlay_bytes = overlay_bytes;
        self
    }
}

/// Finished image plus request metadata
#[derive(Debug, Clone)]
pub struct InpaintResult {
    pub image: DynamicImage,
    pub strategy: Strategy,
    pub canvas: CanvasSize,
    /// Whether a generative backend was invoked
    pub generated: bool,
    pub timings: ProcessingTimings,
}

impl InpaintResult {
    /// Encode the result as PNG
    ///
    /// # Errors
    /// Returns `RoomcraftError::Internal` if encoding fails
    pub fn to_png_bytes(&self) -> Result<Vec<u8>> {
        ImageIOService::encode_png(&self.image)
    }
}

/// Validated, canvas-sized inputs for one request
struct PreparedInput {
    /// Canvas image, with the overlay already blended in for whole-image strategies
    image: DynamicImage,
    canvas: CanvasSize,
    /// Mask the model output is composited under after inference
    mask: Option<RegionMask>,
}

/// Orchestrates region-guided generation requests
pub struct InpaintProcessor {
    registry: HandleRegistry,
    config: Arc<GenerationConfig>,
}

impl InpaintProcessor {
    #[must_use]
    pub fn new(registry: HandleRegistry, config: GenerationConfig) -> Self {
        Self {
            registry,
            config: Arc::new(config),
        }
    }

    /// Build handles from backend settings with the default factory
    ///
    /// # Errors
    /// Same as [`build_registry`]
    pub fn from_settings(settings: &BackendSettings, config: GenerationConfig) -> Result<Self> {
        let registry = build_registry(&DefaultBackendFactory, settings, &config)?;
        Ok(Self::new(registry, config))
    }

    #[must_use]
    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    #[must_use]
    pub fn registry(&self) -> &HandleRegistry {
        &self.registry
    }

    /// Run one request through the pipeline
    ///
    /// Every input error surfaces before any backend is called.
    ///
    /// # Errors
    /// - `InvalidImage`, `InvalidCanvas`, `InvalidRegion` for bad input
    /// - `ModelUnavailable` when the strategy has no handle
    /// - `InferenceFailure` and `UnsupportedOutputShape` from the backend
    /// - `DimensionMismatch` if a stage breaks the canvas invariant
    #[instrument(
        skip(self, request),
        fields(
            strategy = %request.strategy,
            regions = request.regions.len(),
            bytes = request.image_bytes.len()
        )
    )]
    pub async fn process(&self, request: InpaintRequest) -> Result<InpaintResult> {
        let total_start = Instant::now();
        let mut timings = ProcessingTimings::default();
        let strategy = request.strategy;

        let prepared = self.prepare(&request, &mut timings)?;
        let canvas = prepared.canvas;

        if strategy.requires_regions() && prepared.mask.is_none() {
            trace_info!(%canvas, "No regions supplied, returning input unchanged");
            timings.total_ms = elapsed_ms(total_start);
            return Ok(InpaintResult {
                image: prepared.image,
                strategy,
                canvas,
                generated: false,
                timings,
            });
        }

        let generation = self.build_generation_request(&request, &prepared);
        let handle = self.registry.get(strategy)?;

        let inference_start = Instant::now();
        let raw = handle
            .infer_blocking_task(generation)
            .instrument(span!(
                Level::INFO,
                "inference",
                strategy = %strategy,
                backend = %handle.backend_name()
            ))
            .await?;
        timings.inference_ms = elapsed_ms(inference_start);

        let output = {
            let _span = span!(Level::DEBUG, "normalize").entered();
            let normalize_start = Instant::now();
            let output = Self::fit_output(OutputNormalizer::normalize(raw)?, canvas);
            timings.normalize_ms = elapsed_ms(normalize_start);
            output
        };

        let image = {
            let _span = span!(Level::DEBUG, "composite").entered();
            let composite_start = Instant::now();
            let image = match &prepared.mask {
                Some(mask) => DynamicImage::ImageRgb8(AlphaCompositor::composite(
                    &prepared.image.to_rgb8(),
                    &output.to_rgb8(),
                    mask.as_image(),
                )?),
                None => output,
            };
            timings.composite_ms += elapsed_ms(composite_start);
            image
        };

        timings.total_ms = elapsed_ms(total_start);
        trace_info!(
            %canvas,
            inference_ms = timings.inference_ms,
            total_ms = timings.total_ms,
            "Request complete"
        );

        Ok(InpaintResult {
            image,
            strategy,
            canvas,
            generated: true,
            timings,
        })
    }

    /// Run the pipeline and encode the result as PNG
    ///
    /// # Errors
    /// Same as [`InpaintProcessor::process`], plus encoding failures
    pub async fn process_to_png(&self, request: InpaintRequest) -> Result<(Vec<u8>, InpaintResult)> {
        let mut result = self.process(request).await?;
        let encode_start = Instant::now();
        let bytes = result.to_png_bytes()?;
        result.timings.encode_ms = elapsed_ms(encode_start);
        Ok((bytes, result))
    }

    fn prepare(&self, request: &InpaintRequest, timings: &mut ProcessingTimings) -> Result<PreparedInput> {
        let decode_start = Instant::now();
        let decoded = {
            let _span = span!(Level::DEBUG, "decode").entered();
            ImageIOService::load_from_bytes(&request.image_bytes)?
        };
        let native = CanvasSize::new(decoded.width(), decoded.height())
            .map_err(|e| RoomcraftError::invalid_image(e.to_string()))?;
        let canvas = request
            .canvas
            .resolve(native, self.config.max_canvas_dimension)?;
        let image = ImagePreprocessor::resize_to_canvas(&decoded, canvas);
        timings.decode_ms = elapsed_ms(decode_start);

        let mask_start = Instant::now();
        let strategy = request.strategy;
        let regions = fit_regions(&request.regions, canvas, self.config.region_policy)?;
        let wants_mask = strategy.uses_mask() || strategy.blends_before_inference();
        let mask = if wants_mask && !regions.is_empty() {
            let _span = span!(Level::DEBUG, "mask", regions = regions.len(), %canvas).entered();
            let mask = RegionMask::rasterize(canvas, &regions).feathered(self.config.blur_radius);
            debug!("Mask coverage {:.1}%", mask.coverage() * 100.0);
            Some(mask)
        } else {
            if !regions.is_empty() {
                trace_warn!(
                    strategy = %strategy,
                    "Ignoring {} region(s) for a strategy without a mask",
                    regions.len()
                );
            }
            None
        };
        timings.mask_ms = elapsed_ms(mask_start);

        let blends = strategy.blends_before_inference() && mask.is_some();
        if request.overlay_bytes.is_some() && !blends {
            trace_warn!(strategy = %strategy, "Ignoring overlay image, nothing to blend it into");
        }

        let (image, mask) = match mask {
            Some(mask) if strategy.blends_before_inference() => {
                let _span = span!(Level::DEBUG, "blend", %canvas).entered();
                let blend_start = Instant::now();
                let overlay = self.overlay_for(request, canvas)?;
                let blended =
                    AlphaCompositor::composite(&image.to_rgb8(), &overlay, mask.as_image())?;
                timings.composite_ms = elapsed_ms(blend_start);
                (DynamicImage::ImageRgb8(blended), None)
            },
            other => (image, other),
        };

        Ok(PreparedInput {
            image,
            canvas,
            mask,
        })
    }

    /// Canvas-sized overlay: the request's own image, else the configured fill
    fn overlay_for(&self, request: &InpaintRequest, canvas: CanvasSize) -> Result<RgbImage> {
        match &request.overlay_bytes {
            Some(bytes) => {
                let decoded = ImageIOService::load_from_bytes(bytes).map_err(|e| {
                    RoomcraftError::invalid_image(format!("Overlay image: {}", e))
                })?;
                Ok(ImagePreprocessor::resize_to_canvas(&decoded, canvas).to_rgb8())
            },
            None => Ok(AlphaCompositor::solid(
                canvas.width,
                canvas.height,
                self.config.overlay_fill,
            )),
        }
    }

    fn build_generation_request(
        &self,
        request: &InpaintRequest,
        prepared: &PreparedInput,
    ) -> GenerationRequest {
        let strategy = request.strategy;
        let prompt = self
            .config
            .resolve_prompt(strategy, request.prompt.as_deref());
        let mut generation =
            GenerationRequest::new(strategy, prepared.image.clone(), prepared.canvas)
                .with_prompt(prompt);

        match strategy {
            Strategy::Refinement => {
                generation = generation
                    .with_strength(self.config.refine_strength)
                    .with_guidance_scale(self.config.guidance_scale);
            },
            Strategy::MaskInpaint | Strategy::Erasure => {
                generation = generation.with_guidance_scale(self.config.guidance_scale);
                if let Some(mask) = &prepared.mask {
                    generation = generation.with_mask(mask.as_image().clone());
                }
            },
            Strategy::EdgeConditioned => {
                let edges = ImagePreprocessor::edge_map(
                    &prepared.image,
                    self.config.edge_low_threshold,
                    self.config.edge_high_threshold,
                );
                generation = generation
                    .with_control(edges)
                    .with_guidance_scale(self.config.guidance_scale);
            },
            Strategy::BackgroundRemoval => {},
        }
        generation
    }

    /// Bring a normalized output back to the canvas size
    fn fit_output(output: DynamicImage, canvas: CanvasSize) -> DynamicImage {
        if (output.width(), output.height()) == canvas.dimensions() {
            return output;
        }
        debug!(
            "Resizing {}x{} model output back to {} canvas",
            output.width(),
            output.height(),
            canvas
        );
        output.resize_exact(canvas.width, canvas.height, FilterType::Lanczos3)
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}
