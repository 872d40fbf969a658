//! Test utilities and mock backends for testing inference functionality
//!
//! Mock implementations of the `GenerativeBackend` trait so handles and the
//! orchestrator can be tested without a model service or ONNX Runtime.

use crate::{
    config::GenerationConfig,
    error::{Result, RoomcraftError},
    inference::GenerativeBackend,
    types::{GenerationRequest, RawOutput, Strategy, ValueRange},
};
use image::{DynamicImage, GrayImage, Rgb, RgbImage, Rgba, RgbaImage};
use instant::Duration;
use ndarray::Array3;
use std::sync::{Arc, Mutex};

/// Shared record of backend calls, readable after the backend moved into a handle
#[derive(Debug, Clone, Default)]
pub struct CallHistory {
    calls: Arc<Mutex<Vec<String>>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

/// Parameters a mock backend observed on one `infer` call
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub strategy: Strategy,
    pub prompt: Option<String>,
    pub image_dimensions: (u32, u32),
    /// Input image exactly as the backend received it
    pub image: RgbImage,
    pub has_mask: bool,
    pub has_control: bool,
    pub control: Option<GrayImage>,
    pub strength: Option<f32>,
    pub guidance_scale: Option<f32>,
}

impl CallHistory {
    /// Get the call history for verification in tests
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Clear the call history
    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
        self.requests.lock().unwrap().clear();
    }

    fn record_call(&self, call: String) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }

    fn record_request(&self, request: &GenerationRequest) {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(RecordedRequest {
                strategy: request.strategy,
                prompt: request.prompt.clone(),
                image_dimensions: (request.image.width(), request.image.height()),
                image: request.image.to_rgb8(),
                has_mask: request.mask.is_some(),
                has_control: request.control.is_some(),
                control: request.control.clone(),
                strength: request.strength,
                guidance_scale: request.guidance_scale,
            });
        }
    }
}

/// Shape of the result a mock backend hands back
#[derive(Debug, Clone)]
pub enum MockOutput {
    /// RGBA cut-out for background removal, a solid sequence otherwise
    Auto,
    /// One-element sequence holding a solid image of the given size
    Solid { color: [u8; 3], size: Option<(u32, u32)> },
    /// The request image, inverted, as a `Single`
    Inverted,
    /// The request image encoded as an `HWC` byte-range tensor
    Tensor,
    /// A result the normalizer cannot understand
    Unrecognized,
}

/// Mock generative backend for testing
#[derive(Debug, Clone)]
pub struct MockGenerativeBackend {
    name: String,
    initialized: bool,
    supported: Vec<Strategy>,
    output: MockOutput,
    delay: Option<Duration>,
    history: CallHistory,
    should_fail_init: bool,
    should_fail_inference: bool,
    should_panic: bool,
    panic_once: bool,
}

impl MockGenerativeBackend {
    /// Create a new mock backend supporting every strategy
    #[must_use]
    pub fn new() -> Self {
        Self {
            name: "mock-generative".to_string(),
            initialized: false,
            supported: Strategy::ALL.to_vec(),
            output: MockOutput::Auto,
            delay: None,
            history: CallHistory::default(),
            should_fail_init: false,
            should_fail_inference: false,
            should_panic: false,
            panic_once: false,
        }
    }

    /// Create a mock backend that will fail during initialization
    #[must_use]
    pub fn new_failing_init() -> Self {
        let mut backend = Self::new();
        backend.should_fail_init = true;
        backend
    }

    /// Create a mock backend that will fail during inference
    #[must_use]
    pub fn new_failing_inference() -> Self {
        let mut backend = Self::new();
        backend.should_fail_inference = true;
        backend
    }

    /// Create a mock backend that panics inside inference
    #[must_use]
    pub fn new_panicking() -> Self {
        let mut backend = Self::new();
        backend.should_panic = true;
        backend
    }

    /// Create a mock backend whose first inference panics and later ones succeed
    #[must_use]
    pub fn new_panicking_once() -> Self {
        let mut backend = Self::new_panicking();
        backend.panic_once = true;
        backend
    }

    #[must_use]
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    #[must_use]
    pub fn with_supported(mut self, strategies: &[Strategy]) -> Self {
        self.supported = strategies.to_vec();
        self
    }

    #[must_use]
    pub fn with_output(mut self, output: MockOutput) -> Self {
        self.output = output;
        self
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Handle onto the call history that survives moving the backend
    #[must_use]
    pub fn history(&self) -> CallHistory {
        self.history.clone()
    }

    fn generate_mock_output(&self, request: &GenerationRequest) -> RawOutput {
        let (width, height) = (request.image.width(), request.image.height());
        match &self.output {
            MockOutput::Auto if request.strategy == Strategy::BackgroundRemoval => {
                // Left half is "background"
                let rgb = request.image.to_rgb8();
                let cutout = RgbaImage::from_fn(width, height, |x, y| {
                    let pixel = rgb.get_pixel(x, y);
                    let alpha = if x < width / 2 { 0 } else { 255 };
                    Rgba([pixel[0], pixel[1], pixel[2], alpha])
                });
                RawOutput::Single(DynamicImage::ImageRgba8(cutout))
            },
            MockOutput::Auto => RawOutput::Sequence(vec![DynamicImage::ImageRgb8(
                RgbImage::from_pixel(width, height, Rgb([128, 128, 128])),
            )]),
            MockOutput::Solid { color, size } => {
                let (w, h) = size.unwrap_or((width, height));
                RawOutput::Sequence(vec![DynamicImage::ImageRgb8(RgbImage::from_pixel(
                    w,
                    h,
                    Rgb(*color),
                ))])
            },
            MockOutput::Inverted => {
                let mut image = request.image.clone();
                image.invert();
                RawOutput::Single(image)
            },
            MockOutput::Tensor => {
                let rgb = request.image.to_rgb8();
                let values: Vec<f32> = rgb.as_raw().iter().map(|&v| f32::from(v)).collect();
                let data = Array3::from_shape_vec((height as usize, width as usize, 3), values)
                    .unwrap()
                    .into_dyn();
                RawOutput::Tensor {
                    data,
                    range: ValueRange::Byte,
                }
            },
            MockOutput::Unrecognized => {
                RawOutput::Unrecognized("mapping with keys [nsfw_content_detected]".to_string())
            },
        }
    }
}

impl Default for MockGenerativeBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl GenerativeBackend for MockGenerativeBackend {
    fn initialize(&mut self, _config: &GenerationConfig) -> Result<Option<Duration>> {
        self.history.record_call("initialize".to_string());

        if self.should_fail_init {
            return Err(RoomcraftError::inference(
                "Mock backend initialization failed",
            ));
        }

        self.initialized = true;
        Ok(Some(Duration::from_millis(150)))
    }

    fn infer(&mut self, request: &GenerationRequest) -> Result<RawOutput> {
        self.history.record_call(format!("infer:{}", request.strategy));
        self.history.record_request(request);

        if !self.initialized {
            return Err(RoomcraftError::inference("Mock backend not initialized"));
        }

        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }

        if self.should_panic {
            if self.panic_once {
                self.should_panic = false;
            }
            panic!("Mock backend panicked during inference");
        }

        if self.should_fail_inference {
            return Err(RoomcraftError::inference("Mock backend inference failed"));
        }

        Ok(self.generate_mock_output(request))
    }

    fn supports(&self, strategy: Strategy) -> bool {
        self.supported.contains(&strategy)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::CanvasSize;

    fn request(strategy: Strategy) -> GenerationRequest {
        GenerationRequest::new(
            strategy,
            DynamicImage::ImageRgb8(RgbImage::from_pixel(6, 4, Rgb([10, 20, 30]))),
            CanvasSize::new(6, 4).unwrap(),
        )
    }

    #[test]
    fn test_mock_requires_initialization() {
        let mut backend = MockGenerativeBackend::new();
        assert!(!backend.is_initialized());
        assert!(backend.infer(&request(Strategy::Refinement)).is_err());

        backend.initialize(&GenerationConfig::default()).unwrap();
        assert!(backend.is_initialized());
        assert!(backend.infer(&request(Strategy::Refinement)).is_ok());
    }

    #[test]
    fn test_mock_records_requests() {
        let mut backend = MockGenerativeBackend::new();
        let history = backend.history();
        backend.initialize(&GenerationConfig::default()).unwrap();
        backend
            .infer(&request(Strategy::Refinement).with_strength(0.15))
            .unwrap();

        let recorded = history.requests();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].image_dimensions, (6, 4));
        assert_eq!(recorded[0].strength, Some(0.15));

        history.clear();
        assert!(history.calls().is_empty());
    }

    #[test]
    fn test_mock_output_shapes() {
        let mut backend = MockGenerativeBackend::new();
        backend.initialize(&GenerationConfig::default()).unwrap();
        assert!(matches!(
            backend.infer(&request(Strategy::BackgroundRemoval)).unwrap(),
            RawOutput::Single(DynamicImage::ImageRgba8(_))
        ));

        let mut backend = backend.with_output(MockOutput::Tensor);
        assert!(matches!(
            backend.infer(&request(Strategy::Erasure)).unwrap(),
            RawOutput::Tensor { .. }
        ));
    }
}
