//! ONNX Runtime backends for local background removal and erasure
//!
//! Both backends run a single session on the CPU execution provider. Input
//! and output tensors are exchanged positionally, so models only need to keep
//! the expected input order (image first, then mask).

use crate::{
    config::GenerationConfig,
    error::{Result, RoomcraftError},
    inference::GenerativeBackend,
    types::{GenerationRequest, RawOutput, Strategy, ValueRange},
    utils::{ImagePreprocessor, TensorNormalization},
};
use image::{imageops::FilterType, DynamicImage, GrayImage, Rgba, RgbaImage};
use ndarray::{ArrayD, ArrayViewD, Axis};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::{self, value::Value};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Default square input size of ISNet-style segmentation models
pub const SEGMENTATION_INPUT_SIZE: u32 = 1024;
/// Default square input size of LaMa-style erasure models
pub const ERASURE_INPUT_SIZE: u32 = 512;
/// Upper bound on explicitly requested intra-op threads
const MAX_INTRA_THREADS: usize = 256;

/// Build a CPU session for the model file
fn load_session(model_path: &Path, intra_threads: usize) -> Result<(Session, std::time::Duration)> {
    let model_load_start = Instant::now();
    if !model_path.exists() {
        return Err(RoomcraftError::model_unavailable(format!(
            "ONNX model not found at {}",
            model_path.display()
        )));
    }

    let intra_threads = if intra_threads > MAX_INTRA_THREADS {
        return Err(RoomcraftError::invalid_config(format!(
            "{} intra-op threads requested for {}, at most {} are supported",
            intra_threads,
            model_path.display(),
            MAX_INTRA_THREADS
        )));
    } else if intra_threads > 0 {
        intra_threads
    } else {
        std::thread::available_parallelism()
            .map(std::num::NonZero::get)
            .unwrap_or(4)
    };

    let session = Session::builder()
        .map_err(|e| RoomcraftError::inference(format!("Failed to create session builder: {e}")))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| RoomcraftError::inference(format!("Failed to set optimization level: {e}")))?
        .with_intra_threads(intra_threads)
        .map_err(|e| RoomcraftError::inference(format!("Failed to set intra threads: {e}")))?
        .commit_from_file(model_path)
        .map_err(|e| {
            RoomcraftError::inference(format!(
                "Failed to create session from {}: {e}",
                model_path.display()
            ))
        })?;

    log::debug!("ONNX Runtime session created for {}", model_path.display());
    log::debug!("  - Threading: {intra_threads} intra-op threads");
    log::debug!("  - Optimization level: Level3");

    Ok((session, model_load_start.elapsed()))
}

/// Run the session and copy out its first output
fn run_first_output(session: &mut Session, inputs: Vec<Value>) -> Result<ArrayD<f32>> {
    let core_inference_start = Instant::now();
    let outputs = match inputs.len() {
        1 => {
            let mut inputs = inputs.into_iter();
            let image = inputs
                .next()
                .ok_or_else(|| RoomcraftError::internal("Missing image input tensor"))?;
            session.run(ort::inputs![image])
        },
        _ => {
            let mut inputs = inputs.into_iter();
            let (Some(image), Some(mask)) = (inputs.next(), inputs.next()) else {
                return Err(RoomcraftError::internal("Missing mask input tensor"));
            };
            session.run(ort::inputs![image, mask])
        },
    }
    .map_err(|e| RoomcraftError::inference(format!("ONNX inference failed: {e}")))?;

    log::debug!(
        "  Core inference: {:.2}ms",
        core_inference_start.elapsed().as_secs_f64() * 1000.0
    );

    let keys: Vec<_> = outputs.keys().collect();
    let first_key = keys
        .first()
        .ok_or_else(|| RoomcraftError::inference("No output tensors found"))?;
    let output = outputs
        .get(first_key)
        .ok_or_else(|| RoomcraftError::inference("First output tensor not found"))?
        .try_extract_array::<f32>()
        .map_err(|e| RoomcraftError::inference(format!("Failed to extract output tensor: {e}")))?;
    Ok(output.view().to_owned())
}

/// Salient-object segmentation (ISNet, U²-Net) producing an RGBA cut-out
#[derive(Debug)]
pub struct OnnxSegmentationBackend {
    model_path: PathBuf,
    input_size: u32,
    intra_threads: usize,
    normalization: TensorNormalization,
    session: Option<Session>,
}

impl OnnxSegmentationBackend {
    #[must_use]
    pub fn new<P: Into<PathBuf>>(model_path: P) -> Self {
        Self {
            model_path: model_path.into(),
            input_size: SEGMENTATION_INPUT_SIZE,
            intra_threads: 0,
            normalization: TensorNormalization::SEGMENTATION,
            session: None,
        }
    }

    /// Square model input size (1024 for ISNet, 320 for U²-Net)
    #[must_use]
    pub fn with_input_size(mut self, size: u32) -> Self {
        self.input_size = size;
        self
    }

    #[must_use]
    pub fn with_intra_threads(mut self, threads: usize) -> Self {
        self.intra_threads = threads;
        self
    }

    #[must_use]
    pub fn with_normalization(mut self, normalization: TensorNormalization) -> Self {
        self.normalization = normalization;
        self
    }
}

impl GenerativeBackend for OnnxSegmentationBackend {
    fn initialize(&mut self, _config: &GenerationConfig) -> Result<Option<instant::Duration>> {
        if self.session.is_some() {
            return Ok(None);
        }
        let (session, load_time) = load_session(&self.model_path, self.intra_threads)?;
        self.session = Some(session);
        Ok(Some(load_time))
    }

    fn infer(&mut self, request: &GenerationRequest) -> Result<RawOutput> {
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| RoomcraftError::internal("ONNX session not initialized"))?;

        let rgb = request.image.to_rgb8();
        let target = (self.input_size, self.input_size);
        let tensor = ImagePreprocessor::rgb_to_nchw(&rgb, target, &self.normalization)?;
        let input = Value::from_array(tensor)
            .map_err(|e| RoomcraftError::inference(format!("Failed to convert input tensor: {e}")))?;

        let output = run_first_output(session, vec![input.into_dyn()])?;
        let mask = probability_to_mask(&output.view(), rgb.dimensions())?;

        let cutout = RgbaImage::from_fn(rgb.width(), rgb.height(), |x, y| {
            let pixel = rgb.get_pixel(x, y);
            Rgba([pixel[0], pixel[1], pixel[2], mask.get_pixel(x, y)[0]])
        });
        Ok(RawOutput::Single(DynamicImage::ImageRgba8(cutout)))
    }

    fn supports(&self, strategy: Strategy) -> bool {
        strategy == Strategy::BackgroundRemoval
    }

    fn name(&self) -> &str {
        "onnx-segmentation"
    }

    fn is_initialized(&self) -> bool {
        self.session.is_some()
    }
}

/// LaMa-style erasure: image in `[0, 1]` plus binary mask, byte-range output
#[derive(Debug)]
pub struct OnnxErasureBackend {
    model_path: PathBuf,
    input_size: u32,
    intra_threads: usize,
    session: Option<Session>,
}

impl OnnxErasureBackend {
    #[must_use]
    pub fn new<P: Into<PathBuf>>(model_path: P) -> Self {
        Self {
            model_path: model_path.into(),
            input_size: ERASURE_INPUT_SIZE,
            intra_threads: 0,
            session: None,
        }
    }

    #[must_use]
    pub fn with_input_size(mut self, size: u32) -> Self {
        self.input_size = size;
        self
    }

    #[must_use]
    pub fn with_intra_threads(mut self, threads: usize) -> Self {
        self.intra_threads = threads;
        self
    }
}

impl GenerativeBackend for OnnxErasureBackend {
    fn initialize(&mut self, _config: &GenerationConfig) -> Result<Option<instant::Duration>> {
        if self.session.is_some() {
            return Ok(None);
        }
        let (session, load_time) = load_session(&self.model_path, self.intra_threads)?;
        self.session = Some(session);
        Ok(Some(load_time))
    }

    fn infer(&mut self, request: &GenerationRequest) -> Result<RawOutput> {
        let mask = request.require_mask()?;
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| RoomcraftError::internal("ONNX session not initialized"))?;

        let target = (self.input_size, self.input_size);
        let image_tensor = ImagePreprocessor::rgb_to_nchw(
            &request.image.to_rgb8(),
            target,
            &TensorNormalization::IDENTITY,
        )?;
        let mask_tensor = ImagePreprocessor::mask_to_nchw(mask, target);

        let image_value = Value::from_array(image_tensor)
            .map_err(|e| RoomcraftError::inference(format!("Failed to convert image tensor: {e}")))?;
        let mask_value = Value::from_array(mask_tensor)
            .map_err(|e| RoomcraftError::inference(format!("Failed to convert mask tensor: {e}")))?;

        let output = run_first_output(session, vec![image_value.into_dyn(), mask_value.into_dyn()])?;
        Ok(RawOutput::Tensor {
            data: output,
            range: ValueRange::Byte,
        })
    }

    fn supports(&self, strategy: Strategy) -> bool {
        strategy == Strategy::Erasure
    }

    fn name(&self) -> &str {
        "onnx-lama"
    }

    fn is_initialized(&self) -> bool {
        self.session.is_some()
    }
}

/// Min-max normalize a `[1, 1, H, W]` probability map into an alpha mask of the given size
fn probability_to_mask(output: &ArrayViewD<'_, f32>, size: (u32, u32)) -> Result<GrayImage> {
    let mut view = output.view();
    while view.ndim() > 2 && view.len_of(Axis(0)) == 1 {
        view = view.index_axis_move(Axis(0), 0);
    }
    if view.ndim() != 2 {
        return Err(RoomcraftError::unsupported_output(format!(
            "segmentation output with shape {:?}",
            output.shape()
        )));
    }

    let (height, width) = (view.len_of(Axis(0)), view.len_of(Axis(1)));
    let (min, max) = view.iter().fold((f32::MAX, f32::MIN), |(lo, hi), &v| {
        (lo.min(v), hi.max(v))
    });
    let span = (max - min).max(f32::EPSILON);

    let raw: Vec<u8> = view
        .iter()
        .map(|&v| (((v - min) / span) * 255.0).round().clamp(0.0, 255.0) as u8)
        .collect();
    let mask = GrayImage::from_raw(width as u32, height as u32, raw)
        .ok_or_else(|| RoomcraftError::internal("Segmentation mask buffer size mismatch"))?;

    if mask.dimensions() == size {
        return Ok(mask);
    }
    Ok(image::imageops::resize(&mask, size.0, size.1, FilterType::Triangle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use ndarray::Array4;

    #[test]
    fn test_probability_to_mask_normalizes_and_resizes() {
        let mut output = Array4::<f32>::zeros((1, 1, 4, 4));
        output[[0, 0, 0, 0]] = 0.2;
        output[[0, 0, 3, 3]] = 0.8;
        let output = output.into_dyn();

        let mask = probability_to_mask(&output.view(), (4, 4)).unwrap();
        assert_eq!(mask.get_pixel(3, 3), &Luma([255]));
        assert_eq!(mask.get_pixel(1, 1), &Luma([0]));

        let resized = probability_to_mask(&output.view(), (16, 8)).unwrap();
        assert_eq!(resized.dimensions(), (16, 8));
    }

    #[test]
    fn test_probability_to_mask_rejects_multi_channel() {
        let output = Array4::<f32>::zeros((1, 3, 4, 4)).into_dyn();
        assert!(matches!(
            probability_to_mask(&output.view(), (4, 4)),
            Err(RoomcraftError::UnsupportedOutputShape(_))
        ));
    }

    #[test]
    fn test_missing_model_is_unavailable() {
        let mut backend = OnnxSegmentationBackend::new("/nonexistent/isnet.onnx");
        let err = backend.initialize(&GenerationConfig::default()).unwrap_err();
        assert!(matches!(err, RoomcraftError::ModelUnavailable(_)));
        assert!(!backend.is_initialized());
    }

    #[test]
    fn test_backend_strategy_support() {
        assert!(OnnxSegmentationBackend::new("m.onnx").supports(Strategy::BackgroundRemoval));
        assert!(!OnnxSegmentationBackend::new("m.onnx").supports(Strategy::Erasure));
        assert!(OnnxErasureBackend::new("m.onnx").supports(Strategy::Erasure));
        assert!(!OnnxErasureBackend::new("m.onnx").supports(Strategy::Refinement));
    }
}
