//! HTTP backend for Stable Diffusion web-UI compatible generation services
//!
//! Images travel as base64 PNG inside JSON bodies. Inpainting, erasure and
//! refinement use `img2img`, edge-conditioned generation uses `txt2img` with
//! a ControlNet unit, and background removal uses the `rembg` extension.

use crate::{
    config::GenerationConfig,
    error::{Result, RoomcraftError},
    inference::GenerativeBackend,
    services::ImageIOService,
    types::{GenerationRequest, RawOutput, Strategy},
};
use base64::{engine::general_purpose, Engine};
use image::{DynamicImage, GrayImage};
use instant::{Duration, Instant};
use serde_json::{json, Value};

const IMG2IMG_PATH: &str = "/sdapi/v1/img2img";
const TXT2IMG_PATH: &str = "/sdapi/v1/txt2img";
const REMBG_PATH: &str = "/rembg";

/// Denoising strength used for prompted inpainting when the request sets none
const INPAINT_DENOISING: f32 = 0.75;
/// Erasure regenerates the masked region completely
const ERASURE_DENOISING: f32 = 1.0;

/// Runtime used to drive the async client from the blocking inference thread
enum ClientRuntime {
    Shared(tokio::runtime::Handle),
    Owned(tokio::runtime::Runtime),
}

impl ClientRuntime {
    fn acquire() -> Result<Self> {
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            return Ok(Self::Shared(handle));
        }
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map(Self::Owned)
            .map_err(|e| {
                RoomcraftError::model_unavailable(format!("Failed to start HTTP runtime: {}", e))
            })
    }

    fn block_on<F: std::future::Future>(&self, future: F) -> F::Output {
        match self {
            Self::Shared(handle) => handle.block_on(future),
            Self::Owned(runtime) => runtime.block_on(future),
        }
    }
}

/// Remote generation backend serving any of the five strategies
pub struct RemoteBackend {
    base_url: String,
    timeout: Duration,
    controlnet_model: String,
    rembg_model: String,
    steps: u32,
    guidance_scale: f32,
    client: Option<reqwest::Client>,
    runtime: Option<ClientRuntime>,
}

impl std::fmt::Debug for RemoteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteBackend")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("initialized", &self.is_initialized())
            .finish_non_exhaustive()
    }
}

impl RemoteBackend {
    #[must_use]
    pub fn new<S: Into<String>>(base_url: S, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
            controlnet_model: "control_v11p_sd15_canny".to_string(),
            rembg_model: "u2net".to_string(),
            steps: 30,
            guidance_scale: 6.5,
            client: None,
            runtime: None,
        }
    }

    #[must_use]
    pub fn with_controlnet_model<S: Into<String>>(mut self, model: S) -> Self {
        self.controlnet_model = model.into();
        self
    }

    #[must_use]
    pub fn with_rembg_model<S: Into<String>>(mut self, model: S) -> Self {
        self.rembg_model = model.into();
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Endpoint path and JSON body for one request
    ///
    /// # Errors
    /// - Mask-guided strategy without a mask
    /// - Edge-conditioned strategy without a control image
    /// - PNG encoding failure
    pub fn build_payload(&self, request: &GenerationRequest) -> Result<(&'static str, Value)> {
        let prompt = request.prompt.clone().unwrap_or_default();
        let cfg_scale = request.guidance_scale.unwrap_or(self.guidance_scale);
        let (width, height) = request.canvas.dimensions();

        let payload = match request.strategy {
            Strategy::Refinement => (
                IMG2IMG_PATH,
                json!({
                    "init_images": [encode_image(&request.image)?],
                    "prompt": prompt,
                    "denoising_strength": request.strength.unwrap_or(0.15),
                    "cfg_scale": cfg_scale,
                    "steps": self.steps,
                    "width": width,
                    "height": height,
                }),
            ),
            Strategy::MaskInpaint | Strategy::Erasure => {
                let default_strength = if request.strategy == Strategy::Erasure {
                    ERASURE_DENOISING
                } else {
                    INPAINT_DENOISING
                };
                (
                    IMG2IMG_PATH,
                    json!({
                        "init_images": [encode_image(&request.image)?],
                        "mask": encode_mask(request.require_mask()?)?,
                        "prompt": prompt,
                        "denoising_strength": request.strength.unwrap_or(default_strength),
                        "cfg_scale": cfg_scale,
                        "steps": self.steps,
                        "width": width,
                        "height": height,
                        "mask_blur": 0,
                        "inpainting_fill": 1,
                        "inpaint_full_res": false,
                    }),
                )
            },
            Strategy::EdgeConditioned => {
                let control = request.control.as_ref().ok_or_else(|| {
                    RoomcraftError::internal("edge_conditioned request built without an edge map")
                })?;
                (
                    TXT2IMG_PATH,
                    json!({
                        "prompt": prompt,
                        "cfg_scale": cfg_scale,
                        "steps": self.steps,
                        "width": width,
                        "height": height,
                        "alwayson_scripts": {
                            "controlnet": {
                                "args": [{
                                    "image": encode_mask(control)?,
                                    "module": "none",
                                    "model": self.controlnet_model,
                                    "weight": 1.0,
                                }]
                            }
                        },
                    }),
                )
            },
            Strategy::BackgroundRemoval => (
                REMBG_PATH,
                json!({
                    "input_image": encode_image(&request.image)?,
                    "model": self.rembg_model,
                    "return_mask": false,
                    "alpha_matting": false,
                }),
            ),
        };
        Ok(payload)
    }

    /// Interpret a response body as a raw output
    ///
    /// # Errors
    /// Returns `RoomcraftError::InferenceFailure` when an advertised image
    /// cannot be decoded
    pub fn parse_response(body: &Value) -> Result<RawOutput> {
        if let Some(images) = body.get("images").and_then(Value::as_array) {
            let decoded = images
                .iter()
                .map(|entry| {
                    entry.as_str().map(decode_image).unwrap_or_else(|| {
                        Err(RoomcraftError::inference(
                            "Response image entry is not a base64 string",
                        ))
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            return Ok(RawOutput::Sequence(decoded));
        }
        if let Some(image) = body.get("image").and_then(Value::as_str) {
            return Ok(RawOutput::Single(decode_image(image)?));
        }

        let description = match body {
            Value::Object(map) => {
                let keys: Vec<&str> = map.keys().map(String::as_str).collect();
                format!("JSON object with keys [{}]", keys.join(", "))
            },
            Value::Array(items) => format!("JSON array of {} item(s)", items.len()),
            Value::Null => "JSON null".to_string(),
            other => format!("JSON scalar {}", other),
        };
        Ok(RawOutput::Unrecognized(description))
    }

    async fn post(client: &reqwest::Client, url: String, payload: Value) -> Result<Value> {
        let response = client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| RoomcraftError::inference(format!("Request to {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let snippet: String = text.chars().take(200).collect();
            return Err(RoomcraftError::inference(format!(
                "{} returned HTTP {}: {}",
                url, status, snippet
            )));
        }

        response.json::<Value>().await.map_err(|e| {
            RoomcraftError::inference(format!("Invalid JSON from {}: {}", url, e))
        })
    }
}

impl GenerativeBackend for RemoteBackend {
    fn initialize(&mut self, config: &GenerationConfig) -> Result<Option<Duration>> {
        if self.is_initialized() {
            return Ok(None);
        }
        let started = Instant::now();

        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(4)
            .build()
            .map_err(|e| {
                RoomcraftError::model_unavailable(format!("Failed to create HTTP client: {}", e))
            })?;

        self.steps = config.inference_steps;
        self.guidance_scale = config.guidance_scale;
        self.client = Some(client);
        self.runtime = Some(ClientRuntime::acquire()?);

        log::debug!(
            "Remote backend ready for {} (timeout {}s)",
            self.base_url,
            self.timeout.as_secs()
        );
        Ok(Some(started.elapsed()))
    }

    fn infer(&mut self, request: &GenerationRequest) -> Result<RawOutput> {
        let (Some(client), Some(runtime)) = (self.client.as_ref(), self.runtime.as_ref()) else {
            return Err(RoomcraftError::inference("Remote backend not initialized"));
        };

        let (path, payload) = self.build_payload(request)?;
        let url = format!("{}{}", self.base_url, path);
        log::debug!("POST {} for {}", url, request.strategy);

        let body = runtime.block_on(Self::post(client, url, payload))?;
        Self::parse_response(&body)
    }

    fn supports(&self, _strategy: Strategy) -> bool {
        true
    }

    fn name(&self) -> &str {
        "remote-sdapi"
    }

    fn is_initialized(&self) -> bool {
        self.client.is_some() && self.runtime.is_some()
    }
}

fn encode_image(image: &DynamicImage) -> Result<String> {
    Ok(general_purpose::STANDARD.encode(ImageIOService::encode_png(image)?))
}

fn encode_mask(mask: &GrayImage) -> Result<String> {
    encode_image(&DynamicImage::ImageLuma8(mask.clone()))
}

fn decode_image(data: &str) -> Result<DynamicImage> {
    // Some services prefix a data URL header
    let payload = data
        .split_once(";base64,")
        .map_or(data, |(_, encoded)| encoded);
    let bytes = general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| RoomcraftError::inference(format!("Invalid base64 image: {}", e)))?;
    ImageIOService::load_from_bytes(&bytes)
        .map_err(|e| RoomcraftError::inference(format!("Undecodable image in response: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::CanvasSize;
    use image::{Luma, Rgb, RgbImage};

    fn backend() -> RemoteBackend {
        RemoteBackend::new("http://127.0.0.1:7860/", Duration::from_secs(5))
    }

    fn request(strategy: Strategy) -> GenerationRequest {
        GenerationRequest::new(
            strategy,
            DynamicImage::ImageRgb8(RgbImage::from_pixel(16, 8, Rgb([9, 8, 7]))),
            CanvasSize::new(16, 8).unwrap(),
        )
        .with_prompt(Some("a green armchair".to_string()))
    }

    fn png_base64(color: [u8; 3]) -> String {
        encode_image(&DynamicImage::ImageRgb8(RgbImage::from_pixel(2, 2, Rgb(color)))).unwrap()
    }

    #[test]
    fn test_base_url_is_normalized() {
        assert_eq!(backend().base_url(), "http://127.0.0.1:7860");
    }

    #[test]
    fn test_refinement_payload() {
        let request = request(Strategy::Refinement)
            .with_strength(0.15)
            .with_guidance_scale(6.5);
        let (path, payload) = backend().build_payload(&request).unwrap();

        assert_eq!(path, IMG2IMG_PATH);
        assert_eq!(payload["prompt"], "a green armchair");
        assert!((payload["denoising_strength"].as_f64().unwrap() - 0.15).abs() < 1e-6);
        assert_eq!(payload["width"], 16);
        assert_eq!(payload["height"], 8);
        assert!(payload.get("mask").is_none());
    }

    #[test]
    fn test_erasure_payload_carries_mask() {
        let request = request(Strategy::Erasure).with_mask(GrayImage::from_pixel(16, 8, Luma([255])));
        let (path, payload) = backend().build_payload(&request).unwrap();

        assert_eq!(path, IMG2IMG_PATH);
        assert!(payload["mask"].as_str().is_some());
        assert_eq!(payload["mask_blur"], 0);
        assert!((payload["denoising_strength"].as_f64().unwrap() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_inpaint_payload_requires_mask() {
        let err = backend().build_payload(&request(Strategy::MaskInpaint)).unwrap_err();
        assert!(matches!(err, RoomcraftError::Internal(_)));
    }

    #[test]
    fn test_edge_payload_uses_controlnet() {
        let request = request(Strategy::EdgeConditioned).with_control(GrayImage::new(16, 8));
        let (path, payload) = backend()
            .with_controlnet_model("control_canny")
            .build_payload(&request)
            .unwrap();

        assert_eq!(path, TXT2IMG_PATH);
        let unit = &payload["alwayson_scripts"]["controlnet"]["args"][0];
        assert_eq!(unit["model"], "control_canny");
        assert_eq!(unit["module"], "none");
    }

    #[test]
    fn test_background_removal_payload() {
        let (path, payload) = backend()
            .with_rembg_model("isnet-general-use")
            .build_payload(&request(Strategy::BackgroundRemoval))
            .unwrap();
        assert_eq!(path, REMBG_PATH);
        assert_eq!(payload["model"], "isnet-general-use");
        assert!(payload.get("prompt").is_none());
    }

    #[test]
    fn test_parse_response_shapes() {
        let images = json!({ "images": [png_base64([1, 2, 3]), png_base64([4, 5, 6])], "info": "{}" });
        match RemoteBackend::parse_response(&images).unwrap() {
            RawOutput::Sequence(list) => assert_eq!(list.len(), 2),
            other => panic!("expected sequence, got {}", other.describe()),
        }

        let single = json!({ "image": format!("data:image/png;base64,{}", png_base64([7, 7, 7])) });
        assert!(matches!(
            RemoteBackend::parse_response(&single).unwrap(),
            RawOutput::Single(_)
        ));

        let other = json!({ "detail": "Not Found" });
        match RemoteBackend::parse_response(&other).unwrap() {
            RawOutput::Unrecognized(description) => assert!(description.contains("detail")),
            other => panic!("expected unrecognized, got {}", other.describe()),
        }
    }

    #[test]
    fn test_parse_response_rejects_garbage_images() {
        let body = json!({ "images": ["%%% not base64 %%%"] });
        assert!(matches!(
            RemoteBackend::parse_response(&body),
            Err(RoomcraftError::InferenceFailure(_))
        ));

        let body = json!({ "images": [42] });
        assert!(RemoteBackend::parse_response(&body).is_err());
    }

    #[test]
    fn test_infer_before_initialize_fails() {
        let mut backend = backend();
        assert!(!backend.is_initialized());
        assert!(matches!(
            backend.infer(&request(Strategy::Refinement)),
            Err(RoomcraftError::InferenceFailure(_))
        ));
    }

    #[test]
    fn test_unreachable_service_is_inference_failure() {
        // Port 9 (discard) is closed on test hosts
        let mut backend = RemoteBackend::new("http://127.0.0.1:9", Duration::from_secs(2));
        backend.initialize(&GenerationConfig::default()).unwrap();
        assert!(matches!(
            backend.infer(&request(Strategy::Refinement)),
            Err(RoomcraftError::InferenceFailure(_))
        ));
    }
}
