#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]

//! # Roomcraft
//!
//! Region-guided image generation for interior photos: furniture placement by
//! mask inpainting, light whole-image refinement, edge-conditioned restyling,
//! object erasure and background removal, all driven through black-box
//! generative backends.
//!
//! Every request runs through one orchestrator, [`InpaintProcessor`]:
//! decode, resolve the canvas, validate regions, rasterize and feather the
//! region mask, invoke the strategy's model handle, normalize whatever shape
//! the backend returned, and composite the result over the input under the
//! mask.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use roomcraft::{
//!     BackendSettings, GenerationConfig, InpaintProcessor, InpaintRequest, Region, Strategy,
//! };
//!
//! # async fn example(photo: Vec<u8>) -> anyhow::Result<()> {
//! let settings = BackendSettings::remote("http://127.0.0.1:7860", 300);
//! let processor = InpaintProcessor::from_settings(&settings, GenerationConfig::default())?;
//!
//! let request = InpaintRequest::new(Strategy::Erasure, photo)
//!     .with_regions(vec![Region::new(50, 50, 100, 80)]);
//! let (png, result) = processor.process_to_png(request).await?;
//! println!("{} bytes at {}", png.len(), result.canvas);
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `remote` (default): Stable Diffusion web-UI compatible HTTP backend
//! - `onnx`: local ONNX Runtime backends for background removal and erasure
//! - `server` (default): axum HTTP server and the `roomcraft-server` binary
//! - `tracing-json`: JSON log output for the server
//! - `webp-support`: WebP input decoding
//!
//! ### Library-Only Usage
//!
//! ```toml
//! [dependencies]
//! roomcraft = { version = "0.1", default-features = false, features = ["remote"] }
//! ```

pub mod backends;
pub mod canvas;
pub mod compositor;
pub mod config;
pub mod error;
pub mod inference;
pub mod mask;
pub mod normalizer;
pub mod processor;
#[cfg(feature = "server")]
pub mod server;
pub mod services;
pub mod tracing_config;
pub mod types;
pub mod utils;

// Public API exports
pub use backends::*;
pub use canvas::{fit_regions, CanvasRequest, CanvasSize, Region};
pub use compositor::AlphaCompositor;
pub use config::{BackendKind, BackendSettings, GenerationConfig, RegionPolicy};
pub use error::{Result, RoomcraftError};
pub use inference::{GenerativeBackend, HandleRegistry, HandleRegistryBuilder, ModelHandle};
pub use mask::RegionMask;
pub use normalizer::OutputNormalizer;
pub use processor::{
    build_registry, BackendFactory, DefaultBackendFactory, InpaintProcessor, InpaintRequest,
    InpaintResult,
};
pub use services::ImageIOService;
pub use types::{GenerationRequest, ProcessingTimings, RawOutput, Strategy, ValueRange};
pub use utils::{ImagePreprocessor, TensorNormalization};

pub use tracing_config::{filter_directive, spans, LogFormat};
#[cfg(feature = "server")]
pub use tracing_config::init_server_tracing;
