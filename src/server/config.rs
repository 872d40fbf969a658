//! Server command-line arguments and their conversion into library configuration

use crate::{
    config::{BackendKind, BackendSettings, GenerationConfig},
    error::Result,
    types::Strategy,
};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Region-guided inpainting HTTP server
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(name = "roomcraft-server")]
pub struct ServerArgs {
    /// Address to bind
    #[arg(long, env = "ROOMCRAFT_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "ROOMCRAFT_PORT", default_value_t = 8000)]
    pub port: u16,

    /// Maximum request body size in megabytes
    #[arg(long, env = "ROOMCRAFT_BODY_LIMIT_MB", default_value_t = 25)]
    pub body_limit_mb: usize,

    /// Per-request timeout in seconds; in-flight inference still runs to completion
    #[arg(long, env = "ROOMCRAFT_REQUEST_TIMEOUT", default_value_t = 600)]
    pub request_timeout_secs: u64,

    /// Base URL of the Stable Diffusion web-UI compatible service
    #[arg(long, env = "ROOMCRAFT_REMOTE_URL", default_value = "http://127.0.0.1:7860")]
    pub remote_url: String,

    /// Timeout for one remote generation call in seconds
    #[arg(long, env = "ROOMCRAFT_REMOTE_TIMEOUT", default_value_t = 300)]
    pub remote_timeout_secs: u64,

    /// ControlNet model used for edge-conditioned generation
    #[arg(long, env = "ROOMCRAFT_CONTROLNET_MODEL", default_value = "control_v11p_sd15_canny")]
    pub controlnet_model: String,

    /// rembg model used by remote background removal
    #[arg(long, env = "ROOMCRAFT_REMBG_MODEL", default_value = "u2net")]
    pub rembg_model: String,

    /// Serve background removal from a local ONNX segmentation model
    #[arg(long, env = "ROOMCRAFT_SEGMENTATION_MODEL", value_name = "PATH")]
    pub segmentation_model: Option<PathBuf>,

    /// Serve erasure from a local ONNX LaMa model
    #[arg(long, env = "ROOMCRAFT_ERASURE_MODEL", value_name = "PATH")]
    pub erasure_model: Option<PathBuf>,

    /// Strategies this process does not serve (comma separated)
    #[arg(long, value_delimiter = ',', value_name = "STRATEGY")]
    pub disable: Vec<Strategy>,

    /// Generation config JSON file (defaults apply when absent)
    #[arg(short, long, env = "ROOMCRAFT_CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Emit JSON logs
    #[arg(long, env = "ROOMCRAFT_JSON_LOGS")]
    pub json_logs: bool,
}

impl ServerArgs {
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    #[must_use]
    pub fn body_limit_bytes(&self) -> usize {
        self.body_limit_mb.saturating_mul(1024 * 1024)
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Backend wiring implied by the arguments
    #[must_use]
    pub fn backend_settings(&self) -> BackendSettings {
        let mut settings = BackendSettings::remote(self.remote_url.clone(), self.remote_timeout_secs);
        settings.controlnet_model.clone_from(&self.controlnet_model);
        settings.rembg_model.clone_from(&self.rembg_model);

        if let Some(path) = &self.segmentation_model {
            settings = settings.with_kind(
                Strategy::BackgroundRemoval,
                BackendKind::Onnx {
                    model_path: path.clone(),
                },
            );
        }
        if let Some(path) = &self.erasure_model {
            settings = settings.with_kind(
                Strategy::Erasure,
                BackendKind::Onnx {
                    model_path: path.clone(),
                },
            );
        }
        for strategy in &self.disable {
            settings = settings.with_kind(*strategy, BackendKind::Disabled);
        }
        settings
    }

    /// Load the generation config file, or the defaults
    ///
    /// # Errors
    /// Returns the file's read, parse or validation error
    pub fn generation_config(&self) -> Result<GenerationConfig> {
        match &self.config {
            Some(path) => GenerationConfig::from_json_file(path),
            None => Ok(GenerationConfig::default()),
        }
    }
}
