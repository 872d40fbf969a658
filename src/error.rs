//! Error types for region-guided generation

use thiserror::Error;

/// Result type alias for roomcraft operations
pub type Result<T> = std::result::Result<T, RoomcraftError>;

/// Error taxonomy shared by every pipeline stage
#[derive(Error, Debug)]
pub enum RoomcraftError {
    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Input image could not be decoded or has zero dimensions
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    /// Region list is malformed or a region does not fit the canvas
    #[error("Invalid region: {0}")]
    InvalidRegion(String),

    /// Requested canvas size is unusable
    #[error("Invalid canvas: {0}")]
    InvalidCanvas(String),

    /// Request is missing a required field or carries an unknown value
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Request body exceeds the configured upload limit
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    /// Mask and image sizes disagree inside a single request
    #[error("Dimension mismatch in {stage}: expected {}x{}, got {}x{}", .expected.0, .expected.1, .actual.0, .actual.1)]
    DimensionMismatch {
        stage: &'static str,
        expected: (u32, u32),
        actual: (u32, u32),
    },

    /// Model handle could not be created or is not registered
    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    /// Device or runtime fault during a single inference call
    #[error("Inference failed: {0}")]
    InferenceFailure(String),

    /// Backend returned a result shape the normalizer does not understand
    #[error("Unsupported output shape: {0}")]
    UnsupportedOutputShape(String),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RoomcraftError {
    pub fn invalid_image<S: Into<String>>(msg: S) -> Self {
        Self::InvalidImage(msg.into())
    }

    pub fn invalid_region<S: Into<String>>(msg: S) -> Self {
        Self::InvalidRegion(msg.into())
    }

    pub fn invalid_canvas<S: Into<String>>(msg: S) -> Self {
        Self::InvalidCanvas(msg.into())
    }

    pub fn invalid_request<S: Into<String>>(msg: S) -> Self {
        Self::InvalidRequest(msg.into())
    }

    pub fn payload_too_large<S: Into<String>>(msg: S) -> Self {
        Self::PayloadTooLarge(msg.into())
    }

    pub fn model_unavailable<S: Into<String>>(msg: S) -> Self {
        Self::ModelUnavailable(msg.into())
    }

    pub fn inference<S: Into<String>>(msg: S) -> Self {
        Self::InferenceFailure(msg.into())
    }

    pub fn unsupported_output<S: Into<String>>(msg: S) -> Self {
        Self::UnsupportedOutputShape(msg.into())
    }

    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a dimension mismatch error for the named stage
    #[must_use]
    pub fn dimension_mismatch(stage: &'static str, expected: (u32, u32), actual: (u32, u32)) -> Self {
        Self::DimensionMismatch {
            stage,
            expected,
            actual,
        }
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
    ) -> Self {
        Self::InvalidConfig(format!(
            "Invalid {}: {} (valid range: {})",
            parameter, value, valid_range
        ))
    }

    /// Whether the error was caused by the caller's input
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidImage(_)
                | Self::InvalidRegion(_)
                | Self::InvalidCanvas(_)
                | Self::InvalidRequest(_)
                | Self::PayloadTooLarge(_)
        )
    }

    /// Short machine-readable name of the error kind
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Io(_) => "io",
            Self::InvalidImage(_) => "invalid_image",
            Self::InvalidRegion(_) => "invalid_region",
            Self::InvalidCanvas(_) => "invalid_canvas",
            Self::InvalidRequest(_) => "invalid_request",
            Self::PayloadTooLarge(_) => "payload_too_large",
            Self::DimensionMismatch { .. } => "dimension_mismatch",
            Self::ModelUnavailable(_) => "model_unavailable",
            Self::InferenceFailure(_) => "inference_failure",
            Self::UnsupportedOutputShape(_) => "unsupported_output_shape",
            Self::InvalidConfig(_) => "invalid_config",
            Self::Internal(_) => "internal",
        }
    }
}
