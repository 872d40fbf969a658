//! HTTP rendering of pipeline errors

use crate::error::RoomcraftError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

/// JSON body returned for every failed request
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

/// Pipeline error on its way to the client
#[derive(Debug)]
pub struct ApiError(pub RoomcraftError);

impl ApiError {
    /// Status code for the wrapped error
    #[must_use]
    pub fn status(&self) -> StatusCode {
        status_for(&self.0)
    }
}

/// Oversized bodies → 413, other client mistakes → 400, missing models → 503,
/// everything else → 500
#[must_use]
pub fn status_for(err: &RoomcraftError) -> StatusCode {
    if matches!(err, RoomcraftError::PayloadTooLarge(_)) {
        StatusCode::PAYLOAD_TOO_LARGE
    } else if err.is_client_error() {
        StatusCode::BAD_REQUEST
    } else if matches!(err, RoomcraftError::ModelUnavailable(_)) {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

impl From<RoomcraftError> for ApiError {
    fn from(err: RoomcraftError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self.0 {
            RoomcraftError::DimensionMismatch { .. } | RoomcraftError::Internal(_) => {
                error!(kind = self.0.kind(), "{}", self.0);
            },
            err if err.is_client_error() => debug!(kind = err.kind(), "Rejected request: {}", err),
            err => warn!(kind = err.kind(), "Request failed: {}", err),
        }

        let body = ErrorBody {
            error: self.0.kind().to_string(),
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
