//! HTTP surface for the generation pipeline
//!
//! This module is only available when the "server" feature is enabled.

mod config;
mod error;
mod form;

pub use config::ServerArgs;
pub use error::{status_for, ApiError, ErrorBody};
pub use form::InpaintForm;

use crate::{
    processor::{InpaintProcessor, InpaintRequest},
    tracing_config::{init_server_tracing, spans},
    types::Strategy,
};
use anyhow::Context;
use axum::{
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Multipart, State},
    http::{header, HeaderValue},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{info, Instrument};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub processor: Arc<InpaintProcessor>,
}

impl AppState {
    #[must_use]
    pub fn new(processor: InpaintProcessor) -> Self {
        Self {
            processor: Arc::new(processor),
        }
    }
}

/// Transport limits applied by the router layers
#[derive(Debug, Clone, Copy)]
pub struct RouterOptions {
    pub body_limit: usize,
    pub request_timeout: Duration,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            body_limit: 25 * 1024 * 1024,
            request_timeout: Duration::from_secs(600),
        }
    }
}

/// Build the router with every generation route
pub fn router(state: AppState, options: RouterOptions) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/inpaint/", post(inpaint))
        .route("/inpaint_erasure/", post(inpaint_erasure))
        .route("/remove_bg/", post(remove_bg))
        .with_state(state)
        .layer(DefaultBodyLimit::max(options.body_limit))
        .layer(TimeoutLayer::new(options.request_timeout))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let strategies: Vec<&str> = state
        .processor
        .registry()
        .strategies()
        .into_iter()
        .map(Strategy::as_str)
        .collect();
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "strategies": strategies,
    }))
}

/// Refinement by default; `mode` selects mask inpainting or edge-conditioned generation
async fn inpaint(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    let form = read_form(multipart).await?;
    let strategy = form.inpaint_strategy()?;
    generate(&state, "/inpaint/", form.into_request(strategy)?).await
}

async fn inpaint_erasure(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    let form = read_form(multipart).await?;
    generate(&state, "/inpaint_erasure/", form.into_request(Strategy::Erasure)?).await
}

async fn remove_bg(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    let form = read_form(multipart).await?;
    generate(
        &state,
        "/remove_bg/",
        form.into_request(Strategy::BackgroundRemoval)?,
    )
    .await
}

async fn read_form(multipart: Result<Multipart, MultipartRejection>) -> Result<InpaintForm, ApiError> {
    let multipart = multipart.map_err(|e| {
        crate::error::RoomcraftError::invalid_request(format!("Expected multipart/form-data: {}", e))
    })?;
    Ok(InpaintForm::from_multipart(multipart).await?)
}

async fn generate(state: &AppState, route: &str, request: InpaintRequest) -> Result<Response, ApiError> {
    let request_id = uuid::Uuid::new_v4().to_string();
    let (png, result) = state
        .processor
        .process_to_png(request)
        .instrument(spans::request(&request_id, route))
        .await?;

    let mut response = ([(header::CONTENT_TYPE, "image/png")], png).into_response();
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        headers.insert("x-request-id", value);
    }
    headers.insert(
        "x-processing-ms",
        HeaderValue::from(result.timings.total_ms + result.timings.encode_ms),
    );
    Ok(response)
}

/// Bind and serve until Ctrl-C
pub async fn serve(args: &ServerArgs, processor: InpaintProcessor) -> anyhow::Result<()> {
    let options = RouterOptions {
        body_limit: args.body_limit_bytes(),
        request_timeout: args.request_timeout(),
    };
    let app = router(AppState::new(processor), options);

    let addr = args.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Server listening on http://{}", addr);
    info!("  GET  /health");
    info!("  POST /inpaint/          (mode: refine | inpaint | edge)");
    info!("  POST /inpaint_erasure/");
    info!("  POST /remove_bg/");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown signal received");
    }
}

/// Entry point of the `roomcraft-server` binary
pub async fn main() -> anyhow::Result<()> {
    use clap::Parser;

    let args = ServerArgs::parse();
    init_server_tracing(args.verbose, args.json_logs)
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))?;

    let config = args
        .generation_config()
        .context("Failed to load generation config")?;
    let settings = args.backend_settings();

    let processor = InpaintProcessor::from_settings(&settings, config)
        .context("Failed to initialize model handles")?;
    info!(
        strategies = ?processor.registry().strategies(),
        "Model handles ready"
    );

    serve(&args, processor).await
}
