//! Log subscriber setup for the server, plus span helpers shared with the library
//!
//! The library only emits events; `roomcraft-server` installs the subscriber
//! once at startup through [`init_server_tracing`].

#[cfg(feature = "server")]
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Shape of server log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Single-line human readable events
    Text,
    /// One JSON object per event, with the active request span attached
    #[cfg(feature = "tracing-json")]
    Json,
}

impl LogFormat {
    /// Format for the `--json-logs` flag, falling back to text in builds
    /// without `tracing-json`
    #[must_use]
    pub fn from_flag(json: bool) -> Self {
        match json {
            #[cfg(feature = "tracing-json")]
            true => LogFormat::Json,
            _ => LogFormat::Text,
        }
    }
}

/// Filter directive for the subscriber
///
/// A non-blank `RUST_LOG` value wins. Otherwise `-v` raises this crate and the
/// HTTP layer to debug, and `-vv` turns on trace output for everything.
#[must_use]
pub fn filter_directive(verbosity: u8, rust_log: Option<&str>) -> String {
    if let Some(filter) = rust_log.map(str::trim).filter(|f| !f.is_empty()) {
        return filter.to_string();
    }
    match verbosity {
        0 => "info".to_string(),
        1 => "info,roomcraft=debug,tower_http=debug".to_string(),
        _ => "trace".to_string(),
    }
}

/// Install the global subscriber for the server binary
///
/// # Errors
/// - The filter directive does not parse
/// - A global subscriber is already installed
#[cfg(feature = "server")]
pub fn init_server_tracing(verbosity: u8, json: bool) -> anyhow::Result<()> {
    let rust_log = std::env::var("RUST_LOG").ok();
    let filter = EnvFilter::try_new(filter_directive(verbosity, rust_log.as_deref()))?;
    let registry = Registry::default().with(filter);

    let format = LogFormat::from_flag(json);
    match format {
        LogFormat::Text => registry
            .with(fmt::layer().with_target(verbosity > 0).compact())
            .try_init()?,
        #[cfg(feature = "tracing-json")]
        LogFormat::Json => registry
            .with(fmt::layer().json().with_current_span(true).with_span_list(false))
            .try_init()?,
    }

    if json && format == LogFormat::Text {
        tracing::warn!("JSON logs requested but this build lacks the 'tracing-json' feature");
    }
    tracing::info!(
        session = %uuid::Uuid::new_v4(),
        version = env!("CARGO_PKG_VERSION"),
        "Logging ready"
    );
    Ok(())
}

/// Span creation helpers for common operations
pub mod spans {
    use tracing::{Level, Span};

    /// Span covering one HTTP request
    pub fn request(request_id: &str, route: &str) -> Span {
        tracing::span!(
            Level::INFO,
            "request",
            request_id = %request_id,
            route = %route
        )
    }

    /// Span covering backend startup
    pub fn backend_startup(strategy: &str, backend: &str) -> Span {
        tracing::span!(
            Level::INFO,
            "backend_startup",
            strategy = %strategy,
            backend = %backend
        )
    }
}
