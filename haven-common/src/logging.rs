//! Logging utilities for Haven.
//!
//! Provides pretty or structured JSON logging plus per-request trace IDs.
//!
//! # Noise Filtering
//!
//! By default, noisy library modules (hyper, reqwest, h2, rustls, tower_http)
//! are set to `warn` level to keep the business logs readable.

use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Header carrying the trace ID across services (lowercase, as `HeaderName::from_static` requires).
pub const TRACE_ID_HEADER: &str = "x-trace-id";

/// Default noisy modules that should be filtered to warn level.
pub const NOISY_MODULES: &[&str] = &[
    "hyper",
    "hyper_util",
    "reqwest",
    "h2",
    "rustls",
    "tower_http",
];

/// Build the filter directives for `log_level` with noise suppression.
fn filter_directives(log_level: &str) -> String {
    let mut directives = String::from(log_level);
    for module in NOISY_MODULES {
        directives.push_str(&format!(",{}=warn", module));
    }
    directives
}

/// Build the default EnvFilter. `RUST_LOG` wins when set.
fn build_filter(log_level: &str) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    EnvFilter::new(filter_directives(log_level))
}

/// Initialize logging with the given configuration.
///
/// # Arguments
///
/// * `log_level` - Base log level (trace, debug, info, warn, error)
/// * `log_format` - Output format: "json" for structured JSON, "pretty" for human-readable
pub fn init_logging(log_level: &str, log_format: &str) {
    let filter = build_filter(log_level);

    let subscriber = tracing_subscriber::registry().with(filter);

    if log_format == "json" {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_span_events(FmtSpan::CLOSE)
            .with_current_span(true)
            .with_target(true)
            .with_file(true)
            .with_line_number(true);
        let _ = subscriber.with(fmt_layer).try_init();
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_ansi(true)
            .with_target(true)
            .with_file(false)
            .with_line_number(false);
        let _ = subscriber.with(fmt_layer).try_init();
    }

    tracing::info!(
        log_level = %log_level,
        log_format = %log_format,
        noise_filtered = NOISY_MODULES.len(),
        "Logging initialized"
    );
}

/// Generate a new trace ID for request tracing.
pub fn generate_trace_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

// ============================================================================
// Request Context
// ============================================================================

/// Per-request tracing context, stored in request extensions.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Trace ID, taken from the `x-trace-id` header or freshly generated
    pub trace_id: String,
    /// Service name
    pub service: String,
}

impl RequestContext {
    /// Create context from HTTP headers.
    pub fn from_headers(headers: &http::HeaderMap, service: impl Into<String>) -> Self {
        let trace_id = headers
            .get(TRACE_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(String::from)
            .unwrap_or_else(generate_trace_id);

        Self {
            trace_id,
            service: service.into(),
        }
    }

    /// Add context to HTTP headers for propagation.
    pub fn to_headers(&self, headers: &mut http::HeaderMap) {
        if let Ok(trace_id) = self.trace_id.parse() {
            headers.insert(TRACE_ID_HEADER, trace_id);
        }
    }
}

/// Axum middleware that attaches a [`RequestContext`] to every request and
/// logs its completion.
#[cfg(feature = "axum")]
pub async fn trace_requests(
    mut request: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let ctx = RequestContext::from_headers(request.headers(), "haven-server");
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = std::time::Instant::now();

    request.extensions_mut().insert(ctx.clone());

    let mut response = next.run(request).await;
    ctx.to_headers(response.headers_mut());

    let status = response.status().as_u16();
    let duration_ms = start.elapsed().as_millis() as u64;
    if status >= 500 {
        tracing::warn!(trace_id = %ctx.trace_id, %method, %path, status, duration_ms, "Request failed");
    } else {
        tracing::info!(trace_id = %ctx.trace_id, %method, %path, status, duration_ms, "Request completed");
    }

    response
}

/// Create a tracing span for API calls with business context.
///
/// # Example
///
/// ```ignore
/// let span = request_span!("chat_turn", ctx.trace_id, session_id = %session_id);
/// let _enter = span.enter();
/// ```
#[macro_export]
macro_rules! request_span {
    ($name:expr, $trace_id:expr) => {
        tracing::info_span!($name, trace_id = %$trace_id)
    };
    ($name:expr, $trace_id:expr, $($field:tt)*) => {
        tracing::info_span!($name, trace_id = %$trace_id, $($field)*)
    };
}
