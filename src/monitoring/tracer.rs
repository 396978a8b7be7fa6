/*!
 * Structured Tracing
 * Subscriber setup and provisioning spans using the tracing crate
 *
 * Features:
 * - Request ids for correlating every log line of one provisioning call
 * - JSON-formatted logs for structured parsing
 * - Duration and failing step recorded on the provisioning span
 */

use std::time::Instant;
use tracing::{debug, info, span, warn, Level};
use tracing_subscriber::{
    fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};
use uuid::Uuid;

/// Environment variable switching output to JSON
pub const TRACE_JSON_ENV: &str = "SANDBOXD_TRACE_JSON";

/// Provisioning calls slower than this are reported at warn level
const SLOW_PROVISION_MS: u128 = 5_000;

/// Initialize structured tracing
///
/// Environment variables:
/// - RUST_LOG: Set log level (default: info)
/// - SANDBOXD_TRACE_JSON: Enable JSON output (default: false)
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let use_json = std::env::var(TRACE_JSON_ENV)
        .map(|v| v == "1" || v == "true")
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(env_filter);

    if use_json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_line_number(true)
                    .with_file(true)
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .init();
        info!("Structured tracing initialized with JSON output");
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_line_number(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .compact(),
            )
            .init();
        info!("Structured tracing initialized");
    }
}

/// Generate a unique request id for log correlation
pub fn generate_request_id() -> String {
    Uuid::new_v4().to_string()
}

/// Span covering one sandbox provisioning call
pub struct ProvisionSpan {
    span: tracing::Span,
    start: Instant,
    request_id: String,
    sandbox: String,
}

impl ProvisionSpan {
    pub fn new(sandbox: &str) -> Self {
        let request_id = generate_request_id();

        let span = span!(
            Level::INFO,
            "run_pod_sandbox",
            request_id = %request_id,
            sandbox = sandbox,
            id = tracing::field::Empty,
            failed_step = tracing::field::Empty,
            duration_ms = tracing::field::Empty,
        );

        Self {
            span,
            start: Instant::now(),
            request_id,
            sandbox: sandbox.to_string(),
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Record the generated sandbox id once known
    pub fn record_id(&self, id: &str) {
        self.span.record("id", id);
    }

    /// Record the step that failed the call
    pub fn record_failure(&self, step: &str) {
        self.span.record("failed_step", step);
    }

    /// Enter the span context
    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }
}

impl Drop for ProvisionSpan {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        self.span.record("duration_ms", duration.as_millis());
        let _entered = self.span.enter();

        if duration.as_millis() > SLOW_PROVISION_MS {
            warn!(
                request_id = %self.request_id,
                sandbox = %self.sandbox,
                duration_ms = duration.as_millis(),
                slow = true,
                "slow sandbox provisioning"
            );
        } else {
            debug!(
                request_id = %self.request_id,
                sandbox = %self.sandbox,
                duration_ms = duration.as_millis(),
                "sandbox provisioning finished"
            );
        }
    }
}
