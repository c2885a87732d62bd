//! Prometheus recorders.
//!
//! Two independent recorders share one registry, injected at construction:
//! - [`HttpMetrics`] measures raw HTTP traffic on any router it wraps
//! - [`WebhookMetrics`] measures admission decisions (see
//!   [`crate::webhooks::MeasuredWebhook`])

use std::time::{Duration, Instant};

use axum::body::HttpBody;
use axum::extract::{MatchedPath, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::{EncodeLabel, EncodeLabelSet, LabelSetEncoder};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;

/// Labels for HTTP request metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct HttpLabels {
    pub handler: String,
    pub method: String,
    pub code: String,
}

impl EncodeLabelSet for HttpLabels {
    fn encode(&self, encoder: &mut LabelSetEncoder<'_>) -> Result<(), std::fmt::Error> {
        ("handler", self.handler.as_str()).encode(encoder.encode_label())?;
        ("method", self.method.as_str()).encode(encoder.encode_label())?;
        ("code", self.code.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Labels for the in-flight gauge
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct HandlerLabels {
    pub handler: String,
}

impl EncodeLabelSet for HandlerLabels {
    fn encode(&self, encoder: &mut LabelSetEncoder<'_>) -> Result<(), std::fmt::Error> {
        ("handler", self.handler.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Generic HTTP server metrics
#[derive(Clone)]
pub struct HttpMetrics {
    requests_total: Family<HttpLabels, Counter>,
    request_duration_seconds: Family<HttpLabels, Histogram>,
    response_size_bytes: Family<HttpLabels, Histogram>,
    requests_inflight: Family<HandlerLabels, Gauge>,
}

impl HttpMetrics {
    /// Create the recorder and register its metrics on `registry`
    pub fn new(registry: &mut Registry) -> Self {
        let requests_total = Family::<HttpLabels, Counter>::default();
        registry.register(
            "http_requests",
            "Total number of HTTP requests served",
            requests_total.clone(),
        );

        let request_duration_seconds =
            Family::<HttpLabels, Histogram>::new_with_constructor(|| {
                Histogram::new(exponential_buckets(0.001, 2.0, 15))
            });
        registry.register(
            "http_request_duration_seconds",
            "Duration of HTTP requests in seconds",
            request_duration_seconds.clone(),
        );

        let response_size_bytes = Family::<HttpLabels, Histogram>::new_with_constructor(|| {
            Histogram::new(exponential_buckets(100.0, 10.0, 8))
        });
        registry.register(
            "http_response_size_bytes",
            "Size of HTTP responses in bytes",
            response_size_bytes.clone(),
        );

        let requests_inflight = Family::<HandlerLabels, Gauge>::default();
        registry.register(
            "http_requests_inflight",
            "Number of HTTP requests being served",
            requests_inflight.clone(),
        );

        Self {
            requests_total,
            request_duration_seconds,
            response_size_bytes,
            requests_inflight,
        }
    }

    /// Record a finished request
    pub fn observe(
        &self,
        handler: &str,
        method: &str,
        status: u16,
        duration: Duration,
        size: Option<u64>,
    ) {
        let labels = HttpLabels {
            handler: handler.to_string(),
            method: method.to_string(),
            code: status_class(status).to_string(),
        };
        self.requests_total.get_or_create(&labels).inc();
        self.request_duration_seconds
            .get_or_create(&labels)
            .observe(duration.as_secs_f64());
        if let Some(size) = size {
            self.response_size_bytes
                .get_or_create(&labels)
                .observe(size as f64);
        }
    }

    fn inflight(&self, handler: &str) -> Gauge {
        self.requests_inflight
            .get_or_create(&HandlerLabels {
                handler: handler.to_string(),
            })
            .clone()
    }
}

/// Status class label (`2xx`, `4xx`, ...)
pub fn status_class(status: u16) -> &'static str {
    match status {
        100..=199 => "1xx",
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        500..=599 => "5xx",
        _ => "unknown",
    }
}

/// Holds one in-flight slot; released even if the request future is dropped
struct InflightGuard(Gauge);

impl InflightGuard {
    fn new(gauge: Gauge) -> Self {
        gauge.inc();
        Self(gauge)
    }
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.0.dec();
    }
}

/// Axum middleware recording [`HttpMetrics`] for every request.
///
/// Install with `axum::middleware::from_fn_with_state(metrics, track_http)`.
pub async fn track_http(
    State(metrics): State<HttpMetrics>,
    request: Request,
    next: Next,
) -> Response {
    let handler = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let method = request.method().to_string();

    let inflight = InflightGuard::new(metrics.inflight(&handler));
    let start = Instant::now();

    let response = next.run(request).await;

    drop(inflight);
    metrics.observe(
        &handler,
        &method,
        response.status().as_u16(),
        start.elapsed(),
        response.body().size_hint().exact(),
    );
    response
}

/// Labels for admission decision counters
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct ReviewLabels {
    pub webhook: String,
    pub operation: String,
    pub kind: String,
    pub outcome: String,
}

impl EncodeLabelSet for ReviewLabels {
    fn encode(&self, encoder: &mut LabelSetEncoder<'_>) -> Result<(), std::fmt::Error> {
        ("webhook", self.webhook.as_str()).encode(encoder.encode_label())?;
        ("operation", self.operation.as_str()).encode(encoder.encode_label())?;
        ("kind", self.kind.as_str()).encode(encoder.encode_label())?;
        ("outcome", self.outcome.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Labels for admission decision latency
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct ReviewDurationLabels {
    pub webhook: String,
    pub operation: String,
    pub kind: String,
}

impl EncodeLabelSet for ReviewDurationLabels {
    fn encode(&self, encoder: &mut LabelSetEncoder<'_>) -> Result<(), std::fmt::Error> {
        ("webhook", self.webhook.as_str()).encode(encoder.encode_label())?;
        ("operation", self.operation.as_str()).encode(encoder.encode_label())?;
        ("kind", self.kind.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Labels for per-webhook counters
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct WebhookLabels {
    pub webhook: String,
}

impl EncodeLabelSet for WebhookLabels {
    fn encode(&self, encoder: &mut LabelSetEncoder<'_>) -> Result<(), std::fmt::Error> {
        ("webhook", self.webhook.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Admission decision metrics
#[derive(Clone)]
pub struct WebhookMetrics {
    reviews_total: Family<ReviewLabels, Counter>,
    review_duration_seconds: Family<ReviewDurationLabels, Histogram>,
    review_warnings_total: Family<WebhookLabels, Counter>,
}

impl WebhookMetrics {
    /// Create the recorder and register its metrics on `registry`
    pub fn new(registry: &mut Registry) -> Self {
        let reviews_total = Family::<ReviewLabels, Counter>::default();
        registry.register(
            "admission_reviews",
            "Total number of admission reviews by outcome",
            reviews_total.clone(),
        );

        let review_duration_seconds =
            Family::<ReviewDurationLabels, Histogram>::new_with_constructor(|| {
                Histogram::new(exponential_buckets(0.0005, 2.0, 14))
            });
        registry.register(
            "admission_review_duration_seconds",
            "Duration of admission reviews in seconds",
            review_duration_seconds.clone(),
        );

        let review_warnings_total = Family::<WebhookLabels, Counter>::default();
        registry.register(
            "admission_review_warnings",
            "Total number of warnings returned in admission responses",
            review_warnings_total.clone(),
        );

        Self {
            reviews_total,
            review_duration_seconds,
            review_warnings_total,
        }
    }

    /// Record one admission decision
    pub fn observe(
        &self,
        webhook: &str,
        operation: &str,
        kind: &str,
        outcome: &str,
        duration: Duration,
        warnings: usize,
    ) {
        self.reviews_total
            .get_or_create(&ReviewLabels {
                webhook: webhook.to_string(),
                operation: operation.to_string(),
                kind: kind.to_string(),
                outcome: outcome.to_string(),
            })
            .inc();
        self.review_duration_seconds
            .get_or_create(&ReviewDurationLabels {
                webhook: webhook.to_string(),
                operation: operation.to_string(),
                kind: kind.to_string(),
            })
            .observe(duration.as_secs_f64());
        if warnings > 0 {
            self.review_warnings_total
                .get_or_create(&WebhookLabels {
                    webhook: webhook.to_string(),
                })
                .inc_by(warnings as u64);
        }
    }
}

/// Encode `registry` to Prometheus text format
pub fn encode_registry(registry: &Registry) -> String {
    let mut buffer = String::new();
    if encode(&mut buffer, registry).is_err() {
        tracing::error!("Failed to encode metrics");
        return "# Error encoding metrics".to_string();
    }
    buffer
}
