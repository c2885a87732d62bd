//! Admission webhook HTTP surface.
//!
//! Maps the webhook route to its handler. Exactly one webhook is served per
//! path. The handler always answers in the admission review shape:
//! - HTTP 200 for every decoded request, whatever the decision
//! - HTTP 400 for a body that is not a usable admission review, so the API
//!   server applies its `failurePolicy`; the UID and envelope version are
//!   echoed when they can still be read

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    body::{Bytes, HttpBody},
    extract::{ConnectInfo, DefaultBodyLimit, Request, State},
    http::{StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::post,
};
use tracing::{debug, warn};

use super::codec::{self, CodecError};
use super::mutating::Webhook;
use super::response;
use crate::metrics::{HttpMetrics, track_http};

/// Largest admission review body accepted.
///
/// The API server caps a single object at 3 MiB and an UPDATE review carries
/// both `object` and `oldObject`.
pub const WEBHOOK_BODY_LIMIT: usize = 8 * 1024 * 1024;

/// Shared state for webhook handlers
pub struct WebhookState {
    pub webhook: Arc<dyn Webhook>,
}

impl WebhookState {
    pub fn new(webhook: Arc<dyn Webhook>) -> Self {
        Self { webhook }
    }
}

/// Create the webhook router, instrumented with HTTP metrics and access logs
pub fn create_webhook_router(path: &str, state: Arc<WebhookState>, metrics: HttpMetrics) -> Router {
    Router::new()
        .route(path, post(admit))
        .with_state(state)
        .layer(DefaultBodyLimit::max(WEBHOOK_BODY_LIMIT))
        .layer(middleware::from_fn_with_state(metrics, track_http))
        .layer(middleware::from_fn(access_log))
}

/// Admission review handler
async fn admit(State(state): State<Arc<WebhookState>>, body: Bytes) -> Response {
    let request = match codec::decode_review(&body) {
        Ok(request) => request,
        Err(e) => return decode_failure(state.webhook.id(), e),
    };

    let review = state.webhook.review(&request);
    (
        StatusCode::OK,
        Json(response::into_review(review.response)),
    )
        .into_response()
}

fn decode_failure(webhook: &str, err: CodecError) -> Response {
    let uid = err.uid();
    warn!(webhook = %webhook, uid = ?uid, error = %err, "Failed to extract admission request");

    let body = response::into_review(response::invalid(uid, err.api_version(), &err));
    (StatusCode::BAD_REQUEST, Json(body)).into_response()
}

/// Debug-level access log, one line per request
async fn access_log(request: Request, next: Next) -> Response {
    let remote = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "-".to_string());
    let method = request.method().clone();
    let uri = request.uri().clone();
    let version = request.version();
    let referer = header_value(&request, header::REFERER);
    let user_agent = header_value(&request, header::USER_AGENT);

    let response = next.run(request).await;

    debug!(
        remote = %remote,
        method = %method,
        uri = %uri,
        version = ?version,
        status = response.status().as_u16(),
        size = response.body().size_hint().exact().unwrap_or(0),
        referer = %referer,
        user_agent = %user_agent,
        "HTTP request"
    );
    response
}

fn header_value(request: &Request, name: header::HeaderName) -> String {
    request
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string()
}
