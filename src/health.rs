//! Metrics server for Prometheus scraping, Kubernetes probes and debugging.
//!
//! Provides:
//! - `<metrics path>` - Prometheus metrics endpoint
//! - `/healthz` - Liveness probe (200 with an empty body while the process runs)
//! - `/debug/version` - Build information
//! - `/debug/config` - Effective configuration

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::get,
};
use prometheus_client::registry::Registry;
use serde::Serialize;
use serde_json::Value;

use crate::config::{DEBUG_PREFIX, HEALTHZ_PATH};
use crate::metrics::{HttpMetrics, encode_registry, track_http};

/// Build information served on `/debug/version`
#[derive(Debug, Clone, Serialize)]
pub struct BuildInfo {
    pub name: &'static str,
    pub version: &'static str,
}

impl Default for BuildInfo {
    fn default() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}

/// Shared state for the metrics server
pub struct MetricsState {
    /// Registry every recorder was registered on
    pub registry: Arc<Registry>,
    pub build: BuildInfo,
    /// Configuration snapshot for `/debug/config`
    pub config: Value,
}

/// Liveness probe handler
async fn healthz() -> impl IntoResponse {
    StatusCode::OK
}

/// Metrics handler
async fn metrics_handler(State(state): State<Arc<MetricsState>>) -> impl IntoResponse {
    let body = encode_registry(&state.registry);
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

async fn debug_version(State(state): State<Arc<MetricsState>>) -> impl IntoResponse {
    Json(state.build.clone())
}

async fn debug_config(State(state): State<Arc<MetricsState>>) -> impl IntoResponse {
    Json(state.config.clone())
}

/// Create the metrics server router
pub fn create_router(metrics_path: &str, state: Arc<MetricsState>, metrics: HttpMetrics) -> Router {
    Router::new()
        .route(metrics_path, get(metrics_handler))
        .route(HEALTHZ_PATH, get(healthz))
        .route(&format!("{}/version", DEBUG_PREFIX), get(debug_version))
        .route(&format!("{}/config", DEBUG_PREFIX), get(debug_config))
        .with_state(state)
        .layer(middleware::from_fn_with_state(metrics, track_http))
}
