//! pull-policy-webhook library crate
//!
//! This module exports the admission webhook, the mutation policies, the
//! metrics recorders and the run group used by the binary.

pub mod config;
pub mod error;
pub mod health;
pub mod lifecycle;
pub mod metrics;
pub mod mutation;
pub mod server;
pub mod webhooks;

pub use config::Config;
pub use error::{Error, Result};
pub use lifecycle::{LifecycleError, RunGroup};
pub use server::{HttpServer, SHUTDOWN_GRACE_PERIOD};

use std::sync::Arc;

use metrics::{HttpMetrics, WebhookMetrics};
use mutation::{DummyMarker, ImagePullPolicyMarker, Marker, PullPolicy};
use webhooks::{MarkMutator, MeasuredWebhook, MutatingWebhook, WebhookState};

/// Identifier of the image pull policy webhook in logs and metrics
pub const WEBHOOK_ID: &str = "imagePullPolicy";

/// Warning attached to responses when mutation is enabled
pub const MARK_WARNING: &str = "Resource marked with image pull policy";

/// Pick the marker for a configured policy; `None` disables mutation
pub fn marker_for(policy: Option<PullPolicy>) -> Arc<dyn Marker> {
    match policy {
        Some(policy) => Arc::new(ImagePullPolicyMarker::new(policy)),
        None => Arc::new(DummyMarker),
    }
}

/// Assemble the webhook router: marker -> mutator -> webhook -> metrics -> routes.
///
/// The two recorders are composed independently: `webhook_metrics` wraps the
/// webhook, `http_metrics` wraps the router.
pub fn build_webhook_router(
    path: &str,
    policy: Option<PullPolicy>,
    http_metrics: HttpMetrics,
    webhook_metrics: WebhookMetrics,
) -> axum::Router {
    let warnings = match policy {
        Some(_) => vec![MARK_WARNING.to_string()],
        None => Vec::new(),
    };
    let mutator = MarkMutator::new(marker_for(policy), warnings);
    let webhook = MutatingWebhook::new(WEBHOOK_ID, Arc::new(mutator));
    let measured = MeasuredWebhook::new(webhook_metrics, webhook);

    let state = Arc::new(WebhookState::new(Arc::new(measured)));
    webhooks::create_webhook_router(path, state, http_metrics)
}
