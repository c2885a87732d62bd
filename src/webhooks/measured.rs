//! Metrics decorator for webhooks.

use std::time::Instant;

use kube::core::DynamicObject;
use kube::core::admission::{AdmissionRequest, Operation};

use super::mutating::{Review, Webhook};
use crate::metrics::WebhookMetrics;

/// Wraps a [`Webhook`] and records one observation per decision
pub struct MeasuredWebhook<W> {
    inner: W,
    metrics: WebhookMetrics,
}

impl<W: Webhook> MeasuredWebhook<W> {
    pub fn new(metrics: WebhookMetrics, inner: W) -> Self {
        Self { inner, metrics }
    }
}

impl<W: Webhook> Webhook for MeasuredWebhook<W> {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn review(&self, request: &AdmissionRequest<DynamicObject>) -> Review {
        let start = Instant::now();
        let review = self.inner.review(request);
        let warnings = review
            .response
            .warnings
            .as_ref()
            .map(Vec::len)
            .unwrap_or(0);
        self.metrics.observe(
            self.inner.id(),
            operation_label(&request.operation),
            &request.kind.kind,
            review.outcome.as_str(),
            start.elapsed(),
            warnings,
        );
        review
    }
}

fn operation_label(operation: &Operation) -> &'static str {
    match operation {
        Operation::Create => "CREATE",
        Operation::Update => "UPDATE",
        Operation::Delete => "DELETE",
        Operation::Connect => "CONNECT",
    }
}
