//! Mutating admission webhook.
//!
//! Runs one request through decode, mutate, diff and response assembly.
//! Processing is strictly sequential per request.

use std::fmt;
use std::sync::Arc;

use kube::core::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionResponse};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::mutation::{MarkContext, MarkError, Marker, TargetObject};
use crate::webhooks::{codec, response};

/// Failure inside a mutator
#[derive(Error, Debug)]
pub enum MutationError {
    #[error("could not mark the resource: {0}")]
    Mark(#[from] MarkError),
}

/// What a mutator hands back for one object
#[derive(Debug)]
pub struct MutationResult {
    /// The object after mutation
    pub object: TargetObject,
    /// Human-readable warnings returned to the client
    pub warnings: Vec<String>,
}

/// Turns an admitted object into its mutated form
pub trait Mutator: Send + Sync {
    fn mutate(
        &self,
        ctx: &MarkContext<'_>,
        obj: TargetObject,
    ) -> Result<MutationResult, MutationError>;
}

/// Mutator backed by a [`Marker`]
pub struct MarkMutator {
    marker: Arc<dyn Marker>,
    warnings: Vec<String>,
}

impl MarkMutator {
    /// `warnings` are attached to every response this mutator produces
    pub fn new(marker: Arc<dyn Marker>, warnings: Vec<String>) -> Self {
        Self { marker, warnings }
    }
}

impl Mutator for MarkMutator {
    fn mutate(
        &self,
        ctx: &MarkContext<'_>,
        mut obj: TargetObject,
    ) -> Result<MutationResult, MutationError> {
        self.marker.mark(ctx, &mut obj)?;
        Ok(MutationResult {
            object: obj,
            warnings: self.warnings.clone(),
        })
    }
}

/// Result class of one admission decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// Allowed with a non-empty patch
    Mutated,
    /// Allowed without a patch
    Unchanged,
    /// Mutation or extraction failed
    Errored,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Mutated => "mutated",
            Outcome::Unchanged => "unchanged",
            Outcome::Errored => "errored",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decision for one admission request
#[derive(Debug)]
pub struct Review {
    pub response: AdmissionResponse,
    pub outcome: Outcome,
}

/// An admission webhook the router can dispatch to
pub trait Webhook: Send + Sync {
    /// Stable identifier used in logs and metric labels
    fn id(&self) -> &str;

    /// Decide on a decoded request
    fn review(&self, request: &AdmissionRequest<DynamicObject>) -> Review;
}

/// Webhook applying a [`Mutator`] and answering with a JSON Patch
pub struct MutatingWebhook {
    id: String,
    mutator: Arc<dyn Mutator>,
}

impl MutatingWebhook {
    pub fn new(id: impl Into<String>, mutator: Arc<dyn Mutator>) -> Self {
        Self {
            id: id.into(),
            mutator,
        }
    }
}

impl Webhook for MutatingWebhook {
    fn id(&self) -> &str {
        &self.id
    }

    fn review(&self, request: &AdmissionRequest<DynamicObject>) -> Review {
        let uid = &request.uid;
        debug!(
            uid = %uid,
            webhook = %self.id,
            operation = ?request.operation,
            kind = %request.kind.kind,
            namespace = ?request.namespace,
            name = %request.name,
            "Processing admission request"
        );

        let target = match codec::extract(request) {
            Ok(Some(target)) => target,
            Ok(None) => {
                debug!(uid = %uid, "No object in request, allowing unchanged");
                return Review {
                    response: response::allow(request, json_patch::Patch(vec![]), vec![]),
                    outcome: Outcome::Unchanged,
                };
            }
            Err(e) => {
                warn!(uid = %uid, error = %e, "Admission request denied");
                return Review {
                    response: response::deny(request, e),
                    outcome: Outcome::Errored,
                };
            }
        };

        let original = match target.to_value() {
            Ok(value) => value,
            Err(e) => {
                warn!(uid = %uid, error = %e, "Could not serialize object, allowing unchanged");
                return fail_open(request, e);
            }
        };

        let ctx = MarkContext {
            uid,
            operation: &request.operation,
            namespace: request.namespace.as_deref(),
            dry_run: request.dry_run,
        };

        // Mutator failures fail open: a broken policy must not block workloads.
        let result = match self.mutator.mutate(&ctx, target) {
            Ok(result) => result,
            Err(e) => {
                warn!(uid = %uid, webhook = %self.id, error = %e, "Mutation failed, allowing unchanged");
                return fail_open(request, e);
            }
        };

        let patch = match codec::diff(&original, &result.object) {
            Ok(patch) => patch,
            Err(e) => {
                warn!(uid = %uid, error = %e, "Could not compute patch, allowing unchanged");
                return fail_open(request, e);
            }
        };

        let outcome = if patch.0.is_empty() {
            Outcome::Unchanged
        } else {
            Outcome::Mutated
        };
        info!(
            uid = %uid,
            webhook = %self.id,
            kind = result.object.kind(),
            name = result.object.name().unwrap_or(""),
            patch_ops = patch.0.len(),
            outcome = %outcome,
            "Admission request allowed"
        );

        Review {
            response: response::allow(request, patch, result.warnings),
            outcome,
        }
    }
}

fn fail_open(request: &AdmissionRequest<DynamicObject>, err: impl fmt::Display) -> Review {
    Review {
        response: response::allow(
            request,
            json_patch::Patch(vec![]),
            vec![format!("mutation skipped: {}", err)],
        ),
        outcome: Outcome::Errored,
    }
}
