//! Mutation policies applied to admitted objects.
//!
//! A [`Marker`] rewrites a [`TargetObject`] in place. The webhook layer never
//! branches on which marker is configured; disabling mutation means wiring
//! in [`DummyMarker`] instead.

pub mod pull_policy;
pub mod target;

pub use pull_policy::{ImagePullPolicyMarker, PullPolicy};
pub use target::TargetObject;

use kube::core::admission::Operation;
use thiserror::Error;

/// Errors a marker can report.
///
/// Returning one aborts the mutation for this request; the webhook still
/// admits the object unmodified.
#[derive(Error, Debug)]
pub enum MarkError {
    /// The embedded object spec cannot be mutated safely
    #[error("Invalid object: {0}")]
    Invalid(String),
}

/// Request metadata handed to markers alongside the object
#[derive(Debug, Clone, Copy)]
pub struct MarkContext<'a> {
    /// Admission request UID
    pub uid: &'a str,
    /// Operation being admitted
    pub operation: &'a Operation,
    /// Namespace of the object, if namespaced
    pub namespace: Option<&'a str>,
    /// Whether this is a dry-run request
    pub dry_run: bool,
}

/// Knows how to mark Kubernetes resources.
///
/// Implementations are shared across concurrent requests and must
/// synchronize internally if they hold mutable state.
pub trait Marker: Send + Sync {
    /// Mutate `obj` in place. Kinds the marker does not handle are left alone.
    fn mark(&self, ctx: &MarkContext<'_>, obj: &mut TargetObject) -> Result<(), MarkError>;
}

/// Marker that never changes anything
#[derive(Debug, Clone, Copy, Default)]
pub struct DummyMarker;

impl Marker for DummyMarker {
    fn mark(&self, _ctx: &MarkContext<'_>, _obj: &mut TargetObject) -> Result<(), MarkError> {
        Ok(())
    }
}
