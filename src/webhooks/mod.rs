//! Mutating admission webhook.
//!
//! Request flow:
//! router -> [`codec::decode_review`] -> [`Mutator`] -> [`codec::diff`] ->
//! [`response`] -> router.
//!
//! [`MeasuredWebhook`] records decision metrics around any [`Webhook`];
//! HTTP-level metrics are a separate middleware on the router.

pub mod codec;
mod measured;
mod mutating;
pub mod response;
mod server;

pub use codec::CodecError;
pub use measured::MeasuredWebhook;
pub use mutating::{
    MarkMutator, MutatingWebhook, MutationError, MutationResult, Mutator, Outcome, Review, Webhook,
};
pub use server::{WebhookState, create_webhook_router};

// Re-export kube-rs admission types for contract testing
pub use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation};
