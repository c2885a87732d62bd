//! Admission response assembly.
//!
//! Every response produced here carries the request UID and is wrapped in a
//! review of the same API version the request used.

use json_patch::Patch;
use kube::core::{DynamicObject, TypeMeta};
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview};
use tracing::error;

/// Allow the request, attaching `patch` unless it is empty.
///
/// A patch that cannot be serialized degrades to allowing the object
/// unmodified.
pub fn allow(
    request: &AdmissionRequest<DynamicObject>,
    patch: Patch,
    warnings: Vec<String>,
) -> AdmissionResponse {
    let response = AdmissionResponse::from(request);
    if patch.0.is_empty() {
        return with_warnings(response, warnings);
    }
    let response = match response.clone().with_patch(patch) {
        Ok(patched) => patched,
        Err(e) => {
            error!(uid = %request.uid, error = %e, "Failed to serialize patch");
            response
        }
    };
    with_warnings(response, warnings)
}

/// Deny the request with a message. Used only for protocol errors.
pub fn deny(request: &AdmissionRequest<DynamicObject>, message: impl ToString) -> AdmissionResponse {
    AdmissionResponse::from(request).deny(message)
}

/// Response for a body that could not be decoded into a request.
///
/// The UID is echoed when it was recoverable; otherwise it stays empty. The
/// envelope uses `api_version` so the caller can still parse the answer.
pub fn invalid(uid: Option<&str>, api_version: &str, message: impl ToString) -> AdmissionResponse {
    let mut response = AdmissionResponse::invalid(message);
    response.types = TypeMeta {
        api_version: api_version.to_string(),
        kind: "AdmissionReview".to_string(),
    };
    if let Some(uid) = uid {
        response.uid = uid.to_string();
    }
    response
}

/// Wrap a response into the review envelope sent back to the API server
pub fn into_review(response: AdmissionResponse) -> AdmissionReview<DynamicObject> {
    response.into_review()
}

fn with_warnings(mut response: AdmissionResponse, warnings: Vec<String>) -> AdmissionResponse {
    if !warnings.is_empty() {
        response.warnings = Some(warnings);
    }
    response
}
