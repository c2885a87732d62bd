//! Admission review decoding and JSON Patch computation.

use json_patch::Patch;
use kube::core::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionReview, ConvertAdmissionReviewError};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::mutation::TargetObject;

/// API versions of the admission review envelope this webhook answers
pub const SUPPORTED_API_VERSIONS: [&str; 2] = ["admission.k8s.io/v1", "admission.k8s.io/v1beta1"];

/// Envelope version used when the request's own cannot be echoed
pub const DEFAULT_API_VERSION: &str = "admission.k8s.io/v1";

/// Errors raised while decoding a request or encoding its patch
#[derive(Error, Debug)]
pub enum CodecError {
    /// The body is not an admission review
    #[error("Invalid AdmissionReview: {message}")]
    Envelope {
        message: String,
        /// Request UID, when it could still be read from the body
        uid: Option<String>,
        /// Envelope `apiVersion`, when it is one this webhook speaks
        api_version: Option<String>,
    },

    /// The review carries no request
    #[error("Invalid AdmissionReview: missing request")]
    MissingRequest,

    /// The object does not match its declared kind
    #[error("Could not decode {kind} object: {source}")]
    Object {
        kind: String,
        #[source]
        source: serde_json::Error,
    },

    /// Object or patch serialization failed
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl CodecError {
    /// UID to echo in the error response, if one is known
    pub fn uid(&self) -> Option<&str> {
        match self {
            CodecError::Envelope { uid, .. } => uid.as_deref(),
            _ => None,
        }
    }

    /// Envelope version the error response is wrapped in
    pub fn api_version(&self) -> &str {
        match self {
            CodecError::Envelope {
                api_version: Some(v),
                ..
            } => v,
            _ => DEFAULT_API_VERSION,
        }
    }
}

/// Just enough of a review to answer a body that failed to decode
#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct EnvelopeProbe {
    #[serde(default)]
    api_version: Option<String>,
    #[serde(default)]
    request: Option<RequestProbe>,
}

#[derive(Deserialize)]
struct RequestProbe {
    #[serde(default)]
    uid: Option<String>,
}

impl EnvelopeProbe {
    fn read(body: &[u8]) -> Self {
        serde_json::from_slice(body).unwrap_or_default()
    }

    fn uid(&self) -> Option<String> {
        self.request
            .as_ref()
            .and_then(|r| r.uid.clone())
            .filter(|uid| !uid.is_empty())
    }

    fn api_version(&self) -> Option<String> {
        self.api_version
            .clone()
            .filter(|v| SUPPORTED_API_VERSIONS.contains(&v.as_str()))
    }
}

/// Decode an HTTP body into an admission request
pub fn decode_review(body: &[u8]) -> Result<AdmissionRequest<DynamicObject>, CodecError> {
    let review: AdmissionReview<DynamicObject> = serde_json::from_slice(body).map_err(|e| {
        let probe = EnvelopeProbe::read(body);
        CodecError::Envelope {
            message: e.to_string(),
            uid: probe.uid(),
            api_version: probe.api_version(),
        }
    })?;

    if review.types.kind != "AdmissionReview"
        || !SUPPORTED_API_VERSIONS.contains(&review.types.api_version.as_str())
    {
        return Err(CodecError::Envelope {
            message: format!(
                "unsupported review type {}/{}",
                review.types.api_version, review.types.kind
            ),
            uid: review.request.as_ref().map(|r| r.uid.clone()),
            api_version: Some(review.types.api_version.clone())
                .filter(|v| SUPPORTED_API_VERSIONS.contains(&v.as_str())),
        });
    }

    review
        .try_into()
        .map_err(|_: ConvertAdmissionReviewError| CodecError::MissingRequest)
}

/// Type the request's object according to its declared kind.
///
/// Returns `None` when the request carries no object (DELETE, CONNECT).
pub fn extract(request: &AdmissionRequest<DynamicObject>) -> Result<Option<TargetObject>, CodecError> {
    let Some(obj) = request.object.as_ref() else {
        return Ok(None);
    };
    TargetObject::from_dynamic(&request.kind, obj)
        .map(Some)
        .map_err(|source| CodecError::Object {
            kind: request.kind.kind.clone(),
            source,
        })
}

/// JSON Patch turning `original` into `mutated`.
///
/// The patch is empty when nothing changed.
pub fn diff(original: &Value, mutated: &TargetObject) -> Result<Patch, CodecError> {
    let mutated = mutated.to_value()?;
    Ok(json_patch::diff(original, &mutated))
}
