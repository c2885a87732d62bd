//! Closed set of resource kinds markers understand.

use k8s_openapi::api::core::v1::Pod;
use kube::core::{DynamicObject, GroupVersionKind};
use serde_json::Value;

/// An admitted object, typed when its kind is one markers support.
///
/// Adding a kind means adding a variant here and a match arm in
/// [`TargetObject::from_dynamic`]; markers that do not care about the new
/// kind keep ignoring it through their fallback arm.
#[derive(Debug, Clone, PartialEq)]
pub enum TargetObject {
    /// core/v1 Pod
    Pod(Box<Pod>),
    /// Any kind no marker handles, kept verbatim
    Unsupported(Box<DynamicObject>),
}

impl TargetObject {
    /// Type `obj` according to the kind the API server declared for it.
    ///
    /// Fails when the declared kind is supported but the payload does not
    /// deserialize as that kind.
    pub fn from_dynamic(
        kind: &GroupVersionKind,
        obj: &DynamicObject,
    ) -> Result<Self, serde_json::Error> {
        match (kind.group.as_str(), kind.version.as_str(), kind.kind.as_str()) {
            ("", "v1", "Pod") => {
                let pod: Pod = serde_json::from_value(serde_json::to_value(obj)?)?;
                Ok(TargetObject::Pod(Box::new(pod)))
            }
            _ => Ok(TargetObject::Unsupported(Box::new(obj.clone()))),
        }
    }

    /// Serialized form used for patch computation
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        match self {
            TargetObject::Pod(pod) => serde_json::to_value(pod),
            TargetObject::Unsupported(obj) => serde_json::to_value(obj),
        }
    }

    /// Object name, falling back to `generateName` for pods not yet named
    pub fn name(&self) -> Option<&str> {
        let meta = match self {
            TargetObject::Pod(pod) => &pod.metadata,
            TargetObject::Unsupported(obj) => &obj.metadata,
        };
        meta.name.as_deref().or(meta.generate_name.as_deref())
    }

    /// Short kind name for logs and metric labels
    pub fn kind(&self) -> &str {
        match self {
            TargetObject::Pod(_) => "Pod",
            TargetObject::Unsupported(obj) => obj
                .types
                .as_ref()
                .map(|t| t.kind.as_str())
                .unwrap_or("Unknown"),
        }
    }
}
