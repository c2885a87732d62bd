//! Container image pull policy enforcement.

use std::fmt;
use std::str::FromStr;

use tracing::info;

use super::{MarkContext, MarkError, Marker, TargetObject};

/// Kubernetes container image pull policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PullPolicy {
    Always,
    Never,
    IfNotPresent,
}

impl PullPolicy {
    /// All policies, in the order Kubernetes documents them
    pub const ALL: [PullPolicy; 3] = [PullPolicy::Always, PullPolicy::Never, PullPolicy::IfNotPresent];

    /// The value as it appears in a container spec
    pub fn as_str(&self) -> &'static str {
        match self {
            PullPolicy::Always => "Always",
            PullPolicy::Never => "Never",
            PullPolicy::IfNotPresent => "IfNotPresent",
        }
    }
}

impl fmt::Display for PullPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown pull policy
#[derive(Debug, thiserror::Error)]
#[error("unknown image pull policy {0:?} (expected Always, Never or IfNotPresent)")]
pub struct ParsePullPolicyError(String);

impl FromStr for PullPolicy {
    type Err = ParsePullPolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PullPolicy::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| ParsePullPolicyError(s.to_string()))
    }
}

/// Sets `imagePullPolicy` on every container of a Pod
#[derive(Debug, Clone)]
pub struct ImagePullPolicyMarker {
    policy: PullPolicy,
}

impl ImagePullPolicyMarker {
    pub fn new(policy: PullPolicy) -> Self {
        Self { policy }
    }
}

impl Marker for ImagePullPolicyMarker {
    fn mark(&self, ctx: &MarkContext<'_>, obj: &mut TargetObject) -> Result<(), MarkError> {
        let pod = match obj {
            TargetObject::Pod(pod) => pod,
            TargetObject::Unsupported(_) => return Ok(()),
        };

        let pod_name = pod
            .metadata
            .name
            .clone()
            .or_else(|| pod.metadata.generate_name.clone())
            .unwrap_or_default();
        let Some(spec) = pod.spec.as_mut() else {
            return Ok(());
        };

        let target = self.policy.as_str();
        for container in spec.containers.iter_mut() {
            if container.image_pull_policy.as_deref() == Some(target) {
                continue;
            }
            info!(
                uid = %ctx.uid,
                pod = %pod_name,
                container = %container.name,
                from = container.image_pull_policy.as_deref().unwrap_or(""),
                to = target,
                "Updated ImagePullPolicy"
            );
            container.image_pull_policy = Some(target.to_string());
        }

        Ok(())
    }
}
