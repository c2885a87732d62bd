// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]

//! Property-based tests for pull-policy-webhook.
//!
//! Uses proptest to generate random pods and verify the marking and patch
//! invariants.

#[path = "../common/mod.rs"]
mod common;

use std::sync::Arc;

use proptest::prelude::*;

use pull_policy_webhook::mutation::{
    DummyMarker, ImagePullPolicyMarker, MarkContext, Marker, PullPolicy, TargetObject,
};
use pull_policy_webhook::webhooks::codec;
use pull_policy_webhook::webhooks::{MarkMutator, MutatingWebhook, Outcome, Webhook};

use common::fixtures::{ReviewBuilder, pod_with_policies};

/// Strategy for any target policy
fn any_policy() -> impl Strategy<Value = PullPolicy> {
    prop::sample::select(PullPolicy::ALL.to_vec())
}

/// Strategy for a container's current policy, including unset
fn any_current_policy() -> impl Strategy<Value = Option<&'static str>> {
    prop::option::of(prop::sample::select(vec!["Always", "Never", "IfNotPresent"]))
}

/// Strategy for the policies of a pod's containers (1-8 containers)
fn any_containers() -> impl Strategy<Value = Vec<Option<&'static str>>> {
    prop::collection::vec(any_current_policy(), 1..=8)
}

/// Strategy for request UIDs
fn any_uid() -> impl Strategy<Value = String> {
    "[a-f0-9]{8}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{12}"
}

/// Decode a generated pod into the typed target the markers see
fn target(policies: &[Option<&str>]) -> TargetObject {
    let request = codec::decode_review(&ReviewBuilder::new(pod_with_policies(policies)).body())
        .unwrap();
    codec::extract(&request).unwrap().unwrap()
}

fn mark(marker: &dyn Marker, obj: &mut TargetObject) {
    let ctx = MarkContext {
        uid: "proptest",
        operation: &kube::core::admission::Operation::Create,
        namespace: Some("default"),
        dry_run: false,
    };
    marker.mark(&ctx, obj).unwrap();
}

fn container_policies(obj: &TargetObject) -> Vec<Option<String>> {
    match obj {
        TargetObject::Pod(pod) => pod
            .spec
            .as_ref()
            .map(|spec| {
                spec.containers
                    .iter()
                    .map(|c| c.image_pull_policy.clone())
                    .collect()
            })
            .unwrap_or_default(),
        TargetObject::Unsupported(_) => panic!("expected a pod"),
    }
}

proptest! {
    /// After marking, every container carries the configured policy
    #[test]
    fn marking_sets_every_container(policies in any_containers(), policy in any_policy()) {
        let mut obj = target(&policies);
        mark(&ImagePullPolicyMarker::new(policy), &mut obj);

        let marked = container_policies(&obj);
        prop_assert_eq!(marked.len(), policies.len());
        for current in marked {
            prop_assert_eq!(current.as_deref(), Some(policy.as_str()));
        }
    }

    /// Marking twice is the same as marking once
    #[test]
    fn marking_is_idempotent(policies in any_containers(), policy in any_policy()) {
        let marker = ImagePullPolicyMarker::new(policy);
        let mut once = target(&policies);
        mark(&marker, &mut once);
        let mut twice = once.clone();
        mark(&marker, &mut twice);

        prop_assert_eq!(&once, &twice);
        let patch = codec::diff(&once.to_value().unwrap(), &twice).unwrap();
        prop_assert!(patch.0.is_empty());
    }

    /// The dummy marker leaves every object untouched
    #[test]
    fn dummy_marker_is_identity(policies in any_containers()) {
        let original = target(&policies);
        let mut obj = original.clone();
        mark(&DummyMarker, &mut obj);
        prop_assert_eq!(obj, original);
    }

    /// Applying the emitted patch to the original yields the mutated object
    #[test]
    fn patch_replays_mutation(policies in any_containers(), policy in any_policy()) {
        let mut obj = target(&policies);
        let original = obj.to_value().unwrap();
        mark(&ImagePullPolicyMarker::new(policy), &mut obj);

        let patch = codec::diff(&original, &obj).unwrap();
        let changed = policies.iter().filter(|p| **p != Some(policy.as_str())).count();
        prop_assert_eq!(patch.0.len(), changed);

        let mut replayed = original.clone();
        json_patch::patch(&mut replayed, &patch).unwrap();
        prop_assert_eq!(replayed, obj.to_value().unwrap());
    }

    /// Every decided request echoes its UID
    #[test]
    fn response_echoes_uid(uid in any_uid(), policies in any_containers(), policy in any_policy()) {
        let webhook = MutatingWebhook::new(
            "imagePullPolicy",
            Arc::new(MarkMutator::new(Arc::new(ImagePullPolicyMarker::new(policy)), vec![])),
        );
        let body = ReviewBuilder::new(pod_with_policies(&policies)).uid(&uid).body();
        let request = codec::decode_review(&body).unwrap();

        let review = webhook.review(&request);
        prop_assert_eq!(&review.response.uid, &uid);
        prop_assert!(review.response.allowed);
        let expected = if policies.iter().all(|p| *p == Some(policy.as_str())) {
            Outcome::Unchanged
        } else {
            Outcome::Mutated
        };
        prop_assert_eq!(review.outcome, expected);
    }
}
