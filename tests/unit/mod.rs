// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]

//! Unit tests for pull-policy-webhook.
//!
//! These tests run without a Kubernetes cluster: admission reviews are sent
//! through the assembled webhook router in memory.

#[path = "../common/mod.rs"]
mod common;

mod webhook_router_tests {
    use axum::Router;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use prometheus_client::registry::Registry;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use pull_policy_webhook::build_webhook_router;
    use pull_policy_webhook::config::DEFAULT_WEBHOOK_PATH;
    use pull_policy_webhook::metrics::{HttpMetrics, WebhookMetrics, encode_registry};
    use pull_policy_webhook::mutation::PullPolicy;
    use pull_policy_webhook::{MARK_WARNING, WEBHOOK_ID};

    use crate::common::fixtures::{PodBuilder, ReviewBuilder, TEST_UID, pod_with_policies};

    fn router(policy: Option<PullPolicy>) -> (Router, Registry) {
        let mut registry = Registry::default();
        let http = HttpMetrics::new(&mut registry);
        let webhook = WebhookMetrics::new(&mut registry);
        let router = build_webhook_router(DEFAULT_WEBHOOK_PATH, policy, http, webhook);
        (router, registry)
    }

    async fn post(router: Router, body: Vec<u8>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(DEFAULT_WEBHOOK_PATH)
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    /// Decode the JSON patch bytes of a review response
    fn patch_ops(review: &Value) -> Vec<Value> {
        let raw = match &review["response"]["patch"] {
            Value::String(encoded) => STANDARD.decode(encoded).unwrap(),
            Value::Array(bytes) => bytes.iter().map(|b| b.as_u64().unwrap() as u8).collect(),
            other => panic!("unexpected patch {:?}", other),
        };
        serde_json::from_slice(&raw).unwrap()
    }

    #[tokio::test]
    async fn test_two_containers_get_replace_ops() {
        let (router, _) = router(Some(PullPolicy::Always));
        let pod = PodBuilder::new("web")
            .container("a", Some("Never"))
            .container("b", Some("IfNotPresent"))
            .build();

        let (status, review) = post(router, ReviewBuilder::new(pod).body()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(review["apiVersion"], "admission.k8s.io/v1");
        assert_eq!(review["kind"], "AdmissionReview");
        assert_eq!(review["response"]["uid"], TEST_UID);
        assert_eq!(review["response"]["allowed"], true);
        assert_eq!(review["response"]["patchType"], "JSONPatch");
        assert_eq!(review["response"]["warnings"], json!([MARK_WARNING]));

        let ops = patch_ops(&review);
        assert_eq!(
            ops,
            vec![
                json!({"op": "replace", "path": "/spec/containers/0/imagePullPolicy", "value": "Always"}),
                json!({"op": "replace", "path": "/spec/containers/1/imagePullPolicy", "value": "Always"}),
            ]
        );
    }

    #[tokio::test]
    async fn test_unset_policy_is_added() {
        let (router, _) = router(Some(PullPolicy::IfNotPresent));
        let pod = pod_with_policies(&[None]);

        let (_, review) = post(router, ReviewBuilder::new(pod).body()).await;
        let ops = patch_ops(&review);
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0]["op"], "add");
        assert_eq!(ops[0]["path"], "/spec/containers/0/imagePullPolicy");
        assert_eq!(ops[0]["value"], "IfNotPresent");
    }

    #[tokio::test]
    async fn test_init_containers_untouched() {
        let (router, _) = router(Some(PullPolicy::Always));
        let pod = PodBuilder::new("web")
            .init_container("setup", Some("Never"))
            .container("app", Some("Always"))
            .build();

        let (_, review) = post(router, ReviewBuilder::new(pod).body()).await;
        assert_eq!(review["response"]["allowed"], true);
        assert!(review["response"].get("patch").is_none_or(Value::is_null));
    }

    #[tokio::test]
    async fn test_already_compliant_pod_has_no_patch() {
        let (router, _) = router(Some(PullPolicy::Never));
        let pod = pod_with_policies(&[Some("Never"), Some("Never")]);

        let (status, review) = post(router, ReviewBuilder::new(pod).body()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(review["response"]["allowed"], true);
        assert!(review["response"].get("patch").is_none_or(Value::is_null));
        assert_eq!(review["response"]["warnings"], json!([MARK_WARNING]));
    }

    #[tokio::test]
    async fn test_unsupported_kind_passes_through() {
        let (router, _) = router(Some(PullPolicy::Always));
        let deployment = json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {"name": "web", "namespace": "default"},
            "spec": {"template": {"spec": {"containers": [
                {"name": "a", "image": "nginx", "imagePullPolicy": "Never"}
            ]}}}
        });
        let body = ReviewBuilder::new(deployment)
            .gvk("apps", "v1", "Deployment", "deployments")
            .body();

        let (status, review) = post(router, body).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(review["response"]["uid"], TEST_UID);
        assert_eq!(review["response"]["allowed"], true);
        assert!(review["response"].get("patch").is_none_or(Value::is_null));
    }

    #[tokio::test]
    async fn test_disabled_policy_never_patches_or_warns() {
        let (router, _) = router(None);
        let pod = pod_with_policies(&[Some("Never"), None]);

        let (status, review) = post(router, ReviewBuilder::new(pod).body()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(review["response"]["allowed"], true);
        assert!(review["response"].get("patch").is_none_or(Value::is_null));
        assert!(review["response"].get("warnings").is_none_or(Value::is_null));
    }

    #[tokio::test]
    async fn test_v1beta1_review_answered_in_kind() {
        let (router, _) = router(Some(PullPolicy::Always));
        let body = ReviewBuilder::new(pod_with_policies(&[Some("Never")]))
            .api_version("admission.k8s.io/v1beta1")
            .body();

        let (status, review) = post(router, body).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(review["apiVersion"], "admission.k8s.io/v1beta1");
        assert_eq!(review["response"]["uid"], TEST_UID);
    }

    #[tokio::test]
    async fn test_delete_without_object_is_allowed() {
        let (router, _) = router(Some(PullPolicy::Always));
        let body = ReviewBuilder::without_object("Pod")
            .operation("DELETE")
            .old_object(pod_with_policies(&[Some("Never")]))
            .body();

        let (status, review) = post(router, body).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(review["response"]["allowed"], true);
        assert!(review["response"].get("patch").is_none_or(Value::is_null));
    }

    #[tokio::test]
    async fn test_malformed_pod_is_denied_with_uid() {
        let (router, _) = router(Some(PullPolicy::Always));
        let pod = json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {"name": "web"},
            "spec": {"containers": "not-a-list"}
        });

        let (status, review) = post(router, ReviewBuilder::new(pod).uid("broken-pod").body()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(review["response"]["uid"], "broken-pod");
        assert_eq!(review["response"]["allowed"], false);
    }

    #[tokio::test]
    async fn test_garbage_body_is_bad_request() {
        let (router, _) = router(Some(PullPolicy::Always));
        let (status, review) = post(router, b"{\"definitely\": \"not a review\"".to_vec()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(review["response"]["allowed"], false);
        assert_eq!(review["response"]["uid"], "");
    }

    #[tokio::test]
    async fn test_unparseable_request_defers_to_failure_policy() {
        let (router, _) = router(Some(PullPolicy::Always));
        let mut body = ReviewBuilder::new(pod_with_policies(&[Some("Never")])).build();
        body["request"]["operation"] = json!("EXPLODE");

        let (status, review) = post(router, serde_json::to_vec(&body).unwrap()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(review["apiVersion"], "admission.k8s.io/v1");
        assert_eq!(review["kind"], "AdmissionReview");
        assert_eq!(review["response"]["uid"], TEST_UID);
        assert_eq!(review["response"]["allowed"], false);
    }

    #[tokio::test]
    async fn test_reviews_are_counted() {
        let (router, registry) = router(Some(PullPolicy::Always));
        let pod = pod_with_policies(&[Some("Never")]);
        post(router.clone(), ReviewBuilder::new(pod.clone()).body()).await;
        post(router, ReviewBuilder::new(pod).operation("UPDATE").body()).await;

        let text = encode_registry(&registry);
        assert!(text.contains("admission_reviews_total"));
        assert!(text.contains(&format!("webhook=\"{}\"", WEBHOOK_ID)));
        assert!(text.contains("operation=\"CREATE\""));
        assert!(text.contains("operation=\"UPDATE\""));
        assert!(text.contains("outcome=\"mutated\""));
        assert!(text.contains("http_requests_total"));
    }
}
