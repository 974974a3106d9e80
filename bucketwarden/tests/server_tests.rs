// bucketwarden/tests/server_tests.rs
//! Drives the router in-process, with in-memory collaborators and with the
//! real HTTP clients pointed at mocked storage and chat APIs.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use base64::{engine::general_purpose, Engine as _};
use clap::Parser;
use mockito::Matcher;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use test_log::test;
use tower::ServiceExt;

use bucketwarden::bootstrap::build_pipeline;
use bucketwarden::cli::Cli;
use bucketwarden::router;
use bucketwarden_core::{
    AccessPolicy, AlertMessage, Binding, DeliveryError, HandlerConfig, MemoryPolicyStore, Notifier, Pipeline,
    RecordingNotifier,
};

fn push_body(finding: serde_json::Value) -> String {
    let data = general_purpose::STANDARD.encode(json!({ "finding": finding }).to_string());
    json!({
        "message": {"messageId": "42", "data": data},
        "subscription": "projects/p/subscriptions/scc",
    })
    .to_string()
}

fn post(body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/")
        .header("content-type", "application/json")
        .body(body.into())
        .unwrap()
}

fn in_memory(
    notifier: RecordingNotifier,
) -> (Arc<MemoryPolicyStore>, Arc<RecordingNotifier>, axum::Router) {
    let store = Arc::new(MemoryPolicyStore::new());
    let notifier = Arc::new(notifier);
    let config = HandlerConfig::with_defaults("#alerts").unwrap();
    let pipeline = Pipeline::new(&config, store.clone(), notifier.clone());
    (store, notifier, router(Arc::new(pipeline), 64 * 1024))
}

fn public_policy() -> AccessPolicy {
    AccessPolicy {
        version: Some(1),
        bindings: vec![Binding {
            role: "roles/viewer".into(),
            members: ["allUsers".to_string(), "user:alice@example.com".to_string()].into_iter().collect(),
            condition: None,
        }],
        extra: Default::default(),
    }
}

#[test(tokio::test)]
async fn success_is_200_with_empty_body() {
    let (_store, notifier, app) = in_memory(RecordingNotifier::new());
    let body = push_body(json!({"category": "OPEN_FIREWALL", "externalUri": "https://example/resource"}));

    let resp = app.oneshot(post(body)).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    assert!(bytes.is_empty());
    assert_eq!(notifier.sent().len(), 1);
}

#[test(tokio::test)]
async fn malformed_body_is_400_without_side_effects() {
    let (store, notifier, app) = in_memory(RecordingNotifier::new());

    let resp = app.oneshot(post("{\"message\": 12")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(store.reads(), 0);
    assert!(notifier.sent().is_empty());
}

#[test(tokio::test)]
async fn unknown_category_is_acknowledged() {
    let (store, notifier, app) = in_memory(RecordingNotifier::new());
    store.insert("bucket-one", public_policy(), "e1");
    let body = push_body(json!({"category": "NEW_CATEGORY", "resourceName": "//storage.googleapis.com/bucket-one"}));

    let resp = app.oneshot(post(body)).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert!(store.writes().is_empty());
    assert!(notifier.sent().is_empty());
}

#[test(tokio::test)]
async fn stale_etag_is_503_for_redelivery() {
    let (store, _notifier, app) = in_memory(RecordingNotifier::new());
    store.insert("bucket-one", public_policy(), "e1");
    store.bump_version_on_next_read("bucket-one");
    let body = push_body(json!({"category": "PUBLIC_BUCKET_ACL", "resourceName": "//storage.googleapis.com/bucket-one"}));

    let resp = app.oneshot(post(body)).await.unwrap();

    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(store.policy("bucket-one").unwrap().is_public());
}

#[test(tokio::test)]
async fn rejected_alert_is_400() {
    let (_store, _notifier, app) = in_memory(RecordingNotifier::failing("channel_not_found"));
    let body = push_body(json!({"category": "OPEN_FIREWALL"}));

    let resp = app.oneshot(post(body)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

struct HangingNotifier;

#[async_trait]
impl Notifier for HangingNotifier {
    fn name(&self) -> &str {
        "hanging"
    }

    async fn post(&self, _message: &AlertMessage) -> Result<(), DeliveryError> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(())
    }
}

#[test(tokio::test)]
async fn alert_timeout_is_503_for_redelivery() {
    let mut config = HandlerConfig::with_defaults("#alerts").unwrap();
    config.call_timeout = Duration::from_millis(20);
    let pipeline = Pipeline::new(&config, Arc::new(MemoryPolicyStore::new()), Arc::new(HangingNotifier));
    let app = router(Arc::new(pipeline), 64 * 1024);

    let resp = app.oneshot(post(push_body(json!({"category": "OPEN_FIREWALL"})))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[test(tokio::test)]
async fn oversized_body_is_rejected() {
    let store = Arc::new(MemoryPolicyStore::new());
    let config = HandlerConfig::with_defaults("#alerts").unwrap();
    let pipeline = Pipeline::new(&config, store.clone(), Arc::new(RecordingNotifier::new()));
    let app = router(Arc::new(pipeline), 16);

    let resp = app.oneshot(post(push_body(json!({"category": "OPEN_FIREWALL"})))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[test(tokio::test)]
async fn healthz_answers_ok() {
    let (_store, _notifier, app) = in_memory(RecordingNotifier::new());
    let req = Request::builder().uri("/healthz").body(Body::empty()).unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[test(tokio::test)]
async fn end_to_end_against_mocked_apis() {
    let mut server = mockito::Server::new_async().await;
    let get = server
        .mock("GET", "/storage/v1/b/my-bucket/iam")
        .match_query(Matcher::UrlEncoded("optionsRequestedPolicyVersion".into(), "3".into()))
        .match_header("authorization", "Bearer gcs-token")
        .with_status(200)
        .with_body(
            json!({
                "etag": "CAE=",
                "version": 1,
                "bindings": [{"role": "roles/viewer", "members": ["allUsers", "user:alice@example.com"]}]
            })
            .to_string(),
        )
        .create_async()
        .await;
    let put = server
        .mock("PUT", "/storage/v1/b/my-bucket/iam")
        .match_body(Matcher::PartialJson(json!({
            "etag": "CAE=",
            "bindings": [{"role": "roles/viewer", "members": ["user:alice@example.com"]}]
        })))
        .with_status(200)
        .with_body("{}")
        .create_async()
        .await;
    let chat = server
        .mock("POST", "/api/chat.postMessage")
        .match_header("authorization", "Bearer xoxb-1")
        .match_body(Matcher::PartialJson(json!({"channel": "C42"})))
        .with_status(200)
        .with_body(r#"{"ok": true}"#)
        .create_async()
        .await;

    let url = server.url();
    let cli = Cli::parse_from([
        "bucketwarden",
        "--slack-token", "xoxb-1",
        "--slack-channel", "C42",
        "--slack-api-url", url.as_str(),
        "--gcs-token", "gcs-token",
        "--storage-api-url", url.as_str(),
    ]);
    let app = router(Arc::new(build_pipeline(&cli).unwrap()), cli.max_body_bytes);

    let body = push_body(json!({
        "category": "PUBLIC_BUCKET_ACL",
        "resourceName": "//storage.googleapis.com/my-bucket",
        "externalUri": "https://console.example/my-bucket",
        "eventTime": "2024-01-01T00:00:00Z"
    }));
    let resp = app.oneshot(post(body)).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    get.assert_async().await;
    put.assert_async().await;
    chat.assert_async().await;
}
