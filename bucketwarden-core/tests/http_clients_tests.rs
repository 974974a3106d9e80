// bucketwarden-core/tests/http_clients_tests.rs
//! The storage IAM and chat clients against mocked HTTP endpoints.

use mockito::Matcher;
use serde_json::json;
use std::time::Duration;
use test_log::test;

use bucketwarden_core::{
    strip_public_members, AlertMessage, DeliveryError, GcsPolicyStore, Notifier, PolicyStore,
    PolicyStoreError, SlackNotifier, TokenSource,
};

const TIMEOUT: Duration = Duration::from_secs(2);

fn requested_policy_version() -> Matcher {
    Matcher::UrlEncoded("optionsRequestedPolicyVersion".into(), "3".into())
}

fn iam_document() -> serde_json::Value {
    json!({
        "kind": "storage#policy",
        "resourceId": "projects/_/buckets/my-bucket",
        "version": 1,
        "etag": "CAE=",
        "bindings": [
            {"role": "roles/storage.legacyBucketOwner", "members": ["projectOwner:p"]},
            {"role": "roles/viewer", "members": ["allUsers", "user:alice@example.com"]}
        ]
    })
}

#[test(tokio::test)]
async fn gcs_get_policy_splits_etag_from_policy() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/storage/v1/b/my-bucket/iam")
        .match_query(requested_policy_version())
        .match_header("authorization", "Bearer static-token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(iam_document().to_string())
        .create_async()
        .await;

    let store = GcsPolicyStore::new(server.url(), TokenSource::Static("static-token".into()), TIMEOUT).unwrap();
    let fetched = store.get_policy("my-bucket").await.unwrap();

    mock.assert_async().await;
    assert_eq!(fetched.version.as_str(), "CAE=");
    assert_eq!(fetched.policy.bindings.len(), 2);
    assert!(fetched.policy.is_public());
    assert!(!fetched.policy.extra.contains_key("etag"));
}

#[test(tokio::test)]
async fn gcs_set_policy_sends_etag_and_preserved_fields() {
    let mut server = mockito::Server::new_async().await;
    let _get = server
        .mock("GET", "/storage/v1/b/my-bucket/iam")
        .match_query(requested_policy_version())
        .with_status(200)
        .with_body(iam_document().to_string())
        .create_async()
        .await;
    let put = server
        .mock("PUT", "/storage/v1/b/my-bucket/iam")
        .match_header("authorization", "Bearer static-token")
        .match_body(Matcher::PartialJson(json!({
            "etag": "CAE=",
            "resourceId": "projects/_/buckets/my-bucket",
            "bindings": [
                {"role": "roles/storage.legacyBucketOwner", "members": ["projectOwner:p"]},
                {"role": "roles/viewer", "members": ["user:alice@example.com"]}
            ]
        })))
        .with_status(200)
        .with_body("{}")
        .create_async()
        .await;

    let store = GcsPolicyStore::new(server.url(), TokenSource::Static("static-token".into()), TIMEOUT).unwrap();
    let fetched = store.get_policy("my-bucket").await.unwrap();
    let (cleaned, _) = strip_public_members(&fetched.policy);
    store.set_policy("my-bucket", &cleaned, &fetched.version).await.unwrap();

    put.assert_async().await;
}

#[test(tokio::test)]
async fn gcs_stale_etag_is_retryable_status() {
    let mut server = mockito::Server::new_async().await;
    let _put = server
        .mock("PUT", "/storage/v1/b/b1/iam")
        .with_status(412)
        .with_body(r#"{"error": {"code": 412, "message": "Precondition Failed"}}"#)
        .create_async()
        .await;

    let store = GcsPolicyStore::new(server.url(), TokenSource::Static("t".into()), TIMEOUT).unwrap();
    let err = store
        .set_policy("b1", &Default::default(), &bucketwarden_core::PolicyVersion("old".into()))
        .await
        .unwrap_err();

    assert!(matches!(err, PolicyStoreError::Status { status: 412, .. }));
    assert!(err.is_retryable());
}

#[test(tokio::test)]
async fn gcs_permission_denied_is_permanent() {
    let mut server = mockito::Server::new_async().await;
    let _get = server
        .mock("GET", "/storage/v1/b/locked/iam")
        .match_query(requested_policy_version())
        .with_status(403)
        .with_body("forbidden")
        .create_async()
        .await;

    let store = GcsPolicyStore::new(server.url(), TokenSource::Static("t".into()), TIMEOUT).unwrap();
    let err = store.get_policy("locked").await.unwrap_err();
    assert!(matches!(err, PolicyStoreError::Status { status: 403, .. }));
    assert!(!err.is_retryable());
}

#[test(tokio::test)]
async fn gcs_policy_without_etag_is_malformed() {
    let mut server = mockito::Server::new_async().await;
    let _get = server
        .mock("GET", "/storage/v1/b/b1/iam")
        .match_query(requested_policy_version())
        .with_status(200)
        .with_body(r#"{"bindings": []}"#)
        .create_async()
        .await;

    let store = GcsPolicyStore::new(server.url(), TokenSource::Static("t".into()), TIMEOUT).unwrap();
    assert!(matches!(store.get_policy("b1").await, Err(PolicyStoreError::Malformed(_))));
}

#[test(tokio::test)]
async fn gcs_token_from_metadata_server() {
    let mut server = mockito::Server::new_async().await;
    let token = server
        .mock("GET", "/computeMetadata/v1/instance/service-accounts/default/token")
        .match_header("metadata-flavor", "Google")
        .with_status(200)
        .with_body(r#"{"access_token": "ya29.meta", "expires_in": 3599, "token_type": "Bearer"}"#)
        .create_async()
        .await;
    let get = server
        .mock("GET", "/storage/v1/b/my-bucket/iam")
        .match_query(requested_policy_version())
        .match_header("authorization", "Bearer ya29.meta")
        .with_status(200)
        .with_body(iam_document().to_string())
        .create_async()
        .await;

    let store = GcsPolicyStore::new(
        server.url(),
        TokenSource::MetadataServer { base_url: server.url() },
        TIMEOUT,
    )
    .unwrap();
    store.get_policy("my-bucket").await.unwrap();

    token.assert_async().await;
    get.assert_async().await;
}

#[test(tokio::test)]
async fn gcs_metadata_failure_is_credentials_error() {
    let mut server = mockito::Server::new_async().await;
    let _token = server
        .mock("GET", "/computeMetadata/v1/instance/service-accounts/default/token")
        .with_status(404)
        .create_async()
        .await;

    let store = GcsPolicyStore::new(
        server.url(),
        TokenSource::MetadataServer { base_url: server.url() },
        TIMEOUT,
    )
    .unwrap();
    let err = store.get_policy("b1").await.unwrap_err();
    assert!(matches!(err, PolicyStoreError::Credentials { status: Some(404), .. }));
    assert!(!err.is_retryable());
}

#[test(tokio::test)]
async fn gcs_reads_and_writes_conditional_bindings() {
    let condition = json!({
        "title": "expires",
        "expression": "request.time < timestamp(\"2030-01-01T00:00:00Z\")"
    });
    let mut server = mockito::Server::new_async().await;
    let _unversioned = server
        .mock("GET", "/storage/v1/b/cond-bucket/iam")
        .with_status(400)
        .with_body("policy has conditions, request version 3")
        .create_async()
        .await;
    let get = server
        .mock("GET", "/storage/v1/b/cond-bucket/iam")
        .match_query(requested_policy_version())
        .with_status(200)
        .with_body(
            json!({
                "version": 3,
                "etag": "CAM=",
                "bindings": [
                    {"role": "roles/viewer", "members": ["allUsers", "user:bob@example.com"], "condition": condition}
                ]
            })
            .to_string(),
        )
        .create_async()
        .await;
    let put = server
        .mock("PUT", "/storage/v1/b/cond-bucket/iam")
        .match_body(Matcher::PartialJson(json!({
            "version": 3,
            "etag": "CAM=",
            "bindings": [
                {"role": "roles/viewer", "members": ["user:bob@example.com"], "condition": condition}
            ]
        })))
        .with_status(200)
        .with_body("{}")
        .create_async()
        .await;

    let store = GcsPolicyStore::new(server.url(), TokenSource::Static("t".into()), TIMEOUT).unwrap();
    let fetched = store.get_policy("cond-bucket").await.unwrap();
    assert_eq!(fetched.policy.version, Some(3));
    assert!(fetched.policy.bindings[0].condition.is_some());

    let (cleaned, removed) = strip_public_members(&fetched.policy);
    assert_eq!(removed.len(), 1);
    store.set_policy("cond-bucket", &cleaned, &fetched.version).await.unwrap();

    get.assert_async().await;
    put.assert_async().await;
}

fn alert() -> AlertMessage {
    AlertMessage { channel: "C0123".to_string(), text: "hello".to_string() }
}

#[test(tokio::test)]
async fn slack_posts_channel_and_text_with_bearer_token() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/api/chat.postMessage")
        .match_header("authorization", "Bearer xoxb-test")
        .match_body(Matcher::Json(json!({"channel": "C0123", "text": "hello"})))
        .with_status(200)
        .with_body(r#"{"ok": true, "ts": "1.0"}"#)
        .create_async()
        .await;

    let notifier = SlackNotifier::new(server.url(), "xoxb-test", TIMEOUT).unwrap();
    notifier.post(&alert()).await.unwrap();
    mock.assert_async().await;
}

#[test(tokio::test)]
async fn slack_ok_false_is_rejection() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/api/chat.postMessage")
        .with_status(200)
        .with_body(r#"{"ok": false, "error": "not_authed"}"#)
        .create_async()
        .await;

    let notifier = SlackNotifier::new(server.url(), "", TIMEOUT).unwrap();
    match notifier.post(&alert()).await {
        Err(DeliveryError::Rejected(reason)) => assert_eq!(reason, "not_authed"),
        other => panic!("unexpected result {:?}", other),
    }
}

#[test(tokio::test)]
async fn slack_server_error_is_retryable() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/api/chat.postMessage")
        .with_status(503)
        .with_body("upstream down")
        .create_async()
        .await;

    let notifier = SlackNotifier::new(server.url(), "t", TIMEOUT).unwrap();
    let err = notifier.post(&alert()).await.unwrap_err();
    assert!(matches!(err, DeliveryError::Status { status: 503, .. }));
    assert!(err.is_retryable());
}
