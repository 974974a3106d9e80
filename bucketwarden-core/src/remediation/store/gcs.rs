// bucketwarden-core/src/remediation/store/gcs.rs
//! Cloud Storage IAM JSON API backed implementation of the PolicyStore.
//!
//! `GET  {base}/storage/v1/b/{bucket}/iam?optionsRequestedPolicyVersion=3`
//! returns the policy with its etag. Version 3 is requested so that policies
//! carrying conditional bindings can be read at all;
//! `PUT` of the same document (etag included) replaces it and answers 412 when
//! the etag is stale.

use async_trait::async_trait;
use log::debug;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

use crate::errors::PolicyStoreError;
use crate::policy::{AccessPolicy, PolicyVersion, VersionedPolicy};
use crate::remediation::PolicyStore;

pub const DEFAULT_STORAGE_API: &str = "https://storage.googleapis.com";
pub const DEFAULT_METADATA_HOST: &str = "http://metadata.google.internal";

/// Highest IAM policy schema; required to read bindings with conditions.
const REQUESTED_POLICY_VERSION: &str = "3";

const METADATA_TOKEN_PATH: &str = "/computeMetadata/v1/instance/service-accounts/default/token";

/// Where bearer tokens for the storage API come from.
#[derive(Debug, Clone)]
pub enum TokenSource {
    /// A fixed access token supplied by the operator.
    Static(String),
    /// The instance's default service account, via the metadata server.
    MetadataServer { base_url: String },
}

#[derive(Deserialize)]
struct MetadataToken {
    access_token: String,
}

pub struct GcsPolicyStore {
    client: Client,
    base_url: String,
    tokens: TokenSource,
    timeout: Duration,
}

impl GcsPolicyStore {
    pub fn new(base_url: impl Into<String>, tokens: TokenSource, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("bucketwarden/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tokens,
            timeout,
        })
    }

    fn iam_url(&self, bucket: &str) -> String {
        format!("{}/storage/v1/b/{}/iam", self.base_url, bucket)
    }

    async fn access_token(&self) -> Result<String, PolicyStoreError> {
        match &self.tokens {
            TokenSource::Static(token) => Ok(token.clone()),
            TokenSource::MetadataServer { base_url } => {
                let url = format!("{}{}", base_url.trim_end_matches('/'), METADATA_TOKEN_PATH);
                let resp = self
                    .client
                    .get(&url)
                    .header("Metadata-Flavor", "Google")
                    .send()
                    .await
                    .map_err(|e| PolicyStoreError::Credentials { status: None, message: e.to_string() })?;
                let status = resp.status();
                if !status.is_success() {
                    return Err(PolicyStoreError::Credentials {
                        status: Some(status.as_u16()),
                        message: format!("metadata server answered HTTP {}", status.as_u16()),
                    });
                }
                let token: MetadataToken = resp
                    .json()
                    .await
                    .map_err(|e| PolicyStoreError::Credentials { status: None, message: e.to_string() })?;
                Ok(token.access_token)
            }
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, PolicyStoreError> {
        let token = self.access_token().await?;
        let resp = request
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(PolicyStoreError::Status { status: status.as_u16(), body })
    }

    fn transport_error(&self, e: reqwest::Error) -> PolicyStoreError {
        if e.is_timeout() {
            PolicyStoreError::Timeout(self.timeout)
        } else {
            PolicyStoreError::Transport(e.to_string())
        }
    }
}

#[async_trait]
impl PolicyStore for GcsPolicyStore {
    fn name(&self) -> &str {
        "gcs"
    }

    async fn get_policy(&self, bucket: &str) -> Result<VersionedPolicy, PolicyStoreError> {
        let url = self.iam_url(bucket);
        debug!("GET {} (policy version {})", url, REQUESTED_POLICY_VERSION);
        let request = self
            .client
            .get(&url)
            .query(&[("optionsRequestedPolicyVersion", REQUESTED_POLICY_VERSION)]);
        let resp = self.send(request).await?;
        let mut document: Value = resp.json().await.map_err(|e| self.transport_error(e))?;

        let etag = document
            .as_object_mut()
            .and_then(|o| o.remove("etag"))
            .and_then(|v| v.as_str().map(str::to_string))
            .filter(|s| !s.is_empty())
            .ok_or_else(|| PolicyStoreError::Malformed("policy has no etag".to_string()))?;

        let policy: AccessPolicy =
            serde_json::from_value(document).map_err(|e| PolicyStoreError::Malformed(e.to_string()))?;

        Ok(VersionedPolicy { policy, version: PolicyVersion(etag) })
    }

    async fn set_policy(
        &self,
        bucket: &str,
        policy: &AccessPolicy,
        version: &PolicyVersion,
    ) -> Result<(), PolicyStoreError> {
        let mut document =
            serde_json::to_value(policy).map_err(|e| PolicyStoreError::Malformed(e.to_string()))?;
        if let Some(object) = document.as_object_mut() {
            object.insert("etag".to_string(), Value::String(version.as_str().to_string()));
        }

        let url = self.iam_url(bucket);
        debug!("PUT {} (etag {})", url, version);
        self.send(self.client.put(&url).json(&document)).await?;
        Ok(())
    }
}
