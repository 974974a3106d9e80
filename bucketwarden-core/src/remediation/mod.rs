// bucketwarden-core/src/remediation/mod.rs
//! Public-bucket remediation.
//!
//! [`BucketPolicyRemediator`] performs one optimistic read-modify-write against
//! the policy store: fetch the policy and its etag, strip public principals with
//! the pure [`strip_public_members`], and write back only if something changed,
//! passing the fetched etag so a concurrent edit is rejected instead of lost.

use async_trait::async_trait;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::errors::{PolicyStoreError, RemediationError};
use crate::policy::{strip_public_members, AccessPolicy, PolicyVersion, RemovedGrant, VersionedPolicy};

pub mod store;

/// Read/replace access to bucket policies.
#[async_trait]
pub trait PolicyStore: Send + Sync {
    fn name(&self) -> &str;

    /// Reads the current policy and its concurrency token.
    async fn get_policy(&self, bucket: &str) -> Result<VersionedPolicy, PolicyStoreError>;

    /// Replaces the policy, failing if it changed since `version` was read.
    async fn set_policy(
        &self,
        bucket: &str,
        policy: &AccessPolicy,
        version: &PolicyVersion,
    ) -> Result<(), PolicyStoreError>;
}

/// What a remediation run did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemediationOutcome {
    pub bucket: String,
    pub removed: Vec<RemovedGrant>,
    /// False when the policy was already clean and no write was issued.
    pub policy_written: bool,
}

pub struct BucketPolicyRemediator {
    store: Arc<dyn PolicyStore>,
    call_timeout: Duration,
}

impl BucketPolicyRemediator {
    pub fn new(store: Arc<dyn PolicyStore>, call_timeout: Duration) -> Self {
        Self { store, call_timeout }
    }

    /// Removes `allUsers` and `allAuthenticatedUsers` from every role of `bucket`.
    ///
    /// Not retried here; a failed fetch or write is returned to the caller.
    pub async fn remediate(&self, bucket: &str) -> Result<RemediationOutcome, RemediationError> {
        debug!("Fetching access policy of bucket '{}' from {}", bucket, self.store.name());
        let current = bounded(self.call_timeout, self.store.get_policy(bucket))
            .await
            .map_err(|source| RemediationError::PolicyFetch { bucket: bucket.to_string(), source })?;

        let (cleaned, removed) = strip_public_members(&current.policy);

        if removed.is_empty() {
            info!("Bucket '{}' grants no public access; skipping policy write", bucket);
            return Ok(RemediationOutcome {
                bucket: bucket.to_string(),
                removed,
                policy_written: false,
            });
        }

        for grant in &removed {
            warn!("Removing public principal '{}' from role '{}' on bucket '{}'", grant.principal, grant.role, bucket);
        }

        bounded(self.call_timeout, self.store.set_policy(bucket, &cleaned, &current.version))
            .await
            .map_err(|source| RemediationError::PolicyUpdate { bucket: bucket.to_string(), source })?;

        info!("Removed {} public grant(s) from bucket '{}'", removed.len(), bucket);
        Ok(RemediationOutcome {
            bucket: bucket.to_string(),
            removed,
            policy_written: true,
        })
    }
}

async fn bounded<T, F>(limit: Duration, call: F) -> Result<T, PolicyStoreError>
where
    F: Future<Output = Result<T, PolicyStoreError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(PolicyStoreError::Timeout(limit)),
    }
}
