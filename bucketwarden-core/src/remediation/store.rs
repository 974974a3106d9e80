// bucketwarden-core/src/remediation/store.rs
//! Policy store implementations.
//!
//! `gcs` talks to the Cloud Storage IAM JSON API. [`MemoryPolicyStore`] keeps
//! policies in process with the same etag semantics, for local runs and tests.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::errors::PolicyStoreError;
use crate::policy::{AccessPolicy, PolicyVersion, VersionedPolicy};
use crate::remediation::PolicyStore;

pub mod gcs;

/// A write accepted by [`MemoryPolicyStore`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedWrite {
    pub bucket: String,
    pub policy: AccessPolicy,
    pub version: PolicyVersion,
}

#[derive(Default)]
struct MemoryState {
    policies: HashMap<String, VersionedPolicy>,
    writes: Vec<RecordedWrite>,
    reads: usize,
    bump_after_read: HashSet<String>,
    generation: u64,
}

/// In-process policy store with etag checking.
#[derive(Default)]
pub struct MemoryPolicyStore {
    state: Mutex<MemoryState>,
}

impl MemoryPolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, bucket: &str, policy: AccessPolicy, etag: &str) {
        let mut state = self.lock();
        state.policies.insert(
            bucket.to_string(),
            VersionedPolicy { policy, version: PolicyVersion(etag.to_string()) },
        );
    }

    pub fn policy(&self, bucket: &str) -> Option<AccessPolicy> {
        self.lock().policies.get(bucket).map(|v| v.policy.clone())
    }

    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.lock().writes.clone()
    }

    pub fn reads(&self) -> usize {
        self.lock().reads
    }

    /// Simulates another writer touching `bucket` right after the next read.
    pub fn bump_version_on_next_read(&self, bucket: &str) {
        self.lock().bump_after_read.insert(bucket.to_string());
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        // A panicking test thread must not hide the state from the others.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl PolicyStore for MemoryPolicyStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get_policy(&self, bucket: &str) -> Result<VersionedPolicy, PolicyStoreError> {
        let mut state = self.lock();
        state.reads += 1;
        let current = state.policies.get(bucket).cloned().ok_or_else(|| PolicyStoreError::Status {
            status: 404,
            body: format!("bucket '{}' not found", bucket),
        })?;

        if state.bump_after_read.remove(bucket) {
            state.generation += 1;
            let etag = format!("external-{}", state.generation);
            if let Some(entry) = state.policies.get_mut(bucket) {
                entry.version = PolicyVersion(etag);
            }
        }
        Ok(current)
    }

    async fn set_policy(
        &self,
        bucket: &str,
        policy: &AccessPolicy,
        version: &PolicyVersion,
    ) -> Result<(), PolicyStoreError> {
        let mut state = self.lock();
        state.generation += 1;
        let next = PolicyVersion(format!("gen-{}", state.generation));

        let entry = state.policies.get_mut(bucket).ok_or_else(|| PolicyStoreError::Status {
            status: 404,
            body: format!("bucket '{}' not found", bucket),
        })?;
        if &entry.version != version {
            return Err(PolicyStoreError::Status {
                status: 412,
                body: format!("etag '{}' is stale", version),
            });
        }
        *entry = VersionedPolicy { policy: policy.clone(), version: next };

        state.writes.push(RecordedWrite {
            bucket: bucket.to_string(),
            policy: policy.clone(),
            version: version.clone(),
        });
        Ok(())
    }
}
