//! Bucket access policy model and the pure public-access removal step.
//!
//! The policy is treated as an immutable snapshot: [`strip_members`] builds a
//! new policy instead of editing bindings in place, which keeps the
//! remediation step a plain function that is easy to test.
//!
//! License: MIT OR APACHE 2.0

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Principal granting access to anyone on the internet.
pub const ALL_USERS: &str = "allUsers";
/// Principal granting access to anyone holding any account.
pub const ALL_AUTHENTICATED_USERS: &str = "allAuthenticatedUsers";
/// The principals removed by bucket remediation.
pub const PUBLIC_PRINCIPALS: [&str; 2] = [ALL_USERS, ALL_AUTHENTICATED_USERS];

/// One role grant. `condition` is carried verbatim so conditional grants
/// survive a rewrite unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    pub role: String,
    #[serde(default)]
    pub members: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Value>,
}

/// A bucket's access policy, without its concurrency token.
///
/// Fields the model does not know about (`kind`, `resourceId`, ...) are kept in
/// `extra` and written back untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccessPolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
    #[serde(default)]
    pub bindings: Vec<Binding>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Opaque concurrency token (etag) read together with a policy.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PolicyVersion(pub String);

impl PolicyVersion {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PolicyVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A policy together with the token it was read at.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionedPolicy {
    pub policy: AccessPolicy,
    pub version: PolicyVersion,
}

/// A `(role, principal)` pair removed from a policy.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RemovedGrant {
    pub role: String,
    pub principal: String,
}

impl AccessPolicy {
    /// Distinct roles in binding order.
    pub fn roles(&self) -> Vec<&str> {
        let mut seen = BTreeSet::new();
        self.bindings
            .iter()
            .map(|b| b.role.as_str())
            .filter(|r| seen.insert(*r))
            .collect()
    }

    pub fn has_member(&self, role: &str, principal: &str) -> bool {
        self.bindings
            .iter()
            .any(|b| b.role == role && b.members.contains(principal))
    }

    /// Union of members over every binding of `role`.
    pub fn members_of(&self, role: &str) -> BTreeSet<&str> {
        self.bindings
            .iter()
            .filter(|b| b.role == role)
            .flat_map(|b| b.members.iter().map(String::as_str))
            .collect()
    }

    /// Whether any binding names one of the public principals.
    pub fn is_public(&self) -> bool {
        self.bindings
            .iter()
            .any(|b| PUBLIC_PRINCIPALS.iter().any(|p| b.members.contains(*p)))
    }
}

/// Returns `policy` without any of `principals`, plus the grants that were dropped.
///
/// Every other member, role, condition and passthrough field is preserved.
/// Bindings left with no members are removed because the store refuses them.
/// Applying the result a second time yields the same policy and no removals.
pub fn strip_members(policy: &AccessPolicy, principals: &[&str]) -> (AccessPolicy, Vec<RemovedGrant>) {
    let mut removed = Vec::new();

    let bindings = policy
        .bindings
        .iter()
        .filter_map(|binding| {
            let (dropped, kept): (BTreeSet<String>, BTreeSet<String>) = binding
                .members
                .iter()
                .cloned()
                .partition(|m| principals.contains(&m.as_str()));

            if dropped.is_empty() {
                return Some(binding.clone());
            }

            removed.extend(dropped.into_iter().map(|principal| RemovedGrant {
                role: binding.role.clone(),
                principal,
            }));

            if kept.is_empty() {
                None
            } else {
                Some(Binding { members: kept, ..binding.clone() })
            }
        })
        .collect();

    let stripped = AccessPolicy {
        version: policy.version,
        bindings,
        extra: policy.extra.clone(),
    };
    (stripped, removed)
}

/// [`strip_members`] with the two public principals.
pub fn strip_public_members(policy: &AccessPolicy) -> (AccessPolicy, Vec<RemovedGrant>) {
    strip_members(policy, &PUBLIC_PRINCIPALS)
}
