//! Category dispatch.
//!
//! Maps a finding's category string to the action the handler takes. The input
//! domain is open (new categories appear upstream at any time) so every lookup
//! has a default: unknown categories become [`Action::NoOp`] and never fail the
//! request.
//!
//! License: MIT OR APACHE 2.0

use log::{debug, info};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

use crate::alert::{DEFAULT_ALERT_TEMPLATE, DEFAULT_REMEDIATED_TEMPLATE};
use crate::config::{CategoryConfig, RuleAction};
use crate::errors::DecodeError;
use crate::finding::Finding;

static BUCKET_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9][a-z0-9._-]{1,220}[a-z0-9]$").expect("bucket name pattern is valid")
});

/// Resolved handling of one finding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Informational category: post an alert rendered from `template`.
    AlertOnly { template: String },
    /// Public-bucket category: remediate `bucket`, then post an alert from `template`.
    RemediateBucket { bucket: String, template: String },
    /// No rule for this finding.
    NoOp,
}

impl Action {
    pub fn label(&self) -> &'static str {
        match self {
            Action::AlertOnly { .. } => "alert_only",
            Action::RemediateBucket { .. } => "remediate_bucket",
            Action::NoOp => "no_op",
        }
    }
}

#[derive(Debug, Clone)]
struct Handler {
    action: RuleAction,
    template: String,
}

/// Category table compiled for lookups.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    handlers: HashMap<String, Handler>,
    storage_prefix: String,
}

impl Dispatcher {
    /// Builds a dispatcher from the enabled rules of `categories`.
    pub fn new(categories: &CategoryConfig, storage_prefix: impl Into<String>) -> Self {
        let handlers = categories
            .active()
            .map(|rule| {
                let fallback = match rule.action {
                    RuleAction::Alert => DEFAULT_ALERT_TEMPLATE,
                    RuleAction::RemediatePublicBucket => DEFAULT_REMEDIATED_TEMPLATE,
                };
                let template = rule.template.clone().unwrap_or_else(|| fallback.to_string());
                (rule.name.clone(), Handler { action: rule.action, template })
            })
            .collect::<HashMap<_, _>>();

        debug!("Dispatcher ready with {} categories", handlers.len());
        Self { handlers, storage_prefix: storage_prefix.into() }
    }

    pub fn handles(&self, category: &str) -> bool {
        self.handlers.contains_key(category)
    }

    /// Decides what to do with `finding`.
    ///
    /// Only a bucket finding whose resource name is present but unparseable is
    /// an error; everything else resolves to an action.
    pub fn dispatch(&self, finding: &Finding) -> Result<Action, DecodeError> {
        let Some(handler) = self.handlers.get(finding.category.as_str()) else {
            info!("No rule for category '{}'; nothing to do", finding.category);
            return Ok(Action::NoOp);
        };

        match handler.action {
            RuleAction::Alert => Ok(Action::AlertOnly { template: handler.template.clone() }),
            RuleAction::RemediatePublicBucket => {
                if finding.resource_name.is_empty() {
                    info!(
                        "Finding of category '{}' carries no resource name; treating it as unhandled",
                        finding.category
                    );
                    return Ok(Action::NoOp);
                }
                let bucket = parse_bucket_name(&finding.resource_name, &self.storage_prefix)?;
                Ok(Action::RemediateBucket { bucket, template: handler.template.clone() })
            }
        }
    }
}

/// Extracts the bucket name from a storage resource name such as
/// `//storage.googleapis.com/my-bucket`.
pub fn parse_bucket_name(resource_name: &str, prefix: &str) -> Result<String, DecodeError> {
    let bucket = resource_name
        .strip_prefix(prefix)
        .ok_or_else(|| DecodeError::ResourcePrefix {
            resource: resource_name.to_string(),
            prefix: prefix.to_string(),
        })?;

    if !BUCKET_NAME.is_match(bucket) {
        return Err(DecodeError::BucketName(bucket.to_string()));
    }
    Ok(bucket.to_string())
}
