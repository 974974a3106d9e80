//! Configuration management for `bucketwarden-core`.
//!
//! Two layers live here:
//!
//! * the category table, a YAML list mapping finding categories to an action
//!   and an alert template, with an embedded default that operators can
//!   extend or override from a file;
//! * [`HandlerConfig`], the fully-resolved settings value that the binary
//!   builds once at startup and hands to the pipeline. Nothing in the core
//!   reads the process environment.
//!
//! License: MIT OR Apache-2.0

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Duration;
use tinytemplate::TinyTemplate;

use crate::errors::ConfigError;

/// Resource-name prefix of Cloud Storage buckets in finding documents.
pub const DEFAULT_STORAGE_PREFIX: &str = "//storage.googleapis.com/";

/// Per-call bound on policy-store and notifier requests.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// What the handler does for a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
    /// Post an informational alert only.
    Alert,
    /// Remove public principals from the bucket, then post a confirmation.
    RemediatePublicBucket,
}

/// One entry of the category table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRule {
    /// Finding category this rule matches, compared exactly (e.g. "OPEN_FIREWALL").
    pub name: String,
    pub action: RuleAction,
    /// Alert template; the action's built-in template is used when absent.
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Explicit override for enabling/disabling the rule.
    #[serde(default)]
    pub enabled: Option<bool>,
}

impl CategoryRule {
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }
}

/// The category table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryConfig {
    #[serde(default)]
    pub categories: Vec<CategoryRule>,
}

impl CategoryConfig {
    /// Loads a category table from a YAML file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!("Loading category table from: {}", path.display());
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_yaml(&text)?;
        info!("Loaded {} categories from file {}.", config.categories.len(), path.display());
        Ok(config)
    }

    /// Loads the built-in category table.
    pub fn load_default_categories() -> Result<Self, ConfigError> {
        debug!("Loading default categories from embedded string...");
        let default_yaml = include_str!("../config/default_categories.yaml");
        let config = Self::from_yaml(default_yaml)?;
        debug!("Loaded {} default categories.", config.categories.len());
        Ok(config)
    }

    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let config: CategoryConfig =
            serde_yml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        validate_categories(&config.categories)?;
        Ok(config)
    }

    /// Adds plain alert-only rules for the given categories unless already present.
    pub fn with_alert_categories(mut self, names: &[String]) -> Self {
        let known: HashSet<String> = self.categories.iter().map(|c| c.name.clone()).collect();
        for name in names.iter().filter(|n| !n.is_empty()) {
            if known.contains(name) {
                warn!("Category '{}' is already configured; keeping its existing rule.", name);
                continue;
            }
            self.categories.push(CategoryRule {
                name: name.clone(),
                action: RuleAction::Alert,
                template: None,
                description: None,
                enabled: None,
            });
        }
        self
    }

    /// Enabled rules only.
    pub fn active(&self) -> impl Iterator<Item = &CategoryRule> {
        self.categories.iter().filter(|c| c.is_enabled())
    }
}

/// Merges an operator table over the defaults. A rule with the same name replaces the default one.
pub fn merge_categories(default_config: CategoryConfig, user_config: Option<CategoryConfig>) -> CategoryConfig {
    debug!("merge_categories called. Default categories: {}", default_config.categories.len());

    let mut order: Vec<String> = Vec::new();
    let mut by_name: HashMap<String, CategoryRule> = HashMap::new();
    let all = default_config
        .categories
        .into_iter()
        .chain(user_config.into_iter().flat_map(|u| u.categories));

    for rule in all {
        if !by_name.contains_key(&rule.name) {
            order.push(rule.name.clone());
        }
        by_name.insert(rule.name.clone(), rule);
    }

    let categories: Vec<CategoryRule> = order
        .into_iter()
        .filter_map(|name| by_name.remove(&name))
        .collect();
    debug!("Final categories after merge: {}", categories.len());

    CategoryConfig { categories }
}

/// Checks names and template syntax, collecting every problem before failing.
fn validate_categories(rules: &[CategoryRule]) -> Result<(), ConfigError> {
    let mut names = HashSet::new();
    let mut errors = Vec::new();

    for rule in rules {
        if rule.name.trim().is_empty() {
            errors.push("A category has an empty `name` field.".to_string());
        } else if !names.insert(rule.name.as_str()) {
            errors.push(format!("Duplicate category found: '{}'.", rule.name));
        }

        if let Some(template) = &rule.template {
            let mut tt = TinyTemplate::new();
            if let Err(e) = tt.add_template(&rule.name, template) {
                errors.push(format!("Category '{}' has an invalid template: {}", rule.name, e));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::Invalid(errors.join("\n")))
    }
}

/// Resolved settings for one handler process.
#[derive(Debug, Clone)]
pub struct HandlerConfig {
    /// Chat channel receiving alerts.
    pub channel: String,
    /// Prefix stripped from `resourceName` to obtain the bucket name.
    pub storage_prefix: String,
    /// Post a generic alert for categories with no rule instead of staying silent.
    pub notify_unhandled: bool,
    pub call_timeout: Duration,
    pub categories: CategoryConfig,
}

impl HandlerConfig {
    /// Settings with the embedded category table.
    pub fn with_defaults(channel: impl Into<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            channel: channel.into(),
            storage_prefix: DEFAULT_STORAGE_PREFIX.to_string(),
            notify_unhandled: false,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            categories: CategoryConfig::load_default_categories()?,
        })
    }
}
