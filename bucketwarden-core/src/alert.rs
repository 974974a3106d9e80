//! Alert composition.
//!
//! Turns a finding and the action taken on it into the chat message posted to
//! the operators' channel. Rendering is deterministic: the same finding,
//! action and outcome always give the same text.
//!
//! License: MIT OR APACHE 2.0

use chrono::SecondsFormat;
use serde::Serialize;
use tinytemplate::{format_unescaped, TinyTemplate};

use crate::dispatch::Action;
use crate::errors::PipelineError;
use crate::finding::Finding;
use crate::remediation::RemediationOutcome;

/// Template for informational categories.
pub const DEFAULT_ALERT_TEMPLATE: &str =
    "{event_time}: Command Center event on category `{category}`\nYou can inspect the resource here: {external_uri}";

/// Template for categories whose public access was removed.
pub const DEFAULT_REMEDIATED_TEMPLATE: &str =
    "{event_time}: Command Center event on category `{category}`\nThe public authorization has been automatically removed on the resource: {external_uri}";

/// Template for categories without a rule, used only when passthrough alerts are enabled.
pub const DEFAULT_UNHANDLED_TEMPLATE: &str =
    "{event_time}: Command Center event on unhandled category `{category}`\nNo automatic action was taken. Resource: {external_uri}";

const UNKNOWN_TIME: &str = "unknown time";

/// Message for the chat transport. Serializes to the `chat.postMessage` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlertMessage {
    pub channel: String,
    pub text: String,
}

#[derive(Serialize)]
struct AlertContext<'a> {
    event_time: String,
    category: &'a str,
    external_uri: &'a str,
    resource_name: &'a str,
    bucket: &'a str,
    removed_count: usize,
}

/// Builds alert messages for one channel.
#[derive(Debug, Clone)]
pub struct AlertComposer {
    channel: String,
    notify_unhandled: bool,
}

impl AlertComposer {
    pub fn new(channel: impl Into<String>, notify_unhandled: bool) -> Self {
        Self { channel: channel.into(), notify_unhandled }
    }

    /// Composes the alert for `finding`, or `None` when the action warrants silence.
    pub fn compose(
        &self,
        finding: &Finding,
        action: &Action,
        outcome: Option<&RemediationOutcome>,
    ) -> Result<Option<AlertMessage>, PipelineError> {
        let (template, bucket) = match action {
            Action::AlertOnly { template } => (template.as_str(), ""),
            Action::RemediateBucket { template, bucket } => (template.as_str(), bucket.as_str()),
            Action::NoOp if self.notify_unhandled => (DEFAULT_UNHANDLED_TEMPLATE, ""),
            Action::NoOp => return Ok(None),
        };

        let context = AlertContext {
            event_time: format_event_time(finding),
            category: &finding.category,
            external_uri: &finding.external_uri,
            resource_name: &finding.resource_name,
            bucket,
            removed_count: outcome.map_or(0, |o| o.removed.len()),
        };

        let mut text = render(template, &context).map_err(|message| PipelineError::Template {
            category: finding.category.clone(),
            message,
        })?;

        if let Some(severity) = finding.source_properties.severity_level() {
            text.push_str("\nSeverity: ");
            text.push_str(severity);
        }

        Ok(Some(AlertMessage { channel: self.channel.clone(), text }))
    }
}

fn render(template: &str, context: &AlertContext<'_>) -> Result<String, String> {
    let mut tt = TinyTemplate::new();
    tt.set_default_formatter(&format_unescaped);
    tt.add_template("alert", template).map_err(|e| e.to_string())?;
    tt.render("alert", context).map_err(|e| e.to_string())
}

fn format_event_time(finding: &Finding) -> String {
    finding
        .event_time
        .map(|t| t.to_rfc3339_opts(SecondsFormat::AutoSi, true))
        .unwrap_or_else(|| UNKNOWN_TIME.to_string())
}
