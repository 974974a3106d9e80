//! The security finding carried inside a push envelope.
//!
//! Findings are loosely typed upstream: categories appear over time, source
//! properties differ per category, and fields go missing. Decoding therefore
//! only fails when the payload is not a notification document at all. Every
//! other gap degrades to an empty value that the dispatcher routes to the
//! unhandled path.
//!
//! License: MIT OR APACHE 2.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::errors::DecodeError;

/// Lifecycle state of a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FindingState {
    #[default]
    StateUnspecified,
    Active,
    Inactive,
    /// Any state introduced after this build.
    #[serde(other)]
    Unknown,
}

/// Category-specific details of a finding, kept as an open bag.
///
/// Accessors return `None` both for absent fields and for fields whose JSON
/// type does not match, so a scanner changing a field's shape never breaks
/// decoding.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceProperties(Map<String, Value>);

impl SourceProperties {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
    }

    fn string_list(&self, key: &str) -> Vec<String> {
        match self.0.get(key) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn recommendation(&self) -> Option<&str> {
        self.str_field("Recommendation")
    }

    pub fn explanation(&self) -> Option<&str> {
        self.str_field("Explanation")
    }

    pub fn exception_instructions(&self) -> Option<&str> {
        self.str_field("ExceptionInstructions")
    }

    pub fn severity_level(&self) -> Option<&str> {
        self.str_field("SeverityLevel")
    }

    pub fn scanner_name(&self) -> Option<&str> {
        self.str_field("ScannerName")
    }

    pub fn project_id(&self) -> Option<&str> {
        self.str_field("ProjectId")
    }

    pub fn allowed(&self) -> Option<&str> {
        self.str_field("Allowed")
    }

    pub fn allowed_ip_range(&self) -> Option<&str> {
        self.str_field("AllowedIpRange")
    }

    pub fn source_ranges(&self) -> Option<&str> {
        self.str_field("SourceRanges")
    }

    pub fn activation_trigger(&self) -> Option<&str> {
        self.str_field("ActivationTrigger")
    }

    pub fn reactivation_count(&self) -> Option<f64> {
        self.0.get("ReactivationCount").and_then(Value::as_f64)
    }

    pub fn resource_path(&self) -> Vec<String> {
        self.string_list("ResourcePath")
    }

    pub fn external_source_ranges(&self) -> Vec<String> {
        self.string_list("ExternalSourceRanges")
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A decoded security finding.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    /// Name of the notification config that emitted the finding.
    #[serde(skip)]
    pub config_name: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub name: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub parent: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub resource_name: String,
    #[serde(default, deserialize_with = "lenient_state")]
    pub state: FindingState,
    /// Dispatch key. Open-ended: unknown values are valid.
    #[serde(default, deserialize_with = "nullable_string")]
    pub category: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub external_uri: String,
    #[serde(default, deserialize_with = "lenient_properties")]
    pub source_properties: SourceProperties,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub event_time: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub create_time: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Notification {
    #[serde(default, deserialize_with = "nullable_string")]
    notification_config_name: String,
    finding: Option<Finding>,
}

/// Parses an envelope payload into a [`Finding`].
///
/// A document without a `finding` object decodes to an empty finding, which
/// later routes to the unhandled path.
pub fn decode_finding(payload: &[u8]) -> Result<Finding, DecodeError> {
    let notification: Notification =
        serde_json::from_slice(payload).map_err(DecodeError::Finding)?;
    let mut finding = notification.finding.unwrap_or_default();
    finding.config_name = notification.notification_config_name;
    Ok(finding)
}

fn nullable_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn lenient_state<'de, D>(deserializer: D) -> Result<FindingState, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Null => FindingState::StateUnspecified,
        other => serde_json::from_value(other).unwrap_or(FindingState::Unknown),
    })
}

fn lenient_properties<'de, D>(deserializer: D) -> Result<SourceProperties, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Object(map) => SourceProperties(map),
        _ => SourceProperties::default(),
    })
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw
        .as_ref()
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc)))
}
