//! Decoding of the push-subscription envelope that wraps every finding.
//!
//! The push endpoint receives `{ "message": { "attributes", "data", "messageId" },
//! "subscription" }`. Only `messageId` and `subscription` are mandatory; the
//! base64 `data` field carries the serialized finding.
//!
//! License: MIT OR APACHE 2.0

use base64::{engine::general_purpose, Engine as _};
use log::debug;
use serde::Deserialize;
use std::collections::BTreeMap;

use crate::errors::DecodeError;

/// A decoded push message. Owned by a single request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushEnvelope {
    pub id: String,
    /// Transport metadata, never used for routing.
    pub attributes: BTreeMap<String, String>,
    /// The raw finding document (already base64-decoded).
    pub payload: Vec<u8>,
    pub subscription_name: String,
}

#[derive(Deserialize)]
struct WireEnvelope {
    message: Option<WireMessage>,
    #[serde(default)]
    subscription: String,
}

#[derive(Deserialize)]
struct WireMessage {
    #[serde(default)]
    attributes: Option<BTreeMap<String, String>>,
    #[serde(default)]
    data: Option<String>,
    #[serde(rename = "messageId", default)]
    message_id: String,
}

/// Parses a raw request body into a [`PushEnvelope`].
///
/// Unknown fields are ignored at every level so that newer push formats keep
/// decoding.
pub fn decode_envelope(body: &[u8]) -> Result<PushEnvelope, DecodeError> {
    let wire: WireEnvelope = serde_json::from_slice(body).map_err(DecodeError::Envelope)?;
    let message = wire.message.ok_or(DecodeError::MissingField("message"))?;

    if message.message_id.is_empty() {
        return Err(DecodeError::MissingField("message.messageId"));
    }
    if wire.subscription.is_empty() {
        return Err(DecodeError::MissingField("subscription"));
    }

    let payload = match message.data.as_deref() {
        Some(data) if !data.is_empty() => general_purpose::STANDARD.decode(data.trim())?,
        _ => Vec::new(),
    };

    debug!(
        "Decoded envelope {} from {} ({} payload bytes, {} attributes)",
        message.message_id,
        wire.subscription,
        payload.len(),
        message.attributes.as_ref().map_or(0, |a| a.len())
    );

    Ok(PushEnvelope {
        id: message.message_id,
        attributes: message.attributes.unwrap_or_default(),
        payload,
        subscription_name: wire.subscription,
    })
}
