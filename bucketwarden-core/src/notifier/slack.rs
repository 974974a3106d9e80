// bucketwarden-core/src/notifier/slack.rs
//! Slack Web API notifier (`chat.postMessage`).
//!
//! The API reports most failures as HTTP 200 with `{"ok": false, "error": ...}`,
//! so the response body is always inspected.

use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::alert::AlertMessage;
use crate::errors::DeliveryError;
use crate::notifier::Notifier;

pub const DEFAULT_SLACK_API: &str = "https://slack.com";

#[derive(Deserialize)]
struct PostMessageResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

pub struct SlackNotifier {
    client: Client,
    base_url: String,
    token: String,
    timeout: Duration,
}

impl SlackNotifier {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            timeout,
        })
    }

    fn transport_error(&self, e: reqwest::Error) -> DeliveryError {
        if e.is_timeout() {
            DeliveryError::Timeout(self.timeout)
        } else {
            DeliveryError::Transport(e.to_string())
        }
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    fn name(&self) -> &str {
        "slack"
    }

    async fn post(&self, message: &AlertMessage) -> Result<(), DeliveryError> {
        let body = serde_json::to_vec(message)?;
        let url = format!("{}/api/chat.postMessage", self.base_url);
        debug!("Posting alert to channel '{}'", message.channel);

        let resp = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/json; charset=utf-8")
            .bearer_auth(&self.token)
            .body(body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| self.transport_error(e))?;
        if !status.is_success() {
            return Err(DeliveryError::Status { status: status.as_u16(), body: text });
        }

        let parsed: PostMessageResponse = serde_json::from_str(&text)
            .map_err(|_| DeliveryError::Rejected(format!("unexpected response: {}", text)))?;
        if !parsed.ok {
            return Err(DeliveryError::Rejected(parsed.error.unwrap_or_else(|| "unknown_error".to_string())));
        }
        debug!("Alert accepted by chat API");
        Ok(())
    }
}
