// bucketwarden-core/src/notifier/mod.rs
//! Alert delivery.
//!
//! [`Notifier`] is the seam the pipeline posts composed alerts through;
//! [`slack::SlackNotifier`] is the production implementation and
//! [`RecordingNotifier`] keeps messages in memory.
//!
//! License: MIT OR APACHE 2.0

use async_trait::async_trait;
use std::sync::Mutex;

use crate::alert::AlertMessage;
use crate::errors::DeliveryError;

pub mod slack;

/// Delivers composed alerts to a chat channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    async fn post(&self, message: &AlertMessage) -> Result<(), DeliveryError>;
}

/// Keeps delivered messages in memory. Can be told to fail every delivery.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<AlertMessage>>,
    fail_with: Option<String>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A notifier whose deliveries are all rejected with `reason`.
    pub fn failing(reason: impl Into<String>) -> Self {
        Self { sent: Mutex::new(Vec::new()), fail_with: Some(reason.into()) }
    }

    pub fn sent(&self) -> Vec<AlertMessage> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn name(&self) -> &str {
        "recording"
    }

    async fn post(&self, message: &AlertMessage) -> Result<(), DeliveryError> {
        if let Some(reason) = &self.fail_with {
            return Err(DeliveryError::Rejected(reason.clone()));
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(message.clone());
        }
        Ok(())
    }
}
