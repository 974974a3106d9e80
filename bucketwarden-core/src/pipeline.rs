// bucketwarden-core/src/pipeline.rs
//! One finding, end to end.
//!
//! `Pipeline::process` runs envelope decoding, finding decoding, dispatch,
//! optional bucket remediation, alert composition and delivery in order. Each
//! step's own result is checked before the next runs; the first failure stops
//! the run and is returned for the HTTP layer to map onto a status code.

use log::{debug, error, info};
use std::sync::Arc;
use std::time::Duration;

use crate::alert::{AlertComposer, AlertMessage};
use crate::config::HandlerConfig;
use crate::dispatch::{Action, Dispatcher};
use crate::envelope::decode_envelope;
use crate::errors::{DeliveryError, PipelineError};
use crate::finding::decode_finding;
use crate::notifier::Notifier;
use crate::remediation::{BucketPolicyRemediator, PolicyStore, RemediationOutcome};

/// Summary of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineReport {
    pub message_id: String,
    pub subscription: String,
    pub category: String,
    pub action: &'static str,
    pub remediation: Option<RemediationOutcome>,
    pub alert_sent: bool,
}

/// Request-independent parts of the handler, shared across requests.
pub struct Pipeline {
    dispatcher: Dispatcher,
    remediator: BucketPolicyRemediator,
    composer: AlertComposer,
    notifier: Arc<dyn Notifier>,
    call_timeout: Duration,
}

impl Pipeline {
    pub fn new(config: &HandlerConfig, store: Arc<dyn PolicyStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            dispatcher: Dispatcher::new(&config.categories, config.storage_prefix.clone()),
            remediator: BucketPolicyRemediator::new(store, config.call_timeout),
            composer: AlertComposer::new(config.channel.clone(), config.notify_unhandled),
            notifier,
            call_timeout: config.call_timeout,
        }
    }

    /// Processes one push body.
    pub async fn process(&self, body: &[u8]) -> Result<PipelineReport, PipelineError> {
        let envelope = decode_envelope(body).map_err(|e| {
            error!("Rejecting push: {}", e);
            PipelineError::from(e)
        })?;
        let message_id = envelope.id.as_str();
        let subscription = envelope.subscription_name.as_str();
        info!("Received message {} from {}", message_id, subscription);
        for (key, value) in &envelope.attributes {
            debug!("[{}] attribute {}={}", message_id, key, value);
        }

        let finding = decode_finding(&envelope.payload).map_err(|e| {
            error!("[{}] ({}) Undecodable finding: {}", message_id, subscription, e);
            PipelineError::from(e)
        })?;
        let category = finding.category.as_str();

        let action = self.dispatcher.dispatch(&finding).map_err(|e| {
            error!("[{}] ({}) category '{}': {}", message_id, subscription, category, e);
            PipelineError::from(e)
        })?;
        debug!("[{}] category '{}' -> {}", message_id, category, action.label());

        let remediation = match &action {
            Action::RemediateBucket { bucket, .. } => {
                let outcome = self.remediator.remediate(bucket).await.map_err(|e| {
                    error!("[{}] ({}) category '{}': {}", message_id, subscription, category, e);
                    PipelineError::from(e)
                })?;
                Some(outcome)
            }
            Action::AlertOnly { .. } | Action::NoOp => None,
        };

        let alert = self.composer.compose(&finding, &action, remediation.as_ref()).map_err(|e| {
            error!("[{}] ({}) {}", message_id, subscription, e);
            e
        })?;

        let alert_sent = match alert {
            Some(message) => {
                self.deliver(&message).await.map_err(|e| {
                    error!(
                        "[{}] ({}) category '{}': alert delivery via {} failed: {}",
                        message_id,
                        subscription,
                        category,
                        self.notifier.name(),
                        e
                    );
                    PipelineError::from(e)
                })?;
                true
            }
            None => false,
        };

        info!("[{}] Finished category '{}' with {}", message_id, category, action.label());
        Ok(PipelineReport {
            message_id: envelope.id.clone(),
            subscription: envelope.subscription_name.clone(),
            category: finding.category.clone(),
            action: action.label(),
            remediation,
            alert_sent,
        })
    }

    async fn deliver(&self, message: &AlertMessage) -> Result<(), DeliveryError> {
        match tokio::time::timeout(self.call_timeout, self.notifier.post(message)).await {
            Ok(result) => result,
            Err(_) => Err(DeliveryError::Timeout(self.call_timeout)),
        }
    }
}
