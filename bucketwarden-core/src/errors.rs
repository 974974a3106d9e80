//! errors.rs - Error types for the bucketwarden-core library.
//!
//! Every stage of the finding pipeline has its own error kind so that the HTTP
//! layer can tell a malformed push (never worth redelivering) apart from a
//! collaborator outage (worth redelivering).
//!
//! License: MIT OR APACHE 2.0

use thiserror::Error;

/// The push body, the finding payload or a value derived from them is unusable.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum DecodeError {
    #[error("Malformed push envelope: {0}")]
    Envelope(#[source] serde_json::Error),

    #[error("Push envelope field '{0}' is missing or empty")]
    MissingField(&'static str),

    #[error("Envelope payload is not valid base64: {0}")]
    Payload(#[from] base64::DecodeError),

    #[error("Malformed finding payload: {0}")]
    Finding(#[source] serde_json::Error),

    #[error("Resource name '{resource}' does not start with storage prefix '{prefix}'")]
    ResourcePrefix { resource: String, prefix: String },

    #[error("'{0}' is not a valid bucket name")]
    BucketName(String),
}

/// Failure reported by a policy-store collaborator for a single call.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum PolicyStoreError {
    #[error("Policy store request failed: {0}")]
    Transport(String),

    #[error("Policy store did not answer within {0:?}")]
    Timeout(std::time::Duration),

    #[error("Policy store answered HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Policy store returned an unreadable policy: {0}")]
    Malformed(String),

    /// `status` is set when the token endpoint answered with an HTTP error.
    #[error("Could not obtain an access token: {message}")]
    Credentials { status: Option<u16>, message: String },
}

impl PolicyStoreError {
    /// Whether a later redelivery of the same finding could succeed.
    ///
    /// HTTP 412 means the etag went stale between fetch and write; a fresh
    /// fetch on redelivery resolves it.
    pub fn is_retryable(&self) -> bool {
        match self {
            PolicyStoreError::Transport(_) | PolicyStoreError::Timeout(_) => true,
            PolicyStoreError::Credentials { status: None, .. } => true,
            PolicyStoreError::Credentials { status: Some(status), .. }
            | PolicyStoreError::Status { status, .. } => retryable_status(*status),
            PolicyStoreError::Malformed(_) => false,
        }
    }
}

fn retryable_status(status: u16) -> bool {
    status >= 500 || status == 429 || status == 412
}

/// Remediation against the policy store failed. Fetch and update are kept apart.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum RemediationError {
    #[error("Failed to fetch access policy of bucket '{bucket}': {source}")]
    PolicyFetch {
        bucket: String,
        #[source]
        source: PolicyStoreError,
    },

    #[error("Failed to update access policy of bucket '{bucket}': {source}")]
    PolicyUpdate {
        bucket: String,
        #[source]
        source: PolicyStoreError,
    },
}

impl RemediationError {
    pub fn is_retryable(&self) -> bool {
        match self {
            RemediationError::PolicyFetch { source, .. }
            | RemediationError::PolicyUpdate { source, .. } => source.is_retryable(),
        }
    }
}

/// The alert could not be delivered to the chat channel.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum DeliveryError {
    #[error("Alert delivery request failed: {0}")]
    Transport(String),

    #[error("Alert delivery did not complete within {0:?}")]
    Timeout(std::time::Duration),

    #[error("Chat API answered HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Chat API rejected the message: {0}")]
    Rejected(String),

    #[error("Failed to encode alert message: {0}")]
    Encode(#[from] serde_json::Error),
}

impl DeliveryError {
    pub fn is_retryable(&self) -> bool {
        match self {
            DeliveryError::Transport(_) | DeliveryError::Timeout(_) => true,
            DeliveryError::Status { status, .. } => *status >= 500 || *status == 429,
            DeliveryError::Rejected(reason) => reason == "ratelimited",
            DeliveryError::Encode(_) => false,
        }
    }
}

/// Failures while loading or validating the category table.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("Failed to read category table {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse category table: {0}")]
    Parse(String),

    #[error("Category table validation failed:\n{0}")]
    Invalid(String),
}

/// Top-level error of one pipeline run.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum PipelineError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Remediation(#[from] RemediationError),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    #[error("Failed to render alert template for category '{category}': {message}")]
    Template { category: String, message: String },
}

impl PipelineError {
    /// Decode and template problems are permanent for a given message; the
    /// collaborator failures defer to their own classification.
    pub fn is_retryable(&self) -> bool {
        match self {
            PipelineError::Decode(_) | PipelineError::Template { .. } => false,
            PipelineError::Remediation(e) => e.is_retryable(),
            PipelineError::Delivery(e) => e.is_retryable(),
        }
    }
}
