// bucketwarden-core/src/lib.rs
//! # bucketwarden Core Library
//!
//! `bucketwarden-core` holds the logic of the bucketwarden push handler: it decodes
//! security-finding notifications delivered by a push subscription, decides what
//! to do per finding category, strips public principals from Cloud Storage bucket
//! policies, and composes the chat alert reporting what happened.
//!
//! The library never reads the process environment. All settings arrive through
//! [`HandlerConfig`], built once by the application at startup.
//!
//! ## Modules
//!
//! * `envelope`: Decodes the push envelope (`message.data` is base64).
//! * `finding`: The loosely-typed finding document and its source properties.
//! * `config`: The category table (YAML) and the resolved `HandlerConfig`.
//! * `dispatch`: Category string to [`Action`], with a mandatory default.
//! * `policy`: Access policy model and the pure public-member removal.
//! * `remediation`: The `PolicyStore` collaborator and [`BucketPolicyRemediator`].
//! * `alert`: Deterministic alert composition from templates.
//! * `notifier`: The `Notifier` collaborator and its Slack implementation.
//! * `pipeline`: Runs one push body through every stage.
//! * `errors`: Typed errors for each stage.
//!
//! ## Usage Example
//!
//! ```rust
//! use std::sync::Arc;
//! use bucketwarden_core::{HandlerConfig, MemoryPolicyStore, Pipeline, RecordingNotifier};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = HandlerConfig::with_defaults("#security")?;
//! let store = Arc::new(MemoryPolicyStore::new());
//! let notifier = Arc::new(RecordingNotifier::new());
//! let pipeline = Pipeline::new(&config, store, notifier.clone());
//!
//! let body = br#"{"message": {"messageId": "1", "data": "e30="}, "subscription": "s"}"#;
//! let report = pipeline.process(body).await?;
//! assert_eq!(report.action, "no_op");
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Every stage has its own error type (see [`errors`]); [`PipelineError::is_retryable`]
//! tells permanent data problems apart from collaborator outages.
//!
//! ---
//! License: MIT OR Apache-2.0

pub mod alert;
pub mod config;
pub mod dispatch;
pub mod envelope;
pub mod errors;
pub mod finding;
pub mod notifier;
pub mod pipeline;
pub mod policy;
pub mod remediation;

/// Re-exports the configuration types.
pub use config::{
    merge_categories,
    CategoryConfig,
    CategoryRule,
    HandlerConfig,
    RuleAction,
    DEFAULT_CALL_TIMEOUT,
    DEFAULT_STORAGE_PREFIX,
};

/// Re-exports the error types.
pub use errors::{ConfigError, DecodeError, DeliveryError, PipelineError, PolicyStoreError, RemediationError};

pub use envelope::{decode_envelope, PushEnvelope};
pub use finding::{decode_finding, Finding, FindingState, SourceProperties};
pub use dispatch::{parse_bucket_name, Action, Dispatcher};
pub use policy::{
    strip_members,
    strip_public_members,
    AccessPolicy,
    Binding,
    PolicyVersion,
    RemovedGrant,
    VersionedPolicy,
    ALL_AUTHENTICATED_USERS,
    ALL_USERS,
    PUBLIC_PRINCIPALS,
};

/// Re-exports the remediation collaborator trait and its implementations.
pub use remediation::{BucketPolicyRemediator, PolicyStore, RemediationOutcome};
pub use remediation::store::{MemoryPolicyStore, RecordedWrite};
pub use remediation::store::gcs::{GcsPolicyStore, TokenSource};

pub use alert::{AlertComposer, AlertMessage};
pub use notifier::{Notifier, RecordingNotifier};
pub use notifier::slack::SlackNotifier;
pub use pipeline::{Pipeline, PipelineReport};
