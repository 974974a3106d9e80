//! Command-line and environment configuration for the bucketwarden server.
//!
//! Every option can also be set through the environment variable shown in
//! `--help`; a `.env` file in the working directory is honoured as well.

use clap::Parser;
use std::path::PathBuf;

use bucketwarden_core::notifier::slack::DEFAULT_SLACK_API;
use bucketwarden_core::remediation::store::gcs::{DEFAULT_METADATA_HOST, DEFAULT_STORAGE_API};
use bucketwarden_core::DEFAULT_STORAGE_PREFIX;

/// Top-level CLI definition.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "bucketwarden",
    author = "Relay",
    version = env!("CARGO_PKG_VERSION"),
    about = "Closes public bucket findings pushed by a subscription and reports them to chat",
)]
pub struct Cli {
    /// Port to listen on.
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Address to bind.
    #[arg(long, env = "BUCKETWARDEN_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Bot token used for chat delivery. A missing token surfaces as a delivery failure.
    #[arg(long, env = "SLACK_TOKEN", hide_env_values = true, default_value = "")]
    pub slack_token: String,

    /// Channel receiving alerts.
    #[arg(long, env = "SLACK_CHANNEL", default_value = "")]
    pub slack_channel: String,

    /// Base URL of the chat Web API.
    #[arg(long, env = "SLACK_API_URL", default_value = DEFAULT_SLACK_API)]
    pub slack_api_url: String,

    /// Static access token for the storage API. Uses the metadata server when absent.
    #[arg(long, env = "GCS_ACCESS_TOKEN", hide_env_values = true)]
    pub gcs_token: Option<String>,

    /// Base URL of the storage JSON API.
    #[arg(long, env = "STORAGE_API_URL", default_value = DEFAULT_STORAGE_API)]
    pub storage_api_url: String,

    /// Base URL of the compute metadata server.
    #[arg(long, env = "METADATA_URL", default_value = DEFAULT_METADATA_HOST)]
    pub metadata_url: String,

    /// Prefix stripped from a finding's resource name to get the bucket name.
    #[arg(long, env = "BUCKETWARDEN_STORAGE_PREFIX", default_value = DEFAULT_STORAGE_PREFIX)]
    pub storage_prefix: String,

    /// YAML category table merged over the built-in one.
    #[arg(long = "categories", value_name = "FILE", env = "BUCKETWARDEN_CATEGORIES")]
    pub categories: Option<PathBuf>,

    /// Extra alert-only categories (comma-separated).
    #[arg(long = "alert-category", value_delimiter = ',', env = "BUCKETWARDEN_ALERT_CATEGORIES")]
    pub alert_categories: Vec<String>,

    /// Post a generic alert for categories without a rule.
    #[arg(long, env = "BUCKETWARDEN_NOTIFY_UNHANDLED")]
    pub notify_unhandled: bool,

    /// Per-call timeout, in seconds, for storage and chat requests.
    #[arg(long = "call-timeout", value_name = "SECS", env = "BUCKETWARDEN_CALL_TIMEOUT", default_value_t = 5)]
    pub call_timeout_secs: u64,

    /// Largest accepted push body, in bytes.
    #[arg(long = "max-body-bytes", env = "BUCKETWARDEN_MAX_BODY_BYTES", default_value_t = 1024 * 1024)]
    pub max_body_bytes: usize,

    /// Enable debug logging.
    #[arg(long, short = 'd')]
    pub debug: bool,

    /// Only log warnings and errors.
    #[arg(long, short = 'q', conflicts_with = "debug")]
    pub quiet: bool,
}
