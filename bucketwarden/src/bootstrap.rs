//! Builds the handler from parsed command-line options.
//!
//! This is the only place where settings are resolved; the result is an
//! immutable [`Pipeline`] shared by every request.

use anyhow::{Context, Result};
use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;

use bucketwarden_core::{
    merge_categories, CategoryConfig, GcsPolicyStore, HandlerConfig, Pipeline, SlackNotifier, TokenSource,
};

use crate::cli::Cli;

/// Turns CLI options into the core's [`HandlerConfig`].
pub fn handler_config(cli: &Cli) -> Result<HandlerConfig> {
    let defaults = CategoryConfig::load_default_categories().context("Failed to load built-in categories")?;
    let user = match &cli.categories {
        Some(path) => Some(
            CategoryConfig::load_from_file(path)
                .with_context(|| format!("Failed to load category table {}", path.display()))?,
        ),
        None => None,
    };
    let categories = merge_categories(defaults, user).with_alert_categories(&cli.alert_categories);

    if cli.slack_channel.is_empty() {
        warn!("No alert channel configured; alert delivery will fail until SLACK_CHANNEL is set.");
    }

    Ok(HandlerConfig {
        channel: cli.slack_channel.clone(),
        storage_prefix: cli.storage_prefix.clone(),
        notify_unhandled: cli.notify_unhandled,
        call_timeout: Duration::from_secs(cli.call_timeout_secs.max(1)),
        categories,
    })
}

/// Builds the pipeline with the storage and chat HTTP clients.
pub fn build_pipeline(cli: &Cli) -> Result<Pipeline> {
    let config = handler_config(cli)?;

    let tokens = match &cli.gcs_token {
        Some(token) if !token.is_empty() => TokenSource::Static(token.clone()),
        _ => TokenSource::MetadataServer { base_url: cli.metadata_url.clone() },
    };
    let store = GcsPolicyStore::new(cli.storage_api_url.clone(), tokens, config.call_timeout)
        .context("Failed to build storage client")?;
    let notifier = SlackNotifier::new(cli.slack_api_url.clone(), cli.slack_token.clone(), config.call_timeout)
        .context("Failed to build chat client")?;

    info!(
        "Handling {} categories, alerts to '{}', call timeout {:?}",
        config.categories.active().count(),
        config.channel,
        config.call_timeout
    );
    Ok(Pipeline::new(&config, Arc::new(store), Arc::new(notifier)))
}
