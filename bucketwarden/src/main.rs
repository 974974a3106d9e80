// bucketwarden/src/main.rs
//! bucketwarden entry point.
//!
//! Resolves configuration once, builds the pipeline and serves the push endpoint
//! until SIGINT or SIGTERM.

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use std::sync::Arc;
use tokio::net::TcpListener;

use bucketwarden::bootstrap::build_pipeline;
use bucketwarden::cli::Cli;
use bucketwarden::logger;
use bucketwarden::server::router;

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is normal in deployed environments.
    let _ = dotenvy::dotenv();
    let args = Cli::parse();
    logger::init_logger(logger::level_from_flags(args.debug, args.quiet));

    let pipeline = Arc::new(build_pipeline(&args)?);
    let app = router(pipeline, args.max_body_bytes);

    let bind_addr = format!("{}:{}", args.host, args.port);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;
    info!("Listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
