//! vocalstrip-server - upload a song, get an instrumental back
//!
//! Configuration: command line, then environment, then TOML file, then
//! compiled defaults. Logging: `RUST_LOG` overrides the configured level.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use vocalstrip_common::config::TomlConfig;
use vocalstrip_server::{build_router, AppState, Args, Orchestrator, ServiceConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let (file_config, config_source) = TomlConfig::load_or_default(args.config.as_deref())
        .context("Failed to load configuration file")?;
    let config = ServiceConfig::resolve(&args, file_config).context("Invalid configuration")?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .context("Invalid log level")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // Build identification first, before anything that can stall
    info!(
        "Starting vocalstrip-server v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    match &config_source {
        Some(path) => info!("Config file: {}", path.display()),
        None => warn!("No config file found, using defaults and environment"),
    }
    info!("Transcoder: {}", config.ffmpeg_bin);
    info!(
        "Separator: {} (max {} concurrent)",
        config.demucs_bin, config.max_concurrent_separations
    );
    info!("Scratch dir: {}", config.scratch_dir.display());
    info!("Output dir: {}", config.out_dir.display());

    let config = Arc::new(config);
    let orchestrator =
        Orchestrator::new(Arc::clone(&config)).context("Failed to create scratch or output directory")?;
    let app = build_router(AppState::new(Arc::new(orchestrator)));

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("vocalstrip-server listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
