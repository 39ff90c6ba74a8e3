//! gymgate-hub - access authority and gym channel server
//!
//! Issues rotating member tokens, verifies them at check-in, keeps the
//! attendance log, and fans scan results out to every dashboard joined to
//! a gym over SSE.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use gymgate_common::config::{self, TomlConfig};
use gymgate_common::{GymChannels, TokenKey};
use gymgate_hub::directory::InMemoryDirectory;
use gymgate_hub::{AccessAuthority, AppState};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for gymgate-hub
#[derive(Parser, Debug)]
#[command(name = "gymgate-hub")]
#[command(about = "Access authority and gym channel server for GymGate")]
#[command(version)]
struct Args {
    /// Config file path
    #[arg(short, long, env = "GYMGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address (overrides [hub].bind_addr)
    #[arg(short, long, env = "GYMGATE_HUB_BIND")]
    bind: Option<String>,

    /// Base64 token signing key, at least 32 bytes (overrides [hub].shared_secret)
    #[arg(long, env = "GYMGATE_SHARED_SECRET")]
    shared_secret: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Config is read before tracing is up so [logging].level can seed the filter
    let config_result = config::load_or_default(args.config.as_deref());
    let level = config_result
        .as_ref()
        .map(|c| c.logging.level.clone())
        .unwrap_or_else(|_| "info".to_string());

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{},tower_http=debug", level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting GymGate hub (gymgate-hub) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let config: TomlConfig = config_result.context("Failed to load configuration")?;

    let configured = match args.shared_secret.as_deref() {
        Some(encoded) => Some(TokenKey::from_base64(encoded).context("Invalid --shared-secret")?),
        None => config.hub.token_key()?,
    };
    let key = match configured {
        Some(key) => key,
        None => {
            warn!("No signing key configured, generated one for this run");
            TokenKey::generate()?
        }
    };

    let directory = InMemoryDirectory::from_seeds(&config.hub.members);
    if directory.is_empty() {
        warn!("Member directory is empty, every token request will be refused");
    } else {
        info!("Member directory seeded with {} members", directory.len());
    }

    let authority = AccessAuthority::new(Arc::new(directory), key, config.hub.token_ttl());
    info!("Token TTL: {}s", authority.token_ttl().as_secs());

    let state = AppState::new(authority, GymChannels::default());
    let app = gymgate_hub::build_router(state);

    let bind_addr = args.bind.unwrap_or(config.hub.bind_addr);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;
    info!("Listening on http://{}", bind_addr);
    info!("Health check: http://{}/health", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
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
