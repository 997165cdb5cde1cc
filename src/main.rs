//! Channel gallery server
//!
//! Polls the configured Mattermost channel for image posts, keeps the local
//! cache in sync and serves it to the slideshow frontend.
//!
//! Required environment variables:
//! - MATTERMOST_BOT_USERNAME: Bot account username
//! - MATTERMOST_BOT_TOKEN: Personal access token of the bot

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use channel_gallery::{
    logging::init_logging,
    server::{build_router, AppState},
    BotSecrets, CacheStore, LocalFileStore, MattermostClient, Settings, SyncDriver, Synchronizer,
};
use clap::Parser;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::info;

#[derive(Parser)]
#[command(name = "channel-gallery")]
#[command(version)]
#[command(about = "Rotates the image posts of a Mattermost channel as polaroids", long_about = None)]
struct Cli {
    /// Path to the settings file
    settings_path: PathBuf,

    /// Directory holding the post cache
    #[arg(long, env = "GALLERY_CACHE_DIR", default_value = "static/cache")]
    cache_dir: PathBuf,

    /// Address the HTTP server listens on
    #[arg(long, env = "GALLERY_BIND", default_value = "0.0.0.0:5000")]
    bind: SocketAddr,

    /// Synchronize the cache once and exit without serving
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    let settings = Arc::new(
        Settings::load(&cli.settings_path)
            .with_context(|| format!("Failed to load {}", cli.settings_path.display()))?,
    );
    let secrets = BotSecrets::from_env().context("Bot credentials are not configured")?;

    let client = Arc::new(
        MattermostClient::new(&settings, secrets).context("Failed to create Mattermost client")?,
    );
    let cache = Arc::new(CacheStore::new(Arc::new(LocalFileStore::new(
        cli.cache_dir.clone(),
    ))));
    let synchronizer = Synchronizer::new(client, cache.clone());

    if cli.once {
        let report = synchronizer
            .run()
            .await
            .context("Synchronization failed")?;
        info!(
            added = report.added,
            refreshed = report.refreshed,
            hits = report.hits,
            evicted = report.evicted,
            failed = report.failed.len(),
            "Synchronization finished"
        );
        return Ok(());
    }

    let sync_handle = SyncDriver::new(synchronizer, settings.fetch_interval()).spawn();

    let app = build_router(AppState::new(cache, settings), &cli.cache_dir);
    let listener = TcpListener::bind(cli.bind)
        .await
        .with_context(|| format!("Failed to bind {}", cli.bind))?;
    info!("Server running on http://{}", cli.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    sync_handle.stop().await;
    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
