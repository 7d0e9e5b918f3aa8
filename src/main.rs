//! postersync service entry point

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use postersync::cli::{CliOptions, StartupScan};
use postersync::config::{Config, ConfigStore, JsonFileStore};
use postersync::media::MediaType;
use postersync::services::{FfprobeProber, ScanTarget, spawn_fs_watcher};
use postersync::{AppState, build_app, jobs};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    let cli = CliOptions::from_args();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "postersync=info,tower_http=info".into());
    if config.pretty_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    }

    tracing::info!("Starting postersync");

    std::fs::create_dir_all(&config.config_dir)
        .with_context(|| format!("Failed to create config directory {}", config.config_dir.display()))?;
    let store: Arc<dyn ConfigStore> = Arc::new(JsonFileStore::open(config.config_file())?);
    tracing::info!(path = %config.config_file().display(), "Configuration loaded");

    let port = config.port;
    let state = AppState::build(config, store);

    if state.settings.current().plex.is_configured() {
        if state.media_server.test_connectivity().await {
            tracing::info!("Connected to Plex");
        } else {
            tracing::warn!("Plex is configured but not reachable, refreshes are paused until it is");
        }
    }

    let settings = state.settings.current();
    let wants_probe = settings.auto_badges.values().chain(settings.item_auto_badges.values()).any(|r| !r.is_empty());
    if wants_probe && !FfprobeProber::new(state.config.ffprobe_path.clone()).is_available().await {
        tracing::warn!(path = %state.config.ffprobe_path, "ffprobe not found, auto badges will be skipped");
    }

    state.engine.start();

    if let Some(scan) = cli.scan {
        let result = match scan {
            StartupScan::All => state.scanner.run_full_scan(ScanTarget::All),
            StartupScan::Movies => state.scanner.run_full_scan(ScanTarget::Type(MediaType::Movie)),
            StartupScan::Series => state.scanner.run_full_scan(ScanTarget::Type(MediaType::Series)),
            StartupScan::Overwrite => state.scanner.force_overwrite_scan(ScanTarget::All),
        };
        match result {
            Ok(queued) => tracing::info!(queued = queued, "Startup scan queued"),
            Err(e) => tracing::error!(error = %e, "Startup scan rejected"),
        }
    } else {
        let queued = state.scanner.full_update();
        if queued > 0 {
            tracing::info!(queued = queued, "Startup full update queued items");
        }
    }

    if cli.no_server {
        state.engine.queue().wait_idle().await;
        tracing::info!("Queue drained, exiting");
        return Ok(());
    }

    // Dropping the watcher stops event delivery
    let _watcher = match spawn_fs_watcher(&state.settings.current(), state.watch_intake.clone()) {
        Ok(watcher) => Some(watcher),
        Err(e) => {
            tracing::warn!(error = %e, "Filesystem watcher unavailable, new folders are picked up by scans only");
            None
        }
    };

    let _scheduler = jobs::start_scheduler(state.scanner.clone(), &state.settings.current()).await?;

    let app = build_app(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
