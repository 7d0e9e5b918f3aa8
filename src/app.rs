//! Application state and HTTP router construction.
//!
//! [`AppState::build`] wires every service from the process config and the
//! persisted store; [`build_app`] turns it into the Axum app served by main.

use std::sync::Arc;

use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::api;
use crate::config::{Config, ConfigStore, Settings, SettingsHandle};
use crate::services::providers::imdb::ImdbSuggestProvider;
use crate::services::providers::tmdb::TmdbProvider;
use crate::services::{
    FetchEngine, FfprobeProber, IdentifierResolver, LibraryState, MediaServer, PlexClient, ProviderSet, QueueState,
    RefreshChannel, RefreshTimings, RpdbClient, Scanner, WatchIntake, WebhookIntake, WorkQueue,
};

/// Shared state for HTTP handlers, jobs and the watcher
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub settings: SettingsHandle,
    pub state: Arc<LibraryState>,
    pub media_server: Arc<dyn MediaServer>,
    pub refresh: Arc<RefreshChannel>,
    pub engine: Arc<FetchEngine>,
    pub scanner: Arc<Scanner>,
    pub watch_intake: Arc<WatchIntake>,
    pub webhooks: Arc<WebhookIntake>,
}

impl AppState {
    /// Wire the services; the refresh channel workers are spawned, the artwork queue is not started
    pub fn build(config: Config, store: Arc<dyn ConfigStore>) -> Self {
        let settings = Settings::from_store(store.as_ref()).unwrap_or_else(|e| {
            warn!(error = %e, "Stored settings are invalid, using defaults");
            Settings::default()
        });
        let settings = SettingsHandle::new(settings);

        let state = Arc::new(LibraryState::load(store.clone()));
        let flags = Arc::new(QueueState::load(store.as_ref()));

        let mut providers = ProviderSet::new().with(Arc::new(ImdbSuggestProvider::new(
            config.imdb_suggest_base_url.clone(),
        )));
        let tmdb = config
            .tmdb_api_key
            .clone()
            .map(|key| Arc::new(TmdbProvider::with_base_url(key, config.tmdb_base_url.clone())));
        match &tmdb {
            Some(tmdb) => providers = providers.with(tmdb.clone()),
            None => info!("TMDB_API_KEY not set, searching IMDb only"),
        }
        let resolver = Arc::new(IdentifierResolver::new(state.clone(), providers, settings.clone()));

        let media_server: Arc<dyn MediaServer> = Arc::new(PlexClient::new(settings.clone()));
        let refresh = RefreshChannel::start(media_server.clone(), settings.clone(), RefreshTimings::default());

        let queue = WorkQueue::new("artwork");
        let mut engine = FetchEngine::new(
            settings.clone(),
            state.clone(),
            flags,
            resolver,
            Arc::new(RpdbClient::new(&config.image_base_url)),
            Arc::new(FfprobeProber::new(config.ffprobe_path.clone())),
            queue.clone(),
        )
        .with_media_server(media_server.clone())
        .with_refresh_channel(refresh.clone())
        .with_image_base_url(&config.image_base_url);
        if let Some(tmdb) = tmdb {
            engine = engine.with_translator(tmdb);
        }
        let engine = Arc::new(engine);

        let scanner = Arc::new(Scanner::new(settings.clone(), state.clone(), engine.clone()));
        let watch_intake = Arc::new(WatchIntake::new(settings.clone(), queue.clone()));
        let webhooks = Arc::new(WebhookIntake::new(settings.clone(), queue));

        Self {
            config: Arc::new(config),
            settings,
            state,
            media_server,
            refresh,
            engine,
            scanner,
            watch_intake,
            webhooks,
        }
    }
}

/// Build the full Axum router with state applied
pub fn build_app(state: AppState) -> Router<()> {
    Router::new()
        .merge(api::health::router())
        .merge(api::scan::router())
        .merge(api::webhooks::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
