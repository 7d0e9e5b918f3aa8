//! Per-item pipeline run by the work queue
//!
//! For each `WorkItem`: check what artwork already exists, apply the retry
//! policy, resolve the canonical id through an ordered list of lookup
//! strategies, optionally probe the video for auto badges, download the
//! poster and backdrop, and finally hand the item to the refresh channel.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use chrono::Datelike;
use futures::FutureExt;
use tracing::{debug, error, info, warn};

use super::artwork::{ArtworkKind, ArtworkRequest, ArtworkUrls, DEFAULT_IMAGE_BASE_URL, ImageService, Overlay, write_artwork};
use super::library_state::{LibraryState, QueueState};
use super::media_server::{self, MediaServer};
use super::prober::{AutoBadgeRules, Prober, derive_badges, probe_with_record, record_path};
use super::providers::IdTranslator;
use super::queue::WorkQueue;
use super::refresh_channel::RefreshChannel;
use super::resolver::{IdentifierResolver, ResolveOptions};
use super::retry_policy::{RetryPolicy, is_retry_window_open};
use super::titles::{imdb_id_in_name, tmdb_id_in_name, tvdb_id_in_name, within_proximity};
use super::waterfall::{Outcome, Strategy, first_match};
use crate::config::{Settings, SettingsHandle};
use crate::error::FetchError;
use crate::media::{ExplicitIds, MediaType, RefreshRequest, WorkItem, is_video_file, subdirectories, video_files};

/// Delays used by the engine
#[derive(Debug, Clone, Copy)]
pub struct EngineTimings {
    /// Pause after an item completes, before the next one starts
    pub settle: Duration,
    /// Wait before a failed write is attempted again
    pub write_retry: Duration,
}

impl Default for EngineTimings {
    fn default() -> Self {
        Self {
            settle: Duration::from_secs(1),
            write_retry: Duration::from_secs(4 * 60 * 60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Disabled,
    EmptyFolder,
    RetryWindow,
}

/// What happened to one artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactStatus {
    Written,
    /// Not requested this run
    Skipped,
    /// The image service had nothing for the id
    Missing,
    WriteFailed,
    QuotaExceeded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Skipped(SkipReason),
    AlreadyPresent,
    Unmatched,
    /// Forced recheck of a title that was not released recently
    NotRecent(String),
    Processed {
        imdb_id: String,
        poster: ArtifactStatus,
        backdrop: ArtifactStatus,
    },
}

/// Inputs to the backdrop decision
#[derive(Debug, Clone, Copy, Default)]
pub struct BackdropPlan {
    pub blocked: bool,
    pub backdrop_exists: bool,
    pub poster_exists: bool,
    pub forced: bool,
    /// Rating order or backdrop badges apply
    pub has_overlays: bool,
    pub retry_policy_active: bool,
    pub avoid_optimized: bool,
    /// The id's known release year is the current year
    pub released_this_year: bool,
}

impl BackdropPlan {
    /// `coin` is only flipped for recent titles whose backdrop was deferred
    pub fn should_fetch(&self, coin: impl FnOnce() -> bool) -> bool {
        if self.blocked || (self.backdrop_exists && !self.forced) {
            return false;
        }
        if self.retry_policy_active || self.avoid_optimized || self.has_overlays {
            return true;
        }
        let deferred = self.poster_exists && !self.backdrop_exists;
        !deferred || (self.released_this_year && coin())
    }
}

/// Filesystem facts gathered before any network call
struct ItemSetup {
    target: PathBuf,
    media_folder: String,
    poster_exists: bool,
    backdrop_exists: bool,
}

pub struct FetchEngine {
    settings: SettingsHandle,
    state: Arc<LibraryState>,
    flags: Arc<QueueState>,
    resolver: Arc<IdentifierResolver>,
    images: Arc<dyn ImageService>,
    prober: Arc<dyn Prober>,
    queue: WorkQueue<WorkItem>,
    translator: Option<Arc<dyn IdTranslator>>,
    media_server: Option<Arc<dyn MediaServer>>,
    refresh: Option<Arc<RefreshChannel>>,
    urls: ArtworkUrls,
    timings: EngineTimings,
}

impl FetchEngine {
    pub fn new(
        settings: SettingsHandle,
        state: Arc<LibraryState>,
        flags: Arc<QueueState>,
        resolver: Arc<IdentifierResolver>,
        images: Arc<dyn ImageService>,
        prober: Arc<dyn Prober>,
        queue: WorkQueue<WorkItem>,
    ) -> Self {
        Self {
            settings,
            state,
            flags,
            resolver,
            images,
            prober,
            queue,
            translator: None,
            media_server: None,
            refresh: None,
            urls: ArtworkUrls::new(DEFAULT_IMAGE_BASE_URL),
            timings: EngineTimings::default(),
        }
    }

    /// Translate TMDB and TVDB ids from webhooks, names and the media server
    pub fn with_translator(mut self, translator: Arc<dyn IdTranslator>) -> Self {
        self.translator = Some(translator);
        self
    }

    pub fn with_media_server(mut self, server: Arc<dyn MediaServer>) -> Self {
        self.media_server = Some(server);
        self
    }

    pub fn with_refresh_channel(mut self, refresh: Arc<RefreshChannel>) -> Self {
        self.refresh = Some(refresh);
        self
    }

    pub fn with_image_base_url(mut self, base_url: &str) -> Self {
        self.urls = ArtworkUrls::new(base_url);
        self
    }

    pub fn with_timings(mut self, timings: EngineTimings) -> Self {
        self.timings = timings;
        self
    }

    pub fn queue(&self) -> &WorkQueue<WorkItem> {
        &self.queue
    }

    pub fn flags(&self) -> &Arc<QueueState> {
        &self.flags
    }

    /// Start the queue worker; every drain persists the caches and resets the scan flags
    pub fn start(self: &Arc<Self>) {
        let engine = Arc::clone(self);
        let drain_engine = Arc::clone(self);
        self.queue.start(
            move |item| {
                let engine = engine.clone();
                async move {
                    engine.process(item).await;
                }
            },
            move || {
                let settings = drain_engine.settings.current();
                let this_month = chrono::Local::now().month() as i32;
                handle_drain(&drain_engine.state, &drain_engine.flags, &settings, this_month);
            },
        );
    }

    /// Run one item through the pipeline
    pub async fn process(&self, item: WorkItem) -> ItemOutcome {
        if self.flags.is_disabled() {
            debug!(item = %item.name, "Queue disabled, skipping");
            return ItemOutcome::Skipped(SkipReason::Disabled);
        }

        let settings = self.settings.current();
        let Some(setup) = self.setup(&item, &settings) else {
            info!(item = %item.name, "Skipping empty folder");
            return ItemOutcome::Skipped(SkipReason::EmptyFolder);
        };

        let mut block_backdrop = false;
        if (self.flags.full_scan_running() || self.flags.folder_scan_running()) && settings.retry_frequency > 0 {
            let policy = RetryPolicy {
                frequency: settings.retry_frequency,
                newer_than_months: settings.retry_newer_than_months,
                last_retry_month: self.flags.last_retry_month(),
            };
            let decision = policy.evaluate(
                &setup.target,
                setup.poster_exists,
                !setup.backdrop_exists,
                chrono::Local::now().month() as i32,
                SystemTime::now(),
            );
            if decision.skip_item {
                info!(item = %item.name, "Item skipped until the next retry window");
                return ItemOutcome::Skipped(SkipReason::RetryWindow);
            }
            if decision.block_backdrop && settings.backdrops {
                info!(item = %item.name, "Backdrop skipped until the next retry window");
            }
            block_backdrop = decision.block_backdrop;
        }

        // An auto badge folder without a probe record still needs the probe
        let no_skip = setup.poster_exists
            && !item.forced
            && settings
                .auto_badges
                .get(&setup.media_folder)
                .is_some_and(|rules| !rules.is_empty())
            && !record_path(&item, &setup.target).exists();

        if !no_skip && setup.poster_exists && !item.forced && (!settings.backdrops || setup.backdrop_exists) {
            debug!(item = %item.name, "Artwork already present");
            return ItemOutcome::AlreadyPresent;
        }

        let imdb_id = match self.find_id(&item, &setup).await {
            Outcome::Matched(id) => id,
            Outcome::NoMatch => {
                info!(item = %item.name, stage = "resolve", "Could not match");
                return ItemOutcome::Unmatched;
            }
        };
        self.state.clear_unmatched(item.media_type, &item.name);

        let check_recent = !item.avoid_year_match && item.forced && setup.poster_exists && settings.overwrite_last_2_years;
        let current_year = chrono::Local::now().year();
        let release_year = self.release_year(&imdb_id, item.media_type, &settings, check_recent).await;
        if check_recent && !release_year.is_some_and(|year| within_proximity(year, current_year)) {
            info!(item = %item.name, id = %imdb_id, "Not released within the last 2 years, skipping");
            return ItemOutcome::NotRecent(imdb_id);
        }

        let (imdb_id, auto_badges) = self.probe(&item, &setup, &settings, imdb_id).await;
        let overlay = Overlay::resolve(&settings, &setup.media_folder, &imdb_id, auto_badges);

        let poster = if !setup.poster_exists || item.forced || no_skip {
            self.fetch_poster(&item, &setup, &settings, &imdb_id, &overlay).await
        } else {
            ArtifactStatus::Skipped
        };

        let backdrop = if settings.backdrops && poster != ArtifactStatus::QuotaExceeded {
            let has_overlays = !settings.rating_order.get(item.media_type).is_empty()
                || (settings.backdrops_badges && overlay.badges.is_some());
            let plan = BackdropPlan {
                blocked: block_backdrop,
                backdrop_exists: setup.backdrop_exists,
                poster_exists: setup.poster_exists,
                forced: item.forced,
                has_overlays,
                retry_policy_active: settings.retry_frequency > 0,
                avoid_optimized: self.flags.avoid_optimized_backdrops(),
                released_this_year: self.state.year_hint(&imdb_id) == Some(current_year),
            };
            if plan.should_fetch(rand::random::<bool>) {
                self.fetch_backdrop(&item, &setup, &settings, &imdb_id, &overlay, has_overlays).await
            } else {
                ArtifactStatus::Skipped
            }
        } else {
            ArtifactStatus::Skipped
        };

        if poster == ArtifactStatus::WriteFailed || backdrop == ArtifactStatus::WriteFailed {
            self.schedule_write_retry(&item);
        }

        self.complete(&item, &setup).await;

        ItemOutcome::Processed {
            imdb_id,
            poster,
            backdrop,
        }
    }

    fn setup(&self, item: &WorkItem, settings: &Settings) -> Option<ItemSetup> {
        let mut target = item.folder.clone();
        if item.media_type == MediaType::Movie && !item.is_file {
            // A movie folder that only holds another folder: use the inner one
            let contents = folder_contents(&target);
            if let [only] = contents.as_slice()
                && !is_video_file(only)
            {
                target = only.clone();
            }
        }

        if settings.no_posters_to_empty_folders && folder_contents(&target).is_empty() {
            return None;
        }

        let poster_exists = target.join(&item.poster_file_name).exists();
        let backdrop_exists = settings.backdrops && target.join(&item.backdrop_file_name).exists();
        Some(ItemSetup {
            media_folder: item.parent_media_folder().to_string_lossy().into_owned(),
            target,
            poster_exists,
            backdrop_exists,
        })
    }

    /// Ordered id lookups; the first one that yields an id wins
    async fn find_id(&self, item: &WorkItem, setup: &ItemSetup) -> Outcome<String> {
        let key = item.folder_key();
        let media_type = item.media_type;
        let name = item.name.as_str();

        let strategies = vec![
            Strategy::ready(
                "override for qualified name",
                key.parent
                    .as_ref()
                    .and_then(|_| self.state.override_for(media_type, &key.qualified())),
            ),
            Strategy::ready("override", self.state.override_for(media_type, name)),
            Strategy::new("explicit ids", || {
                async move {
                    let id = self.translate(&item.explicit_ids, media_type).await;
                    if let Some(id) = &id {
                        self.state.set_override(media_type, name, id);
                    }
                    id.into()
                }
                .boxed()
            }),
            Strategy::new("media server", || {
                async move {
                    let id = self.media_server_id(item, setup).await;
                    if let Some(id) = &id {
                        info!(item = %name, id = %id, "Matched through the media server");
                        self.state.set_override(media_type, name, id);
                    }
                    id.into()
                }
                .boxed()
            }),
            Strategy::ready("imdb id in name", imdb_id_in_name(name)),
            Strategy::new("tmdb id in name", || {
                async move {
                    let ids = ExplicitIds {
                        tmdb: tmdb_id_in_name(name),
                        ..ExplicitIds::default()
                    };
                    self.translate(&ids, media_type).await.into()
                }
                .boxed()
            }),
            Strategy::new("tvdb id in name", || {
                async move {
                    if media_type != MediaType::Series {
                        return Outcome::NoMatch;
                    }
                    let ids = ExplicitIds {
                        tvdb: tvdb_id_in_name(name),
                        ..ExplicitIds::default()
                    };
                    self.translate(&ids, media_type).await.into()
                }
                .boxed()
            }),
            Strategy::new("search", || {
                async move {
                    let options = ResolveOptions {
                        forced: item.forced,
                        poster_exists: setup.poster_exists,
                        avoid_year_match: item.avoid_year_match,
                    };
                    self.resolver.resolve(&key, media_type, options).await
                }
                .boxed()
            }),
        ];

        match first_match(strategies).await {
            Outcome::Matched((id, strategy)) => {
                debug!(item = %name, id = %id, strategy = strategy, "Resolved id");
                Outcome::Matched(id)
            }
            Outcome::NoMatch => Outcome::NoMatch,
        }
    }

    /// IMDb id as is, else the first TMDB or TVDB id that translates
    async fn translate(&self, ids: &ExplicitIds, media_type: MediaType) -> Option<String> {
        if let Some(imdb) = &ids.imdb {
            return Some(imdb.clone());
        }
        let translator = self.translator.as_ref()?;
        if let Some(tmdb) = &ids.tmdb {
            match translator.tmdb_to_imdb(tmdb, media_type).await {
                Ok(Some(id)) => return Some(id),
                Ok(None) => debug!(tmdb = %tmdb, "TMDB id has no IMDb id"),
                Err(e) => warn!(tmdb = %tmdb, stage = "translate", error = %e, "TMDB translation failed"),
            }
        }
        if let Some(tvdb) = &ids.tvdb {
            match translator.tvdb_to_imdb(tvdb, media_type).await {
                Ok(Some(id)) => return Some(id),
                Ok(None) => debug!(tvdb = %tvdb, "TVDB id has no IMDb id"),
                Err(e) => warn!(tvdb = %tvdb, stage = "translate", error = %e, "TVDB translation failed"),
            }
        }
        None
    }

    async fn media_server_id(&self, item: &WorkItem, setup: &ItemSetup) -> Option<String> {
        let server = self.media_server.as_ref()?;
        if !server.is_connected() || !self.settings.current().plex_detect {
            return None;
        }
        let Some(video) = item.media_file(&setup.target) else {
            warn!(item = %item.name, "No video file found for the media server lookup");
            return None;
        };
        match media_server::lookup_file(server.as_ref(), &video, item.media_type).await {
            Ok(Some(found)) => self.translate(&found.ids, item.media_type).await,
            Ok(None) => None,
            Err(e) => {
                warn!(item = %item.name, stage = "media-server", error = %e, "Media server lookup failed");
                None
            }
        }
    }

    /// Known release year, looked up and cached only for recent-release rechecks
    async fn release_year(&self, imdb_id: &str, media_type: MediaType, settings: &Settings, lookup: bool) -> Option<i32> {
        if let Some(year) = self.state.year_hint(imdb_id) {
            return Some(year);
        }
        if !lookup {
            return None;
        }
        let year = self
            .resolver
            .providers()
            .release_year(settings.scan_order, imdb_id, media_type)
            .await?;
        self.state.save_year_hint(imdb_id, year);
        Some(year)
    }

    /// Derive auto badges; an id embedded in the video wins unless an override exists
    async fn probe(&self, item: &WorkItem, setup: &ItemSetup, settings: &Settings, imdb_id: String) -> (String, Option<String>) {
        let rules = settings
            .item_auto_badges
            .get(&imdb_id)
            .or_else(|| settings.auto_badges.get(&setup.media_folder))
            .filter(|rules| !rules.is_empty());
        let Some(rules) = rules else {
            return (imdb_id, None);
        };

        let Some(video) = item.media_file(&setup.target) else {
            warn!(item = %item.name, stage = "probe", "No video file found to probe");
            return (imdb_id, None);
        };

        let record = record_path(item, &setup.target);
        let facts = match probe_with_record(
            self.prober.as_ref(),
            &video,
            &record,
            settings.overwrite_probe_data,
            Some(&imdb_id),
        )
        .await
        {
            Ok(facts) => facts,
            Err(e) => {
                warn!(item = %item.name, stage = "probe", error = %e, "Probe failed, continuing without auto badges");
                return (imdb_id, None);
            }
        };

        let badges = derive_badges(&facts, &AutoBadgeRules::parse(rules), &settings.default_badges, &video);
        let in_file = facts.in_file_imdb_id().filter(|found| *found != imdb_id);
        match in_file {
            Some(found) if self.state.override_for(item.media_type, &item.name).is_none() => {
                info!(item = %item.name, id = %found, previous = %imdb_id, "Using the IMDb id embedded in the video");
                (found.to_string(), badges)
            }
            _ => (imdb_id, badges),
        }
    }

    async fn fetch_poster(
        &self,
        item: &WorkItem,
        setup: &ItemSetup,
        settings: &Settings,
        imdb_id: &str,
        overlay: &Overlay,
    ) -> ArtifactStatus {
        let request = ArtworkRequest {
            imdb_id: imdb_id.to_string(),
            kind: ArtworkKind::Poster,
            url: self.urls.poster(settings, imdb_id, item.media_type, overlay),
        };
        let status = self.download(item, &request, &setup.target.join(&item.poster_file_name)).await;
        match status {
            ArtifactStatus::Written => self.state.clear_missing_poster(item.media_type, &item.name),
            ArtifactStatus::Missing => self.state.mark_missing_poster(item.media_type, &item.name),
            _ => {}
        }
        status
    }

    async fn fetch_backdrop(
        &self,
        item: &WorkItem,
        setup: &ItemSetup,
        settings: &Settings,
        imdb_id: &str,
        overlay: &Overlay,
        with_overlays: bool,
    ) -> ArtifactStatus {
        let request = ArtworkRequest {
            imdb_id: imdb_id.to_string(),
            kind: ArtworkKind::Backdrop,
            url: self.urls.backdrop(settings, imdb_id, item.media_type, overlay, with_overlays),
        };
        self.download(item, &request, &setup.target.join(&item.backdrop_file_name)).await
    }

    async fn download(&self, item: &WorkItem, request: &ArtworkRequest, path: &Path) -> ArtifactStatus {
        let kind = request.kind.as_str();
        let result = match self.images.download(request).await {
            Ok(bytes) => write_artwork(path, &bytes).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => {
                info!(item = %item.name, id = %request.imdb_id, kind = kind, "Artwork downloaded");
                ArtifactStatus::Written
            }
            Err(e @ FetchError::QuotaExceeded { .. }) => {
                error!(item = %item.name, kind = kind, stage = "fetch", error = %e, "Disabling the queue until it drains");
                self.flags.disable();
                ArtifactStatus::QuotaExceeded
            }
            Err(e @ FetchError::Write { .. }) => {
                warn!(item = %item.name, kind = kind, stage = "write", error = %e, "Could not write artwork");
                ArtifactStatus::WriteFailed
            }
            Err(e) => {
                info!(item = %item.name, kind = kind, stage = "fetch", error = %e, "No artwork available");
                ArtifactStatus::Missing
            }
        }
    }

    fn schedule_write_retry(&self, item: &WorkItem) {
        if item.retry_attempted {
            error!(item = %item.name, stage = "write", "Could not write artwork, tried twice");
            return;
        }
        info!(
            item = %item.name,
            retry_in_secs = self.timings.write_retry.as_secs(),
            "Will try writing artwork again later"
        );
        let queue = self.queue.clone();
        let mut retry = item.clone();
        retry.retry_attempted = true;
        let delay = self.timings.write_retry;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.push(retry);
        });
    }

    async fn complete(&self, item: &WorkItem, setup: &ItemSetup) {
        tokio::time::sleep(self.timings.settle).await;

        let Some(refresh) = &self.refresh else {
            return;
        };
        match item.media_file(&setup.target) {
            Some(media_file) => refresh.submit(RefreshRequest {
                media_file,
                media_folder: item.parent_media_folder(),
                media_type: item.media_type,
            }),
            None => debug!(item = %item.name, "No video file found, media server not notified"),
        }
    }
}

/// Directories and videos inside a folder
fn folder_contents(dir: &Path) -> Vec<PathBuf> {
    let mut contents = subdirectories(dir);
    contents.extend(video_files(dir));
    contents
}

/// Work run every time the queue drains
pub fn handle_drain(state: &LibraryState, flags: &QueueState, settings: &Settings, this_month: i32) {
    if let Err(e) = state.persist() {
        warn!(error = %e, "Failed to persist identifier caches");
    }
    if flags.full_scan_running() && settings.retry_frequency > 0 {
        let last = flags.last_retry_month();
        if last == -1 || is_retry_window_open(last, settings.retry_frequency, this_month) {
            flags.set_last_retry_month(this_month, state.store().as_ref());
        }
    }
    flags.reset_after_drain();
    info!("Work queue drained");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigStore, MemoryStore};

    fn plan() -> BackdropPlan {
        BackdropPlan {
            poster_exists: true,
            ..BackdropPlan::default()
        }
    }

    #[test]
    fn test_backdrop_never_when_blocked_or_present() {
        let blocked = BackdropPlan {
            blocked: true,
            has_overlays: true,
            ..plan()
        };
        assert!(!blocked.should_fetch(|| true));

        let present = BackdropPlan {
            backdrop_exists: true,
            retry_policy_active: true,
            ..plan()
        };
        assert!(!present.should_fetch(|| true));

        let forced = BackdropPlan { forced: true, ..present };
        assert!(forced.should_fetch(|| false));
    }

    #[test]
    fn test_backdrop_always_with_overlays_or_retry_policy() {
        for plan in [
            BackdropPlan { has_overlays: true, ..plan() },
            BackdropPlan { retry_policy_active: true, ..plan() },
            BackdropPlan { avoid_optimized: true, ..plan() },
        ] {
            assert!(plan.should_fetch(|| panic!("coin must not be flipped")));
        }
    }

    #[test]
    fn test_backdrop_deferred_for_existing_poster() {
        assert!(!plan().should_fetch(|| true));

        let recent = BackdropPlan {
            released_this_year: true,
            ..plan()
        };
        assert!(recent.should_fetch(|| true));
        assert!(!recent.should_fetch(|| false));

        let new_title = BackdropPlan {
            poster_exists: false,
            ..BackdropPlan::default()
        };
        assert!(new_title.should_fetch(|| false));
    }

    #[test]
    fn test_drain_advances_retry_month_for_full_scans() {
        let store: Arc<dyn ConfigStore> = Arc::new(MemoryStore::new());
        let state = LibraryState::load(store.clone());
        let flags = QueueState::load(store.as_ref());
        let settings = Settings::default();

        flags.set_full_scan_running(true);
        flags.disable();
        handle_drain(&state, &flags, &settings, 7);

        assert_eq!(flags.last_retry_month(), 7);
        assert_eq!(store.get("lastRetryMonth"), Some(serde_json::json!(7)));
        assert!(!flags.is_disabled());
        assert!(!flags.full_scan_running());
    }

    #[test]
    fn test_drain_keeps_month_when_window_closed() {
        let store: Arc<dyn ConfigStore> = Arc::new(MemoryStore::new());
        let state = LibraryState::load(store.clone());
        let flags = QueueState::new(3);
        let settings = Settings {
            retry_frequency: 2,
            ..Settings::default()
        };

        flags.set_full_scan_running(true);
        handle_drain(&state, &flags, &settings, 5);
        assert_eq!(flags.last_retry_month(), 3);

        flags.set_full_scan_running(true);
        handle_drain(&state, &flags, &settings, 4);
        assert_eq!(flags.last_retry_month(), 4);
    }

    #[test]
    fn test_drain_ignores_folder_scans() {
        let store: Arc<dyn ConfigStore> = Arc::new(MemoryStore::new());
        let state = LibraryState::load(store.clone());
        let flags = QueueState::new(-1);
        flags.set_folder_scan_running(true);

        handle_drain(&state, &flags, &Settings::default(), 2);
        assert_eq!(flags.last_retry_month(), -1);
        assert!(!flags.folder_scan_running());
        assert!(store.has("imdbCache"));
    }
}
