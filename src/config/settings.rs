//! User settings persisted in the config store
//!
//! Every field has a default, so a partial or empty config file is valid.
//! Keys use the camelCase names of the on-disk JSON.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::store::ConfigStore;
use crate::error::ConfigError;
use crate::media::MediaType;
use crate::services::providers::ProviderKind;

const HOUR_MS: u64 = 60 * 60 * 1000;
const DAY_MS: u64 = 24 * HOUR_MS;

/// A value kept separately for movies and series
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerType<T> {
    pub movie: T,
    pub series: T,
}

impl<T> PerType<T> {
    pub fn new(movie: T, series: T) -> Self {
        Self { movie, series }
    }

    pub fn get(&self, media_type: MediaType) -> &T {
        match media_type {
            MediaType::Movie => &self.movie,
            MediaType::Series => &self.series,
        }
    }

    pub fn get_mut(&mut self, media_type: MediaType) -> &mut T {
        match media_type {
            MediaType::Movie => &mut self.movie,
            MediaType::Series => &mut self.series,
        }
    }
}

/// Order in which title search providers are consulted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanOrder {
    #[serde(rename = "imdb")]
    Imdb,
    #[serde(rename = "tmdb")]
    Tmdb,
    #[serde(rename = "imdb-tmdb")]
    ImdbTmdb,
    #[default]
    #[serde(rename = "tmdb-imdb")]
    TmdbImdb,
}

impl ScanOrder {
    pub fn providers(&self) -> &'static [ProviderKind] {
        match self {
            Self::Imdb => &[ProviderKind::Imdb],
            Self::Tmdb => &[ProviderKind::Tmdb],
            Self::ImdbTmdb => &[ProviderKind::Imdb, ProviderKind::Tmdb],
            Self::TmdbImdb => &[ProviderKind::Tmdb, ProviderKind::Imdb],
        }
    }
}

/// How completed items are forwarded to the media server
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshMode {
    #[default]
    Immediate,
    Delay,
    Tod,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlexSettings {
    pub protocol: String,
    pub host: String,
    pub port: String,
    pub token: String,
}

impl Default for PlexSettings {
    fn default() -> Self {
        Self {
            protocol: "https".to_string(),
            host: String::new(),
            port: "32400".to_string(),
            token: String::new(),
        }
    }
}

impl PlexSettings {
    pub fn is_configured(&self) -> bool {
        !self.host.is_empty() && !self.token.is_empty()
    }

    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.protocol, self.host, self.port)
    }
}

/// Badge names used when auto badges detect a technical feature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultBadges {
    pub dolbyvision: String,
    pub hdr: String,
    pub remux: String,
}

impl Default for DefaultBadges {
    fn default() -> Self {
        Self {
            dolbyvision: "dolbyvision".to_string(),
            hdr: "hdrcolor".to_string(),
            remux: "remuxgold".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub api_key: String,
    pub media_folders: PerType<Vec<PathBuf>>,

    pub overwrite: bool,
    #[serde(rename = "overwriteLast2Years")]
    pub overwrite_last_2_years: bool,
    /// Milliseconds between two overwrite scans of the same type
    pub min_overwrite_period: u64,
    pub overwrite_matches: PerType<bool>,
    /// Milliseconds after which a type gets a periodic full scan
    pub full_update: u64,
    /// Milliseconds between full-update checks
    pub check_full_update: u64,

    /// Months between retries of persistently failing titles; 0 disables the policy
    pub retry_frequency: u32,
    pub retry_newer_than_months: u32,

    pub poster_lang: String,
    pub movie_poster_type: String,
    pub series_poster_type: String,
    pub movies_textless: bool,
    pub series_textless: bool,
    /// Per-id URL templates with `[[api-key]]`, `[[poster-type]]` and `[[imdb-id]]` placeholders
    pub custom_posters: HashMap<String, String>,

    pub scan_order: ScanOrder,
    pub cache_matches: bool,
    pub backdrops: bool,
    pub backdrops_badges: bool,
    pub rating_order: PerType<String>,
    pub no_posters_to_empty_folders: bool,
    pub watch_folder_depth: u32,
    /// Seconds to wait before queueing a webhook item
    pub webhook_delay: u64,

    pub default_badges: DefaultBadges,
    pub overwrite_probe_data: bool,

    // Folder level overrides, keyed by media root path
    pub labels: HashMap<String, String>,
    pub badges: HashMap<String, String>,
    pub auto_badges: HashMap<String, String>,
    pub badge_positions: HashMap<String, String>,
    pub backdrop_badge_positions: HashMap<String, String>,
    pub badge_sizes: HashMap<String, String>,

    // Item level overrides, keyed by resolved id
    pub item_labels: HashMap<String, String>,
    pub item_badges: HashMap<String, String>,
    pub item_auto_badges: HashMap<String, String>,

    pub plex: PlexSettings,
    pub plex_delay_type: RefreshMode,
    /// Seconds to hold a refresh request in delay mode
    pub plex_refresh_delay: u64,
    pub plex_tod_hour: u32,
    pub plex_tod_min: u32,
    pub plex_tod_am_pm: String,
    pub plex_detect: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            media_folders: PerType::default(),
            overwrite: false,
            overwrite_last_2_years: false,
            min_overwrite_period: 29 * DAY_MS,
            overwrite_matches: PerType::default(),
            full_update: 7 * DAY_MS,
            check_full_update: HOUR_MS,
            retry_frequency: 1,
            retry_newer_than_months: 6,
            poster_lang: "en".to_string(),
            movie_poster_type: "poster-default".to_string(),
            series_poster_type: "poster-default".to_string(),
            movies_textless: false,
            series_textless: false,
            custom_posters: HashMap::new(),
            scan_order: ScanOrder::default(),
            cache_matches: true,
            backdrops: false,
            backdrops_badges: false,
            rating_order: PerType::default(),
            no_posters_to_empty_folders: false,
            watch_folder_depth: 0,
            webhook_delay: 0,
            default_badges: DefaultBadges::default(),
            overwrite_probe_data: false,
            labels: HashMap::new(),
            badges: HashMap::new(),
            auto_badges: HashMap::new(),
            badge_positions: HashMap::new(),
            backdrop_badge_positions: HashMap::new(),
            badge_sizes: HashMap::new(),
            item_labels: HashMap::new(),
            item_badges: HashMap::new(),
            item_auto_badges: HashMap::new(),
            plex: PlexSettings::default(),
            plex_delay_type: RefreshMode::default(),
            plex_refresh_delay: 0,
            plex_tod_hour: 1,
            plex_tod_min: 0,
            plex_tod_am_pm: "AM".to_string(),
            plex_detect: true,
        }
    }
}

impl Settings {
    /// Build settings from whatever the store holds, filling gaps with defaults
    pub fn from_store(store: &dyn ConfigStore) -> Result<Self, ConfigError> {
        Ok(serde_json::from_value(Value::Object(store.snapshot()))?)
    }

    /// Write every settings key back to the store
    pub fn persist(&self, store: &dyn ConfigStore) -> Result<(), ConfigError> {
        if let Value::Object(map) = serde_json::to_value(self)? {
            for (key, value) in map {
                store.set(&key, value)?;
            }
        }
        Ok(())
    }

    pub fn poster_type(&self, media_type: MediaType) -> &str {
        match media_type {
            MediaType::Movie => &self.movie_poster_type,
            MediaType::Series => &self.series_poster_type,
        }
    }

    pub fn textless(&self, media_type: MediaType) -> bool {
        match media_type {
            MediaType::Movie => self.movies_textless,
            MediaType::Series => self.series_textless,
        }
    }

    /// The overwrite-last-2-years setting doubles as "recheck recent releases"
    pub fn recheck_recent_releases(&self) -> bool {
        self.overwrite_last_2_years
    }

    /// Media type and root for a path inside one of the configured media folders
    pub fn media_root_for(&self, path: &Path) -> Option<(MediaType, PathBuf)> {
        MediaType::ALL.into_iter().find_map(|media_type| {
            self.media_folders
                .get(media_type)
                .iter()
                .find(|root| path.starts_with(root))
                .map(|root| (media_type, root.clone()))
        })
    }
}

/// Shared, swappable view of the current settings
#[derive(Clone)]
pub struct SettingsHandle {
    current: Arc<RwLock<Arc<Settings>>>,
}

impl SettingsHandle {
    pub fn new(settings: Settings) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(settings))),
        }
    }

    /// Snapshot that stays consistent for the duration of one work item
    pub fn current(&self) -> Arc<Settings> {
        self.current.read().clone()
    }

    pub fn update(&self, f: impl FnOnce(&mut Settings)) {
        let mut guard = self.current.write();
        let mut next = (**guard).clone();
        f(&mut next);
        *guard = Arc::new(next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::store::MemoryStore;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_defaults_fill_missing_keys() {
        let store = MemoryStore::with_values(json!({
            "apiKey": "t1-key",
            "scanOrder": "imdb",
            "plex": { "host": "10.0.0.2" },
            "imdbCache": { "movie": {} }
        }));

        let settings = Settings::from_store(&store).unwrap();
        assert_eq!(settings.api_key, "t1-key");
        assert_eq!(settings.scan_order, ScanOrder::Imdb);
        assert_eq!(settings.plex.port, "32400");
        assert_eq!(settings.plex.host, "10.0.0.2");
        assert_eq!(settings.retry_frequency, 1);
        assert_eq!(settings.default_badges.hdr, "hdrcolor");
        assert_eq!(settings.plex_delay_type, RefreshMode::Immediate);
    }

    #[test]
    fn test_scan_order_providers() {
        assert_eq!(ScanOrder::default().providers(), &[ProviderKind::Tmdb, ProviderKind::Imdb]);
        assert_eq!(ScanOrder::ImdbTmdb.providers(), &[ProviderKind::Imdb, ProviderKind::Tmdb]);
        assert_eq!(ScanOrder::Tmdb.providers(), &[ProviderKind::Tmdb]);
    }

    #[test]
    fn test_media_root_lookup() {
        let mut settings = Settings::default();
        settings.media_folders.movie.push(PathBuf::from("/data/movies"));
        settings.media_folders.series.push(PathBuf::from("/data/tv"));

        let (media_type, root) = settings
            .media_root_for(Path::new("/data/tv/Andor/Season 1"))
            .unwrap();
        assert_eq!(media_type, MediaType::Series);
        assert_eq!(root, PathBuf::from("/data/tv"));
        assert!(settings.media_root_for(Path::new("/elsewhere")).is_none());
    }

    #[test]
    fn test_handle_update_is_visible() {
        let handle = SettingsHandle::new(Settings::default());
        let before = handle.current();
        handle.update(|s| s.backdrops = true);
        assert!(!before.backdrops);
        assert!(handle.current().backdrops);
    }
}
