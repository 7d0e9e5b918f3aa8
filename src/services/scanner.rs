//! Library scans that feed the work queue
//!
//! A scan lists the titles under each media folder (subfolders, or the video
//! files themselves when a media folder has no subfolders) and queues them.
//! Periodic full updates, manual scans, forced overwrite scans, cancellation
//! and manual re-matches all go through here.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::dedup::ExpiringSet;
use super::fetch_engine::FetchEngine;
use super::library_state::LibraryState;
use super::titles::imdb_id_from_input;
use crate::config::store::{self, ConfigStore};
use crate::config::{PerType, SettingsHandle};
use crate::error::ScanError;
use crate::media::{FolderKey, MediaType, WorkItem, file_name_lossy, is_video_file, subdirectories, video_files};

const LAST_FULL_UPDATE_KEY: &str = "lastFullUpdate";
const LAST_OVERWRITE_KEY: &str = "lastOverwrite";

/// Manual scans are refused while this window is open
const SCAN_SPAM_WINDOW: Duration = Duration::from_secs(5);
const SCAN_SPAM_KEY: &str = "manual-scan";

/// What a manual scan covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanTarget {
    All,
    Type(MediaType),
    /// One configured media folder
    Folder(MediaType, PathBuf),
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScanStatus {
    pub scan_items: usize,
    pub full_scan_running: bool,
    pub folder_scan_running: bool,
    pub disabled: bool,
    /// Milliseconds since the epoch of the most recent full update
    pub last_full_update: u64,
    pub history_count: usize,
}

/// Millisecond timestamps of the last full update and overwrite per type
#[derive(Debug, Default)]
struct ScanTimes {
    full_update: PerType<u64>,
    overwrite: PerType<u64>,
}

pub struct Scanner {
    settings: SettingsHandle,
    state: Arc<LibraryState>,
    engine: Arc<FetchEngine>,
    times: Mutex<ScanTimes>,
    spam_guard: ExpiringSet,
}

impl Scanner {
    pub fn new(settings: SettingsHandle, state: Arc<LibraryState>, engine: Arc<FetchEngine>) -> Self {
        let store = state.store().as_ref();
        let times = ScanTimes {
            full_update: store::load(store, LAST_FULL_UPDATE_KEY).unwrap_or_default(),
            overwrite: store::load(store, LAST_OVERWRITE_KEY).unwrap_or_default(),
        };
        Self {
            settings,
            state,
            engine,
            times: Mutex::new(times),
            spam_guard: ExpiringSet::new(SCAN_SPAM_WINDOW),
        }
    }

    /// Queue every title under `roots`; returns how many items were queued
    pub fn start_fetching(
        &self,
        roots: &[PathBuf],
        media_type: MediaType,
        forced: bool,
        avoid_year_match: bool,
        folder_scan: bool,
    ) -> usize {
        let items = collect_items(roots, media_type, forced, avoid_year_match);
        if items.iter().any(|item| !item.is_file) {
            let flags = self.engine.flags();
            if folder_scan {
                flags.set_folder_scan_running(true);
            } else {
                flags.set_full_scan_running(true);
            }
        }
        let count = items.len();
        debug!(media_type = %media_type, count = count, forced = forced, "Queueing scan items");
        self.engine.queue().extend(items);
        count
    }

    /// Whether a scan of this type may overwrite existing artwork
    pub fn should_overwrite(&self, media_type: MediaType, now_ms: u64) -> bool {
        let settings = self.settings.current();
        settings.overwrite
            && *self.times.lock().overwrite.get(media_type) < now_ms.saturating_sub(settings.min_overwrite_period)
    }

    /// Periodic check: rescan each type whose last full update is older than the configured period
    pub fn full_update(&self) -> usize {
        self.full_update_at(now_ms())
    }

    pub fn full_update_at(&self, now_ms: u64) -> usize {
        let settings = self.settings.current();
        let due: Vec<MediaType> = {
            let times = self.times.lock();
            MediaType::ALL
                .into_iter()
                .filter(|t| *times.full_update.get(*t) < now_ms.saturating_sub(settings.full_update))
                .collect()
        };
        if due.is_empty() {
            debug!("No media type due for a full update");
            return 0;
        }

        let mut queued = 0;
        for media_type in due {
            info!(media_type = %media_type, "Starting periodic update of all folders");
            queued += self.scan_type(media_type, now_ms);
        }
        self.persist_times();
        queued
    }

    /// Manual full, per-type or single folder scan
    pub fn run_full_scan(&self, target: ScanTarget) -> Result<usize, ScanError> {
        self.check_manual_scan()?;
        if self.engine.flags().full_scan_running() {
            return Err(ScanError::AlreadyRunning);
        }

        let now = now_ms();
        let queued = match target {
            ScanTarget::Folder(media_type, folder) => {
                let folder = self.configured_folder(media_type, folder)?;
                let overwrite = self.should_overwrite(media_type, now);
                return Ok(self.start_fetching(&[folder], media_type, overwrite, false, true));
            }
            ScanTarget::Type(media_type) => {
                info!(media_type = %media_type, "Full scan started");
                self.scan_type(media_type, now)
            }
            ScanTarget::All => MediaType::ALL
                .into_iter()
                .map(|media_type| {
                    info!(media_type = %media_type, "Full scan started");
                    self.scan_type(media_type, now)
                })
                .sum(),
        };
        self.persist_times();
        Ok(queued)
    }

    /// Rescan with every item forced and year matching off; backdrops are not deferred
    pub fn force_overwrite_scan(&self, target: ScanTarget) -> Result<usize, ScanError> {
        self.check_manual_scan()?;
        let flags = self.engine.flags();
        flags.set_avoid_optimized_backdrops(true);

        let queued = match target {
            ScanTarget::Folder(media_type, folder) => {
                let folder = self.configured_folder(media_type, folder)?;
                return Ok(self.start_fetching(&[folder], media_type, true, true, true));
            }
            ScanTarget::Type(media_type) => self.overwrite_type(media_type),
            ScanTarget::All => MediaType::ALL.into_iter().map(|t| self.overwrite_type(t)).sum(),
        };
        self.persist_times();
        Ok(queued)
    }

    /// Disable the queue so the remaining items become no-ops; true when anything was pending
    pub fn cancel(&self) -> bool {
        if self.engine.queue().is_empty() {
            return false;
        }
        info!(pending = self.engine.queue().len(), "Cancelling scan");
        self.engine.flags().disable();
        true
    }

    /// Pin a folder to an IMDb id and refetch its artwork ahead of everything else
    ///
    /// `folder` is a folder key, optionally carrying the parent disambiguator.
    /// When the key is the id itself, the folder it was cached under is used.
    pub fn rematch(&self, folder: &str, id_input: &str, media_type: MediaType) -> Result<(), ScanError> {
        if folder.contains(std::path::MAIN_SEPARATOR) {
            return Err(ScanError::FolderNotFound(folder.to_string()));
        }
        let imdb_id = imdb_id_from_input(id_input).ok_or_else(|| ScanError::InvalidId(id_input.to_string()))?;

        let mut key = FolderKey::parse(folder);
        if key.name == imdb_id {
            let stored = self
                .state
                .find_key_for_id(media_type, &imdb_id)
                .ok_or_else(|| ScanError::FolderNotFound(folder.to_string()))?;
            let stored = FolderKey::parse(&stored);
            key.name = stored.name;
            key.parent = key.parent.or(stored.parent);
        }

        let wanted = key.name.trim().to_lowercase();
        let settings = self.settings.current();
        let found = settings
            .media_folders
            .get(media_type)
            .iter()
            .filter(|root| key.parent.as_deref().is_none_or(|p| file_name_lossy(root) == p))
            .flat_map(|root| {
                let mut entries = subdirectories(root);
                if media_type == MediaType::Movie {
                    entries.extend(video_files(root));
                }
                entries
            })
            .find(|entry| file_name_lossy(entry).trim().to_lowercase() == wanted)
            .ok_or_else(|| ScanError::FolderNotFound(key.name.clone()))?;

        let name = file_name_lossy(&found);
        let override_key = match &key.parent {
            Some(parent) => FolderKey::with_parent(&name, parent.as_str()).qualified(),
            None => name.clone(),
        };
        self.state.set_override(media_type, &override_key, &imdb_id);
        info!(item = %name, id = %imdb_id, "Match fixed, refetching artwork");

        let item = if is_video_file(&found) {
            WorkItem::file(&found, media_type)
        } else {
            WorkItem::folder(found, media_type)
        };
        self.engine.queue().push_front(item.forced(true).avoid_year_match(true));
        Ok(())
    }

    pub fn status(&self) -> ScanStatus {
        let flags = self.engine.flags();
        let times = self.times.lock();
        ScanStatus {
            scan_items: self.engine.queue().len(),
            full_scan_running: flags.full_scan_running(),
            folder_scan_running: flags.folder_scan_running(),
            disabled: flags.is_disabled(),
            last_full_update: times.full_update.movie.max(times.full_update.series),
            history_count: self.state.resolved_count(),
        }
    }

    fn check_manual_scan(&self) -> Result<(), ScanError> {
        if self.settings.current().api_key.is_empty() {
            return Err(ScanError::MissingApiKey);
        }
        if !self.spam_guard.check_and_mark(SCAN_SPAM_KEY) {
            return Err(ScanError::TooSoon);
        }
        Ok(())
    }

    fn configured_folder(&self, media_type: MediaType, folder: PathBuf) -> Result<PathBuf, ScanError> {
        if self.settings.current().media_folders.get(media_type).contains(&folder) {
            Ok(folder)
        } else {
            Err(ScanError::FolderNotFound(folder.display().to_string()))
        }
    }

    /// Full scan of one type, overwriting when the overwrite period allows
    fn scan_type(&self, media_type: MediaType, now_ms: u64) -> usize {
        let overwrite = self.should_overwrite(media_type, now_ms);
        {
            let mut times = self.times.lock();
            *times.full_update.get_mut(media_type) = now_ms;
            if overwrite {
                *times.overwrite.get_mut(media_type) = now_ms;
            }
        }
        let roots = self.settings.current().media_folders.get(media_type).clone();
        self.start_fetching(&roots, media_type, overwrite, false, false)
    }

    fn overwrite_type(&self, media_type: MediaType) -> usize {
        info!(media_type = %media_type, "Overwrite scan started");
        *self.times.lock().full_update.get_mut(media_type) = now_ms();
        let roots = self.settings.current().media_folders.get(media_type).clone();
        self.start_fetching(&roots, media_type, true, true, false)
    }

    fn persist_times(&self) {
        let times = self.times.lock();
        let store: &dyn ConfigStore = self.state.store().as_ref();
        for (key, value) in [(LAST_FULL_UPDATE_KEY, &times.full_update), (LAST_OVERWRITE_KEY, &times.overwrite)] {
            if let Err(e) = store::save(store, key, value) {
                warn!(key = key, error = %e, "Failed to persist scan timestamps");
            }
        }
    }
}

/// Work items for every title under the given media folders
pub fn collect_items(roots: &[PathBuf], media_type: MediaType, forced: bool, avoid_year_match: bool) -> Vec<WorkItem> {
    let mut items = Vec::new();
    for root in roots {
        if !root.exists() {
            warn!(folder = %root.display(), "Media folder is no longer accessible, skipping");
            continue;
        }
        let folders = subdirectories(root);
        if folders.is_empty() {
            items.extend(video_files(root).iter().map(|video| WorkItem::file(video, media_type)));
        } else {
            items.extend(folders.into_iter().map(|folder| WorkItem::folder(folder, media_type)));
        }
    }
    items
        .into_iter()
        .map(|item| item.forced(forced).avoid_year_match(avoid_year_match))
        .collect()
}

fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}
