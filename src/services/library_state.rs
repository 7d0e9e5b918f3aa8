//! Persistent identifier caches and scan flags
//!
//! All cache maps sit behind a single lock. Every read-modify-write happens
//! while the lock is held and never spans an await point.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::config::PerType;
use crate::config::store::{self, ConfigStore};
use crate::error::ConfigError;
use crate::media::MediaType;

const OVERRIDES_KEY: &str = "overrideCache";
const RESOLVED_KEY: &str = "imdbCache";
const UNMATCHED_KEY: &str = "unmatched";
const MISSING_POSTERS_KEY: &str = "missingPosters";
const LAST_RETRY_MONTH_KEY: &str = "lastRetryMonth";

type KeyMap<V> = PerType<HashMap<String, V>>;

#[derive(Debug, Default)]
struct Caches {
    overrides: KeyMap<String>,
    resolved: KeyMap<String>,
    unmatched: KeyMap<bool>,
    missing_posters: KeyMap<bool>,
    /// id -> release year, for the lifetime of the process only
    year_hints: HashMap<String, i32>,
}

/// Identifier caches plus unmatched and missing-poster bookkeeping
pub struct LibraryState {
    caches: Mutex<Caches>,
    store: Arc<dyn ConfigStore>,
}

impl LibraryState {
    pub fn load(store: Arc<dyn ConfigStore>) -> Self {
        let caches = Caches {
            overrides: store::load(store.as_ref(), OVERRIDES_KEY).unwrap_or_default(),
            resolved: store::load(store.as_ref(), RESOLVED_KEY).unwrap_or_default(),
            unmatched: store::load(store.as_ref(), UNMATCHED_KEY).unwrap_or_default(),
            missing_posters: store::load(store.as_ref(), MISSING_POSTERS_KEY).unwrap_or_default(),
            year_hints: HashMap::new(),
        };
        debug!(
            overrides = caches.overrides.movie.len() + caches.overrides.series.len(),
            resolved = caches.resolved.movie.len() + caches.resolved.series.len(),
            "Identifier caches loaded"
        );
        Self {
            caches: Mutex::new(caches),
            store,
        }
    }

    pub fn store(&self) -> &Arc<dyn ConfigStore> {
        &self.store
    }

    pub fn override_for(&self, media_type: MediaType, key: &str) -> Option<String> {
        self.caches.lock().overrides.get(media_type).get(key).cloned()
    }

    /// Override first, then the resolved cache when `include_resolved` is set
    pub fn cached_id(&self, media_type: MediaType, key: &str, include_resolved: bool) -> Option<String> {
        let caches = self.caches.lock();
        caches
            .overrides
            .get(media_type)
            .get(key)
            .or_else(|| {
                include_resolved
                    .then(|| caches.resolved.get(media_type).get(key))
                    .flatten()
            })
            .cloned()
    }

    /// Store an explicit id; persisted immediately
    pub fn set_override(&self, media_type: MediaType, key: &str, id: &str) {
        let mut caches = self.caches.lock();
        caches
            .overrides
            .get_mut(media_type)
            .insert(key.to_string(), id.to_string());
        caches.unmatched.get_mut(media_type).remove(key);
        if let Err(e) = store::save(self.store.as_ref(), OVERRIDES_KEY, &caches.overrides) {
            warn!(key = key, error = %e, "Failed to persist identifier override");
        }
    }

    /// Record a provider match and clear any unmatched mark for the key
    pub fn remember_resolved(&self, media_type: MediaType, key: &str, id: &str) {
        let mut caches = self.caches.lock();
        caches
            .resolved
            .get_mut(media_type)
            .insert(key.to_string(), id.to_string());
        caches.unmatched.get_mut(media_type).remove(key);
    }

    /// Record a failed resolution; a key is never both unmatched and resolved
    pub fn mark_unmatched(&self, media_type: MediaType, key: &str) {
        let mut caches = self.caches.lock();
        caches.resolved.get_mut(media_type).remove(key);
        caches.unmatched.get_mut(media_type).insert(key.to_string(), true);
    }

    pub fn clear_unmatched(&self, media_type: MediaType, key: &str) {
        self.caches.lock().unmatched.get_mut(media_type).remove(key);
    }

    pub fn is_unmatched(&self, media_type: MediaType, key: &str) -> bool {
        self.caches.lock().unmatched.get(media_type).contains_key(key)
    }

    pub fn mark_missing_poster(&self, media_type: MediaType, key: &str) {
        self.caches
            .lock()
            .missing_posters
            .get_mut(media_type)
            .insert(key.to_string(), true);
    }

    pub fn clear_missing_poster(&self, media_type: MediaType, key: &str) {
        self.caches.lock().missing_posters.get_mut(media_type).remove(key);
    }

    pub fn is_missing_poster(&self, media_type: MediaType, key: &str) -> bool {
        self.caches.lock().missing_posters.get(media_type).contains_key(key)
    }

    pub fn year_hint(&self, id: &str) -> Option<i32> {
        self.caches.lock().year_hints.get(id).copied()
    }

    pub fn save_year_hint(&self, id: &str, year: i32) {
        self.caches.lock().year_hints.insert(id.to_string(), year);
    }

    /// Folder key an id was stored under, overrides first
    pub fn find_key_for_id(&self, media_type: MediaType, id: &str) -> Option<String> {
        let caches = self.caches.lock();
        [caches.overrides.get(media_type), caches.resolved.get(media_type)]
            .into_iter()
            .find_map(|map| map.iter().find(|(_, v)| v.as_str() == id).map(|(k, _)| k.clone()))
    }

    /// Number of titles matched by search, across both media types
    pub fn resolved_count(&self) -> usize {
        let caches = self.caches.lock();
        caches.resolved.movie.len() + caches.resolved.series.len()
    }

    pub fn unmatched_keys(&self, media_type: MediaType) -> Vec<String> {
        let mut keys: Vec<String> = self.caches.lock().unmatched.get(media_type).keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn missing_poster_keys(&self, media_type: MediaType) -> Vec<String> {
        let mut keys: Vec<String> = self
            .caches
            .lock()
            .missing_posters
            .get(media_type)
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    /// Write the resolved cache and the unmatched and missing-poster sets
    pub fn persist(&self) -> Result<(), ConfigError> {
        let caches = self.caches.lock();
        store::save(self.store.as_ref(), RESOLVED_KEY, &caches.resolved)?;
        store::save(self.store.as_ref(), UNMATCHED_KEY, &caches.unmatched)?;
        store::save(self.store.as_ref(), MISSING_POSTERS_KEY, &caches.missing_posters)
    }
}

/// Flags shared by the work queue, the scanner and the drain handler
#[derive(Debug)]
pub struct QueueState {
    disabled: AtomicBool,
    full_scan_running: AtomicBool,
    folder_scan_running: AtomicBool,
    avoid_optimized_backdrops: AtomicBool,
    last_retry_month: AtomicI32,
}

impl QueueState {
    pub fn new(last_retry_month: i32) -> Self {
        Self {
            disabled: AtomicBool::new(false),
            full_scan_running: AtomicBool::new(false),
            folder_scan_running: AtomicBool::new(false),
            avoid_optimized_backdrops: AtomicBool::new(false),
            last_retry_month: AtomicI32::new(last_retry_month),
        }
    }

    pub fn load(store: &dyn ConfigStore) -> Self {
        Self::new(store::load(store, LAST_RETRY_MONTH_KEY).unwrap_or(-1))
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::SeqCst)
    }

    pub fn disable(&self) {
        self.disabled.store(true, Ordering::SeqCst);
    }

    pub fn full_scan_running(&self) -> bool {
        self.full_scan_running.load(Ordering::SeqCst)
    }

    pub fn set_full_scan_running(&self, running: bool) {
        self.full_scan_running.store(running, Ordering::SeqCst);
    }

    pub fn folder_scan_running(&self) -> bool {
        self.folder_scan_running.load(Ordering::SeqCst)
    }

    pub fn set_folder_scan_running(&self, running: bool) {
        self.folder_scan_running.store(running, Ordering::SeqCst);
    }

    /// Set by forced overwrite scans so every missing backdrop is fetched
    pub fn avoid_optimized_backdrops(&self) -> bool {
        self.avoid_optimized_backdrops.load(Ordering::SeqCst)
    }

    pub fn set_avoid_optimized_backdrops(&self, avoid: bool) {
        self.avoid_optimized_backdrops.store(avoid, Ordering::SeqCst);
    }

    pub fn last_retry_month(&self) -> i32 {
        self.last_retry_month.load(Ordering::SeqCst)
    }

    pub fn set_last_retry_month(&self, month: i32, store: &dyn ConfigStore) {
        self.last_retry_month.store(month, Ordering::SeqCst);
        if let Err(e) = store::save(store, LAST_RETRY_MONTH_KEY, &month) {
            warn!(error = %e, "Failed to persist last retry month");
        }
    }

    /// Clear the per-scan flags once the queue has drained
    pub fn reset_after_drain(&self) {
        self.disabled.store(false, Ordering::SeqCst);
        self.full_scan_running.store(false, Ordering::SeqCst);
        self.folder_scan_running.store(false, Ordering::SeqCst);
        self.avoid_optimized_backdrops.store(false, Ordering::SeqCst);
    }
}
