//! Expiring set for suppressing duplicate events
//!
//! Filesystem watchers tend to report a new folder and then the files inside
//! it; upstream integrations sometimes deliver the same webhook twice. Both
//! cases are handled by marking the path and ignoring repeats until the mark
//! expires.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

/// Window for filesystem add events
pub const FS_EVENT_WINDOW: Duration = Duration::from_secs(120 * 60);

/// Window for webhook deliveries
pub const WEBHOOK_WINDOW: Duration = Duration::from_secs(60 * 60);

/// A set whose members disappear after a fixed time-to-live
#[derive(Debug)]
pub struct ExpiringSet {
    entries: Mutex<HashMap<String, Instant>>,
    ttl: Duration,
}

impl ExpiringSet {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Record `key` as seen, restarting its window
    pub fn mark(&self, key: &str) {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        entries.retain(|_, expires_at| now < *expires_at);
        entries.insert(key.to_string(), now + self.ttl);
    }

    /// Whether `key` was marked and its window has not elapsed yet
    pub fn is_duplicate(&self, key: &str) -> bool {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(expires_at) if Instant::now() < *expires_at => true,
            Some(_) => {
                entries.remove(key);
                false
            }
            None => false,
        }
    }

    /// Mark `key` unless it is already marked; returns true for a first sighting
    pub fn check_and_mark(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        entries.retain(|_, expires_at| now < *expires_at);
        if entries.contains_key(key) {
            return false;
        }
        entries.insert(key.to_string(), now + self.ttl);
        true
    }

    /// Remove `key` explicitly, returning whether it was live
    pub fn consume(&self, key: &str) -> bool {
        self.entries
            .lock()
            .remove(key)
            .map(|expires_at| Instant::now() < expires_at)
            .unwrap_or(false)
    }

    /// Number of live marks
    pub fn len(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        entries.retain(|_, expires_at| now < *expires_at);
        entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
