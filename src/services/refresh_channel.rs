//! Refresh notifications for the external media server
//!
//! Completed items are forwarded here instead of being handled by the work
//! queue, so an unreachable media server never holds up artwork fetching.
//! Requests run one at a time. Depending on the configured mode they are
//! queued immediately, after a fixed delay, or collected and flushed once a
//! day at a set local time.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{Days, NaiveDateTime, NaiveTime};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::media_server::{self, MediaServer};
use crate::config::{RefreshMode, SettingsHandle};
use crate::media::RefreshRequest;

/// Timer settings for the refresh channel
#[derive(Debug, Clone, Copy)]
pub struct RefreshTimings {
    /// Spacing between lookups of an item the server does not know yet
    pub retry_interval: Duration,
    /// Lookups after the first one before giving up
    pub max_retries: u32,
    /// How long one request holds the queue before the next one starts
    pub slot_timeout: Duration,
    /// Delay before the time-of-day scheduler arms for the first time
    pub tod_first_arm: Duration,
    /// Pause after each time-of-day flush
    pub tod_cooldown: Duration,
}

impl Default for RefreshTimings {
    fn default() -> Self {
        Self {
            retry_interval: Duration::from_secs(60),
            max_retries: 6,
            slot_timeout: Duration::from_secs(30),
            tod_first_arm: Duration::from_secs(60),
            tod_cooldown: Duration::from_secs(61),
        }
    }
}

/// Sequential refresh queue in front of a media server
pub struct RefreshChannel {
    sender: mpsc::UnboundedSender<RefreshRequest>,
    queued: Arc<AtomicUsize>,
    pending: Mutex<Vec<RefreshRequest>>,
    server: Arc<dyn MediaServer>,
    settings: SettingsHandle,
    timings: RefreshTimings,
}

impl RefreshChannel {
    /// Spawn the queue worker and the time-of-day scheduler
    pub fn start(server: Arc<dyn MediaServer>, settings: SettingsHandle, timings: RefreshTimings) -> Arc<Self> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let queued = Arc::new(AtomicUsize::new(0));

        tokio::spawn(run_worker(receiver, server.clone(), queued.clone(), timings));

        let channel = Arc::new(Self {
            sender,
            queued,
            pending: Mutex::new(Vec::new()),
            server,
            settings,
            timings,
        });
        tokio::spawn(channel.clone().run_tod_scheduler());
        channel
    }

    /// Route a request according to the configured refresh mode
    pub fn submit(self: &Arc<Self>, request: RefreshRequest) {
        if !self.server.is_connected() {
            debug!(file = %request.media_file.display(), "Media server not connected, dropping refresh request");
            return;
        }

        let settings = self.settings.current();
        match settings.plex_delay_type {
            RefreshMode::Immediate => self.enqueue(request),
            RefreshMode::Delay => {
                let delay = Duration::from_secs(settings.plex_refresh_delay);
                let channel = Arc::clone(self);
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    channel.enqueue(request);
                });
            }
            RefreshMode::Tod => {
                debug!(file = %request.media_file.display(), "Holding refresh request for the daily flush");
                self.pending.lock().push(request);
            }
        }
    }

    fn enqueue(&self, request: RefreshRequest) {
        self.queued.fetch_add(1, Ordering::SeqCst);
        if self.sender.send(request).is_err() {
            self.queued.fetch_sub(1, Ordering::SeqCst);
            warn!("Refresh worker stopped, request dropped");
        }
    }

    /// Move every held request into the queue, once per media file
    pub fn flush_pending(&self) -> usize {
        let pending = std::mem::take(&mut *self.pending.lock());
        let mut seen = HashSet::new();
        let mut flushed = 0;
        for request in pending {
            if seen.insert(request.media_file.clone()) {
                self.enqueue(request);
                flushed += 1;
            }
        }
        flushed
    }

    /// Requests waiting for the worker
    pub fn queue_len(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }

    /// Requests held for the next time-of-day flush
    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_connected(&self) -> bool {
        self.server.is_connected()
    }

    async fn run_tod_scheduler(self: Arc<Self>) {
        tokio::time::sleep(self.timings.tod_first_arm).await;
        loop {
            let settings = self.settings.current();
            let now = chrono::Local::now().naive_local();
            let pm = settings.plex_tod_am_pm.eq_ignore_ascii_case("pm");
            let wait = match next_tod_trigger(now, settings.plex_tod_hour, settings.plex_tod_min, pm) {
                Some(at) => (at - now).to_std().unwrap_or_default(),
                None => {
                    warn!(
                        hour = settings.plex_tod_hour,
                        minute = settings.plex_tod_min,
                        "Invalid refresh time of day, checking again in an hour"
                    );
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    continue;
                }
            };
            debug!(wait_secs = wait.as_secs(), "Time-of-day refresh armed");
            tokio::time::sleep(wait).await;

            let flushed = self.flush_pending();
            if flushed > 0 {
                info!(count = flushed, "Flushed time-of-day refresh requests");
            }
            tokio::time::sleep(self.timings.tod_cooldown).await;
        }
    }
}

async fn run_worker(
    mut receiver: mpsc::UnboundedReceiver<RefreshRequest>,
    server: Arc<dyn MediaServer>,
    queued: Arc<AtomicUsize>,
    timings: RefreshTimings,
) {
    info!("Refresh channel started");
    while let Some(request) = receiver.recv().await {
        queued.fetch_sub(1, Ordering::SeqCst);
        let server = server.clone();
        let file = request.media_file.clone();
        let poll = tokio::spawn(async move { refresh_with_retry(server.as_ref(), &request, timings).await });

        // The poller keeps running after the slot times out
        if tokio::time::timeout(timings.slot_timeout, poll).await.is_err() {
            debug!(file = %file.display(), "Refresh still polling, releasing the queue slot");
        }
    }
    info!("Refresh channel stopped");
}

/// Look the file up on the server and refresh it, retrying while it is unknown
///
/// Makes one attempt plus `max_retries` more, `retry_interval` apart.
pub async fn refresh_with_retry(server: &dyn MediaServer, request: &RefreshRequest, timings: RefreshTimings) -> bool {
    for attempt in 0..=timings.max_retries {
        if attempt > 0 {
            tokio::time::sleep(timings.retry_interval).await;
        }
        match media_server::refresh_file(server, &request.media_file, request.media_type).await {
            Ok(true) => {
                info!(folder = %request.media_folder.display(), attempt = attempt, "Media server refreshed");
                return true;
            }
            Ok(false) => {
                debug!(file = %request.media_file.display(), attempt = attempt, "Not on the media server yet");
            }
            Err(e) => {
                warn!(file = %request.media_file.display(), attempt = attempt, error = %e, "Media server refresh failed");
            }
        }
    }
    warn!(
        folder = %request.media_folder.display(),
        stage = "refresh",
        "Could not find the item on the media server, giving up"
    );
    false
}

/// Next local time matching `hour:minute` on a 12-hour clock, strictly after `now`
pub fn next_tod_trigger(now: NaiveDateTime, hour: u32, minute: u32, pm: bool) -> Option<NaiveDateTime> {
    let hour = hour % 12 + if pm { 12 } else { 0 };
    let time = NaiveTime::from_hms_opt(hour, minute, 0)?;
    let today = now.date().and_time(time);
    if today > now {
        Some(today)
    } else {
        today.checked_add_days(Days::new(1))
    }
}
