//! Radarr and Sonarr webhook intake
//!
//! Both integrations post a JSON body describing the title that was just
//! imported. Useful events become forced-to-the-front work items carrying the
//! ids the integration already knows.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::{info, warn};

use super::dedup::{ExpiringSet, WEBHOOK_WINDOW};
use super::queue::WorkQueue;
use crate::config::SettingsHandle;
use crate::media::{ExplicitIds, MediaType, WorkItem, file_name_lossy};

/// Ids arrive as numbers from some versions and strings from others
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ArrId {
    Number(u64),
    Text(String),
}

impl ArrId {
    /// `0` and blank strings mean "unknown"
    fn into_id(self) -> Option<String> {
        match self {
            ArrId::Number(0) => None,
            ArrId::Number(n) => Some(n.to_string()),
            ArrId::Text(s) if s.trim().is_empty() || s.trim() == "0" => None,
            ArrId::Text(s) => Some(s.trim().to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArrMedia {
    pub title: Option<String>,
    /// Radarr
    pub folder_path: Option<String>,
    /// Sonarr
    pub path: Option<String>,
    pub imdb_id: Option<String>,
    pub tmdb_id: Option<ArrId>,
    pub tvdb_id: Option<ArrId>,
}

impl ArrMedia {
    fn explicit_ids(&self) -> ExplicitIds {
        ExplicitIds {
            imdb: self.imdb_id.clone().filter(|id| !id.trim().is_empty()),
            tmdb: self.tmdb_id.clone().and_then(ArrId::into_id),
            tvdb: self.tvdb_id.clone().and_then(ArrId::into_id),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RadarrPayload {
    pub event_type: Option<String>,
    #[serde(default)]
    pub is_upgrade: bool,
    pub movie: Option<ArrMedia>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SonarrPayload {
    pub event_type: Option<String>,
    #[serde(default)]
    pub is_upgrade: bool,
    pub series: Option<ArrMedia>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    Queued(PathBuf),
    /// Not a first-time download, or no path in the payload
    NotUseful(String),
    Duplicate,
    /// The path does not exist locally and no media root holds its leaf folder
    PathInaccessible(String),
}

pub struct WebhookIntake {
    settings: SettingsHandle,
    queue: WorkQueue<WorkItem>,
    series_guard: ExpiringSet,
}

impl WebhookIntake {
    pub fn new(settings: SettingsHandle, queue: WorkQueue<WorkItem>) -> Self {
        Self {
            settings,
            queue,
            series_guard: ExpiringSet::new(WEBHOOK_WINDOW),
        }
    }

    pub fn radarr(&self, payload: RadarrPayload) -> WebhookOutcome {
        let event_type = payload.event_type.unwrap_or_default();
        let Some(movie) = payload.movie.filter(|m| m.folder_path.is_some()) else {
            return WebhookOutcome::NotUseful(event_type);
        };
        if event_type != "Download" || payload.is_upgrade {
            return WebhookOutcome::NotUseful(event_type);
        }
        let reported = PathBuf::from(movie.folder_path.as_deref().unwrap_or_default());
        info!(folder = %reported.display(), "Radarr download event received");

        let Some(folder) = self.locate(&reported, MediaType::Movie) else {
            return WebhookOutcome::PathInaccessible(reported.display().to_string());
        };
        let item = WorkItem::folder(folder.clone(), MediaType::Movie)
            .forced(true)
            .avoid_year_match(true)
            .with_ids(movie.explicit_ids());
        self.enqueue(item);
        info!(title = movie.title.as_deref().unwrap_or_default(), "Movie queued from Radarr");
        WebhookOutcome::Queued(folder)
    }

    pub fn sonarr(&self, payload: SonarrPayload) -> WebhookOutcome {
        let event_type = payload.event_type.unwrap_or_default();
        let Some(series) = payload.series.filter(|s| s.path.is_some()) else {
            return WebhookOutcome::NotUseful(event_type);
        };
        if event_type != "Download" || payload.is_upgrade {
            return WebhookOutcome::NotUseful(event_type);
        }
        let reported = series.path.clone().unwrap_or_default();

        // One event arrives per imported episode
        if !self.series_guard.check_and_mark(&reported) {
            info!(folder = %reported, "Duplicate Sonarr event ignored");
            return WebhookOutcome::Duplicate;
        }
        info!(folder = %reported, "Sonarr download event received");

        let Some(folder) = self.locate(Path::new(&reported), MediaType::Series) else {
            return WebhookOutcome::PathInaccessible(reported);
        };
        let item = WorkItem::folder(folder.clone(), MediaType::Series)
            .avoid_year_match(true)
            .with_ids(series.explicit_ids());
        self.enqueue(item);
        info!(title = series.title.as_deref().unwrap_or_default(), "Series queued from Sonarr");
        WebhookOutcome::Queued(folder)
    }

    /// The reported path, or the same leaf folder under one of our media roots
    fn locate(&self, reported: &Path, media_type: MediaType) -> Option<PathBuf> {
        if reported.exists() {
            return Some(reported.to_path_buf());
        }
        let leaf = file_name_lossy(reported);
        warn!(folder = %reported.display(), "Webhook path not accessible, searching media folders");
        let settings = self.settings.current();
        let found = settings
            .media_folders
            .get(media_type)
            .iter()
            .map(|root| root.join(&leaf))
            .find(|candidate| candidate.exists());
        match &found {
            Some(folder) => info!(folder = %folder.display(), "Found webhook folder"),
            None => warn!(item = %leaf, media_type = %media_type, "Webhook folder not found in media folders"),
        }
        found
    }

    fn enqueue(&self, item: WorkItem) {
        let delay = self.settings.current().webhook_delay;
        if delay == 0 {
            self.queue.push_front(item);
            return;
        }
        let queue = self.queue.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(delay)).await;
            queue.push_front(item);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use assert_matches::assert_matches;
    use tempfile::TempDir;

    fn setup(delay: u64) -> (TempDir, WebhookIntake) {
        let dir = TempDir::new().unwrap();
        let movies = dir.path().join("movies");
        let tv = dir.path().join("tv");
        std::fs::create_dir_all(movies.join("Heat (1995)")).unwrap();
        std::fs::create_dir_all(tv.join("Andor")).unwrap();

        let mut settings = Settings::default();
        settings.media_folders.movie.push(movies);
        settings.media_folders.series.push(tv);
        settings.webhook_delay = delay;
        let intake = WebhookIntake::new(SettingsHandle::new(settings), WorkQueue::new("test"));
        (dir, intake)
    }

    fn radarr_payload(folder: &str) -> RadarrPayload {
        serde_json::from_value(serde_json::json!({
            "eventType": "Download",
            "isUpgrade": false,
            "movie": { "title": "Heat", "folderPath": folder, "imdbId": "tt0113277", "tmdbId": 949 }
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_radarr_relocates_by_leaf_name() {
        let (dir, intake) = setup(0);
        intake.queue.push(WorkItem::folder("/somewhere/else", MediaType::Movie));

        let outcome = intake.radarr(radarr_payload("/downloads/radarr/Heat (1995)"));
        let expected = dir.path().join("movies").join("Heat (1995)");
        assert_eq!(outcome, WebhookOutcome::Queued(expected.clone()));

        // Jumped ahead of the waiting scan item
        assert_eq!(intake.queue.len(), 2);
        let webhook_item = WorkItem::folder(expected, MediaType::Movie)
            .forced(true)
            .avoid_year_match(true)
            .with_ids(ExplicitIds {
                imdb: Some("tt0113277".into()),
                tmdb: Some("949".into()),
                tvdb: None,
            });
        let next = {
            let queue = intake.queue.clone();
            let (tx, rx) = tokio::sync::oneshot::channel();
            let tx = parking_lot::Mutex::new(Some(tx));
            queue.start(
                move |item: WorkItem| {
                    if let Some(tx) = tx.lock().take() {
                        let _ = tx.send(item);
                    }
                    async {}
                },
                || {},
            );
            rx.await.unwrap()
        };
        pretty_assertions::assert_eq!(next, webhook_item);
    }

    #[tokio::test]
    async fn test_radarr_ignores_upgrades_and_other_events() {
        let (_dir, intake) = setup(0);
        let mut upgrade = radarr_payload("/x/Heat (1995)");
        upgrade.is_upgrade = true;
        assert_matches!(intake.radarr(upgrade), WebhookOutcome::NotUseful(_));

        let test_event: RadarrPayload = serde_json::from_str(r#"{"eventType":"Test"}"#).unwrap();
        assert_eq!(intake.radarr(test_event), WebhookOutcome::NotUseful("Test".into()));

        assert_matches!(
            intake.radarr(radarr_payload("/x/Missing Movie (2001)")),
            WebhookOutcome::PathInaccessible(_)
        );
        assert!(intake.queue.is_empty());
    }

    #[tokio::test]
    async fn test_sonarr_duplicates_dropped() {
        let (dir, intake) = setup(0);
        let path = dir.path().join("tv").join("Andor");
        let payload: SonarrPayload = serde_json::from_value(serde_json::json!({
            "eventType": "Download",
            "series": { "title": "Andor", "path": path, "tvdbId": 393189, "tmdbId": 0 }
        }))
        .unwrap();

        assert_eq!(intake.sonarr(payload.clone()), WebhookOutcome::Queued(path));
        assert_eq!(intake.sonarr(payload), WebhookOutcome::Duplicate);
        assert_eq!(intake.queue.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_before_queueing() {
        let (_dir, intake) = setup(30);
        assert_matches!(
            intake.radarr(radarr_payload("/x/Heat (1995)")),
            WebhookOutcome::Queued(_)
        );
        assert!(intake.queue.is_empty());

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(intake.queue.len(), 1);
    }

    #[test]
    fn test_ids_from_payload() {
        let media: ArrMedia = serde_json::from_value(serde_json::json!({
            "imdbId": "", "tmdbId": "603", "tvdbId": 0
        }))
        .unwrap();
        assert_eq!(
            media.explicit_ids(),
            ExplicitIds {
                imdb: None,
                tmdb: Some("603".into()),
                tvdb: None
            }
        );
    }
}
