//! Filesystem watcher intake
//!
//! Watchers tend to report a new folder and then every file inside it, so
//! directory events mark the folder in an expiring set and file events from
//! a marked folder are dropped.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use notify::event::{CreateKind, ModifyKind, RenameMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use super::dedup::{ExpiringSet, FS_EVENT_WINDOW};
use super::queue::WorkQueue;
use crate::config::{Settings, SettingsHandle};
use crate::media::{MediaType, WorkItem, file_name_lossy, is_video_file};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsEvent {
    AddedDirectory(PathBuf),
    AddedFile(PathBuf),
}

/// Turns filesystem events into work items
pub struct WatchIntake {
    settings: SettingsHandle,
    queue: WorkQueue<WorkItem>,
    recent_dirs: ExpiringSet,
}

impl WatchIntake {
    pub fn new(settings: SettingsHandle, queue: WorkQueue<WorkItem>) -> Self {
        Self {
            settings,
            queue,
            recent_dirs: ExpiringSet::new(FS_EVENT_WINDOW),
        }
    }

    /// Queue the item an event describes; returns it, or `None` when the event is ignored
    pub fn handle(&self, event: FsEvent) -> Option<WorkItem> {
        let settings = self.settings.current();
        let item = match event {
            FsEvent::AddedDirectory(path) => self.directory_item(&settings, path)?,
            FsEvent::AddedFile(path) => self.file_item(&settings, &path)?,
        };
        self.queue.push(item.clone());
        Some(item)
    }

    fn directory_item(&self, settings: &Settings, path: PathBuf) -> Option<WorkItem> {
        let (media_type, root) = media_root(settings, &path)?;

        let mut folder = path;
        if settings.watch_folder_depth > 0 {
            // Deeper watching only applies to movies
            if media_type == MediaType::Series {
                return None;
            }
            if let Some(Component::Normal(top)) = folder.strip_prefix(&root).ok()?.components().next() {
                folder = root.join(top);
            }
        }

        let name = file_name_lossy(&folder);
        if name.eq_ignore_ascii_case("new folder") {
            return None;
        }

        let key = folder.to_string_lossy();
        if !self.recent_dirs.check_and_mark(&key) {
            debug!(folder = %key, "Duplicate directory event dropped");
            return None;
        }
        info!(item = %name, media_type = %media_type, "Directory added");
        Some(WorkItem::folder(folder, media_type))
    }

    fn file_item(&self, settings: &Settings, path: &Path) -> Option<WorkItem> {
        if !is_video_file(path) {
            return None;
        }
        let (media_type, root) = media_root(settings, path)?;
        if media_type != MediaType::Movie {
            return None;
        }
        let dir = path.parent()?;
        if settings.watch_folder_depth == 0 && dir != root {
            return None;
        }
        if self.recent_dirs.is_duplicate(&dir.to_string_lossy()) {
            debug!(folder = %dir.display(), "File belongs to a folder that was just added, event dropped");
            return None;
        }
        info!(item = %file_name_lossy(path), "Video file added");
        Some(WorkItem::file(path, media_type))
    }
}

/// Media type and root for a path strictly inside a media folder; roots themselves are ignored
fn media_root(settings: &Settings, path: &Path) -> Option<(MediaType, PathBuf)> {
    let is_root = MediaType::ALL
        .into_iter()
        .any(|t| settings.media_folders.get(t).iter().any(|root| root == path));
    if is_root {
        return None;
    }
    settings.media_root_for(path)
}

/// Map a notify event onto an intake event
fn convert_notify_event(event: Event) -> Option<FsEvent> {
    let path = event.paths.into_iter().last()?;
    if file_name_lossy(&path).starts_with('.') {
        return None;
    }
    match event.kind {
        EventKind::Create(CreateKind::Folder) => Some(FsEvent::AddedDirectory(path)),
        EventKind::Create(CreateKind::File) => Some(FsEvent::AddedFile(path)),
        EventKind::Create(_) | EventKind::Modify(ModifyKind::Name(RenameMode::To | RenameMode::Both)) => {
            if path.is_dir() {
                Some(FsEvent::AddedDirectory(path))
            } else {
                Some(FsEvent::AddedFile(path))
            }
        }
        _ => None,
    }
}

/// Watch every media folder and feed events to the intake
///
/// The returned watcher must be kept alive for events to keep flowing.
pub fn spawn_fs_watcher(settings: &Settings, intake: Arc<WatchIntake>) -> Result<RecommendedWatcher> {
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();

    let mut watcher = RecommendedWatcher::new(
        move |res: std::result::Result<Event, notify::Error>| match res {
            Ok(event) => {
                if let Some(fs_event) = convert_notify_event(event)
                    && event_tx.send(fs_event).is_err()
                {
                    error!("Filesystem event channel closed");
                }
            }
            Err(e) => error!(error = %e, "Watch error"),
        },
        Config::default(),
    )
    .context("Failed to create filesystem watcher")?;

    let mode = if settings.watch_folder_depth > 0 {
        RecursiveMode::Recursive
    } else {
        RecursiveMode::NonRecursive
    };
    for media_type in MediaType::ALL {
        for root in settings.media_folders.get(media_type) {
            match watcher.watch(root, mode) {
                Ok(()) => info!(folder = %root.display(), "Watching media folder"),
                Err(e) => error!(folder = %root.display(), error = %e, "Failed to watch media folder"),
            }
        }
    }

    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            intake.handle(event);
        }
    });

    Ok(watcher)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn intake(depth: u32) -> WatchIntake {
        let mut settings = Settings::default();
        settings.media_folders.movie.push(PathBuf::from("/media/movies"));
        settings.media_folders.series.push(PathBuf::from("/media/tv"));
        settings.watch_folder_depth = depth;
        WatchIntake::new(SettingsHandle::new(settings), WorkQueue::new("test"))
    }

    fn dir(path: &str) -> FsEvent {
        FsEvent::AddedDirectory(PathBuf::from(path))
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_directory_dropped_until_window_elapses() {
        let intake = intake(0);
        assert!(intake.handle(dir("/media/movies/Heat (1995)")).is_some());
        assert!(intake.handle(dir("/media/movies/Heat (1995)")).is_none());

        tokio::time::advance(FS_EVENT_WINDOW + Duration::from_secs(1)).await;
        assert!(intake.handle(dir("/media/movies/Heat (1995)")).is_some());
        assert_eq!(intake.queue.len(), 2);
    }

    #[tokio::test]
    async fn test_roots_and_new_folders_ignored() {
        let intake = intake(0);
        assert!(intake.handle(dir("/media/movies")).is_none());
        assert!(intake.handle(dir("/media/movies/New Folder")).is_none());
        assert!(intake.handle(dir("/elsewhere/Heat")).is_none());
        assert!(intake.queue.is_empty());
    }

    #[tokio::test]
    async fn test_file_in_announced_folder_dropped() {
        let intake = intake(1);
        let item = intake.handle(dir("/media/movies/Heat (1995)")).unwrap();
        assert!(!item.is_file);

        let file = FsEvent::AddedFile(PathBuf::from("/media/movies/Heat (1995)/heat.mkv"));
        assert!(intake.handle(file).is_none());
    }

    #[tokio::test]
    async fn test_loose_movie_file_queued() {
        let intake = intake(0);
        let item = intake
            .handle(FsEvent::AddedFile(PathBuf::from("/media/movies/Heat (1995).mkv")))
            .unwrap();
        assert!(item.is_file);
        assert_eq!(item.poster_file_name, "Heat (1995).jpg");

        assert!(intake.handle(FsEvent::AddedFile(PathBuf::from("/media/movies/notes.txt"))).is_none());
        assert!(intake.handle(FsEvent::AddedFile(PathBuf::from("/media/tv/pilot.mkv"))).is_none());
    }

    #[tokio::test]
    async fn test_depth_collapses_to_top_movie_folder() {
        let intake = intake(2);
        let item = intake.handle(dir("/media/movies/Heat (1995)/Extras")).unwrap();
        assert_eq!(item.folder, PathBuf::from("/media/movies/Heat (1995)"));
        assert_eq!(item.name, "Heat (1995)");

        assert!(intake.handle(dir("/media/tv/Andor/Season 1")).is_none());
    }

    #[test]
    fn test_notify_conversion() {
        let event = Event::new(EventKind::Create(CreateKind::Folder)).add_path(PathBuf::from("/media/movies/Heat"));
        assert_eq!(convert_notify_event(event), Some(dir("/media/movies/Heat")));

        let hidden = Event::new(EventKind::Create(CreateKind::File)).add_path(PathBuf::from("/media/movies/.DS_Store"));
        assert_eq!(convert_notify_event(hidden), None);

        let removed = Event::new(EventKind::Remove(notify::event::RemoveKind::Folder))
            .add_path(PathBuf::from("/media/movies/Heat"));
        assert_eq!(convert_notify_event(removed), None);
    }
}
