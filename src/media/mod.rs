//! Core media types shared by the scan pipeline
//!
//! A `WorkItem` is one title on disk (a folder or a standalone video file).
//! Caches are keyed by `FolderKey`, which optionally carries the name of the
//! media root so that identical leaf names under different roots stay apart.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Extensions treated as playable video
pub const VIDEO_EXTENSIONS: &[&str] = &["mkv", "avi", "mp4", "m4v", "ts", "mov", "wmv"];

/// Separator between a leaf name and its parent disambiguator
const PARENT_OPEN: &str = "\u{200b} [";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Movie,
    Series,
}

impl MediaType {
    pub const ALL: [MediaType; 2] = [MediaType::Movie, MediaType::Series];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Movie => "movie",
            Self::Series => "series",
        }
    }

    /// Path segment used by TMDB endpoints
    pub fn tmdb_path(&self) -> &'static str {
        match self {
            Self::Movie => "movie",
            Self::Series => "tv",
        }
    }

    /// Library section type on a Plex server
    pub fn plex_section_type(&self) -> &'static str {
        match self {
            Self::Movie => "movie",
            Self::Series => "show",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for MediaType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "movie" | "movies" => Ok(Self::Movie),
            "series" | "tv" | "show" | "shows" => Ok(Self::Series),
            other => Err(format!("unknown media type: {}", other)),
        }
    }
}

/// Cache key for a title
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FolderKey {
    pub name: String,
    pub parent: Option<String>,
}

impl FolderKey {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
        }
    }

    pub fn with_parent(name: impl Into<String>, parent: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: Some(parent.into()),
        }
    }

    /// Split a stored key back into leaf name and parent
    pub fn parse(raw: &str) -> Self {
        if let Some((name, rest)) = raw.split_once(PARENT_OPEN)
            && let Some(parent) = rest.strip_suffix(']')
        {
            return Self::with_parent(name, parent);
        }
        Self::new(raw)
    }

    /// The parent-qualified form, or the bare name when there is no parent
    pub fn qualified(&self) -> String {
        match &self.parent {
            Some(parent) => format!("{}{}{}]", self.name, PARENT_OPEN, parent),
            None => self.name.clone(),
        }
    }

    pub fn bare(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for FolderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.qualified())
    }
}

/// Identifiers supplied by the caller, e.g. from a webhook payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExplicitIds {
    pub imdb: Option<String>,
    pub tmdb: Option<String>,
    pub tvdb: Option<String>,
}

impl ExplicitIds {
    pub fn is_empty(&self) -> bool {
        self.imdb.is_none() && self.tmdb.is_none() && self.tvdb.is_none()
    }
}

/// One unit of scan work
#[derive(Debug, Clone, PartialEq)]
pub struct WorkItem {
    pub name: String,
    /// Folder holding the artwork; for file items this is the directory containing the file
    pub folder: PathBuf,
    pub media_type: MediaType,
    pub is_file: bool,
    pub forced: bool,
    pub avoid_year_match: bool,
    pub explicit_ids: ExplicitIds,
    pub poster_file_name: String,
    pub backdrop_file_name: String,
    pub retry_attempted: bool,
}

impl WorkItem {
    /// A title stored as its own folder
    pub fn folder(path: impl Into<PathBuf>, media_type: MediaType) -> Self {
        let folder = path.into();
        let name = file_name_lossy(&folder);
        Self {
            name,
            folder,
            media_type,
            is_file: false,
            forced: false,
            avoid_year_match: false,
            explicit_ids: ExplicitIds::default(),
            poster_file_name: "poster.jpg".to_string(),
            backdrop_file_name: "background.jpg".to_string(),
            retry_attempted: false,
        }
    }

    /// A standalone video file sitting directly in a media root
    pub fn file(path: &Path, media_type: MediaType) -> Self {
        let name = file_name_lossy(path);
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| name.clone());
        Self {
            folder: path.parent().map(Path::to_path_buf).unwrap_or_default(),
            is_file: true,
            poster_file_name: format!("{}.jpg", stem),
            backdrop_file_name: format!("{}-fanart.jpg", stem),
            name,
            ..Self::folder(PathBuf::new(), media_type)
        }
    }

    pub fn forced(mut self, forced: bool) -> Self {
        self.forced = forced;
        self
    }

    pub fn avoid_year_match(mut self, avoid: bool) -> Self {
        self.avoid_year_match = avoid;
        self
    }

    pub fn with_ids(mut self, ids: ExplicitIds) -> Self {
        self.explicit_ids = ids;
        self
    }

    /// The media root the item belongs to; folder-level settings are keyed by it
    pub fn parent_media_folder(&self) -> PathBuf {
        if self.is_file {
            self.folder.clone()
        } else {
            self.folder
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| self.folder.clone())
        }
    }

    pub fn folder_key(&self) -> FolderKey {
        let parent = self.parent_media_folder();
        match parent.file_name() {
            Some(parent) => FolderKey::with_parent(&self.name, parent.to_string_lossy()),
            None => FolderKey::new(&self.name),
        }
    }

    /// Path of the video this item represents, when one can be found
    pub fn media_file(&self, target_folder: &Path) -> Option<PathBuf> {
        if self.is_file {
            return Some(self.folder.join(&self.name));
        }
        match self.media_type {
            MediaType::Series => first_episode_file(target_folder),
            MediaType::Movie => first_feature_video(target_folder),
        }
    }
}

/// Notification that a title's artwork changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshRequest {
    pub media_file: PathBuf,
    pub media_folder: PathBuf,
    pub media_type: MediaType,
}

pub fn file_name_lossy(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

pub fn is_video_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| VIDEO_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Entries in a directory, sorted by name; unreadable directories yield nothing
pub fn list_entries(dir: &Path) -> Vec<PathBuf> {
    let mut entries: Vec<PathBuf> = fs::read_dir(dir)
        .map(|rd| rd.filter_map(|e| e.ok()).map(|e| e.path()).collect())
        .unwrap_or_default();
    entries.sort();
    entries
}

pub fn subdirectories(dir: &Path) -> Vec<PathBuf> {
    list_entries(dir).into_iter().filter(|p| p.is_dir()).collect()
}

pub fn video_files(dir: &Path) -> Vec<PathBuf> {
    list_entries(dir)
        .into_iter()
        .filter(|p| p.is_file() && is_video_file(p))
        .collect()
}

/// First video in a movie folder that is not a trailer
pub fn first_feature_video(dir: &Path) -> Option<PathBuf> {
    video_files(dir)
        .into_iter()
        .find(|p| !file_name_lossy(p).to_lowercase().contains("trailer"))
}

/// First video of the first season folder that has one, else a loose episode
pub fn first_episode_file(series_dir: &Path) -> Option<PathBuf> {
    for season in subdirectories(series_dir) {
        let found = walkdir::WalkDir::new(&season)
            .max_depth(2)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .find(|e| e.file_type().is_file() && is_video_file(e.path()));
        if let Some(entry) = found {
            return Some(entry.into_path());
        }
    }
    video_files(series_dir).into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_folder_key_round_trip() {
        let key = FolderKey::with_parent("Dune", "Movies 4K");
        let parsed = FolderKey::parse(&key.qualified());
        assert_eq!(parsed, key);
        assert_eq!(FolderKey::parse("Dune"), FolderKey::new("Dune"));
    }

    #[test]
    fn test_file_item_names() {
        let item = WorkItem::file(Path::new("/media/movies/Heat (1995).mkv"), MediaType::Movie);
        assert_eq!(item.name, "Heat (1995).mkv");
        assert_eq!(item.folder, PathBuf::from("/media/movies"));
        assert_eq!(item.poster_file_name, "Heat (1995).jpg");
        assert_eq!(item.backdrop_file_name, "Heat (1995)-fanart.jpg");
        assert_eq!(item.parent_media_folder(), PathBuf::from("/media/movies"));
        assert_eq!(item.folder_key().parent.as_deref(), Some("movies"));
    }

    #[test]
    fn test_folder_item_parent() {
        let item = WorkItem::folder("/media/tv/Severance", MediaType::Series);
        assert_eq!(item.name, "Severance");
        assert_eq!(item.parent_media_folder(), PathBuf::from("/media/tv"));
        assert_eq!(item.poster_file_name, "poster.jpg");
    }

    #[test]
    fn test_media_type_parse() {
        assert_eq!("tv".parse::<MediaType>(), Ok(MediaType::Series));
        assert_eq!("Movie".parse::<MediaType>(), Ok(MediaType::Movie));
        assert!("music".parse::<MediaType>().is_err());
    }

    #[test]
    fn test_first_feature_skips_trailers() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a-trailer.mkv"), b"").unwrap();
        fs::write(dir.path().join("movie.mkv"), b"").unwrap();
        fs::write(dir.path().join("notes.txt"), b"").unwrap();
        assert_eq!(first_feature_video(dir.path()), Some(dir.path().join("movie.mkv")));
    }

    #[test]
    fn test_first_episode_prefers_first_season() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("Season 01")).unwrap();
        fs::create_dir_all(dir.path().join("Season 02")).unwrap();
        fs::write(dir.path().join("Season 02/s02e01.mkv"), b"").unwrap();
        fs::write(dir.path().join("Season 01/s01e02.mkv"), b"").unwrap();
        fs::write(dir.path().join("Season 01/s01e01.mkv"), b"").unwrap();
        assert_eq!(
            first_episode_file(dir.path()),
            Some(dir.path().join("Season 01/s01e01.mkv"))
        );
    }
}
