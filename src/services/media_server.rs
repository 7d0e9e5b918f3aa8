//! External media server (Plex) lookups and metadata refreshes
//!
//! Items are located by file signature: the video's size first, then its
//! file name, searched across every library section of the matching type.
//! Multi-part movies (`cd1`, `part2`, ...) fall back to the summed size of
//! all parts.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use reqwest::Method;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::config::SettingsHandle;
use crate::error::MediaServerError;
use crate::media::{ExplicitIds, MediaType, file_name_lossy, video_files};
use crate::services::rate_limiter::RateLimitedClient;

static PART_FILE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i) (cd|disc|disk|dvd|part|pt)[1-6]\.").expect("valid regex"));

const PRODUCT: &str = "postersync";

/// Episodes, in Plex's metadata type numbering
const EPISODE_TYPE: &str = "4";

/// How a video is looked up on the server
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileSignature {
    pub size: Option<u64>,
    pub file_name: Option<String>,
}

/// A title found on the server: its refresh handle plus the ids it carries
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerMatch {
    pub server_ref: String,
    pub ids: ExplicitIds,
}

#[async_trait]
pub trait MediaServer: Send + Sync {
    /// Updated on every successful contact
    fn is_connected(&self) -> bool;

    async fn test_connectivity(&self) -> bool;

    async fn find_by_signature(
        &self,
        signature: &FileSignature,
        media_type: MediaType,
    ) -> Result<Option<ServerMatch>, MediaServerError>;

    async fn refresh(&self, server_ref: &str) -> Result<bool, MediaServerError>;
}

/// Locate a video on the server: by size and name, then by the summed size of a multi-part movie
pub async fn lookup_file(
    server: &dyn MediaServer,
    media_file: &Path,
    media_type: MediaType,
) -> Result<Option<ServerMatch>, MediaServerError> {
    let size = match tokio::fs::metadata(media_file).await {
        Ok(meta) => meta.len(),
        Err(e) => {
            warn!(file = %media_file.display(), error = %e, "Cannot read file size, the media server lookup needs it");
            return Ok(None);
        }
    };

    let signature = FileSignature {
        size: Some(size),
        file_name: Some(file_name_lossy(media_file)),
    };
    if let Some(found) = server.find_by_signature(&signature, media_type).await? {
        return Ok(Some(found));
    }

    if media_type == MediaType::Movie
        && let Some(dir) = media_file.parent()
        && let Some(total) = multi_part_size(dir)
    {
        debug!(folder = %dir.display(), size = total, "Trying multi-part movie size");
        let signature = FileSignature {
            size: Some(total),
            file_name: None,
        };
        return server.find_by_signature(&signature, media_type).await;
    }

    Ok(None)
}

/// Locate a video and ask the server to refresh it; `false` when it is not known to the server
pub async fn refresh_file(
    server: &dyn MediaServer,
    media_file: &Path,
    media_type: MediaType,
) -> Result<bool, MediaServerError> {
    match lookup_file(server, media_file, media_type).await? {
        Some(found) => server.refresh(&found.server_ref).await,
        None => Ok(false),
    }
}

/// Summed size of the part files in a folder with more than one feature video
fn multi_part_size(dir: &Path) -> Option<u64> {
    let videos: Vec<_> = video_files(dir)
        .into_iter()
        .filter(|p| !file_name_lossy(p).to_lowercase().contains("-trailer."))
        .collect();
    if videos.len() < 2 {
        return None;
    }
    let total: u64 = videos
        .iter()
        .filter(|p| PART_FILE_RE.is_match(&file_name_lossy(p)))
        .filter_map(|p| std::fs::metadata(p).ok())
        .map(|m| m.len())
        .sum();
    (total > 0).then_some(total)
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(rename = "MediaContainer")]
    container: T,
}

#[derive(Debug, Default, Deserialize)]
struct SectionList {
    #[serde(rename = "Directory", default)]
    directories: Vec<Section>,
}

#[derive(Debug, Deserialize)]
struct Section {
    key: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Default, Deserialize)]
struct MetadataList {
    #[serde(rename = "Metadata", default)]
    metadata: Vec<Metadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Metadata {
    rating_key: Option<String>,
    grandparent_key: Option<String>,
    #[serde(rename = "Media", default)]
    media: Vec<Media>,
    #[serde(rename = "Guid", default)]
    guids: Vec<Guid>,
}

impl Metadata {
    fn has_file(&self, file_name: Option<&str>) -> bool {
        let Some(file_name) = file_name else {
            return !self.media.is_empty();
        };
        self.media
            .iter()
            .flat_map(|m| &m.parts)
            .filter_map(|p| p.file.as_deref())
            .any(|f| f.ends_with(file_name))
    }
}

#[derive(Debug, Deserialize)]
struct Media {
    #[serde(rename = "Part", default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    file: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Guid {
    id: String,
}

fn ids_from_guids(guids: &[Guid]) -> ExplicitIds {
    let mut ids = ExplicitIds::default();
    for guid in guids {
        if let Some(id) = guid.id.strip_prefix("imdb://") {
            ids.imdb = Some(id.to_string());
        } else if let Some(id) = guid.id.strip_prefix("tmdb://") {
            ids.tmdb = Some(id.to_string());
        } else if let Some(id) = guid.id.strip_prefix("tvdb://") {
            ids.tvdb = Some(id.to_string());
        }
    }
    ids
}

/// Plex Media Server client using the JSON API
pub struct PlexClient {
    client: Arc<RateLimitedClient>,
    settings: SettingsHandle,
    client_id: String,
    connected: AtomicBool,
    cache: Mutex<HashMap<(MediaType, String), ServerMatch>>,
}

impl PlexClient {
    pub fn new(settings: SettingsHandle) -> Self {
        Self {
            client: Arc::new(RateLimitedClient::for_media_server()),
            settings,
            client_id: uuid::Uuid::new_v4().to_string(),
            connected: AtomicBool::new(false),
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn request(&self, method: Method, path: &str) -> Result<reqwest::RequestBuilder, MediaServerError> {
        let settings = self.settings.current();
        if !settings.plex.is_configured() {
            return Err(MediaServerError::NotConfigured);
        }
        let url = format!("{}{}", settings.plex.base_url(), path);
        Ok(self
            .client
            .inner()
            .request(method, url)
            .header("Accept", "application/json")
            .header("X-Plex-Token", settings.plex.token.as_str())
            .header("X-Plex-Product", PRODUCT)
            .header("X-Plex-Client-Identifier", self.client_id.as_str()))
    }

    async fn get_json<T: DeserializeOwned + Send>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, MediaServerError> {
        let request = self.request(Method::GET, path)?.query(query);
        let response = self.client.send(request).await?;
        if !response.status().is_success() {
            return Err(MediaServerError::Status(response.status().as_u16()));
        }
        self.connected.store(true, Ordering::SeqCst);
        let envelope: Envelope<T> = response.json().await?;
        Ok(envelope.container)
    }

    async fn sections(&self, media_type: MediaType) -> Result<Vec<String>, MediaServerError> {
        let list: SectionList = self.get_json("/library/sections", &[]).await?;
        Ok(list
            .directories
            .into_iter()
            .filter(|s| s.kind == media_type.plex_section_type())
            .map(|s| s.key)
            .collect())
    }

    async fn search_section(
        &self,
        section: &str,
        media_type: MediaType,
        by: (&str, String),
        file_name: Option<&str>,
    ) -> Result<Option<ServerMatch>, MediaServerError> {
        let mut query = vec![by, ("includeGuids", "1".to_string())];
        if media_type == MediaType::Series {
            query.push(("type", EPISODE_TYPE.to_string()));
        }
        let path = format!("/library/sections/{}/all", section);
        let list: MetadataList = self.get_json(&path, &query).await?;
        let Some(entry) = list.metadata.into_iter().find(|m| m.has_file(file_name)) else {
            return Ok(None);
        };

        match media_type {
            MediaType::Movie => Ok(entry.rating_key.as_ref().map(|key| ServerMatch {
                server_ref: key.clone(),
                ids: ids_from_guids(&entry.guids),
            })),
            MediaType::Series => {
                let Some(show_key) = entry.grandparent_key else {
                    return Ok(None);
                };
                let show: MetadataList = self
                    .get_json(&show_key, &[("includeGuids", "1".to_string())])
                    .await?;
                let ids = show.metadata.first().map(|m| ids_from_guids(&m.guids)).unwrap_or_default();
                let server_ref = show_key.rsplit('/').next().unwrap_or(&show_key).to_string();
                Ok(Some(ServerMatch { server_ref, ids }))
            }
        }
    }
}

#[async_trait]
impl MediaServer for PlexClient {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn test_connectivity(&self) -> bool {
        let connected = match self.sections(MediaType::Movie).await {
            Ok(_) => true,
            Err(e) => {
                debug!(error = %e, "Media server is not reachable");
                false
            }
        };
        self.connected.store(connected, Ordering::SeqCst);
        connected
    }

    async fn find_by_signature(
        &self,
        signature: &FileSignature,
        media_type: MediaType,
    ) -> Result<Option<ServerMatch>, MediaServerError> {
        let cached = signature
            .file_name
            .as_ref()
            .and_then(|name| self.cache.lock().get(&(media_type, name.clone())).cloned());
        if let Some(found) = cached {
            return Ok(Some(found));
        }

        let sections = self.sections(media_type).await?;
        let file_name = signature.file_name.as_deref();

        // All size lookups run before any name lookup
        let mut attempts: Vec<(&str, (&str, String))> = Vec::new();
        if let Some(size) = signature.size {
            attempts.extend(sections.iter().map(|s| (s.as_str(), ("mediaSize", size.to_string()))));
        }
        if let Some(name) = file_name {
            attempts.extend(sections.iter().map(|s| (s.as_str(), ("file", name.to_string()))));
        }

        for (section, by) in attempts {
            let kind = by.0;
            match self.search_section(section, media_type, by, file_name).await {
                Ok(Some(found)) => {
                    info!(section = section, by = kind, server_ref = %found.server_ref, "Found item on media server");
                    if let Some(name) = file_name {
                        self.cache.lock().insert((media_type, name.to_string()), found.clone());
                    }
                    return Ok(Some(found));
                }
                Ok(None) => debug!(section = section, by = kind, "No media server results"),
                Err(e) => warn!(section = section, by = kind, error = %e, "Media server search failed"),
            }
        }
        Ok(None)
    }

    async fn refresh(&self, server_ref: &str) -> Result<bool, MediaServerError> {
        let path = format!("/library/metadata/{}/refresh", server_ref);
        let request = self.request(Method::PUT, &path)?;
        let response = self.client.send(request).await?;
        let ok = response.status().is_success();
        if ok {
            self.connected.store(true, Ordering::SeqCst);
        }
        Ok(ok)
    }
}
