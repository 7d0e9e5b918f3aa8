//! Poster and backdrop downloads from the rating poster image service

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};
use url::form_urlencoded;

use crate::config::Settings;
use crate::error::FetchError;
use crate::media::MediaType;
use crate::services::rate_limiter::RateLimitedClient;

pub const DEFAULT_IMAGE_BASE_URL: &str = "https://api.ratingposterdb.com";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtworkKind {
    Poster,
    Backdrop,
}

impl ArtworkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtworkKind::Poster => "poster",
            ArtworkKind::Backdrop => "backdrop",
        }
    }
}

/// One image to download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtworkRequest {
    pub imdb_id: String,
    pub kind: ArtworkKind,
    pub url: String,
}

#[async_trait]
pub trait ImageService: Send + Sync {
    /// Download the image bytes; 403 maps to `FetchError::QuotaExceeded`
    async fn download(&self, request: &ArtworkRequest) -> Result<Vec<u8>, FetchError>;
}

/// Overlay options resolved for a single item
///
/// Item-level settings (keyed by id) win over folder-level ones (keyed by
/// the parent media folder).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overlay {
    pub label: Option<String>,
    pub badges: Option<String>,
    pub badge_pos: Option<String>,
    pub backdrop_badge_pos: Option<String>,
    pub badge_size: Option<String>,
}

impl Overlay {
    pub fn resolve(settings: &Settings, media_folder: &str, imdb_id: &str, auto_badges: Option<String>) -> Self {
        let pick = |item: Option<&String>, folder: Option<&String>| item.or(folder).filter(|v| !v.is_empty()).cloned();
        Self {
            label: pick(settings.item_labels.get(imdb_id), settings.labels.get(media_folder)),
            badges: pick(
                settings.item_badges.get(imdb_id),
                auto_badges.as_ref().or(settings.badges.get(media_folder)),
            ),
            badge_pos: pick(None, settings.badge_positions.get(media_folder)),
            backdrop_badge_pos: pick(None, settings.backdrop_badge_positions.get(media_folder)),
            badge_size: pick(None, settings.badge_sizes.get(media_folder)),
        }
    }
}

/// Builds image service URLs from the current settings
#[derive(Debug, Clone)]
pub struct ArtworkUrls {
    base_url: String,
}

impl ArtworkUrls {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn poster(&self, settings: &Settings, imdb_id: &str, media_type: MediaType, overlay: &Overlay) -> String {
        let poster_type = settings.poster_type(media_type);
        let mut query = form_urlencoded::Serializer::new(String::new());

        let base = match settings.custom_posters.get(imdb_id) {
            Some(template) => template
                .replace("[[api-key]]", &settings.api_key)
                .replace("[[poster-type]]", poster_type)
                .replace("[[imdb-id]]", imdb_id),
            None => {
                let poster_type = if settings.textless(media_type) {
                    poster_type.replace("poster-", "textless-")
                } else {
                    poster_type.to_string()
                };
                if !settings.poster_lang.is_empty() && settings.poster_lang != "en" {
                    query.append_pair("lang", &settings.poster_lang);
                }
                format!("{}/{}/imdb/{}/{}.jpg", self.base_url, settings.api_key, poster_type, imdb_id)
            }
        };

        for (key, value) in [
            ("label", &overlay.label),
            ("badges", &overlay.badges),
            ("badgePos", &overlay.badge_pos),
            ("badgeSize", &overlay.badge_size),
        ] {
            if let Some(value) = value {
                query.append_pair(key, value);
            }
        }

        let rating_order = settings.rating_order.get(media_type);
        if poster_type == "rating-order" && !rating_order.is_empty() {
            query.append_pair("order", rating_order);
        }

        with_query(base, query.finish())
    }

    /// `with_overlays` is set when a rating order or backdrop badges apply
    pub fn backdrop(
        &self,
        settings: &Settings,
        imdb_id: &str,
        media_type: MediaType,
        overlay: &Overlay,
        with_overlays: bool,
    ) -> String {
        let mut query = form_urlencoded::Serializer::new(String::new());
        if with_overlays {
            let rating_order = settings.rating_order.get(media_type);
            if !rating_order.is_empty() {
                query.append_pair("order", rating_order);
            }
            if settings.backdrops_badges {
                if let Some(badges) = &overlay.badges {
                    query.append_pair("badges", badges);
                }
                if let Some(pos) = &overlay.backdrop_badge_pos {
                    query.append_pair("badgePos", pos);
                }
            }
        }
        let base = format!("{}/{}/imdb/backdrop-default/{}.jpg", self.base_url, settings.api_key, imdb_id);
        with_query(base, query.finish())
    }
}

fn with_query(base: String, query: String) -> String {
    if query.is_empty() {
        base
    } else if base.contains('?') {
        format!("{}&{}", base, query)
    } else {
        format!("{}?{}", base, query)
    }
}

/// Write downloaded bytes next to the media
pub async fn write_artwork(path: &Path, bytes: &[u8]) -> Result<(), FetchError> {
    tokio::fs::write(path, bytes).await.map_err(|source| FetchError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// HTTP client for the rating poster image service
pub struct RpdbClient {
    client: Arc<RateLimitedClient>,
    base_url: String,
}

impl RpdbClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Arc::new(RateLimitedClient::for_image_service()),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ImageService for RpdbClient {
    async fn download(&self, request: &ArtworkRequest) -> Result<Vec<u8>, FetchError> {
        debug!(id = %request.imdb_id, kind = request.kind.as_str(), "Downloading artwork");
        let response = self.client.get(&request.url).await?;
        let status = response.status().as_u16();
        match status {
            200 => Ok(response.bytes().await?.to_vec()),
            403 => {
                let body = response.text().await.unwrap_or_default();
                warn!(id = %request.imdb_id, body = %body, "Image service refused the request");
                Err(FetchError::QuotaExceeded { status, body })
            }
            _ => Err(FetchError::NotAvailable(status)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn settings() -> Settings {
        Settings {
            api_key: "t0-free-rpdb".to_string(),
            ..Settings::default()
        }
    }

    fn urls() -> ArtworkUrls {
        ArtworkUrls::new("https://api.ratingposterdb.com/")
    }

    #[test]
    fn test_default_poster_url() {
        let url = urls().poster(&settings(), "tt0113277", MediaType::Movie, &Overlay::default());
        assert_eq!(url, "https://api.ratingposterdb.com/t0-free-rpdb/imdb/poster-default/tt0113277.jpg");
    }

    #[test]
    fn test_textless_language_and_overlays() {
        let mut settings = settings();
        settings.series_textless = true;
        settings.poster_lang = "de".to_string();
        let overlay = Overlay {
            label: Some("4k".to_string()),
            badges: Some("hdrcolor,h265".to_string()),
            badge_size: Some("small".to_string()),
            ..Overlay::default()
        };

        let url = urls().poster(&settings, "tt9253284", MediaType::Series, &overlay);
        assert_eq!(
            url,
            "https://api.ratingposterdb.com/t0-free-rpdb/imdb/textless-default/tt9253284.jpg\
             ?lang=de&label=4k&badges=hdrcolor%2Ch265&badgeSize=small"
        );
    }

    #[test]
    fn test_custom_template_and_rating_order() {
        let mut settings = settings();
        settings.movie_poster_type = "rating-order".to_string();
        settings.rating_order.movie = "imdb,tomatoes".to_string();
        settings.custom_posters.insert(
            "tt0113277".to_string(),
            "https://example.org/[[api-key]]/[[poster-type]]/[[imdb-id]].jpg?fallback=true".to_string(),
        );

        let url = urls().poster(&settings, "tt0113277", MediaType::Movie, &Overlay::default());
        assert_eq!(
            url,
            "https://example.org/t0-free-rpdb/rating-order/tt0113277.jpg?fallback=true&order=imdb%2Ctomatoes"
        );
    }

    #[test]
    fn test_backdrop_overlays_only_when_requested() {
        let mut settings = settings();
        settings.backdrops_badges = true;
        settings.rating_order.movie = "imdb".to_string();
        let overlay = Overlay {
            badges: Some("4k".to_string()),
            backdrop_badge_pos: Some("right".to_string()),
            ..Overlay::default()
        };

        let plain = urls().backdrop(&settings, "tt0113277", MediaType::Movie, &overlay, false);
        assert_eq!(plain, "https://api.ratingposterdb.com/t0-free-rpdb/imdb/backdrop-default/tt0113277.jpg");

        let decorated = urls().backdrop(&settings, "tt0113277", MediaType::Movie, &overlay, true);
        assert!(decorated.ends_with("tt0113277.jpg?order=imdb&badges=4k&badgePos=right"));
    }

    #[test]
    fn test_overlay_prefers_item_settings() {
        let mut settings = settings();
        settings.labels.insert("/media/movies".to_string(), "folder".to_string());
        settings.item_labels.insert("tt0113277".to_string(), "item".to_string());
        settings.badges.insert("/media/movies".to_string(), "folder-badge".to_string());

        let overlay = Overlay::resolve(&settings, "/media/movies", "tt0113277", Some("4k,h265".to_string()));
        assert_eq!(overlay.label.as_deref(), Some("item"));
        assert_eq!(overlay.badges.as_deref(), Some("4k,h265"));

        let overlay = Overlay::resolve(&settings, "/media/movies", "tt0000001", None);
        assert_eq!(overlay.label.as_deref(), Some("folder"));
        assert_eq!(overlay.badges.as_deref(), Some("folder-badge"));
    }

    #[tokio::test]
    async fn test_write_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("missing").join("poster.jpg");
        let err = write_artwork(&target, b"jpeg").await.unwrap_err();
        assert!(matches!(err, FetchError::Write { .. }));
    }
}
