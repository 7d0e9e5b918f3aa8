//! Application configuration management
//!
//! Process-level configuration comes from environment variables (a `.env`
//! file is loaded first). User-facing settings and the persistent caches live
//! in a JSON config store, see [`settings`] and [`store`].

pub mod settings;
pub mod store;

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};

pub use settings::{DefaultBadges, PerType, PlexSettings, RefreshMode, ScanOrder, Settings, SettingsHandle};
pub use store::{ConfigStore, JsonFileStore, MemoryStore};

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP port for webhooks and status
    pub port: u16,

    /// Directory holding config.json
    pub config_dir: PathBuf,

    /// Path to the ffprobe executable used for auto badges
    pub ffprobe_path: String,

    /// Base URL of the rating poster image service
    pub image_base_url: String,

    /// TMDB API base URL
    pub tmdb_base_url: String,

    /// TMDB API key; without it the TMDB provider is skipped
    pub tmdb_api_key: Option<String>,

    /// Base URL of the IMDb suggestion endpoint
    pub imdb_suggest_base_url: String,

    /// Emit human readable logs instead of JSON
    pub pretty_logs: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let config_dir = match env::var("POSTERSYNC_CONFIG_DIR") {
            Ok(dir) => PathBuf::from(dir),
            Err(_) => dirs::config_dir()
                .context("Could not determine the user config directory")?
                .join("postersync"),
        };

        Ok(Self {
            port: env::var("POSTERSYNC_PORT")
                .unwrap_or_else(|_| "8750".to_string())
                .parse()
                .context("Invalid POSTERSYNC_PORT")?,

            config_dir,

            ffprobe_path: env::var("FFPROBE_PATH").unwrap_or_else(|_| "ffprobe".to_string()),

            image_base_url: env::var("POSTERSYNC_IMAGE_BASE_URL")
                .unwrap_or_else(|_| "https://api.ratingposterdb.com".to_string()),

            tmdb_base_url: env::var("TMDB_BASE_URL")
                .unwrap_or_else(|_| "https://api.themoviedb.org/3".to_string()),

            tmdb_api_key: env::var("TMDB_API_KEY").ok().filter(|k| !k.is_empty()),

            imdb_suggest_base_url: env::var("IMDB_SUGGEST_BASE_URL")
                .unwrap_or_else(|_| "https://v2.sg.media-imdb.com".to_string()),

            pretty_logs: env::var("POSTERSYNC_LOG_FORMAT")
                .map(|v| v.eq_ignore_ascii_case("pretty"))
                .unwrap_or(false),
        })
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.json")
    }
}
