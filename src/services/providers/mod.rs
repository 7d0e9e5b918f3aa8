//! Title search providers and identifier translation
//!
//! Providers are consulted in the order configured by `ScanOrder`. A
//! provider either returns a canonical IMDb id or nothing, and a miss
//! cascades to the next one.

pub mod imdb;
pub mod tmdb;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::ScanOrder;
use crate::error::ProviderError;
use crate::media::MediaType;

pub use imdb::ImdbSuggestProvider;
pub use tmdb::TmdbProvider;

static NON_WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\p{L}\p{N}\s]").expect("valid regex"));
static SPACES_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Imdb,
    Tmdb,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Imdb => "imdb",
            Self::Tmdb => "tmdb",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A normalized title search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub name: String,
    pub year: Option<String>,
    pub media_type: MediaType,
}

impl SearchQuery {
    /// First year of the hint; ranges like 2008-2013 yield 2008
    pub fn year_number(&self) -> Option<i32> {
        self.year.as_deref().and_then(|y| y.get(..4)).and_then(|y| y.parse().ok())
    }
}

/// A successful search: the canonical id plus the release year when known
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderMatch {
    pub id: String,
    pub year: Option<i32>,
}

#[async_trait]
pub trait SearchProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    async fn search_by_name(&self, query: &SearchQuery) -> Result<Option<ProviderMatch>, ProviderError>;

    /// Release year of a canonical id, when the provider can look it up
    async fn release_year(&self, _id: &str, _media_type: MediaType) -> Result<Option<i32>, ProviderError> {
        Ok(None)
    }
}

/// Converts ids from other namespaces into canonical IMDb ids
#[async_trait]
pub trait IdTranslator: Send + Sync {
    async fn tmdb_to_imdb(&self, tmdb_id: &str, media_type: MediaType) -> Result<Option<String>, ProviderError>;

    async fn tvdb_to_imdb(&self, tvdb_id: &str, media_type: MediaType) -> Result<Option<String>, ProviderError>;
}

/// The configured providers, addressable by kind
#[derive(Clone, Default)]
pub struct ProviderSet {
    providers: HashMap<ProviderKind, Arc<dyn SearchProvider>>,
}

impl ProviderSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, provider: Arc<dyn SearchProvider>) -> Self {
        self.providers.insert(provider.kind(), provider);
        self
    }

    pub fn get(&self, kind: ProviderKind) -> Option<&Arc<dyn SearchProvider>> {
        self.providers.get(&kind)
    }

    /// Providers in scan order; kinds that are not configured are skipped
    pub fn ordered(&self, order: ScanOrder) -> Vec<Arc<dyn SearchProvider>> {
        order
            .providers()
            .iter()
            .filter_map(|kind| self.providers.get(kind).cloned())
            .collect()
    }

    /// Ask each provider in turn for the release year of `id`
    pub async fn release_year(&self, order: ScanOrder, id: &str, media_type: MediaType) -> Option<i32> {
        for provider in self.ordered(order) {
            match provider.release_year(id, media_type).await {
                Ok(Some(year)) => return Some(year),
                Ok(None) => {}
                Err(e) => tracing::debug!(provider = %provider.kind(), id = id, error = %e, "Release year lookup failed"),
            }
        }
        None
    }
}

/// Lower-case, strip punctuation and collapse whitespace for title comparison
pub fn sanitize_title(title: &str) -> String {
    let lowered = title.to_lowercase();
    let stripped = NON_WORD_RE.replace_all(&lowered, "");
    SPACES_RE.replace_all(stripped.trim(), " ").to_string()
}
