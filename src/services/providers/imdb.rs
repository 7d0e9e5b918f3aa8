//! IMDb title search through the public suggestion endpoint
//!
//! `GET {base}/suggestion/{first letter}/{query}.json` returns up to eight
//! candidates with type and year. No API key is needed.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use super::{ProviderKind, ProviderMatch, SearchProvider, SearchQuery, sanitize_title};
use crate::error::ProviderError;
use crate::media::MediaType;
use crate::services::rate_limiter::{RateLimitedClient, ResponseExt};

pub struct ImdbSuggestProvider {
    client: Arc<RateLimitedClient>,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct SuggestionResponse {
    #[serde(default)]
    d: Vec<Suggestion>,
}

#[derive(Debug, Deserialize)]
struct Suggestion {
    id: String,
    /// Title
    l: Option<String>,
    /// Release year
    y: Option<i32>,
    /// Kind, e.g. movie, tvSeries, tvMiniSeries
    qid: Option<String>,
}

impl Suggestion {
    fn is_title(&self) -> bool {
        self.id.starts_with("tt")
    }

    fn matches_type(&self, media_type: MediaType) -> bool {
        match (self.qid.as_deref(), media_type) {
            (Some("movie" | "tvMovie" | "video"), MediaType::Movie) => true,
            (Some("tvSeries" | "tvMiniSeries"), MediaType::Series) => true,
            // Older responses omit the kind
            (None, _) => true,
            _ => false,
        }
    }
}

impl ImdbSuggestProvider {
    pub fn new(base_url: String) -> Self {
        Self {
            client: Arc::new(RateLimitedClient::for_imdb()),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn suggestion_url(&self, term: &str) -> Option<String> {
        let term = term.trim().to_lowercase();
        let first = term.chars().find(|c| c.is_alphanumeric())?;
        Some(format!(
            "{}/suggestion/{}/{}.json",
            self.base_url,
            first,
            urlencoding::encode(&term)
        ))
    }

    async fn suggestions(&self, term: &str) -> Result<Vec<Suggestion>, ProviderError> {
        let Some(url) = self.suggestion_url(term) else {
            return Ok(Vec::new());
        };
        let response = self.client.get(&url).await?;
        if response.is_rate_limited() {
            return Err(ProviderError::RateLimited);
        }
        if !response.status().is_success() {
            return Err(ProviderError::Status(response.status().as_u16()));
        }
        let body: SuggestionResponse = response.json().await?;
        Ok(body.d.into_iter().filter(Suggestion::is_title).collect())
    }
}

/// Pick the candidate for a query: exact year when one is given, else an exact title
fn pick(candidates: Vec<Suggestion>, query: &SearchQuery) -> Option<Suggestion> {
    let mut typed = candidates
        .into_iter()
        .filter(|s| s.matches_type(query.media_type));

    match query.year_number() {
        Some(year) => typed.find(|s| s.y == Some(year)),
        None => {
            let wanted = sanitize_title(&query.name);
            let all: Vec<Suggestion> = typed.collect();
            let exact = all
                .iter()
                .position(|s| s.l.as_deref().map(sanitize_title).as_deref() == Some(wanted.as_str()));
            match exact {
                Some(i) => all.into_iter().nth(i),
                None if all.len() == 1 => all.into_iter().next(),
                None => None,
            }
        }
    }
}

#[async_trait]
impl SearchProvider for ImdbSuggestProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Imdb
    }

    async fn search_by_name(&self, query: &SearchQuery) -> Result<Option<ProviderMatch>, ProviderError> {
        let candidates = self.suggestions(&query.name).await?;
        Ok(pick(candidates, query).map(|s| {
            info!(name = %query.name, imdb_id = %s.id, "Matched by IMDb search");
            ProviderMatch { id: s.id, year: s.y }
        }))
    }

    async fn release_year(&self, id: &str, _media_type: MediaType) -> Result<Option<i32>, ProviderError> {
        let candidates = self.suggestions(id).await?;
        Ok(candidates.into_iter().find(|s| s.id == id).and_then(|s| s.y))
    }
}
