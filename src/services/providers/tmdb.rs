//! TMDB (The Movie Database) search and id translation
//!
//! Base URL: https://api.themoviedb.org/3
//!
//! Searches `/search/{movie|tv}`. With a year hint the first result is
//! accepted; without one only an unambiguous hit is. A year-constrained miss
//! is retried once without the year. Every TMDB id is translated to an IMDb
//! id through `external_ids`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use super::{IdTranslator, ProviderKind, ProviderMatch, SearchProvider, SearchQuery, sanitize_title};
use crate::error::ProviderError;
use crate::media::MediaType;
use crate::services::rate_limiter::{RateLimitedClient, RetryConfig, is_transient_status, retry_async_if};

/// TMDB API client with rate limiting and retry logic
pub struct TmdbProvider {
    client: Arc<RateLimitedClient>,
    base_url: String,
    api_key: String,
    retry_config: RetryConfig,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
    #[serde(default)]
    total_results: i64,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    id: i64,
    /// Movies
    title: Option<String>,
    original_title: Option<String>,
    release_date: Option<String>,
    /// TV
    name: Option<String>,
    original_name: Option<String>,
    first_air_date: Option<String>,
}

impl SearchResult {
    fn titles(&self) -> impl Iterator<Item = &str> {
        [&self.title, &self.original_title, &self.name, &self.original_name]
            .into_iter()
            .filter_map(|t| t.as_deref())
    }

    fn year(&self) -> Option<i32> {
        self.release_date
            .as_deref()
            .or(self.first_air_date.as_deref())
            .and_then(|d| d.get(..4))
            .and_then(|y| y.parse().ok())
    }
}

#[derive(Debug, Deserialize)]
struct DetailsResponse {
    imdb_id: Option<String>,
    external_ids: Option<ExternalIds>,
}

#[derive(Debug, Deserialize)]
struct ExternalIds {
    imdb_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FindResponse {
    #[serde(default)]
    movie_results: Vec<SearchResult>,
    #[serde(default)]
    tv_results: Vec<SearchResult>,
}

impl FindResponse {
    fn first(&self, media_type: MediaType) -> Option<&SearchResult> {
        match media_type {
            MediaType::Movie => self.movie_results.first(),
            MediaType::Series => self.tv_results.first(),
        }
    }
}

impl TmdbProvider {
    pub fn new(api_key: String) -> Self {
        Self::with_base_url(api_key, "https://api.themoviedb.org/3".to_string())
    }

    pub fn with_base_url(api_key: String, base_url: String) -> Self {
        Self {
            client: Arc::new(RateLimitedClient::for_tmdb()),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            retry_config: RetryConfig {
                max_retries: 3,
                initial_interval: Duration::from_millis(500),
                max_interval: Duration::from_secs(10),
                multiplier: 2.0,
            },
        }
    }

    /// Check if the client has a valid API key configured
    pub fn has_api_key(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn get_json<T: DeserializeOwned + Send>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<Option<T>, ProviderError> {
        if !self.has_api_key() {
            return Err(ProviderError::NotConfigured("TMDB API key"));
        }
        let url = format!("{}{}", self.base_url, path);
        let mut query: Vec<(&str, String)> = vec![("api_key", self.api_key.clone())];
        query.extend(params.iter().cloned());

        let (client, url, query) = (&self.client, &url, &query);
        retry_async_if(
            move || async move {
                let response = client.get_with_query(url, query).await?;
                let status = response.status().as_u16();
                match status {
                    200..=299 => Ok(Some(response.json::<T>().await?)),
                    404 => Ok(None),
                    429 => Err(ProviderError::RateLimited),
                    _ => Err(ProviderError::Status(status)),
                }
            },
            &self.retry_config,
            "tmdb request",
            |e| match e {
                ProviderError::RateLimited | ProviderError::Network(_) => true,
                ProviderError::Status(status) => is_transient_status(*status),
                ProviderError::NotConfigured(_) => false,
            },
        )
        .await
    }

    async fn search_once(
        &self,
        query: &SearchQuery,
        year: Option<i32>,
    ) -> Result<Option<SearchResult>, ProviderError> {
        let mut params = vec![
            ("query", query.name.clone()),
            ("include_adult", "false".to_string()),
        ];
        if let Some(year) = year {
            let key = match query.media_type {
                MediaType::Movie => "year",
                MediaType::Series => "first_air_date_year",
            };
            params.push((key, year.to_string()));
        }

        let path = format!("/search/{}", query.media_type.tmdb_path());
        let Some(body) = self.get_json::<SearchResponse>(&path, &params).await? else {
            return Ok(None);
        };

        let wanted = sanitize_title(&query.name);
        let accept = match body.results.first() {
            None => false,
            Some(_) if year.is_some() => true,
            Some(first) => {
                body.total_results == 1 || first.titles().any(|t| sanitize_title(t) == wanted)
            }
        };

        Ok(if accept { body.results.into_iter().next() } else { None })
    }

    async fn details(&self, tmdb_id: &str, media_type: MediaType) -> Result<Option<DetailsResponse>, ProviderError> {
        let path = format!("/{}/{}", media_type.tmdb_path(), tmdb_id);
        self.get_json(&path, &[("append_to_response", "external_ids".to_string())])
            .await
    }
}

#[async_trait]
impl SearchProvider for TmdbProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Tmdb
    }

    async fn search_by_name(&self, query: &SearchQuery) -> Result<Option<ProviderMatch>, ProviderError> {
        let year = query.year_number();
        let mut found = self.search_once(query, year).await?;
        if found.is_none() && year.is_some() {
            debug!(name = %query.name, "No TMDB match with year, retrying without it");
            found = self.search_once(query, None).await?;
        }

        let Some(result) = found else {
            return Ok(None);
        };
        let Some(imdb_id) = self.tmdb_to_imdb(&result.id.to_string(), query.media_type).await? else {
            return Ok(None);
        };

        info!(name = %query.name, tmdb_id = result.id, imdb_id = %imdb_id, "Matched by TMDB search");
        Ok(Some(ProviderMatch {
            id: imdb_id,
            year: result.year(),
        }))
    }

    async fn release_year(&self, id: &str, media_type: MediaType) -> Result<Option<i32>, ProviderError> {
        let found: Option<FindResponse> = self
            .get_json(&format!("/find/{}", id), &[("external_source", "imdb_id".to_string())])
            .await?;
        Ok(found.and_then(|f| f.first(media_type).and_then(SearchResult::year)))
    }
}

#[async_trait]
impl IdTranslator for TmdbProvider {
    async fn tmdb_to_imdb(&self, tmdb_id: &str, media_type: MediaType) -> Result<Option<String>, ProviderError> {
        let details = self.details(tmdb_id, media_type).await?;
        Ok(details.and_then(|d| {
            d.external_ids
                .and_then(|e| e.imdb_id)
                .or(d.imdb_id)
                .filter(|id| id.starts_with("tt"))
        }))
    }

    async fn tvdb_to_imdb(&self, tvdb_id: &str, media_type: MediaType) -> Result<Option<String>, ProviderError> {
        let found: Option<FindResponse> = self
            .get_json(&format!("/find/{}", tvdb_id), &[("external_source", "tvdb_id".to_string())])
            .await?;
        match found.as_ref().and_then(|f| f.first(media_type)) {
            Some(result) => self.tmdb_to_imdb(&result.id.to_string(), media_type).await,
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_response_parsing() {
        let body: SearchResponse = serde_json::from_str(
            r#"{"page":1,"total_results":2,"results":[
                {"id":603,"title":"The Matrix","original_title":"The Matrix","release_date":"1999-03-30"},
                {"id":604,"title":"The Matrix Reloaded","release_date":"2003-05-15"}
            ]}"#,
        )
        .unwrap();
        assert_eq!(body.total_results, 2);
        assert_eq!(body.results[0].year(), Some(1999));
        assert!(body.results[0].titles().any(|t| sanitize_title(t) == "the matrix"));
    }

    #[test]
    fn test_tv_result_year() {
        let result: SearchResult =
            serde_json::from_str(r#"{"id":1396,"name":"Breaking Bad","first_air_date":"2008-01-20"}"#).unwrap();
        assert_eq!(result.year(), Some(2008));
    }

    #[test]
    fn test_details_external_ids() {
        let details: DetailsResponse =
            serde_json::from_str(r#"{"id":1396,"external_ids":{"imdb_id":"tt0903747","tvdb_id":81189}}"#).unwrap();
        assert_eq!(details.external_ids.and_then(|e| e.imdb_id).as_deref(), Some("tt0903747"));
    }

    #[tokio::test]
    async fn test_missing_key_is_not_configured() {
        let provider = TmdbProvider::new(String::new());
        let query = SearchQuery {
            name: "heat".to_string(),
            year: None,
            media_type: MediaType::Movie,
        };
        let err = provider.search_by_name(&query).await.unwrap_err();
        assert!(matches!(err, ProviderError::NotConfigured(_)));
    }
}
