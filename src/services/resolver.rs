//! Maps a folder or file name to a canonical IMDb id
//!
//! Order of precedence:
//! 1. a literal `tt…` id used as the name
//! 2. stored overrides, then the resolved cache (parent-qualified key first)
//! 3. the year-proximity recheck for forced rescans of recent releases
//! 4. provider search in the configured scan order

use std::sync::Arc;

use chrono::Datelike;
use tracing::{debug, info, warn};

use super::library_state::LibraryState;
use super::providers::{ProviderSet, SearchQuery};
use super::titles::{is_literal_id, normalize_title, within_proximity};
use super::waterfall::Outcome;
use crate::config::SettingsHandle;
use crate::media::{FolderKey, MediaType};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveOptions {
    pub forced: bool,
    pub poster_exists: bool,
    pub avoid_year_match: bool,
}

pub struct IdentifierResolver {
    state: Arc<LibraryState>,
    providers: ProviderSet,
    settings: SettingsHandle,
}

impl IdentifierResolver {
    pub fn new(state: Arc<LibraryState>, providers: ProviderSet, settings: SettingsHandle) -> Self {
        Self {
            state,
            providers,
            settings,
        }
    }

    pub fn providers(&self) -> &ProviderSet {
        &self.providers
    }

    pub async fn resolve(&self, key: &FolderKey, media_type: MediaType, options: ResolveOptions) -> Outcome<String> {
        self.resolve_at(key, media_type, options, chrono::Local::now().year()).await
    }

    /// Resolve with an explicit current year
    pub async fn resolve_at(
        &self,
        key: &FolderKey,
        media_type: MediaType,
        options: ResolveOptions,
        current_year: i32,
    ) -> Outcome<String> {
        if is_literal_id(&key.name) {
            self.state.clear_unmatched(media_type, &key.name);
            return Outcome::Matched(key.name.clone());
        }

        let settings = self.settings.current();
        let recheck = settings.recheck_recent_releases();
        let reverify = options.forced && options.poster_exists && !options.avoid_year_match && recheck;

        if !reverify
            && let Some(id) = self.cached(key, media_type, settings.cache_matches)
        {
            return Outcome::Matched(id);
        }

        let title = normalize_title(&key.name, media_type);

        if reverify && let Some(id) = self.cached(key, media_type, true) {
            let year = self.state.year_hint(&id).or(title.year_number());
            return match year {
                Some(year) if !within_proximity(year, current_year) => {
                    debug!(item = %key, id = %id, year = year, "Cached match is not a recent release, skipping");
                    Outcome::NoMatch
                }
                _ => Outcome::Matched(id),
            };
        }

        let query = SearchQuery {
            name: title.name,
            year: title.year,
            media_type,
        };

        for provider in self.providers.ordered(settings.scan_order) {
            match provider.search_by_name(&query).await {
                Ok(Some(found)) => {
                    info!(item = %key, provider = %provider.kind(), id = %found.id, "Matched by search");
                    self.state.remember_resolved(media_type, &key.name, &found.id);
                    if recheck && let Some(year) = found.year {
                        self.state.save_year_hint(&found.id, year);
                    }
                    return Outcome::Matched(found.id);
                }
                Ok(None) => {
                    debug!(item = %key, provider = %provider.kind(), "No match, trying next provider");
                }
                Err(e) => {
                    warn!(item = %key, provider = %provider.kind(), stage = "resolve", error = %e, "Provider search failed");
                }
            }
        }

        warn!(item = %key, stage = "resolve", "Could not match");
        self.state.mark_unmatched(media_type, &key.name);
        Outcome::NoMatch
    }

    fn cached(&self, key: &FolderKey, media_type: MediaType, include_resolved: bool) -> Option<String> {
        if key.parent.is_some()
            && let Some(id) = self.state.cached_id(media_type, &key.qualified(), include_resolved)
        {
            return Some(id);
        }
        self.state.cached_id(media_type, &key.name, include_resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MemoryStore, ScanOrder, Settings};
    use crate::error::ProviderError;
    use crate::services::providers::{ProviderKind, ProviderMatch, SearchProvider};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// Records every query and answers from a fixed table
    struct FakeProvider {
        kind: ProviderKind,
        answers: Vec<(&'static str, &'static str, Option<i32>)>,
        calls: Arc<Mutex<Vec<(ProviderKind, SearchQuery)>>>,
        fail: bool,
    }

    #[async_trait]
    impl SearchProvider for FakeProvider {
        fn kind(&self) -> ProviderKind {
            self.kind
        }

        async fn search_by_name(&self, query: &SearchQuery) -> Result<Option<ProviderMatch>, ProviderError> {
            self.calls.lock().push((self.kind, query.clone()));
            if self.fail {
                return Err(ProviderError::Status(503));
            }
            Ok(self
                .answers
                .iter()
                .find(|(name, _, _)| *name == query.name)
                .map(|(_, id, year)| ProviderMatch {
                    id: id.to_string(),
                    year: *year,
                }))
        }
    }

    struct Fixture {
        resolver: IdentifierResolver,
        state: Arc<LibraryState>,
        settings: SettingsHandle,
        calls: Arc<Mutex<Vec<(ProviderKind, SearchQuery)>>>,
    }

    fn fixture(
        tmdb: Vec<(&'static str, &'static str, Option<i32>)>,
        imdb: Vec<(&'static str, &'static str, Option<i32>)>,
        tmdb_fails: bool,
    ) -> Fixture {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let providers = ProviderSet::new()
            .with(Arc::new(FakeProvider {
                kind: ProviderKind::Tmdb,
                answers: tmdb,
                calls: calls.clone(),
                fail: tmdb_fails,
            }))
            .with(Arc::new(FakeProvider {
                kind: ProviderKind::Imdb,
                answers: imdb,
                calls: calls.clone(),
                fail: false,
            }));
        let state = Arc::new(LibraryState::load(Arc::new(MemoryStore::new())));
        let settings = SettingsHandle::new(Settings::default());
        Fixture {
            resolver: IdentifierResolver::new(state.clone(), providers, settings.clone()),
            state,
            settings,
            calls,
        }
    }

    #[tokio::test]
    async fn test_literal_id_skips_providers() {
        let f = fixture(vec![], vec![], false);
        let result = f
            .resolver
            .resolve(&FolderKey::new("tt0068646"), MediaType::Movie, ResolveOptions::default())
            .await;
        assert_eq!(result, Outcome::Matched("tt0068646".to_string()));
        assert!(f.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_override_beats_resolved_cache() {
        let f = fixture(vec![], vec![], false);
        f.state.remember_resolved(MediaType::Movie, "Heat (1995)", "tt0000001");
        f.state.set_override(MediaType::Movie, "Heat (1995)", "tt0113277");

        let result = f
            .resolver
            .resolve(&FolderKey::new("Heat (1995)"), MediaType::Movie, ResolveOptions::default())
            .await;
        assert_eq!(result, Outcome::Matched("tt0113277".to_string()));
        assert!(f.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_parent_qualified_override_first() {
        let f = fixture(vec![], vec![], false);
        let key = FolderKey::with_parent("Heat", "Movies 4K");
        f.state.set_override(MediaType::Movie, "Heat", "tt0093164");
        f.state.set_override(MediaType::Movie, &key.qualified(), "tt0113277");

        let result = f.resolver.resolve(&key, MediaType::Movie, ResolveOptions::default()).await;
        assert_eq!(result, Outcome::Matched("tt0113277".to_string()));
    }

    #[tokio::test]
    async fn test_default_order_cascades_tmdb_then_imdb() {
        let f = fixture(vec![], vec![("the great movie", "tt1234567", Some(2011))], false);

        let result = f
            .resolver
            .resolve(&FolderKey::new("The Great Movie (2011)"), MediaType::Movie, ResolveOptions::default())
            .await;

        assert_eq!(result, Outcome::Matched("tt1234567".to_string()));
        let calls = f.calls.lock();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].0, ProviderKind::Tmdb);
        assert_eq!(calls[1].0, ProviderKind::Imdb);
        assert_eq!(calls[1].1.year.as_deref(), Some("2011"));
        assert_eq!(
            f.state.cached_id(MediaType::Movie, "The Great Movie (2011)", true).as_deref(),
            Some("tt1234567")
        );
    }

    #[tokio::test]
    async fn test_scan_order_limits_providers() {
        let f = fixture(vec![("heat", "tt0113277", None)], vec![], false);
        f.settings.update(|s| s.scan_order = ScanOrder::Imdb);

        let result = f
            .resolver
            .resolve(&FolderKey::new("Heat"), MediaType::Movie, ResolveOptions::default())
            .await;

        assert_eq!(result, Outcome::NoMatch);
        let calls = f.calls.lock();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, ProviderKind::Imdb);
    }

    #[tokio::test]
    async fn test_provider_error_cascades() {
        let f = fixture(vec![], vec![("heat", "tt0113277", Some(1995))], true);
        let result = f
            .resolver
            .resolve(&FolderKey::new("Heat"), MediaType::Movie, ResolveOptions::default())
            .await;
        assert_eq!(result, Outcome::Matched("tt0113277".to_string()));
    }

    #[tokio::test]
    async fn test_failure_marks_unmatched_and_success_clears() {
        let f = fixture(vec![], vec![], false);
        let key = FolderKey::new("Unknown Home Video");

        let result = f.resolver.resolve(&key, MediaType::Movie, ResolveOptions::default()).await;
        assert_eq!(result, Outcome::NoMatch);
        assert!(f.state.is_unmatched(MediaType::Movie, "Unknown Home Video"));

        f.state.set_override(MediaType::Movie, "Unknown Home Video", "tt7654321");
        assert!(!f.state.is_unmatched(MediaType::Movie, "Unknown Home Video"));
    }

    #[tokio::test]
    async fn test_cache_disabled_searches_again() {
        let f = fixture(vec![("heat", "tt0113277", None)], vec![], false);
        f.settings.update(|s| s.cache_matches = false);
        f.state.remember_resolved(MediaType::Movie, "Heat", "tt0000001");

        let result = f
            .resolver
            .resolve(&FolderKey::new("Heat"), MediaType::Movie, ResolveOptions::default())
            .await;
        assert_eq!(result, Outcome::Matched("tt0113277".to_string()));
        assert_eq!(f.calls.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_forced_item_honors_disabled_cache() {
        let f = fixture(vec![("heat", "tt0113277", None)], vec![], false);
        f.settings.update(|s| s.cache_matches = false);
        f.state.remember_resolved(MediaType::Movie, "Heat", "tt_stale");

        let options = ResolveOptions {
            forced: true,
            poster_exists: false,
            avoid_year_match: false,
        };
        let result = f.resolver.resolve(&FolderKey::new("Heat"), MediaType::Movie, options).await;

        assert_eq!(result, Outcome::Matched("tt0113277".to_string()));
        assert_eq!(f.calls.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_recheck_rejects_old_cached_release() {
        let f = fixture(vec![], vec![], false);
        f.settings.update(|s| s.overwrite_last_2_years = true);
        f.state.remember_resolved(MediaType::Movie, "Heat (1995)", "tt0113277");
        f.state.remember_resolved(MediaType::Movie, "Heat", "tt0113277");

        let options = ResolveOptions {
            forced: true,
            poster_exists: true,
            avoid_year_match: false,
        };

        let old = f
            .resolver
            .resolve_at(&FolderKey::new("Heat (1995)"), MediaType::Movie, options, 2024)
            .await;
        assert_eq!(old, Outcome::NoMatch);
        assert!(!f.state.is_unmatched(MediaType::Movie, "Heat (1995)"));

        let undated = f
            .resolver
            .resolve_at(&FolderKey::new("Heat"), MediaType::Movie, options, 2024)
            .await;
        assert_eq!(undated, Outcome::Matched("tt0113277".to_string()));
        assert!(f.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_recheck_accepts_recent_year_hint() {
        let f = fixture(vec![("dune part two", "tt15239678", Some(2024))], vec![], false);
        f.settings.update(|s| s.overwrite_last_2_years = true);

        let first = f
            .resolver
            .resolve_at(&FolderKey::new("Dune Part Two (2024)"), MediaType::Movie, ResolveOptions::default(), 2024)
            .await;
        assert_eq!(first, Outcome::Matched("tt15239678".to_string()));
        assert_eq!(f.state.year_hint("tt15239678"), Some(2024));

        let options = ResolveOptions {
            forced: true,
            poster_exists: true,
            avoid_year_match: false,
        };
        let again = f
            .resolver
            .resolve_at(&FolderKey::new("Dune Part Two (2024)"), MediaType::Movie, options, 2025)
            .await;
        assert_eq!(again, Outcome::Matched("tt15239678".to_string()));
        assert_eq!(f.calls.lock().len(), 1);
    }
}
