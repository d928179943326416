//! Cache-or-fetch reconciliation between an upstream catalog and the
//! `catalog_items` / `directors` cache tables.

use async_trait::async_trait;
use futures::{StreamExt, stream};
use tracing::{debug, warn};

use crate::{
    cache::CacheManager,
    entities::{catalog_item, director},
    error::{AppError, AppResult},
    models::{CatalogRecord, DirectorRecord, SearchPage, SearchQuery, Source},
};

/// An upstream catalog API.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    fn source(&self) -> Source;

    async fn search(&self, query: &SearchQuery) -> AppResult<SearchPage>;

    /// Full record for one external id; `Ok(None)` when upstream has no such
    /// entry.
    async fn fetch(&self, external_id: &str) -> AppResult<Option<CatalogRecord>>;
}

/// A film catalog that can also look up people.
#[async_trait]
pub trait FilmSource: CatalogSource {
    async fn search_directors(&self, name: &str) -> AppResult<Vec<DirectorRecord>>;
}

pub struct SearchOutcome {
    pub items: Vec<catalog_item::Model>,
    pub total: u64,
}

/// Returns the cached row for `external_id`, refreshing it from upstream when
/// missing or stale. A failed refresh falls back to the stale row.
pub async fn resolve<S>(
    cache: &CacheManager,
    upstream: &S,
    external_id: &str,
) -> AppResult<Option<catalog_item::Model>>
where
    S: CatalogSource + ?Sized,
{
    let source = upstream.source();
    let cached = cache.get_item(source, external_id).await?;

    if let Some(row) = &cached {
        if cache.is_item_fresh(row) {
            debug!(source = source.as_code(), external_id = %external_id, "cache hit");
            return Ok(cached);
        }
    }

    debug!(source = source.as_code(), external_id = %external_id, stale = cached.is_some(), "fetching from upstream");

    match upstream.fetch(external_id).await {
        Ok(Some(mut record)) => {
            // rows are keyed by what the caller asked for, not by what upstream echoes back
            record.external_id = external_id.to_string();
            Ok(Some(cache.upsert_item(source, &record).await?))
        },
        Ok(None) => {
            debug!(source = source.as_code(), external_id = %external_id, "not found upstream");
            Ok(cached)
        },
        Err(err) => {
            warn!(source = source.as_code(), external_id = %external_id, error = %err, "upstream fetch failed");
            match cached {
                Some(row) => Ok(Some(row)),
                None => Err(match err {
                    AppError::Upstream(inner) => AppError::Upstream(inner),
                    other => AppError::Upstream(anyhow::Error::new(other)),
                }),
            }
        },
    }
}

/// Runs an upstream search and reconciles every hit with the cache. Upstream
/// failure yields an empty outcome.
pub async fn search<S>(
    cache: &CacheManager,
    upstream: &S,
    query: &SearchQuery,
    max_concurrent: usize,
) -> AppResult<SearchOutcome>
where
    S: CatalogSource + ?Sized,
{
    let source = upstream.source();

    let page = match upstream.search(query).await {
        Ok(page) => page,
        Err(err) => {
            warn!(source = source.as_code(), query = %query.text, error = %err, "upstream search failed");
            return Ok(SearchOutcome { items: Vec::new(), total: 0 });
        },
    };

    debug!(source = source.as_code(), hits = page.hits.len(), complete = page.complete, "upstream search returned");

    let complete = page.complete;
    let items: Vec<Option<catalog_item::Model>> = stream::iter(page.hits)
        .map(|hit| async move {
            let external_id = hit.external_id.clone();
            let result: AppResult<catalog_item::Model> = async {
                let cached = match cache.get_item(source, &hit.external_id).await? {
                    Some(row) if cache.is_item_fresh(&row) => return Ok(row),
                    other => other,
                };

                let record = if complete {
                    hit
                } else {
                    let fetched = upstream.fetch(&hit.external_id).await;
                    match (fetched, cached) {
                        (Ok(Some(mut full)), _) => {
                            full.external_id = hit.external_id;
                            full
                        },
                        // a summary never replaces a full stale row
                        (Ok(None), Some(stale)) => return Ok(stale),
                        (Err(err), Some(stale)) => {
                            warn!(external_id = %hit.external_id, error = %err, "detail fetch failed, keeping stale row");
                            return Ok(stale);
                        },
                        (Ok(None), None) => hit,
                        (Err(err), None) => {
                            warn!(external_id = %hit.external_id, error = %err, "detail fetch failed, caching summary");
                            hit
                        },
                    }
                };

                cache.upsert_item(source, &record).await
            }
            .await;

            match result {
                Ok(item) => Some(item),
                Err(err) => {
                    warn!(external_id = %external_id, error = %err, "failed to cache search hit");
                    None
                },
            }
        })
        .buffered(max_concurrent.max(1))
        .collect()
        .await;

    let items: Vec<catalog_item::Model> = items.into_iter().flatten().collect();
    let total = page.total.unwrap_or(items.len() as u64);

    Ok(SearchOutcome { items, total })
}

/// Director search with the same per-hit cache discipline as [`search`].
pub async fn search_directors<S>(
    cache: &CacheManager,
    upstream: &S,
    name: &str,
) -> AppResult<Vec<director::Model>>
where
    S: FilmSource + ?Sized,
{
    let hits = match upstream.search_directors(name).await {
        Ok(hits) => hits,
        Err(err) => {
            warn!(name = %name, error = %err, "upstream director search failed");
            return Ok(Vec::new());
        },
    };

    let mut out = Vec::with_capacity(hits.len());
    for hit in hits {
        if let Some(cached) = cache.get_director(&hit.external_id).await? {
            if cache.is_director_fresh(&cached) {
                out.push(cached);
                continue;
            }
        }
        out.push(cache.upsert_director(&hit).await?);
    }

    Ok(out)
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    use sea_orm::{EntityTrait, PaginatorTrait};
    use serde_json::json;

    use super::*;
    use crate::{
        cache::tests::{record, test_cache},
        models::now_sec,
    };

    /// In-memory upstream that counts calls and can be switched to fail.
    #[derive(Default)]
    pub(crate) struct FakeUpstream {
        pub source: Option<Source>,
        pub records: Mutex<Vec<CatalogRecord>>,
        pub directors: Vec<DirectorRecord>,
        pub complete_search: bool,
        pub failing: std::sync::atomic::AtomicBool,
        pub failing_fetch: std::sync::atomic::AtomicBool,
        pub search_calls: AtomicUsize,
        pub fetch_calls: AtomicUsize,
    }

    impl FakeUpstream {
        pub(crate) fn with(source: Source, records: Vec<CatalogRecord>) -> Self {
            Self { source: Some(source), records: Mutex::new(records), ..Default::default() }
        }

        pub(crate) fn fail(&self) {
            self.failing.store(true, Ordering::SeqCst);
        }

        /// Searches keep working, detail fetches fail.
        pub(crate) fn fail_fetches(&self) {
            self.failing_fetch.store(true, Ordering::SeqCst);
        }

        fn check(&self) -> AppResult<()> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(AppError::Upstream(anyhow::anyhow!("connection refused")));
            }
            Ok(())
        }

        pub(crate) fn fetches(&self) -> usize {
            self.fetch_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CatalogSource for FakeUpstream {
        fn source(&self) -> Source {
            self.source.unwrap_or(Source::Dfi)
        }

        async fn search(&self, query: &SearchQuery) -> AppResult<SearchPage> {
            self.search_calls.fetch_add(1, Ordering::SeqCst);
            self.check()?;
            let hits: Vec<CatalogRecord> = self
                .records
                .lock()
                .unwrap()
                .iter()
                .filter(|r| {
                    r.title.as_deref().unwrap_or_default().to_lowercase().contains(&query.text.to_lowercase())
                })
                .map(|r| CatalogRecord { metadata: json!({ "summary": true }), ..r.clone() })
                .collect();
            Ok(SearchPage { total: Some(hits.len() as u64), hits, complete: self.complete_search })
        }

        async fn fetch(&self, external_id: &str) -> AppResult<Option<CatalogRecord>> {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);
            self.check()?;
            if self.failing_fetch.load(Ordering::SeqCst) {
                return Err(AppError::Upstream(anyhow::anyhow!("read timed out")));
            }
            Ok(self.records.lock().unwrap().iter().find(|r| r.external_id == external_id).cloned())
        }
    }

    #[async_trait]
    impl FilmSource for FakeUpstream {
        async fn search_directors(&self, name: &str) -> AppResult<Vec<DirectorRecord>> {
            self.search_calls.fetch_add(1, Ordering::SeqCst);
            self.check()?;
            Ok(self.directors.iter().filter(|d| d.name.contains(name)).cloned().collect())
        }
    }

    #[tokio::test]
    async fn fresh_row_is_served_without_upstream_call() {
        let cache = test_cache().await;
        let upstream = FakeUpstream::with(Source::Dfi, vec![record("42", "Jagten")]);
        cache.upsert_item(Source::Dfi, &record("42", "Cached title")).await.unwrap();

        let item = resolve(&cache, &upstream, "42").await.unwrap().unwrap();

        assert_eq!(item.title.as_deref(), Some("Cached title"));
        assert_eq!(upstream.fetches(), 0);
    }

    #[tokio::test]
    async fn miss_fetches_once_and_stores_requested_id() {
        let cache = test_cache().await;
        let upstream = FakeUpstream::with(Source::Dfi, vec![record("42", "Jagten")]);

        let item = resolve(&cache, &upstream, "42").await.unwrap().unwrap();

        assert_eq!(upstream.fetches(), 1);
        assert_eq!(item.external_id, "42");
        assert_eq!(catalog_item::Entity::find().count(cache.db()).await.unwrap(), 1);

        // second lookup is a cache hit
        resolve(&cache, &upstream, "42").await.unwrap().unwrap();
        assert_eq!(upstream.fetches(), 1);
    }

    #[tokio::test]
    async fn stale_row_is_refreshed() {
        let cache = test_cache().await;
        let upstream = FakeUpstream::with(Source::Dfi, vec![record("42", "New title")]);
        let old = cache
            .upsert_item_at(Source::Dfi, &record("42", "Old title"), now_sec() - 8 * 86_400)
            .await
            .unwrap();

        let item = resolve(&cache, &upstream, "42").await.unwrap().unwrap();

        assert_eq!(upstream.fetches(), 1);
        assert_eq!(item.id, old.id);
        assert_eq!(item.title.as_deref(), Some("New title"));
        assert!(cache.is_item_fresh(&item));
    }

    #[tokio::test]
    async fn stale_row_survives_upstream_failure() {
        let cache = test_cache().await;
        let upstream = FakeUpstream::with(Source::Dfi, vec![]);
        upstream.fail();
        cache
            .upsert_item_at(Source::Dfi, &record("42", "Old title"), now_sec() - 8 * 86_400)
            .await
            .unwrap();

        let item = resolve(&cache, &upstream, "42").await.unwrap().unwrap();

        assert_eq!(item.title.as_deref(), Some("Old title"));
    }

    #[tokio::test]
    async fn miss_with_failing_upstream_is_upstream_error() {
        let cache = test_cache().await;
        let upstream = FakeUpstream::with(Source::Smk, vec![]);
        upstream.fail();

        let err = resolve(&cache, &upstream, "KMS1").await.unwrap_err();
        assert!(matches!(err, AppError::Upstream(_)));
    }

    #[tokio::test]
    async fn unknown_id_resolves_to_none() {
        let cache = test_cache().await;
        let upstream = FakeUpstream::with(Source::Smk, vec![]);

        assert!(resolve(&cache, &upstream, "KMS404").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn search_fetches_details_only_for_uncached_hits() {
        let cache = test_cache().await;
        let upstream = FakeUpstream::with(
            Source::Dfi,
            vec![record("1", "Jagten"), record("2", "Jagten 2"), record("3", "Festen")],
        );
        cache.upsert_item(Source::Dfi, &record("1", "Jagten")).await.unwrap();

        let outcome =
            search(&cache, &upstream, &SearchQuery::new("jagten"), 4).await.unwrap();

        assert_eq!(outcome.items.len(), 2);
        assert_eq!(outcome.total, 2);
        assert_eq!(upstream.fetches(), 1);
        // the detail record replaced the summary
        let second = outcome.items.iter().find(|i| i.external_id == "2").unwrap();
        assert_eq!(second.metadata, json!({}));
    }

    #[tokio::test]
    async fn complete_search_hits_are_cached_without_detail_fetch() {
        let cache = test_cache().await;
        let mut upstream = FakeUpstream::with(Source::Smk, vec![record("KMS1", "Amager")]);
        upstream.complete_search = true;

        let outcome = search(&cache, &upstream, &SearchQuery::new("amager"), 4).await.unwrap();

        assert_eq!(outcome.items.len(), 1);
        assert_eq!(upstream.fetches(), 0);
        assert!(cache.get_item(Source::Smk, "KMS1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn search_keeps_stale_row_when_detail_fetch_fails() {
        let cache = test_cache().await;
        let upstream = FakeUpstream::with(Source::Dfi, vec![record("42", "Jagten")]);
        upstream.fail_fetches();
        let full = CatalogRecord {
            image_url: Some("/poster.jpg".into()),
            metadata: json!({ "cast": ["Mads Mikkelsen"] }),
            ..record("42", "Jagten")
        };
        let stale_at = now_sec() - 8 * 86_400;
        cache.upsert_item_at(Source::Dfi, &full, stale_at).await.unwrap();

        let outcome = search(&cache, &upstream, &SearchQuery::new("jagten"), 4).await.unwrap();

        assert_eq!(upstream.fetches(), 1);
        let item = &outcome.items[0];
        assert_eq!(item.image_url.as_deref(), Some("/poster.jpg"));
        assert_eq!(item.metadata, json!({ "cast": ["Mads Mikkelsen"] }));
        let stored = cache.get_item(Source::Dfi, "42").await.unwrap().unwrap();
        assert_eq!(stored.cached_at, stale_at);
        assert!(!cache.is_item_fresh(&stored));
    }

    #[tokio::test]
    async fn summary_is_cached_when_detail_fails_on_a_miss() {
        let cache = test_cache().await;
        let upstream = FakeUpstream::with(Source::Dfi, vec![record("42", "Jagten")]);
        upstream.fail_fetches();

        let outcome = search(&cache, &upstream, &SearchQuery::new("jagten"), 4).await.unwrap();

        assert_eq!(outcome.items.len(), 1);
        assert_eq!(outcome.items[0].metadata, json!({ "summary": true }));
    }

    #[tokio::test]
    async fn concurrent_misses_converge_on_one_row() {
        let cache = test_cache().await;
        let upstream = FakeUpstream::with(Source::Smk, vec![record("KMS1", "Amager")]);

        let (a, b) = tokio::join!(
            resolve(&cache, &upstream, "KMS1"),
            resolve(&cache, &upstream, "KMS1"),
        );

        assert_eq!(a.unwrap().unwrap().id, b.unwrap().unwrap().id);
        assert_eq!(catalog_item::Entity::find().count(cache.db()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn failed_search_degrades_to_empty() {
        let cache = test_cache().await;
        let upstream = FakeUpstream::with(Source::Dfi, vec![record("1", "Jagten")]);
        upstream.fail();

        let outcome = search(&cache, &upstream, &SearchQuery::new("jagten"), 4).await.unwrap();

        assert!(outcome.items.is_empty());
        assert_eq!(outcome.total, 0);
    }

    #[tokio::test]
    async fn director_search_reuses_fresh_rows() {
        let cache = test_cache().await;
        let upstream = FakeUpstream {
            directors: vec![DirectorRecord {
                external_id: "9".into(),
                name: "Thomas Vinterberg".into(),
                bio: Some("b. 1969".into()),
            }],
            ..Default::default()
        };

        let first = search_directors(&cache, &upstream, "Vinterberg").await.unwrap();
        let second = search_directors(&cache, &upstream, "Vinterberg").await.unwrap();

        assert_eq!(first.len(), 1);
        assert_eq!(first[0].id, second[0].id);
        assert_eq!(second[0].bio.as_deref(), Some("b. 1969"));
    }

    #[tokio::test]
    async fn director_search_failure_is_empty() {
        let cache = test_cache().await;
        let upstream = FakeUpstream::default();
        upstream.fail();

        assert!(search_directors(&cache, &upstream, "Bier").await.unwrap().is_empty());
    }
}
