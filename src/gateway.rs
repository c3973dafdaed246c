//! Data fetch gateway: the single choke point between the core and the
//! opaque statistics source.
//!
//! Every operation follows the same cache-aside shape: compute a
//! deterministic cache key from operation + identifiers + filters, return
//! the cached payload on a hit, otherwise run the blocking source on a
//! bounded worker pool and — only on success — write the payload back
//! with an operation-specific TTL.
//!
//! Source failures never escape as errors: they are folded into an
//! error-tagged [`FetchResult`] carrying the failing identifiers, so a
//! bad entity cannot abort a batch. The `anyhow::Result` wrapper on each
//! operation covers internal failures only (a panicked worker, a closed
//! pool) and is what the assembler's top-level catch observes.

use anyhow::{Context, Result};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

use crate::cache::TtlCache;
use crate::models::FetchResult;
use crate::resolver::{EntityDomain, EntityResolver, SearchMatch};
use crate::source::{locator, StatsSource};

/// TTL for rider profile, victories, and results payloads.
const TTL_RIDER: Duration = Duration::from_secs(900);
/// TTL for race results and stage payloads.
const TTL_RACE: Duration = Duration::from_secs(900);
/// TTL for race startlists.
const TTL_STARTLIST: Duration = Duration::from_secs(1800);
/// TTL for team rosters.
const TTL_TEAM: Duration = Duration::from_secs(3600);
/// TTL for rankings, the most volatile payload.
const TTL_RANKING: Duration = Duration::from_secs(600);

/// Gateway over the blocking statistics source with cache-aside reads.
pub struct StatsGateway {
    cache: Arc<TtlCache>,
    resolver: Arc<EntityResolver>,
    source: Arc<dyn StatsSource>,
    permits: Arc<Semaphore>,
}

impl StatsGateway {
    /// `workers` bounds how many blocking source calls run concurrently.
    pub fn new(
        cache: Arc<TtlCache>,
        resolver: Arc<EntityResolver>,
        source: Arc<dyn StatsSource>,
        workers: usize,
    ) -> Self {
        Self {
            cache,
            resolver,
            source,
            permits: Arc::new(Semaphore::new(workers.max(1))),
        }
    }

    /// Rider profile by name or slug.
    pub async fn rider_profile(&self, name_or_slug: &str) -> Result<FetchResult> {
        let slug = self.resolver.resolve(EntityDomain::Rider, name_or_slug);
        let key = format!("rider:{slug}");
        let context = [("slug", json!(slug.clone()))];
        self.fetch_cached(&key, locator::rider(&slug), TTL_RIDER, &context)
            .await
    }

    /// Rider victories, optionally filtered by year.
    ///
    /// The year filter matches either the structured `year` field or the
    /// year as a substring of the free-text `date` field — a deliberate
    /// tolerance for inconsistent upstream date formatting. The filtered
    /// payload is what gets cached, under a year-specific key.
    pub async fn rider_victories(
        &self,
        name_or_slug: &str,
        year: Option<i32>,
    ) -> Result<FetchResult> {
        let slug = self.resolver.resolve(EntityDomain::Rider, name_or_slug);
        let key = match year {
            Some(y) => format!("rider_victories:{slug}:{y}"),
            None => format!("rider_victories:{slug}:all"),
        };

        if let Some(cached) = self.cache.get(&key).await {
            return Ok(FetchResult::Data(cached));
        }

        match self.offload(locator::rider(&slug)).await? {
            Ok(mut data) => {
                if let Some(y) = year {
                    filter_victories_by_year(&mut data, y);
                }
                self.cache.set(&key, data.clone(), TTL_RIDER).await;
                Ok(FetchResult::Data(data))
            }
            Err(message) => {
                tracing::warn!(%slug, %message, "rider victories fetch failed");
                Ok(FetchResult::error(message, &[("slug", json!(slug))]))
            }
        }
    }

    /// Rider race results.
    pub async fn rider_results(
        &self,
        name_or_slug: &str,
        year: Option<i32>,
    ) -> Result<FetchResult> {
        let slug = self.resolver.resolve(EntityDomain::Rider, name_or_slug);
        let key = match year {
            Some(y) => format!("rider_results:{slug}:{y}"),
            None => format!("rider_results:{slug}:all"),
        };
        let context = [("slug", json!(slug.clone()))];
        self.fetch_cached(&key, locator::rider(&slug), TTL_RIDER, &context)
            .await
    }

    /// Race results: general classification, or one stage when given.
    pub async fn race_results(
        &self,
        race: &str,
        year: i32,
        stage: Option<u32>,
    ) -> Result<FetchResult> {
        let slug = self.resolver.resolve(EntityDomain::Race, race);
        let key = match stage {
            Some(n) => format!("race:{slug}:{year}:stage-{n}"),
            None => format!("race:{slug}:{year}:gc"),
        };
        let context = [("race", json!(slug.clone())), ("year", json!(year))];
        self.fetch_cached(&key, locator::race(&slug, year, stage), TTL_RACE, &context)
            .await
    }

    /// Race startlist.
    pub async fn race_startlist(&self, race: &str, year: i32) -> Result<FetchResult> {
        let slug = self.resolver.resolve(EntityDomain::Race, race);
        let key = format!("startlist:{slug}:{year}");
        let context = [("race", json!(slug.clone())), ("year", json!(year))];
        self.fetch_cached(&key, locator::startlist(&slug, year), TTL_STARTLIST, &context)
            .await
    }

    /// Team roster and info for a season.
    pub async fn team_info(&self, team: &str, year: i32) -> Result<FetchResult> {
        let slug = self.resolver.resolve(EntityDomain::Team, team);
        let key = format!("team:{slug}:{year}");
        let context = [("team", json!(slug.clone())), ("year", json!(year))];
        self.fetch_cached(&key, locator::team(&slug, year), TTL_TEAM, &context)
            .await
    }

    /// UCI/PCS rankings.
    ///
    /// `ranking_type` is passed through verbatim (`individual`, `teams`,
    /// `nations`, or anything else — unsupported values fail upstream).
    /// `category` defaults to `"me"` (men elite) at the call sites.
    pub async fn ranking(&self, ranking_type: &str, category: &str) -> Result<FetchResult> {
        let key = format!("ranking:{category}:{ranking_type}");
        let context = [("ranking_type", json!(ranking_type))];
        self.fetch_cached(
            &key,
            locator::ranking(category, ranking_type),
            TTL_RANKING,
            &context,
        )
        .await
    }

    /// Rider search against the static alias table.
    pub fn search_riders(&self, query: &str) -> Vec<SearchMatch> {
        self.resolver.search(query)
    }

    /// Cache-aside skeleton shared by the simple operations.
    async fn fetch_cached(
        &self,
        key: &str,
        path: String,
        ttl: Duration,
        error_context: &[(&str, Value)],
    ) -> Result<FetchResult> {
        if let Some(cached) = self.cache.get(key).await {
            return Ok(FetchResult::Data(cached));
        }

        match self.offload(path).await? {
            Ok(data) => {
                self.cache.set(key, data.clone(), ttl).await;
                Ok(FetchResult::Data(data))
            }
            Err(message) => {
                tracing::warn!(key, %message, "source fetch failed");
                Ok(FetchResult::error(message, error_context))
            }
        }
    }

    /// Runs the blocking source call on the bounded worker pool.
    ///
    /// The outer `Result` is internal machinery failure (worker panic,
    /// closed pool); the inner one is the source's own failure, kept as a
    /// message so callers can fold it into a [`FetchResult`].
    async fn offload(&self, path: String) -> Result<std::result::Result<Value, String>> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .context("fetch worker pool closed")?;
        let source = Arc::clone(&self.source);
        let outcome = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            source.fetch(&path).map_err(|e| e.to_string())
        })
        .await
        .context("fetch worker panicked")?;
        Ok(outcome)
    }
}

/// Retains only victories matching `year`, by exact `year` field match or
/// by the year appearing inside the free-text `date` field.
fn filter_victories_by_year(data: &mut Value, year: i32) {
    let needle = year.to_string();
    if let Some(victories) = data.get_mut("victories").and_then(Value::as_array_mut) {
        victories.retain(|v| {
            let year_matches = v.get("year").and_then(Value::as_i64) == Some(year as i64);
            let date_matches = v
                .get("date")
                .map(|d| match d {
                    Value::String(s) => s.contains(&needle),
                    other => other.to_string().contains(&needle),
                })
                .unwrap_or(false);
            year_matches || date_matches
        });
    }
}
