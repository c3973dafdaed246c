//! The opaque statistics data source.
//!
//! Everything upstream of the gateway is reduced to one seam: a blocking
//! call that takes a path-like locator (`rider/tadej-pogacar`,
//! `race/tour-de-france/2024/stage-5`) and returns a JSON payload or an
//! error. The scraping machinery behind it is deliberately out of scope;
//! tests substitute an in-memory implementation.

use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::time::Duration;

/// A synchronous source of ProCyclingStats payloads.
///
/// Implementations may block (network, parsing); the gateway runs them on
/// a bounded worker pool, never on the async executor directly. All
/// failure kinds (network, not-found, parse) are collapsed into one error.
pub trait StatsSource: Send + Sync {
    /// Fetches the payload addressed by `path`.
    fn fetch(&self, path: &str) -> Result<Value>;
}

/// HTTP-backed source talking to a scraper service that mirrors the
/// ProCyclingStats URL scheme and answers JSON.
pub struct HttpStatsSource {
    base_url: String,
    timeout: Duration,
}

impl HttpStatsSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            timeout,
        }
    }
}

impl StatsSource for HttpStatsSource {
    fn fetch(&self, path: &str) -> Result<Value> {
        // Runs on a blocking worker thread, so a blocking client is fine
        // here; building one per call keeps this type runtime-agnostic.
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .user_agent(concat!("pcs-assistant/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build HTTP client")?;

        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), path);
        let response = client
            .get(&url)
            .send()
            .with_context(|| format!("request to {url} failed"))?;

        let status = response.status();
        if !status.is_success() {
            bail!("source returned {status} for {path}");
        }

        response
            .json::<Value>()
            .with_context(|| format!("invalid JSON payload for {path}"))
    }
}

/// Locator builders for the six operation families.
///
/// Kept in one place so cache keys and fetch paths cannot drift apart.
pub mod locator {
    /// `rider/{slug}`
    pub fn rider(slug: &str) -> String {
        format!("rider/{slug}")
    }

    /// `race/{slug}/{year}` or `race/{slug}/{year}/stage-{n}`
    pub fn race(slug: &str, year: i32, stage: Option<u32>) -> String {
        match stage {
            Some(n) => format!("race/{slug}/{year}/stage-{n}"),
            None => format!("race/{slug}/{year}"),
        }
    }

    /// `race/{slug}/{year}/startlist`
    pub fn startlist(slug: &str, year: i32) -> String {
        format!("race/{slug}/{year}/startlist")
    }

    /// `team/{slug}-{year}`
    pub fn team(slug: &str, year: i32) -> String {
        format!("team/{slug}-{year}")
    }

    /// `rankings/{category}/{ranking_type}`
    pub fn ranking(category: &str, ranking_type: &str) -> String {
        format!("rankings/{category}/{ranking_type}")
    }
}
