//! In-memory TTL cache.
//!
//! A process-scoped key→value store with per-entry expiry. Expired entries
//! are evicted lazily on read and in bulk by a periodic background sweep,
//! so memory stays bounded between reads.
//!
//! Callers only learn "hit" or "miss" — a key that expired and a key that
//! never existed look the same, because both mean "must fetch".
//!
//! # Concurrency
//!
//! `set` is not atomic with a preceding `get`: two tasks that miss on the
//! same key concurrently will both fetch and both write, and the second
//! write wins. There is no single-flight coalescing; the duplicate-work
//! window is accepted and documented rather than guarded.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

/// How often the background sweep wakes up.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// One cached value with its expiry bookkeeping.
#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    #[allow(dead_code)]
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl CacheEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Cache statistics exposed on the admin surface.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub keys: Vec<String>,
}

/// In-memory key→value cache with per-entry TTL.
///
/// Create one at process start, share it via `Arc`, and call
/// [`TtlCache::close`] at shutdown to stop the sweep task.
#[derive(Debug, Default)]
pub struct TtlCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl TtlCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts the periodic sweep task.
    ///
    /// The task runs for the lifetime of the process (or until
    /// [`close`](TtlCache::close)) and purges expired entries every
    /// `interval`.
    pub fn start(self: &Arc<Self>, interval: Duration) {
        let cache = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // the first tick completes immediately
            tick.tick().await;
            loop {
                tick.tick().await;
                let purged = cache.sweep().await;
                if purged > 0 {
                    tracing::debug!(purged, "cache sweep evicted expired entries");
                }
            }
        });
        *self.sweeper.lock().expect("sweeper lock poisoned") = Some(handle);
    }

    /// Stops the sweep task. Safe to call more than once.
    pub fn close(&self) {
        if let Some(handle) = self.sweeper.lock().expect("sweeper lock poisoned").take() {
            handle.abort();
        }
    }

    /// Returns the cached value for `key` if present and not expired.
    ///
    /// An expired entry is removed as a side effect (lazy eviction).
    pub async fn get(&self, key: &str) -> Option<Value> {
        let now = Utc::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                None => return None,
                Some(entry) if !entry.is_expired(now) => return Some(entry.value.clone()),
                Some(_) => {}
            }
        }
        // expired: upgrade to a write lock and re-check, since another
        // task may have replaced the entry in between
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get(key) {
            if !entry.is_expired(now) {
                return Some(entry.value.clone());
            }
            entries.remove(key);
        }
        None
    }

    /// Stores `value` under `key`, expiring after `ttl`.
    pub async fn set(&self, key: &str, value: Value, ttl: Duration) {
        let now = Utc::now();
        let entry = CacheEntry {
            value,
            created_at: now,
            expires_at: now + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::zero()),
        };
        self.entries.write().await.insert(key.to_string(), entry);
    }

    /// Removes `key` if present.
    pub async fn delete(&self, key: &str) {
        self.entries.write().await.remove(key);
    }

    /// Removes all entries unconditionally.
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// Removes every expired entry, returning how many were purged.
    pub async fn sweep(&self) -> usize {
        let now = Utc::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }

    /// Current entry count and keys.
    pub async fn stats(&self) -> CacheStats {
        let entries = self.entries.read().await;
        CacheStats {
            entries: entries.len(),
            keys: entries.keys().cloned().collect(),
        }
    }
}
