//! Promotion cache with stale-data fallback
//!
//! Holds the last successfully classified [`CatalogSnapshot`]. Reads inside
//! the TTL never touch the network. When a refresh fails the previous
//! snapshot keeps being served; when nothing was ever fetched an empty
//! snapshot flagged `degraded` is returned instead. [`PromotionCache::get`]
//! never fails.

use chrono::Utc;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

use super::classifier::classify;
use super::CatalogProvider;
use crate::config::CacheConfig;
use crate::error::EpicfreeErrorTrait;
use crate::models::{CatalogSnapshot, PromotionRecord};

/// Default time-to-live for a classified snapshot
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

struct CachedEntry {
    snapshot: Arc<CatalogSnapshot>,
    refreshed_at: Instant,
}

#[derive(Debug, Default)]
struct RefreshStats {
    fetch_count: u64,
    failure_count: u64,
    last_error: Option<String>,
}

/// TTL cache in front of a [`CatalogProvider`]
pub struct PromotionCache {
    provider: Arc<dyn CatalogProvider>,

    ttl: Duration,

    /// Last good snapshot; replaced wholesale on each successful refresh
    entry: RwLock<Option<CachedEntry>>,

    /// Serializes refreshes
    refresh_lock: Mutex<()>,

    invalidated: AtomicBool,

    stats: RwLock<RefreshStats>,
}

impl PromotionCache {
    /// Create a cache with the default TTL
    pub fn new(provider: Arc<dyn CatalogProvider>) -> Self {
        Self::with_ttl(provider, DEFAULT_TTL)
    }

    /// Create a cache with a custom TTL
    pub fn with_ttl(provider: Arc<dyn CatalogProvider>, ttl: Duration) -> Self {
        Self {
            provider,
            ttl,
            entry: RwLock::new(None),
            refresh_lock: Mutex::new(()),
            invalidated: AtomicBool::new(false),
            stats: RwLock::new(RefreshStats::default()),
        }
    }

    /// Create a cache from the cache section of the configuration
    pub fn from_config(provider: Arc<dyn CatalogProvider>, config: &CacheConfig) -> Self {
        Self::with_ttl(provider, config.ttl())
    }

    /// Configured TTL
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Get the current snapshot, refreshing it if expired or invalidated
    pub async fn get(&self) -> Arc<CatalogSnapshot> {
        if let Some(snapshot) = self.fresh_snapshot().await {
            tracing::debug!("Promotion cache hit");
            return snapshot;
        }

        let _guard = self.refresh_lock.lock().await;

        // Another caller may have refreshed while we waited for the lock
        if let Some(snapshot) = self.fresh_snapshot().await {
            tracing::debug!("Promotion cache refreshed by concurrent caller");
            return snapshot;
        }

        self.refresh().await
    }

    /// Force the next [`get`](Self::get) to refetch
    pub fn invalidate(&self) {
        self.invalidated.store(true, Ordering::SeqCst);
        tracing::info!("Promotion cache invalidated");
    }

    /// Upcoming game at `index` in the cached snapshot
    ///
    /// Never fetches. Returns `None` when nothing is cached yet or `index`
    /// is out of range; a stale entry is still served.
    pub async fn upcoming_by_index(&self, index: usize) -> Option<PromotionRecord> {
        self.entry
            .read()
            .await
            .as_ref()
            .and_then(|entry| entry.snapshot.upcoming_games.get(index).cloned())
    }

    /// Inspect the cache without triggering a fetch
    pub async fn status(&self) -> CacheStatus {
        let entry = self.entry.read().await;
        let stats = self.stats.read().await;
        let invalidated = self.invalidated.load(Ordering::SeqCst);

        let (state, age_seconds, current_count, upcoming_count) = match entry.as_ref() {
            None => (CacheState::Empty, None, 0, 0),
            Some(entry) => {
                let age = entry.refreshed_at.elapsed();
                let state = if age < self.ttl && !invalidated {
                    CacheState::Fresh
                } else {
                    CacheState::Stale
                };
                (
                    state,
                    Some(age.as_secs()),
                    entry.snapshot.current_games.len(),
                    entry.snapshot.upcoming_games.len(),
                )
            }
        };

        CacheStatus {
            state,
            age_seconds,
            ttl_seconds: self.ttl.as_secs(),
            fetch_count: stats.fetch_count,
            failure_count: stats.failure_count,
            last_error: stats.last_error.clone(),
            current_count,
            upcoming_count,
        }
    }

    async fn fresh_snapshot(&self) -> Option<Arc<CatalogSnapshot>> {
        if self.invalidated.load(Ordering::SeqCst) {
            return None;
        }

        let entry = self.entry.read().await;
        entry
            .as_ref()
            .filter(|entry| entry.refreshed_at.elapsed() < self.ttl)
            .map(|entry| Arc::clone(&entry.snapshot))
    }

    // Caller must hold `refresh_lock`
    async fn refresh(&self) -> Arc<CatalogSnapshot> {
        self.invalidated.store(false, Ordering::SeqCst);

        match self.provider.fetch().await {
            Ok(raw) => {
                let snapshot = Arc::new(classify(&raw, Utc::now()));
                *self.entry.write().await = Some(CachedEntry {
                    snapshot: Arc::clone(&snapshot),
                    refreshed_at: Instant::now(),
                });
                self.record_fetch(None).await;

                tracing::info!(
                    endpoint = %raw.endpoint,
                    current = snapshot.current_games.len(),
                    upcoming = snapshot.upcoming_games.len(),
                    "Promotion cache refreshed"
                );
                snapshot
            }
            Err(e) => {
                self.record_fetch(Some(e.to_string())).await;

                match self.entry.read().await.as_ref() {
                    Some(entry) => {
                        tracing::warn!(
                            error = %e,
                            category = %e.category(),
                            recoverable = e.is_recoverable(),
                            age_secs = entry.refreshed_at.elapsed().as_secs(),
                            "Catalog refresh failed, serving stale snapshot"
                        );
                        Arc::clone(&entry.snapshot)
                    }
                    None => {
                        tracing::error!(
                            error = %e,
                            category = %e.category(),
                            recoverable = e.is_recoverable(),
                            "Catalog refresh failed with nothing cached, serving degraded empty snapshot"
                        );
                        Arc::new(CatalogSnapshot::degraded_empty())
                    }
                }
            }
        }
    }

    async fn record_fetch(&self, error: Option<String>) {
        let mut stats = self.stats.write().await;
        stats.fetch_count += 1;
        if error.is_some() {
            stats.failure_count += 1;
        }
        stats.last_error = error;
    }
}

/// Freshness of the cached snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheState {
    /// Nothing fetched yet
    Empty,
    Fresh,
    /// Expired or invalidated; the next read refetches
    Stale,
}

impl std::fmt::Display for CacheState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Empty => "empty",
            Self::Fresh => "fresh",
            Self::Stale => "stale",
        };
        write!(f, "{s}")
    }
}

/// Cache status information
#[derive(Debug, Clone, Serialize)]
pub struct CacheStatus {
    pub state: CacheState,
    pub age_seconds: Option<u64>,
    pub ttl_seconds: u64,
    pub fetch_count: u64,
    pub failure_count: u64,
    pub last_error: Option<String>,
    pub current_count: usize,
    pub upcoming_count: usize,
}

impl CacheStatus {
    /// Format as display string
    pub fn display(&self) -> String {
        let mut output = String::from("Promotion Cache\n");
        output.push_str(&format!("{:-<40}\n", ""));
        output.push_str(&format!("State: {}\n", self.state));
        match self.age_seconds {
            Some(age) => output.push_str(&format!("Age: {age}s (TTL {}s)\n", self.ttl_seconds)),
            None => output.push_str(&format!("Age: - (TTL {}s)\n", self.ttl_seconds)),
        }
        output.push_str(&format!("Current Games: {}\n", self.current_count));
        output.push_str(&format!("Upcoming Games: {}\n", self.upcoming_count));
        output.push_str(&format!(
            "Fetches: {} ({} failed)\n",
            self.fetch_count, self.failure_count
        ));
        if let Some(ref error) = self.last_error {
            output.push_str(&format!("Last Error: {error}\n"));
        }

        output
    }
}
