//! Memoization with a failure cooldown.
//!
//! Both the spot-price curves and the exchange rate are fetched at most once
//! per local day; a failed fetch gates retries for a cooldown window so a
//! provider outage does not turn into a request storm.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::calendar::LocalDay;
use crate::error::{FetchError, FetchResult};

pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(10 * 60);

/// Cache keys carry the local day they belong to so entries can be pruned
/// relative to the newest inserted day.
pub trait DayKey: Eq + Hash + Copy {
    fn local_day(&self) -> LocalDay;
}

impl DayKey for LocalDay {
    fn local_day(&self) -> LocalDay {
        *self
    }
}

struct CacheState<K, V> {
    entries: HashMap<K, V>,
    failures: HashMap<K, Instant>,
}

/// Per-day memoization with retry gating.
///
/// All of miss detection, the fetch itself and the insertion happen under
/// one critical section, so concurrent callers can never duplicate a fetch
/// for the same key. Callers receive clones, never references into the map.
pub struct RetryGatedCache<K, V>
where
    K: DayKey + Send + Sync,
    V: Clone + Send + Sync,
{
    state: Mutex<CacheState<K, V>>,
    cooldown: Duration,
}

impl<K, V> RetryGatedCache<K, V>
where
    K: DayKey + Send + Sync,
    V: Clone + Send + Sync,
{
    pub fn new() -> Self {
        Self::with_cooldown(DEFAULT_COOLDOWN)
    }

    pub fn with_cooldown(cooldown: Duration) -> Self {
        RetryGatedCache {
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                failures: HashMap::new(),
            }),
            cooldown,
        }
    }

    /// Returns the cached value, or fetches and inserts it.
    ///
    /// A key whose last fetch failed within the cooldown window is rejected
    /// with [`FetchError::NotAvailable`] without invoking `fetch`. A hit is
    /// returned before failures are consulted, so a live entry can never be
    /// masked by a stale failure record.
    pub async fn get<F, Fut>(&self, key: K, fetch: F) -> FetchResult<V>
    where
        F: FnOnce(K) -> Fut,
        Fut: Future<Output = FetchResult<V>>,
    {
        let mut state = self.state.lock().await;

        if let Some(value) = state.entries.get(&key) {
            debug!(day = key.local_day().key(), "cache hit");
            return Ok(value.clone());
        }

        // Expired failure records are purged lazily, before the recency check.
        let now = Instant::now();
        let cooldown = self.cooldown;
        state
            .failures
            .retain(|_, registered| now.duration_since(*registered) < cooldown);
        if state.failures.contains_key(&key) {
            debug!(day = key.local_day().key(), "recently failed, fetch suppressed");
            return Err(FetchError::NotAvailable);
        }

        debug!(day = key.local_day().key(), "cache miss");
        match fetch(key).await {
            Ok(value) => {
                // Only today/tomorrow are ever queried; drop anything more
                // than a day older than the inserted key.
                let day = key.local_day();
                state.entries.retain(|k, _| day.days_after(k.local_day()) <= 1);
                state.entries.insert(key, value.clone());
                Ok(value)
            }
            Err(err) => {
                state.failures.insert(key, Instant::now());
                Err(err)
            }
        }
    }

    /// True iff a live cache entry exists. Does not consult failures and
    /// never triggers a fetch.
    pub async fn has(&self, key: &K) -> bool {
        self.state.lock().await.entries.contains_key(key)
    }
}

impl<K, V> Default for RetryGatedCache<K, V>
where
    K: DayKey + Send + Sync,
    V: Clone + Send + Sync,
{
    fn default() -> Self {
        Self::new()
    }
}
