//! Short-TTL memo of "stop name -> next departures".
//!
//! Entries are keyed by lower-cased stop name and requested limit. An entry
//! answers reads while `now < created_at + ttl` and is never refreshed in
//! place; once expired, the next read recomputes it and overwrites the slot.
//! Failed lookups are cached the same way, so a burst of requests for an
//! unknown stop costs one upstream round trip per TTL window.
//!
//! There is no single-flight: concurrent misses on one key each go upstream,
//! and the last write wins. The map is bounded by a capacity with
//! least-recently-read eviction; a capacity of zero leaves it unbounded.

use std::{
    collections::HashMap,
    future::Future,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::{DepartureSource, NextDeparturesResponse, StopDirectory};
use crate::Clock;

// ---

pub const DEFAULT_TTL: Duration = Duration::from_secs(10);
pub const DEFAULT_CAPACITY: usize = 1024;
pub const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone)]
struct CacheEntry {
    created_at: DateTime<Utc>,
    last_read: DateTime<Utc>,
    payload: NextDeparturesResponse,
}

pub struct DepartureCache {
    directory: Arc<dyn StopDirectory>,
    source: Arc<dyn DepartureSource>,
    clock: Arc<dyn Clock>,
    ttl: chrono::Duration,
    capacity: usize,
    upstream_timeout: Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl DepartureCache {
    // ---
    pub fn new(
        directory: Arc<dyn StopDirectory>,
        source: Arc<dyn DepartureSource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            directory,
            source,
            clock,
            ttl: to_chrono(DEFAULT_TTL),
            capacity: DEFAULT_CAPACITY,
            upstream_timeout: DEFAULT_UPSTREAM_TIMEOUT,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = to_chrono(ttl);
        self
    }

    /// `0` disables the bound.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_upstream_timeout(mut self, timeout: Duration) -> Self {
        self.upstream_timeout = timeout;
        self
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Next departures for `stop_name`, from cache when fresh.
    ///
    /// Never fails: an unresolvable stop yields `stop_id: None` and no
    /// departures, and an unavailable transit source yields no departures.
    pub async fn get_next_departures(&self, stop_name: &str, limit: usize) -> NextDeparturesResponse {
        // ---
        let key = cache_key(stop_name, limit);

        if let Some(payload) = self.lookup(&key, self.clock.now()) {
            debug!("Departure cache hit for '{}'", key);
            return payload;
        }
        debug!("Departure cache miss for '{}'", key);

        let response = self.compute(stop_name, limit).await;
        self.insert(key, response.clone(), self.clock.now());
        response
    }

    async fn compute(&self, stop_name: &str, limit: usize) -> NextDeparturesResponse {
        // ---
        let resolved = self
            .bounded("stop resolution", self.directory.resolve(stop_name))
            .await
            .flatten();

        let Some(stop) = resolved else {
            debug!("Could not resolve stop '{}'", stop_name);
            return NextDeparturesResponse::not_found(stop_name);
        };

        let stop_id = stop.transit_id().to_string();
        let mut departures = self
            .bounded(
                "departure fetch",
                self.source.fetch_departures(&stop_id, limit),
            )
            .await
            .unwrap_or_default();
        departures.truncate(limit);

        NextDeparturesResponse {
            stop_name: stop.name,
            stop_id: Some(stop_id),
            departures,
        }
    }

    /// Run an upstream call under the timeout; failures become `None`.
    async fn bounded<T>(
        &self,
        what: &str,
        call: impl Future<Output = anyhow::Result<T>>,
    ) -> Option<T> {
        // ---
        match tokio::time::timeout(self.upstream_timeout, call).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                warn!("Upstream {} failed: {:#}", what, e);
                None
            }
            Err(_) => {
                warn!("Upstream {} timed out after {:?}", what, self.upstream_timeout);
                None
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_fresh(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        entry
            .created_at
            .checked_add_signed(self.ttl)
            .map_or(true, |expires_at| now < expires_at)
    }

    fn lookup(&self, key: &str, now: DateTime<Utc>) -> Option<NextDeparturesResponse> {
        // ---
        let mut entries = self.lock();
        let entry = entries.get_mut(key)?;
        if self.is_fresh(entry, now) {
            entry.last_read = now;
            Some(entry.payload.clone())
        } else {
            None
        }
    }

    fn insert(&self, key: String, payload: NextDeparturesResponse, now: DateTime<Utc>) {
        // ---
        let mut entries = self.lock();

        if self.capacity > 0 && !entries.contains_key(&key) && entries.len() >= self.capacity {
            entries.retain(|_, e| self.is_fresh(e, now));

            if entries.len() >= self.capacity {
                let coldest = entries
                    .iter()
                    .min_by_key(|(_, e)| e.last_read)
                    .map(|(k, _)| k.clone());
                if let Some(coldest) = coldest {
                    debug!("Departure cache full, evicting '{}'", coldest);
                    entries.remove(&coldest);
                }
            }
        }

        entries.insert(
            key,
            CacheEntry {
                created_at: now,
                last_read: now,
                payload,
            },
        );
    }
}

fn cache_key(stop_name: &str, limit: usize) -> String {
    format!("{}:{}", stop_name.to_lowercase(), limit)
}

fn to_chrono(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or(chrono::Duration::MAX)
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::transit::{mock_departures, Departure, StaticStopDirectory, StopLocation};
    use crate::ManualClock;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Barrier;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 26, 18, 0, 0).unwrap()
    }

    #[derive(Default)]
    struct CountingDirectory {
        calls: AtomicUsize,
        delay: Option<Duration>,
    }

    #[async_trait::async_trait]
    impl StopDirectory for CountingDirectory {
        async fn resolve(&self, name: &str) -> anyhow::Result<Option<StopLocation>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            StaticStopDirectory::tampere().resolve(name).await
        }
    }

    struct CountingSource {
        calls: AtomicUsize,
        fail: bool,
        gate: Option<Barrier>,
    }

    impl CountingSource {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail: false,
                gate: None,
            }
        }
    }

    #[async_trait::async_trait]
    impl DepartureSource for CountingSource {
        async fn fetch_departures(&self, _stop_id: &str, limit: usize) -> anyhow::Result<Vec<Departure>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.wait().await;
            }
            if self.fail {
                anyhow::bail!("upstream 503");
            }
            // deliberately over-long; the cache must cap it
            Ok(mock_departures(start(), limit + 2))
        }
    }

    struct Harness {
        cache: DepartureCache,
        directory: Arc<CountingDirectory>,
        source: Arc<CountingSource>,
        clock: Arc<ManualClock>,
    }

    fn harness_with(directory: CountingDirectory, source: CountingSource) -> Harness {
        // ---
        let directory = Arc::new(directory);
        let source = Arc::new(source);
        let clock = Arc::new(ManualClock::new(start()));
        let cache = DepartureCache::new(directory.clone(), source.clone(), clock.clone());
        Harness {
            cache,
            directory,
            source,
            clock,
        }
    }

    fn harness() -> Harness {
        harness_with(CountingDirectory::default(), CountingSource::new())
    }

    #[tokio::test]
    async fn test_hit_within_ttl_is_identical_and_skips_upstream() {
        // ---
        let h = harness();
        let first = h.cache.get_next_departures("Keskustori", 3).await;
        h.clock.advance(ChronoDuration::seconds(9));
        let second = h.cache.get_next_departures("Keskustori", 3).await;

        assert_eq!(
            serde_json::to_vec(&first).unwrap(),
            serde_json::to_vec(&second).unwrap()
        );
        assert_eq!(first.stop_id.as_deref(), Some("tampere:0001"));
        assert_eq!(first.departures.len(), 3);
        assert_eq!(h.source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.directory.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expired_entry_is_recomputed_once() {
        // ---
        let h = harness();
        h.cache.get_next_departures("Keskustori", 3).await;

        h.clock.advance(ChronoDuration::seconds(10));
        h.cache.get_next_departures("Keskustori", 3).await;
        assert_eq!(h.source.calls.load(Ordering::SeqCst), 2);

        h.cache.get_next_departures("Keskustori", 3).await;
        assert_eq!(h.source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_key_is_case_insensitive_and_includes_limit() {
        // ---
        let h = harness();
        h.cache.get_next_departures("Keskustori", 3).await;
        h.cache.get_next_departures("KESKUSTORI", 3).await;
        assert_eq!(h.source.calls.load(Ordering::SeqCst), 1);

        h.cache.get_next_departures("keskustori", 5).await;
        assert_eq!(h.source.calls.load(Ordering::SeqCst), 2);
        assert_eq!(h.cache.len(), 2);
    }

    #[tokio::test]
    async fn test_unresolvable_stop_is_cached_as_not_found() {
        // ---
        let h = harness();
        let response = h.cache.get_next_departures("Nowhereistan", 5).await;

        assert_eq!(response.stop_name, "Nowhereistan");
        assert!(response.stop_id.is_none());
        assert!(response.departures.is_empty());

        h.cache.get_next_departures("Nowhereistan", 5).await;
        assert_eq!(h.directory.calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.source.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_upstream_failure_yields_empty_departures() {
        // ---
        let mut source = CountingSource::new();
        source.fail = true;
        let h = harness_with(CountingDirectory::default(), source);

        let response = h.cache.get_next_departures("Tays", 5).await;
        assert_eq!(response.stop_id.as_deref(), Some("tampere:0005"));
        assert!(response.departures.is_empty());
    }

    #[tokio::test]
    async fn test_slow_directory_counts_as_not_found() {
        // ---
        let directory = CountingDirectory {
            delay: Some(Duration::from_secs(5)),
            ..Default::default()
        };
        let h = harness_with(directory, CountingSource::new());
        let cache = h.cache.with_upstream_timeout(Duration::from_millis(20));

        let response = cache.get_next_departures("Keskustori", 5).await;
        assert!(response.stop_id.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_cold_misses_then_cached() {
        // ---
        let mut source = CountingSource::new();
        source.gate = Some(Barrier::new(2));
        let h = harness_with(CountingDirectory::default(), source);

        // both requests are inside the upstream call before either finishes
        let (a, b) = tokio::join!(
            h.cache.get_next_departures("Hervanta", 2),
            h.cache.get_next_departures("Hervanta", 2),
        );
        assert_eq!(a, b);
        assert_eq!(h.source.calls.load(Ordering::SeqCst), 2);

        let c = h.cache.get_next_departures("Hervanta", 2).await;
        assert_eq!(c, a);
        assert_eq!(h.source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_capacity_evicts_least_recently_read() {
        // ---
        let h = harness();
        let cache = h.cache.with_capacity(2).with_ttl(Duration::from_secs(60));

        cache.get_next_departures("Keskustori", 1).await;
        h.clock.advance(ChronoDuration::seconds(1));
        cache.get_next_departures("Hervanta", 1).await;
        h.clock.advance(ChronoDuration::seconds(1));
        // touch Keskustori so Hervanta is the coldest
        cache.get_next_departures("Keskustori", 1).await;
        h.clock.advance(ChronoDuration::seconds(1));
        cache.get_next_departures("Tays", 1).await;

        assert_eq!(cache.len(), 2);
        assert_eq!(h.source.calls.load(Ordering::SeqCst), 3);

        cache.get_next_departures("Keskustori", 1).await;
        assert_eq!(h.source.calls.load(Ordering::SeqCst), 3);
        cache.get_next_departures("Hervanta", 1).await;
        assert_eq!(h.source.calls.load(Ordering::SeqCst), 4);
    }
}
