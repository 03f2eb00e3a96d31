//! Lenta cache: TTL entries, weighted LRU eviction and single-flight fetches.
//!
//! Per key the slot moves through `Absent -> Fetching -> Present(fresh) ->
//! Present(stale) -> Absent`. Concurrent callers for a key that is being
//! fetched share one in-flight future. The index only keeps a weak handle to
//! that future, so the fetch lives exactly as long as somebody awaits it.
//!
//! The lock guards bookkeeping only; fetches run outside it and values are
//! cloned out under it.

#![forbid(unsafe_code)]

pub mod keys;

use std::collections::BTreeMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared, WeakShared};
use metrics::{counter, gauge, histogram};
use rustc_hash::FxHashMap;
use tokio::runtime::Handle;
use tokio::time::Instant;
use tracing::{debug, trace};

pub use keys::{AssetError, AssetKey, AssetStore, CacheKey, MemoryAssetStore};

type Fetch<T, E> = Shared<BoxFuture<'static, Result<T, E>>>;
type WeakFetch<T, E> = WeakShared<BoxFuture<'static, Result<T, E>>>;

/// Stand-in expiry for TTLs too large to add to an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 3600);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheConfig {
    /// Ceiling for the summed weight of present entries.
    pub max_weight: u64,
    /// Fraction of the TTL after which an entry is stale: still served, but a
    /// background refresh is started. `None` keeps entries fresh until expiry.
    pub refresh_ahead: Option<f32>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { max_weight: 1024, refresh_ahead: None }
    }
}

impl CacheConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        let max_weight = std::env::var("LENTA_CACHE_MAX_WEIGHT")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(d.max_weight);
        let refresh_ahead = std::env::var("LENTA_CACHE_REFRESH_AHEAD").ok().and_then(|s| s.parse::<f32>().ok());
        Self { max_weight, refresh_ahead }
    }

    fn stale_after(&self, ttl: Duration) -> Option<Duration> {
        let f = self.refresh_ahead?;
        if f.is_finite() && f > 0.0 && f < 1.0 {
            Duration::try_from_secs_f64(ttl.as_secs_f64() * f64::from(f)).ok()
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Callers that awaited a fetch started by someone else.
    pub joined: u64,
    pub refreshes: u64,
    pub evictions: u64,
    pub expired: u64,
    pub entries: usize,
    pub weight: u64,
}

struct Entry<T, E> {
    value: T,
    inserted_at: Instant,
    last_access: Instant,
    expires_at: Instant,
    stale_at: Option<Instant>,
    tick: u64,
    weight: u64,
    refresh: Option<(u64, WeakFetch<T, E>)>,
}

impl<T, E> Entry<T, E> {
    fn refreshing(&self) -> Option<Fetch<T, E>> {
        self.refresh.as_ref().and_then(|(_, w)| w.upgrade())
    }
}

enum Slot<T, E> {
    Fetching { generation: u64, fetch: WeakFetch<T, E> },
    Present(Entry<T, E>),
}

struct State<K, T, E> {
    index: FxHashMap<K, Slot<T, E>>,
    /// Access tick -> key, oldest first. Present entries only.
    lru: BTreeMap<u64, K>,
    tick: u64,
    generation: u64,
    weight: u64,
    stats: CacheStats,
}

impl<K: Eq + Hash + Clone, T, E> State<K, T, E> {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn next_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    fn remove(&mut self, key: &K) -> Option<Slot<T, E>> {
        let slot = self.index.remove(key)?;
        if let Slot::Present(e) = &slot {
            self.lru.remove(&e.tick);
            self.weight -= e.weight;
        }
        Some(slot)
    }

    fn present(&self) -> usize {
        self.lru.len()
    }
}

type Weigher<K, T> = Box<dyn Fn(&K, &T) -> u64 + Send + Sync>;

struct Inner<K, T, E> {
    name: &'static str,
    config: CacheConfig,
    weigher: Weigher<K, T>,
    state: Mutex<State<K, T, E>>,
}

enum Plan<T, E> {
    Hit { value: T, refresh: bool },
    Join(Fetch<T, E>),
    Start,
}

enum Next<T, E> {
    Ready(T, Option<(Handle, Fetch<T, E>)>),
    Wait(Fetch<T, E>),
}

/// Shared cache handle; clones refer to the same entries.
pub struct Cache<K, T, E> {
    inner: Arc<Inner<K, T, E>>,
}

impl<K, T, E> Clone for Cache<K, T, E> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<K, T, E> Inner<K, T, E>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn lock(&self) -> MutexGuard<'_, State<K, T, E>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn store(&self, st: &mut State<K, T, E>, key: K, value: T, ttl: Duration) {
        let now = Instant::now();
        let weight = (self.weigher)(&key, &value);
        let expires_at = now.checked_add(ttl).unwrap_or(now + FAR_FUTURE);
        let stale_at = self
            .config
            .stale_after(ttl)
            .map(|d| now.checked_add(d).map_or(expires_at, |at| at.min(expires_at)));
        let mut entry = Entry {
            value,
            inserted_at: now,
            last_access: now,
            expires_at,
            stale_at,
            tick: 0,
            weight,
            refresh: None,
        };

        st.remove(&key);
        entry.tick = st.next_tick();
        st.lru.insert(entry.tick, key.clone());
        st.weight += weight;
        st.index.insert(key, Slot::Present(entry));
        self.evict(st, now);
        gauge!("cache_weight", st.weight as f64, "cache" => self.name);
    }

    /// Store the outcome of fetch `generation`, unless the slot was
    /// invalidated or taken over by a newer fetch meanwhile.
    fn complete(&self, key: K, generation: u64, ttl: Duration, res: &Result<T, E>) {
        let mut guard = self.lock();
        let st = &mut *guard;
        let current = match st.index.get(&key) {
            Some(Slot::Fetching { generation: g, .. }) => *g == generation,
            Some(Slot::Present(e)) => e.refresh.as_ref().map_or(false, |(g, _)| *g == generation),
            None => false,
        };
        if !current {
            debug!(cache = self.name, generation, "fetch detached; result not stored");
            return;
        }
        match res {
            Ok(value) => self.store(st, key, value.clone(), ttl),
            Err(_) => match st.index.get_mut(&key) {
                // Failed refresh: keep serving the old value until it expires.
                Some(Slot::Present(e)) => e.refresh = None,
                _ => {
                    st.index.remove(&key);
                }
            },
        }
    }

    fn evict(&self, st: &mut State<K, T, E>, now: Instant) -> usize {
        let max = self.config.max_weight;
        if st.weight <= max {
            return 0;
        }
        let mut evicted = self.purge(st, now);
        while st.weight > max {
            let Some((_, key)) = st.lru.pop_first() else { break };
            match st.index.remove(&key) {
                Some(Slot::Present(e)) => {
                    st.weight -= e.weight;
                    st.stats.evictions += 1;
                    evicted += 1;
                    trace!(cache = self.name, weight = e.weight, "evicted least recently used entry");
                }
                Some(other) => {
                    st.index.insert(key, other);
                }
                None => {}
            }
        }
        if evicted > 0 {
            counter!("cache_evictions_total", evicted as u64, "cache" => self.name);
            debug!(cache = self.name, evicted, weight = st.weight, max, "cache over budget");
        }
        evicted
    }

    fn purge(&self, st: &mut State<K, T, E>, now: Instant) -> usize {
        let dead: Vec<K> = st
            .index
            .iter()
            .filter_map(|(k, slot)| match slot {
                Slot::Present(e) if e.expires_at <= now && e.refreshing().is_none() => Some(k.clone()),
                Slot::Fetching { fetch, .. } if fetch.upgrade().is_none() => Some(k.clone()),
                _ => None,
            })
            .collect();
        let mut expired = 0;
        for k in dead {
            if let Some(Slot::Present(_)) = st.remove(&k) {
                expired += 1;
            }
        }
        st.stats.expired += expired as u64;
        expired
    }
}

impl<K, T, E> Cache<K, T, E>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Cache where every entry weighs 1.
    pub fn new(name: &'static str, config: CacheConfig) -> Self {
        Self::with_weigher(name, config, |_, _| 1)
    }

    pub fn with_weigher(
        name: &'static str,
        config: CacheConfig,
        weigher: impl Fn(&K, &T) -> u64 + Send + Sync + 'static,
    ) -> Self {
        let state = State {
            index: FxHashMap::default(),
            lru: BTreeMap::new(),
            tick: 0,
            generation: 0,
            weight: 0,
            stats: CacheStats::default(),
        };
        Self { inner: Arc::new(Inner { name, config, weigher: Box::new(weigher), state: Mutex::new(state) }) }
    }

    pub fn name(&self) -> &'static str {
        self.inner.name
    }

    pub fn config(&self) -> CacheConfig {
        self.inner.config
    }

    fn track<Fut>(&self, key: K, generation: u64, ttl: Duration, fut: Fut) -> Fetch<T, E>
    where
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let inner: Weak<Inner<K, T, E>> = Arc::downgrade(&self.inner);
        let name = self.inner.name;
        async move {
            let started = Instant::now();
            let res = fut.await;
            histogram!("cache_fetch_ms", started.elapsed().as_secs_f64() * 1000.0, "cache" => name);
            if let Some(inner) = inner.upgrade() {
                inner.complete(key, generation, ttl, &res);
            }
            res
        }
        .boxed()
        .shared()
    }

    /// Cached value for `key`, or the result of `fetch`.
    ///
    /// `fetch` is called at most once per key at a time; concurrent callers
    /// await the same future and all receive its result, errors included.
    /// Errors are never stored. `fetch` only builds the future and is called
    /// with the cache locked, so it must not call back into this cache.
    pub async fn get_or_fetch<F, Fut>(&self, key: K, ttl: Duration, fetch: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let name = self.inner.name;
        let now = Instant::now();
        let next = {
            let mut guard = self.inner.lock();
            let st = &mut *guard;
            let plan = match st.index.get_mut(&key) {
                Some(Slot::Present(e)) if now < e.expires_at => {
                    st.tick += 1;
                    st.lru.remove(&e.tick);
                    e.tick = st.tick;
                    st.lru.insert(e.tick, key.clone());
                    e.last_access = now;
                    let stale = e.stale_at.map_or(false, |at| now >= at);
                    Plan::Hit { value: e.value.clone(), refresh: stale && e.refreshing().is_none() }
                }
                Some(Slot::Present(e)) => match e.refreshing() {
                    Some(f) => Plan::Join(f),
                    None => Plan::Start,
                },
                Some(Slot::Fetching { fetch, .. }) => match fetch.upgrade() {
                    Some(f) => Plan::Join(f),
                    None => Plan::Start,
                },
                None => Plan::Start,
            };

            match plan {
                Plan::Hit { value, refresh } => {
                    st.stats.hits += 1;
                    counter!("cache_hits_total", 1u64, "cache" => name);
                    let mut background = None;
                    // Without a runtime nothing could drive the refresh; keep serving.
                    let rt = if refresh { Handle::try_current().ok() } else { None };
                    if let Some(rt) = rt {
                        let generation = st.next_generation();
                        let shared = self.track(key.clone(), generation, ttl, fetch());
                        if let (Some(Slot::Present(e)), Some(weak)) = (st.index.get_mut(&key), shared.downgrade()) {
                            e.refresh = Some((generation, weak));
                            st.stats.refreshes += 1;
                            background = Some((rt, shared));
                        }
                    }
                    Next::Ready(value, background)
                }
                Plan::Join(shared) => {
                    st.stats.joined += 1;
                    counter!("cache_fetch_joined_total", 1u64, "cache" => name);
                    Next::Wait(shared)
                }
                Plan::Start => {
                    st.stats.misses += 1;
                    counter!("cache_misses_total", 1u64, "cache" => name);
                    if let Some(Slot::Present(_)) = st.remove(&key) {
                        st.stats.expired += 1;
                    }
                    let generation = st.next_generation();
                    let shared = self.track(key.clone(), generation, ttl, fetch());
                    if let Some(weak) = shared.downgrade() {
                        st.index.insert(key, Slot::Fetching { generation, fetch: weak });
                    }
                    Next::Wait(shared)
                }
            }
        };

        match next {
            Next::Ready(value, None) => Ok(value),
            Next::Ready(value, Some((rt, shared))) => {
                counter!("cache_refresh_total", 1u64, "cache" => name);
                rt.spawn(async move {
                    if shared.await.is_err() {
                        debug!(cache = name, "background refresh failed");
                    }
                });
                Ok(value)
            }
            Next::Wait(shared) => shared.await,
        }
    }

    /// Store `value` directly, replacing whatever the slot held.
    pub fn insert(&self, key: K, value: T, ttl: Duration) {
        let mut guard = self.inner.lock();
        self.inner.store(&mut guard, key, value, ttl);
    }

    /// Drop the slot for `key`. A fetch in flight for it keeps running for its
    /// waiters but its result is not stored.
    pub fn invalidate(&self, key: &K) -> bool {
        let mut guard = self.inner.lock();
        let removed = guard.remove(key).is_some();
        if removed {
            gauge!("cache_weight", guard.weight as f64, "cache" => self.inner.name);
            debug!(cache = self.inner.name, "invalidated");
        }
        removed
    }

    /// Drop every slot whose key matches `pred`.
    pub fn invalidate_where(&self, pred: impl Fn(&K) -> bool) -> usize {
        let mut guard = self.inner.lock();
        let keys: Vec<K> = guard.index.keys().filter(|k| pred(k)).cloned().collect();
        for k in &keys {
            guard.remove(k);
        }
        keys.len()
    }

    /// Evict expired, then least recently accessed entries until the total
    /// weight is within budget. Returns the number of entries removed.
    pub fn evict_if_over_budget(&self) -> usize {
        let mut guard = self.inner.lock();
        self.inner.evict(&mut guard, Instant::now())
    }

    pub fn purge_expired(&self) -> usize {
        let mut guard = self.inner.lock();
        self.inner.purge(&mut guard, Instant::now())
    }

    /// Unexpired value for `key`, without touching recency.
    pub fn peek(&self, key: &K) -> Option<T> {
        let now = Instant::now();
        let guard = self.inner.lock();
        match guard.index.get(key) {
            Some(Slot::Present(e)) if now < e.expires_at => Some(e.value.clone()),
            _ => None,
        }
    }

    /// Time since `key` was stored, if present.
    pub fn age(&self, key: &K) -> Option<Duration> {
        let guard = self.inner.lock();
        match guard.index.get(key) {
            Some(Slot::Present(e)) => Some(e.inserted_at.elapsed()),
            _ => None,
        }
    }

    /// Time since `key` was last returned by a hit, if present.
    pub fn idle(&self, key: &K) -> Option<Duration> {
        let guard = self.inner.lock();
        match guard.index.get(key) {
            Some(Slot::Present(e)) => Some(e.last_access.elapsed()),
            _ => None,
        }
    }

    /// Number of present entries (expired ones included until purged).
    pub fn len(&self) -> usize {
        self.inner.lock().present()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn weight(&self) -> u64 {
        self.inner.lock().weight
    }

    pub fn stats(&self) -> CacheStats {
        let guard = self.inner.lock();
        CacheStats { entries: guard.present(), weight: guard.weight, ..guard.stats }
    }
}
