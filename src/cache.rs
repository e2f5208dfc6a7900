//! Policy-agnostic cache façade.
//!
//! [`Cache`] wraps one eviction engine behind a mutex and layers the rest
//! of the contract on top: single-flight loading, TTL arming, hit/miss
//! stats, and the user hook surface (added / evicted / purge visitor /
//! serialize / deserialize).
//!
//! ## Lock discipline
//!
//! One mutex per cache guards all engine state. The engine is only ever
//! touched inside short critical sections that run no user code; every
//! user callback fires with the lock released:
//!
//! ```text
//!   get(k):   [lock: lookup + bookkeeping] ──► unlock ──► deserialize
//!             └─ miss ──► unlock ──► single-flight ──► loader(k)
//!                                        └─► [lock: install] ──► hooks
//!   set(k,v): serialize ──► [lock: insert] ──► unlock ──► evicted/added
//! ```
//!
//! Hooks therefore may re-enter the cache, at the cost of running after
//! the mutating operation completed (an evicted hook can observe the
//! successor entry already installed).
//!
//! Values are stored owned and returned as clones, so no user value is
//! ever borrowed from engine state.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::clock::Clock;
use crate::error::{CacheError, DynError};
use crate::policy::arc::ArcEngine;
use crate::policy::lfu::LfuEngine;
use crate::policy::lru::LruEngine;
use crate::policy::simple::SimpleEngine;
use crate::policy::Lookup;
use crate::singleflight::Group;
use crate::stats::CacheStats;

/// Loader: produces `(value, optional TTL)` for a missing key.
pub(crate) type SharedLoader<K, V> =
    Arc<dyn Fn(&K) -> Result<(V, Option<Duration>), DynError> + Send + Sync>;
/// Entry hook: observes `(key, value)` pairs (added / evicted / purge).
pub(crate) type SharedHook<K, V> = Arc<dyn Fn(&K, &V) + Send + Sync>;
/// Value transform applied at store (`serialize`) or read (`deserialize`).
pub(crate) type SharedTransform<K, V> =
    Arc<dyn Fn(&K, V) -> Result<V, DynError> + Send + Sync>;

/// Hook and policy-independent configuration assembled by the builder.
pub(crate) struct CacheConfig<K, V> {
    pub(crate) loader: Option<SharedLoader<K, V>>,
    pub(crate) evicted: Option<SharedHook<K, V>>,
    pub(crate) added: Option<SharedHook<K, V>>,
    pub(crate) purge_visitor: Option<SharedHook<K, V>>,
    pub(crate) serialize: Option<SharedTransform<K, V>>,
    pub(crate) deserialize: Option<SharedTransform<K, V>>,
    pub(crate) expiration: Option<Duration>,
    pub(crate) clock: Arc<dyn Clock>,
}

/// One engine per policy, dispatched per call.
pub(crate) enum Engine<K, V>
where
    K: Eq + Hash + Clone,
{
    Simple(SimpleEngine<K, V>),
    Lru(LruEngine<K, V>),
    Lfu(LfuEngine<K, V>),
    Arc(ArcEngine<K, V>),
}

impl<K, V> Engine<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn lookup(&mut self, key: &K, now: Instant) -> Lookup<K, V> {
        match self {
            Engine::Simple(engine) => engine.lookup(key, now),
            Engine::Lru(engine) => engine.lookup(key, now),
            Engine::Lfu(engine) => engine.lookup(key, now),
            Engine::Arc(engine) => engine.lookup(key, now),
        }
    }

    fn insert(
        &mut self,
        key: K,
        value: V,
        expires_at: Option<Instant>,
        now: Instant,
    ) -> Option<(K, V)> {
        match self {
            Engine::Simple(engine) => engine.insert(key, value, expires_at, now),
            Engine::Lru(engine) => engine.insert(key, value, expires_at),
            Engine::Lfu(engine) => engine.insert(key, value, expires_at),
            Engine::Arc(engine) => engine.insert(key, value, expires_at),
        }
    }

    fn remove(&mut self, key: &K) -> Option<V> {
        match self {
            Engine::Simple(engine) => engine.remove(key),
            Engine::Lru(engine) => engine.remove(key),
            Engine::Lfu(engine) => engine.remove(key),
            Engine::Arc(engine) => engine.remove(key),
        }
    }

    fn len(&self) -> usize {
        match self {
            Engine::Simple(engine) => engine.len(),
            Engine::Lru(engine) => engine.len(),
            Engine::Lfu(engine) => engine.len(),
            Engine::Arc(engine) => engine.len(),
        }
    }

    fn keys(&self, now: Instant) -> Vec<K> {
        match self {
            Engine::Simple(engine) => engine.keys(now),
            Engine::Lru(engine) => engine.keys(now),
            Engine::Lfu(engine) => engine.keys(now),
            Engine::Arc(engine) => engine.keys(now),
        }
    }

    fn entries(&self, now: Instant) -> Vec<(K, V)> {
        match self {
            Engine::Simple(engine) => engine.entries(now),
            Engine::Lru(engine) => engine.entries(now),
            Engine::Lfu(engine) => engine.entries(now),
            Engine::Arc(engine) => engine.entries(now),
        }
    }

    fn drain(&mut self) -> Vec<(K, V)> {
        match self {
            Engine::Simple(engine) => engine.drain(),
            Engine::Lru(engine) => engine.drain(),
            Engine::Lfu(engine) => engine.drain(),
            Engine::Arc(engine) => engine.drain(),
        }
    }
}

struct CacheShared<K, V>
where
    K: Eq + Hash + Clone,
{
    engine: Mutex<Engine<K, V>>,
    config: CacheConfig<K, V>,
    stats: CacheStats,
    load_group: Arc<Group<K, V>>,
}

impl<K, V> CacheShared<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Serialize, arm the TTL, install under lock, then fire hooks.
    ///
    /// `ttl: None` falls back to the configured default expiration.
    fn store(&self, key: &K, value: V, ttl: Option<Duration>) -> Result<(), CacheError> {
        let stored = match &self.config.serialize {
            Some(serialize) => serialize(key, value).map_err(CacheError::serialization)?,
            None => value,
        };

        let now = self.config.clock.now();
        let expires_at = ttl.or(self.config.expiration).map(|d| now + d);

        let evicted = self
            .engine
            .lock()
            .insert(key.clone(), stored.clone(), expires_at, now);

        if let Some((evicted_key, evicted_value)) = &evicted
            && let Some(hook) = &self.config.evicted
        {
            hook(evicted_key, evicted_value);
        }
        if let Some(hook) = &self.config.added {
            hook(key, &stored);
        }
        Ok(())
    }
}

/// Concurrency-safe key→value cache with a fixed eviction policy.
///
/// Built by [`CacheBuilder`](crate::builder::CacheBuilder). Cloning the
/// handle is cheap and every clone operates on the same underlying cache.
///
/// # Example
///
/// ```
/// use hotcache::{Cache, CacheBuilder};
///
/// let cache: Cache<&str, i32> = CacheBuilder::new(2).lru().build().unwrap();
/// cache.set("a", 1).unwrap();
/// cache.set("b", 2).unwrap();
/// assert_eq!(cache.get(&"a").unwrap(), 1);
///
/// cache.set("c", 3).unwrap(); // evicts "b", the least recently used
/// assert!(cache.get(&"b").unwrap_err().is_key_not_found());
/// ```
pub struct Cache<K, V>
where
    K: Eq + Hash + Clone,
{
    shared: Arc<CacheShared<K, V>>,
}

impl<K, V> std::fmt::Debug for Cache<K, V>
where
    K: Eq + Hash + Clone,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache").finish_non_exhaustive()
    }
}

impl<K, V> Clone for Cache<K, V>
where
    K: Eq + Hash + Clone,
{
    fn clone(&self) -> Self {
        Cache {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<K, V> Cache<K, V>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    pub(crate) fn from_parts(engine: Engine<K, V>, config: CacheConfig<K, V>) -> Self {
        Cache {
            shared: Arc::new(CacheShared {
                engine: Mutex::new(engine),
                config,
                stats: CacheStats::new(),
                load_group: Arc::new(Group::new()),
            }),
        }
    }

    /// Installs or overwrites `key`, arming the default TTL if one is
    /// configured.
    pub fn set(&self, key: K, value: V) -> Result<(), CacheError> {
        self.shared.store(&key, value, None)
    }

    /// Installs or overwrites `key` with an explicit per-entry TTL.
    pub fn set_with_expire(&self, key: K, value: V, ttl: Duration) -> Result<(), CacheError> {
        self.shared.store(&key, value, Some(ttl))
    }

    /// Returns the value for `key`, loading it on a miss.
    ///
    /// A hit updates the policy's recency/frequency bookkeeping. On a miss
    /// with a configured loader, the caller joins the single-flight load
    /// for the key and blocks until it completes; without a loader the
    /// miss is reported as [`CacheError::KeyNotFound`].
    pub fn get(&self, key: &K) -> Result<V, CacheError> {
        match self.lookup_counted(key) {
            Lookup::Hit(value) => self.apply_deserialize(key, value),
            Lookup::Expired(..) | Lookup::Miss => self.load(key, true),
        }
    }

    /// Returns the value for `key` without ever blocking on a load.
    ///
    /// On a miss with a configured loader, the load is started (or joined)
    /// in the background and `KeyNotFound` is returned immediately; a
    /// later call can observe the loaded value.
    pub fn get_if_present(&self, key: &K) -> Result<V, CacheError> {
        match self.lookup_counted(key) {
            Lookup::Hit(value) => self.apply_deserialize(key, value),
            Lookup::Expired(..) | Lookup::Miss => self.load(key, false),
        }
    }

    /// Removes `key`, returning its value; `KeyNotFound` if absent.
    pub fn remove(&self, key: &K) -> Result<V, CacheError> {
        let removed = self.shared.engine.lock().remove(key);
        match removed {
            Some(value) => {
                if let Some(hook) = &self.shared.config.evicted {
                    hook(key, &value);
                }
                Ok(value)
            },
            None => Err(CacheError::KeyNotFound),
        }
    }

    /// Empties the cache, invoking the purge visitor for each entry.
    pub fn purge(&self) {
        let drained = self.shared.engine.lock().drain();
        if let Some(hook) = &self.shared.config.purge_visitor {
            for (key, value) in &drained {
                hook(key, value);
            }
        }
    }

    /// Snapshot of live keys; expired entries are skipped (but not
    /// removed), and recency/frequency state is untouched.
    pub fn keys(&self) -> Vec<K> {
        let now = self.shared.config.clock.now();
        self.shared.engine.lock().keys(now)
    }

    /// Snapshot of live entries with the deserialize hook applied;
    /// entries whose deserialization fails are skipped.
    pub fn get_all(&self) -> HashMap<K, V> {
        let now = self.shared.config.clock.now();
        let entries = self.shared.engine.lock().entries(now);
        let mut all = HashMap::with_capacity(entries.len());
        for (key, value) in entries {
            if let Ok(value) = self.apply_deserialize(&key, value) {
                all.insert(key, value);
            }
        }
        all
    }

    /// Number of resident entries (ARC ghosts excluded; entries whose TTL
    /// elapsed but were not yet observed still count).
    pub fn len(&self) -> usize {
        self.shared.engine.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Re-invokes the loader for every resident key through the
    /// single-flight layer and reinstalls the results.
    ///
    /// The first error encountered is returned after all keys have been
    /// attempted. Without a configured loader this is a no-op.
    pub fn refresh(&self) -> Result<(), CacheError> {
        if self.shared.config.loader.is_none() {
            return Ok(());
        }
        let mut first_error = None;
        for key in self.keys() {
            if let Err(err) = self.load(&key, true)
                && first_error.is_none()
            {
                first_error = Some(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Lookups that found a live entry.
    pub fn hit_count(&self) -> u64 {
        self.shared.stats.hit_count()
    }

    /// Lookups that reported `KeyNotFound` to the caller.
    pub fn miss_count(&self) -> u64 {
        self.shared.stats.miss_count()
    }

    /// `hit_count + miss_count`.
    pub fn lookup_count(&self) -> u64 {
        self.shared.stats.lookup_count()
    }

    /// `hit_count / lookup_count`, or `0.0` before any lookup.
    pub fn hit_rate(&self) -> f64 {
        self.shared.stats.hit_rate()
    }

    /// Engine lookup plus stats accounting and the expiry eviction hook.
    fn lookup_counted(&self, key: &K) -> Lookup<K, V> {
        let now = self.shared.config.clock.now();
        let outcome = self.shared.engine.lock().lookup(key, now);

        match &outcome {
            Lookup::Hit(_) => self.shared.stats.record_hit(),
            Lookup::Expired(..) | Lookup::Miss => self.shared.stats.record_miss(),
        }

        if let Lookup::Expired(expired_key, expired_value) = &outcome
            && let Some(hook) = &self.shared.config.evicted
        {
            hook(expired_key, expired_value);
        }
        outcome
    }

    /// Runs the configured loader for `key` through the single-flight
    /// group. Loads never touch the hit/miss counters.
    fn load(&self, key: &K, wait: bool) -> Result<V, CacheError> {
        let Some(loader) = self.shared.config.loader.clone() else {
            return Err(CacheError::KeyNotFound);
        };
        let shared = Arc::clone(&self.shared);
        let load_key = key.clone();
        let load = move || {
            let (value, ttl) = loader(&load_key).map_err(CacheError::loader)?;
            shared.store(&load_key, value.clone(), ttl)?;
            Ok(value)
        };
        Group::execute(&self.shared.load_group, key.clone(), load, wait)
            .map(|(value, _shared)| value)
    }

    fn apply_deserialize(&self, key: &K, value: V) -> Result<V, CacheError> {
        match &self.shared.config.deserialize {
            Some(deserialize) => deserialize(key, value).map_err(CacheError::serialization),
            None => Ok(value),
        }
    }
}
