//! Fluent cache builder for all eviction policies.
//!
//! ```
//! use std::time::Duration;
//! use hotcache::{Cache, CacheBuilder};
//!
//! let cache: Cache<String, String> = CacheBuilder::new(1024)
//!     .arc()
//!     .expiration(Duration::from_secs(60))
//!     .loader(|key: &String| Ok(format!("value for {key}")))
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(cache.get(&"x".to_string()).unwrap(), "value for x");
//! ```

use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{Cache, CacheConfig, Engine, SharedHook, SharedLoader, SharedTransform};
use crate::clock::{Clock, RealClock};
use crate::error::{ConfigError, DynError};
use crate::policy::arc::ArcEngine;
use crate::policy::lfu::LfuEngine;
use crate::policy::lru::LruEngine;
use crate::policy::simple::SimpleEngine;

/// Available eviction policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionPolicy {
    /// Unbounded / soft-capacity map with expired-entry scan eviction.
    Simple,
    /// Least Recently Used.
    Lru,
    /// Least Frequently Used (frequency buckets).
    Lfu,
    /// Adaptive Replacement Cache.
    Arc,
}

/// Builder for [`Cache`] instances.
///
/// Defaults: [`EvictionPolicy::Simple`], wall clock, no loader, no hooks,
/// no default TTL.
pub struct CacheBuilder<K, V> {
    capacity: usize,
    policy: EvictionPolicy,
    loader: Option<SharedLoader<K, V>>,
    evicted: Option<SharedHook<K, V>>,
    added: Option<SharedHook<K, V>>,
    purge_visitor: Option<SharedHook<K, V>>,
    serialize: Option<SharedTransform<K, V>>,
    deserialize: Option<SharedTransform<K, V>>,
    expiration: Option<Duration>,
    clock: Arc<dyn Clock>,
}

impl<K, V> CacheBuilder<K, V> {
    /// Starts a builder for a cache holding up to `capacity` entries.
    ///
    /// For the Simple policy a capacity of 0 means unbounded; the bounded
    /// policies reject it at [`build`](Self::build) time.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            policy: EvictionPolicy::Simple,
            loader: None,
            evicted: None,
            added: None,
            purge_visitor: None,
            serialize: None,
            deserialize: None,
            expiration: None,
            clock: Arc::new(RealClock),
        }
    }

    /// Selects a policy explicitly.
    pub fn eviction_policy(mut self, policy: EvictionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Selects the Simple policy (the default).
    pub fn simple(self) -> Self {
        self.eviction_policy(EvictionPolicy::Simple)
    }

    /// Selects the LRU policy.
    pub fn lru(self) -> Self {
        self.eviction_policy(EvictionPolicy::Lru)
    }

    /// Selects the LFU policy.
    pub fn lfu(self) -> Self {
        self.eviction_policy(EvictionPolicy::Lfu)
    }

    /// Selects the ARC policy.
    pub fn arc(self) -> Self {
        self.eviction_policy(EvictionPolicy::Arc)
    }

    /// Sets a loader invoked on misses; loaded values never expire unless
    /// a default [`expiration`](Self::expiration) is configured.
    pub fn loader<F>(self, loader: F) -> Self
    where
        F: Fn(&K) -> Result<V, DynError> + Send + Sync + 'static,
    {
        self.loader_expire(move |key| loader(key).map(|value| (value, None)))
    }

    /// Sets a loader that also decides each loaded value's TTL; `None`
    /// falls back to the default expiration.
    pub fn loader_expire<F>(mut self, loader: F) -> Self
    where
        F: Fn(&K) -> Result<(V, Option<Duration>), DynError> + Send + Sync + 'static,
    {
        self.loader = Some(Arc::new(loader));
        self
    }

    /// Hook invoked when an entry's value is discarded by the engine
    /// (policy eviction or TTL expiry observed on access) or by `remove`.
    pub fn evicted_fn<F>(mut self, hook: F) -> Self
    where
        F: Fn(&K, &V) + Send + Sync + 'static,
    {
        self.evicted = Some(Arc::new(hook));
        self
    }

    /// Hook invoked after an entry is installed.
    pub fn added_fn<F>(mut self, hook: F) -> Self
    where
        F: Fn(&K, &V) + Send + Sync + 'static,
    {
        self.added = Some(Arc::new(hook));
        self
    }

    /// Hook invoked for each entry drained by `purge`.
    pub fn purge_visitor_fn<F>(mut self, hook: F) -> Self
    where
        F: Fn(&K, &V) + Send + Sync + 'static,
    {
        self.purge_visitor = Some(Arc::new(hook));
        self
    }

    /// Value transform applied before an entry is stored.
    pub fn serialize_fn<F>(mut self, transform: F) -> Self
    where
        F: Fn(&K, V) -> Result<V, DynError> + Send + Sync + 'static,
    {
        self.serialize = Some(Arc::new(transform));
        self
    }

    /// Value transform applied when an entry is read.
    pub fn deserialize_fn<F>(mut self, transform: F) -> Self
    where
        F: Fn(&K, V) -> Result<V, DynError> + Send + Sync + 'static,
    {
        self.deserialize = Some(Arc::new(transform));
        self
    }

    /// Default TTL for entries installed without an explicit one.
    pub fn expiration(mut self, ttl: Duration) -> Self {
        self.expiration = Some(ttl);
        self
    }

    /// Replaces the time source (e.g. with a
    /// [`FakeClock`](crate::clock::FakeClock) in tests).
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

impl<K, V> CacheBuilder<K, V>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    /// Builds the cache, validating the configuration.
    pub fn build(self) -> Result<Cache<K, V>, ConfigError> {
        let CacheBuilder {
            capacity,
            policy,
            loader,
            evicted,
            added,
            purge_visitor,
            serialize,
            deserialize,
            expiration,
            clock,
        } = self;

        if capacity == 0 && policy != EvictionPolicy::Simple {
            return Err(ConfigError::new(format!(
                "invalid cache capacity 0 for {policy:?} policy"
            )));
        }

        let engine = match policy {
            EvictionPolicy::Simple => Engine::Simple(SimpleEngine::new(capacity)),
            EvictionPolicy::Lru => Engine::Lru(LruEngine::new(capacity)),
            EvictionPolicy::Lfu => Engine::Lfu(LfuEngine::new(capacity)),
            EvictionPolicy::Arc => Engine::Arc(ArcEngine::new(capacity)),
        };

        let config = CacheConfig {
            loader,
            evicted,
            added,
            purge_visitor,
            serialize,
            deserialize,
            expiration,
            clock,
        };

        Ok(Cache::from_parts(engine, config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_policies_build_and_round_trip() {
        for policy in [
            EvictionPolicy::Simple,
            EvictionPolicy::Lru,
            EvictionPolicy::Lfu,
            EvictionPolicy::Arc,
        ] {
            let cache: Cache<u64, String> = CacheBuilder::new(10)
                .eviction_policy(policy)
                .build()
                .unwrap();

            cache.set(1, "one".to_string()).unwrap();
            cache.set(2, "two".to_string()).unwrap();
            assert_eq!(cache.get(&1).unwrap(), "one");
            assert_eq!(cache.get(&2).unwrap(), "two");
            assert!(cache.get(&3).unwrap_err().is_key_not_found());
            assert_eq!(cache.len(), 2);

            cache.set(1, "ONE".to_string()).unwrap();
            assert_eq!(cache.get(&1).unwrap(), "ONE");

            cache.purge();
            assert!(cache.is_empty());
        }
    }

    #[test]
    fn zero_capacity_rejected_for_bounded_policies() {
        for policy in [EvictionPolicy::Lru, EvictionPolicy::Lfu, EvictionPolicy::Arc] {
            let err = CacheBuilder::<u64, u64>::new(0)
                .eviction_policy(policy)
                .build()
                .unwrap_err();
            assert!(err.message().contains("capacity"));
        }
    }

    #[test]
    fn zero_capacity_simple_is_unbounded() {
        let cache: Cache<u64, u64> = CacheBuilder::new(0).build().unwrap();
        for k in 0..100 {
            cache.set(k, k).unwrap();
        }
        assert_eq!(cache.len(), 100);
    }

    #[test]
    fn default_policy_is_simple() {
        let builder: CacheBuilder<u64, u64> = CacheBuilder::new(4);
        assert_eq!(builder.policy, EvictionPolicy::Simple);
    }
}
