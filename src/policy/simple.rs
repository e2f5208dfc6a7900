//! Unbounded / soft-capacity map engine.
//!
//! The simplest policy: a key map with no ordering structure. A capacity of
//! 0 means unbounded. When a bounded cache is full, insertion scans for an
//! expired entry and removes the first one found; if nothing has expired
//! the insert proceeds anyway, so capacity is a soft bound. TTL is checked
//! lazily on access, like every other engine.

use std::hash::Hash;
use std::time::Instant;

use rustc_hash::FxHashMap;

use crate::policy::Lookup;

#[derive(Debug)]
struct SimpleEntry<V> {
    value: V,
    expires_at: Option<Instant>,
}

impl<V> SimpleEntry<V> {
    #[inline]
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at < now)
    }
}

/// Map-backed engine with opportunistic eviction of expired entries.
#[derive(Debug)]
pub struct SimpleEngine<K, V>
where
    K: Eq + Hash + Clone,
{
    map: FxHashMap<K, SimpleEntry<V>>,
    capacity: usize,
}

impl<K, V> SimpleEngine<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Creates an engine; `capacity` 0 means unbounded.
    pub fn new(capacity: usize) -> Self {
        Self {
            map: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
            capacity,
        }
    }

    /// Looks up `key`, removing it if expired.
    pub fn lookup(&mut self, key: &K, now: Instant) -> Lookup<K, V> {
        if let Some(entry) = self.map.get(key) {
            if !entry.is_expired(now) {
                return Lookup::Hit(entry.value.clone());
            }
        } else {
            return Lookup::Miss;
        }
        let (key, entry) = self
            .map
            .remove_entry(key)
            .expect("present entry vanished during lookup");
        Lookup::Expired(key, entry.value)
    }

    /// Installs or overwrites `key`.
    ///
    /// `expires_at: Some` (re)arms the entry's TTL; `None` leaves an
    /// existing entry's TTL untouched. Returns the entry removed by the
    /// eviction scan, if any.
    pub fn insert(
        &mut self,
        key: K,
        value: V,
        expires_at: Option<Instant>,
        now: Instant,
    ) -> Option<(K, V)> {
        if let Some(entry) = self.map.get_mut(&key) {
            entry.value = value;
            if expires_at.is_some() {
                entry.expires_at = expires_at;
            }
            return None;
        }

        let mut evicted = None;
        if self.capacity > 0 && self.map.len() >= self.capacity {
            evicted = self.evict_expired(now);
        }
        self.map.insert(key, SimpleEntry { value, expires_at });
        evicted
    }

    /// Removes the first expired entry found by a map scan.
    fn evict_expired(&mut self, now: Instant) -> Option<(K, V)> {
        let victim = self
            .map
            .iter()
            .find(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())?;
        let entry = self.map.remove(&victim)?;
        Some((victim, entry.value))
    }

    /// Removes `key`, returning its value if present.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.map.remove(key).map(|entry| entry.value)
    }

    /// Number of entries, including not-yet-observed expired ones.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Snapshot of unexpired keys.
    pub fn keys(&self, now: Instant) -> Vec<K> {
        self.map
            .iter()
            .filter(|(_, entry)| !entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Snapshot of unexpired entries.
    pub fn entries(&self, now: Instant) -> Vec<(K, V)> {
        self.map
            .iter()
            .filter(|(_, entry)| !entry.is_expired(now))
            .map(|(key, entry)| (key.clone(), entry.value.clone()))
            .collect()
    }

    /// Removes and returns everything.
    pub fn drain(&mut self) -> Vec<(K, V)> {
        self.map
            .drain()
            .map(|(key, entry)| (key, entry.value))
            .collect()
    }
}
