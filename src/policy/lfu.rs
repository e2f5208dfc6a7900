//! LFU (Least Frequently Used) engine.
//!
//! Entries live in frequency buckets; the buckets form a doubly-linked list
//! in strictly increasing frequency, headed by a permanent sentinel at
//! `freq = 0`:
//!
//! ```text
//!   buckets:  [freq 0]* ◄──► [freq 2] ◄──► [freq 5]
//!                │               │             │
//!             {d, e}           {b}          {a, c}        * = sentinel
//!
//!   access(b): b moves from the freq-2 bucket to a freq-3 bucket,
//!              spliced in right after freq 2 (freq 2 empties and is
//!              unlinked, so the list stays strictly increasing).
//! ```
//!
//! New entries enter the sentinel, which makes a freshly inserted,
//! never-read entry the first eviction candidate. Eviction walks buckets
//! from the head (lowest frequency) and pops entries, oldest-inserted
//! first within a bucket.
//!
//! Items and their intra-bucket links live in a slot arena (`Vec` + free
//! list) and are addressed by index, so moves between buckets never
//! reallocate. Not thread-safe; the façade provides the lock.

use std::hash::Hash;
use std::time::Instant;

use rustc_hash::FxHashMap;

use crate::policy::Lookup;

/// Bucket slot index of the permanent freq-0 sentinel.
const SENTINEL: usize = 0;

#[derive(Debug)]
struct LfuEntry<K, V> {
    key: K,
    value: V,
    expires_at: Option<Instant>,
    bucket: usize,
}

impl<K, V> LfuEntry<K, V> {
    #[inline]
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at < now)
    }
}

#[derive(Debug)]
struct ItemSlot<K, V> {
    entry: Option<LfuEntry<K, V>>,
    prev: Option<usize>,
    next: Option<usize>,
}

#[derive(Debug)]
struct Bucket {
    freq: u64,
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Frequency-bucket engine: eviction takes from the lowest-frequency bucket.
#[derive(Debug)]
pub struct LfuEngine<K, V>
where
    K: Eq + Hash + Clone,
{
    map: FxHashMap<K, usize>,
    items: Vec<ItemSlot<K, V>>,
    item_free: Vec<usize>,
    buckets: Vec<Bucket>,
    bucket_free: Vec<usize>,
    capacity: usize,
}

impl<K, V> LfuEngine<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(capacity: usize) -> Self {
        Self {
            map: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
            items: Vec::with_capacity(capacity),
            item_free: Vec::new(),
            buckets: vec![Bucket {
                freq: 0,
                head: None,
                tail: None,
                len: 0,
                prev: None,
                next: None,
            }],
            bucket_free: Vec::new(),
            capacity,
        }
    }

    // -- slot management ----------------------------------------------------

    fn alloc_item(&mut self, entry: LfuEntry<K, V>) -> usize {
        if let Some(idx) = self.item_free.pop() {
            self.items[idx] = ItemSlot {
                entry: Some(entry),
                prev: None,
                next: None,
            };
            idx
        } else {
            self.items.push(ItemSlot {
                entry: Some(entry),
                prev: None,
                next: None,
            });
            self.items.len() - 1
        }
    }

    fn free_item(&mut self, idx: usize) -> LfuEntry<K, V> {
        let entry = self.items[idx].entry.take().expect("lfu entry missing");
        self.items[idx].prev = None;
        self.items[idx].next = None;
        self.item_free.push(idx);
        entry
    }

    /// Splices a fresh bucket with `freq` immediately after `after`.
    fn alloc_bucket_after(&mut self, after: usize, freq: u64) -> usize {
        let next = self.buckets[after].next;
        let bucket = Bucket {
            freq,
            head: None,
            tail: None,
            len: 0,
            prev: Some(after),
            next,
        };
        let idx = if let Some(idx) = self.bucket_free.pop() {
            self.buckets[idx] = bucket;
            idx
        } else {
            self.buckets.push(bucket);
            self.buckets.len() - 1
        };
        self.buckets[after].next = Some(idx);
        if let Some(n) = next {
            self.buckets[n].prev = Some(idx);
        }
        idx
    }

    /// Unlinks an emptied non-sentinel bucket.
    fn unlink_bucket(&mut self, idx: usize) {
        debug_assert_ne!(idx, SENTINEL, "sentinel bucket must never be unlinked");
        let prev = self.buckets[idx].prev;
        let next = self.buckets[idx].next;
        if let Some(p) = prev {
            self.buckets[p].next = next;
        }
        if let Some(n) = next {
            self.buckets[n].prev = prev;
        }
        self.buckets[idx].prev = None;
        self.buckets[idx].next = None;
        self.bucket_free.push(idx);
    }

    // -- intra-bucket item lists --------------------------------------------

    fn bucket_push_front(&mut self, bucket: usize, idx: usize) {
        let old_head = self.buckets[bucket].head;
        self.items[idx].prev = None;
        self.items[idx].next = old_head;
        if let Some(h) = old_head {
            self.items[h].prev = Some(idx);
        } else {
            self.buckets[bucket].tail = Some(idx);
        }
        self.buckets[bucket].head = Some(idx);
        self.buckets[bucket].len += 1;
    }

    fn bucket_unlink_item(&mut self, bucket: usize, idx: usize) {
        let prev = self.items[idx].prev;
        let next = self.items[idx].next;
        if let Some(p) = prev {
            self.items[p].next = next;
        } else {
            self.buckets[bucket].head = next;
        }
        if let Some(n) = next {
            self.items[n].prev = prev;
        } else {
            self.buckets[bucket].tail = prev;
        }
        self.items[idx].prev = None;
        self.items[idx].next = None;
        self.buckets[bucket].len -= 1;
    }

    // -- core operations ----------------------------------------------------

    /// Moves an item to the `freq + 1` bucket, splicing one in if needed.
    fn touch(&mut self, idx: usize) {
        let cur = self.items[idx]
            .entry
            .as_ref()
            .expect("lfu entry missing")
            .bucket;
        let target_freq = self.buckets[cur].freq + 1;

        let target = match self.buckets[cur].next {
            Some(n) if self.buckets[n].freq == target_freq => n,
            _ => self.alloc_bucket_after(cur, target_freq),
        };

        self.bucket_unlink_item(cur, idx);
        if self.buckets[cur].len == 0 && cur != SENTINEL {
            self.unlink_bucket(cur);
        }
        self.bucket_push_front(target, idx);
        self.items[idx]
            .entry
            .as_mut()
            .expect("lfu entry missing")
            .bucket = target;
    }

    /// Unlinks an item from its bucket, the map, and the arena.
    fn remove_item(&mut self, idx: usize) -> LfuEntry<K, V> {
        let bucket = self.items[idx]
            .entry
            .as_ref()
            .expect("lfu entry missing")
            .bucket;
        self.bucket_unlink_item(bucket, idx);
        if self.buckets[bucket].len == 0 && bucket != SENTINEL {
            self.unlink_bucket(bucket);
        }
        let entry = self.free_item(idx);
        self.map.remove(&entry.key);
        entry
    }

    /// Pops from the lowest-frequency non-empty bucket, oldest item first.
    fn evict_one(&mut self) -> Option<(K, V)> {
        let mut cur = Some(SENTINEL);
        while let Some(b) = cur {
            if let Some(idx) = self.buckets[b].tail {
                let entry = self.remove_item(idx);
                return Some((entry.key, entry.value));
            }
            cur = self.buckets[b].next;
        }
        None
    }

    /// Looks up `key`; a hit bumps its frequency, an expired entry is
    /// removed and handed back.
    pub fn lookup(&mut self, key: &K, now: Instant) -> Lookup<K, V> {
        let idx = match self.map.get(key) {
            Some(&idx) => idx,
            None => return Lookup::Miss,
        };

        let expired = self.items[idx]
            .entry
            .as_ref()
            .expect("lfu entry missing")
            .is_expired(now);
        if expired {
            let entry = self.remove_item(idx);
            return Lookup::Expired(entry.key, entry.value);
        }

        self.touch(idx);
        let value = self.items[idx]
            .entry
            .as_ref()
            .expect("lfu entry missing")
            .value
            .clone();
        Lookup::Hit(value)
    }

    /// Installs or overwrites `key`.
    ///
    /// A new entry starts in the sentinel (freq 0) bucket; overwriting
    /// leaves the frequency unchanged. `expires_at: Some` (re)arms the TTL;
    /// `None` keeps an existing entry's TTL. Returns the entry evicted to
    /// make room, if the cache was full.
    pub fn insert(&mut self, key: K, value: V, expires_at: Option<Instant>) -> Option<(K, V)> {
        if let Some(&idx) = self.map.get(&key) {
            let entry = self.items[idx].entry.as_mut().expect("lfu entry missing");
            entry.value = value;
            if expires_at.is_some() {
                entry.expires_at = expires_at;
            }
            return None;
        }

        if self.capacity == 0 {
            return None;
        }

        let mut evicted = None;
        if self.map.len() >= self.capacity {
            evicted = self.evict_one();
        }

        let idx = self.alloc_item(LfuEntry {
            key: key.clone(),
            value,
            expires_at,
            bucket: SENTINEL,
        });
        self.bucket_push_front(SENTINEL, idx);
        self.map.insert(key, idx);
        evicted
    }

    /// Removes `key`, returning its value if present.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let idx = match self.map.get(key) {
            Some(&idx) => idx,
            None => return None,
        };
        Some(self.remove_item(idx).value)
    }

    /// Access frequency of `key` (0 for never-read entries).
    pub fn frequency(&self, key: &K) -> Option<u64> {
        let &idx = self.map.get(key)?;
        let bucket = self.items[idx].entry.as_ref()?.bucket;
        Some(self.buckets[bucket].freq)
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
            .values()
            .filter_map(|&idx| {
                let entry = self.items[idx].entry.as_ref()?;
                (!entry.is_expired(now)).then(|| entry.key.clone())
            })
            .collect()
    }

    /// Snapshot of unexpired entries.
    pub fn entries(&self, now: Instant) -> Vec<(K, V)> {
        self.map
            .values()
            .filter_map(|&idx| {
                let entry = self.items[idx].entry.as_ref()?;
                (!entry.is_expired(now)).then(|| (entry.key.clone(), entry.value.clone()))
            })
            .collect()
    }

    /// Removes and returns everything, lowest frequency first.
    pub fn drain(&mut self) -> Vec<(K, V)> {
        let mut drained = Vec::with_capacity(self.map.len());
        while let Some(pair) = self.evict_one() {
            drained.push(pair);
        }
        drained
    }

    /// Validates bucket-list invariants; panics on violation.
    #[cfg(any(test, debug_assertions))]
    pub fn debug_validate_invariants(&self) {
        assert_eq!(self.buckets[SENTINEL].freq, 0, "sentinel freq must be 0");
        assert!(
            self.buckets[SENTINEL].prev.is_none(),
            "sentinel must head the bucket list"
        );

        let mut total = 0usize;
        let mut last_freq: Option<u64> = None;
        let mut cur = Some(SENTINEL);
        let mut hops = 0usize;
        while let Some(b) = cur {
            hops += 1;
            assert!(hops <= self.buckets.len(), "cycle in bucket list");

            let bucket = &self.buckets[b];
            if let Some(prev_freq) = last_freq {
                assert!(
                    bucket.freq > prev_freq,
                    "bucket freqs not strictly increasing: {} after {}",
                    bucket.freq,
                    prev_freq
                );
            }
            last_freq = Some(bucket.freq);

            if b != SENTINEL {
                assert!(bucket.len > 0, "empty non-sentinel bucket retained");
            }

            let mut count = 0usize;
            let mut item = bucket.head;
            while let Some(idx) = item {
                count += 1;
                assert!(count <= bucket.len, "cycle in bucket item list");
                let entry = self.items[idx].entry.as_ref().expect("lfu entry missing");
                assert_eq!(entry.bucket, b, "entry points at wrong bucket");
                assert_eq!(
                    self.map.get(&entry.key),
                    Some(&idx),
                    "map does not point back at entry"
                );
                item = self.items[idx].next;
            }
            assert_eq!(count, bucket.len, "bucket len mismatch");
            total += count;

            cur = bucket.next;
        }

        assert_eq!(total, self.map.len(), "bucketed items != map entries");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn now() -> Instant {
        Instant::now()
    }

    #[test]
    fn fresh_entries_start_at_freq_zero() {
        let mut engine = LfuEngine::new(4);
        engine.insert("a", 1, None);
        assert_eq!(engine.frequency(&"a"), Some(0));

        engine.lookup(&"a", now());
        assert_eq!(engine.frequency(&"a"), Some(1));
        engine.lookup(&"a", now());
        assert_eq!(engine.frequency(&"a"), Some(2));
        engine.debug_validate_invariants();
    }

    #[test]
    fn eviction_prefers_lowest_frequency() {
        let mut engine = LfuEngine::new(2);
        engine.insert("a", 1, None);
        engine.insert("b", 2, None);
        engine.lookup(&"a", now());
        engine.lookup(&"a", now());

        // "b" was never read: it sits in the sentinel and goes first.
        let evicted = engine.insert("c", 3, None);
        assert_eq!(evicted, Some(("b", 2)));
        assert_eq!(engine.lookup(&"a", now()), Lookup::Hit(1));
        assert_eq!(engine.lookup(&"c", now()), Lookup::Hit(3));
        engine.debug_validate_invariants();
    }

    #[test]
    fn read_entry_survives_unread_peers() {
        let mut engine = LfuEngine::new(3);
        engine.insert("hot", 0, None);
        engine.lookup(&"hot", now());
        engine.insert("x", 1, None);
        engine.insert("y", 2, None);

        let evicted = engine.insert("z", 3, None);
        let (victim, _) = evicted.expect("full cache must evict");
        assert_ne!(victim, "hot");
        engine.debug_validate_invariants();
    }

    #[test]
    fn overwrite_does_not_change_frequency() {
        let mut engine = LfuEngine::new(4);
        engine.insert("a", 1, None);
        engine.lookup(&"a", now());
        engine.insert("a", 10, None);
        assert_eq!(engine.frequency(&"a"), Some(1));
        assert_eq!(engine.lookup(&"a", now()), Lookup::Hit(10));
    }

    #[test]
    fn bucket_splice_keeps_freqs_strictly_increasing() {
        let mut engine = LfuEngine::new(8);
        for key in ["a", "b", "c", "d"] {
            engine.insert(key, 0, None);
        }
        // Drive keys to different frequencies in interleaved order.
        for _ in 0..3 {
            engine.lookup(&"a", now());
        }
        engine.lookup(&"b", now());
        engine.lookup(&"c", now());
        engine.lookup(&"b", now());
        engine.debug_validate_invariants();

        assert_eq!(engine.frequency(&"a"), Some(3));
        assert_eq!(engine.frequency(&"b"), Some(2));
        assert_eq!(engine.frequency(&"c"), Some(1));
        assert_eq!(engine.frequency(&"d"), Some(0));
    }

    #[test]
    fn expired_entry_reported_and_removed() {
        let t0 = now();
        let mut engine = LfuEngine::new(4);
        engine.insert("k", 7, Some(t0 + Duration::from_millis(10)));
        engine.lookup(&"k", t0);

        let later = t0 + Duration::from_millis(11);
        assert_eq!(engine.lookup(&"k", later), Lookup::Expired("k", 7));
        assert_eq!(engine.len(), 0);
        engine.debug_validate_invariants();
    }

    #[test]
    fn eviction_drains_bucket_before_advancing() {
        let mut engine = LfuEngine::new(3);
        engine.insert("a", 1, None);
        engine.insert("b", 2, None);
        engine.insert("c", 3, None);
        engine.lookup(&"c", now());

        // Sentinel holds {a, b}; both must go before "c" is touched.
        let first = engine.insert("d", 4, None).expect("evicts");
        let second = engine.insert("e", 5, None).expect("evicts");
        let mut victims = [first.0, second.0];
        victims.sort_unstable();
        assert_eq!(victims, ["a", "b"]);
        assert_eq!(engine.lookup(&"c", now()), Lookup::Hit(3));
        engine.debug_validate_invariants();
    }

    #[test]
    fn remove_and_drain() {
        let mut engine = LfuEngine::new(4);
        engine.insert("a", 1, None);
        engine.insert("b", 2, None);
        engine.lookup(&"b", now());

        assert_eq!(engine.remove(&"a"), Some(1));
        assert_eq!(engine.remove(&"a"), None);
        engine.debug_validate_invariants();

        let drained = engine.drain();
        assert_eq!(drained, vec![("b", 2)]);
        assert!(engine.is_empty());
        engine.debug_validate_invariants();
    }

    #[test]
    fn slot_reuse_after_churn() {
        let mut engine = LfuEngine::new(2);
        for round in 0..10 {
            engine.insert(round, round, None);
            engine.lookup(&round, now());
        }
        assert_eq!(engine.len(), 2);
        // The arena reuses freed slots instead of growing per insert.
        assert!(engine.items.len() <= 4);
        engine.debug_validate_invariants();
    }
}
