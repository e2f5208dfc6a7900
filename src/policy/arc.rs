//! ARC (Adaptive Replacement Cache) engine.
//!
//! Balances recency against frequency by keeping four lists and a tunable
//! split parameter:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                        ArcEngine<K, V> Layout                        │
//! │                                                                      │
//! │   map: FxHashMap<K, NonNull<Node>>  — covers all four lists          │
//! │                                                                      │
//! │   T1 (resident, recency)            T2 (resident, frequency)         │
//! │   ┌────────────────────────┐        ┌────────────────────────┐       │
//! │   │ MRU ──► ... ──► LRU    │        │ MRU ──► ... ──► LRU    │       │
//! │   └────────────────────────┘        └────────────────────────┘       │
//! │              │ demote                          │ demote              │
//! │              ▼                                 ▼                     │
//! │   B1 (ghost of T1)                  B2 (ghost of T2)                 │
//! │   ┌────────────────────────┐        ┌────────────────────────┐       │
//! │   │ keys only, value=None  │        │ keys only, value=None  │       │
//! │   └────────────────────────┘        └────────────────────────┘       │
//! │                                                                      │
//! │   p ∈ [0, c] — target size of T1                                     │
//! │   • request found in B1 → p grows  (recency is winning)              │
//! │   • request found in B2 → p shrinks (frequency is winning)           │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A node never changes identity: demotion to a ghost just drops its value
//! and relinks it into B1/B2, so a later request for the same key is
//! recognized and feeds the adaptation of `p`. Ghosts falling off the LRU
//! end of B1/B2 leave the key map entirely.
//!
//! Size invariants, maintained after every operation:
//!
//! - `|T1| + |T2| ≤ c` (resident entries)
//! - `|T1| + |B1| ≤ c`
//! - `|T2| + |B2| ≤ 2c`
//! - `|T1| + |T2| + |B1| + |B2| ≤ 2c`
//!
//! `debug_validate_invariants()` checks all of these plus list/map
//! consistency in debug and test builds.
//!
//! Not thread-safe; the façade provides the lock.
//!
//! ## References
//!
//! - Megiddo & Modha, "ARC: A Self-Tuning, Low Overhead Replacement
//!   Cache", FAST 2003

use std::hash::Hash;
use std::ptr::NonNull;
use std::time::Instant;

use rustc_hash::FxHashMap;

use crate::policy::Lookup;

/// Which of the four lists a node is linked into.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum ListKind {
    T1,
    T2,
    B1,
    B2,
}

struct Node<K, V> {
    prev: Option<NonNull<Node<K, V>>>,
    next: Option<NonNull<Node<K, V>>>,
    list: ListKind,
    key: K,
    /// `None` ⇔ ghost (node lives in B1/B2).
    value: Option<V>,
    expires_at: Option<Instant>,
}

impl<K, V> Node<K, V> {
    #[inline]
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at < now)
    }
}

#[derive(Debug)]
struct ListEnds<K, V> {
    head: Option<NonNull<Node<K, V>>>,
    tail: Option<NonNull<Node<K, V>>>,
    len: usize,
}

impl<K, V> Default for ListEnds<K, V> {
    fn default() -> Self {
        Self {
            head: None,
            tail: None,
            len: 0,
        }
    }
}

/// Adaptive engine: T1/T2 resident lists, B1/B2 ghost lists, split `p`.
pub struct ArcEngine<K, V>
where
    K: Eq + Hash + Clone,
{
    map: FxHashMap<K, NonNull<Node<K, V>>>,
    t1: ListEnds<K, V>,
    t2: ListEnds<K, V>,
    b1: ListEnds<K, V>,
    b2: ListEnds<K, V>,
    /// Target size of T1.
    p: usize,
    capacity: usize,
}

// SAFETY: the raw pointers only reference heap nodes owned by this struct;
// moving the struct between threads moves ownership of all of them.
unsafe impl<K, V> Send for ArcEngine<K, V>
where
    K: Eq + Hash + Clone + Send,
    V: Send,
{
}

// SAFETY: shared access never mutates through the pointers without &mut.
unsafe impl<K, V> Sync for ArcEngine<K, V>
where
    K: Eq + Hash + Clone + Sync,
    V: Sync,
{
}

impl<K, V> ArcEngine<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Creates an engine with `capacity` resident slots. Starts with all
    /// lists empty and `p = 0`.
    pub fn new(capacity: usize) -> Self {
        Self {
            map: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
            t1: ListEnds::default(),
            t2: ListEnds::default(),
            b1: ListEnds::default(),
            b2: ListEnds::default(),
            p: 0,
            capacity,
        }
    }

    #[inline]
    fn list(&self, kind: ListKind) -> &ListEnds<K, V> {
        match kind {
            ListKind::T1 => &self.t1,
            ListKind::T2 => &self.t2,
            ListKind::B1 => &self.b1,
            ListKind::B2 => &self.b2,
        }
    }

    #[inline]
    fn list_mut(&mut self, kind: ListKind) -> &mut ListEnds<K, V> {
        match kind {
            ListKind::T1 => &mut self.t1,
            ListKind::T2 => &mut self.t2,
            ListKind::B1 => &mut self.b1,
            ListKind::B2 => &mut self.b2,
        }
    }

    /// Detach a node from whichever list it is linked into.
    #[inline(always)]
    fn detach(&mut self, node_ptr: NonNull<Node<K, V>>) {
        unsafe {
            let node = node_ptr.as_ref();
            let prev = node.prev;
            let next = node.next;
            let ends = self.list_mut(node.list);

            match prev {
                Some(mut p) => p.as_mut().next = next,
                None => ends.head = next,
            }

            match next {
                Some(mut n) => n.as_mut().prev = prev,
                None => ends.tail = prev,
            }

            ends.len -= 1;
        }
    }

    /// Attach a node at the MRU end of `kind`.
    #[inline(always)]
    fn attach_mru(&mut self, mut node_ptr: NonNull<Node<K, V>>, kind: ListKind) {
        unsafe {
            let ends = self.list_mut(kind);
            let old_head = ends.head;

            {
                let node = node_ptr.as_mut();
                node.prev = None;
                node.next = old_head;
                node.list = kind;
            }

            let ends = self.list_mut(kind);
            match old_head {
                Some(mut h) => h.as_mut().prev = Some(node_ptr),
                None => ends.tail = Some(node_ptr),
            }

            ends.head = Some(node_ptr);
            ends.len += 1;
        }
    }

    /// Demotes the LRU resident of `from` into a ghost at the MRU end of
    /// `to`, returning the discarded entry.
    fn demote_lru(&mut self, from: ListKind, to: ListKind) -> Option<(K, V)> {
        let victim = self.list(from).tail?;
        self.detach(victim);
        let discarded = unsafe {
            let node = &mut *victim.as_ptr();
            let value = node.value.take().expect("resident node without value");
            node.expires_at = None;
            (node.key.clone(), value)
        };
        self.attach_mru(victim, to);
        Some(discarded)
    }

    /// Deletes the LRU ghost of `kind` from the key map entirely.
    fn drop_lru_ghost(&mut self, kind: ListKind) {
        if let Some(victim) = self.list(kind).tail {
            self.detach(victim);
            let node = unsafe { Box::from_raw(victim.as_ptr()) };
            self.map.remove(&node.key);
        }
    }

    /// Deletes the LRU resident of `kind` outright (no ghost is created).
    fn drop_lru_resident(&mut self, kind: ListKind) -> Option<(K, V)> {
        let victim = self.list(kind).tail?;
        self.detach(victim);
        let node = unsafe { Box::from_raw(victim.as_ptr()) };
        self.map.remove(&node.key);
        let value = node.value.expect("resident node without value");
        Some((node.key, value))
    }

    /// Core eviction routine: picks the victim side from the split `p`.
    ///
    /// `in_b2` is true when the request being served hit in B2.
    fn replace(&mut self, in_b2: bool) -> Option<(K, V)> {
        let from_t1 =
            self.t1.len > 0 && (self.t1.len > self.p || (in_b2 && self.t1.len == self.p));
        if from_t1 {
            self.demote_lru(ListKind::T1, ListKind::B1)
        } else {
            self.demote_lru(ListKind::T2, ListKind::B2)
        }
    }

    /// Looks up `key`. Resident hits move to the MRU end of T2; ghosts
    /// report `Miss`; expired residents are deleted and handed back.
    pub fn lookup(&mut self, key: &K, now: Instant) -> Lookup<K, V> {
        let node_ptr = match self.map.get(key) {
            Some(&ptr) => ptr,
            None => return Lookup::Miss,
        };

        let (is_ghost, expired) = unsafe {
            let node = node_ptr.as_ref();
            (node.value.is_none(), node.is_expired(now))
        };

        if is_ghost {
            return Lookup::Miss;
        }

        if expired {
            self.detach(node_ptr);
            let node = unsafe { Box::from_raw(node_ptr.as_ptr()) };
            self.map.remove(&node.key);
            let value = node.value.expect("resident node without value");
            return Lookup::Expired(node.key, value);
        }

        self.detach(node_ptr);
        self.attach_mru(node_ptr, ListKind::T2);

        let value = unsafe {
            node_ptr
                .as_ref()
                .value
                .clone()
                .expect("resident node without value")
        };
        Lookup::Hit(value)
    }

    /// Installs or overwrites `key`.
    ///
    /// A key found in B1/B2 is resurrected through the ghost-hit path,
    /// adapting `p` before `replace` makes room. Returns the entry whose
    /// value was discarded to make room, if any.
    pub fn insert(&mut self, key: K, value: V, expires_at: Option<Instant>) -> Option<(K, V)> {
        if self.capacity == 0 {
            return None;
        }

        if let Some(&node_ptr) = self.map.get(&key) {
            let list = unsafe { node_ptr.as_ref().list };
            return match list {
                ListKind::T1 | ListKind::T2 => {
                    unsafe {
                        let node = &mut *node_ptr.as_ptr();
                        node.value = Some(value);
                        if expires_at.is_some() {
                            node.expires_at = expires_at;
                        }
                    }
                    self.detach(node_ptr);
                    self.attach_mru(node_ptr, ListKind::T2);
                    None
                },
                ListKind::B1 => {
                    // Recency signal: a key evicted from T1 came back.
                    let delta = if self.b1.len >= self.b2.len {
                        1
                    } else {
                        (self.b2.len / self.b1.len).max(1)
                    };
                    self.p = (self.p + delta).min(self.capacity);

                    let evicted = self.replace(false);
                    unsafe {
                        let node = &mut *node_ptr.as_ptr();
                        node.value = Some(value);
                        node.expires_at = expires_at;
                    }
                    self.detach(node_ptr);
                    self.attach_mru(node_ptr, ListKind::T2);
                    evicted
                },
                ListKind::B2 => {
                    // Frequency signal: a key evicted from T2 came back.
                    let delta = if self.b2.len >= self.b1.len {
                        1
                    } else {
                        (self.b1.len / self.b2.len).max(1)
                    };
                    self.p = self.p.saturating_sub(delta);

                    let evicted = self.replace(true);
                    unsafe {
                        let node = &mut *node_ptr.as_ptr();
                        node.value = Some(value);
                        node.expires_at = expires_at;
                    }
                    self.detach(node_ptr);
                    self.attach_mru(node_ptr, ListKind::T2);
                    evicted
                },
            };
        }

        // Entirely new key.
        let l1 = self.t1.len + self.b1.len;
        let l2 = self.t2.len + self.b2.len;
        let mut evicted = None;
        if l1 == self.capacity {
            if self.t1.len < self.capacity {
                self.drop_lru_ghost(ListKind::B1);
                evicted = self.replace(false);
            } else {
                // B1 is empty and T1 is full: drop the T1 LRU outright.
                evicted = self.drop_lru_resident(ListKind::T1);
            }
        } else if l1 + l2 >= self.capacity {
            if l1 + l2 == 2 * self.capacity {
                self.drop_lru_ghost(ListKind::B2);
            }
            evicted = self.replace(false);
        }

        let node = Box::new(Node {
            prev: None,
            next: None,
            list: ListKind::T1,
            key: key.clone(),
            value: Some(value),
            expires_at,
        });
        let node_ptr = NonNull::from(Box::leak(node));
        self.map.insert(key, node_ptr);
        self.attach_mru(node_ptr, ListKind::T1);

        evicted
    }

    /// Removes a resident `key`, returning its value. Ghost-only keys are
    /// reported absent and left in place as history.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let node_ptr = match self.map.get(key) {
            Some(&ptr) => ptr,
            None => return None,
        };
        if unsafe { node_ptr.as_ref().value.is_none() } {
            return None;
        }

        self.map.remove(key);
        self.detach(node_ptr);
        let node = unsafe { Box::from_raw(node_ptr.as_ptr()) };
        node.value
    }

    /// Resident entries only; ghosts are not counted.
    pub fn len(&self) -> usize {
        self.t1.len + self.t2.len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current split target for T1. Grows on B1 hits, shrinks on B2 hits.
    pub fn p(&self) -> usize {
        self.p
    }

    pub fn t1_len(&self) -> usize {
        self.t1.len
    }

    pub fn t2_len(&self) -> usize {
        self.t2.len
    }

    pub fn b1_len(&self) -> usize {
        self.b1.len
    }

    pub fn b2_len(&self) -> usize {
        self.b2.len
    }

    /// Snapshot of unexpired resident keys.
    pub fn keys(&self, now: Instant) -> Vec<K> {
        self.map
            .values()
            .filter_map(|&ptr| unsafe {
                let node = ptr.as_ref();
                (node.value.is_some() && !node.is_expired(now)).then(|| node.key.clone())
            })
            .collect()
    }

    /// Snapshot of unexpired resident entries.
    pub fn entries(&self, now: Instant) -> Vec<(K, V)> {
        self.map
            .values()
            .filter_map(|&ptr| unsafe {
                let node = ptr.as_ref();
                if node.is_expired(now) {
                    return None;
                }
                node.value
                    .as_ref()
                    .map(|value| (node.key.clone(), value.clone()))
            })
            .collect()
    }

    /// Removes and returns all resident entries; ghost history and the
    /// split parameter are reset too.
    pub fn drain(&mut self) -> Vec<(K, V)> {
        let mut drained = Vec::with_capacity(self.len());
        for (_, ptr) in self.map.drain() {
            let node = unsafe { Box::from_raw(ptr.as_ptr()) };
            if let Some(value) = node.value {
                drained.push((node.key, value));
            }
        }
        self.t1 = ListEnds::default();
        self.t2 = ListEnds::default();
        self.b1 = ListEnds::default();
        self.b2 = ListEnds::default();
        self.p = 0;
        drained
    }

    /// Validates the ARC size and consistency invariants; panics on
    /// violation.
    #[cfg(any(test, debug_assertions))]
    pub fn debug_validate_invariants(&self) {
        let (t1, t2, b1, b2) = (self.t1.len, self.t2.len, self.b1.len, self.b2.len);
        let c = self.capacity;

        assert!(t1 + t2 <= c, "|T1|+|T2| = {} exceeds c = {}", t1 + t2, c);
        assert!(t1 + b1 <= c, "|T1|+|B1| = {} exceeds c = {}", t1 + b1, c);
        assert!(
            t2 + b2 <= 2 * c,
            "|T2|+|B2| = {} exceeds 2c = {}",
            t2 + b2,
            2 * c
        );
        assert!(
            t1 + t2 + b1 + b2 <= 2 * c,
            "total tracked keys {} exceed 2c = {}",
            t1 + t2 + b1 + b2,
            2 * c
        );
        assert!(self.p <= c, "p = {} exceeds c = {}", self.p, c);
        assert_eq!(
            self.map.len(),
            t1 + t2 + b1 + b2,
            "map size disagrees with list sizes"
        );

        for (kind, expected_len) in [
            (ListKind::T1, t1),
            (ListKind::T2, t2),
            (ListKind::B1, b1),
            (ListKind::B2, b2),
        ] {
            let resident = matches!(kind, ListKind::T1 | ListKind::T2);
            let mut count = 0usize;
            let mut current = self.list(kind).head;
            while let Some(ptr) = current {
                count += 1;
                assert!(count <= self.map.len(), "cycle in {kind:?} list");
                unsafe {
                    let node = ptr.as_ref();
                    assert_eq!(node.list, kind, "node tagged with wrong list");
                    assert_eq!(
                        node.value.is_some(),
                        resident,
                        "ghost flag disagrees with list membership"
                    );
                    assert!(
                        self.map.contains_key(&node.key),
                        "listed node missing from map"
                    );
                    current = node.next;
                }
            }
            assert_eq!(count, expected_len, "{kind:?} length mismatch");
        }
    }

}

impl<K, V> std::fmt::Debug for ArcEngine<K, V>
where
    K: Eq + Hash + Clone,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArcEngine")
            .field("capacity", &self.capacity)
            .field("t1_len", &self.t1.len)
            .field("t2_len", &self.t2.len)
            .field("b1_len", &self.b1.len)
            .field("b2_len", &self.b2.len)
            .field("p", &self.p)
            .finish()
    }
}

impl<K, V> Drop for ArcEngine<K, V>
where
    K: Eq + Hash + Clone,
{
    fn drop(&mut self) {
        for (_, ptr) in self.map.drain() {
            unsafe {
                drop(Box::from_raw(ptr.as_ptr()));
            }
        }
    }
}
