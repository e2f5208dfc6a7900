//! LRU (Least Recently Used) engine.
//!
//! A doubly-linked recency list over heap nodes plus a key map pointing at
//! them:
//!
//! ```text
//!   map: FxHashMap<K, NonNull<Node>>        recency list
//!   ┌─────────┬─────────┐          head ─► [C] ◄──► [A] ◄──► [B] ◄─ tail
//!   │   Key   │ NodePtr │                  MRU               LRU
//!   ├─────────┼─────────┤                                     │
//!   │   "a"   │  ptr_a  │                              evicted first
//!   │   "b"   │  ptr_b  │
//!   │   "c"   │  ptr_c  │
//!   └─────────┴─────────┘
//! ```
//!
//! Every access (lookup hit or overwrite) moves the node to the front; a
//! full insert pops the tail. Every entry in the map has exactly one list
//! node and vice versa. TTL is checked on access: an expired node is
//! unlinked and reported to the caller instead of hitting.
//!
//! All operations are O(1). Not thread-safe; the façade provides the lock.

use std::hash::Hash;
use std::ptr::NonNull;
use std::time::Instant;

use rustc_hash::FxHashMap;

use crate::policy::Lookup;

struct Node<K, V> {
    prev: Option<NonNull<Node<K, V>>>,
    next: Option<NonNull<Node<K, V>>>,
    key: K,
    value: V,
    expires_at: Option<Instant>,
}

impl<K, V> Node<K, V> {
    #[inline]
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at < now)
    }
}

/// Recency-list engine: hits promote to MRU, eviction takes the LRU tail.
pub struct LruEngine<K, V>
where
    K: Eq + Hash + Clone,
{
    map: FxHashMap<K, NonNull<Node<K, V>>>,
    head: Option<NonNull<Node<K, V>>>,
    tail: Option<NonNull<Node<K, V>>>,
    capacity: usize,
}

// SAFETY: the raw pointers only reference heap nodes owned by this struct;
// moving the struct between threads moves ownership of all of them.
unsafe impl<K, V> Send for LruEngine<K, V>
where
    K: Eq + Hash + Clone + Send,
    V: Send,
{
}

// SAFETY: shared access never mutates through the pointers without &mut.
unsafe impl<K, V> Sync for LruEngine<K, V>
where
    K: Eq + Hash + Clone + Sync,
    V: Sync,
{
}

impl<K, V> LruEngine<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(capacity: usize) -> Self {
        Self {
            map: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
            head: None,
            tail: None,
            capacity,
        }
    }

    /// Detach a node from the linked list without touching the map.
    #[inline(always)]
    fn detach(&mut self, node_ptr: NonNull<Node<K, V>>) {
        unsafe {
            let node = node_ptr.as_ref();
            let prev = node.prev;
            let next = node.next;

            match prev {
                Some(mut p) => p.as_mut().next = next,
                None => self.head = next,
            }

            match next {
                Some(mut n) => n.as_mut().prev = prev,
                None => self.tail = prev,
            }
        }
    }

    /// Attach a node at the front (MRU position).
    #[inline(always)]
    fn attach_front(&mut self, mut node_ptr: NonNull<Node<K, V>>) {
        unsafe {
            let node = node_ptr.as_mut();
            node.prev = None;
            node.next = self.head;

            match self.head {
                Some(mut h) => h.as_mut().prev = Some(node_ptr),
                None => self.tail = Some(node_ptr),
            }

            self.head = Some(node_ptr);
        }
    }

    /// Pop the tail node (LRU) and take ownership of it.
    #[inline(always)]
    fn pop_tail(&mut self) -> Option<Box<Node<K, V>>> {
        self.tail.map(|tail_ptr| unsafe {
            let node = Box::from_raw(tail_ptr.as_ptr());

            self.tail = node.prev;
            match self.tail {
                Some(mut t) => t.as_mut().next = None,
                None => self.head = None,
            }

            node
        })
    }

    /// Looks up `key`; a hit moves the node to MRU, an expired entry is
    /// removed and handed back.
    pub fn lookup(&mut self, key: &K, now: Instant) -> Lookup<K, V> {
        let node_ptr = match self.map.get(key) {
            Some(&ptr) => ptr,
            None => return Lookup::Miss,
        };

        if unsafe { node_ptr.as_ref() }.is_expired(now) {
            self.detach(node_ptr);
            let node = unsafe { Box::from_raw(node_ptr.as_ptr()) };
            self.map.remove(&node.key);

            #[cfg(debug_assertions)]
            self.validate_invariants();

            return Lookup::Expired(node.key, node.value);
        }

        self.detach(node_ptr);
        self.attach_front(node_ptr);

        #[cfg(debug_assertions)]
        self.validate_invariants();

        Lookup::Hit(unsafe { node_ptr.as_ref().value.clone() })
    }

    /// Installs or overwrites `key`, promoting it to MRU.
    ///
    /// `expires_at: Some` (re)arms the TTL; `None` keeps an existing
    /// entry's TTL. Returns the entry evicted from the tail, if the cache
    /// was full.
    pub fn insert(&mut self, key: K, value: V, expires_at: Option<Instant>) -> Option<(K, V)> {
        if let Some(&node_ptr) = self.map.get(&key) {
            unsafe {
                let node = &mut *node_ptr.as_ptr();
                node.value = value;
                if expires_at.is_some() {
                    node.expires_at = expires_at;
                }
            }
            self.detach(node_ptr);
            self.attach_front(node_ptr);

            #[cfg(debug_assertions)]
            self.validate_invariants();

            return None;
        }

        if self.capacity == 0 {
            return None;
        }

        let mut evicted = None;
        if self.map.len() >= self.capacity {
            if let Some(victim) = self.pop_tail() {
                self.map.remove(&victim.key);
                evicted = Some((victim.key, victim.value));
            }
        }

        let node = Box::new(Node {
            prev: None,
            next: None,
            key: key.clone(),
            value,
            expires_at,
        });
        let node_ptr = NonNull::from(Box::leak(node));

        self.map.insert(key, node_ptr);
        self.attach_front(node_ptr);

        #[cfg(debug_assertions)]
        self.validate_invariants();

        evicted
    }

    /// Removes `key`, returning its value if present.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let node_ptr = self.map.remove(key)?;

        self.detach(node_ptr);
        let node = unsafe { Box::from_raw(node_ptr.as_ptr()) };

        #[cfg(debug_assertions)]
        self.validate_invariants();

        Some(node.value)
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
            .filter_map(|&ptr| unsafe {
                let node = ptr.as_ref();
                (!node.is_expired(now)).then(|| node.key.clone())
            })
            .collect()
    }

    /// Snapshot of unexpired entries.
    pub fn entries(&self, now: Instant) -> Vec<(K, V)> {
        self.map
            .values()
            .filter_map(|&ptr| unsafe {
                let node = ptr.as_ref();
                (!node.is_expired(now)).then(|| (node.key.clone(), node.value.clone()))
            })
            .collect()
    }

    /// Removes and returns everything, LRU first.
    pub fn drain(&mut self) -> Vec<(K, V)> {
        let mut drained = Vec::with_capacity(self.map.len());
        while let Some(node) = self.pop_tail() {
            drained.push((node.key, node.value));
        }
        self.map.clear();
        drained
    }

    /// Validate internal invariants (debug builds only).
    #[cfg(debug_assertions)]
    fn validate_invariants(&self) {
        if self.map.is_empty() {
            debug_assert!(self.head.is_none());
            debug_assert!(self.tail.is_none());
            return;
        }

        let mut count = 0usize;
        let mut current = self.head;
        while let Some(ptr) = current {
            count += 1;
            unsafe {
                let node = ptr.as_ref();
                debug_assert!(self.map.contains_key(&node.key));
                current = node.next;
            }
            if count > self.map.len() {
                panic!("cycle detected in recency list");
            }
        }

        debug_assert_eq!(count, self.map.len());
    }
}

impl<K, V> Drop for LruEngine<K, V>
where
    K: Eq + Hash + Clone,
{
    fn drop(&mut self) {
        let mut current = self.head;
        while let Some(node_ptr) = current {
            unsafe {
                current = node_ptr.as_ref().next;
                drop(Box::from_raw(node_ptr.as_ptr()));
            }
        }
        self.head = None;
        self.tail = None;
        self.map.clear();
    }
}
