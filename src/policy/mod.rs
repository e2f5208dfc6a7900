//! Eviction-policy engines.
//!
//! Each engine is a single-threaded core owning a key index plus the
//! ordered structures its policy needs; the [`Cache`](crate::cache::Cache)
//! façade wraps one engine in a mutex and layers loading, hooks, and stats
//! on top. Engines can also be used standalone when external
//! synchronization is already in place.
//!
//! | Engine | Ordering structure | Eviction |
//! |---|---|---|
//! | [`simple::SimpleEngine`] | none | expired-entry scan (soft capacity) |
//! | [`lru::LruEngine`] | recency list | list tail |
//! | [`lfu::LfuEngine`] | frequency buckets | head (lowest-freq) bucket |
//! | [`arc::ArcEngine`] | T1/T2 + ghost lists B1/B2 | adaptive `replace` |

pub mod arc;
pub mod lfu;
pub mod lru;
pub mod simple;

/// Outcome of a keyed lookup against an engine.
///
/// Expiration is evaluated during the lookup: an expired entry is removed
/// in place and handed back so the caller can run its eviction hook, and
/// the lookup counts as a miss.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<K, V> {
    /// Live entry found; recency/frequency bookkeeping was updated.
    Hit(V),
    /// Entry was present but expired; it has been removed.
    Expired(K, V),
    /// No entry for the key (ARC ghosts report `Miss`).
    Miss,
}
