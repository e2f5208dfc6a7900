//! hotcache: in-process loading cache with pluggable eviction policies.
//!
//! One [`Cache`] surface over four engines — Simple, LRU, LFU, and ARC —
//! with single-flight load coalescing, optional per-entry TTL, hit/miss
//! stats, and serialize/deserialize hooks.
//!
//! ```
//! use hotcache::{Cache, CacheBuilder};
//!
//! let cache: Cache<String, String> = CacheBuilder::new(256)
//!     .lfu()
//!     .loader(|key: &String| Ok(key.to_uppercase()))
//!     .build()
//!     .unwrap();
//!
//! // Concurrent misses for the same key share a single loader call.
//! assert_eq!(cache.get(&"hot".to_string()).unwrap(), "HOT");
//! assert_eq!(cache.hit_count() + cache.miss_count(), 1);
//! ```

pub mod builder;
pub mod cache;
pub mod clock;
pub mod error;
pub mod policy;
mod singleflight;
pub mod stats;

pub use builder::{CacheBuilder, EvictionPolicy};
pub use cache::Cache;
pub use clock::{Clock, FakeClock, RealClock};
pub use error::{CacheError, ConfigError, DynError};
pub use stats::CacheStats;
