//! Error types for the hotcache library.
//!
//! ## Key Components
//!
//! - [`CacheError`]: Runtime errors surfaced by cache operations — the
//!   `KeyNotFound` sentinel, loader failures (forwarded verbatim),
//!   serialization-hook failures, and captured loader panics.
//! - [`ConfigError`]: Returned by [`CacheBuilder::build`](crate::builder::CacheBuilder::build)
//!   when configuration parameters are invalid (e.g. zero capacity for a
//!   bounded policy).
//!
//! Loader and serialization errors are shared between every caller waiting
//! on the same in-flight load, so they are held behind `Arc` and the whole
//! type is cheap to clone.

use std::fmt;
use std::sync::Arc;

/// Boxed error type accepted from user-supplied loader and
/// serialize/deserialize hooks.
pub type DynError = Box<dyn std::error::Error + Send + Sync + 'static>;

// ---------------------------------------------------------------------------
// CacheError
// ---------------------------------------------------------------------------

/// Error returned by cache operations.
///
/// `KeyNotFound` is a sentinel: it is the only variant produced by the cache
/// itself on a miss, and [`is_key_not_found`](CacheError::is_key_not_found)
/// (or `==` against `CacheError::KeyNotFound`) distinguishes it from loader
/// failures.
///
/// # Example
///
/// ```
/// use hotcache::{Cache, CacheBuilder, CacheError};
///
/// let cache: Cache<u64, String> = CacheBuilder::new(16).lru().build().unwrap();
/// let err = cache.get(&1).unwrap_err();
/// assert!(err.is_key_not_found());
/// assert_eq!(err, CacheError::KeyNotFound);
/// ```
#[derive(Debug, Clone)]
pub enum CacheError {
    /// The key is absent (or present only as an ARC ghost).
    KeyNotFound,
    /// The user loader returned an error; forwarded unchanged.
    Loader(Arc<dyn std::error::Error + Send + Sync + 'static>),
    /// A serialize/deserialize hook returned an error; the triggering
    /// operation aborted with cache state unchanged.
    Serialization(Arc<dyn std::error::Error + Send + Sync + 'static>),
    /// The user loader panicked; the payload is rendered into the message.
    LoaderPanic(String),
}

impl CacheError {
    /// Returns `true` if this is the `KeyNotFound` sentinel.
    #[inline]
    pub fn is_key_not_found(&self) -> bool {
        matches!(self, CacheError::KeyNotFound)
    }

    pub(crate) fn loader(err: DynError) -> Self {
        CacheError::Loader(Arc::from(err))
    }

    pub(crate) fn serialization(err: DynError) -> Self {
        CacheError::Serialization(Arc::from(err))
    }
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::KeyNotFound => f.write_str("key not found"),
            CacheError::Loader(err) => write!(f, "{err}"),
            CacheError::Serialization(err) => write!(f, "{err}"),
            CacheError::LoaderPanic(detail) => write!(f, "Loader panics: {detail}"),
        }
    }
}

impl std::error::Error for CacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CacheError::Loader(err) | CacheError::Serialization(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

/// Equality for test assertions: the sentinel matches itself, panics match
/// by message, forwarded errors match only when they are the same shared
/// error object.
impl PartialEq for CacheError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (CacheError::KeyNotFound, CacheError::KeyNotFound) => true,
            (CacheError::LoaderPanic(a), CacheError::LoaderPanic(b)) => a == b,
            (CacheError::Loader(a), CacheError::Loader(b)) => Arc::ptr_eq(a, b),
            (CacheError::Serialization(a), CacheError::Serialization(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Error returned when cache configuration parameters are invalid.
///
/// Produced by [`CacheBuilder::build`](crate::builder::CacheBuilder::build).
/// Carries a human-readable description of which parameter failed
/// validation.
///
/// # Example
///
/// ```
/// use hotcache::CacheBuilder;
///
/// let err = CacheBuilder::<u64, String>::new(0).lru().build().unwrap_err();
/// assert!(err.to_string().contains("capacity"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError(String);

impl ConfigError {
    /// Creates a new `ConfigError` with the given description.
    #[inline]
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    /// Returns the error description.
    #[inline]
    pub fn message(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ConfigError {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
