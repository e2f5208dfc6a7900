//! Per-key load coalescing.
//!
//! Guarantees at-most-one concurrent invocation of the load function per
//! key. Concurrent callers either wait for the in-flight result or bail out
//! immediately, depending on the entry point:
//!
//! ```text
//!   execute(k, f, wait=true)                execute(k, f, wait=false)
//!        │                                       │
//!        ▼                                       ▼
//!   ┌──────────────────┐                   ┌──────────────────┐
//!   │ call in flight?  │                   │ call in flight?  │
//!   ├──────────────────┤                   ├──────────────────┤
//!   │ yes → block on   │                   │ yes → KeyNotFound│
//!   │       latch,     │                   │       (no block) │
//!   │       shared=true│                   │ no  → spawn f on │
//!   │ no  → run f here │                   │       background │
//!   │                  │                   │       thread,    │
//!   │                  │                   │       KeyNotFound│
//!   └──────────────────┘                   └──────────────────┘
//! ```
//!
//! The call map is guarded by a short-lived mutex; the load function itself
//! always runs with no lock held. A panicking load is caught and published
//! to every waiter as [`CacheError::LoaderPanic`].

use std::any::Any;
use std::hash::Hash;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

use parking_lot::{Condvar, Mutex};
use rustc_hash::FxHashMap;

use crate::error::CacheError;

/// Completion latch for one in-flight load.
struct Call<V> {
    result: Mutex<Option<Result<V, CacheError>>>,
    done: Condvar,
}

impl<V> Call<V> {
    fn new() -> Self {
        Self {
            result: Mutex::new(None),
            done: Condvar::new(),
        }
    }
}

/// Load-coalescing group: one [`Call`] per key currently being loaded.
pub(crate) struct Group<K, V> {
    calls: Mutex<FxHashMap<K, Arc<Call<V>>>>,
}

impl<K, V> Group<K, V>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    pub(crate) fn new() -> Self {
        Self {
            calls: Mutex::new(FxHashMap::default()),
        }
    }

    /// Runs `load` for `key` unless a load is already in flight.
    ///
    /// With `wait = true` the caller either runs the load itself or blocks
    /// until the in-flight one completes; the returned flag is `true` when
    /// the result was produced by another caller's load. With
    /// `wait = false` the caller never blocks: a fresh load is spawned on a
    /// background thread and `KeyNotFound` is returned immediately (also
    /// returned while a load is already in flight).
    pub(crate) fn execute<F>(
        group: &Arc<Self>,
        key: K,
        load: F,
        wait: bool,
    ) -> Result<(V, bool), CacheError>
    where
        F: FnOnce() -> Result<V, CacheError> + Send + 'static,
    {
        let mut calls = group.calls.lock();
        if let Some(call) = calls.get(&key) {
            let call = Arc::clone(call);
            drop(calls);
            if !wait {
                return Err(CacheError::KeyNotFound);
            }
            let mut result = call.result.lock();
            while result.is_none() {
                call.done.wait(&mut result);
            }
            let shared = result.clone().expect("completed call has no result");
            return shared.map(|v| (v, true));
        }

        let call = Arc::new(Call::new());
        calls.insert(key.clone(), Arc::clone(&call));
        drop(calls);

        if !wait {
            let group = Arc::clone(group);
            thread::spawn(move || {
                group.run(key, &call, load);
            });
            return Err(CacheError::KeyNotFound);
        }

        group.run(key, &call, load).map(|v| (v, false))
    }

    /// Runs the load, retires the call, and publishes the result to waiters.
    fn run<F>(&self, key: K, call: &Call<V>, load: F) -> Result<V, CacheError>
    where
        F: FnOnce() -> Result<V, CacheError>,
    {
        let outcome = match panic::catch_unwind(AssertUnwindSafe(load)) {
            Ok(result) => result,
            Err(payload) => Err(CacheError::LoaderPanic(panic_detail(payload.as_ref()))),
        };

        self.calls.lock().remove(&key);

        let mut result = call.result.lock();
        *result = Some(outcome.clone());
        call.done.notify_all();
        drop(result);

        outcome
    }
}

fn panic_detail(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "opaque panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn single_caller_runs_load_unshared() {
        let group: Arc<Group<&str, i32>> = Arc::new(Group::new());
        let (v, shared) = Group::execute(&group, "k", || Ok(7), true).unwrap();
        assert_eq!(v, 7);
        assert!(!shared);
        assert!(group.calls.lock().is_empty());
    }

    #[test]
    fn concurrent_callers_share_one_load() {
        let group: Arc<Group<String, String>> = Arc::new(Group::new());
        let invocations = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(std::sync::Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let group = Arc::clone(&group);
                let invocations = Arc::clone(&invocations);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    Group::execute(
                        &group,
                        "x".to_string(),
                        move || {
                            invocations.fetch_add(1, Ordering::SeqCst);
                            thread::sleep(Duration::from_millis(50));
                            Ok("v_x".to_string())
                        },
                        true,
                    )
                })
            })
            .collect();

        let mut shared_seen = 0;
        for handle in handles {
            let (v, shared) = handle.join().unwrap().unwrap();
            assert_eq!(v, "v_x");
            if shared {
                shared_seen += 1;
            }
        }
        // All callers raced past the barrier while the winner slept, so
        // they joined its call instead of loading again.
        assert!(invocations.load(Ordering::SeqCst) < 8);
        assert!(shared_seen > 0);
    }

    #[test]
    fn non_waiting_probe_returns_key_not_found() {
        let group: Arc<Group<&str, i32>> = Arc::new(Group::new());
        let err = Group::execute(&group, "bg", || Ok(1), false).unwrap_err();
        assert!(err.is_key_not_found());

        // The background load eventually retires its call entry.
        for _ in 0..100 {
            if group.calls.lock().is_empty() {
                return;
            }
            thread::sleep(Duration::from_millis(10));
        }
        panic!("background load never completed");
    }

    #[test]
    fn panic_is_captured_and_shared() {
        let group: Arc<Group<&str, i32>> = Arc::new(Group::new());
        let err = Group::execute(&group, "p", || panic!("boom"), true).unwrap_err();
        match err {
            CacheError::LoaderPanic(detail) => assert!(detail.contains("boom")),
            other => panic!("expected LoaderPanic, got {other:?}"),
        }
        // The call retired; a later load runs fresh.
        let (v, shared) = Group::execute(&group, "p", || Ok(3), true).unwrap();
        assert_eq!(v, 3);
        assert!(!shared);
    }

    #[test]
    fn loader_error_propagates_to_caller() {
        let group: Arc<Group<&str, i32>> = Arc::new(Group::new());
        let err = Group::execute(&group, "e", || Err(CacheError::loader("nope".into())), true)
            .unwrap_err();
        assert_eq!(err.to_string(), "nope");
    }
}
