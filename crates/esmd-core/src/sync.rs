//! Per-key mutual exclusion.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Serializes work per key, e.g. installs of one `name@version`.
///
/// Unrelated keys never contend beyond a short map lookup. Entries are
/// dropped once no caller holds or waits on them.
#[derive(Debug, Default)]
pub struct KeyedMutex {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedMutex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the lock for `key`.
    ///
    /// The key is released even if `f` panics.
    pub fn with_lock<R>(&self, key: &str, f: impl FnOnce() -> R) -> R {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(key.to_string()).or_default())
        };
        let _release = Release {
            owner: self,
            key,
            lock: &lock,
        };

        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        f()
    }

    /// Number of keys currently held or waited on.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Drops the map entry for `key` once nobody else holds or waits on it.
struct Release<'a> {
    owner: &'a KeyedMutex,
    key: &'a str,
    lock: &'a Arc<Mutex<()>>,
}

impl Drop for Release<'_> {
    fn drop(&mut self) {
        let mut locks = self
            .owner
            .locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // One count for the map, one for the caller's clone
        if Arc::strong_count(self.lock) == 2 {
            locks.remove(self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_same_key_is_serialized() {
        let mutex = Arc::new(KeyedMutex::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let mutex = Arc::clone(&mutex);
                let inside = Arc::clone(&inside);
                let max_inside = Arc::clone(&max_inside);
                std::thread::spawn(move || {
                    mutex.with_lock("react@18.2.0", || {
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_inside.fetch_max(now, Ordering::SeqCst);
                        std::thread::sleep(Duration::from_millis(5));
                        inside.fetch_sub(1, Ordering::SeqCst);
                    });
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        assert!(mutex.is_empty());
    }

    #[test]
    fn test_distinct_keys_do_not_block() {
        let mutex = KeyedMutex::new();
        let value = mutex.with_lock("a@1.0.0", || mutex.with_lock("b@1.0.0", || 42));
        assert_eq!(value, 42);
        assert!(mutex.is_empty());
    }

    #[test]
    fn test_panic_releases_key() {
        let mutex = KeyedMutex::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            mutex.with_lock("broken@1.0.0", || panic!("install exploded"));
        }));
        assert!(result.is_err());
        assert!(mutex.is_empty());

        // The key is usable again afterwards
        assert_eq!(mutex.with_lock("broken@1.0.0", || 7), 7);
        assert!(mutex.is_empty());
    }
}
