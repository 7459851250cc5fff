//! Bounded cache of completed build results.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Debug)]
struct Entries<T> {
    map: HashMap<String, Arc<T>>,
    /// Insertion order; the oldest entry is evicted first.
    order: VecDeque<String>,
}

/// Successful results by canonical key, evicted oldest-first.
///
/// A capacity of 0 disables caching.
#[derive(Debug)]
pub struct ResultCache<T> {
    entries: RwLock<Entries<T>>,
    capacity: usize,
}

impl<T> ResultCache<T> {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(Entries {
                map: HashMap::new(),
                order: VecDeque::new(),
            }),
            capacity,
        }
    }

    pub fn get(&self, key: &str) -> Option<Arc<T>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.map.get(key).cloned()
    }

    pub fn insert(&self, key: &str, value: Arc<T>) {
        if self.capacity == 0 {
            return;
        }
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.map.insert(key.to_string(), value).is_none() {
            entries.order.push_back(key.to_string());
        }
        while entries.order.len() > self.capacity {
            if let Some(oldest) = entries.order.pop_front() {
                entries.map.remove(&oldest);
            }
        }
    }

    /// Drop a cached result so the next request rebuilds it.
    pub fn invalidate(&self, key: &str) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.map.remove(key).is_some() {
            entries.order.retain(|k| k != key);
            true
        } else {
            false
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .map
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
