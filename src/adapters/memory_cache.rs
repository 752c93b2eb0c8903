//! In-process result cache.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::ports::cache_port::{CacheEntry, CacheKey, CachePort};

#[derive(Default)]
pub struct InMemoryCache {
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self) -> MutexGuard<'_, HashMap<CacheKey, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map().is_empty()
    }
}

impl CachePort for InMemoryCache {
    fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.map().get(key).cloned()
    }

    fn put(&self, entry: CacheEntry) {
        self.map().insert(entry.key.clone(), entry);
    }

    fn clear(&self, symbol_prefix: Option<&str>) -> usize {
        let mut map = self.map();
        let before = map.len();
        match symbol_prefix {
            Some(prefix) => map.retain(|key, _| !key.symbol.starts_with(prefix)),
            None => map.clear(),
        }
        before - map.len()
    }

    fn entries(&self) -> Vec<CacheEntry> {
        self.map().values().cloned().collect()
    }
}
