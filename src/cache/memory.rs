//! In-process cache backed by a `HashMap`

use super::{CacheMeta, CachedEntry, EntryCache};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Unbounded map from cache key to entry
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, CachedEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, CachedEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    pub fn contains(&self, meta: &CacheMeta) -> bool {
        self.entries().contains_key(&meta.cache_key)
    }
}

impl EntryCache for MemoryCache {
    fn clear(&self) -> bool {
        self.entries().clear();
        true
    }

    fn delete(&self, meta: &CacheMeta) -> bool {
        self.entries().remove(&meta.cache_key).is_some()
    }

    fn get(&self, meta: &CacheMeta) -> Option<CachedEntry> {
        self.entries().get(&meta.cache_key).cloned()
    }

    fn put(&self, meta: &CacheMeta, entry: CachedEntry) -> bool {
        self.entries().insert(meta.cache_key.clone(), entry);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::EntryRef;
    use crate::storage::{BucketKind, KeyBucketEntry};

    fn meta(key: &str) -> CacheMeta {
        CacheMeta::new(BucketKind::Key, 1, 1, "sha_1", EntryRef::Key(key.to_string()))
    }

    #[test]
    fn test_put_get_delete() {
        let cache = MemoryCache::new();
        let entry = CachedEntry::Key(KeyBucketEntry::new("a", "payload"));

        assert!(cache.get(&meta("a")).is_none());
        assert!(cache.put(&meta("a"), entry.clone()));
        assert_eq!(cache.get(&meta("a")), Some(entry));
        assert!(cache.contains(&meta("a")));

        assert!(cache.delete(&meta("a")));
        assert!(!cache.delete(&meta("a")));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_clear() {
        let cache = MemoryCache::new();
        for key in ["a", "b", "c"] {
            cache.put(&meta(key), CachedEntry::Key(KeyBucketEntry::new(key, "")));
        }
        assert_eq!(cache.len(), 3);
        assert!(cache.clear());
        assert!(cache.is_empty());
    }
}
