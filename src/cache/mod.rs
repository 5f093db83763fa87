//! Pluggable entry cache
//!
//! Bucket reads may be served from, and writes mirrored into, an
//! [`EntryCache`]. Every call site passes `use_cache`; a router without a
//! cache behaves as if it were always `false`. Index rows are never cached.
//!
//! Cache keys are derived from `(kind, shard, bucket, key-or-id)`:
//!
//! ```text
//! KB-{shard}-{bucket}-{key}
//! TB-{shard}-{bucket}-{id}
//! UB-{shard}-{bucket}-{id}
//! ```

mod memory;

pub use memory::MemoryCache;

use crate::config::CacheConfig;
use crate::storage::{BucketKind, KeyBucketEntry, TimelineBucketEntry, UserBucketEntry};
use std::sync::Arc;

/// Cache driver contract. Every method reports success as a `bool`.
pub trait EntryCache: Send + Sync {
    /// Drop every cached entry
    fn clear(&self) -> bool;

    fn delete(&self, meta: &CacheMeta) -> bool;

    fn get(&self, meta: &CacheMeta) -> Option<CachedEntry>;

    fn put(&self, meta: &CacheMeta, entry: CachedEntry) -> bool;
}

/// What a cache entry is addressed by within its bucket
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntryRef {
    Key(String),
    Id(u64),
}

impl std::fmt::Display for EntryRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryRef::Key(key) => write!(f, "{}", key),
            EntryRef::Id(id) => write!(f, "{}", id),
        }
    }
}

/// Addressing information handed to cache drivers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheMeta {
    pub bucket_type: BucketKind,
    pub shard_id: u16,
    pub bucket_id: u16,
    pub entry: EntryRef,
    pub shard_name: String,
    pub cache_key: String,
}

impl CacheMeta {
    pub fn new(
        bucket_type: BucketKind,
        shard_id: u16,
        bucket_id: u16,
        shard_name: impl Into<String>,
        entry: EntryRef,
    ) -> Self {
        let cache_key = format!(
            "{}-{}-{}-{}",
            bucket_type.cache_prefix(),
            shard_id,
            bucket_id,
            entry
        );
        Self {
            bucket_type,
            shard_id,
            bucket_id,
            entry,
            shard_name: shard_name.into(),
            cache_key,
        }
    }
}

/// A cached copy of any bucket entry
#[derive(Debug, Clone, PartialEq)]
pub enum CachedEntry {
    Key(KeyBucketEntry),
    Timeline(TimelineBucketEntry),
    User(UserBucketEntry),
}

/// Conversion between concrete entry types and [`CachedEntry`]
pub trait Cacheable: Sized {
    fn to_cached(&self) -> CachedEntry;

    /// `None` if the cached value holds a different entry type
    fn from_cached(cached: CachedEntry) -> Option<Self>;
}

impl Cacheable for KeyBucketEntry {
    fn to_cached(&self) -> CachedEntry {
        CachedEntry::Key(self.clone())
    }

    fn from_cached(cached: CachedEntry) -> Option<Self> {
        match cached {
            CachedEntry::Key(entry) => Some(entry),
            _ => None,
        }
    }
}

impl Cacheable for TimelineBucketEntry {
    fn to_cached(&self) -> CachedEntry {
        CachedEntry::Timeline(self.clone())
    }

    fn from_cached(cached: CachedEntry) -> Option<Self> {
        match cached {
            CachedEntry::Timeline(entry) => Some(entry),
            _ => None,
        }
    }
}

impl Cacheable for UserBucketEntry {
    fn to_cached(&self) -> CachedEntry {
        CachedEntry::User(self.clone())
    }

    fn from_cached(cached: CachedEntry) -> Option<Self> {
        match cached {
            CachedEntry::User(entry) => Some(entry),
            _ => None,
        }
    }
}

/// Fetch a typed entry from an optional cache
pub(crate) fn cached<T: Cacheable>(cache: Option<&dyn EntryCache>, meta: &CacheMeta) -> Option<T> {
    let hit = cache?.get(meta).and_then(T::from_cached);
    if hit.is_some() {
        tracing::trace!(key = %meta.cache_key, "Cache hit");
    }
    hit
}

/// Mirror a typed entry into an optional cache
pub(crate) fn store<T: Cacheable>(cache: Option<&dyn EntryCache>, meta: &CacheMeta, entry: &T) {
    if let Some(cache) = cache {
        if !cache.put(meta, entry.to_cached()) {
            tracing::debug!(key = %meta.cache_key, "Cache put rejected");
        }
    }
}

pub(crate) fn evict(cache: Option<&dyn EntryCache>, meta: &CacheMeta) {
    if let Some(cache) = cache {
        cache.delete(meta);
    }
}

/// Build the cache named by configuration.
///
/// Unknown drivers disable caching rather than failing.
pub fn build_cache(config: &CacheConfig) -> Option<Arc<dyn EntryCache>> {
    match config.driver.as_str() {
        "memory" => Some(Arc::new(MemoryCache::new())),
        "" | "none" => None,
        other => {
            tracing::warn!(driver = other, "Unknown cache driver, caching disabled");
            None
        }
    }
}
