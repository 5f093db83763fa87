//! # Chronos
//!
//! Sharded, time-ordered entry store with a chronological secondary index and
//! a resumable timeline reader, built for "fan-out on read" feeds.
//!
//! ## Features
//!
//! - **Sharding**: entries live in buckets spread over shards and servers
//! - **Packed pointers**: one `u64` addresses shard, bucket and entry
//! - **Chronological index**: rows keyed by `(id, a)` per timeline owner
//! - **Timeline reader**: cursor-based pages that skip deleted entries
//! - **Cache-aside**: optional entry cache in front of every bucket
//!
//! ## Modules
//!
//! - [`router`]: server/shard registry and handle factory
//! - [`storage`]: key, timeline and user buckets over SQLite
//! - [`index`]: pointer codec, timeline index and reader
//! - [`cache`]: cache driver contract and in-memory driver
//! - [`config`]: TOML configuration with environment overrides
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use chronos::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load_default();
//!     chronos::logging::init_logging(&config.logging);
//!
//!     let router = ShardRouter::in_memory(&[1]);
//!     router.create_bucket(BucketKind::Timeline, 1, 1)?;
//!     let index = router.create_index(IndexKind::Timeline, 1, 1)?;
//!
//!     // Write an entry and point timeline 42 at it
//!     let bucket = router.timeline_bucket(1, 1)?;
//!     let id = bucket.put(&mut TimelineBucketEntry::new("{\"text\":\"hi\"}"), true)?;
//!     index.put(&mut TimelineIndexEntry::pointing_to(42, TimelineIndexId::new(1, 1, id)))?;
//!
//!     // Newest first, resumable from (offset, last_id)
//!     let mut reader = TimelineReader::new(&router, &index);
//!     let page = reader.read_a(42, 20)?;
//!     println!("{} entries, cursor {}/{}", page.len(), reader.offset(), reader.last_id());
//!
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod index;
pub mod logging;
pub mod router;
pub mod storage;

// Re-export top-level types for convenience
pub use error::{ChronosError, ChronosResult, ErrorLog, ErrorRecord, ErrorReporting};

pub use config::{CacheConfig, Config, ConfigError, LoggingConfig, NamingConfig, ServerConfig};

pub use cache::{CacheMeta, CachedEntry, Cacheable, EntryCache, MemoryCache};

pub use storage::{
    BucketKind, EntryPayload, KeyBucket, KeyBucketEntry, TimelineBucket, TimelineBucketEntry,
    Transactional, UserBucket, UserBucketEntry,
};

pub use index::{IndexKind, TimelineIndex, TimelineIndexEntry, TimelineIndexId, TimelineReader};

pub use router::{Bucket, ServerDescriptor, ShardRouter};

/// Everything needed for the common write-then-read flow
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{ChronosResult, ErrorReporting};
    pub use crate::index::{
        IndexKind, TimelineIndex, TimelineIndexEntry, TimelineIndexId, TimelineReader,
    };
    pub use crate::router::{Bucket, ServerDescriptor, ShardRouter};
    pub use crate::storage::{
        BucketKind, EntryPayload, KeyBucketEntry, TimelineBucketEntry, Transactional,
        UserBucketEntry,
    };
}
