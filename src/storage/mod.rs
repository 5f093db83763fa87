//! Chronos Entry Stores
//!
//! This module provides the physical side of the store:
//!
//! - **connection**: one SQLite connection per shard, transaction scopes
//! - **schema**: DDL for buckets and indexes
//! - **types**: entry types and timestamp conversion
//! - **key_bucket**, **timeline_bucket**, **user_bucket**: Entry Store handles
//!
//! # Architecture
//!
//! ```text
//! Write Path:
//!   Entry → Bucket::put → upsert (RETURNING id) → cache write-through
//!
//! Read Path:
//!   Bucket::get → cache? → SELECT ... LIMIT 1 → cache fill
//! ```
//!
//! Handles are obtained from a [`ShardRouter`](crate::router::ShardRouter);
//! every handle bound to the same shard shares its connection.
//!
//! # Example
//!
//! ```rust,no_run
//! use chronos::router::ShardRouter;
//! use chronos::storage::{BucketKind, TimelineBucketEntry};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let router = ShardRouter::in_memory(&[1]);
//!     router.create_bucket(BucketKind::Timeline, 1, 1)?;
//!
//!     let bucket = router.timeline_bucket(1, 1)?;
//!     let mut entry = TimelineBucketEntry::new("{\"text\":\"hello\"}");
//!     let id = bucket.put(&mut entry, true)?;
//!
//!     assert!(bucket.get(id, true)?.is_some());
//!     Ok(())
//! }
//! ```

pub mod connection;
pub mod key_bucket;
pub mod schema;
pub mod timeline_bucket;
pub mod types;
pub mod user_bucket;

pub use connection::{
    ShardBinding, ShardConnection, ShardLocation, TransactionScope, Transactional, MEMORY_HOST,
};
pub use key_bucket::KeyBucket;
pub use timeline_bucket::TimelineBucket;
pub use types::{
    from_millis, to_millis, BucketKind, EntryPayload, KeyBucketEntry, TimelineBucketEntry,
    UserBucketEntry,
};
pub use user_bucket::{UserBucket, USER_BUCKET_ID};
