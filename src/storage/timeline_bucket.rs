//! Timeline bucket: id-addressed entry store
//!
//! These are the physical rows that timeline index pointers resolve to.
//! Ids are assigned by the store on insert and start at 1.

use super::connection::{ShardBinding, ShardConnection, TransactionScope, Transactional};
use super::types::{from_millis, to_millis, BucketKind, TimelineBucketEntry};
use crate::cache::{self, CacheMeta, EntryRef};
use crate::config::NamingConfig;
use crate::error::{ChronosError, ChronosResult, ErrorLog, ErrorReporting};
use chrono::Utc;
use rusqlite::{params, Row};

const COLUMNS: &str = "id, payload, version, created_at, updated_at";

fn decode_row(row: &Row<'_>) -> rusqlite::Result<TimelineBucketEntry> {
    Ok(TimelineBucketEntry {
        id: Some(row.get::<_, i64>(0)? as u64),
        payload: row.get(1)?,
        version: row.get(2)?,
        created_at: Some(from_millis(row.get(3)?)),
        updated_at: Some(from_millis(row.get(4)?)),
    })
}

/// Handle to one timeline bucket of a shard
pub struct TimelineBucket {
    binding: ShardBinding,
    bucket_id: u16,
    table: String,
    errors: ErrorLog,
    transaction: TransactionScope,
}

impl TimelineBucket {
    pub(crate) fn new(binding: ShardBinding, bucket_id: u16) -> Self {
        let table = binding.qualified(&Self::bucket_name(binding.naming(), bucket_id));
        Self {
            binding,
            bucket_id,
            table,
            errors: ErrorLog::new(),
            transaction: TransactionScope::new(),
        }
    }

    pub fn bucket_name(naming: &NamingConfig, bucket_id: u16) -> String {
        naming.timeline_bucket_name(bucket_id)
    }

    pub fn id(&self) -> u16 {
        self.bucket_id
    }

    pub fn shard_id(&self) -> u16 {
        self.binding.shard_id()
    }

    pub fn name(&self) -> &str {
        &self.table
    }

    fn cache_meta(&self, id: u64) -> CacheMeta {
        CacheMeta::new(
            BucketKind::Timeline,
            self.binding.shard_id(),
            self.bucket_id,
            self.binding.shard_name(),
            EntryRef::Id(id),
        )
    }

    pub fn get(&self, id: u64, use_cache: bool) -> ChronosResult<Option<TimelineBucketEntry>> {
        let cache = self.binding.cache_for(use_cache);
        let meta = self.cache_meta(id);
        if let Some(entry) = cache::cached(cache, &meta) {
            return Ok(Some(entry));
        }

        let sql = format!("SELECT {} FROM {} WHERE id = ? LIMIT 1", COLUMNS, self.table);
        let entry = self
            .binding
            .connection
            .query_row(&sql, params![id as i64], decode_row)
            .map_err(|e| self.errors.record(e))?;

        if let Some(entry) = &entry {
            cache::store(cache, &meta, entry);
        }
        Ok(entry)
    }

    /// Store the entry and return its id.
    ///
    /// Without an id a new row is inserted and the assigned id is written
    /// back into `entry`; with an id the row is inserted or updated in place.
    pub fn put(&self, entry: &mut TimelineBucketEntry, use_cache: bool) -> ChronosResult<u64> {
        let now = Utc::now();
        let created_at = to_millis(&entry.created_at.unwrap_or(now));
        let updated_at = to_millis(&now);

        let stored: Option<(i64, i64)> = match entry.id {
            None => {
                let sql = format!(
                    "INSERT INTO {} (payload, version, created_at, updated_at)
                     VALUES (?, ?, ?, ?)
                     RETURNING id, created_at",
                    self.table
                );
                self.binding.connection.query_row(
                    &sql,
                    params![entry.payload, entry.version, created_at, updated_at],
                    |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
                )
            }
            Some(id) => {
                let sql = format!(
                    "INSERT INTO {} ({}) VALUES (?, ?, ?, ?, ?)
                     ON CONFLICT(id) DO UPDATE SET
                        payload = excluded.payload,
                        version = excluded.version,
                        updated_at = excluded.updated_at
                     RETURNING id, created_at",
                    self.table, COLUMNS
                );
                self.binding.connection.query_row(
                    &sql,
                    params![
                        id as i64,
                        entry.payload,
                        entry.version,
                        created_at,
                        updated_at
                    ],
                    |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
                )
            }
        }
        .map_err(|e| self.errors.record(e))?;

        let Some((id, stored_created_at)) = stored else {
            return Err(self.errors.record(ChronosError::NoRowAffected));
        };
        let id = id as u64;
        entry.id = Some(id);
        entry.created_at = Some(from_millis(stored_created_at));
        entry.updated_at = Some(now);

        cache::store(self.binding.cache_for(use_cache), &self.cache_meta(id), &*entry);
        Ok(id)
    }

    /// Delete one entry; fails with `NoRowAffected` if it does not exist
    pub fn delete(&self, id: u64, use_cache: bool) -> ChronosResult<()> {
        let sql = format!("DELETE FROM {} WHERE id = ?", self.table);
        let affected = self
            .binding
            .connection
            .execute(&sql, params![id as i64])
            .map_err(|e| self.errors.record(e))?;

        cache::evict(self.binding.cache_for(use_cache), &self.cache_meta(id));

        if affected == 0 {
            return Err(self.errors.record(ChronosError::NoRowAffected));
        }
        Ok(())
    }

    /// Window of entries ordered by id, newest first when `reverse`
    pub fn scan(
        &self,
        offset: u64,
        count: u64,
        reverse: bool,
        use_cache: bool,
    ) -> ChronosResult<Vec<TimelineBucketEntry>> {
        let order = if reverse { "DESC" } else { "ASC" };
        let sql = format!(
            "SELECT {} FROM {} ORDER BY id {} LIMIT ? OFFSET ?",
            COLUMNS, self.table, order
        );
        let entries = self
            .binding
            .connection
            .query_rows(&sql, params![count as i64, offset as i64], decode_row)
            .map_err(|e| self.errors.record(e))?;

        let cache = self.binding.cache_for(use_cache);
        for entry in &entries {
            if let Some(id) = entry.id {
                cache::store(cache, &self.cache_meta(id), entry);
            }
        }
        Ok(entries)
    }
}

impl ErrorReporting for TimelineBucket {
    fn error_log(&self) -> &ErrorLog {
        &self.errors
    }
}

impl Transactional for TimelineBucket {
    fn connection(&self) -> &ShardConnection {
        self.binding.connection()
    }

    fn transaction_scope(&self) -> &TransactionScope {
        &self.transaction
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::router::ShardRouter;
    use std::sync::Arc;

    fn setup() -> (ShardRouter, Arc<MemoryCache>) {
        let cache = Arc::new(MemoryCache::new());
        let router = ShardRouter::in_memory(&[1]).with_cache(cache.clone());
        router.create_bucket(BucketKind::Timeline, 1, 1).unwrap();
        (router, cache)
    }

    #[test]
    fn test_insert_assigns_increasing_ids() {
        let (router, _) = setup();
        let bucket = router.timeline_bucket(1, 1).unwrap();
        assert_eq!(bucket.name(), "sha_1.tb_1");

        let mut ids = Vec::new();
        for i in 0..3 {
            let mut entry = TimelineBucketEntry::new(format!("entry {}", i));
            ids.push(bucket.put(&mut entry, false).unwrap());
            assert_eq!(entry.id, ids.last().copied());
            assert!(entry.updated_at.is_some());
        }
        assert_eq!(ids, vec![1, 2, 3]);

        let stored = bucket.get(2, false).unwrap().unwrap();
        assert_eq!(stored.payload.as_deref(), Some("entry 1"));
        assert!(bucket.get(99, false).unwrap().is_none());
    }

    #[test]
    fn test_explicit_id_upserts() {
        let (router, _) = setup();
        let bucket = router.timeline_bucket(1, 1).unwrap();

        let mut entry = TimelineBucketEntry::with_id(54, "first");
        assert_eq!(bucket.put(&mut entry, false).unwrap(), 54);
        let created = entry.created_at;

        let mut entry = TimelineBucketEntry::with_id(54, "second").version(2);
        bucket.put(&mut entry, false).unwrap();
        assert_eq!(entry.created_at, created);

        let stored = bucket.get(54, false).unwrap().unwrap();
        assert_eq!(stored.payload.as_deref(), Some("second"));
        assert_eq!(stored.version, 2);

        // The next generated id continues after the explicit one.
        let mut next = TimelineBucketEntry::new("next");
        assert_eq!(bucket.put(&mut next, false).unwrap(), 55);
    }

    #[test]
    fn test_delete() {
        let (router, cache) = setup();
        let bucket = router.timeline_bucket(1, 1).unwrap();
        let id = bucket
            .put(&mut TimelineBucketEntry::new("gone"), true)
            .unwrap();
        assert_eq!(cache.len(), 1);

        bucket.delete(id, true).unwrap();
        assert!(cache.is_empty());
        assert!(bucket.get(id, true).unwrap().is_none());

        assert!(matches!(
            bucket.delete(id, true),
            Err(ChronosError::NoRowAffected)
        ));
        assert_eq!(bucket.errors().len(), 1);
    }

    #[test]
    fn test_cache_hit_and_bypass() {
        let (router, cache) = setup();
        let bucket = router.timeline_bucket(1, 1).unwrap();
        let id = bucket
            .put(&mut TimelineBucketEntry::new("cached"), false)
            .unwrap();
        assert!(cache.is_empty());

        // First cached read fills the cache from the store.
        bucket.get(id, true).unwrap().unwrap();
        assert_eq!(cache.len(), 1);

        bucket
            .binding
            .connection
            .execute(
                &format!("UPDATE {} SET payload = 'fresh' WHERE id = ?", bucket.name()),
                [id as i64],
            )
            .unwrap();

        let hit = bucket.get(id, true).unwrap().unwrap();
        assert_eq!(hit.payload.as_deref(), Some("cached"));
        let bypass = bucket.get(id, false).unwrap().unwrap();
        assert_eq!(bypass.payload.as_deref(), Some("fresh"));
    }

    #[test]
    fn test_scan_order() {
        let (router, cache) = setup();
        let bucket = router.timeline_bucket(1, 1).unwrap();
        for i in 1..=5 {
            bucket
                .put(&mut TimelineBucketEntry::new(i.to_string()), false)
                .unwrap();
        }

        let ids = |entries: Vec<TimelineBucketEntry>| -> Vec<u64> {
            entries.into_iter().filter_map(|e| e.id).collect()
        };
        assert_eq!(ids(bucket.scan(0, 3, false, false).unwrap()), vec![1, 2, 3]);
        assert_eq!(ids(bucket.scan(1, 3, true, false).unwrap()), vec![4, 3, 2]);
        assert!(cache.is_empty());

        assert_eq!(bucket.scan(0, 10, false, true).unwrap().len(), 5);
        assert_eq!(cache.len(), 5);
    }

    #[test]
    fn test_missing_table_is_backend_error() {
        let router = ShardRouter::in_memory(&[1]);
        let bucket = router.get_bucket(BucketKind::Timeline, 1, 9).unwrap();
        let bucket = bucket.into_timeline().unwrap();

        let err = bucket.get(1, false).unwrap_err();
        assert!(matches!(err, ChronosError::Backend { .. }));
        assert!(bucket.latest_error().unwrap().info.contains("tb_9"));
    }
}
