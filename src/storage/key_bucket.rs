//! Key bucket: string-keyed entry store

use super::connection::{ShardBinding, ShardConnection, TransactionScope, Transactional};
use super::types::{from_millis, to_millis, BucketKind, KeyBucketEntry};
use crate::cache::{self, CacheMeta, EntryRef};
use crate::config::NamingConfig;
use crate::error::{ChronosError, ChronosResult, ErrorLog, ErrorReporting};
use chrono::Utc;
use rusqlite::{params, Row};

const COLUMNS: &str = "key, payload, version, created_at, updated_at";

fn decode_row(row: &Row<'_>) -> rusqlite::Result<KeyBucketEntry> {
    Ok(KeyBucketEntry {
        key: row.get(0)?,
        payload: row.get(1)?,
        version: row.get(2)?,
        created_at: Some(from_millis(row.get(3)?)),
        updated_at: Some(from_millis(row.get(4)?)),
    })
}

/// Handle to one key bucket of a shard
pub struct KeyBucket {
    binding: ShardBinding,
    bucket_id: u16,
    table: String,
    errors: ErrorLog,
    transaction: TransactionScope,
}

impl KeyBucket {
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

    /// Unqualified table name of bucket `bucket_id`
    pub fn bucket_name(naming: &NamingConfig, bucket_id: u16) -> String {
        naming.key_bucket_name(bucket_id)
    }

    pub fn id(&self) -> u16 {
        self.bucket_id
    }

    pub fn shard_id(&self) -> u16 {
        self.binding.shard_id()
    }

    /// Schema-qualified table name
    pub fn name(&self) -> &str {
        &self.table
    }

    fn cache_meta(&self, key: &str) -> CacheMeta {
        CacheMeta::new(
            BucketKind::Key,
            self.binding.shard_id(),
            self.bucket_id,
            self.binding.shard_name(),
            EntryRef::Key(key.to_string()),
        )
    }

    pub fn get(&self, key: &str, use_cache: bool) -> ChronosResult<Option<KeyBucketEntry>> {
        let cache = self.binding.cache_for(use_cache);
        let meta = self.cache_meta(key);
        if let Some(entry) = cache::cached(cache, &meta) {
            return Ok(Some(entry));
        }

        let sql = format!("SELECT {} FROM {} WHERE key = ? LIMIT 1", COLUMNS, self.table);
        let entry = self
            .binding
            .connection
            .query_row(&sql, params![key], decode_row)
            .map_err(|e| self.errors.record(e))?;

        if let Some(entry) = &entry {
            cache::store(cache, &meta, entry);
        }
        Ok(entry)
    }

    /// Insert or replace the entry under its key
    pub fn put(&self, entry: &mut KeyBucketEntry, use_cache: bool) -> ChronosResult<()> {
        let now = Utc::now();
        let created_at = entry.created_at.unwrap_or(now);

        let sql = format!(
            "INSERT INTO {} ({}) VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET
                payload = excluded.payload,
                version = excluded.version,
                updated_at = excluded.updated_at
             RETURNING created_at",
            self.table, COLUMNS
        );
        let stored_created_at: Option<i64> = self
            .binding
            .connection
            .query_row(
                &sql,
                params![
                    entry.key,
                    entry.payload,
                    entry.version,
                    to_millis(&created_at),
                    to_millis(&now)
                ],
                |row| row.get::<_, i64>(0),
            )
            .map_err(|e| self.errors.record(e))?;

        let Some(stored_created_at) = stored_created_at else {
            return Err(self.errors.record(ChronosError::NoRowAffected));
        };
        entry.created_at = Some(from_millis(stored_created_at));
        entry.updated_at = Some(now);

        cache::store(
            self.binding.cache_for(use_cache),
            &self.cache_meta(&entry.key),
            &*entry,
        );
        Ok(())
    }

    /// Delete the entry; fails with `NoRowAffected` if the key is absent
    pub fn delete(&self, key: &str, use_cache: bool) -> ChronosResult<()> {
        let sql = format!("DELETE FROM {} WHERE key = ?", self.table);
        let affected = self
            .binding
            .connection
            .execute(&sql, params![key])
            .map_err(|e| self.errors.record(e))?;

        cache::evict(self.binding.cache_for(use_cache), &self.cache_meta(key));

        if affected == 0 {
            return Err(self.errors.record(ChronosError::NoRowAffected));
        }
        Ok(())
    }

    /// Window of entries ordered by key
    pub fn scan(
        &self,
        offset: u64,
        count: u64,
        use_cache: bool,
    ) -> ChronosResult<Vec<KeyBucketEntry>> {
        let sql = format!(
            "SELECT {} FROM {} ORDER BY key ASC LIMIT ? OFFSET ?",
            COLUMNS, self.table
        );
        let entries = self
            .binding
            .connection
            .query_rows(&sql, params![count as i64, offset as i64], decode_row)
            .map_err(|e| self.errors.record(e))?;

        let cache = self.binding.cache_for(use_cache);
        for entry in &entries {
            cache::store(cache, &self.cache_meta(&entry.key), entry);
        }
        Ok(entries)
    }
}

impl ErrorReporting for KeyBucket {
    fn error_log(&self) -> &ErrorLog {
        &self.errors
    }
}

impl Transactional for KeyBucket {
    fn connection(&self) -> &ShardConnection {
        self.binding.connection()
    }

    fn transaction_scope(&self) -> &TransactionScope {
        &self.transaction
    }
}
