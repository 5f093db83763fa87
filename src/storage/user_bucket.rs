//! User bucket: one per shard, keyed by id and unique email

use super::connection::{ShardBinding, ShardConnection, TransactionScope, Transactional};
use super::types::{from_millis, to_millis, BucketKind, UserBucketEntry};
use crate::cache::{self, CacheMeta, EntryRef};
use crate::config::NamingConfig;
use crate::error::{ChronosError, ChronosResult, ErrorLog, ErrorReporting};
use chrono::Utc;
use rusqlite::{params, Row};

const COLUMNS: &str = "id, email, payload, shard, version, created_at, updated_at, deleted_at";

/// Bucket id used for the user bucket in cache keys
pub const USER_BUCKET_ID: u16 = 0;

fn decode_row(row: &Row<'_>) -> rusqlite::Result<UserBucketEntry> {
    let deleted_at: Option<i64> = row.get(7)?;
    Ok(UserBucketEntry {
        id: Some(row.get::<_, i64>(0)? as u64),
        email: row.get(1)?,
        payload: row.get(2)?,
        shard: row.get(3)?,
        version: row.get(4)?,
        created_at: Some(from_millis(row.get(5)?)),
        updated_at: Some(from_millis(row.get(6)?)),
        deleted_at: deleted_at.map(from_millis),
    })
}

/// Handle to the user bucket of a shard
pub struct UserBucket {
    binding: ShardBinding,
    table: String,
    errors: ErrorLog,
    transaction: TransactionScope,
}

impl UserBucket {
    pub(crate) fn new(binding: ShardBinding) -> Self {
        let table = binding.qualified(&Self::bucket_name(binding.naming()));
        Self {
            binding,
            table,
            errors: ErrorLog::new(),
            transaction: TransactionScope::new(),
        }
    }

    pub fn bucket_name(naming: &NamingConfig) -> String {
        naming.user_bucket_name()
    }

    pub fn shard_id(&self) -> u16 {
        self.binding.shard_id()
    }

    pub fn name(&self) -> &str {
        &self.table
    }

    fn cache_meta(&self, id: u64) -> CacheMeta {
        CacheMeta::new(
            BucketKind::User,
            self.binding.shard_id(),
            USER_BUCKET_ID,
            self.binding.shard_name(),
            EntryRef::Id(id),
        )
    }

    pub fn get(&self, id: u64, use_cache: bool) -> ChronosResult<Option<UserBucketEntry>> {
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

    /// Look a user up by email.
    ///
    /// Always reads the store, since the cache is keyed by id; the result is
    /// written through under its id.
    pub fn get_by_email(
        &self,
        email: &str,
        use_cache: bool,
    ) -> ChronosResult<Option<UserBucketEntry>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE email = ? LIMIT 1",
            COLUMNS, self.table
        );
        let entry = self
            .binding
            .connection
            .query_row(&sql, params![email], decode_row)
            .map_err(|e| self.errors.record(e))?;

        if let Some(entry) = &entry {
            if let Some(id) = entry.id {
                cache::store(self.binding.cache_for(use_cache), &self.cache_meta(id), entry);
            }
        }
        Ok(entry)
    }

    /// Store the user and return its id.
    ///
    /// With an id the row is upserted on id; without one it is upserted on
    /// email, so re-putting a known email updates that user.
    pub fn put(&self, entry: &mut UserBucketEntry, use_cache: bool) -> ChronosResult<u64> {
        let now = Utc::now();
        let created_at = to_millis(&entry.created_at.unwrap_or(now));
        let updated_at = to_millis(&now);
        let deleted_at = entry.deleted_at.as_ref().map(to_millis);

        let update_set = "payload = excluded.payload,
                shard = excluded.shard,
                version = excluded.version,
                updated_at = excluded.updated_at,
                deleted_at = excluded.deleted_at";

        let stored: Option<(i64, i64)> = match entry.id {
            None => {
                let sql = format!(
                    "INSERT INTO {} (email, payload, shard, version, created_at, updated_at, deleted_at)
                     VALUES (?, ?, ?, ?, ?, ?, ?)
                     ON CONFLICT(email) DO UPDATE SET {}
                     RETURNING id, created_at",
                    self.table, update_set
                );
                self.binding.connection.query_row(
                    &sql,
                    params![
                        entry.email,
                        entry.payload,
                        entry.shard,
                        entry.version,
                        created_at,
                        updated_at,
                        deleted_at
                    ],
                    |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
                )
            }
            Some(id) => {
                let sql = format!(
                    "INSERT INTO {} ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                     ON CONFLICT(id) DO UPDATE SET email = excluded.email, {}
                     RETURNING id, created_at",
                    self.table, COLUMNS, update_set
                );
                self.binding.connection.query_row(
                    &sql,
                    params![
                        id as i64,
                        entry.email,
                        entry.payload,
                        entry.shard,
                        entry.version,
                        created_at,
                        updated_at,
                        deleted_at
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

    /// Delete a user.
    ///
    /// A soft delete stamps `deleted_at` and keeps the row; a hard delete
    /// removes it. Either way the cached copy is dropped.
    pub fn delete(&self, id: u64, hard: bool, use_cache: bool) -> ChronosResult<()> {
        let result = if hard {
            let sql = format!("DELETE FROM {} WHERE id = ?", self.table);
            self.binding.connection.execute(&sql, params![id as i64])
        } else {
            let now = to_millis(&Utc::now());
            let sql = format!(
                "UPDATE {} SET deleted_at = ?, updated_at = ? WHERE id = ?",
                self.table
            );
            self.binding
                .connection
                .execute(&sql, params![now, now, id as i64])
        };
        let affected = result.map_err(|e| self.errors.record(e))?;

        cache::evict(self.binding.cache_for(use_cache), &self.cache_meta(id));

        if affected == 0 {
            return Err(self.errors.record(ChronosError::NoRowAffected));
        }
        Ok(())
    }

    pub fn scan(
        &self,
        offset: u64,
        count: u64,
        reverse: bool,
        use_cache: bool,
    ) -> ChronosResult<Vec<UserBucketEntry>> {
        let order = if reverse { "DESC" } else { "ASC" };
        let sql = format!(
            "SELECT {} FROM {} ORDER BY id {} LIMIT ? OFFSET ?",
            COLUMNS, self.table, order
        );
        let users = self
            .binding
            .connection
            .query_rows(&sql, params![count as i64, offset as i64], decode_row)
            .map_err(|e| self.errors.record(e))?;

        let cache = self.binding.cache_for(use_cache);
        for user in &users {
            if let Some(id) = user.id {
                cache::store(cache, &self.cache_meta(id), user);
            }
        }
        Ok(users)
    }
}

impl ErrorReporting for UserBucket {
    fn error_log(&self) -> &ErrorLog {
        &self.errors
    }
}

impl Transactional for UserBucket {
    fn connection(&self) -> &ShardConnection {
        self.binding.connection()
    }

    fn transaction_scope(&self) -> &TransactionScope {
        &self.transaction
    }
}
