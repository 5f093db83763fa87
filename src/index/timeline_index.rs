//! Timeline index handle
//!
//! Rows are keyed by `(id, a)`. A put without an id appends a row under the
//! next value of the index's id sequence, so an id is never reused after a
//! delete; a put with an id upserts that exact pair, which means a changed
//! `a` produces a second row sharing the id rather than moving the existing
//! one.

use super::{decode_index_row, TimelineIndexEntry, INDEX_COLUMNS};
use crate::config::NamingConfig;
use crate::error::{ChronosError, ChronosResult, ErrorLog, ErrorReporting};
use crate::storage::{
    from_millis, schema, to_millis, ShardBinding, ShardConnection, TransactionScope, Transactional,
};
use chrono::Utc;
use rusqlite::params;

/// Handle to one timeline index of a shard
pub struct TimelineIndex {
    binding: ShardBinding,
    index_id: u32,
    table: String,
    seq: String,
    errors: ErrorLog,
    transaction: TransactionScope,
}

impl TimelineIndex {
    pub(crate) fn new(binding: ShardBinding, index_id: u32) -> Self {
        let name = Self::index_name(binding.naming(), index_id);
        let table = binding.qualified(&name);
        let seq = binding.qualified(&schema::index_seq_name(&name));
        Self {
            binding,
            index_id,
            table,
            seq,
            errors: ErrorLog::new(),
            transaction: TransactionScope::new(),
        }
    }

    /// Unqualified table name of index `index_id`
    pub fn index_name(naming: &NamingConfig, index_id: u32) -> String {
        naming.timeline_index_name(index_id)
    }

    pub fn id(&self) -> u32 {
        self.index_id
    }

    pub fn shard_id(&self) -> u16 {
        self.binding.shard_id()
    }

    pub fn name(&self) -> &str {
        &self.table
    }

    fn find_one<P: rusqlite::Params>(
        &self,
        filter: &str,
        params: P,
    ) -> ChronosResult<Option<TimelineIndexEntry>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {} LIMIT 1",
            INDEX_COLUMNS, self.table, filter
        );
        self.binding
            .connection
            .query_row(&sql, params, decode_index_row)
            .map_err(|e| self.errors.record(e))
    }

    /// Any one row with this id
    pub fn get(&self, id: u64) -> ChronosResult<Option<TimelineIndexEntry>> {
        self.find_one("id = ?", params![id as i64])
    }

    pub fn get_by_ab(&self, a: u64, b: u64) -> ChronosResult<Option<TimelineIndexEntry>> {
        self.find_one("a = ? AND b = ?", params![a as i64, b as i64])
    }

    /// Exact lookup on the primary key
    pub fn get_by_id_a(&self, id: u64, a: u64) -> ChronosResult<Option<TimelineIndexEntry>> {
        self.find_one("id = ? AND a = ?", params![id as i64, a as i64])
    }

    /// Store the row and return its id, writing the id back into `entry`
    pub fn put(&self, entry: &mut TimelineIndexEntry) -> ChronosResult<u64> {
        let now = Utc::now();
        let created_at = to_millis(&entry.created_at.unwrap_or(now));
        let updated_at = to_millis(&now);

        let stored: Option<(i64, i64)> = match entry.id {
            None => {
                let sql = format!(
                    "INSERT INTO {table} ({columns})
                     SELECT ?, ?, ?, last_id + 1, ? FROM {seq}
                     RETURNING id, created_at",
                    table = self.table,
                    seq = self.seq,
                    columns = INDEX_COLUMNS
                );
                self.binding.connection.query_row(
                    &sql,
                    params![entry.a as i64, entry.b as i64, created_at, updated_at],
                    |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
                )
            }
            Some(id) => {
                let sql = format!(
                    "INSERT INTO {} ({}) VALUES (?, ?, ?, ?, ?)
                     ON CONFLICT(id, a) DO UPDATE SET
                        b = excluded.b,
                        updated_at = excluded.updated_at
                     RETURNING id, created_at",
                    self.table, INDEX_COLUMNS
                );
                self.binding.connection.query_row(
                    &sql,
                    params![
                        entry.a as i64,
                        entry.b as i64,
                        created_at,
                        id as i64,
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
        Ok(id)
    }

    fn delete_where<P: rusqlite::Params>(&self, filter: &str, params: P) -> ChronosResult<usize> {
        let sql = format!("DELETE FROM {} WHERE {}", self.table, filter);
        let affected = self
            .binding
            .connection
            .execute(&sql, params)
            .map_err(|e| self.errors.record(e))?;

        if affected == 0 {
            return Err(self.errors.record(ChronosError::NoRowAffected));
        }
        Ok(affected)
    }

    /// Delete every row sharing `id`, returning how many went
    pub fn delete(&self, id: u64) -> ChronosResult<usize> {
        self.delete_where("id = ?", params![id as i64])
    }

    /// Delete a whole timeline
    pub fn delete_by_a(&self, a: u64) -> ChronosResult<usize> {
        self.delete_where("a = ?", params![a as i64])
    }

    /// Delete exactly the row `(id, a)`, leaving siblings sharing the id
    pub fn delete_by_id_a(&self, id: u64, a: u64) -> ChronosResult<()> {
        self.delete_where("id = ? AND a = ?", params![id as i64, a as i64])
            .map(|_| ())
    }

    fn scan_where<P: rusqlite::Params>(
        &self,
        filter: &str,
        params: P,
        reverse: bool,
    ) -> ChronosResult<Vec<TimelineIndexEntry>> {
        let order = if reverse { "DESC" } else { "ASC" };
        let sql = format!(
            "SELECT {} FROM {} {} ORDER BY id {} LIMIT ? OFFSET ?",
            INDEX_COLUMNS, self.table, filter, order
        );
        self.binding
            .connection
            .query_rows(&sql, params, decode_index_row)
            .map_err(|e| self.errors.record(e))
    }

    /// Window of rows ordered by id, newest first when `reverse`.
    ///
    /// The window is a plain `LIMIT`/`OFFSET`; writes between calls shift it.
    pub fn scan(
        &self,
        offset: u64,
        count: u64,
        reverse: bool,
    ) -> ChronosResult<Vec<TimelineIndexEntry>> {
        self.scan_where("", params![count as i64, offset as i64], reverse)
    }

    /// Window of one timeline's rows ordered by id
    pub fn scan_by_a(
        &self,
        a: u64,
        offset: u64,
        count: u64,
        reverse: bool,
    ) -> ChronosResult<Vec<TimelineIndexEntry>> {
        self.scan_where(
            "WHERE a = ?",
            params![a as i64, count as i64, offset as i64],
            reverse,
        )
    }
}

impl ErrorReporting for TimelineIndex {
    fn error_log(&self) -> &ErrorLog {
        &self.errors
    }
}

impl Transactional for TimelineIndex {
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
    use crate::error::NO_ROW_AFFECTED;
    use crate::index::{IndexKind, TimelineIndexId};
    use crate::router::ShardRouter;

    fn index() -> TimelineIndex {
        let router = ShardRouter::in_memory(&[1]);
        router.create_index(IndexKind::Timeline, 1, 1).unwrap()
    }

    fn ids(rows: &[TimelineIndexEntry]) -> Vec<u64> {
        rows.iter().filter_map(|r| r.id).collect()
    }

    #[test]
    fn test_put_assigns_ids() {
        let index = index();
        assert_eq!(index.name(), "sha_1.tbx_1");

        for expected in 1..=3u64 {
            let mut row = TimelineIndexEntry::pointing_to(7, TimelineIndexId::new(1, 1, expected));
            assert_eq!(index.put(&mut row).unwrap(), expected);
            assert_eq!(row.id, Some(expected));
            assert!(row.created_at.is_some());
        }

        let row = index.get(2).unwrap().unwrap();
        assert_eq!(row.a, 7);
        assert_eq!(row.target().entry_id(), 2);
        assert!(index.get(4).unwrap().is_none());
    }

    #[test]
    fn test_deleted_ids_are_not_reused() {
        let index = index();
        for _ in 0..3 {
            index.put(&mut TimelineIndexEntry::new(7, 1)).unwrap();
        }

        index.delete(3).unwrap();
        let mut row = TimelineIndexEntry::new(7, 2);
        assert_eq!(index.put(&mut row).unwrap(), 4);

        index.delete_by_a(7).unwrap();
        assert_eq!(index.put(&mut TimelineIndexEntry::new(8, 3)).unwrap(), 5);
        assert!(index.get(3).unwrap().is_none());
    }

    #[test]
    fn test_generated_ids_follow_explicit_ones() {
        let index = index();
        index.put(&mut TimelineIndexEntry::with_id(40, 1, 1)).unwrap();
        assert_eq!(index.put(&mut TimelineIndexEntry::new(1, 2)).unwrap(), 41);

        // Upserting an existing pair leaves the sequence alone.
        index.put(&mut TimelineIndexEntry::with_id(40, 1, 3)).unwrap();
        assert_eq!(index.put(&mut TimelineIndexEntry::new(1, 4)).unwrap(), 42);
    }

    #[test]
    fn test_upsert_by_id_a() {
        let index = index();
        let mut row = TimelineIndexEntry::new(1, 100);
        let id = index.put(&mut row).unwrap();

        // Same (id, a): updated in place.
        let mut same = TimelineIndexEntry::with_id(id, 1, 200);
        index.put(&mut same).unwrap();
        assert_eq!(same.created_at, row.created_at);
        assert_eq!(index.get_by_id_a(id, 1).unwrap().unwrap().b, 200);
        assert_eq!(index.scan(0, 10, false).unwrap().len(), 1);

        // Same id, different a: a second row sharing the id.
        let mut sibling = TimelineIndexEntry::with_id(id, 2, 300);
        index.put(&mut sibling).unwrap();
        assert_eq!(index.get_by_id_a(id, 1).unwrap().unwrap().b, 200);
        assert_eq!(index.get_by_id_a(id, 2).unwrap().unwrap().b, 300);
        assert_eq!(index.scan(0, 10, false).unwrap().len(), 2);

        let found = index.get_by_ab(2, 300).unwrap().unwrap();
        assert_eq!(found.id, Some(id));
        assert!(index.get_by_ab(2, 200).unwrap().is_none());
    }

    #[test]
    fn test_delete_removes_every_row_with_id() {
        let index = index();
        let id = index.put(&mut TimelineIndexEntry::new(1, 10)).unwrap();
        index.put(&mut TimelineIndexEntry::with_id(id, 2, 10)).unwrap();
        let other = index.put(&mut TimelineIndexEntry::new(1, 11)).unwrap();

        assert_eq!(index.delete(id).unwrap(), 2);
        assert!(index.get(id).unwrap().is_none());
        assert!(index.get(other).unwrap().is_some());

        let err = index.delete(id).unwrap_err();
        assert!(matches!(err, ChronosError::NoRowAffected));
        assert_eq!(index.latest_error().unwrap().code, NO_ROW_AFFECTED);
    }

    #[test]
    fn test_delete_by_id_a_keeps_siblings() {
        let index = index();
        let id = index.put(&mut TimelineIndexEntry::new(1, 10)).unwrap();
        index.put(&mut TimelineIndexEntry::with_id(id, 2, 10)).unwrap();

        index.delete_by_id_a(id, 1).unwrap();
        assert!(index.get_by_id_a(id, 1).unwrap().is_none());
        assert!(index.get_by_id_a(id, 2).unwrap().is_some());

        assert!(matches!(
            index.delete_by_id_a(id, 1),
            Err(ChronosError::NoRowAffected)
        ));
    }

    #[test]
    fn test_delete_by_a() {
        let index = index();
        for a in [1, 2, 1, 1] {
            index.put(&mut TimelineIndexEntry::new(a, 0)).unwrap();
        }
        assert_eq!(index.delete_by_a(1).unwrap(), 3);
        assert_eq!(ids(&index.scan(0, 10, false).unwrap()), vec![2]);
        assert!(index.delete_by_a(1).is_err());
    }

    #[test]
    fn test_scan_windows() {
        let index = index();
        for i in 1..=6u64 {
            index.put(&mut TimelineIndexEntry::new(i % 2, i)).unwrap();
        }

        assert_eq!(ids(&index.scan(0, 3, false).unwrap()), vec![1, 2, 3]);
        assert_eq!(ids(&index.scan(0, 3, true).unwrap()), vec![6, 5, 4]);
        assert_eq!(ids(&index.scan(4, 3, true).unwrap()), vec![2, 1]);
        assert_eq!(ids(&index.scan_by_a(1, 0, 10, true).unwrap()), vec![5, 3, 1]);
        assert_eq!(ids(&index.scan_by_a(0, 1, 1, false).unwrap()), vec![4]);
        assert!(index.scan_by_a(9, 0, 10, true).unwrap().is_empty());
    }

    #[test]
    fn test_bulk_insert_in_transaction() {
        let index = index();
        index.begin_transaction().unwrap();
        for i in 0..50 {
            index.put(&mut TimelineIndexEntry::new(1, i)).unwrap();
        }
        index.commit_transaction().unwrap();
        assert!(!index.in_transaction());
        assert_eq!(index.scan(0, 100, false).unwrap().len(), 50);
    }

    #[test]
    fn test_missing_index_table() {
        let router = ShardRouter::in_memory(&[1]);
        let index = router.get_index(IndexKind::Timeline, 1, 5).unwrap();
        assert!(index.scan(0, 1, true).is_err());
        assert!(index.latest_error().unwrap().info.contains("tbx_5"));
    }
}
