//! Chronological secondary index
//!
//! An index row `(id, a, b)` says "entry `b` belongs to timeline `a` at
//! position `id`". `b` is a packed [`TimelineIndexId`] addressing the
//! physical entry in some shard and bucket. Rows are stored under the
//! compound key `(id, a)`, so one id may appear under several grouping keys.
//!
//! - **id**: the packed shard/bucket/entry pointer codec
//! - **timeline_index**: the index handle (get, put, delete, scan)
//! - **reader**: cursor-based timeline reconstruction over an index
//!
//! The index is never cached.

pub mod id;
pub mod reader;
pub mod timeline_index;

pub use id::TimelineIndexId;
pub use reader::TimelineReader;
pub use timeline_index::TimelineIndex;

use crate::storage::from_millis;
use chrono::{DateTime, Utc};
use rusqlite::Row;
use serde::{Deserialize, Serialize};

/// Kind of index a router can create
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    Timeline,
}

impl IndexKind {
    pub fn code(&self) -> u32 {
        match self {
            IndexKind::Timeline => 1000,
        }
    }
}

/// One row of a timeline index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineIndexEntry {
    /// Store-assigned position; `None` until the row is inserted
    pub id: Option<u64>,
    /// Grouping key, e.g. the timeline owner
    pub a: u64,
    /// Packed pointer at the physical entry
    pub b: u64,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl TimelineIndexEntry {
    pub fn new(a: u64, b: u64) -> Self {
        Self {
            id: None,
            a,
            b,
            created_at: None,
            updated_at: None,
        }
    }

    /// A new row in timeline `a` pointing at `target`
    pub fn pointing_to(a: u64, target: TimelineIndexId) -> Self {
        Self::new(a, target.pack())
    }

    /// A row addressing an existing position (upserted on put)
    pub fn with_id(id: u64, a: u64, b: u64) -> Self {
        Self {
            id: Some(id),
            ..Self::new(a, b)
        }
    }

    /// The physical entry this row points at
    pub fn target(&self) -> TimelineIndexId {
        TimelineIndexId::unpack(self.b)
    }
}

pub(crate) const INDEX_COLUMNS: &str = "a, b, created_at, id, updated_at";

pub(crate) fn decode_index_row(row: &Row<'_>) -> rusqlite::Result<TimelineIndexEntry> {
    Ok(TimelineIndexEntry {
        a: row.get::<_, i64>(0)? as u64,
        b: row.get::<_, i64>(1)? as u64,
        created_at: Some(from_millis(row.get(2)?)),
        id: Some(row.get::<_, i64>(3)? as u64),
        updated_at: Some(from_millis(row.get(4)?)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_target() {
        let target = TimelineIndexId::new(2, 5, 1234);
        let entry = TimelineIndexEntry::pointing_to(9, target);
        assert!(entry.id.is_none());
        assert_eq!(entry.a, 9);
        assert_eq!(entry.target(), target);
    }

    #[test]
    fn test_index_kind_code() {
        assert_eq!(IndexKind::Timeline.code(), 1000);
    }
}
