//! TimelineReader - cursor-based timeline reconstruction
//!
//! Walks an index newest-first and resolves every pointer against its
//! timeline bucket, producing pages of real entries.
//!
//! # Cursor
//!
//! - `offset`: index rows already consumed by the underlying scan
//! - `last_id`: exclusive upper bound on index ids still eligible
//!
//! A fresh reader built from a previous reader's `(offset, last_id)` carries
//! on where that one stopped. Either half alone also works: `last_id` alone
//! re-walks the top of the index but delivers nothing twice, `offset` alone
//! relies on the scan order.
//!
//! The cursor is a raw scan offset. Index rows deleted before the cursor
//! between two reads shift the window, so an entry may be skipped or, more
//! rarely, seen again. Callers are expected to tolerate this.
//!
//! # Tombstones
//!
//! A pointer whose bucket or entry cannot be resolved is skipped without
//! error and without touching the router's error log. Failures of the index
//! scan itself are returned, and the cursor is put back where the failed
//! read started so the same page can be requested again.

use super::{TimelineIndex, TimelineIndexEntry, TimelineIndexId};
use crate::error::ChronosResult;
use crate::router::ShardRouter;
use crate::storage::TimelineBucketEntry;

/// Starting `last_id`: above any id an index can hand out
pub const DEFAULT_LAST_ID: u64 = 1 << 38;

/// Rows fetched per follow-up round
pub const DEFAULT_BATCH_SIZE: u64 = 10;

/// Resumable reader over one timeline index
pub struct TimelineReader<'a> {
    router: &'a ShardRouter,
    index: &'a TimelineIndex,
    offset: u64,
    last_id: u64,
    batch_size: u64,
}

impl<'a> TimelineReader<'a> {
    /// Reader positioned at the newest index row
    pub fn new(router: &'a ShardRouter, index: &'a TimelineIndex) -> Self {
        Self::with_cursor(router, index, 0, DEFAULT_LAST_ID)
    }

    /// Reader resuming from a previous reader's cursor
    pub fn with_cursor(
        router: &'a ShardRouter,
        index: &'a TimelineIndex,
        offset: u64,
        last_id: u64,
    ) -> Self {
        Self {
            router,
            index,
            offset,
            last_id,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Builder: rows fetched per follow-up round
    pub fn batch_size(mut self, batch_size: u64) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn last_id(&self) -> u64 {
        self.last_id
    }

    pub fn set_offset(&mut self, offset: u64) {
        self.offset = offset;
    }

    pub fn set_last_id(&mut self, last_id: u64) {
        self.last_id = last_id;
    }

    /// Next `count` resolved entries across the whole index
    pub fn read(&mut self, count: usize) -> ChronosResult<Vec<TimelineBucketEntry>> {
        self.read_page(None, count)
    }

    /// Next `count` resolved entries of timeline `a`
    pub fn read_a(&mut self, a: u64, count: usize) -> ChronosResult<Vec<TimelineBucketEntry>> {
        self.read_page(Some(a), count)
    }

    fn fetch(&self, a: Option<u64>, limit: u64) -> ChronosResult<Vec<TimelineIndexEntry>> {
        match a {
            Some(a) => self.index.scan_by_a(a, self.offset, limit, true),
            None => self.index.scan(self.offset, limit, true),
        }
    }

    fn read_page(&mut self, a: Option<u64>, count: usize) -> ChronosResult<Vec<TimelineBucketEntry>> {
        let cursor = (self.offset, self.last_id);
        self.collect(a, count).map_err(|e| {
            (self.offset, self.last_id) = cursor;
            e
        })
    }

    fn collect(&mut self, a: Option<u64>, count: usize) -> ChronosResult<Vec<TimelineBucketEntry>> {
        let mut result = Vec::with_capacity(count);
        if count == 0 {
            return Ok(result);
        }

        loop {
            // Ask for the whole page until something resolves, then top up
            // in smaller rounds.
            let limit = if result.is_empty() {
                count as u64
            } else {
                self.batch_size
            };
            let batch = self.fetch(a, limit)?;
            tracing::debug!(
                index = self.index.name(),
                offset = self.offset,
                limit,
                rows = batch.len(),
                "Timeline reader batch"
            );
            if batch.is_empty() {
                break;
            }

            for row in batch {
                self.offset += 1;

                let Some(id) = row.id else { continue };
                if id >= self.last_id {
                    continue;
                }
                self.last_id = id;

                if let Some(entry) = self.resolve(row.target()) {
                    result.push(entry);
                    if result.len() >= count {
                        return Ok(result);
                    }
                }
            }
        }

        Ok(result)
    }

    fn resolve(&self, target: TimelineIndexId) -> Option<TimelineBucketEntry> {
        let bucket = match self
            .router
            .resolve_timeline_bucket(target.shard_id(), target.bucket_id())
        {
            Ok(bucket) => bucket,
            Err(e) => {
                tracing::trace!(%target, error = %e, "Skipping pointer to unreachable bucket");
                return None;
            }
        };

        match bucket.get(target.entry_id(), true) {
            Ok(Some(entry)) => Some(entry),
            Ok(None) => {
                tracing::trace!(%target, "Skipping tombstone");
                None
            }
            Err(e) => {
                tracing::trace!(%target, error = %e, "Skipping unresolvable entry");
                None
            }
        }
    }
}
