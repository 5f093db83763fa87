//! TimelineIndexId - packed (shard, bucket, entry) pointer
//!
//! Layout of the packed `u64` (bit 63 is always zero):
//!
//! ```text
//!  62        51 50         38 37                         0
//! +------------+-------------+----------------------------+
//! |  shard 12  |  bucket 13  |          entry 38          |
//! +------------+-------------+----------------------------+
//! ```
//!
//! Inputs wider than their field are masked, never rejected. Stored index
//! values depend on these widths, so they must not change.

use serde::{Deserialize, Serialize};

const SHARD_MASK: u64 = 0xFFF;
const BUCKET_MASK: u64 = 0x1FFF;
const ENTRY_MASK: u64 = 0x3F_FFFF_FFFF;

const SHARD_SHIFT: u32 = 51;
const BUCKET_SHIFT: u32 = 38;

/// Address of a physical entry: shard, bucket and entry id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TimelineIndexId {
    shard_id: u16,
    bucket_id: u16,
    entry_id: u64,
}

impl TimelineIndexId {
    /// Largest entry id that survives packing
    pub const MAX_ENTRY_ID: u64 = ENTRY_MASK;

    /// Build an id; each field is masked to its width
    pub fn new(shard_id: u16, bucket_id: u16, entry_id: u64) -> Self {
        Self {
            shard_id: (shard_id as u64 & SHARD_MASK) as u16,
            bucket_id: (bucket_id as u64 & BUCKET_MASK) as u16,
            entry_id: entry_id & ENTRY_MASK,
        }
    }

    pub fn shard_id(&self) -> u16 {
        self.shard_id
    }

    pub fn bucket_id(&self) -> u16 {
        self.bucket_id
    }

    pub fn entry_id(&self) -> u64 {
        self.entry_id
    }

    /// Packed integer form of this id
    pub fn pack(&self) -> u64 {
        Self::pack_raw(self.shard_id as u64, self.bucket_id as u64, self.entry_id)
    }

    /// Pack raw values, silently truncating anything out of range
    pub fn pack_raw(shard_id: u64, bucket_id: u64, entry_id: u64) -> u64 {
        ((shard_id & SHARD_MASK) << SHARD_SHIFT)
            | ((bucket_id & BUCKET_MASK) << BUCKET_SHIFT)
            | (entry_id & ENTRY_MASK)
    }

    pub fn unpack(packed: u64) -> Self {
        Self {
            shard_id: Self::unpack_shard_id(packed),
            bucket_id: Self::unpack_bucket_id(packed),
            entry_id: Self::unpack_entry_id(packed),
        }
    }

    pub fn unpack_shard_id(packed: u64) -> u16 {
        ((packed >> SHARD_SHIFT) & SHARD_MASK) as u16
    }

    pub fn unpack_bucket_id(packed: u64) -> u16 {
        ((packed >> BUCKET_SHIFT) & BUCKET_MASK) as u16
    }

    pub fn unpack_entry_id(packed: u64) -> u64 {
        packed & ENTRY_MASK
    }
}

impl From<TimelineIndexId> for u64 {
    fn from(id: TimelineIndexId) -> Self {
        id.pack()
    }
}

impl From<u64> for TimelineIndexId {
    fn from(packed: u64) -> Self {
        Self::unpack(packed)
    }
}

impl std::fmt::Display for TimelineIndexId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.shard_id, self.bucket_id, self.entry_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_raw() {
        assert_eq!(TimelineIndexId::pack_raw(1, 1, 1), 2252074691592193);
        assert_eq!(TimelineIndexId::pack_raw(0, 0, 0), 0);
    }

    #[test]
    fn test_pack_raw_truncates() {
        assert_eq!(
            TimelineIndexId::pack_raw(0x7FFF_FFFF_FFFF_FFFF, 0, 0),
            9221120237041090560
        );
        assert_eq!(
            TimelineIndexId::pack_raw(0, 0x7FFF_FFFF_FFFF_FFFF, 0),
            2251524935778304
        );
        assert_eq!(
            TimelineIndexId::pack_raw(0, 0, 0x7FFF_FFFF_FFFF_FFFF),
            274877906943
        );
    }

    #[test]
    fn test_unpack() {
        let id = TimelineIndexId::unpack(2252074691592193);
        assert_eq!(id.shard_id(), 1);
        assert_eq!(id.bucket_id(), 1);
        assert_eq!(id.entry_id(), 1);

        let packed = TimelineIndexId::pack_raw(4095, 8191, TimelineIndexId::MAX_ENTRY_ID);
        assert_eq!(TimelineIndexId::unpack_shard_id(packed), 4095);
        assert_eq!(TimelineIndexId::unpack_bucket_id(packed), 8191);
        assert_eq!(
            TimelineIndexId::unpack_entry_id(packed),
            TimelineIndexId::MAX_ENTRY_ID
        );
        assert!(packed <= i64::MAX as u64);
    }

    #[test]
    fn test_round_trip_samples() {
        for &(s, b, e) in &[
            (0u16, 0u16, 0u64),
            (1, 1, 1),
            (12, 300, 987_654_321),
            (4095, 8191, 274_877_906_943),
            (2048, 1, 1 << 37),
        ] {
            let id = TimelineIndexId::new(s, b, e);
            assert_eq!(TimelineIndexId::unpack(id.pack()), id);
        }
    }

    #[test]
    fn test_out_of_range_round_trips_to_masked_value() {
        let id = TimelineIndexId::new(4096 + 5, 8192 + 7, (1 << 38) + 9);
        assert_eq!(id.shard_id(), 5);
        assert_eq!(id.bucket_id(), 7);
        assert_eq!(id.entry_id(), 9);

        let packed = TimelineIndexId::pack_raw(4096 + 5, 8192 + 7, (1 << 38) + 9);
        assert_eq!(TimelineIndexId::unpack(packed), id);
    }

    #[test]
    fn test_conversions() {
        let id = TimelineIndexId::new(3, 4, 5);
        let packed: u64 = id.into();
        assert_eq!(TimelineIndexId::from(packed), id);
        assert_eq!(id.to_string(), "3/4/5");
    }
}
