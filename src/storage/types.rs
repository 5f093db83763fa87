//! Entry types held by the three bucket kinds
//!
//! - `KeyBucketEntry`: addressed by a string key
//! - `TimelineBucketEntry`: addressed by a store-assigned numeric id
//! - `UserBucketEntry`: a timeline-style row with email, shard and soft-delete
//!
//! An `id` of `None` means "not stored yet"; the store assigns it on insert
//! and never hands out 0.

use crate::error::ChronosResult;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Kind of entry store a bucket holds
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum BucketKind {
    /// String-keyed payloads
    Key,
    /// Id-addressed payloads, the targets of timeline index pointers
    Timeline,
    /// User records, one bucket per shard
    User,
}

impl BucketKind {
    /// Stable numeric code of this kind
    pub fn code(&self) -> u32 {
        match self {
            BucketKind::Key => 1,
            BucketKind::Timeline => 2,
            BucketKind::User => 3,
        }
    }

    /// Prefix used when deriving cache keys
    pub fn cache_prefix(&self) -> &'static str {
        match self {
            BucketKind::Key => "KB",
            BucketKind::Timeline => "TB",
            BucketKind::User => "UB",
        }
    }
}

impl std::fmt::Display for BucketKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BucketKind::Key => write!(f, "key"),
            BucketKind::Timeline => write!(f, "timeline"),
            BucketKind::User => write!(f, "user"),
        }
    }
}

/// Convert a timestamp to the persisted representation (unix millis)
pub fn to_millis(ts: &DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

/// Convert persisted unix millis back to a timestamp
pub fn from_millis(millis: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(millis).unwrap_or_default()
}

/// Payload access shared by every entry type
pub trait EntryPayload {
    fn payload(&self) -> Option<&str>;

    fn set_payload(&mut self, payload: Option<String>);

    /// Decode the payload as JSON; `None` when there is no payload
    fn json_payload<T: DeserializeOwned>(&self) -> ChronosResult<Option<T>> {
        match self.payload() {
            Some(raw) => Ok(Some(serde_json::from_str(raw)?)),
            None => Ok(None),
        }
    }

    /// Replace the payload with the JSON encoding of `value`
    fn set_json_payload<T: Serialize>(&mut self, value: &T) -> ChronosResult<()> {
        let raw = serde_json::to_string(value)?;
        self.set_payload(Some(raw));
        Ok(())
    }
}

/// A string-keyed, versioned payload row
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KeyBucketEntry {
    pub key: String,
    #[serde(default)]
    pub payload: Option<String>,
    pub version: u32,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl KeyBucketEntry {
    pub fn new(key: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            payload: Some(payload.into()),
            version: 1,
            created_at: None,
            updated_at: None,
        }
    }

    /// Builder: set version
    pub fn version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }
}

impl EntryPayload for KeyBucketEntry {
    fn payload(&self) -> Option<&str> {
        self.payload.as_deref()
    }

    fn set_payload(&mut self, payload: Option<String>) {
        self.payload = payload;
    }
}

/// An id-addressed, versioned payload row
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimelineBucketEntry {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub payload: Option<String>,
    pub version: u32,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl TimelineBucketEntry {
    /// A new, not yet stored entry
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            id: None,
            payload: Some(payload.into()),
            version: 1,
            created_at: None,
            updated_at: None,
        }
    }

    /// An entry addressing an explicit id (upserted on put)
    pub fn with_id(id: u64, payload: impl Into<String>) -> Self {
        Self {
            id: Some(id),
            ..Self::new(payload)
        }
    }

    /// Builder: set version
    pub fn version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }
}

impl EntryPayload for TimelineBucketEntry {
    fn payload(&self) -> Option<&str> {
        self.payload.as_deref()
    }

    fn set_payload(&mut self, payload: Option<String>) {
        self.payload = payload;
    }
}

/// A user record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserBucketEntry {
    #[serde(default)]
    pub id: Option<u64>,
    pub email: String,
    #[serde(default)]
    pub payload: Option<String>,
    /// Shard holding this user's own data
    pub shard: u32,
    pub version: u32,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    /// Set by a soft delete
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl UserBucketEntry {
    pub fn new(email: impl Into<String>, shard: u32) -> Self {
        Self {
            id: None,
            email: email.into(),
            payload: None,
            shard,
            version: 1,
            created_at: None,
            updated_at: None,
            deleted_at: None,
        }
    }

    /// Builder: set payload
    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    /// Builder: set version
    pub fn version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

impl EntryPayload for UserBucketEntry {
    fn payload(&self) -> Option<&str> {
        self.payload.as_deref()
    }

    fn set_payload(&mut self, payload: Option<String>) {
        self.payload = payload;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_bucket_kind_codes() {
        assert_eq!(BucketKind::Key.code(), 1);
        assert_eq!(BucketKind::Timeline.code(), 2);
        assert_eq!(BucketKind::User.code(), 3);
        assert_eq!(BucketKind::Timeline.cache_prefix(), "TB");
        assert_eq!(BucketKind::User.to_string(), "user");
    }

    #[test]
    fn test_millis_conversion() {
        let now = Utc::now();
        let restored = from_millis(to_millis(&now));
        assert_eq!(restored.timestamp_millis(), now.timestamp_millis());
        assert_eq!(from_millis(0).timestamp(), 0);
    }

    #[test]
    fn test_new_entries_are_unassigned() {
        let entry = TimelineBucketEntry::new("hello");
        assert!(entry.id.is_none());
        assert_eq!(entry.version, 1);
        assert!(entry.created_at.is_none());

        let entry = TimelineBucketEntry::with_id(42, "hello").version(3);
        assert_eq!(entry.id, Some(42));
        assert_eq!(entry.version, 3);
    }

    #[test]
    fn test_json_payload() {
        let mut entry = KeyBucketEntry::new("profile", "");
        let mut doc = HashMap::new();
        doc.insert("name".to_string(), "ada".to_string());

        entry.set_json_payload(&doc).unwrap();
        let restored: HashMap<String, String> = entry.json_payload().unwrap().unwrap();
        assert_eq!(restored, doc);

        entry.set_payload(None);
        let empty: Option<HashMap<String, String>> = entry.json_payload().unwrap();
        assert!(empty.is_none());
    }

    #[test]
    fn test_bad_json_payload_is_serialization_error() {
        let entry = TimelineBucketEntry::new("not json");
        let result: ChronosResult<Option<Vec<u32>>> = entry.json_payload();
        assert!(matches!(
            result,
            Err(crate::error::ChronosError::Serialization(_))
        ));
    }

    #[test]
    fn test_user_entry_builder() {
        let user = UserBucketEntry::new("ada@example.com", 4).with_payload("{}");
        assert_eq!(user.shard, 4);
        assert_eq!(user.payload.as_deref(), Some("{}"));
        assert!(!user.is_deleted());
    }
}
