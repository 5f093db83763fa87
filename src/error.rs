//! Error types and the per-handle error log
//!
//! Every fallible operation returns a [`ChronosResult`]. Handles additionally
//! keep an append-only [`ErrorLog`] (oldest first) so callers can inspect the
//! failure history of a bucket, index or router after the fact.

use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

/// Local code for "statement succeeded but no row was affected".
pub const NO_ROW_AFFECTED: &str = "C00001";

/// Errors that can occur in the store
#[derive(Error, Debug)]
pub enum ChronosError {
    /// The backing store rejected a statement
    #[error("Backend error {code}: {info}")]
    Backend { code: String, info: String },

    /// Statement succeeded but matched nothing (logical no-op)
    #[error("No row affected.")]
    NoRowAffected,

    /// Shard is not assigned to any registered server
    #[error("Unknown shard: {0}")]
    UnknownShard(u16),

    /// Server id has not been registered
    #[error("Unknown server: {0}")]
    UnknownServer(u32),

    /// Server descriptor names a driver we cannot open
    #[error("Unsupported driver: {0}")]
    UnsupportedDriver(String),

    /// Transaction scope misuse (double begin, commit without begin, ...)
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Lock acquisition failed
    #[error("Lock error: {0}")]
    Lock(String),

    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Payload (de)serialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ChronosError {
    /// Build a backend error with an explicit code
    pub fn backend(code: impl Into<String>, info: impl Into<String>) -> Self {
        ChronosError::Backend {
            code: code.into(),
            info: info.into(),
        }
    }

    /// The error code recorded in an [`ErrorLog`]
    pub fn code(&self) -> String {
        match self {
            ChronosError::Backend { code, .. } => code.clone(),
            ChronosError::NoRowAffected => NO_ROW_AFFECTED.to_string(),
            ChronosError::UnknownShard(_) => "C00002".to_string(),
            ChronosError::UnknownServer(_) => "C00003".to_string(),
            ChronosError::UnsupportedDriver(_) => "C00004".to_string(),
            ChronosError::Transaction(_) => "C00005".to_string(),
            ChronosError::Lock(_) => "C00006".to_string(),
            ChronosError::Io(_) => "C00007".to_string(),
            ChronosError::Serialization(_) => "C00008".to_string(),
            ChronosError::Config(_) => "C00009".to_string(),
        }
    }

    /// Convert into the `(code, info)` pair kept by an [`ErrorLog`]
    pub fn to_record(&self) -> ErrorRecord {
        let info = match self {
            ChronosError::Backend { info, .. } => info.clone(),
            other => other.to_string(),
        };
        ErrorRecord {
            code: self.code(),
            info,
        }
    }
}

impl From<rusqlite::Error> for ChronosError {
    fn from(err: rusqlite::Error) -> Self {
        let code = match &err {
            rusqlite::Error::SqliteFailure(failure, _) => failure.extended_code.to_string(),
            _ => "HY000".to_string(),
        };
        ChronosError::Backend {
            code,
            info: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for ChronosError {
    fn from(err: serde_json::Error) -> Self {
        ChronosError::Serialization(err.to_string())
    }
}

/// Result type alias for store operations
pub type ChronosResult<T> = Result<T, ChronosError>;

/// One entry of an [`ErrorLog`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRecord {
    pub code: String,
    pub info: String,
}

/// Append-only failure history, embedded in every handle
#[derive(Debug, Default)]
pub struct ErrorLog {
    records: Mutex<Vec<ErrorRecord>>,
}

impl ErrorLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> MutexGuard<'_, Vec<ErrorRecord>> {
        // A poisoned log is still a valid list of records.
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append a raw `(code, info)` pair
    pub fn push(&self, code: impl Into<String>, info: impl Into<String>) {
        self.records().push(ErrorRecord {
            code: code.into(),
            info: info.into(),
        });
    }

    /// Append the record for `err` and hand the error back for propagation
    pub fn record(&self, err: ChronosError) -> ChronosError {
        tracing::warn!(code = %err.code(), error = %err, "Operation failed");
        self.records().push(err.to_record());
        err
    }

    /// Most recent record, if any
    pub fn latest(&self) -> Option<ErrorRecord> {
        self.records().last().cloned()
    }

    /// Every record, oldest first
    pub fn all(&self) -> Vec<ErrorRecord> {
        self.records().clone()
    }

    pub fn len(&self) -> usize {
        self.records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records().is_empty()
    }

    pub fn clear(&self) {
        self.records().clear();
    }
}

/// Error-log accessors shared by every handle type
pub trait ErrorReporting {
    fn error_log(&self) -> &ErrorLog;

    /// The most recently recorded failure
    fn latest_error(&self) -> Option<ErrorRecord> {
        self.error_log().latest()
    }

    /// All recorded failures, oldest first
    fn errors(&self) -> Vec<ErrorRecord> {
        self.error_log().all()
    }

    fn clear_errors(&self) {
        self.error_log().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ChronosError::NoRowAffected;
        assert_eq!(err.to_string(), "No row affected.");

        let err = ChronosError::UnknownShard(7);
        assert_eq!(err.to_string(), "Unknown shard: 7");
    }

    #[test]
    fn test_no_row_affected_record() {
        let record = ChronosError::NoRowAffected.to_record();
        assert_eq!(record.code, NO_ROW_AFFECTED);
        assert_eq!(record.info, "No row affected.");
    }

    #[test]
    fn test_backend_record_keeps_info() {
        let record = ChronosError::backend("1555", "UNIQUE constraint failed").to_record();
        assert_eq!(record.code, "1555");
        assert_eq!(record.info, "UNIQUE constraint failed");
    }

    #[test]
    fn test_sqlite_error_conversion() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let err: ChronosError = conn.execute("SELECT * FROM missing", []).unwrap_err().into();
        assert!(matches!(err, ChronosError::Backend { .. }));
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_log_is_oldest_first() {
        let log = ErrorLog::new();
        assert!(log.latest().is_none());

        log.push("A", "first");
        let returned = log.record(ChronosError::NoRowAffected);
        assert!(matches!(returned, ChronosError::NoRowAffected));

        let all = log.all();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].code, "A");
        assert_eq!(log.latest().unwrap().code, NO_ROW_AFFECTED);

        log.clear();
        assert!(log.is_empty());
    }
}
