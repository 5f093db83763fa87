//! Shard connections and transaction scopes
//!
//! Every shard owns exactly one SQLite connection. The shard database is
//! attached under the shard's schema name, so all statements address tables
//! as `{shard}.{table}`. Handles for buckets and indexes of the same shard
//! share that connection through an `Arc<Mutex<_>>`.

use crate::cache::EntryCache;
use crate::config::NamingConfig;
use crate::error::{ChronosError, ChronosResult, ErrorReporting};
use rusqlite::{params, Connection, OptionalExtension, Params, Row};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Host value that keeps shard databases in memory
pub const MEMORY_HOST: &str = ":memory:";

/// Where a shard's database lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShardLocation {
    Memory,
    File(PathBuf),
}

impl ShardLocation {
    /// Resolve the location of `shard_name` on a server rooted at `host`
    pub fn for_host(host: &str, shard_name: &str) -> Self {
        if host.is_empty() || host == MEMORY_HOST {
            ShardLocation::Memory
        } else {
            ShardLocation::File(Path::new(host).join(format!("{}.db", shard_name)))
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            ShardLocation::Memory => None,
            ShardLocation::File(path) => Some(path),
        }
    }

    /// Whether a database already exists at this location
    pub fn exists(&self) -> bool {
        self.path().map(|p| p.exists()).unwrap_or(false)
    }

    /// Remove the database file and its journal companions
    pub fn remove(&self) -> ChronosResult<()> {
        if let Some(path) = self.path() {
            if path.exists() {
                std::fs::remove_file(path)?;
            }
            for suffix in ["-wal", "-shm", "-journal"] {
                let mut companion = path.as_os_str().to_owned();
                companion.push(suffix);
                let companion = PathBuf::from(companion);
                if companion.exists() {
                    std::fs::remove_file(companion)?;
                }
            }
        }
        Ok(())
    }
}

/// The single connection of one shard
#[derive(Clone)]
pub struct ShardConnection {
    shard_name: String,
    location: ShardLocation,
    conn: Arc<Mutex<Connection>>,
}

impl ShardConnection {
    /// Open a connection and attach the shard database under its schema name
    pub fn open(shard_name: &str, location: ShardLocation) -> ChronosResult<Self> {
        if let Some(parent) = location.path().and_then(Path::parent) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open_in_memory()?;
        let target = match &location {
            ShardLocation::Memory => MEMORY_HOST.to_string(),
            ShardLocation::File(path) => path.to_string_lossy().into_owned(),
        };
        conn.execute(
            &format!("ATTACH DATABASE ?1 AS {}", shard_name),
            params![target],
        )?;

        if let ShardLocation::File(_) = location {
            conn.execute_batch(&format!(
                "PRAGMA {shard}.journal_mode = WAL;
                 PRAGMA {shard}.synchronous = NORMAL;",
                shard = shard_name
            ))?;
        }

        tracing::debug!(shard = shard_name, ?location, "Opened shard connection");

        Ok(Self {
            shard_name: shard_name.to_string(),
            location,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn shard_name(&self) -> &str {
        &self.shard_name
    }

    pub fn location(&self) -> &ShardLocation {
        &self.location
    }

    fn lock(&self) -> ChronosResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| ChronosError::Lock(format!("shard {}: {}", self.shard_name, e)))
    }

    /// Run one statement, returning the number of affected rows
    pub fn execute<P: Params>(&self, sql: &str, params: P) -> ChronosResult<usize> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(sql)?;
        let affected = stmt.execute(params)?;
        Ok(affected)
    }

    /// Run several `;`-separated statements without parameters
    pub fn execute_batch(&self, sql: &str) -> ChronosResult<()> {
        let conn = self.lock()?;
        conn.execute_batch(sql)?;
        Ok(())
    }

    /// First row of a query, `None` when it yields nothing
    pub fn query_row<T, P, F>(&self, sql: &str, params: P, f: F) -> ChronosResult<Option<T>>
    where
        P: Params,
        F: FnOnce(&Row<'_>) -> rusqlite::Result<T>,
    {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(sql)?;
        let row = stmt.query_row(params, f).optional()?;
        Ok(row)
    }

    /// Every row of a query, in statement order
    pub fn query_rows<T, P, F>(&self, sql: &str, params: P, f: F) -> ChronosResult<Vec<T>>
    where
        P: Params,
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(sql)?;
        let rows = stmt
            .query_map(params, f)?
            .collect::<rusqlite::Result<Vec<T>>>()?;
        Ok(rows)
    }

    /// Detach the shard database, leaving any file on disk
    pub fn detach(&self) -> ChronosResult<()> {
        let conn = self.lock()?;
        conn.flush_prepared_statement_cache();
        conn.execute_batch(&format!("DETACH DATABASE {}", self.shard_name))?;
        Ok(())
    }
}

/// Everything a bucket or index handle needs to reach its shard
#[derive(Clone)]
pub struct ShardBinding {
    pub(crate) server_id: u32,
    pub(crate) shard_id: u16,
    pub(crate) connection: ShardConnection,
    pub(crate) naming: Arc<NamingConfig>,
    pub(crate) cache: Option<Arc<dyn EntryCache>>,
}

impl ShardBinding {
    pub fn new(
        server_id: u32,
        shard_id: u16,
        connection: ShardConnection,
        naming: Arc<NamingConfig>,
        cache: Option<Arc<dyn EntryCache>>,
    ) -> Self {
        Self {
            server_id,
            shard_id,
            connection,
            naming,
            cache,
        }
    }

    pub fn server_id(&self) -> u32 {
        self.server_id
    }

    pub fn shard_id(&self) -> u16 {
        self.shard_id
    }

    pub fn shard_name(&self) -> &str {
        self.connection.shard_name()
    }

    pub fn connection(&self) -> &ShardConnection {
        &self.connection
    }

    pub fn naming(&self) -> &NamingConfig {
        &self.naming
    }

    /// Schema-qualified table name
    pub fn qualified(&self, table: &str) -> String {
        format!("{}.{}", self.shard_name(), table)
    }

    /// The cache to consult, if caching is configured and requested
    pub fn cache_for(&self, use_cache: bool) -> Option<&dyn EntryCache> {
        if use_cache {
            self.cache.as_deref()
        } else {
            None
        }
    }
}

/// Explicit transaction state of one handle
#[derive(Debug, Default)]
pub struct TransactionScope {
    active: AtomicBool,
}

impl TransactionScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn begin(&self, connection: &ShardConnection) -> ChronosResult<()> {
        if self.is_active() {
            return Err(ChronosError::Transaction(
                "transaction already active".to_string(),
            ));
        }
        connection.execute_batch("BEGIN")?;
        self.active.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub fn commit(&self, connection: &ShardConnection) -> ChronosResult<()> {
        self.finish(connection, "COMMIT")
    }

    pub fn rollback(&self, connection: &ShardConnection) -> ChronosResult<()> {
        self.finish(connection, "ROLLBACK")
    }

    fn finish(&self, connection: &ShardConnection, statement: &str) -> ChronosResult<()> {
        if !self.is_active() {
            return Err(ChronosError::Transaction("no active transaction".to_string()));
        }
        connection.execute_batch(statement)?;
        self.active.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Transaction control shared by bucket and index handles
pub trait Transactional: ErrorReporting {
    fn connection(&self) -> &ShardConnection;

    fn transaction_scope(&self) -> &TransactionScope;

    fn begin_transaction(&self) -> ChronosResult<()> {
        self.transaction_scope()
            .begin(self.connection())
            .map_err(|e| self.error_log().record(e))
    }

    fn commit_transaction(&self) -> ChronosResult<()> {
        self.transaction_scope()
            .commit(self.connection())
            .map_err(|e| self.error_log().record(e))
    }

    fn rollback_transaction(&self) -> ChronosResult<()> {
        self.transaction_scope()
            .rollback(self.connection())
            .map_err(|e| self.error_log().record(e))
    }

    fn in_transaction(&self) -> bool {
        self.transaction_scope().is_active()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_location_for_host() {
        assert_eq!(
            ShardLocation::for_host(":memory:", "sha_1"),
            ShardLocation::Memory
        );
        assert_eq!(ShardLocation::for_host("", "sha_1"), ShardLocation::Memory);
        assert_eq!(
            ShardLocation::for_host("/data", "sha_1"),
            ShardLocation::File(PathBuf::from("/data/sha_1.db"))
        );
    }

    #[test]
    fn test_tables_are_schema_qualified() {
        let conn = ShardConnection::open("sha_1", ShardLocation::Memory).unwrap();
        conn.execute_batch("CREATE TABLE sha_1.t (v INTEGER)").unwrap();
        assert_eq!(conn.execute("INSERT INTO sha_1.t (v) VALUES (?)", [7]).unwrap(), 1);

        let v: Option<i64> = conn
            .query_row("SELECT v FROM sha_1.t", [], |row| row.get(0))
            .unwrap();
        assert_eq!(v, Some(7));

        let none: Option<i64> = conn
            .query_row("SELECT v FROM sha_1.t WHERE v = 0", [], |row| row.get(0))
            .unwrap();
        assert!(none.is_none());
    }

    #[test]
    fn test_file_shard_persists() {
        let dir = tempdir().unwrap();
        let location = ShardLocation::for_host(dir.path().to_str().unwrap(), "sha_2");
        assert!(!location.exists());

        let conn = ShardConnection::open("sha_2", location.clone()).unwrap();
        conn.execute_batch("CREATE TABLE sha_2.t (v INTEGER)").unwrap();
        assert!(location.exists());

        conn.detach().unwrap();
        drop(conn);
        location.remove().unwrap();
        assert!(!location.exists());
    }

    #[test]
    fn test_transaction_scope() {
        let conn = ShardConnection::open("sha_1", ShardLocation::Memory).unwrap();
        conn.execute_batch("CREATE TABLE sha_1.t (v INTEGER)").unwrap();
        let scope = TransactionScope::new();

        assert!(scope.commit(&conn).is_err());

        scope.begin(&conn).unwrap();
        assert!(scope.is_active());
        assert!(matches!(
            scope.begin(&conn),
            Err(ChronosError::Transaction(_))
        ));

        conn.execute("INSERT INTO sha_1.t (v) VALUES (1)", []).unwrap();
        scope.rollback(&conn).unwrap();
        assert!(!scope.is_active());

        let rows = conn
            .query_rows("SELECT v FROM sha_1.t", [], |row| row.get::<_, i64>(0))
            .unwrap();
        assert!(rows.is_empty());
    }
}
