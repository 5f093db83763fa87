//! Shard router
//!
//! Keeps the server registry and the shard-to-server assignment, creates and
//! drops shards, buckets and indexes, and hands out handles bound to a
//! shard's connection.
//!
//! `get_*` methods never check that the underlying table exists; a missing
//! table only shows up as a backend error on the handle's first operation.
//!
//! # Example
//!
//! ```rust,no_run
//! use chronos::index::{IndexKind, TimelineIndexEntry, TimelineIndexId, TimelineReader};
//! use chronos::router::{ServerDescriptor, ShardRouter};
//! use chronos::storage::{BucketKind, TimelineBucketEntry};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let router = ShardRouter::default();
//!     router.register_server(ServerDescriptor::new(1, "/var/lib/chronos"));
//!     router.create_shard(1, 1)?;
//!
//!     let bucket = router.create_bucket(BucketKind::Timeline, 1, 1)?.into_timeline();
//!     let index = router.create_index(IndexKind::Timeline, 1, 1)?;
//!
//!     if let Some(bucket) = bucket {
//!         let id = bucket.put(&mut TimelineBucketEntry::new("hello"), true)?;
//!         index.put(&mut TimelineIndexEntry::pointing_to(7, TimelineIndexId::new(1, 1, id)))?;
//!     }
//!
//!     let page = TimelineReader::new(&router, &index).read_a(7, 20)?;
//!     println!("{} entries", page.len());
//!     Ok(())
//! }
//! ```

mod registry;

pub use crate::index::IndexKind;
pub use crate::storage::BucketKind;
pub use registry::{ServerDescriptor, SQLITE_DRIVER};

use crate::cache::{build_cache, EntryCache};
use crate::config::{Config, NamingConfig};
use crate::error::{ChronosError, ChronosResult, ErrorLog, ErrorReporting};
use crate::index::TimelineIndex;
use crate::storage::{
    schema, KeyBucket, ShardBinding, ShardConnection, TimelineBucket, UserBucket,
};
use registry::Registry;
use std::sync::{Arc, Mutex, MutexGuard};

/// A handle to any kind of bucket
pub enum Bucket {
    Key(KeyBucket),
    Timeline(TimelineBucket),
    User(UserBucket),
}

impl Bucket {
    pub fn kind(&self) -> BucketKind {
        match self {
            Bucket::Key(_) => BucketKind::Key,
            Bucket::Timeline(_) => BucketKind::Timeline,
            Bucket::User(_) => BucketKind::User,
        }
    }

    pub fn into_key(self) -> Option<KeyBucket> {
        match self {
            Bucket::Key(bucket) => Some(bucket),
            _ => None,
        }
    }

    pub fn into_timeline(self) -> Option<TimelineBucket> {
        match self {
            Bucket::Timeline(bucket) => Some(bucket),
            _ => None,
        }
    }

    pub fn into_user(self) -> Option<UserBucket> {
        match self {
            Bucket::User(bucket) => Some(bucket),
            _ => None,
        }
    }
}

/// Registry of servers and shards, and factory for bound handles
pub struct ShardRouter {
    naming: Arc<NamingConfig>,
    cache: Option<Arc<dyn EntryCache>>,
    registry: Mutex<Registry>,
    errors: ErrorLog,
}

impl Default for ShardRouter {
    fn default() -> Self {
        Self::new(NamingConfig::default())
    }
}

impl ShardRouter {
    pub fn new(naming: NamingConfig) -> Self {
        Self {
            naming: Arc::new(naming),
            cache: None,
            registry: Mutex::new(Registry::default()),
            errors: ErrorLog::new(),
        }
    }

    /// Router with the configured naming, cache driver and servers
    pub fn from_config(config: &Config) -> Self {
        let mut router = Self::new(config.naming.clone());
        router.cache = build_cache(&config.cache);
        for server in &config.servers {
            router.register_server(ServerDescriptor::from_config(server, &config.defaults));
        }
        router
    }

    /// Router over a single in-memory server (id 1) holding `shards`
    pub fn in_memory(shards: &[u16]) -> Self {
        let router = Self::default();
        router.register_server(ServerDescriptor::in_memory(1).shards(shards));
        router
    }

    /// Builder: use `cache` for every handle issued from now on
    pub fn with_cache(mut self, cache: Arc<dyn EntryCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn naming(&self) -> &NamingConfig {
        &self.naming
    }

    pub fn cache(&self) -> Option<&Arc<dyn EntryCache>> {
        self.cache.as_ref()
    }

    pub fn has_cache(&self) -> bool {
        self.cache.is_some()
    }

    fn registry(&self) -> ChronosResult<MutexGuard<'_, Registry>> {
        self.registry
            .lock()
            .map_err(|e| self.errors.record(ChronosError::Lock(e.to_string())))
    }

    /// Upsert a server; every shard it lists is assigned to it
    pub fn register_server(&self, server: ServerDescriptor) {
        tracing::info!(
            server = server.id,
            host = %server.host,
            shards = ?server.shards,
            "Registering server"
        );
        match self.registry() {
            Ok(mut registry) => registry.register(server),
            Err(e) => tracing::error!(error = %e, "Server registration failed"),
        }
    }

    /// Descriptor of a registered server
    pub fn server(&self, server_id: u32) -> Option<ServerDescriptor> {
        self.registry().ok()?.server(server_id).cloned()
    }

    /// Id of the server holding `shard_id`
    pub fn shard_server(&self, shard_id: u16) -> Option<u32> {
        self.registry().ok()?.server_for_shard(shard_id).map(|s| s.id)
    }

    fn check_driver(server: &ServerDescriptor) -> ChronosResult<()> {
        if server.driver != SQLITE_DRIVER {
            return Err(ChronosError::UnsupportedDriver(server.driver.clone()));
        }
        Ok(())
    }

    /// Create a shard on a server and register it
    pub fn create_shard(&self, server_id: u32, shard_id: u16) -> ChronosResult<()> {
        let shard_name = self.naming.shard_name(shard_id);
        let mut registry = self.registry()?;

        let server = registry
            .server(server_id)
            .cloned()
            .ok_or_else(|| self.errors.record(ChronosError::UnknownServer(server_id)))?;
        Self::check_driver(&server).map_err(|e| self.errors.record(e))?;

        let location = server.location(&shard_name);
        if registry.has_shard(shard_id) || location.exists() {
            return Err(self.errors.record(ChronosError::backend(
                "1007",
                format!(
                    "Can't create database '{}'; database exists",
                    shard_name
                ),
            )));
        }

        let connection = ShardConnection::open(&shard_name, location)
            .map_err(|e| self.errors.record(e))?;
        connection
            .execute_batch(&format!("PRAGMA {}.user_version = 1", shard_name))
            .map_err(|e| self.errors.record(e))?;

        registry.assign(shard_id, server_id, connection);
        tracing::info!(server = server_id, shard = shard_id, name = %shard_name, "Created shard");
        Ok(())
    }

    /// Drop a shard: close its connection, delete its data, forget it
    pub fn drop_shard(&self, shard_id: u16) -> ChronosResult<()> {
        let shard_name = self.naming.shard_name(shard_id);
        let mut registry = self.registry()?;

        let server = registry
            .server_for_shard(shard_id)
            .cloned()
            .ok_or_else(|| self.errors.record(ChronosError::UnknownShard(shard_id)))?;
        let location = server.location(&shard_name);

        let connection = registry.evict(shard_id);
        if connection.is_none() && location.path().is_some() && !location.exists() {
            return Err(self.errors.record(ChronosError::backend(
                "1008",
                format!("Can't drop database '{}'; database doesn't exist", shard_name),
            )));
        }

        if let Some(connection) = connection {
            connection.detach().map_err(|e| self.errors.record(e))?;
        }
        location.remove().map_err(|e| self.errors.record(e))?;

        tracing::info!(server = server.id, shard = shard_id, name = %shard_name, "Dropped shard");
        Ok(())
    }

    /// Connection, naming and cache for handles of `shard_id`
    fn binding(&self, shard_id: u16) -> ChronosResult<ShardBinding> {
        self.lookup_binding(shard_id).map_err(|e| self.errors.record(e))
    }

    /// Same as `binding` but leaves the error log alone
    fn lookup_binding(&self, shard_id: u16) -> ChronosResult<ShardBinding> {
        let mut registry = self
            .registry
            .lock()
            .map_err(|e| ChronosError::Lock(e.to_string()))?;

        let server = registry
            .server_for_shard(shard_id)
            .cloned()
            .ok_or(ChronosError::UnknownShard(shard_id))?;
        Self::check_driver(&server)?;

        let connection = match registry.connection(shard_id) {
            Some(connection) => connection.clone(),
            None => {
                let shard_name = self.naming.shard_name(shard_id);
                let connection =
                    ShardConnection::open(&shard_name, server.location(&shard_name))?;
                registry.cache_connection(shard_id, connection.clone());
                connection
            }
        };

        Ok(ShardBinding::new(
            server.id,
            shard_id,
            connection,
            self.naming.clone(),
            self.cache.clone(),
        ))
    }

    fn bucket_table(&self, kind: BucketKind, bucket_id: u16) -> String {
        match kind {
            BucketKind::Key => KeyBucket::bucket_name(&self.naming, bucket_id),
            BucketKind::Timeline => TimelineBucket::bucket_name(&self.naming, bucket_id),
            BucketKind::User => UserBucket::bucket_name(&self.naming),
        }
    }

    /// Create a bucket table and return its handle.
    ///
    /// `bucket_id` is ignored for user buckets, of which each shard has one.
    pub fn create_bucket(
        &self,
        kind: BucketKind,
        shard_id: u16,
        bucket_id: u16,
    ) -> ChronosResult<Bucket> {
        let binding = self.binding(shard_id)?;
        let table = binding.qualified(&self.bucket_table(kind, bucket_id));
        let ddl = match kind {
            BucketKind::Key => schema::key_bucket_ddl(&table, self.naming.key_bucket_key_size),
            BucketKind::Timeline => schema::timeline_bucket_ddl(&table),
            BucketKind::User => schema::user_bucket_ddl(&table),
        };

        binding
            .connection()
            .execute_batch(&ddl)
            .map_err(|e| self.errors.record(e))?;
        tracing::debug!(%kind, table = %table, "Created bucket");

        Ok(Self::bind_bucket(kind, binding, bucket_id))
    }

    pub fn drop_bucket(&self, kind: BucketKind, shard_id: u16, bucket_id: u16) -> ChronosResult<()> {
        let binding = self.binding(shard_id)?;
        let table = binding.qualified(&self.bucket_table(kind, bucket_id));
        binding
            .connection()
            .execute_batch(&schema::drop_table_ddl(&table))
            .map_err(|e| self.errors.record(e))?;
        tracing::debug!(%kind, table = %table, "Dropped bucket");
        Ok(())
    }

    fn bind_bucket(kind: BucketKind, binding: ShardBinding, bucket_id: u16) -> Bucket {
        match kind {
            BucketKind::Key => Bucket::Key(KeyBucket::new(binding, bucket_id)),
            BucketKind::Timeline => Bucket::Timeline(TimelineBucket::new(binding, bucket_id)),
            BucketKind::User => Bucket::User(UserBucket::new(binding)),
        }
    }

    /// Handle to a bucket, without checking that it exists
    pub fn get_bucket(&self, kind: BucketKind, shard_id: u16, bucket_id: u16) -> ChronosResult<Bucket> {
        let binding = self.binding(shard_id)?;
        Ok(Self::bind_bucket(kind, binding, bucket_id))
    }

    pub fn key_bucket(&self, shard_id: u16, bucket_id: u16) -> ChronosResult<KeyBucket> {
        Ok(KeyBucket::new(self.binding(shard_id)?, bucket_id))
    }

    pub fn timeline_bucket(&self, shard_id: u16, bucket_id: u16) -> ChronosResult<TimelineBucket> {
        Ok(TimelineBucket::new(self.binding(shard_id)?, bucket_id))
    }

    /// Timeline bucket handle for pointer resolution; failures are not logged
    pub(crate) fn resolve_timeline_bucket(
        &self,
        shard_id: u16,
        bucket_id: u16,
    ) -> ChronosResult<TimelineBucket> {
        Ok(TimelineBucket::new(self.lookup_binding(shard_id)?, bucket_id))
    }

    pub fn user_bucket(&self, shard_id: u16) -> ChronosResult<UserBucket> {
        Ok(UserBucket::new(self.binding(shard_id)?))
    }

    /// Create an index table and return its handle
    pub fn create_index(
        &self,
        kind: IndexKind,
        shard_id: u16,
        index_id: u32,
    ) -> ChronosResult<TimelineIndex> {
        let binding = self.binding(shard_id)?;
        let ddl = match kind {
            IndexKind::Timeline => schema::timeline_index_ddl(
                binding.shard_name(),
                &TimelineIndex::index_name(&self.naming, index_id),
            ),
        };

        binding
            .connection()
            .execute_batch(&ddl)
            .map_err(|e| self.errors.record(e))?;

        let index = TimelineIndex::new(binding, index_id);
        tracing::debug!(index = index.name(), "Created index");
        Ok(index)
    }

    pub fn drop_index(&self, kind: IndexKind, shard_id: u16, index_id: u32) -> ChronosResult<()> {
        let binding = self.binding(shard_id)?;
        let (ddl, name) = match kind {
            IndexKind::Timeline => {
                let name = TimelineIndex::index_name(&self.naming, index_id);
                (schema::drop_index_ddl(binding.shard_name(), &name), name)
            }
        };
        binding
            .connection()
            .execute_batch(&ddl)
            .map_err(|e| self.errors.record(e))?;
        tracing::debug!(index = %binding.qualified(&name), "Dropped index");
        Ok(())
    }

    /// Handle to an index, without checking that it exists
    pub fn get_index(
        &self,
        kind: IndexKind,
        shard_id: u16,
        index_id: u32,
    ) -> ChronosResult<TimelineIndex> {
        let binding = self.binding(shard_id)?;
        match kind {
            IndexKind::Timeline => Ok(TimelineIndex::new(binding, index_id)),
        }
    }
}

impl ErrorReporting for ShardRouter {
    fn error_log(&self) -> &ErrorLog {
        &self.errors
    }
}
