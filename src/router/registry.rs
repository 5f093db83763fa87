//! Server descriptors and the shard registry

use crate::config::{ServerConfig, ServerDefaults};
use crate::storage::{ShardConnection, ShardLocation, MEMORY_HOST};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The only backing-store driver the router can open
pub const SQLITE_DRIVER: &str = "sqlite";

/// A server hosting shards
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerDescriptor {
    pub id: u32,
    pub driver: String,
    /// Data directory, or `:memory:`
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Shards assumed to exist on this server
    pub shards: Vec<u16>,
}

impl ServerDescriptor {
    /// SQLite server keeping shard files under `host`
    pub fn new(id: u32, host: impl Into<String>) -> Self {
        let defaults = ServerDefaults::default();
        Self {
            id,
            driver: defaults.driver,
            host: host.into(),
            port: defaults.port,
            username: defaults.username,
            password: defaults.password,
            shards: Vec::new(),
        }
    }

    pub fn in_memory(id: u32) -> Self {
        Self::new(id, MEMORY_HOST)
    }

    /// Builder: set the shards this server already holds
    pub fn shards(mut self, shards: &[u16]) -> Self {
        self.shards = shards.to_vec();
        self
    }

    /// Builder: set driver
    pub fn driver(mut self, driver: impl Into<String>) -> Self {
        self.driver = driver.into();
        self
    }

    /// Resolve a `[[servers]]` entry against the configured defaults
    pub fn from_config(server: &ServerConfig, defaults: &ServerDefaults) -> Self {
        Self {
            id: server.id,
            driver: server.driver.clone().unwrap_or_else(|| defaults.driver.clone()),
            host: server.host.clone().unwrap_or_else(|| defaults.host.clone()),
            port: server.port.unwrap_or(defaults.port),
            username: server
                .username
                .clone()
                .unwrap_or_else(|| defaults.username.clone()),
            password: server
                .password
                .clone()
                .unwrap_or_else(|| defaults.password.clone()),
            shards: server.shards.clone(),
        }
    }

    pub fn location(&self, shard_name: &str) -> ShardLocation {
        ShardLocation::for_host(&self.host, shard_name)
    }
}

/// Servers, shard assignments and open shard connections
#[derive(Default)]
pub(crate) struct Registry {
    servers: HashMap<u32, ServerDescriptor>,
    shard_to_server: HashMap<u16, u32>,
    connections: HashMap<u16, ShardConnection>,
}

impl Registry {
    /// Upsert a server and point every shard it lists at it
    pub fn register(&mut self, server: ServerDescriptor) {
        for &shard_id in &server.shards {
            let previous = self.shard_to_server.insert(shard_id, server.id);
            if previous.is_some_and(|p| p != server.id) {
                self.connections.remove(&shard_id);
            }
        }
        self.servers.insert(server.id, server);
    }

    pub fn server(&self, server_id: u32) -> Option<&ServerDescriptor> {
        self.servers.get(&server_id)
    }

    pub fn server_for_shard(&self, shard_id: u16) -> Option<&ServerDescriptor> {
        self.shard_to_server
            .get(&shard_id)
            .and_then(|id| self.servers.get(id))
    }

    pub fn has_shard(&self, shard_id: u16) -> bool {
        self.shard_to_server.contains_key(&shard_id)
    }

    /// Record a freshly created shard and its connection
    pub fn assign(&mut self, shard_id: u16, server_id: u32, connection: ShardConnection) {
        self.shard_to_server.insert(shard_id, server_id);
        if let Some(server) = self.servers.get_mut(&server_id) {
            if !server.shards.contains(&shard_id) {
                server.shards.push(shard_id);
            }
        }
        self.connections.insert(shard_id, connection);
    }

    pub fn connection(&self, shard_id: u16) -> Option<&ShardConnection> {
        self.connections.get(&shard_id)
    }

    pub fn cache_connection(&mut self, shard_id: u16, connection: ShardConnection) {
        self.connections.insert(shard_id, connection);
    }

    /// Forget a shard, handing back its connection if one was open
    pub fn evict(&mut self, shard_id: u16) -> Option<ShardConnection> {
        if let Some(server_id) = self.shard_to_server.remove(&shard_id) {
            if let Some(server) = self.servers.get_mut(&server_id) {
                server.shards.retain(|&s| s != shard_id);
            }
        }
        self.connections.remove(&shard_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_applies_defaults() {
        let defaults = ServerDefaults {
            host: "/srv/chronos".to_string(),
            ..ServerDefaults::default()
        };
        let server = ServerConfig {
            id: 4,
            port: Some(4000),
            shards: vec![1, 2],
            ..ServerConfig::default()
        };

        let descriptor = ServerDescriptor::from_config(&server, &defaults);
        assert_eq!(descriptor.id, 4);
        assert_eq!(descriptor.driver, "sqlite");
        assert_eq!(descriptor.host, "/srv/chronos");
        assert_eq!(descriptor.port, 4000);
        assert_eq!(descriptor.shards, vec![1, 2]);
    }

    #[test]
    fn test_register_rewrites_assignments() {
        let mut registry = Registry::default();
        registry.register(ServerDescriptor::in_memory(1).shards(&[1, 2]));
        registry.register(ServerDescriptor::in_memory(2).shards(&[2, 3]));

        assert_eq!(registry.server_for_shard(1).map(|s| s.id), Some(1));
        assert_eq!(registry.server_for_shard(2).map(|s| s.id), Some(2));
        assert_eq!(registry.server_for_shard(3).map(|s| s.id), Some(2));
        assert!(registry.server_for_shard(4).is_none());
    }

    #[test]
    fn test_evict() {
        let mut registry = Registry::default();
        registry.register(ServerDescriptor::in_memory(1).shards(&[1]));
        assert!(registry.has_shard(1));

        assert!(registry.evict(1).is_none());
        assert!(!registry.has_shard(1));
        assert!(registry.server(1).unwrap().shards.is_empty());
    }
}
