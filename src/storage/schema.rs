//! DDL for buckets and indexes
//!
//! Timestamps are stored as unix milliseconds. Payloads are free-form text.

/// Key bucket table; `key_size` bounds the key length
pub fn key_bucket_ddl(table: &str, key_size: u32) -> String {
    format!(
        "CREATE TABLE {table} (
            key TEXT PRIMARY KEY CHECK (length(key) <= {key_size}),
            payload TEXT,
            version INTEGER NOT NULL DEFAULT 1,
            created_at INTEGER NOT NULL DEFAULT 0,
            updated_at INTEGER NOT NULL DEFAULT 0
        )"
    )
}

pub fn timeline_bucket_ddl(table: &str) -> String {
    format!(
        "CREATE TABLE {table} (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            payload TEXT,
            version INTEGER NOT NULL DEFAULT 1,
            created_at INTEGER NOT NULL DEFAULT 0,
            updated_at INTEGER NOT NULL DEFAULT 0
        )"
    )
}

pub fn user_bucket_ddl(table: &str) -> String {
    format!(
        "CREATE TABLE {table} (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            email TEXT NOT NULL UNIQUE,
            payload TEXT,
            shard INTEGER NOT NULL DEFAULT 0,
            version INTEGER NOT NULL DEFAULT 1,
            created_at INTEGER NOT NULL DEFAULT 0,
            updated_at INTEGER NOT NULL DEFAULT 0,
            deleted_at INTEGER
        )"
    )
}

/// Bare name of the id sequence kept next to a timeline index
pub fn index_seq_name(index_name: &str) -> String {
    format!("{index_name}_seq")
}

/// Timeline index table, its `(a, id)` lookup index and its id sequence.
///
/// `index_name` is the bare name; `shard` the schema it lives in. The
/// sequence holds the highest id ever inserted and only moves up, so ids
/// freed by deletes are not handed out again.
pub fn timeline_index_ddl(shard: &str, index_name: &str) -> String {
    let seq = index_seq_name(index_name);
    format!(
        "CREATE TABLE {shard}.{index_name} (
            a INTEGER NOT NULL,
            b INTEGER NOT NULL,
            created_at INTEGER NOT NULL DEFAULT 0,
            id INTEGER NOT NULL,
            updated_at INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (id, a)
        );
        CREATE INDEX {shard}.{index_name}_a ON {index_name} (a, id);
        CREATE TABLE {shard}.{seq} (last_id INTEGER NOT NULL);
        INSERT INTO {shard}.{seq} (last_id) VALUES (0);
        CREATE TRIGGER {shard}.{seq}_bump AFTER INSERT ON {index_name}
        BEGIN
            UPDATE {seq} SET last_id = NEW.id WHERE NEW.id > last_id;
        END;"
    )
}

/// Drop a timeline index together with its id sequence
pub fn drop_index_ddl(shard: &str, index_name: &str) -> String {
    format!(
        "DROP TABLE {shard}.{index_name};
        DROP TABLE IF EXISTS {shard}.{seq};",
        seq = index_seq_name(index_name)
    )
}

pub fn drop_table_ddl(table: &str) -> String {
    format!("DROP TABLE {table}")
}
