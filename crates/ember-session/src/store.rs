//! Store client abstraction.
//!
//! The registry and records never hold session content themselves; every
//! read and write goes through a [`SessionStore`]. The command set is the
//! small subset of Redis the session model needs, so implementations other
//! than Redis only have to provide these operations.

use std::collections::HashSet;

use async_trait::async_trait;

use crate::error::StoreResult;

/// A single command inside an atomic batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCommand {
    /// Set a string value.
    Set { key: String, value: String },

    /// Set the time-to-live of a key, in seconds. No-op for missing keys.
    Expire { key: String, seconds: u64 },

    /// Delete a key. No-op for missing keys.
    Delete { key: String },

    /// Rename a key, overwriting the destination.
    Rename { from: String, to: String },
}

impl StoreCommand {
    /// Build a `Set` command.
    pub fn set(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Set {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Build an `Expire` command.
    pub fn expire(key: impl Into<String>, seconds: u64) -> Self {
        Self::Expire {
            key: key.into(),
            seconds,
        }
    }

    /// Build a `Delete` command.
    pub fn delete(key: impl Into<String>) -> Self {
        Self::Delete { key: key.into() }
    }

    /// Build a `Rename` command.
    pub fn rename(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::Rename {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// Minimal key-value client consumed by the session registry.
///
/// Implementations must be `Send + Sync`; a single instance is shared by the
/// registry and every record it hands out.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Whether `key` exists.
    async fn exists(&self, key: &str) -> StoreResult<bool>;

    /// Read a string value.
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Write a string value. Clears any TTL on the key.
    async fn set(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Remaining time-to-live in whole seconds.
    ///
    /// `None` when the key is missing or has no expiry.
    async fn ttl(&self, key: &str) -> StoreResult<Option<u64>>;

    /// Remaining time-to-live in milliseconds.
    ///
    /// `None` when the key is missing or has no expiry.
    async fn remaining_millis(&self, key: &str) -> StoreResult<Option<u64>>;

    /// Read one field of a hash.
    async fn hash_get(&self, key: &str, field: &str) -> StoreResult<Option<String>>;

    /// Write one field of a hash, creating the hash if needed.
    async fn hash_set(&self, key: &str, field: &str, value: &str) -> StoreResult<()>;

    /// Delete one field of a hash. The hash disappears with its last field.
    async fn hash_delete(&self, key: &str, field: &str) -> StoreResult<()>;

    /// Field names of a hash. Empty for a missing key.
    async fn hash_field_names(&self, key: &str) -> StoreResult<HashSet<String>>;

    /// Delete a key.
    async fn delete_key(&self, key: &str) -> StoreResult<()>;

    /// Rename a key, overwriting the destination.
    async fn rename_key(&self, from: &str, to: &str) -> StoreResult<()>;

    /// All keys matching a glob pattern (`*` and `?`).
    ///
    /// This is a full key-space scan on most backends.
    async fn keys_matching(&self, pattern: &str) -> StoreResult<HashSet<String>>;

    /// Execute `commands` all-or-nothing.
    async fn run_atomic(&self, commands: &[StoreCommand]) -> StoreResult<()>;
}
