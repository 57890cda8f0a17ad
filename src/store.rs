//! Persistent key-value store boundary
//!
//! The client does not own durable storage; the host application injects an
//! implementation of [`KeyValueStore`] (on device this is backed by the
//! platform's async storage). All values are strings; structured records are
//! serialized to JSON by their owning modules.

use async_trait::async_trait;
use thiserror::Error;

/// Logical key namespaces used in the persistent store
pub mod keys {
    /// The persisted token pair, stored as a single JSON record so access and
    /// refresh tokens are always replaced together.
    pub const AUTH_TOKENS: &str = "auth.tokens";

    /// Cached user record, cleared together with credentials on auth failure.
    pub const USER_DATA: &str = "auth.user";

    /// Prefix distinguishing cached responses from everything else, so
    /// invalidation-by-pattern and cleanup can target only cache entries.
    pub const CACHE_PREFIX: &str = "cache.";
}

/// Errors from the persistent store backend
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The underlying storage backend failed
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Durable key-value storage injected by the host application
///
/// Implementations must be safe to call concurrently. The client treats every
/// operation as fallible and degrades gracefully on cache paths; credential
/// paths surface failures as [`ClientError::Storage`](crate::ClientError).
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a value by key; `Ok(None)` when the key is absent.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a value, replacing any existing value for the key.
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Remove a single key; removing an absent key is not an error.
    async fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// Remove a batch of keys.
    async fn remove_many(&self, keys: &[String]) -> Result<(), StoreError>;

    /// Enumerate every stored key.
    async fn list_keys(&self) -> Result<Vec<String>, StoreError>;
}
